//! Model instances.
//!
//! A [`Record`] is one row of one model: its attribute map, dirty set, loaded
//! associations and lifecycle flags. Attribute access resolves names in a
//! fixed order, the same for every model:
//!
//! - read: getter, then (after alias translation) attribute, loaded
//!   association, declared association (loaded lazily), `id`, delegate.
//! - write: alias (bypassing setters) or setter, then attribute, `id`,
//!   delegate.
//!
//! Anything else is an [`Error::UndefinedProperty`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use activerow_core::{Error, Result, Value};
use indexmap::{IndexMap, IndexSet};

use crate::callback::Hook;
use crate::errors::Errors;
use crate::finder::Model;
use crate::model::{Getter, Setter};
use crate::registry::Registry;
use crate::table::Table;

/// Column name the Oracle row limiter adds to result sets.
const ORACLE_ROWNUM: &str = "ar_rnum__";

/// A loaded association.
#[derive(Debug, Clone)]
pub enum Related {
    /// belongs_to / has_one.
    One(Option<Box<Record>>),
    /// has_many.
    Many(Vec<Record>),
}

impl Related {
    /// The associated record of a singular association.
    pub fn one(&self) -> Option<&Record> {
        match self {
            Self::One(record) => record.as_deref(),
            Self::Many(_) => None,
        }
    }

    pub fn one_mut(&mut self) -> Option<&mut Record> {
        match self {
            Self::One(record) => record.as_deref_mut(),
            Self::Many(_) => None,
        }
    }

    /// Every associated record (zero or one for singular associations).
    pub fn many(&self) -> &[Record] {
        match self {
            Self::One(Some(record)) => std::slice::from_ref(record.as_ref()),
            Self::One(None) => &[],
            Self::Many(records) => records,
        }
    }

    pub fn many_mut(&mut self) -> &mut [Record] {
        match self {
            Self::One(Some(record)) => std::slice::from_mut(record.as_mut()),
            Self::One(None) => &mut [],
            Self::Many(records) => records,
        }
    }

    pub fn len(&self) -> usize {
        self.many().len()
    }

    pub fn is_empty(&self) -> bool {
        self.many().is_empty()
    }
}

/// Result of a property read.
#[derive(Debug, Clone)]
pub enum Property {
    Value(Value),
    Related(Related),
}

enum ReadPath {
    Getter(Getter),
    Attribute(String),
    Loaded(String),
    Relationship(String),
    Delegate { to: String, name: String },
}

enum WritePath {
    Setter(Setter),
    Attribute(String),
    Delegate { to: String, name: String },
}

/// One model instance.
#[derive(Clone)]
pub struct Record {
    pub(crate) registry: Arc<Registry>,
    pub(crate) table: Arc<Table>,
    pub(crate) attributes: IndexMap<String, Value>,
    pub(crate) dirty: IndexSet<String>,
    pub(crate) relationships: HashMap<String, Related>,
    pub(crate) new_record: bool,
    pub(crate) readonly: bool,
    pub(crate) errors: Option<Errors>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut related: Vec<&String> = self.relationships.keys().collect();
        related.sort();
        f.debug_struct("Record")
            .field("class", &self.table.class_name)
            .field("attributes", &self.attributes)
            .field("dirty", &self.dirty)
            .field("relationships", &related)
            .field("new_record", &self.new_record)
            .field("readonly", &self.readonly)
            .finish()
    }
}

impl Record {
    // ========================================================================
    // Construction
    // ========================================================================

    fn construct(
        registry: Arc<Registry>,
        table: Arc<Table>,
        attributes: IndexMap<String, Value>,
        guard: bool,
        via_find: bool,
    ) -> Result<Self> {
        let mut record = Self {
            registry,
            attributes: IndexMap::new(),
            dirty: IndexSet::new(),
            relationships: HashMap::new(),
            new_record: !via_find,
            readonly: false,
            errors: None,
            table,
        };
        if !via_find {
            for column in record.table.columns.values() {
                record
                    .attributes
                    .insert(column.inflected_name.clone(), column.default.clone());
            }
        }
        record.mass_assign(attributes, guard)?;
        if via_find {
            record.dirty.clear();
        }
        record.invoke(Hook::AfterConstruct, false)?;
        Ok(record)
    }

    /// A new, unsaved record: column defaults overlaid with `attributes`
    /// through guarded mass assignment.
    pub fn build(
        registry: Arc<Registry>,
        table: Arc<Table>,
        attributes: IndexMap<String, Value>,
    ) -> Result<Self> {
        Self::construct(registry, table, attributes, true, false)
    }

    /// A persisted record from a result row. Nothing is dirty afterwards.
    pub(crate) fn hydrate(
        registry: Arc<Registry>,
        table: Arc<Table>,
        row: IndexMap<String, Value>,
    ) -> Result<Self> {
        Self::construct(registry, table, row, false, true)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn class_name(&self) -> &str {
        &self.table.class_name
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Class-level handle for this record's model.
    pub fn model(&self) -> Model {
        Model::new(Arc::clone(&self.registry), Arc::clone(&self.table))
    }

    /// The raw attribute map.
    pub fn attributes(&self) -> &IndexMap<String, Value> {
        &self.attributes
    }

    /// A raw attribute, without getters, aliases or associations.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn is_new_record(&self) -> bool {
        self.new_record
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Flag the record read-only (or writable again).
    pub fn readonly(&mut self, readonly: bool) {
        self.readonly = readonly;
    }

    /// Errors from the last validation pass.
    pub fn errors(&self) -> Option<&Errors> {
        self.errors.as_ref()
    }

    /// Errors collection, created on demand. Custom validators add here.
    pub fn errors_mut(&mut self) -> &mut Errors {
        self.errors.get_or_insert_with(Errors::new)
    }

    fn undefined(&self, name: &str) -> Error {
        Error::undefined_property(self.table.class_name.clone(), name)
    }

    pub(crate) fn verify_not_readonly(&self, method: &str) -> Result<()> {
        if self.readonly {
            return Err(Error::ReadOnly {
                class: self.table.class_name.clone(),
                method: method.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn invoke(&mut self, hook: Hook, must_exist: bool) -> Result<bool> {
        let callbacks = Arc::clone(self.table.callbacks());
        callbacks.invoke(self, hook, must_exist)
    }

    // ========================================================================
    // Name Resolution
    // ========================================================================

    fn resolve_stored(&self, name: &str) -> Option<ReadPath> {
        let config = self.table.config();
        let name = config.alias.get(name).map_or(name, String::as_str);

        if self.attributes.contains_key(name) {
            return Some(ReadPath::Attribute(name.to_string()));
        }
        if self.relationships.contains_key(name) {
            return Some(ReadPath::Loaded(name.to_string()));
        }
        if self.table.relationship(name).is_some() {
            return Some(ReadPath::Relationship(name.to_string()));
        }
        if name == "id" {
            if let Some(pk) = self.table.pk.first() {
                if self.attributes.get(pk).is_some_and(|v| !v.is_null()) {
                    return Some(ReadPath::Attribute(pk.clone()));
                }
            }
        }
        config.delegates.iter().find_map(|d| {
            d.resolve(name).map(|delegated| ReadPath::Delegate {
                to: d.to.clone(),
                name: delegated,
            })
        })
    }

    fn resolve_read(&self, name: &str) -> Option<ReadPath> {
        if let Some(getter) = self.table.config().getters.get(name) {
            return Some(ReadPath::Getter(Arc::clone(getter)));
        }
        self.resolve_stored(name)
    }

    fn resolve_write(&self, name: &str) -> Option<WritePath> {
        let config = self.table.config();
        let name = match config.alias.get(name) {
            Some(real) => real.as_str(),
            None => {
                if let Some(setter) = config.setters.get(name) {
                    return Some(WritePath::Setter(Arc::clone(setter)));
                }
                name
            }
        };

        if self.attributes.contains_key(name) {
            return Some(WritePath::Attribute(name.to_string()));
        }
        if name == "id" {
            if let Some(pk) = self.table.pk.first() {
                return Some(WritePath::Attribute(pk.clone()));
            }
        }
        config.delegates.iter().find_map(|d| {
            d.resolve(name).map(|delegated| WritePath::Delegate {
                to: d.to.clone(),
                name: delegated,
            })
        })
    }

    /// Real attribute name for `name` (alias-aware), if it is an attribute.
    pub fn real_attribute_name(&self, name: &str) -> Option<String> {
        if self.attributes.contains_key(name) {
            return Some(name.to_string());
        }
        self.table.config().alias.get(name).cloned()
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Resolve `name` through the full read path.
    #[track_caller]
    pub fn read(&mut self, name: &str) -> Result<Property> {
        match self.resolve_read(name).ok_or_else(|| self.undefined(name))? {
            ReadPath::Getter(getter) => getter(self).map(Property::Value),
            path => self.read_path(path),
        }
    }

    /// Like [`Record::read`] but skipping getters. Getters use this to reach
    /// the stored value they wrap.
    #[track_caller]
    pub fn read_attribute(&mut self, name: &str) -> Result<Value> {
        let path = self.resolve_stored(name).ok_or_else(|| self.undefined(name))?;
        match self.read_path(path)? {
            Property::Value(value) => Ok(value),
            Property::Related(_) => Err(self.not_a_value(name)),
        }
    }

    /// Read a value through the full read path. Associations are an error;
    /// use [`Record::related`] for those.
    #[track_caller]
    pub fn get(&mut self, name: &str) -> Result<Value> {
        match self.read(name)? {
            Property::Value(value) => Ok(value),
            Property::Related(_) => Err(self.not_a_value(name)),
        }
    }

    fn not_a_value(&self, name: &str) -> Error {
        Error::Relationship(format!(
            "{name} is an association of {}, not an attribute",
            self.table.class_name
        ))
    }

    #[track_caller]
    fn read_path(&mut self, path: ReadPath) -> Result<Property> {
        match path {
            ReadPath::Getter(getter) => getter(self).map(Property::Value),
            ReadPath::Attribute(name) => Ok(Property::Value(
                self.attributes.get(&name).cloned().unwrap_or_default(),
            )),
            ReadPath::Loaded(name) | ReadPath::Relationship(name) => {
                Ok(Property::Related(self.related(&name)?.clone()))
            }
            ReadPath::Delegate { to, name } => match self.related_mut(&to)? {
                Related::One(Some(target)) => target.get(&name).map(Property::Value),
                Related::One(None) => Ok(Property::Value(Value::Null)),
                Related::Many(_) => Err(Error::Relationship(format!(
                    "Cannot delegate {name} to has_many association {to}"
                ))),
            },
        }
    }

    /// A declared association, loading it on first access.
    #[track_caller]
    pub fn related(&mut self, name: &str) -> Result<&Related> {
        self.related_mut(name).map(|r| &*r)
    }

    /// Mutable access to a declared association, loading it on first access.
    #[track_caller]
    pub fn related_mut(&mut self, name: &str) -> Result<&mut Related> {
        if !self.relationships.contains_key(name) {
            self.load_relationship(name)?;
        }
        self.relationships
            .get_mut(name)
            .ok_or_else(|| Error::Relationship(format!("Relationship {name} failed to load")))
    }

    #[track_caller]
    fn load_relationship(&mut self, name: &str) -> Result<()> {
        let table = Arc::clone(&self.table);
        let registry = Arc::clone(&self.registry);
        let rel = table.get_relationship(name)?;
        registry.record_lazy_load(&table.class_name, name);
        let related = rel.load(&registry, self)?;
        self.relationships.insert(name.to_string(), related);
        Ok(())
    }

    pub(crate) fn set_relationship(&mut self, name: &str, related: Related) {
        self.relationships.insert(name.to_string(), related);
    }

    /// Values of `names`, read through the full read path.
    pub fn values_for<S: AsRef<str>>(&mut self, names: &[S]) -> Result<IndexMap<String, Value>> {
        let mut out = IndexMap::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            out.insert(name.to_string(), self.get(name)?);
        }
        Ok(out)
    }

    /// Primary key values, keyed by column.
    pub fn primary_key_values(&mut self) -> Result<IndexMap<String, Value>> {
        let pk = self.table.pk.clone();
        self.values_for(&pk)
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Resolve `name` through the write path and assign `value`.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        match self.resolve_write(name).ok_or_else(|| self.undefined(name))? {
            WritePath::Setter(setter) => setter(self, value),
            WritePath::Attribute(name) => {
                self.assign_attribute(&name, value);
                Ok(())
            }
            WritePath::Delegate { to, name } => {
                let class = self.table.class_name.clone();
                match self.related_mut(&to)?.one_mut() {
                    Some(target) => target.set(&name, value),
                    None => Err(Error::Relationship(format!(
                        "Cannot set {name}: association {to} of {class} is empty"
                    ))),
                }
            }
        }
    }

    /// Store `value` cast to the column type and mark it dirty. Setters use
    /// this to write the stored value.
    pub fn assign_attribute(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        let value = match self.table.column(name) {
            Some(column) => column.cast(&value),
            None => value,
        };
        self.attributes.insert(name.to_string(), value);
        self.flag_dirty(name);
    }

    /// Guarded mass assignment.
    pub fn set_attributes(&mut self, attributes: IndexMap<String, Value>) -> Result<()> {
        self.mass_assign(attributes, true)
    }

    /// Assign many attributes. Guarded assignment honors the accessible and
    /// protected lists and goes through the write path, collecting every
    /// unknown name into one error; unguarded assignment stores everything.
    pub(crate) fn mass_assign(&mut self, attributes: IndexMap<String, Value>, guard: bool) -> Result<()> {
        let table = Arc::clone(&self.table);
        let config = table.config();
        let mut undefined = Vec::new();

        for (name, value) in attributes {
            let (name, value) = match table.column(&name) {
                Some(column) => (column.inflected_name.clone(), column.cast(&value)),
                None => (name, value),
            };

            if guard {
                if !config.accessible.is_empty() && !config.accessible.contains(&name) {
                    continue;
                }
                if !config.protected.is_empty() && config.protected.contains(&name) {
                    continue;
                }
                match self.set(&name, value) {
                    Ok(()) => {}
                    Err(Error::UndefinedProperty { names, .. }) => undefined.extend(names),
                    Err(e) => return Err(e),
                }
            } else {
                if name == ORACLE_ROWNUM {
                    continue;
                }
                self.assign_attribute(&name, value);
            }
        }

        if !undefined.is_empty() {
            return Err(Error::UndefinedProperty {
                class: table.class_name.clone(),
                names: undefined,
            });
        }
        Ok(())
    }

    pub(crate) fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        self.dirty.shift_remove(name);
        self.attributes.shift_remove(name)
    }

    // ========================================================================
    // Dirty Tracking
    // ========================================================================

    /// Dirty attributes and their values, or `None` when nothing is dirty.
    pub fn dirty_attributes(&self) -> Option<IndexMap<String, Value>> {
        if self.dirty.is_empty() {
            return None;
        }
        let dirty: IndexMap<String, Value> = self
            .attributes
            .iter()
            .filter(|(name, _)| self.dirty.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        (!dirty.is_empty()).then_some(dirty)
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn attribute_is_dirty(&self, name: &str) -> bool {
        self.dirty.contains(name) && self.attributes.contains_key(name)
    }

    pub fn flag_dirty(&mut self, name: &str) {
        self.dirty.insert(name.to_string());
    }

    pub fn reset_dirty(&mut self) {
        self.dirty.clear();
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Attributes as a JSON object; DATETIME values use the configured
    /// date format.
    pub fn to_json(&self) -> serde_json::Value {
        let format = &self.registry.config().date_format;
        serde_json::Value::Object(
            self.attributes
                .iter()
                .map(|(name, value)| (name.clone(), json_value(value, format)))
                .collect(),
        )
    }
}

fn json_value(value: &Value, date_format: &str) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Double(d) => serde_json::Number::from_f64(*d)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::DateTime(dt) => serde_json::Value::String(dt.format(date_format).to_string()),
        Value::Date(_) | Value::Time(_) => serde_json::Value::String(value.to_string()),
        Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(|v| json_value(v, date_format)).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_json_value_formats_datetimes() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(5, 6, 7)
            .unwrap();
        assert_eq!(
            json_value(&Value::DateTime(dt), "%d/%m/%Y"),
            serde_json::Value::String("04/03/2024".into())
        );
        assert_eq!(json_value(&Value::Int(3), "%Y"), serde_json::json!(3));
        assert_eq!(json_value(&Value::Double(f64::NAN), "%Y"), serde_json::Value::Null);
    }

    #[test]
    fn test_related_views() {
        let empty = Related::One(None);
        assert!(empty.is_empty());
        assert!(empty.one().is_none());
        assert_eq!(Related::Many(Vec::new()).len(), 0);
    }
}
