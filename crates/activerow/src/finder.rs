//! Class-level finders.
//!
//! A [`Model`] is the handle for everything that acts on a model class rather
//! than an instance: primary-key and option finds, counts, raw SQL finds,
//! creation, bulk updates and deletes, and the dynamic finder family driven
//! by [`FinderRequest`].
//!
//! ```ignore
//! let authors = registry.model("Author")?;
//! let tito = authors.find(Find::id(1), FindOptions::new())?.into_one();
//! let recent = authors.all(FindOptions::new().order("created_at DESC").limit(10))?;
//! let found = authors.dispatch(FinderRequest::parse("find_by_name", vec!["Tito".into()])?)?;
//! ```

use std::sync::Arc;

use activerow_core::{Error, Result, Value};
use activerow_query::{
    Conditions, FindOptions, Glue, SqlBuilder, conditions_from_underscored, hash_from_underscored,
};
use indexmap::IndexMap;

use crate::record::Record;
use crate::registry::Registry;
use crate::table::Table;

/// What [`Model::find`] looks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Find {
    /// One primary key value; missing is an error.
    Id(Value),
    /// Several primary key values; every one must be found.
    Ids(Vec<Value>),
    First,
    Last,
    All,
}

impl Find {
    pub fn id(id: impl Into<Value>) -> Self {
        Self::Id(id.into())
    }

    pub fn ids<I, V>(ids: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Ids(ids.into_iter().map(Into::into).collect())
    }
}

/// Result of [`Model::find`] and [`Model::dispatch`].
#[derive(Debug, Clone)]
pub enum Found {
    One(Option<Record>),
    Many(Vec<Record>),
    Count(i64),
}

impl Found {
    /// The single record, or the first of a list.
    pub fn into_one(self) -> Option<Record> {
        match self {
            Self::One(record) => record,
            Self::Many(records) => records.into_iter().next(),
            Self::Count(_) => None,
        }
    }

    pub fn into_many(self) -> Vec<Record> {
        match self {
            Self::One(record) => record.into_iter().collect(),
            Self::Many(records) => records,
            Self::Count(_) => Vec::new(),
        }
    }

    pub fn count(&self) -> Option<i64> {
        match self {
            Self::Count(n) => Some(*n),
            _ => None,
        }
    }
}

/// SET clause for [`Model::update_all`].
#[derive(Debug, Clone, PartialEq)]
pub enum Assignments {
    Hash(IndexMap<String, Value>),
    Raw(String),
}

impl From<IndexMap<String, Value>> for Assignments {
    fn from(hash: IndexMap<String, Value>) -> Self {
        Self::Hash(hash)
    }
}

impl From<&str> for Assignments {
    fn from(sql: &str) -> Self {
        Self::Raw(sql.to_string())
    }
}

// ============================================================================
// Dynamic Finders
// ============================================================================

/// Kind of dynamic finder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinderMode {
    /// First match.
    FindBy,
    /// Every match.
    FindAllBy,
    CountBy,
    /// First match, created from the arguments when there is none.
    FindOrCreateBy,
}

impl FinderMode {
    const PREFIXES: [(&'static str, FinderMode); 4] = [
        ("find_or_create_by_", FinderMode::FindOrCreateBy),
        ("find_all_by_", FinderMode::FindAllBy),
        ("find_by_", FinderMode::FindBy),
        ("count_by_", FinderMode::CountBy),
    ];
}

/// A dynamic finder call: fields joined by AND/OR, matched positionally
/// against `args`.
#[derive(Debug, Clone, PartialEq)]
pub struct FinderRequest {
    pub mode: FinderMode,
    pub fields: Vec<String>,
    pub glue: Vec<Glue>,
    pub args: Vec<Value>,
    pub options: FindOptions,
}

impl FinderRequest {
    pub fn new(mode: FinderMode, field: impl Into<String>) -> Self {
        Self {
            mode,
            fields: vec![field.into()],
            glue: Vec::new(),
            args: Vec::new(),
            options: FindOptions::default(),
        }
    }

    /// Parse `find_by_name_and_id` style names.
    pub fn parse(method: &str, args: Vec<Value>) -> Result<Self> {
        let undefined = || Error::config(format!("Call to undefined method: {method}"));
        let (mode, rest) = FinderMode::PREFIXES
            .iter()
            .find_map(|(prefix, mode)| method.strip_prefix(prefix).map(|rest| (*mode, rest)))
            .ok_or_else(undefined)?;
        if rest.is_empty() {
            return Err(undefined());
        }
        let (fields, glue) = activerow_query::split_underscored(rest);
        Ok(Self {
            mode,
            fields,
            glue,
            args,
            options: FindOptions::default(),
        })
    }

    #[must_use]
    pub fn and(mut self, field: impl Into<String>) -> Self {
        self.glue.push(Glue::And);
        self.fields.push(field.into());
        self
    }

    #[must_use]
    pub fn or(mut self, field: impl Into<String>) -> Self {
        self.glue.push(Glue::Or);
        self.fields.push(field.into());
        self
    }

    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    #[must_use]
    pub fn options(mut self, options: FindOptions) -> Self {
        self.options = options;
        self
    }

    /// The fields rendered back into underscored form.
    pub fn underscored(&self) -> String {
        let mut out = String::new();
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push_str(self.glue.get(i - 1).copied().unwrap_or(Glue::And).as_underscored());
            }
            out.push_str(field);
        }
        out
    }
}

// ============================================================================
// Model
// ============================================================================

/// Class-level handle for one model.
#[derive(Debug, Clone)]
pub struct Model {
    registry: Arc<Registry>,
    table: Arc<Table>,
}

impl Model {
    pub fn new(registry: Arc<Registry>, table: Arc<Table>) -> Self {
        Self { registry, table }
    }

    pub fn class_name(&self) -> &str {
        &self.table.class_name
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn prepare(&self, mut options: FindOptions) -> FindOptions {
        options.mapped_names = self.table.config().alias.clone();
        options
    }

    /// AND `extra` onto the existing conditions, translating aliases first.
    fn merge_conditions(&self, options: &mut FindOptions, extra: Conditions) {
        options.conditions = Some(match options.conditions.take() {
            Some(existing) => existing
                .map_names(&options.mapped_names)
                .and(extra, Some(Arc::clone(self.table.conn()))),
            None => extra,
        });
    }

    // ========================================================================
    // Finders
    // ========================================================================

    #[tracing::instrument(level = "debug", skip(self, options), fields(class = %self.table.class_name))]
    pub fn find(&self, find: Find, options: FindOptions) -> Result<Found> {
        let options = self.prepare(options);
        match find {
            Find::All => self.all(options).map(Found::Many),
            Find::First => self.first(options).map(Found::One),
            Find::Last => self.last(options).map(Found::One),
            Find::Id(id) => {
                let mut list = self.find_by_pk(vec![id], options)?;
                Ok(Found::One(list.pop()))
            }
            Find::Ids(ids) => self.find_by_pk(ids, options).map(Found::Many),
        }
    }

    /// Records whose primary key is in `ids`. Anything short of all of them
    /// is [`Error::RecordNotFound`].
    pub fn find_by_pk(&self, ids: Vec<Value>, options: FindOptions) -> Result<Vec<Record>> {
        let class = &self.table.class_name;
        if ids.is_empty() {
            return Err(Error::RecordNotFound(format!("Couldn't find {class} without an ID")));
        }
        let pk = self.table.pk.first().ok_or_else(|| {
            Error::config(format!("Cannot find by primary key, no primary key defined for: {class}"))
        })?;

        let key = match ids.as_slice() {
            [single] => single.clone(),
            _ => Value::Array(ids.clone()),
        };
        let mut options = self.prepare(options);
        self.merge_conditions(&mut options, Conditions::Hash(IndexMap::from([(pk.clone(), key)])));

        let list = self.table.find(&self.registry, &options)?;
        if list.len() != ids.len() {
            let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
            return Err(Error::RecordNotFound(if ids.len() == 1 {
                format!("Couldn't find {class} with ID={}", rendered[0])
            } else {
                format!(
                    "Couldn't find all {class} with IDs ({}) (found {}, but was looking for {})",
                    rendered.join(","),
                    list.len(),
                    ids.len()
                )
            }));
        }
        Ok(list)
    }

    pub fn all(&self, options: FindOptions) -> Result<Vec<Record>> {
        let options = self.prepare(options);
        self.table.find(&self.registry, &options)
    }

    pub fn first(&self, mut options: FindOptions) -> Result<Option<Record>> {
        options.limit = Some(1);
        options.offset = Some(0);
        Ok(self.all(options)?.into_iter().next())
    }

    /// The last record by the reversed order, or by primary key descending.
    pub fn last(&self, mut options: FindOptions) -> Result<Option<Record>> {
        options.order = match options.order.as_deref() {
            Some(order) => SqlBuilder::reverse_order(Some(order)),
            None if self.table.pk.is_empty() => None,
            None => Some(format!("{} DESC", self.table.pk.join(" DESC, "))),
        };
        self.first(options)
    }

    /// `SELECT COUNT(*)` under `options`.
    #[tracing::instrument(level = "debug", skip(self, options), fields(class = %self.table.class_name))]
    pub fn count(&self, options: FindOptions) -> Result<i64> {
        let mut options = self.prepare(options);
        options.select = Some("COUNT(*)".to_string());
        let sql = self.table.options_to_sql(&self.registry, &options)?;
        let value = self.table.query_scalar(&sql)?;
        Ok(value.and_then(|v| v.as_i64()).unwrap_or(0))
    }

    pub fn exists(&self, options: FindOptions) -> Result<bool> {
        Ok(self.count(options)? > 0)
    }

    /// Hydrate records from arbitrary SQL.
    pub fn find_by_sql(&self, sql: &str, values: &[Value], readonly: bool) -> Result<Vec<Record>> {
        self.table.find_by_sql(&self.registry, sql, values, readonly, &[])
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// A new unsaved record (guarded mass assignment).
    pub fn build(&self, attributes: IndexMap<String, Value>) -> Result<Record> {
        Record::build(Arc::clone(&self.registry), Arc::clone(&self.table), attributes)
    }

    /// Build and save a record. The record is returned even when validation
    /// fails; check [`Record::is_new_record`] or [`Record::errors`].
    pub fn create(&self, attributes: IndexMap<String, Value>, validate: bool) -> Result<Record> {
        let mut record = self.build(attributes)?;
        record.save(validate)?;
        Ok(record)
    }

    // ========================================================================
    // Bulk Writes
    // ========================================================================

    /// DELETE rows matching `options` without instantiating them. Returns
    /// the affected row count.
    #[tracing::instrument(level = "debug", skip(self, options), fields(class = %self.table.class_name))]
    pub fn delete_all(&self, options: FindOptions) -> Result<u64> {
        let options = self.prepare(options);
        let sql = self.bulk_builder()?.delete(
            options
                .conditions
                .clone()
                .map(|c| c.map_names(&options.mapped_names)),
        );
        self.table.execute(&with_limit_and_order(sql, &options))
    }

    /// UPDATE rows matching `options` without instantiating them. Returns
    /// the affected row count.
    #[tracing::instrument(level = "debug", skip(self, set, options), fields(class = %self.table.class_name))]
    pub fn update_all(&self, set: impl Into<Assignments>, options: FindOptions) -> Result<u64> {
        let options = self.prepare(options);
        let sql = match set.into() {
            Assignments::Hash(hash) => self.bulk_builder()?.update(hash)?,
            Assignments::Raw(raw) => self.bulk_builder()?.update_raw(raw)?,
        };
        let sql = sql.filter_opt(
            options
                .conditions
                .clone()
                .map(|c| c.map_names(&options.mapped_names)),
        );
        self.table.execute(&with_limit_and_order(sql, &options))
    }

    fn bulk_builder(&self) -> Result<SqlBuilder> {
        SqlBuilder::new(
            Some(Arc::clone(self.table.conn())),
            self.table.fully_qualified_name(true),
        )
    }

    // ========================================================================
    // Dynamic Finders
    // ========================================================================

    /// Run a dynamic finder.
    pub fn dispatch(&self, request: FinderRequest) -> Result<Found> {
        let name = request.underscored();
        if request.mode == FinderMode::FindOrCreateBy && request.glue.contains(&Glue::Or) {
            return Err(Error::config("Cannot use OR'd attributes in find_or_create_by"));
        }

        let alias = &self.table.config().alias;
        let conditions =
            conditions_from_underscored(self.table.conn(), &name, &request.args, Some(alias))
                .ok_or_else(|| Error::config("Dynamic finder requires at least one attribute"))?;
        let mut options = self.prepare(request.options);
        self.merge_conditions(&mut options, conditions);

        tracing::debug!(class = %self.table.class_name, mode = ?request.mode, fields = %name, "Dynamic finder");
        match request.mode {
            FinderMode::FindBy => self.first(options).map(Found::One),
            FinderMode::FindAllBy => self.all(options).map(Found::Many),
            FinderMode::CountBy => self.count(options).map(Found::Count),
            FinderMode::FindOrCreateBy => match self.first(options)? {
                Some(record) => Ok(Found::One(Some(record))),
                None => {
                    let attributes = hash_from_underscored(&name, &request.args, Some(alias));
                    self.create(attributes, true).map(|r| Found::One(Some(r)))
                }
            },
        }
    }
}

fn with_limit_and_order(mut sql: SqlBuilder, options: &FindOptions) -> SqlBuilder {
    if let Some(limit) = options.limit {
        sql = sql.limit(limit);
    }
    if let Some(order) = &options.order {
        sql = sql.order(order.clone());
    }
    sql
}
