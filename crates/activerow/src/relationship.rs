//! Associations between models.
//!
//! A [`Relationship`] is declared on the owning model's
//! [`ModelConfig`](crate::ModelConfig). Keys follow naming conventions unless
//! overridden:
//!
//! - `belongs_to :author` on `Book`: foreign key `author_id` on `books`,
//!   matched against the primary key of `authors`.
//! - `has_many :books` on `Author`: foreign key `author_id` on `books`,
//!   matched against the owner's primary key.
//! - `has_many :hosts, through: :events` on `Venue`: `hosts` joined with
//!   `events`, filtered on `events.venue_id`.

use std::sync::Arc;

use activerow_core::{Connection, Error, Result, Value, inflector};
use activerow_query::{Conditions, FindOptions, Joins, conditions_from_underscored};

use crate::record::{Record, Related};
use crate::registry::Registry;
use crate::table::Table;

/// The kind of association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    /// The foreign key lives on the owner's table.
    BelongsTo,
    /// One record whose foreign key points at the owner.
    HasOne,
    /// Many records whose foreign key points at the owner.
    HasMany,
}

/// Association metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    /// Attribute name the association is read through.
    pub name: String,
    pub kind: RelationshipKind,
    /// Target model; inferred from the name when absent.
    pub class_name: Option<String>,
    pub foreign_key: Vec<String>,
    /// Owner key for has_many/has_one. Ignored for belongs_to.
    pub primary_key: Vec<String>,
    pub conditions: Option<Conditions>,
    pub select: Option<String>,
    pub order: Option<String>,
    pub group: Option<String>,
    pub having: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub readonly: Option<bool>,
    /// Intermediate association, declared on the target model.
    pub through: Option<String>,
    /// Target model of a through association, when the name does not imply it.
    pub source: Option<String>,
}

impl Relationship {
    fn new(name: &str, kind: RelationshipKind) -> Self {
        Self {
            name: inflector::variablize(name),
            kind,
            class_name: None,
            foreign_key: Vec::new(),
            primary_key: Vec::new(),
            conditions: None,
            select: None,
            order: None,
            group: None,
            having: None,
            limit: None,
            offset: None,
            readonly: None,
            through: None,
            source: None,
        }
    }

    pub fn belongs_to(name: &str) -> Self {
        Self::new(name, RelationshipKind::BelongsTo)
    }

    pub fn has_many(name: &str) -> Self {
        Self::new(name, RelationshipKind::HasMany)
    }

    pub fn has_one(name: &str) -> Self {
        Self::new(name, RelationshipKind::HasOne)
    }

    #[must_use]
    pub fn class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    #[must_use]
    pub fn foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = vec![key.into()];
        self
    }

    #[must_use]
    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = vec![key.into()];
        self
    }

    #[must_use]
    pub fn conditions(mut self, conditions: impl Into<Conditions>) -> Self {
        self.conditions = Some(conditions.into());
        self
    }

    #[must_use]
    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    #[must_use]
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    #[must_use]
    pub fn having(mut self, having: impl Into<String>) -> Self {
        self.having = Some(having.into());
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = Some(readonly);
        self
    }

    #[must_use]
    pub fn through(mut self, through: impl Into<String>) -> Self {
        self.through = Some(through.into());
        self
    }

    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Whether the association holds a list.
    pub fn is_poly(&self) -> bool {
        self.kind == RelationshipKind::HasMany
    }

    fn through_name(&self) -> Option<&str> {
        match self.kind {
            RelationshipKind::BelongsTo => None,
            _ => self.through.as_deref(),
        }
    }

    /// Class of the associated model.
    pub fn target_class(&self) -> String {
        if let Some(class) = &self.class_name {
            return class.clone();
        }
        if let (Some(_), Some(source)) = (self.through_name(), &self.source) {
            return source.clone();
        }
        inflector::classify(&self.name, self.kind != RelationshipKind::BelongsTo)
    }

    /// Foreign key column(s) for an owner of class `owner_class`.
    pub fn foreign_keys(&self, owner_class: &str) -> Vec<String> {
        if !self.foreign_key.is_empty() {
            return self.foreign_key.clone();
        }
        match self.kind {
            RelationshipKind::BelongsTo => vec![inflector::keyify(&self.target_class())],
            _ => vec![inflector::keyify(owner_class)],
        }
    }

    /// Key column(s) the foreign key refers to: the target's primary key for
    /// belongs_to, the owner's (or the override) otherwise.
    pub fn primary_keys(&self, registry: &Registry, owner: &Table) -> Result<Vec<String>> {
        match self.kind {
            RelationshipKind::BelongsTo => {
                let class = self.target_class();
                let target = registry.table(&class)?;
                let pk = target.pk.first().ok_or_else(|| {
                    Error::Relationship(format!(
                        "Relationship {} requires a primary key on {class}",
                        self.name
                    ))
                })?;
                Ok(vec![pk.clone()])
            }
            _ if !self.primary_key.is_empty() => Ok(self.primary_key.clone()),
            _ => Ok(owner.pk.clone()),
        }
    }

    /// The declared options that apply to finders for this kind.
    pub fn finder_options(&self) -> FindOptions {
        let mut options = FindOptions {
            conditions: self.conditions.clone(),
            select: self.select.clone(),
            readonly: self.readonly,
            ..FindOptions::default()
        };
        if self.kind != RelationshipKind::BelongsTo {
            options.order = self.order.clone();
            options.group = self.group.clone();
            options.having = self.having.clone();
            options.limit = self.limit;
            options.offset = self.offset;
        }
        options
    }

    /// Load the association for `owner`.
    ///
    /// No query is issued when every owner key value is null.
    pub fn load(&self, registry: &Arc<Registry>, owner: &Record) -> Result<Related> {
        let owner_table = owner.table();
        let fk = self.foreign_keys(&owner_table.class_name);
        let pk = self.primary_keys(registry, owner_table)?;
        let (condition_keys, value_keys) = match self.kind {
            RelationshipKind::BelongsTo => (pk, fk.iter().map(|k| inflector::variablize(k)).collect()),
            _ => (fk, pk),
        };

        let Some(conditions) =
            self.conditions_from_keys(owner_table.conn(), owner, &condition_keys, &value_keys)
        else {
            return Ok(self.empty());
        };

        let mut options = self.finder_options();
        options.conditions = Some(conditions);
        if self.through_name().is_some() {
            options.joins = Some(Joins::Raw(self.through_join(registry, &owner_table.class_name)?));
        }

        let model = registry.model(&self.target_class())?;
        if self.is_poly() {
            Ok(Related::Many(model.all(options)?))
        } else {
            Ok(Related::One(model.first(options)?.map(Box::new)))
        }
    }

    fn conditions_from_keys(
        &self,
        conn: &Arc<dyn Connection>,
        owner: &Record,
        condition_keys: &[String],
        value_keys: &[String],
    ) -> Option<Conditions> {
        let values: Vec<Value> = value_keys
            .iter()
            .map(|k| owner.attributes().get(k).cloned().unwrap_or_default())
            .collect();
        if values.iter().all(Value::is_null) {
            return None;
        }
        let keys = conditions_from_underscored(conn, &condition_keys.join("_and_"), &values, None)?;
        Some(match &self.conditions {
            Some(declared) => declared.clone().and(keys, Some(Arc::clone(conn))),
            None => keys,
        })
    }

    /// The empty value for this association's cardinality.
    pub fn empty(&self) -> Related {
        if self.is_poly() {
            Related::Many(Vec::new())
        } else {
            Related::One(None)
        }
    }

    /// The intermediate association of a through relationship, checked.
    pub(crate) fn through_relationship(
        &self,
        registry: &Registry,
        owner_class: &str,
    ) -> Result<Relationship> {
        let through = self.through_name().unwrap_or_default();
        let target = self.target_class();
        let missing = || {
            Error::HasManyThrough(format!(
                "Could not find the association {through} in model {owner_class}"
            ))
        };
        let target_config = registry.model_config(&target).ok_or_else(missing)?;
        let rel = target_config.find_relationship(through).ok_or_else(missing)?;
        if rel.kind == RelationshipKind::HasOne {
            return Err(Error::HasManyThrough(
                "has_many through can only use a belongs_to or has_many association".to_string(),
            ));
        }
        Ok(rel.clone())
    }

    /// JOIN from the target table to the through table, keyed on the
    /// target's primary key.
    pub fn through_join(&self, registry: &Registry, owner_class: &str) -> Result<String> {
        let through = self.through_relationship(registry, owner_class)?;
        let target_class = self.target_class();
        let target = registry.table(&target_class)?;
        let through_table = registry.table(&through.target_class())?;
        let target_pk = target.pk.first().cloned().unwrap_or_default();
        Ok(format!(
            "INNER JOIN {through_fq} ON({target_fq}.{target_pk} = {through_fq}.{key})",
            through_fq = through_table.fully_qualified_name(true),
            target_fq = target.fully_qualified_name(true),
            key = inflector::keyify(&target_class),
        ))
    }

    /// `INNER JOIN` clause joining this association onto `from`, optionally
    /// under `alias`.
    pub fn construct_inner_join_sql(
        &self,
        registry: &Registry,
        from: &Table,
        alias: Option<&str>,
    ) -> Result<String> {
        let join_table = registry.table(&self.target_class())?;
        let join_name = join_table.fully_qualified_name(true);
        let from_name = from.fully_qualified_name(true);

        let fk = self.foreign_keys(&from.class_name);
        let pk = self.primary_keys(registry, from)?;
        let first = |keys: &[String]| keys.first().cloned().unwrap_or_default();
        let (foreign_key, join_primary_key) = match self.kind {
            RelationshipKind::BelongsTo => (first(&fk), first(&pk)),
            _ => (first(&pk), first(&fk)),
        };

        let (aliased, alias_sql) = match alias {
            Some(alias) => {
                let quoted = from.conn().quote_name(alias);
                (quoted.clone(), format!("{quoted} "))
            }
            None => (join_name.clone(), String::new()),
        };
        Ok(format!(
            "INNER JOIN {join_name} {alias_sql}ON({from_name}.{foreign_key} = {aliased}.{join_primary_key})"
        ))
    }
}
