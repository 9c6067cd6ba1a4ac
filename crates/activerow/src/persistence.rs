//! Saving, deleting and reloading records.

use std::sync::Arc;

use activerow_core::{Error, Result, Value, inflector};
use activerow_query::{Conditions, FindOptions};
use chrono::{Local, SubsecRound};
use indexmap::IndexMap;

use crate::callback::Hook;
use crate::errors::Errors;
use crate::record::{Record, Related};
use crate::relationship::{Relationship, RelationshipKind};
use crate::validation;

impl Record {
    // ========================================================================
    // Save / Delete
    // ========================================================================

    /// Insert or update the record. Returns `false` when validation fails
    /// or a before callback halts; nothing is written in that case.
    #[tracing::instrument(level = "debug", skip(self), fields(class = %self.table.class_name))]
    pub fn save(&mut self, validate: bool) -> Result<bool> {
        self.verify_not_readonly("save")?;
        if self.new_record {
            self.insert(validate)
        } else {
            self.update(validate)
        }
    }

    fn insert(&mut self, validate: bool) -> Result<bool> {
        self.verify_not_readonly("insert")?;
        if validate && !self.run_validations()? {
            return Ok(false);
        }
        if !self.invoke(Hook::BeforeCreate, false)? {
            return Ok(false);
        }

        let table = Arc::clone(&self.table);
        let conn = Arc::clone(table.conn());
        let mut attributes = self
            .dirty_attributes()
            .unwrap_or_else(|| self.attributes.clone());
        let pk = table.pk.first().cloned();
        let mut use_sequence = false;

        match (&table.sequence, &pk) {
            (Some(sequence), Some(pk)) if attributes.get(pk).is_none_or(Value::is_null) => {
                if conn.preselects_sequence_values() {
                    let id = conn.fetch_next_sequence_value(sequence)?;
                    attributes.insert(pk.clone(), id.clone());
                    table.insert(attributes, None, None)?;
                    self.attributes.insert(pk.clone(), id);
                } else {
                    attributes.shift_remove(pk);
                    table.insert(attributes, Some(pk), Some(sequence))?;
                    use_sequence = true;
                }
            }
            _ => {
                table.insert(attributes, None, None)?;
            }
        }

        if let Some(pk) = &pk {
            let column = table.column(pk);
            if use_sequence || column.is_some_and(|c| c.auto_increment) {
                let id = conn.insert_id(table.sequence.as_deref())?;
                let id = column.map_or_else(|| id.clone(), |c| c.cast(&id));
                self.attributes.insert(pk.clone(), id);
            }
        }

        self.new_record = false;
        self.invoke(Hook::AfterCreate, false)?;
        Ok(true)
    }

    fn update(&mut self, validate: bool) -> Result<bool> {
        self.verify_not_readonly("update")?;
        if validate && !self.run_validations()? {
            return Ok(false);
        }

        if self.is_dirty() {
            let pk = self.primary_key_values()?;
            if pk.is_empty() {
                return Err(Error::config(format!(
                    "Cannot update, no primary key defined for: {}",
                    self.table.class_name
                )));
            }
            if !self.invoke(Hook::BeforeUpdate, false)? {
                return Ok(false);
            }
            if let Some(dirty) = self.dirty_attributes() {
                self.table.update(dirty, pk)?;
            }
            self.invoke(Hook::AfterUpdate, false)?;
        }
        Ok(true)
    }

    /// Delete the row. Returns `false` when a before_destroy callback halts.
    #[tracing::instrument(level = "debug", skip(self), fields(class = %self.table.class_name))]
    pub fn delete(&mut self) -> Result<bool> {
        self.verify_not_readonly("delete")?;
        let pk = self.primary_key_values()?;
        if pk.is_empty() {
            return Err(Error::config(format!(
                "Cannot delete, no primary key defined for: {}",
                self.table.class_name
            )));
        }
        if !self.invoke(Hook::BeforeDestroy, false)? {
            return Ok(false);
        }
        self.table.delete(pk)?;
        self.invoke(Hook::AfterDestroy, false)?;
        Ok(true)
    }

    /// Re-read every attribute from the database and drop loaded
    /// associations.
    #[tracing::instrument(level = "debug", skip(self), fields(class = %self.table.class_name))]
    pub fn reload(&mut self) -> Result<()> {
        self.relationships.clear();
        let pk = self.primary_key_values()?;
        let ids: Vec<String> = pk.values().map(ToString::to_string).collect();
        let found = self
            .model()
            .first(FindOptions::new().conditions(Conditions::Hash(pk)))?
            .ok_or_else(|| {
                Error::RecordNotFound(format!(
                    "Couldn't find {} with ID={}",
                    self.table.class_name,
                    ids.join(",")
                ))
            })?;
        self.mass_assign(found.attributes, false)?;
        self.reset_dirty();
        Ok(())
    }

    /// Guarded mass assignment followed by a validating save.
    pub fn update_attributes(&mut self, attributes: IndexMap<String, Value>) -> Result<bool> {
        self.set_attributes(attributes)?;
        self.save(true)
    }

    /// Set one attribute and update without validating.
    pub fn update_attribute(&mut self, name: &str, value: impl Into<Value>) -> Result<bool> {
        self.set(name, value)?;
        self.update(false)
    }

    /// Stamp `updated_at`, and `created_at` on new records, when present.
    pub fn set_timestamps(&mut self) -> Result<()> {
        let now = Value::DateTime(Local::now().naive_local().trunc_subsecs(0));
        if self.attributes.contains_key("updated_at") {
            self.set("updated_at", now.clone())?;
        }
        if self.new_record && self.attributes.contains_key("created_at") {
            self.set("created_at", now)?;
        }
        Ok(())
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Run validations without saving.
    pub fn is_valid(&mut self) -> Result<bool> {
        self.run_validations()
    }

    pub fn is_invalid(&mut self) -> Result<bool> {
        self.run_validations().map(|valid| !valid)
    }

    fn run_validations(&mut self) -> Result<bool> {
        let (before_on, after_on) = if self.new_record {
            (Hook::BeforeValidationOnCreate, Hook::AfterValidationOnCreate)
        } else {
            (Hook::BeforeValidationOnUpdate, Hook::AfterValidationOnUpdate)
        };
        if !self.invoke(Hook::BeforeValidation, false)? || !self.invoke(before_on, false)? {
            return Ok(false);
        }

        let config = Arc::clone(self.table.config());
        let errors = validation::run(self, &config.validations)?;
        self.errors = Some(errors);
        if let Some(validate) = &config.validate {
            validate(self)?;
        }

        self.invoke(Hook::AfterValidation, false)?;
        self.invoke(after_on, false)?;
        Ok(self.errors.as_ref().is_none_or(Errors::is_empty))
    }

    // ========================================================================
    // Associations
    // ========================================================================

    fn association(&self, name: &str, method: &str) -> Result<Relationship> {
        self.table
            .relationship(name)
            .or_else(|| self.table.relationship(&inflector::pluralize(name)))
            .cloned()
            .ok_or_else(|| Error::config(format!("Call to undefined method: {method}_{name}")))
    }

    /// Build an unsaved associated record. has_many and has_one targets get
    /// the owner's key in their foreign key.
    pub fn build_association(
        &mut self,
        name: &str,
        attributes: IndexMap<String, Value>,
    ) -> Result<Record> {
        let rel = self.association(name, "build")?;
        self.related(&rel.name)?;

        let mut merged = IndexMap::new();
        if rel.kind != RelationshipKind::BelongsTo {
            let registry = Arc::clone(&self.registry);
            let fk = rel.foreign_keys(&self.table.class_name);
            let pk = rel.primary_keys(&registry, &self.table)?;
            if let (Some(fk), Some(pk)) = (fk.first(), pk.first()) {
                merged.insert(inflector::variablize(fk), self.get(pk)?);
            }
        }
        merged.extend(attributes);

        let target = self.registry.table(&rel.target_class())?;
        Record::build(Arc::clone(&self.registry), target, merged)
    }

    /// Build, save and attach an associated record.
    pub fn create_association(
        &mut self,
        name: &str,
        attributes: IndexMap<String, Value>,
    ) -> Result<Record> {
        let rel = self.association(name, "create")?;
        let mut record = self.build_association(&rel.name, attributes)?;
        record.save(true)?;

        match self.related_mut(&rel.name)? {
            Related::Many(records) => records.push(record.clone()),
            Related::One(slot) => *slot = Some(Box::new(record.clone())),
        }
        Ok(record)
    }
}
