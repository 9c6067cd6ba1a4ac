//! Model registry.
//!
//! The [`Registry`] is the process-wide home of everything ActiveRow caches:
//! model descriptors, connections, compiled callback chains, [`Table`]
//! metadata and column metadata. It is built once with a [`RegistryBuilder`]
//! and shared behind an `Arc`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use activerow_core::{Column, Connection, Error, Result};
use indexmap::IndexMap;

use crate::callback::{CallbackDef, CallbackRegistry, callback};
use crate::config::Config;
use crate::finder::Model;
use crate::model::ModelConfig;
use crate::n1_detection::{N1QueryTracker, N1Stats};
use crate::relationship::RelationshipKind;
use crate::table::Table;

/// Collects configuration, connections and models for a [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    config: Config,
    connections: IndexMap<String, Arc<dyn Connection>>,
    models: Vec<ModelConfig>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Register a named connection.
    #[must_use]
    pub fn connection(mut self, name: impl Into<String>, conn: Arc<dyn Connection>) -> Self {
        self.connections.insert(name.into(), conn);
        self
    }

    #[must_use]
    pub fn model(mut self, model: ModelConfig) -> Self {
        self.models.push(model);
        self
    }

    /// Check every descriptor and build the registry.
    ///
    /// # Errors
    ///
    /// - a class registered twice
    /// - an invalid callback name or a callback naming an unknown method
    /// - a relationship whose target is not a registered model
    /// - a through relationship whose intermediate association is missing or
    ///   is a has_one
    pub fn build(self) -> Result<Arc<Registry>> {
        let mut models: IndexMap<String, Arc<ModelConfig>> = IndexMap::new();
        for model in self.models {
            if models.contains_key(&model.class_name) {
                return Err(Error::config(format!(
                    "Model {} is registered more than once",
                    model.class_name
                )));
            }
            models.insert(model.class_name.clone(), Arc::new(model));
        }

        let mut callbacks = HashMap::new();
        for (class, model) in &models {
            callbacks.insert(class.clone(), Arc::new(compile_callbacks(model)?));
        }

        let registry = Registry {
            config: self.config,
            connections: self.connections,
            models,
            callbacks,
            tables: RwLock::new(HashMap::new()),
            columns: RwLock::new(HashMap::new()),
            n1: Mutex::new(N1QueryTracker::new()),
        };
        registry.check_relationships()?;

        tracing::debug!(
            models = registry.models.len(),
            connections = registry.connections.len(),
            "Built model registry"
        );
        Ok(Arc::new(registry))
    }
}

/// The model's callbacks plus the built-in timestamp and dirty-reset hooks,
/// which run ahead of everything else on their hook.
fn compile_callbacks(model: &ModelConfig) -> Result<CallbackRegistry> {
    let mut methods = model.methods.clone();
    methods
        .entry("set_timestamps".to_string())
        .or_insert_with(|| callback(|record| record.set_timestamps()));
    methods.entry("reset_dirty".to_string()).or_insert_with(|| {
        callback(|record| {
            record.reset_dirty();
            Ok(())
        })
    });

    let mut registry = CallbackRegistry::new(&model.class_name, methods, &model.callbacks)?;
    registry.register("before_save", Some(CallbackDef::from("set_timestamps")), true)?;
    registry.register("after_save", Some(CallbackDef::from("reset_dirty")), true)?;
    Ok(registry)
}

/// Shared model state. See the module docs.
pub struct Registry {
    config: Config,
    connections: IndexMap<String, Arc<dyn Connection>>,
    models: IndexMap<String, Arc<ModelConfig>>,
    callbacks: HashMap<String, Arc<CallbackRegistry>>,
    tables: RwLock<HashMap<String, Arc<Table>>>,
    columns: RwLock<HashMap<String, Arc<IndexMap<String, Column>>>>,
    n1: Mutex<N1QueryTracker>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("connections", &self.connections.keys().collect::<Vec<_>>())
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Descriptor for `class`.
    pub fn model_config(&self, class: &str) -> Option<&Arc<ModelConfig>> {
        self.models.get(class)
    }

    /// Class-level handle (finders, create, transactions) for `class`.
    pub fn model(self: &Arc<Self>, class: &str) -> Result<Model> {
        Ok(Model::new(Arc::clone(self), self.table(class)?))
    }

    /// Named connection.
    pub fn connection(&self, name: &str) -> Result<Arc<dyn Connection>> {
        self.connections
            .get(name)
            .cloned()
            .ok_or_else(|| Error::config(format!("Connection named {name} is not configured")))
    }

    /// Table metadata for `class`, loaded on first use.
    pub fn table(&self, class: &str) -> Result<Arc<Table>> {
        if let Some(table) = read(&self.tables).get(class) {
            return Ok(Arc::clone(table));
        }

        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(table) = tables.get(class) {
            return Ok(Arc::clone(table));
        }
        let config = self
            .models
            .get(class)
            .ok_or_else(|| Error::config(format!("Model {class} is not registered")))?;
        let callbacks = self
            .callbacks
            .get(class)
            .cloned()
            .ok_or_else(|| Error::config(format!("Model {class} is not registered")))?;
        let table = Arc::new(Table::load(self, Arc::clone(config), callbacks)?);
        tables.insert(class.to_string(), Arc::clone(&table));
        Ok(table)
    }

    /// Column metadata for a table, fetched from the connection once per
    /// `(connection, table)`.
    pub(crate) fn columns_for(
        &self,
        conn_name: &str,
        conn: &Arc<dyn Connection>,
        table_name: &str,
    ) -> Result<Arc<IndexMap<String, Column>>> {
        let key = format!("{conn_name}:{table_name}");
        if let Some(columns) = read(&self.columns).get(&key) {
            return Ok(Arc::clone(columns));
        }

        let mut cache = self.columns.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(columns) = cache.get(&key) {
            return Ok(Arc::clone(columns));
        }
        let columns: IndexMap<String, Column> = conn
            .columns(table_name)?
            .into_iter()
            .map(|c| (c.inflected_name.clone(), c))
            .collect();
        let columns = Arc::new(columns);
        cache.insert(key, Arc::clone(&columns));
        Ok(columns)
    }

    /// Drop cached table metadata for `class`, or everything (including
    /// column metadata) when `None`.
    pub fn clear_cache(&self, class: Option<&str>) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        match class {
            Some(class) => {
                tables.remove(class);
            }
            None => {
                tables.clear();
                self.columns
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clear();
            }
        }
    }

    /// Record a lazy relationship load.
    #[track_caller]
    pub(crate) fn record_lazy_load(&self, class: &str, relationship: &str) {
        self.n1_tracker().record_load(class, relationship);
    }

    /// Lazy-load statistics.
    pub fn n1_stats(&self) -> N1Stats {
        self.n1_tracker().stats()
    }

    /// Forget recorded lazy loads.
    pub fn reset_n1_stats(&self) {
        self.n1_tracker().reset();
    }

    /// Lock the lazy-load tracker.
    pub fn n1_tracker(&self) -> MutexGuard<'_, N1QueryTracker> {
        self.n1.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_relationships(&self) -> Result<()> {
        for model in self.models.values() {
            for rel in &model.relationships {
                let target = rel.target_class();
                if !self.models.contains_key(&target) {
                    return Err(Error::Relationship(format!(
                        "'{target}' must be a registered model"
                    )));
                }
                if rel.kind != RelationshipKind::BelongsTo && rel.through.is_some() {
                    rel.through_relationship(self, &model.class_name)?;
                }
            }
        }
        Ok(())
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}
