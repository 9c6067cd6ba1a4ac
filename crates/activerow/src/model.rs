//! Per-model configuration descriptors.
//!
//! A [`ModelConfig`] carries everything a model declares about itself: table
//! and key overrides, attribute aliases, mass-assignment lists, delegates,
//! relationships, callbacks, validators and accessors. Descriptors are handed
//! to a [`RegistryBuilder`](crate::RegistryBuilder) which checks them once.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use activerow_core::{Result, Value, inflector};
use indexmap::IndexMap;

use crate::callback::{CallbackDecl, CallbackDef, CallbackFn};
use crate::record::Record;
use crate::relationship::Relationship;
use crate::validation::Validation;

/// Computed attribute read, consulted before the attribute map.
pub type Getter = Arc<dyn Fn(&mut Record) -> Result<Value> + Send + Sync>;

/// Attribute write hook, consulted before the attribute map.
pub type Setter = Arc<dyn Fn(&mut Record, Value) -> Result<()> + Send + Sync>;

/// Free-form validation run after the declared validators.
pub type ValidateFn = Arc<dyn Fn(&mut Record) -> Result<()> + Send + Sync>;

/// Wrap a closure as a [`Getter`].
pub fn getter<F>(f: F) -> Getter
where
    F: Fn(&mut Record) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`Setter`].
pub fn setter<F>(f: F) -> Setter
where
    F: Fn(&mut Record, Value) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Attributes forwarded to a singular association.
///
/// With a prefix the attributes are reachable as `{prefix}_{name}` only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegate {
    pub to: String,
    pub prefix: Option<String>,
    pub attributes: Vec<String>,
}

impl Delegate {
    pub fn new<I, S>(to: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            to: to.into(),
            prefix: None,
            attributes: attributes
                .into_iter()
                .map(|a| a.into().to_lowercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into()).filter(|p| !p.is_empty());
        self
    }

    /// The delegated attribute `name` refers to, if any.
    pub fn resolve(&self, name: &str) -> Option<String> {
        let bare = match &self.prefix {
            Some(prefix) => name.strip_prefix(prefix.as_str())?.strip_prefix('_')?,
            None => name,
        };
        self.attributes
            .iter()
            .any(|a| a == bare)
            .then(|| bare.to_string())
    }
}

/// Declarative description of one model class.
#[derive(Clone)]
pub struct ModelConfig {
    pub class_name: String,
    pub table: Option<String>,
    pub db: Option<String>,
    pub primary_key: Vec<String>,
    pub sequence: Option<String>,
    pub connection: Option<String>,
    pub alias: IndexMap<String, String>,
    pub accessible: Vec<String>,
    pub protected: Vec<String>,
    pub delegates: Vec<Delegate>,
    pub relationships: Vec<Relationship>,
    pub callbacks: Vec<CallbackDecl>,
    pub methods: IndexMap<String, CallbackFn>,
    pub getters: HashMap<String, Getter>,
    pub setters: HashMap<String, Setter>,
    pub validations: Vec<Validation>,
    pub validate: Option<ValidateFn>,
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut getters: Vec<&String> = self.getters.keys().collect();
        getters.sort();
        let mut setters: Vec<&String> = self.setters.keys().collect();
        setters.sort();
        f.debug_struct("ModelConfig")
            .field("class_name", &self.class_name)
            .field("table", &self.table)
            .field("db", &self.db)
            .field("primary_key", &self.primary_key)
            .field("sequence", &self.sequence)
            .field("connection", &self.connection)
            .field("alias", &self.alias)
            .field("accessible", &self.accessible)
            .field("protected", &self.protected)
            .field("delegates", &self.delegates)
            .field("relationships", &self.relationships)
            .field("callbacks", &self.callbacks)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("getters", &getters)
            .field("setters", &setters)
            .field("validations", &self.validations)
            .field("validate", &self.validate.is_some())
            .finish()
    }
}

impl ModelConfig {
    /// Configuration for `class_name` with every convention left at its default.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            table: None,
            db: None,
            primary_key: Vec::new(),
            sequence: None,
            connection: None,
            alias: IndexMap::new(),
            accessible: Vec::new(),
            protected: Vec::new(),
            delegates: Vec::new(),
            relationships: Vec::new(),
            callbacks: Vec::new(),
            methods: IndexMap::new(),
            getters: HashMap::new(),
            setters: HashMap::new(),
            validations: Vec::new(),
            validate: None,
        }
    }

    /// Table name: the override, else the tableized class name.
    pub fn table_name(&self) -> String {
        self.table
            .clone()
            .unwrap_or_else(|| inflector::tableize(&self.class_name))
    }

    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    pub fn db(mut self, db: impl Into<String>) -> Self {
        self.db = Some(db.into());
        self
    }

    #[must_use]
    pub fn primary_key(mut self, pk: impl Into<String>) -> Self {
        self.primary_key = vec![pk.into()];
        self
    }

    #[must_use]
    pub fn primary_keys<I, S>(mut self, pk: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = pk.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn sequence(mut self, sequence: impl Into<String>) -> Self {
        self.sequence = Some(sequence.into());
        self
    }

    /// Named connection; the registry default is used otherwise.
    #[must_use]
    pub fn connection(mut self, name: impl Into<String>) -> Self {
        self.connection = Some(name.into());
        self
    }

    /// Expose attribute `column` under the name `alias`.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>, column: impl Into<String>) -> Self {
        self.alias.insert(alias.into(), column.into());
        self
    }

    /// Attributes allowed through guarded mass assignment.
    #[must_use]
    pub fn accessible<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accessible.extend(names.into_iter().map(Into::into));
        self
    }

    /// Attributes dropped by guarded mass assignment.
    #[must_use]
    pub fn protected<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected.extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn delegate(mut self, delegate: Delegate) -> Self {
        self.delegates.push(delegate);
        self
    }

    #[must_use]
    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Register the named method on `hook`.
    #[must_use]
    pub fn callback(mut self, hook: impl Into<String>, method: impl Into<String>) -> Self {
        self.callbacks.push(CallbackDecl {
            hook: hook.into(),
            def: CallbackDef::Method(method.into()),
        });
        self
    }

    /// Register a closure on `hook`.
    #[must_use]
    pub fn callback_fn(mut self, hook: impl Into<String>, f: CallbackFn) -> Self {
        self.callbacks.push(CallbackDecl {
            hook: hook.into(),
            def: CallbackDef::Closure(f),
        });
        self
    }

    /// Declare a model method callbacks can refer to by name. A method named
    /// after a hook is registered on that hook unless the hook is declared
    /// explicitly.
    #[must_use]
    pub fn method(mut self, name: impl Into<String>, f: CallbackFn) -> Self {
        self.methods.insert(name.into(), f);
        self
    }

    #[must_use]
    pub fn getter(mut self, name: impl Into<String>, f: Getter) -> Self {
        self.getters.insert(name.into(), f);
        self
    }

    #[must_use]
    pub fn setter(mut self, name: impl Into<String>, f: Setter) -> Self {
        self.setters.insert(name.into(), f);
        self
    }

    #[must_use]
    pub fn validates(mut self, validation: Validation) -> Self {
        self.validations.push(validation);
        self
    }

    /// Custom validation, run after the declared validators.
    #[must_use]
    pub fn validate_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Record) -> Result<()> + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(f));
        self
    }

    /// Look up a declared relationship.
    pub fn find_relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }
}
