//! Lifecycle callbacks.
//!
//! Each model owns a [`CallbackRegistry`]: an ordered list of callables per
//! [`Hook`]. Callables are either named model methods (declared on the
//! [`ModelConfig`](crate::ModelConfig)) or closures.
//!
//! Invoking `before_create`/`before_update` first runs the `before_save`
//! chain, and `after_create`/`after_update` first run `after_save`. A before
//! hook returning [`Flow::Halt`] stops the chain and the invoke reports
//! `false`; after hooks never stop the chain.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use activerow_core::{Error, Result};
use indexmap::IndexMap;

use crate::record::Record;

/// Result of a callback: keep going or stop the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halt,
}

impl From<bool> for Flow {
    fn from(proceed: bool) -> Self {
        if proceed { Self::Continue } else { Self::Halt }
    }
}

impl From<()> for Flow {
    fn from((): ()) -> Self {
        Self::Continue
    }
}

/// A callable run against a record.
pub type CallbackFn = Arc<dyn Fn(&mut Record) -> Result<Flow> + Send + Sync>;

/// Wrap a closure as a [`CallbackFn`].
pub fn callback<F, R>(f: F) -> CallbackFn
where
    F: Fn(&mut Record) -> Result<R> + Send + Sync + 'static,
    R: Into<Flow>,
{
    Arc::new(move |record: &mut Record| f(record).map(Into::into))
}

/// Lifecycle points a callback can be registered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    AfterConstruct,
    BeforeSave,
    AfterSave,
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeValidation,
    AfterValidation,
    BeforeValidationOnCreate,
    AfterValidationOnCreate,
    BeforeValidationOnUpdate,
    AfterValidationOnUpdate,
    BeforeDestroy,
    AfterDestroy,
}

impl Hook {
    /// Every hook, in registration order.
    pub const ALL: [Hook; 15] = [
        Hook::AfterConstruct,
        Hook::BeforeSave,
        Hook::AfterSave,
        Hook::BeforeCreate,
        Hook::AfterCreate,
        Hook::BeforeUpdate,
        Hook::AfterUpdate,
        Hook::BeforeValidation,
        Hook::AfterValidation,
        Hook::BeforeValidationOnCreate,
        Hook::AfterValidationOnCreate,
        Hook::BeforeValidationOnUpdate,
        Hook::AfterValidationOnUpdate,
        Hook::BeforeDestroy,
        Hook::AfterDestroy,
    ];

    /// The hook's snake_case name (also the implicit method name).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AfterConstruct => "after_construct",
            Self::BeforeSave => "before_save",
            Self::AfterSave => "after_save",
            Self::BeforeCreate => "before_create",
            Self::AfterCreate => "after_create",
            Self::BeforeUpdate => "before_update",
            Self::AfterUpdate => "after_update",
            Self::BeforeValidation => "before_validation",
            Self::AfterValidation => "after_validation",
            Self::BeforeValidationOnCreate => "before_validation_on_create",
            Self::AfterValidationOnCreate => "after_validation_on_create",
            Self::BeforeValidationOnUpdate => "before_validation_on_update",
            Self::AfterValidationOnUpdate => "after_validation_on_update",
            Self::BeforeDestroy => "before_destroy",
            Self::AfterDestroy => "after_destroy",
        }
    }

    /// Parse a hook name.
    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|h| h.as_str() == name)
            .ok_or_else(|| Error::config(format!("Invalid callback: {name}")))
    }

    /// Whether a `false` result from this hook halts the pipeline.
    pub const fn is_before(self) -> bool {
        matches!(
            self,
            Self::BeforeSave
                | Self::BeforeCreate
                | Self::BeforeUpdate
                | Self::BeforeValidation
                | Self::BeforeValidationOnCreate
                | Self::BeforeValidationOnUpdate
                | Self::BeforeDestroy
        )
    }

    /// The generic save hook folded ahead of this one, if any.
    pub const fn save_counterpart(self) -> Option<Hook> {
        match self {
            Self::BeforeCreate | Self::BeforeUpdate => Some(Self::BeforeSave),
            Self::AfterCreate | Self::AfterUpdate => Some(Self::AfterSave),
            _ => None,
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to register on a hook.
#[derive(Clone)]
pub enum CallbackDef {
    /// A method declared on the model config.
    Method(String),
    /// An anonymous callable.
    Closure(CallbackFn),
}

impl fmt::Debug for CallbackDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Method(name) => f.debug_tuple("Method").field(name).finish(),
            Self::Closure(_) => f.write_str("Closure(..)"),
        }
    }
}

impl From<&str> for CallbackDef {
    fn from(name: &str) -> Self {
        Self::Method(name.to_string())
    }
}

impl From<String> for CallbackDef {
    fn from(name: String) -> Self {
        Self::Method(name)
    }
}

impl From<CallbackFn> for CallbackDef {
    fn from(f: CallbackFn) -> Self {
        Self::Closure(f)
    }
}

/// A callback declared on a model config, checked when the registry is built.
#[derive(Debug, Clone)]
pub struct CallbackDecl {
    pub hook: String,
    pub def: CallbackDef,
}

#[derive(Clone)]
struct Entry {
    label: String,
    func: CallbackFn,
}

/// Ordered callbacks per hook for one model.
#[derive(Clone)]
pub struct CallbackRegistry {
    class: String,
    methods: IndexMap<String, CallbackFn>,
    registry: HashMap<Hook, Vec<Entry>>,
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hooks: Vec<_> = self
            .registry
            .iter()
            .map(|(hook, entries)| {
                (
                    hook.as_str(),
                    entries.iter().map(|e| e.label.as_str()).collect::<Vec<_>>(),
                )
            })
            .collect();
        hooks.sort_by_key(|(name, _)| *name);
        f.debug_struct("CallbackRegistry")
            .field("class", &self.class)
            .field("hooks", &hooks)
            .finish()
    }
}

impl CallbackRegistry {
    /// Build the registry for `class`.
    ///
    /// Declared callbacks are registered in declaration order. A hook with no
    /// declaration gets the model method of the same name, when one exists.
    pub fn new(
        class: impl Into<String>,
        methods: IndexMap<String, CallbackFn>,
        declared: &[CallbackDecl],
    ) -> Result<Self> {
        let mut registry = Self {
            class: class.into(),
            methods,
            registry: HashMap::new(),
        };

        for decl in declared {
            Hook::parse(&decl.hook)?;
        }

        for hook in Hook::ALL {
            let explicit: Vec<&CallbackDecl> = declared
                .iter()
                .filter(|d| d.hook == hook.as_str())
                .collect();
            if explicit.is_empty() {
                if registry.methods.contains_key(hook.as_str()) {
                    registry.register(hook.as_str(), None, false)?;
                }
            } else {
                for decl in explicit {
                    registry.register(hook.as_str(), Some(decl.def.clone()), false)?;
                }
            }
        }
        Ok(registry)
    }

    /// Register a callback on hook `name`. With no definition the method named
    /// after the hook is used. `prepend` puts it at the front of the chain.
    pub fn register(&mut self, name: &str, def: Option<CallbackDef>, prepend: bool) -> Result<()> {
        let hook = Hook::parse(name)?;
        let def = def.unwrap_or_else(|| CallbackDef::Method(name.to_string()));

        let entry = match def {
            CallbackDef::Closure(func) => Entry {
                label: "<closure>".to_string(),
                func,
            },
            CallbackDef::Method(method) => {
                let func = self.methods.get(&method).cloned().ok_or_else(|| {
                    Error::config(format!("Unknown method for callback: {name}: #{method}"))
                })?;
                Entry {
                    label: method,
                    func,
                }
            }
        };

        let chain = self.registry.entry(hook).or_default();
        if prepend {
            chain.insert(0, entry);
        } else {
            chain.push(entry);
        }
        Ok(())
    }

    /// Labels registered on `hook` (method names, `<closure>` for closures).
    pub fn callbacks(&self, hook: Hook) -> Option<Vec<&str>> {
        self.registry
            .get(&hook)
            .map(|entries| entries.iter().map(|e| e.label.as_str()).collect())
    }

    /// Run the chain for `hook` against `record`.
    ///
    /// Returns `Ok(false)` when a before hook halts. With `must_exist` a hook
    /// with nothing registered is an error.
    pub fn invoke(&self, record: &mut Record, hook: Hook, must_exist: bool) -> Result<bool> {
        if must_exist && !self.registry.contains_key(&hook) {
            return Err(Error::config(format!(
                "No callbacks were defined for: {hook} on {}",
                self.class
            )));
        }

        let mut chain: Vec<&Entry> = Vec::new();
        if let Some(save) = hook.save_counterpart() {
            chain.extend(self.registry.get(&save).into_iter().flatten());
        }
        chain.extend(self.registry.get(&hook).into_iter().flatten());

        for entry in chain {
            let flow = (entry.func)(record)?;
            if flow == Flow::Halt && hook.is_before() {
                tracing::debug!(
                    class = %self.class,
                    hook = %hook,
                    callback = %entry.label,
                    "Callback halted the pipeline"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }
}
