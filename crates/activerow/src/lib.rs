//! ActiveRecord-style object-relational mapping.
//!
//! `activerow` is the facade crate. Models are described with a
//! [`ModelConfig`], registered with a [`RegistryBuilder`], and used through
//! [`Model`] (class-level finders) and [`Record`] (one row).
//!
//! # Role In The Architecture
//!
//! - **Registry**: [`Registry`] owns connections, model descriptors and the
//!   table and column metadata caches.
//! - **Metadata**: [`Table`] resolves names, keys and sequences and is the
//!   only place SQL reaches a connection.
//! - **Records**: [`Record`] implements attribute resolution, dirty
//!   tracking, mass assignment, persistence and validation.
//! - **Associations**: [`Relationship`] loads belongs_to / has_one /
//!   has_many (optionally through another association), lazily or eagerly.
//! - **Lifecycle**: [`CallbackRegistry`] runs hooks; [`Validation`] rules
//!   fill an [`Errors`] collection.
//!
//! # Example
//!
//! ```ignore
//! use activerow::prelude::*;
//!
//! let registry = Registry::builder()
//!     .connection("development", conn)
//!     .model(ModelConfig::new("Author").relationship(Relationship::has_many("books")))
//!     .model(
//!         ModelConfig::new("Book")
//!             .relationship(Relationship::belongs_to("author"))
//!             .validates(Validation::presence_of(["name"])),
//!     )
//!     .build()?;
//!
//! let authors = registry.model("Author")?;
//! let mut author = authors.create(row! { "name" => "Tito" }.into_map(), true)?;
//! let book = author.create_association("books", row! { "name" => "Ancient Art" }.into_map())?;
//! let with_books = authors.all(FindOptions::new().include("books"))?;
//! ```

pub mod callback;
pub mod config;
mod eager;
pub mod errors;
pub mod finder;
pub mod model;
pub mod n1_detection;
mod persistence;
pub mod record;
pub mod registry;
pub mod relationship;
pub mod table;
pub mod transaction;
pub mod validation;

pub use callback::{CallbackDecl, CallbackDef, CallbackFn, CallbackRegistry, Flow, Hook, callback};
pub use config::Config;
pub use errors::{DEFAULT_ERROR_MESSAGES, Errors, default_message};
pub use finder::{Assignments, Find, FinderMode, FinderRequest, Found, Model};
pub use model::{Delegate, Getter, ModelConfig, Setter, ValidateFn, getter, setter};
pub use n1_detection::{CallSite, N1QueryTracker, N1Stats};
pub use record::{Property, Record, Related};
pub use registry::{Registry, RegistryBuilder};
pub use relationship::{Relationship, RelationshipKind};
pub use table::Table;
pub use transaction::TxOutcome;
pub use validation::{LengthOptions, NumericalityOptions, Validation, ValidationKind};

pub use activerow_core::{
    Column, ColumnType, Connection, Dialect, Error, MockConnection, Result, Row, Statement,
    StatementKind, TxEvent, Value, inflector, row,
};
pub use activerow_query::{
    Conditions, Expression, FindOptions, Glue, Include, Joins, SqlBuilder,
    conditions_from_underscored, hash_from_underscored,
};

/// Common imports.
pub mod prelude {
    pub use crate::{
        Conditions, Connection, Delegate, Error, Find, FindOptions, FinderMode, FinderRequest,
        Flow, Found, Hook, Include, Model, ModelConfig, Record, Registry, Related, Relationship,
        Result, Row, TxOutcome, Validation, Value, callback, getter, row, setter,
    };
}
