//! Core types and traits for ActiveRow.
//!
//! `activerow-core` is the foundation layer of the workspace. It defines the
//! data types and the driver contract every other crate builds on.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: [`Connection`] is the only way ActiveRow reaches a
//!   database. Drivers implement the round-trip methods; dialect-dependent
//!   behavior defaults to [`Dialect`].
//! - **Data model**: [`Value`], [`Row`] and [`Column`] represent bind values,
//!   result rows and schema metadata.
//! - **Naming**: the [`inflector`] module holds the class/table/key naming
//!   conventions.
//! - **Testing**: [`MockConnection`] answers queries from scripted rows and
//!   records the SQL it receives.
//!
//! # Who Uses This Crate
//!
//! - `activerow-query` renders SQL against a `Connection` using `Value` binds.
//! - `activerow` builds models, relationships and persistence on top of both.
//!
//! Most applications should use the `activerow` facade.

pub mod column;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod inflector;
pub mod mock;
pub mod row;
pub mod validate;
pub mod value;

pub use column::{Column, ColumnType};
pub use connection::Connection;
pub use dialect::Dialect;
pub use error::{Error, Result};
pub use mock::{MockConnection, Statement, StatementKind, TxEvent};
pub use row::Row;
pub use validate::{is_integer_literal, is_numeric, matches_pattern, validate_pattern};
pub use value::Value;
