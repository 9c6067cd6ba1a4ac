//! Parameterized SQL construction for ActiveRow.
//!
//! `activerow-query` sits between the core data types and the model layer. It
//! never executes anything; it only renders SQL text plus bind values.
//!
//! # Role In The Architecture
//!
//! - **Expressions**: [`Expression`] expands array binds into marker lists and
//!   can inline literals for logging.
//! - **Conditions**: [`Conditions`] is the WHERE input (hash or template), and
//!   [`conditions_from_underscored`] parses `id_and_name_or_z` style names.
//! - **Statements**: [`SqlBuilder`] renders SELECT/INSERT/UPDATE/DELETE for a
//!   table with dialect-specific limits delegated to the connection.
//! - **Options**: [`FindOptions`] is the finder options bag.

pub mod builder;
pub mod conditions;
pub mod expressions;
pub mod options;

pub use builder::{Operation, SqlBuilder};
pub use conditions::{
    Conditions, Glue, conditions_from_underscored, hash_from_underscored, split_underscored,
};
pub use expressions::{Expression, PARAMETER_MARKER, flatten};
pub use options::{FindOptions, Include, Joins, VALID_OPTIONS};
