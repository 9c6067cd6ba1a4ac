//! Error types shared by every ActiveRow layer.

use thiserror::Error;

/// Errors raised by ActiveRow.
///
/// Validation failures and before-hook aborts are not represented here: those
/// paths return `Ok(false)` from the write operation instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Misconfiguration or misuse detected at the call site (unknown option
    /// keys, invalid callbacks, missing connection, missing primary key...).
    #[error("{0}")]
    Config(String),

    /// A primary-key lookup matched fewer rows than requested.
    #[error("{0}")]
    RecordNotFound(String),

    /// One or more attribute names could not be resolved on a model.
    #[error("{}", undefined_property_message(.class, .names))]
    UndefinedProperty { class: String, names: Vec<String> },

    /// A write was attempted on an instance flagged read-only.
    #[error("{class}::{method}() cannot be invoked because this model is set to read only")]
    ReadOnly { class: String, method: String },

    /// The underlying connection reported a failure.
    #[error("Database error {code}: {message}")]
    Database { code: String, message: String },

    /// Parameter markers could not be matched with bind values.
    #[error("{0}")]
    Expressions(String),

    /// An undeclared relationship was requested, or a relationship target is invalid.
    #[error("{0}")]
    Relationship(String),

    /// A has-many-through relationship names an unusable intermediate association.
    #[error("{0}")]
    HasManyThrough(String),

    /// A validator was declared with unusable options.
    #[error("{0}")]
    ValidationsArgument(String),
}

impl Error {
    /// Shorthand for [`Error::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Shorthand for [`Error::Database`].
    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build an undefined-property error for a single name.
    pub fn undefined_property(class: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UndefinedProperty {
            class: class.into(),
            names: vec![name.into()],
        }
    }

    /// Whether this error is a [`Error::RecordNotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound(_))
    }
}

fn undefined_property_message(class: &str, names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!("Undefined property: {class}->{name}"))
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// Result alias used throughout ActiveRow.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_property_joins_every_name() {
        let err = Error::UndefinedProperty {
            class: "Author".to_string(),
            names: vec!["foo".to_string(), "bar".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Undefined property: Author->foo\r\nUndefined property: Author->bar"
        );
    }

    #[test]
    fn test_read_only_message_names_class_and_method() {
        let err = Error::ReadOnly {
            class: "Author".to_string(),
            method: "save".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Author::save() cannot be invoked because this model is set to read only"
        );
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::RecordNotFound("x".into()).is_not_found());
        assert!(!Error::config("x").is_not_found());
    }
}
