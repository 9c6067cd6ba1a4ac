//! Validation error collection.

use std::fmt;

use activerow_core::{Value, inflector};
use indexmap::IndexMap;

/// Default messages keyed by error kind.
pub const DEFAULT_ERROR_MESSAGES: [(&str, &str); 20] = [
    ("inclusion", "is not included in the list"),
    ("exclusion", "is reserved"),
    ("invalid", "is invalid"),
    ("confirmation", "doesn't match confirmation"),
    ("accepted", "must be accepted"),
    ("empty", "can't be empty"),
    ("blank", "can't be blank"),
    ("too_long", "is too long (maximum is %d characters)"),
    ("too_short", "is too short (minimum is %d characters)"),
    ("wrong_length", "is the wrong length (should be %d characters)"),
    ("taken", "has already been taken"),
    ("not_a_number", "is not a number"),
    ("greater_than", "must be greater than %d"),
    ("equal_to", "must be equal to %d"),
    ("less_than", "must be less than %d"),
    ("odd", "must be odd"),
    ("even", "must be even"),
    ("unique", "must be unique"),
    ("less_than_or_equal_to", "must be less than or equal to %d"),
    ("greater_than_or_equal_to", "must be greater than or equal to %d"),
];

/// Look up a default message. Unknown kinds fall back to `"is invalid"`.
pub fn default_message(kind: &str) -> &'static str {
    DEFAULT_ERROR_MESSAGES
        .iter()
        .find(|(k, _)| *k == kind)
        .map_or("is invalid", |(_, msg)| msg)
}

/// Messages recorded by one validation pass, grouped by attribute in the
/// order they were first reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Errors {
    errors: IndexMap<String, Vec<String>>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `msg` against `attribute` (default: `"is invalid"`).
    pub fn add(&mut self, attribute: &str, msg: Option<&str>) {
        let msg = msg.unwrap_or_else(|| default_message("invalid"));
        self.errors
            .entry(attribute.to_string())
            .or_default()
            .push(msg.to_string());
    }

    /// Add an error when `value` is empty (null, `""`, `"0"`, zero, `false`).
    pub fn add_on_empty(&mut self, attribute: &str, value: &Value, msg: Option<&str>) {
        if value.is_empty() {
            self.add(attribute, Some(msg.unwrap_or_else(|| default_message("empty"))));
        }
    }

    /// Add an error when `value` is null or the empty string.
    pub fn add_on_blank(&mut self, attribute: &str, value: &Value, msg: Option<&str>) {
        let blank = match value {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        };
        if blank {
            self.add(attribute, Some(msg.unwrap_or_else(|| default_message("blank"))));
        }
    }

    /// Messages recorded for `attribute`.
    pub fn on(&self, attribute: &str) -> Option<&[String]> {
        self.errors.get(attribute).map(Vec::as_slice)
    }

    /// Whether `attribute` has any message.
    pub fn is_invalid(&self, attribute: &str) -> bool {
        self.errors.contains_key(attribute)
    }

    /// Every message prefixed with its humanized attribute name.
    pub fn full_messages(&self) -> Vec<String> {
        self.iter()
            .map(|(attr, msg)| format!("{} {msg}", inflector::humanize(attr)))
            .collect()
    }

    /// Full messages grouped by attribute.
    pub fn to_map(&self) -> IndexMap<String, Vec<String>> {
        self.errors
            .iter()
            .map(|(attr, msgs)| {
                let human = inflector::humanize(attr);
                (
                    attr.clone(),
                    msgs.iter().map(|m| format!("{human} {m}")).collect(),
                )
            })
            .collect()
    }

    /// Total number of messages.
    pub fn len(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }

    /// `(attribute, message)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.errors
            .iter()
            .flat_map(|(attr, msgs)| msgs.iter().map(move |m| (attr.as_str(), m.as_str())))
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_messages().join("\n"))
    }
}
