//! Finder options.
//!
//! [`FindOptions`] is the options bag accepted by every finder. It is built
//! fluently in code or deserialized from JSON; the recognized keys are exactly
//! those in [`VALID_OPTIONS`].

use activerow_core::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};

use crate::conditions::Conditions;

/// Keys accepted in a serialized options document.
pub const VALID_OPTIONS: [&str; 11] = [
    "conditions",
    "limit",
    "offset",
    "order",
    "select",
    "joins",
    "include",
    "readonly",
    "group",
    "from",
    "having",
];

/// JOIN clause input.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Joins {
    /// Literal SQL appended after the FROM clause.
    Raw(String),
    /// Entries are relationship names, or literal SQL when they contain `JOIN `.
    List(Vec<String>),
}

/// A relationship to eager load, with optional nested includes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    pub name: String,
    pub nested: Vec<Include>,
}

impl Include {
    /// Include `name` with no nested relationships.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nested: Vec::new(),
        }
    }

    /// Add a nested include, loaded on the records of this relationship.
    #[must_use]
    pub fn with(mut self, nested: impl Into<Include>) -> Self {
        self.nested.push(nested.into());
        self
    }
}

impl From<&str> for Include {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Include {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

fn includes_from_json(value: &serde_json::Value) -> std::result::Result<Vec<Include>, String> {
    match value {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::String(name) => Ok(vec![Include::new(name.as_str())]),
        serde_json::Value::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                out.extend(includes_from_json(item)?);
            }
            Ok(out)
        }
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(name, nested)| {
                Ok(Include {
                    name: name.clone(),
                    nested: includes_from_json(nested)?,
                })
            })
            .collect(),
        other => Err(format!("invalid include entry: {other}")),
    }
}

fn deserialize_includes<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<Include>, D::Error> {
    let raw = serde_json::Value::deserialize(deserializer)?;
    includes_from_json(&raw).map_err(serde::de::Error::custom)
}

/// Options accepted by finders.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FindOptions {
    pub conditions: Option<Conditions>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub order: Option<String>,
    pub select: Option<String>,
    pub joins: Option<Joins>,
    #[serde(deserialize_with = "deserialize_includes")]
    pub include: Vec<Include>,
    pub readonly: Option<bool>,
    pub group: Option<String>,
    pub from: Option<String>,
    pub having: Option<String>,
    /// Alias → column map applied to hash conditions. Filled in by the model.
    #[serde(skip)]
    pub mapped_names: IndexMap<String, String>,
}

impl FindOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a JSON object.
    ///
    /// # Errors
    ///
    /// Unknown keys are reported together as `Unknown key(s): a, b`.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("Invalid options: {e}")))?;
        let serde_json::Value::Object(map) = &raw else {
            return Err(Error::config("Options must be a JSON object"));
        };
        let unknown: Vec<&str> = map
            .keys()
            .map(String::as_str)
            .filter(|k| !VALID_OPTIONS.contains(k))
            .collect();
        if !unknown.is_empty() {
            return Err(Error::config(format!("Unknown key(s): {}", unknown.join(", "))));
        }
        serde_json::from_value(raw).map_err(|e| Error::config(format!("Invalid options: {e}")))
    }

    #[must_use]
    pub fn conditions(mut self, conditions: impl Into<Conditions>) -> Self {
        self.conditions = Some(conditions.into());
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
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    #[must_use]
    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    /// Literal JOIN SQL.
    #[must_use]
    pub fn joins_sql(mut self, joins: impl Into<String>) -> Self {
        self.joins = Some(Joins::Raw(joins.into()));
        self
    }

    /// Join by relationship names (or literal JOIN fragments).
    #[must_use]
    pub fn joins<I, S>(mut self, joins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.joins = Some(Joins::List(joins.into_iter().map(Into::into).collect()));
        self
    }

    /// Eager load a relationship.
    #[must_use]
    pub fn include(mut self, include: impl Into<Include>) -> Self {
        self.include.push(include.into());
        self
    }

    #[must_use]
    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = Some(readonly);
        self
    }

    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Override the FROM table.
    #[must_use]
    pub fn from_table(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    #[must_use]
    pub fn having(mut self, having: impl Into<String>) -> Self {
        self.having = Some(having.into());
        self
    }

    /// Whether any condition is set.
    pub fn has_conditions(&self) -> bool {
        self.conditions.as_ref().is_some_and(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use activerow_core::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fluent_options() {
        let opts = FindOptions::new()
            .conditions(Conditions::sql_with("id=?", vec![Value::Int(1)]))
            .order("name")
            .limit(5)
            .include(Include::new("books").with("publisher"));
        assert_eq!(opts.limit, Some(5));
        assert_eq!(opts.include[0].nested, vec![Include::new("publisher")]);
        assert!(opts.has_conditions());
    }

    #[test]
    fn test_from_json() {
        let opts = FindOptions::from_json(
            r#"{"conditions": ["name=?", "Tito"], "limit": 2, "include": ["author", {"books": ["publisher"]}], "readonly": true}"#,
        )
        .unwrap();
        assert_eq!(
            opts.conditions,
            Some(Conditions::sql_with("name=?", vec![Value::from("Tito")]))
        );
        assert_eq!(opts.limit, Some(2));
        assert_eq!(opts.readonly, Some(true));
        assert_eq!(
            opts.include,
            vec![
                Include::new("author"),
                Include::new("books").with("publisher")
            ]
        );
    }

    #[test]
    fn test_from_json_joins_forms() {
        let raw = FindOptions::from_json(r#"{"joins": "INNER JOIN x ON(1=1)"}"#).unwrap();
        assert_eq!(raw.joins, Some(Joins::Raw("INNER JOIN x ON(1=1)".into())));
        let list = FindOptions::from_json(r#"{"joins": ["author"]}"#).unwrap();
        assert_eq!(list.joins, Some(Joins::List(vec!["author".into()])));
    }

    #[test]
    fn test_from_json_rejects_unknown_keys() {
        let err = FindOptions::from_json(r#"{"conditions": "x=1", "sort": "a", "bogus": 1}"#)
            .unwrap_err();
        assert_eq!(err, Error::config("Unknown key(s): bogus, sort"));
    }

    #[test]
    fn test_from_json_requires_object() {
        assert!(FindOptions::from_json("[1,2]").is_err());
    }
}
