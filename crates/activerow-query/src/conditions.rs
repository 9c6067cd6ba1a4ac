//! WHERE-clause inputs.
//!
//! Conditions come either as a column → value hash or as a SQL template with
//! positional values. Dynamic-finder style names (`id_and_name_or_z`) are
//! parsed into templates here as well.

use std::fmt;
use std::sync::Arc;

use activerow_core::{Connection, Value};
use indexmap::IndexMap;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};

use crate::expressions::Expression;

/// WHERE-clause conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Conditions {
    /// `column => value`; arrays become `IN(?)`, null becomes `IS ?`.
    Hash(IndexMap<String, Value>),
    /// Template with positional `?` values.
    Sql { sql: String, values: Vec<Value> },
}

impl Conditions {
    /// A bare SQL condition with no binds.
    pub fn sql(sql: impl Into<String>) -> Self {
        Self::Sql {
            sql: sql.into(),
            values: Vec::new(),
        }
    }

    /// A SQL template with bind values.
    pub fn sql_with(sql: impl Into<String>, values: Vec<Value>) -> Self {
        Self::Sql {
            sql: sql.into(),
            values,
        }
    }

    /// A hash condition from `(column, value)` pairs.
    pub fn hash<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Hash(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// True when there is nothing to filter on.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Hash(hash) => hash.is_empty(),
            Self::Sql { sql, .. } => sql.trim().is_empty(),
        }
    }

    /// Replace aliased hash keys with their real names.
    #[must_use]
    pub fn map_names(self, map: &IndexMap<String, String>) -> Self {
        match self {
            Self::Hash(hash) if !map.is_empty() => Self::Hash(
                hash.into_iter()
                    .map(|(name, value)| match map.get(&name) {
                        Some(real) => (real.clone(), value),
                        None => (name, value),
                    })
                    .collect(),
            ),
            other => other,
        }
    }

    /// Template/value form (hash keys quoted through `connection`).
    pub fn to_expression(&self, connection: Option<Arc<dyn Connection>>) -> Expression {
        match self {
            Self::Hash(hash) => Expression::from_hash(hash, " AND ", connection),
            Self::Sql { sql, values } => {
                let e = Expression::new(sql.clone(), values.clone());
                match connection {
                    Some(conn) => e.with_connection(conn),
                    None => e,
                }
            }
        }
    }

    /// AND-merge `extra` onto these conditions. Empty sides are dropped.
    #[must_use]
    pub fn and(self, extra: Conditions, connection: Option<Arc<dyn Connection>>) -> Conditions {
        if self.is_empty() {
            return extra;
        }
        if extra.is_empty() {
            return self;
        }
        let left = self.to_expression(connection.clone());
        let right = extra.to_expression(connection);
        let mut values = left.values().to_vec();
        values.extend_from_slice(right.values());
        Conditions::Sql {
            sql: format!("{} AND {}", left.template(), right.template()),
            values,
        }
    }
}

impl From<&str> for Conditions {
    fn from(sql: &str) -> Self {
        Self::sql(sql)
    }
}

impl From<String> for Conditions {
    fn from(sql: String) -> Self {
        Self::sql(sql)
    }
}

impl From<IndexMap<String, Value>> for Conditions {
    fn from(hash: IndexMap<String, Value>) -> Self {
        Self::Hash(hash)
    }
}

/// Boolean glue between two fields of an underscored name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glue {
    And,
    Or,
}

impl Glue {
    /// SQL rendering including surrounding spaces.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::And => " AND ",
            Self::Or => " OR ",
        }
    }

    /// Underscored rendering (`_and_` / `_or_`).
    pub const fn as_underscored(self) -> &'static str {
        match self {
            Self::And => "_and_",
            Self::Or => "_or_",
        }
    }
}

/// Split `id_and_name_or_z` into fields and the glue between them.
/// Matching of `_and_` / `_or_` is case-insensitive.
pub fn split_underscored(name: &str) -> (Vec<String>, Vec<Glue>) {
    let lower = name.to_ascii_lowercase();
    let mut fields = Vec::new();
    let mut glue = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < lower.len() {
        let rest = &lower[i..];
        let found = if rest.starts_with("_and_") {
            Some((Glue::And, 5))
        } else if rest.starts_with("_or_") {
            Some((Glue::Or, 4))
        } else {
            None
        };
        match found {
            Some((g, len)) if i > start => {
                fields.push(name[start..i].to_string());
                glue.push(g);
                i += len;
                start = i;
            }
            _ => i += rest.chars().next().map_or(1, char::len_utf8),
        }
    }
    fields.push(name[start..].to_string());
    (fields, glue)
}

/// Build conditions from an underscored field list.
///
/// Each field becomes `name=?`, `name IN(?)` for array values, or
/// `name IS NULL` when its positional value is missing or null (null values
/// are not bound). `map` translates aliased names before quoting. Returns
/// `None` for an empty name.
pub fn conditions_from_underscored(
    connection: &Arc<dyn Connection>,
    name: &str,
    values: &[Value],
    map: Option<&IndexMap<String, String>>,
) -> Option<Conditions> {
    if name.trim().is_empty() {
        return None;
    }
    let (fields, glue) = split_underscored(name);
    let mut sql = String::new();
    let mut binds = Vec::new();

    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            sql.push_str(glue[i - 1].as_sql());
        }
        let real = map.and_then(|m| m.get(field)).unwrap_or(field);
        sql.push_str(&connection.quote_name(real));
        match values.get(i) {
            Some(Value::Null) | None => sql.push_str(" IS NULL"),
            Some(v @ Value::Array(_)) => {
                sql.push_str(" IN(?)");
                binds.push(v.clone());
            }
            Some(v) => {
                sql.push_str("=?");
                binds.push(v.clone());
            }
        }
    }
    Some(Conditions::Sql { sql, values: binds })
}

/// Build a `name => value` hash from an underscored field list; missing values
/// are null and `map` translates aliased names.
pub fn hash_from_underscored(
    name: &str,
    values: &[Value],
    map: Option<&IndexMap<String, String>>,
) -> IndexMap<String, Value> {
    let (fields, _) = split_underscored(name);
    fields
        .into_iter()
        .enumerate()
        .map(|(i, field)| {
            let real = map
                .and_then(|m| m.get(&field))
                .cloned()
                .unwrap_or(field);
            (real, values.get(i).cloned().unwrap_or_default())
        })
        .collect()
}

// ============================================================================
// Serde
// ============================================================================

struct ConditionsVisitor;

impl<'de> Visitor<'de> for ConditionsVisitor {
    type Value = Conditions;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a SQL string, a [sql, values...] list, or a column hash")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Conditions, E> {
        Ok(Conditions::sql(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Conditions, A::Error> {
        let sql: String = seq
            .next_element()?
            .ok_or_else(|| de::Error::custom("conditions list must start with a SQL string"))?;
        let mut values = Vec::new();
        while let Some(value) = seq.next_element::<Value>()? {
            values.push(value);
        }
        Ok(Conditions::Sql { sql, values })
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Conditions, A::Error> {
        let mut hash = IndexMap::new();
        while let Some((k, v)) = map.next_entry::<String, Value>()? {
            hash.insert(k, v);
        }
        Ok(Conditions::Hash(hash))
    }
}

impl<'de> Deserialize<'de> for Conditions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ConditionsVisitor)
    }
}
