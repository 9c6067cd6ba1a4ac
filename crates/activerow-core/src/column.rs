//! Column metadata and value casting.
//!
//! A [`Column`] describes one physical column as reported by
//! [`Connection::columns`](crate::Connection::columns). Columns are built once
//! per table when its metadata is first loaded and never change afterwards.

use chrono::{NaiveDate, NaiveDateTime};

use crate::inflector;
use crate::value::{DATE_FORMAT, DATETIME_FORMAT, Value};

/// Declared type families a raw SQL type maps onto.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Text and anything unmapped.
    #[default]
    String,
    /// Integral numbers.
    Integer,
    /// Fractional numbers.
    Decimal,
    /// Date and time.
    DateTime,
    /// Calendar date.
    Date,
    /// Time of day (left uncast).
    Time,
}

impl ColumnType {
    /// Map a raw (driver-reported) type name onto a type family.
    pub fn from_raw(raw_type: &str) -> Self {
        match raw_type.trim().to_lowercase().as_str() {
            "int" | "integer" | "tinyint" | "smallint" | "mediumint" | "bigint" => Self::Integer,
            "float" | "double" | "numeric" | "decimal" | "dec" | "real" => Self::Decimal,
            "datetime" | "timestamp" => Self::DateTime,
            "date" => Self::Date,
            "time" => Self::Time,
            _ => Self::String,
        }
    }
}

/// Metadata for a single table column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Name as the database reports it.
    pub name: String,
    /// Attribute name used on model instances.
    pub inflected_name: String,
    /// Raw type, lower-cased and without length suffix (e.g. `"varchar"`).
    pub raw_type: String,
    /// Type family derived from `raw_type`.
    pub column_type: ColumnType,
    /// Declared length, when the type carried one.
    pub length: Option<u32>,
    /// Whether NULL is accepted.
    pub nullable: bool,
    /// Part of the primary key.
    pub pk: bool,
    /// Values are generated by the database on insert.
    pub auto_increment: bool,
    /// Default value, already cast to `column_type`.
    pub default: Value,
}

impl Column {
    /// Create a nullable, non-key column from a name and raw SQL type such as
    /// `"varchar(255)"` or `"INTEGER"`.
    #[must_use]
    pub fn new(name: impl Into<String>, raw_type: &str) -> Self {
        let name = name.into();
        let (raw, length) = split_raw_type(raw_type);
        let column_type = ColumnType::from_raw(&raw);
        let length = length.or(match column_type {
            ColumnType::DateTime => Some(19),
            ColumnType::Date => Some(10),
            _ => None,
        });
        Self {
            inflected_name: inflector::variablize(&name),
            name,
            raw_type: raw,
            column_type,
            length,
            nullable: true,
            pk: false,
            auto_increment: false,
            default: Value::Null,
        }
    }

    /// Mark as primary key (and NOT NULL).
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.pk = true;
        self.nullable = false;
        self
    }

    /// Mark as database-generated.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Mark as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the default value, casting it to the column type.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = self.cast(&value.into());
        self
    }

    /// Cast a value to this column's declared type.
    ///
    /// Values that cannot be represented in the declared type are returned as
    /// given so that validators can still report them.
    pub fn cast(&self, value: &Value) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        match self.column_type {
            ColumnType::String => match value {
                Value::Text(_) => value.clone(),
                Value::Array(_) => value.clone(),
                other => Value::Text(other.to_string()),
            },
            ColumnType::Integer => match value {
                Value::Int(_) => value.clone(),
                Value::Bool(b) => Value::Int(i64::from(*b)),
                #[allow(clippy::cast_possible_truncation)]
                Value::Double(f) => Value::Int(f.trunc() as i64),
                Value::Text(s) => match s.trim().parse::<i64>() {
                    Ok(i) => Value::Int(i),
                    #[allow(clippy::cast_possible_truncation)]
                    Err(_) => match s.trim().parse::<f64>() {
                        Ok(f) if f.is_finite() => Value::Int(f.trunc() as i64),
                        _ => value.clone(),
                    },
                },
                _ => value.clone(),
            },
            ColumnType::Decimal => match value {
                Value::Double(_) => value.clone(),
                Value::Int(i) => Value::Double(*i as f64),
                Value::Bool(b) => Value::Double(if *b { 1.0 } else { 0.0 }),
                Value::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map_or_else(|_| value.clone(), Value::Double),
                _ => value.clone(),
            },
            ColumnType::DateTime => match value {
                Value::DateTime(_) => value.clone(),
                Value::Date(d) => d.and_hms_opt(0, 0, 0).map_or(Value::Null, Value::DateTime),
                Value::Text(s) if s.trim().is_empty() => Value::Null,
                Value::Text(s) => parse_datetime(s.trim())
                    .map(Value::DateTime)
                    .or_else(|| parse_date(s.trim()).and_then(|d| d.and_hms_opt(0, 0, 0)).map(Value::DateTime))
                    .unwrap_or_else(|| value.clone()),
                _ => value.clone(),
            },
            ColumnType::Date => match value {
                Value::Date(_) => value.clone(),
                Value::DateTime(dt) => Value::Date(dt.date()),
                Value::Text(s) if s.trim().is_empty() => Value::Null,
                Value::Text(s) => parse_date(s.trim())
                    .or_else(|| parse_datetime(s.trim()).map(|dt| dt.date()))
                    .map_or_else(|| value.clone(), Value::Date),
                _ => value.clone(),
            },
            ColumnType::Time => value.clone(),
        }
    }
}

fn split_raw_type(raw_type: &str) -> (String, Option<u32>) {
    let normalized = raw_type.replace(['(', ')', ','], " ");
    let mut parts = normalized.split_whitespace();
    let raw = parts.next().unwrap_or_default().to_lowercase();
    let length = parts.next().and_then(|p| p.parse().ok());
    (raw, length)
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}
