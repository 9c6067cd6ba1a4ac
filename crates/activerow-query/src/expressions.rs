//! Parameterized SQL fragments.
//!
//! An [`Expression`] pairs a template containing `?` markers with positional
//! values. Rendering expands every array-valued marker into a comma list
//! (`IN(?)` with three values becomes `IN(?,?,?)`) and flattens the values in
//! marker order. Markers inside single-quoted literals are left alone.

use std::sync::Arc;

use activerow_core::{Connection, Error, Result, Value};
use indexmap::IndexMap;

/// The positional parameter marker.
pub const PARAMETER_MARKER: char = '?';

/// A SQL fragment with positional bind values.
#[derive(Debug, Clone)]
pub struct Expression {
    template: String,
    values: Vec<Value>,
    connection: Option<Arc<dyn Connection>>,
}

impl Expression {
    /// Create an expression from a template and its values.
    pub fn new(template: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            template: template.into(),
            values,
            connection: None,
        }
    }

    /// Build `name=?` / `name IN(?)` / `name IS ?` terms from a hash, joined by
    /// `glue`. Names are quoted when a connection is supplied.
    pub fn from_hash(
        hash: &IndexMap<String, Value>,
        glue: &str,
        connection: Option<Arc<dyn Connection>>,
    ) -> Self {
        let terms: Vec<String> = hash
            .iter()
            .map(|(name, value)| {
                let name = connection
                    .as_ref()
                    .map_or_else(|| name.clone(), |c| c.quote_name(name));
                match value {
                    Value::Array(_) => format!("{name} IN(?)"),
                    Value::Null => format!("{name} IS ?"),
                    _ => format!("{name}=?"),
                }
            })
            .collect();
        Self {
            template: terms.join(glue),
            values: hash.values().cloned().collect(),
            connection,
        }
    }

    /// Attach a connection used for name quoting and literal escaping.
    #[must_use]
    pub fn with_connection(mut self, connection: Arc<dyn Connection>) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Bind `value` to the 1-based marker `position`, replacing any existing
    /// value there. Intermediate positions are filled with null.
    pub fn bind(&mut self, position: usize, value: impl Into<Value>) -> Result<()> {
        if position == 0 {
            return Err(Error::Expressions(format!(
                "Invalid parameter index: {position}"
            )));
        }
        if self.values.len() < position {
            self.values.resize(position, Value::Null);
        }
        self.values[position - 1] = value.into();
        Ok(())
    }

    /// The raw template.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Values as given (array values not flattened).
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Values flattened in marker order. An empty array binds a single null.
    pub fn flattened_values(&self) -> Vec<Value> {
        flatten(&self.values)
    }

    /// Render the marker-expanded template.
    pub fn to_sql(&self) -> Result<String> {
        self.render(&self.values, false)
    }

    /// Render with values inlined as literals. For logging only; never execute
    /// the result.
    pub fn substitute(&self) -> Result<String> {
        self.render(&self.values, true)
    }

    /// Like [`Expression::substitute`] but inlining `values` instead of the bound ones.
    pub fn substitute_with(&self, values: &[Value]) -> Result<String> {
        self.render(values, true)
    }

    fn render(&self, values: &[Value], substitute: bool) -> Result<String> {
        let mut out = String::with_capacity(self.template.len());
        let mut quotes = 0usize;
        let mut index = 0usize;
        let mut prev: Option<char> = None;

        for ch in self.template.chars() {
            if ch == PARAMETER_MARKER {
                if quotes % 2 == 0 {
                    let value = values.get(index).ok_or_else(|| {
                        Error::Expressions(format!("No bound parameter for index {index}"))
                    })?;
                    out.push_str(&self.render_value(value, substitute));
                    index += 1;
                } else {
                    out.push(ch);
                }
            } else {
                if ch == '\'' && prev != Some('\\') {
                    quotes += 1;
                }
                out.push(ch);
            }
            prev = Some(ch);
        }
        Ok(out)
    }

    fn render_value(&self, value: &Value, substitute: bool) -> String {
        match value {
            Value::Array(items) if items.is_empty() => {
                if substitute {
                    "NULL".to_string()
                } else {
                    PARAMETER_MARKER.to_string()
                }
            }
            Value::Array(items) => {
                if substitute {
                    items
                        .iter()
                        .map(|v| self.literal(v))
                        .collect::<Vec<_>>()
                        .join(",")
                } else {
                    vec![PARAMETER_MARKER.to_string(); items.len()].join(",")
                }
            }
            other if substitute => self.literal(other),
            _ => PARAMETER_MARKER.to_string(),
        }
    }

    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Int(_) | Value::Double(_) | Value::Bool(_) => value.to_string(),
            other => {
                let text = other.to_string();
                match &self.connection {
                    Some(conn) => conn.escape(&text),
                    None => format!("'{}'", text.replace('\'', "''")),
                }
            }
        }
    }
}

/// Flatten array values into individual binds; an empty array binds null.
pub fn flatten(values: &[Value]) -> Vec<Value> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        match value {
            Value::Array(items) if items.is_empty() => out.push(Value::Null),
            Value::Array(items) => out.extend(items.iter().cloned()),
            other => out.push(other.clone()),
        }
    }
    out
}
