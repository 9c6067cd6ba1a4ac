//! Fluent SQL statement builder.
//!
//! [`SqlBuilder`] renders SELECT, INSERT, UPDATE and DELETE statements for a
//! single table:
//! - WHERE from a column hash or a template with array expansion
//! - joins, grouping, HAVING and ordering
//! - dialect LIMIT/OFFSET through the connection
//! - sequence-backed primary keys on INSERT
//!
//! Builders are consumed by their fluent methods and rendered with
//! [`SqlBuilder::build`], which returns the SQL together with its flattened
//! bind values.

use std::sync::Arc;

use activerow_core::{Connection, Error, Result, Value};
use indexmap::IndexMap;

use crate::conditions::Conditions;
use crate::expressions::{Expression, flatten};

/// Statement kind being built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Operation {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
}

/// SET clause source for UPDATE statements.
#[derive(Debug, Clone, PartialEq)]
enum UpdateSet {
    Hash(IndexMap<String, Value>),
    Raw(String),
}

/// Builder for a single-table SQL statement.
///
/// # Example
///
/// ```ignore
/// let (sql, values) = SqlBuilder::new(Some(conn), "authors")?
///     .filter(Conditions::sql_with("id=? AND name IN(?)", vec![1.into(), names]))
///     .order("name")
///     .limit(10)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    connection: Arc<dyn Connection>,
    operation: Operation,
    table: String,
    select: String,
    joins: Option<String>,
    order: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    group: Option<String>,
    having: Option<String>,
    conditions: Option<Conditions>,
    insert: Option<IndexMap<String, Value>>,
    update: Option<UpdateSet>,
    sequence: Option<(String, String)>,
}

impl SqlBuilder {
    /// Create a SELECT builder for `table`.
    ///
    /// # Errors
    ///
    /// Fails when no connection is given.
    pub fn new(connection: Option<Arc<dyn Connection>>, table: impl Into<String>) -> Result<Self> {
        let connection = connection
            .ok_or_else(|| Error::config("A valid database connection is required."))?;
        Ok(Self {
            connection,
            operation: Operation::Select,
            table: table.into(),
            select: "*".to_string(),
            joins: None,
            order: None,
            limit: None,
            offset: None,
            group: None,
            having: None,
            conditions: None,
            insert: None,
            update: None,
            sequence: None,
        })
    }

    /// The statement kind currently configured.
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// Set WHERE conditions. Empty conditions clear the clause.
    #[must_use]
    pub fn filter(mut self, conditions: impl Into<Conditions>) -> Self {
        let conditions = conditions.into();
        self.conditions = (!conditions.is_empty()).then_some(conditions);
        self
    }

    /// Set WHERE conditions when `conditions` is `Some`.
    #[must_use]
    pub fn filter_opt(self, conditions: Option<Conditions>) -> Self {
        match conditions {
            Some(c) => self.filter(c),
            None => self,
        }
    }

    /// Set the ORDER BY clause.
    #[must_use]
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into()).filter(|o| !o.is_empty());
        self
    }

    /// Set the GROUP BY clause.
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into()).filter(|g| !g.is_empty());
        self
    }

    /// Set the HAVING clause.
    #[must_use]
    pub fn having(mut self, having: impl Into<String>) -> Self {
        self.having = Some(having.into()).filter(|h| !h.is_empty());
        self
    }

    /// Set the row limit.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the row offset.
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Switch to SELECT with the given column list.
    #[must_use]
    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.operation = Operation::Select;
        self.select = select.into();
        self
    }

    /// Set the raw JOIN clause.
    #[must_use]
    pub fn joins(mut self, joins: impl Into<String>) -> Self {
        self.joins = Some(joins.into()).filter(|j| !j.is_empty());
        self
    }

    /// Switch to INSERT of `data`. When both `pk` and `sequence` are given the
    /// key column is filled from the sequence.
    ///
    /// # Errors
    ///
    /// Fails when `data` is empty.
    pub fn insert(
        mut self,
        data: IndexMap<String, Value>,
        pk: Option<&str>,
        sequence: Option<&str>,
    ) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::config("Inserting requires a hash."));
        }
        self.operation = Operation::Insert;
        self.insert = Some(data);
        if let (Some(pk), Some(seq)) = (pk, sequence) {
            self.sequence = Some((pk.to_string(), seq.to_string()));
        }
        Ok(self)
    }

    /// Switch to UPDATE setting each column of `data`.
    ///
    /// # Errors
    ///
    /// Fails when `data` is empty.
    pub fn update(mut self, data: IndexMap<String, Value>) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::config("Updating requires a hash or string."));
        }
        self.operation = Operation::Update;
        self.update = Some(UpdateSet::Hash(data));
        Ok(self)
    }

    /// Switch to UPDATE with a raw SET clause.
    ///
    /// # Errors
    ///
    /// Fails when `set` is blank.
    pub fn update_raw(mut self, set: impl Into<String>) -> Result<Self> {
        let set = set.into();
        if set.trim().is_empty() {
            return Err(Error::config("Updating requires a hash or string."));
        }
        self.operation = Operation::Update;
        self.update = Some(UpdateSet::Raw(set));
        Ok(self)
    }

    /// Switch to DELETE, optionally replacing the WHERE conditions.
    #[must_use]
    pub fn delete(mut self, conditions: Option<Conditions>) -> Self {
        self.operation = Operation::Delete;
        self.filter_opt(conditions)
    }

    /// Render the statement and its bind values.
    ///
    /// Bind order is SET/VALUES data first, then WHERE values.
    pub fn build(&self) -> Result<(String, Vec<Value>)> {
        let sql = self.to_sql()?;
        let values = self.bind_values()?;
        tracing::trace!(sql = %sql, binds = values.len(), "Built SQL statement");
        Ok((sql, values))
    }

    /// Render only the SQL text.
    pub fn to_sql(&self) -> Result<String> {
        match self.operation {
            Operation::Select => self.build_select(),
            Operation::Insert => self.build_insert(),
            Operation::Update => self.build_update(),
            Operation::Delete => self.build_delete(),
        }
    }

    /// All bind values in marker order.
    pub fn bind_values(&self) -> Result<Vec<Value>> {
        let mut values = match (&self.insert, &self.update, self.operation) {
            (Some(data), _, Operation::Insert) => flatten(&data.values().cloned().collect::<Vec<_>>()),
            (_, Some(UpdateSet::Hash(data)), Operation::Update) => {
                flatten(&data.values().cloned().collect::<Vec<_>>())
            }
            _ => Vec::new(),
        };
        if self.operation != Operation::Insert {
            values.extend(self.where_values()?);
        }
        Ok(values)
    }

    /// The flattened WHERE values.
    pub fn where_values(&self) -> Result<Vec<Value>> {
        Ok(self.where_clause()?.map(|(_, v)| v).unwrap_or_default())
    }

    /// Reverse each term of an ORDER BY clause: ASC and DESC swap, terms
    /// without a direction gain ` DESC`. Blank input is returned as is.
    pub fn reverse_order(order: Option<&str>) -> Option<String> {
        let order = order?;
        if order.trim().is_empty() {
            return Some(order.to_string());
        }
        let parts: Vec<String> = order
            .split(',')
            .map(reverse_direction)
            .collect();
        Some(parts.join(","))
    }

    fn where_clause(&self) -> Result<Option<(String, Vec<Value>)>> {
        let Some(conditions) = &self.conditions else {
            return Ok(None);
        };
        let conn = Arc::clone(&self.connection);
        let expression = match conditions {
            Conditions::Hash(hash) if self.joins.is_some() => {
                let table = conn.quote_name(&self.table);
                let prefixed: IndexMap<String, Value> = hash
                    .iter()
                    .map(|(k, v)| (format!("{table}.{}", conn.quote_name(k)), v.clone()))
                    .collect();
                Expression::from_hash(&prefixed, " AND ", Some(conn))
            }
            Conditions::Hash(hash) => Expression::from_hash(hash, " AND ", Some(conn)),
            Conditions::Sql { sql, values } if !values.iter().any(Value::is_array) => {
                return Ok(Some((sql.clone(), values.clone())));
            }
            Conditions::Sql { sql, values } => {
                Expression::new(sql.clone(), values.clone()).with_connection(conn)
            }
        };
        Ok(Some((expression.to_sql()?, expression.flattened_values())))
    }

    fn quoted_key_names(data: &IndexMap<String, Value>, conn: &dyn Connection) -> Vec<String> {
        data.keys().map(|k| conn.quote_name(k)).collect()
    }

    fn build_select(&self) -> Result<String> {
        let mut sql = format!("SELECT {} FROM {}", self.select, self.table);
        if let Some(joins) = &self.joins {
            sql.push(' ');
            sql.push_str(joins);
        }
        if let Some((clause, _)) = self.where_clause()? {
            sql.push_str(&format!(" WHERE {clause}"));
        }
        if let Some(group) = &self.group {
            sql.push_str(&format!(" GROUP BY {group}"));
        }
        if let Some(having) = &self.having {
            sql.push_str(&format!(" HAVING {having}"));
        }
        if let Some(order) = &self.order {
            sql.push_str(&format!(" ORDER BY {order}"));
        }
        if self.limit.is_some_and(|l| l > 0) || self.offset.is_some_and(|o| o > 0) {
            sql = self.connection.limit(&sql, self.offset, self.limit);
        }
        Ok(sql)
    }

    fn build_insert(&self) -> Result<String> {
        let data = self
            .insert
            .as_ref()
            .ok_or_else(|| Error::config("Inserting requires a hash."))?;
        let conn = self.connection.as_ref();
        let keys = Self::quoted_key_names(data, conn).join(",");
        let markers = vec!["?"; flatten(&data.values().cloned().collect::<Vec<_>>()).len()].join(",");
        Ok(match &self.sequence {
            Some((pk, seq)) => format!(
                "INSERT INTO {}({keys},{}) VALUES({markers},{})",
                self.table,
                conn.quote_name(pk),
                conn.next_sequence_value(seq)
            ),
            None => format!("INSERT INTO {}({keys}) VALUES({markers})", self.table),
        })
    }

    fn build_update(&self) -> Result<String> {
        let set = match &self.update {
            Some(UpdateSet::Raw(set)) => set.clone(),
            Some(UpdateSet::Hash(data)) => {
                let names = Self::quoted_key_names(data, self.connection.as_ref());
                format!("{}=?", names.join("=?, "))
            }
            None => return Err(Error::config("Updating requires a hash or string.")),
        };
        let mut sql = format!("UPDATE {} SET {set}", self.table);
        if let Some((clause, _)) = self.where_clause()? {
            sql.push_str(&format!(" WHERE {clause}"));
        }
        Ok(self.apply_update_delete_limits(sql))
    }

    fn build_delete(&self) -> Result<String> {
        let mut sql = format!("DELETE FROM {}", self.table);
        if let Some((clause, _)) = self.where_clause()? {
            sql.push_str(&format!(" WHERE {clause}"));
        }
        Ok(self.apply_update_delete_limits(sql))
    }

    fn apply_update_delete_limits(&self, mut sql: String) -> String {
        if !self.connection.accepts_limit_and_order_for_update_and_delete() {
            return sql;
        }
        if let Some(order) = &self.order {
            sql.push_str(&format!(" ORDER BY {order}"));
        }
        if self.limit.is_some_and(|l| l > 0) {
            sql = self.connection.limit(&sql, None, self.limit);
        }
        sql
    }
}

/// Flip the trailing ASC/DESC token of one ORDER BY term, or append ` DESC`.
fn reverse_direction(part: &str) -> String {
    let body = part.trim_end();
    let trailing = &part[body.len()..];
    let last = body.rsplit(char::is_whitespace).next().unwrap_or(body);
    let head = &body[..body.len() - last.len()];
    if head.trim().is_empty() {
        return format!("{part} DESC");
    }
    let flipped = if last.eq_ignore_ascii_case("asc") {
        "DESC"
    } else if last.eq_ignore_ascii_case("desc") {
        "ASC"
    } else {
        return format!("{part} DESC");
    };
    format!("{head}{flipped}{trailing}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use activerow_core::{Dialect, MockConnection};
    use pretty_assertions::assert_eq;

    fn conn() -> Arc<dyn Connection> {
        Arc::new(MockConnection::default())
    }

    fn builder() -> SqlBuilder {
        SqlBuilder::new(Some(conn()), "authors").unwrap()
    }

    fn hash(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn test_requires_connection() {
        let err = SqlBuilder::new(None, "authors").unwrap_err();
        assert_eq!(err, Error::config("A valid database connection is required."));
    }

    #[test]
    fn test_nothing() {
        assert_eq!(builder().to_sql().unwrap(), "SELECT * FROM authors");
    }

    #[test]
    fn test_where_with_array() {
        let b = builder().filter(Conditions::sql_with(
            "id=? AND name IN(?)",
            vec![Value::Int(1), Value::from(vec!["Tito", "Mexican"])],
        ));
        assert_eq!(b.to_sql().unwrap(), "SELECT * FROM authors WHERE id=? AND name IN(?,?)");
        assert_eq!(
            b.where_values().unwrap(),
            vec![Value::Int(1), Value::from("Tito"), Value::from("Mexican")]
        );
    }

    #[test]
    fn test_where_with_hash_and_null() {
        let b = builder().filter(Conditions::Hash(hash(&[
            ("id", Value::Int(1)),
            ("name", Value::Null),
        ])));
        assert_eq!(b.to_sql().unwrap(), "SELECT * FROM authors WHERE `id`=? AND `name` IS ?");
        assert_eq!(b.where_values().unwrap(), vec![Value::Int(1), Value::Null]);
    }

    #[test]
    fn test_where_with_empty_conditions() {
        let b = builder().filter("");
        assert_eq!(b.to_sql().unwrap(), "SELECT * FROM authors");
    }

    #[test]
    fn test_clause_order() {
        let b = builder()
            .select("name, count(*) AS n")
            .filter("name IS NOT NULL")
            .group("name")
            .having("n > 1")
            .order("name")
            .limit(5)
            .offset(10);
        assert_eq!(
            b.to_sql().unwrap(),
            "SELECT name, count(*) AS n FROM authors WHERE name IS NOT NULL GROUP BY name HAVING n > 1 ORDER BY name LIMIT 10,5"
        );
    }

    #[test]
    fn test_hash_where_is_prefixed_when_joined() {
        let b = builder()
            .joins("INNER JOIN books ON(books.author_id = authors.id)")
            .filter(Conditions::Hash(hash(&[("id", Value::Int(1))])));
        assert_eq!(
            b.to_sql().unwrap(),
            "SELECT * FROM authors INNER JOIN books ON(books.author_id = authors.id) WHERE `authors`.`id`=?"
        );
    }

    #[test]
    fn test_insert() {
        let b = builder()
            .insert(hash(&[("id", Value::Int(1)), ("name", Value::from("Tito"))]), None, None)
            .unwrap();
        let (sql, values) = b.build().unwrap();
        assert_eq!(sql, "INSERT INTO authors(`id`,`name`) VALUES(?,?)");
        assert_eq!(values, vec![Value::Int(1), Value::from("Tito")]);
        assert!(builder().insert(IndexMap::new(), None, None).is_err());
    }

    #[test]
    fn test_insert_with_sequence() {
        let pg: Arc<dyn Connection> = Arc::new(MockConnection::new(Dialect::Postgres));
        let b = SqlBuilder::new(Some(pg), "authors")
            .unwrap()
            .insert(hash(&[("name", Value::from("Tito"))]), Some("id"), Some("authors_id_seq"))
            .unwrap();
        assert_eq!(
            b.to_sql().unwrap(),
            "INSERT INTO authors(\"name\",\"id\") VALUES(?,nextval('authors_id_seq'))"
        );
    }

    #[test]
    fn test_update_binds_data_then_where_values() {
        let b = builder()
            .update(hash(&[("id", Value::Int(1)), ("name", Value::from("Tito"))]))
            .unwrap()
            .filter(Conditions::sql_with(
                "id=1 AND name IN(?)",
                vec![Value::from(vec!["Tito", "Mexican"])],
            ));
        let (sql, values) = b.build().unwrap();
        assert_eq!(sql, "UPDATE authors SET `id`=?, `name`=? WHERE id=1 AND name IN(?,?)");
        assert_eq!(
            values,
            vec![
                Value::Int(1),
                Value::from("Tito"),
                Value::from("Tito"),
                Value::from("Mexican")
            ]
        );
    }

    #[test]
    fn test_update_with_limit_and_order() {
        let b = builder()
            .update(hash(&[("id", Value::Int(1))]))
            .unwrap()
            .order("name asc")
            .limit(1);
        assert_eq!(b.to_sql().unwrap(), "UPDATE authors SET `id`=? ORDER BY name asc LIMIT 1");

        let pg: Arc<dyn Connection> = Arc::new(MockConnection::new(Dialect::Postgres));
        let b = SqlBuilder::new(Some(pg), "authors")
            .unwrap()
            .update(hash(&[("id", Value::Int(1))]))
            .unwrap()
            .order("name asc")
            .limit(1);
        assert_eq!(b.to_sql().unwrap(), "UPDATE authors SET \"id\"=?");
    }

    #[test]
    fn test_update_with_raw_set() {
        let b = builder()
            .update_raw("name = UPPER(name)")
            .unwrap()
            .filter(Conditions::sql_with("id=?", vec![Value::Int(3)]));
        let (sql, values) = b.build().unwrap();
        assert_eq!(sql, "UPDATE authors SET name = UPPER(name) WHERE id=?");
        assert_eq!(values, vec![Value::Int(3)]);
    }

    #[test]
    fn test_delete() {
        let b = builder().delete(Some(Conditions::sql_with(
            "id=? or name in(?)",
            vec![Value::Int(1), Value::from(vec!["Tito", "Mexican"])],
        )));
        let (sql, values) = b.build().unwrap();
        assert_eq!(sql, "DELETE FROM authors WHERE id=? or name in(?,?)");
        assert_eq!(values.len(), 3);
        assert_eq!(builder().delete(None).to_sql().unwrap(), "DELETE FROM authors");
    }

    #[test]
    fn test_reverse_order() {
        let r = |s| SqlBuilder::reverse_order(Some(s));
        assert_eq!(r("id DESC, name ASC").as_deref(), Some("id ASC, name DESC"));
        assert_eq!(
            r("id DESC, name ASC , zzz DESC").as_deref(),
            Some("id ASC, name DESC , zzz ASC")
        );
        assert_eq!(r("id, name").as_deref(), Some("id DESC, name DESC"));
        assert_eq!(r("cascade ASC").as_deref(), Some("cascade DESC"));
        assert_eq!(r("description desc").as_deref(), Some("description ASC"));
        assert_eq!(r("ascent").as_deref(), Some("ascent DESC"));
        assert_eq!(r("").as_deref(), Some(""));
        assert_eq!(r(" ").as_deref(), Some(" "));
        assert_eq!(SqlBuilder::reverse_order(None), None);
    }
}
