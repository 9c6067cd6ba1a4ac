//! The database connection contract.
//!
//! ActiveRow never talks to a driver directly: everything goes through this
//! trait. Engine differences are expressed by [`Connection::dialect`], and every
//! dialect-dependent method has a default that delegates to it, so a driver
//! usually only implements the round-trip methods.

use std::fmt::Debug;

use crate::column::Column;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// A blocking database connection.
///
/// Implementations must be shareable across threads; interior mutability is
/// the implementation's concern. Transactions are scoped to the calling thread.
pub trait Connection: Send + Sync + Debug {
    /// SQL dialect spoken by this connection.
    fn dialect(&self) -> Dialect;

    /// Run a statement returning rows.
    fn query(&self, sql: &str, values: &[Value]) -> Result<Vec<Row>>;

    /// Run a statement returning the number of affected rows.
    fn execute(&self, sql: &str, values: &[Value]) -> Result<u64>;

    /// Column metadata for a (fully qualified) table name.
    fn columns(&self, table: &str) -> Result<Vec<Column>>;

    /// Key generated by the last INSERT (optionally read from a sequence).
    fn insert_id(&self, sequence: Option<&str>) -> Result<Value>;

    /// Begin a transaction.
    fn begin(&self) -> Result<()>;

    /// Commit the current transaction.
    fn commit(&self) -> Result<()>;

    /// Roll back the current transaction.
    fn rollback(&self) -> Result<()>;

    /// First column of the first row, if any.
    fn query_and_fetch_one(&self, sql: &str, values: &[Value]) -> Result<Option<Value>> {
        Ok(self
            .query(sql, values)?
            .into_iter()
            .next()
            .and_then(|row| row.first().cloned()))
    }

    /// Quote an identifier.
    fn quote_name(&self, name: &str) -> String {
        self.dialect().quote_name(name)
    }

    /// Quote a string literal.
    fn escape(&self, s: &str) -> String {
        self.dialect().escape(s)
    }

    /// Apply a row-limiting clause to a SELECT statement.
    fn limit(&self, sql: &str, offset: Option<u64>, limit: Option<u64>) -> String {
        self.dialect().limit(sql, offset, limit)
    }

    /// Whether generated keys come from sequences.
    fn supports_sequences(&self) -> bool {
        self.dialect().supports_sequences()
    }

    /// Default sequence name for a table's key column.
    fn sequence_name(&self, table: &str, column: &str) -> String {
        self.dialect().sequence_name(table, column)
    }

    /// SQL expression yielding the next value of `sequence`.
    fn next_sequence_value(&self, sequence: &str) -> String {
        self.dialect().next_sequence_value(sequence)
    }

    /// Whether the next sequence value must be fetched before inserting.
    fn preselects_sequence_values(&self) -> bool {
        self.dialect().preselects_sequence_values()
    }

    /// Fetch the next value of `sequence`.
    fn fetch_next_sequence_value(&self, sequence: &str) -> Result<Value> {
        let sql = self.dialect().next_sequence_query(sequence);
        Ok(self.query_and_fetch_one(&sql, &[])?.unwrap_or_default())
    }

    /// Whether UPDATE/DELETE accept ORDER BY and LIMIT.
    fn accepts_limit_and_order_for_update_and_delete(&self) -> bool {
        self.dialect().accepts_limit_and_order_for_update_and_delete()
    }
}
