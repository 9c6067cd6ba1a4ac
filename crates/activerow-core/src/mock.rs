//! In-memory scripted connection for tests.
//!
//! `MockConnection` records every statement it receives and answers queries
//! from scripted results, so the query, relationship and persistence layers
//! can be tested by asserting on the SQL they produce.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::column::Column;
use crate::connection::Connection;
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::row::Row;
use crate::value::Value;

/// How a statement reached the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Sent through [`Connection::query`].
    Query,
    /// Sent through [`Connection::execute`].
    Execute,
}

/// A statement captured by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text.
    pub sql: String,
    /// Bind values in marker order.
    pub values: Vec<Value>,
    /// Query or execute.
    pub kind: StatementKind,
}

/// Transaction boundary captured by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxEvent {
    Begin,
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
struct MockState {
    tables: HashMap<String, Vec<Column>>,
    queued: VecDeque<Vec<Row>>,
    stubs: Vec<(String, Vec<Row>)>,
    failures: Vec<(String, Error)>,
    tx_failures: HashMap<TxEvent, Error>,
    statements: Vec<Statement>,
    transactions: Vec<TxEvent>,
    next_insert_id: i64,
    last_insert_id: Option<i64>,
    affected_rows: Option<u64>,
    columns_calls: usize,
}

/// Scripted [`Connection`] implementation.
#[derive(Debug)]
pub struct MockConnection {
    dialect: Dialect,
    state: Mutex<MockState>,
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new(Dialect::Sqlite)
    }
}

impl MockConnection {
    /// Create a mock speaking `dialect`.
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            state: Mutex::new(MockState {
                next_insert_id: 1,
                ..MockState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare a table's columns (builder form).
    #[must_use]
    pub fn with_table(self, table: &str, columns: Vec<Column>) -> Self {
        self.define_table(table, columns);
        self
    }

    /// Declare a table's columns.
    pub fn define_table(&self, table: &str, columns: Vec<Column>) {
        self.state().tables.insert(table.to_string(), columns);
    }

    /// Queue a result set for the next query, ahead of any stub.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.state().queued.push_back(rows);
    }

    /// Answer every query whose SQL contains `needle` with `rows`. Later stubs
    /// take precedence over earlier ones.
    pub fn stub(&self, needle: &str, rows: Vec<Row>) {
        self.state().stubs.push((needle.to_string(), rows));
    }

    /// Fail every statement whose SQL contains `needle`.
    pub fn fail_on(&self, needle: &str, code: &str, message: &str) {
        self.state()
            .failures
            .push((needle.to_string(), Error::database(code, message)));
    }

    /// Fail every `event` transaction call. The event is still logged.
    pub fn fail_transaction(&self, event: TxEvent, code: &str, message: &str) {
        self.state()
            .tx_failures
            .insert(event, Error::database(code, message));
    }

    fn transaction_event(&self, event: TxEvent) -> Result<()> {
        let mut state = self.state();
        state.transactions.push(event);
        match state.tx_failures.get(&event) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Fix the affected-row count reported by `execute`.
    pub fn set_affected_rows(&self, rows: u64) {
        self.state().affected_rows = Some(rows);
    }

    /// Set the key handed out for the next INSERT.
    pub fn set_next_insert_id(&self, id: i64) {
        self.state().next_insert_id = id;
    }

    /// Every statement received so far.
    pub fn statements(&self) -> Vec<Statement> {
        self.state().statements.clone()
    }

    /// SQL text of every statement received so far.
    pub fn sql_log(&self) -> Vec<String> {
        self.state()
            .statements
            .iter()
            .map(|s| s.sql.clone())
            .collect()
    }

    /// The most recent statement.
    pub fn last_statement(&self) -> Option<Statement> {
        self.state().statements.last().cloned()
    }

    /// Number of statements whose SQL contains `needle`.
    pub fn count_matching(&self, needle: &str) -> usize {
        self.state()
            .statements
            .iter()
            .filter(|s| s.sql.contains(needle))
            .count()
    }

    /// Forget recorded statements (scripted results are kept).
    pub fn clear_log(&self) {
        self.state().statements.clear();
    }

    /// Transaction boundaries received so far.
    pub fn transactions(&self) -> Vec<TxEvent> {
        self.state().transactions.clone()
    }

    /// Number of `columns()` lookups served.
    pub fn columns_calls(&self) -> usize {
        self.state().columns_calls
    }

    fn record(&self, sql: &str, values: &[Value], kind: StatementKind) -> Result<()> {
        let mut state = self.state();
        state.statements.push(Statement {
            sql: sql.to_string(),
            values: values.to_vec(),
            kind,
        });
        match state
            .failures
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
        {
            Some((_, err)) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn table_key(&self, table: &str) -> String {
        let unquoted: String = match self.dialect.quote_char() {
            Some(q) => table.chars().filter(|c| *c != q).collect(),
            None => table.to_string(),
        };
        unquoted
            .rsplit('.')
            .next()
            .unwrap_or(unquoted.as_str())
            .to_string()
    }
}

impl Connection for MockConnection {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn query(&self, sql: &str, values: &[Value]) -> Result<Vec<Row>> {
        self.record(sql, values, StatementKind::Query)?;
        let mut state = self.state();
        if let Some(rows) = state.queued.pop_front() {
            return Ok(rows);
        }
        Ok(state
            .stubs
            .iter()
            .rev()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    fn execute(&self, sql: &str, values: &[Value]) -> Result<u64> {
        self.record(sql, values, StatementKind::Execute)?;
        let mut state = self.state();
        if sql.trim_start().to_uppercase().starts_with("INSERT") {
            let id = state.next_insert_id;
            state.next_insert_id += 1;
            state.last_insert_id = Some(id);
        }
        Ok(state.affected_rows.unwrap_or(1))
    }

    fn columns(&self, table: &str) -> Result<Vec<Column>> {
        let key = self.table_key(table);
        let mut state = self.state();
        state.columns_calls += 1;
        state
            .tables
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::database("42S02", format!("no such table: {key}")))
    }

    fn insert_id(&self, _sequence: Option<&str>) -> Result<Value> {
        Ok(self.state().last_insert_id.map_or(Value::Null, Value::Int))
    }

    fn begin(&self) -> Result<()> {
        self.transaction_event(TxEvent::Begin)
    }

    fn commit(&self) -> Result<()> {
        self.transaction_event(TxEvent::Commit)
    }

    fn rollback(&self) -> Result<()> {
        self.transaction_event(TxEvent::Rollback)
    }
}
