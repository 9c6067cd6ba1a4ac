//! Table metadata and statement execution for one model.
//!
//! A [`Table`] is built the first time a model is used and cached by the
//! [`Registry`](crate::Registry). It owns the resolved table name, columns,
//! primary key and sequence, and is the only place SQL reaches the
//! connection.

use std::sync::Arc;

use activerow_core::{Column, Connection, Error, Result, Value};
use activerow_query::{Conditions, FindOptions, Include, Joins, SqlBuilder};
use indexmap::IndexMap;

use crate::callback::CallbackRegistry;
use crate::eager;
use crate::model::ModelConfig;
use crate::record::Record;
use crate::registry::Registry;
use crate::relationship::Relationship;

/// Resolved metadata for one model class.
#[derive(Debug)]
pub struct Table {
    pub class_name: String,
    /// Unquoted table name.
    pub table: String,
    pub db_name: Option<String>,
    /// Primary key attribute names.
    pub pk: Vec<String>,
    pub sequence: Option<String>,
    /// Columns keyed by inflected name, in table order.
    pub columns: Arc<IndexMap<String, Column>>,
    config: Arc<ModelConfig>,
    callbacks: Arc<CallbackRegistry>,
    conn: Arc<dyn Connection>,
    logging: bool,
}

impl Table {
    pub(crate) fn load(
        registry: &Registry,
        config: Arc<ModelConfig>,
        callbacks: Arc<CallbackRegistry>,
    ) -> Result<Self> {
        let conn_name = config
            .connection
            .clone()
            .unwrap_or_else(|| registry.config().default_connection.clone());
        let conn = registry.connection(&conn_name)?;

        let mut table = Self {
            class_name: config.class_name.clone(),
            table: config.table_name(),
            db_name: config.db.clone(),
            pk: Vec::new(),
            sequence: None,
            columns: Arc::new(IndexMap::new()),
            callbacks,
            conn,
            logging: registry.config().logging,
            config,
        };

        // PostgreSQL reports metadata for unquoted names only.
        let quote = table.conn.dialect().quote_char() != Some('"');
        let meta_name = table.fully_qualified_name(quote);
        table.columns = registry.columns_for(&conn_name, &table.conn, &meta_name)?;

        table.pk = if table.config.primary_key.is_empty() {
            table
                .columns
                .values()
                .filter(|c| c.pk)
                .map(|c| c.inflected_name.clone())
                .collect()
        } else {
            table.config.primary_key.clone()
        };

        if table.conn.supports_sequences() {
            table.sequence = match &table.config.sequence {
                Some(seq) => Some(seq.clone()),
                None => table
                    .pk
                    .first()
                    .map(|pk| table.conn.sequence_name(&table.table, pk)),
            };
        }

        tracing::debug!(
            class = %table.class_name,
            table = %table.table,
            columns = table.columns.len(),
            pk = ?table.pk,
            "Loaded table metadata"
        );
        Ok(table)
    }

    /// Table name qualified with the database name, if any.
    pub fn fully_qualified_name(&self, quote: bool) -> String {
        let table = if quote {
            self.conn.quote_name(&self.table)
        } else {
            self.table.clone()
        };
        match &self.db_name {
            Some(db) => format!("{}.{table}", self.conn.quote_name(db)),
            None => table,
        }
    }

    pub fn conn(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    pub fn config(&self) -> &Arc<ModelConfig> {
        &self.config
    }

    pub fn callbacks(&self) -> &Arc<CallbackRegistry> {
        &self.callbacks
    }

    /// Column for an attribute name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// A declared relationship, if any.
    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.config.find_relationship(name)
    }

    /// A declared relationship, or a [`Error::Relationship`].
    pub fn get_relationship(&self, name: &str) -> Result<&Relationship> {
        self.relationship(name).ok_or_else(|| {
            Error::Relationship(format!(
                "Relationship named {name} has not been declared for class: {}",
                self.class_name
            ))
        })
    }

    // ========================================================================
    // Query Construction
    // ========================================================================

    /// JOIN SQL for the `joins` option. List entries without `JOIN ` name
    /// relationships; a target joined twice is aliased by relationship name.
    pub fn create_joins(&self, registry: &Registry, joins: &Joins) -> Result<String> {
        let list = match joins {
            Joins::Raw(sql) => return Ok(sql.clone()),
            Joins::List(list) => list,
        };

        let mut parts = Vec::with_capacity(list.len());
        let mut joined_classes: Vec<String> = Vec::new();
        for value in list {
            if value.to_ascii_uppercase().contains("JOIN ") {
                parts.push(value.clone());
                continue;
            }
            let rel = self.get_relationship(value)?;
            let class = rel.target_class();
            let alias = if joined_classes.contains(&class) {
                Some(value.as_str())
            } else {
                joined_classes.push(class);
                None
            };
            parts.push(rel.construct_inner_join_sql(registry, self, alias)?);
        }
        Ok(parts.join(" "))
    }

    /// Translate finder options into a SELECT builder.
    pub fn options_to_sql(&self, registry: &Registry, options: &FindOptions) -> Result<SqlBuilder> {
        let from = options
            .from
            .clone()
            .unwrap_or_else(|| self.fully_qualified_name(true));
        let mut sql = SqlBuilder::new(Some(Arc::clone(&self.conn)), from)?;

        let mut select = options.select.clone();
        if let Some(joins) = &options.joins {
            sql = sql.joins(self.create_joins(registry, joins)?);
            if select.is_none() {
                select = Some(format!("{}.*", self.fully_qualified_name(true)));
            }
        }
        if let Some(select) = select {
            sql = sql.select(select);
        }

        if let Some(conditions) = &options.conditions {
            sql = sql.filter(conditions.clone().map_names(&options.mapped_names));
        }
        if let Some(order) = &options.order {
            sql = sql.order(order.clone());
        }
        if let Some(limit) = options.limit {
            sql = sql.limit(limit);
        }
        if let Some(offset) = options.offset {
            sql = sql.offset(offset);
        }
        if let Some(group) = &options.group {
            sql = sql.group(group.clone());
        }
        if let Some(having) = &options.having {
            sql = sql.having(having.clone());
        }
        Ok(sql)
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run a find described by `options`.
    pub fn find(self: &Arc<Self>, registry: &Arc<Registry>, options: &FindOptions) -> Result<Vec<Record>> {
        let sql = self.options_to_sql(registry, options)?;
        let values = sql.where_values()?;
        self.find_by_sql(
            registry,
            &sql.to_sql()?,
            &values,
            options.readonly.unwrap_or(false),
            &options.include,
        )
    }

    /// Hydrate one record per row returned by `sql`, then eager load
    /// `includes` onto them.
    pub fn find_by_sql(
        self: &Arc<Self>,
        registry: &Arc<Registry>,
        sql: &str,
        values: &[Value],
        readonly: bool,
        includes: &[Include],
    ) -> Result<Vec<Record>> {
        let values = process_data(values);
        self.log_statement(sql, &values);
        let rows = self.conn.query(sql, &values)?;

        let mut list = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = Record::hydrate(Arc::clone(registry), Arc::clone(self), row.into_map())?;
            if readonly {
                record.readonly(true);
            }
            list.push(record);
        }

        if !includes.is_empty() && !list.is_empty() {
            self.execute_eager_load(registry, &mut list, includes)?;
        }
        Ok(list)
    }

    fn execute_eager_load(
        &self,
        registry: &Arc<Registry>,
        records: &mut [Record],
        includes: &[Include],
    ) -> Result<()> {
        for include in includes {
            let rel = self.get_relationship(&include.name)?;
            eager::load_eagerly(rel, registry, self, records, &include.nested)?;
        }
        Ok(())
    }

    /// INSERT `data`. With `pk` and `sequence` the key comes from the sequence.
    pub fn insert(
        &self,
        data: IndexMap<String, Value>,
        pk: Option<&str>,
        sequence: Option<&str>,
    ) -> Result<u64> {
        let data = process_map(data);
        let sql = SqlBuilder::new(Some(Arc::clone(&self.conn)), self.fully_qualified_name(true))?
            .insert(data, pk, sequence)?;
        self.execute(&sql)
    }

    /// UPDATE `data` on rows matching `where_`.
    pub fn update(&self, data: IndexMap<String, Value>, where_: IndexMap<String, Value>) -> Result<u64> {
        let data = process_map(data);
        let sql = SqlBuilder::new(Some(Arc::clone(&self.conn)), self.fully_qualified_name(true))?
            .update(data)?
            .filter(Conditions::Hash(process_map(where_)));
        self.execute(&sql)
    }

    /// DELETE rows matching `where_`.
    pub fn delete(&self, where_: IndexMap<String, Value>) -> Result<u64> {
        let sql = SqlBuilder::new(Some(Arc::clone(&self.conn)), self.fully_qualified_name(true))?
            .delete(Some(Conditions::Hash(process_map(where_))));
        self.execute(&sql)
    }

    /// First column of the first row of a SELECT.
    pub(crate) fn query_scalar(&self, sql: &SqlBuilder) -> Result<Option<Value>> {
        let text = sql.to_sql()?;
        let values = process_data(&sql.where_values()?);
        self.log_statement(&text, &values);
        self.conn.query_and_fetch_one(&text, &values)
    }

    /// Render and execute a write statement.
    pub(crate) fn execute(&self, sql: &SqlBuilder) -> Result<u64> {
        let (sql, values) = sql.build()?;
        self.log_statement(&sql, &values);
        self.conn.execute(&sql, &values)
    }

    pub(crate) fn log_statement(&self, sql: &str, values: &[Value]) {
        if self.logging {
            tracing::info!(table = %self.table, sql = %sql, binds = ?values, "Executing statement");
        } else {
            tracing::debug!(table = %self.table, sql = %sql, binds = ?values, "Executing statement");
        }
    }
}

/// Temporal values are bound as text.
fn process_value(value: Value) -> Value {
    match value {
        Value::Date(_) | Value::DateTime(_) | Value::Time(_) => Value::Text(value.to_string()),
        Value::Array(items) => Value::Array(items.into_iter().map(process_value).collect()),
        other => other,
    }
}

fn process_data(values: &[Value]) -> Vec<Value> {
    values.iter().cloned().map(process_value).collect()
}

fn process_map(data: IndexMap<String, Value>) -> IndexMap<String, Value> {
    data.into_iter().map(|(k, v)| (k, process_value(v))).collect()
}
