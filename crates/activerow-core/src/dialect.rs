//! SQL dialect differences.
//!
//! Everything engine-specific the query layer needs (identifier quoting,
//! LIMIT/OFFSET rendering, sequences) lives here so that [`Connection`]
//! implementations can delegate to it by default.
//!
//! [`Connection`]: crate::Connection

use serde::Deserialize;

/// Supported database dialects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// MySQL / MariaDB.
    Mysql,
    /// SQLite.
    #[default]
    Sqlite,
    /// PostgreSQL.
    Postgres,
    /// Oracle.
    Oracle,
}

impl Dialect {
    /// Identifier quote character, if the dialect quotes identifiers.
    pub const fn quote_char(self) -> Option<char> {
        match self {
            Self::Mysql | Self::Sqlite => Some('`'),
            Self::Postgres => Some('"'),
            Self::Oracle => None,
        }
    }

    /// Quote an identifier. Names already starting or ending with the quote
    /// character are returned untouched.
    pub fn quote_name(self, name: &str) -> String {
        match self.quote_char() {
            Some(q) if !name.starts_with(q) && !name.ends_with(q) => format!("{q}{name}{q}"),
            _ => name.to_string(),
        }
    }

    /// Quote a string literal, doubling embedded single quotes.
    pub fn escape(self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// Append (or wrap with) the dialect's row-limiting clause.
    pub fn limit(self, sql: &str, offset: Option<u64>, limit: Option<u64>) -> String {
        match self {
            Self::Mysql | Self::Sqlite => {
                let offset = offset.map(|o| format!("{o},")).unwrap_or_default();
                let limit = match (limit, self) {
                    (Some(l), _) => l.to_string(),
                    (None, Self::Sqlite) => "-1".to_string(),
                    (None, _) => u64::MAX.to_string(),
                };
                format!("{sql} LIMIT {offset}{limit}")
            }
            Self::Postgres => {
                let mut out = sql.to_string();
                if let Some(l) = limit {
                    out.push_str(&format!(" LIMIT {l}"));
                }
                if let Some(o) = offset {
                    out.push_str(&format!(" OFFSET {o}"));
                }
                out
            }
            Self::Oracle => {
                let offset = offset.unwrap_or(0);
                let stop = offset.saturating_add(limit.unwrap_or(u64::MAX - offset));
                format!(
                    "SELECT * FROM (SELECT a.*, rownum ar_rnum__ FROM ({sql}) a WHERE rownum <= {stop}) WHERE ar_rnum__ > {offset}"
                )
            }
        }
    }

    /// Whether the dialect uses sequences for generated keys.
    pub const fn supports_sequences(self) -> bool {
        matches!(self, Self::Postgres | Self::Oracle)
    }

    /// Default sequence name for a table's key column.
    pub fn sequence_name(self, table: &str, column: &str) -> String {
        match self {
            Self::Postgres => format!("{table}_{column}_seq"),
            _ => format!("{table}_seq"),
        }
    }

    /// SQL expression yielding the next value of a sequence.
    pub fn next_sequence_value(self, sequence: &str) -> String {
        match self {
            Self::Postgres => format!("nextval('{}')", sequence.replace('\'', "\\'")),
            Self::Oracle => format!("{sequence}.nextval"),
            _ => String::new(),
        }
    }

    /// Whether the next sequence value must be fetched before the INSERT.
    pub const fn preselects_sequence_values(self) -> bool {
        matches!(self, Self::Oracle)
    }

    /// Query fetching the next sequence value ahead of an INSERT.
    pub fn next_sequence_query(self, sequence: &str) -> String {
        match self {
            Self::Oracle => format!("SELECT {sequence}.nextval FROM dual"),
            _ => format!("SELECT {}", self.next_sequence_value(sequence)),
        }
    }

    /// Whether UPDATE/DELETE statements accept ORDER BY and LIMIT.
    pub const fn accepts_limit_and_order_for_update_and_delete(self) -> bool {
        matches!(self, Self::Mysql | Self::Sqlite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_name() {
        assert_eq!(Dialect::Sqlite.quote_name("authors"), "`authors`");
        assert_eq!(Dialect::Sqlite.quote_name("`authors`"), "`authors`");
        assert_eq!(Dialect::Postgres.quote_name("authors"), "\"authors\"");
        assert_eq!(Dialect::Oracle.quote_name("authors"), "authors");
    }

    #[test]
    fn test_limit_rendering() {
        assert_eq!(
            Dialect::Mysql.limit("SELECT * FROM t", Some(1), Some(10)),
            "SELECT * FROM t LIMIT 1,10"
        );
        assert_eq!(
            Dialect::Sqlite.limit("SELECT * FROM t", None, Some(1)),
            "SELECT * FROM t LIMIT 1"
        );
        assert_eq!(
            Dialect::Postgres.limit("SELECT * FROM t", Some(5), Some(10)),
            "SELECT * FROM t LIMIT 10 OFFSET 5"
        );
        assert_eq!(
            Dialect::Oracle.limit("SELECT * FROM t", Some(5), Some(10)),
            "SELECT * FROM (SELECT a.*, rownum ar_rnum__ FROM (SELECT * FROM t) a WHERE rownum <= 15) WHERE ar_rnum__ > 5"
        );
    }

    #[test]
    fn test_sequences() {
        assert!(!Dialect::Mysql.supports_sequences());
        assert_eq!(Dialect::Postgres.sequence_name("authors", "id"), "authors_id_seq");
        assert_eq!(Dialect::Oracle.sequence_name("authors", "id"), "authors_seq");
        assert_eq!(Dialect::Oracle.next_sequence_value("authors_seq"), "authors_seq.nextval");
        assert_eq!(
            Dialect::Oracle.next_sequence_query("authors_seq"),
            "SELECT authors_seq.nextval FROM dual"
        );
    }

    #[test]
    fn test_escape_doubles_quotes() {
        assert_eq!(Dialect::Mysql.escape("Tito's Guild"), "'Tito''s Guild'");
    }
}
