mod decode;

#[cfg(feature = "mysql")]
mod mysql;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use decode::{decode_text, normalize_money, unescape_bytea, BYTEA_OID, MONEY_OID};

#[cfg(feature = "mysql")]
pub use self::mysql::MySqlAdapter;
#[cfg(feature = "postgres")]
pub use self::postgres::PostgresAdapter;
#[cfg(feature = "sqlite")]
pub use self::sqlite::SqliteAdapter;

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::backend::{Backend, Capabilities, ExistenceProbe, MySql, Postgres, QuoteCache, Sqlite};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::object::{ObjectKind, SchemaObject};

/// Backend error text that means the connection is gone rather than that
/// the statement was wrong.
pub const LOST_CONNECTION_MESSAGES: &[&str] = &[
    "server shutdown",
    "broken pipe",
    "connection lost",
    "lost connection",
    "server has gone away",
    "connection closed",
    "server closed the connection unexpectedly",
    "terminating connection",
];

/// Turn a backend error message into `ConnectionLost` or `Statement`.
pub fn classify(label: &str, message: impl Into<String>) -> Error {
    let message = message.into();
    let lowered = message.to_lowercase();
    if LOST_CONNECTION_MESSAGES
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        Error::ConnectionLost(message)
    } else {
        Error::Statement {
            label: label.to_string(),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Rows returned by a statement, decoded to text or raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_value(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Evaluate an existence probe against this result.
    pub fn satisfies(&self, probe: &ExistenceProbe) -> bool {
        match probe {
            ExistenceProbe::Count(_) => self
                .first_value()
                .and_then(Value::as_text)
                .and_then(|count| count.trim().parse::<i64>().ok())
                .is_some_and(|count| count > 0),
            ExistenceProbe::MatchRow { columns, .. } => self.rows.iter().any(|row| {
                columns.iter().all(|(index, expected)| {
                    row.get(*index).and_then(Value::as_text) == Some(expected.as_str())
                })
            }),
        }
    }
}

/// A live connection to one backend.
///
/// One adapter belongs to one engine run at a time; the quoting cache and
/// savepoint stack are not meant to be shared. Dropping the adapter closes
/// the connection.
pub trait SchemaAdapter {
    fn backend(&self) -> &'static dyn Backend;

    fn capabilities(&self) -> &'static Capabilities {
        self.backend().capabilities()
    }

    /// Run one script (possibly several statements). `label` names the
    /// statement in logs and errors.
    fn execute(&mut self, sql: &str, label: &str) -> Result<RowSet>;

    fn quotes(&mut self) -> &mut QuoteCache;

    fn savepoints(&mut self) -> &mut Vec<String>;

    fn quote_identifier(&mut self, name: &str) -> String {
        self.quotes().quote(name)
    }

    fn current_database(&mut self) -> Result<String> {
        let Some(sql) = self.backend().current_database_sql() else {
            return Ok("main".to_string());
        };
        let rows = self.execute(sql, "SCHEMA")?;
        rows.first_value()
            .and_then(Value::as_text)
            .map(str::to_string)
            .ok_or_else(|| Error::Statement {
                label: "SCHEMA".to_string(),
                message: "no current database".to_string(),
            })
    }

    fn exists(&mut self, object: &SchemaObject) -> Result<bool> {
        let backend = self.backend();
        backend.capabilities().check(object)?;

        if object.kind == ObjectKind::Index && backend.index_probe_needs_table() {
            let table = crate::backend::require_target(object)?;
            let table = SchemaObject::table(table);
            if !self.exists(&table)? {
                return Ok(false);
            }
        }

        let probe = backend.existence_probe(object)?;
        let rows = self.execute(probe.sql(), "SCHEMA")?;
        Ok(rows.satisfies(&probe))
    }

    fn synthesize_drop(&mut self, object: &SchemaObject) -> Result<String> {
        let backend = self.backend();
        backend.drop_sql(object, self.quotes())
    }

    /// Start a transaction. A no-op on backends without transactional DDL.
    fn begin(&mut self) -> Result<()> {
        self.transaction_control(TransactionStep::Begin)
    }

    fn commit(&mut self) -> Result<()> {
        self.transaction_control(TransactionStep::Commit)
    }

    fn rollback(&mut self) -> Result<()> {
        self.transaction_control(TransactionStep::Rollback)
    }

    fn transaction_control(&mut self, step: TransactionStep) -> Result<()> {
        let backend = self.backend();
        if !backend.supports_transactional_ddl() {
            debug!(backend = backend.name(), step = %step, "transactional DDL unsupported, skipping");
            return Ok(());
        }
        let sql = match step {
            TransactionStep::Begin => backend.begin_sql(),
            TransactionStep::Commit => backend.commit_sql(),
            TransactionStep::Rollback => backend.rollback_sql(),
        };
        self.execute(sql, "TRANSACTION")?;
        if step != TransactionStep::Begin {
            self.savepoints().clear();
        }
        Ok(())
    }

    /// Push a new savepoint and return its name.
    fn create_savepoint(&mut self) -> Result<String> {
        let backend = self.require_savepoints("create_savepoint")?;
        let name = format!("schemata_savepoint_{}", self.savepoints().len() + 1);
        self.execute(&backend.savepoint_sql(&name), "TRANSACTION")?;
        self.savepoints().push(name.clone());
        Ok(name)
    }

    /// Roll back to the innermost savepoint, which stays open.
    fn rollback_to_savepoint(&mut self) -> Result<()> {
        let backend = self.require_savepoints("rollback_to_savepoint")?;
        let name = self.innermost_savepoint("rollback_to_savepoint")?;
        self.execute(&backend.rollback_to_savepoint_sql(&name), "TRANSACTION")?;
        Ok(())
    }

    /// Release the innermost savepoint.
    fn release_savepoint(&mut self) -> Result<()> {
        let backend = self.require_savepoints("release_savepoint")?;
        let name = self.innermost_savepoint("release_savepoint")?;
        self.execute(&backend.release_savepoint_sql(&name), "TRANSACTION")?;
        self.savepoints().pop();
        Ok(())
    }

    fn require_savepoints(&self, operation: &'static str) -> Result<&'static dyn Backend> {
        let backend = self.backend();
        if backend.supports_savepoints() {
            Ok(backend)
        } else {
            Err(Error::UnsupportedOperation {
                backend: backend.name(),
                operation,
            })
        }
    }

    fn innermost_savepoint(&mut self, operation: &'static str) -> Result<String> {
        let innermost = self.savepoints().last().cloned();
        innermost.ok_or(Error::UnsupportedOperation {
            backend: self.backend().name(),
            operation,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStep {
    Begin,
    Commit,
    Rollback,
}

impl fmt::Display for TransactionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStep::Begin => f.write_str("begin"),
            TransactionStep::Commit => f.write_str("commit"),
            TransactionStep::Rollback => f.write_str("rollback"),
        }
    }
}

/// The closed set of backends an adapter can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Postgres,
    MySql,
    Sqlite,
}

impl AdapterKind {
    pub fn backend(&self) -> &'static dyn Backend {
        match self {
            AdapterKind::Postgres => &Postgres,
            AdapterKind::MySql => &MySql,
            AdapterKind::Sqlite => &Sqlite,
        }
    }
}

impl FromStr for AdapterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(AdapterKind::Postgres),
            "mysql" | "mysql2" => Ok(AdapterKind::MySql),
            "sqlite" | "sqlite3" => Ok(AdapterKind::Sqlite),
            _ => Err(Error::UnknownAdapter(s.to_string())),
        }
    }
}

/// Build and connect the adapter named by `config.adapter`.
///
/// Unknown adapter names fail before any connection attempt.
pub fn connect(config: &ConnectionConfig) -> Result<Box<dyn SchemaAdapter>> {
    config.validate()?;
    let kind: AdapterKind = config.adapter.parse()?;
    debug!(adapter = ?kind, database = %config.database, "connecting");

    match kind {
        #[cfg(feature = "postgres")]
        AdapterKind::Postgres => Ok(Box::new(PostgresAdapter::connect(config.clone())?)),
        #[cfg(feature = "mysql")]
        AdapterKind::MySql => Ok(Box::new(MySqlAdapter::connect(config.clone())?)),
        #[cfg(feature = "sqlite")]
        AdapterKind::Sqlite => Ok(Box::new(SqliteAdapter::connect(config.clone())?)),
        #[allow(unreachable_patterns)]
        other => Err(Error::Config(format!(
            "{} support is not compiled in; enable the `{}` feature",
            other.backend().name(),
            other.backend().name()
        ))),
    }
}
