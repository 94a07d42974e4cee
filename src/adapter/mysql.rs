use mysql::prelude::*;
use mysql::{Conn, OptsBuilder};
use tracing::debug;

use crate::adapter::{classify, RowSet, SchemaAdapter, Value};
use crate::backend::{Backend, MySql, QuoteCache};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};

pub struct MySqlAdapter {
    conn: Conn,
    config: ConnectionConfig,
    quotes: QuoteCache,
    savepoints: Vec<String>,
}

impl MySqlAdapter {
    pub fn connect(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let conn = open(&config)?;
        let mut adapter = Self {
            conn,
            config,
            quotes: QuoteCache::for_backend(&MySql),
            savepoints: Vec::new(),
        };
        adapter.configure_connection()?;
        Ok(adapter)
    }

    pub fn server_version(&self) -> (u16, u16, u16) {
        self.conn.server_version()
    }

    pub fn is_active(&mut self) -> bool {
        self.conn.query_drop("SELECT 1").is_ok()
    }

    /// Re-open the connection and drop cached quoting.
    pub fn reconnect(&mut self) -> Result<()> {
        debug!(database = %self.config.database, "reconnecting");
        self.conn = open(&self.config)?;
        self.quotes.clear();
        self.savepoints.clear();
        self.configure_connection()
    }

    fn configure_connection(&mut self) -> Result<()> {
        if let Some(encoding) = self.config.encoding.clone() {
            self.execute(
                &format!("SET NAMES '{}'", encoding.replace('\'', "''")),
                "SCHEMA",
            )?;
        }
        Ok(())
    }
}

impl SchemaAdapter for MySqlAdapter {
    fn backend(&self) -> &'static dyn Backend {
        &MySql
    }

    fn execute(&mut self, sql: &str, label: &str) -> Result<RowSet> {
        debug!(label, sql, "executing statement");
        let mut result = self
            .conn
            .query_iter(sql)
            .map_err(|e| statement_error(label, e))?;

        let mut columns = Vec::new();
        let mut rows = Vec::new();
        while let Some(set) = result.iter() {
            if columns.is_empty() {
                columns = set
                    .columns()
                    .as_ref()
                    .iter()
                    .map(|column| column.name_str().into_owned())
                    .collect();
            }
            for row in set {
                let row = row.map_err(|e| statement_error(label, e))?;
                rows.push(row.unwrap().into_iter().map(convert).collect());
            }
        }
        Ok(RowSet::new(columns, rows))
    }

    fn quotes(&mut self) -> &mut QuoteCache {
        &mut self.quotes
    }

    fn savepoints(&mut self) -> &mut Vec<String> {
        &mut self.savepoints
    }
}

fn open(config: &ConnectionConfig) -> Result<Conn> {
    let mut opts = OptsBuilder::new()
        .ip_or_hostname(Some(config.host_or_default()))
        .user(config.username.as_deref())
        .pass(config.password.as_deref())
        .db_name(Some(config.database.as_str()))
        .socket(config.socket.as_deref());
    if let Some(port) = config.port_or_default() {
        opts = opts.tcp_port(port);
    }
    Conn::new(opts).map_err(|e| statement_error("CONNECT", e))
}

fn statement_error(label: &str, error: mysql::Error) -> Error {
    match error {
        mysql::Error::IoError(e) => Error::ConnectionLost(e.to_string()),
        mysql::Error::MySqlError(e) => classify(label, e.message),
        other => classify(label, other.to_string()),
    }
}

/// Text protocol results arrive as bytes; keep them as text when they are
/// valid UTF-8.
fn convert(value: mysql::Value) -> Value {
    match value {
        mysql::Value::NULL => Value::Null,
        mysql::Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Value::Text(text),
            Err(e) => Value::Bytes(e.into_bytes()),
        },
        mysql::Value::Int(i) => Value::Text(i.to_string()),
        mysql::Value::UInt(u) => Value::Text(u.to_string()),
        mysql::Value::Float(f) => Value::Text(f.to_string()),
        mysql::Value::Double(d) => Value::Text(d.to_string()),
        other => Value::Text(other.as_sql(true).trim_matches('\'').to_string()),
    }
}
