use postgres::{Client, NoTls, SimpleQueryMessage};
use tracing::{debug, warn};

use crate::adapter::{classify, decode_text, RowSet, SchemaAdapter, Value};
use crate::backend::{Backend, Postgres, QuoteCache};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};

/// Oldest server accepted, as reported by `server_version_num`.
const MINIMUM_SERVER_VERSION: i32 = 80200;

pub struct PostgresAdapter {
    client: Client,
    config: ConnectionConfig,
    quotes: QuoteCache,
    savepoints: Vec<String>,
    version: i32,
}

impl PostgresAdapter {
    /// Connect and apply encoding, message level and search path before
    /// handing the connection out.
    pub fn connect(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let client = open(&config)?;
        let mut adapter = Self {
            client,
            config,
            quotes: QuoteCache::for_backend(&Postgres),
            savepoints: Vec::new(),
            version: 0,
        };

        adapter.version = adapter.server_version()?;
        if adapter.version < MINIMUM_SERVER_VERSION {
            return Err(Error::Config(format!(
                "PostgreSQL {} is too old, please upgrade",
                adapter.version
            )));
        }

        adapter.configure_connection()?;
        Ok(adapter)
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn is_active(&self) -> bool {
        !self.client.is_closed()
    }

    /// Re-open the connection. Quoting cache and savepoints start over.
    pub fn reconnect(&mut self) -> Result<()> {
        debug!(database = %self.config.database, "reconnecting");
        self.client = open(&self.config)?;
        self.quotes.clear();
        self.savepoints.clear();
        self.configure_connection()
    }

    pub fn current_schema(&mut self) -> Result<String> {
        self.select_text("SELECT current_schema")
    }

    pub fn client_min_messages(&mut self) -> Result<String> {
        self.select_text("SHOW client_min_messages")
    }

    pub fn set_client_min_messages(&mut self, level: &str) -> Result<()> {
        self.execute(
            &format!("SET client_min_messages TO {}", literal(level)),
            "SCHEMA",
        )?;
        Ok(())
    }

    pub fn set_schema_search_path(&mut self, schema_csv: &str) -> Result<()> {
        self.execute(&format!("SET search_path TO {}", schema_csv), "SCHEMA")?;
        Ok(())
    }

    fn server_version(&mut self) -> Result<i32> {
        let raw = self.select_text("SHOW server_version_num")?;
        raw.trim()
            .parse()
            .map_err(|_| Error::Config(format!("unrecognised server version '{}'", raw)))
    }

    fn configure_connection(&mut self) -> Result<()> {
        if let Some(encoding) = self.config.encoding.clone() {
            self.execute(
                &format!("SET client_encoding TO {}", literal(&encoding)),
                "SCHEMA",
            )?;
        }
        if let Some(level) = self.config.min_messages.clone() {
            self.set_client_min_messages(&level)?;
        }
        if let Some(path) = self.config.schema_search_path.clone() {
            self.set_schema_search_path(&path)?;
        }
        if let Err(e) = self.execute("SET standard_conforming_strings = on", "SCHEMA") {
            warn!(error = %e, "standard_conforming_strings unavailable");
        }
        Ok(())
    }

    fn select_text(&mut self, sql: &str) -> Result<String> {
        let rows = self.execute(sql, "SCHEMA")?;
        rows.first_value()
            .and_then(Value::as_text)
            .map(str::to_string)
            .ok_or_else(|| Error::Statement {
                label: "SCHEMA".to_string(),
                message: format!("no value returned by {}", sql),
            })
    }

    /// Type OIDs of a single statement's result columns.
    fn column_types(&mut self, sql: &str, label: &str) -> Result<Vec<u32>> {
        let statement = self
            .client
            .prepare(sql)
            .map_err(|e| statement_error(label, e))?;
        Ok(statement
            .columns()
            .iter()
            .map(|column| column.type_().oid())
            .collect())
    }
}

impl SchemaAdapter for PostgresAdapter {
    fn backend(&self) -> &'static dyn Backend {
        &Postgres
    }

    fn execute(&mut self, sql: &str, label: &str) -> Result<RowSet> {
        debug!(label, sql, "executing statement");
        let messages = self
            .client
            .simple_query(sql)
            .map_err(|e| statement_error(label, e))?;

        let mut columns = Vec::new();
        let mut raw_rows: Vec<Vec<Option<String>>> = Vec::new();
        let mut statements = 0;
        for message in messages {
            match message {
                SimpleQueryMessage::Row(row) => {
                    if columns.is_empty() {
                        columns = row
                            .columns()
                            .iter()
                            .map(|column| column.name().to_string())
                            .collect();
                    }
                    raw_rows
                        .push((0..row.len()).map(|i| row.get(i).map(str::to_string)).collect());
                }
                SimpleQueryMessage::CommandComplete(_) => statements += 1,
                _ => {}
            }
        }

        if raw_rows.is_empty() {
            return Ok(RowSet::new(columns, Vec::new()));
        }

        // Describing a multi-statement script fails and would abort an open
        // transaction, so those rows stay undecoded text.
        let types = if statements == 1 {
            self.column_types(sql, label)?
        } else {
            Vec::new()
        };
        let rows = raw_rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(i, raw)| decode_text(types.get(i).copied(), raw.as_deref()))
                    .collect()
            })
            .collect();
        Ok(RowSet::new(columns, rows))
    }

    fn quotes(&mut self) -> &mut QuoteCache {
        &mut self.quotes
    }

    fn savepoints(&mut self) -> &mut Vec<String> {
        &mut self.savepoints
    }
}

fn open(config: &ConnectionConfig) -> Result<Client> {
    let mut pg = postgres::Config::new();
    pg.host(config.host_or_default()).dbname(&config.database);
    if let Some(port) = config.port_or_default() {
        pg.port(port);
    }
    if let Some(user) = &config.username {
        pg.user(user);
    }
    if let Some(password) = &config.password {
        pg.password(password);
    }
    pg.connect(NoTls).map_err(|e| statement_error("CONNECT", e))
}

fn statement_error(label: &str, error: postgres::Error) -> Error {
    if error.is_closed() {
        return Error::ConnectionLost(error.to_string());
    }
    match error.as_db_error() {
        Some(db) => classify(label, db.message()),
        None => classify(label, error.to_string()),
    }
}

fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::SchemaObject;
    use std::env;

    fn test_config() -> ConnectionConfig {
        let host = env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string());
        let user = env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string());
        let password = env::var("POSTGRES_PASSWORD").unwrap_or_else(|_| "postgres".to_string());
        let dbname = env::var("POSTGRES_DB").unwrap_or_else(|_| "schemata_test".to_string());

        ConnectionConfig::new("postgresql", dbname)
            .host(host)
            .credentials(user, password)
            .min_messages("warning")
            .schema_search_path("public")
    }

    #[test]
    fn literal_escapes_quotes() {
        assert_eq!(literal("it's"), "'it''s'");
    }

    #[test]
    #[ignore = "requires postgres connection"]
    fn configures_connection_on_connect() {
        let mut adapter = PostgresAdapter::connect(test_config()).unwrap();
        assert!(adapter.version() >= MINIMUM_SERVER_VERSION);
        assert!(adapter.is_active());
        assert_eq!(adapter.client_min_messages().unwrap(), "warning");
        assert_eq!(adapter.current_schema().unwrap(), "public");
    }

    #[test]
    #[ignore = "requires postgres connection"]
    fn decodes_money_and_bytea_columns() {
        let mut adapter = PostgresAdapter::connect(test_config()).unwrap();
        adapter.execute("SET lc_monetary TO 'C'", "SCHEMA").unwrap();

        let rows = adapter
            .execute("SELECT 12345.12::money, 'Hi'::bytea, 'plain'::text", "q")
            .unwrap();
        assert_eq!(rows.rows[0][0], Value::Text("12345.12".to_string()));
        assert_eq!(rows.rows[0][1], Value::Bytes(b"Hi".to_vec()));
        assert_eq!(rows.rows[0][2], Value::Text("plain".to_string()));
    }

    #[test]
    #[ignore = "requires postgres connection"]
    fn multi_statement_rows_keep_transaction_usable() {
        let mut adapter = PostgresAdapter::connect(test_config()).unwrap();
        adapter.begin().unwrap();

        let rows = adapter.execute("SELECT 1; SELECT 2", "q").unwrap();
        assert_eq!(
            rows.rows,
            vec![
                vec![Value::Text("1".to_string())],
                vec![Value::Text("2".to_string())],
            ]
        );

        let rows = adapter.execute("SELECT 3", "q").unwrap();
        assert_eq!(rows.first_value(), Some(&Value::Text("3".to_string())));
        adapter.rollback().unwrap();
    }

    #[test]
    #[ignore = "requires postgres connection"]
    fn reconnect_clears_quote_cache() {
        let mut adapter = PostgresAdapter::connect(test_config()).unwrap();
        adapter.quote_identifier("users");
        assert_eq!(adapter.quotes().len(), 1);

        adapter.reconnect().unwrap();
        assert!(adapter.quotes().is_empty());
        assert!(adapter.exists(&SchemaObject::table("pg_class_never")).is_ok());
    }

    #[test]
    #[ignore = "requires postgres connection"]
    fn syntax_errors_are_statement_errors() {
        let mut adapter = PostgresAdapter::connect(test_config()).unwrap();
        let result = adapter.execute("CREATE TABEL nope ()", "table:nope");
        assert!(matches!(result, Err(Error::Statement { label, .. }) if label == "table:nope"));
    }
}
