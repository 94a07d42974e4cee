use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::debug;

use crate::adapter::{classify, RowSet, SchemaAdapter, Value};
use crate::backend::{Backend, QuoteCache, Sqlite};
use crate::config::ConnectionConfig;
use crate::error::Result;

const IN_MEMORY: &str = ":memory:";

pub struct SqliteAdapter {
    conn: Connection,
    quotes: QuoteCache,
    savepoints: Vec<String>,
}

impl SqliteAdapter {
    /// Open the database file named by `config.database`, or a private
    /// in-memory database for `:memory:`.
    pub fn connect(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let conn = if config.database == IN_MEMORY {
            Connection::open_in_memory()
        } else {
            Connection::open(&config.database)
        }
        .map_err(|e| classify("CONNECT", e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::connect(ConnectionConfig::new("sqlite", IN_MEMORY))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            quotes: QuoteCache::for_backend(&Sqlite),
            savepoints: Vec::new(),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn query(&self, sql: &str, label: &str) -> Result<Option<RowSet>> {
        let mut stmt = match self.conn.prepare(sql) {
            Ok(stmt) => stmt,
            Err(rusqlite::Error::MultipleStatement) => return Ok(None),
            Err(e) => return Err(classify(label, e.to_string())),
        };
        let width = stmt.column_count();
        if width == 0 {
            return Ok(None);
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([]).map_err(|e| classify(label, e.to_string()))?;
        let mut values = Vec::new();
        while let Some(row) = rows.next().map_err(|e| classify(label, e.to_string()))? {
            let mut decoded = Vec::with_capacity(width);
            for i in 0..width {
                let value = row.get_ref(i).map_err(|e| classify(label, e.to_string()))?;
                decoded.push(convert(value));
            }
            values.push(decoded);
        }
        Ok(Some(RowSet::new(columns, values)))
    }
}

impl SchemaAdapter for SqliteAdapter {
    fn backend(&self) -> &'static dyn Backend {
        &Sqlite
    }

    /// Single queries return their rows; anything else, including
    /// multi-statement scripts, runs as a batch.
    fn execute(&mut self, sql: &str, label: &str) -> Result<RowSet> {
        debug!(label, sql, "executing statement");
        if let Some(rows) = self.query(sql, label)? {
            return Ok(rows);
        }
        self.conn
            .execute_batch(sql)
            .map_err(|e| classify(label, e.to_string()))?;
        Ok(RowSet::default())
    }

    fn quotes(&mut self) -> &mut QuoteCache {
        &mut self.quotes
    }

    fn savepoints(&mut self) -> &mut Vec<String> {
        &mut self.savepoints
    }
}

fn convert(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Text(i.to_string()),
        ValueRef::Real(f) => Value::Text(f.to_string()),
        ValueRef::Text(text) => Value::Text(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Value::Bytes(blob.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::object::SchemaObject;

    #[test]
    fn queries_return_rows() {
        let mut adapter = SqliteAdapter::open_in_memory().unwrap();
        let rows = adapter
            .execute("SELECT 1 AS one, 'two' AS two, NULL AS three, x'00ff' AS four", "q")
            .unwrap();
        assert_eq!(rows.columns, vec!["one", "two", "three", "four"]);
        assert_eq!(
            rows.rows[0],
            vec![
                Value::Text("1".to_string()),
                Value::Text("two".to_string()),
                Value::Null,
                Value::Bytes(vec![0x00, 0xff]),
            ]
        );
    }

    #[test]
    fn scripts_run_as_batches() {
        let mut adapter = SqliteAdapter::open_in_memory().unwrap();
        let rows = adapter
            .execute(
                "CREATE TABLE posts (id INTEGER PRIMARY KEY);\nCREATE INDEX posts_idx ON posts (id);",
                "table:posts",
            )
            .unwrap();
        assert!(rows.is_empty());

        assert!(adapter.exists(&SchemaObject::table("posts")).unwrap());
        assert!(adapter
            .exists(&SchemaObject::index("posts_idx", "posts"))
            .unwrap());
        assert!(!adapter
            .exists(&SchemaObject::index("posts_idx", "comments"))
            .unwrap());
        assert!(!adapter.exists(&SchemaObject::view("posts")).unwrap());
    }

    #[test]
    fn statement_errors_carry_label() {
        let mut adapter = SqliteAdapter::open_in_memory().unwrap();
        let result = adapter.execute("CREATE TABEL nope (id)", "table:nope");
        assert!(matches!(result, Err(Error::Statement { label, .. }) if label == "table:nope"));
    }

    #[test]
    fn savepoint_rollback_discards_work() {
        let mut adapter = SqliteAdapter::open_in_memory().unwrap();
        adapter.begin().unwrap();
        adapter.execute("CREATE TABLE kept (id)", "table:kept").unwrap();
        adapter.create_savepoint().unwrap();
        adapter.execute("CREATE TABLE dropped (id)", "table:dropped").unwrap();
        adapter.rollback_to_savepoint().unwrap();
        adapter.release_savepoint().unwrap();
        adapter.commit().unwrap();

        assert!(adapter.exists(&SchemaObject::table("kept")).unwrap());
        assert!(!adapter.exists(&SchemaObject::table("dropped")).unwrap());
    }

    #[test]
    fn opens_database_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        let config = ConnectionConfig::new("sqlite3", path.to_string_lossy());

        let mut adapter = SqliteAdapter::connect(config.clone()).unwrap();
        adapter.execute("CREATE TABLE t (id)", "table:t").unwrap();
        drop(adapter);

        let mut reopened = SqliteAdapter::connect(config).unwrap();
        assert!(reopened.exists(&SchemaObject::table("t")).unwrap());
    }
}
