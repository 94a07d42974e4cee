use crate::backend::{
    require_target, split_qualified, unsupported, Backend, Capabilities, ExistenceProbe,
    QuoteCache,
};
use crate::error::Result;
use crate::object::{ObjectKind, SchemaObject};

static CAPABILITIES: Capabilities = Capabilities {
    backend: "mysql",
    supported_kinds: &[
        ObjectKind::Database,
        ObjectKind::Table,
        ObjectKind::View,
        ObjectKind::Index,
        ObjectKind::Procedure,
    ],
    quote_char: '`',
    // BEGIN/COMMIT are no-ops here, so there is never a transaction to
    // hold a savepoint.
    supports_savepoints: false,
    // MySQL issues implicit commits for DDL statements
    supports_transactional_ddl: false,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Backend for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn capabilities(&self) -> &'static Capabilities {
        &CAPABILITIES
    }

    fn drop_sql(&self, object: &SchemaObject, quotes: &mut QuoteCache) -> Result<String> {
        let name = quotes.quote(&object.name);
        let sql = match object.kind {
            ObjectKind::Database => format!("DROP DATABASE IF EXISTS {}", name),
            ObjectKind::Table => format!("DROP TABLE IF EXISTS {}", name),
            ObjectKind::View => format!("DROP VIEW IF EXISTS {}", name),
            ObjectKind::Procedure => format!("DROP PROCEDURE IF EXISTS {}", name),
            ObjectKind::Index => {
                let target = quotes.quote(require_target(object)?);
                format!("DROP INDEX {} ON {}", name, target)
            }
            ObjectKind::Schema | ObjectKind::Rule => return Err(unsupported(self, object)),
        };
        Ok(sql)
    }

    fn drop_is_guarded(&self, kind: ObjectKind) -> bool {
        // no DROP INDEX IF EXISTS
        kind != ObjectKind::Index
    }

    fn existence_probe(&self, object: &SchemaObject) -> Result<ExistenceProbe> {
        let (database, name) = split_qualified(&object.name);
        let probe = match object.kind {
            ObjectKind::Database => ExistenceProbe::MatchRow {
                sql: format!("SHOW DATABASES LIKE {}", like_literal(&object.name)),
                columns: vec![(0, object.name.clone())],
            },
            ObjectKind::Table => tables_probe(database, name, "BASE TABLE"),
            ObjectKind::View => tables_probe(database, name, "VIEW"),
            ObjectKind::Index => {
                let (target_database, table) = split_qualified(require_target(object)?);
                let mut sql = format!("SHOW INDEX FROM {}", self.quote_identifier(&table));
                if let Some(db) = target_database.or(database) {
                    sql.push_str(&format!(" IN {}", self.quote_identifier(&db)));
                }
                sql.push_str(&format!(" WHERE Key_name = {}", string_literal(&name)));
                ExistenceProbe::MatchRow {
                    sql,
                    columns: vec![(2, name)],
                }
            }
            ObjectKind::Procedure => {
                let scope = match database {
                    Some(db) => string_literal(&db),
                    None => "DATABASE()".to_string(),
                };
                ExistenceProbe::MatchRow {
                    sql: format!(
                        "SHOW PROCEDURE STATUS WHERE Db = {} AND Name = {}",
                        scope,
                        string_literal(&name)
                    ),
                    columns: vec![(1, name)],
                }
            }
            ObjectKind::Schema | ObjectKind::Rule => return Err(unsupported(self, object)),
        };
        Ok(probe)
    }

    fn index_probe_needs_table(&self) -> bool {
        true
    }

    fn current_database_sql(&self) -> Option<&'static str> {
        Some("SELECT DATABASE()")
    }
}

fn tables_probe(database: Option<String>, name: String, table_type: &str) -> ExistenceProbe {
    let mut sql = "SHOW FULL TABLES".to_string();
    if let Some(db) = database {
        sql.push_str(&format!(" IN {}", MySql.quote_identifier(&db)));
    }
    sql.push_str(&format!(" LIKE {}", like_literal(&name)));
    ExistenceProbe::MatchRow {
        sql,
        columns: vec![(0, name), (1, table_type.to_string())],
    }
}

fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// A LIKE pattern matching `value` literally.
fn like_literal(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("'{}'", escaped.replace('\\', "\\\\").replace('\'', "''"))
}
