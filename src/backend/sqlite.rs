use sea_query::{Alias, Expr, Query, SqliteQueryBuilder};

use crate::backend::{
    require_target, split_qualified, unsupported, Backend, Capabilities, ExistenceProbe,
    QuoteCache,
};
use crate::error::Result;
use crate::object::{ObjectKind, SchemaObject};

static CAPABILITIES: Capabilities = Capabilities {
    backend: "sqlite",
    supported_kinds: &[ObjectKind::Table, ObjectKind::View, ObjectKind::Index],
    quote_char: '"',
    supports_savepoints: true,
    supports_transactional_ddl: true,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Backend for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn capabilities(&self) -> &'static Capabilities {
        &CAPABILITIES
    }

    fn drop_sql(&self, object: &SchemaObject, quotes: &mut QuoteCache) -> Result<String> {
        let name = quotes.quote(&object.name);
        let sql = match object.kind {
            ObjectKind::Table => format!("DROP TABLE IF EXISTS {}", name),
            ObjectKind::View => format!("DROP VIEW IF EXISTS {}", name),
            ObjectKind::Index => {
                require_target(object)?;
                format!("DROP INDEX IF EXISTS {}", name)
            }
            _ => return Err(unsupported(self, object)),
        };
        Ok(sql)
    }

    fn existence_probe(&self, object: &SchemaObject) -> Result<ExistenceProbe> {
        let entry_type = match object.kind {
            ObjectKind::Table => "table",
            ObjectKind::View => "view",
            ObjectKind::Index => "index",
            _ => return Err(unsupported(self, object)),
        };

        let (schema, name) = split_qualified(&object.name);
        let mut query = Query::select();
        query.expr(Expr::cust("COUNT(*)"));
        match schema {
            Some(schema) => query.from((Alias::new(schema), Alias::new("sqlite_master"))),
            None => query.from(Alias::new("sqlite_master")),
        };
        query
            .and_where(Expr::col(Alias::new("type")).eq(entry_type))
            .and_where(Expr::col(Alias::new("name")).eq(name));

        if object.kind == ObjectKind::Index {
            let (_, table) = split_qualified(require_target(object)?);
            query.and_where(Expr::col(Alias::new("tbl_name")).eq(table));
        }

        Ok(ExistenceProbe::Count(query.to_string(SqliteQueryBuilder)))
    }

    fn current_database_sql(&self) -> Option<&'static str> {
        None
    }
}
