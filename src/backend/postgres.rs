use sea_query::{
    Alias, Expr, JoinType, PostgresQueryBuilder, Query, SimpleExpr,
};

use crate::backend::{
    require_target, split_qualified, unsupported, Backend, Capabilities, ExistenceProbe,
    QuoteCache,
};
use crate::error::Result;
use crate::object::{ObjectKind, SchemaObject};

static CAPABILITIES: Capabilities = Capabilities {
    backend: "postgres",
    supported_kinds: &[
        ObjectKind::Database,
        ObjectKind::Schema,
        ObjectKind::Table,
        ObjectKind::View,
        ObjectKind::Rule,
        ObjectKind::Index,
    ],
    quote_char: '"',
    supports_savepoints: true,
    supports_transactional_ddl: true,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Backend for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn capabilities(&self) -> &'static Capabilities {
        &CAPABILITIES
    }

    fn drop_sql(&self, object: &SchemaObject, quotes: &mut QuoteCache) -> Result<String> {
        let name = quotes.quote(&object.name);
        let sql = match object.kind {
            ObjectKind::Database => format!("DROP DATABASE IF EXISTS {}", name),
            ObjectKind::Schema => format!("DROP SCHEMA IF EXISTS {}", name),
            ObjectKind::Table => format!("DROP TABLE IF EXISTS {}", name),
            ObjectKind::View => format!("DROP VIEW IF EXISTS {}", name),
            ObjectKind::Index => {
                require_target(object)?;
                format!("DROP INDEX IF EXISTS {}", name)
            }
            ObjectKind::Rule => {
                let target = quotes.quote(require_target(object)?);
                format!("DROP RULE IF EXISTS {} ON {}", name, target)
            }
            ObjectKind::Procedure => return Err(unsupported(self, object)),
        };
        Ok(sql)
    }

    fn existence_probe(&self, object: &SchemaObject) -> Result<ExistenceProbe> {
        let sql = match object.kind {
            ObjectKind::Database => count_where("pg_database", "datname", &object.name),
            ObjectKind::Schema => count_where("pg_namespace", "nspname", &object.name),
            ObjectKind::Table => relation_count("r", &object.name),
            ObjectKind::View => relation_count("v", &object.name),
            ObjectKind::Rule => {
                owned_count("pg_rules", "rulename", &object.name, require_target(object)?)
            }
            ObjectKind::Index => {
                owned_count("pg_indexes", "indexname", &object.name, require_target(object)?)
            }
            ObjectKind::Procedure => return Err(unsupported(self, object)),
        };
        Ok(ExistenceProbe::Count(sql))
    }

    fn current_database_sql(&self) -> Option<&'static str> {
        Some("SELECT current_database()")
    }
}

fn count_where(catalog: &str, column: &str, value: &str) -> String {
    Query::select()
        .expr(Expr::cust("COUNT(*)"))
        .from(Alias::new(catalog))
        .and_where(Expr::col(Alias::new(column)).eq(value))
        .to_string(PostgresQueryBuilder)
}

/// Objects in `pg_class` of the given `relkind`, scoped to the explicit
/// schema or else to the active search path.
fn relation_count(relkind: &str, name: &str) -> String {
    let (schema, relation) = split_qualified(name);
    Query::select()
        .expr(Expr::cust("COUNT(*)"))
        .from_as(Alias::new("pg_class"), Alias::new("c"))
        .join_as(
            JoinType::LeftJoin,
            Alias::new("pg_namespace"),
            Alias::new("n"),
            Expr::col((Alias::new("n"), Alias::new("oid")))
                .equals((Alias::new("c"), Alias::new("relnamespace"))),
        )
        .and_where(Expr::col((Alias::new("c"), Alias::new("relkind"))).eq(relkind))
        .and_where(Expr::col((Alias::new("c"), Alias::new("relname"))).eq(relation))
        .and_where(schema_filter(Some("n"), "nspname", schema))
        .to_string(PostgresQueryBuilder)
}

/// Rules and indexes, looked up by their own name and their owning table.
fn owned_count(catalog: &str, name_column: &str, name: &str, target: &str) -> String {
    let (schema, object) = split_qualified(name);
    let (_, table) = split_qualified(target);
    Query::select()
        .expr(Expr::cust("COUNT(*)"))
        .from(Alias::new(catalog))
        .and_where(Expr::col(Alias::new(name_column)).eq(object))
        .and_where(Expr::col(Alias::new("tablename")).eq(table))
        .and_where(schema_filter(None, "schemaname", schema))
        .to_string(PostgresQueryBuilder)
}

fn schema_filter(table: Option<&str>, column: &str, schema: Option<String>) -> SimpleExpr {
    match (table, schema) {
        (Some(table), Some(schema)) => {
            Expr::col((Alias::new(table), Alias::new(column))).eq(schema)
        }
        (None, Some(schema)) => Expr::col(Alias::new(column)).eq(schema),
        (Some(table), None) => Expr::cust(format!(
            "{}.{} = ANY (current_schemas(false))",
            table, column
        )),
        (None, None) => Expr::cust(format!("{} = ANY (current_schemas(false))", column)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn postgres_backend_name() {
        assert_eq!(Postgres.name(), "postgres");
    }

    #[test]
    fn postgres_supports_transactional_ddl_and_savepoints() {
        assert!(Postgres.supports_transactional_ddl());
        assert!(Postgres.supports_savepoints());
    }

    #[test]
    fn postgres_supported_kinds() {
        let caps = Postgres.capabilities();
        for kind in [
            ObjectKind::Database,
            ObjectKind::Schema,
            ObjectKind::Table,
            ObjectKind::View,
            ObjectKind::Rule,
            ObjectKind::Index,
        ] {
            assert!(caps.supports(kind), "{} should be supported", kind);
        }
        assert!(!caps.supports(ObjectKind::Procedure));
    }

    #[test]
    fn postgres_drop_statements_are_guarded() {
        let mut quotes = QuoteCache::for_backend(&Postgres);

        let table = Postgres
            .drop_sql(&SchemaObject::table("users"), &mut quotes)
            .unwrap();
        assert_eq!(table, "DROP TABLE IF EXISTS \"users\"");

        let view = Postgres
            .drop_sql(&SchemaObject::view("reporting.totals"), &mut quotes)
            .unwrap();
        assert_eq!(view, "DROP VIEW IF EXISTS \"reporting\".\"totals\"");

        let schema = Postgres
            .drop_sql(&SchemaObject::new(ObjectKind::Schema, "reporting"), &mut quotes)
            .unwrap();
        assert_eq!(schema, "DROP SCHEMA IF EXISTS \"reporting\"");

        let rule = Postgres
            .drop_sql(&SchemaObject::rule("protect", "users"), &mut quotes)
            .unwrap();
        assert_eq!(rule, "DROP RULE IF EXISTS \"protect\" ON \"users\"");

        let index = Postgres
            .drop_sql(&SchemaObject::index("users_email_idx", "users"), &mut quotes)
            .unwrap();
        assert_eq!(index, "DROP INDEX IF EXISTS \"users_email_idx\"");

        for kind in ObjectKind::ALL {
            assert!(Postgres.drop_is_guarded(kind));
        }
    }

    #[test]
    fn postgres_drop_requires_target_for_rules_and_indexes() {
        let mut quotes = QuoteCache::for_backend(&Postgres);
        for kind in [ObjectKind::Rule, ObjectKind::Index] {
            let orphan = SchemaObject::new(kind, "orphan");
            assert!(matches!(
                Postgres.drop_sql(&orphan, &mut quotes),
                Err(Error::MissingTarget(_))
            ));
        }
    }

    #[test]
    fn postgres_table_probe_uses_search_path_without_schema() {
        let probe = Postgres
            .existence_probe(&SchemaObject::table("users"))
            .unwrap();
        let ExistenceProbe::Count(sql) = probe else {
            panic!("expected a count probe");
        };
        assert!(sql.contains("\"pg_class\""));
        assert!(sql.contains("'r'"));
        assert!(sql.contains("'users'"));
        assert!(sql.contains("current_schemas(false)"));
    }

    #[test]
    fn postgres_view_probe_scopes_explicit_schema() {
        let probe = Postgres
            .existence_probe(&SchemaObject::view("reporting.totals"))
            .unwrap();
        let sql = probe.sql();
        assert!(sql.contains("'v'"));
        assert!(sql.contains("'totals'"));
        assert!(sql.contains("'reporting'"));
        assert!(!sql.contains("current_schemas"));
    }

    #[test]
    fn postgres_rule_and_index_probes_use_target() {
        let rule = Postgres
            .existence_probe(&SchemaObject::rule("protect", "test_view"))
            .unwrap();
        assert!(rule.sql().contains("\"pg_rules\""));
        assert!(rule.sql().contains("'test_view'"));

        let index = Postgres
            .existence_probe(&SchemaObject::index("test_index", "test_table"))
            .unwrap();
        assert!(index.sql().contains("\"pg_indexes\""));
        assert!(index.sql().contains("'test_index'"));
        assert!(index.sql().contains("'test_table'"));

        assert!(matches!(
            Postgres.existence_probe(&SchemaObject::new(ObjectKind::Index, "loose")),
            Err(Error::MissingTarget(_))
        ));
    }

    #[test]
    fn postgres_database_probe_reads_pg_database() {
        let probe = Postgres
            .existence_probe(&SchemaObject::new(ObjectKind::Database, "demo"))
            .unwrap();
        assert!(probe.sql().contains("\"pg_database\""));
        assert!(probe.sql().contains("'demo'"));
    }

    #[test]
    fn postgres_savepoint_statements() {
        assert_eq!(Postgres.savepoint_sql("sp_1"), "SAVEPOINT \"sp_1\"");
        assert_eq!(
            Postgres.rollback_to_savepoint_sql("sp_1"),
            "ROLLBACK TO SAVEPOINT \"sp_1\""
        );
        assert_eq!(
            Postgres.release_savepoint_sql("sp_1"),
            "RELEASE SAVEPOINT \"sp_1\""
        );
    }
}
