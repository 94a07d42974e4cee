mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySql;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::object::{ObjectKind, SchemaObject};

/// Fixed facts about a backend, consulted before any SQL is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub backend: &'static str,
    pub supported_kinds: &'static [ObjectKind],
    pub quote_char: char,
    pub supports_savepoints: bool,
    pub supports_transactional_ddl: bool,
}

impl Capabilities {
    pub fn supports(&self, kind: ObjectKind) -> bool {
        self.supported_kinds.contains(&kind)
    }

    pub fn check(&self, object: &SchemaObject) -> Result<()> {
        if self.supports(object.kind) {
            Ok(())
        } else {
            Err(Error::UnsupportedObjectKind {
                backend: self.backend,
                kind: object.kind,
                object: object.id(),
            })
        }
    }
}

/// How to tell from a result set whether an object exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExistenceProbe {
    /// The query returns a single count; the object exists when it is positive.
    Count(String),
    /// The object exists when some row has every `(column, value)` pair.
    MatchRow {
        sql: String,
        columns: Vec<(usize, String)>,
    },
}

impl ExistenceProbe {
    pub fn sql(&self) -> &str {
        match self {
            ExistenceProbe::Count(sql) => sql,
            ExistenceProbe::MatchRow { sql, .. } => sql,
        }
    }
}

/// SQL dialect of a backend. Pure: nothing here touches a connection.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;
    fn capabilities(&self) -> &'static Capabilities;

    fn supports_transactional_ddl(&self) -> bool {
        self.capabilities().supports_transactional_ddl
    }

    fn supports_savepoints(&self) -> bool {
        self.capabilities().supports_savepoints
    }

    /// Quote one identifier part, doubling embedded quote characters.
    fn quote_identifier(&self, name: &str) -> String {
        quote_part(self.capabilities().quote_char, name)
    }

    /// `IF EXISTS` drop for `object`, or a plain drop where the dialect has
    /// no guarded form (see [`Backend::drop_is_guarded`]).
    fn drop_sql(&self, object: &SchemaObject, quotes: &mut QuoteCache) -> Result<String>;

    /// Whether [`Backend::drop_sql`] for this kind is safe to run when the
    /// object is already gone.
    fn drop_is_guarded(&self, _kind: ObjectKind) -> bool {
        true
    }

    fn existence_probe(&self, object: &SchemaObject) -> Result<ExistenceProbe>;

    /// The dialect errors when an index probe names a missing table, so the
    /// table has to be probed first.
    fn index_probe_needs_table(&self) -> bool {
        false
    }

    fn current_database_sql(&self) -> Option<&'static str>;

    fn begin_sql(&self) -> &'static str {
        "BEGIN"
    }

    fn commit_sql(&self) -> &'static str {
        "COMMIT"
    }

    fn rollback_sql(&self) -> &'static str {
        "ROLLBACK"
    }

    fn savepoint_sql(&self, name: &str) -> String {
        format!("SAVEPOINT {}", self.quote_identifier(name))
    }

    fn rollback_to_savepoint_sql(&self, name: &str) -> String {
        format!("ROLLBACK TO SAVEPOINT {}", self.quote_identifier(name))
    }

    fn release_savepoint_sql(&self, name: &str) -> String {
        format!("RELEASE SAVEPOINT {}", self.quote_identifier(name))
    }
}

/// Memoized identifier quoting, owned by one adapter and cleared on reconnect.
#[derive(Debug, Clone)]
pub struct QuoteCache {
    quote_char: char,
    quoted: HashMap<String, String>,
}

impl QuoteCache {
    pub fn new(quote_char: char) -> Self {
        Self {
            quote_char,
            quoted: HashMap::new(),
        }
    }

    pub fn for_backend(backend: &dyn Backend) -> Self {
        Self::new(backend.capabilities().quote_char)
    }

    /// Quote a possibly schema-qualified name: `a.b` becomes `"a"."b"`.
    pub fn quote(&mut self, name: &str) -> String {
        if let Some(quoted) = self.quoted.get(name) {
            return quoted.clone();
        }

        let quoted = match split_qualified(name) {
            (Some(schema), relation) => format!(
                "{}.{}",
                quote_part(self.quote_char, &schema),
                quote_part(self.quote_char, &relation)
            ),
            (None, relation) => quote_part(self.quote_char, &relation),
        };
        self.quoted.insert(name.to_string(), quoted.clone());
        quoted
    }

    pub fn clear(&mut self) {
        self.quoted.clear();
    }

    pub fn len(&self) -> usize {
        self.quoted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quoted.is_empty()
    }
}

fn quote_part(quote_char: char, name: &str) -> String {
    let doubled: String = [quote_char, quote_char].iter().collect();
    format!(
        "{q}{}{q}",
        name.replace(quote_char, &doubled),
        q = quote_char
    )
}

/// Split `schema.relation` into its parts, stripping surrounding quotes.
///
/// Accepts `table`, `"table.name"`, `schema.table`, `schema."table.name"`,
/// `"schema.name"."table name"` and the backtick equivalents.
pub fn split_qualified(name: &str) -> (Option<String>, String) {
    static PARTS: OnceLock<Regex> = OnceLock::new();
    let parts = PARTS.get_or_init(|| {
        Regex::new(r#"[^"`.\s]+|"[^"]*"|`[^`]*`"#).expect("qualified name pattern is valid")
    });

    let found: Vec<String> = parts
        .find_iter(name)
        .take(2)
        .map(|m| m.as_str().trim_matches(|c| c == '"' || c == '`').to_string())
        .collect();

    match found.as_slice() {
        [schema, relation] => (Some(schema.clone()), relation.clone()),
        [relation] => (None, relation.clone()),
        _ => (None, name.to_string()),
    }
}

/// The owning relation of an index or rule.
pub(crate) fn require_target(object: &SchemaObject) -> Result<&str> {
    object
        .target
        .as_deref()
        .filter(|target| !target.is_empty())
        .ok_or_else(|| Error::MissingTarget(object.id()))
}

pub(crate) fn unsupported(backend: &dyn Backend, object: &SchemaObject) -> Error {
    Error::UnsupportedObjectKind {
        backend: backend.name(),
        kind: object.kind,
        object: object.id(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_qualified_names() {
        assert_eq!(split_qualified("users"), (None, "users".to_string()));
        assert_eq!(
            split_qualified("public.users"),
            (Some("public".to_string()), "users".to_string())
        );
        assert_eq!(
            split_qualified("\"table.name\""),
            (None, "table.name".to_string())
        );
        assert_eq!(
            split_qualified("reporting.\"table.name\""),
            (Some("reporting".to_string()), "table.name".to_string())
        );
        assert_eq!(
            split_qualified("\"schema.name\".\"table name\""),
            (Some("schema.name".to_string()), "table name".to_string())
        );
        assert_eq!(
            split_qualified("`shop`.`orders`"),
            (Some("shop".to_string()), "orders".to_string())
        );
    }

    #[test]
    fn quote_cache_memoizes_per_input() {
        let mut cache = QuoteCache::new('"');
        assert!(cache.is_empty());

        assert_eq!(cache.quote("users"), "\"users\"");
        assert_eq!(cache.quote("users"), "\"users\"");
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.quote("public.users"), "\"public\".\"users\"");
        assert_eq!(cache.quote("odd\"name"), "\"odd\"\"name\"");
        assert_eq!(cache.len(), 3);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn quote_cache_uses_backend_quote_char() {
        let mut cache = QuoteCache::for_backend(&MySql);
        assert_eq!(cache.quote("shop.orders"), "`shop`.`orders`");
        assert_eq!(cache.quote("we`ird"), "`we``ird`");
    }

    #[test]
    fn capability_check_names_the_object() {
        let rule = SchemaObject::rule("protect_users", "users");
        match MySql.capabilities().check(&rule) {
            Err(Error::UnsupportedObjectKind {
                backend,
                kind,
                object,
            }) => {
                assert_eq!(backend, "mysql");
                assert_eq!(kind, ObjectKind::Rule);
                assert_eq!(object, rule.id());
            }
            other => panic!("expected unsupported kind, got {:?}", other),
        }
        assert!(Postgres.capabilities().check(&rule).is_ok());
    }

    #[test]
    fn require_target_rejects_missing_owner() {
        let orphan = SchemaObject::new(ObjectKind::Index, "orphan_idx");
        assert!(matches!(
            require_target(&orphan),
            Err(Error::MissingTarget(_))
        ));

        let blank = SchemaObject::index("blank_idx", "");
        assert!(matches!(require_target(&blank), Err(Error::MissingTarget(_))));
    }
}
