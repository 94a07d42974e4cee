pub mod adapter;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod interpolate;
pub mod object;
pub mod resolver;
pub mod script;

pub mod prelude {
    pub use crate::adapter::{connect, AdapterKind, RowSet, SchemaAdapter, Value};
    pub use crate::backend::{Backend, Capabilities, MySql, Postgres, QuoteCache, Sqlite};
    pub use crate::catalog::SchemaCatalog;
    pub use crate::config::{load_database_config, ConnectionConfig, ConnectionOverrides, Settings};
    pub use crate::engine::{ExecutionEngine, ObjectOutcome, RunState};
    pub use crate::error::{Error, Result};
    pub use crate::interpolate::Interpolator;
    pub use crate::object::{Direction, ObjectId, ObjectKind, SchemaObject};
    pub use crate::resolver::DependencyResolver;
    pub use crate::script::{FsScriptLocator, MemoryScripts, Script, ScriptLocator, ScriptSource};

    #[cfg(feature = "sqlite")]
    pub use crate::adapter::SqliteAdapter;

    #[cfg(feature = "postgres")]
    pub use crate::adapter::PostgresAdapter;

    #[cfg(feature = "mysql")]
    pub use crate::adapter::MySqlAdapter;
}
