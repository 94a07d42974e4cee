use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::object::{Direction, ObjectId, SchemaObject};

/// Where the SQL executed for an object came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptSource {
    Stored,
    /// Generated drop for a revert with no stored script.
    Synthesized,
    /// Nothing executed; the object was already absent.
    Skipped,
}

impl fmt::Display for ScriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptSource::Stored => f.write_str("stored"),
            ScriptSource::Synthesized => f.write_str("synthesized"),
            ScriptSource::Skipped => f.write_str("skipped"),
        }
    }
}

/// The SQL for one object in one direction, as it moves through a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub object: SchemaObject,
    pub direction: Direction,
    pub raw_content: Option<String>,
    pub resolved_sql: Option<String>,
    pub source: ScriptSource,
}

impl Script {
    pub fn new(object: SchemaObject, direction: Direction) -> Self {
        Self {
            object,
            direction,
            raw_content: None,
            resolved_sql: None,
            source: ScriptSource::Stored,
        }
    }

    pub fn stored(mut self, content: String) -> Self {
        self.raw_content = Some(content);
        self.source = ScriptSource::Stored;
        self
    }

    pub fn synthesized(mut self, content: String) -> Self {
        self.raw_content = Some(content);
        self.source = ScriptSource::Synthesized;
        self
    }

    pub fn id(&self) -> ObjectId {
        self.object.id()
    }

    /// Label used for the statement in logs and errors.
    pub fn label(&self) -> String {
        format!("{} {}", self.object.id(), self.direction)
    }
}

/// Looks up stored SQL for an object and direction.
pub trait ScriptLocator {
    /// `Ok(None)` when no script is stored.
    fn locate(&self, object: &SchemaObject, direction: Direction) -> Result<Option<String>>;
}

/// Scripts stored as files named `<kind>.<name>.<direction>.sql`.
///
/// With a backend set, `<root>/<backend>/` is searched before `<root>/`, so
/// dialect-specific scripts can override shared ones.
#[derive(Debug, Clone)]
pub struct FsScriptLocator {
    root: PathBuf,
    backend: Option<String>,
}

impl FsScriptLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            backend: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.scripts_path.clone())
    }

    pub fn for_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<kind>.<name>.<direction>.sql`. Names that would reach outside the
    /// scripts root are rejected.
    pub fn file_name(object: &SchemaObject, direction: Direction) -> Result<String> {
        let name = object.name.as_str();
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0'])
        {
            return Err(Error::InvalidIdentifier(format!(
                "{} is not usable as a script file name",
                object.id()
            )));
        }
        Ok(format!("{}.{}.{}.sql", object.kind, name, direction))
    }

    /// Paths searched for a script, most specific first.
    pub fn candidates(&self, object: &SchemaObject, direction: Direction) -> Result<Vec<PathBuf>> {
        let file_name = Self::file_name(object, direction)?;
        let mut paths = Vec::with_capacity(2);
        if let Some(backend) = &self.backend {
            paths.push(self.root.join(backend).join(&file_name));
        }
        paths.push(self.root.join(file_name));
        Ok(paths)
    }
}

impl ScriptLocator for FsScriptLocator {
    fn locate(&self, object: &SchemaObject, direction: Direction) -> Result<Option<String>> {
        for path in self.candidates(object, direction)? {
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    trace!(path = %path.display(), "script found");
                    return Ok(Some(content));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }
}

/// Scripts held in memory, keyed by object and direction.
#[derive(Debug, Clone, Default)]
pub struct MemoryScripts {
    scripts: HashMap<(ObjectId, Direction), String>,
}

impl MemoryScripts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ObjectId, direction: Direction, sql: impl Into<String>) {
        self.scripts.insert((id, direction), sql.into());
    }

    pub fn apply(mut self, id: ObjectId, sql: impl Into<String>) -> Self {
        self.insert(id, Direction::Apply, sql);
        self
    }

    pub fn revert(mut self, id: ObjectId, sql: impl Into<String>) -> Self {
        self.insert(id, Direction::Revert, sql);
        self
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

impl ScriptLocator for MemoryScripts {
    fn locate(&self, object: &SchemaObject, direction: Direction) -> Result<Option<String>> {
        Ok(self.scripts.get(&(object.id(), direction)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectKind;
    use std::fs;

    #[test]
    fn file_names_follow_kind_name_direction() {
        let users = SchemaObject::table("users");
        assert_eq!(
            FsScriptLocator::file_name(&users, Direction::Apply).unwrap(),
            "table.users.apply.sql"
        );
        assert_eq!(
            FsScriptLocator::file_name(&SchemaObject::index("users_idx", "users"), Direction::Revert)
                .unwrap(),
            "index.users_idx.revert.sql"
        );
    }

    #[test]
    fn backend_directory_overrides_shared_script() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("postgres")).unwrap();
        fs::write(dir.path().join("table.users.apply.sql"), "CREATE TABLE users (id int)").unwrap();
        fs::write(
            dir.path().join("postgres").join("table.users.apply.sql"),
            "CREATE TABLE users (id serial)",
        )
        .unwrap();

        let users = SchemaObject::table("users");
        let shared = FsScriptLocator::new(dir.path());
        let postgres = FsScriptLocator::new(dir.path()).for_backend("postgres");
        let mysql = FsScriptLocator::new(dir.path()).for_backend("mysql");

        assert_eq!(
            shared.locate(&users, Direction::Apply).unwrap().as_deref(),
            Some("CREATE TABLE users (id int)")
        );
        assert_eq!(
            postgres.locate(&users, Direction::Apply).unwrap().as_deref(),
            Some("CREATE TABLE users (id serial)")
        );
        assert_eq!(
            mysql.locate(&users, Direction::Apply).unwrap().as_deref(),
            Some("CREATE TABLE users (id int)")
        );
    }

    #[test]
    fn root_defaults_from_settings() {
        let locator = FsScriptLocator::from_settings(&Settings::default()).for_backend("mysql");
        assert_eq!(
            locator
                .candidates(&SchemaObject::table("users"), Direction::Apply)
                .unwrap(),
            vec![
                PathBuf::from("db/schemata/mysql/table.users.apply.sql"),
                PathBuf::from("db/schemata/table.users.apply.sql"),
            ]
        );
    }

    #[test]
    fn names_cannot_leave_the_scripts_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("scripts");
        fs::create_dir(&root).unwrap();
        fs::write(dir.path().join("secret.sql"), "DROP TABLE users").unwrap();
        fs::write(root.join("table.blog.users.apply.sql"), "CREATE TABLE blog.users ()").unwrap();
        let locator = FsScriptLocator::new(&root);

        for name in ["../secret", "blog/users", "..\\secret", ".."] {
            let result = locator.locate(&SchemaObject::table(name), Direction::Apply);
            assert!(
                matches!(result, Err(Error::InvalidIdentifier(_))),
                "{} was accepted",
                name
            );
        }
        assert_eq!(
            locator
                .locate(&SchemaObject::table("blog.users"), Direction::Apply)
                .unwrap()
                .as_deref(),
            Some("CREATE TABLE blog.users ()")
        );
    }

    #[test]
    fn missing_files_are_absent() {
        let dir = tempfile::tempdir().unwrap();
        let locator = FsScriptLocator::new(dir.path()).for_backend("sqlite");
        let found = locator
            .locate(&SchemaObject::view("recent"), Direction::Revert)
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn memory_scripts_lookup() {
        let users = ObjectId::new(ObjectKind::Table, "users");
        let scripts = MemoryScripts::new()
            .apply(users.clone(), "CREATE TABLE users (id int)")
            .revert(users, "DROP TABLE users");

        let table = SchemaObject::table("users");
        assert_eq!(scripts.len(), 2);
        assert_eq!(
            scripts.locate(&table, Direction::Revert).unwrap().as_deref(),
            Some("DROP TABLE users")
        );
        assert!(scripts
            .locate(&SchemaObject::view("users"), Direction::Apply)
            .unwrap()
            .is_none());
    }

    #[test]
    fn script_label_names_object_and_direction() {
        let script = Script::new(SchemaObject::table("users"), Direction::Revert)
            .synthesized("DROP TABLE IF EXISTS \"users\"".to_string());
        assert_eq!(script.label(), "table:users revert");
        assert_eq!(script.source, ScriptSource::Synthesized);
    }
}
