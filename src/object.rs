use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Database,
    Schema,
    Table,
    View,
    Index,
    Rule,
    Procedure,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 7] = [
        ObjectKind::Database,
        ObjectKind::Schema,
        ObjectKind::Table,
        ObjectKind::View,
        ObjectKind::Index,
        ObjectKind::Rule,
        ObjectKind::Procedure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Database => "database",
            ObjectKind::Schema => "schema",
            ObjectKind::Table => "table",
            ObjectKind::View => "view",
            ObjectKind::Index => "index",
            ObjectKind::Rule => "rule",
            ObjectKind::Procedure => "procedure",
        }
    }

    /// Indexes and rules only exist on an owning relation.
    pub fn requires_target(&self) -> bool {
        matches!(self, ObjectKind::Index | ObjectKind::Rule)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidIdentifier(format!("unknown object kind '{}'", s)))
    }
}

/// Identity of a schema object: its kind plus its name. Written `kind:name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId {
    pub kind: ObjectKind,
    pub name: String,
}

impl ObjectId {
    pub fn new(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidIdentifier(s.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidIdentifier(s.to_string()));
        }
        Ok(ObjectId::new(kind.trim().parse()?, name))
    }
}

impl TryFrom<String> for ObjectId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Apply,
    Revert,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Apply => "apply",
            Direction::Revert => "revert",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared database object managed by an apply/revert script pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaObject {
    pub kind: ObjectKind,
    pub name: String,
    /// Owning relation for indexes and rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<ObjectId>,
}

impl SchemaObject {
    pub fn new(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            target: None,
            depends_on: Vec::new(),
        }
    }

    pub fn table(name: impl Into<String>) -> Self {
        Self::new(ObjectKind::Table, name)
    }

    pub fn view(name: impl Into<String>) -> Self {
        Self::new(ObjectKind::View, name)
    }

    pub fn index(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self::new(ObjectKind::Index, name).on(table)
    }

    pub fn rule(name: impl Into<String>, relation: impl Into<String>) -> Self {
        Self::new(ObjectKind::Rule, name).on(relation)
    }

    pub fn on(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Declare dependencies. Duplicates are collapsed, first occurrence wins.
    pub fn depends_on(mut self, ids: impl IntoIterator<Item = ObjectId>) -> Self {
        for id in ids {
            if !self.depends_on.contains(&id) {
                self.depends_on.push(id);
            }
        }
        self
    }

    pub fn id(&self) -> ObjectId {
        ObjectId::new(self.kind, self.name.clone())
    }

    pub fn is(&self, id: &ObjectId) -> bool {
        self.kind == id.kind && self.name == id.name
    }
}
