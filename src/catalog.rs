use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::object::{ObjectId, SchemaObject};

/// Declared schema objects in declaration order.
#[derive(Debug, Default, Clone)]
pub struct SchemaCatalog {
    objects: HashMap<ObjectId, SchemaObject>,
    order: Vec<ObjectId>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    objects: Vec<SchemaObject>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a catalog document:
    ///
    /// ```yaml
    /// objects:
    ///   - kind: table
    ///     name: users
    ///   - kind: index
    ///     name: users_email_idx
    ///     target: users
    ///     depends_on: [table:users]
    /// ```
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(source)?;
        let mut catalog = Self::new();
        for object in file.objects {
            catalog.register(object)?;
        }
        Ok(catalog)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&source)
    }

    pub fn register(&mut self, object: SchemaObject) -> Result<()> {
        let id = object.id();
        if self.objects.contains_key(&id) {
            return Err(Error::Config(format!("{} is declared twice", id)));
        }
        if object.depends_on.contains(&id) {
            return Err(Error::Config(format!("{} depends on itself", id)));
        }
        self.objects.insert(id.clone(), object);
        self.order.push(id);
        Ok(())
    }

    pub fn with(mut self, object: SchemaObject) -> Result<Self> {
        self.register(object)?;
        Ok(self)
    }

    pub fn get(&self, id: &ObjectId) -> Option<&SchemaObject> {
        self.objects.get(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &SchemaObject> {
        self.order.iter().filter_map(|id| self.objects.get(id))
    }

    /// Look up a request written either as `kind:name` or as a bare name.
    /// A bare name must match exactly one declared object.
    pub fn find(&self, request: &str) -> Result<&SchemaObject> {
        if let Ok(id) = request.parse::<ObjectId>() {
            return self
                .get(&id)
                .ok_or_else(|| Error::UnknownObject(request.to_string()));
        }

        let mut matches = self.all().filter(|object| object.name == request);
        match (matches.next(), matches.next()) {
            (Some(object), None) => Ok(object),
            (Some(_), Some(_)) => Err(Error::Config(format!(
                "'{}' is ambiguous; qualify it as kind:name",
                request
            ))),
            (None, _) => Err(Error::UnknownObject(request.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
