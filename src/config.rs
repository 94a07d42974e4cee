use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::adapter::AdapterKind;
use crate::error::{Error, Result};

/// One connection block from `database.yml`.
///
/// Every recognised key is a named field. Unknown keys are rejected rather
/// than forwarded to the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    pub adapter: String,
    pub database: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Unix socket path (MySQL).
    #[serde(default)]
    pub socket: Option<String>,
    /// Client encoding applied right after connecting.
    #[serde(default)]
    pub encoding: Option<String>,
    /// Postgres `client_min_messages`.
    #[serde(default)]
    pub min_messages: Option<String>,
    /// Postgres `search_path`, comma separated.
    #[serde(default)]
    pub schema_search_path: Option<String>,
}

impl ConnectionConfig {
    pub fn new(adapter: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            database: database.into(),
            host: None,
            port: None,
            username: None,
            password: None,
            socket: None,
            encoding: None,
            min_messages: None,
            schema_search_path: None,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn min_messages(mut self, level: impl Into<String>) -> Self {
        self.min_messages = Some(level.into());
        self
    }

    pub fn schema_search_path(mut self, path: impl Into<String>) -> Self {
        self.schema_search_path = Some(path.into());
        self
    }

    pub fn kind(&self) -> Result<AdapterKind> {
        self.adapter.parse()
    }

    pub fn validate(&self) -> Result<()> {
        self.kind()?;
        if self.database.trim().is_empty() {
            return Err(Error::Config(
                "no database specified; missing key: database".to_string(),
            ));
        }
        Ok(())
    }

    pub fn host_or_default(&self) -> &str {
        self.host.as_deref().unwrap_or("localhost")
    }

    /// Configured port, else the backend's standard one.
    pub fn port_or_default(&self) -> Option<u16> {
        if self.port.is_some() {
            return self.port;
        }
        match self.kind().ok()? {
            AdapterKind::Postgres => Some(5432),
            AdapterKind::MySql => Some(3306),
            AdapterKind::Sqlite => None,
        }
    }

    /// Overlay the keys set in `overrides`.
    pub fn merge(mut self, overrides: ConnectionOverrides) -> Self {
        if let Some(adapter) = overrides.adapter {
            self.adapter = adapter;
        }
        if let Some(database) = overrides.database {
            self.database = database;
        }
        self.host = overrides.host.or(self.host);
        self.port = overrides.port.or(self.port);
        self.username = overrides.username.or(self.username);
        self.password = overrides.password.or(self.password);
        self.socket = overrides.socket.or(self.socket);
        self.encoding = overrides.encoding.or(self.encoding);
        self.min_messages = overrides.min_messages.or(self.min_messages);
        self.schema_search_path = overrides.schema_search_path.or(self.schema_search_path);
        self
    }
}

/// Caller-supplied connection keys that take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionOverrides {
    pub adapter: Option<String>,
    pub database: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub socket: Option<String>,
    pub encoding: Option<String>,
    pub min_messages: Option<String>,
    pub schema_search_path: Option<String>,
}

/// Read the connection block for `environment` from an environment-keyed
/// YAML file:
///
/// ```yaml
/// test:
///   adapter: postgresql
///   database: app_test
///   schema_search_path: app,public
/// ```
pub fn load_database_config(path: impl AsRef<Path>, environment: &str) -> Result<ConnectionConfig> {
    let source = std::fs::read_to_string(path.as_ref())?;
    database_config_from_str(&source, environment)
}

pub fn database_config_from_str(source: &str, environment: &str) -> Result<ConnectionConfig> {
    let mut environments: BTreeMap<String, ConnectionConfig> = serde_yaml::from_str(source)?;
    let config = environments.remove(environment).ok_or_else(|| {
        Error::Config(format!("no database configuration for environment '{}'", environment))
    })?;
    config.validate()?;
    Ok(config)
}

fn default_scripts_path() -> PathBuf {
    PathBuf::from("db/schemata")
}

fn default_sentinel() -> char {
    '&'
}

/// Project-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_scripts_path")]
    pub scripts_path: PathBuf,
    #[serde(default = "default_sentinel")]
    pub interpolation_sentinel: char,
    /// Variables available to every script, besides `database`.
    #[serde(default)]
    pub vars: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scripts_path: default_scripts_path(),
            interpolation_sentinel: default_sentinel(),
            vars: HashMap::new(),
        }
    }
}

impl Settings {
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        if source.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_yaml_str(&std::fs::read_to_string(path)?)
    }
}
