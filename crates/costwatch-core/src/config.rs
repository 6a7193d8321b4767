//! Exporter configuration model and the reload seam.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SubstitutionError};
use crate::vars;

/// How outgoing requests authenticate against the provider API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    #[default]
    None,
    BearerToken,
    CertFile,
}

/// Billing provider identity; feeds metric naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
}

/// One poll target. Immutable for the duration of a cycle; the driver may
/// reload it between cycles when `reload_each_cycle` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExporterConfig {
    pub provider: Provider,
    /// Target URL template; `<var>` placeholders resolve against
    /// `additional_variables` and the process environment.
    pub url: String,
    #[serde(default)]
    pub require_authentication: bool,
    #[serde(default)]
    pub authentication_method: AuthMethod,
    #[serde(default)]
    pub additional_variables: BTreeMap<String, String>,
    pub polling_interval_seconds: u64,
    #[serde(default)]
    pub reload_each_cycle: bool,
}

impl ExporterConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_seconds)
    }

    /// URL template with every `<var>` placeholder resolved.
    pub fn resolved_url(&self) -> Result<String, SubstitutionError> {
        vars::substitute(&self.url, &self.additional_variables)
    }
}

/// Parses a YAML configuration document.
pub fn parse(raw: &str) -> Result<ExporterConfig, ConfigError> {
    Ok(serde_yaml::from_str(raw)?)
}

/// Reads and parses a YAML configuration file.
pub fn load(path: &Path) -> Result<ExporterConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse(&raw)
}

/// Where the poll driver obtains its configuration each cycle.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<ExporterConfig, ConfigError>;
}

/// Re-reads a YAML file on every load.
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<ExporterConfig, ConfigError> {
        load(&self.path)
    }
}

/// Hands out a fixed configuration; used by tests and single-shot runs.
pub struct StaticConfigSource {
    config: ExporterConfig,
}

impl StaticConfigSource {
    pub fn new(config: ExporterConfig) -> Self {
        Self { config }
    }
}

impl ConfigSource for StaticConfigSource {
    fn load(&self) -> Result<ExporterConfig, ConfigError> {
        Ok(self.config.clone())
    }
}
