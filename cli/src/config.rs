//! CLI configuration file.
//!
//! A TOML file with three optional parts: `[engine]` settings passed to the
//! orchestrator, `[log]`, and any number of `[[sources]]` connection
//! profiles. Passwords never live in the file; each source names the
//! environment variable holding its password.

use anyhow::{bail, Context};
use dbmigrate_engine::{ConnectionProfile, EngineSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "dbmigrate.toml";
pub const CONFIG_ENV: &str = "DBMIGRATE_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub engine: EngineSettings,
    pub log: LogConfig,
    pub sources: Vec<SourceProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceProfile {
    /// Unique source name used on the command line
    pub id: String,

    /// Engine identifier (mysql, postgres, mongo)
    pub engine: String,

    pub host: String,
    pub port: u16,
    pub user: String,

    /// Environment variable holding the password
    #[serde(default = "default_password_env")]
    pub password_env: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_password_env() -> String {
    "DBMIGRATE_PASSWORD".to_string()
}

impl SourceProfile {
    /// Resolve the password from the environment into a full profile.
    pub fn to_profile(&self) -> anyhow::Result<ConnectionProfile> {
        let password = std::env::var(&self.password_env).with_context(|| {
            format!(
                "password variable {} for source '{}' is not set",
                self.password_env, self.id
            )
        })?;

        Ok(ConnectionProfile {
            id: self.id.clone(),
            engine: self.engine.clone(),
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password,
        })
    }
}

impl CliConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: CliConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Like `from_file`, but a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(CliConfig::default());
        }
        Self::from_file(path)
    }

    /// Explicit path, then `DBMIGRATE_CONFIG`, then `dbmigrate.toml`.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    pub fn source(&self, id: &str) -> anyhow::Result<&SourceProfile> {
        match self.sources.iter().find(|s| s.id == id) {
            Some(source) => Ok(source),
            None => bail!("no source named '{}' in configuration", id),
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.id.as_str()) {
                bail!("duplicate source id '{}'", source.id);
            }
        }
        if self.engine.compression_level > 9 {
            bail!(
                "compression_level must be between 0 and 9, got {}",
                self.engine.compression_level
            );
        }
        Ok(())
    }
}
