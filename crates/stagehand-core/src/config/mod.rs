//! Configuration for an orchestration run
//!
//! Loaded from `stagehand.toml`. Lookup order:
//! - the path given with `--config`
//! - `./stagehand.toml`
//! - `<config dir>/stagehand/stagehand.toml`
//!
//! A missing file at the default locations yields the built-in defaults.

pub mod paths;
pub mod schema;

use std::path::Path;

use crate::error::{Error, Result};

pub use paths::{CONFIG_FILE_NAME, default_config_path};
pub use schema::{
    AgentConfig, BootstrapConfig, CaConfig, ClassifierConfig, Config, InstallerConfig,
    InventoryConfig, PollConfig, RemoteConfig, TopologyConfig,
};

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the explicit path if given, otherwise the default location or defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) => Self::from_file(path),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.inventory.primary.trim().is_empty() {
            return invalid("inventory.primary cannot be empty");
        }
        if self.inventory.pool_address.trim().is_empty() {
            return invalid("inventory.pool_address cannot be empty");
        }
        if !self.inventory.secondary_pattern.contains("{n}") {
            return invalid("inventory.secondary_pattern must contain '{n}'");
        }
        if self.poll.max_attempts == 0 {
            return invalid("poll.max_attempts must be at least 1");
        }
        if self.agent.success_statuses.is_empty() {
            return invalid("agent.success_statuses cannot be empty");
        }
        if self.remote.user.trim().is_empty() {
            return invalid("remote.user cannot be empty");
        }
        url::Url::parse(&self.classifier.url).map_err(|e| Error::InvalidConfig {
            message: format!("classifier.url is not a valid URL: {}", e),
        })?;
        Ok(())
    }

    /// Installer path with the product version substituted.
    pub fn installer_path(&self, version_override: Option<&str>) -> String {
        let version = version_override.unwrap_or(&self.installer.version);
        expand(&self.installer.path, &[("version", version)])
    }
}

fn invalid(message: &str) -> Result<()> {
    Err(Error::InvalidConfig {
        message: message.to_string(),
    })
}

/// Replace `{key}` placeholders in a command template.
pub fn expand(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}
