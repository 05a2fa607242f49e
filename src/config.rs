//! Run configuration.
//!
//! Every field has a default, so an empty or partial TOML file is valid.
//! Command line flags are applied on top of whatever was loaded.
//!
//! ```toml
//! init_dir = "/etc/init.d"
//! facility_file = "/etc/insserv.conf"
//! always_on = "kbd"
//! ```

use crate::error::{Error, IoContext, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for one insserv run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Directory holding the init scripts and the runlevel directories
    pub init_dir: PathBuf,
    /// Facility definitions (`$name value...`)
    pub facility_file: PathBuf,
    /// Remove the targeted scripts instead of installing them
    pub remove: bool,
    /// Ignore failed dependency checks
    pub force: bool,
    /// Use the header defaults and drop links the headers do not ask for
    pub defaults: bool,
    /// Plan only, leave the filesystem untouched
    pub dry_run: bool,
    /// Script started on every runlevel change, never killed
    pub always_on: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            init_dir: PathBuf::from("/etc/init.d"),
            facility_file: PathBuf::from("/etc/insserv.conf"),
            remove: false,
            force: false,
            defaults: false,
            dry_run: false,
            always_on: "kbd".to_string(),
        }
    }
}

impl RunConfig {
    /// Settings for scripts below `init_dir`, defaults otherwise.
    pub fn new(init_dir: impl Into<PathBuf>) -> Self {
        Self {
            init_dir: init_dir.into(),
            ..Self::default()
        }
    }

    /// Parse settings from TOML.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).at(path)?;
        Self::from_toml(&content)
    }

    /// Write settings to a TOML file.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content).at(path)
    }

    fn validate(&self) -> Result<()> {
        if self.init_dir.as_os_str().is_empty() {
            return Err(Error::Config("init_dir must not be empty".into()));
        }
        if self.always_on.contains('/') {
            return Err(Error::Config(format!(
                "always_on must be a script name, got {}",
                self.always_on
            )));
        }
        Ok(())
    }
}
