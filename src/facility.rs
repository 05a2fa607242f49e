//! System facilities from `/etc/insserv.conf`.
//!
//! A facility is a `$`-prefixed virtual service name that expands to a list
//! of concrete services (or other facilities):
//!
//! ```text
//! # local fs
//! $local_fs   boot.localfs +boot.crypto
//! $network    = network
//! $remote_fs: $local_fs nfs
//! ```

use crate::error::{IoContext, Result};
use indexmap::IndexMap;
use regex::Regex;
use std::path::Path;
use tracing::{debug, warn};

const CONF_LINE: &str =
    r"(?i)^(\$[a-z0-9_-]+)([[:blank:]]?[=:]+[[:blank:]]?|[[:blank:]]+)([[:print:][:blank:]]*)";

/// Virtual facility name to replacement tokens.
#[derive(Debug, Clone, Default)]
pub struct FacilityTable {
    entries: IndexMap<String, String>,
}

impl FacilityTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration content. The first mapping of a name wins.
    pub fn parse(content: &str) -> Result<Self> {
        let regex = Regex::new(CONF_LINE)?;
        let mut table = Self::new();

        for line in content.lines() {
            if line.starts_with('#') {
                continue;
            }
            let Some(caps) = regex.captures(line) else {
                continue;
            };

            let name = &caps[1];
            let replacement = caps.get(3).map(|m| m.as_str().trim_end()).unwrap_or("");

            if table.entries.contains_key(name) {
                debug!(facility = %name, "Duplicate facility ignored");
                continue;
            }
            table.entries.insert(name.to_string(), replacement.to_string());
        }

        Ok(table)
    }

    /// Load the configuration file at `path`.
    ///
    /// A missing file only yields a warning and an empty table.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) => Self::parse(&String::from_utf8_lossy(&bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Facility configuration not found");
                Ok(Self::new())
            }
            Err(e) => Err(e).at(path),
        }
    }

    /// Add a mapping unless the name is already known.
    pub fn insert(&mut self, name: impl Into<String>, replacement: impl Into<String>) -> bool {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return false;
        }
        self.entries.insert(name, replacement.into());
        true
    }

    /// Replacement string for a facility name (including the `$`).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Iterate mappings in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
