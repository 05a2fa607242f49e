//! Error types for insserv.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for insserv operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors. Anything recoverable is logged as a warning instead.
#[derive(Error, Debug)]
pub enum Error {
    /// A required file or directory could not be read or changed
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid command line usage
    #[error("usage: {0}")]
    Usage(String),

    /// A targeted service failed its dependency check
    #[error("dependency check failed for service {service}, exiting now!")]
    Dependency { service: String },

    /// The declared dependencies form a loop
    #[error("There is a loop between services: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    /// The computed order does not fit into two decimal digits
    #[error("Maximum of 99 in ordering reached (got {0})")]
    OrderOverflow(u32),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Regex compilation error
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Attach a path to IO results.
pub(crate) trait IoContext<T> {
    fn at(self, path: &std::path::Path) -> Result<T>;
}

impl<T> IoContext<T> for std::result::Result<T, std::io::Error> {
    fn at(self, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| Error::io(path, e))
    }
}
