//! Command line targets.
//!
//! A target names a script and may override its runlevels:
//! `web,start=2,3,5,stop=0,6`. The script name ends at the first delimiter
//! and each override value runs until the next marker.

use crate::config::RunConfig;
use crate::error::{Error, IoContext, Result};
use crate::runlevel::DELIMITERS;
use std::path::Path;
use tracing::debug;

const START: &str = "start=";
const STOP: &str = "stop=";

/// A script selected on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Script file name
    pub name: String,
    /// Runlevels replacing Default-Start
    pub start: Option<String>,
    /// Runlevels replacing Default-Stop
    pub stop: Option<String>,
}

impl Target {
    /// Target a script without overrides.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: None,
            stop: None,
        }
    }

    /// Split an argument into name and overrides. The name may still be a path.
    pub fn parse(arg: &str) -> Self {
        let (name, rest) = match arg.find(DELIMITERS) {
            Some(pos) => (&arg[..pos], &arg[pos + 1..]),
            None => (arg, ""),
        };

        let start_at = rest.find(START);
        let stop_at = rest.find(STOP);
        let value = |at: Option<usize>, marker: &str| {
            let begin = at? + marker.len();
            // Up to whichever marker follows
            let end = [start_at, stop_at]
                .into_iter()
                .flatten()
                .filter(|&other| other >= begin)
                .min()
                .unwrap_or(rest.len());
            Some(rest[begin..end].trim_matches(DELIMITERS).to_string())
        };

        Self {
            name: name.to_string(),
            start: value(start_at, START),
            stop: value(stop_at, STOP),
        }
    }
}

/// Resolve command line arguments against the init directory.
///
/// A first argument containing `/` selects the init directory: a directory
/// argument becomes it (and must be the only argument), a script path makes
/// its parent the init directory. Every other argument must name an existing
/// script, either as given or below the init directory.
pub fn resolve_targets(args: &[String], config: &mut RunConfig) -> Result<Vec<Target>> {
    let mut targets: Vec<Target> = args.iter().map(|arg| Target::parse(arg)).collect();

    if let Some(first) = targets.first() {
        if first.name.contains('/') {
            let path = Path::new(&first.name);
            let metadata = std::fs::metadata(path).at(path)?;
            if metadata.is_dir() {
                if config.remove || targets.len() > 1 {
                    return Err(Error::Usage(
                        "insserv [[-r] init_script|init_directory]".into(),
                    ));
                }
                config.init_dir = path.to_path_buf();
                debug!(dir = %path.display(), "Using init directory");
                return Ok(Vec::new());
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                config.init_dir = parent.to_path_buf();
            }
        }
    }

    for target in &mut targets {
        let given = Path::new(&target.name);
        let path = if given.exists() {
            given.to_path_buf()
        } else {
            config.init_dir.join(given)
        };
        std::fs::metadata(&path).at(&path)?;

        if let Some(base) = path.file_name().and_then(|n| n.to_str()) {
            target.name = base.to_string();
        }
        if target.start.is_some() || target.stop.is_some() {
            debug!(script = %target.name, start = ?target.start, stop = ?target.stop, "Runlevel override");
        }
    }

    if config.remove && targets.is_empty() {
        return Err(Error::Usage("insserv -r requires at least one script".into()));
    }
    Ok(targets)
}
