//! Init script discovery.

use crate::error::{IoContext, Result};
use crate::links::list_entries;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::debug;

/// Names in the init directory that are never scripts.
const RESERVED: &[&str] = &["rc", "rx", "skeleton", "powerfail", "boot"];

/// Backup, package manager and editor leftovers.
const SKIPPED_EXTENSIONS: &[&str] = &["local", "old", "new", "save", "swp", "core"];

const SKIPPED_PREFIXES: &[&str] = &["README", "core"];

const SKIPPED_FIRST_CHARS: &str = "0123456789$.#_-\\*";

/// Whether an entry name may be an init script.
pub fn is_script_name(name: &str) -> bool {
    let Some(first) = name.chars().next() else {
        return false;
    };
    if SKIPPED_FIRST_CHARS.contains(first) || name.ends_with('~') {
        return false;
    }
    if RESERVED.contains(&name) || SKIPPED_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return false;
    }

    match name.rsplit_once('.') {
        Some((_, ext)) => {
            !(SKIPPED_EXTENSIONS.contains(&ext) || ext.starts_with("rpm") || ext.starts_with("ba"))
        }
        None => true,
    }
}

/// Executable init scripts in `dir`, sorted by name.
pub fn list_scripts(dir: &Path) -> Result<Vec<String>> {
    let mut scripts = Vec::new();

    for name in list_entries(dir)? {
        if !is_script_name(&name) {
            continue;
        }
        let path = dir.join(&name);
        let metadata = std::fs::metadata(&path).at(&path)?;
        if !metadata.is_file() || metadata.permissions().mode() & 0o100 == 0 {
            debug!(entry = %name, "Not an executable script, skipped");
            continue;
        }
        scripts.push(name);
    }

    Ok(scripts)
}
