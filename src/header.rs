//! LSB header scanner.
//!
//! Reads the `### BEGIN INIT INFO` style comment block of an init script and
//! extracts the eight fields insserv cares about. Each field is matched by
//! its own case-insensitive pattern and the first matching line wins.
//!
//! ```text
//! # Provides:          web
//! # Required-Start:    $network
//! # Should-Start:      +postgresql
//! # Default-Start:     3 5
//! # Description:       Web server
//! ```

use crate::error::{IoContext, Result};
use regex::Regex;
use std::io::BufRead;
use std::path::Path;

/// A header field value.
///
/// A field that is present but blank must not be confused with one that was
/// never declared: only absent fields are inferred from the live link scheme.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Field {
    /// No line declared this field
    #[default]
    Absent,
    /// The field was declared with a blank value
    Empty,
    /// The field was declared with a value
    Value(String),
}

impl Field {
    fn from_capture(value: &str) -> Self {
        let value = value.trim_end();
        if value.is_empty() {
            Field::Empty
        } else {
            Field::Value(value.to_string())
        }
    }

    /// The declared value, if any.
    pub fn value(&self) -> Option<&str> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    pub fn is_present(&self) -> bool {
        !self.is_absent()
    }
}

/// The header fields of one script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields {
    pub provides: Field,
    pub required_start: Field,
    pub required_stop: Field,
    pub should_start: Field,
    pub should_stop: Field,
    pub default_start: Field,
    pub default_stop: Field,
    pub description: Field,
}

/// Header keys, in the order their patterns are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Provides,
    RequiredStart,
    RequiredStop,
    ShouldStart,
    ShouldStop,
    DefaultStart,
    DefaultStop,
    Description,
}

/// (key, pattern after the comment prefix, capture group holding the value)
const KEY_TABLE: [(Key, &str, usize); 8] = [
    (Key::Provides, "provides", 1),
    (Key::RequiredStart, "required[-_]+start", 1),
    (Key::RequiredStop, "required[-_]+stop", 1),
    (Key::ShouldStart, "(x[-_]+[a-z0-9_-]+)?should[-_]+start", 2),
    (Key::ShouldStop, "(x[-_]+[a-z0-9_-]+)?should[-_]+stop", 2),
    (Key::DefaultStart, "default[-_]+start", 1),
    (Key::DefaultStop, "default[-_]+stop", 1),
    (Key::Description, "description", 1),
];

impl HeaderFields {
    fn slot(&mut self, key: Key) -> &mut Field {
        match key {
            Key::Provides => &mut self.provides,
            Key::RequiredStart => &mut self.required_start,
            Key::RequiredStop => &mut self.required_stop,
            Key::ShouldStart => &mut self.should_start,
            Key::ShouldStop => &mut self.should_stop,
            Key::DefaultStart => &mut self.default_start,
            Key::DefaultStop => &mut self.default_stop,
            Key::Description => &mut self.description,
        }
    }
}

/// Compiled header patterns, reused for every script of a run.
pub struct HeaderScanner {
    patterns: Vec<(Key, Regex, usize)>,
}

impl HeaderScanner {
    /// Compile the header patterns.
    pub fn new() -> Result<Self> {
        let patterns = KEY_TABLE
            .iter()
            .map(|&(key, name, group)| {
                let pattern = format!(
                    r"(?i)^#[[:blank:]]*{}:[[:blank:]]*([[:print:][:blank:]]*)",
                    name
                );
                Ok((key, Regex::new(&pattern)?, group))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// Scan the script at `path`.
    ///
    /// Symlinks are followed. A script that cannot be read is fatal.
    pub fn scan_file(&self, path: &Path) -> Result<HeaderFields> {
        let file = std::fs::File::open(path).at(path)?;
        self.scan_reader(std::io::BufReader::new(file))
            .at(path)
    }

    /// Scan header lines from a reader.
    pub fn scan_reader<R: BufRead>(&self, mut reader: R) -> std::io::Result<HeaderFields> {
        let mut fields = HeaderFields::default();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            // Script bodies are not required to be UTF-8
            let line = String::from_utf8_lossy(&buf);
            self.scan_line(line.trim_end_matches(['\n', '\r']), &mut fields);
        }

        Ok(fields)
    }

    /// Scan header lines from a string.
    pub fn scan_str(&self, content: &str) -> HeaderFields {
        let mut fields = HeaderFields::default();
        for line in content.lines() {
            self.scan_line(line, &mut fields);
        }
        fields
    }

    fn scan_line(&self, line: &str, fields: &mut HeaderFields) {
        if !line.starts_with('#') {
            return;
        }

        for (key, regex, group) in &self.patterns {
            let slot = fields.slot(*key);
            if slot.is_present() {
                continue;
            }
            if let Some(caps) = regex.captures(line) {
                let value = caps.get(*group).map(|m| m.as_str()).unwrap_or("");
                *slot = Field::from_capture(value);
            }
        }
    }
}
