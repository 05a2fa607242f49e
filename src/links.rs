//! Reconstructs the service graph from links already present.
//!
//! Every `SNNname` link in the runlevel directories tells us that `name` was
//! started at order `NN` in that runlevel. This is used to guess missing
//! headers and to notice when a header disagrees with the live setup.

use crate::deps::DependencyRecorder;
use crate::error::{IoContext, Result};
use crate::graph::{EdgeKind, ServiceGraph};
use crate::header::HeaderScanner;
use crate::order::OrderingService;
use crate::reconcile::LinkAction;
use crate::runlevel::{tokens, Runlevel};
use std::io::ErrorKind;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;
use tracing::{debug, warn};

/// Start or kill link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Start,
    Kill,
}

impl LinkKind {
    pub fn prefix(&self) -> char {
        match self {
            LinkKind::Start => 'S',
            LinkKind::Kill => 'K',
        }
    }
}

/// A parsed `S42name` / `K58name` entry name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkName<'a> {
    pub kind: LinkKind,
    pub order: u8,
    pub name: &'a str,
}

impl<'a> LinkName<'a> {
    /// Parse an entry name; anything but a prefix, exactly two digits and a
    /// non-empty name is not a link of ours.
    pub fn parse(entry: &'a str) -> Option<Self> {
        let kind = match entry.chars().next()? {
            'S' => LinkKind::Start,
            'K' => LinkKind::Kill,
            _ => return None,
        };
        let rest = &entry[1..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits != 2 || rest.len() == 2 {
            return None;
        }
        let order = rest[..2].parse().ok()?;

        Some(Self {
            kind,
            order,
            name: &rest[2..],
        })
    }
}

/// Create a runlevel directory if it does not exist yet.
pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    match std::fs::metadata(dir) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "Creating runlevel directory");
            std::fs::DirBuilder::new().mode(0o755).create(dir).at(dir)
        }
        Err(e) => Err(e).at(dir),
    }
}

/// Entry names of a directory, sorted. A missing directory is empty.
pub(crate) fn list_entries(dir: &Path) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).at(dir),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.at(dir)?;
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Whether the target of a link is gone.
pub(crate) fn is_dangling(path: &Path) -> Result<bool> {
    match std::fs::metadata(path) {
        Ok(_) => Ok(false),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e).at(path),
    }
}

/// Scans the runlevel directories below a scripts root.
pub struct LinkScanner<'a> {
    root: &'a Path,
    scanner: &'a HeaderScanner,
    recorder: &'a DependencyRecorder<'a>,
    dry_run: bool,
}

impl<'a> LinkScanner<'a> {
    pub fn new(
        root: &'a Path,
        scanner: &'a HeaderScanner,
        recorder: &'a DependencyRecorder<'a>,
    ) -> Self {
        Self {
            root,
            scanner,
            recorder,
            dry_run: false,
        }
    }

    /// Neither create directories nor remove dangling links.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Fold every start link into `graph`.
    ///
    /// Returns the dangling links that were removed on the way.
    pub fn scan(
        &self,
        graph: &mut ServiceGraph,
        ordering: &mut dyn OrderingService,
    ) -> Result<Vec<LinkAction>> {
        let mut removed = Vec::new();

        for level in Runlevel::ALL {
            let dir = self.root.join(level.dir);
            if !self.dry_run {
                ensure_dir(&dir)?;
            }

            for entry in list_entries(&dir)? {
                let Some(link) = LinkName::parse(&entry) else {
                    continue;
                };
                if link.kind != LinkKind::Start {
                    continue;
                }

                let path = dir.join(&entry);
                if is_dangling(&path)? {
                    warn!(link = %path.display(), "Removing dangling link");
                    let action = LinkAction::Remove {
                        dir: dir.clone(),
                        name: entry.clone(),
                    };
                    if !self.dry_run {
                        action.apply()?;
                    }
                    removed.push(action);
                    continue;
                }

                self.record_link(graph, ordering, level, &path, &link)?;
            }
        }

        Ok(removed)
    }

    fn record_link(
        &self,
        graph: &mut ServiceGraph,
        ordering: &mut dyn OrderingService,
        level: Runlevel,
        path: &Path,
        link: &LinkName<'_>,
    ) -> Result<()> {
        let header = self.scanner.scan_file(path)?;
        let provides = header.provides.value().unwrap_or(link.name);

        for token in tokens(provides) {
            if token.starts_with('$') {
                warn!(link = %path.display(), facility = %token, "Script provides a system facility, skipped");
                continue;
            }

            let service = graph.add(token);
            service.order = service.order.max(link.order);
            service.levels |= level.flag;
            let (has_required, has_should) =
                (!service.required.is_empty(), !service.should.is_empty());

            if let (false, Some(value)) = (has_required, header.required_start.value()) {
                self.recorder
                    .record(graph, ordering, token, EdgeKind::Required, value);
            }
            if let (false, Some(value)) = (has_should, header.should_start.value()) {
                self.recorder
                    .record(graph, ordering, token, EdgeKind::Should, value);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facility::FacilityTable;
    use crate::order::DependencyOrder;
    use crate::runlevel::Runlevels;
    use std::os::unix::fs::symlink;

    #[test]
    fn test_parse_link_names() {
        assert_eq!(
            LinkName::parse("S05network"),
            Some(LinkName {
                kind: LinkKind::Start,
                order: 5,
                name: "network"
            })
        );
        assert_eq!(LinkName::parse("K95network").unwrap().kind, LinkKind::Kill);
        assert_eq!(LinkName::parse("S5network"), None);
        assert_eq!(LinkName::parse("S123network"), None);
        assert_eq!(LinkName::parse("S12"), None);
        assert_eq!(LinkName::parse("README"), None);
        assert_eq!(LinkName::parse(""), None);
    }

    fn script(root: &Path, name: &str, body: &str) {
        std::fs::write(root.join(name), body).unwrap();
    }

    fn link(root: &Path, dir: &str, name: &str, script: &str) {
        let dir = root.join(dir);
        std::fs::create_dir_all(&dir).unwrap();
        symlink(format!("../{}", script), dir.join(name)).unwrap();
    }

    #[test]
    fn test_scan_reconstructs_services() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        script(root, "network", "# Provides: network\n");
        script(
            root,
            "web",
            "# Provides: web httpd\n# Required-Start: network\n# Should-Start: db\n",
        );
        link(root, "rc3.d", "S05network", "network");
        link(root, "rc3.d", "S07web", "web");
        link(root, "rc5.d", "S09web", "web");
        link(root, "rc3.d", "K93web", "web");
        link(root, "rc5.d", "S01gone", "gone");

        let table = FacilityTable::new();
        let scanner = HeaderScanner::new().unwrap();
        let recorder = DependencyRecorder::new(&table);
        let mut graph = ServiceGraph::new();
        let mut ordering = DependencyOrder::new();

        let removed = LinkScanner::new(root, &scanner, &recorder)
            .scan(&mut graph, &mut ordering)
            .unwrap();

        assert_eq!(removed.len(), 1);
        assert!(!root.join("rc5.d/S01gone").exists());
        assert!(std::fs::symlink_metadata(root.join("rc5.d/S01gone")).is_err());
        // Every runlevel directory exists now
        for level in Runlevel::ALL {
            assert!(root.join(level.dir).is_dir());
        }

        let web = graph.find("web").unwrap();
        assert_eq!(web.order, 9);
        assert_eq!(web.levels, Runlevels::THREE | Runlevels::FIVE);
        assert_eq!(web.required, vec!["network"]);
        assert_eq!(web.should, vec!["db"]);

        let httpd = graph.find("httpd").unwrap();
        assert_eq!(httpd.required, vec!["network"]);

        assert_eq!(graph.find("network").unwrap().order, 5);
        assert!(graph.find("gone").is_none());
    }

    #[test]
    fn test_dry_run_leaves_tree_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        link(root, "rc2.d", "S01gone", "gone");

        let table = FacilityTable::new();
        let scanner = HeaderScanner::new().unwrap();
        let recorder = DependencyRecorder::new(&table);
        let mut graph = ServiceGraph::new();
        let mut ordering = DependencyOrder::new();

        let removed = LinkScanner::new(root, &scanner, &recorder)
            .dry_run(true)
            .scan(&mut graph, &mut ordering)
            .unwrap();

        assert_eq!(removed.len(), 1);
        assert!(std::fs::symlink_metadata(root.join("rc2.d/S01gone")).is_ok());
        assert!(!root.join("rc3.d").exists());
    }
}
