//! Brings the runlevel links in line with the computed order.
//!
//! For every scheduled script a runlevel directory should hold
//! `S<order><script>` and, unless the runlevel is one-way or the script is
//! the always-on service, `K<100-order><script>`, both pointing at
//! `../<script>`. Planning is a pure function of the directory listing and
//! the schedule; applying the plan is a separate step.

use crate::error::{IoContext, Result};
use crate::links::{ensure_dir, is_dangling, list_entries, LinkKind, LinkName};
use crate::order::{OrderingService, Scheduled};
use crate::runlevel::Runlevel;
use serde::Serialize;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

/// Kill links count down from here.
const KILL_BASE: u32 = 100;

/// A single filesystem change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum LinkAction {
    /// Create symlink `dir/name -> target`
    Create {
        dir: PathBuf,
        name: String,
        target: String,
    },
    /// Remove `dir/name`
    Remove { dir: PathBuf, name: String },
}

impl LinkAction {
    /// Full path of the link.
    pub fn path(&self) -> PathBuf {
        match self {
            LinkAction::Create { dir, name, .. } | LinkAction::Remove { dir, name } => dir.join(name),
        }
    }

    /// Perform the change. Removing a link that is already gone is fine.
    pub fn apply(&self) -> Result<()> {
        let path = self.path();
        match self {
            LinkAction::Create { target, .. } => {
                std::os::unix::fs::symlink(target, &path).at(&path)?;
                info!(link = %path.display(), target = %target, "Created link");
            }
            LinkAction::Remove { .. } => match std::fs::remove_file(&path) {
                Ok(()) => info!(link = %path.display(), "Removed link"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e).at(&path),
            },
        }
        Ok(())
    }
}

impl fmt::Display for LinkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkAction::Create { target, .. } => {
                write!(f, "create {} -> {}", self.path().display(), target)
            }
            LinkAction::Remove { .. } => write!(f, "remove {}", self.path().display()),
        }
    }
}

/// A directory entry as seen before planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Existing {
    pub name: String,
    pub dangling: bool,
}

impl Existing {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dangling: false,
        }
    }
}

/// Start link name for a script.
pub fn start_link(script: &str, order: u32) -> String {
    format!("{}{:02}{}", LinkKind::Start.prefix(), order, script)
}

/// Kill link name for a script.
pub fn kill_link(script: &str, order: u32) -> String {
    format!(
        "{}{:02}{}",
        LinkKind::Kill.prefix(),
        KILL_BASE.saturating_sub(order),
        script
    )
}

/// Plans and applies link changes for one run.
pub struct LinkReconciler<'a> {
    root: &'a Path,
    targets: &'a [String],
    remove: bool,
    defaults: bool,
    always_on: &'a str,
}

impl<'a> LinkReconciler<'a> {
    /// `targets` are script names; empty means every script is targeted.
    pub fn new(root: &'a Path, targets: &'a [String]) -> Self {
        Self {
            root,
            targets,
            remove: false,
            defaults: false,
            always_on: "kbd",
        }
    }

    /// Remove the targeted scripts instead of installing them.
    pub fn remove(mut self, remove: bool) -> Self {
        self.remove = remove;
        self
    }

    /// Also drop links of scripts not scheduled in a runlevel.
    pub fn defaults(mut self, defaults: bool) -> Self {
        self.defaults = defaults;
        self
    }

    /// Script that runs on every runlevel change and never gets a kill link.
    pub fn always_on(mut self, script: &'a str) -> Self {
        self.always_on = script;
        self
    }

    fn targeted(&self, script: &str) -> bool {
        self.targets.is_empty() || self.targets.iter().any(|t| t == script)
    }

    /// Reconcile one runlevel directory against `ordering`.
    ///
    /// With `dry_run` the plan is returned without touching the directory.
    pub fn reconcile(
        &self,
        level: Runlevel,
        ordering: &dyn OrderingService,
        dry_run: bool,
    ) -> Result<Vec<LinkAction>> {
        let dir = self.root.join(level.dir);
        if !dry_run {
            ensure_dir(&dir)?;
        }

        let mut existing = Vec::new();
        for name in list_entries(&dir)? {
            if LinkName::parse(&name).is_none() {
                continue;
            }
            let dangling = is_dangling(&dir.join(&name))?;
            existing.push(Existing { name, dangling });
        }

        let scheduled = ordering.iterate(level);
        let actions = self.plan(level, &existing, &scheduled, |script| {
            ordering.is_excluded_by_default(script, level)
        });

        if !dry_run {
            for action in &actions {
                action.apply()?;
            }
        }
        Ok(actions)
    }

    /// Compute the changes needed in `level`.
    pub fn plan(
        &self,
        level: Runlevel,
        existing: &[Existing],
        scheduled: &[Scheduled],
        excluded: impl Fn(&str) -> bool,
    ) -> Vec<LinkAction> {
        let mut plan = Plan {
            dir: self.root.join(level.dir),
            present: Vec::new(),
            actions: Vec::new(),
        };

        for entry in existing {
            let Some(link) = LinkName::parse(&entry.name) else {
                continue;
            };
            if entry.dangling || (self.defaults && excluded(link.name)) {
                plan.actions.push(LinkAction::Remove {
                    dir: plan.dir.clone(),
                    name: entry.name.clone(),
                });
                continue;
            }
            plan.present.push(entry.name.clone());
        }

        for item in scheduled {
            // Facilities are never linked
            if item.script.starts_with('$') {
                continue;
            }
            let this = self.targeted(&item.script);
            let target = format!("../{}", item.script);

            let start = start_link(&item.script, item.order);
            self.converge(&mut plan, LinkKind::Start, &item.script, &start, &target, this);

            if item.script == self.always_on {
                continue;
            }

            if level.is_one_way() {
                for name in plan.matching(LinkKind::Kill, &item.script) {
                    plan.remove(&name);
                }
                continue;
            }

            let kill = kill_link(&item.script, item.order);
            self.converge(&mut plan, LinkKind::Kill, &item.script, &kill, &target, this);
        }

        plan.actions
    }

    fn converge(
        &self,
        plan: &mut Plan,
        kind: LinkKind,
        script: &str,
        desired: &str,
        target: &str,
        this: bool,
    ) {
        let found = plan.matching(kind, script);
        let removing = self.remove && this;

        if found.is_empty() {
            if this && !self.remove {
                plan.create(desired, target);
            }
            return;
        }

        let mut recreate = false;
        for name in found {
            if name == desired {
                if removing {
                    plan.remove(&name);
                }
            } else {
                plan.remove(&name);
                recreate |= !removing;
            }
        }

        if recreate && !plan.present.iter().any(|n| n == desired) {
            plan.create(desired, target);
        }
    }
}

/// Working state while planning one directory.
struct Plan {
    dir: PathBuf,
    present: Vec<String>,
    actions: Vec<LinkAction>,
}

impl Plan {
    fn matching(&self, kind: LinkKind, script: &str) -> Vec<String> {
        self.present
            .iter()
            .filter(|name| {
                LinkName::parse(name).is_some_and(|link| link.kind == kind && link.name == script)
            })
            .cloned()
            .collect()
    }

    fn remove(&mut self, name: &str) {
        self.present.retain(|n| n != name);
        self.actions.push(LinkAction::Remove {
            dir: self.dir.clone(),
            name: name.to_string(),
        });
    }

    fn create(&mut self, name: &str, target: &str) {
        self.present.push(name.to_string());
        self.actions.push(LinkAction::Create {
            dir: self.dir.clone(),
            name: name.to_string(),
            target: target.to_string(),
        });
    }
}
