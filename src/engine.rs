//! One insserv run.
//!
//! The [`Engine`] owns all state of a run: it reconstructs the graph from the
//! live links, scans every init script, validates the targets, sorts, and
//! finally reconciles each runlevel directory.

use crate::adjust::{post_process, WELL_KNOWN};
use crate::config::RunConfig;
use crate::deps::DependencyRecorder;
use crate::error::{Error, Result};
use crate::facility::FacilityTable;
use crate::graph::{EdgeKind, ServiceGraph};
use crate::header::{Field, HeaderScanner};
use crate::links::LinkScanner;
use crate::order::{DependencyOrder, OrderingService, Provision};
use crate::reconcile::{LinkAction, LinkReconciler};
use crate::runlevel::{tokens, Runlevel, Runlevels};
use crate::scripts::list_scripts;
use crate::target::Target;
use crate::validate::Validator;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Runlevels for scripts without any hint.
const FALLBACK_LEVELS: Runlevels = Runlevels::THREE.union(Runlevels::FIVE);

/// Scripts with fixed runlevels that ignore their headers.
fn special(script: &str) -> Option<&'static str> {
    match script {
        "halt" => Some("0"),
        "reboot" => Some("6"),
        "single" => Some("1 S"),
        _ => None,
    }
}

/// What a run did, or would do with dry-run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Link changes in the order they were made
    pub actions: Vec<LinkAction>,
    /// Highest start order assigned
    pub max_order: u32,
}

impl RunReport {
    /// Whether the run changed nothing.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Runs insserv over one init directory.
pub struct Engine<O: OrderingService = DependencyOrder> {
    config: RunConfig,
    targets: Vec<Target>,
    ordering: O,
}

impl Engine<DependencyOrder> {
    /// Create an engine with the default ordering.
    pub fn new(config: RunConfig, targets: Vec<Target>) -> Self {
        Self::with_ordering(config, targets, DependencyOrder::new())
    }
}

impl<O: OrderingService> Engine<O> {
    /// Create an engine with a custom ordering service.
    pub fn with_ordering(config: RunConfig, targets: Vec<Target>, ordering: O) -> Self {
        Self {
            config,
            targets,
            ordering,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Execute the run.
    pub fn run(self) -> Result<RunReport> {
        let Engine {
            config,
            targets,
            mut ordering,
        } = self;

        if config.remove && targets.is_empty() {
            return Err(Error::Usage("insserv -r requires at least one script".into()));
        }

        let facilities = FacilityTable::load(&config.facility_file)?;
        debug!(facilities = facilities.len(), "Loaded facilities");

        let mut run = Run {
            config: &config,
            targets: &targets,
            facilities: &facilities,
            scanner: HeaderScanner::new()?,
            recorder: DependencyRecorder::new(&facilities),
            graph: ServiceGraph::new(),
            ordering: &mut ordering,
        };
        run.execute()
    }
}

/// A scanned script and the runlevels it will be scheduled in.
#[derive(Debug)]
struct Plan {
    script: String,
    provides: Vec<String>,
    levels: Runlevels,
    targeted: bool,
}

struct Run<'a> {
    config: &'a RunConfig,
    targets: &'a [Target],
    facilities: &'a FacilityTable,
    scanner: HeaderScanner,
    recorder: DependencyRecorder<'a>,
    graph: ServiceGraph,
    ordering: &'a mut dyn OrderingService,
}

impl<'a> Run<'a> {
    fn execute(&mut self) -> Result<RunReport> {
        let config = self.config;
        let root = config.init_dir.as_path();
        info!(init_dir = %root.display(), targets = self.targets.len(), "Scanning runlevel links");

        let mut actions = LinkScanner::new(root, &self.scanner, &self.recorder)
            .dry_run(config.dry_run)
            .scan(&mut self.graph, &mut *self.ordering)?;

        let mut plans = Vec::new();
        for script in list_scripts(root)? {
            if let Some(plan) = self.scan_script(&script)? {
                plans.push(plan);
            }
        }
        for target in self.targets {
            if !plans.iter().any(|p| p.script == target.name) {
                warn!(script = %target.name, "Target is not an executable init script, ignored");
            }
        }

        self.validate(&plans)?;

        for (name, replacement) in self.facilities.iter() {
            self.ordering.declare_virtual(name, replacement);
        }
        self.ordering.sort()?;
        let max_order = post_process(&mut *self.ordering, WELL_KNOWN)?;
        debug!(max_order, "Orders assigned");

        let names: Vec<String> = self.targets.iter().map(|t| t.name.clone()).collect();
        let reconciler = LinkReconciler::new(root, &names)
            .remove(config.remove)
            .defaults(config.defaults)
            .always_on(&config.always_on);

        for level in Runlevel::ALL {
            for action in reconciler.reconcile(level, &*self.ordering, config.dry_run)? {
                if !actions.contains(&action) {
                    actions.push(action);
                }
            }
        }

        info!(actions = actions.len(), max_order, "Links reconciled");
        Ok(RunReport { actions, max_order })
    }

    fn target(&self, script: &str) -> Option<&'a Target> {
        self.targets.iter().find(|t| t.name == script)
    }

    fn live_levels(&self, names: &[String]) -> Runlevels {
        names
            .iter()
            .filter_map(|n| self.graph.find(n))
            .fold(Runlevels::empty(), |levels, s| levels | s.levels)
    }

    fn claim(&mut self, name: &str, script: &str) -> bool {
        match self.ordering.declare_provider(name, script) {
            Provision::Ok => true,
            Provision::AlreadyClaimed(other) => {
                warn!(service = %name, script = %script, provider = %other, "Service {} has been already provided by {}", name, other);
                false
            }
        }
    }

    fn schedule(&mut self, provides: &[String], levels: Runlevels) {
        let levels = levels.to_string();
        for name in provides {
            self.ordering.declare_runlevels(name, &levels);
        }
    }

    fn scan_script(&mut self, script: &str) -> Result<Option<Plan>> {
        let targeted = self.target(script).is_some();

        if let Some(fixed) = special(script) {
            return Ok(self.scan_special(script, fixed, targeted));
        }

        let header = self.scanner.scan_file(&self.config.init_dir.join(script))?;
        let guessed = header.provides.value().is_none();
        let names: Vec<String> = match header.provides.value() {
            Some(value) => tokens(value).map(str::to_string).collect(),
            None => vec![script.to_string()],
        };
        let known = names.iter().any(|n| self.graph.find(n).is_some());
        let live = self.live_levels(&names);

        let declared = match &header.default_start {
            Field::Value(value) => Some(Runlevels::parse(value)),
            Field::Empty => Some(Runlevels::empty()),
            Field::Absent if guessed && !known => self.graph.guess_levels(script),
            Field::Absent => None,
        };
        if let Some(declared) = declared {
            if header.default_start.is_present() && !live.is_empty() && declared != live {
                warn!(script = %script, default_start = %declared, links = %live, "Default-Start differs from the current links");
            }
        }
        let mut levels = match declared {
            Some(levels) => levels,
            None if !live.is_empty() => live,
            None => FALLBACK_LEVELS,
        };

        if let (Some(target), false) = (self.target(script), self.config.defaults) {
            if let Some(start) = &target.start {
                levels = Runlevels::parse(start);
            }
            if let Some(stop) = &target.stop {
                debug!(script = %script, stop = %stop, "Stop levels ignored");
            }
        }
        if self.config.remove {
            levels = live;
        }

        let mut provides = Vec::new();
        for name in names {
            if name.starts_with('$') {
                warn!(script = %script, facility = %name, "Script provides a system facility, skipped");
                continue;
            }
            if !self.claim(&name, script) {
                continue;
            }

            let service = self.graph.add(&name);
            let has_required = !service.required.is_empty();
            let has_should = !service.should.is_empty();

            if !has_required {
                match header.required_start.value() {
                    Some(value) => self.record(&name, EdgeKind::Required, value),
                    None if guessed && header.required_start.is_absent() => {
                        let dep = self.graph.guess_required(&name).map(|s| s.name.clone());
                        if let Some(dep) = dep {
                            debug!(service = %name, required = %dep, "Guessed dependency from link order");
                            self.record(&name, EdgeKind::Required, &dep);
                        }
                    }
                    None => {}
                }
            }
            if !has_should {
                if let Some(value) = header.should_start.value() {
                    self.record(&name, EdgeKind::Should, value);
                }
            }
            provides.push(name);
        }

        self.schedule(&provides, levels);
        debug!(script = %script, provides = ?provides, levels = %levels, "Scanned script");

        Ok(Some(Plan {
            script: script.to_string(),
            provides,
            levels,
            targeted,
        }))
    }

    fn scan_special(&mut self, script: &str, fixed: &str, targeted: bool) -> Option<Plan> {
        if !self.claim(script, script) {
            return None;
        }
        let provides = vec![script.to_string()];
        self.graph.add(script);
        if script == "single" {
            self.record(script, EdgeKind::Should, "kbd");
        }

        let levels = if self.config.remove {
            self.live_levels(&provides)
        } else {
            Runlevels::parse(fixed)
        };
        self.schedule(&provides, levels);

        Some(Plan {
            script: script.to_string(),
            provides,
            levels,
            targeted,
        })
    }

    fn record(&mut self, service: &str, kind: EdgeKind, value: &str) {
        self.recorder
            .record(&mut self.graph, &mut *self.ordering, service, kind, value);
    }

    /// Check every script about to be linked against the levels it will get.
    ///
    /// Explicit targets are checked. A run without targets links every
    /// scheduled script, so all of those are checked.
    fn validate(&mut self, plans: &[Plan]) -> Result<()> {
        let remove = self.config.remove;
        let everything = self.targets.is_empty() && !remove;
        let checked = |plan: &&Plan| plan.targeted || (everything && !plan.levels.is_empty());

        for plan in plans.iter().filter(checked) {
            for name in &plan.provides {
                if let Some(service) = self.graph.find_mut(name) {
                    service.levels = if remove { Runlevels::empty() } else { plan.levels };
                }
            }
        }

        if self.config.force {
            return Ok(());
        }

        let validator = Validator::new(&self.graph);
        for plan in plans.iter().filter(checked) {
            for name in &plan.provides {
                let ok = if remove {
                    validator.check_dependents(name)
                } else {
                    validator.check_required(name)
                };
                if !ok {
                    return Err(Error::Dependency {
                        service: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
