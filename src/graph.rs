//! Registry of services and their dependency edges.

use crate::runlevel::Runlevels;
use indexmap::IndexMap;

/// Which edge list of a service a dependency is recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Hard dependency (Required-Start)
    Required,
    /// Soft dependency (Should-Start or `+name`)
    Should,
}

/// A service known to this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    /// Unique service name
    pub name: String,
    /// Hard dependencies, first-seen order, no duplicates
    pub required: Vec<String>,
    /// Soft dependencies, first-seen order, no duplicates
    pub should: Vec<String>,
    /// Runlevels the service is (or will be) linked in
    pub levels: Runlevels,
    /// Highest start-link order seen while scanning existing links
    pub order: u8,
}

impl Service {
    /// Create an empty service.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: Vec::new(),
            should: Vec::new(),
            levels: Runlevels::empty(),
            order: 0,
        }
    }

    /// The edge list for `kind`.
    pub fn edges(&self, kind: EdgeKind) -> &[String] {
        match kind {
            EdgeKind::Required => &self.required,
            EdgeKind::Should => &self.should,
        }
    }

    /// Append `dep` to the edge list for `kind` unless already there.
    ///
    /// Returns `true` if the edge was new.
    pub fn add_edge(&mut self, kind: EdgeKind, dep: &str) -> bool {
        let list = match kind {
            EdgeKind::Required => &mut self.required,
            EdgeKind::Should => &mut self.should,
        };
        if list.iter().any(|d| d == dep) {
            return false;
        }
        list.push(dep.to_string());
        true
    }

    /// Whether `name` is one of this service's hard dependencies.
    pub fn requires(&self, name: &str) -> bool {
        self.required.iter().any(|d| d == name)
    }

    pub fn is_enabled(&self) -> bool {
        !self.levels.is_empty()
    }
}

/// Insertion-ordered, name-keyed service registry.
#[derive(Debug, Clone, Default)]
pub struct ServiceGraph {
    services: IndexMap<String, Service>,
}

impl ServiceGraph {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a service, creating it if it does not exist yet.
    pub fn add(&mut self, name: &str) -> &mut Service {
        self.services
            .entry(name.to_string())
            .or_insert_with(|| Service::new(name))
    }

    /// Find a service by name.
    pub fn find(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    /// Find a service by name for modification.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Service> {
        self.services.get_mut(name)
    }

    /// Registry position of a service.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.services.get_index_of(name)
    }

    /// Service at a registry position.
    pub fn get_index(&self, index: usize) -> Option<&Service> {
        self.services.get_index(index).map(|(_, s)| s)
    }

    /// Iterate services in creation order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Service> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Services that hard-depend on `name` and are currently enabled.
    pub fn enabled_dependents<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Service> {
        self.iter()
            .filter(move |s| s.is_enabled() && s.requires(name))
    }

    /// Guess a hard dependency for `name` from the live link order.
    ///
    /// Walks backwards from the service's registry position and returns the
    /// first earlier service with a smaller order sharing a runlevel.
    pub fn guess_required(&self, name: &str) -> Option<&Service> {
        let index = self.index_of(name)?;
        let this = self.get_index(index)?;

        (0..index)
            .rev()
            .filter_map(|i| self.get_index(i))
            .find(|s| s.order < this.order && s.levels.intersects(this.levels))
    }

    /// Guess runlevels for an unknown service from the first enabled service
    /// that requires it.
    pub fn guess_levels(&self, name: &str) -> Option<Runlevels> {
        self.enabled_dependents(name).next().map(|s| s.levels)
    }
}
