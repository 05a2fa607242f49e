//! Records declared dependencies as service graph edges.
//!
//! Values of `Required-Start` and `Should-Start` are split on the usual
//! delimiters. `+name` marks an optional dependency and always lands in the
//! should list. `$name` is a system facility and is replaced by its
//! configured expansion before anything is stored.

use crate::facility::FacilityTable;
use crate::graph::{EdgeKind, Service, ServiceGraph};
use crate::order::OrderingService;
use crate::runlevel::tokens;
use tracing::warn;

/// Deepest facility nesting followed before giving up.
pub const MAX_EXPANSION_DEPTH: usize = 16;

/// Turns dependency strings into graph edges.
pub struct DependencyRecorder<'a> {
    facilities: &'a FacilityTable,
}

impl<'a> DependencyRecorder<'a> {
    /// Create a recorder expanding facilities from `facilities`.
    pub fn new(facilities: &'a FacilityTable) -> Self {
        Self { facilities }
    }

    /// Record `value` into the `kind` edge list of `service`.
    ///
    /// Afterwards every edge of the list is (re)declared to `ordering`, so
    /// the ordering stays current when several header fields feed one list.
    pub fn record(
        &self,
        graph: &mut ServiceGraph,
        ordering: &mut dyn OrderingService,
        service: &str,
        kind: EdgeKind,
        value: &str,
    ) {
        let service = graph.add(service);
        let mut path = Vec::new();
        let mut diverted = false;

        self.expand(service, kind, value, &mut path, &mut diverted);

        for dep in service.edges(kind) {
            ordering.declare_edge(&service.name, dep);
        }
        if diverted && kind != EdgeKind::Should {
            for dep in service.edges(EdgeKind::Should) {
                ordering.declare_edge(&service.name, dep);
            }
        }
    }

    fn expand(
        &self,
        service: &mut Service,
        kind: EdgeKind,
        value: &str,
        path: &mut Vec<String>,
        diverted: &mut bool,
    ) {
        for token in tokens(value) {
            let (target, token) = match token.strip_prefix('+') {
                Some(rest) => (EdgeKind::Should, rest),
                None => (kind, token),
            };
            if token.is_empty() {
                continue;
            }

            if !token.starts_with('$') {
                if service.add_edge(target, token) && target != kind {
                    *diverted = true;
                }
                continue;
            }

            if path.iter().any(|seen| seen == token) {
                warn!(service = %service.name, facility = %token, "Facility expands to itself, skipped");
                continue;
            }
            if path.len() >= MAX_EXPANSION_DEPTH {
                warn!(service = %service.name, facility = %token, "Facility nested too deep, skipped");
                continue;
            }

            match self.facilities.get(token) {
                Some(replacement) => {
                    path.push(token.to_string());
                    self.expand(service, target, replacement, path, diverted);
                    path.pop();
                }
                None => {
                    warn!(service = %service.name, facility = %token, "Unresolved facility reference");
                }
            }
        }
    }
}
