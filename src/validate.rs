//! Pre-flight dependency checks.
//!
//! Enabling a service requires its hard dependencies to be enabled as well,
//! and removing one must not leave an enabled service without a hard
//! dependency. A failed check aborts the run unless it is forced.

use crate::graph::ServiceGraph;
use tracing::warn;

/// Checks a service graph before links are touched.
pub struct Validator<'a> {
    graph: &'a ServiceGraph,
}

impl<'a> Validator<'a> {
    pub fn new(graph: &'a ServiceGraph) -> Self {
        Self { graph }
    }

    /// Every hard dependency of `name` is known and enabled.
    ///
    /// Each unmet dependency is reported, not only the first.
    pub fn check_required(&self, name: &str) -> bool {
        let Some(service) = self.graph.find(name) else {
            return true;
        };

        let mut ok = true;
        for dep in &service.required {
            let enabled = self.graph.find(dep).is_some_and(|d| d.is_enabled());
            if !enabled {
                warn!(service = %name, required = %dep, "Service {} has to be enabled for service {}", dep, name);
                ok = false;
            }
        }
        ok
    }

    /// No enabled service has a hard dependency on `name`.
    pub fn check_dependents(&self, name: &str) -> bool {
        let mut ok = true;
        for dependent in self.graph.enabled_dependents(name) {
            warn!(service = %name, dependent = %dependent.name, "Service {} has to be enabled for service {}", name, dependent.name);
            ok = false;
        }
        ok
    }
}
