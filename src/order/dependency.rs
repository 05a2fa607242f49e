//! Dependency-depth ordering on a petgraph graph.

use super::{OrderingService, Provision, Scheduled};
use crate::error::{Error, Result};
use crate::runlevel::{tokens, Runlevel, Runlevels};
use indexmap::IndexMap;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::VecDeque;
use tracing::debug;

/// A declared service or facility.
#[derive(Debug, Clone)]
struct Node {
    name: String,
    /// Script providing this name, none for facilities and unknown names
    script: Option<String>,
    levels: Runlevels,
    order: u32,
}

impl Node {
    /// Only script-backed names occupy a slot of their own.
    fn weight(&self) -> u32 {
        u32::from(self.script.is_some())
    }
}

/// Orders services by dependency depth.
///
/// Edges point from a dependency to its dependent. A provided service starts
/// one slot after its latest dependency; facilities and names nobody provides
/// are transparent and share the order of their latest dependency.
#[derive(Debug, Default)]
pub struct DependencyOrder {
    graph: DiGraph<Node, ()>,
    nodes: IndexMap<String, NodeIndex>,
}

impl DependencyOrder {
    /// Create an empty ordering.
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.nodes.get(name) {
            return index;
        }
        let index = self.graph.add_node(Node {
            name: name.to_string(),
            script: None,
            levels: Runlevels::empty(),
            order: 0,
        });
        self.nodes.insert(name.to_string(), index);
        index
    }

    /// Script providing `name`, if any.
    pub fn script_of(&self, name: &str) -> Option<&str> {
        let index = *self.nodes.get(name)?;
        self.graph[index].script.as_deref()
    }

    /// Runlevels `name` is scheduled in.
    pub fn levels(&self, name: &str) -> Runlevels {
        self.nodes
            .get(name)
            .map(|&i| self.graph[i].levels)
            .unwrap_or_default()
    }

    /// Lowest order `index` may have given its dependencies.
    fn floor(&self, index: NodeIndex) -> u32 {
        let deps = self
            .graph
            .neighbors_directed(index, Direction::Incoming)
            .map(|dep| self.graph[dep].order)
            .max()
            .unwrap_or(0);
        deps + self.graph[index].weight()
    }

    /// Names of the strongly connected component containing `index`.
    fn cycle_members(&self, index: NodeIndex) -> Vec<String> {
        let component = tarjan_scc(&self.graph)
            .into_iter()
            .find(|scc| scc.contains(&index))
            .unwrap_or_else(|| vec![index]);

        let mut members: Vec<NodeIndex> = component;
        members.sort();
        members
            .into_iter()
            .map(|i| self.graph[i].name.clone())
            .collect()
    }
}

impl OrderingService for DependencyOrder {
    fn declare_edge(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        let dependent = self.node(from);
        let dependency = self.node(to);
        if !self.graph.contains_edge(dependency, dependent) {
            self.graph.add_edge(dependency, dependent, ());
        }
    }

    fn declare_provider(&mut self, name: &str, script: &str) -> Provision {
        let index = self.node(name);
        if let Some(existing) = &self.graph[index].script {
            if existing != script {
                return Provision::AlreadyClaimed(existing.clone());
            }
            return Provision::Ok;
        }
        self.graph[index].script = Some(script.to_string());
        Provision::Ok
    }

    fn declare_virtual(&mut self, name: &str, replacement: &str) {
        self.node(name);
        for token in tokens(replacement) {
            let dep = token.trim_start_matches('+');
            if !dep.is_empty() {
                self.declare_edge(name, dep);
            }
        }
    }

    fn declare_runlevels(&mut self, name: &str, levels: &str) {
        let index = self.node(name);
        self.graph[index].levels |= Runlevels::parse(levels);
    }

    fn sort(&mut self) -> Result<()> {
        let sorted = match toposort(&self.graph, None) {
            Ok(sorted) => sorted,
            Err(cycle) => {
                return Err(Error::DependencyCycle(self.cycle_members(cycle.node_id())));
            }
        };

        for index in sorted {
            let order = self.floor(index);
            self.graph[index].order = order;
        }

        debug!(max_order = self.max_order(), "Sorted services");
        Ok(())
    }

    fn get_order(&self, name: &str) -> u32 {
        match self.nodes.get(name) {
            Some(&index) if self.graph[index].script.is_some() => self.graph[index].order,
            _ => 0,
        }
    }

    fn set_order(&mut self, name: &str, order: u32) {
        let Some(&index) = self.nodes.get(name) else {
            return;
        };

        let floor = self.floor(index);
        if order < floor {
            debug!(service = %name, order, floor, "Requested order below dependencies");
        }
        self.graph[index].order = order.max(floor);

        // Keep every dependent strictly behind
        let mut queue = VecDeque::from([index]);
        while let Some(current) = queue.pop_front() {
            let base = self.graph[current].order;
            let dependents: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(current, Direction::Outgoing)
                .collect();
            for dependent in dependents {
                let needed = base + self.graph[dependent].weight();
                if self.graph[dependent].order < needed {
                    self.graph[dependent].order = needed;
                    queue.push_back(dependent);
                }
            }
        }
    }

    fn max_order(&self) -> u32 {
        self.graph
            .node_weights()
            .map(|n| n.order)
            .max()
            .unwrap_or(0)
    }

    fn iterate(&self, level: Runlevel) -> Vec<Scheduled> {
        // script -> (order, discovery position)
        let mut scripts: IndexMap<&str, (u32, usize)> = IndexMap::new();

        for (position, &index) in self.nodes.values().enumerate() {
            let node = &self.graph[index];
            let Some(script) = node.script.as_deref() else {
                continue;
            };
            if !node.levels.contains(level.flag) {
                continue;
            }
            let entry = scripts.entry(script).or_insert((node.order, position));
            entry.0 = entry.0.max(node.order);
        }

        let mut scheduled: Vec<(&str, u32, usize)> = scripts
            .into_iter()
            .map(|(script, (order, position))| (script, order, position))
            .collect();
        scheduled.sort_by_key(|&(_, order, position)| (order, position));

        scheduled
            .into_iter()
            .map(|(script, order, _)| Scheduled {
                script: script.to_string(),
                order,
            })
            .collect()
    }

    fn is_excluded_by_default(&self, script: &str, level: Runlevel) -> bool {
        let mut provided = self
            .graph
            .node_weights()
            .filter(|n| n.script.as_deref() == Some(script))
            .peekable();

        if provided.peek().is_none() {
            return false;
        }
        !provided.any(|n| n.levels.contains(level.flag))
    }
}
