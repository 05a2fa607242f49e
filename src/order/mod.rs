//! Start order computation.
//!
//! The [`OrderingService`] trait is the seam between graph building and
//! sorting: everything the scanner learns is declared through it, and the
//! link reconciler only reads back the sorted result. [`DependencyOrder`] is
//! the default implementation.

pub mod dependency;

use crate::error::Result;
use crate::runlevel::Runlevel;
use serde::Serialize;

pub use dependency::DependencyOrder;

/// Outcome of claiming a service name for a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provision {
    /// The script now provides the name
    Ok,
    /// Another script already provides the name
    AlreadyClaimed(String),
}

/// A script scheduled in a runlevel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scheduled {
    /// Script file name in the init directory
    pub script: String,
    /// Start order, 1..=99 after a successful run
    pub order: u32,
}

/// Sorts declared services into start orders.
pub trait OrderingService {
    /// `from` must start after `to`.
    fn declare_edge(&mut self, from: &str, to: &str);

    /// Claim service `name` for `script`.
    fn declare_provider(&mut self, name: &str, script: &str) -> Provision;

    /// Register a system facility and the tokens it stands for.
    fn declare_virtual(&mut self, name: &str, replacement: &str);

    /// Schedule `name` in the runlevels of a level string.
    fn declare_runlevels(&mut self, name: &str, levels: &str);

    /// Assign start orders to every declared service.
    fn sort(&mut self) -> Result<()>;

    /// Start order of a service, 0 if unknown or not provided by a script.
    fn get_order(&self, name: &str) -> u32;

    /// Force the start order of a service.
    fn set_order(&mut self, name: &str, order: u32);

    /// Highest assigned start order.
    fn max_order(&self) -> u32;

    /// Scripts scheduled in `level`, ascending by order.
    fn iterate(&self, level: Runlevel) -> Vec<Scheduled>;

    /// Whether a known script is not scheduled in `level`.
    fn is_excluded_by_default(&self, script: &str, level: Runlevel) -> bool;
}
