//! Buckos insserv - LSB init script link manager.
//!
//! This crate reads the LSB comment headers of the scripts in an init
//! directory, works out the order they have to start in, and maintains the
//! `S<nn>name` / `K<nn>name` symlinks in the runlevel directories:
//!
//! - Header scanning with absent and empty fields kept apart
//! - System facilities (`$network`, `$remote_fs`) from `/etc/insserv.conf`
//! - Reconstruction of the existing link scheme for scripts without headers
//! - Dependency validation before anything is enabled or removed
//! - Idempotent link reconciliation with a dry-run mode
//!
//! # Architecture
//!
//! - **Engine**: owns one run and drives the steps below
//! - **LinkScanner**: folds the live start links into the service graph
//! - **DependencyRecorder**: expands header values into graph edges
//! - **OrderingService**: sorts services into start orders
//! - **LinkReconciler**: plans and applies link changes per runlevel
//!
//! # Example
//!
//! ```no_run
//! use buckos_insserv::{Engine, RunConfig, Target};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut config = RunConfig::new("/etc/init.d");
//!     config.dry_run = true;
//!     let report = Engine::new(config, vec![Target::new("sshd")]).run()?;
//!     for action in &report.actions {
//!         println!("{}", action);
//!     }
//!     Ok(())
//! }
//! ```

pub mod adjust;
pub mod config;
pub mod deps;
pub mod engine;
pub mod error;
pub mod facility;
pub mod graph;
pub mod header;
pub mod links;
pub mod order;
pub mod reconcile;
pub mod runlevel;
pub mod scripts;
pub mod target;
pub mod validate;

// Re-export main types
pub use config::RunConfig;
pub use engine::{Engine, RunReport};
pub use error::{Error, Result};
pub use facility::FacilityTable;
pub use graph::{EdgeKind, Service, ServiceGraph};
pub use header::{Field, HeaderFields, HeaderScanner};
pub use order::{DependencyOrder, OrderingService, Provision, Scheduled};
pub use reconcile::{LinkAction, LinkReconciler};
pub use runlevel::{Runlevel, Runlevels};
pub use target::{resolve_targets, Target};
