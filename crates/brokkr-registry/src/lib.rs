//! # brokkr-registry
//!
//! The addin registry facade:
//! - `AddinRegistry`: register folders, run update passes, query installed
//!   addins and resolved extension points
//! - Enable/disable with dependency-aware cascading, and uninstall
//! - The host index record tying folders, addins, and points together
//! - The host side of the process-isolated module scanner

pub mod facade;
pub mod index;
pub mod worker;

pub use facade::{AddinRegistry, UpdateSummary};
pub use index::{HostIndex, InstalledAddin, RegisteredFolder};
pub use worker::{IsolatedReflector, IsolationClient};
