//! # brokkr-core
//!
//! Core library for the Brokkr addin registry providing:
//! - The addin description data model (descriptions, extension points, node sets)
//! - Dotted-numeric version handling and compatibility checks
//! - The closed set of declaration variants produced by module reflection
//! - The `ModuleReflector` collaborator trait
//! - The isolation worker message protocol
//! - Error taxonomy shared by every registry component

pub mod declarations;
pub mod error;
pub mod progress;
pub mod protocol;
pub mod reflector;
pub mod types;
pub mod version;

pub use declarations::{Declaration, ModuleMetadata};
pub use error::{Error, Result};
pub use progress::{ProgressMonitor, RecordingProgress, SilentProgress};
pub use protocol::WorkerMessage;
pub use reflector::{ModuleReflector, NullReflector, StaticReflector};
pub use version::AddinVersion;
