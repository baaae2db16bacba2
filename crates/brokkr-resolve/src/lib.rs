//! # brokkr-resolve
//!
//! Turns scanned declarations into addin descriptions and merges the
//! declarations of every installed addin into one consistent extension
//! graph, respecting dependency version compatibility.

pub mod builder;
pub mod resolver;

pub use builder::{decode_type_path, encode_type_path, BuildInput, BuildOutput, DescriptionBuilder};
pub use resolver::{ExtensionGraphResolver, ResolveOutcome};
