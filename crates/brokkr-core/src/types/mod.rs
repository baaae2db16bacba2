//! Type definitions for addin descriptions and the extension graph

mod description;
mod domain;
mod extension;

pub use description::*;
pub use domain::*;
pub use extension::*;
