//! Declarations extracted from a scanned module
//!
//! The module reflector hands back a flat bag of declarations rather than
//! free-form reflective data, so the description builder can pattern-match
//! exhaustively. Manifest parsing produces the same bag, which keeps the
//! builder agnostic about where a declaration came from.

use serde::{Deserialize, Serialize};

use crate::types::{Dependency, ExtensionNodeDescription};
use crate::version::AddinVersion;

/// One declarative statement found in a module or manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Declaration {
    /// Top-level identity marker
    Identity {
        namespace: String,
        local_id: Option<String>,
        version: Option<AddinVersion>,
        compat_version: Option<AddinVersion>,
        is_root: bool,
        author: Option<String>,
        url: Option<String>,
        description: Option<String>,
    },

    /// A dependency record
    Dependency(Dependency),

    /// Declares an extension point with its root node type
    ExtensionPointDecl {
        /// Hierarchical path of the point
        path: String,
        /// Name of the allowed root node
        node_name: String,
        /// Object type name the node binds to
        type_name: String,
        /// Human-readable description
        description: Option<String>,
    },

    /// Declares extension nodes at an explicit path
    ExtensionDecl {
        path: String,
        nodes: Vec<ExtensionNodeDescription>,
    },

    /// Declares an extension resolved by type ancestry instead of a path.
    ///
    /// The ancestry list is the full ordered list of the type's ancestor
    /// classes and implemented interfaces; resolution matches it against
    /// extension point node types by object type name.
    TypeExtensionDecl {
        type_name: String,
        ancestry: Vec<String>,
        node: ExtensionNodeDescription,
    },
}

/// Everything the reflector (or manifest parser) extracted from one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    /// Declarations in source order
    pub declarations: Vec<Declaration>,

    /// File names of binaries referenced by the module
    #[serde(default)]
    pub referenced_files: Vec<String>,
}

impl ModuleMetadata {
    /// The identity declaration, if any
    pub fn identity(&self) -> Option<&Declaration> {
        self.declarations
            .iter()
            .find(|d| matches!(d, Declaration::Identity { .. }))
    }
}
