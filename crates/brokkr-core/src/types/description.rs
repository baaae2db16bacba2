//! Addin descriptions, modules, and dependencies

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{Domain, ExtensionNodeDescription, ExtensionNodeSet, ExtensionPoint};
use crate::version::AddinVersion;

/// A dependency declared by an addin module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dependency {
    /// Requires another addin at a minimum version
    Addin {
        /// Full id of the target addin
        id: String,
        /// Minimum required version
        version: AddinVersion,
    },
    /// References a compiled module outside the addin set
    Assembly {
        /// File name of the referenced module
        name: String,
    },
}

impl Dependency {
    /// Target addin id, for addin dependencies
    pub fn addin_id(&self) -> Option<&str> {
        match self {
            Dependency::Addin { id, .. } => Some(id),
            Dependency::Assembly { .. } => None,
        }
    }
}

/// A set of extension declarations targeting one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    /// Target extension point path. For type-based extensions this starts
    /// out as a synthetic ancestry-encoded path until resolution rewrites
    /// it to a concrete point path.
    pub path: String,

    /// Contributed node declarations
    #[serde(default)]
    pub nodes: Vec<ExtensionNodeDescription>,
}

/// One module of an addin: its binary files, dependencies, and the
/// extensions it contributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescription {
    /// Referenced binary files, relative to the addin's folder
    #[serde(default)]
    pub files: Vec<PathBuf>,

    /// Declared dependencies
    #[serde(default)]
    pub dependencies: Vec<Dependency>,

    /// Extension declarations
    #[serde(default)]
    pub extensions: Vec<Extension>,
}

impl ModuleDescription {
    /// Iterate over addin dependencies only
    pub fn addin_dependencies(&self) -> impl Iterator<Item = (&str, &AddinVersion)> {
        self.dependencies.iter().filter_map(|d| match d {
            Dependency::Addin { id, version } => Some((id.as_str(), version)),
            Dependency::Assembly { .. } => None,
        })
    }
}

/// Complete description of one installed addin.
///
/// Identity is (namespace, local_id, version); the full id is
/// "namespace.local_id". Descriptions are produced by the description
/// builder during a scan, persisted in the store, and replaced when the
/// source file's fingerprint changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddinDescription {
    /// Identity namespace, e.g. "App"
    pub namespace: String,

    /// Local id within the namespace
    pub local_id: String,

    /// Declared version; all-zero when the manifest declares none
    pub version: AddinVersion,

    /// Oldest version this addin remains compatible with
    #[serde(default)]
    pub compat_version: Option<AddinVersion>,

    /// True for a host-contract addin: defines extension points, has no
    /// addin dependencies
    #[serde(default)]
    pub is_root: bool,

    /// Author metadata
    #[serde(default)]
    pub author: Option<String>,

    /// Project URL metadata
    #[serde(default)]
    pub url: Option<String>,

    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,

    /// File the description was built from
    pub source_file: PathBuf,

    /// Domain of the folder that produced it
    pub domain: Domain,

    /// The main module
    pub main_module: ModuleDescription,

    /// Conditionally loaded extra modules
    #[serde(default)]
    pub optional_modules: Vec<ModuleDescription>,

    /// Extension points this addin defines
    #[serde(default)]
    pub extension_points: Vec<ExtensionPoint>,

    /// Reusable node sets this addin defines
    #[serde(default)]
    pub node_sets: Vec<ExtensionNodeSet>,
}

impl AddinDescription {
    /// Full addin id: "namespace.local_id", or just the local id when no
    /// namespace was declared
    pub fn addin_id(&self) -> String {
        if self.namespace.is_empty() {
            self.local_id.clone()
        } else {
            format!("{}.{}", self.namespace, self.local_id)
        }
    }

    /// Whether a dependency requiring `required` of this addin is satisfied,
    /// per the [compat_version, version] interval rule
    pub fn satisfies(&self, required: &AddinVersion) -> bool {
        self.version.satisfies(self.compat_version.as_ref(), required)
    }

    /// All modules, main first
    pub fn all_modules(&self) -> impl Iterator<Item = &ModuleDescription> {
        std::iter::once(&self.main_module).chain(self.optional_modules.iter())
    }

    /// All addin dependencies across all modules
    pub fn addin_dependencies(&self) -> impl Iterator<Item = (&str, &AddinVersion)> {
        self.all_modules().flat_map(|m| m.addin_dependencies())
    }

    /// True when the description declares extension points but carries no
    /// usable identity, which is a validation error
    pub fn has_anonymous_extension_points(&self) -> bool {
        !self.extension_points.is_empty() && self.local_id.is_empty()
    }
}
