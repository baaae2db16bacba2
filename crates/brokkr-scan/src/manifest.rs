//! Per-addin manifest parsing
//!
//! An addin manifest (`*.addin.yaml`) is the declarative description of
//! one addin. Parsing lowers it into the same flat declaration bag the
//! module reflector produces, so the description builder does not care
//! whether an addin came from a manifest or a compiled binary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use brokkr_core::types::{Dependency, ExtensionNodeDescription};
use brokkr_core::{AddinVersion, Declaration, Error, ModuleMetadata, Result};

/// A parsed manifest: the main module's declarations plus any optional
/// modules it carries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedManifest {
    /// Declarations of the main module, including identity
    pub main: ModuleMetadata,

    /// Conditionally loaded extra modules
    pub optional_modules: Vec<ModuleMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawManifest {
    #[serde(default)]
    addin: Option<RawHeader>,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
    #[serde(default)]
    modules: Vec<RawModule>,
    #[serde(default)]
    extension_points: Vec<RawExtensionPoint>,
    #[serde(default)]
    extensions: Vec<RawExtension>,
    #[serde(default)]
    type_extensions: Vec<RawTypeExtension>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawHeader {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    version: Option<AddinVersion>,
    #[serde(default)]
    compat_version: Option<AddinVersion>,
    #[serde(default)]
    is_root: bool,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDependency {
    #[serde(default)]
    addin: Option<String>,
    #[serde(default)]
    version: Option<AddinVersion>,
    #[serde(default)]
    assembly: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawModule {
    #[serde(default)]
    files: Vec<PathBuf>,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
    #[serde(default)]
    extensions: Vec<RawExtension>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawExtensionPoint {
    path: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    type_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawExtension {
    path: String,
    #[serde(default)]
    nodes: Vec<ExtensionNodeDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawTypeExtension {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    ancestry: Vec<String>,
    #[serde(default)]
    node: Option<ExtensionNodeDescription>,
}

/// Parse an addin manifest into declaration bags
pub fn parse_addin_manifest(path: &Path, content: &str) -> Result<ParsedManifest> {
    let raw: RawManifest = serde_yaml_ng::from_str(content)
        .map_err(|e| Error::manifest_parse(path.display().to_string(), e.to_string()))?;

    let mut main = ModuleMetadata::default();

    if let Some(header) = raw.addin {
        main.declarations.push(Declaration::Identity {
            namespace: header.namespace.unwrap_or_default(),
            local_id: header.id,
            version: header.version,
            compat_version: header.compat_version,
            is_root: header.is_root,
            author: header.author,
            url: header.url,
            description: header.description,
        });
    }

    for dep in raw.dependencies {
        main.declarations.push(Declaration::Dependency(lower_dependency(path, dep)?));
    }

    for point in raw.extension_points {
        main.declarations.push(Declaration::ExtensionPointDecl {
            path: point.path,
            node_name: point.name.unwrap_or_else(|| "Type".to_string()),
            type_name: point.type_name.unwrap_or_default(),
            description: point.description,
        });
    }

    for ext in raw.extensions {
        main.declarations.push(Declaration::ExtensionDecl {
            path: ext.path,
            nodes: ext.nodes,
        });
    }

    for ext in raw.type_extensions {
        let node = ext.node.unwrap_or_else(|| default_type_node(&ext.type_name));
        main.declarations.push(Declaration::TypeExtensionDecl {
            type_name: ext.type_name,
            ancestry: ext.ancestry,
            node,
        });
    }

    let mut optional_modules = Vec::new();
    for module in raw.modules {
        let mut metadata = ModuleMetadata::default();
        for file in module.files {
            metadata
                .referenced_files
                .push(file.to_string_lossy().into_owned());
        }
        for dep in module.dependencies {
            metadata
                .declarations
                .push(Declaration::Dependency(lower_dependency(path, dep)?));
        }
        for ext in module.extensions {
            metadata.declarations.push(Declaration::ExtensionDecl {
                path: ext.path,
                nodes: ext.nodes,
            });
        }
        optional_modules.push(metadata);
    }

    Ok(ParsedManifest {
        main,
        optional_modules,
    })
}

fn lower_dependency(path: &Path, raw: RawDependency) -> Result<Dependency> {
    match (raw.addin, raw.assembly) {
        (Some(id), None) => Ok(Dependency::Addin {
            id,
            version: raw.version.unwrap_or_default(),
        }),
        (None, Some(name)) => Ok(Dependency::Assembly { name }),
        _ => Err(Error::manifest_parse(
            path.display().to_string(),
            "dependency must name either an addin or an assembly",
        )),
    }
}

/// Node synthesized for a type extension that declares no explicit node
fn default_type_node(type_name: &str) -> ExtensionNodeDescription {
    let mut attributes = BTreeMap::new();
    attributes.insert("type".to_string(), type_name.to_string());
    ExtensionNodeDescription {
        node: "Type".to_string(),
        attributes,
        children: Vec::new(),
    }
}
