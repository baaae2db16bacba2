//! Description building
//!
//! Turns the flat declaration bags produced by manifest parsing or module
//! reflection into an `AddinDescription`. Identity falls back to defaults
//! (all-zero version, synthetic local id from the file name) and every
//! validation problem is collected so a user sees all of them in one pass.

use std::path::{Path, PathBuf};

use tracing::debug;

use brokkr_core::types::{
    AddinDescription, Domain, ExtensionNodeSet, ExtensionNodeType, ExtensionPoint,
    ModuleDescription,
};
use brokkr_core::{Declaration, ModuleMetadata};

/// Path prefix marking an ancestry-encoded (type-based) extension target.
/// The payload is the comma-separated candidate ancestor list.
pub const TYPE_PATH_PREFIX: char = '$';

/// Encode a candidate ancestor list as a synthetic extension path
pub fn encode_type_path(ancestry: &[String]) -> String {
    format!("{TYPE_PATH_PREFIX}{}", ancestry.join(","))
}

/// Decode a synthetic type path back into its candidate list
pub fn decode_type_path(path: &str) -> Option<Vec<String>> {
    path.strip_prefix(TYPE_PATH_PREFIX)
        .map(|rest| rest.split(',').map(str::to_string).collect())
}

/// Input for one description build
#[derive(Debug, Clone, Default)]
pub struct BuildInput {
    /// File the declarations came from
    pub source_file: PathBuf,

    /// Domain of the folder that produced the file
    pub domain: Domain,

    /// Main module declaration bag
    pub main: ModuleMetadata,

    /// Optional module declaration bags
    pub optional_modules: Vec<ModuleMetadata>,

    /// Addin id this file produced on a previous pass
    pub previous_addin_id: Option<String>,
}

/// A built description plus every validation problem found along the way
#[derive(Debug)]
pub struct BuildOutput {
    /// The description; usable even when `errors` is non-empty
    pub description: AddinDescription,

    /// Collected validation errors, reported in batch
    pub errors: Vec<String>,
}

/// Builds addin descriptions from declaration bags
#[derive(Debug, Default)]
pub struct DescriptionBuilder;

impl DescriptionBuilder {
    /// Build a description from one file's declarations
    pub fn build(input: BuildInput) -> BuildOutput {
        let mut errors = Vec::new();
        let mut description = AddinDescription {
            source_file: input.source_file.clone(),
            domain: input.domain,
            ..Default::default()
        };

        let mut declared_id = false;
        let mut declared_version = false;
        let mut explicit_root = false;

        if let Some(Declaration::Identity {
            namespace,
            local_id,
            version,
            compat_version,
            is_root,
            author,
            url,
            description: text,
        }) = input.main.identity().cloned()
        {
            description.namespace = namespace;
            declared_id = local_id.is_some();
            declared_version = version.is_some();
            explicit_root = is_root;
            description.local_id = local_id.unwrap_or_default();
            description.version = version.unwrap_or_default();
            description.compat_version = compat_version;
            description.is_root = is_root;
            description.author = author;
            description.url = url;
            description.description = text;
        }

        if description.local_id.is_empty() {
            description.local_id =
                synthetic_local_id(&input.source_file, input.previous_addin_id.as_deref());
            debug!(
                "No local id declared in {:?}, using synthetic id {}",
                input.source_file, description.local_id
            );
        }

        let addin_id = description.addin_id();
        description.main_module = Self::build_module(&input.main, &addin_id, &mut description);
        for metadata in &input.optional_modules {
            let module = Self::build_module(metadata, &addin_id, &mut description);
            description.optional_modules.push(module);
        }

        // A description declaring extension points must carry a real
        // identity; synthetic defaults are not enough for a host contract
        if !description.extension_points.is_empty() && !(declared_id && declared_version) {
            errors.push(format!(
                "{}: declares extension points but no addin id/version",
                input.source_file.display()
            ));
        }

        // Dangling file references are errors too
        let base = input
            .source_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        for module in description.all_modules() {
            for file in &module.files {
                let resolved = if file.is_absolute() {
                    file.clone()
                } else {
                    base.join(file)
                };
                if !resolved.exists() {
                    errors.push(format!(
                        "{}: referenced file {} does not exist",
                        input.source_file.display(),
                        file.display()
                    ));
                }
            }
        }

        if !explicit_root {
            description.is_root = !description.extension_points.is_empty()
                && description.addin_dependencies().next().is_none();
        }

        BuildOutput {
            description,
            errors,
        }
    }

    fn build_module(
        metadata: &ModuleMetadata,
        addin_id: &str,
        description: &mut AddinDescription,
    ) -> ModuleDescription {
        let mut module = ModuleDescription {
            files: metadata
                .referenced_files
                .iter()
                .map(PathBuf::from)
                .collect(),
            ..Default::default()
        };

        for declaration in &metadata.declarations {
            match declaration {
                Declaration::Identity { .. } => {}
                Declaration::Dependency(dep) => module.dependencies.push(dep.clone()),
                Declaration::ExtensionPointDecl {
                    path,
                    node_name,
                    type_name,
                    description: text,
                } => {
                    let mut node_set = ExtensionNodeSet::new(path.clone());
                    node_set.node_types.push(ExtensionNodeType {
                        id: node_name.clone(),
                        type_name: type_name.clone(),
                        attributes: Vec::new(),
                        description: None,
                    });
                    description.extension_points.push(ExtensionPoint {
                        path: path.clone(),
                        root_addin: addin_id.to_string(),
                        node_set,
                        addins: Vec::new(),
                        nodes: Vec::new(),
                        description: text.clone(),
                    });
                }
                Declaration::ExtensionDecl { path, nodes } => {
                    module
                        .extensions
                        .push(brokkr_core::types::Extension {
                            path: path.clone(),
                            nodes: nodes.clone(),
                        });
                }
                Declaration::TypeExtensionDecl {
                    type_name: _,
                    ancestry,
                    node,
                } => {
                    module.extensions.push(brokkr_core::types::Extension {
                        path: encode_type_path(ancestry),
                        nodes: vec![node.clone()],
                    });
                }
            }
        }
        module
    }
}

/// Derive a stable synthetic local id from the source file name, reusing
/// the previous id when it was clearly derived from the same stem.
///
/// Best effort only: synthetic ids are not guaranteed stable across
/// arbitrary renames.
fn synthetic_local_id(source_file: &Path, previous_addin_id: Option<&str>) -> String {
    let stem = source_file
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.trim_end_matches(".addin"))
        .unwrap_or("addin")
        .to_string();

    if let Some(previous) = previous_addin_id {
        let previous_local = previous.rsplit('.').next().unwrap_or(previous);
        if previous_local == stem || previous_local.starts_with(&stem) {
            return previous_local.to_string();
        }
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;
    use brokkr_core::types::Dependency;
    use brokkr_core::types::ExtensionNodeDescription;
    use brokkr_core::AddinVersion;

    fn identity(local_id: Option<&str>, version: Option<&str>, is_root: bool) -> Declaration {
        Declaration::Identity {
            namespace: "App".to_string(),
            local_id: local_id.map(str::to_string),
            version: version.map(|v| AddinVersion::parse(v).unwrap()),
            compat_version: None,
            is_root,
            author: None,
            url: None,
            description: None,
        }
    }

    fn point_decl(path: &str) -> Declaration {
        Declaration::ExtensionPointDecl {
            path: path.to_string(),
            node_name: "Tool".to_string(),
            type_name: "App.ITool".to_string(),
            description: None,
        }
    }

    #[test]
    fn test_basic_identity() {
        let input = BuildInput {
            source_file: PathBuf::from("/x/core.addin.yaml"),
            main: ModuleMetadata {
                declarations: vec![identity(Some("Core"), Some("1.0"), true), point_decl("/App/Tools")],
                ..Default::default()
            },
            ..Default::default()
        };
        let output = DescriptionBuilder::build(input);
        assert!(output.errors.is_empty());
        assert_eq!(output.description.addin_id(), "App.Core");
        assert!(output.description.is_root);
        assert_eq!(output.description.extension_points.len(), 1);
        assert_eq!(
            output.description.extension_points[0].root_addin,
            "App.Core"
        );
    }

    #[test]
    fn test_synthetic_id_from_file_name() {
        let input = BuildInput {
            source_file: PathBuf::from("/x/widgets.addin.yaml"),
            ..Default::default()
        };
        let output = DescriptionBuilder::build(input);
        assert_eq!(output.description.local_id, "widgets");
        assert!(output.description.version.is_zero());
    }

    #[test]
    fn test_synthetic_id_reuses_previous() {
        let input = BuildInput {
            source_file: PathBuf::from("/x/widgets.addin.yaml"),
            previous_addin_id: Some("widgets_2".to_string()),
            ..Default::default()
        };
        let output = DescriptionBuilder::build(input);
        assert_eq!(output.description.local_id, "widgets_2");

        // A previous id from an unrelated stem is not reused
        let input = BuildInput {
            source_file: PathBuf::from("/x/widgets.addin.yaml"),
            previous_addin_id: Some("gadgets".to_string()),
            ..Default::default()
        };
        let output = DescriptionBuilder::build(input);
        assert_eq!(output.description.local_id, "widgets");
    }

    #[test]
    fn test_extension_points_require_identity() {
        let input = BuildInput {
            source_file: PathBuf::from("/x/anon.addin.yaml"),
            main: ModuleMetadata {
                declarations: vec![point_decl("/App/Tools")],
                ..Default::default()
            },
            ..Default::default()
        };
        let output = DescriptionBuilder::build(input);
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].contains("no addin id/version"));
    }

    #[test]
    fn test_dangling_file_reference_is_collected() {
        let input = BuildInput {
            source_file: PathBuf::from("/definitely/missing/core.addin.yaml"),
            main: ModuleMetadata {
                referenced_files: vec!["nope.so".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let output = DescriptionBuilder::build(input);
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].contains("nope.so"));
    }

    #[test]
    fn test_implicit_root_detection() {
        // Extension points and no addin dependencies: a host contract
        let input = BuildInput {
            source_file: PathBuf::from("/x/host.addin.yaml"),
            main: ModuleMetadata {
                declarations: vec![identity(Some("Host"), Some("1.0"), false), point_decl("/App/Tools")],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(DescriptionBuilder::build(input).description.is_root);

        // With a dependency it is not a root
        let input = BuildInput {
            source_file: PathBuf::from("/x/host.addin.yaml"),
            main: ModuleMetadata {
                declarations: vec![
                    identity(Some("Host"), Some("1.0"), false),
                    point_decl("/App/Tools"),
                    Declaration::Dependency(Dependency::Addin {
                        id: "App.Base".to_string(),
                        version: AddinVersion::parse("1.0").unwrap(),
                    }),
                ],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(!DescriptionBuilder::build(input).description.is_root);
    }

    #[test]
    fn test_type_extension_becomes_encoded_path() {
        let input = BuildInput {
            source_file: PathBuf::from("/x/tools.addin.yaml"),
            main: ModuleMetadata {
                declarations: vec![
                    identity(Some("Tools"), Some("1.0"), false),
                    Declaration::TypeExtensionDecl {
                        type_name: "MyTool".to_string(),
                        ancestry: vec!["App.BaseTool".to_string(), "App.ITool".to_string()],
                        node: ExtensionNodeDescription::new("Type"),
                    },
                ],
                ..Default::default()
            },
            ..Default::default()
        };
        let output = DescriptionBuilder::build(input);
        let ext = &output.description.main_module.extensions[0];
        assert_eq!(ext.path, "$App.BaseTool,App.ITool");
        assert_eq!(
            decode_type_path(&ext.path),
            Some(vec!["App.BaseTool".to_string(), "App.ITool".to_string()])
        );
    }
}
