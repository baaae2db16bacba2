//! Aggregator manifests
//!
//! An aggregator manifest (`*.addins.yaml`) pulls additional directories
//! into the scan - possibly recursively, possibly into the global domain -
//! and declares exclude patterns that suppress files from the rest of the
//! pass. Excludes are relative to the manifest's own directory.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use brokkr_core::{Error, Result};

/// File suffix of aggregator manifests
pub const AGGREGATOR_SUFFIX: &str = ".addins.yaml";

/// File suffix of per-addin manifests
pub const ADDIN_MANIFEST_SUFFIX: &str = ".addin.yaml";

/// Extensions classified as compiled modules
pub const MODULE_EXTENSIONS: &[&str] = &["dll", "exe", "so", "dylib"];

/// One directory pulled in by an aggregator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Directory to scan, relative to the manifest's directory unless
    /// absolute (a named shared-module location may live anywhere)
    pub path: PathBuf,

    /// Whether to descend into subdirectories
    #[serde(default)]
    pub recursive: bool,

    /// Whether results land in the global domain
    #[serde(default)]
    pub shared: bool,
}

/// Parsed aggregator manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorManifest {
    /// Additional directories to scan
    #[serde(default)]
    pub directories: Vec<DirectoryEntry>,

    /// Paths to suppress, relative to the manifest's directory
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl AggregatorManifest {
    /// Parse manifest content
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        serde_yaml_ng::from_str(content)
            .map_err(|e| Error::manifest_parse(path.display().to_string(), e.to_string()))
    }

    /// Resolve a directory entry against the manifest's own directory
    pub fn resolve_directory(&self, manifest_dir: &Path, entry: &DirectoryEntry) -> PathBuf {
        if entry.path.is_absolute() {
            entry.path.clone()
        } else {
            manifest_dir.join(&entry.path)
        }
    }
}

/// Compiled exclude patterns for one scan pass
#[derive(Debug, Default)]
pub struct ExcludeSet {
    set: Option<GlobSet>,
    base: PathBuf,
}

impl ExcludeSet {
    /// Build an exclude set from patterns relative to `base`
    pub fn build(base: &Path, patterns: &[String]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(Self {
                set: None,
                base: base.to_path_buf(),
            });
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| Error::manifest_parse(base.display().to_string(), e.to_string()))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| Error::manifest_parse(base.display().to_string(), e.to_string()))?;
        Ok(Self {
            set: Some(set),
            base: base.to_path_buf(),
        })
    }

    /// Whether a path is suppressed by any pattern
    pub fn is_excluded(&self, path: &Path) -> bool {
        let Some(set) = &self.set else {
            return false;
        };
        let relative = path.strip_prefix(&self.base).unwrap_or(path);
        set.is_match(relative)
    }
}

/// Classify a file name as an aggregator manifest
pub fn is_aggregator(path: &Path) -> bool {
    file_name_ends_with(path, AGGREGATOR_SUFFIX)
}

/// Classify a file name as a per-addin manifest
pub fn is_addin_manifest(path: &Path) -> bool {
    !is_aggregator(path) && file_name_ends_with(path, ADDIN_MANIFEST_SUFFIX)
}

/// Classify a file name as a compiled module
pub fn is_module(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| MODULE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn file_name_ends_with(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(suffix))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(is_aggregator(Path::new("/x/site.addins.yaml")));
        assert!(is_addin_manifest(Path::new("/x/core.addin.yaml")));
        assert!(!is_addin_manifest(Path::new("/x/site.addins.yaml")));
        assert!(is_module(Path::new("/x/core.so")));
        assert!(is_module(Path::new("/x/Core.DLL")));
        assert!(!is_module(Path::new("/x/readme.txt")));
    }

    #[test]
    fn test_parse_directories_and_excludes() {
        let content = r#"
directories:
  - path: ../extras
    recursive: true
    shared: true
  - path: /opt/shared-addins
exclude:
  - legacy/broken.addin.yaml
  - "*.exe"
"#;
        let manifest = AggregatorManifest::parse(Path::new("site.addins.yaml"), content).unwrap();
        assert_eq!(manifest.directories.len(), 2);
        assert!(manifest.directories[0].recursive);
        assert!(manifest.directories[0].shared);
        assert!(!manifest.directories[1].shared);
        assert_eq!(manifest.exclude.len(), 2);

        let resolved = manifest.resolve_directory(Path::new("/app/addins"), &manifest.directories[0]);
        assert_eq!(resolved, PathBuf::from("/app/addins/../extras"));
    }

    #[test]
    fn test_exclude_set_matches_relative_paths() {
        let base = Path::new("/app/addins");
        let excludes = ExcludeSet::build(
            base,
            &["legacy/broken.addin.yaml".to_string(), "*.exe".to_string()],
        )
        .unwrap();

        assert!(excludes.is_excluded(Path::new("/app/addins/legacy/broken.addin.yaml")));
        assert!(excludes.is_excluded(Path::new("/app/addins/tool.exe")));
        assert!(!excludes.is_excluded(Path::new("/app/addins/core.addin.yaml")));
    }

    #[test]
    fn test_malformed_manifest_is_a_parse_error() {
        let err = AggregatorManifest::parse(Path::new("bad.addins.yaml"), "directories: 12")
            .unwrap_err();
        assert!(matches!(err, Error::ManifestParse { .. }));
    }
}
