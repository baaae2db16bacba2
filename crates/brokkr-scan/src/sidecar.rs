//! Sidecar metadata reflector
//!
//! Hosts that pre-extract declarations from their compiled modules place
//! them in a `<module>.metadata.yaml` file next to the binary. This
//! reflector reads that sidecar; a module without one carries no addin
//! data. It is also what the isolation worker runs against a module.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use brokkr_core::{Error, ModuleMetadata, ModuleReflector, Result};

/// Suffix appended to a module path to find its metadata sidecar
pub const METADATA_SIDECAR_SUFFIX: &str = ".metadata.yaml";

/// Reflector backed by per-module metadata sidecar files
#[derive(Debug, Default, Clone, Copy)]
pub struct SidecarReflector;

impl SidecarReflector {
    /// Sidecar path for a module file
    pub fn sidecar_path(module: &Path) -> PathBuf {
        let mut name = OsString::from(module.as_os_str());
        name.push(METADATA_SIDECAR_SUFFIX);
        PathBuf::from(name)
    }
}

impl ModuleReflector for SidecarReflector {
    fn reflect(&self, path: &Path) -> Result<Option<ModuleMetadata>> {
        let sidecar = Self::sidecar_path(path);
        if !sidecar.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&sidecar)?;
        let metadata = serde_yaml_ng::from_str(&content)
            .map_err(|e| Error::module_load(path.display().to_string(), e.to_string()))?;
        Ok(Some(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brokkr_core::Declaration;
    use tempfile::TempDir;

    #[test]
    fn test_module_without_sidecar_has_no_metadata() {
        let dir = TempDir::new().unwrap();
        let module = dir.path().join("plain.so");
        fs::write(&module, b"binary").unwrap();

        let result = SidecarReflector.reflect(&module).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_sidecar_round_trips_metadata() {
        let dir = TempDir::new().unwrap();
        let module = dir.path().join("tool.so");
        fs::write(&module, b"binary").unwrap();

        let metadata = ModuleMetadata {
            declarations: vec![Declaration::Identity {
                namespace: "App".to_string(),
                local_id: Some("Tool".to_string()),
                version: Some("1.0".parse().unwrap()),
                compat_version: None,
                is_root: false,
                author: None,
                url: None,
                description: None,
            }],
            referenced_files: Vec::new(),
        };
        let sidecar = SidecarReflector::sidecar_path(&module);
        fs::write(&sidecar, serde_yaml_ng::to_string(&metadata).unwrap()).unwrap();

        let result = SidecarReflector.reflect(&module).unwrap();
        assert_eq!(result, Some(metadata));
    }

    #[test]
    fn test_malformed_sidecar_is_a_load_error() {
        let dir = TempDir::new().unwrap();
        let module = dir.path().join("broken.so");
        fs::write(&module, b"binary").unwrap();
        fs::write(SidecarReflector::sidecar_path(&module), ":: not yaml {{{{").unwrap();

        let err = SidecarReflector.reflect(&module).unwrap_err();
        assert!(matches!(err, Error::ModuleLoad { .. }));
    }
}
