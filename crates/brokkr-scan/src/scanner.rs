//! Folder scanning and change detection
//!
//! One scan pass walks every registered directory, aggregators first so
//! their exclude patterns can suppress files later in the same pass, then
//! addin manifests, then compiled modules. Files are checked against the
//! folder cache: unchanged-and-successful entries are skipped, unchanged
//! entries that errored last time are re-queued without marking the pass
//! as changed, and anything new or changed marks the pass changed. After
//! the walk, cached entries whose file no longer exists are reported as
//! missing so their addins can be uninstalled.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use brokkr_core::types::Domain;
use brokkr_core::{ModuleMetadata, ModuleReflector, ProgressMonitor};

use crate::aggregator::{self, AggregatorManifest, ExcludeSet};
use crate::fingerprint::Fingerprint;
use crate::folder_cache::{FileInfo, FolderInfoCache};
use crate::manifest;

/// Name of the optional pre-computed scan-data index inside a folder
pub const SCAN_INDEX_FILE: &str = "addin-scan-index.yaml";

/// A file queued for description building
#[derive(Debug, Clone)]
pub struct FileScan {
    /// Absolute path of the scanned file
    pub path: PathBuf,

    /// Folder the file lives in
    pub folder: PathBuf,

    /// Domain its results belong to
    pub domain: Domain,

    /// Main module declaration bag
    pub main: ModuleMetadata,

    /// Optional module declaration bags (manifests only)
    pub optional_modules: Vec<ModuleMetadata>,

    /// Addin id this file produced on a previous pass, for synthetic id
    /// stability
    pub previous_addin_id: Option<String>,
}

/// Result of one scan pass over all registered folders
#[derive(Debug, Default)]
pub struct ScanPass {
    /// Whether anything substantive changed since the last pass
    pub changed: bool,

    /// Whether relation data must be regenerated even beyond the changed
    /// files (domain change, disappeared directory)
    pub regenerate_relations: bool,

    /// Files whose descriptions must be (re)built
    pub scans: Vec<FileScan>,

    /// Cached entries whose file no longer exists
    pub missing: Vec<FileInfo>,

    /// Collected non-fatal problems (manifest parse errors, load errors)
    pub errors: Vec<String>,

    folders_visited: HashSet<PathBuf>,
}

/// One directory registered for scanning
#[derive(Debug, Clone)]
pub struct ScanRoot {
    /// Directory to walk
    pub path: PathBuf,

    /// Whether to descend into plain subdirectories
    pub recursive: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ScanIndex {
    #[serde(default)]
    addins: Vec<ScanIndexEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ScanIndexEntry {
    file: PathBuf,
    id: String,
    version: String,
    #[serde(default)]
    is_root: bool,
    #[serde(default)]
    record: String,
}

/// Walks registered directories and drives change detection against the
/// folder cache
pub struct FolderScanner<'a> {
    cache: &'a mut FolderInfoCache,
    reflector: &'a dyn ModuleReflector,
    registry_domain: Domain,
}

impl<'a> FolderScanner<'a> {
    /// Create a scanner over a folder cache and a module reflector
    pub fn new(
        cache: &'a mut FolderInfoCache,
        reflector: &'a dyn ModuleReflector,
        registry_domain: Domain,
    ) -> Self {
        Self {
            cache,
            reflector,
            registry_domain,
        }
    }

    /// Run one pass over the given scan roots
    pub fn scan(&mut self, roots: &[ScanRoot], progress: &mut dyn ProgressMonitor) -> ScanPass {
        let mut pass = ScanPass::default();
        progress.set_total(roots.len());
        for root in roots {
            self.scan_folder(&root.path, self.registry_domain, root.recursive, &mut pass);
            progress.step(&format!("scanned {}", root.path.display()));
        }
        pass
    }

    /// Scan one folder, recursing into aggregator-declared directories
    /// and (if `recursive`) subdirectories. Returns the canonical path
    /// the folder was cached under.
    pub fn scan_folder(
        &mut self,
        folder: &Path,
        proposed_domain: Domain,
        recursive: bool,
        pass: &mut ScanPass,
    ) -> PathBuf {
        let folder = match folder.canonicalize() {
            Ok(canonical) => canonical,
            Err(_) => folder.to_path_buf(),
        };
        if !pass.folders_visited.insert(folder.clone()) {
            return folder;
        }

        if !folder.is_dir() {
            self.reconcile_lost_folder(&folder, pass);
            return folder;
        }

        let mut entries: Vec<PathBuf> = match fs::read_dir(&folder) {
            Ok(iter) => iter.flatten().map(|e| e.path()).collect(),
            Err(e) => {
                warn!("Cannot list {:?}: {}", folder, e);
                self.reconcile_lost_folder(&folder, pass);
                return folder;
            }
        };
        entries.sort();

        // Changes to this folder's own contents; child folders track theirs
        let mut folder_changed = false;

        let has_index = entries
            .iter()
            .any(|p| p.file_name().and_then(|n| n.to_str()) == Some(SCAN_INDEX_FILE));
        self.cache.set_has_scan_index(&folder, has_index);
        if self.cache.assign_domain(&folder, proposed_domain) {
            // Cross-addin compatibility depends on domain visibility, so a
            // domain flip invalidates every relation derived from this folder
            folder_changed = true;
            pass.changed = true;
            pass.regenerate_relations = true;
        }
        let domain = self
            .cache
            .folder(&folder)
            .domain
            .unwrap_or(proposed_domain);
        let known_subfolders = self.cache.folder(&folder).subfolders.clone();

        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut ignore: HashSet<PathBuf> = HashSet::new();

        if has_index && self.apply_scan_index(&folder, &mut seen, &mut ignore, pass) {
            folder_changed = true;
            pass.changed = true;
        }

        // Aggregators first: their excludes suppress files later in this pass
        let mut exclude_patterns: Vec<String> = Vec::new();
        let mut extra_dirs: Vec<(PathBuf, bool, bool)> = Vec::new();
        for path in entries.iter().filter(|p| aggregator::is_aggregator(p)) {
            seen.insert(path.clone());
            if self.scan_aggregator(&folder, path, &mut exclude_patterns, &mut extra_dirs, pass) {
                folder_changed = true;
                pass.changed = true;
            }
        }
        let excludes = match ExcludeSet::build(&folder, &exclude_patterns) {
            Ok(set) => set,
            Err(e) => {
                pass.errors.push(e.to_string());
                ExcludeSet::default()
            }
        };

        // Addin manifests next; they may reference module files that must
        // not be scanned standalone
        for path in entries.iter().filter(|p| aggregator::is_addin_manifest(p)) {
            if excludes.is_excluded(path) {
                continue;
            }
            seen.insert(path.clone());
            if self.visit_file(&folder, path, domain, true, &mut ignore, pass) {
                folder_changed = true;
                pass.changed = true;
            }
        }

        // Remaining compiled modules
        for path in entries.iter().filter(|p| aggregator::is_module(p)) {
            if excludes.is_excluded(path) || ignore.contains(path) {
                continue;
            }
            seen.insert(path.clone());
            if self.visit_file(&folder, path, domain, false, &mut ignore, pass) {
                folder_changed = true;
                pass.changed = true;
            }
        }

        // Recurse
        let mut children: Vec<PathBuf> = Vec::new();
        for (dir, dir_recursive, shared) in extra_dirs {
            let child_domain = if shared { Domain::Global } else { domain };
            children.push(self.scan_folder(&dir, child_domain, dir_recursive, pass));
        }
        if recursive {
            for path in entries.iter().filter(|p| p.is_dir()) {
                children.push(self.scan_folder(path, domain, true, pass));
            }
        }

        // Subfolders remembered from the last pass but not reached in this
        // one have vanished; reconcile them so their addins are removed
        for previous in known_subfolders {
            if !pass.folders_visited.contains(&previous) && !previous.is_dir() {
                pass.folders_visited.insert(previous.clone());
                self.reconcile_lost_folder(&previous, pass);
            }
        }
        self.cache.set_subfolders(&folder, children);

        // Reconcile: anything cached but no longer present is missing
        let missing = self.cache.folder(&folder).missing_files(&seen);
        for info in missing {
            debug!("File disappeared: {:?}", info.path);
            self.cache.remove_file_info(&folder, &info.path);
            if info.has_addin() {
                folder_changed = true;
                pass.changed = true;
            }
            pass.missing.push(info);
        }

        if folder_changed {
            self.cache.touch(&folder);
        }
        folder
    }

    fn scan_aggregator(
        &mut self,
        folder: &Path,
        path: &Path,
        exclude_patterns: &mut Vec<String>,
        extra_dirs: &mut Vec<(PathBuf, bool, bool)>,
        pass: &mut ScanPass,
    ) -> bool {
        let fingerprint = match Fingerprint::of(path) {
            Ok(fp) => fp,
            Err(e) => {
                pass.errors.push(format!("{}: {}", path.display(), e));
                return false;
            }
        };
        let previous = self.cache.get_file_info(folder, path);
        let unchanged = previous
            .as_ref()
            .map(|info| info.fingerprint == fingerprint && !info.scan_error)
            .unwrap_or(false);

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                pass.errors.push(format!("{}: {}", path.display(), e));
                return false;
            }
        };
        match AggregatorManifest::parse(path, &content) {
            Ok(manifest) => {
                exclude_patterns.extend(manifest.exclude.iter().cloned());
                for entry in &manifest.directories {
                    let dir = manifest.resolve_directory(folder, entry);
                    extra_dirs.push((dir, entry.recursive, entry.shared));
                }
                if !unchanged {
                    // A brand-new aggregator only matters once it pulls in
                    // content; the files it declares drive `changed` themselves
                    self.cache.set_file_info(
                        folder,
                        FileInfo {
                            path: path.to_path_buf(),
                            fingerprint,
                            ..Default::default()
                        },
                    );
                    return previous.is_some();
                }
                false
            }
            Err(e) => {
                pass.errors.push(e.to_string());
                self.cache.set_file_info(
                    folder,
                    FileInfo {
                        path: path.to_path_buf(),
                        fingerprint,
                        scan_error: true,
                        ..Default::default()
                    },
                );
                false
            }
        }
    }

    fn visit_file(
        &mut self,
        folder: &Path,
        path: &Path,
        domain: Domain,
        is_manifest: bool,
        ignore: &mut HashSet<PathBuf>,
        pass: &mut ScanPass,
    ) -> bool {
        let fingerprint = match Fingerprint::of(path) {
            Ok(fp) => fp,
            Err(e) => {
                pass.errors.push(format!("{}: {}", path.display(), e));
                return false;
            }
        };

        if let Some(info) = self.cache.get_file_info(folder, path) {
            if info.fingerprint == fingerprint {
                if !info.scan_error {
                    // Unchanged and previously successful: skip entirely
                    for ignored in &info.ignore_paths {
                        ignore.insert(ignored.clone());
                    }
                    return false;
                }
                // Unchanged but errored last time: re-queue without marking
                // the pass as changed, so one broken file does not force
                // full relation regeneration forever
                self.scan_file(folder, path, domain, is_manifest, fingerprint, ignore, pass);
                return false;
            }
            self.scan_file(folder, path, domain, is_manifest, fingerprint, ignore, pass);
            return true;
        }

        self.scan_file(folder, path, domain, is_manifest, fingerprint, ignore, pass);
        true
    }

    #[allow(clippy::too_many_arguments)]
    fn scan_file(
        &mut self,
        folder: &Path,
        path: &Path,
        domain: Domain,
        is_manifest: bool,
        fingerprint: Fingerprint,
        ignore: &mut HashSet<PathBuf>,
        pass: &mut ScanPass,
    ) {
        let previous = self.cache.get_file_info(folder, path);
        let previous_addin_id = previous
            .as_ref()
            .filter(|info| info.has_addin())
            .map(|info| info.addin_id.clone());

        let outcome = if is_manifest {
            self.scan_manifest(path)
        } else {
            self.scan_module(path)
        };

        match outcome {
            Ok(Some((main, optional_modules))) => {
                let mut ignore_paths = Vec::new();
                for module in std::iter::once(&main).chain(optional_modules.iter()) {
                    for file in &module.referenced_files {
                        let referenced = folder.join(file);
                        ignore.insert(referenced.clone());
                        ignore_paths.push(referenced);
                    }
                }
                self.cache.set_file_info(
                    folder,
                    FileInfo {
                        path: path.to_path_buf(),
                        fingerprint,
                        addin_id: previous
                            .as_ref()
                            .map(|p| p.addin_id.clone())
                            .unwrap_or_default(),
                        addin_version: previous
                            .as_ref()
                            .map(|p| p.addin_version.clone())
                            .unwrap_or_default(),
                        is_root: previous.as_ref().map(|p| p.is_root).unwrap_or(false),
                        record: previous.map(|p| p.record).unwrap_or_default(),
                        scan_error: false,
                        ignore_paths,
                    },
                );
                pass.scans.push(FileScan {
                    path: path.to_path_buf(),
                    folder: folder.to_path_buf(),
                    domain,
                    main,
                    optional_modules,
                    previous_addin_id,
                });
            }
            Ok(None) => {
                // Not an addin; remember that so it is skipped until it changes
                self.cache.set_file_info(
                    folder,
                    FileInfo {
                        path: path.to_path_buf(),
                        fingerprint,
                        ..Default::default()
                    },
                );
            }
            Err(e) => {
                pass.errors.push(e.to_string());
                self.cache.set_file_info(
                    folder,
                    FileInfo {
                        path: path.to_path_buf(),
                        fingerprint,
                        addin_id: previous
                            .as_ref()
                            .map(|p| p.addin_id.clone())
                            .unwrap_or_default(),
                        addin_version: previous
                            .as_ref()
                            .map(|p| p.addin_version.clone())
                            .unwrap_or_default(),
                        is_root: previous.as_ref().map(|p| p.is_root).unwrap_or(false),
                        record: previous.map(|p| p.record).unwrap_or_default(),
                        scan_error: true,
                        ignore_paths: Vec::new(),
                    },
                );
            }
        }
    }

    fn scan_manifest(
        &self,
        path: &Path,
    ) -> brokkr_core::Result<Option<(ModuleMetadata, Vec<ModuleMetadata>)>> {
        let content = fs::read_to_string(path)?;
        let parsed = manifest::parse_addin_manifest(path, &content)?;
        Ok(Some((parsed.main, parsed.optional_modules)))
    }

    fn scan_module(
        &self,
        path: &Path,
    ) -> brokkr_core::Result<Option<(ModuleMetadata, Vec<ModuleMetadata>)>> {
        match self.reflector.reflect(path)? {
            Some(metadata) => Ok(Some((metadata, Vec::new()))),
            None => Ok(None),
        }
    }

    fn apply_scan_index(
        &mut self,
        folder: &Path,
        seen: &mut HashSet<PathBuf>,
        ignore: &mut HashSet<PathBuf>,
        pass: &mut ScanPass,
    ) -> bool {
        let index_path = folder.join(SCAN_INDEX_FILE);
        seen.insert(index_path.clone());
        let content = match fs::read_to_string(&index_path) {
            Ok(content) => content,
            Err(e) => {
                pass.errors.push(format!("{}: {}", index_path.display(), e));
                return false;
            }
        };
        let index: ScanIndex = match serde_yaml_ng::from_str(&content) {
            Ok(index) => index,
            Err(e) => {
                pass.errors.push(format!("{}: {}", index_path.display(), e));
                return false;
            }
        };
        let mut changed = false;
        for entry in index.addins {
            let file = folder.join(&entry.file);
            seen.insert(file.clone());
            ignore.insert(file.clone());
            let fingerprint = Fingerprint::of(&file).unwrap_or_default();
            let existing = self.cache.get_file_info(folder, &file);
            let info = FileInfo {
                path: file.clone(),
                fingerprint,
                addin_id: entry.id.clone(),
                addin_version: entry.version.clone(),
                is_root: entry.is_root,
                record: entry.record.clone(),
                scan_error: false,
                ignore_paths: Vec::new(),
            };
            if existing.as_ref() != Some(&info) {
                changed = true;
                self.cache.set_file_info(folder, info);
            }
        }
        changed
    }

    fn reconcile_lost_folder(&mut self, folder: &Path, pass: &mut ScanPass) {
        let info = self.cache.drop_folder(folder);

        // The lost folder's own subtree is gone with it; directories it
        // pulled in that still exist elsewhere stay scannable
        for sub in &info.subfolders {
            if !pass.folders_visited.contains(sub) && !sub.is_dir() {
                pass.folders_visited.insert(sub.clone());
                self.reconcile_lost_folder(sub, pass);
            }
        }

        if info.files.is_empty() {
            return;
        }
        debug!(
            "Folder {:?} disappeared with {} cached files",
            folder,
            info.files.len()
        );
        // A vanished directory invalidates every relation derived from it
        pass.changed = true;
        pass.regenerate_relations = true;
        for file in info.files.into_values() {
            pass.missing.push(file);
        }
    }
}
