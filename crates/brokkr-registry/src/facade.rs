//! The addin registry facade
//!
//! Ties the store, the scanner, the description builder, and the graph
//! resolver together behind one type. An update pass scans every
//! registered folder, rebuilds descriptions for changed files, resolves
//! the extension graph, and commits folder cache, description records,
//! and host index in one transaction. A pass over unchanged folders
//! performs no writes at all.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use brokkr_core::types::{AddinDescription, Domain, ExtensionPoint};
use brokkr_core::{AddinVersion, Error, ModuleReflector, ProgressMonitor, Result};
use brokkr_resolve::{BuildInput, DescriptionBuilder, ExtensionGraphResolver};
use brokkr_scan::{FileInfo, FolderInfoCache, FolderScanner, ScanRoot};
use brokkr_store::{RegistryStatus, Store, HOST_INDEX_RECORD};

use crate::index::{HostIndex, InstalledAddin, RegisteredFolder};

/// What one update pass did
#[derive(Debug, Default)]
pub struct UpdateSummary {
    /// Whether anything was written
    pub changed: bool,

    /// True when another writer held the transaction and the pass backed
    /// off without touching anything
    pub busy: bool,

    /// Files whose descriptions were rebuilt
    pub scanned: usize,

    /// Installed addins after the pass
    pub installed: usize,

    /// Resolution warnings (dangling extensions, dropped contributions)
    pub warnings: Vec<String>,

    /// Scan and validation errors; the affected files retry next pass
    pub errors: Vec<String>,
}

/// The addin registry for one host, rooted at one store directory
pub struct AddinRegistry {
    store: Store,
    domain: Domain,
    reflector: Box<dyn ModuleReflector>,
    index: HostIndex,
    descriptions: Vec<AddinDescription>,
    // Forces a full resolve on the next update even when the scan reports
    // nothing changed (fresh host index, folder set edited)
    stale: bool,
}

impl std::fmt::Debug for AddinRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddinRegistry")
            .field("store", &self.store)
            .field("domain", &self.domain)
            .field("index", &self.index)
            .field("descriptions", &self.descriptions)
            .field("stale", &self.stale)
            .finish_non_exhaustive()
    }
}

impl AddinRegistry {
    /// Open a registry over a store directory.
    ///
    /// A missing host index starts empty and is rebuilt on the first
    /// update; an index that exists but fails to decode is the one cache
    /// corruption treated as a hard failure, because everything else
    /// hangs off it.
    pub fn open(
        cache_root: impl Into<PathBuf>,
        reflector: Box<dyn ModuleReflector>,
    ) -> Result<Self> {
        let store = Store::open(cache_root)?;
        let has_index = store.contains(HOST_INDEX_RECORD);
        let index = if has_index {
            store
                .read::<HostIndex>(HOST_INDEX_RECORD)
                .ok_or_else(|| Error::cache_corruption(HOST_INDEX_RECORD))?
        } else {
            HostIndex::default()
        };

        let domain = private_domain(store.root());
        let mut stale = !has_index;
        let mut descriptions = Vec::new();
        for entry in &index.installed {
            match store.read::<AddinDescription>(&entry.record) {
                Some(desc) => descriptions.push(desc),
                None => {
                    debug!(
                        "Description record {} for {} unreadable, will rescan",
                        entry.record, entry.id
                    );
                    stale = true;
                }
            }
        }

        Ok(Self {
            store,
            domain,
            reflector,
            index,
            descriptions,
            stale,
        })
    }

    /// The store this registry persists into
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// This registry's private domain
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Register a directory to be scanned on every update. Returns `false`
    /// when it was already registered with the same settings, or when
    /// another writer held the transaction and nothing was changed.
    pub fn register_folder(&mut self, path: impl Into<PathBuf>, recursive: bool) -> Result<bool> {
        let folder = RegisteredFolder {
            path: path.into(),
            recursive,
        };
        if self.index.folders.contains(&folder) {
            return Ok(false);
        }
        let Some(mut tx) = self.store.begin_transaction()? else {
            info!("Registry busy, folder registration skipped");
            return Ok(false);
        };
        let mut index = self.index.clone();
        index.folders.retain(|f| f.path != folder.path);
        index.folders.push(folder);
        tx.write(HOST_INDEX_RECORD, &index)?;
        tx.commit()?;
        self.index = index;
        self.stale = true;
        Ok(true)
    }

    /// Stop scanning a directory. Its addins disappear on the next update.
    /// Backs off and returns `false` when another writer holds the
    /// transaction.
    pub fn unregister_folder(&mut self, path: &Path) -> Result<bool> {
        if !self.index.folders.iter().any(|f| f.path == path) {
            return Ok(false);
        }
        let Some(mut tx) = self.store.begin_transaction()? else {
            info!("Registry busy, folder removal skipped");
            return Ok(false);
        };
        let mut index = self.index.clone();
        index.folders.retain(|f| f.path != path);
        tx.write(HOST_INDEX_RECORD, &index)?;
        tx.commit()?;
        self.index = index;
        self.stale = true;
        Ok(true)
    }

    /// Run one update pass: scan, rebuild, resolve, commit.
    ///
    /// When another process holds the write transaction the pass backs
    /// off without mutating anything and reports `busy`.
    pub fn update(&mut self, progress: &mut dyn ProgressMonitor) -> Result<UpdateSummary> {
        let mut summary = UpdateSummary::default();
        let mut status = self.store.status();
        let mut cache = FolderInfoCache::new(self.store.clone());

        let roots: Vec<ScanRoot> = self
            .index
            .folders
            .iter()
            .map(|f| ScanRoot {
                path: f.path.clone(),
                recursive: f.recursive,
            })
            .collect();

        let mut scanner = FolderScanner::new(&mut cache, self.reflector.as_ref(), self.domain);
        let pass = scanner.scan(&roots, progress);
        for error in &pass.errors {
            progress.warn(error);
            summary.errors.push(error.clone());
        }

        if !self.stale
            && !pass.changed
            && !pass.regenerate_relations
            && pass.scans.is_empty()
            && pass.missing.is_empty()
            && !cache.is_dirty()
        {
            debug!("Nothing changed, skipping relation regeneration");
            summary.installed = self.index.installed.len();
            return Ok(summary);
        }

        let Some(mut tx) = self.store.begin_transaction()? else {
            info!("Another process is updating the registry, backing off");
            summary.busy = true;
            summary.installed = self.index.installed.len();
            return Ok(summary);
        };

        // Rebuild descriptions for everything the scanner queued
        summary.scanned = pass.scans.len();
        let mut built: HashMap<PathBuf, (AddinDescription, String)> = HashMap::new();
        for scan in pass.scans {
            let output = DescriptionBuilder::build(BuildInput {
                source_file: scan.path.clone(),
                domain: scan.domain,
                main: scan.main,
                optional_modules: scan.optional_modules,
                previous_addin_id: scan.previous_addin_id,
            });
            if !output.errors.is_empty() {
                for error in &output.errors {
                    progress.warn(error);
                    summary.errors.push(error.clone());
                }
                mark_scan_error(&mut cache, &scan.folder, &scan.path);
                continue;
            }

            let description = output.description;
            let record = match record_path(&description, &scan.path) {
                Ok(record) => record,
                Err(e) => {
                    let message = format!("{}: {}", scan.path.display(), e);
                    progress.warn(&message);
                    summary.errors.push(message);
                    mark_scan_error(&mut cache, &scan.folder, &scan.path);
                    continue;
                }
            };
            tx.write(&record, &description)?;

            if let Some(info) = cache.get_file_info(&scan.folder, &scan.path) {
                let updated = FileInfo {
                    addin_id: description.addin_id(),
                    addin_version: description.version.to_string(),
                    is_root: description.is_root,
                    record: record.clone(),
                    ..info.clone()
                };
                if updated != info {
                    cache.set_file_info(&scan.folder, updated);
                }
            }
            built.insert(scan.path.clone(), (description, record));
        }

        // Collect the description of every installed addin: just-built ones
        // from memory, unchanged ones from their store records
        let mut collected: Vec<(AddinDescription, String)> = Vec::new();
        let mut seen_identities: HashSet<(String, String)> = HashSet::new();
        let mut live_records: HashSet<String> = HashSet::new();
        let mut present_ids: HashSet<String> = HashSet::new();
        let mut rescan_fixups: Vec<(PathBuf, FileInfo)> = Vec::new();
        for folder in cache.loaded_folders() {
            let visible = folder
                .domain
                .map(|d| d.visible_to(self.domain))
                .unwrap_or(true);
            for info in folder.files.values() {
                if let Some((description, record)) = built.get(&info.path) {
                    let id = description.addin_id();
                    present_ids.insert(id.clone());
                    if visible
                        && !status.pending_uninstall.contains(&id)
                        && seen_identities.insert((id, description.version.to_string()))
                    {
                        live_records.insert(record.clone());
                        collected.push((description.clone(), record.clone()));
                    }
                    continue;
                }
                if !info.has_addin() || info.scan_error {
                    continue;
                }
                present_ids.insert(info.addin_id.clone());
                if !visible || status.pending_uninstall.contains(&info.addin_id) {
                    continue;
                }
                if !seen_identities.insert((info.addin_id.clone(), info.addin_version.clone())) {
                    // Same content installed from another folder
                    live_records.insert(info.record.clone());
                    continue;
                }
                match self.store.read::<AddinDescription>(&info.record) {
                    Some(description) => {
                        live_records.insert(info.record.clone());
                        collected.push((description, info.record.clone()));
                    }
                    None => {
                        let message = format!(
                            "description record for {} is unreadable, rescanning {}",
                            info.addin_id,
                            info.path.display()
                        );
                        progress.warn(&message);
                        summary.warnings.push(message);
                        // Reset the fingerprint so the next pass rescans it
                        let mut fixed = info.clone();
                        fixed.fingerprint = Default::default();
                        rescan_fixups.push((folder.folder_path.clone(), fixed));
                    }
                }
            }
        }
        for (folder, info) in rescan_fixups {
            cache.set_file_info(&folder, info);
        }

        // Records orphaned by disappeared files
        for missing in &pass.missing {
            if missing.has_addin()
                && !missing.record.is_empty()
                && !live_records.contains(&missing.record)
            {
                tx.delete(&missing.record);
            }
        }

        // A pending uninstall is finished once no file produces the id
        let mut status_changed = false;
        let finished: Vec<String> = status
            .pending_uninstall
            .iter()
            .filter(|id| !present_ids.contains(*id))
            .cloned()
            .collect();
        for id in finished {
            status.pending_uninstall.remove(&id);
            status_changed = true;
        }

        let mut resolver = ExtensionGraphResolver::new();
        for (description, _) in &collected {
            resolver.add_description(description.clone());
        }
        let outcome = resolver.resolve();
        for warning in &outcome.warnings {
            progress.warn(warning);
            summary.warnings.push(warning.clone());
        }

        let mut index = HostIndex {
            folders: self.index.folders.clone(),
            installed: collected
                .iter()
                .map(|(d, record)| InstalledAddin {
                    id: d.addin_id(),
                    version: d.version.clone(),
                    record: record.clone(),
                    is_root: d.is_root,
                    source_file: d.source_file.clone(),
                    domain: d.domain,
                })
                .collect(),
            points: outcome.points,
        };
        index
            .installed
            .sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.version.cmp(&b.version)));
        if index != self.index {
            tx.write(HOST_INDEX_RECORD, &index)?;
        }

        summary.installed = index.installed.len();
        if tx.pending() == 0 && !cache.is_dirty() && !status_changed {
            debug!("Update pass produced no effective changes");
            tx.rollback();
        } else {
            cache.flush(&mut tx)?;
            tx.commit()?;
            summary.changed = true;
            if status_changed {
                self.store.save_status(&status)?;
            }
            self.collect_garbage(&live_records);
            info!(
                "Registry updated: {} addins installed, {} files rescanned",
                summary.installed, summary.scanned
            );
        }

        self.index = index;
        self.descriptions = collected.into_iter().map(|(d, _)| d).collect();
        self.stale = false;
        Ok(summary)
    }

    /// All installed addins
    pub fn addins(&self) -> &[InstalledAddin] {
        &self.index.installed
    }

    /// The full description of an installed addin (highest version)
    pub fn description(&self, id: &str) -> Option<&AddinDescription> {
        self.best_description(id)
    }

    /// A resolved extension point by path
    pub fn extension_point(&self, path: &str) -> Option<&ExtensionPoint> {
        self.index.points.iter().find(|p| p.path == path)
    }

    /// Every resolved extension point
    pub fn extension_points(&self) -> &[ExtensionPoint] {
        &self.index.points
    }

    /// Look up an installed addin by id, optionally constrained to a
    /// required version.
    ///
    /// With `exact_version_match` the version must be equal; otherwise the
    /// required version is checked against each candidate's compatibility
    /// interval and the highest match wins.
    pub fn get_installed_addin(
        &self,
        id: &str,
        required: Option<&AddinVersion>,
        exact_version_match: bool,
        enabled_only: bool,
    ) -> Option<&AddinDescription> {
        if enabled_only && !self.is_enabled(id) {
            return None;
        }
        let mut best: Option<&AddinDescription> = None;
        for desc in self.descriptions.iter().filter(|d| d.addin_id() == id) {
            let matches = match required {
                Some(version) if exact_version_match => &desc.version == version,
                Some(version) => desc.satisfies(version),
                None => true,
            };
            if matches && best.map(|b| desc.version > b.version).unwrap_or(true) {
                best = Some(desc);
            }
        }
        best
    }

    /// Whether an addin is effectively enabled: not explicitly disabled,
    /// and every addin dependency is satisfied by some enabled installed
    /// version. Disabling an addin therefore disables its dependents, and
    /// re-enabling it brings them back.
    pub fn is_enabled(&self, id: &str) -> bool {
        let status = self.store.status();
        self.effective_enabled(id, &status, &mut HashSet::new())
    }

    /// Disable an installed addin
    pub fn disable(&mut self, id: &str) -> Result<()> {
        if !self.index.is_installed(id) {
            return Err(Error::addin_not_found(id));
        }
        let _guard = self.store.lock_write()?;
        let mut status = self.store.status();
        status.disable(id);
        self.store.save_status(&status)
    }

    /// Re-enable a disabled addin
    pub fn enable(&mut self, id: &str) -> Result<()> {
        if !self.index.is_installed(id) {
            return Err(Error::addin_not_found(id));
        }
        let _guard = self.store.lock_write()?;
        let mut status = self.store.status();
        status.enable(id);
        self.store.save_status(&status)
    }

    /// Uninstall an addin: delete its description records and regenerate
    /// the extension graph in the same transaction. The id stays on the
    /// pending-uninstall list until its files disappear, so a later scan
    /// does not resurrect it. Backs off and returns `false` when another
    /// writer holds the transaction.
    pub fn uninstall(&mut self, id: &str) -> Result<bool> {
        if !self.index.is_installed(id) {
            return Err(Error::addin_not_found(id));
        }
        let Some(mut tx) = self.store.begin_transaction()? else {
            info!("Registry busy, uninstall of {} skipped", id);
            return Ok(false);
        };

        let surviving: HashSet<&str> = self
            .index
            .installed
            .iter()
            .filter(|a| a.id != id)
            .map(|a| a.record.as_str())
            .collect();
        for entry in self.index.versions_of(id) {
            if !surviving.contains(entry.record.as_str()) {
                tx.delete(&entry.record);
            }
        }

        let remaining: Vec<AddinDescription> = self
            .descriptions
            .iter()
            .filter(|d| d.addin_id() != id)
            .cloned()
            .collect();
        let mut resolver = ExtensionGraphResolver::new();
        for description in &remaining {
            resolver.add_description(description.clone());
        }
        let outcome = resolver.resolve();
        for warning in &outcome.warnings {
            warn!("{}", warning);
        }

        let mut index = self.index.clone();
        index.installed.retain(|a| a.id != id);
        index.points = outcome.points;
        tx.write(HOST_INDEX_RECORD, &index)?;
        tx.commit()?;

        self.index = index;
        self.descriptions = remaining;

        let mut status = self.store.status();
        if status.pending_uninstall.insert(id.to_string()) {
            self.store.save_status(&status)?;
        }
        info!("Uninstalled addin {}", id);
        Ok(true)
    }

    fn best_description(&self, id: &str) -> Option<&AddinDescription> {
        self.descriptions
            .iter()
            .filter(|d| d.addin_id() == id)
            .max_by(|a, b| a.version.cmp(&b.version))
    }

    fn effective_enabled(
        &self,
        id: &str,
        status: &RegistryStatus,
        visiting: &mut HashSet<String>,
    ) -> bool {
        if !status.is_enabled(id) {
            return false;
        }
        if !visiting.insert(id.to_string()) {
            // Dependency cycle: do not let it disable everything in it
            return true;
        }
        let Some(description) = self.best_description(id) else {
            visiting.remove(id);
            return false;
        };
        let enabled = description.addin_dependencies().all(|(dep_id, required)| {
            self.descriptions
                .iter()
                .any(|d| d.addin_id() == dep_id && d.satisfies(required))
                && self.effective_enabled(dep_id, status, visiting)
        });
        visiting.remove(id);
        enabled
    }

    fn collect_garbage(&self, live_records: &HashSet<String>) {
        let live: HashSet<String> = live_records
            .iter()
            .filter_map(|r| r.strip_prefix("shared/"))
            .filter_map(|r| r.strip_suffix(".bin"))
            .map(str::to_string)
            .collect();
        if let Err(e) = self.store.collect_shared_garbage(&live) {
            warn!("Shared object garbage collection failed: {}", e);
        }
    }
}

/// Store record path for a freshly built description: shared objects are
/// deduplicated by source content hash, private ones keyed by identity
fn record_path(description: &AddinDescription, source: &Path) -> Result<String> {
    if description.domain.is_global() {
        let bytes = fs::read(source)?;
        Ok(Store::shared_record(&Store::content_hash(&bytes)))
    } else {
        Ok(Store::addin_record(
            &description.addin_id(),
            &description.version.to_string(),
        ))
    }
}

fn mark_scan_error(cache: &mut FolderInfoCache, folder: &Path, path: &Path) {
    if let Some(info) = cache.get_file_info(folder, path) {
        if !info.scan_error {
            let mut info = info;
            info.scan_error = true;
            cache.set_file_info(folder, info);
        }
    }
}

/// Derive this registry's private domain from its store location, so the
/// same registry root maps to the same domain across runs
fn private_domain(root: &Path) -> Domain {
    let hash = Store::content_hash(root.to_string_lossy().as_bytes());
    let id = u32::from_str_radix(&hash[..8], 16).unwrap_or(1);
    Domain::Private(id.max(1))
}
