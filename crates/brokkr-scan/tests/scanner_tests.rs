//! Integration tests for the folder scanner: change detection, exclude
//! suppression, ignore lists, and missing-file reconciliation.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use brokkr_core::types::Domain;
use brokkr_core::{NullReflector, SilentProgress};
use brokkr_scan::{FolderInfoCache, FolderScanner, ScanRoot};
use brokkr_store::Store;

const CORE_MANIFEST: &str = r#"
addin:
  id: Core
  namespace: App
  version: "1.0"
  is-root: true
extension-points:
  - path: /App/Tools
    name: Tool
    type: App.ITool
"#;

const EXT_MANIFEST: &str = r#"
addin:
  id: Ext
  namespace: App
  version: "1.0"
dependencies:
  - addin: App.Core
    version: "1.0"
extensions:
  - path: /App/Tools
    nodes:
      - node: Tool
        attributes: { id: hammer }
"#;

struct Fixture {
    _store_dir: TempDir,
    addin_dir: TempDir,
    store: Store,
}

impl Fixture {
    fn new() -> Self {
        let store_dir = TempDir::new().unwrap();
        let store = Store::open(store_dir.path()).unwrap();
        Self {
            _store_dir: store_dir,
            addin_dir: TempDir::new().unwrap(),
            store,
        }
    }

    fn write(&self, name: &str, content: &str) {
        let path = self.addin_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn roots(&self) -> Vec<ScanRoot> {
        vec![ScanRoot {
            path: self.addin_dir.path().to_path_buf(),
            recursive: false,
        }]
    }

    fn scan(&self, cache: &mut FolderInfoCache) -> brokkr_scan::ScanPass {
        let reflector = NullReflector;
        let mut scanner = FolderScanner::new(cache, &reflector, Domain::Private(1));
        scanner.scan(&self.roots(), &mut SilentProgress)
    }

    fn commit(&self, cache: &mut FolderInfoCache) {
        let mut tx = self.store.begin_transaction().unwrap().unwrap();
        cache.flush(&mut tx).unwrap();
        tx.commit().unwrap();
    }
}

#[test]
fn first_scan_queues_manifests_and_marks_changed() {
    let fx = Fixture::new();
    fx.write("core.addin.yaml", CORE_MANIFEST);
    fx.write("ext.addin.yaml", EXT_MANIFEST);

    let mut cache = FolderInfoCache::new(fx.store.clone());
    let pass = fx.scan(&mut cache);

    assert!(pass.changed);
    assert_eq!(pass.scans.len(), 2);
    assert!(pass.errors.is_empty());
    assert!(pass.missing.is_empty());
}

#[test]
fn unchanged_second_scan_is_a_no_op() {
    let fx = Fixture::new();
    fx.write("core.addin.yaml", CORE_MANIFEST);

    let mut cache = FolderInfoCache::new(fx.store.clone());
    let pass = fx.scan(&mut cache);
    assert_eq!(pass.scans.len(), 1);
    fx.commit(&mut cache);

    // Fresh cache simulates a new process over the same committed store
    let mut cache = FolderInfoCache::new(fx.store.clone());
    let pass = fx.scan(&mut cache);
    assert!(!pass.changed);
    assert!(pass.scans.is_empty());
    assert!(pass.missing.is_empty());
    assert!(!cache.is_dirty());
}

#[test]
fn changed_file_rescans() {
    let fx = Fixture::new();
    fx.write("core.addin.yaml", CORE_MANIFEST);

    let mut cache = FolderInfoCache::new(fx.store.clone());
    fx.scan(&mut cache);
    fx.commit(&mut cache);

    fx.write("core.addin.yaml", &CORE_MANIFEST.replace("\"1.0\"", "\"1.1\""));

    let mut cache = FolderInfoCache::new(fx.store.clone());
    let pass = fx.scan(&mut cache);
    assert!(pass.changed);
    assert_eq!(pass.scans.len(), 1);
}

#[test]
fn malformed_manifest_is_collected_and_retried_without_changing_pass() {
    let fx = Fixture::new();
    fx.write("broken.addin.yaml", "addin: [not, a, header]");

    let mut cache = FolderInfoCache::new(fx.store.clone());
    let pass = fx.scan(&mut cache);
    assert_eq!(pass.errors.len(), 1);
    assert!(pass.scans.is_empty());
    assert!(pass.changed);
    fx.commit(&mut cache);

    // Unchanged-but-erroring entries re-queue without marking the pass changed
    let mut cache = FolderInfoCache::new(fx.store.clone());
    let pass = fx.scan(&mut cache);
    assert!(!pass.changed);
    assert_eq!(pass.errors.len(), 1);
}

#[test]
fn aggregator_excludes_suppress_files_in_same_pass() {
    let fx = Fixture::new();
    fx.write(
        "site.addins.yaml",
        "exclude:\n  - broken.addin.yaml\n  - \"legacy/*\"\n",
    );
    fx.write("broken.addin.yaml", "addin: [garbage");
    fx.write("legacy/old.addin.yaml", CORE_MANIFEST);
    fx.write("core.addin.yaml", CORE_MANIFEST);

    let mut cache = FolderInfoCache::new(fx.store.clone());
    let pass = fx.scan(&mut cache);

    // Only the non-excluded manifest is scanned; the excluded ones produce
    // neither scans nor errors
    assert_eq!(pass.scans.len(), 1);
    assert!(pass.scans[0].path.ends_with("core.addin.yaml"));
    assert!(pass.errors.is_empty());
}

#[test]
fn aggregator_directories_are_scanned_with_propagated_domain() {
    let fx = Fixture::new();
    let extra = TempDir::new().unwrap();
    fs::write(extra.path().join("shared.addin.yaml"), CORE_MANIFEST).unwrap();
    fx.write(
        "site.addins.yaml",
        &format!(
            "directories:\n  - path: {}\n    shared: true\n",
            extra.path().display()
        ),
    );

    let mut cache = FolderInfoCache::new(fx.store.clone());
    let pass = fx.scan(&mut cache);

    assert_eq!(pass.scans.len(), 1);
    assert_eq!(pass.scans[0].domain, Domain::Global);

    let canonical = extra.path().canonicalize().unwrap();
    assert_eq!(cache.folder(&canonical).domain, Some(Domain::Global));
}

#[test]
fn manifest_referenced_modules_are_not_scanned_standalone() {
    let fx = Fixture::new();
    let manifest = format!("{CORE_MANIFEST}modules:\n  - files: [core-impl.so]\n");
    fx.write("core.addin.yaml", &manifest);
    fx.write("core-impl.so", "not a real binary");
    fx.write("standalone.so", "not a real binary");

    let mut cache = FolderInfoCache::new(fx.store.clone());
    let pass = fx.scan(&mut cache);

    // Only the manifest scan is queued: the referenced module is ignored
    // and the standalone one has no metadata under the null reflector
    assert_eq!(pass.scans.len(), 1);
    assert!(pass.scans[0].path.ends_with("core.addin.yaml"));
}

#[test]
fn deleted_file_is_reported_missing() {
    let fx = Fixture::new();
    fx.write("core.addin.yaml", CORE_MANIFEST);

    let mut cache = FolderInfoCache::new(fx.store.clone());
    fx.scan(&mut cache);
    fx.commit(&mut cache);

    fs::remove_file(fx.addin_dir.path().join("core.addin.yaml")).unwrap();

    let mut cache = FolderInfoCache::new(fx.store.clone());
    let pass = fx.scan(&mut cache);
    assert_eq!(pass.missing.len(), 1);
    assert!(pass.missing[0].path.ends_with("core.addin.yaml"));
}

#[test]
fn disappeared_folder_forces_relation_regeneration() {
    let fx = Fixture::new();
    fx.write("core.addin.yaml", CORE_MANIFEST);

    let mut cache = FolderInfoCache::new(fx.store.clone());
    fx.scan(&mut cache);
    fx.commit(&mut cache);

    // Scan the same (now deleted) canonical path with a fresh cache
    let canonical = fx.addin_dir.path().canonicalize().unwrap();
    drop(fx.addin_dir);

    let mut cache = FolderInfoCache::new(fx.store.clone());
    let reflector = NullReflector;
    let mut scanner = FolderScanner::new(&mut cache, &reflector, Domain::Private(1));
    let roots = vec![ScanRoot {
        path: canonical,
        recursive: false,
    }];
    let pass = scanner.scan(&roots, &mut SilentProgress);

    assert!(pass.changed);
    assert!(pass.regenerate_relations);
    assert_eq!(pass.missing.len(), 1);
}

#[test]
fn deleted_subdirectory_is_reconciled() {
    let fx = Fixture::new();
    fx.write("sub/nested.addin.yaml", CORE_MANIFEST);

    let roots = vec![ScanRoot {
        path: fx.addin_dir.path().to_path_buf(),
        recursive: true,
    }];
    let reflector = NullReflector;

    let mut cache = FolderInfoCache::new(fx.store.clone());
    let mut scanner = FolderScanner::new(&mut cache, &reflector, Domain::Private(1));
    let pass = scanner.scan(&roots, &mut SilentProgress);
    assert_eq!(pass.scans.len(), 1);
    fx.commit(&mut cache);

    // The subdirectory vanishes; the next pass never walks into it but
    // must still report its cached files as missing
    fs::remove_dir_all(fx.addin_dir.path().join("sub")).unwrap();

    let mut cache = FolderInfoCache::new(fx.store.clone());
    let mut scanner = FolderScanner::new(&mut cache, &reflector, Domain::Private(1));
    let pass = scanner.scan(&roots, &mut SilentProgress);
    assert!(pass.changed);
    assert!(pass.regenerate_relations);
    assert_eq!(pass.missing.len(), 1);
    assert!(pass.missing[0].path.ends_with("nested.addin.yaml"));
}

#[test]
fn unchanged_folder_keeps_scan_stamp_when_sibling_changes() {
    let fx = Fixture::new();
    fx.write("core.addin.yaml", CORE_MANIFEST);
    let other = TempDir::new().unwrap();
    fs::write(other.path().join("ext.addin.yaml"), EXT_MANIFEST).unwrap();

    let roots = vec![
        ScanRoot {
            path: fx.addin_dir.path().to_path_buf(),
            recursive: false,
        },
        ScanRoot {
            path: other.path().to_path_buf(),
            recursive: false,
        },
    ];
    let reflector = NullReflector;

    let mut cache = FolderInfoCache::new(fx.store.clone());
    let mut scanner = FolderScanner::new(&mut cache, &reflector, Domain::Private(1));
    scanner.scan(&roots, &mut SilentProgress);
    fx.commit(&mut cache);

    let other_canonical = other.path().canonicalize().unwrap();
    let mut cache = FolderInfoCache::new(fx.store.clone());
    let stamp = cache.folder(&other_canonical).last_scan;
    assert!(stamp.is_some());

    // Change only the first root; the second folder's record keeps its
    // scan stamp instead of being rewritten along for the ride
    fx.write("core.addin.yaml", &CORE_MANIFEST.replace("\"1.0\"", "\"1.0.1\""));
    let mut cache = FolderInfoCache::new(fx.store.clone());
    let mut scanner = FolderScanner::new(&mut cache, &reflector, Domain::Private(1));
    let pass = scanner.scan(&roots, &mut SilentProgress);
    assert!(pass.changed);
    assert_eq!(pass.scans.len(), 1);
    assert_eq!(cache.folder(&other_canonical).last_scan, stamp);
}

#[test]
fn recursive_root_descends_into_subdirectories() {
    let fx = Fixture::new();
    fx.write("sub/nested.addin.yaml", CORE_MANIFEST);

    let mut cache = FolderInfoCache::new(fx.store.clone());
    let reflector = NullReflector;
    let mut scanner = FolderScanner::new(&mut cache, &reflector, Domain::Private(1));
    let roots = vec![ScanRoot {
        path: fx.addin_dir.path().to_path_buf(),
        recursive: true,
    }];
    let pass = scanner.scan(&roots, &mut SilentProgress);

    assert_eq!(pass.scans.len(), 1);
    assert!(pass.scans[0].path.ends_with(Path::new("sub/nested.addin.yaml")));
}
