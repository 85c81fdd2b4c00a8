use cachefs::catalog::CacheCatalog;
use cachefs::path::LogicalPath;
use cachefs::uploader::test::RecordingUploader;

fn open_catalog(dir: &tempfile::TempDir, limit: u64) -> CacheCatalog<RecordingUploader> {
    CacheCatalog::open(dir.path(), limit, 1024, 64, RecordingUploader::new()).unwrap()
}

#[test]
fn read_your_writes() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open_catalog(&dir, 1 << 20);
    let path = LogicalPath::new("bucket/a.sst").unwrap();

    catalog.create(&path).unwrap();
    catalog.write(&path, b"hello world").unwrap();

    let data = catalog.read(&path, 0, 11).unwrap();
    assert_eq!(data, b"hello world");
}

#[test]
fn cache_disk_agreement_after_flush() {
    let dir = tempfile::tempdir().unwrap();
    // flush_size of 4 forces an on-disk flush well before the read.
    let catalog = CacheCatalog::open(dir.path(), 1 << 20, 1024, 4, RecordingUploader::new()).unwrap();
    let path = LogicalPath::new("bucket/manifest-1").unwrap();

    catalog.create(&path).unwrap();
    catalog.write(&path, b"0123456789").unwrap();

    let disk_path = dir.path().join("bucket/manifest-1");
    let on_disk = std::fs::metadata(&disk_path).unwrap().len();
    assert!(on_disk > 0, "append buffer should have been flushed to disk");

    let data = catalog.read(&path, 0, 10).unwrap();
    assert_eq!(data, b"0123456789");
}

#[test]
fn restart_fidelity() {
    let dir = tempfile::tempdir().unwrap();
    {
        let catalog = open_catalog(&dir, 1 << 20);
        let path = LogicalPath::new("bucket/wal-1").unwrap();
        catalog.create(&path).unwrap();
        catalog.write(&path, b"some bytes").unwrap();
    }

    let catalog = open_catalog(&dir, 1 << 20);
    let path = LogicalPath::new("bucket/wal-1").unwrap();
    assert_eq!(catalog.exists(&path), Some(10));
}

#[test]
fn remove_clears_catalog_entry() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open_catalog(&dir, 1 << 20);
    let path = LogicalPath::new("bucket/temp.sst").unwrap();

    catalog.create(&path).unwrap();
    assert!(catalog.exists(&path).is_some());

    assert!(catalog.remove(&path).unwrap());
    assert!(catalog.exists(&path).is_none());
    assert!(!catalog.remove(&path).unwrap());
}

#[test]
fn eviction_uploads_dirty_entries_and_drops_some_sst() {
    let dir = tempfile::tempdir().unwrap();
    // A tiny limit forces admission-time eviction well before 8 * 64 bytes.
    let catalog = CacheCatalog::open(dir.path(), 256, 4, 64, RecordingUploader::new()).unwrap();

    for i in 0..8 {
        let path = LogicalPath::new(format!("bucket/{i}.sst")).unwrap();
        catalog.create(&path).unwrap();
        catalog.write(&path, &vec![b'x'; 64]).unwrap();
    }

    let remaining = (0..8)
        .filter(|i| {
            catalog
                .exists(&LogicalPath::new(format!("bucket/{i}.sst")).unwrap())
                .is_some()
        })
        .count();
    assert!(
        remaining < 8,
        "at least one sst should have been evicted once the budget was exceeded"
    );
}

#[test]
fn non_sst_entries_survive_eviction() {
    let dir = tempfile::tempdir().unwrap();
    // hot_ceiling = 256 - 256/4 = 192.
    let catalog = CacheCatalog::open(dir.path(), 256, 4, 64, RecordingUploader::new()).unwrap();

    // Three 64-byte entries fill the catalog right up to the hot ceiling,
    // all admitted hot.
    for i in 0..3 {
        let path = LogicalPath::new(format!("bucket/{i}.sst")).unwrap();
        catalog.create(&path).unwrap();
        catalog.write(&path, &vec![b'x'; 64]).unwrap();
    }

    // Admitted at total_bytes == hot_ceiling, so it lands in the cold queue.
    let manifest = LogicalPath::new("bucket/MANIFEST-000001").unwrap();
    catalog.create(&manifest).unwrap();
    catalog.write(&manifest, &vec![b'm'; 32]).unwrap();

    // Two more cold-admitted sst entries: the second create() pushes
    // total_bytes over the limit and triggers release(), which walks the
    // cold queue back to front (manifest, then the sst beside it).
    for i in 3..5 {
        let path = LogicalPath::new(format!("bucket/{i}.sst")).unwrap();
        catalog.create(&path).unwrap();
        catalog.write(&path, &vec![b'x'; 64]).unwrap();
    }

    assert!(
        catalog.exists(&manifest).is_some(),
        "non-sst entries are never dropped by eviction, only flushed and uploaded"
    );
}

#[test]
fn two_touches_promote_cold_entry_and_shield_it_from_eviction() {
    let dir = tempfile::tempdir().unwrap();
    // hot_ceiling = 256 - 256/4 = 192.
    let catalog = CacheCatalog::open(dir.path(), 256, 4, 1 << 20, RecordingUploader::new()).unwrap();

    // Three hot-admitted entries fill the catalog right up to the hot
    // ceiling (total_bytes == 192 afterwards).
    for i in 0..3 {
        let path = LogicalPath::new(format!("bucket/{i}.sst")).unwrap();
        catalog.create(&path).unwrap();
        catalog.write(&path, &vec![b'x'; 64]).unwrap();
    }

    // Admitted at total_bytes == hot_ceiling, so it lands in the cold
    // queue with a 64-byte write bringing total_bytes to the limit (256).
    let candidate = LogicalPath::new("bucket/c.sst").unwrap();
    catalog.create(&candidate).unwrap();
    catalog.write(&candidate, &vec![b'x'; 64]).unwrap();

    // First touch: candidate gets a ghost link in the hot queue but stays
    // cold. Second touch: candidate is promoted to hot, which demotes the
    // current hot tail (bucket/0.sst) to cold via exchange().
    catalog.read(&candidate, 0, 0).unwrap();
    catalog.read(&candidate, 0, 0).unwrap();

    // A further non-sst entry pushes total_bytes over the limit, triggering
    // release(). Only bucket/0.sst (now cold after the demotion) is in the
    // cold queue to be swept; the promoted candidate must survive.
    let manifest = LogicalPath::new("bucket/MANIFEST-1").unwrap();
    catalog.create(&manifest).unwrap();
    catalog.write(&manifest, b"m").unwrap();

    assert!(
        catalog.exists(&candidate).is_some(),
        "entry promoted to hot by a second touch must survive a release pass"
    );
    assert!(
        catalog.exists(&LogicalPath::new("bucket/0.sst").unwrap()).is_none(),
        "the entry demoted to cold by exchange() should be the one release() evicts"
    );
}

#[test]
fn rename_preserves_contents() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open_catalog(&dir, 1 << 20);
    let old = LogicalPath::new("bucket/old.sst").unwrap();
    let new = LogicalPath::new("bucket/new.sst").unwrap();

    catalog.create(&old).unwrap();
    catalog.write(&old, b"payload").unwrap();

    assert!(catalog.rename(&old, &new).unwrap());
    assert!(catalog.exists(&old).is_none());
    assert_eq!(catalog.read(&new, 0, 7).unwrap(), b"payload");
}
