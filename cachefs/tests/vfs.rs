use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cachefs::config::BucketAcl;
use cachefs::object_store::test::InMemoryObjectStore;
use cachefs::object_store::{ObjectMeta, Result as ObjectStoreResult};
use cachefs::path::LogicalPath;
use cachefs::{CacheCatalog, CfsConfig, ObjectStore, Uploader, Vfs, VfsFile, WriteBackScheduler};

fn test_config() -> CfsConfig {
    CfsConfig {
        cache_size: 1 << 20,
        cache_dir: PathBuf::from("/unused-in-tests"),
        endpoint: "http://localhost:9000".to_string(),
        region: "us-east-1".to_string(),
        access_key_id: "test".to_string(),
        access_key_secret: "test".to_string(),
        acl: BucketAcl::Private,
        request_timeout_secs: 5,
        flush_size: 1 << 20,
        cold_multiples: 4,
    }
}

/// An `ObjectStore` that adds a fixed delay before every `put`, wide enough
/// to let a second write-back enqueue for the same path observably race the
/// first before it completes.
struct DelayedStore {
    inner: Arc<InMemoryObjectStore>,
    delay: Duration,
}

impl ObjectStore for DelayedStore {
    fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> ObjectStoreResult<()> {
        std::thread::sleep(self.delay);
        self.inner.put(bucket, key, data)
    }

    fn get(&self, bucket: &str, key: &str, range: Option<(u64, u64)>) -> ObjectStoreResult<Vec<u8>> {
        self.inner.get(bucket, key, range)
    }

    fn head(&self, bucket: &str, key: &str) -> ObjectStoreResult<ObjectMeta> {
        self.inner.head(bucket, key)
    }

    fn delete(&self, bucket: &str, key: &str) -> ObjectStoreResult<()> {
        self.inner.delete(bucket, key)
    }

    fn list(&self, bucket: &str, marker: Option<&str>) -> ObjectStoreResult<(Vec<String>, Option<String>)> {
        self.inner.list(bucket, marker)
    }

    fn create_bucket(&self, bucket: &str, acl: BucketAcl) -> ObjectStoreResult<()> {
        self.inner.create_bucket(bucket, acl)
    }

    fn delete_bucket(&self, bucket: &str) -> ObjectStoreResult<()> {
        self.inner.delete_bucket(bucket)
    }
}

/// Testable Property 3: a reader that opens/reads a path evicted out from
/// under it observes the write-back scheduler's upload rather than a
/// not-found error, by waiting on the pending-upload index.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_after_eviction_waits_for_upload_and_serves_from_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryObjectStore::with_bucket("bucket"));
    let wbs = WriteBackScheduler::spawn(store.clone());
    let catalog = CacheCatalog::open(dir.path(), 256, 4, 1 << 20, wbs).unwrap();
    let config = test_config();
    let cfs = cachefs::Cfs::new(catalog, store.clone(), &config);

    // 8 * 64 bytes against a 256-byte budget forces admission-time eviction
    // partway through, each evicted sst enqueued for upload in the background.
    for i in 0..8 {
        let name = format!("bucket/{i}.sst");
        let mut file = cfs.create(&name).unwrap();
        file.write(&vec![b'x'; 64]).unwrap();
    }

    for i in 0..8 {
        let name = format!("bucket/{i}.sst");
        let mut file = cfs.open(&name).expect("open should wait out any pending upload");
        let mut buf = vec![0u8; 64];
        let (n, _eof) = file.read(&mut buf).expect("read should wait out any pending upload");
        assert_eq!(n, 64, "short read for {name}");
        assert_eq!(buf, vec![b'x'; 64], "content mismatch for {name}");
    }
}

/// Testable Property 4: re-enqueuing the same logical path while an earlier
/// upload for it is still in flight aborts the stale upload instead of
/// letting two uploads race to completion.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_most_one_upload_in_flight_per_path() {
    let dir = tempfile::tempdir().unwrap();
    let path_a = dir.path().join("a");
    let path_b = dir.path().join("b");
    std::fs::write(&path_a, b"stale").unwrap();
    std::fs::write(&path_b, b"fresh-content").unwrap();

    let inner_store = Arc::new(InMemoryObjectStore::with_bucket("bucket"));
    let store = Arc::new(DelayedStore {
        inner: inner_store.clone(),
        delay: Duration::from_millis(150),
    });
    let wbs = WriteBackScheduler::spawn(store);

    let logical = LogicalPath::new("bucket/obj.sst").unwrap();
    wbs.enqueue(path_a, logical.clone(), 5);
    wbs.enqueue(path_b, logical.clone(), 13);

    wbs.stop().await;

    assert_eq!(inner_store.object_count(), 1);
    assert_eq!(
        inner_store.get("bucket", "obj.sst", None).unwrap(),
        b"fresh-content".to_vec(),
        "the second enqueue should win; the first upload must have been aborted"
    );
}

/// A write that lands on a remote-only file materializes the existing
/// object locally before appending, rather than silently truncating it.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn write_to_remote_only_file_preserves_existing_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryObjectStore::with_bucket("bucket"));
    store.put("bucket", "preexisting.sst", b"already-there:".to_vec()).unwrap();

    let wbs = WriteBackScheduler::spawn(store.clone());
    let catalog = CacheCatalog::open(dir.path(), 1 << 20, 1024, 1 << 20, wbs).unwrap();
    let config = test_config();
    let cfs = cachefs::Cfs::new(catalog, store.clone(), &config);

    let mut file = cfs.open("bucket/preexisting.sst").unwrap();
    file.write(b"appended").unwrap();

    let mut buf = vec![0u8; 22];
    let (n, _) = file.read_at(&mut buf, 0).unwrap();
    assert_eq!(n, 22);
    assert_eq!(&buf, b"already-there:appended");
}
