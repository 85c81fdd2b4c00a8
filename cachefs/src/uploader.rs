use std::path::PathBuf;

use crate::path::LogicalPath;

/// Statically-typed replacement for the source's `usr any` + callback
/// pattern: the cache is parameterized over an `Uploader` capability
/// instead of an opaque context and a function pointer.
pub trait Uploader: Send + Sync + 'static {
    /// A dirty entry is being evicted or closed; its contents must be
    /// uploaded. Implementations should install a pending-upload record
    /// before returning, so that a concurrent reader never observes a
    /// window where the entry is neither in the cache nor tracked as
    /// in-flight.
    fn enqueue(&self, disk_path: PathBuf, logical_path: LogicalPath, size: u64);

    /// A catalog entry was removed directly (not via eviction). If no
    /// upload for this path is in flight, an SST backing file left behind
    /// by a prior eviction race should be cleaned up.
    fn notify_removed(&self, disk_path: PathBuf, logical_path: LogicalPath);

    /// The size submitted for upload if `path` currently has one in flight,
    /// consulted by the VFS adapter when a path has fallen out of the
    /// catalog but may still be mid-upload. Uploaders with no pending-upload
    /// index of their own (test doubles) can leave this as "never pending".
    fn pending_upload_size(&self, _path: &LogicalPath) -> Option<u64> {
        None
    }
}

#[cfg(any(test, feature = "test"))]
pub mod test {
    use super::*;
    use std::sync::Mutex;

    /// Records every call instead of actually uploading anything, for tests
    /// that only care about the catalog's own bookkeeping.
    #[derive(Default)]
    pub struct RecordingUploader {
        pub enqueued: Mutex<Vec<(PathBuf, LogicalPath, u64)>>,
        pub removed: Mutex<Vec<(PathBuf, LogicalPath)>>,
    }

    impl RecordingUploader {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Uploader for RecordingUploader {
        fn enqueue(&self, disk_path: PathBuf, logical_path: LogicalPath, size: u64) {
            self.enqueued
                .lock()
                .unwrap()
                .push((disk_path, logical_path, size));
        }

        fn notify_removed(&self, disk_path: PathBuf, logical_path: LogicalPath) {
            self.removed.lock().unwrap().push((disk_path, logical_path));
        }
    }
}
