//! The write-back scheduler: a background pump that uploads evicted or
//! closed cache entries to the object store.
//!
//! The pending-upload index and the per-path abort-and-replace behavior are
//! grounded in the teacher's `infinitree-backends::InFlightTracker` and the
//! `Cache<Upstream>` backend's `in_flight: Arc<HashMap<ObjectId, JoinHandle<_>>>`
//! bookkeeping; the bounded channel + `JoinSet` pump is this crate's own,
//! generalizing the teacher's "spawn at the call site" shape into a single
//! owned background task so shutdown has one place to wait.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use scc::HashMap as ConcurrentHashMap;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::{AbortHandle, JoinSet};
use tracing::{info, warn};

use crate::config::{RETRY_BACKOFF_BASE_MS, RETRY_BACKOFF_CAP_MS};
use crate::object_store::ObjectStore;
use crate::path::LogicalPath;
use crate::uploader::Uploader;

struct Message {
    disk_path: PathBuf,
    logical_path: LogicalPath,
    size: u64,
}

/// The pending-upload index: logical path -> size of the version currently
/// being (or about to be) uploaded. Readers consult this to learn that a
/// file they can't find on disk is on its way to becoming readable from the
/// object store, and poll the object store's `head` until it shows up.
pub type PendingUploadIndex = Arc<ConcurrentHashMap<String, u64>>;

/// Uploads evicted/closed cache entries to an [`ObjectStore`] on a single
/// background task, retrying indefinitely with exponential backoff.
///
/// The hand-off channel is unbounded: `enqueue` is a synchronous
/// [`Uploader`] method that the catalog calls while holding its own lock,
/// from call sites that aren't always inside an async task (plain
/// `Vfs`/`VfsFile` calls, not just `spawn_blocking`'d ones), so it can
/// neither `await` a bounded send nor call `blocking_send` without risking
/// a panic on a runtime worker thread. An unbounded queue keeps `enqueue`
/// non-blocking while guaranteeing every dirty eviction is eventually
/// uploaded, per Invariant 3 in [`crate::vfs`]'s docs — the alternative,
/// `try_send` on a bounded channel, could silently drop an upload and
/// leave a reader waiting on a `pending_upload_size` that never resolves.
pub struct WriteBackScheduler<S> {
    tx: mpsc::UnboundedSender<Message>,
    stop_tx: AsyncMutex<Option<oneshot::Sender<oneshot::Sender<()>>>>,
    pui: PendingUploadIndex,
    _store: std::marker::PhantomData<S>,
}

impl<S: ObjectStore + 'static> WriteBackScheduler<S> {
    pub fn spawn(store: Arc<S>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let pui: PendingUploadIndex = Arc::new(ConcurrentHashMap::new());

        tokio::spawn(pump(rx, stop_rx, store, pui.clone()));

        Self {
            tx,
            stop_tx: AsyncMutex::new(Some(stop_tx)),
            pui,
            _store: std::marker::PhantomData,
        }
    }

    /// Signals the pump to drain its remaining queue and wait for every
    /// in-flight upload task before returning.
    pub async fn stop(&self) {
        let sender = self.stop_tx.lock().await.take();
        if let Some(sender) = sender {
            let (done_tx, done_rx) = oneshot::channel();
            if sender.send(done_tx).is_ok() {
                let _ = done_rx.await;
            }
        }
    }
}

impl<S: ObjectStore + 'static> Uploader for WriteBackScheduler<S> {
    fn enqueue(&self, disk_path: PathBuf, logical_path: LogicalPath, size: u64) {
        let key = logical_path.as_str().to_string();
        // Installed before dispatch so a reader never observes a window
        // where the path is neither in the catalog nor tracked as pending.
        let _ = self.pui.remove(&key);
        let _ = self.pui.insert(key, size);

        if self
            .tx
            .send(Message {
                disk_path,
                logical_path,
                size,
            })
            .is_err()
        {
            warn!("write-back scheduler pump has already stopped; upload dropped");
        }
    }

    fn notify_removed(&self, disk_path: PathBuf, logical_path: LogicalPath) {
        let key = logical_path.as_str().to_string();
        if self.pui.remove(&key).is_some() {
            return;
        }
        if logical_path.is_sst() {
            let _ = std::fs::remove_file(&disk_path);
        }
    }

    fn pending_upload_size(&self, path: &LogicalPath) -> Option<u64> {
        self.pui.read(&path.as_str().to_string(), |_, v| *v)
    }
}

struct PumpState<S> {
    tasks: JoinSet<()>,
    in_flight: Arc<ConcurrentHashMap<String, AbortHandle>>,
    pui: PendingUploadIndex,
    store: Arc<S>,
}

impl<S: ObjectStore + 'static> PumpState<S> {
    fn dispatch(&mut self, msg: Message) {
        let key = msg.logical_path.as_str().to_string();
        let store = self.store.clone();
        let pui = self.pui.clone();
        let in_flight = self.in_flight.clone();
        let logical_path = msg.logical_path;
        let disk_path = msg.disk_path;
        let size = msg.size;
        let task_key = key.clone();

        let abort_handle = self.tasks.spawn(async move {
            upload_with_retry(&store, &disk_path, &logical_path, size).await;
            pui.remove_async(&task_key).await;
            in_flight.remove_async(&task_key).await;
            if logical_path.is_sst() {
                let _ = tokio::fs::remove_file(&disk_path).await;
            }
        });

        if let Some((_, stale)) = self.in_flight.remove(&key) {
            stale.abort();
        }
        let _ = self.in_flight.insert(key, abort_handle);
    }
}

async fn pump<S: ObjectStore + 'static>(
    mut rx: mpsc::UnboundedReceiver<Message>,
    mut stop_rx: oneshot::Receiver<oneshot::Sender<()>>,
    store: Arc<S>,
    pui: PendingUploadIndex,
) {
    let mut state = PumpState {
        tasks: JoinSet::new(),
        in_flight: Arc::new(ConcurrentHashMap::new()),
        pui,
        store,
    };

    loop {
        tokio::select! {
            biased;
            reply = &mut stop_rx => {
                if let Ok(reply) = reply {
                    while let Ok(msg) = rx.try_recv() {
                        state.dispatch(msg);
                    }
                    while state.tasks.join_next().await.is_some() {}
                    let _ = reply.send(());
                }
                return;
            }
            msg = rx.recv() => {
                match msg {
                    Some(msg) => state.dispatch(msg),
                    None => break,
                }
            }
        }
    }

    while state.tasks.join_next().await.is_some() {}
}

async fn upload_with_retry<S: ObjectStore + 'static>(
    store: &Arc<S>,
    disk_path: &Path,
    logical_path: &LogicalPath,
    _size: u64,
) {
    let mut backoff_ms = RETRY_BACKOFF_BASE_MS;
    loop {
        let data = match tokio::fs::read(disk_path).await {
            Ok(data) => data,
            Err(err) => {
                warn!(path = %logical_path, %err, "upload: could not read local file, retrying");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(RETRY_BACKOFF_CAP_MS);
                continue;
            }
        };

        let bucket = logical_path.bucket().to_string();
        let key = logical_path.key().to_string();
        let store_clone = Arc::clone(store);
        let result =
            tokio::task::spawn_blocking(move || store_clone.put(&bucket, &key, data)).await;

        match result {
            Ok(Ok(())) => {
                info!(path = %logical_path, "uploaded");
                return;
            }
            Ok(Err(err)) => {
                warn!(path = %logical_path, %err, "upload failed, retrying");
            }
            Err(join_err) => {
                warn!(path = %logical_path, %join_err, "upload task panicked, retrying");
            }
        }
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        backoff_ms = (backoff_ms * 2).min(RETRY_BACKOFF_CAP_MS);
    }
}
