use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt as _;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::completion::Completion;

/// Read requests above this size are refused outright (spec §4.3).
const MAX_READ_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Default bound for [`AsyncIoEngine::cleanup`] when callers don't need a
/// tighter deadline.
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Queue-driven asynchronous file reader/writer (spec §4.3). A path may
/// have at most one operation in flight at a time; a second `read`/`write`
/// against a busy path is rejected immediately rather than queued (spec
/// §4.3 single-flight invariant). Completions are handed back to the
/// caller only when [`AsyncIoEngine::update`] is called, keeping
/// callbacks off the worker tasks and on whichever thread owns the
/// engine.
pub struct AsyncIoEngine {
    runtime: Handle,
    active: Arc<Mutex<HashSet<String>>>,
    completions_tx: crossbeam_channel::Sender<Completion>,
    completions_rx: crossbeam_channel::Receiver<Completion>,
    /// Incremented around every callback invocation so `cleanup` can wait
    /// for callbacks that themselves queue further operations (spec §4.3).
    running_callbacks: Arc<AtomicUsize>,
}

impl AsyncIoEngine {
    /// Binds the engine to the ambient tokio runtime. Panics if called
    /// outside of one, the same way spawning any tokio task would.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    pub fn with_handle(runtime: Handle) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            runtime,
            active: Arc::new(Mutex::new(HashSet::new())),
            completions_tx: tx,
            completions_rx: rx,
            running_callbacks: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of operations currently in flight.
    pub fn pending_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Reads the whole file at `path` asynchronously. `callback` receives
    /// the file's bytes (empty on failure) once [`Self::update`] drains
    /// the completion. Returns `false` without touching the path if an
    /// operation against it is already in flight.
    pub fn read(
        &self,
        path: impl Into<String>,
        callback: impl FnOnce(Vec<u8>) + Send + 'static,
    ) -> bool {
        let path = path.into();

        {
            let mut active = self.active.lock();
            if active.contains(&path) {
                callback(Vec::new());
                return false;
            }
            active.insert(path.clone());
        }

        let active = Arc::clone(&self.active);
        let tx = self.completions_tx.clone();
        let task_path = path.clone();

        self.runtime.spawn(async move {
            let data = match read_with_bounds(&task_path).await {
                Ok(data) => data,
                Err(ReadRejected::NotFound(e)) => {
                    debug!(path = %task_path, error = %e, "async read failed, file likely optional");
                    Vec::new()
                }
                Err(ReadRejected::Other(e)) => {
                    debug!(path = %task_path, error = %e, "async read failed");
                    Vec::new()
                }
                Err(ReadRejected::TooLarge(size)) => {
                    warn!(path = %task_path, size, "refusing to read file larger than 2 GiB");
                    Vec::new()
                }
                Err(ReadRejected::Empty) => {
                    warn!(path = %task_path, "refusing to read zero-byte file");
                    Vec::new()
                }
            };

            active.lock().remove(&task_path);
            let _ = tx.send(Completion::Read {
                path: task_path,
                data,
                callback: Box::new(callback),
            });
        });

        true
    }

    /// Writes `data` to `path` asynchronously: open, write, then `fsync`
    /// before reporting success, matching the original engine's
    /// flush-on-close semantics. `callback` (optional) receives whether the
    /// full write-and-sync succeeded.
    pub fn write(
        &self,
        path: impl Into<String>,
        data: Vec<u8>,
        callback: Option<Box<dyn FnOnce(bool) + Send>>,
    ) -> bool {
        let path = path.into();

        {
            let mut active = self.active.lock();
            if active.contains(&path) {
                if let Some(callback) = callback {
                    callback(false);
                }
                return false;
            }
            active.insert(path.clone());
        }

        let active = Arc::clone(&self.active);
        let tx = self.completions_tx.clone();
        let task_path = path.clone();

        self.runtime.spawn(async move {
            let requested_len = data.len();
            let success = async {
                let mut file = tokio::fs::File::create(&task_path).await?;
                file.write_all(&data).await?;
                file.sync_all().await
            }
            .await
            .map_err(|e| {
                debug!(path = %task_path, error = %e, "async write failed");
            })
            .is_ok();

            // A write that was asked to transfer bytes but produced an
            // empty file is treated as a failed transfer, not a success.
            let success = success && !(requested_len > 0 && tokio::fs::metadata(&task_path).await.map(|m| m.len()).unwrap_or(0) == 0);

            active.lock().remove(&task_path);
            let _ = tx.send(Completion::Write {
                path: task_path,
                success,
                callback,
            });
        });

        true
    }

    pub fn write_string(
        &self,
        path: impl Into<String>,
        data: String,
        callback: Option<Box<dyn FnOnce(bool) + Send>>,
    ) -> bool {
        self.write(path, data.into_bytes(), callback)
    }

    /// Drains every completion queued so far and invokes its callback on
    /// the calling thread. Must be called regularly (spec §4.3: once per
    /// frame) or completions accumulate unbounded in the channel.
    pub fn update(&self) {
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.running_callbacks.fetch_add(1, Ordering::SeqCst);
            completion.invoke();
            self.running_callbacks.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Blocks the calling thread, draining completions as they arrive,
    /// until every in-flight operation and every running callback has
    /// quiesced, or `timeout` elapses. A callback may itself queue further
    /// operations on this engine, so both counters are checked on every
    /// iteration (spec §4.3). Operations still outstanding past the
    /// deadline are abandoned: their eventual completions are drained and
    /// discarded without invoking a callback held past shutdown.
    pub fn cleanup(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;

        loop {
            self.update();
            if self.pending_count() == 0 && self.running_callbacks.load(Ordering::SeqCst) == 0 {
                return;
            }
            if Instant::now() >= deadline {
                warn!(
                    pending = self.pending_count(),
                    "async I/O cleanup timed out with operations still in flight"
                );
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

enum ReadRejected {
    NotFound(std::io::Error),
    Other(std::io::Error),
    TooLarge(u64),
    Empty,
}

async fn read_with_bounds(path: &str) -> Result<Vec<u8>, ReadRejected> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ReadRejected::NotFound(e)
        } else {
            ReadRejected::Other(e)
        }
    })?;

    let size = metadata.len();
    if size == 0 {
        return Err(ReadRejected::Empty);
    }
    if size > MAX_READ_SIZE {
        return Err(ReadRejected::TooLarge(size));
    }

    tokio::fs::read(path).await.map_err(ReadRejected::Other)
}

impl Default for AsyncIoEngine {
    fn default() -> Self {
        Self::new()
    }
}
