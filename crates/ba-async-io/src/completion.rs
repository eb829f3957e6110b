/// A finished I/O operation, queued by a worker task and drained by
/// [`crate::AsyncIoEngine::update`] on whichever thread calls it (normally
/// the main/render thread, mirroring the original engine's per-frame
/// `update()` pump).
pub(crate) enum Completion {
    Read {
        path: String,
        data: Vec<u8>,
        callback: Box<dyn FnOnce(Vec<u8>) + Send>,
    },
    Write {
        path: String,
        success: bool,
        callback: Option<Box<dyn FnOnce(bool) + Send>>,
    },
}

impl Completion {
    pub(crate) fn path(&self) -> &str {
        match self {
            Completion::Read { path, .. } | Completion::Write { path, .. } => path,
        }
    }

    pub(crate) fn invoke(self) {
        match self {
            Completion::Read { data, callback, .. } => callback(data),
            Completion::Write {
                success, callback, ..
            } => {
                if let Some(callback) = callback {
                    callback(success);
                }
            }
        }
    }
}
