use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::debug;

use crate::device::{FenceHandle, FilterMode, GpuDevice, TextureHandle, WrapMode};
use crate::slot::{UploadSlot, UploadState};

/// Whether a request allocates a fresh texture or re-fills an existing one
/// (spec §4.6 `UploadImage` / `ReuploadImage`).
pub enum UploadKind {
    New,
    Reupload(TextureHandle),
}

/// A queued upload (spec §4.6). `texture_slot`/`fence_slot` are the atomic
/// pointers owned by the requesting image; `is_interrupted` is a thin
/// closure over that image's cancellation token so this crate doesn't need
/// to depend on `ba-resource` just to check one flag.
pub struct UploadRequest {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub mipmapped: bool,
    pub filter: FilterMode,
    pub wrap: WrapMode,
    pub kind: UploadKind,
    pub texture_slot: Arc<AtomicU64>,
    pub fence_slot: Arc<UploadSlot>,
    pub is_interrupted: Box<dyn Fn() -> bool + Send + Sync>,
}

enum Message {
    Upload(UploadRequest),
    Shutdown,
}

/// Dedicated thread owning a secondary GPU context (spec §4.6). Consumes
/// upload requests FIFO and writes texture/fence handles back into the
/// requesting image's atomic slots.
pub struct GpuUploader {
    tx: crossbeam_channel::Sender<Message>,
    worker: Option<JoinHandle<()>>,
    shut_down: Arc<AtomicBool>,
}

impl GpuUploader {
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded::<Message>();
        let worker = std::thread::Builder::new()
            .name("ba-gpu-uploader".to_string())
            .spawn(move || run(&rx, &device))
            .expect("failed to spawn GPU uploader thread");

        Self {
            tx,
            worker: Some(worker),
            shut_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Submits `request`, first CAS-marking its fence slot pending (spec
    /// §4.6 step 1). Returns `false` without queuing anything if the slot
    /// was already pending/ready (already queued) or the uploader has
    /// already been shut down (caller should fall back to a synchronous
    /// upload in that case).
    pub fn submit(&self, request: UploadRequest) -> bool {
        if self.shut_down.load(Ordering::Acquire) {
            return false;
        }
        if !request.fence_slot.try_mark_pending() {
            return false;
        }
        if self.tx.send(Message::Upload(request)).is_err() {
            return false;
        }
        true
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Drains the queue: requests not yet picked up have their fence slot
    /// cleared back to `NotQueued` rather than processed, so callers
    /// spinning on [`crate::wait_for_upload`] observe "nothing to wait
    /// for" and fall back to a synchronous upload (spec §4.6 Shutdown).
    pub fn shutdown(&mut self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.tx.send(Message::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for GpuUploader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(rx: &crossbeam_channel::Receiver<Message>, device: &Arc<dyn GpuDevice>) {
    while let Ok(message) = rx.recv() {
        match message {
            Message::Shutdown => {
                let mut drained = 0;
                while let Ok(queued) = rx.try_recv() {
                    if let Message::Upload(request) = queued {
                        request.fence_slot.clear();
                        drained += 1;
                    }
                }
                debug!(drained, "GPU uploader shut down, drained remaining queue");
                break;
            }
            Message::Upload(request) => process(request, device),
        }
    }
}

fn process(request: UploadRequest, device: &Arc<dyn GpuDevice>) {
    if (request.is_interrupted)() {
        // spec §4.6 step 2: interrupted requests are dropped, sentinel cleared.
        request.fence_slot.clear();
        return;
    }

    let fence: FenceHandle = match request.kind {
        UploadKind::New => {
            let (texture, fence) = device.create_and_upload(
                request.width,
                request.height,
                &request.pixels,
                request.mipmapped,
                request.filter,
                request.wrap,
            );
            request.texture_slot.store(texture, Ordering::Release);
            fence
        }
        UploadKind::Reupload(texture) => device.reupload(
            texture,
            request.width,
            request.height,
            &request.pixels,
            request.mipmapped,
        ),
    };

    request.fence_slot.set_ready(fence);
}

/// Outcome of waiting for an upload to finish, for the main-thread
/// finalize path (spec §4.6 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The slot was never queued; caller should upload synchronously.
    NothingPending,
    /// Waited on a real fence and cleaned it up; caller is `ready`.
    Uploaded(FenceHandle),
}

/// Busy-spins-and-yields on `slot` until it becomes a real fence or
/// reverts to `NotQueued` (spec §4.6 step 5, including the shutdown-drain
/// case where a still-pending slot is cleared out from under the waiter).
pub fn wait_for_upload(slot: &UploadSlot, device: &dyn GpuDevice) -> FinalizeOutcome {
    loop {
        match slot.state() {
            UploadState::NotQueued => return FinalizeOutcome::NothingPending,
            UploadState::Pending => std::thread::yield_now(),
            UploadState::Ready(fence) => {
                device.client_wait(fence);
                device.delete_fence(fence);
                slot.clear();
                return FinalizeOutcome::Uploaded(fence);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::NullGpuDevice;
    use std::sync::atomic::AtomicBool as StdAtomicBool;
    use std::time::Duration;

    #[test]
    fn submit_and_wait_produces_a_texture_and_fence() {
        let device: Arc<dyn GpuDevice> = Arc::new(NullGpuDevice::new());
        let uploader = GpuUploader::new(Arc::clone(&device));

        let texture_slot = Arc::new(AtomicU64::new(0));
        let fence_slot = Arc::new(UploadSlot::new());

        let ok = uploader.submit(UploadRequest {
            pixels: vec![0u8; 4 * 4 * 4],
            width: 4,
            height: 4,
            mipmapped: false,
            filter: FilterMode::Linear,
            wrap: WrapMode::Clamp,
            kind: UploadKind::New,
            texture_slot: Arc::clone(&texture_slot),
            fence_slot: Arc::clone(&fence_slot),
            is_interrupted: Box::new(|| false),
        });
        assert!(ok);

        let outcome = wait_for_upload(&fence_slot, device.as_ref());
        assert!(matches!(outcome, FinalizeOutcome::Uploaded(_)));
        assert_ne!(texture_slot.load(Ordering::Acquire), 0);
    }

    #[test]
    fn second_submit_against_pending_slot_is_rejected() {
        let device: Arc<dyn GpuDevice> = Arc::new(NullGpuDevice::new());
        let uploader = GpuUploader::new(device);

        let fence_slot = Arc::new(UploadSlot::new());
        assert!(fence_slot.try_mark_pending());

        let ok = uploader.submit(UploadRequest {
            pixels: vec![],
            width: 1,
            height: 1,
            mipmapped: false,
            filter: FilterMode::Nearest,
            wrap: WrapMode::Repeat,
            kind: UploadKind::New,
            texture_slot: Arc::new(AtomicU64::new(0)),
            fence_slot: Arc::clone(&fence_slot),
            is_interrupted: Box::new(|| false),
        });
        assert!(!ok);
    }

    #[test]
    fn interrupted_request_clears_sentinel_without_uploading() {
        let device: Arc<dyn GpuDevice> = Arc::new(NullGpuDevice::new());
        let uploader = GpuUploader::new(device);

        let texture_slot = Arc::new(AtomicU64::new(0));
        let fence_slot = Arc::new(UploadSlot::new());
        let interrupted = Arc::new(StdAtomicBool::new(true));
        let interrupted_clone = Arc::clone(&interrupted);

        uploader.submit(UploadRequest {
            pixels: vec![],
            width: 1,
            height: 1,
            mipmapped: false,
            filter: FilterMode::Nearest,
            wrap: WrapMode::Repeat,
            kind: UploadKind::New,
            texture_slot: Arc::clone(&texture_slot),
            fence_slot: Arc::clone(&fence_slot),
            is_interrupted: Box::new(move || interrupted_clone.load(Ordering::Acquire)),
        });

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(fence_slot.state(), UploadState::NotQueued);
        assert_eq!(texture_slot.load(Ordering::Acquire), 0);
        let _ = interrupted;
    }

    #[test]
    fn shutdown_clears_pending_slots_instead_of_uploading() {
        let device: Arc<dyn GpuDevice> = Arc::new(NullGpuDevice::new());
        let mut uploader = GpuUploader::new(device);

        let fence_slot = Arc::new(UploadSlot::new());
        uploader.submit(UploadRequest {
            pixels: vec![],
            width: 1,
            height: 1,
            mipmapped: false,
            filter: FilterMode::Nearest,
            wrap: WrapMode::Repeat,
            kind: UploadKind::New,
            texture_slot: Arc::new(AtomicU64::new(0)),
            fence_slot: Arc::clone(&fence_slot),
            is_interrupted: Box::new(|| false),
        });

        uploader.shutdown();
        assert!(uploader.is_shut_down());
        // either it was processed before shutdown or cleared by the drain;
        // either way it must not be stuck in Pending.
        assert_ne!(fence_slot.state(), UploadState::Pending);
    }
}
