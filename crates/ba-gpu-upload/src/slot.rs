use std::sync::atomic::{AtomicU64, Ordering};

use crate::device::FenceHandle;

const NOT_QUEUED: u64 = 0;
const PENDING: u64 = 1;
/// Real fence handles are stored offset by this much so `0`/`1` stay
/// reserved for the two sentinel states.
const HANDLE_OFFSET: u64 = 2;

/// An image's upload state, named and modeled after the design note in
/// spec §9: the original engine stores a fixed dummy pointer as a "pending"
/// sentinel in an atomic pointer slot; here the three states are an atomic
/// tagged integer instead; `Ready` needing no tag bit since it's simply
/// "neither of the two reserved small values."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    /// No upload has ever been queued for this slot.
    NotQueued,
    /// An upload was queued but the GPU thread hasn't produced a fence yet
    /// (spec GLOSSARY: pending sentinel).
    Pending,
    /// The GPU thread produced a real fence; the upload transfer has been
    /// submitted to the GPU stream (not necessarily complete on the GPU).
    Ready(FenceHandle),
}

/// Atomic slot an [`crate::Image`]-like owner exposes to the uploader
/// thread (spec §4.6). One slot per image's fence; texture handles live in
/// a separate plain `AtomicU64` since they have no "pending" state of their
/// own — they're either 0 (no texture yet) or a real handle.
#[derive(Default)]
pub struct UploadSlot(AtomicU64);

impl UploadSlot {
    pub fn new() -> Self {
        Self(AtomicU64::new(NOT_QUEUED))
    }

    pub fn state(&self) -> UploadState {
        match self.0.load(Ordering::Acquire) {
            NOT_QUEUED => UploadState::NotQueued,
            PENDING => UploadState::Pending,
            tagged => UploadState::Ready(tagged - HANDLE_OFFSET),
        }
    }

    /// CAS `NotQueued -> Pending` (spec §4.6 step 1: "if the sentinel is
    /// already present, the image was already queued"). Returns `true` if
    /// this call won the race and should go on to submit a request.
    pub fn try_mark_pending(&self) -> bool {
        self.0
            .compare_exchange(NOT_QUEUED, PENDING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn set_ready(&self, fence: FenceHandle) {
        self.0.store(fence + HANDLE_OFFSET, Ordering::Release);
    }

    /// Resets to `NotQueued`: called by the main thread after a finalize
    /// wait, or by the uploader itself when dropping a request (cancelled,
    /// or drained at shutdown).
    pub fn clear(&self) {
        self.0.store(NOT_QUEUED, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_queued_and_transitions_through_pending_to_ready() {
        let slot = UploadSlot::new();
        assert_eq!(slot.state(), UploadState::NotQueued);

        assert!(slot.try_mark_pending());
        assert_eq!(slot.state(), UploadState::Pending);

        // a second submitter sees it's already queued
        assert!(!slot.try_mark_pending());

        slot.set_ready(77);
        assert_eq!(slot.state(), UploadState::Ready(77));

        slot.clear();
        assert_eq!(slot.state(), UploadState::NotQueued);
    }
}
