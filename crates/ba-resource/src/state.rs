use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The three lock-free flags every [`crate::Resource`] carries (spec §3,
/// §4.4, §9). Transitions are owned by specific threads: `async_ready` only
/// by a loader worker, `ready` only by the main thread, `interrupted` by
/// whichever thread calls [`ResourceFlags::interrupt`]. `Acquire`/`Release`
/// is sufficient here — there is no need for sequentially-consistent fences
/// since each flag has exactly one writer thread role.
#[derive(Debug, Default)]
pub struct ResourceFlags {
    ready: AtomicBool,
    async_ready: AtomicBool,
    interrupted: AtomicBool,
}

impl ResourceFlags {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn async_ready(&self) -> bool {
        self.async_ready.load(Ordering::Acquire)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    pub(crate) fn set_async_ready(&self, value: bool) {
        self.async_ready.store(value, Ordering::Release);
    }

    pub(crate) fn set_ready(&self, value: bool) {
        self.ready.store(value, Ordering::Release);
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    /// Reset before a fresh `loadAsync`, matching `Resource::loadAsync`'s
    /// `bInterrupted.store(false, ...)` at the top of every (re)load.
    pub(crate) fn reset_interrupted(&self) {
        self.interrupted.store(false, Ordering::Release);
    }
}

/// A cancellation token threaded explicitly through `init_async`, rather
/// than read directly off the resource (spec §9 design note: this composes
/// better with nested sub-tasks like the background cache's metadata
/// scanner spawning its own interruptible read loop).
#[derive(Clone)]
pub struct CancellationToken(Arc<ResourceFlags>);

impl CancellationToken {
    pub(crate) fn new(flags: Arc<ResourceFlags>) -> Self {
        Self(flags)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_interrupted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_implies_async_ready_is_caller_responsibility_but_flags_are_independent() {
        let flags = ResourceFlags::new();
        assert!(!flags.ready());
        assert!(!flags.async_ready());
        flags.set_async_ready(true);
        assert!(flags.async_ready());
        flags.set_ready(true);
        assert!(flags.ready());
    }

    #[test]
    fn interrupt_is_observed_through_a_cloned_token() {
        let flags = ResourceFlags::new();
        let token = CancellationToken::new(Arc::clone(&flags));
        assert!(!token.is_cancelled());
        flags.interrupt();
        assert!(token.is_cancelled());
    }
}
