use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::state::{CancellationToken, ResourceFlags};
use crate::ResourceKey;

/// The four hooks every asset type implements (spec §4.4). The hook set is
/// closed (spec §9): rather than open dynamic dispatch on a class
/// hierarchy, new asset kinds are new implementors of this one trait, type
/// erased by [`crate::ResourceManager`] via [`ErasedResource`].
pub trait ResourceBody: Send + 'static {
    /// Runs on a loader worker. Must poll `cancel` at coarse points (before
    /// allocating, before/after costly decode steps) and return `false`
    /// promptly if cancelled, without logging (spec §7: interrupted is not
    /// an error). Returns whether a valid CPU-side artifact was produced.
    fn init_async(&mut self, cancel: &CancellationToken) -> bool;

    /// Runs on the main thread once `async_ready` is observed. Finalizes
    /// the artifact (e.g. GPU upload). Returns whether finalize succeeded.
    fn init(&mut self) -> bool;

    /// Runs on release. Must be idempotent and must wait for any in-flight
    /// GPU upload before freeing GPU handles (spec §4.4, §4.6).
    fn destroy(&mut self);
}

/// Type-erased form of [`ResourceBody`], implemented once via [`Managed`]
/// and stored as `Box<dyn ErasedResource>` so the manager's slot map can
/// hold heterogeneous resource kinds (images, metadata scanners, ...) in
/// one pending/completed pipeline.
pub(crate) trait ErasedResource: Send {
    fn run_init_async(&mut self, cancel: &CancellationToken) -> bool;
    fn run_init(&mut self) -> bool;
    fn run_destroy(&mut self);
    fn as_any(&self) -> &dyn Any;
}

pub(crate) struct Managed<B: ResourceBody> {
    pub(crate) body: B,
}

impl<B: ResourceBody> Managed<B> {
    pub(crate) fn new(body: B) -> Self {
        Self { body }
    }
}

impl<B: ResourceBody> ErasedResource for Managed<B> {
    fn run_init_async(&mut self, cancel: &CancellationToken) -> bool {
        self.body.init_async(cancel)
    }

    fn run_init(&mut self) -> bool {
        self.body.init()
    }

    fn run_destroy(&mut self) {
        self.body.destroy();
    }

    fn as_any(&self) -> &dyn Any {
        &self.body
    }
}

/// A type-erased reference to a resource owned by a [`crate::ResourceManager`].
/// Cloning is cheap (an index plus a shared flag set); the manager owns the
/// actual slot (spec §9: handles are indices into the manager's slot map,
/// not raw back-pointers).
#[derive(Clone)]
pub struct HandleUntyped {
    pub(crate) key: ResourceKey,
    pub(crate) flags: Arc<ResourceFlags>,
}

impl HandleUntyped {
    pub fn ready(&self) -> bool {
        self.flags.ready()
    }

    pub fn async_ready(&self) -> bool {
        self.flags.async_ready()
    }

    pub fn is_interrupted(&self) -> bool {
        self.flags.is_interrupted()
    }

    pub fn interrupt_load(&self) {
        self.flags.interrupt();
    }
}

/// A [`HandleUntyped`] known to point at a `B`-bodied resource, enabling
/// [`crate::ResourceManager::with_body`] to downcast without callers
/// juggling `Any` themselves.
pub struct Handle<B> {
    pub(crate) inner: HandleUntyped,
    pub(crate) _pd: PhantomData<fn() -> B>,
}

impl<B> Clone for Handle<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _pd: PhantomData,
        }
    }
}

impl<B> Handle<B> {
    pub(crate) fn new(key: ResourceKey, flags: Arc<ResourceFlags>) -> Self {
        Self {
            inner: HandleUntyped { key, flags },
            _pd: PhantomData,
        }
    }

    pub fn as_untyped(&self) -> HandleUntyped {
        self.inner.clone()
    }

    pub fn ready(&self) -> bool {
        self.inner.ready()
    }

    pub fn async_ready(&self) -> bool {
        self.inner.async_ready()
    }

    pub fn interrupt_load(&self) {
        self.inner.interrupt_load();
    }
}
