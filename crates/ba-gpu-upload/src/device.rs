/// Texture filtering mode, passed through to whatever graphics backend
/// implements [`GpuDevice`]. Named the way the original `OpenGLImage`'s
/// filter/wrap setters are, minus the GL-specific enum values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    Clamp,
    Repeat,
}

/// Opaque handle to a GPU texture object. The graphics backend (spec §1:
/// treated as an opaque collaborator, not part of this core) owns what
/// this number actually indexes.
pub type TextureHandle = u64;

/// Opaque handle to a GPU fence/sync object (spec GLOSSARY).
pub type FenceHandle = u64;

/// The surface this crate needs from a real graphics backend. `Graphics`
/// itself is out of scope (spec §1); this trait is the contract the GPU
/// uploader thread drives, small enough that a test or headless build can
/// satisfy it without a window or driver.
pub trait GpuDevice: Send + Sync {
    /// Allocates a new texture of `width x height`, uploads `rgba8`, sets
    /// filter/wrap modes, generates mipmaps if requested, and returns a
    /// fence marking when the transfer completes.
    fn create_and_upload(
        &self,
        width: u32,
        height: u32,
        rgba8: &[u8],
        mipmapped: bool,
        filter: FilterMode,
        wrap: WrapMode,
    ) -> (TextureHandle, FenceHandle);

    /// Re-uploads into an existing texture (spec §4.6 `ReuploadImage`).
    fn reupload(
        &self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        rgba8: &[u8],
        mipmapped: bool,
    ) -> FenceHandle;

    /// Blocks the calling thread until `fence` is signaled. Per spec §5
    /// this is expected to resolve in microseconds since the upload is
    /// already in flight by the time anything waits on it.
    fn client_wait(&self, fence: FenceHandle);

    fn delete_fence(&self, fence: FenceHandle);

    fn delete_texture(&self, texture: TextureHandle);
}

/// An in-memory stand-in for a real graphics backend: "uploads" just copy
/// bytes and fences are satisfied the instant they're created. Used by
/// tests and by any headless build where no window/driver exists, matching
/// how spec §4.6's fallback path treats an unavailable uploader as
/// "perform the upload synchronously" rather than a hard error.
#[derive(Default)]
pub struct NullGpuDevice {
    next_handle: std::sync::atomic::AtomicU64,
}

impl NullGpuDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> u64 {
        self.next_handle
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1
    }
}

impl GpuDevice for NullGpuDevice {
    fn create_and_upload(
        &self,
        _width: u32,
        _height: u32,
        _rgba8: &[u8],
        _mipmapped: bool,
        _filter: FilterMode,
        _wrap: WrapMode,
    ) -> (TextureHandle, FenceHandle) {
        (self.next(), self.next())
    }

    fn reupload(
        &self,
        _texture: TextureHandle,
        _width: u32,
        _height: u32,
        _rgba8: &[u8],
        _mipmapped: bool,
    ) -> FenceHandle {
        self.next()
    }

    fn client_wait(&self, _fence: FenceHandle) {}

    fn delete_fence(&self, _fence: FenceHandle) {}

    fn delete_texture(&self, _texture: TextureHandle) {}
}
