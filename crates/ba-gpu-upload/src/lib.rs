//! A second worker thread dedicated to GPU resource uploads (spec §4.6),
//! decoupled from [`ba_resource::ResourceManager`]'s CPU-side loader pool
//! so an image decode finishing doesn't have to queue behind (or block on)
//! a texture upload, and vice versa. Operates on plain pixel buffers and
//! atomic slots; has no notion of what an "image" is — that lives in
//! `ba-image`, which owns an [`UploadSlot`] per texture and drives this
//! crate's [`GpuUploader`] from its `ResourceBody` hooks.

mod device;
mod slot;
mod uploader;

pub use device::{FilterMode, GpuDevice, NullGpuDevice, TextureHandle, WrapMode};
pub use slot::{UploadSlot, UploadState};
pub use uploader::{wait_for_upload, FinalizeOutcome, GpuUploader, UploadKind, UploadRequest};
