//! Decodes PNG/JPEG (and other `image`-crate-supported formats) into RGBA8
//! buffers and drives the two-phase [`ba_resource::ResourceBody`] lifecycle
//! for textures, handing finished buffers to [`ba_gpu_upload::GpuUploader`]
//! (spec §4.5/§4.6).

mod buffer;
mod errors;
mod image;

pub use buffer::PixelBuffer;
pub use errors::ImageError;
pub use image::{GpuContext, Image, MAX_DIMENSION};
