use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to read image file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} has unsupported or corrupt image data: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("{path} is {width}x{height}, exceeding the {max} pixel dimension cap")]
    TooLarge {
        path: String,
        width: u32,
        height: u32,
        max: u32,
    },

    #[error("pixel ({x}, {y}) is out of bounds for a {width}x{height} image")]
    OutOfBounds { x: u32, y: u32, width: u32, height: u32 },
}
