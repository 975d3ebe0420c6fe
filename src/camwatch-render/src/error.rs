//! Render error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("frame payload is empty")]
    EmptyPayload,

    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not a decodable image: {0}")]
    Image(#[from] image::ImageError),

    #[error("surface dimensions must be non-zero (got {width}x{height})")]
    InvalidSurface { width: u32, height: u32 },
}

pub type Result<T> = std::result::Result<T, RenderError>;
