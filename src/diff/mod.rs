//! Streaming pixel comparison of golden and candidate renders.

mod engine;
mod pixel;

pub use engine::{DiffOutcome, DiffReport, diff_images, diff_streams, format_percent};
pub use pixel::{Pixel, blend};

/// Result type for diff operations
pub type DiffResult<T> = Result<T, DiffError>;

/// Error types for image comparison
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("PNG decode failed: {0}")]
    Decode(#[from] png::DecodingError),

    #[error("PNG encode failed: {0}")]
    Encode(#[from] png::EncodingError),

    #[error("unsupported image format: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
