//! Render pass: run the instrumentation on a device, pull what it produced
//! and record it in a manifest.

mod manifest;
mod orchestrator;

pub use manifest::{Manifest, ManifestBuilder, write_extras};
pub use orchestrator::{DeviceRun, RenderOptions, RenderRun, render_on_device, render_on_devices};

use std::path::PathBuf;

use crate::device::ChannelError;

/// Result type for render operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Error types for a render pass
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("unable to prepare output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("device command failed: {0}")]
    Channel(#[from] ChannelError),

    /// Pulling or deleting a case's artifacts failed
    #[error("transferring artifacts of {case} failed: {source}")]
    Transfer {
        case: String,
        #[source]
        source: ChannelError,
    },

    /// The instrumentation stream ended before the process reported its exit code
    #[error("instrumentation on {device} ended without reporting completion")]
    Incomplete { device: String },

    /// The instrumentation process exited abnormally, typically a crash of the app under test
    #[error(
        "instrumentation on {device} exited abnormally (code {}): {}",
        .code.map_or_else(|| "unknown".to_string(), |code| code.to_string()),
        .message.as_deref().unwrap_or("no crash message")
    )]
    Crashed {
        device: String,
        code: Option<i32>,
        message: Option<String>,
    },

    #[error("ambiguous test identities: {}", .0.join(", "))]
    AmbiguousIdentity(Vec<String>),

    #[error("manifest serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
