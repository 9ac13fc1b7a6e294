//! Recording a render pass as the new golden key set.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::layout::{IMAGE_FILE, copy_dir_all, reset_dir};
use crate::render::Manifest;

/// Result type for key capture
pub type CaptureResult<T> = Result<T, CaptureError>;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Refusing to record a golden set from a run with failed renders
    #[error("cannot capture keys, renders failed: {}", .0.join(", "))]
    FailedRenders(Vec<String>),

    #[error("rendered output for {case} is missing at {path}")]
    MissingArtifact { case: String, path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Replace the contents of `key_root` with the artifacts listed in `manifest`.
///
/// Every case must have rendered OK and have its image on disk; otherwise
/// nothing is touched. Returns the
/// number of files copied.
pub fn capture_test_keys(manifest: &Manifest, key_root: &Path) -> CaptureResult<u64> {
    let failed = manifest.failed_keys();
    if !failed.is_empty() {
        return Err(CaptureError::FailedRenders(failed));
    }

    // Verify every image is present before the old keys are wiped
    for pulled in &manifest.outputs {
        let image = pulled.case_dir().join(IMAGE_FILE);
        if !image.is_file() {
            return Err(CaptureError::MissingArtifact {
                case: pulled.output.case_key().to_string(),
                path: image,
            });
        }
    }

    reset_dir(key_root)?;
    let mut copied = 0;
    for pulled in &manifest.outputs {
        let target = key_root.join(pulled.output.case_key().sub_dir());
        debug!("capturing {} into {}", pulled.case_dir().display(), target.display());
        copied += copy_dir_all(&pulled.case_dir(), &target)?;
    }

    info!(
        "captured {} cases ({} files) into {}",
        manifest.outputs.len(),
        copied,
        key_root.display()
    );
    Ok(copied)
}
