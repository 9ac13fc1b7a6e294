use std::collections::HashSet;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{RenderError, RenderResult};
use crate::layout::EXTRAS_FILE;
use crate::types::{CaseKey, PulledOutput};

/// Every case one device run produced, in arrival order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub generated_at: DateTime<Utc>,
    /// Serial of the device that rendered the cases
    pub device: String,
    pub outputs: Vec<PulledOutput>,
}

impl Manifest {
    pub fn write(&self, path: &Path) -> RenderResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!("wrote manifest with {} cases to {}", self.outputs.len(), path.display());
        Ok(())
    }

    pub fn read(path: &Path) -> RenderResult<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Keys of every case whose render did not report OK
    pub fn failed_keys(&self) -> Vec<String> {
        self.outputs
            .iter()
            .filter(|pulled| !pulled.output.status.is_ok())
            .map(|pulled| pulled.output.case_key().to_string())
            .collect()
    }
}

/// Accumulates pulled outputs and tracks duplicate OK identities.
///
/// Collisions are not fatal when seen; [`ManifestBuilder::finish`] reports all
/// of them together.
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    outputs: Vec<PulledOutput>,
    seen_ok: HashSet<CaseKey>,
    collisions: Vec<String>,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pulled: PulledOutput) {
        if pulled.output.status.is_ok() {
            let key = pulled.output.case_key();
            if !self.seen_ok.insert(key.clone()) {
                warn!("{} was rendered more than once", key);
                self.collisions.push(key.to_string());
            }
        }
        self.outputs.push(pulled);
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Close the manifest, failing if any OK identity repeated
    pub fn finish(self, device: impl Into<String>) -> RenderResult<Manifest> {
        if !self.collisions.is_empty() {
            return Err(RenderError::AmbiguousIdentity(self.collisions));
        }
        Ok(Manifest {
            generated_at: Utc::now(),
            device: device.into(),
            outputs: self.outputs,
        })
    }
}

/// Write the case's extras next to its image.
///
/// Only OK renders that actually produced output get a sidecar; anything else
/// would leave a case directory with no image behind.
pub fn write_extras(pulled: &PulledOutput) -> RenderResult<()> {
    if !pulled.output.status.is_ok() || pulled.output.remote_output_dir.is_none() {
        return Ok(());
    }
    let dir = pulled.case_dir();
    fs::create_dir_all(&dir)?;
    let path = dir.join(EXTRAS_FILE);
    debug!("writing extras file {}", path.display());
    fs::write(&path, serde_json::to_string(&pulled.output.extras)?)?;
    Ok(())
}
