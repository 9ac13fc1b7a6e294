//! Comparing a render pass against the golden key set.

mod report;

pub use report::{CaseOutcome, CaseResult, VerificationReport};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::thread;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::diff::{DiffOutcome, diff_images};
use crate::layout::{DIFF_FILE, IMAGE_FILE, child_dirs};
use crate::render::{Manifest, RenderError};
use crate::types::{CaseKey, PulledOutput};

/// Result type for verification
pub type VerifyResult<T> = Result<T, VerifyError>;

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("unable to load manifest: {0}")]
    Manifest(#[from] RenderError),

    #[error("report serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One case to verify, golden and candidate matched by identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyCase {
    pub key: CaseKey,
    /// `<key root>/<class>/<method>/<testKey>`, when captured
    pub golden_dir: Option<PathBuf>,
    /// The rendered output, when the device reported this case
    pub candidate: Option<PulledOutput>,
}

/// Every case known to either the key set or the manifest, sorted by identity.
///
/// When the manifest holds several records for one identity, a record that
/// did not render OK wins.
pub fn collect_cases(key_root: &Path, manifest: &Manifest) -> VerifyResult<Vec<VerifyCase>> {
    let mut cases: BTreeMap<CaseKey, VerifyCase> = BTreeMap::new();

    for golden_dir in golden_dirs(key_root)? {
        let key = match key_from_dir(key_root, &golden_dir) {
            Some(key) => key,
            None => continue,
        };
        cases.insert(
            key.clone(),
            VerifyCase {
                key,
                golden_dir: Some(golden_dir),
                candidate: None,
            },
        );
    }

    for pulled in &manifest.outputs {
        let key = pulled.output.case_key();
        let case = cases.entry(key.clone()).or_insert_with(|| VerifyCase {
            key,
            golden_dir: None,
            candidate: None,
        });
        let keep_existing = case
            .candidate
            .as_ref()
            .is_some_and(|existing| !existing.output.status.is_ok());
        if !keep_existing {
            case.candidate = Some(pulled.clone());
        }
    }

    Ok(cases.into_values().collect())
}

/// Diff every case of `manifest` against `key_root` on up to `jobs` threads.
///
/// `diff.png` lands next to each compared candidate image.
pub fn verify(manifest: &Manifest, key_root: &Path, jobs: usize) -> VerifyResult<VerificationReport> {
    let cases = collect_cases(key_root, manifest)?;
    info!(
        "verifying {} cases from {} against {}",
        cases.len(),
        manifest.device,
        key_root.display()
    );

    let results = run_parallel(&cases, jobs.max(1));
    for result in &results {
        match &result.outcome {
            CaseOutcome::Passed => debug!("{} passed", result.name),
            outcome => warn!("{}: {:?}", result.name, outcome),
        }
    }

    Ok(VerificationReport {
        generated_at: Utc::now(),
        host: host_name(),
        device: manifest.device.clone(),
        key_root: key_root.to_path_buf(),
        cases: results,
    })
}

fn run_parallel(cases: &[VerifyCase], jobs: usize) -> Vec<CaseResult> {
    if cases.is_empty() {
        return Vec::new();
    }
    let chunk_size = cases.len().div_ceil(jobs);

    thread::scope(|scope| {
        let handles: Vec<_> = cases
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move || chunk.iter().map(verify_case).collect::<Vec<_>>()))
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect()
    })
}

/// Decide a single case, diffing when both images are available
pub fn verify_case(case: &VerifyCase) -> CaseResult {
    let golden = case.golden_dir.as_ref().map(|dir| dir.join(IMAGE_FILE));
    let candidate_dir = case.candidate.as_ref().map(PulledOutput::case_dir);
    let candidate = candidate_dir.as_ref().map(|dir| dir.join(IMAGE_FILE));

    let mut result = CaseResult {
        name: case.key.display_name(),
        key: case.key.clone(),
        outcome: CaseOutcome::Passed,
        golden: golden.clone().filter(|path| path.is_file()),
        candidate: candidate.clone().filter(|path| path.is_file()),
        diff: None,
    };

    if let Some(pulled) = &case.candidate {
        if !pulled.output.status.is_ok() {
            result.outcome = CaseOutcome::Skipped {
                status: pulled.output.status,
            };
            return result;
        }
    }

    let (Some(golden), Some(candidate), Some(candidate_dir)) = (golden, candidate, candidate_dir)
    else {
        result.outcome = CaseOutcome::Incomplete {
            golden_missing: case.golden_dir.is_none(),
            candidate_missing: case.candidate.is_none(),
        };
        return result;
    };

    let diff_path = candidate_dir.join(DIFF_FILE);
    result.outcome = match diff_images(&golden, &candidate, &diff_path) {
        Ok(DiffOutcome::Compared(report)) => {
            result.diff = Some(diff_path);
            if report.is_match() {
                CaseOutcome::Passed
            } else {
                CaseOutcome::Failed {
                    mismatched: report.mismatched,
                    total: report.total,
                    percent: report.percent(),
                }
            }
        }
        Ok(DiffOutcome::Missing {
            golden_missing,
            candidate_missing,
        }) => CaseOutcome::Incomplete {
            golden_missing,
            candidate_missing,
        },
        Err(e) => CaseOutcome::Errored {
            message: e.to_string(),
        },
    };
    result
}

/// `<root>/<class>/<method>/<testKey>` directories
fn golden_dirs(key_root: &Path) -> VerifyResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for class_dir in child_dirs(key_root)? {
        for method_dir in child_dirs(&class_dir)? {
            dirs.extend(child_dirs(&method_dir)?);
        }
    }
    Ok(dirs)
}

fn key_from_dir(key_root: &Path, dir: &Path) -> Option<CaseKey> {
    let relative = dir.strip_prefix(key_root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    match parts.as_slice() {
        [class, method, test_key] => Some(CaseKey::new(class, method, test_key)),
        _ => None,
    }
}

fn host_name() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}
