//! Types for verification results.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::VerifyResult;
use crate::types::{CaseKey, InstrumentationStatus};

/// How one case fared against its golden image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CaseOutcome {
    Passed,

    /// Pixels differ; `diff.png` shows where
    Failed {
        mismatched: u64,
        total: u64,
        percent: String,
    },

    /// The device did not render this case successfully
    Skipped { status: InstrumentationStatus },

    /// One side has no image to compare
    Incomplete {
        golden_missing: bool,
        candidate_missing: bool,
    },

    /// An image could not be read or the diff could not be written
    Errored { message: String },
}

impl CaseOutcome {
    /// Outcomes that fail a verification run
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CaseOutcome::Failed { .. } | CaseOutcome::Skipped { .. } | CaseOutcome::Errored { .. }
        )
    }
}

/// Result of verifying a single case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseResult {
    /// `class/method[/testKey]`
    pub name: String,

    pub key: CaseKey,

    pub outcome: CaseOutcome,

    /// Golden image, when one exists
    pub golden: Option<PathBuf>,

    /// Candidate image, when one exists
    pub candidate: Option<PathBuf>,

    /// Written only when both images were compared
    pub diff: Option<PathBuf>,
}

/// Result of a complete verification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub generated_at: DateTime<Utc>,

    /// Machine the comparison ran on
    pub host: String,

    /// Device the candidates were rendered on
    pub device: String,

    pub key_root: PathBuf,

    pub cases: Vec<CaseResult>,
}

impl VerificationReport {
    /// No case failed, was skipped or errored. Incomplete cases are reported but tolerated.
    pub fn is_success(&self) -> bool {
        !self.cases.iter().any(|case| case.outcome.is_failure())
    }

    pub fn passed(&self) -> usize {
        self.count(|outcome| matches!(outcome, CaseOutcome::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, CaseOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, CaseOutcome::Skipped { .. }))
    }

    pub fn incomplete(&self) -> usize {
        self.count(|outcome| matches!(outcome, CaseOutcome::Incomplete { .. }))
    }

    pub fn errored(&self) -> usize {
        self.count(|outcome| matches!(outcome, CaseOutcome::Errored { .. }))
    }

    fn count(&self, pred: impl Fn(&CaseOutcome) -> bool) -> usize {
        self.cases.iter().filter(|case| pred(&case.outcome)).count()
    }

    /// One line per counter, e.g. for the CLI summary
    pub fn summary(&self) -> String {
        format!(
            "{} passed, {} failed, {} skipped, {} incomplete, {} errored",
            self.passed(),
            self.failed(),
            self.skipped(),
            self.incomplete(),
            self.errored()
        )
    }

    pub fn write(&self, path: &Path) -> VerifyResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
