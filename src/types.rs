// Core records produced by a render pass

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Outcome reported by the on-device instrumentation for a render event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstrumentationStatus {
    Ok,
    Failure,
    Error,
    Ignored,
    FailedAssumption,
}

impl InstrumentationStatus {
    /// Map an `INSTRUMENTATION_STATUS_CODE` value onto a test outcome.
    ///
    /// `0` and every negative terminal code carry an outcome; negative codes
    /// outside `-1..=-4` are reported as errors.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(InstrumentationStatus::Ok),
            -1 => Some(InstrumentationStatus::Error),
            -2 => Some(InstrumentationStatus::Failure),
            -3 => Some(InstrumentationStatus::Ignored),
            -4 => Some(InstrumentationStatus::FailedAssumption),
            code if code < 0 => Some(InstrumentationStatus::Error),
            _ => None,
        }
    }

    pub fn is_ok(self) -> bool {
        self == InstrumentationStatus::Ok
    }
}

impl fmt::Display for InstrumentationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstrumentationStatus::Ok => "OK",
            InstrumentationStatus::Failure => "FAILURE",
            InstrumentationStatus::Error => "ERROR",
            InstrumentationStatus::Ignored => "IGNORED",
            InstrumentationStatus::FailedAssumption => "FAILED_ASSUMPTION",
        };
        f.write_str(name)
    }
}

/// Identity of a test case within one run: `(class, method, test key)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaseKey {
    pub class_name: String,
    pub method_name: String,
    pub test_key: String,
}

impl CaseKey {
    pub fn new(
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        test_key: impl Into<String>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            test_key: test_key.into(),
        }
    }

    /// `<class>/<method>`, the directory a device pull lands in
    pub fn method_sub_dir(&self) -> PathBuf {
        PathBuf::from(&self.class_name).join(&self.method_name)
    }

    /// `<class>/<method>/<testKey>`, the directory holding `image.png`
    pub fn sub_dir(&self) -> PathBuf {
        self.method_sub_dir().join(&self.test_key)
    }

    /// Short name used in reports; the test key is omitted when it repeats the method name.
    pub fn display_name(&self) -> String {
        if self.method_name == self.test_key {
            format!("{}/{}", self.class_name, self.method_name)
        } else {
            format!("{}/{}/{}", self.class_name, self.method_name, self.test_key)
        }
    }
}

impl fmt::Display for CaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.class_name, self.method_name, self.test_key)
    }
}

/// One completed render event parsed from the instrumentation stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutput {
    /// Disambiguates several renders within one method; defaults to the method name
    pub test_key: String,

    pub method_name: String,

    pub class_name: String,

    /// JUnit parameterized display name, e.g. `render[wide]`
    pub parameterized_name: Option<String>,

    pub description: Option<String>,

    /// Author supplied annotations, in the order the device reported them
    pub extras: IndexMap<String, String>,

    /// Device-side directory holding the artifact. Absent when the render failed early.
    pub remote_output_dir: Option<PathBuf>,

    pub status: InstrumentationStatus,
}

impl TestOutput {
    pub fn case_key(&self) -> CaseKey {
        CaseKey::new(&self.class_name, &self.method_name, &self.test_key)
    }
}

/// A [`TestOutput`] whose artifacts now live on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulledOutput {
    /// `<render root>/<class>/<method>`; the pulled leaf directory sits beneath it
    pub local_dir: PathBuf,

    pub output: TestOutput,
}

impl PulledOutput {
    pub fn new(local_dir: PathBuf, output: TestOutput) -> Self {
        Self { local_dir, output }
    }

    /// Directory holding this case's `image.png` and `extras.json`
    pub fn case_dir(&self) -> PathBuf {
        self.local_dir.join(&self.output.test_key)
    }
}
