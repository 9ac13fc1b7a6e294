//! Configuration management with environment variable support.
//!
//! Every setting has a compiled-in default that an environment variable can
//! override; the CLI in turn overrides both per invocation.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `KONTRAST_ADB` | adb executable (legacy: `ADB`) | `adb` |
//! | `KONTRAST_OUTPUT_DIR` | Root for per-device render output | `build/kontrast` |
//! | `KONTRAST_KEY_DIR` | Root of the golden key images | `kontrast/keys` |
//! | `KONTRAST_TEST_RUNNER` | Instrumentation runner class | `androidx.test.runner.AndroidJUnitRunner` |
//! | `KONTRAST_ANNOTATION` | Annotation selecting render tests | `com.trevjonez.kontrast.KontrastTest` |
//! | `KONTRAST_INSTALL_TIMEOUT` | Bound on one package install (seconds) | `60` |
//! | `KONTRAST_LOGCAT` | Capture device logs during a render | `true` |
//! | `KONTRAST_JOBS` | Worker threads used for diffing | available cores |
//!
//! # Example
//!
//! ```bash
//! export KONTRAST_ADB="$ANDROID_HOME/platform-tools/adb"
//! export KONTRAST_OUTPUT_DIR="/var/tmp/kontrast"
//! export KONTRAST_LOGCAT=false
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

// ============================================================================
// Default Values
// ============================================================================

pub const DEFAULT_ADB: &str = "adb";

pub const DEFAULT_OUTPUT_DIR: &str = "build/kontrast";

pub const DEFAULT_KEY_DIR: &str = "kontrast/keys";

pub const DEFAULT_TEST_RUNNER: &str = "androidx.test.runner.AndroidJUnitRunner";

/// Annotation the device-side render tests carry
pub const DEFAULT_ANNOTATION: &str = "com.trevjonez.kontrast.KontrastTest";

/// Default install wait bound (seconds)
pub const DEFAULT_INSTALL_TIMEOUT: u64 = 60;

pub const DEFAULT_CAPTURE_LOGCAT: bool = true;

/// Used when the host cannot report its core count
pub const DEFAULT_JOBS: usize = 4;

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_ADB: &str = "KONTRAST_ADB";

/// Legacy adb override honoured by most Android tooling
pub const ENV_ADB_LEGACY: &str = "ADB";

pub const ENV_OUTPUT_DIR: &str = "KONTRAST_OUTPUT_DIR";

pub const ENV_KEY_DIR: &str = "KONTRAST_KEY_DIR";

pub const ENV_TEST_RUNNER: &str = "KONTRAST_TEST_RUNNER";

pub const ENV_ANNOTATION: &str = "KONTRAST_ANNOTATION";

pub const ENV_INSTALL_TIMEOUT: &str = "KONTRAST_INSTALL_TIMEOUT";

pub const ENV_LOGCAT: &str = "KONTRAST_LOGCAT";

pub const ENV_JOBS: &str = "KONTRAST_JOBS";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// How devices are reached
    pub device: DeviceSettings,
    /// Where artifacts go
    pub paths: PathSettings,
    /// What runs on the device
    pub instrumentation: InstrumentationSettings,
    /// Parallelism of the verification step
    pub jobs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSettings {
    pub adb_executable: PathBuf,
    /// Upper bound on a single `adb install`
    pub install_timeout: Duration,
    /// Stream logcat to a file while rendering
    pub capture_logcat: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSettings {
    pub output_dir: PathBuf,
    pub key_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentationSettings {
    pub test_runner: String,
    pub annotation: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self::from_lookup(|_| None)
    }

    /// Build from an arbitrary variable source; unparsable values fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let install_timeout = lookup(ENV_INSTALL_TIMEOUT)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_INSTALL_TIMEOUT);

        Self {
            device: DeviceSettings {
                adb_executable: lookup(ENV_ADB)
                    .or_else(|| lookup(ENV_ADB_LEGACY))
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_ADB)),
                install_timeout: Duration::from_secs(install_timeout),
                capture_logcat: lookup(ENV_LOGCAT)
                    .and_then(|s| parse_bool(&s))
                    .unwrap_or(DEFAULT_CAPTURE_LOGCAT),
            },
            paths: PathSettings {
                output_dir: lookup(ENV_OUTPUT_DIR)
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
                key_dir: lookup(ENV_KEY_DIR)
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_KEY_DIR)),
            },
            instrumentation: InstrumentationSettings {
                test_runner: lookup(ENV_TEST_RUNNER)
                    .unwrap_or_else(|| DEFAULT_TEST_RUNNER.to_string()),
                annotation: lookup(ENV_ANNOTATION)
                    .unwrap_or_else(|| DEFAULT_ANNOTATION.to_string()),
            },
            jobs: lookup(ENV_JOBS)
                .and_then(|s| s.trim().parse().ok())
                .filter(|jobs| *jobs > 0)
                .unwrap_or_else(default_jobs),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Accepts `true/false`, `1/0`, `yes/no`, `on/off`
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(DEFAULT_JOBS)
}
