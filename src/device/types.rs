use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

/// Connection state reported by `adb devices`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdbStatus {
    Online,
    Offline,
    Unauthorized,
}

impl AdbStatus {
    /// Parse the state column of `adb devices` (`device`, `offline`, `unauthorized`)
    pub fn from_adb_output(s: &str) -> Option<Self> {
        match s {
            "device" => Some(AdbStatus::Online),
            "offline" => Some(AdbStatus::Offline),
            "unauthorized" => Some(AdbStatus::Unauthorized),
            _ => None,
        }
    }
}

/// An addressable device. Immutable once resolved for a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdbDevice {
    pub id: String,
    pub status: AdbStatus,
    pub alias: Option<String>,
}

impl AdbDevice {
    pub fn new(id: impl Into<String>, status: AdbStatus) -> Self {
        Self {
            id: id.into(),
            status,
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn is_online(&self) -> bool {
        self.status == AdbStatus::Online
    }

    pub fn is_emulator(&self) -> bool {
        self.id.starts_with("emulator")
    }

    /// Console port of an emulator, e.g. `5554` for `emulator-5554`
    pub fn port_number(&self) -> Option<u16> {
        if !self.is_emulator() {
            return None;
        }
        self.id.strip_prefix("emulator-")?.parse().ok()
    }

    /// Alias when one was resolved, the serial otherwise
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.id)
    }
}

/// Flags accepted by `adb install`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallFlag {
    ForwardLock,
    ReplaceExisting,
    AllowTestPackages,
    InstallOnSdcard,
    AllowVersionDowngrade,
    GrantAllRuntimePermissions,
}

impl InstallFlag {
    pub fn cli_flag(self) -> &'static str {
        match self {
            InstallFlag::ForwardLock => "-l",
            InstallFlag::ReplaceExisting => "-r",
            InstallFlag::AllowTestPackages => "-t",
            InstallFlag::InstallOnSdcard => "-s",
            InstallFlag::AllowVersionDowngrade => "-d",
            InstallFlag::GrantAllRuntimePermissions => "-g",
        }
    }
}

/// Buffers selectable with `logcat --buffer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogcatBuffer {
    Main,
    System,
    Radio,
    Events,
    Crash,
    Default,
    All,
}

impl LogcatBuffer {
    fn as_str(self) -> &'static str {
        match self {
            LogcatBuffer::Main => "main",
            LogcatBuffer::System => "system",
            LogcatBuffer::Radio => "radio",
            LogcatBuffer::Events => "events",
            LogcatBuffer::Crash => "crash",
            LogcatBuffer::Default => "default",
            LogcatBuffer::All => "all",
        }
    }
}

/// Options passed through to `adb logcat`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogcatOption {
    /// Flush the device log buffer and exit
    Clear,
    /// Print the current buffer and exit
    Dump,
    Format(String),
    Regex(String),
    Buffers(Vec<LogcatBuffer>),
    Pid(u32),
    /// Print the most recent lines; `dump` exits afterwards
    TailCount { count: u64, dump: bool },
}

impl LogcatOption {
    pub fn to_cli_args(&self) -> Vec<String> {
        match self {
            LogcatOption::Clear => vec!["--clear".to_string()],
            LogcatOption::Dump => vec!["-d".to_string()],
            LogcatOption::Format(format) => vec![format!("--format={}", format)],
            LogcatOption::Regex(expr) => vec![format!("--regex={}", expr)],
            LogcatOption::Buffers(buffers) => {
                let names: Vec<&str> = buffers.iter().map(|b| b.as_str()).collect();
                vec![format!("--buffer={}", names.join(","))]
            }
            LogcatOption::Pid(pid) => vec![format!("--pid={}", pid)],
            LogcatOption::TailCount { count, dump } => {
                let flag = if *dump { "-t" } else { "-T" };
                vec![flag.to_string(), count.to_string()]
            }
        }
    }
}

/// Result type for device channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Error types for device channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The command could not be started at all
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited unsuccessfully
    #[error("'{command}' exited with {status}: {stderr}")]
    Process {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("'{command}' did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("local path {path} is unusable: {source}")]
    LocalPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
