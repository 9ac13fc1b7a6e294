//! Device channel abstraction.
//!
//! Everything the render pipeline needs from a device goes through
//! [`DeviceChannel`]:
//! - `AdbChannel` drives a real device through the `adb` executable
//! - test code supplies a scripted fake
//!
//! Long running commands hand back a [`LineStream`]: stdout lines are drained
//! by a background thread into an unbounded channel so the child never blocks
//! on a full pipe, while the [`ProcessGuard`] owns the child itself.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::types::{AdbDevice, ChannelError, ChannelResult, InstallFlag, LogcatOption};

/// How long a terminated child gets to exit before it is killed outright
const TERMINATE_GRACE: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Capability interface over a device connection.
pub trait DeviceChannel: Send + Sync {
    /// Enumerate attached devices
    fn devices(&self) -> ChannelResult<Vec<AdbDevice>>;

    /// Run a shell command on the device, streaming its output lines
    fn shell(&self, device: &AdbDevice, command: &str) -> ChannelResult<LineStream>;

    /// Stream (or, for one-shot options, run) `logcat` on the device
    fn logcat(&self, device: &AdbDevice, options: &[LogcatOption]) -> ChannelResult<LineStream>;

    /// Copy a device directory tree into `local`; the remote leaf lands beneath it
    fn pull(
        &self,
        device: &AdbDevice,
        remote: &Path,
        local: &Path,
        preserve_timestamps: bool,
    ) -> ChannelResult<()>;

    /// Recursively remove a device path
    fn delete_dir(&self, device: &AdbDevice, remote: &Path) -> ChannelResult<()>;

    /// Install a package, bounded by the channel's install timeout
    fn install(&self, device: &AdbDevice, package: &Path, flags: &[InstallFlag]) -> ChannelResult<()>;
}

/// Output lines of a running command plus the handle that owns the process
pub struct LineStream {
    lines: Receiver<std::io::Result<String>>,
    guard: ProcessGuard,
}

impl LineStream {
    /// Spawn `command` with piped stdout/stderr and start draining both.
    pub fn spawn(label: impl Into<String>, mut command: Command) -> ChannelResult<Self> {
        let label = label.into();
        debug!("spawning {}", label);

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ChannelError::Spawn {
                command: label.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("failed to capture stdout"))?;
        let stderr = child.stderr.take().map(|err| spawn_stderr_drain(label.clone(), err));

        Ok(Self {
            lines: spawn_line_reader(stdout),
            guard: ProcessGuard {
                label,
                child: Some(child),
                stderr,
            },
        })
    }

    /// A stream over already known lines with no process behind it
    pub fn from_lines<I, S>(label: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, rx) = mpsc::channel();
        for line in lines {
            // The receiver is alive for the whole loop
            let _ = tx.send(Ok(line.into()));
        }
        Self {
            lines: rx,
            guard: ProcessGuard::detached(label),
        }
    }

    pub fn label(&self) -> &str {
        &self.guard.label
    }

    /// Separate the line receiver from the process so a sink thread can own the former
    pub fn into_parts(self) -> (Receiver<std::io::Result<String>>, ProcessGuard) {
        (self.lines, self.guard)
    }

    /// Terminate the process; buffered lines stay readable
    pub fn stop(&mut self) {
        self.guard.stop();
    }

    /// Drain whatever is left and wait for a clean exit
    pub fn wait(self) -> ChannelResult<()> {
        let (lines, guard) = self.into_parts();
        for line in lines.iter().flatten() {
            debug!("{}: {}", guard.label, line);
        }
        guard.wait()
    }
}

impl Iterator for LineStream {
    type Item = std::io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lines.recv().ok()
    }
}

/// Owns a spawned child. Dropping the guard terminates the child.
pub struct ProcessGuard {
    label: String,
    child: Option<Child>,
    stderr: Option<JoinHandle<String>>,
}

impl ProcessGuard {
    /// A guard with nothing to supervise
    pub fn detached(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            child: None,
            stderr: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Terminate the child (politely first on unix) and reap it
    pub fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            debug!("stopping {}", self.label);
            terminate(&mut child);
        }
        if let Some(handle) = self.stderr.take() {
            let _ = handle.join();
        }
    }

    /// Wait for the child to exit on its own; a non-zero exit is an error
    pub fn wait(mut self) -> ChannelResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait()?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        check_status(&self.label, status, stderr)
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Map an exit status onto `Ok` or [`ChannelError::Process`]
pub(crate) fn check_status(label: &str, status: ExitStatus, stderr: String) -> ChannelResult<()> {
    if status.success() {
        Ok(())
    } else {
        Err(ChannelError::Process {
            command: label.to_string(),
            status,
            stderr: stderr.trim().to_string(),
        })
    }
}

/// Poll a child until it exits or `timeout` passes; on expiry the child is killed.
pub(crate) fn wait_with_timeout(
    label: &str,
    child: &mut Child,
    timeout: Duration,
) -> ChannelResult<ExitStatus> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if start.elapsed() >= timeout {
            warn!("{} did not finish within {:?}, killing it", label, timeout);
            let _ = child.kill();
            let _ = child.wait();
            return Err(ChannelError::Timeout {
                command: label.to_string(),
                timeout,
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn spawn_line_reader<R: Read + Send + 'static>(reader: R) -> Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let reader = BufReader::new(reader);
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if tx.send(Ok(line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                    break;
                }
            }
        }
    });
    rx
}

fn spawn_stderr_drain<R: Read + Send + 'static>(label: String, reader: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut collected = String::new();
        for line in BufReader::new(reader).lines().map_while(Result::ok) {
            debug!("{} stderr: {}", label, line);
            collected.push_str(&line);
            collected.push('\n');
        }
        collected
    })
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    if let Ok(pid) = i32::try_from(child.id()) {
        let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
        let start = Instant::now();
        while start.elapsed() < TERMINATE_GRACE {
            if let Ok(Some(_)) = child.try_wait() {
                return;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
