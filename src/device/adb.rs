//! `adb` backed implementation of [`DeviceChannel`].

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, info};

use super::channel::{DeviceChannel, LineStream, check_status, wait_with_timeout};
use super::types::{
    AdbDevice, AdbStatus, ChannelError, ChannelResult, InstallFlag, LogcatOption,
};

/// Drives devices through an `adb` executable on the host
#[derive(Debug, Clone)]
pub struct AdbChannel {
    /// Path (or bare name resolved through `PATH`) of the adb binary
    pub executable: PathBuf,
    /// Upper bound on a single `adb install`
    pub install_timeout: Duration,
}

impl AdbChannel {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            install_timeout: Duration::from_secs(crate::config::DEFAULT_INSTALL_TIMEOUT),
        }
    }

    /// Build from the process-wide configuration
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            executable: config.device.adb_executable.clone(),
            install_timeout: config.device.install_timeout,
        }
    }

    pub fn install_timeout(mut self, timeout: Duration) -> Self {
        self.install_timeout = timeout;
        self
    }

    fn command(&self, device: Option<&AdbDevice>) -> Command {
        let mut command = Command::new(&self.executable);
        if let Some(device) = device {
            command.arg("-s").arg(&device.id);
        }
        command
    }

    fn label(&self, device: Option<&AdbDevice>, args: &[&str]) -> String {
        let mut label = self.executable.display().to_string();
        if let Some(device) = device {
            label.push_str(" -s ");
            label.push_str(&device.id);
        }
        for arg in args {
            label.push(' ');
            label.push_str(arg);
        }
        label
    }

    /// Run a short command to completion and return its stdout
    fn run(&self, device: Option<&AdbDevice>, args: &[&str]) -> ChannelResult<String> {
        let label = self.label(device, args);
        debug!("running {}", label);
        let output = self
            .command(device)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ChannelError::Spawn {
                command: label.clone(),
                source,
            })?;
        check_status(
            &label,
            output.status,
            String::from_utf8_lossy(&output.stderr).into_owned(),
        )?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl DeviceChannel for AdbChannel {
    fn devices(&self) -> ChannelResult<Vec<AdbDevice>> {
        let output = self.run(None, &["devices"])?;
        Ok(parse_devices(&output))
    }

    fn shell(&self, device: &AdbDevice, command: &str) -> ChannelResult<LineStream> {
        let mut cmd = self.command(Some(device));
        cmd.arg("shell").arg(command);
        LineStream::spawn(self.label(Some(device), &["shell", command]), cmd)
    }

    fn logcat(&self, device: &AdbDevice, options: &[LogcatOption]) -> ChannelResult<LineStream> {
        let args: Vec<String> = options.iter().flat_map(|o| o.to_cli_args()).collect();
        let mut cmd = self.command(Some(device));
        cmd.arg("logcat").args(&args);

        let mut label_args = vec!["logcat"];
        label_args.extend(args.iter().map(String::as_str));
        LineStream::spawn(self.label(Some(device), &label_args), cmd)
    }

    fn pull(
        &self,
        device: &AdbDevice,
        remote: &Path,
        local: &Path,
        preserve_timestamps: bool,
    ) -> ChannelResult<()> {
        fs::create_dir_all(local).map_err(|source| ChannelError::LocalPath {
            path: local.to_path_buf(),
            source,
        })?;

        let remote = remote.to_string_lossy();
        let local = local.to_string_lossy();
        let mut args = vec!["pull"];
        if preserve_timestamps {
            args.push("-a");
        }
        args.push(&remote);
        args.push(&local);
        self.run(Some(device), &args).map(|_| ())
    }

    fn delete_dir(&self, device: &AdbDevice, remote: &Path) -> ChannelResult<()> {
        let command = format!("rm -rf {}", remote.to_string_lossy());
        self.run(Some(device), &["shell", &command]).map(|_| ())
    }

    fn install(&self, device: &AdbDevice, package: &Path, flags: &[InstallFlag]) -> ChannelResult<()> {
        let package = package.to_string_lossy();
        let mut args = vec!["install"];
        args.extend(flags.iter().map(|f| f.cli_flag()));
        args.push(&package);

        let label = self.label(Some(device), &args);
        info!("installing {} on {}", package, device.display_name());

        let mut child = self
            .command(Some(device))
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ChannelError::Spawn {
                command: label.clone(),
                source,
            })?;

        let status = wait_with_timeout(&label, &mut child, self.install_timeout)?;
        check_status(&label, status, String::new())
    }
}

/// Parse `adb devices` output.
///
/// Lines whose last column is not a known state (headers, daemon chatter)
/// are skipped.
pub fn parse_devices(output: &str) -> Vec<AdbDevice> {
    output
        .lines()
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let id = columns.next()?;
            let state = columns.last()?;
            let status = AdbStatus::from_adb_output(state)?;
            Some(AdbDevice::new(id, status))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_devices_reads_every_state() {
        let output = "\
* daemon not running; starting now at tcp:5037
* daemon started successfully
List of devices attached
emulator-5554\tdevice
0123456789ABCDEF\toffline
R58M123\tunauthorized

";
        let devices = parse_devices(output);
        assert_eq!(
            devices,
            vec![
                AdbDevice::new("emulator-5554", AdbStatus::Online),
                AdbDevice::new("0123456789ABCDEF", AdbStatus::Offline),
                AdbDevice::new("R58M123", AdbStatus::Unauthorized),
            ]
        );
    }

    #[test]
    fn parse_devices_handles_empty_listing() {
        assert!(parse_devices("List of devices attached\n\n").is_empty());
    }

    #[test]
    fn labels_include_device_serial() {
        let adb = AdbChannel::new("adb");
        let device = AdbDevice::new("emulator-5554", AdbStatus::Online);
        assert_eq!(
            adb.label(Some(&device), &["shell", "ls"]),
            "adb -s emulator-5554 shell ls"
        );
    }

    #[test]
    fn missing_executable_is_a_spawn_error() {
        let adb = AdbChannel::new("/nonexistent/adb-binary");
        assert!(matches!(adb.devices(), Err(ChannelError::Spawn { .. })));
    }
}
