use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, info_span, warn};

use super::manifest::{Manifest, ManifestBuilder, write_extras};
use super::{RenderError, RenderResult};
use crate::config::Config;
use crate::device::{AdbDevice, DeviceChannel, InstallFlag, LogcatOption, ProcessGuard};
use crate::instrumentation::{
    RUN_OK_CODE, crash_message, is_run_complete, parse_run_code, parse_test_cases,
};
use crate::layout::{RunLayout, reset_dir};
use crate::types::{PulledOutput, TestOutput};

/// What to run on each device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Package holding the instrumentation, e.g. `com.example.app.test`
    pub test_package: String,
    pub test_runner: String,
    /// Only tests carrying this annotation are run
    pub annotation: String,
    /// Stream device logs to `logcat.txt` while rendering
    pub capture_logcat: bool,
    /// Installed (replacing any existing copy) before the run when set
    pub app_apk: Option<PathBuf>,
    pub test_apk: Option<PathBuf>,
}

impl RenderOptions {
    pub fn new(test_package: impl Into<String>) -> Self {
        Self::from_config(test_package, &Config::defaults())
    }

    pub fn from_config(test_package: impl Into<String>, config: &Config) -> Self {
        Self {
            test_package: test_package.into(),
            test_runner: config.instrumentation.test_runner.clone(),
            annotation: config.instrumentation.annotation.clone(),
            capture_logcat: config.device.capture_logcat,
            app_apk: None,
            test_apk: None,
        }
    }

    pub fn test_runner(mut self, runner: impl Into<String>) -> Self {
        self.test_runner = runner.into();
        self
    }

    pub fn annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = annotation.into();
        self
    }

    pub fn capture_logcat(mut self, capture: bool) -> Self {
        self.capture_logcat = capture;
        self
    }

    pub fn app_apk(mut self, apk: impl Into<PathBuf>) -> Self {
        self.app_apk = Some(apk.into());
        self
    }

    pub fn test_apk(mut self, apk: impl Into<PathBuf>) -> Self {
        self.test_apk = Some(apk.into());
        self
    }

    /// The `am instrument` invocation for this run
    pub fn instrument_command(&self) -> String {
        format!(
            "am instrument -w -r -e debug false -e annotation {} {}/{}",
            self.annotation, self.test_package, self.test_runner
        )
    }
}

/// A completed render pass on one device
#[derive(Debug, Clone)]
pub struct RenderRun {
    pub device: AdbDevice,
    pub manifest: Manifest,
    pub manifest_path: PathBuf,
    /// Set when device logs were captured
    pub logcat_path: Option<PathBuf>,
}

/// Outcome of one device's pipeline within a multi-device render
#[derive(Debug)]
pub struct DeviceRun {
    pub device: AdbDevice,
    pub result: RenderResult<RenderRun>,
}

/// Run the render pass on every online device in parallel.
///
/// A failing device does not stop the others; each result is reported
/// separately. Offline and unauthorized devices are skipped.
pub fn render_on_devices(
    channel: &dyn DeviceChannel,
    devices: &[AdbDevice],
    layout: &RunLayout,
    options: &RenderOptions,
) -> Vec<DeviceRun> {
    let online: Vec<&AdbDevice> = devices
        .iter()
        .filter(|device| {
            if !device.is_online() {
                warn!("skipping {} ({:?})", device.id, device.status);
            }
            device.is_online()
        })
        .collect();

    thread::scope(|scope| {
        let handles: Vec<_> = online
            .into_iter()
            .map(|device| {
                let handle = scope.spawn(move || {
                    let span = info_span!("device", id = %device.id);
                    let _enter = span.enter();
                    render_on_device(channel, device, layout, options)
                });
                (device, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(device, handle)| DeviceRun {
                device: device.clone(),
                result: handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic)),
            })
            .collect()
    })
}

/// Run the render pass on a single device.
///
/// 1. reset the device's output directory
/// 2. install packages when configured, clear logcat and start capturing it
/// 3. stream `am instrument` output through the parser until the process reports its exit code,
///    failing unless that code says the run finished normally
/// 4. pull then delete every case's artifacts and write its extras
/// 5. close the manifest (failing on duplicate identities) and persist it
pub fn render_on_device(
    channel: &dyn DeviceChannel,
    device: &AdbDevice,
    layout: &RunLayout,
    options: &RenderOptions,
) -> RenderResult<RenderRun> {
    let device_dir = layout.device_dir(device);
    let render_dir = layout.render_dir(device);
    for dir in [&device_dir, &render_dir] {
        reset_dir(dir).map_err(|source| RenderError::OutputDir {
            path: dir.clone(),
            source,
        })?;
    }

    for apk in [&options.app_apk, &options.test_apk].into_iter().flatten() {
        channel.install(
            device,
            apk,
            &[InstallFlag::ReplaceExisting, InstallFlag::AllowTestPackages],
        )?;
    }

    let mut logcat = if options.capture_logcat {
        LogcatCapture::start(channel, device, &layout.logcat_path(device))
    } else {
        None
    };

    let command = options.instrument_command();
    info!("running {} on {}", command, device.display_name());
    let (lines, mut guard) = channel.shell(device, &command)?.into_parts();

    let mut completed = false;
    let mut run_code = None;
    let mut crash = None;
    let mut read_error = None;
    let collected = {
        let lines = lines
            .iter()
            .map_while(|line| match line {
                Ok(line) => Some(line),
                Err(e) => {
                    read_error = Some(e);
                    None
                }
            })
            .map(|line| line.trim().to_string())
            .inspect(|line| {
                debug!("{}", line);
                if let Some(message) = crash_message(line) {
                    crash = Some(message.to_string());
                }
            })
            .take_while(|line| {
                if is_run_complete(line) {
                    completed = true;
                    run_code = parse_run_code(line);
                }
                !completed
            })
            // Device logs are only interesting while the instrumentation runs
            .chain(std::iter::from_fn(|| {
                if let Some(capture) = logcat.as_mut() {
                    capture.stop();
                }
                None
            }));
        collect_outputs(channel, device, &render_dir, lines)
    };

    let logcat_path = logcat.and_then(LogcatCapture::finish);
    let builder = collected?;

    if let Some(e) = read_error {
        return Err(RenderError::Io(e));
    }
    if !completed {
        guard.stop();
        return Err(RenderError::Incomplete {
            device: device.id.clone(),
        });
    }
    if crash.is_some() || run_code != Some(RUN_OK_CODE) {
        return Err(RenderError::Crashed {
            device: device.id.clone(),
            code: run_code,
            message: crash,
        });
    }
    guard.wait()?;

    let manifest = builder.finish(&device.id)?;
    let manifest_path = layout.manifest_path(device);
    manifest.write(&manifest_path)?;
    info!(
        "{} rendered {} cases ({} failed)",
        device.display_name(),
        manifest.outputs.len(),
        manifest.failed_keys().len()
    );

    Ok(RenderRun {
        device: device.clone(),
        manifest,
        manifest_path,
        logcat_path,
    })
}

fn collect_outputs(
    channel: &dyn DeviceChannel,
    device: &AdbDevice,
    render_dir: &Path,
    lines: impl Iterator<Item = String>,
) -> RenderResult<ManifestBuilder> {
    let mut builder = ManifestBuilder::new();
    for output in parse_test_cases(lines) {
        let pulled = pull_output(channel, device, render_dir, output)?;
        write_extras(&pulled)?;
        builder.push(pulled);
    }
    Ok(builder)
}

/// Bring one case's artifacts to the host and remove them from the device
fn pull_output(
    channel: &dyn DeviceChannel,
    device: &AdbDevice,
    render_dir: &Path,
    output: TestOutput,
) -> RenderResult<PulledOutput> {
    let key = output.case_key();
    // adb pull recreates the remote leaf directory, so target its parent
    let local_dir = render_dir.join(key.method_sub_dir());

    match &output.remote_output_dir {
        Some(remote) => {
            info!("pulling {} into {}", remote.display(), local_dir.display());
            let transfer = |source| RenderError::Transfer {
                case: key.to_string(),
                source,
            };
            channel.pull(device, remote, &local_dir, true).map_err(transfer)?;
            channel.delete_dir(device, remote).map_err(transfer)?;
        }
        None => warn!("{} ({}) produced no output directory", key, output.status),
    }

    Ok(PulledOutput::new(local_dir, output))
}

/// Background `logcat` stream written line by line to a file
struct LogcatCapture {
    path: PathBuf,
    guard: ProcessGuard,
    sink: JoinHandle<io::Result<u64>>,
}

impl LogcatCapture {
    /// Clear the device buffer and start streaming. Failures only cost diagnostics.
    fn start(channel: &dyn DeviceChannel, device: &AdbDevice, path: &Path) -> Option<Self> {
        let cleared = channel
            .logcat(device, &[LogcatOption::Clear])
            .and_then(|stream| stream.wait());
        if let Err(e) = cleared {
            warn!("unable to clear logcat on {}: {}", device.id, e);
        }

        let file = match File::create(path) {
            Ok(file) => file,
            Err(e) => {
                warn!("unable to create {}: {}", path.display(), e);
                return None;
            }
        };
        let (lines, guard) = match channel.logcat(device, &[]) {
            Ok(stream) => stream.into_parts(),
            Err(e) => {
                warn!("unable to start logcat on {}: {}", device.id, e);
                return None;
            }
        };

        Some(Self {
            path: path.to_path_buf(),
            guard,
            sink: thread::spawn(move || write_lines(lines, file)),
        })
    }

    fn stop(&mut self) {
        self.guard.stop();
    }

    /// Stop the process and wait for the sink to flush
    fn finish(mut self) -> Option<PathBuf> {
        self.guard.stop();
        match self.sink.join() {
            Ok(Ok(count)) => {
                debug!("captured {} logcat lines to {}", count, self.path.display());
                Some(self.path)
            }
            Ok(Err(e)) => {
                warn!("writing {} failed: {}", self.path.display(), e);
                None
            }
            Err(_) => {
                warn!("logcat sink for {} panicked", self.path.display());
                None
            }
        }
    }
}

fn write_lines(lines: Receiver<io::Result<String>>, file: File) -> io::Result<u64> {
    let mut writer = BufWriter::new(file);
    let mut count = 0;
    for line in lines.iter().map_while(Result::ok) {
        writeln!(writer, "{}", line)?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}
