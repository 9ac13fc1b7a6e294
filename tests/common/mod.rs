//! Shared fixtures: a scripted device channel and PNG helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use image::{Rgba, RgbaImage};
use indexmap::IndexMap;

use kontrast::device::{
    AdbDevice, ChannelError, ChannelResult, DeviceChannel, InstallFlag, LineStream, LogcatOption,
};
use kontrast::layout::copy_dir_all;
use kontrast::render::Manifest;
use kontrast::types::{InstrumentationStatus, PulledOutput, TestOutput};

pub const CLASS: &str = "com.example.CardTest";

/// Plays back canned instrumentation output and serves pulls from a local
/// directory standing in for device storage.
pub struct FakeChannel {
    pub devices: Vec<AdbDevice>,
    scripts: HashMap<String, Vec<String>>,
    storage: PathBuf,
    failing_pull: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeChannel {
    pub fn new(storage: impl Into<PathBuf>) -> Self {
        Self {
            devices: Vec::new(),
            scripts: HashMap::new(),
            storage: storage.into(),
            failing_pull: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_device(mut self, device: AdbDevice, script: Vec<String>) -> Self {
        self.scripts.insert(device.id.clone(), script);
        self.devices.push(device);
        self
    }

    /// Make pulls of remote paths containing `fragment` fail
    pub fn failing_pull(mut self, fragment: impl Into<String>) -> Self {
        self.failing_pull = Some(fragment.into());
        self
    }

    /// Where `remote` lives for `device`
    pub fn remote_path(&self, device: &AdbDevice, remote: &Path) -> PathBuf {
        let relative = remote.strip_prefix("/").unwrap_or(remote);
        self.storage.join(&device.id).join(relative)
    }

    /// Put a rendered image on the fake device
    pub fn put_image(&self, device: &AdbDevice, remote_dir: &str, color: [u8; 4]) {
        let dir = self.remote_path(device, Path::new(remote_dir));
        fs::create_dir_all(&dir).unwrap();
        write_png(&dir.join("image.png"), 4, 4, color);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl DeviceChannel for FakeChannel {
    fn devices(&self) -> ChannelResult<Vec<AdbDevice>> {
        Ok(self.devices.clone())
    }

    fn shell(&self, device: &AdbDevice, command: &str) -> ChannelResult<LineStream> {
        self.record(format!("{} shell {}", device.id, command));
        let script = self.scripts.get(&device.id).cloned().unwrap_or_default();
        Ok(LineStream::from_lines(command, script))
    }

    fn logcat(&self, device: &AdbDevice, options: &[LogcatOption]) -> ChannelResult<LineStream> {
        let args: Vec<String> = options.iter().flat_map(|o| o.to_cli_args()).collect();
        self.record(format!("{} logcat {}", device.id, args.join(" ")).trim_end().to_string());
        let lines = if options.is_empty() {
            vec!["I/TestRunner: started".to_string(), "I/TestRunner: finished".to_string()]
        } else {
            Vec::new()
        };
        Ok(LineStream::from_lines("logcat", lines))
    }

    fn pull(
        &self,
        device: &AdbDevice,
        remote: &Path,
        local: &Path,
        _preserve_timestamps: bool,
    ) -> ChannelResult<()> {
        self.record(format!("{} pull {}", device.id, remote.display()));
        if let Some(fragment) = &self.failing_pull {
            if remote.to_string_lossy().contains(fragment.as_str()) {
                return Err(ChannelError::Io(io::Error::other("remote object does not exist")));
            }
        }
        let source = self.remote_path(device, remote);
        let leaf = remote.file_name().ok_or_else(|| io::Error::other("no leaf"))?;
        copy_dir_all(&source, &local.join(leaf))?;
        Ok(())
    }

    fn delete_dir(&self, device: &AdbDevice, remote: &Path) -> ChannelResult<()> {
        self.record(format!("{} rm {}", device.id, remote.display()));
        let path = self.remote_path(device, remote);
        if path.exists() {
            fs::remove_dir_all(path)?;
        }
        Ok(())
    }

    fn install(&self, device: &AdbDevice, package: &Path, flags: &[InstallFlag]) -> ChannelResult<()> {
        let flags: Vec<&str> = flags.iter().map(|f| f.cli_flag()).collect();
        self.record(format!("{} install {} {}", device.id, flags.join(" "), package.display()));
        Ok(())
    }
}

/// Remote directory a render of `key` is written to
pub fn remote_dir(method: &str, key: &str) -> String {
    format!("/sdcard/Android/data/com.example/files/Kontrast/{CLASS}/{method}/{key}")
}

/// Status lines the renderer publishes for one image
pub fn render_block(method: &str, key: &str, output_dir: Option<&str>) -> Vec<String> {
    let mut lines = vec![
        format!("INSTRUMENTATION_STATUS: Kontrast:TestKey={key}"),
        format!("INSTRUMENTATION_STATUS: Kontrast:MethodName={method}"),
        "INSTRUMENTATION_STATUS: Kontrast:Description=null".to_string(),
        format!("INSTRUMENTATION_STATUS: Kontrast:ClassName={CLASS}"),
        format!(
            r#"INSTRUMENTATION_STATUS: Kontrast:Extras=["key"KVP_DELIMITER"{key}"EXTRA_DELIMITER"note"KVP_DELIMITER"a, b: c"]"#
        ),
    ];
    if let Some(dir) = output_dir {
        lines.push(format!("INSTRUMENTATION_STATUS: Kontrast:OutputDir={dir}"));
    }
    lines.push("INSTRUMENTATION_STATUS_CODE: 42".to_string());
    lines
}

/// JUnit start/finish around `body`, closed with the run exit line
pub fn instrumentation_script(method: &str, body: Vec<String>, terminated: bool) -> Vec<String> {
    let mut lines = vec![
        "INSTRUMENTATION_STATUS: numtests=1".to_string(),
        format!("INSTRUMENTATION_STATUS: test={method}"),
        format!("INSTRUMENTATION_STATUS: class={CLASS}"),
        "INSTRUMENTATION_STATUS_CODE: 1".to_string(),
    ];
    lines.extend(body);
    lines.extend([
        format!("INSTRUMENTATION_STATUS: test={method}"),
        format!("INSTRUMENTATION_STATUS: class={CLASS}"),
        "INSTRUMENTATION_STATUS_CODE: 0".to_string(),
        "INSTRUMENTATION_RESULT: stream=".to_string(),
        "OK (1 test)".to_string(),
    ]);
    if terminated {
        lines.push("INSTRUMENTATION_CODE: -1".to_string());
    }
    lines
}

pub fn write_png(path: &Path, width: u32, height: u32, color: [u8; 4]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    RgbaImage::from_pixel(width, height, Rgba(color)).save(path).unwrap();
}

/// A manifest over `<render_root>/<CLASS>/<method>/<key>` cases
pub fn manifest(render_root: &Path, cases: &[(&str, &str, InstrumentationStatus)]) -> Manifest {
    let outputs = cases
        .iter()
        .map(|(method, key, status)| {
            PulledOutput::new(
                render_root.join(CLASS).join(method),
                TestOutput {
                    test_key: key.to_string(),
                    method_name: method.to_string(),
                    class_name: CLASS.to_string(),
                    parameterized_name: None,
                    description: None,
                    extras: IndexMap::new(),
                    remote_output_dir: None,
                    status: *status,
                },
            )
        })
        .collect();
    Manifest {
        generated_at: Utc::now(),
        device: "emulator-5554".to_string(),
        outputs,
    }
}
