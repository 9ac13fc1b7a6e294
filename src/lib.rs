//! Kontrast - on-device UI render capture and pixel-diff verification.
//!
//! This crate provides:
//! - A parser for `am instrument -r` output that recovers render records
//! - A per-device render pass: run, pull, clean up, write a manifest
//! - Key capture: promote a clean render pass to the golden set
//! - A streaming PNG diff engine and a verification step built on it
//!
//! # Example
//!
//! ```rust,no_run
//! use kontrast::device::{AdbChannel, DeviceChannel};
//! use kontrast::layout::RunLayout;
//! use kontrast::render::{RenderOptions, render_on_devices};
//!
//! let adb = AdbChannel::new("adb");
//! let devices = adb.devices().unwrap();
//! let layout = RunLayout::new("build/kontrast");
//! let options = RenderOptions::new("com.example.app.test");
//! for run in render_on_devices(&adb, &devices, &layout, &options) {
//!     println!("{}: {:?}", run.device.id, run.result.map(|r| r.manifest_path));
//! }
//! ```

pub mod capture;
pub mod config;
pub mod device;
pub mod diff;
pub mod instrumentation;
pub mod layout;
pub mod render;
pub mod types;
pub mod verify;

// Re-export core records
pub use types::{CaseKey, InstrumentationStatus, PulledOutput, TestOutput};

// Re-export device access
pub use device::{AdbChannel, AdbDevice, AdbStatus, ChannelError, ChannelResult, DeviceChannel, LineStream};

// Re-export pipeline entry points
pub use capture::{CaptureError, CaptureResult, capture_test_keys};
pub use diff::{DiffError, DiffOutcome, DiffReport, DiffResult, diff_images, diff_streams, format_percent};
pub use instrumentation::parse_test_cases;
pub use render::{
    DeviceRun, Manifest, RenderError, RenderOptions, RenderResult, RenderRun, render_on_device,
    render_on_devices,
};
pub use verify::{CaseOutcome, CaseResult, VerificationReport, VerifyError, VerifyResult, verify};
