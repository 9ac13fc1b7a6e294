//! Device access: enumeration, shell streams, file transfer and logcat.

pub mod adb;
pub mod channel;
pub mod types;

pub use adb::{AdbChannel, parse_devices};
pub use channel::{DeviceChannel, LineStream, ProcessGuard};
pub use types::{
    AdbDevice, AdbStatus, ChannelError, ChannelResult, InstallFlag, LogcatBuffer, LogcatOption,
};
