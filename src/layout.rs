//! On-disk layout of a run.
//!
//! ```text
//! <output root>/
//!   <device>/
//!     render/<class>/<method>/<testKey>/{image.png, extras.json, diff.png}
//!     test-cases.json
//!     verification.json
//!     logcat.txt
//! <key root>/<class>/<method>/<testKey>/image.png
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::device::AdbDevice;

/// Rendered artifact inside a case directory
pub const IMAGE_FILE: &str = "image.png";
/// Sidecar holding the case's extras map
pub const EXTRAS_FILE: &str = "extras.json";
/// Difference image written next to the candidate
pub const DIFF_FILE: &str = "diff.png";
pub const MANIFEST_FILE: &str = "test-cases.json";
pub const VERIFICATION_FILE: &str = "verification.json";
pub const LOGCAT_FILE: &str = "logcat.txt";

const RENDER_DIR: &str = "render";

/// Paths of every per-device artifact below one output root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    pub root: PathBuf,
}

impl RunLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Everything produced for one device
    pub fn device_dir(&self, device: &AdbDevice) -> PathBuf {
        self.root.join(sanitize_name(device.display_name()))
    }

    /// Root of the pulled `<class>/<method>/<testKey>` tree
    pub fn render_dir(&self, device: &AdbDevice) -> PathBuf {
        self.device_dir(device).join(RENDER_DIR)
    }

    pub fn manifest_path(&self, device: &AdbDevice) -> PathBuf {
        self.device_dir(device).join(MANIFEST_FILE)
    }

    pub fn verification_path(&self, device: &AdbDevice) -> PathBuf {
        self.device_dir(device).join(VERIFICATION_FILE)
    }

    pub fn logcat_path(&self, device: &AdbDevice) -> PathBuf {
        self.device_dir(device).join(LOGCAT_FILE)
    }
}

/// Delete `dir` if present and create it again, empty
pub fn reset_dir(dir: &Path) -> io::Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)
}

/// Recursively copy `src` into `dst`, overwriting files that already exist
pub fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<u64> {
    fs::create_dir_all(dst)?;
    let mut copied = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Immediate subdirectories of `dir`, sorted. A missing `dir` has none.
pub fn child_dirs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Make a device name safe to use as a directory name
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::AdbStatus;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("emulator-5554"), "emulator-5554");
        assert_eq!(sanitize_name("192.168.1.20:5555"), "192.168.1.20_5555");
        assert_eq!(sanitize_name("Pixel 7 Pro"), "Pixel_7_Pro");
    }

    #[test]
    fn test_device_paths() {
        let layout = RunLayout::new("/out");
        let device = AdbDevice::new("emulator-5554", AdbStatus::Online);
        assert_eq!(layout.render_dir(&device), PathBuf::from("/out/emulator-5554/render"));
        assert_eq!(
            layout.manifest_path(&device),
            PathBuf::from("/out/emulator-5554/test-cases.json")
        );
        assert_eq!(layout.logcat_path(&device), PathBuf::from("/out/emulator-5554/logcat.txt"));
    }

    #[test]
    fn test_reset_dir_removes_stale_content() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("run");
        fs::create_dir_all(dir.join("old")).unwrap();
        fs::write(dir.join("old/stale.png"), b"x").unwrap();

        reset_dir(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_copy_dir_all_overwrites() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("a.txt"), b"new").unwrap();
        fs::write(src.join("nested/b.txt"), b"b").unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(dst.join("a.txt"), b"old").unwrap();

        assert_eq!(copy_dir_all(&src, &dst).unwrap(), 2);
        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "new");
        assert_eq!(fs::read_to_string(dst.join("nested/b.txt")).unwrap(), "b");
    }

    #[test]
    fn test_child_dirs_sorted_and_missing_ok() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("b")).unwrap();
        fs::create_dir_all(temp.path().join("a")).unwrap();
        fs::write(temp.path().join("file.txt"), b"").unwrap();

        let dirs = child_dirs(temp.path()).unwrap();
        assert_eq!(dirs, vec![temp.path().join("a"), temp.path().join("b")]);
        assert!(child_dirs(&temp.path().join("missing")).unwrap().is_empty());
    }
}
