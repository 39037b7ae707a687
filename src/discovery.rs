// FlashPack - ESP32 Firmware Image Packaging Tool
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Locating Arduino IDE build output.
//!
//! The IDE writes compile results to `arduino_build_<nonce>` directories
//! under the OS temp directory, and the installed esp32 core ships stock
//! segment binaries (bootloader, partition tables, `boot_app0.bin`) inside
//! its SDK tree. Both locations are probed here; neither is ever created or
//! modified by this tool.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Directory-name prefix the Arduino IDE uses for build output.
pub const BUILD_DIR_PREFIX: &str = "arduino_build_";

/// Returns the most recently modified `arduino_build_*` directory under the
/// OS temp directory, if any.
pub fn find_latest_build() -> Option<PathBuf> {
    find_latest_build_in(&std::env::temp_dir())
}

/// As [`find_latest_build`], but scanning `temp_root` instead of the OS temp
/// directory.
///
/// Entries that are not directories are ignored. Ties on the modification
/// time keep an arbitrary one of the maximal entries.
pub fn find_latest_build_in(temp_root: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(temp_root).ok()?;
    entries
        .flatten()
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with(BUILD_DIR_PREFIX)
                && entry.path().is_dir()
        })
        .max_by_key(|entry| modified(&entry.path()))
        .map(|entry| entry.path())
}

/// Locates the `bin` directory of an installed esp32 Arduino core.
///
/// Probes the known install roots (Windows, Linux, macOS) under the user's
/// home directory and takes the first core version that carries an SDK
/// `bin` folder. Not guaranteed unique; this is only a fallback source for
/// stock segment files, so the first match is good enough.
pub fn find_sdk_bin_dir() -> Option<PathBuf> {
    let home = home_dir()?;
    arduino15_roots(&home)
        .iter()
        .find_map(|root| sdk_bin_in_root(root))
}

fn home_dir() -> Option<PathBuf> {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    std::env::var_os(var).map(PathBuf::from)
}

/// Per-platform roots of an Arduino15 data directory, one entry each.
fn arduino15_roots(home: &Path) -> [PathBuf; 3] {
    [
        home.join("AppData").join("Local").join("Arduino15"),
        home.join(".arduino15"),
        home.join("Library").join("Arduino15"),
    ]
}

fn sdk_bin_in_root(root: &Path) -> Option<PathBuf> {
    let versions = root
        .join("packages")
        .join("esp32")
        .join("hardware")
        .join("esp32");
    let entries = std::fs::read_dir(versions).ok()?;
    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| {
            entry
                .path()
                .join("tools")
                .join("sdk")
                .join("esp32")
                .join("bin")
        })
        .filter(|path| path.is_dir())
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

fn modified(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}
