// FlashPack - ESP32 Firmware Image Packaging Tool
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Driving `esptool` through the Python interpreter.
//!
//! Covers the availability probe, merge-segment resolution, and the
//! `merge_bin` invocation that folds bootloader, partition table, boot
//! selector, and application into one image.

use crate::{PackError, Result};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// Interpreter used to run `esptool` as a module.
fn python() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Returns true when `python -m esptool --help` runs and exits zero.
///
/// Any spawn failure (interpreter missing, permission error) counts as "not
/// available" rather than a distinct error.
pub fn is_available() -> bool {
    Command::new(python())
        .args(["-m", "esptool", "--help"])
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// The four binary segments an ESP32 flash image is assembled from, in
/// flash order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Second-stage bootloader, flashed at 0x1000.
    Bootloader,
    /// Partition table, flashed at 0x8000.
    Partitions,
    /// OTA boot selector (`boot_app0.bin`), flashed at 0xe000.
    BootApp0,
    /// The compiled sketch itself, flashed at 0x10000.
    Application,
}

impl Segment {
    /// All segments, in flash order.
    pub const ALL: [Segment; 4] = [
        Segment::Bootloader,
        Segment::Partitions,
        Segment::BootApp0,
        Segment::Application,
    ];

    /// Flash offset passed to `merge_bin` for this segment.
    pub fn offset(self) -> &'static str {
        match self {
            Segment::Bootloader => "0x1000",
            Segment::Partitions => "0x8000",
            Segment::BootApp0 => "0xe000",
            Segment::Application => "0x10000",
        }
    }

    fn matches(self, file_name: &str, project: &str) -> bool {
        let name = file_name.to_lowercase();
        match self {
            Segment::Bootloader => name.contains("bootloader"),
            Segment::Partitions => name.contains("partitions"),
            Segment::BootApp0 => name.contains("boot_app0"),
            Segment::Application => name.contains(&project.to_lowercase()),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Segment::Bootloader => "bootloader",
            Segment::Partitions => "partitions",
            Segment::BootApp0 => "boot_app0",
            Segment::Application => "application",
        })
    }
}

/// Classifies a file name as one of the merge segments.
///
/// Checked in flash order, first hit wins: the Arduino IDE names the
/// bootloader `<sketch>.ino.bootloader.bin`, so the sketch-name check must
/// come last or it would swallow every artifact.
fn classify(file_name: &str, project: &str) -> Option<Segment> {
    Segment::ALL
        .into_iter()
        .find(|segment| segment.matches(file_name, project))
}

/// Resolved input files for one `merge_bin` invocation.
#[derive(Debug)]
pub struct MergePlan {
    /// Bootloader image.
    pub bootloader: PathBuf,
    /// Partition table image.
    pub partitions: PathBuf,
    /// Boot selector image.
    pub boot_app0: PathBuf,
    /// Application (sketch) image.
    pub application: PathBuf,
    /// Path of the merged image to write.
    pub output: PathBuf,
}

/// Locates the four merge segments and plans the `merge_bin` call.
///
/// `output_dir` is scanned first. When the bootloader, partition table, or
/// boot selector are absent there, `fallback_dir` (the installed esp32
/// core, see [`crate::discovery::find_sdk_bin_dir`]) is consulted for those
/// three kinds only; a stock core install cannot supply the sketch itself,
/// so a missing application binary is never filled in.
///
/// Fails with [`PackError::MissingSegments`] when any segment stays
/// unresolved.
pub fn resolve_segments(
    output_dir: &Path,
    project: &str,
    fallback_dir: Option<&Path>,
) -> Result<MergePlan> {
    let mut slots: [Option<PathBuf>; 4] = Default::default();

    for entry in std::fs::read_dir(output_dir)? {
        let path = entry?.path();
        let Some(segment) = classify_path(&path, project) else {
            continue;
        };
        // Later entries overwrite earlier ones of the same kind.
        slots[segment as usize] = Some(path);
    }

    let stock_kinds = [Segment::Bootloader, Segment::Partitions, Segment::BootApp0];
    if stock_kinds.iter().any(|s| slots[*s as usize].is_none()) {
        if let Some(fallback) = fallback_dir {
            warn!(
                "Not all segments present in {}, checking the esp32 core install",
                output_dir.display()
            );
            for entry in std::fs::read_dir(fallback)? {
                let path = entry?.path();
                let Some(segment) = classify_path(&path, project) else {
                    continue;
                };
                if segment != Segment::Application && slots[segment as usize].is_none() {
                    slots[segment as usize] = Some(path);
                }
            }
        }
    }

    match slots {
        [Some(bootloader), Some(partitions), Some(boot_app0), Some(application)] => Ok(MergePlan {
            bootloader,
            partitions,
            boot_app0,
            application,
            output: output_dir.join(format!("{}_complete.bin", project)),
        }),
        slots => Err(PackError::MissingSegments(
            Segment::ALL
                .into_iter()
                .filter(|s| slots[*s as usize].is_none())
                .collect(),
        )),
    }
}

fn classify_path(path: &Path, project: &str) -> Option<Segment> {
    if !path.extension().is_some_and(|ext| ext == "bin") {
        return None;
    }
    let name = path.file_name()?.to_string_lossy();
    classify(&name, project)
}

impl MergePlan {
    /// Argument vector for `esptool merge_bin`, starting at `--chip`.
    ///
    /// Four (offset, file) pairs in flash order, with flash parameters
    /// fixed for 4MB dio ESP32 parts.
    pub fn tool_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["--chip", "esp32", "merge_bin", "-o"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(self.output.clone().into_os_string());
        for flag in ["--flash_mode", "dio", "--flash_freq", "80m", "--flash_size", "4MB"] {
            args.push(OsString::from(flag));
        }
        for segment in Segment::ALL {
            args.push(OsString::from(segment.offset()));
            args.push(self.input(segment).clone().into_os_string());
        }
        args
    }

    fn input(&self, segment: Segment) -> &PathBuf {
        match segment {
            Segment::Bootloader => &self.bootloader,
            Segment::Partitions => &self.partitions,
            Segment::BootApp0 => &self.boot_app0,
            Segment::Application => &self.application,
        }
    }

    /// Runs `esptool merge_bin` and waits for it to finish.
    ///
    /// Fails with [`PackError::MergeFailed`] carrying the tool's stderr
    /// verbatim when it exits nonzero.
    pub fn run(&self) -> Result<()> {
        debug!("Invoking {} -m esptool {:?}", python(), self.tool_args());
        let out = Command::new(python())
            .args(["-m", "esptool"])
            .args(self.tool_args())
            .output()?;
        if out.status.success() {
            Ok(())
        } else {
            Err(PackError::MergeFailed {
                code: out.status.code(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const PROJECT: &str = "myled_hub75e";

    #[test]
    fn test_classify_arduino_artifact_names() {
        assert_eq!(
            classify("myled_hub75e.ino.bootloader.bin", PROJECT),
            Some(Segment::Bootloader)
        );
        assert_eq!(
            classify("myled_hub75e.ino.partitions.bin", PROJECT),
            Some(Segment::Partitions)
        );
        assert_eq!(classify("boot_app0.bin", PROJECT), Some(Segment::BootApp0));
        assert_eq!(
            classify("MyLed_HUB75E.ino.bin", PROJECT),
            Some(Segment::Application)
        );
        assert_eq!(classify("spiffs.bin", PROJECT), None);
    }

    #[test]
    fn test_boot_app0_is_not_mistaken_for_bootloader() {
        assert_eq!(classify("boot_app0.bin", PROJECT), Some(Segment::BootApp0));
        assert_eq!(
            classify("bootloader_qio_80m.bin", PROJECT),
            Some(Segment::Bootloader)
        );
    }

    #[test]
    fn test_resolve_all_segments_from_output_dir() {
        let out = tempdir().unwrap();
        for name in [
            "bootloader.bin",
            "partitions.bin",
            "boot_app0.bin",
            "myled_hub75e.ino.bin",
        ] {
            fs::write(out.path().join(name), b"x").unwrap();
        }

        let plan = resolve_segments(out.path(), PROJECT, None).unwrap();
        assert_eq!(plan.bootloader, out.path().join("bootloader.bin"));
        assert_eq!(plan.partitions, out.path().join("partitions.bin"));
        assert_eq!(plan.boot_app0, out.path().join("boot_app0.bin"));
        assert_eq!(plan.application, out.path().join("myled_hub75e.ino.bin"));
        assert_eq!(plan.output, out.path().join("myled_hub75e_complete.bin"));
    }

    #[test]
    fn test_fallback_fills_stock_segments_only() {
        let out = tempdir().unwrap();
        let sdk = tempdir().unwrap();
        fs::write(out.path().join("myled_hub75e.ino.bin"), b"app").unwrap();
        for name in ["bootloader_dio_80m.bin", "partitions_singleapp.bin", "boot_app0.bin"] {
            fs::write(sdk.path().join(name), b"x").unwrap();
        }

        let plan = resolve_segments(out.path(), PROJECT, Some(sdk.path())).unwrap();
        assert_eq!(plan.bootloader, sdk.path().join("bootloader_dio_80m.bin"));
        assert_eq!(plan.partitions, sdk.path().join("partitions_singleapp.bin"));
        assert_eq!(plan.boot_app0, sdk.path().join("boot_app0.bin"));
        assert_eq!(plan.application, out.path().join("myled_hub75e.ino.bin"));
    }

    #[test]
    fn test_fallback_does_not_override_output_dir() {
        let out = tempdir().unwrap();
        let sdk = tempdir().unwrap();
        for name in ["bootloader.bin", "partitions.bin", "boot_app0.bin", "myled_hub75e.bin"] {
            fs::write(out.path().join(name), b"from-build").unwrap();
        }
        fs::write(sdk.path().join("bootloader.bin"), b"stock").unwrap();

        let plan = resolve_segments(out.path(), PROJECT, Some(sdk.path())).unwrap();
        assert_eq!(plan.bootloader, out.path().join("bootloader.bin"));
    }

    #[test]
    fn test_missing_application_is_never_filled_from_fallback() {
        let out = tempdir().unwrap();
        let sdk = tempdir().unwrap();
        for name in ["bootloader.bin", "partitions.bin", "boot_app0.bin"] {
            fs::write(out.path().join(name), b"x").unwrap();
        }
        // Even a file matching the project name in the fallback directory
        // must not be treated as the application.
        fs::write(sdk.path().join("myled_hub75e.ino.bin"), b"stray").unwrap();

        let err = resolve_segments(out.path(), PROJECT, Some(sdk.path())).unwrap_err();
        match err {
            PackError::MissingSegments(missing) => {
                assert_eq!(missing, vec![Segment::Application]);
            }
            other => panic!("Unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_segments_reported_in_flash_order() {
        let out = tempdir().unwrap();
        fs::write(out.path().join("partitions.bin"), b"x").unwrap();

        let err = resolve_segments(out.path(), PROJECT, None).unwrap_err();
        match err {
            PackError::MissingSegments(missing) => {
                assert_eq!(
                    missing,
                    vec![Segment::Bootloader, Segment::BootApp0, Segment::Application]
                );
            }
            other => panic!("Unexpected error: {}", other),
        }
    }

    #[test]
    fn test_tool_args_shape_is_fixed() {
        let plan = MergePlan {
            bootloader: PathBuf::from("bl.bin"),
            partitions: PathBuf::from("pt.bin"),
            boot_app0: PathBuf::from("ba.bin"),
            application: PathBuf::from("app.bin"),
            output: PathBuf::from("out/complete.bin"),
        };

        let expected: Vec<OsString> = [
            "--chip",
            "esp32",
            "merge_bin",
            "-o",
            "out/complete.bin",
            "--flash_mode",
            "dio",
            "--flash_freq",
            "80m",
            "--flash_size",
            "4MB",
            "0x1000",
            "bl.bin",
            "0x8000",
            "pt.bin",
            "0xe000",
            "ba.bin",
            "0x10000",
            "app.bin",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        assert_eq!(plan.tool_args(), expected);
    }
}
