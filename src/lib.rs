// FlashPack - ESP32 Firmware Image Packaging Tool
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

#![deny(missing_docs)]

//! # FlashPack
//!
//! Collects the `.bin` artifacts the Arduino IDE leaves behind after
//! compiling an ESP32 sketch, copies them into a local output directory,
//! and drives `esptool merge_bin` to fold the four flash segments into a
//! single image flashable at offset 0x0.
//!
//! The actual image assembly is done by `esptool`; this crate only
//! discovers files and builds the merge invocation.

pub mod artifacts;
pub mod discovery;
pub mod esptool;

use std::path::PathBuf;
use thiserror::Error;

/// Name of the Arduino sketch this tool packages. The application segment
/// is recognized by this substring, and the merged image is named after it.
pub const PROJECT_NAME: &str = "myled_hub75e";

/// Directory, relative to the working directory, that receives the artifact
/// copies and the merged image.
pub const OUTPUT_DIR: &str = "bin_output";

/// Errors that can occur while collecting or merging artifacts.
#[derive(Error, Debug)]
pub enum PackError {
    /// IO error during scanning or copying.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The build directory contained no `.bin` files at all.
    #[error("no .bin files found in {}", dir.display())]
    NoBinaries {
        /// The directory that was scanned.
        dir: PathBuf,
    },
    /// One or more merge segments could not be located.
    #[error("missing segment file(s): {}", format_segments(.0))]
    MissingSegments(
        /// The segments that stayed unresolved, in flash order.
        Vec<esptool::Segment>,
    ),
    /// `esptool merge_bin` exited with a nonzero status.
    #[error("esptool merge_bin failed: {stderr}")]
    MergeFailed {
        /// Exit code reported by esptool, if it exited at all.
        code: Option<i32>,
        /// Captured stderr, verbatim.
        stderr: String,
    },
}

/// Result type for flashpack operations.
pub type Result<T> = std::result::Result<T, PackError>;

fn format_segments(segments: &[esptool::Segment]) -> String {
    segments
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
