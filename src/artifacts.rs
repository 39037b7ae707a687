// FlashPack - ESP32 Firmware Image Packaging Tool
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Copying build artifacts into the output directory.

use crate::{PackError, Result};
use std::path::Path;
use tracing::info;

/// Copies every `.bin` file from `src_dir` into `dest_dir`, overwriting
/// same-named files. Returns the copied file names, sorted for stable
/// logging.
///
/// Fails with [`PackError::NoBinaries`] when the source directory holds no
/// `.bin` files at all: a build directory without binaries means the sketch
/// never finished compiling.
pub fn copy_binaries(src_dir: &Path, dest_dir: &Path) -> Result<Vec<String>> {
    let mut copied = Vec::new();
    for entry in std::fs::read_dir(src_dir)? {
        let path = entry?.path();
        if !path.is_file() || !path.extension().is_some_and(|ext| ext == "bin") {
            continue;
        }
        let Some(name) = path.file_name() else {
            continue;
        };
        std::fs::copy(&path, dest_dir.join(name))?;
        info!("Copied {}", name.to_string_lossy());
        copied.push(name.to_string_lossy().into_owned());
    }

    if copied.is_empty() {
        return Err(PackError::NoBinaries {
            dir: src_dir.to_path_buf(),
        });
    }

    copied.sort();
    Ok(copied)
}
