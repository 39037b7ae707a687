// FlashPack - ESP32 Firmware Image Packaging Tool
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info, warn};

use flashpack::{artifacts, discovery, esptool, PackError, OUTPUT_DIR, PROJECT_NAME};

const EXIT_OK: u8 = 0;
const EXIT_FAIL: u8 = 1;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Packaging flash image for {}", PROJECT_NAME);

    // esptool does the actual merging; without it there is nothing to do.
    if !esptool::is_available() {
        error!("esptool not found; install it first: pip install esptool");
        return ExitCode::from(EXIT_FAIL);
    }

    let output_dir = Path::new(OUTPUT_DIR);
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        error!("Failed to create output directory {:?}: {}", output_dir, e);
        return ExitCode::from(EXIT_FAIL);
    }
    info!("Output directory: {:?}", output_dir);

    info!("Looking for Arduino build output...");
    let Some(build_dir) = discovery::find_latest_build() else {
        error!("No Arduino build output found; compile the sketch in the Arduino IDE first");
        return ExitCode::from(EXIT_FAIL);
    };
    info!("Found build output: {:?}", build_dir);

    match artifacts::copy_binaries(&build_dir, output_dir) {
        Ok(copied) => info!("Copied {} file(s) to {:?}", copied.len(), output_dir),
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_FAIL);
        }
    }

    // A failed merge downgrades the run but never aborts it; the copied
    // artifacts are a usable result on their own.
    if merge_image(output_dir) {
        print_summary(output_dir);
    } else {
        warn!("Merged image was not produced; the individual artifacts were still copied");
    }

    ExitCode::from(EXIT_OK)
}

/// Resolves the four flash segments and runs `esptool merge_bin`. Returns
/// whether the merged image was written.
fn merge_image(output_dir: &Path) -> bool {
    info!("Generating the combined flash image...");

    let fallback = discovery::find_sdk_bin_dir();
    let plan = match esptool::resolve_segments(output_dir, PROJECT_NAME, fallback.as_deref()) {
        Ok(plan) => plan,
        Err(PackError::MissingSegments(missing)) => {
            warn!("Cannot merge, required segment file(s) not found:");
            for segment in &missing {
                warn!("  missing: {}", segment);
            }
            return false;
        }
        Err(e) => {
            error!("Cannot merge: {}", e);
            return false;
        }
    };

    match plan.run() {
        Ok(()) => {
            info!("Merged image written to {:?}", plan.output);
            true
        }
        Err(e) => {
            error!("{}", e);
            false
        }
    }
}

/// Prints the produced `.bin` files with their sizes plus an example flash
/// command. Best-effort: listing failures are ignored.
fn print_summary(output_dir: &Path) {
    let Ok(entries) = std::fs::read_dir(output_dir) else {
        return;
    };

    let mut files: Vec<_> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "bin"))
        .collect();
    files.sort();

    println!("Generated files in {}:", output_dir.display());
    for path in &files {
        let size = std::fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);
        if let Some(name) = path.file_name() {
            println!("- {} ({} bytes)", name.to_string_lossy(), size);
        }
    }

    let image = output_dir.join(format!("{}_complete.bin", PROJECT_NAME));
    println!();
    println!("Flash the combined image with:");
    println!(
        "  python -m esptool --chip esp32 --port <PORT> --baud 921600 write_flash 0x0 {}",
        image.display()
    );
}
