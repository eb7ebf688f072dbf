//! Dataset export: paired image and caption files on disk.
//!
//! Layout under the target directory:
//!
//! ```text
//! images/{prefix}_001.png     captions/{prefix}_001.txt
//! images/{prefix}_002.png     captions/{prefix}_002.txt
//! ```
//!
//! `prefix` is the first word of the trigger label reduced to ASCII
//! alphanumerics, `-` and `_`; numbering follows generation order (oldest
//! is 001).

use std::fs;
use std::path::Path;

use image::ImageFormat;
use tracing::info;

use crate::artifact::GeneratedArtifact;
use crate::error::Result;

const FALLBACK_PREFIX: &str = "img";

/// File stem prefix derived from the trigger label. Never contains a path
/// separator or a dot.
pub fn file_prefix(trigger: &str) -> String {
    trigger
        .split_whitespace()
        .next()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
                .collect::<String>()
        })
        .filter(|prefix| !prefix.is_empty())
        .unwrap_or_else(|| FALLBACK_PREFIX.to_string())
}

fn extension_for(mime_type: &str) -> &'static str {
    ImageFormat::from_mime_type(mime_type)
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("png")
}

/// Write `artifacts` (newest first, as held by the store) under `dir`.
///
/// Returns the number of image/caption pairs written.
pub fn export_dataset(artifacts: &[GeneratedArtifact], trigger: &str, dir: &Path) -> Result<usize> {
    let images = dir.join("images");
    let captions = dir.join("captions");
    fs::create_dir_all(&images)?;
    fs::create_dir_all(&captions)?;

    let prefix = file_prefix(trigger);
    for (index, artifact) in artifacts.iter().rev().enumerate() {
        let stem = format!("{prefix}_{:03}", index + 1);
        let ext = extension_for(artifact.image.mime_type());
        fs::write(images.join(format!("{stem}.{ext}")), artifact.image.bytes())?;
        fs::write(captions.join(format!("{stem}.txt")), &artifact.caption)?;
    }

    info!(count = artifacts.len(), dir = %dir.display(), "Dataset exported");
    Ok(artifacts.len())
}
