use std::path::Path;

use anyhow::Context;
use impscope::MappedImage;

/// Lay a PE file out in its in-memory shape at its preferred base.
pub fn load_image(path: &Path) -> anyhow::Result<MappedImage> {
    MappedImage::from_file(path)
        .with_context(|| format!("failed to load image: {}", path.display()))
}

/// Format an address the way every command prints it.
pub fn format_address(address: u64) -> String {
    format!("0x{address:X}")
}

/// Extract a display-friendly filename from a path.
pub fn file_display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}
