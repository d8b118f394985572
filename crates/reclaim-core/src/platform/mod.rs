#[cfg(target_os = "windows")]
pub mod windows;

use std::fs::Metadata;

/// True for symlinks and, on Windows, for any entry carrying the reparse-point
/// attribute (junctions, mount points, cloud placeholders).
#[cfg(target_os = "windows")]
pub fn is_link_like(metadata: &Metadata) -> bool {
    metadata.file_type().is_symlink() || windows::is_reparse_point(metadata)
}

#[cfg(not(target_os = "windows"))]
pub fn is_link_like(metadata: &Metadata) -> bool {
    metadata.file_type().is_symlink()
}
