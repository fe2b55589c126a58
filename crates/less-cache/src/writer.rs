//! Persists compiled CSS to its destination path.

use std::path::Path;

use crate::types::{CacheError, CacheResult};

/// Write `css` to `dest`, creating any missing parent directories.
///
/// Overwrites are idempotent, so a failed write leaves nothing to clean up:
/// the next request for the same stylesheet simply writes again.
pub async fn write(dest: &Path, css: &str) -> CacheResult<()> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CacheError::io(parent, e))?;
    }
    tokio::fs::write(dest, css)
        .await
        .map_err(|e| CacheError::io(dest, e))
}
