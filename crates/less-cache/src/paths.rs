//! Request path → source / destination path mapping.
//!
//! Pure string and path composition, no I/O. Request paths are percent
//! decoded and normalised segment by segment; anything that would leave the
//! configured roots is rejected.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;

use crate::types::{CacheError, CacheResult, OUTPUT_EXT, SOURCE_EXT};

/// Where a requested stylesheet comes from and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub source: PathBuf,
    pub dest: PathBuf,
}

/// Maps request paths onto the source and destination roots.
#[derive(Debug, Clone)]
pub struct PathMapper {
    src_root: PathBuf,
    dest_root: PathBuf,
    prefix: Option<String>,
}

impl PathMapper {
    pub fn new(src_root: impl Into<PathBuf>, dest_root: impl Into<PathBuf>) -> Self {
        Self {
            src_root: src_root.into(),
            dest_root: dest_root.into(),
            prefix: None,
        }
    }

    /// Only map request paths below `prefix`, with the prefix removed.
    pub fn with_prefix(mut self, prefix: Option<&str>) -> Self {
        self.prefix = prefix.map(str::to_string);
        self
    }

    /// Whether a request path names a compiled stylesheet at all.
    pub fn is_stylesheet(request_path: &str) -> bool {
        request_path
            .rsplit_once('.')
            .is_some_and(|(stem, ext)| ext == OUTPUT_EXT && !stem.ends_with('/'))
    }

    /// Resolve a request path such as `/css/site.css`.
    pub fn resolve(&self, request_path: &str) -> CacheResult<ResolvedPaths> {
        if !Self::is_stylesheet(request_path) {
            return Err(CacheError::NotStylesheet(request_path.to_string()));
        }

        let local = match &self.prefix {
            Some(prefix) => request_path
                .strip_prefix(prefix.as_str())
                .filter(|rest| rest.starts_with('/'))
                .ok_or_else(|| CacheError::NotStylesheet(request_path.to_string()))?,
            None => request_path,
        };

        let decoded = percent_decode_str(local)
            .decode_utf8()
            .map_err(|_| CacheError::PathEscapesRoot(request_path.to_string()))?;

        let segments = normalize(&decoded)
            .ok_or_else(|| CacheError::PathEscapesRoot(request_path.to_string()))?;

        let (file_name, dirs) = match segments.split_last() {
            Some(split) => split,
            None => return Err(CacheError::NotStylesheet(request_path.to_string())),
        };
        let stem = file_name
            .strip_suffix(OUTPUT_EXT)
            .and_then(|s| s.strip_suffix('.'))
            .ok_or_else(|| CacheError::NotStylesheet(request_path.to_string()))?;

        let relative_dir: PathBuf = dirs.iter().collect();
        let source_name = format!("{stem}.{SOURCE_EXT}");

        Ok(ResolvedPaths {
            source: self.src_root.join(&relative_dir).join(source_name),
            dest: self.dest_root.join(&relative_dir).join(file_name),
        })
    }

    pub fn src_root(&self) -> &Path {
        &self.src_root
    }

    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }
}

/// Collapse `.` and `..` segments. Returns `None` when the path climbs above
/// its root or carries characters that could be read as another root.
fn normalize(path: &str) -> Option<Vec<&str>> {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop()?;
            }
            s if s.contains(['\\', '\0']) => return None,
            s if cfg!(windows) && s.contains(':') => return None,
            s => out.push(s),
        }
    }
    Some(out)
}
