//! Freshness evaluation — does a cached stylesheet have to be rebuilt?
//!
//! ## Decision order
//!
//! 1. `force` always rebuilds.
//! 2. A source without a dependency record always rebuilds (first request
//!    since the process started).
//! 3. Source and destination are stat'ed. A missing source is reported as
//!    [`CacheError::SourceNotFound`]; a missing destination rebuilds; any
//!    other stat failure is a hard error.
//! 4. A source newer than its destination rebuilds.
//! 5. Every recorded dependency is re-stat'ed: a missing one, or one newer
//!    than the mtime recorded at the last compile, rebuilds. The record
//!    holds the source itself (stamped before it was read), so an edit that
//!    lands while a compile runs is caught here. Optional imports that did
//!    not exist are recorded as absent and rebuild once they appear.

use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;

use crate::registry::DependencyRegistry;
use crate::types::{CacheError, CacheResult, Dependency, Freshness, Reason};

/// Decide whether `source` must be compiled into `dest`.
pub async fn needs_compile(
    registry: &DependencyRegistry,
    source: &Path,
    dest: &Path,
    force: bool,
) -> CacheResult<Freshness> {
    if force {
        return Ok(Freshness::Stale(Reason::Forced));
    }

    let deps = match registry.lookup(source) {
        Some(deps) => deps,
        None => return Ok(Freshness::Stale(Reason::Unrecorded)),
    };

    let (source_meta, dest_meta) = tokio::join!(tokio::fs::metadata(source), tokio::fs::metadata(dest));

    let source_mtime = match source_meta {
        Ok(meta) => modified(source, &meta)?,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(CacheError::SourceNotFound(source.to_path_buf()))
        }
        Err(e) => return Err(CacheError::io(source, e)),
    };

    let dest_mtime = match dest_meta {
        Ok(meta) => modified(dest, &meta)?,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(Freshness::Stale(Reason::MissingOutput))
        }
        Err(e) => return Err(CacheError::io(dest, e)),
    };

    if source_mtime > dest_mtime {
        return Ok(Freshness::Stale(Reason::SourceModified));
    }

    for dep in deps.iter() {
        let current = match tokio::fs::metadata(&dep.path).await {
            Ok(meta) => Some(modified(&dep.path, &meta)?),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(CacheError::io(&dep.path, e)),
        };
        if let Some(reason) = dependency_change(dep, current, source) {
            tracing::trace!("{reason:?}: {}", dep.path.display());
            return Ok(Freshness::Stale(reason));
        }
    }

    Ok(Freshness::Fresh)
}

/// Compare a recorded dependency with its current mtime (`None` if absent).
fn dependency_change(
    dep: &Dependency,
    current: Option<SystemTime>,
    source: &Path,
) -> Option<Reason> {
    match (dep.mtime, current) {
        (Some(recorded), Some(now)) if now > recorded => Some(if dep.path == source {
            Reason::SourceModified
        } else {
            Reason::DependencyModified
        }),
        (Some(_), None) => Some(Reason::DependencyMissing),
        (None, Some(_)) => Some(Reason::DependencyModified),
        _ => None,
    }
}

fn modified(path: &Path, meta: &std::fs::Metadata) -> CacheResult<SystemTime> {
    meta.modified().map_err(|e| CacheError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DependencySet;
    use std::fs::{self, File, FileTimes};
    use std::time::Duration;

    fn set_mtime(path: &Path, secs: u64) {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
        let file = File::options().write(true).open(path).unwrap();
        file.set_times(FileTimes::new().set_modified(time)).unwrap();
    }

    fn mtime(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        source: std::path::PathBuf,
        dest: std::path::PathBuf,
        import: std::path::PathBuf,
        registry: DependencyRegistry,
    }

    /// Source at t=1000, output at t=2000, one import at t=500, recorded.
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.less");
        let dest = dir.path().join("a.css");
        let import = dir.path().join("vars.less");
        fs::write(&source, "@import 'vars';").unwrap();
        fs::write(&dest, "body{}").unwrap();
        fs::write(&import, "@c: red;").unwrap();
        set_mtime(&source, 1000);
        set_mtime(&dest, 2000);
        set_mtime(&import, 500);

        let registry = DependencyRegistry::new();
        let deps: DependencySet = [Dependency::new(&import, mtime(500))].into_iter().collect();
        registry.record(&source, deps);

        Fixture {
            _dir: dir,
            source,
            dest,
            import,
            registry,
        }
    }

    #[tokio::test]
    async fn test_fresh_when_nothing_changed() {
        let f = fixture();
        let result = needs_compile(&f.registry, &f.source, &f.dest, false).await.unwrap();
        assert_eq!(result, Freshness::Fresh);
    }

    #[tokio::test]
    async fn test_force_always_compiles() {
        let f = fixture();
        let result = needs_compile(&f.registry, &f.source, &f.dest, true).await.unwrap();
        assert_eq!(result, Freshness::Stale(Reason::Forced));
    }

    #[tokio::test]
    async fn test_unrecorded_source_compiles() {
        let f = fixture();
        f.registry.clear();
        let result = needs_compile(&f.registry, &f.source, &f.dest, false).await.unwrap();
        assert_eq!(result, Freshness::Stale(Reason::Unrecorded));
    }

    #[tokio::test]
    async fn test_unrecorded_does_not_touch_filesystem() {
        let registry = DependencyRegistry::new();
        let result = needs_compile(
            &registry,
            Path::new("/definitely/not/here.less"),
            Path::new("/definitely/not/here.css"),
            false,
        )
        .await
        .unwrap();
        assert_eq!(result, Freshness::Stale(Reason::Unrecorded));
    }

    #[tokio::test]
    async fn test_missing_source_is_not_found() {
        let f = fixture();
        fs::remove_file(&f.source).unwrap();
        let err = needs_compile(&f.registry, &f.source, &f.dest, false).await.unwrap_err();
        assert!(matches!(err, CacheError::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_output_compiles() {
        let f = fixture();
        fs::remove_file(&f.dest).unwrap();
        let result = needs_compile(&f.registry, &f.source, &f.dest, false).await.unwrap();
        assert_eq!(result, Freshness::Stale(Reason::MissingOutput));
    }

    #[tokio::test]
    async fn test_newer_source_compiles() {
        let f = fixture();
        set_mtime(&f.source, 3000);
        let result = needs_compile(&f.registry, &f.source, &f.dest, false).await.unwrap();
        assert_eq!(result, Freshness::Stale(Reason::SourceModified));
    }

    #[tokio::test]
    async fn test_equal_mtimes_are_fresh() {
        let f = fixture();
        set_mtime(&f.source, 2000);
        let result = needs_compile(&f.registry, &f.source, &f.dest, false).await.unwrap();
        assert_eq!(result, Freshness::Fresh);
    }

    #[tokio::test]
    async fn test_modified_import_compiles() {
        let f = fixture();
        set_mtime(&f.import, 600);
        let result = needs_compile(&f.registry, &f.source, &f.dest, false).await.unwrap();
        assert_eq!(result, Freshness::Stale(Reason::DependencyModified));
    }

    #[tokio::test]
    async fn test_missing_import_compiles() {
        let f = fixture();
        fs::remove_file(&f.import).unwrap();
        let result = needs_compile(&f.registry, &f.source, &f.dest, false).await.unwrap();
        assert_eq!(result, Freshness::Stale(Reason::DependencyMissing));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dest_stat_error_is_hard_error() {
        let f = fixture();
        // A path through a regular file fails with ENOTDIR, not NotFound.
        let bad_dest = f.source.join("a.css");
        let err = needs_compile(&f.registry, &f.source, &bad_dest, false)
            .await
            .unwrap_err();
        match err {
            CacheError::Io { path, .. } => assert_eq!(path, bad_dest),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_source_edited_after_recording_compiles() {
        let f = fixture();
        // Recorded at t=1000, edited to t=1500: still older than the output.
        let deps: DependencySet = [
            Dependency::new(&f.import, mtime(500)),
            Dependency::new(&f.source, mtime(1000)),
        ]
        .into_iter()
        .collect();
        f.registry.record(&f.source, deps);
        set_mtime(&f.source, 1500);

        let result = needs_compile(&f.registry, &f.source, &f.dest, false).await.unwrap();
        assert_eq!(result, Freshness::Stale(Reason::SourceModified));
    }

    #[tokio::test]
    async fn test_absent_optional_import_appearing_compiles() {
        let f = fixture();
        let print = f.source.with_file_name("print.less");
        let deps: DependencySet = [
            Dependency::new(&f.import, mtime(500)),
            Dependency::absent(&print),
        ]
        .into_iter()
        .collect();
        f.registry.record(&f.source, deps);

        let result = needs_compile(&f.registry, &f.source, &f.dest, false).await.unwrap();
        assert_eq!(result, Freshness::Fresh);

        fs::write(&print, "@media print {}").unwrap();
        let result = needs_compile(&f.registry, &f.source, &f.dest, false).await.unwrap();
        assert_eq!(result, Freshness::Stale(Reason::DependencyModified));
    }
}
