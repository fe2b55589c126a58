//! Dependency registry — which files each compiled source depends on.
//!
//! Records live for the lifetime of the owning cache. They are never
//! persisted, so a restart forces every source to be compiled again on its
//! first request.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use crate::types::{DependencySet, SharedDependencies};

/// In-memory map from absolute source path to its recorded dependencies.
///
/// Each record is swapped in as a single `Arc`, so a reader sees either the
/// previous set or the new one, never a partially filled set.
#[derive(Debug, Default)]
pub struct DependencyRegistry {
    records: DashMap<PathBuf, SharedDependencies>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the dependencies of `source`.
    pub fn record(&self, source: &Path, deps: DependencySet) {
        tracing::trace!(
            "recording {} dependencies for {}",
            deps.len(),
            source.display()
        );
        self.records.insert(source.to_path_buf(), Arc::new(deps));
    }

    /// Dependencies of `source`, or `None` if it has never been compiled.
    pub fn lookup(&self, source: &Path) -> Option<SharedDependencies> {
        self.records.get(source).map(|entry| Arc::clone(entry.value()))
    }

    /// Drop the record for one source so its next request recompiles.
    pub fn forget(&self, source: &Path) -> bool {
        self.records.remove(source).is_some()
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Dependency;
    use std::time::{Duration, SystemTime};

    fn deps(paths: &[&str]) -> DependencySet {
        paths
            .iter()
            .map(|p| Dependency::new(*p, SystemTime::UNIX_EPOCH))
            .collect()
    }

    #[test]
    fn test_lookup_absent() {
        let registry = DependencyRegistry::new();
        assert!(registry.lookup(Path::new("/src/a.less")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_record_and_replace() {
        let registry = DependencyRegistry::new();
        let source = Path::new("/src/a.less");
        registry.record(source, deps(&["/src/vars.less"]));
        let first = registry.lookup(source).unwrap();
        assert_eq!(first.len(), 1);

        registry.record(source, deps(&["/src/vars.less", "/src/mixins.less"]));
        let second = registry.lookup(source).unwrap();
        assert_eq!(second.len(), 2);
        // Readers holding the old record keep a consistent view.
        assert_eq!(first.len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_set_is_still_a_record() {
        let registry = DependencyRegistry::new();
        registry.record(Path::new("/src/a.less"), DependencySet::new());
        assert!(registry.lookup(Path::new("/src/a.less")).is_some());
    }

    #[test]
    fn test_forget_and_clear() {
        let registry = DependencyRegistry::new();
        registry.record(Path::new("/src/a.less"), deps(&[]));
        registry.record(Path::new("/src/b.less"), deps(&[]));
        assert!(registry.forget(Path::new("/src/a.less")));
        assert!(!registry.forget(Path::new("/src/a.less")));
        assert_eq!(registry.len(), 1);
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_writers_leave_complete_sets() {
        let registry = Arc::new(DependencyRegistry::new());
        let source = PathBuf::from("/src/a.less");
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let source = source.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let set: DependencySet = (0..=i)
                            .map(|n| {
                                Dependency::new(
                                    format!("/src/dep{n}.less"),
                                    SystemTime::UNIX_EPOCH + Duration::from_secs(i as u64),
                                )
                            })
                            .collect();
                        registry.record(&source, set);
                        let seen = registry.lookup(&source).unwrap();
                        let stamp = seen.iter().next().unwrap().mtime;
                        assert!(seen.iter().all(|d| d.mtime == stamp));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 1);
    }
}
