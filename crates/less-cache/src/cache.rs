//! The compile pipeline that sits behind every stylesheet request.
//!
//! `StylesheetCache` ties together the path mapper, dependency registry,
//! freshness evaluator, renderer and writer. It knows nothing about HTTP
//! beyond the method names it is asked to handle.
//!
//! ## Concurrency
//!
//! Requests for different destinations never wait on each other. Requests
//! for the same destination are single-flighted: each takes a per-destination
//! lock and re-evaluates freshness once it holds it, so a request that waited
//! on a compile serves that compile's output instead of repeating it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::CacheConfig;
use crate::freshness::needs_compile;
use crate::paths::PathMapper;
use crate::registry::DependencyRegistry;
use crate::types::{
    CacheError, CacheResult, CompileRequest, Dependency, Freshness, Outcome, Reason,
};
use crate::writer;

/// Target used for decision logging when `debug` is enabled.
pub const DEBUG_TARGET: &str = "less_cache::debug";

/// Counters describing what the cache has done since it was created.
#[derive(Debug, Default)]
struct Counters {
    compiled: AtomicU64,
    fresh: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub compiled: u64,
    pub fresh: u64,
    pub failed: u64,
    pub recorded_sources: usize,
    pub in_flight: usize,
}

/// Request-time LESS compilation cache.
pub struct StylesheetCache {
    config: CacheConfig,
    mapper: PathMapper,
    registry: Arc<DependencyRegistry>,
    in_flight: DashMap<PathBuf, Arc<Mutex<()>>>,
    checked: DashSet<PathBuf>,
    counters: Counters,
}

impl StylesheetCache {
    /// Validate `config` and build a cache with a fresh registry.
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        Self::with_registry(config, Arc::new(DependencyRegistry::new()))
    }

    /// Build a cache around an existing registry.
    pub fn with_registry(
        config: CacheConfig,
        registry: Arc<DependencyRegistry>,
    ) -> CacheResult<Self> {
        config.validate()?;
        let mapper = PathMapper::new(config.src_root(), config.dest_root())
            .with_prefix(config.url_prefix());

        tracing::info!(
            "LESS cache ready: src={} dest={} renderer={}",
            config.src_root().display(),
            config.dest_root().display(),
            config.renderer().name()
        );

        Ok(Self {
            config,
            mapper,
            registry,
            in_flight: DashMap::new(),
            checked: DashSet::new(),
            counters: Counters::default(),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DependencyRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            compiled: self.counters.compiled.load(Ordering::Relaxed),
            fresh: self.counters.fresh.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            recorded_sources: self.registry.len(),
            in_flight: self.in_flight.len(),
        }
    }

    /// Forget everything learned since startup, as a restart would.
    pub fn reset(&self) {
        self.registry.clear();
        self.checked.clear();
    }

    /// Map a request path onto a compile request.
    pub fn resolve(&self, request_path: &str) -> CacheResult<CompileRequest> {
        let paths = self.mapper.resolve(request_path)?;
        Ok(CompileRequest {
            request_path: request_path.to_string(),
            source: paths.source,
            dest: paths.dest,
            force: self.config.is_force(),
            debug: self.config.is_debug(),
        })
    }

    /// Handle one request.
    ///
    /// Returns `Ok(None)` when the request is not ours to handle: a method
    /// other than GET/HEAD, a path that is not a stylesheet or escapes the
    /// roots, or a stylesheet without a source file. No I/O happens for the
    /// first two.
    pub async fn handle(&self, method: &str, request_path: &str) -> CacheResult<Option<Outcome>> {
        if !matches!(method, "GET" | "HEAD") || !PathMapper::is_stylesheet(request_path) {
            return Ok(None);
        }

        let request = match self.resolve(request_path) {
            Ok(request) => request,
            Err(e) if e.is_pass_through() => {
                tracing::debug!("passing through {request_path}: {e}");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match self.serve(&request).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) if e.is_pass_through() => {
                self.log_decision(&request, "pass-through", None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Evaluate freshness without compiling.
    pub async fn check(&self, request: &CompileRequest) -> CacheResult<Freshness> {
        needs_compile(&self.registry, &request.source, &request.dest, request.force).await
    }

    /// Bring the destination of `request` up to date.
    pub async fn serve(&self, request: &CompileRequest) -> CacheResult<Outcome> {
        if self.config.is_once() && !request.force && self.checked.contains(&request.source) {
            self.log_decision(request, "skip (already checked)", None);
            self.counters.fresh.fetch_add(1, Ordering::Relaxed);
            return Ok(Outcome::Fresh);
        }

        let lock = self.lock_for(&request.dest);
        let result = {
            let _guard = lock.lock().await;
            self.serve_locked(request).await
        };
        drop(lock);
        self.release(&request.dest);

        if result.as_ref().is_err_and(|e| !e.is_pass_through()) {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn serve_locked(&self, request: &CompileRequest) -> CacheResult<Outcome> {
        let freshness = self.check(request).await?;

        let outcome = match freshness {
            Freshness::Fresh => {
                self.log_decision(request, "serve cached", None);
                self.counters.fresh.fetch_add(1, Ordering::Relaxed);
                Outcome::Fresh
            }
            Freshness::Stale(reason) => {
                self.log_decision(request, "compile", Some(reason));
                self.compile(request).await?;
                self.counters.compiled.fetch_add(1, Ordering::Relaxed);
                Outcome::Compiled(reason)
            }
        };

        if self.config.is_once() {
            self.checked.insert(request.source.clone());
        }
        Ok(outcome)
    }

    async fn compile(&self, request: &CompileRequest) -> CacheResult<()> {
        let source = &request.source;
        let source_error = |e: std::io::Error| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CacheError::SourceNotFound(source.clone())
            } else {
                CacheError::io(source, e)
            }
        };

        // Stamp the source before reading it; a later edit must look newer.
        let stamped = tokio::fs::metadata(source)
            .await
            .and_then(|meta| meta.modified())
            .map_err(source_error)?;
        let text = tokio::fs::read_to_string(source).await.map_err(source_error)?;

        let output = self
            .config
            .renderer()
            .render(&text, source, &self.config.render_options())
            .await
            .map_err(|e| {
                // No record after a failed compile: the next request retries.
                self.registry.forget(source);
                let err = CacheError::from_render(source, e);
                tracing::warn!("{err}");
                err
            })?;

        writer::write(&request.dest, &output.css).await?;

        tracing::info!(
            "compiled {} -> {} ({} bytes, {} imports)",
            source.display(),
            request.dest.display(),
            output.css.len(),
            output.dependencies.iter().filter(|d| !d.is_absent()).count()
        );
        let mut dependencies = output.dependencies;
        dependencies.insert(Dependency::new(source, stamped));
        self.registry.record(source, dependencies);
        Ok(())
    }

    fn lock_for(&self, dest: &Path) -> Arc<Mutex<()>> {
        let entry = self
            .in_flight
            .entry(dest.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())));
        Arc::clone(entry.value())
    }

    /// Drop the lock entry for `dest` once nobody else holds it.
    fn release(&self, dest: &Path) {
        self.in_flight
            .remove_if(dest, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn log_decision(&self, request: &CompileRequest, action: &str, reason: Option<Reason>) {
        if request.debug {
            tracing::info!(
                target: DEBUG_TARGET,
                source = %request.source.display(),
                dest = %request.dest.display(),
                ?reason,
                "{}: {action}",
                request.request_path
            );
        } else {
            tracing::trace!("{} {action} ({reason:?})", request.request_path);
        }
    }
}
