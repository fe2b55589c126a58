//! Cache configuration.
//!
//! A [`CacheConfig`] enumerates every recognised option with its default and
//! is validated once, when the [`StylesheetCache`](crate::StylesheetCache) is
//! built. It never changes afterwards.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::render::{LesscRenderer, RenderOptions, Renderer};
use crate::types::{CacheError, CacheResult};

/// Highest optimization level the compiler understands.
pub const MAX_OPTIMIZATION: u8 = 2;

/// Immutable configuration for a [`StylesheetCache`](crate::StylesheetCache).
#[derive(Clone)]
pub struct CacheConfig {
    src: PathBuf,
    dest: Option<PathBuf>,
    force: bool,
    debug: bool,
    once: bool,
    compress: bool,
    optimization: u8,
    paths: Vec<PathBuf>,
    prefix: Option<String>,
    render: Arc<dyn Renderer>,
}

impl CacheConfig {
    /// Start a configuration rooted at `src`. Every other option takes its
    /// default: `dest = src`, no force, no debug, no compression,
    /// optimization 0, and the `lessc` renderer.
    pub fn new(src: impl Into<PathBuf>) -> Self {
        Self {
            src: src.into(),
            dest: None,
            force: false,
            debug: false,
            once: false,
            compress: false,
            optimization: 0,
            paths: Vec::new(),
            prefix: None,
            render: Arc::new(LesscRenderer::new()),
        }
    }

    pub fn dest(mut self, dest: impl Into<PathBuf>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    /// Recompile on every request regardless of modification times.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Log every decision point. Never changes control flow.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Check each source for staleness only once per process.
    pub fn once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn optimization(mut self, level: u8) -> Self {
        self.optimization = level;
        self
    }

    /// Extra directories searched when resolving `@import`s.
    pub fn paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// URL prefix stripped from request paths before they are mapped.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_end_matches('/');
        self.prefix = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    /// Replace the compiler invocation.
    pub fn render(mut self, render: Arc<dyn Renderer>) -> Self {
        self.render = render;
        self
    }

    /// Check the configuration before it is put to use.
    pub fn validate(&self) -> CacheResult<()> {
        if self.src.as_os_str().is_empty() {
            return Err(CacheError::Config("`src` is required".to_string()));
        }
        if !self.src.is_dir() {
            return Err(CacheError::Config(format!(
                "`src` is not a directory: {}",
                self.src.display()
            )));
        }
        if let Some(dest) = &self.dest {
            if dest.as_os_str().is_empty() {
                return Err(CacheError::Config("`dest` must not be empty".to_string()));
            }
        }
        if self.optimization > MAX_OPTIMIZATION {
            return Err(CacheError::Config(format!(
                "`optimization` must be between 0 and {MAX_OPTIMIZATION}, got {}",
                self.optimization
            )));
        }
        if let Some(prefix) = &self.prefix {
            if !prefix.starts_with('/') {
                return Err(CacheError::Config(format!(
                    "`prefix` must start with '/', got {prefix:?}"
                )));
            }
        }
        Ok(())
    }

    pub fn src_root(&self) -> &Path {
        &self.src
    }

    /// Destination root; defaults to the source root.
    pub fn dest_root(&self) -> &Path {
        self.dest.as_deref().unwrap_or(&self.src)
    }

    pub fn is_force(&self) -> bool {
        self.force
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn is_once(&self) -> bool {
        self.once
    }

    pub fn url_prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.render
    }

    /// Compiler options derived from this configuration.
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            compress: self.compress,
            optimization: self.optimization,
            paths: self.paths.clone(),
        }
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("src", &self.src)
            .field("dest", &self.dest_root())
            .field("force", &self.force)
            .field("debug", &self.debug)
            .field("once", &self.once)
            .field("compress", &self.compress)
            .field("optimization", &self.optimization)
            .field("paths", &self.paths)
            .field("prefix", &self.prefix)
            .field("render", &self.render.name())
            .finish()
    }
}
