//! Core data types for compile requests, dependencies and errors.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;

/// Extension of the files served to clients.
pub const OUTPUT_EXT: &str = "css";

/// Extension of the stylesheet sources.
pub const SOURCE_EXT: &str = "less";

/// A file a source depends on, stamped with the mtime observed when it was
/// last compiled. `mtime` is `None` for a file that did not exist then.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub path: PathBuf,
    pub mtime: Option<SystemTime>,
}

impl Dependency {
    pub fn new(path: impl Into<PathBuf>, mtime: SystemTime) -> Self {
        Self {
            path: path.into(),
            mtime: Some(mtime),
        }
    }

    /// A file whose later appearance should trigger a rebuild.
    pub fn absent(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mtime: None,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.mtime.is_none()
    }
}

/// The files one compiled stylesheet was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet {
    deps: Vec<Dependency>,
}

impl DependencySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dependency, replacing any earlier entry for the same path.
    pub fn insert(&mut self, dep: Dependency) {
        match self.deps.iter_mut().find(|d| d.path == dep.path) {
            Some(existing) => existing.mtime = dep.mtime,
            None => self.deps.push(dep),
        }
    }

    /// Whether the set holds an entry for `path`.
    pub fn contains(&self, path: &Path) -> bool {
        self.deps.iter().any(|d| d.path == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dependency> {
        self.deps.iter()
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }
}

impl FromIterator<Dependency> for DependencySet {
    fn from_iter<I: IntoIterator<Item = Dependency>>(iter: I) -> Self {
        let mut set = DependencySet::new();
        for dep in iter {
            set.insert(dep);
        }
        set
    }
}

/// Shared, immutable view of a recorded dependency set.
pub type SharedDependencies = Arc<DependencySet>;

/// A single request to bring one stylesheet up to date.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    /// The URL path as requested, e.g. `/css/site.css`.
    pub request_path: String,
    pub source: PathBuf,
    pub dest: PathBuf,
    pub force: bool,
    pub debug: bool,
}

/// Why a stylesheet has to be (re)compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// `force` is set.
    Forced,
    /// No dependency record exists for the source yet.
    Unrecorded,
    /// The compiled output does not exist.
    MissingOutput,
    /// The source is newer than the compiled output.
    SourceModified,
    /// An imported file changed since the last compile.
    DependencyModified,
    /// An imported file disappeared since the last compile.
    DependencyMissing,
}

/// Result of a freshness evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Stale(Reason),
}

impl Freshness {
    pub fn needs_compile(&self) -> bool {
        matches!(self, Freshness::Stale(_))
    }
}

/// What the pipeline did for a request that it handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The cached artifact was already up to date.
    Fresh,
    /// The stylesheet was compiled and written to its destination.
    Compiled(Reason),
}

/// Errors produced by a [`Renderer`](crate::render::Renderer).
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// The compiler rejected the source (syntax error, missing import, ...).
    #[error("{0}")]
    Compile(String),

    /// The compiler could not be started.
    #[error("Compiler unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while serving a stylesheet.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// The request path does not name a compiled stylesheet.
    #[error("Not a stylesheet: {0}")]
    NotStylesheet(String),

    /// The request path would resolve outside the configured roots.
    #[error("Path escapes root: {0}")]
    PathEscapesRoot(String),

    /// No source file exists for the requested stylesheet.
    #[error("Source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Compile error in {}: {message}", path.display())]
    Compile { path: PathBuf, message: String },

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CacheError {
    /// Whether the error means "this request is not ours" rather than a
    /// failure that should be reported.
    pub fn is_pass_through(&self) -> bool {
        matches!(
            self,
            CacheError::NotStylesheet(_)
                | CacheError::PathEscapesRoot(_)
                | CacheError::SourceNotFound(_)
        )
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Wrap a renderer failure for `path`.
    ///
    /// The source text is read before rendering, so an I/O error here comes
    /// from something the compile touched (an import, the compiler's pipes)
    /// and is reported, never turned into a pass-through.
    pub(crate) fn from_render(path: &Path, err: RenderError) -> Self {
        match err {
            RenderError::Io(e) => CacheError::io(path, e),
            other => CacheError::Compile {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        }
    }
}

/// Convenience result type.
pub type CacheResult<T> = Result<T, CacheError>;
