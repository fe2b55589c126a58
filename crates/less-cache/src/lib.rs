//! less-cache — request-time LESS compilation with staleness tracking.
//!
//! Maps stylesheet requests onto `.less` sources, decides whether the cached
//! `.css` is still valid (including transitive imports), and recompiles and
//! persists it when it is not.

pub mod cache;
pub mod config;
pub mod freshness;
pub mod imports;
pub mod paths;
pub mod registry;
pub mod render;
pub mod types;
pub mod writer;

pub use cache::{CacheStats, StylesheetCache, DEBUG_TARGET};
pub use config::CacheConfig;
pub use freshness::needs_compile;
pub use imports::{parse_imports, ImportScanner};
pub use paths::{PathMapper, ResolvedPaths};
pub use registry::DependencyRegistry;
pub use render::{find_lessc, LesscRenderer, RenderOptions, RenderOutput, Renderer};
pub use types::*;
