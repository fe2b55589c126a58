//! Compiler abstraction.
//!
//! Defines the [`Renderer`] trait that turns LESS source text into CSS, and
//! the default [`LesscRenderer`] which shells out to the `lessc` executable.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::imports::ImportScanner;
use crate::types::{DependencySet, RenderError};

/// Options passed to every render call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Minify the output.
    pub compress: bool,
    /// Compiler optimization level (0, 1 or 2).
    pub optimization: u8,
    /// Extra `@import` search directories.
    pub paths: Vec<PathBuf>,
}

/// Compiled CSS plus the files the compile read.
#[derive(Debug, Clone, Default)]
pub struct RenderOutput {
    pub css: String,
    /// Transitive imports of the source. Empty when the renderer cannot tell,
    /// in which case only the source's own mtime drives staleness.
    pub dependencies: DependencySet,
}

impl RenderOutput {
    pub fn new(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            dependencies: DependencySet::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: DependencySet) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// Turns stylesheet source into CSS.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Compile `source`, read from `path`.
    async fn render(
        &self,
        source: &str,
        path: &Path,
        options: &RenderOptions,
    ) -> Result<RenderOutput, RenderError>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "custom"
    }
}

/// Find the `lessc` executable.
pub fn find_lessc() -> Option<PathBuf> {
    // 1. LESSC_PATH env
    if let Ok(p) = std::env::var("LESSC_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. project-local node_modules
    let local = PathBuf::from("node_modules/.bin/lessc");
    if local.exists() {
        return Some(local);
    }

    // 3. System PATH
    which::which("lessc").ok()
}

/// Renderer backed by the `lessc` command-line compiler.
///
/// The source text is piped on stdin; imports resolve against the source's
/// directory and the configured search paths. Dependencies come from
/// [`ImportScanner`], since `lessc` does not report them on stdout.
#[derive(Debug, Clone, Default)]
pub struct LesscRenderer {
    binary: Option<PathBuf>,
}

impl LesscRenderer {
    /// Locate `lessc` lazily on first use.
    pub fn new() -> Self {
        Self { binary: None }
    }

    /// Use a specific `lessc` binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: Some(binary.into()),
        }
    }

    fn binary(&self) -> Result<PathBuf, RenderError> {
        self.binary
            .clone()
            .or_else(find_lessc)
            .ok_or_else(|| {
                RenderError::Unavailable("lessc not found. Install it with `npm i -g less`.".into())
            })
    }

    /// Command-line arguments for one compile, excluding the binary.
    pub fn args(path: &Path, options: &RenderOptions) -> Vec<String> {
        let mut args = vec!["--no-color".to_string()];
        if options.compress {
            args.push("--compress".to_string());
        }
        if options.optimization > 0 {
            args.push(format!("-O{}", options.optimization));
        }

        let mut include: Vec<&Path> = Vec::new();
        if let Some(parent) = path.parent() {
            include.push(parent);
        }
        include.extend(options.paths.iter().map(PathBuf::as_path));
        if !include.is_empty() {
            let joined = std::env::join_paths(include)
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !joined.is_empty() {
                args.push(format!("--include-path={joined}"));
            }
        }

        args.push("-".to_string());
        args
    }
}

#[async_trait]
impl Renderer for LesscRenderer {
    async fn render(
        &self,
        source: &str,
        path: &Path,
        options: &RenderOptions,
    ) -> Result<RenderOutput, RenderError> {
        let binary = self.binary()?;
        let args = Self::args(path, options);
        tracing::debug!("{} {}", binary.display(), args.join(" "));

        // Imports are stamped before the compile starts.
        let scanner = ImportScanner::new(options.paths.clone());
        let dependencies = scanner.scan(path, source).await?;

        let mut cmd = tokio::process::Command::new(&binary);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            cmd.current_dir(parent);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| RenderError::Unavailable(format!("{}: {e}", binary.display())))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(source.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("lessc exited with {}", output.status)
            } else {
                stderr
            };
            return Err(RenderError::Compile(message));
        }

        let css = String::from_utf8(output.stdout)
            .map_err(|e| RenderError::Compile(format!("lessc produced invalid UTF-8: {e}")))?;

        Ok(RenderOutput { css, dependencies })
    }

    fn name(&self) -> &str {
        "lessc"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = LesscRenderer::args(Path::new("/src/a.less"), &RenderOptions::default());
        assert_eq!(args.first().map(String::as_str), Some("--no-color"));
        assert!(args.contains(&"--include-path=/src".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("-"));
        assert!(!args.iter().any(|a| a == "--compress"));
        assert!(!args.iter().any(|a| a.starts_with("-O")));
    }

    #[test]
    fn test_compress_and_optimization_args() {
        let options = RenderOptions {
            compress: true,
            optimization: 2,
            paths: vec![PathBuf::from("/lib")],
        };
        let args = LesscRenderer::args(Path::new("/src/a.less"), &options);
        assert!(args.contains(&"--compress".to_string()));
        assert!(args.contains(&"-O2".to_string()));
        let include = args.iter().find(|a| a.starts_with("--include-path=")).unwrap();
        assert!(include.contains("/src"));
        assert!(include.contains("/lib"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let renderer = LesscRenderer::with_binary("/definitely/not/lessc");
        let err = renderer
            .render("body{}", Path::new("a.less"), &RenderOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Unavailable(_)));
    }

    #[test]
    fn test_render_output_builder() {
        let out = RenderOutput::new("a{}");
        assert_eq!(out.css, "a{}");
        assert!(out.dependencies.is_empty());
    }
}
