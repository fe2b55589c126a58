//! `@import` discovery for LESS sources.
//!
//! Walks the import graph of a source file and stamps every local file it
//! reaches with its current modification time. Imports that cannot be
//! resolved are skipped here; reporting them is the compiler's job. The
//! exception is `(optional)` imports, which compile fine without their
//! file: every place the file could appear is recorded as absent.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::types::{Dependency, DependencySet, RenderError, OUTPUT_EXT, SOURCE_EXT};

/// A single `@import` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDirective {
    pub target: String,
    /// Import options such as `reference`, `inline`, `less`, `css`.
    pub options: Vec<String>,
}

impl ImportDirective {
    fn has_option(&self, name: &str) -> bool {
        self.options.iter().any(|o| o == name)
    }

    /// Whether the directive pulls in a local file that affects the output.
    pub fn is_local_dependency(&self) -> bool {
        if self.has_option("css") {
            return false;
        }
        if self.target.starts_with("//") || self.target.contains("://") {
            return false;
        }
        let is_css = Path::new(&self.target)
            .extension()
            .is_some_and(|ext| ext == OUTPUT_EXT);
        !is_css || self.has_option("less") || self.has_option("inline")
    }
}

fn import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"@import\s*(?:\(\s*([\w\s,-]*)\)\s*)?(?:url\(\s*)?["']([^"']+)["']"#,
        )
        .expect("import regex is valid")
    })
}

fn comment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s:/\*.*?\*/)|(?m:^[ \t]*//[^\n]*)").expect("comment regex is valid")
    })
}

/// Extract the `@import` directives of a stylesheet, ignoring comments.
pub fn parse_imports(text: &str) -> Vec<ImportDirective> {
    let stripped = comment_regex().replace_all(text, "");
    import_regex()
        .captures_iter(&stripped)
        .map(|caps| ImportDirective {
            target: caps[2].trim().to_string(),
            options: caps
                .get(1)
                .map(|m| {
                    m.as_str()
                        .split(',')
                        .map(|o| o.trim().to_ascii_lowercase())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect()
}

/// Resolves and walks imports relative to the importing file and a list of
/// extra search directories.
#[derive(Debug, Clone, Default)]
pub struct ImportScanner {
    search_paths: Vec<PathBuf>,
}

impl ImportScanner {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Collect the transitive imports of `source`, whose text is `text`.
    ///
    /// The source itself is not part of the result.
    pub async fn scan(&self, source: &Path, text: &str) -> Result<DependencySet, RenderError> {
        let mut deps = DependencySet::new();
        let mut visited: HashSet<PathBuf> = HashSet::new();
        visited.insert(source.to_path_buf());

        let mut pending: Vec<(PathBuf, String)> = vec![(source.to_path_buf(), text.to_string())];

        while let Some((file, contents)) = pending.pop() {
            let base = file.parent().unwrap_or(Path::new("."));
            for directive in parse_imports(&contents) {
                if !directive.is_local_dependency() {
                    continue;
                }
                let Some(resolved) = self.resolve(base, &directive.target).await else {
                    tracing::trace!(
                        "unresolved import {:?} in {}",
                        directive.target,
                        file.display()
                    );
                    if directive.has_option("optional") {
                        for candidate in self.candidates(base, &directive.target) {
                            if visited.insert(candidate.clone()) {
                                deps.insert(Dependency::absent(candidate));
                            }
                        }
                    }
                    continue;
                };
                if !visited.insert(resolved.clone()) {
                    continue;
                }

                let meta = tokio::fs::metadata(&resolved).await?;
                deps.insert(Dependency::new(&resolved, meta.modified()?));

                // Inline imports are copied verbatim and never parsed.
                if directive.has_option("inline") {
                    continue;
                }
                match tokio::fs::read_to_string(&resolved).await {
                    Ok(nested) => pending.push((resolved, nested)),
                    Err(e) => tracing::debug!("skipping unreadable import {}: {e}", resolved.display()),
                }
            }
        }

        Ok(deps)
    }

    /// Every path `target` may resolve to, in lookup order.
    fn candidates(&self, base: &Path, target: &str) -> Vec<PathBuf> {
        let mut relative = PathBuf::from(target);
        if relative.extension().is_none() {
            relative.set_extension(SOURCE_EXT);
        }

        if relative.is_absolute() {
            return vec![relative];
        }

        std::iter::once(base)
            .chain(self.search_paths.iter().map(PathBuf::as_path))
            .map(|root| root.join(&relative))
            .collect()
    }

    async fn resolve(&self, base: &Path, target: &str) -> Option<PathBuf> {
        for candidate in self.candidates(base, target) {
            if is_file(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
