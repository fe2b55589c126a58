//! Configuration loading and resolution.
//!
//! Every option resolves in the same order: explicit command-line value,
//! then `LESS_CACHE_*` environment variable, then the TOML config file, then
//! the built-in default.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use less_cache::CacheConfig;

use crate::error::{ServerError, ServerResult};

/// Default listen address.
pub const DEFAULT_ADDR: &str = "127.0.0.1:3100";

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "less-cache.toml";

/// Raw option set, as read from a TOML file or collected from CLI flags.
/// Every field is optional so sources can be layered.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Options {
    pub addr: Option<String>,
    pub src: Option<PathBuf>,
    pub dest: Option<PathBuf>,
    pub force: Option<bool>,
    pub debug: Option<bool>,
    pub once: Option<bool>,
    pub compress: Option<bool>,
    pub optimization: Option<u8>,
    pub paths: Option<Vec<PathBuf>>,
    pub prefix: Option<String>,
    pub lessc: Option<PathBuf>,
}

impl Options {
    /// Fill every unset field from `fallback`.
    pub fn or(self, fallback: Options) -> Options {
        Options {
            addr: self.addr.or(fallback.addr),
            src: self.src.or(fallback.src),
            dest: self.dest.or(fallback.dest),
            force: self.force.or(fallback.force),
            debug: self.debug.or(fallback.debug),
            once: self.once.or(fallback.once),
            compress: self.compress.or(fallback.compress),
            optimization: self.optimization.or(fallback.optimization),
            paths: self.paths.or(fallback.paths),
            prefix: self.prefix.or(fallback.prefix),
            lessc: self.lessc.or(fallback.lessc),
        }
    }

    /// Read options from `LESS_CACHE_*` variables via `lookup`.
    pub fn from_env_with<F>(lookup: F) -> ServerResult<Options>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &str| -> ServerResult<Option<bool>> {
            lookup(name)
                .map(|v| parse_bool(name, &v))
                .transpose()
        };

        let optimization = lookup("LESS_CACHE_OPTIMIZATION")
            .map(|v| {
                v.trim().parse::<u8>().map_err(|_| {
                    ServerError::Config(format!(
                        "LESS_CACHE_OPTIMIZATION must be 0, 1 or 2, got {v:?}"
                    ))
                })
            })
            .transpose()?;

        Ok(Options {
            addr: lookup("LESS_CACHE_ADDR"),
            src: lookup("LESS_CACHE_SRC").map(PathBuf::from),
            dest: lookup("LESS_CACHE_DEST").map(PathBuf::from),
            force: flag("LESS_CACHE_FORCE")?,
            debug: flag("LESS_CACHE_DEBUG")?,
            once: flag("LESS_CACHE_ONCE")?,
            compress: flag("LESS_CACHE_COMPRESS")?,
            optimization,
            paths: lookup("LESS_CACHE_PATHS").map(|v| std::env::split_paths(&v).collect()),
            prefix: lookup("LESS_CACHE_PREFIX"),
            lessc: lookup("LESSC_PATH").map(PathBuf::from),
        })
    }

    /// Read options from the process environment.
    pub fn from_env() -> ServerResult<Options> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }
}

fn parse_bool(name: &str, value: &str) -> ServerResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ServerError::Config(format!(
            "{name} must be a boolean, got {other:?}"
        ))),
    }
}

/// Parse a TOML config document.
pub fn load_options_from_str(content: &str, origin: &str) -> ServerResult<Options> {
    toml::from_str(content).map_err(|e| ServerError::ConfigParse {
        path: origin.to_string(),
        message: e.to_string(),
    })
}

/// Load the config file at `explicit`, or `less-cache.toml` in the working
/// directory if it exists. A missing default file yields empty options; a
/// missing explicit file is an error.
pub fn load_options(explicit: Option<&Path>) -> ServerResult<Options> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !default.exists() {
                return Ok(Options::default());
            }
            default
        }
    };

    let content = std::fs::read_to_string(&path).map_err(|e| {
        ServerError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let options = load_options_from_str(&content, &path.display().to_string())?;

    // Relative paths in the file are relative to the file.
    let base = path.parent().unwrap_or(Path::new(""));
    Ok(rebase(options, base))
}

fn rebase(mut options: Options, base: &Path) -> Options {
    let fix = |p: PathBuf| if p.is_relative() { base.join(p) } else { p };
    options.src = options.src.map(fix);
    options.dest = options.dest.map(fix);
    options.lessc = options.lessc.map(fix);
    options.paths = options.paths.map(|paths| paths.into_iter().map(fix).collect());
    options
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub src: PathBuf,
    pub dest: PathBuf,
    pub force: bool,
    pub debug: bool,
    pub once: bool,
    pub compress: bool,
    pub optimization: u8,
    pub paths: Vec<PathBuf>,
    pub prefix: Option<String>,
    pub lessc: Option<PathBuf>,
}

impl ServerConfig {
    /// Apply defaults to layered options. Fails if `src` is missing.
    pub fn from_options(options: Options) -> ServerResult<Self> {
        let src = options
            .src
            .ok_or_else(|| ServerError::Config("`src` is required".to_string()))?;
        let dest = options.dest.unwrap_or_else(|| src.clone());

        Ok(Self {
            addr: options.addr.unwrap_or_else(|| DEFAULT_ADDR.to_string()),
            src,
            dest,
            force: options.force.unwrap_or(false),
            debug: options.debug.unwrap_or(false),
            once: options.once.unwrap_or(false),
            compress: options.compress.unwrap_or(false),
            optimization: options.optimization.unwrap_or(0),
            paths: options.paths.unwrap_or_default(),
            prefix: options.prefix,
            lessc: options.lessc,
        })
    }

    /// Resolve from CLI values, the environment and the config file.
    pub fn resolve(cli: Options, config_file: Option<&Path>) -> ServerResult<Self> {
        let env = Options::from_env()?;
        let file = load_options(config_file)?;
        Self::from_options(cli.or(env).or(file))
    }

    /// Build the core cache configuration.
    pub fn cache_config(&self) -> CacheConfig {
        let mut config = CacheConfig::new(&self.src)
            .dest(&self.dest)
            .force(self.force)
            .debug(self.debug)
            .once(self.once)
            .compress(self.compress)
            .optimization(self.optimization)
            .paths(self.paths.clone());
        if let Some(prefix) = &self.prefix {
            config = config.prefix(prefix.clone());
        }
        if let Some(lessc) = &self.lessc {
            config = config.render(std::sync::Arc::new(less_cache::LesscRenderer::with_binary(
                lessc,
            )));
        }
        config
    }
}
