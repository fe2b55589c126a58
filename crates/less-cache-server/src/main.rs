//! lessd — entry point.

use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use less_cache::{Outcome, StylesheetCache};
use less_cache_server::config::{Options, ServerConfig};
use less_cache_server::server::LessServer;

#[derive(Parser)]
#[command(
    name = "lessd",
    about = "lessd — serve a directory and compile LESS stylesheets on request",
    version
)]
struct Cli {
    /// Path to a TOML config file (default: ./less-cache.toml if present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(flatten)]
    cache: CacheArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options shared by every command.
#[derive(Args, Clone, Default)]
struct CacheArgs {
    /// Directory holding the .less sources.
    #[arg(long, global = true)]
    src: Option<PathBuf>,

    /// Directory compiled .css files are written to (default: --src).
    #[arg(long, global = true)]
    dest: Option<PathBuf>,

    /// Recompile on every request.
    #[arg(long, global = true)]
    force: bool,

    /// Log every cache decision.
    #[arg(long, global = true)]
    debug: bool,

    /// Check each stylesheet for changes only once per process.
    #[arg(long, global = true)]
    once: bool,

    /// Minify compiled output.
    #[arg(long, global = true)]
    compress: bool,

    /// Compiler optimization level (0-2).
    #[arg(short = 'O', long, global = true)]
    optimization: Option<u8>,

    /// Extra @import search directory. Can be repeated.
    #[arg(id = "include_paths", long = "include-path", global = true)]
    paths: Vec<PathBuf>,

    /// URL prefix the stylesheets are served under (e.g. /static).
    #[arg(long, global = true)]
    prefix: Option<String>,

    /// Path to the lessc executable (also reads LESSC_PATH).
    #[arg(long, global = true)]
    lessc: Option<PathBuf>,
}

impl CacheArgs {
    fn into_options(self, addr: Option<String>) -> Options {
        Options {
            addr,
            src: self.src,
            dest: self.dest,
            force: self.force.then_some(true),
            debug: self.debug.then_some(true),
            once: self.once.then_some(true),
            compress: self.compress.then_some(true),
            optimization: self.optimization,
            paths: (!self.paths.is_empty()).then_some(self.paths),
            prefix: self.prefix,
            lessc: self.lessc,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the destination directory over HTTP (default).
    Serve {
        /// Listen address (host:port).
        #[arg(long)]
        addr: Option<String>,
    },

    /// Compile stylesheets by request path, e.g. `lessd compile /css/site.css`.
    Compile {
        /// Request paths to compile.
        #[arg(required = true, value_name = "PATH")]
        requests: Vec<String>,
    },

    /// Print the resolved configuration as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   lessd completions bash > ~/.local/share/bash-completion/completions/lessd
    ///   lessd completions zsh > ~/.zfunc/_lessd
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve { addr: None }) {
        Commands::Serve { addr } => {
            let config = ServerConfig::resolve(cli.cache.into_options(addr), cli.config.as_deref())?;
            tracing::info!("Source: {}", config.src.display());
            tracing::info!("Destination: {}", config.dest.display());
            if config.force {
                tracing::info!("Force: every request recompiles");
            }
            let server = LessServer::new(&config)?;
            server.run().await?;
        }

        Commands::Compile { requests } => {
            let config = ServerConfig::resolve(cli.cache.into_options(None), cli.config.as_deref())?;
            let cache = StylesheetCache::new(config.cache_config())?;

            let mut failed = false;
            for path in requests {
                let result = match cache.handle("GET", &path).await {
                    Ok(Some(Outcome::Compiled(reason))) => {
                        serde_json::json!({ "path": path, "result": "compiled", "reason": reason })
                    }
                    Ok(Some(Outcome::Fresh)) => {
                        serde_json::json!({ "path": path, "result": "fresh" })
                    }
                    Ok(None) => {
                        failed = true;
                        serde_json::json!({ "path": path, "result": "not_found" })
                    }
                    Err(e) => {
                        failed = true;
                        serde_json::json!({ "path": path, "result": "error", "message": e.to_string() })
                    }
                };
                println!("{result}");
            }
            if failed {
                std::process::exit(1);
            }
        }

        Commands::Info => {
            let config = ServerConfig::resolve(cli.cache.into_options(None), cli.config.as_deref())?;
            let info = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "addr": config.addr,
                "src": config.src,
                "dest": config.dest,
                "force": config.force,
                "debug": config.debug,
                "once": config.once,
                "compress": config.compress,
                "optimization": config.optimization,
                "paths": config.paths,
                "prefix": config.prefix,
                "lessc": config.lessc.clone().or_else(less_cache::find_lessc),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "lessd", &mut std::io::stdout());
        }
    }

    Ok(())
}
