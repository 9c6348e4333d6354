//! turbocache - remote build cache server
//!
//! Subcommands:
//! - `turbocache serve` - Run the HTTP artifact cache
//! - `turbocache config` - Print the effective configuration
//! - `turbocache clear` - Remove every stored artifact
//! - `turbocache usage` - Report store size against the configured ceiling

use std::path::PathBuf;

use anyhow::{Context, Result};
use cas::{ContentStore, FileStore};
use clap::{Parser, Subcommand};
use turboconf::TurboConfig;
use turbocache::{serve, telemetry};

#[derive(Parser)]
#[command(name = "turbocache")]
#[command(about = "Content-addressed remote build cache")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the artifact cache server
    Serve {
        /// Config file (replaces ./turbocache.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// HTTP port to bind
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory holding artifacts
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },

    /// Print the effective configuration and where it came from
    Config {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Remove every stored artifact
    Clear {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Report artifact count and bytes against the size ceiling
    Usage {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            cache_dir,
        } => {
            let mut config = TurboConfig::load_from(config.as_deref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(dir) = cache_dir {
                config.cache.dir = dir;
            }

            let otel = telemetry::init(&config.logging, config.server.mode)?;
            let result = serve::run(config).await;
            if let Err(e) = &result {
                tracing::error!(error = %format!("{e:#}"), "turbocache failed");
            }
            if let Some(otel) = otel {
                otel.shutdown();
            }
            result
        }
        Commands::Config { config } => {
            let (config, sources) = TurboConfig::load_with_sources_from(config.as_deref())?;
            for file in &sources.files {
                println!("# loaded: {}", file.display());
            }
            for var in &sources.env_overrides {
                println!("# env: {}", var);
            }
            print!("{}", config.to_toml());
            Ok(())
        }
        Commands::Clear { config } => {
            let config = TurboConfig::load_from(config.as_deref())?;
            let store = open_for_admin(&config)?;
            store.clear().context("Failed to clear cache")?;
            println!("Cleared {}", config.cache.dir.display());
            Ok(())
        }
        Commands::Usage { config } => {
            let config = TurboConfig::load_from(config.as_deref())?;
            let store = open_for_admin(&config)?;
            let usage = store.usage().context("Failed to measure cache")?;
            let ceiling = config.cache.max_size_bytes();
            println!("Cache dir:  {}", config.cache.dir.display());
            println!("Artifacts:  {}", usage.artifacts);
            println!("Bytes:      {} / {}", usage.bytes, ceiling);
            if usage.bytes > ceiling {
                println!("Over the configured max size (not enforced)");
            }
            Ok(())
        }
    }
}

fn open_for_admin(config: &TurboConfig) -> Result<FileStore> {
    let cas_config = serve::cas_config(&config.cache)?;
    FileStore::open(cas_config)
        .with_context(|| format!("Failed to open cache directory {}", config.cache.dir.display()))
}
