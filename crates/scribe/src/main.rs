//! Scribe CLI - personal blog engine.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

use config::ConfigFile;

#[derive(Parser)]
#[command(name = "scribe")]
#[command(about = "Personal blog engine with static builds and a comment server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to blog.toml config file
    #[arg(short, long, default_value = "blog.toml", env = "SCRIBE_CONFIG")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a config file, a sample post and a stylesheet
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        yes: bool,
    },

    /// Build the static site
    Build {
        /// Output directory (defaults to config or "dist")
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip minification
        #[arg(long)]
        no_minify: bool,

        /// Include draft posts
        #[arg(long)]
        drafts: bool,
    },

    /// Run the dynamic server with comments, login and analytics
    Serve {
        /// Host to bind to (defaults to config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (defaults to config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Open browser on start
        #[arg(long)]
        open: bool,
    },

    /// Preview the built static site
    Preview {
        /// Port to listen on
        #[arg(short, long, default_value = "4000")]
        port: u16,

        /// Directory to serve (defaults to the build output)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Init { yes } => {
            commands::init::run(&cli.config, yes).await?;
        }
        Commands::Build {
            output,
            no_minify,
            drafts,
        } => {
            let config = ConfigFile::load(&cli.config)?;
            let minify = if no_minify { Some(false) } else { None };
            commands::build::run(&config, output, minify, drafts).await?;
        }
        Commands::Serve { host, port, open } => {
            let config = ConfigFile::load(&cli.config)?;
            commands::serve::run(&config, host, port, open).await?;
        }
        Commands::Preview { port, dir } => {
            let config = ConfigFile::load(&cli.config)?;
            let dir = dir.unwrap_or_else(|| config.paths.output.clone());
            commands::preview::run(port, dir).await?;
        }
    }

    Ok(())
}
