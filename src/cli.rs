use clap::{Parser, Subcommand};
use hoard_config::Config;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Mirror creator posts and attachments into a browsable local library.
#[derive(Debug, Parser)]
#[command(name = "hoard", author, version)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "HOARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Where downloaded files are stored
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Root of the symlink library
    #[arg(long, global = true)]
    pub library_dir: Option<PathBuf>,

    /// Concurrent downloads
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Mirror every post of a creator
    Creator {
        /// Site serving the API and the files, e.g. kemono.su
        domain: String,
        service: String,
        user: String,
    },
    /// Mirror a single post
    Post {
        domain: String,
        service: String,
        user: String,
        id: String,
    },
}

impl Cli {
    /// Command-line flags win over every configuration source.
    pub fn apply(&self, config: &mut Config) {
        if let Some(cache_dir) = &self.cache_dir {
            config.cache_dir = cache_dir.clone();
        }
        if let Some(library_dir) = &self.library_dir {
            config.library_dir = library_dir.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
    }

    fn default_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }

    /// `RUST_LOG` takes precedence over `-v`/`-q`.
    pub fn init_logging(&self) {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.default_filter())))
            .with_writer(io::stderr)
            .init();
    }
}
