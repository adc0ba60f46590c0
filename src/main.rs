mod cli;
mod error;

use crate::cli::{Cli, Command};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use hoard_api::{Creator, HttpClient, HttpOptions, RemoteHandle};
use hoard_config::Config;
use hoard_library::Library;
use hoard_storage::Cache;
use hoard_sync::{Options, Pipeline, Summary};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    cli.init_logging();
    match run(cli).await {
        Ok(summary) => {
            tracing::info!(
                discovered = summary.discovered,
                fetched = summary.fetched,
                failed = summary.failed,
                linked = summary.linked,
                "Done"
            );
            ExitCode::SUCCESS
        },
        Err(e) => {
            tracing::error!(error = ?e, "Aborting");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<Summary> {
    let mut config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    cli.apply(&mut config);
    config.validate().or_raise(|| ErrorKind::Config)?;
    tracing::debug!(?config, "Loaded configuration");

    let remote: RemoteHandle = Arc::new(
        HttpClient::new(HttpOptions {
            retries: config.http.retries,
            retry_wait: config.http.retry_wait(),
            connect_timeout: config.http.connect_timeout(),
        })
        .or_raise(|| ErrorKind::Client)?,
    );
    let cache = Cache::new(&config.cache_dir);
    let library = Library::new(&config.library_dir, cache.clone());
    let options = Options {
        workers: config.workers,
        link_queue: config.link_queue,
    };
    let pipeline = Pipeline::new(remote, cache, library, options);

    let summary = match &cli.command {
        Command::Creator { domain, service, user } => pipeline.sync_creator(&Creator::new(domain, service, user)).await,
        Command::Post { domain, service, user, id } => pipeline.sync_post(&Creator::new(domain, service, user), id).await,
    };
    summary.or_raise(|| ErrorKind::Sync)
}
