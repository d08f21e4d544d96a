//! Command line entry point: fetch both sources once and publish the merged event file.

mod config;
mod observability;

use anyhow::{Context, Result};
use clap::Parser;
use wattfeed_core::{ConditionalCache, EventStore, Reconciler, RunOutcome};
use wattfeed_provider_community as community;
use wattfeed_provider_octopus::{self as octopus, Enrollment};

use crate::config::Args;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const USER_AGENT: &str = concat!("wattfeed/", env!("CARGO_PKG_VERSION"));

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    observability::init_logging(args.log_format.resolve(env_var));

    let settings = match args.resolve(env_var) {
        Ok(settings) => settings,
        Err(err) => {
            tracing::error!(error = %err, "failed to load configuration");
            return Err(err.into());
        }
    };

    tracing::info!(version = VERSION, "starting wattfeed");

    // Each source gets its own client so their timeouts and pools stay independent.
    let primary = octopus::source(
        octopus::http_client(USER_AGENT).context("failed to build Octopus HTTP client")?,
        settings.api_key.clone(),
        Enrollment {
            account_number: settings.account_number.clone(),
            meter_point_id: settings.meter_point_id.clone(),
        },
    );
    let secondary = community::source(
        community::http_client(USER_AGENT).context("failed to build community HTTP client")?,
        ConditionalCache::new(&settings.cache_dir),
    );

    let reconciler = Reconciler::new(EventStore::new(&settings.output_file), primary, secondary);

    match reconciler.run().await {
        Ok(RunOutcome::Unchanged { count }) => {
            tracing::info!(count, "event file already up to date");
            Ok(())
        }
        Ok(RunOutcome::Published { count, .. }) => {
            tracing::info!(count, file = %settings.output_file.display(), "successfully completed event update");
            Ok(())
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to fetch and update events");
            Err(err).context("event update failed")
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
