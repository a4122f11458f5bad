//! Command-line interface to inspect and exercise upload jobs.
#![warn(unused_crate_dependencies)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

mod error;
mod simulate;
mod status;

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use upload_job::{ObjectId, PayloadLayout, RedundancyType, UploadConfig};

use crate::{
    error::Error,
    simulate::{simulate, SimulateArguments},
    status::status,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
enum UploadJobCli {
    /// Print how an object is split into primary and secondary pieces
    Layout {
        /// Payload size, in bytes
        #[arg(long)]
        size: u64,
        #[arg(long, value_enum, default_value_t)]
        redundancy: RedundancyType,
        /// JSON file overriding the default upload configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Drive an upload job to completion with simulated storage providers
    Simulate(SimulateArguments),
    /// Print a persisted upload job
    Status {
        #[arg(long)]
        object_id: ObjectId,
        /// RocksDB directory the job was persisted to
        #[arg(long)]
        database_directory: PathBuf,
    },
}

/// Load the [`UploadConfig`] from a JSON file, or use the defaults if no file is given.
pub(crate) fn load_config(path: Option<&Path>) -> Result<UploadConfig, Error> {
    let Some(path) = path else {
        return Ok(UploadConfig::default());
    };
    let config: UploadConfig = serde_json::from_slice(&std::fs::read(path)?)?;
    tracing::debug!(?config, "loaded configuration from {}", path.display());
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Logger initialization.
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .init();

    match UploadJobCli::parse() {
        UploadJobCli::Layout {
            size,
            redundancy,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let layout = PayloadLayout::derive(size, redundancy, &config)?;
            println!("{}", serde_json::to_string_pretty(&layout)?);
        }
        UploadJobCli::Simulate(arguments) => {
            let summary = simulate(arguments).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        UploadJobCli::Status {
            object_id,
            database_directory,
        } => {
            let report = status(object_id, &database_directory)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
