//! Main entry point for the rbay command line.

use clap::Parser;
use rbay_cli::{Cli, StoreHandle, build_service, commands, config::Configuration, logging};
use rbay_common::RbayError;
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize configuration and logging
    let configuration = Configuration::new(&cli.global)?;
    let logging_guard = logging::init_logging(&configuration.logging_config())?;

    rbay_lock::describe_metrics();
    rbay_auction::describe_metrics();

    let handle = StoreHandle::open(&configuration).await?;
    let service = build_service(&configuration, handle.store.clone())?;

    let outcome = commands::execute(&service, cli.command).await;
    handle.close();

    match outcome {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(err) => match err.downcast_ref::<RbayError>() {
            Some(rbay_err) => {
                error!("{}", rbay_err);
                println!("{}", serde_json::to_string_pretty(&rbay_err.error_code())?);
                // exit skips destructors; flush file output first
                drop(logging_guard);
                std::process::exit(1);
            }
            None => Err(err),
        },
    }
}
