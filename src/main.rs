use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use dubber::{audio::cleanup_orphaned_temp_files, config::Config, pipeline};

fn main() -> ExitCode {
    // Honor a local .env before reading any configuration
    let _ = dotenvy::dotenv();

    // Clean up temp files from previous runs that were killed
    cleanup_orphaned_temp_files();

    let config = Config::parse();

    // Set up logging
    let filter = if config.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Run the async main
    let runtime = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    match runtime.block_on(pipeline::run(&config)) {
        Ok(result) => {
            let json = serde_json::to_string_pretty(&result)
                .expect("dubbing result serializes to JSON");
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", anyhow::Error::new(e));
            ExitCode::FAILURE
        }
    }
}
