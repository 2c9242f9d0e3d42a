//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open a store from an optional TOML config and seed it when empty.
//! - Print deterministic counts for quick local sanity checks.

use docstore_core::{
    core_version, init_logging_from_config, seed_sample_data, StoreConfig, UnitOfWorkFactory,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("docstore_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => StoreConfig::from_file(path)?,
        None => StoreConfig::in_memory(),
    };
    if let Some(logging) = config.logging.as_ref() {
        init_logging_from_config(logging)?;
    }

    let factory = UnitOfWorkFactory::from_config(&config)?;
    let uow = factory.create()?;
    let seeded = seed_sample_data(&uow)?;
    let documents = uow.documents().count(None)?;
    let analyses = uow.analyses().count(None)?;
    uow.close();

    log::info!(
        "event=cli_probe module=cli status=ok seeded_rows={seeded} documents={documents}"
    );
    println!("docstore_core version={}", core_version());
    println!("seeded_rows={seeded} documents={documents} analyses={analyses}");
    Ok(())
}
