//! Blockmix CLI
//!
//! Command-line front-end for the block export engine.

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::{error, info};

use blockmix::cli::commands::{self, GainOverrides};
use blockmix::cli::{Cli, Commands};
use blockmix::ExportError;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Blockmix v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd).map_err(|err| {
            if let Some(export_err) = err.downcast_ref::<ExportError>() {
                error!("{} [{}]", export_err, export_err.error_code());
                for suggestion in export_err.recovery_suggestions() {
                    eprintln!("  hint: {}", suggestion);
                }
            }
            err
        }),
        None => {
            println!("Blockmix v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Resolve { selection } => commands::resolve(&selection),
        Commands::Plan { selection, format } => commands::plan(&selection, format),
        Commands::Export {
            selection,
            output,
            format,
            bitrate,
            instrumental_db,
            vocals_db,
            report,
        } => commands::export(
            &selection,
            &output,
            format,
            bitrate,
            GainOverrides {
                instrumental_db,
                vocals_db,
            },
            report.as_deref(),
        ),
    }
}
