//! b2 - command-line client for Backblaze B2 cloud storage

mod commands;
mod exit_code;
mod output;
mod pool;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::{Commands, Context, GlobalArgs};
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Command-line client for Backblaze B2 cloud storage
#[derive(Parser, Debug)]
#[command(name = "b2", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.debug);

    let ctx = match Context::load(&cli.global) {
        Ok(ctx) => ctx,
        Err(e) => {
            Formatter::new(cli.global.output_config()).error(&format!("{e:#}"));
            return ExitCode::UsageError.into();
        }
    };

    commands::execute(cli.command, &ctx).await.into()
}

/// Log to stderr; `--debug` enables request tracing, `RUST_LOG` overrides
fn init_tracing(debug: bool) {
    let default = if debug {
        "b2_cli=debug,b2_client=debug,b2_core=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .init();
}
