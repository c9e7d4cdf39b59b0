//! netbird-inventory - NetBird peers as an Ansible-compatible inventory
//!
//! This is the main entry point for the netbird-inventory CLI.

mod cli;

use anyhow::Result;
use cli::commands::{CommandContext, Runnable};
use cli::{Cli, Commands, LogFormat};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Initialize logging based on verbosity
    init_logging(cli.verbosity(), cli.log_format, !cli.no_color);

    tracing::debug!(version = VERSION, "netbird-inventory starting");

    let ctx = CommandContext::new(&cli);

    // Execute the appropriate command
    let exit_code = match &cli.command {
        Commands::List(args) => args.run(&ctx)?,
        Commands::Host(args) => args.run(&ctx)?,
        Commands::Graph(args) => args.run(&ctx)?,
        Commands::Verify(args) => args.run(&ctx)?,
        Commands::Options(args) => args.run(&ctx)?,
    };

    std::process::exit(exit_code);
}

/// Initialize logging based on verbosity level
///
/// `RUST_LOG` overrides the level derived from `-v`. Logs go to stderr so
/// that stdout only carries the inventory document.
fn init_logging(verbosity: u8, format: LogFormat, ansi: bool) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbosity >= 3)
                    .with_ansi(ansi),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .init(),
    }
}
