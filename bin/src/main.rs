//! sitesnap CLI - offline website snapshots as zip archives.

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

mod args;
mod commands;

use args::{ServeArgs, SnapshotArgs};

#[derive(Parser)]
#[command(name = "sitesnap")]
#[command(about = "Mirror websites with wget and hand them back as zip archives", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (suppress progress output and informational logs)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve(ServeArgs),

    /// Snapshot one site and write the archive to disk
    Snapshot(SnapshotArgs),
}

/// Maps the verbosity flags onto a default log filter.
///
/// `RUST_LOG` takes precedence when set.
fn default_filter(base: &str, verbose: u8, quiet: bool) -> String {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => base,
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    format!("{level},tower_http={level}")
}

fn init_tracing(filter: String) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be loaded before clap reads environment fallbacks
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Serve(args) => {
            init_tracing(default_filter("info", cli.verbose, cli.quiet));
            commands::serve::serve(args).await
        }
        Commands::Snapshot(args) => {
            init_tracing(default_filter("warn", cli.verbose, cli.quiet));
            commands::snapshot::snapshot(args, cli.quiet).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter("info", 0, false), "info,tower_http=info");
        assert_eq!(default_filter("warn", 1, false), "debug,tower_http=debug");
        assert_eq!(default_filter("info", 3, false), "trace,tower_http=trace");
        assert_eq!(default_filter("info", 2, true), "warn,tower_http=warn");
    }

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }
}
