use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gql_gateway::GatewayConfig;

mod commands;
mod logging;

/// GraphQL request gateway client
#[derive(Parser)]
#[command(name = "gql-gateway")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (YAML); `GQL_GATEWAY__*` env vars override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Session identifier sent with every request
    #[arg(long, global = true)]
    session_id: Option<String>,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(flatten)]
    refresh: commands::RefreshArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query and print its payload
    Query(commands::OperationArgs),
    /// Run a mutation and print its payload
    Mutate(commands::OperationArgs),
    /// Print the cached value of a query (if any), then the network value
    Stream(commands::OperationArgs),
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json_logs)?;

    let config = GatewayConfig::load(cli.config.as_deref())?;

    if matches!(cli.command, Commands::Check) {
        return commands::check(&config);
    }

    let gateway = commands::connect(&config, cli.session_id.as_deref(), &cli.refresh)?;
    match &cli.command {
        Commands::Query(args) => commands::query(&gateway, args).await,
        Commands::Mutate(args) => commands::mutate(&gateway, args).await,
        Commands::Stream(args) => commands::stream(&gateway, args).await,
        Commands::Check => Ok(()),
    }
}
