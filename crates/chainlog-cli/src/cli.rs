use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

const MAX_WRITERS: u64 = 1_024;
const MAX_APPENDS: u64 = 100_000;

#[derive(Parser)]
#[command(
    name = "chainlog",
    about = "Tamper-evident, append-only hash-chain ledger",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Run concurrent writers against an in-memory ledger and verify the result
    Simulate(SimulateArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Override the listen address
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Provision the ledger before serving
    #[arg(long)]
    pub provision: bool,
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Number of concurrent writers
    #[arg(
        short,
        long,
        default_value_t = 8,
        value_parser = clap::value_parser!(u64).range(1..=MAX_WRITERS)
    )]
    pub writers: u64,
    /// Appends per writer
    #[arg(
        short,
        long,
        default_value_t = 25,
        value_parser = clap::value_parser!(u64).range(1..=MAX_APPENDS)
    )]
    pub appends: u64,
    /// Override the conflict retry budget
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
