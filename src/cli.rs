use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "quote-board")]
#[command(about = "Aggregates daily price movements for a fixed stock watchlist")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON config layered over the built-in defaults
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve `GET /quotes` over HTTP
    Serve {
        /// Overrides the configured bind address
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Run one aggregation and print the result as JSON
    Fetch {
        /// Falls back to the QUOTE_API_KEY environment variable
        #[arg(short = 'k', long)]
        api_key: Option<String>,
    },
}
