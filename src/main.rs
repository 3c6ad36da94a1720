mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use quote_board::config::{load_or_builtin, Config};
use quote_board::fetch::request::default_headers;
use quote_board::fetch::HttpTransport;
use quote_board::server::{self, AppState};
use quote_board::services::Aggregator;

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();

    let config = load_or_builtin(cli.config.as_deref()).context("Failed to load configuration")?;
    let shutdown = shutdown_on_ctrl_c();

    match cli.command {
        Commands::Serve { bind } => {
            let aggregator = build_aggregator(config)?;
            let addr = bind.unwrap_or_else(|| aggregator.config().bind.clone());
            let state = AppState {
                aggregator: Arc::new(aggregator),
                shutdown,
            };
            server::serve(&addr, state).await?;
        }
        Commands::Fetch { api_key } => {
            let aggregator = build_aggregator(config)?;
            let result = aggregator
                .run(api_key.as_deref(), &shutdown)
                .await
                .context("Failed to fetch stock data")?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn build_aggregator(config: Config) -> Result<Aggregator> {
    let headers = default_headers(&config.request.user_agent, &config.request.headers)?;
    let transport = HttpTransport::new(config.request.timeout, headers)?;
    Ok(Aggregator::new(config, Arc::new(transport)))
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(err) => warn!("Failed to listen for ctrl-c: {err}"),
        }
        trigger.cancel();
    });
    token
}
