//! ccxt-bridge command line
//!
//! Starts the worker pool, runs one command and prints the result as JSON.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;

use ccxt_bridge::config::BridgeConfig;
use ccxt_bridge::types::OhlcvOptions;
use ccxt_bridge::{telemetry, ExchangeClient, WorkerPool};

#[derive(Parser, Debug)]
#[command(name = "ccxt-bridge", version, about = "Query exchanges through pooled ccxt workers")]
struct Cli {
    /// Override pool.size
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List supported exchange ids
    Exchanges,
    /// Fetch a ticker
    Ticker {
        exchange: String,
        base: String,
        quote: String,
    },
    /// Fetch an order book
    OrderBook {
        exchange: String,
        base: String,
        quote: String,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// List markets
    Markets { exchange: String },
    /// Fetch candles
    Ohlcv {
        exchange: String,
        base: String,
        quote: String,
        #[arg(long)]
        timeframe: Option<String>,
        /// RFC 3339 start time
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Call any library function with a JSON array of arguments
    Call {
        function: String,
        #[arg(default_value = "[]")]
        args: String,
    },
    /// Start the pool and report worker states
    Status,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to render output")?
    );
    Ok(())
}

async fn run(client: &ExchangeClient, command: Command) -> Result<()> {
    match command {
        Command::Exchanges => print_json(&client.exchanges().await?),
        Command::Ticker {
            exchange,
            base,
            quote,
        } => print_json(&client.fetch_ticker(&exchange, &base, &quote).await?),
        Command::OrderBook {
            exchange,
            base,
            quote,
            limit,
        } => print_json(
            &client
                .fetch_order_book(&exchange, &base, &quote, limit)
                .await?,
        ),
        Command::Markets { exchange } => print_json(&client.fetch_markets(&exchange).await?),
        Command::Ohlcv {
            exchange,
            base,
            quote,
            timeframe,
            since,
            limit,
        } => {
            let options = OhlcvOptions {
                timeframe,
                since,
                limit,
                ..OhlcvOptions::new(&exchange, &base, &quote)
            };
            print_json(&client.fetch_ohlcvs(&options).await?)
        }
        Command::Call { function, args } => {
            let args: Vec<serde_json::Value> =
                serde_json::from_str(&args).context("args must be a JSON array")?;
            print_json(&client.call_raw(&function, args).await?)
        }
        Command::Status => print_json(&client.pool().stats()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = BridgeConfig::load()?;
    if let Some(workers) = cli.workers {
        config.pool.size = workers;
    }
    telemetry::init(&config.logging);
    tracing::info!(config = %config, "🚀 Starting ccxt-bridge");

    let pool = WorkerPool::start(config.pool_config(), Arc::new(config.spawner()))
        .await
        .context("Failed to start worker pool")?;
    let pool = Arc::new(pool);
    let client = ExchangeClient::new(pool.clone());

    let outcome = tokio::select! {
        res = run(&client, cli.command) => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, shutting down");
            Ok(())
        }
    };

    pool.shutdown().await;
    outcome
}
