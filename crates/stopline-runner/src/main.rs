//! # stopline
//!
//! Command-line front end of the stopline execution system.
//!
//! Loads a JSON configuration file, wires the Binance spot client, the
//! position store and the Trade Abstraction Service, runs one command and
//! prints its typed result as JSON on stdout.
//!
//! # Usage
//!
//! ```bash
//! stopline config.json open-long --base-asset BTC --edge edge60 --trigger-price 64000
//! stopline config.json move-stop --base-asset BTC --edge edge60 --new-stop-price 61000
//! stopline config.json close --base-asset BTC --edge edge60
//! stopline config.json positions
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use stopline_core::config::{AppConfig, load_config_value};
use stopline_core::notify::notifier_from_config;
use stopline_core::store::MemoryStore;
use stopline_core::time_util::now_ms;
use stopline_core::{EdgeId, Money, SpotPositionIdentifier, TradeContext, TradeId};
use stopline_exec::{
    CloseCommand, CommandOutcome, CommandResponse, MoveStopCommand, OpenLongCommand, TradeAbstractionService,
};
use stopline_td::binance::BinanceSpot;
use stopline_td::binance::config::BinanceConfig;
use stopline_td::engine::EngineConfig;
use stopline_td::event;
use stopline_td::rules::RulesCache;
use stopline_td::{ExchangeClient, ExecutionEngine};
use tracing::{debug, info};

/// Stopline spot execution runner.
#[derive(Parser)]
#[command(name = "stopline", about = "Protected spot entries, exits and stop management")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output. Overrides `Runner.log_path`.
    #[arg(long)]
    log_dir: Option<String>,

    /// Emit JSON log lines on the console.
    #[arg(long)]
    json_logs: bool,

    /// Position snapshot file, kept across invocations.
    #[arg(long, default_value = "stopline-positions.json")]
    snapshot: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Buy with an IOC limit order and protect the fill.
    OpenLong {
        #[arg(long)]
        base_asset: String,
        #[arg(long)]
        edge: String,
        /// Signal-time reference price; the current price is used when omitted.
        #[arg(long)]
        trigger_price: Option<Money>,
        #[arg(long)]
        trade_id: Option<String>,
        #[arg(long)]
        signal_timestamp_ms: Option<u64>,
    },
    /// Cancel exit orders and sell the position at market.
    Close {
        #[arg(long)]
        base_asset: String,
        #[arg(long)]
        edge: String,
        #[arg(long)]
        signal_timestamp_ms: Option<u64>,
    },
    /// Replace the protective stop of a position.
    MoveStop {
        #[arg(long)]
        base_asset: String,
        #[arg(long)]
        edge: String,
        #[arg(long)]
        new_stop_price: Money,
        #[arg(long)]
        signal_timestamp_ms: Option<u64>,
    },
    /// Attribute a filled stop / OCO order and forget its position.
    ExitFill {
        #[arg(long)]
        order_id: String,
    },
    /// List open positions.
    Positions,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // 1. Load configuration
    let raw = load_config_value(&cli.config).with_context(|| format!("reading {}", cli.config.display()))?;
    let config = AppConfig::from_value(raw.clone())?;
    let binance = BinanceConfig::from_app_value(&raw)?;

    // 2. Initialize logging
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    stopline_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &config.module_name(), cli.json_logs);
    info!(
        "{} starting, config={} exchange={} edges={}",
        config.module_name(),
        cli.config.display(),
        config.exchange,
        config.edges.len()
    );

    // 3. Wire the service
    let client: Arc<dyn ExchangeClient> = Arc::new(BinanceSpot::new(&binance)?);
    let store = Arc::new(MemoryStore::open(&cli.snapshot).await?);
    let rules = Arc::new(RulesCache::new(client.clone(), Duration::from_secs(config.exchange_info_ttl_secs)));
    let (events_tx, mut events_rx) = event::channel();
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            debug!(?event, "[runner] execution event");
        }
    });
    let engine = ExecutionEngine::new(client, store, rules, config.exchange.clone(), EngineConfig::from(&config))
        .with_events(events_tx);
    let service = TradeAbstractionService::new(&config, engine, notifier_from_config(&config)?);

    // 4. Run the command
    match cli.command {
        Command::OpenLong { base_asset, edge, trigger_price, trade_id, signal_timestamp_ms } => {
            let cmd = OpenLongCommand {
                base_asset,
                edge: EdgeId::from(edge),
                trigger_price,
                trade_id: trade_id.map(TradeId::from).unwrap_or_else(TradeId::generate),
                signal_timestamp_ms: signal_timestamp_ms.unwrap_or_else(now_ms),
            };
            let result = service.open_long(&cmd).await;
            print_response(CommandResponse::new(result))
        }
        Command::Close { base_asset, edge, signal_timestamp_ms } => {
            let cmd = CloseCommand {
                base_asset,
                edge: EdgeId::from(edge),
                signal_timestamp_ms: signal_timestamp_ms.unwrap_or_else(now_ms),
            };
            let result = service.close(&cmd).await;
            print_response(CommandResponse::new(result))
        }
        Command::MoveStop { base_asset, edge, new_stop_price, signal_timestamp_ms } => {
            let edge = EdgeId::from(edge);
            let position = SpotPositionIdentifier::new(config.exchange.clone(), &base_asset, edge.clone());
            let trade_context = match service.engine().store().trade_context(&position).await? {
                Some(trade) => trade,
                None => TradeContext {
                    base_asset: position.base_asset.clone(),
                    quote_asset: config.quote_asset.clone(),
                    edge,
                    trade_id: TradeId::generate(),
                },
            };
            let cmd = MoveStopCommand {
                trade_context,
                new_stop_price,
                signal_timestamp_ms: signal_timestamp_ms.unwrap_or_else(now_ms),
            };
            let result = service.move_stop(&cmd).await;
            print_response(CommandResponse::new(result))
        }
        Command::ExitFill { order_id } => {
            let closed = service.record_exit_fill(&config.exchange, &order_id).await?;
            print_json(&closed)?;
            Ok(if closed.is_some() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Positions => {
            print_json(&service.positions().await?)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_response<R: CommandOutcome + Serialize>(response: CommandResponse<R>) -> Result<ExitCode> {
    print_json(&response)?;
    Ok(if response.http_status < 300 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
