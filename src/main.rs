//! CreaTune sensor hub - main entry point
//!
//! `run` connects to the gateway and logs every state change until
//! interrupted. `simulate` drives an in-process hub with generated frames.

use anyhow::Context;
use clap::{Parser, Subcommand};
use creatune_hub::logging::{init_logging, LogConfig};
use creatune_hub::{
    CombinedState, EventKind, GatewayClient, GatewaySimulator, HubConfig, Notification,
    NotificationBus, SensorHub, StalenessWatchdog,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "creatune-hub")]
#[command(about = "Sensor aggregation hub for the CreaTune installation")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, global = true, env = "CREATUNE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to the gateway and follow the installation state
    Run {
        /// Override the configured gateway URL
        #[arg(long)]
        gateway_url: Option<Url>,
    },
    /// Drive a local hub with simulated device frames
    Simulate {
        /// Hold this state (scene label or STATE_* name) instead of picking randomly
        #[arg(long)]
        state: Option<String>,

        /// Time between simulated updates
        #[arg(long, default_value = "3s", value_parser = humantime_serde::re::humantime::parse_duration)]
        interval: Duration,

        /// Stop after this many updates
        #[arg(long)]
        count: Option<u64>,

        /// Seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
    },
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        let mut config = LogConfig::from_env();
        if self.debug {
            config = config.with_level(Level::DEBUG);
        }
        if self.json_logs {
            config.json = true;
        }
        config
    }
}

fn log_state_changes(bus: &NotificationBus) {
    bus.subscribe(EventKind::StateChanged, |notification| {
        if let Notification::StateChanged { state, previous } = notification {
            info!(%previous, %state, scene = state.scene(), "Installation state");
        }
    });
    bus.subscribe(EventKind::ConnectionChanged, |notification| {
        if let Notification::ConnectionChanged { state } = notification {
            info!(%state, "Gateway connection");
        }
    });
}

async fn run(config: HubConfig) -> anyhow::Result<()> {
    let bus = NotificationBus::new();
    log_state_changes(&bus);
    let hub = SensorHub::new(bus);

    let token = CancellationToken::new();
    let watchdog = StalenessWatchdog::new(hub.clone(), &config.watchdog).spawn(token.clone());

    let client = GatewayClient::new(config, hub);
    client.connect()?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");

    token.cancel();
    client.shutdown().await;
    watchdog.await.context("Watchdog task failed")?;

    let stats = client.stats();
    info!(
        frames = stats.frames_received,
        malformed = stats.malformed_frames,
        reconnects = stats.reconnect_attempts,
        "Session summary"
    );
    Ok(())
}

async fn simulate(
    state: Option<CombinedState>,
    interval: Duration,
    count: Option<u64>,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    let bus = NotificationBus::new();
    log_state_changes(&bus);
    let hub = SensorHub::new(bus);
    let mut simulator = match seed {
        Some(seed) => GatewaySimulator::seeded(seed),
        None => GatewaySimulator::new(),
    };

    let mut ticker = tokio::time::interval(interval);
    let mut sent = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let target = state.unwrap_or_else(|| simulator.random_state());
                let reached = simulator.drive(&hub, target);
                info!(%target, %reached, "Simulated update");

                sent += 1;
                if count.is_some_and(|count| sent >= count) {
                    break;
                }
            }
        }
    }

    let status = hub.get_status();
    info!(
        connected = status.connected_count,
        valid = status.valid_count,
        state = %hub.get_current_state(),
        "Simulation finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_config())
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    let mut config =
        HubConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Run { gateway_url } => {
            if let Some(url) = gateway_url {
                config.gateway_url = url;
                config.validate()?;
            }
            info!(url = %config.gateway_url, "Starting CreaTune hub");
            run(config).await
        }
        Command::Simulate {
            state,
            interval,
            count,
            seed,
        } => {
            let state = state
                .map(|name| {
                    CombinedState::from_scene(&name)
                        .with_context(|| format!("Unknown state '{name}'"))
                })
                .transpose()?;
            simulate(state, interval, count, seed).await
        }
    }
}
