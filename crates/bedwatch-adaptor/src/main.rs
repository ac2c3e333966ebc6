use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bedwatch_adaptor::bus;
use bedwatch_adaptor::config::{default_config_path, Config};
use bedwatch_adaptor::facade::{self, AdaptorFacade, EngineCommand, HealthSignal};
use bedwatch_core::events::EventDispatcher;
use bedwatch_core::poll::PollLoop;
use bedwatch_core::supervisor::ConnectionSupervisor;

#[derive(Parser)]
#[command(name = "bedwatch-adaptor")]
#[command(author, version, about = "Bed occupancy sensor adaptor", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device address (MAC address or UUID), overrides the config file
    #[arg(short, long)]
    address: Option<String>,

    /// Local Bluetooth adapter (e.g. hci0)
    #[arg(long)]
    adapter: Option<String>,

    /// Session backend: ble or gatttool
    #[arg(short, long)]
    backend: Option<String>,

    /// Bus id announced to the parent
    #[arg(long)]
    id: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the bus, so all logging goes to stderr.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    config.validate().context("invalid configuration")?;
    info!(
        "Starting adaptor {} for device {}",
        config.adaptor.id, config.device.address
    );

    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let (control_tx, mut control_rx) = mpsc::channel(32);
    let (engine_tx, engine_rx) = mpsc::channel(4);

    let dispatcher = EventDispatcher::default();
    let mut facade = AdaptorFacade::new(
        config.adaptor.id.clone(),
        config.adaptor.name.clone(),
        config.poll.interval_secs,
        outbound_tx,
        engine_tx,
    );

    let (health_tx, mut health_rx) = mpsc::channel(8);
    tokio::spawn(facade.fan_out().run(dispatcher.subscribe()));
    tokio::spawn(facade::watch_link_health(dispatcher.subscribe(), health_tx));
    tokio::spawn(bus::read_loop(tokio::io::stdin(), control_tx));
    let writer = tokio::spawn(bus::write_loop(tokio::io::stdout(), outbound_rx));

    let shutdown = CancellationToken::new();
    let engine = tokio::spawn(run_engine(
        engine_rx,
        config.clone(),
        dispatcher,
        shutdown.clone(),
    ));

    loop {
        tokio::select! {
            msg = control_rx.recv() => match msg {
                Some(msg) => facade.handle(msg).await,
                None => {
                    info!("Bus input closed, shutting down");
                    break;
                }
            },
            Some(signal) = health_rx.recv() => match signal {
                HealthSignal::Faulted => facade.fault().await,
                HealthSignal::Recovered => facade.clear_error().await,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    shutdown.cancel();
    if let Err(e) = engine.await {
        warn!("Engine runner panicked: {e}");
    }
    drop(facade);
    let _ = writer.await;
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None if default_config_path().exists() => Config::load_default()?,
        None => Config::default(),
    };

    if let Some(address) = &cli.address {
        config.device.address = address.clone();
    }
    if let Some(adapter) = &cli.adapter {
        config.device.adapter = Some(adapter.clone());
    }
    if let Some(backend) = &cli.backend {
        config.device.backend = backend.clone();
    }
    if let Some(id) = &cli.id {
        config.adaptor.id = id.clone();
    }
    Ok(config)
}

/// Waits for the start command, then runs the poll loop until shutdown.
async fn run_engine(
    mut commands: mpsc::Receiver<EngineCommand>,
    config: Config,
    dispatcher: EventDispatcher,
    shutdown: CancellationToken,
) {
    let handle = tokio::select! {
        cmd = commands.recv() => match cmd {
            Some(EngineCommand::Start) => {
                let factory = config.backend().factory(config.session_config());
                let supervisor = ConnectionSupervisor::new(
                    config.identity(),
                    factory,
                    config.session_config(),
                    dispatcher.clone(),
                );
                PollLoop::new(supervisor, dispatcher, config.poll_options()).spawn()
            }
            None => return,
        },
        _ = shutdown.cancelled() => return,
    };

    shutdown.cancelled().await;
    handle.stop().await;
    info!("Poll loop stopped");
}
