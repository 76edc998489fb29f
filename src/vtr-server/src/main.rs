// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod deck_handle;
mod deck_task;
mod listener;

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use vtr_app::{init_logging, normalize_name, ConfigFile};
use vtr_backend::{register_builtin_backends_on, DeckAccess, RegistrationContext};
use vtr_core::deck::controller::BridgeEventEmitter;
use vtr_core::{DeckRequest, DeckState, DynResult};

use config::ServerConfig;
use deck_handle::DeckHandle;
use deck_task::{DeckSettings, DeckTaskConfig, TransitionLogger};

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - 9-pin deck control bridge");
const DECK_TASK_CHANNEL_BUFFER: usize = 32;
const SETTINGS_CHANNEL_BUFFER: usize = 1;

#[derive(Debug, Parser)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Deck transport backend to use (e.g. loopback)
    #[arg(short = 'b', long = "backend")]
    backend: Option<String>,
    /// Serial port path for the 9-pin remote connection
    #[arg(short = 'p', long = "port-path")]
    port_path: Option<String>,
    /// Baud rate for the serial port
    #[arg(long = "baud")]
    baud: Option<u32>,
    /// IP address for the JSON TCP listener
    #[arg(short = 'l', long = "listen")]
    listen: Option<IpAddr>,
    /// Port for the JSON TCP listener
    #[arg(long = "listen-port")]
    listen_port: Option<u16>,
}

/// Deck-related CLI overrides, kept so a SIGHUP reload applies them to
/// the fresh file contents too.
#[derive(Clone)]
struct CliOverrides {
    backend: Option<String>,
    port_path: Option<String>,
    baud: Option<u32>,
}

impl CliOverrides {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            backend: cli.backend.clone(),
            port_path: cli.port_path.clone(),
            baud: cli.baud,
        }
    }

    fn apply(&self, cfg: &mut ServerConfig) {
        if let Some(ref backend) = self.backend {
            cfg.deck.backend = backend.clone();
        }
        if let Some(ref port) = self.port_path {
            cfg.deck.port = port.clone();
        }
        if let Some(baud) = self.baud {
            cfg.deck.baud = baud;
        }
    }
}

fn build_deck_settings(cfg: &ServerConfig) -> DeckSettings {
    DeckSettings {
        backend: cfg.deck.backend.clone(),
        access: DeckAccess::Serial(cfg.serial_settings()),
        polling: cfg.poll_config(),
        reconnect: cfg.reconnect_config(),
    }
}

/// Load and validate the config file for one epoch.
fn load_config(path: Option<&Path>) -> DynResult<(ServerConfig, Option<PathBuf>)> {
    let (mut cfg, found) = match path {
        Some(path) => (ServerConfig::load_from_file(path)?, Some(path.to_path_buf())),
        None => ServerConfig::load_from_default_paths()?,
    };
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;
    Ok((cfg, found))
}

fn reload_settings(
    path: Option<&Path>,
    overrides: &CliOverrides,
    registry: &RegistrationContext,
) -> DynResult<DeckSettings> {
    let (mut cfg, _) = load_config(path)?;
    overrides.apply(&mut cfg);
    cfg.deck.backend = normalize_name(&cfg.deck.backend);
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;
    if !registry.is_backend_registered(&cfg.deck.backend) {
        return Err(format!("Unknown deck backend: {}", cfg.deck.backend).into());
    }
    Ok(build_deck_settings(&cfg))
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = load_config(cli.config.as_deref())?;

    // The deck debug flag forces verbose logging of the exchange.
    let log_level = if cfg.deck.debug {
        Some("debug".to_string())
    } else {
        cfg.general.log_level.clone()
    };
    init_logging(log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let overrides = CliOverrides::from_cli(&cli);
    overrides.apply(&mut cfg);
    cfg.deck.backend = normalize_name(&cfg.deck.backend);
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;

    let mut registry = RegistrationContext::new();
    register_builtin_backends_on(&mut registry);
    if !registry.is_backend_registered(&cfg.deck.backend) {
        return Err(format!(
            "Unknown deck backend: {} (available: {})",
            cfg.deck.backend,
            registry.registered_backends().join(", ")
        )
        .into());
    }
    let registry = Arc::new(registry);

    info!(
        "Starting vtr-server (backend: {}, serial {} @ {} baud)",
        cfg.deck.backend, cfg.deck.port, cfg.deck.baud
    );

    let (deck_tx, deck_rx) = mpsc::channel::<DeckRequest>(DECK_TASK_CHANNEL_BUFFER);
    let (settings_tx, settings_rx) = mpsc::channel::<DeckSettings>(SETTINGS_CHANNEL_BUFFER);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (state_tx, state_rx) = watch::channel(DeckState::new());

    let mut emitter = BridgeEventEmitter::new();
    emitter.register(Arc::new(TransitionLogger));

    let task_config = DeckTaskConfig {
        registry: Arc::clone(&registry),
        settings: build_deck_settings(&cfg),
        emitter,
    };

    let mut task_handles: Vec<JoinHandle<()>> = Vec::new();

    let deck_shutdown_rx = shutdown_rx.clone();
    task_handles.push(tokio::spawn(async move {
        if let Err(e) =
            deck_task::run_deck_task(task_config, deck_rx, settings_rx, state_tx, deck_shutdown_rx)
                .await
        {
            error!("Deck task error: {:?}", e);
        }
    }));

    if cfg.listen.enabled {
        let listen_ip = cli.listen.unwrap_or(cfg.listen.listen);
        let listen_port = cli.listen_port.unwrap_or(cfg.listen.port);
        let listen_addr = SocketAddr::from((listen_ip, listen_port));
        let auth_tokens: HashSet<String> = cfg
            .listen
            .auth
            .tokens
            .iter()
            .filter(|t| !t.is_empty())
            .cloned()
            .collect();
        let handle = DeckHandle {
            deck_tx: deck_tx.clone(),
            state_rx: state_rx.clone(),
        };
        let listener_shutdown_rx = shutdown_rx.clone();
        task_handles.push(tokio::spawn(async move {
            if let Err(e) =
                listener::run_listener(listen_addr, handle, auth_tokens, listener_shutdown_rx).await
            {
                error!("Listener error: {:?}", e);
            }
        }));
    }

    // SIGHUP reloads the config file and restarts the deck connection
    // with the new settings.
    #[cfg(unix)]
    {
        let reload_path = cli.config.clone();
        let reload_overrides = overrides.clone();
        let reload_registry = Arc::clone(&registry);
        let reload_settings_tx = settings_tx.clone();
        let mut hup_shutdown_rx = shutdown_rx.clone();
        task_handles.push(tokio::spawn(async move {
            let mut hup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
                Ok(hup) => hup,
                Err(e) => {
                    warn!("SIGHUP handler unavailable; config reload disabled: {}", e);
                    return;
                }
            };
            loop {
                tokio::select! {
                    sig = hup.recv() => {
                        if sig.is_none() {
                            break;
                        }
                        info!("SIGHUP received; reloading configuration");
                        match reload_settings(
                            reload_path.as_deref(),
                            &reload_overrides,
                            &reload_registry,
                        ) {
                            Ok(settings) => {
                                let _ = reload_settings_tx.send(settings).await;
                            }
                            Err(e) => error!("Config reload failed: {}", e),
                        }
                    }
                    _ = hup_shutdown_rx.changed() => {
                        if *hup_shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        }));
    }

    signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");
    let _ = shutdown_tx.send(true);
    drop(deck_tx);
    drop(settings_tx);
    tokio::time::sleep(Duration::from_millis(400)).await;

    for handle in &task_handles {
        if !handle.is_finished() {
            handle.abort();
        }
    }
    for handle in task_handles {
        let _ = handle.await;
    }
    Ok(())
}
