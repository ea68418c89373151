// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of RoomClimate.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! RoomClimate - room temperature and humidity timeline over Home Assistant history

mod config;
mod console;
mod display;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use clap::Parser;
use roomclimate_core::{Collaborators, Engine, EngineConfig, SystemClock};
use roomclimate_ha::{HaHistoryProvider, HaStateSnapshot, HomeAssistantClient, check_entities};
use roomclimate_types::WidgetConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::console::Command;
use crate::display::LogDisplay;

#[derive(Parser, Debug)]
#[command(name = "roomclimate")]
#[command(author, version, about = "Room climate timeline over Home Assistant history")]
struct Cli {
    /// Configuration file (TOML or JSON); searched in default locations when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// IANA timezone for the day grid, overrides config and HA
    #[arg(long)]
    timezone: Option<String>,

    /// Run without reading commands from stdin
    #[arg(long)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(tz) = cli.timezone {
        config.timezone = Some(tz);
    }

    info!("🚀 Starting RoomClimate");
    info!("📋 Configuration Summary:");
    for room in &config.rooms {
        let binding = config.binding(&room.id);
        info!(
            "     - {} ({}): temperature={}, humidity={}",
            room.display_name(),
            room.id,
            binding.temperature.as_deref().unwrap_or("-"),
            binding.humidity.as_deref().unwrap_or("-")
        );
    }

    let client = Arc::new(
        HomeAssistantClient::from_config(&config.home_assistant)
            .context("Failed to create Home Assistant client")?,
    );
    if !client.ping().await? {
        warn!("⚠️ Home Assistant at {} is not answering yet", client.base_url());
    }

    let timezone = resolve_timezone(&config, &client).await?;
    let entities: Vec<String> = config
        .room_bindings()
        .iter()
        .flat_map(|(_, binding)| {
            binding
                .bound()
                .map(|(_, id)| id.to_owned())
                .collect::<Vec<_>>()
        })
        .collect();

    let snapshot = Arc::new(HaStateSnapshot::new());
    match snapshot.refresh(&client, &entities).await {
        Ok(found) => info!("🔄 Live state: {}/{} entities", found, entities.len()),
        Err(e) => warn!("⚠️ Initial live state refresh failed: {}", e),
    }
    for missing in check_entities(&client, &entities).await {
        warn!("⚠️ Configured entity does not exist in Home Assistant: {}", missing);
    }

    let history = Arc::new(
        HaHistoryProvider::new(client.clone()).with_known_entities(snapshot.clone()),
    );
    let display = Arc::new(LogDisplay::new(&config));
    let engine = Engine::new(
        EngineConfig::from_widget(&config, timezone),
        Collaborators {
            history,
            live: snapshot.clone(),
            display: display.clone(),
            clock: Arc::new(SystemClock),
        },
    );
    engine.start();

    let poller = spawn_live_poller(
        client,
        snapshot,
        entities,
        Duration::from_secs(config.home_assistant.live_poll_secs),
    );

    run_console(&engine, &display, !cli.no_console).await;

    poller.abort();
    engine.shutdown();
    info!("👋 Shutting down");
    Ok(())
}

/// CLI/config timezone, then the HA timezone, then UTC
async fn resolve_timezone(config: &WidgetConfig, client: &HomeAssistantClient) -> Result<Tz> {
    if let Some(name) = &config.timezone {
        let tz: Tz = name
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {}", name, e))?;
        info!("🌍 Using configured timezone: {}", tz);
        return Ok(tz);
    }

    match client.get_timezone().await {
        Ok(name) => match name.parse::<Tz>() {
            Ok(tz) => Ok(tz),
            Err(e) => {
                warn!("⚠️ Unknown HA timezone '{}': {}, using UTC", name, e);
                Ok(Tz::UTC)
            }
        },
        Err(e) => {
            warn!("⚠️ Failed to fetch timezone from HA ({}), using UTC", e);
            Ok(Tz::UTC)
        }
    }
}

/// Keep the live snapshot fresh; the engine reads it on its own schedule
fn spawn_live_poller(
    client: Arc<HomeAssistantClient>,
    snapshot: Arc<HaStateSnapshot>,
    entities: Vec<String>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match snapshot.refresh(&client, &entities).await {
                Ok(found) => debug!("🔄 [LIVE POLL] {} entities", found),
                Err(e) => warn!("⚠️ [LIVE POLL] Refresh failed: {}", e),
            }
        }
    })
}

/// Read commands until quit, end of input or ctrl-c
async fn run_console(engine: &Engine, display: &LogDisplay, mut console_open: bool) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    if console_open {
        println!("{}", console::HELP);
    }

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Failed to listen for ctrl-c: {}", e);
                }
                info!("Shutdown signal received");
                break;
            }
            line = lines.next_line(), if console_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match line.parse::<Command>() {
                    Ok(command) => {
                        if console::execute(engine, display, command).await.is_break() {
                            break;
                        }
                    }
                    Err(e) => println!("{e} (type 'help')"),
                },
                Ok(None) => {
                    info!("stdin closed, running until ctrl-c");
                    console_open = false;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    console_open = false;
                }
            },
        }
    }
}
