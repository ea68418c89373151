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

//! Line-oriented commands that drive the engine from stdin.

use chrono::NaiveDate;
use roomclimate_core::{Engine, EngineError, PrefetchOutcome};
use roomclimate_types::{Quantity, RoomId, TimeSlot};
use std::ops::ControlFlow;
use std::str::FromStr;
use tracing::{info, warn};

use crate::display::LogDisplay;

pub const HELP: &str = "\
commands:
  play | stop              start or stop playback
  slot <index|HH:MM>       scrub to a slot of the selected day
  date <YYYY-MM-DD>        select a day
  prev | next              previous or next day
  now                      back to live
  prefetch                 load the whole selected day
  series <room> <t|h> [d]  history of one room over d days
  status                   current view
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Stop,
    Slot(TimeSlot),
    Date(NaiveDate),
    StepDay(i64),
    Now,
    Prefetch,
    Series {
        room: RoomId,
        quantity: Quantity,
        days: Option<u32>,
    },
    Status,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err("empty command".to_owned());
        };
        let args: Vec<&str> = words.collect();

        let command = match (verb.to_lowercase().as_str(), args.as_slice()) {
            ("play", []) => Self::Play,
            ("stop", []) => Self::Stop,
            ("slot", [slot]) => Self::Slot(parse_slot(slot)?),
            ("date", [date]) => Self::Date(
                NaiveDate::parse_from_str(date, "%Y-%m-%d")
                    .map_err(|e| format!("bad date '{date}': {e}"))?,
            ),
            ("prev", []) => Self::StepDay(-1),
            ("next", []) => Self::StepDay(1),
            ("now", []) => Self::Now,
            ("prefetch", []) => Self::Prefetch,
            ("series", [room, quantity, rest @ ..]) if rest.len() <= 1 => Self::Series {
                room: RoomId::from(*room),
                quantity: parse_quantity(quantity)?,
                days: rest
                    .first()
                    .map(|d| d.parse().map_err(|_| format!("bad day count '{d}'")))
                    .transpose()?,
            },
            ("status", []) => Self::Status,
            ("help" | "?", []) => Self::Help,
            ("quit" | "exit", []) => Self::Quit,
            _ => return Err(format!("unknown command '{}'", line.trim())),
        };
        Ok(command)
    }
}

/// Slot index (0-287) or wall-clock HH:MM
fn parse_slot(text: &str) -> Result<TimeSlot, String> {
    if let Some((h, m)) = text.split_once(':') {
        let hour: u32 = h.parse().map_err(|_| format!("bad hour in '{text}'"))?;
        let minute: u32 = m.parse().map_err(|_| format!("bad minute in '{text}'"))?;
        if hour > 23 || minute > 59 {
            return Err(format!("time out of range: '{text}'"));
        }
        return Ok(TimeSlot::from_hm(hour, minute));
    }
    text.parse::<u16>()
        .ok()
        .and_then(TimeSlot::new)
        .ok_or_else(|| format!("slot must be 0-287 or HH:MM, got '{text}'"))
}

fn parse_quantity(text: &str) -> Result<Quantity, String> {
    match text.to_lowercase().as_str() {
        "t" | "temp" | "temperature" => Ok(Quantity::Temperature),
        "h" | "hum" | "humidity" => Ok(Quantity::Humidity),
        _ => Err(format!("unknown quantity '{text}'")),
    }
}

/// Run one command. Break means quit.
pub async fn execute(engine: &Engine, display: &LogDisplay, command: Command) -> ControlFlow<()> {
    match command {
        Command::Play => {
            if !engine.play() {
                info!("Already playing");
            }
        }
        Command::Stop => {
            engine.stop_playback();
        }
        Command::Slot(slot) => engine.scrub_to(slot).await,
        Command::Date(date) => engine.select_date(date).await,
        Command::StepDay(delta) => engine.step_day(delta).await,
        Command::Now => engine.jump_to_now(),
        Command::Prefetch => {
            engine.record_interaction();
            match engine.prefetch_selected().await {
                PrefetchOutcome::Completed {
                    resolved_slots,
                    failed_series,
                } => info!(
                    "📦 Prefetched {} slots ({} series failed)",
                    resolved_slots, failed_series
                ),
                PrefetchOutcome::Abandoned => info!("📦 Prefetch abandoned"),
            }
        }
        Command::Series {
            room,
            quantity,
            days,
        } => {
            engine.record_interaction();
            let days = days.unwrap_or(engine.config().chart_history_days);
            match engine.history_series(&room, quantity, days).await {
                Ok(points) => {
                    info!("📈 {} {}: {} points", room, quantity, points.len());
                    if let (Some(first), Some(last)) = (points.first(), points.last()) {
                        info!("   {} {:.1} .. {} {:.1}", first.0, first.1, last.0, last.1);
                    }
                }
                Err(EngineError::History(e)) => warn!("History unavailable: {}", e),
                Err(e) => warn!("{}", e),
            }
        }
        Command::Status => {
            for line in display.render() {
                println!("{line}");
            }
            let snapshot = engine.snapshot();
            println!(
                "  cache: {} ({} slots){}",
                snapshot
                    .cache_date
                    .map_or_else(|| "empty".to_owned(), |d| d.to_string()),
                snapshot.cached_slots,
                if snapshot.prefetch_in_flight {
                    ", loading"
                } else {
                    ""
                }
            );
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
}
