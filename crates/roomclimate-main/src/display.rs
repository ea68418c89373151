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

//! Console rendering of the floor plan state.

use chrono::NaiveDate;
use parking_lot::Mutex;
use roomclimate_core::{DisplayAdapter, SyncMode};
use roomclimate_types::{
    DisplayPrecision, Quantity, ResolvedValue, RoomId, TimeSlot, WidgetConfig,
};
use std::collections::BTreeMap;
use tracing::{debug, info, trace, warn};

#[derive(Debug)]
struct RoomView {
    name: String,
    precision: DisplayPrecision,
    temperature: ResolvedValue,
    humidity: ResolvedValue,
}

#[derive(Debug, Default)]
struct Header {
    date: Option<NaiveDate>,
    slot: Option<TimeSlot>,
    mode: SyncMode,
    playing: bool,
}

/// Logs every update and keeps the last shown values for `status`
#[derive(Debug)]
pub struct LogDisplay {
    rooms: Mutex<BTreeMap<RoomId, RoomView>>,
    order: Vec<RoomId>,
    header: Mutex<Header>,
}

impl LogDisplay {
    pub fn new(config: &WidgetConfig) -> Self {
        let rooms = config
            .rooms
            .iter()
            .map(|room| {
                (
                    room.id.clone(),
                    RoomView {
                        name: room.display_name().to_owned(),
                        precision: room.display_precision(),
                        temperature: None,
                        humidity: None,
                    },
                )
            })
            .collect();
        Self {
            rooms: Mutex::new(rooms),
            order: config.rooms.iter().map(|r| r.id.clone()).collect(),
            header: Mutex::new(Header::default()),
        }
    }

    /// One line per room, preceded by the timeline header
    pub fn render(&self) -> Vec<String> {
        let header = self.header.lock();
        let mut lines = vec![format!(
            "{} {} [{}{}]",
            header
                .date
                .map_or_else(|| "----------".to_owned(), |d| d.to_string()),
            header.slot.map_or_else(|| "--:--".to_owned(), TimeSlot::label),
            header.mode,
            if header.playing { ", playing" } else { "" }
        )];
        drop(header);

        let rooms = self.rooms.lock();
        lines.extend(self.order.iter().filter_map(|id| rooms.get(id)).map(|room| {
            format!(
                "  {:<16} {:>8} {:>6}",
                room.name,
                room.precision.format(room.temperature, Quantity::Temperature),
                room.precision.format(room.humidity, Quantity::Humidity)
            )
        }));
        lines
    }
}

impl DisplayAdapter for LogDisplay {
    fn update(&self, room: &RoomId, quantity: Quantity, value: ResolvedValue) {
        let mut rooms = self.rooms.lock();
        let Some(view) = rooms.get_mut(room) else {
            return;
        };
        match quantity {
            Quantity::Temperature => view.temperature = value,
            Quantity::Humidity => view.humidity = value,
        }
        debug!(
            "🏠 [DISPLAY] {} {} = {}",
            view.name,
            quantity,
            view.precision.format(value, quantity)
        );
    }

    fn set_timeline_position(&self, slot: TimeSlot, available_fraction: f64) {
        self.header.lock().slot = Some(slot);
        debug!(
            "🕒 [DISPLAY] Timeline at {} ({:.0}% of day available)",
            slot,
            available_fraction * 100.0
        );
    }

    fn playback_changed(&self, playing: bool) {
        self.header.lock().playing = playing;
        if playing {
            info!("▶️ [DISPLAY] Playback on");
        } else {
            info!("⏹️ [DISPLAY] Playback off");
        }
    }

    fn prefetch_progress(&self, date: NaiveDate, percent: f64) {
        if percent >= 100.0 {
            info!("📦 [DISPLAY] {} loaded", date);
        } else {
            trace!("📦 [DISPLAY] Loading {}: {:.0}%", date, percent);
        }
    }

    fn show_message(&self, message: &str) {
        warn!("💬 [DISPLAY] {}", message);
    }

    fn date_changed(&self, date: NaiveDate) {
        self.header.lock().date = Some(date);
        info!("📅 [DISPLAY] Showing {}", date);
    }

    fn mode_changed(&self, mode: SyncMode) {
        self.header.lock().mode = mode;
        info!("🔀 [DISPLAY] Mode: {}", mode);
    }
}
