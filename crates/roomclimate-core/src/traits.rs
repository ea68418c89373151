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

//! Collaborator interfaces the engine talks to.
//!
//! The engine never renders and never speaks HTTP itself; a host wires in
//! implementations of these traits (Home Assistant adapters in production,
//! in-memory fakes in tests).

use crate::error::HistoryResult;
use crate::sync_mode::SyncMode;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use roomclimate_types::{Quantity, RawSample, ResolvedValue, RoomId, TimeSlot};

// ============= Data Source Traits =============

/// Source of raw historical samples
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Raw samples for `entity_id` in `[start, end)`, in any order
    async fn query(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> HistoryResult<Vec<RawSample>>;

    /// Get data source name for logging
    fn name(&self) -> &str;
}

/// Synchronous snapshot of the host's current sensor states
pub trait LiveStateSource: Send + Sync {
    /// Current raw state of an entity, None when the host does not know it
    fn read(&self, entity_id: &str) -> Option<String>;
}

// ============= Output Traits =============

/// Receives everything the engine wants shown.
///
/// Calls are made outside engine locks and may come from timer tasks.
pub trait DisplayAdapter: Send + Sync {
    /// A room value changed; `None` must render as "no data"
    fn update(&self, room: &RoomId, quantity: Quantity, value: ResolvedValue);

    /// Current slot and the fraction of the day that may be viewed
    fn set_timeline_position(&self, slot: TimeSlot, available_fraction: f64);

    fn playback_changed(&self, _playing: bool) {}

    fn prefetch_progress(&self, _date: NaiveDate, _percent: f64) {}

    /// Short inline message, e.g. a missing history series
    fn show_message(&self, _message: &str) {}

    fn date_changed(&self, _date: NaiveDate) {}

    fn mode_changed(&self, _mode: SyncMode) {}
}

// ============= Time =============

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests and simulations
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
