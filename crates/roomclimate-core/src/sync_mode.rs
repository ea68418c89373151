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

//! Live / Historical mode state machine with inactivity reversion.
//!
//! Reversion is evaluated by polling (`poll`, called every second) against
//! the last interaction timestamp rather than by a one-shot deferred timer,
//! so any interaction restarts the idle window immediately.

use chrono::{DateTime, NaiveDate, Utc};
use roomclimate_types::TimeSlot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Idle time in Historical mode after which the view returns to Live
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Display follows the host's current sensor state
    #[default]
    Live,
    /// Display follows resolved past values for the selected date and slot
    Historical,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Historical => write!(f, "historical"),
        }
    }
}

/// Result of a mode change request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    EnteredLive,
    EnteredHistorical,
}

impl Transition {
    pub fn changed(self) -> bool {
        self != Self::Unchanged
    }
}

#[derive(Debug, Clone)]
pub struct SyncModeController {
    mode: SyncMode,
    last_interaction: DateTime<Utc>,
}

impl SyncModeController {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            mode: SyncMode::Live,
            last_interaction: now,
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn is_live(&self) -> bool {
        self.mode == SyncMode::Live
    }

    pub fn last_interaction(&self) -> DateTime<Utc> {
        self.last_interaction
    }

    /// Any user action restarts the idle window
    pub fn record_interaction(&mut self, now: DateTime<Utc>) {
        self.last_interaction = now;
    }

    pub fn enter_historical(&mut self) -> Transition {
        self.set(SyncMode::Historical)
    }

    pub fn enter_live(&mut self) -> Transition {
        self.set(SyncMode::Live)
    }

    /// Mode a date selection lands in: Live only for today at the live slot
    pub fn mode_for_selection(
        date: NaiveDate,
        slot: TimeSlot,
        today: NaiveDate,
        live_slot: TimeSlot,
    ) -> SyncMode {
        if date == today && slot == live_slot {
            SyncMode::Live
        } else {
            SyncMode::Historical
        }
    }

    /// How long the user has been idle
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_interaction).to_std().unwrap_or_default()
    }

    /// One-second check: reverts to Live after [`INACTIVITY_TIMEOUT`] idle
    pub fn poll(&mut self, now: DateTime<Utc>) -> Transition {
        if self.mode == SyncMode::Historical && self.idle_for(now) >= INACTIVITY_TIMEOUT {
            return self.enter_live();
        }
        Transition::Unchanged
    }

    fn set(&mut self, mode: SyncMode) -> Transition {
        if self.mode == mode {
            return Transition::Unchanged;
        }
        self.mode = mode;
        match mode {
            SyncMode::Live => Transition::EnteredLive,
            SyncMode::Historical => Transition::EnteredHistorical,
        }
    }
}
