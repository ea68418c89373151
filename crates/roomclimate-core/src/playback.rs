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

//! Playback position and the pure stepping rules behind both timers.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use roomclimate_types::{SLOT_MINUTES, TimeSlot};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum gap between two auto-advance triggers
pub const AUTO_ADVANCE_DEBOUNCE: Duration = Duration::from_secs(5);

/// How often the ceiling slot is recomputed at the latest
pub const CEILING_REFRESH: Duration = Duration::from_secs(60);

/// Where the timeline is and whether it is playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub current_slot: TimeSlot,
    pub selected_date: NaiveDate,
    /// Slot of the wall-clock now; a ceiling only when viewing today
    pub max_slot_for_today: TimeSlot,
}

impl PlaybackState {
    pub fn new(today: NaiveDate, now_slot: TimeSlot) -> Self {
        Self {
            is_playing: false,
            current_slot: now_slot,
            selected_date: today,
            max_slot_for_today: now_slot,
        }
    }

    pub fn is_today(&self, today: NaiveDate) -> bool {
        self.selected_date == today
    }

    /// Latest viewable slot for the selected date
    pub fn ceiling(&self, today: NaiveDate) -> TimeSlot {
        if self.is_today(today) {
            self.max_slot_for_today
        } else {
            TimeSlot::LAST
        }
    }

    /// Fraction of the day that can be viewed (1.0 for past days)
    pub fn available_fraction(&self, today: NaiveDate) -> f64 {
        if self.is_today(today) {
            self.max_slot_for_today.fraction_of_day()
        } else {
            1.0
        }
    }

    /// Clamp a requested slot to the ceiling of the selected date
    pub fn clamp(&self, slot: TimeSlot, today: NaiveDate) -> TimeSlot {
        slot.min(self.ceiling(today))
    }

    /// Compute the next playback step without applying it
    pub fn next_step(&self, today: NaiveDate) -> PlaybackStep {
        let next = self.current_slot.index() + 1;
        if self.is_today(today) && next > self.max_slot_for_today.index() {
            return PlaybackStep::Clamped(self.max_slot_for_today);
        }
        match TimeSlot::new(next as u16) {
            Some(slot) => PlaybackStep::Advanced(slot),
            None => PlaybackStep::WrappedToNextDay(
                self.selected_date.succ_opt().unwrap_or(self.selected_date),
            ),
        }
    }

    /// Apply a step; returns true when playback stops
    pub fn apply(&mut self, step: PlaybackStep) -> bool {
        match step {
            PlaybackStep::Advanced(slot) => {
                self.current_slot = slot;
                false
            }
            PlaybackStep::Clamped(slot) => {
                self.current_slot = slot;
                self.is_playing = false;
                true
            }
            PlaybackStep::WrappedToNextDay(date) => {
                self.selected_date = date;
                self.current_slot = TimeSlot::FIRST;
                self.is_playing = false;
                true
            }
        }
    }
}

/// Outcome of one playback tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStep {
    /// Moved to the given slot, keep playing
    Advanced(TimeSlot),
    /// Would pass the ceiling on today; parked on it and stopped
    Clamped(TimeSlot),
    /// Ran past 23:55; moved to 00:00 of the date and stopped
    WrappedToNextDay(NaiveDate),
}

impl PlaybackStep {
    pub fn stops(self) -> bool {
        !matches!(self, Self::Advanced(_))
    }
}

/// Detects 5-minute boundary crossings on the one-second tick
#[derive(Debug, Clone, Default)]
pub struct AutoAdvance {
    last_fired: Option<DateTime<Utc>>,
}

impl AutoAdvance {
    /// True exactly once per boundary second (`minute % 5 == 0 && second == 0`)
    pub fn check(&mut self, now: DateTime<Utc>, tz: Tz) -> bool {
        let local = now.with_timezone(&tz);
        if local.minute() % SLOT_MINUTES != 0 || local.second() != 0 {
            return false;
        }
        let debounce = chrono::Duration::milliseconds(AUTO_ADVANCE_DEBOUNCE.as_millis() as i64);
        if self.last_fired.is_some_and(|last| now - last < debounce) {
            return false;
        }
        self.last_fired = Some(now);
        true
    }
}
