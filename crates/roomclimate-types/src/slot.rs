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

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of 5-minute slots in one calendar day (24 * 12)
pub const SLOTS_PER_DAY: usize = 288;

/// Width of one slot in minutes
pub const SLOT_MINUTES: u32 = 5;

/// A 5-minute bucket of a single day, always in [0, 287]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct TimeSlot(u16);

impl TimeSlot {
    /// First slot of the day (00:00)
    pub const FIRST: TimeSlot = TimeSlot(0);

    /// Last slot of the day (23:55)
    pub const LAST: TimeSlot = TimeSlot((SLOTS_PER_DAY - 1) as u16);

    /// Create a slot, returning None when the index is outside the day
    pub fn new(index: u16) -> Option<Self> {
        (usize::from(index) < SLOTS_PER_DAY).then_some(Self(index))
    }

    /// Create a slot from any integer, clamping into [0, 287]
    pub fn clamped(index: i64) -> Self {
        Self(index.clamp(0, (SLOTS_PER_DAY - 1) as i64) as u16)
    }

    /// Slot for a wall-clock hour and minute
    pub fn from_hm(hour: u32, minute: u32) -> Self {
        Self::clamped(i64::from(hour) * 12 + i64::from(minute / SLOT_MINUTES))
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    pub fn hour(self) -> u32 {
        u32::from(self.0) / 12
    }

    pub fn minute(self) -> u32 {
        (u32::from(self.0) % 12) * SLOT_MINUTES
    }

    /// The following slot, or None past 23:55
    pub fn next(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }

    /// Iterate over every slot of the day in order
    pub fn all() -> impl Iterator<Item = TimeSlot> {
        (0..SLOTS_PER_DAY as u16).map(TimeSlot)
    }

    /// Position of this slot on the timeline as a fraction (slot 0 = 0.0, slot 287 = 1.0)
    pub fn fraction_of_day(self) -> f64 {
        f64::from(self.0) / (SLOTS_PER_DAY - 1) as f64
    }

    /// `HH:MM` label of the slot start
    pub fn label(self) -> String {
        format!("{:02}:{:02}", self.hour(), self.minute())
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl TryFrom<u16> for TimeSlot {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("slot {value} outside [0, 287]"))
    }
}

impl From<TimeSlot> for u16 {
    fn from(slot: TimeSlot) -> Self {
        slot.0
    }
}
