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

//! Fixed 288-slot day grid and slot <-> wall-clock conversions.

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use roomclimate_types::{SLOT_MINUTES, TimeSlot};

/// Largest DST gap we step over when a local time does not exist
const MAX_GAP_MINUTES: i64 = 180;

/// Converts between UTC instants and day slots in the widget timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeGrid {
    tz: Tz,
}

impl TimeGrid {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn utc() -> Self {
        Self { tz: Tz::UTC }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Slot containing the instant, in local time
    pub fn slot_of(&self, instant: DateTime<Utc>) -> TimeSlot {
        let local = instant.with_timezone(&self.tz);
        TimeSlot::from_hm(local.hour(), local.minute())
    }

    /// Local calendar date of the instant
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    /// Local minute-of-hour of the instant
    pub fn local_minute(&self, instant: DateTime<Utc>) -> u32 {
        instant.with_timezone(&self.tz).minute()
    }

    /// Start of `slot` on `date`, as a UTC instant
    pub fn instant_of(&self, date: NaiveDate, slot: TimeSlot) -> DateTime<Utc> {
        let time = NaiveTime::from_hms_opt(slot.hour(), slot.minute(), 0).unwrap_or(NaiveTime::MIN);
        self.localize(date.and_time(time))
    }

    /// Truncate the local minute to a multiple of 5 and drop seconds
    pub fn align_to_grid(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let local = instant.with_timezone(&self.tz);
        let excess = Duration::minutes(i64::from(local.minute() % SLOT_MINUTES))
            + Duration::seconds(i64::from(local.second()))
            + Duration::nanoseconds(i64::from(local.nanosecond()));
        instant - excess
    }

    /// First and last millisecond of a local day
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.localize(date.and_time(NaiveTime::MIN));
        let last = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
        (start, self.localize(date.and_time(last)))
    }

    /// Map a local wall-clock time to UTC.
    ///
    /// Ambiguous times (DST fall-back) take the earlier mapping. Times inside
    /// a spring-forward gap move forward to the first valid local time.
    fn localize(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
            LocalResult::None => {
                let mut shift = i64::from(SLOT_MINUTES);
                while shift <= MAX_GAP_MINUTES {
                    if let Some(dt) = self
                        .tz
                        .from_local_datetime(&(naive + Duration::minutes(shift)))
                        .earliest()
                    {
                        return dt.with_timezone(&Utc);
                    }
                    shift += i64::from(SLOT_MINUTES);
                }
                Utc.from_utc_datetime(&naive)
            }
        }
    }
}

impl Default for TimeGrid {
    fn default() -> Self {
        Self::utc()
    }
}
