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

//! Historical value resolution.
//!
//! Raw host samples are parsed once into a [`SampleSeries`]; a series then
//! answers two kinds of question:
//!
//! - [`SampleSeries::resolve`]: exact grid match, then linear interpolation,
//!   then a one-sided fallback. Used for point lookups (scrub, playback).
//! - [`SampleSeries::nearest`]: nearest sample only, within a tighter window.
//!   Used when a bulk day fetch is spread over all 288 slots.
//!
//! The three tolerances below are intentionally separate values.

use crate::time_grid::TimeGrid;
use chrono::{DateTime, Utc};
use roomclimate_types::{RawSample, ResolvedValue, SLOT_MINUTES};
use std::time::Duration;

/// A sample on a 5-minute boundary this close to the target is taken as-is
pub const EXACT_MATCH_TOLERANCE: Duration = Duration::from_secs(150);

/// Maximum distance for the nearest-sample policy used by bulk prefetch
pub const NEAREST_TOLERANCE: Duration = Duration::from_secs(10 * 60);

/// Maximum distance when only one side of the target has data
pub const ONE_SIDED_TOLERANCE: Duration = Duration::from_secs(30 * 60);

/// Half-width of the query window used for point resolution
pub const POINT_QUERY_WINDOW: Duration = Duration::from_secs(30 * 60);

fn millis(d: Duration) -> i64 {
    d.as_millis() as i64
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SamplePoint {
    at: DateTime<Utc>,
    value: f64,
}

/// Valid numeric samples of one entity, sorted by time
#[derive(Debug, Clone, Default)]
pub struct SampleSeries {
    points: Vec<SamplePoint>,
}

impl SampleSeries {
    /// Parse raw samples, dropping sentinels and unparsable states
    pub fn from_raw(samples: &[RawSample]) -> Self {
        let mut points: Vec<SamplePoint> = samples
            .iter()
            .filter_map(|s| {
                s.numeric_value().map(|value| SamplePoint {
                    at: s.timestamp,
                    value,
                })
            })
            .collect();
        // stable: equal timestamps keep host order
        points.sort_by_key(|p| p.at);
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Time-ordered `(timestamp, value)` pairs
    pub fn points(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.points.iter().map(|p| (p.at, p.value))
    }

    /// Full resolution: exact grid match, interpolation, one-sided fallback
    pub fn resolve(&self, grid: &TimeGrid, target: DateTime<Utc>) -> ResolvedValue {
        if self.points.is_empty() {
            return None;
        }
        let target = grid.align_to_grid(target);

        let exact = self.points.iter().find(|p| {
            grid.local_minute(p.at) % SLOT_MINUTES == 0
                && (p.at - target).num_milliseconds().abs() <= millis(EXACT_MATCH_TOLERANCE)
        });
        if let Some(point) = exact {
            return Some(point.value);
        }

        let split = self.points.partition_point(|p| p.at <= target);
        let before = split.checked_sub(1).and_then(|i| self.points.get(i));
        let after = self.points.get(split);

        match (before, after) {
            (Some(b), Some(a)) => {
                let span = (a.at - b.at).num_milliseconds() as f64;
                let offset = (target - b.at).num_milliseconds() as f64;
                Some(b.value + (a.value - b.value) * (offset / span))
            }
            (Some(b), None)
                if (target - b.at).num_milliseconds() <= millis(ONE_SIDED_TOLERANCE) =>
            {
                Some(b.value)
            }
            (None, Some(a))
                if (a.at - target).num_milliseconds() <= millis(ONE_SIDED_TOLERANCE) =>
            {
                Some(a.value)
            }
            _ => None,
        }
    }

    /// Nearest sample by absolute distance, earlier sample wins ties
    pub fn nearest(&self, target: DateTime<Utc>) -> ResolvedValue {
        let split = self.points.partition_point(|p| p.at < target);
        let candidates = [
            split.checked_sub(1).and_then(|i| self.points.get(i)),
            self.points.get(split),
        ];

        let mut best: Option<(i64, f64)> = None;
        for point in candidates.into_iter().flatten() {
            let distance = (point.at - target).num_milliseconds().abs();
            if best.is_none_or(|(d, _)| distance < d) {
                best = Some((distance, point.value));
            }
        }

        best.filter(|(d, _)| *d <= millis(NEAREST_TOLERANCE))
            .map(|(_, v)| v)
    }
}

/// Resolves values in the widget timezone
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueResolver {
    grid: TimeGrid,
}

impl ValueResolver {
    pub fn new(grid: TimeGrid) -> Self {
        Self { grid }
    }

    /// Resolve one value from raw samples at `target`
    pub fn resolve(&self, samples: &[RawSample], target: DateTime<Utc>) -> ResolvedValue {
        SampleSeries::from_raw(samples).resolve(&self.grid, target)
    }

    /// Nearest-sample variant within [`NEAREST_TOLERANCE`]
    pub fn resolve_nearest(&self, samples: &[RawSample], target: DateTime<Utc>) -> ResolvedValue {
        SampleSeries::from_raw(samples).nearest(target)
    }

    /// Query window for a point lookup around `target`
    pub fn point_window(&self, target: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let center = self.grid.align_to_grid(target);
        let half = chrono::Duration::milliseconds(millis(POINT_QUERY_WINDOW));
        (center - half, center + half)
    }
}
