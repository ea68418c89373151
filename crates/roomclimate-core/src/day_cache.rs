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

//! One-day slot cache and the bulk prefetch job that fills it.
//!
//! The cache holds exactly one calendar day. [`DayCache::begin`] lays down
//! `None` placeholders for all 288 slots of every room before any query is
//! issued, so readers never see a missing key. Every clear bumps the
//! generation; writes tagged with an older generation are dropped, which is
//! how an abandoned prefetch is kept from polluting a newer day.

use crate::error::HistoryError;
use crate::resolver::SampleSeries;
use crate::time_grid::TimeGrid;
use crate::traits::HistoryProvider;
use chrono::NaiveDate;
use roomclimate_types::{Quantity, RoomId, SLOTS_PER_DAY, SensorBinding, SlotReading, TimeSlot};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Slots resolved between cooperative yields
pub const PREFETCH_YIELD_EVERY: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct DayCache {
    date: Option<NaiveDate>,
    generation: u64,
    rooms: BTreeMap<RoomId, Vec<SlotReading>>,
    resolved: Vec<bool>,
}

impl DayCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drop all entries and invalidate writers holding the old generation
    pub fn clear(&mut self) -> u64 {
        self.date = None;
        self.rooms.clear();
        self.resolved.clear();
        self.generation += 1;
        self.generation
    }

    /// Start filling `date`: clear, then lay `None` placeholders for every slot.
    ///
    /// Returns the generation that writes for this fill must carry.
    pub fn begin<'a>(
        &mut self,
        date: NaiveDate,
        rooms: impl IntoIterator<Item = &'a RoomId>,
    ) -> u64 {
        let generation = self.clear();
        self.date = Some(date);
        for room in rooms {
            self.rooms
                .insert(room.clone(), vec![SlotReading::default(); SLOTS_PER_DAY]);
        }
        self.resolved = vec![false; SLOTS_PER_DAY];
        generation
    }

    /// True when the cache holds `date` under `generation`
    pub fn is_current(&self, date: NaiveDate, generation: u64) -> bool {
        self.date == Some(date) && self.generation == generation
    }

    /// Store every room's reading for one slot. Returns false for stale writers.
    pub fn store_slot(
        &mut self,
        generation: u64,
        slot: TimeSlot,
        readings: &[(RoomId, SlotReading)],
    ) -> bool {
        if generation != self.generation || self.date.is_none() {
            return false;
        }
        for (room, reading) in readings {
            if let Some(slots) = self.rooms.get_mut(room)
                && let Some(entry) = slots.get_mut(slot.index())
            {
                *entry = *reading;
            }
        }
        if let Some(flag) = self.resolved.get_mut(slot.index()) {
            *flag = true;
        }
        true
    }

    /// Cached reading, None when the room or day is not cached
    pub fn get(&self, room: &RoomId, slot: TimeSlot) -> Option<SlotReading> {
        self.rooms.get(room)?.get(slot.index()).copied()
    }

    /// Readings of every cached room for a slot of `date`
    pub fn readings_at(&self, date: NaiveDate, slot: TimeSlot) -> Vec<(RoomId, SlotReading)> {
        if self.date != Some(date) {
            return Vec::new();
        }
        self.rooms
            .iter()
            .filter_map(|(room, slots)| slots.get(slot.index()).map(|r| (room.clone(), *r)))
            .collect()
    }

    /// Whether prefetch has resolved this slot (placeholders do not count)
    pub fn is_resolved(&self, slot: TimeSlot) -> bool {
        self.resolved.get(slot.index()).copied().unwrap_or(false)
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved.iter().filter(|r| **r).count()
    }

    /// Number of slot keys present for a room
    pub fn slot_count(&self, room: &RoomId) -> usize {
        self.rooms.get(room).map_or(0, Vec::len)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

/// Progress of a prefetch job
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrefetchProgress {
    pub date: NaiveDate,
    pub generation: u64,
    /// 0.0 to 100.0
    pub percent: f64,
    pub done: bool,
}

/// How a prefetch job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PrefetchOutcome {
    /// All 288 slots were written; `failed_series` queries returned errors
    Completed {
        resolved_slots: usize,
        failed_series: usize,
    },
    /// The cache moved on (clear, other day, shutdown) before the job finished
    Abandoned,
}

/// Where a prefetch job writes. Implemented by the engine over its locked state.
pub trait PrefetchSink: Send {
    /// Store one slot; false means the job has been superseded
    fn store(&mut self, generation: u64, slot: TimeSlot, readings: Vec<(RoomId, SlotReading)>)
    -> bool;

    fn progress(&mut self, progress: PrefetchProgress);

    /// A bound series does not exist on the host
    fn series_missing(&mut self, _room: &RoomId, _quantity: Quantity, _entity_id: &str) {}
}

/// One bulk fill of a day: one query per (room, quantity), nearest-sample per slot
#[derive(Debug, Clone)]
pub struct PrefetchJob {
    pub date: NaiveDate,
    pub generation: u64,
    pub grid: TimeGrid,
    pub bindings: Vec<(RoomId, SensorBinding)>,
}

impl PrefetchJob {
    pub async fn run(
        self,
        history: &dyn HistoryProvider,
        sink: &mut dyn PrefetchSink,
    ) -> PrefetchOutcome {
        let (start, end) = self.grid.day_bounds(self.date);
        info!(
            "📦 [PREFETCH] Fetching {} for {} rooms via {}",
            self.date,
            self.bindings.len(),
            history.name()
        );

        let mut series: BTreeMap<(RoomId, Quantity), SampleSeries> = BTreeMap::new();
        let mut failed_series = 0;
        for (room, binding) in &self.bindings {
            for (quantity, entity_id) in binding.bound() {
                match history.query(entity_id, start, end).await {
                    Ok(samples) => {
                        let parsed = SampleSeries::from_raw(&samples);
                        debug!(
                            "📦 [PREFETCH] {} {}: {} raw, {} valid samples",
                            room,
                            quantity,
                            samples.len(),
                            parsed.len()
                        );
                        series.insert((room.clone(), quantity), parsed);
                    }
                    Err(HistoryError::EntityNotFound(entity)) => {
                        warn!("⚠️ [PREFETCH] Entity not found: {}", entity);
                        sink.series_missing(room, quantity, entity_id);
                        failed_series += 1;
                    }
                    Err(e) => {
                        warn!("⚠️ [PREFETCH] Query failed for {}: {}", entity_id, e);
                        failed_series += 1;
                    }
                }
            }
        }

        for (index, slot) in TimeSlot::all().enumerate() {
            let target = self.grid.instant_of(self.date, slot);
            let readings = self
                .bindings
                .iter()
                .map(|(room, _)| {
                    let mut reading = SlotReading::default();
                    for quantity in Quantity::all() {
                        let value = series
                            .get(&(room.clone(), *quantity))
                            .and_then(|s| s.nearest(target));
                        reading.set(*quantity, value);
                    }
                    (room.clone(), reading)
                })
                .collect();

            if !sink.store(self.generation, slot, readings) {
                debug!(
                    "📦 [PREFETCH] {} generation {} superseded at slot {}",
                    self.date, self.generation, slot
                );
                return PrefetchOutcome::Abandoned;
            }

            let done = index + 1;
            sink.progress(PrefetchProgress {
                date: self.date,
                generation: self.generation,
                percent: done as f64 * 100.0 / SLOTS_PER_DAY as f64,
                done: done == SLOTS_PER_DAY,
            });

            if done % PREFETCH_YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
        }

        info!(
            "✅ [PREFETCH] {} complete ({} series failed)",
            self.date, failed_series
        );
        PrefetchOutcome::Completed {
            resolved_slots: SLOTS_PER_DAY,
            failed_series,
        }
    }
}
