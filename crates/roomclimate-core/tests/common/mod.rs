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

//! Shared fakes for engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use roomclimate_core::{
    Collaborators, DisplayAdapter, Engine, EngineConfig, HistoryError, HistoryProvider,
    HistoryResult, LiveStateSource, ManualClock, SyncMode,
};
use roomclimate_types::{Quantity, RawSample, ResolvedValue, RoomId, SensorBinding, TimeSlot};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

pub const LIVING_T: &str = "sensor.living_temperature";
pub const LIVING_H: &str = "sensor.living_humidity";
pub const BEDROOM_T: &str = "sensor.bedroom_temperature";

pub fn living() -> RoomId {
    RoomId::from("living")
}

pub fn bedroom() -> RoomId {
    RoomId::from("bedroom")
}

/// 2025-06-01, the "today" of every test
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}

pub fn at(date: NaiveDate, h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(h, m, s).unwrap())
}

pub fn slot(h: u32, m: u32) -> TimeSlot {
    TimeSlot::from_hm(h, m)
}

/// In-memory history with call counting and an optional gate
#[derive(Default)]
pub struct FakeHistory {
    samples: Mutex<HashMap<String, Vec<RawSample>>>,
    missing: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    calls: AtomicUsize,
}

impl FakeHistory {
    pub fn add(&self, entity_id: &str, timestamp: DateTime<Utc>, state: &str) {
        self.samples
            .lock()
            .entry(entity_id.to_owned())
            .or_default()
            .push(RawSample::new(timestamp, state));
    }

    pub fn mark_missing(&self, entity_id: &str) {
        self.missing.lock().insert(entity_id.to_owned());
    }

    pub fn mark_failing(&self, entity_id: &str) {
        self.failing.lock().insert(entity_id.to_owned());
    }

    /// Block every following query until the returned semaphore gets permits
    pub fn close_gate(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    /// New queries pass again; queries already waiting stay blocked
    pub fn open_gate(&self) {
        *self.gate.lock() = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryProvider for FakeHistory {
    async fn query(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> HistoryResult<Vec<RawSample>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            let permit = gate.acquire().await.unwrap();
            permit.forget();
        }
        if self.missing.lock().contains(entity_id) {
            return Err(HistoryError::EntityNotFound(entity_id.to_owned()));
        }
        if self.failing.lock().contains(entity_id) {
            return Err(HistoryError::Unavailable("connection reset".to_owned()));
        }
        Ok(self
            .samples
            .lock()
            .get(entity_id)
            .map(|all| {
                all.iter()
                    .filter(|s| s.timestamp >= start && s.timestamp < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "FakeHistory"
    }
}

#[derive(Default)]
pub struct FakeLive {
    states: Mutex<HashMap<String, String>>,
}

impl FakeLive {
    pub fn set(&self, entity_id: &str, state: &str) {
        self.states
            .lock()
            .insert(entity_id.to_owned(), state.to_owned());
    }
}

impl LiveStateSource for FakeLive {
    fn read(&self, entity_id: &str) -> Option<String> {
        self.states.lock().get(entity_id).cloned()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Update(RoomId, Quantity, ResolvedValue),
    Timeline(TimeSlot, f64),
    Playback(bool),
    Progress(NaiveDate, f64),
    Message(String),
    Date(NaiveDate),
    Mode(SyncMode),
}

#[derive(Default)]
pub struct RecordingDisplay {
    calls: Mutex<Vec<Call>>,
}

impl RecordingDisplay {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Every value pushed for one room series, in order
    pub fn values(&self, room: &RoomId, quantity: Quantity) -> Vec<ResolvedValue> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Update(r, q, v) if r == room && *q == quantity => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// What the room currently shows; None if never updated
    pub fn shown(&self, room: &RoomId, quantity: Quantity) -> Option<ResolvedValue> {
        self.values(room, quantity).last().copied()
    }

    pub fn last_timeline(&self) -> Option<(TimeSlot, f64)> {
        self.calls.lock().iter().rev().find_map(|c| match c {
            Call::Timeline(slot, fraction) => Some((*slot, *fraction)),
            _ => None,
        })
    }

    pub fn messages(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Message(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn playback_events(&self) -> Vec<bool> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Playback(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<f64> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Progress(_, p) => Some(*p),
                _ => None,
            })
            .collect()
    }
}

impl DisplayAdapter for RecordingDisplay {
    fn update(&self, room: &RoomId, quantity: Quantity, value: ResolvedValue) {
        self.calls
            .lock()
            .push(Call::Update(room.clone(), quantity, value));
    }

    fn set_timeline_position(&self, slot: TimeSlot, available_fraction: f64) {
        self.calls
            .lock()
            .push(Call::Timeline(slot, available_fraction));
    }

    fn playback_changed(&self, playing: bool) {
        self.calls.lock().push(Call::Playback(playing));
    }

    fn prefetch_progress(&self, date: NaiveDate, percent: f64) {
        self.calls.lock().push(Call::Progress(date, percent));
    }

    fn show_message(&self, message: &str) {
        self.calls.lock().push(Call::Message(message.to_owned()));
    }

    fn date_changed(&self, date: NaiveDate) {
        self.calls.lock().push(Call::Date(date));
    }

    fn mode_changed(&self, mode: SyncMode) {
        self.calls.lock().push(Call::Mode(mode));
    }
}

pub struct Harness {
    pub engine: Engine,
    pub history: Arc<FakeHistory>,
    pub live: Arc<FakeLive>,
    pub display: Arc<RecordingDisplay>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    /// Two rooms, three bound series, UTC, clock at `now`
    pub fn new(now: DateTime<Utc>, prefetch_on_day_change: bool) -> Self {
        let history = Arc::new(FakeHistory::default());
        let live = Arc::new(FakeLive::default());
        let display = Arc::new(RecordingDisplay::default());
        let clock = Arc::new(ManualClock::new(now));

        let config = EngineConfig {
            rooms: vec![
                (
                    living(),
                    SensorBinding {
                        temperature: Some(LIVING_T.to_owned()),
                        humidity: Some(LIVING_H.to_owned()),
                    },
                ),
                (
                    bedroom(),
                    SensorBinding {
                        temperature: Some(BEDROOM_T.to_owned()),
                        humidity: None,
                    },
                ),
            ],
            timezone: Tz::UTC,
            prefetch_on_day_change,
            chart_history_days: 1,
        };
        let engine = Engine::new(
            config,
            Collaborators {
                history: history.clone(),
                live: live.clone(),
                display: display.clone(),
                clock: clock.clone(),
            },
        );

        Self {
            engine,
            history,
            live,
            display,
            clock,
        }
    }

    pub fn advance_clock(&self, seconds: i64) {
        self.clock.advance(chrono::Duration::seconds(seconds));
    }
}

/// Let spawned tasks run without moving time
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
