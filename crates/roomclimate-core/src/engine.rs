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

//! The widget session: all mutable timeline state plus its timers.
//!
//! State lives behind a single mutex that is never held across `.await` and
//! never held while calling the [`DisplayAdapter`]. Every operation collects
//! the display updates it wants to make while locked and dispatches them
//! after the lock is released.
//!
//! Asynchronous point resolutions carry a [`ViewTag`]. A result is shown only
//! if the engine still looks at the same date, slot and view epoch when the
//! result arrives.

use crate::day_cache::{DayCache, PrefetchJob, PrefetchOutcome, PrefetchProgress, PrefetchSink};
use crate::error::{EngineError, EngineResult, HistoryError};
use crate::playback::{AutoAdvance, CEILING_REFRESH, PlaybackState, PlaybackStep};
use crate::resolver::{SampleSeries, ValueResolver};
use crate::scheduler::{Scheduler, TimerRole};
use crate::sync_mode::{SyncMode, SyncModeController, Transition};
use crate::time_grid::TimeGrid;
use crate::traits::{Clock, DisplayAdapter, HistoryProvider, LiveStateSource};
use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use roomclimate_types::{
    Quantity, ResolvedValue, RoomId, SensorBinding, SlotReading, TimeSlot, WidgetConfig,
    parse_numeric_state,
};
use serde::Serialize;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Static engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Rooms in display order with their sensor bindings
    pub rooms: Vec<(RoomId, SensorBinding)>,
    pub timezone: Tz,
    /// Start a background prefetch whenever a historical day is selected
    pub prefetch_on_day_change: bool,
    pub chart_history_days: u32,
}

impl EngineConfig {
    pub fn from_widget(config: &WidgetConfig, timezone: Tz) -> Self {
        Self {
            rooms: config.room_bindings(),
            timezone,
            prefetch_on_day_change: config.prefetch_on_day_change,
            chart_history_days: config.chart_history_days,
        }
    }
}

/// Host-side implementations the engine talks to
#[derive(Clone)]
pub struct Collaborators {
    pub history: Arc<dyn HistoryProvider>,
    pub live: Arc<dyn LiveStateSource>,
    pub display: Arc<dyn DisplayAdapter>,
    pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("history", &self.history.name())
            .finish_non_exhaustive()
    }
}

/// What an asynchronous resolution was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewTag {
    pub date: NaiveDate,
    pub slot: TimeSlot,
    pub generation: u64,
}

/// Point-in-time view of the engine, for diagnostics and tests
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub mode: SyncMode,
    pub playback: PlaybackState,
    pub view_generation: u64,
    pub cache_date: Option<NaiveDate>,
    pub cache_generation: u64,
    pub cached_slots: usize,
    pub prefetch_in_flight: bool,
    pub last_interaction: DateTime<Utc>,
    pub auto_advance_running: bool,
    pub playback_running: bool,
    pub live_refresh_running: bool,
}

/// What the one-second poll did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondTick {
    Idle,
    RevertedToLive,
    AutoAdvanced,
}

#[derive(Debug, Clone, Copy)]
struct PrefetchStatus {
    progress: Option<PrefetchProgress>,
    outcome: Option<PrefetchOutcome>,
}

#[derive(Debug)]
struct InFlight {
    date: NaiveDate,
    generation: u64,
    status: watch::Receiver<PrefetchStatus>,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
struct EngineState {
    mode: SyncModeController,
    playback: PlaybackState,
    view_generation: u64,
    cache: DayCache,
    in_flight: Option<InFlight>,
    /// Last finished prefetch: (date, cache generation, outcome)
    completed: Option<(NaiveDate, u64, PrefetchOutcome)>,
    auto_advance: AutoAdvance,
    ceiling_updated_at: DateTime<Utc>,
    shut_down: bool,
}

#[derive(Debug, Clone)]
enum DisplayEvent {
    Value {
        room: RoomId,
        quantity: Quantity,
        value: ResolvedValue,
    },
    Timeline {
        slot: TimeSlot,
        fraction: f64,
    },
    Playback(bool),
    Date(NaiveDate),
    Mode(SyncMode),
}

/// Display updates and timer changes produced under the state lock
#[derive(Debug, Default)]
struct Effects {
    events: Vec<DisplayEvent>,
    stop_playback_timer: bool,
    /// Some(true): make sure live refresh runs; Some(false): stop it
    live_refresh: Option<bool>,
}

struct Inner {
    config: EngineConfig,
    grid: TimeGrid,
    resolver: ValueResolver,
    history: Arc<dyn HistoryProvider>,
    live: Arc<dyn LiveStateSource>,
    display: Arc<dyn DisplayAdapter>,
    clock: Arc<dyn Clock>,
    state: Mutex<EngineState>,
    scheduler: Scheduler,
}

/// Cloneable handle to one widget session
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("rooms", &self.inner.config.rooms.len())
            .field("timezone", &self.inner.config.timezone)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let grid = TimeGrid::new(config.timezone);
        let now = collaborators.clock.now();
        let state = EngineState {
            mode: SyncModeController::new(now),
            playback: PlaybackState::new(grid.date_of(now), grid.slot_of(now)),
            view_generation: 0,
            cache: DayCache::new(),
            in_flight: None,
            completed: None,
            auto_advance: AutoAdvance::default(),
            ceiling_updated_at: now,
            shut_down: false,
        };

        Self {
            inner: Arc::new(Inner {
                grid,
                resolver: ValueResolver::new(grid),
                history: collaborators.history,
                live: collaborators.live,
                display: collaborators.display,
                clock: collaborators.clock,
                state: Mutex::new(state),
                scheduler: Scheduler::new(),
                config,
            }),
        }
    }

    pub fn grid(&self) -> TimeGrid {
        self.inner.grid
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // ============= Lifecycle =============

    /// Show live data and arm the one-second poll and the live refresh
    pub fn start(&self) {
        let now = self.inner.clock.now();
        let effects = {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return;
            }
            let mut effects = self.enter_live_locked(&mut state, now);
            effects
                .events
                .insert(0, DisplayEvent::Date(state.playback.selected_date));
            effects
        };
        info!(
            "🚀 [ENGINE] Starting with {} rooms in {}",
            self.inner.config.rooms.len(),
            self.inner.config.timezone
        );
        self.apply(effects);
        self.check_entities();
        self.start_timer(TimerRole::AutoAdvance);
    }

    /// Cancel all timers and any in-flight prefetch. Nothing fires afterwards.
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            state.playback.is_playing = false;
            Self::clear_cache_locked(&mut state);
        }
        self.inner.scheduler.stop_all();
        info!("🛑 [ENGINE] Shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.state.lock().shut_down
    }

    // ============= Navigation =============

    pub fn record_interaction(&self) {
        let now = self.inner.clock.now();
        self.inner.state.lock().mode.record_interaction(now);
    }

    /// Move the timeline to `slot` on the selected date (enters Historical)
    pub async fn scrub_to(&self, slot: TimeSlot) {
        let now = self.inner.clock.now();
        let today = self.inner.grid.date_of(now);
        let (effects, pending) = {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return;
            }
            state.mode.record_interaction(now);
            let mut effects = Effects::default();
            self.stop_playing_locked(&mut state, &mut effects);

            let slot = state.playback.clamp(slot, today);
            state.playback.current_slot = slot;
            self.enter_historical_locked(&mut state, &mut effects);
            effects.events.push(Self::timeline_event(&state, today));
            let pending = self.show_slot_locked(&mut state, &mut effects);
            (effects, pending)
        };
        debug!("🎚️ [ENGINE] Scrubbed to {}", slot);
        self.apply(effects);
        if let Some(tag) = pending {
            self.resolve_point(tag).await;
        }
    }

    /// Move the selected date by `delta` days, keeping the slot
    pub async fn step_day(&self, delta: i64) {
        let current = self.inner.state.lock().playback.selected_date;
        let target = if delta >= 0 {
            current.checked_add_days(Days::new(delta.unsigned_abs()))
        } else {
            current.checked_sub_days(Days::new(delta.unsigned_abs()))
        };
        if let Some(date) = target {
            self.select_date(date).await;
        }
    }

    /// Show `date` (date picker, day buttons).
    ///
    /// Today at the live slot is Live; anything else is Historical.
    pub async fn select_date(&self, date: NaiveDate) {
        let now = self.inner.clock.now();
        let today = self.inner.grid.date_of(now);
        let now_slot = self.inner.grid.slot_of(now);
        let (effects, pending) = {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return;
            }
            state.mode.record_interaction(now);
            let mut effects = Effects::default();

            if state.playback.selected_date != date {
                state.playback.selected_date = date;
                if date == today || state.cache.date() != Some(date) {
                    Self::clear_cache_locked(&mut state);
                }
                state.view_generation += 1;
                effects.events.push(DisplayEvent::Date(date));
            }
            let slot = state.playback.clamp(state.playback.current_slot, today);
            state.playback.current_slot = slot;

            let target = SyncModeController::mode_for_selection(date, slot, today, now_slot);
            if target == SyncMode::Live {
                let live = self.enter_live_locked(&mut state, now);
                effects.merge(live);
                (effects, None)
            } else {
                self.enter_historical_locked(&mut state, &mut effects);
                effects.events.push(Self::timeline_event(&state, today));
                if self.inner.config.prefetch_on_day_change && state.cache.date() != Some(date) {
                    self.begin_prefetch_locked(&mut state, date);
                }
                let pending = self.show_slot_locked(&mut state, &mut effects);
                (effects, pending)
            }
        };
        info!("📅 [ENGINE] Selected {}", date);
        self.apply(effects);
        if let Some(tag) = pending {
            self.resolve_point(tag).await;
        }
    }

    /// Today, current slot, Live
    pub fn jump_to_now(&self) {
        let now = self.inner.clock.now();
        let effects = {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return;
            }
            state.mode.record_interaction(now);
            self.enter_live_locked(&mut state, now)
        };
        info!("⏩ [ENGINE] Jumped to now");
        self.apply(effects);
    }

    // ============= Playback =============

    /// Start stepping the timeline every 500 ms. False if already playing.
    pub fn play(&self) -> bool {
        let now = self.inner.clock.now();
        let effects = {
            let mut state = self.inner.state.lock();
            if state.shut_down || state.playback.is_playing {
                return false;
            }
            state.mode.record_interaction(now);
            state.playback.is_playing = true;
            let mut effects = Effects::default();
            self.enter_historical_locked(&mut state, &mut effects);
            effects.events.push(DisplayEvent::Playback(true));
            effects
        };
        info!("▶️ [PLAYBACK] Started");
        self.apply(effects);
        self.start_timer(TimerRole::Playback);
        true
    }

    /// Stop playback. Idempotent; returns true if it was playing.
    pub fn stop_playback(&self) -> bool {
        let mut effects = Effects::default();
        {
            let mut state = self.inner.state.lock();
            self.stop_playing_locked(&mut state, &mut effects);
        }
        let was_playing = !effects.events.is_empty();
        effects.stop_playback_timer = true;
        self.apply(effects);
        if was_playing {
            info!("⏹️ [PLAYBACK] Stopped");
        }
        was_playing
    }

    /// One playback tick. None when not playing.
    pub async fn advance_playback(&self) -> Option<PlaybackStep> {
        let now = self.inner.clock.now();
        let today = self.inner.grid.date_of(now);
        let (step, effects, tag) = {
            let mut state = self.inner.state.lock();
            if state.shut_down || !state.playback.is_playing {
                return None;
            }
            let previous = state.playback.current_slot;
            let step = state.playback.next_step(today);
            let stops = state.playback.apply(step);
            let mut effects = Effects::default();

            if let PlaybackStep::WrappedToNextDay(date) = step {
                Self::clear_cache_locked(&mut state);
                state.view_generation += 1;
                effects.events.push(DisplayEvent::Date(date));
                if self.inner.config.prefetch_on_day_change {
                    self.begin_prefetch_locked(&mut state, date);
                }
            }
            effects.events.push(Self::timeline_event(&state, today));
            if stops {
                effects.events.push(DisplayEvent::Playback(false));
            }

            let moved = matches!(step, PlaybackStep::WrappedToNextDay(_))
                || state.playback.current_slot != previous;
            let tag = moved.then(|| Self::view_tag(&state));
            (step, effects, tag)
        };

        match step {
            PlaybackStep::Advanced(slot) => debug!("▶️ [PLAYBACK] {}", slot),
            PlaybackStep::Clamped(slot) => info!("⏹️ [PLAYBACK] Reached now ({}), stopping", slot),
            PlaybackStep::WrappedToNextDay(date) => {
                info!("⏹️ [PLAYBACK] End of day, moved to {} and stopped", date);
            }
        }
        self.apply(effects);
        if let Some(tag) = tag {
            self.resolve_point(tag).await;
        }
        Some(step)
    }

    // ============= Live =============

    /// Re-read live state and push it. Returns the number of values pushed.
    pub fn refresh_live(&self) -> usize {
        let now = self.inner.clock.now();
        let effects = {
            let mut state = self.inner.state.lock();
            if state.shut_down || !state.mode.is_live() {
                return 0;
            }
            let mut effects = Effects::default();
            self.live_read_locked(&mut state, now, &mut effects);
            effects
        };
        let pushed = effects
            .events
            .iter()
            .filter(|e| matches!(e, DisplayEvent::Value { .. }))
            .count();
        debug!("🔄 [LIVE] Refreshed {} values", pushed);
        self.apply(effects);
        pushed
    }

    /// The one-second poll: ceiling refresh, inactivity reversion, auto-advance
    pub fn on_second_tick(&self) -> SecondTick {
        let now = self.inner.clock.now();
        let today = self.inner.grid.date_of(now);
        let now_slot = self.inner.grid.slot_of(now);
        let (outcome, effects) = {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return SecondTick::Idle;
            }
            let mut effects = Effects::default();

            let since_ceiling = (now - state.ceiling_updated_at).to_std().unwrap_or_default();
            if since_ceiling >= CEILING_REFRESH {
                state.playback.max_slot_for_today = now_slot;
                state.ceiling_updated_at = now;
                if state.playback.is_today(today) {
                    effects.events.push(Self::timeline_event(&state, today));
                }
            }

            if state.mode.poll(now) == Transition::EnteredLive {
                info!(
                    "⏰ [ENGINE] No interaction for {}s, returning to live",
                    state.mode.idle_for(now).as_secs()
                );
                let live = self.enter_live_locked(&mut state, now);
                effects.merge(live);
                (SecondTick::RevertedToLive, effects)
            } else if state.mode.is_live()
                && state.auto_advance.check(now, self.inner.config.timezone)
                && (state.playback.current_slot != now_slot
                    || state.playback.selected_date != today)
            {
                if state.playback.selected_date != today {
                    state.playback.selected_date = today;
                    effects.events.push(DisplayEvent::Date(today));
                }
                state.playback.current_slot = now_slot;
                self.live_read_locked(&mut state, now, &mut effects);
                debug!("⏭️ [ENGINE] Auto-advanced to {}", now_slot);
                (SecondTick::AutoAdvanced, effects)
            } else {
                (SecondTick::Idle, effects)
            }
        };
        self.apply(effects);
        outcome
    }

    // ============= Prefetch =============

    /// Bulk-fill the cache for `date`, joining a job already running for it
    pub async fn prefetch(&self, date: NaiveDate) -> PrefetchOutcome {
        let status = {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return PrefetchOutcome::Abandoned;
            }
            if let Some((done_date, generation, outcome)) = state.completed
                && done_date == date
                && state.cache.is_current(date, generation)
            {
                return outcome;
            }
            self.begin_prefetch_locked(&mut state, date)
        };
        Self::wait_for_prefetch(status).await
    }

    /// Prefetch the selected date
    pub async fn prefetch_selected(&self) -> PrefetchOutcome {
        let date = self.inner.state.lock().playback.selected_date;
        self.prefetch(date).await
    }

    /// Current prefetch progress, if a job is running
    pub fn prefetch_progress(&self) -> Option<PrefetchProgress> {
        let state = self.inner.state.lock();
        let job = state.in_flight.as_ref()?;
        let progress = job.status.borrow().progress;
        progress
    }

    /// Cached reading of a room at a slot of the cached day
    pub fn cached_reading(&self, room: &RoomId, slot: TimeSlot) -> Option<SlotReading> {
        self.inner.state.lock().cache.get(room, slot)
    }

    async fn wait_for_prefetch(mut status: watch::Receiver<PrefetchStatus>) -> PrefetchOutcome {
        match status.wait_for(|s| s.outcome.is_some()).await {
            Ok(s) => s.outcome.unwrap_or(PrefetchOutcome::Abandoned),
            // job task aborted before reporting
            Err(_) => PrefetchOutcome::Abandoned,
        }
    }

    fn begin_prefetch_locked(
        &self,
        state: &mut EngineState,
        date: NaiveDate,
    ) -> watch::Receiver<PrefetchStatus> {
        if let Some(job) = &state.in_flight
            && job.date == date
            && state.cache.is_current(date, job.generation)
        {
            debug!("📦 [PREFETCH] Joining running job for {}", date);
            return job.status.clone();
        }
        if let Some(previous) = state.in_flight.take() {
            previous.handle.abort();
        }

        let generation = state
            .cache
            .begin(date, self.inner.config.rooms.iter().map(|(room, _)| room));
        state.completed = None;
        let (tx, rx) = watch::channel(PrefetchStatus {
            progress: None,
            outcome: None,
        });
        let job = PrefetchJob {
            date,
            generation,
            grid: self.inner.grid,
            bindings: self.inner.config.rooms.clone(),
        };

        let engine = self.clone();
        let handle = tokio::spawn(async move {
            let mut sink = EngineSink {
                engine: &engine,
                date,
                status: tx,
            };
            let outcome = job.run(engine.inner.history.as_ref(), &mut sink).await;
            {
                let mut state = engine.inner.state.lock();
                if state
                    .in_flight
                    .as_ref()
                    .is_some_and(|j| j.generation == generation)
                {
                    state.in_flight = None;
                }
                if matches!(outcome, PrefetchOutcome::Completed { .. })
                    && state.cache.is_current(date, generation)
                {
                    state.completed = Some((date, generation, outcome));
                }
            }
            sink.status.send_modify(|s| s.outcome = Some(outcome));
        });

        state.in_flight = Some(InFlight {
            date,
            generation,
            status: rx.clone(),
            handle,
        });
        rx
    }

    // ============= Supplementary queries =============

    /// Valid `(timestamp, value)` points of one room series over `days` days.
    ///
    /// The window ends now when today is selected, otherwise at the end of
    /// the selected day.
    pub async fn history_series(
        &self,
        room: &RoomId,
        quantity: Quantity,
        days: u32,
    ) -> EngineResult<Vec<(DateTime<Utc>, f64)>> {
        let binding = self
            .inner
            .config
            .rooms
            .iter()
            .find(|(id, _)| id == room)
            .map(|(_, binding)| binding)
            .ok_or_else(|| EngineError::UnknownRoom(room.to_string()))?;
        let entity_id = binding
            .entity(quantity)
            .ok_or_else(|| EngineError::Unbound {
                room: room.to_string(),
                quantity: quantity.to_string(),
            })?;

        let now = self.inner.clock.now();
        let selected = {
            let state = self.inner.state.lock();
            if state.shut_down {
                return Err(EngineError::ShutDown);
            }
            state.playback.selected_date
        };
        let end = if selected == self.inner.grid.date_of(now) {
            now
        } else {
            self.inner.grid.day_bounds(selected).1
        };
        let start = end - chrono::Duration::days(i64::from(days.max(1)));

        info!(
            "📈 [HISTORY] {} {} over {} day(s) ending {}",
            room, quantity, days, end
        );
        match self.inner.history.query(entity_id, start, end).await {
            Ok(samples) => Ok(SampleSeries::from_raw(&samples).points().collect()),
            Err(HistoryError::EntityNotFound(entity)) => {
                warn!("⚠️ [HISTORY] Entity not found: {}", entity);
                self.inner
                    .display
                    .show_message(&format!("Entity not found: {entity}"));
                Err(EngineError::History(HistoryError::EntityNotFound(entity)))
            }
            Err(e) => {
                warn!("⚠️ [HISTORY] Series query failed for {}: {}", entity_id, e);
                Ok(Vec::new())
            }
        }
    }

    /// Bound entities the live snapshot does not know
    pub fn check_entities(&self) -> Vec<String> {
        let missing: Vec<String> = self
            .inner
            .config
            .rooms
            .iter()
            .flat_map(|(_, binding)| binding.bound())
            .filter(|(_, entity_id)| self.inner.live.read(entity_id).is_none())
            .map(|(_, entity_id)| entity_id.to_owned())
            .collect();
        for entity_id in &missing {
            warn!("⚠️ [ENGINE] Bound entity not found in live state: {}", entity_id);
        }
        missing
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let scheduler = &self.inner.scheduler;
        let state = self.inner.state.lock();
        EngineSnapshot {
            mode: state.mode.mode(),
            playback: state.playback,
            view_generation: state.view_generation,
            cache_date: state.cache.date(),
            cache_generation: state.cache.generation(),
            cached_slots: state.cache.resolved_count(),
            prefetch_in_flight: state.in_flight.is_some(),
            last_interaction: state.mode.last_interaction(),
            auto_advance_running: scheduler.is_running(TimerRole::AutoAdvance),
            playback_running: scheduler.is_running(TimerRole::Playback),
            live_refresh_running: scheduler.is_running(TimerRole::LiveRefresh),
        }
    }

    // ============= Internals =============

    fn view_tag(state: &EngineState) -> ViewTag {
        ViewTag {
            date: state.playback.selected_date,
            slot: state.playback.current_slot,
            generation: state.view_generation,
        }
    }

    fn is_current(state: &EngineState, tag: ViewTag) -> bool {
        !state.shut_down && !state.mode.is_live() && Self::view_tag(state) == tag
    }

    fn timeline_event(state: &EngineState, today: NaiveDate) -> DisplayEvent {
        DisplayEvent::Timeline {
            slot: state.playback.current_slot,
            fraction: state.playback.available_fraction(today),
        }
    }

    fn clear_cache_locked(state: &mut EngineState) {
        state.cache.clear();
        state.completed = None;
        if let Some(job) = state.in_flight.take() {
            job.handle.abort();
            debug!("📦 [PREFETCH] Abandoned job for {}", job.date);
        }
    }

    fn stop_playing_locked(&self, state: &mut EngineState, effects: &mut Effects) {
        if state.playback.is_playing {
            state.playback.is_playing = false;
            effects.events.push(DisplayEvent::Playback(false));
            effects.stop_playback_timer = true;
        }
    }

    fn enter_historical_locked(&self, state: &mut EngineState, effects: &mut Effects) {
        if state.mode.enter_historical().changed() {
            // a cache built while Live is never carried into Historical
            Self::clear_cache_locked(state);
            state.view_generation += 1;
            effects.events.push(DisplayEvent::Mode(SyncMode::Historical));
            effects.live_refresh = Some(false);
            info!("🕰️ [ENGINE] Entered historical mode");
        }
    }

    /// Today, now slot, live values; also stops playback
    fn enter_live_locked(&self, state: &mut EngineState, now: DateTime<Utc>) -> Effects {
        let mut effects = Effects::default();
        if state.mode.enter_live().changed() {
            effects.events.push(DisplayEvent::Mode(SyncMode::Live));
            info!("🟢 [ENGINE] Entered live mode");
        }
        state.view_generation += 1;
        self.stop_playing_locked(state, &mut effects);

        let today = self.inner.grid.date_of(now);
        if state.playback.selected_date != today {
            state.playback.selected_date = today;
            Self::clear_cache_locked(state);
            effects.events.push(DisplayEvent::Date(today));
        }
        state.playback.current_slot = self.inner.grid.slot_of(now);
        self.live_read_locked(state, now, &mut effects);
        effects.live_refresh = Some(true);
        effects
    }

    /// Recompute the ceiling and push every room's live value
    fn live_read_locked(&self, state: &mut EngineState, now: DateTime<Utc>, effects: &mut Effects) {
        let today = self.inner.grid.date_of(now);
        state.playback.max_slot_for_today = self.inner.grid.slot_of(now);
        state.ceiling_updated_at = now;
        if state.playback.is_today(today) {
            state.playback.current_slot = state.playback.clamp(state.playback.current_slot, today);
        }
        effects.events.push(Self::timeline_event(state, today));

        for (room, binding) in &self.inner.config.rooms {
            for quantity in Quantity::all() {
                let value = binding
                    .entity(*quantity)
                    .and_then(|entity_id| self.inner.live.read(entity_id))
                    .and_then(|raw| parse_numeric_state(&raw));
                effects.events.push(DisplayEvent::Value {
                    room: room.clone(),
                    quantity: *quantity,
                    value,
                });
            }
        }
    }

    /// Show the current slot from the cache when resolved there.
    ///
    /// Otherwise every room is shown as "no data" and the returned tag must
    /// be resolved by a point query.
    fn show_slot_locked(&self, state: &mut EngineState, effects: &mut Effects) -> Option<ViewTag> {
        let date = state.playback.selected_date;
        let slot = state.playback.current_slot;
        let cached = state.cache.date() == Some(date) && state.cache.is_resolved(slot);
        let readings: Vec<(RoomId, SlotReading)> = if cached {
            state.cache.readings_at(date, slot)
        } else {
            self.inner
                .config
                .rooms
                .iter()
                .map(|(room, _)| (room.clone(), SlotReading::default()))
                .collect()
        };
        effects.events.extend(Self::reading_events(readings));
        (!cached).then(|| Self::view_tag(state))
    }

    fn reading_events(readings: Vec<(RoomId, SlotReading)>) -> impl Iterator<Item = DisplayEvent> {
        readings.into_iter().flat_map(|(room, reading)| {
            Quantity::all().iter().map(move |quantity| DisplayEvent::Value {
                room: room.clone(),
                quantity: *quantity,
                value: reading.get(*quantity),
            })
        })
    }

    /// Resolve every bound series at the tagged slot with the full algorithm.
    ///
    /// Each result is dropped if the view moved on while it was in flight.
    async fn resolve_point(&self, tag: ViewTag) -> usize {
        let target = self.inner.grid.instant_of(tag.date, tag.slot);
        let (start, end) = self.inner.resolver.point_window(target);
        let mut applied = 0;

        for (room, binding) in &self.inner.config.rooms {
            for quantity in Quantity::all() {
                let value = match binding.entity(*quantity) {
                    Some(entity_id) => match self.inner.history.query(entity_id, start, end).await {
                        Ok(samples) => SampleSeries::from_raw(&samples).resolve(&self.inner.grid, target),
                        Err(e) => {
                            warn!("⚠️ [HISTORY] Point query failed for {}: {}", entity_id, e);
                            None
                        }
                    },
                    None => None,
                };

                let current = Self::is_current(&self.inner.state.lock(), tag);
                if !current {
                    debug!(
                        "🗑️ [HISTORY] Dropping stale result for {} {}",
                        tag.date, tag.slot
                    );
                    return applied;
                }
                self.inner.display.update(room, *quantity, value);
                applied += 1;
            }
        }
        applied
    }

    fn start_timer(&self, role: TimerRole) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.scheduler.start(role, move || {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return ControlFlow::Break(());
                };
                let engine = Engine { inner };
                match role {
                    TimerRole::AutoAdvance => {
                        engine.on_second_tick();
                        ControlFlow::Continue(())
                    }
                    TimerRole::Playback => match engine.advance_playback().await {
                        Some(step) if !step.stops() => ControlFlow::Continue(()),
                        _ => ControlFlow::Break(()),
                    },
                    TimerRole::LiveRefresh => {
                        engine.refresh_live();
                        ControlFlow::Continue(())
                    }
                }
            }
        });
    }

    fn apply(&self, effects: Effects) {
        let scheduler = &self.inner.scheduler;
        if effects.stop_playback_timer {
            scheduler.stop(TimerRole::Playback);
        }
        match effects.live_refresh {
            Some(true) if !scheduler.is_running(TimerRole::LiveRefresh) => {
                self.start_timer(TimerRole::LiveRefresh);
            }
            Some(false) => {
                scheduler.stop(TimerRole::LiveRefresh);
            }
            _ => {}
        }
        self.dispatch(effects.events);
    }

    fn dispatch(&self, events: Vec<DisplayEvent>) {
        let display = &self.inner.display;
        for event in events {
            match event {
                DisplayEvent::Value {
                    room,
                    quantity,
                    value,
                } => display.update(&room, quantity, value),
                DisplayEvent::Timeline { slot, fraction } => {
                    display.set_timeline_position(slot, fraction);
                }
                DisplayEvent::Playback(playing) => display.playback_changed(playing),
                DisplayEvent::Date(date) => display.date_changed(date),
                DisplayEvent::Mode(mode) => display.mode_changed(mode),
            }
        }
    }
}

impl Effects {
    fn merge(&mut self, other: Effects) {
        self.events.extend(other.events);
        self.stop_playback_timer |= other.stop_playback_timer;
        if other.live_refresh.is_some() {
            self.live_refresh = other.live_refresh;
        }
    }
}

/// Prefetch writes go through the engine lock; the visible slot is pushed as it lands
struct EngineSink<'a> {
    engine: &'a Engine,
    date: NaiveDate,
    status: watch::Sender<PrefetchStatus>,
}

impl PrefetchSink for EngineSink<'_> {
    fn store(
        &mut self,
        generation: u64,
        slot: TimeSlot,
        readings: Vec<(RoomId, SlotReading)>,
    ) -> bool {
        let events: Vec<DisplayEvent> = {
            let mut state = self.engine.inner.state.lock();
            if !state.cache.store_slot(generation, slot, &readings) {
                return false;
            }
            let visible = !state.mode.is_live()
                && state.playback.selected_date == self.date
                && state.playback.current_slot == slot;
            if visible {
                Engine::reading_events(readings).collect()
            } else {
                Vec::new()
            }
        };
        self.engine.dispatch(events);
        true
    }

    fn progress(&mut self, progress: PrefetchProgress) {
        self.status.send_modify(|s| s.progress = Some(progress));
        self.engine
            .inner
            .display
            .prefetch_progress(progress.date, progress.percent);
    }

    fn series_missing(&mut self, room: &RoomId, quantity: Quantity, entity_id: &str) {
        self.engine.inner.display.show_message(&format!(
            "No {quantity} history for {room} ({entity_id})"
        ));
    }
}
