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

//! Temporal data synchronization engine for the RoomClimate widget.
//!
//! Maps continuous sensor history onto a fixed 288-slot day, keeps the view
//! in sync between live host state and historical queries, and drives
//! playback and auto-advance timers.

pub mod day_cache;
pub mod engine;
pub mod error;
pub mod playback;
pub mod resolver;
pub mod scheduler;
pub mod sync_mode;
pub mod time_grid;
pub mod traits;

pub use day_cache::{DayCache, PrefetchJob, PrefetchOutcome, PrefetchProgress, PrefetchSink};
pub use engine::{Collaborators, Engine, EngineConfig, EngineSnapshot, SecondTick, ViewTag};
pub use error::{EngineError, EngineResult, HistoryError, HistoryResult};
pub use playback::{AutoAdvance, PlaybackState, PlaybackStep};
pub use resolver::{SampleSeries, ValueResolver};
pub use scheduler::{Scheduler, TimerRole};
pub use sync_mode::{SyncMode, SyncModeController, Transition};
pub use time_grid::TimeGrid;
pub use traits::{Clock, DisplayAdapter, HistoryProvider, LiveStateSource, ManualClock, SystemClock};
