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

//! Engine behaviour against fake collaborators

mod common;

use common::*;
use roomclimate_core::{EngineError, HistoryError, PlaybackStep, PrefetchOutcome, SecondTick, SyncMode};
use roomclimate_types::{Quantity, RoomId, SLOTS_PER_DAY, TimeSlot};
use std::time::Duration;

fn yesterday() -> chrono::NaiveDate {
    today().pred_opt().unwrap()
}

#[tokio::test]
async fn test_start_shows_live_values() {
    let h = Harness::new(at(today(), 15, 0, 0), false);
    h.live.set(LIVING_T, "21.5");
    h.live.set(LIVING_H, "unavailable");
    h.live.set(BEDROOM_T, "19");

    h.engine.start();

    assert_eq!(h.display.shown(&living(), Quantity::Temperature), Some(Some(21.5)));
    assert_eq!(h.display.shown(&living(), Quantity::Humidity), Some(None));
    assert_eq!(h.display.shown(&bedroom(), Quantity::Temperature), Some(Some(19.0)));
    assert_eq!(h.display.shown(&bedroom(), Quantity::Humidity), Some(None));
    assert_eq!(h.display.last_timeline().map(|(s, _)| s), Some(slot(15, 0)));

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.mode, SyncMode::Live);
    assert_eq!(snapshot.playback.current_slot, slot(15, 0));
    assert!(snapshot.auto_advance_running);
    assert!(snapshot.live_refresh_running);
    assert!(!snapshot.playback_running);

    h.engine.shutdown();
}

#[tokio::test]
async fn test_scrub_enters_historical_and_interpolates() {
    let h = Harness::new(at(today(), 15, 0, 0), false);
    h.history.add(LIVING_T, at(today(), 10, 0, 0), "20.0");
    h.history.add(LIVING_T, at(today(), 10, 10, 0), "22.0");
    h.engine.start();
    h.display.clear();

    h.engine.scrub_to(slot(10, 5)).await;

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.mode, SyncMode::Historical);
    assert_eq!(snapshot.playback.current_slot, slot(10, 5));
    assert!(!snapshot.live_refresh_running);
    assert!(h.display.calls().contains(&Call::Mode(SyncMode::Historical)));

    // placeholder first, then the resolved value
    assert_eq!(
        h.display.values(&living(), Quantity::Temperature),
        vec![None, Some(21.0)]
    );
    assert_eq!(h.display.shown(&bedroom(), Quantity::Humidity), Some(None));

    h.engine.shutdown();
}

#[tokio::test]
async fn test_scrub_past_now_is_clamped() {
    let h = Harness::new(at(today(), 15, 0, 0), false);

    h.engine.scrub_to(slot(20, 0)).await;

    assert_eq!(h.engine.snapshot().playback.current_slot, slot(15, 0));
    let (position, fraction) = h.display.last_timeline().unwrap();
    assert_eq!(position, slot(15, 0));
    assert!((fraction - 180.0 / 287.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_stale_point_result_is_dropped() {
    let h = Harness::new(at(today(), 15, 0, 0), false);
    h.history.add(LIVING_T, at(today(), 10, 5, 0), "20.0");
    h.history.add(LIVING_T, at(today(), 12, 0, 0), "25.0");

    let gate = h.history.close_gate();
    let engine = h.engine.clone();
    let first = tokio::spawn(async move { engine.scrub_to(slot(10, 5)).await });
    settle().await;
    assert_eq!(h.history.calls(), 1);

    h.history.open_gate();
    h.engine.scrub_to(slot(12, 0)).await;
    assert_eq!(h.display.shown(&living(), Quantity::Temperature), Some(Some(25.0)));

    gate.add_permits(1);
    first.await.unwrap();

    assert_eq!(h.display.shown(&living(), Quantity::Temperature), Some(Some(25.0)));
    assert!(
        !h.display
            .values(&living(), Quantity::Temperature)
            .contains(&Some(20.0))
    );
}

#[tokio::test]
async fn test_prefetch_fills_every_slot_of_every_room() {
    let h = Harness::new(at(today(), 15, 0, 0), false);
    h.history.add(LIVING_T, at(yesterday(), 12, 2, 0), "21.0");

    let outcome = h.engine.prefetch(yesterday()).await;

    assert_eq!(
        outcome,
        PrefetchOutcome::Completed {
            resolved_slots: SLOTS_PER_DAY,
            failed_series: 0
        }
    );
    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.cache_date, Some(yesterday()));
    assert_eq!(snapshot.cached_slots, SLOTS_PER_DAY);
    assert!(!snapshot.prefetch_in_flight);

    for slot in TimeSlot::all() {
        assert!(h.engine.cached_reading(&living(), slot).is_some());
        assert!(h.engine.cached_reading(&bedroom(), slot).is_some());
    }
    let noon = h.engine.cached_reading(&living(), slot(12, 0)).unwrap();
    assert_eq!(noon.temperature, Some(21.0));
    assert_eq!(noon.humidity, None);
    let morning = h.engine.cached_reading(&living(), slot(8, 0)).unwrap();
    assert_eq!(morning.temperature, None);

    let progress = h.display.progress();
    assert_eq!(progress.len(), SLOTS_PER_DAY);
    assert!((progress.last().unwrap() - 100.0).abs() < 1e-9);
    assert!(progress.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_concurrent_prefetch_issues_one_query_set() {
    let h = Harness::new(at(today(), 15, 0, 0), false);
    h.history.add(LIVING_T, at(yesterday(), 9, 0, 0), "20.0");
    let gate = h.history.close_gate();

    let a = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.prefetch(yesterday()).await })
    };
    let b = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.prefetch(yesterday()).await })
    };
    settle().await;
    assert!(h.engine.snapshot().prefetch_in_flight);

    gate.add_permits(10);
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    assert!(matches!(a, PrefetchOutcome::Completed { .. }));
    assert_eq!(a, b);
    // three bound series, queried once each
    assert_eq!(h.history.calls(), 3);

    // a finished prefetch is reused
    h.history.open_gate();
    assert_eq!(h.engine.prefetch(yesterday()).await, a);
    assert_eq!(h.history.calls(), 3);
}

#[tokio::test]
async fn test_date_switch_leaves_no_stale_cache() {
    let h = Harness::new(at(today(), 15, 0, 0), true);
    h.history.add(LIVING_T, at(yesterday(), 12, 0, 0), "21.0");
    h.engine.select_date(yesterday()).await;

    // joins the background prefetch started by the date change
    assert!(matches!(
        h.engine.prefetch(yesterday()).await,
        PrefetchOutcome::Completed { .. }
    ));
    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.cache_date, Some(yesterday()));
    assert_eq!(snapshot.cached_slots, SLOTS_PER_DAY);
    assert_eq!(
        h.engine.cached_reading(&living(), slot(12, 0)).unwrap().temperature,
        Some(21.0)
    );

    let gate = h.history.close_gate();
    let before = yesterday().pred_opt().unwrap();
    let engine = h.engine.clone();
    let switch = tokio::spawn(async move { engine.select_date(before).await });
    settle().await;

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.playback.selected_date, before);
    assert_eq!(snapshot.cache_date, Some(before));
    assert_eq!(snapshot.cached_slots, 0);
    assert!(snapshot.prefetch_in_flight);
    let placeholder = h.engine.cached_reading(&living(), slot(12, 0)).unwrap();
    assert_eq!(placeholder.temperature, None);

    h.engine.shutdown();
    gate.add_permits(100);
    switch.await.unwrap();
    assert_eq!(h.engine.snapshot().cache_date, None);
}

#[tokio::test]
async fn test_cached_day_skips_point_queries() {
    let h = Harness::new(at(today(), 15, 0, 0), false);
    h.history.add(LIVING_T, at(yesterday(), 9, 0, 0), "18.5");
    h.engine.select_date(yesterday()).await;
    h.engine.prefetch(yesterday()).await;
    let after_prefetch = h.history.calls();

    h.engine.scrub_to(slot(9, 0)).await;

    assert_eq!(h.history.calls(), after_prefetch);
    assert_eq!(h.display.shown(&living(), Quantity::Temperature), Some(Some(18.5)));
}

#[tokio::test]
async fn test_entering_historical_drops_cache_built_while_live() {
    let h = Harness::new(at(today(), 10, 0, 0), false);
    assert!(matches!(
        h.engine.prefetch(today()).await,
        PrefetchOutcome::Completed { .. }
    ));
    assert_eq!(h.engine.snapshot().cache_date, Some(today()));

    h.advance_clock(2 * 3600);
    h.history.add(LIVING_T, at(today(), 11, 0, 0), "22.0");
    h.engine.jump_to_now();
    let before_scrub = h.history.calls();

    h.engine.scrub_to(slot(11, 0)).await;

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.mode, SyncMode::Historical);
    assert_eq!(snapshot.cache_date, None);
    assert!(h.history.calls() > before_scrub);
    assert_eq!(h.display.shown(&living(), Quantity::Temperature), Some(Some(22.0)));
}

#[tokio::test]
async fn test_reselecting_today_in_historical_refetches() {
    let h = Harness::new(at(today(), 15, 0, 0), false);
    h.engine.scrub_to(slot(9, 0)).await;
    h.engine.prefetch(today()).await;
    h.engine.select_date(yesterday()).await;
    h.engine.prefetch(today()).await;
    assert_eq!(h.engine.snapshot().cache_date, Some(today()));

    h.history.add(LIVING_T, at(today(), 9, 0, 0), "19.5");
    h.engine.select_date(today()).await;

    assert_eq!(h.engine.snapshot().cache_date, None);
    assert_eq!(h.display.shown(&living(), Quantity::Temperature), Some(Some(19.5)));
}

#[tokio::test]
async fn test_idle_reverts_to_live_and_interaction_resets_window() {
    let h = Harness::new(at(today(), 15, 0, 0), false);
    h.live.set(LIVING_T, "23.0");
    h.engine.scrub_to(slot(9, 0)).await;
    assert_eq!(h.engine.snapshot().mode, SyncMode::Historical);

    h.advance_clock(59);
    assert_eq!(h.engine.on_second_tick(), SecondTick::Idle);
    h.engine.record_interaction();

    h.advance_clock(1);
    assert_eq!(h.engine.on_second_tick(), SecondTick::Idle);
    assert_eq!(h.engine.snapshot().mode, SyncMode::Historical);

    h.advance_clock(58);
    assert_eq!(h.engine.on_second_tick(), SecondTick::Idle);
    h.advance_clock(1);
    assert_eq!(h.engine.on_second_tick(), SecondTick::RevertedToLive);

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.mode, SyncMode::Live);
    assert_eq!(snapshot.playback.selected_date, today());
    assert_eq!(snapshot.playback.current_slot, slot(15, 0));
    assert_eq!(h.display.shown(&living(), Quantity::Temperature), Some(Some(23.0)));

    h.engine.shutdown();
}

#[tokio::test]
async fn test_selecting_today_at_live_slot_is_live() {
    let h = Harness::new(at(today(), 15, 0, 0), false);
    h.engine.step_day(-1).await;
    assert_eq!(h.engine.snapshot().mode, SyncMode::Historical);

    // back to today, slot still at now
    h.engine.step_day(1).await;
    assert_eq!(h.engine.snapshot().mode, SyncMode::Live);

    h.engine.scrub_to(slot(9, 0)).await;
    h.engine.step_day(-1).await;
    h.engine.step_day(1).await;
    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.playback.selected_date, today());
    assert_eq!(snapshot.mode, SyncMode::Historical);

    h.engine.shutdown();
}

#[tokio::test]
async fn test_jump_to_now_stops_playback() {
    let h = Harness::new(at(today(), 15, 0, 0), false);
    h.engine.select_date(yesterday()).await;
    assert!(h.engine.play());
    assert!(!h.engine.play());

    h.engine.jump_to_now();

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.mode, SyncMode::Live);
    assert_eq!(snapshot.playback.selected_date, today());
    assert!(!snapshot.playback.is_playing);
    assert!(!snapshot.playback_running);
    assert_eq!(h.display.playback_events(), vec![true, false]);

    h.engine.shutdown();
}

#[tokio::test]
async fn test_playback_at_last_slot_of_today_stops() {
    let h = Harness::new(at(today(), 23, 57, 30), false);
    assert_eq!(h.engine.snapshot().playback.current_slot, TimeSlot::LAST);

    assert!(h.engine.play());
    let step = h.engine.advance_playback().await;

    assert_eq!(step, Some(PlaybackStep::Clamped(TimeSlot::LAST)));
    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.playback.current_slot, TimeSlot::LAST);
    assert_eq!(snapshot.playback.selected_date, today());
    assert!(!snapshot.playback.is_playing);
    assert_eq!(h.display.playback_events(), vec![true, false]);
    assert_eq!(h.engine.advance_playback().await, None);

    h.engine.shutdown();
}

#[tokio::test]
async fn test_playback_wraps_past_day_into_next() {
    let h = Harness::new(at(today(), 15, 0, 0), false);
    h.engine.select_date(yesterday().pred_opt().unwrap()).await;
    h.engine.scrub_to(TimeSlot::LAST).await;

    assert!(h.engine.play());
    let step = h.engine.advance_playback().await;

    assert_eq!(step, Some(PlaybackStep::WrappedToNextDay(yesterday())));
    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.playback.selected_date, yesterday());
    assert_eq!(snapshot.playback.current_slot, TimeSlot::FIRST);
    assert!(!snapshot.playback.is_playing);
    assert!(h.display.calls().contains(&Call::Date(yesterday())));

    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_playback_timer_steps_every_half_second() {
    let h = Harness::new(at(today(), 15, 0, 0), false);
    h.engine.select_date(yesterday()).await;
    h.engine.scrub_to(slot(6, 0)).await;
    assert!(h.engine.play());
    assert!(h.engine.snapshot().playback_running);

    for _ in 0..16 {
        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
    }
    assert_eq!(h.engine.snapshot().playback.current_slot, slot(6, 15));

    assert!(h.engine.stop_playback());
    assert!(!h.engine.stop_playback());
    for _ in 0..20 {
        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
    }
    assert_eq!(h.engine.snapshot().playback.current_slot, slot(6, 15));

    h.engine.shutdown();
}

#[tokio::test]
async fn test_live_auto_advances_on_five_minute_boundary() {
    let h = Harness::new(at(today(), 10, 4, 59), false);
    h.engine.start();
    assert_eq!(h.engine.snapshot().playback.current_slot, slot(10, 0));

    h.advance_clock(1);
    assert_eq!(h.engine.on_second_tick(), SecondTick::AutoAdvanced);
    assert_eq!(h.engine.snapshot().playback.current_slot, slot(10, 5));
    assert_eq!(h.display.last_timeline().map(|(s, _)| s), Some(slot(10, 5)));

    // same boundary second seen again
    h.clock.advance(chrono::Duration::milliseconds(500));
    assert_eq!(h.engine.on_second_tick(), SecondTick::Idle);

    h.engine.shutdown();
}

#[tokio::test]
async fn test_live_auto_advance_rolls_over_midnight() {
    let h = Harness::new(at(yesterday(), 23, 59, 59), false);
    h.engine.start();

    h.advance_clock(1);
    assert_eq!(h.engine.on_second_tick(), SecondTick::AutoAdvanced);

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.playback.selected_date, today());
    assert_eq!(snapshot.playback.current_slot, TimeSlot::FIRST);
    assert!(h.display.calls().contains(&Call::Date(today())));

    h.engine.shutdown();
}

#[tokio::test]
async fn test_history_series_reports_missing_entity() {
    let h = Harness::new(at(today(), 15, 0, 0), false);
    h.history.mark_missing(BEDROOM_T);

    let result = h
        .engine
        .history_series(&bedroom(), Quantity::Temperature, 1)
        .await;

    assert!(matches!(
        result,
        Err(EngineError::History(HistoryError::EntityNotFound(ref e))) if e == BEDROOM_T
    ));
    assert_eq!(h.display.messages().len(), 1);
    assert!(h.display.messages()[0].contains(BEDROOM_T));
}

#[tokio::test]
async fn test_history_series_filters_invalid_samples() {
    let h = Harness::new(at(today(), 15, 0, 0), false);
    h.history.add(LIVING_H, at(today(), 9, 0, 0), "45");
    h.history.add(LIVING_H, at(today(), 10, 0, 0), "unavailable");
    h.history.add(LIVING_H, at(today(), 11, 0, 0), "47.5");
    h.history.add(LIVING_H, at(today(), 16, 0, 0), "50");
    h.history.mark_failing(BEDROOM_T);

    let points = h
        .engine
        .history_series(&living(), Quantity::Humidity, 1)
        .await
        .unwrap();
    assert_eq!(
        points,
        vec![(at(today(), 9, 0, 0), 45.0), (at(today(), 11, 0, 0), 47.5)]
    );

    // transport failures degrade to an empty series
    let failed = h
        .engine
        .history_series(&bedroom(), Quantity::Temperature, 1)
        .await
        .unwrap();
    assert!(failed.is_empty());

    assert!(matches!(
        h.engine
            .history_series(&RoomId::from("attic"), Quantity::Temperature, 1)
            .await,
        Err(EngineError::UnknownRoom(_))
    ));
    assert!(matches!(
        h.engine
            .history_series(&bedroom(), Quantity::Humidity, 1)
            .await,
        Err(EngineError::Unbound { .. })
    ));
}

#[tokio::test]
async fn test_check_entities_lists_unknown_bindings() {
    let h = Harness::new(at(today(), 15, 0, 0), false);
    h.live.set(LIVING_T, "21.0");
    h.live.set(LIVING_H, "40");

    assert_eq!(h.engine.check_entities(), vec![BEDROOM_T.to_owned()]);
}

#[tokio::test]
async fn test_shutdown_stops_everything() {
    let h = Harness::new(at(today(), 15, 0, 0), false);
    h.engine.start();
    h.engine.select_date(yesterday()).await;
    h.engine.play();

    h.engine.shutdown();
    h.engine.shutdown();

    let snapshot = h.engine.snapshot();
    assert!(h.engine.is_shut_down());
    assert!(!snapshot.auto_advance_running);
    assert!(!snapshot.playback_running);
    assert!(!snapshot.live_refresh_running);
    assert!(!h.engine.play());
    assert_eq!(h.engine.on_second_tick(), SecondTick::Idle);
    assert_eq!(h.engine.refresh_live(), 0);
    assert_eq!(h.engine.prefetch(yesterday()).await, PrefetchOutcome::Abandoned);

    let calls = h.display.calls().len();
    h.engine.scrub_to(slot(3, 0)).await;
    h.engine.jump_to_now();
    assert_eq!(h.display.calls().len(), calls);
}
