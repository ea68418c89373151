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

//! Single owner of the engine's periodic tasks.
//!
//! Each [`TimerRole`] has at most one running task. Starting a role aborts
//! whatever task previously held it; once [`Scheduler::stop_all`] has run the
//! scheduler refuses to start anything again.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerRole {
    /// One-second poll: inactivity reversion and 5-minute auto-advance
    AutoAdvance,
    /// 500 ms playback stepping
    Playback,
    /// 30 s live state refresh
    LiveRefresh,
}

impl TimerRole {
    pub fn period(self) -> Duration {
        match self {
            Self::AutoAdvance => Duration::from_secs(1),
            Self::Playback => Duration::from_millis(500),
            Self::LiveRefresh => Duration::from_secs(30),
        }
    }

    pub fn all() -> &'static [TimerRole] {
        &[Self::AutoAdvance, Self::Playback, Self::LiveRefresh]
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    tasks: HashMap<TimerRole, JoinHandle<()>>,
    shut_down: bool,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `tick` every `role.period()` until it breaks or the role is stopped.
    ///
    /// The first tick fires one period after start. Returns false when the
    /// scheduler has been shut down.
    pub fn start<F, Fut>(&self, role: TimerRole, mut tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.shut_down {
            debug!("⏱️ [SCHEDULER] Refusing to start {:?} after shutdown", role);
            return false;
        }
        if let Some(previous) = state.tasks.remove(&role) {
            previous.abort();
        }

        let period = role.period();
        let first_tick = Instant::now() + period;
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                trace!("⏱️ [SCHEDULER] {:?} tick", role);
                if tick().await.is_break() {
                    debug!("⏱️ [SCHEDULER] {:?} finished", role);
                    break;
                }
            }
        });
        state.tasks.insert(role, handle);
        debug!("⏱️ [SCHEDULER] Started {:?} every {:?}", role, period);
        true
    }

    /// Cancel a role's task. Idempotent; returns true if a live task was stopped.
    pub fn stop(&self, role: TimerRole) -> bool {
        let handle = self.state.lock().tasks.remove(&role);
        match handle {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                if was_running {
                    debug!("⏱️ [SCHEDULER] Stopped {:?}", role);
                }
                was_running
            }
            None => false,
        }
    }

    pub fn is_running(&self, role: TimerRole) -> bool {
        self.state
            .lock()
            .tasks
            .get(&role)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Abort every task and refuse further starts
    pub fn stop_all(&self) {
        let tasks: Vec<_> = {
            let mut state = self.state.lock();
            state.shut_down = true;
            state.tasks.drain().collect()
        };
        for (role, handle) in tasks {
            handle.abort();
            debug!("⏱️ [SCHEDULER] Stopped {:?} (shutdown)", role);
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for handle in self.state.get_mut().tasks.values() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_tick(
        counter: &Arc<AtomicUsize>,
    ) -> impl FnMut() -> std::future::Ready<ControlFlow<()>> + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(ControlFlow::Continue(()))
        }
    }

    /// Move paused time forward in small steps so every tick lands on time
    async fn advance(ms: u64) {
        for _ in 0..ms / 100 {
            tokio::time::advance(Duration::from_millis(100)).await;
            for _ in 0..5 {
                tokio::task::yield_now().await;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_role_period() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(scheduler.start(TimerRole::Playback, counting_tick(&counter)));
        tokio::task::yield_now().await;

        advance(400).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        advance(100).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        advance(1000).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_running(TimerRole::Playback));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_previous_task() {
        let scheduler = Scheduler::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        scheduler.start(TimerRole::AutoAdvance, counting_tick(&first));
        scheduler.start(TimerRole::AutoAdvance, counting_tick(&second));
        tokio::task::yield_now().await;

        advance(3000).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.start(TimerRole::LiveRefresh, counting_tick(&counter));
        assert!(scheduler.stop(TimerRole::LiveRefresh));
        assert!(!scheduler.stop(TimerRole::LiveRefresh));
        assert!(!scheduler.is_running(TimerRole::LiveRefresh));

        advance(60_000).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_ends_task() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        scheduler.start(TimerRole::Playback, move || {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(if n >= 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            })
        });
        tokio::task::yield_now().await;

        advance(5000).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(!scheduler.is_running(TimerRole::Playback));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_after_shutdown() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for role in TimerRole::all() {
            scheduler.start(*role, counting_tick(&counter));
        }
        scheduler.stop_all();
        assert!(!scheduler.start(TimerRole::Playback, counting_tick(&counter)));

        advance(120_000).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(TimerRole::all().iter().all(|r| !scheduler.is_running(*r)));
    }
}
