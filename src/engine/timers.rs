//! Background timers: playback advancement and live bounds refresh.
//!
//! Each task captures the cursor generation it was started for and exits as
//! soon as that generation is stale. Tasks hold a `Weak` reference so a
//! dropped engine stops them on the next tick.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace};

use super::Shared;

/// Handles of the running timer tasks
#[derive(Debug, Default)]
pub(super) struct Timers {
    playback: Option<JoinHandle<()>>,
    bounds: Option<JoinHandle<()>>,
    generation: Option<u64>,
}

impl Timers {
    #[cfg(test)]
    pub(super) fn is_idle(&self) -> bool {
        self.playback.is_none() && self.bounds.is_none()
    }

    fn stop_playback(&mut self) {
        if let Some(handle) = self.playback.take() {
            handle.abort();
        }
    }

    fn stop_bounds(&mut self) {
        if let Some(handle) = self.bounds.take() {
            handle.abort();
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.stop_playback();
        self.stop_bounds();
    }
}

/// Bring the running timers in line with the cursor.
///
/// Playback advancement runs only while playing; bounds refresh runs only
/// while live. Any generation change restarts whichever timer applies.
pub(super) fn sync(shared: &Arc<Shared>) {
    let (generation, live, advancing, tick) = {
        let cursor = shared.cursor.lock();
        (
            cursor.generation(),
            cursor.is_live(),
            cursor.should_advance(),
            cursor.tick_interval(),
        )
    };

    let mut timers = shared.timers.lock();
    if timers.generation == Some(generation) {
        return;
    }

    timers.stop_playback();
    timers.stop_bounds();
    timers.generation = Some(generation);

    let Ok(runtime) = Handle::try_current() else {
        debug!("No Tokio runtime, timers left to the host");
        return;
    };

    if advancing {
        timers.playback = Some(runtime.spawn(run_playback(Arc::downgrade(shared), generation, tick)));
    }
    if live {
        let period = shared.config.bounds_refresh_interval();
        timers.bounds = Some(runtime.spawn(run_bounds(Arc::downgrade(shared), generation, period)));
    }
}

async fn run_playback(shared: Weak<Shared>, generation: u64, period: Duration) {
    trace!(generation, ?period, "Playback timer started");
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(engine) = shared.upgrade() else { break };
        if !engine.playback_tick(Some(generation)) {
            break;
        }
    }
    trace!(generation, "Playback timer stopped");
}

async fn run_bounds(shared: Weak<Shared>, generation: u64, period: Duration) {
    trace!(generation, ?period, "Bounds timer started");
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(engine) = shared.upgrade() else { break };
        if !engine.bounds_tick(Some(generation)) {
            break;
        }
    }
    trace!(generation, "Bounds timer stopped");
}
