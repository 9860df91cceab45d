//! Live/playback cursor state machine.
//!
//! [`PlaybackCursor`] decides which book state downstream consumers see:
//! the freshest live state in [`Mode::Live`], or the history entry nearest
//! the cursor in [`Mode::Playback`]. It only ever *reads* the
//! [`ReplayBuffer`]; recording is driven by the engine.
//!
//! # State machine
//!
//! ```text
//!            enter_playback / seek / play / jump_to
//!   ┌──────┐ ─────────────────────────────────────▶ ┌──────────┐
//!   │ LIVE │                                        │ PLAYBACK │ ◀─┐ pause / play /
//!   └──────┘ ◀───────────────────────────────────── └──────────┘ ──┘ set_speed / tick
//!                        back_to_live
//! ```
//!
//! Every transition that changes which timer should be running bumps a
//! generation counter. Timer tasks capture the generation they were started
//! under and stop as soon as it no longer matches.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, trace};

use crate::config::Config;
use crate::error::Error;
use crate::types::{BookState, Price, TimestampMs};

use super::buffer::ReplayBuffer;

/// Which state is exposed to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Freshest live state; every new state is recorded
    #[default]
    Live,
    /// Historical state at the cursor; recording is suspended
    Playback,
}

/// Observable cursor fields
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorState {
    /// Current mode
    pub mode: Mode,
    /// Replay instant (playback only)
    pub cursor_time: Option<TimestampMs>,
    /// Whether the cursor advances on its own
    pub is_playing: bool,
    /// Advancement multiplier
    pub speed: f64,
    /// Price of the event the user jumped to
    pub highlighted_price: Option<Price>,
    /// Time of the event the user jumped to
    pub highlighted_event_time: Option<TimestampMs>,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            mode: Mode::Live,
            cursor_time: None,
            is_playing: false,
            speed: 1.0,
            highlighted_price: None,
            highlighted_event_time: None,
        }
    }
}

/// Live/playback state machine.
#[derive(Debug, Clone)]
pub struct PlaybackCursor {
    state: CursorState,
    tick_interval: Duration,
    preload_window: Duration,
    /// Scrub bounds, refreshed only while live
    bounds: Option<(TimestampMs, TimestampMs)>,
    generation: u64,
}

impl PlaybackCursor {
    /// Create a cursor in live mode
    #[must_use]
    pub fn new(tick_interval: Duration, preload_window: Duration) -> Self {
        Self {
            state: CursorState::default(),
            tick_interval,
            preload_window,
            bounds: None,
            generation: 0,
        }
    }

    /// Create a cursor from the engine configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.tick_interval(), config.preload_window())
    }

    /// Current observable state
    #[must_use]
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Current mode
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    /// Whether new live states should be recorded
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state.mode == Mode::Live
    }

    /// Whether the advancement timer should be running
    #[must_use]
    pub fn should_advance(&self) -> bool {
        self.state.mode == Mode::Playback && self.state.is_playing
    }

    /// Timer generation
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Last refreshed `(earliest, latest)` scrub bounds
    #[must_use]
    pub fn bounds(&self) -> Option<(TimestampMs, TimestampMs)> {
        self.bounds
    }

    /// Get the tick interval
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Switch to playback, defaulting the cursor to the newest retained entry.
    ///
    /// With an empty history there is nothing to replay; the cursor stays
    /// where it is and `false` is returned.
    pub fn enter_playback(&mut self, at: Option<TimestampMs>, history: &ReplayBuffer) -> bool {
        let Some(newest) = history.newest().map(|e| e.timestamp) else {
            return false;
        };
        let cursor = at.unwrap_or(newest);
        if self.state.mode == Mode::Live {
            info!(cursor, "Entering playback");
        }
        self.state.mode = Mode::Playback;
        self.state.cursor_time = Some(cursor);
        self.bump();
        true
    }

    /// Scrub to `timestamp`, clamped to the known history bounds.
    ///
    /// No-op returning `false` when the history is empty.
    pub fn seek(&mut self, timestamp: TimestampMs, history: &ReplayBuffer) -> bool {
        let clamped = match self.bounds.or_else(|| history.bounds()) {
            Some((earliest, latest)) => timestamp.clamp(earliest, latest),
            None => timestamp,
        };
        self.enter_playback(Some(clamped), history)
    }

    /// Start autonomous advancement.
    ///
    /// From live mode this also enters playback at the newest entry. With an
    /// empty history there is nothing to replay and the call is a no-op.
    /// Returns whether the cursor is now playing.
    pub fn play(&mut self, history: &ReplayBuffer) -> bool {
        let Some(newest) = history.newest().map(|e| e.timestamp) else {
            return false;
        };
        if self.state.mode == Mode::Live {
            info!(cursor = newest, "Entering playback");
            self.state.mode = Mode::Playback;
        }
        if self.state.cursor_time.is_none() {
            self.state.cursor_time = Some(newest);
        }
        self.state.is_playing = true;
        self.bump();
        true
    }

    /// Stop autonomous advancement, keeping the cursor where it is
    pub fn pause(&mut self) {
        self.state.is_playing = false;
        self.bump();
    }

    /// Change the advancement multiplier; applies from the next tick
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSpeed`] for non-finite or non-positive values.
    pub fn set_speed(&mut self, multiplier: f64) -> Result<(), Error> {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(Error::InvalidSpeed(multiplier));
        }
        self.state.speed = multiplier;
        Ok(())
    }

    /// Jump to just before an event and highlight it.
    ///
    /// The cursor lands `preload_window` before `event_time` (floored at 0)
    /// and playback is paused.
    pub fn jump_to(&mut self, event_time: TimestampMs, price: Price) {
        let lead = self.preload_window.as_millis() as TimestampMs;
        let cursor = event_time.saturating_sub(lead);
        info!(event_time, cursor, %price, "Jumping to liquidity event");

        self.state.mode = Mode::Playback;
        self.state.cursor_time = Some(cursor);
        self.state.is_playing = false;
        self.state.highlighted_price = Some(price);
        self.state.highlighted_event_time = Some(event_time);
        self.bump();
    }

    /// Reset every field to the initial live configuration
    pub fn back_to_live(&mut self) {
        if self.state.mode == Mode::Playback {
            info!("Returning to live");
        }
        self.state = CursorState::default();
        self.bump();
    }

    /// Advance one tick of `tick_interval * speed`.
    ///
    /// Clamps at the newest retained timestamp and stays in playback there;
    /// a cursor already past it holds still.
    /// Returns the new cursor, or `None` if the cursor is not playing or the
    /// history is empty.
    pub fn advance(&mut self, history: &ReplayBuffer) -> Option<TimestampMs> {
        if !self.should_advance() {
            return None;
        }
        let newest = history.newest()?.timestamp;
        let current = self.state.cursor_time.unwrap_or(newest);
        let step = (self.tick_interval.as_millis() as f64 * self.state.speed).round() as u64;
        // Never rewinds a cursor already parked past the newest entry.
        let next = current.saturating_add(step).min(newest).max(current);

        trace!(current, next, speed = self.state.speed, "Playback tick");
        self.state.cursor_time = Some(next);
        Some(next)
    }

    /// Refresh the scrub bounds from history; only effective while live
    pub fn refresh_bounds(&mut self, history: &ReplayBuffer) -> bool {
        if self.state.mode != Mode::Live {
            return false;
        }
        self.bounds = history.bounds();
        self.bounds.is_some()
    }

    /// Forget the scrub bounds, e.g. after the history was cleared
    pub fn clear_bounds(&mut self) {
        self.bounds = None;
    }

    /// Resolve the state consumers should see.
    ///
    /// In playback a cursor older than the retained window degrades to the
    /// oldest entry.
    #[must_use]
    pub fn resolve(&self, live: Option<&BookState>, history: &ReplayBuffer) -> Option<BookState> {
        match self.state.mode {
            Mode::Live => live.cloned(),
            Mode::Playback => {
                let cursor = self.state.cursor_time?;
                history
                    .get_nearest(cursor)
                    .or_else(|| history.oldest())
                    .map(|entry| entry.state.clone())
            }
        }
    }

    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

impl Default for PlaybackCursor {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
