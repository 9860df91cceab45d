//! Engine handle tying ingestion, history, wall detection and playback together.
//!
//! [`DepthEngine`] is constructed once at startup and shared by reference
//! (`Arc<DepthEngine>`) with the ingestion loop and any presentation layer.
//!
//! # Data flow
//!
//! ```text
//!  BookMessage ──▶ LevelBook ──▶ new BookState
//!                                   │
//!                  ┌────────────────┼──────────────────────┐
//!                  ▼                ▼                      ▼
//!        ReplayBuffer.add     WallDetector.compare    live state
//!        (LIVE mode only)     ──▶ event channel       │
//!                  │                                       │
//!                  └────────▶ PlaybackCursor.resolve ◀─────┘
//!                                   │
//!                                   ▼
//!                          exposed state channel
//! ```
//!
//! # Locking
//!
//! Locks are always taken in the order `live → cursor → history`. The live
//! write lock is held for the whole of [`DepthEngine::handle_message`], which
//! serializes ingestion, and the cursor lock is held while recording so a
//! mode switch cannot interleave with the "record iff live" decision.

mod timers;

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::events::{LiquidityEvent, Thresholds, WallDetector};
use crate::history::{CursorState, HistoryEntry, PlaybackCursor, ReplayBuffer};
use crate::orderbook::{current_timestamp_ms, LevelBook};
use crate::types::{BookMessage, BookState, Price, TimestampMs};

use timers::Timers;

/// State shared between the handle and its timer tasks
struct Shared {
    config: Config,
    level_book: LevelBook,
    live: RwLock<Option<BookState>>,
    cursor: Mutex<PlaybackCursor>,
    history: RwLock<ReplayBuffer>,
    detector: Mutex<WallDetector>,
    view_tx: watch::Sender<Option<BookState>>,
    events_tx: broadcast::Sender<LiquidityEvent>,
    timers: Mutex<Timers>,
}

impl Shared {
    /// State consumers should currently see
    fn exposed(&self) -> Option<BookState> {
        let live = self.live.read();
        let cursor = self.cursor.lock();
        let history = self.history.read();
        cursor.resolve(live.as_ref(), &history)
    }

    fn publish_view(&self) {
        self.publish(self.exposed());
    }

    fn publish(&self, view: Option<BookState>) {
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }

    /// One playback advancement step.
    ///
    /// Returns `false` once the caller's generation is stale or the cursor
    /// stopped playing, which ends the timer task.
    fn playback_tick(&self, generation: Option<u64>) -> bool {
        let view = {
            let live = self.live.read();
            let mut cursor = self.cursor.lock();
            if generation.is_some_and(|g| g != cursor.generation()) || !cursor.should_advance() {
                return false;
            }
            let history = self.history.read();
            cursor.advance(&history);
            cursor.resolve(live.as_ref(), &history)
        };
        self.publish(view);
        true
    }

    /// One live-mode bounds refresh.
    ///
    /// Returns `false` once the caller's generation is stale or the cursor
    /// left live mode.
    fn bounds_tick(&self, generation: Option<u64>) -> bool {
        let mut cursor = self.cursor.lock();
        if generation.is_some_and(|g| g != cursor.generation()) || !cursor.is_live() {
            return false;
        }
        let history = self.history.read();
        cursor.refresh_bounds(&history);
        true
    }
}

/// The depth engine handle.
///
/// # Example
///
/// ```rust
/// use depth_explorer::{Config, DepthEngine};
/// use depth_explorer::types::{BookMessage, RawLevel, SnapshotMessage};
///
/// let engine = DepthEngine::new(Config::default()).unwrap();
///
/// let events = engine
///     .handle_message(&BookMessage::Snapshot(SnapshotMessage {
///         asks: Some(vec![RawLevel::new("100", "12")]),
///         bids: Some(vec![RawLevel::new("99", "1")]),
///     }))
///     .unwrap();
///
/// assert_eq!(events.len(), 1); // 12 >= default threshold of 3
/// assert_eq!(engine.history_len(), 1);
/// ```
pub struct DepthEngine {
    inner: Arc<Shared>,
}

impl fmt::Debug for DepthEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepthEngine")
            .field("cursor", &self.cursor())
            .field("history_len", &self.history_len())
            .field("has_live_state", &self.inner.live.read().is_some())
            .finish()
    }
}

impl DepthEngine {
    /// Create an engine in live mode.
    ///
    /// When called inside a Tokio runtime the live bounds refresh timer
    /// starts immediately; otherwise timers are left to the host
    /// (see [`DepthEngine::tick`] and [`DepthEngine::refresh_bounds`]).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;
        let thresholds = Thresholds::new(config.ask_threshold(), config.bid_threshold())?;
        let (view_tx, _) = watch::channel(None);
        let (events_tx, _) = broadcast::channel(config.event_channel_capacity());

        let inner = Arc::new(Shared {
            level_book: LevelBook::new(config.depth()),
            live: RwLock::new(None),
            cursor: Mutex::new(PlaybackCursor::from_config(&config)),
            history: RwLock::new(ReplayBuffer::new(config.history_capacity())),
            detector: Mutex::new(WallDetector::new(thresholds)),
            view_tx,
            events_tx,
            timers: Mutex::new(Timers::default()),
            config,
        });

        info!(
            depth = inner.config.depth(),
            capacity = inner.config.history_capacity(),
            "Depth engine created"
        );

        let engine = Self { inner };
        engine.sync_timers();
        Ok(engine)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Apply one inbound book message.
    ///
    /// On success the live state is replaced, recorded into history if the
    /// cursor is live, compared against the previous live state for wall
    /// transitions, and the resulting events are returned and broadcast.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedLevel`] - the message was rejected, nothing changed
    /// - [`Error::MissingSnapshot`] - a delta arrived before any snapshot
    pub fn handle_message(&self, message: &BookMessage) -> Result<Vec<LiquidityEvent>, Error> {
        self.handle_message_at(message, current_timestamp_ms())
    }

    /// [`DepthEngine::handle_message`] with an explicit processing timestamp,
    /// for replaying a recorded feed
    pub fn handle_message_at(
        &self,
        message: &BookMessage,
        timestamp: TimestampMs,
    ) -> Result<Vec<LiquidityEvent>, Error> {
        let shared = &self.inner;

        let events = {
            let mut live = shared.live.write();
            let next = match shared.level_book.apply_at(live.as_ref(), message, timestamp) {
                Ok(next) => next,
                Err(e) => {
                    warn!(error = %e, levels = message.level_count(), "Book message rejected");
                    return Err(e);
                }
            };

            let events = shared.detector.lock().compare(live.as_ref(), &next);

            {
                let cursor = shared.cursor.lock();
                if cursor.is_live() {
                    shared.history.write().add(next.clone());
                }
            }

            *live = Some(next);
            events
        };

        for event in &events {
            debug!(
                side = %event.side,
                kind = ?event.kind,
                price = %event.price,
                size = %event.size,
                "Liquidity event"
            );
            // No subscribers is fine; the caller also gets the events back.
            let _ = shared.events_tx.send(*event);
        }

        shared.publish_view();
        Ok(events)
    }

    /// Parse a raw Kraken frame and apply it if it carries book data.
    ///
    /// Non-book frames return an empty event list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] for unparseable frames, otherwise the errors
    /// of [`DepthEngine::handle_message`].
    pub fn handle_frame(&self, text: &str) -> Result<Vec<LiquidityEvent>, Error> {
        match BookMessage::from_frame(text)? {
            Some(message) => self.handle_message(&message),
            None => Ok(Vec::new()),
        }
    }

    /// Freshest live state, regardless of mode
    pub fn live_state(&self) -> Option<BookState> {
        self.inner.live.read().clone()
    }

    /// State consumers should display: live, or the history entry at the cursor
    pub fn current_state(&self) -> Option<BookState> {
        self.inner.exposed()
    }

    /// Copy of the cursor state
    pub fn cursor(&self) -> CursorState {
        self.inner.cursor.lock().state()
    }

    /// Scrub bounds last refreshed while live
    pub fn history_bounds(&self) -> Option<(TimestampMs, TimestampMs)> {
        self.inner.cursor.lock().bounds()
    }

    /// Number of retained history entries
    pub fn history_len(&self) -> usize {
        self.inner.history.read().len()
    }

    /// Copy of every retained history entry, oldest first
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.inner.history.read().get_range().cloned().collect()
    }

    /// History entry nearest (at or before) `timestamp`
    pub fn history_at(&self, timestamp: TimestampMs) -> Option<HistoryEntry> {
        self.inner.history.read().get_nearest(timestamp).cloned()
    }

    /// Drop all retained history
    pub fn clear_history(&self) {
        {
            let mut cursor = self.inner.cursor.lock();
            self.inner.history.write().clear();
            cursor.clear_bounds();
        }
        self.inner.publish_view();
    }

    /// Current wall thresholds
    pub fn thresholds(&self) -> Thresholds {
        self.inner.detector.lock().thresholds()
    }

    /// Change the wall thresholds at runtime
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidThreshold`] if either value is not positive;
    /// the previous thresholds stay in force.
    pub fn set_thresholds(&self, ask: Decimal, bid: Decimal) -> Result<(), Error> {
        let thresholds = Thresholds::new(ask, bid)?;
        self.inner.detector.lock().set_thresholds(thresholds);
        info!(%ask, %bid, "Wall thresholds updated");
        Ok(())
    }

    /// Receive the exposed state every time it changes
    pub fn subscribe(&self) -> watch::Receiver<Option<BookState>> {
        self.inner.view_tx.subscribe()
    }

    /// Receive every detected liquidity event
    pub fn subscribe_events(&self) -> broadcast::Receiver<LiquidityEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Switch to playback at `at`, or at the newest retained entry.
    ///
    /// Returns `false` and stays live when nothing has been recorded yet.
    pub fn enter_playback(&self, at: Option<TimestampMs>) -> bool {
        self.transition(|cursor, history| cursor.enter_playback(at, history))
    }

    /// Scrub to `timestamp`, clamped to the scrub bounds.
    ///
    /// Returns `false` and stays put when nothing has been recorded yet.
    pub fn seek(&self, timestamp: TimestampMs) -> bool {
        self.transition(|cursor, history| cursor.seek(timestamp, history))
    }

    /// Start autonomous playback; returns whether the cursor is playing
    pub fn play(&self) -> bool {
        self.transition(|cursor, history| cursor.play(history))
    }

    /// Pause autonomous playback
    pub fn pause(&self) {
        self.transition(|cursor, _| cursor.pause());
    }

    /// Change the playback speed multiplier
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSpeed`] for non-finite or non-positive values.
    pub fn set_speed(&self, multiplier: f64) -> Result<(), Error> {
        self.inner.cursor.lock().set_speed(multiplier)
    }

    /// Jump to just before a liquidity event and highlight it
    pub fn jump_to(&self, event_time: TimestampMs, price: Price) {
        self.transition(|cursor, _| cursor.jump_to(event_time, price));
    }

    /// Return to live mode, resetting every cursor field
    pub fn back_to_live(&self) {
        self.transition(|cursor, _| cursor.back_to_live());
    }

    /// Advance the playback cursor by one tick by hand.
    ///
    /// Returns the new cursor time, or `None` if the cursor is not playing.
    pub fn tick(&self) -> Option<TimestampMs> {
        if !self.inner.playback_tick(None) {
            return None;
        }
        self.inner.cursor.lock().state().cursor_time
    }

    /// Refresh the scrub bounds by hand; no-op outside live mode
    pub fn refresh_bounds(&self) -> Option<(TimestampMs, TimestampMs)> {
        self.inner.bounds_tick(None);
        self.history_bounds()
    }

    /// Full reset: live state, history, cursor and wall memory
    pub fn reset(&self) {
        {
            let mut live = self.inner.live.write();
            let mut cursor = self.inner.cursor.lock();
            let mut history = self.inner.history.write();
            *live = None;
            cursor.back_to_live();
            cursor.clear_bounds();
            history.clear();
            self.inner.detector.lock().reset();
        }
        info!("Depth engine reset");
        self.sync_timers();
        self.inner.publish_view();
    }

    fn transition<R>(&self, f: impl FnOnce(&mut PlaybackCursor, &ReplayBuffer) -> R) -> R {
        let result = {
            let mut cursor = self.inner.cursor.lock();
            let history = self.inner.history.read();
            f(&mut cursor, &history)
        };
        self.sync_timers();
        self.inner.publish_view();
        result
    }

    fn sync_timers(&self) {
        timers::sync(&self.inner);
    }
}
