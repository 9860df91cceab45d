//! Configuration for the depth engine.
//!
//! This module provides the [`Config`] struct holding every tunable the core
//! consumes: book depth, wall thresholds, history capacity and the playback
//! timing constants.

use std::time::Duration;

use rust_decimal::Decimal;

use crate::error::Error;

/// Default number of levels retained per side (Kraken `book-25`)
pub const DEFAULT_DEPTH: usize = 25;

/// Default history capacity (~3 minutes at typical update rates)
pub const DEFAULT_HISTORY_CAPACITY: usize = 1800;

/// Configuration for [`crate::DepthEngine`]
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use depth_explorer::Config;
/// use rust_decimal::Decimal;
///
/// let config = Config::default()
///     .with_depth(10)
///     .with_thresholds(Decimal::from(50), Decimal::from(40))
///     .with_tick_interval(Duration::from_millis(50));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Levels retained per side after delta application
    depth: usize,

    /// Wall create threshold on the ask side
    ask_threshold: Decimal,

    /// Wall create threshold on the bid side
    bid_threshold: Decimal,

    /// Maximum number of retained history entries
    history_capacity: usize,

    /// Playback advancement period
    tick_interval: Duration,

    /// Lead time rewound before an event on `jump_to`
    preload_window: Duration,

    /// Period of the live-mode history bounds refresh
    bounds_refresh_interval: Duration,

    /// Buffer size of the liquidity event broadcast channel
    event_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            ask_threshold: Decimal::from(3),
            bid_threshold: Decimal::from(3),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            tick_interval: Duration::from_millis(100),
            preload_window: Duration::from_millis(3000),
            bounds_refresh_interval: Duration::from_millis(500),
            event_channel_capacity: 256,
        }
    }
}

impl Config {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of levels kept per side
    #[must_use]
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Set the ask and bid wall thresholds
    #[must_use]
    pub fn with_thresholds(mut self, ask: Decimal, bid: Decimal) -> Self {
        self.ask_threshold = ask;
        self.bid_threshold = bid;
        self
    }

    /// Set the history capacity
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set the playback tick interval
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the preload window used by `jump_to`
    #[must_use]
    pub fn with_preload_window(mut self, window: Duration) -> Self {
        self.preload_window = window;
        self
    }

    /// Set the live-mode bounds refresh interval
    #[must_use]
    pub fn with_bounds_refresh_interval(mut self, interval: Duration) -> Self {
        self.bounds_refresh_interval = interval;
        self
    }

    /// Set the event channel capacity
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Get the depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Get the ask threshold
    pub fn ask_threshold(&self) -> Decimal {
        self.ask_threshold
    }

    /// Get the bid threshold
    pub fn bid_threshold(&self) -> Decimal {
        self.bid_threshold
    }

    /// Get the history capacity
    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// Get the tick interval
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Get the preload window
    pub fn preload_window(&self) -> Duration {
        self.preload_window
    }

    /// Get the bounds refresh interval
    pub fn bounds_refresh_interval(&self) -> Duration {
        self.bounds_refresh_interval
    }

    /// Get the event channel capacity
    pub fn event_channel_capacity(&self) -> usize {
        self.event_channel_capacity
    }

    /// Check every value is usable
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), Error> {
        if self.depth == 0 {
            return Err(Error::Config("depth must be positive".into()));
        }
        if self.history_capacity == 0 {
            return Err(Error::Config("history_capacity must be positive".into()));
        }
        if self.ask_threshold <= Decimal::ZERO || self.bid_threshold <= Decimal::ZERO {
            return Err(Error::Config("wall thresholds must be positive".into()));
        }
        if self.tick_interval.is_zero() || self.bounds_refresh_interval.is_zero() {
            return Err(Error::Config("timer intervals must be non-zero".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::Config("event_channel_capacity must be positive".into()));
        }
        Ok(())
    }
}
