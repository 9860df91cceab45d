//! # depth-explorer
//!
//! A depth-bounded limit order book engine with time-travel replay and
//! liquidity wall detection, fed by Kraken-style `book` channel messages.
//!
//! ## Features
//!
//! - **Level book** - Snapshot/delta merge with exact decimal prices
//! - **Replay buffer** - Bounded history with nearest-timestamp lookup
//! - **Wall detection** - Hysteresis-based "wall created/removed" events
//! - **Playback cursor** - Live/playback state machine with timed advancement
//!
//! ## Quick Start
//!
//! ```rust
//! use depth_explorer::{Config, DepthEngine};
//!
//! # fn main() -> depth_explorer::Result<()> {
//! let engine = DepthEngine::new(Config::default().with_depth(10))?;
//!
//! engine.handle_frame(r#"[336, {"as": [["100.0", "12.0", "1700000000.1"]],
//!                             "bs": [["99.5", "1.0", "1700000000.1"]]},
//!                     "book-10", "XBT/USD"]"#)?;
//! engine.handle_frame(r#"[336, {"a": [["100.0", "0.0", "1700000000.2"]]},
//!                     "book-10", "XBT/USD"]"#)?;
//!
//! let book = engine.current_state().expect("book established");
//! assert!(book.asks.is_empty());
//! assert_eq!(book.bids.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Price Representation
//!
//! Prices and sizes are [`rust_decimal::Decimal`] parsed straight from the
//! wire strings, so `"100.0"` and `"100.00"` address the same level and no
//! float rounding ever splits one level into two.
//!
//! ## Architecture
//!
//! - [`orderbook`] - [`orderbook::LevelBook`], the pure merge engine
//! - [`history`] - [`history::ReplayBuffer`] and [`history::PlaybackCursor`]
//! - [`events`] - [`events::WallDetector`] and liquidity event types
//! - [`engine`] - [`DepthEngine`], the shared handle tying them together
//! - [`types`] - Book state and inbound message types
//! - [`config`] - Engine configuration
//! - [`error`] - Error types for the crate

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod history;
pub mod orderbook;
pub mod types;

// Re-export main types at crate root for convenience
pub use config::Config;
pub use engine::DepthEngine;
pub use error::Error;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;
