//! Snapshot/delta merge engine.
//!
//! This module turns raw exchange messages into canonical [`BookState`]
//! values:
//!
//! - Exact decimal prices (no float key drift)
//! - Sorted sides (asks ascending, bids descending), no duplicate prices
//! - Depth-bounded after every delta
//! - All-or-nothing validation: a bad token rejects the whole message
//!
//! # Example
//!
//! ```rust
//! use depth_explorer::orderbook::LevelBook;
//! use depth_explorer::types::{BookMessage, RawLevel, SnapshotMessage};
//!
//! let engine = LevelBook::new(25);
//! let message = BookMessage::Snapshot(SnapshotMessage {
//!     asks: Some(vec![RawLevel::new("100.5", "2"), RawLevel::new("100", "1")]),
//!     bids: Some(vec![RawLevel::new("99", "4")]),
//! });
//!
//! let book = engine.apply(None, &message).unwrap();
//! if let Some(level) = book.best_ask() {
//!     println!("Best ask: {} @ {}", level.size, level.price);
//! }
//! ```
//!
//! [`BookState`]: crate::types::BookState

pub mod book;

pub use book::{current_timestamp_ms, LevelBook};
