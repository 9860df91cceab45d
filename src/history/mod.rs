//! Time-travel support: retained history and the playback cursor.
//!
//! - [`ReplayBuffer`] - bounded, time-ordered history with floor lookup
//! - [`PlaybackCursor`] - live/playback state machine over that history

pub mod buffer;
pub mod cursor;

pub use buffer::{HistoryEntry, ReplayBuffer};
pub use cursor::{CursorState, Mode, PlaybackCursor};
