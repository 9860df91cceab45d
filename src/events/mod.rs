//! Liquidity event detection.
//!
//! - [`WallDetector`] - compares consecutive book states and reports walls
//!   appearing or disappearing, with create/remove hysteresis

pub mod walls;

pub use walls::{LiquidityEvent, LiquidityEventKind, Thresholds, WallDetector};
