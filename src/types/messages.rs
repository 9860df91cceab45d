//! Inbound market-data message types.
//!
//! The transport hands the core Kraken book payloads. Price and size arrive
//! as decimal strings; they are only parsed (and validated) by the merge
//! engine in [`crate::orderbook`], so a malformed token rejects the whole
//! message there rather than at deserialization time.

use std::fmt;

use serde::de::{self, IgnoredAny, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::Error;

/// One raw `[price, size, ...]` tuple as sent by the exchange.
///
/// Trailing elements (per-level update timestamp, republish flag) are
/// accepted and discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLevel {
    /// Price token
    pub price: String,
    /// Size token (total resting size, `"0"` removes the level)
    pub size: String,
}

impl RawLevel {
    /// Create a raw level from its two tokens
    pub fn new(price: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            price: price.into(),
            size: size.into(),
        }
    }
}

impl<'de> Deserialize<'de> for RawLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RawLevelVisitor;

        impl<'de> Visitor<'de> for RawLevelVisitor {
            type Value = RawLevel;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an array [price, size, ...] of decimal strings")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RawLevel, A::Error> {
                let price: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let size: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(RawLevel { price, size })
            }
        }

        deserializer.deserialize_seq(RawLevelVisitor)
    }
}

/// Kraken book payload object.
///
/// Snapshot frames carry `as`/`bs`, delta frames carry `a`/`b`. Other keys
/// (such as the `c` checksum) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BookUpdate {
    /// Ask side of a snapshot
    #[serde(rename = "as")]
    pub snapshot_asks: Option<Vec<RawLevel>>,
    /// Bid side of a snapshot
    #[serde(rename = "bs")]
    pub snapshot_bids: Option<Vec<RawLevel>>,
    /// Ask deltas
    #[serde(rename = "a")]
    pub delta_asks: Option<Vec<RawLevel>>,
    /// Bid deltas
    #[serde(rename = "b")]
    pub delta_bids: Option<Vec<RawLevel>>,
}

impl BookUpdate {
    /// Classify the payload by field presence.
    ///
    /// Snapshot fields win over delta fields; a payload with neither
    /// yields `None`.
    pub fn classify(self) -> Option<BookMessage> {
        if self.snapshot_asks.is_some() || self.snapshot_bids.is_some() {
            return Some(BookMessage::Snapshot(SnapshotMessage {
                asks: self.snapshot_asks,
                bids: self.snapshot_bids,
            }));
        }
        if self.delta_asks.is_some() || self.delta_bids.is_some() {
            return Some(BookMessage::Delta(DeltaMessage {
                asks: self.delta_asks,
                bids: self.delta_bids,
            }));
        }
        None
    }

    /// Fold another payload of the same frame into this one.
    fn merge(&mut self, other: BookUpdate) {
        merge_side(&mut self.snapshot_asks, other.snapshot_asks);
        merge_side(&mut self.snapshot_bids, other.snapshot_bids);
        merge_side(&mut self.delta_asks, other.delta_asks);
        merge_side(&mut self.delta_bids, other.delta_bids);
    }
}

fn merge_side(into: &mut Option<Vec<RawLevel>>, from: Option<Vec<RawLevel>>) {
    if let Some(levels) = from {
        into.get_or_insert_with(Vec::new).extend(levels);
    }
}

/// Full replacement of one or both book sides.
///
/// A side that is `None` is carried over from the previous state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotMessage {
    /// Replacement asks
    pub asks: Option<Vec<RawLevel>>,
    /// Replacement bids
    pub bids: Option<Vec<RawLevel>>,
}

/// Incremental per-level updates (upsert, or remove when size is zero).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaMessage {
    /// Ask updates
    pub asks: Option<Vec<RawLevel>>,
    /// Bid updates
    pub bids: Option<Vec<RawLevel>>,
}

/// A normalized book message handed to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookMessage {
    /// Full snapshot
    Snapshot(SnapshotMessage),
    /// Incremental delta
    Delta(DeltaMessage),
}

impl BookMessage {
    /// Parse a Kraken v1 channel frame.
    ///
    /// Book frames look like `[channelId, payload, channelName, pair]`, or
    /// `[channelId, askPayload, bidPayload, channelName, pair]` when both sides
    /// changed in the same tick. Event objects (heartbeat, system status,
    /// subscription status) and non-book channels yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the text is not valid JSON or a book
    /// payload has the wrong shape.
    pub fn from_frame(text: &str) -> Result<Option<BookMessage>, Error> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Array(items) = value else {
            return Ok(None);
        };
        if items.len() < 4 {
            return Ok(None);
        }

        let channel_name = items[items.len() - 2].as_str().unwrap_or_default();
        if !channel_name.starts_with("book") {
            return Ok(None);
        }

        let mut update = BookUpdate::default();
        for payload in &items[1..items.len() - 2] {
            if payload.is_object() {
                update.merge(BookUpdate::deserialize(payload)?);
            }
        }
        Ok(update.classify())
    }

    /// Check if this is a snapshot
    pub fn is_snapshot(&self) -> bool {
        matches!(self, BookMessage::Snapshot(_))
    }

    /// Total number of raw levels carried by the message
    pub fn level_count(&self) -> usize {
        let (asks, bids) = match self {
            BookMessage::Snapshot(m) => (&m.asks, &m.bids),
            BookMessage::Delta(m) => (&m.asks, &m.bids),
        };
        asks.as_ref().map_or(0, Vec::len) + bids.as_ref().map_or(0, Vec::len)
    }
}

impl From<SnapshotMessage> for BookMessage {
    fn from(msg: SnapshotMessage) -> Self {
        BookMessage::Snapshot(msg)
    }
}

impl From<DeltaMessage> for BookMessage {
    fn from(msg: DeltaMessage) -> Self {
        BookMessage::Delta(msg)
    }
}
