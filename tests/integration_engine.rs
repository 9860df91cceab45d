//! Integration tests for the depth engine.
//!
//! Messages are fed with explicit timestamps so history contents are
//! deterministic. Timer tests run on a paused Tokio clock.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=depth_explorer=trace cargo test --test integration_engine -- --nocapture
//! ```

use std::time::Duration;

use depth_explorer::events::LiquidityEventKind;
use depth_explorer::history::Mode;
use depth_explorer::types::{BookMessage, DeltaMessage, RawLevel, Side, SnapshotMessage};
use depth_explorer::{Config, DepthEngine, Error};
use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn snapshot(asks: &[(&str, &str)], bids: &[(&str, &str)]) -> BookMessage {
    BookMessage::Snapshot(SnapshotMessage {
        asks: Some(asks.iter().map(|(p, s)| RawLevel::new(*p, *s)).collect()),
        bids: Some(bids.iter().map(|(p, s)| RawLevel::new(*p, *s)).collect()),
    })
}

fn ask_delta(levels: &[(&str, &str)]) -> BookMessage {
    BookMessage::Delta(DeltaMessage {
        asks: Some(levels.iter().map(|(p, s)| RawLevel::new(*p, *s)).collect()),
        bids: None,
    })
}

/// Engine holding three recorded states at t = 1000, 2000, 3000
fn seeded_engine() -> DepthEngine {
    let engine = DepthEngine::new(Config::default()).unwrap();
    engine
        .handle_message_at(&snapshot(&[("100", "1")], &[("99", "1")]), 1000)
        .unwrap();
    engine.handle_message_at(&ask_delta(&[("101", "2")]), 2000).unwrap();
    engine.handle_message_at(&ask_delta(&[("102", "2")]), 3000).unwrap();
    engine
}

#[test]
fn test_snapshot_then_delta_removes_level() {
    init_tracing();
    let engine = DepthEngine::new(Config::default()).unwrap();

    engine
        .handle_message_at(&snapshot(&[("100", "5")], &[("99", "3")]), 1000)
        .unwrap();
    engine.handle_message_at(&ask_delta(&[("100", "0")]), 1100).unwrap();

    let book = engine.current_state().unwrap();
    assert!(book.asks.is_empty());
    assert_eq!(book.bids.len(), 1);
    assert_eq!(book.bids[0].price, dec!(99));
    assert_eq!(book.timestamp, 1100);
}

#[test]
fn test_single_wall_event_above_threshold() {
    let config = Config::default().with_thresholds(dec!(10), dec!(10));
    let engine = DepthEngine::new(config).unwrap();

    let events = engine
        .handle_message_at(&snapshot(&[("100", "12"), ("101", "4")], &[("99", "2")]), 500)
        .unwrap();

    assert_eq!(events.len(), 1);
    let event = events[0];
    assert_eq!(event.kind, LiquidityEventKind::WallCreated);
    assert_eq!(event.side, Side::Ask);
    assert_eq!(event.price, dec!(100));
    assert_eq!(event.size, dec!(12));
    assert_eq!(event.threshold, dec!(10));
    assert_eq!(event.timestamp, 500);
}

#[test]
fn test_wall_hysteresis_through_engine() {
    let config = Config::default().with_thresholds(dec!(10), dec!(10));
    let engine = DepthEngine::new(config).unwrap();

    let sizes = ["9", "11", "9.5", "7"];
    let mut kinds = Vec::new();
    for (i, size) in sizes.into_iter().enumerate() {
        let message = if i == 0 {
            snapshot(&[("100", size)], &[])
        } else {
            ask_delta(&[("100", size)])
        };
        let events = engine.handle_message_at(&message, 1000 + i as u64).unwrap();
        kinds.extend(events.into_iter().map(|e| e.kind));
    }

    assert_eq!(
        kinds,
        vec![LiquidityEventKind::WallCreated, LiquidityEventKind::WallRemoved]
    );
}

#[test]
fn test_rejected_messages_leave_state_untouched() {
    let engine = DepthEngine::new(Config::default()).unwrap();

    let err = engine.handle_message_at(&ask_delta(&[("100", "1")]), 10).unwrap_err();
    assert!(matches!(err, Error::MissingSnapshot));
    assert!(engine.live_state().is_none());
    assert_eq!(engine.history_len(), 0);

    engine
        .handle_message_at(&snapshot(&[("100", "1")], &[]), 20)
        .unwrap();
    let err = engine
        .handle_message_at(&ask_delta(&[("101", "2"), ("abc", "1")]), 30)
        .unwrap_err();
    assert!(err.is_rejected_message());

    let book = engine.live_state().unwrap();
    assert_eq!(book.timestamp, 20);
    assert_eq!(book.asks.len(), 1);
    assert_eq!(engine.history_len(), 1);
}

#[test]
fn test_handle_frame() {
    let engine = DepthEngine::new(Config::default()).unwrap();

    let events = engine
        .handle_frame(r#"{"event":"heartbeat"}"#)
        .unwrap();
    assert!(events.is_empty());
    assert!(engine.live_state().is_none());

    engine
        .handle_frame(
            r#"[0, {"as": [["5541.3", "2.5", "1534614248.1"]], "bs": [["5541.2", "1.5", "1534614248.2"]]}, "book-25", "XBT/USD"]"#,
        )
        .unwrap();
    engine
        .handle_frame(
            r#"[0, {"a": [["5541.3", "0.0", "1534614335.3"]]}, {"b": [["5541.2", "4.0", "1534614335.4", "r"]]}, "book-25", "XBT/USD"]"#,
        )
        .unwrap();

    let book = engine.live_state().unwrap();
    assert!(book.asks.is_empty());
    assert_eq!(book.best_bid().unwrap().size, dec!(4.0));

    assert!(matches!(engine.handle_frame("not json"), Err(Error::Json(_))));
}

#[test]
fn test_records_only_while_live() {
    let engine = seeded_engine();
    assert_eq!(engine.history_len(), 3);

    engine.enter_playback(None);
    assert_eq!(engine.cursor().mode, Mode::Playback);
    assert_eq!(engine.cursor().cursor_time, Some(3000));

    engine.handle_message_at(&ask_delta(&[("103", "1")]), 4000).unwrap();
    assert_eq!(engine.history_len(), 3);
    assert_eq!(engine.live_state().unwrap().timestamp, 4000);
    assert_eq!(engine.current_state().unwrap().timestamp, 3000);

    engine.back_to_live();
    assert_eq!(engine.current_state().unwrap().timestamp, 4000);

    engine.handle_message_at(&ask_delta(&[("104", "1")]), 5000).unwrap();
    assert_eq!(engine.history_len(), 4);
    let timestamps: Vec<_> = engine.history().iter().map(|e| e.timestamp).collect();
    assert_eq!(timestamps, vec![1000, 2000, 3000, 5000]);
}

#[test]
fn test_history_capacity_evicts_oldest() {
    let engine = DepthEngine::new(Config::default().with_history_capacity(2)).unwrap();
    engine
        .handle_message_at(&snapshot(&[("100", "1")], &[]), 1)
        .unwrap();
    engine.handle_message_at(&ask_delta(&[("100", "2")]), 2).unwrap();
    engine.handle_message_at(&ask_delta(&[("100", "3")]), 3).unwrap();

    assert_eq!(engine.history_len(), 2);
    assert_eq!(engine.history()[0].timestamp, 2);
    assert!(engine.history_at(1).is_none());
    assert_eq!(engine.history_at(10).unwrap().timestamp, 3);
}

#[test]
fn test_seek_clamps_to_history() {
    let engine = seeded_engine();

    engine.seek(10_000);
    assert_eq!(engine.cursor().cursor_time, Some(3000));

    engine.seek(10);
    assert_eq!(engine.cursor().cursor_time, Some(1000));
    assert_eq!(engine.current_state().unwrap().timestamp, 1000);

    engine.seek(2500);
    assert_eq!(engine.current_state().unwrap().timestamp, 2000);
}

#[test]
fn test_refresh_bounds_only_while_live() {
    let engine = seeded_engine();
    assert_eq!(engine.refresh_bounds(), Some((1000, 3000)));

    engine.enter_playback(None);
    engine.back_to_live();
    engine.handle_message_at(&ask_delta(&[("103", "1")]), 4000).unwrap();

    engine.enter_playback(None);
    assert_eq!(engine.refresh_bounds(), Some((1000, 3000)));

    engine.back_to_live();
    assert_eq!(engine.refresh_bounds(), Some((1000, 4000)));
}

#[test]
fn test_manual_tick_advances_and_clamps() {
    let engine = seeded_engine();

    engine.enter_playback(Some(1000));
    assert!(engine.play());

    assert_eq!(engine.tick(), Some(1100));
    engine.set_speed(5.0).unwrap();
    assert_eq!(engine.tick(), Some(1600));

    engine.set_speed(10.0).unwrap();
    assert_eq!(engine.tick(), Some(2600));
    assert_eq!(engine.tick(), Some(3000));
    assert_eq!(engine.tick(), Some(3000));
    assert_eq!(engine.cursor().mode, Mode::Playback);

    engine.pause();
    assert_eq!(engine.tick(), None);
}

#[test]
fn test_play_from_live_starts_at_newest() {
    let engine = seeded_engine();

    assert!(engine.play());
    let cursor = engine.cursor();
    assert_eq!(cursor.mode, Mode::Playback);
    assert!(cursor.is_playing);
    assert_eq!(cursor.cursor_time, Some(3000));
}

#[test]
fn test_playback_refused_before_anything_recorded() {
    let engine = DepthEngine::new(Config::default()).unwrap();
    assert!(!engine.enter_playback(None));
    assert!(!engine.seek(1500));
    assert_eq!(engine.cursor().mode, Mode::Live);

    engine
        .handle_message_at(&snapshot(&[("100", "1")], &[]), 1000)
        .unwrap();
    engine.handle_message_at(&ask_delta(&[("100", "2")]), 2000).unwrap();

    assert_eq!(engine.history_len(), 2);
    assert_eq!(engine.current_state().unwrap().timestamp, 2000);
    assert!(engine.enter_playback(None));
    assert_eq!(engine.cursor().cursor_time, Some(2000));
}

#[test]
fn test_reset_and_clear_history_drop_scrub_bounds() {
    let engine = DepthEngine::new(Config::default()).unwrap();
    engine
        .handle_message_at(&snapshot(&[("100", "1")], &[]), 1000)
        .unwrap();
    engine.handle_message_at(&ask_delta(&[("100", "2")]), 2000).unwrap();
    assert_eq!(engine.refresh_bounds(), Some((1000, 2000)));

    engine.reset();
    assert_eq!(engine.history_bounds(), None);

    engine
        .handle_message_at(&snapshot(&[("100", "1")], &[]), 9000)
        .unwrap();
    assert!(engine.seek(9000));
    assert_eq!(engine.cursor().cursor_time, Some(9000));

    engine.back_to_live();
    assert_eq!(engine.refresh_bounds(), Some((9000, 9000)));
    engine.clear_history();
    assert_eq!(engine.history_bounds(), None);
    assert!(!engine.seek(9000));
}

#[test]
fn test_playback_never_rewinds_after_jump_past_newest() {
    let engine = seeded_engine();
    engine.jump_to(20_000, dec!(102));
    assert!(engine.play());

    assert_eq!(engine.tick(), Some(17_000));
    assert_eq!(engine.current_state().unwrap().timestamp, 3000);
}

#[test]
fn test_play_with_empty_history_is_noop() {
    let engine = DepthEngine::new(Config::default()).unwrap();
    assert!(!engine.play());
    assert_eq!(engine.cursor().mode, Mode::Live);
}

#[test]
fn test_invalid_speed_rejected() {
    let engine = seeded_engine();
    assert!(matches!(engine.set_speed(0.0), Err(Error::InvalidSpeed(_))));
    assert_err!(engine.set_speed(f64::NAN));
    assert_err!(engine.set_speed(-2.0));
    assert_eq!(engine.cursor().speed, 1.0);
}

#[test]
fn test_jump_to_event() {
    let engine = seeded_engine();
    engine.play();

    engine.jump_to(5000, dec!(101));
    let cursor = engine.cursor();
    assert_eq!(cursor.mode, Mode::Playback);
    assert_eq!(cursor.cursor_time, Some(2000));
    assert!(!cursor.is_playing);
    assert_eq!(cursor.highlighted_price, Some(dec!(101)));
    assert_eq!(cursor.highlighted_event_time, Some(5000));

    engine.jump_to(1000, dec!(100));
    assert_eq!(engine.cursor().cursor_time, Some(0));
    // Older than the retained window: degrades to the oldest entry
    assert_eq!(engine.current_state().unwrap().timestamp, 1000);
}

#[test]
fn test_back_to_live_resets_cursor() {
    let engine = seeded_engine();
    engine.jump_to(3000, dec!(102));
    engine.set_speed(4.0).unwrap();

    engine.back_to_live();
    let cursor = engine.cursor();
    assert_eq!(cursor.mode, Mode::Live);
    assert_eq!(cursor.cursor_time, None);
    assert!(!cursor.is_playing);
    assert_eq!(cursor.speed, 1.0);
    assert_eq!(cursor.highlighted_price, None);
    assert_eq!(cursor.highlighted_event_time, None);
}

#[test]
fn test_set_thresholds_at_runtime() {
    let engine = DepthEngine::new(Config::default()).unwrap();
    assert!(matches!(
        engine.set_thresholds(dec!(0), dec!(5)),
        Err(Error::InvalidThreshold(_))
    ));
    assert_eq!(engine.thresholds().create(Side::Ask), dec!(3));

    assert_ok!(engine.set_thresholds(dec!(50), dec!(5)));
    let events = engine
        .handle_message_at(&snapshot(&[("100", "20")], &[("99", "6")]), 1)
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].side, Side::Bid);
}

#[test]
fn test_reset_clears_everything() {
    let engine = seeded_engine();
    engine.enter_playback(Some(2000));

    engine.reset();
    assert!(engine.live_state().is_none());
    assert!(engine.current_state().is_none());
    assert_eq!(engine.history_len(), 0);
    assert_eq!(engine.cursor().mode, Mode::Live);
}

#[tokio::test]
async fn test_event_and_state_subscriptions() {
    let engine = DepthEngine::new(Config::default()).unwrap();
    let mut events = engine.subscribe_events();
    let mut states = engine.subscribe();

    engine
        .handle_message_at(&snapshot(&[("100", "8")], &[]), 42)
        .unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.price, dec!(100));
    assert_eq!(event.timestamp, 42);

    assert!(states.has_changed().unwrap());
    let state = states.borrow_and_update().clone().unwrap();
    assert_eq!(state.timestamp, 42);

    // Playback at the same entry exposes the same state: no change notification
    engine.enter_playback(None);
    assert!(!states.has_changed().unwrap());

    engine.handle_message_at(&ask_delta(&[("100", "1")]), 43).unwrap();
    assert!(!states.has_changed().unwrap());

    engine.back_to_live();
    assert!(states.has_changed().unwrap());
    assert_eq!(states.borrow().as_ref().unwrap().timestamp, 43);
}

#[tokio::test(start_paused = true)]
async fn test_playback_timer_advances_cursor() {
    init_tracing();
    let engine = seeded_engine();

    engine.enter_playback(Some(1000));
    assert!(engine.play());

    tokio::time::sleep(Duration::from_millis(350)).await;
    let cursor = engine.cursor().cursor_time.unwrap();
    assert!((1200..=1400).contains(&cursor), "cursor at {cursor}");

    engine.pause();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(engine.cursor().cursor_time, Some(cursor));
}

#[tokio::test(start_paused = true)]
async fn test_playback_timer_stops_on_back_to_live() {
    let engine = seeded_engine();
    engine.enter_playback(Some(1000));
    engine.play();

    tokio::time::sleep(Duration::from_millis(250)).await;
    engine.back_to_live();
    tokio::time::sleep(Duration::from_millis(1000)).await;

    let cursor = engine.cursor();
    assert_eq!(cursor.mode, Mode::Live);
    assert_eq!(cursor.cursor_time, None);
}

#[tokio::test(start_paused = true)]
async fn test_bounds_timer_refreshes_while_live() {
    let engine = DepthEngine::new(Config::default()).unwrap();
    engine
        .handle_message_at(&snapshot(&[("100", "1")], &[]), 1000)
        .unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(engine.history_bounds(), Some((1000, 1000)));

    engine.enter_playback(None);
    engine.back_to_live();
    engine.handle_message_at(&ask_delta(&[("100", "2")]), 2000).unwrap();
    engine.enter_playback(None);

    // Frozen while in playback
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(engine.history_bounds(), Some((1000, 1000)));

    engine.back_to_live();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(engine.history_bounds(), Some((1000, 2000)));
}
