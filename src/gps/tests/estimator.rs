use std::sync::Arc;
use std::time::Duration;

use crate::gps::edge::{EdgeCapture, EdgeEvent};
use crate::gps::estimator::{
    Correlation, DEFAULT_MAX_EDGE_AGE, EstimatorClosed, EstimatorState, OffsetEstimator,
    OffsetReader, OffsetSample,
};
use crate::gps::nmea::CalendarSample;
use crate::testing::ManualClock;

// 2013-10-27T11:22:06Z
const E: u64 = 1_382_872_926;

fn calendar(second_offset: u32) -> CalendarSample {
    CalendarSample::new(2013, 10, 27, 11, 22, 6 + second_offset).unwrap()
}

fn setup() -> (Arc<ManualClock>, Arc<EdgeCapture>, OffsetEstimator, OffsetReader) {
    let clock = ManualClock::new(Duration::from_secs(E));
    let capture = Arc::new(EdgeCapture::with_clock(clock.clone()));
    let (estimator, reader) =
        OffsetEstimator::new(capture.clone(), clock.clone(), DEFAULT_MAX_EDGE_AGE);
    (clock, capture, estimator, reader)
}

#[test]
fn test_initial_state() {
    let (_clock, _capture, estimator, reader) = setup();
    assert_eq!(estimator.state(), EstimatorState::NoSample);
    assert_eq!(estimator.current(), None);
    assert_eq!(reader.current(), None);
    assert_eq!(estimator.max_edge_age(), Duration::from_secs(2));
}

#[test]
fn test_sentence_without_edge_is_dropped() {
    let (_clock, _capture, mut estimator, reader) = setup();
    assert_eq!(estimator.on_calendar(&calendar(0)), Correlation::NoEdge);
    assert_eq!(estimator.state(), EstimatorState::NoSample);
    assert_eq!(reader.current(), None);
}

#[test]
fn test_edge_then_sentence_publishes_offset() {
    let (clock, capture, mut estimator, reader) = setup();
    clock.set(Duration::new(E, 4_000_000));
    capture.on_edge();
    clock.advance(Duration::from_millis(150));

    let Correlation::Published(sample) = estimator.on_calendar(&calendar(0)) else {
        panic!("expected a published sample");
    };
    assert_eq!(sample.offset_nanos(), 4_000_000);
    assert!((sample.offset_secs() - 0.004).abs() < 1e-12);
    assert_eq!(sample.calendar_time(), 1_382_872_926);
    assert_eq!(sample.edge_time(), Duration::new(E, 4_000_000));

    assert_eq!(estimator.state(), EstimatorState::HasSample);
    assert_eq!(reader.current(), Some(sample));
    assert!(!capture.is_pending());
}

#[test]
fn test_second_pair_supersedes_first() {
    let (clock, capture, mut estimator, reader) = setup();
    clock.set(Duration::new(E, 4_000_000));
    capture.on_edge();
    estimator.on_calendar(&calendar(0));

    clock.set(Duration::new(E + 1, 7_000_000));
    capture.on_edge();
    let Correlation::Published(second) = estimator.on_calendar(&calendar(1)) else {
        panic!("expected a published sample");
    };

    assert_eq!(second.offset_nanos(), 7_000_000);
    assert_eq!(reader.current(), Some(second));
}

#[test]
fn test_negative_offset() {
    let (clock, capture, mut estimator, _reader) = setup();
    clock.set(Duration::new(E - 1, 990_000_000));
    capture.on_edge();
    clock.set(Duration::new(E, 100_000_000));

    let Correlation::Published(sample) = estimator.on_calendar(&calendar(0)) else {
        panic!("expected a published sample");
    };
    assert_eq!(sample.offset_nanos(), -10_000_000);
}

#[test]
fn test_stale_edge_is_discarded() {
    let (clock, capture, mut estimator, reader) = setup();
    capture.on_edge();
    clock.advance(Duration::from_secs(3));

    assert_eq!(
        estimator.on_calendar(&calendar(3)),
        Correlation::StaleEdge {
            age: Duration::from_secs(3)
        }
    );
    assert_eq!(estimator.state(), EstimatorState::NoSample);
    assert_eq!(reader.current(), None);
    // The stale edge is consumed, not left for the next sentence.
    assert!(!capture.is_pending());
}

#[test]
fn test_stale_edge_keeps_previous_sample() {
    let (clock, capture, mut estimator, reader) = setup();
    capture.on_edge();
    let Correlation::Published(first) = estimator.on_calendar(&calendar(0)) else {
        panic!("expected a published sample");
    };

    capture.on_edge();
    clock.advance(Duration::from_secs(5));
    assert!(matches!(
        estimator.on_calendar(&calendar(5)),
        Correlation::StaleEdge { .. }
    ));
    assert_eq!(estimator.state(), EstimatorState::HasSample);
    assert_eq!(reader.current(), Some(first));
}

#[test]
fn test_future_edge_is_discarded() {
    let (clock, capture, mut estimator, _reader) = setup();
    capture.record(Duration::from_secs(E + 1));
    clock.set(Duration::from_secs(E));
    assert_eq!(
        estimator.on_calendar(&calendar(0)),
        Correlation::FutureEdge {
            lead: Duration::from_secs(1)
        }
    );
}

#[test]
fn test_edge_at_window_limit_is_accepted() {
    let (clock, capture, mut estimator, _reader) = setup();
    capture.on_edge();
    clock.advance(DEFAULT_MAX_EDGE_AGE);
    assert!(matches!(
        estimator.on_calendar(&calendar(0)),
        Correlation::Published(_)
    ));
}

#[test]
fn test_sample_apply() {
    let edge = EdgeEvent {
        timestamp: Duration::new(E, 4_000_000),
    };
    let sample = OffsetSample::new(edge, 1_382_872_926);
    let local = Duration::new(E + 10, 500_000_000);
    assert_eq!(
        sample.apply(local),
        i128::from(E + 10) * 1_000_000_000 + 504_000_000
    );
}

#[tokio::test]
async fn test_wait_ready_blocks_until_published() {
    let (_clock, capture, mut estimator, mut reader) = setup();

    let waiter = tokio::spawn(async move { reader.wait_ready().await });
    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());

    capture.on_edge();
    let Correlation::Published(sample) = estimator.on_calendar(&calendar(0)) else {
        panic!("expected a published sample");
    };
    assert_eq!(waiter.await.unwrap(), Ok(sample));
}

#[tokio::test]
async fn test_wait_ready_returns_existing_sample() {
    let (_clock, capture, mut estimator, _reader) = setup();
    capture.on_edge();
    estimator.on_calendar(&calendar(0));

    let mut late_reader = estimator.reader();
    assert_eq!(late_reader.wait_ready().await, Ok(estimator.current().unwrap()));
}

#[tokio::test]
async fn test_wait_ready_errors_when_estimator_dropped() {
    let (_clock, _capture, estimator, mut reader) = setup();
    drop(estimator);
    assert_eq!(reader.wait_ready().await, Err(EstimatorClosed));
}

#[tokio::test]
async fn test_changed_sees_each_publication() {
    let (clock, capture, mut estimator, mut reader) = setup();

    capture.on_edge();
    estimator.on_calendar(&calendar(0));
    let first = reader.changed().await.unwrap().unwrap();
    assert_eq!(first.calendar_time(), 1_382_872_926);

    clock.advance(Duration::from_secs(1));
    capture.on_edge();
    estimator.on_calendar(&calendar(1));
    let second = reader.changed().await.unwrap().unwrap();
    assert_eq!(second.calendar_time(), 1_382_872_927);
}
