//! Packet loss, malformed replies and the sticky error counter.

use super::*;
use anyio_common::consts::ERROR_CEILING;
use anyio_common::llio::interface::{LlioError, LowLevelIo};
use anyio_common::llio::types::CollectStatus;
use anyio_eth::Board;
use std::time::Instant;

const SHORT_DEADLINE: Duration = Duration::from_millis(5);

/// Upper bound on deadline overshoot in a loaded test runner.
const SLACK: Duration = Duration::from_millis(500);

fn lossy_session() -> (SimHandle, EthSession) {
    let (connector, session) = active_session(&[(10, "7I92")]);
    let sim = connector.board(ip(10)).unwrap().clone();
    sim.set_register_u32(0x0100, 0xC0FF_EE00);
    (sim, session)
}

fn board(session: &mut EthSession) -> &mut Board {
    let handle = session.find("hm2_7i92.0").unwrap();
    session.board_mut(handle).unwrap()
}

/// Queue, flush and collect one 4-byte read.
fn cycle(board: &mut Board, deadline: Duration) -> Result<CollectStatus, LlioError> {
    board.enqueue_read(0x0100, 4)?;
    board.flush_reads()?;
    board.collect_reads(Instant::now() + deadline)
}

#[test]
fn test_immediate_read_times_out_within_bound() {
    let (sim, mut session) = lossy_session();
    sim.set_drop_all(true);
    let board = board(&mut session);

    let started = Instant::now();
    let mut buf = [0u8; 4];
    let err = board.read(0x0100, &mut buf).unwrap_err();
    let waited = started.elapsed();

    assert!(matches!(err, LlioError::Timeout { tries, .. } if tries > 1));
    assert!(waited >= IMMEDIATE_TIMEOUT);
    assert!(waited < IMMEDIATE_TIMEOUT + SLACK, "waited {waited:?}");
    assert_eq!(board.error_count(), 0, "immediate reads do not feed the counter");
}

#[test]
fn test_queued_collect_returns_at_deadline() {
    let (sim, mut session) = lossy_session();
    sim.set_drop_all(true);
    let board = board(&mut session);

    let deadline = Duration::from_millis(50);
    let started = Instant::now();
    let status = cycle(board, deadline).unwrap();
    let waited = started.elapsed();

    assert_eq!(status, CollectStatus::Discarded { error_count: 1 });
    assert!(waited >= deadline);
    assert!(waited < deadline + SLACK, "waited {waited:?}");
    assert_eq!(board.queued_reads(), 0);
    assert_eq!(board.counters().batches_discarded, 1);
}

#[test]
fn test_single_loss_is_absorbed() {
    let (sim, mut session) = lossy_session();
    let board = board(&mut session);

    assert_eq!(cycle(board, IMMEDIATE_TIMEOUT).unwrap(), CollectStatus::Complete);
    sim.drop_next_replies(1);
    assert_eq!(
        cycle(board, SHORT_DEADLINE).unwrap(),
        CollectStatus::Discarded { error_count: 1 }
    );
    assert_eq!(cycle(board, IMMEDIATE_TIMEOUT).unwrap(), CollectStatus::Complete);
    assert_eq!(board.error_count(), 0);
}

#[test]
fn test_sustained_loss_saturates_on_tenth_failure() {
    let (sim, mut session) = lossy_session();
    sim.set_drop_all(true);
    let board = board(&mut session);

    for expected in 1..ERROR_CEILING {
        assert_eq!(
            cycle(board, SHORT_DEADLINE).unwrap(),
            CollectStatus::Discarded {
                error_count: expected
            }
        );
    }
    assert_eq!(
        cycle(board, SHORT_DEADLINE),
        Err(LlioError::LinkDegraded {
            error_count: ERROR_CEILING
        })
    );
    assert_eq!(board.error_count(), ERROR_CEILING);

    // Further losses keep it pinned at the ceiling.
    assert!(matches!(
        cycle(board, SHORT_DEADLINE),
        Err(LlioError::LinkDegraded { .. })
    ));
    assert_eq!(board.error_count(), ERROR_CEILING);
}

#[test]
fn test_successes_drain_the_counter() {
    let (sim, mut session) = lossy_session();
    let board = board(&mut session);

    sim.drop_next_replies(3);
    for _ in 0..3 {
        cycle(board, SHORT_DEADLINE).unwrap();
    }
    assert_eq!(board.error_count(), 3);

    let mut previous = board.error_count();
    for _ in 0..2 {
        assert_eq!(cycle(board, IMMEDIATE_TIMEOUT).unwrap(), CollectStatus::Complete);
        assert!(previous - board.error_count() <= 2);
        previous = board.error_count();
    }
    assert_eq!(board.error_count(), 0);
}

#[test]
fn test_link_recovers_after_saturation() {
    let (sim, mut session) = lossy_session();
    sim.set_drop_all(true);
    let board = board(&mut session);
    while cycle(board, SHORT_DEADLINE).is_ok() {}
    assert_eq!(board.error_count(), ERROR_CEILING);

    sim.set_drop_all(false);
    assert_eq!(cycle(board, IMMEDIATE_TIMEOUT).unwrap(), CollectStatus::Complete);
    assert_eq!(board.error_count(), ERROR_CEILING - 2);
}

#[test]
fn test_truncated_reply_discards_whole_batch() {
    let (sim, mut session) = lossy_session();
    let board = board(&mut session);

    let good = board.enqueue_read(0x0100, 4).unwrap().unwrap();
    board.flush_reads().unwrap();
    board.collect_reads(Instant::now() + IMMEDIATE_TIMEOUT).unwrap();
    assert_eq!(board.read_slot_u32(good), Some(0xC0FF_EE00));

    sim.truncate_next_replies(1);
    let a = board.enqueue_read(0x0100, 4).unwrap().unwrap();
    let b = board.enqueue_read(0x0104, 4).unwrap().unwrap();
    board.flush_reads().unwrap();
    assert_eq!(
        board.collect_reads(Instant::now() + IMMEDIATE_TIMEOUT).unwrap(),
        CollectStatus::Discarded { error_count: 1 }
    );
    assert_eq!(board.read_slot(a), None);
    assert_eq!(board.read_slot(b), None);
    assert_eq!(board.read_slot(good), None);
}

#[test]
fn test_late_reply_is_drained_before_next_batch() {
    let (sim, mut session) = lossy_session();
    let board = board(&mut session);

    sim.drop_next_replies(1);
    cycle(board, SHORT_DEADLINE).unwrap();
    // The lost batch's reply turns up after its deadline.
    sim.inject_reply(&0xDEAD_BEEFu32.to_le_bytes());

    let slot = board.enqueue_read(0x0100, 4).unwrap().unwrap();
    board.flush_reads().unwrap();
    assert_eq!(
        board.collect_reads(Instant::now() + IMMEDIATE_TIMEOUT).unwrap(),
        CollectStatus::Complete
    );
    assert_eq!(board.read_slot_u32(slot), Some(0xC0FF_EE00));
    assert_eq!(board.counters().stale_replies, 1);
}

#[test]
fn test_writes_flow_without_replies() {
    let (sim, mut session) = lossy_session();
    sim.set_drop_all(true);
    let board = board(&mut session);

    board.enqueue_write(0x0200, &42u32.to_le_bytes()).unwrap();
    board.flush_writes().unwrap();
    board.write(0x0204, &43u32.to_le_bytes()).unwrap();

    assert_eq!(sim.register_u32(0x0200), 42);
    assert_eq!(sim.register_u32(0x0204), 43);
    assert_eq!(board.error_count(), 0);
}
