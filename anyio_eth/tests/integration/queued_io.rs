//! Immediate and queued register access on an active session.

use super::*;
use anyio_common::llio::interface::{LlioError, LowLevelIo};
use anyio_common::llio::types::{CollectStatus, ExecContext};
use anyio_eth::session::BoardHandle;
use std::time::Instant;

const REGION: std::ops::Range<u16> = 0x0100..0x0200;

fn patterned_session() -> (SimHandle, EthSession, BoardHandle) {
    let (connector, session) = active_session(&[(10, "7I92")]);
    let sim = connector.board(ip(10)).unwrap().clone();
    for address in REGION.step_by(4) {
        sim.set_register_u32(address, 0xA500_0000 | u32::from(address));
    }
    let handle = session.find("hm2_7i92.0").unwrap();
    (sim, session, handle)
}

fn deadline() -> Instant {
    Instant::now() + IMMEDIATE_TIMEOUT
}

#[test]
fn test_queued_reads_match_immediate_reads() {
    let (sim, mut session, handle) = patterned_session();
    let board = session.board_mut(handle).unwrap();
    let requests: [(u16, usize); 4] = [(0x0100, 16), (0x0140, 8), (0x01F0, 4), (0x0104, 4)];

    let mut expected = Vec::new();
    for &(address, size) in &requests {
        let mut buf = vec![0u8; size];
        board.read(address, &mut buf).unwrap();
        expected.push(buf);
    }

    let before = sim.calls().sends;
    let slots: Vec<_> = requests
        .iter()
        .map(|&(address, size)| board.enqueue_read(address, size).unwrap().unwrap())
        .collect();
    board.flush_reads().unwrap();
    assert_eq!(board.collect_reads(deadline()).unwrap(), CollectStatus::Complete);
    assert_eq!(sim.calls().sends - before, 1, "batch must travel as one datagram");

    for (slot, want) in slots.iter().zip(&expected) {
        assert_eq!(board.read_slot(*slot).unwrap(), want.as_slice());
    }
    assert_eq!(board.read_slot_u32(slots[3]), Some(0xA500_0104));
}

#[test]
fn test_slots_stay_readable_until_next_batch_completes() {
    let (_sim, mut session, handle) = patterned_session();
    let board = session.board_mut(handle).unwrap();

    let first = board.enqueue_read(0x0100, 4).unwrap().unwrap();
    board.flush_reads().unwrap();
    board.collect_reads(deadline()).unwrap();

    let second = board.enqueue_read(0x0108, 4).unwrap().unwrap();
    board.flush_reads().unwrap();
    assert_eq!(board.read_slot_u32(first), Some(0xA500_0100));

    assert_eq!(board.collect_reads(deadline()).unwrap(), CollectStatus::Complete);
    assert_eq!(board.read_slot(first), None);
    assert_eq!(board.read_slot_u32(second), Some(0xA500_0108));
}

#[test]
fn test_queued_writes_go_out_in_one_datagram() {
    let (sim, mut session, handle) = patterned_session();
    let board = session.board_mut(handle).unwrap();
    let sends = sim.calls().sends;

    board.enqueue_write(0x0300, &0x1111_1111u32.to_le_bytes()).unwrap();
    board.enqueue_write(0x0310, &[0xAB; 8]).unwrap();
    assert_eq!(board.queued_writes(), 2);
    assert_eq!(sim.calls().sends, sends, "enqueue must not send");

    board.flush_writes().unwrap();
    assert_eq!(sim.calls().sends, sends + 1);
    assert_eq!(board.queued_writes(), 0);
    assert_eq!(sim.register_u32(0x0300), 0x1111_1111);
    assert_eq!(sim.bytes(0x0310, 8), vec![0xAB; 8]);
    assert_eq!(board.counters().write_packets, 1);
}

#[test]
fn test_cyclic_write_is_queued() {
    let (sim, mut session, handle) = patterned_session();
    session.set_context(ExecContext::Cyclic);
    let board = session.board_mut(handle).unwrap();

    board.write(0x0400, &7u32.to_le_bytes()).unwrap();
    assert_eq!(sim.register_u32(0x0400), 0);
    assert_eq!(board.queued_writes(), 1);

    board.flush_writes().unwrap();
    assert_eq!(sim.register_u32(0x0400), 7);
}

#[test]
fn test_cyclic_read_still_answers() {
    let (_sim, mut session, handle) = patterned_session();
    session.set_context(ExecContext::Cyclic);
    let board = session.board_mut(handle).unwrap();

    let mut buf = [0u8; 4];
    board.read(0x0110, &mut buf).unwrap();
    assert_eq!(u32::from_le_bytes(buf), 0xA500_0110);
    board.read(0x0114, &mut buf).unwrap();
    assert_eq!(u32::from_le_bytes(buf), 0xA500_0114);
}

#[test]
fn test_read_overflow_keeps_queued_reads() {
    let (_sim, mut session, handle) = patterned_session();
    let board = session.board_mut(handle).unwrap();

    let a = board.enqueue_read(0x0100, 508).unwrap().unwrap();
    let b = board.enqueue_read(0x0100, 508).unwrap().unwrap();
    let err = board.enqueue_read(0x0100, 508).unwrap_err();
    assert!(matches!(err, LlioError::BatchOverflow { requested: 508, .. }));
    assert_eq!(board.queued_reads(), 2);

    board.flush_reads().unwrap();
    assert_eq!(board.collect_reads(deadline()).unwrap(), CollectStatus::Complete);
    assert_eq!(board.read_slot(a).unwrap().len(), 508);
    assert_eq!(board.read_slot_u32(b), Some(0xA500_0100));
}

#[test]
fn test_read_slot_table_limit() {
    let (_sim, mut session, handle) = patterned_session();
    let board = session.board_mut(handle).unwrap();

    for _ in 0..anyio_common::consts::MAX_QUEUED_READS {
        board.enqueue_read(0x0100, 4).unwrap();
    }
    assert!(matches!(
        board.enqueue_read(0x0100, 4),
        Err(LlioError::BatchOverflow { .. })
    ));
    assert_eq!(board.queued_reads(), anyio_common::consts::MAX_QUEUED_READS);
}

#[test]
fn test_write_overflow_keeps_queued_writes() {
    let (sim, mut session, handle) = patterned_session();
    let board = session.board_mut(handle).unwrap();
    let payload = [0x5A; 508];

    board.enqueue_write(0x0800, &payload).unwrap();
    board.enqueue_write(0x0A00, &payload).unwrap();
    assert!(matches!(
        board.enqueue_write(0x0C00, &payload),
        Err(LlioError::BatchOverflow { requested: 512, .. })
    ));
    assert_eq!(board.queued_writes(), 2);

    board.flush_writes().unwrap();
    assert_eq!(sim.bytes(0x0A00, 508), payload.to_vec());
    assert_eq!(sim.bytes(0x0C00, 4), vec![0; 4]);
}

#[test]
fn test_misaligned_and_oversized_transfers() {
    let (_sim, mut session, handle) = patterned_session();
    let board = session.board_mut(handle).unwrap();

    assert!(matches!(board.enqueue_read(0x0100, 6), Err(LlioError::Misaligned(6))));
    assert!(matches!(
        board.enqueue_write(0x0100, &[0; 512]),
        Err(LlioError::TransferTooLarge { len: 512, max: 508 })
    ));
    let mut buf = [0u8; 3];
    assert!(matches!(board.read(0x0100, &mut buf), Err(LlioError::Misaligned(3))));
}

#[test]
fn test_enqueue_while_batch_in_flight() {
    let (_sim, mut session, handle) = patterned_session();
    let board = session.board_mut(handle).unwrap();

    board.enqueue_read(0x0100, 4).unwrap();
    board.flush_reads().unwrap();
    assert!(matches!(
        board.enqueue_read(0x0104, 4),
        Err(LlioError::BatchInFlight { .. })
    ));
    assert!(matches!(board.flush_reads(), Err(LlioError::BatchInFlight { .. })));

    assert_eq!(board.collect_reads(deadline()).unwrap(), CollectStatus::Complete);
    assert!(board.enqueue_read(0x0104, 4).unwrap().is_some());
}

#[test]
fn test_zero_length_calls_do_no_io() {
    let (sim, mut session, handle) = patterned_session();
    let board = session.board_mut(handle).unwrap();
    let before = sim.calls();

    board.read(0x0100, &mut []).unwrap();
    board.write(0x0100, &[]).unwrap();
    assert_eq!(board.enqueue_read(0x0100, 0).unwrap(), None);
    board.enqueue_write(0x0100, &[]).unwrap();
    board.flush_reads().unwrap();
    board.flush_writes().unwrap();
    assert_eq!(board.collect_reads(deadline()).unwrap(), CollectStatus::Idle);

    assert_eq!(sim.calls(), before);
}

#[test]
fn test_closed_gate_makes_every_entry_point_inert() {
    let (sim, mut session, handle) = patterned_session();
    let gate = session.gate();
    let board = session.board_mut(handle).unwrap();

    // A batch left in flight when the gate closes must not be collected.
    board.enqueue_read(0x0100, 4).unwrap();
    board.enqueue_write(0x0200, &[1, 2, 3, 4]).unwrap();
    board.flush_reads().unwrap();
    gate.close();
    let before = sim.calls();

    let mut buf = [0xEEu8; 4];
    board.read(0x0100, &mut buf).unwrap();
    assert_eq!(buf, [0xEE; 4]);
    board.write(0x0200, &[9, 9, 9, 9]).unwrap();
    assert_eq!(board.enqueue_read(0x0104, 4).unwrap(), None);
    board.flush_reads().unwrap();
    assert_eq!(board.collect_reads(deadline()).unwrap(), CollectStatus::Idle);
    board.enqueue_write(0x0204, &[1, 2, 3, 4]).unwrap();
    board.flush_writes().unwrap();

    assert_eq!(sim.calls().socket_calls(), before.socket_calls());
    assert_eq!(sim.register_u32(0x0200), 0);
}
