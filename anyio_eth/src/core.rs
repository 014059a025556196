//! Cyclic runtime.
//!
//! `EthCore` drives an active session through the control cycle:
//!
//! 1. enqueue the configured watch registers on every board
//! 2. flush every board's read batch
//! 3. collect every board against `cycle_start + read_deadline`
//! 4. flush every board's write batch
//! 5. sleep out the rest of the cycle

use crate::config::TimingConfig;
use crate::error::EthError;
use crate::session::{BoardHandle, EthSession};
use anyio_common::llio::interface::{LlioError, LowLevelIo};
use anyio_common::llio::types::{CollectStatus, ExecContext, ReadSlot};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Timing statistics for RT loop monitoring.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimingStats {
    /// Number of cycles executed
    pub cycle_count: u64,
    /// Number of timing violations (cycle exceeded target)
    pub timing_violations: u64,
    /// Maximum observed cycle time
    pub max_cycle_time_us: u64,
    /// Sum of cycle times for average calculation
    pub total_cycle_time_us: u64,
}

impl TimingStats {
    /// Average cycle time, 0 before the first cycle.
    pub fn avg_cycle_time_us(&self) -> u64 {
        self.total_cycle_time_us.checked_div(self.cycle_count).unwrap_or(0)
    }
}

struct Watch {
    address: u16,
    slot: Option<ReadSlot>,
    value: Option<u32>,
}

struct BoardCycle {
    handle: BoardHandle,
    watches: Vec<Watch>,
    discarded_cycles: u64,
}

/// Runs the control cycle over an active session.
pub struct EthCore {
    session: EthSession,
    timing: TimingConfig,
    boards: Vec<BoardCycle>,
    running: Arc<AtomicBool>,
    stats: TimingStats,
}

impl EthCore {
    /// Core over `session`; `watches[i]` lists the registers polled on board
    /// `i` every cycle.
    pub fn new(session: EthSession, timing: TimingConfig, watches: &[Vec<u16>]) -> Self {
        let boards = session
            .handles()
            .map(|handle| BoardCycle {
                handle,
                watches: watches
                    .get(handle.index())
                    .map(|addrs| {
                        addrs
                            .iter()
                            .map(|&address| Watch {
                                address,
                                slot: None,
                                value: None,
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
                discarded_cycles: 0,
            })
            .collect();

        info!(
            boards = session.len(),
            cycle_time_us = timing.cycle_time_us,
            read_deadline_us = timing.read_deadline_us,
            "EthCore created"
        );
        Self {
            session,
            timing,
            boards,
            running: Arc::new(AtomicBool::new(false)),
            stats: TimingStats::default(),
        }
    }

    /// Run cycles until the running flag clears or `max_cycles` is reached.
    ///
    /// # Errors
    /// `EthError::Link` when a board's error counter saturates.
    pub fn run(&mut self, max_cycles: Option<u64>) -> Result<(), EthError> {
        info!(
            "Starting EthCore RT loop (cycle_time={}us)...",
            self.timing.cycle_time_us
        );
        self.running.store(true, Ordering::SeqCst);
        if detect_rt_mode() {
            info!("Running in real-time mode");
        } else {
            info!("Running in standard (non-RT) mode");
        }
        self.session.set_context(ExecContext::Cyclic);

        let cycle_time = self.timing.cycle_time();
        let result = loop {
            if !self.running.load(Ordering::SeqCst) {
                break Ok(());
            }
            if max_cycles.is_some_and(|max| self.stats.cycle_count >= max) {
                break Ok(());
            }

            let cycle_start = Instant::now();
            if let Err(e) = self.cycle(cycle_start) {
                break Err(e);
            }
            self.record_cycle(cycle_start);

            let elapsed = cycle_start.elapsed();
            if elapsed < cycle_time {
                std::thread::sleep(cycle_time - elapsed);
            }
        };

        self.session.set_context(ExecContext::Immediate);
        info!(
            "EthCore RT loop stopped after {} cycles (violations: {})",
            self.stats.cycle_count, self.stats.timing_violations
        );
        result
    }

    /// One control cycle starting at `cycle_start`.
    pub fn cycle(&mut self, cycle_start: Instant) -> Result<(), EthError> {
        let deadline = cycle_start + self.timing.read_deadline();

        for entry in &mut self.boards {
            let board = self.session.board_mut(entry.handle)?;
            for watch in &mut entry.watches {
                watch.slot = match board.enqueue_read(watch.address, 4) {
                    Ok(slot) => slot,
                    Err(e) => {
                        warn!(
                            board = board.name(),
                            address = format_args!("{:#06x}", watch.address),
                            "watch not queued: {e}"
                        );
                        None
                    }
                };
            }
            if let Err(e) = board.flush_reads() {
                saturated(board.name(), e)?;
            }
        }

        for entry in &mut self.boards {
            let board = self.session.board_mut(entry.handle)?;
            match board.collect_reads(deadline) {
                Ok(CollectStatus::Complete) => {
                    for watch in &mut entry.watches {
                        let value = watch.slot.and_then(|slot| board.read_slot_u32(slot));
                        if value.is_some() && value != watch.value {
                            debug!(
                                board = board.name(),
                                address = format_args!("{:#06x}", watch.address),
                                value = format_args!("{:#010x}", value.unwrap_or_default()),
                                "watch changed"
                            );
                        }
                        watch.value = value;
                    }
                }
                Ok(CollectStatus::Discarded { .. }) => {
                    entry.discarded_cycles += 1;
                }
                Ok(CollectStatus::Idle) => {}
                Err(e) => saturated(board.name(), e)?,
            }

            if let Err(e) = board.flush_writes() {
                saturated(board.name(), e)?;
            }
        }
        Ok(())
    }

    fn record_cycle(&mut self, cycle_start: Instant) {
        let cycle_time_us = cycle_start.elapsed().as_micros() as u64;
        self.stats.cycle_count += 1;
        self.stats.total_cycle_time_us += cycle_time_us;
        if cycle_time_us > self.stats.max_cycle_time_us {
            self.stats.max_cycle_time_us = cycle_time_us;
        }

        if cycle_time_us > self.timing.cycle_time_us {
            self.stats.timing_violations += 1;
            if self.stats.timing_violations <= 10 || self.stats.timing_violations % 1000 == 0 {
                warn!(
                    "Timing violation #{}: cycle took {}us (target {}us)",
                    self.stats.timing_violations, cycle_time_us, self.timing.cycle_time_us
                );
            }
        }

        if self.stats.cycle_count % 1000 == 0 {
            debug!(
                "RT loop: {} cycles, avg={}us, max={}us, violations={}",
                self.stats.cycle_count,
                self.stats.avg_cycle_time_us(),
                self.stats.max_cycle_time_us,
                self.stats.timing_violations
            );
        }
    }

    /// Stop the loop, close the gate and every board.
    pub fn shutdown(&mut self) {
        info!("Shutdown requested");
        self.running.store(false, Ordering::SeqCst);
        for entry in &self.boards {
            if entry.discarded_cycles > 0 {
                if let Ok(board) = self.session.board(entry.handle) {
                    warn!(
                        board = board.name(),
                        discarded = entry.discarded_cycles,
                        "cycles with discarded read batches"
                    );
                }
            }
        }
        self.session.shutdown();
    }

    /// Get the running flag for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Timing statistics.
    pub fn stats(&self) -> TimingStats {
        self.stats
    }

    /// Last value read from watch register `address` on board `handle`.
    pub fn watch_value(&self, handle: BoardHandle, address: u16) -> Option<u32> {
        self.boards
            .get(handle.index())?
            .watches
            .iter()
            .find(|w| w.address == address)?
            .value
    }

    /// Cycles in which `handle`'s read batch was discarded.
    pub fn discarded_cycles(&self, handle: BoardHandle) -> u64 {
        self.boards
            .get(handle.index())
            .map_or(0, |entry| entry.discarded_cycles)
    }

    /// The session being driven.
    pub fn session(&self) -> &EthSession {
        &self.session
    }

    /// Mutable access to the session, e.g. to queue writes between cycles.
    pub fn session_mut(&mut self) -> &mut EthSession {
        &mut self.session
    }
}

/// Detect if running in real-time mode by checking scheduler policy.
fn detect_rt_mode() -> bool {
    #[cfg(target_os = "linux")]
    {
        use libc::{SCHED_FIFO, SCHED_RR, sched_getscheduler};
        // SAFETY: queries the calling thread's own policy.
        let policy = unsafe { sched_getscheduler(0) };
        policy == SCHED_FIFO || policy == SCHED_RR
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

/// Escalate saturated links, absorb anything else.
fn saturated(board: &str, err: LlioError) -> Result<(), EthError> {
    if matches!(err, LlioError::LinkDegraded { .. }) {
        return Err(EthError::Link {
            board: board.to_string(),
            source: err,
        });
    }
    warn!(board, "{err}");
    Ok(())
}
