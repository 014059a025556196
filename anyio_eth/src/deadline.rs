//! Bounded busy-polling.
//!
//! Every receive path (immediate reads, identification, batch collection)
//! waits through [`poll_until`]: try, sleep one poll interval, try again,
//! give up once the deadline has passed.

use std::time::{Duration, Instant};

/// Result of a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Polled<T> {
    /// Produced value, `None` if the deadline passed first.
    pub value: Option<T>,
    /// Number of attempts made.
    pub tries: u32,
    /// Time spent polling.
    pub elapsed: Duration,
}

impl<T> Polled<T> {
    /// True if the deadline passed without a value.
    pub fn timed_out(&self) -> bool {
        self.value.is_none()
    }
}

/// Call `attempt` until it yields a value, fails, or `deadline` passes.
///
/// `attempt` is called at least once even if the deadline is already in the
/// past. Errors from `attempt` stop the loop immediately.
pub fn poll_until<T, E, F>(deadline: Instant, interval: Duration, mut attempt: F) -> Result<Polled<T>, E>
where
    F: FnMut() -> Result<Option<T>, E>,
{
    let start = Instant::now();
    let mut tries = 0u32;
    loop {
        tries = tries.saturating_add(1);
        if let Some(value) = attempt()? {
            return Ok(Polled {
                value: Some(value),
                tries,
                elapsed: start.elapsed(),
            });
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(Polled {
                value: None,
                tries,
                elapsed: now.duration_since(start),
            });
        }
        if !interval.is_zero() {
            std::thread::sleep(interval.min(deadline - now));
        }
    }
}
