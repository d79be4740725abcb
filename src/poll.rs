//! Waiting for a submitted work item to reach a terminal state.

#[cfg(test)]
use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::workitem::JobStatus;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

// Longest uninterrupted nap, so cancellation is noticed quickly.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// How often and for how long to check on a work item.
///
/// With neither `max_attempts` nor `deadline` set the wait is unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before every status check, including the first.
    pub interval: Duration,
    /// Give up after this many status checks.
    pub max_attempts: Option<u32>,
    /// Give up once this much time has passed since polling started.
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
            deadline: None,
        }
    }
}

/// Time source for the polling loop.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Blocks for `duration` or until `cancel` fires, whichever comes first.
    fn sleep(&self, duration: Duration, cancel: &CancellationToken);
}

/// Wall-clock time and real sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration, cancel: &CancellationToken) {
        // An unrepresentable end means sleeping until cancelled.
        let end = Instant::now().checked_add(duration);
        while !cancel.is_cancelled() {
            let nap = match end {
                Some(end) => {
                    let now = Instant::now();
                    if now >= end {
                        break;
                    }
                    (end - now).min(SLEEP_SLICE)
                }
                None => SLEEP_SLICE,
            };
            thread::sleep(nap);
        }
    }
}

/// Clock that only moves when slept on. Lets the loop be driven without waiting.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct ManualClock {
    now: Cell<Instant>,
    sleeps: Cell<u32>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            now: Cell::new(Instant::now()),
            sleeps: Cell::new(0),
        }
    }

    /// Number of times [`Clock::sleep`] was called.
    pub(crate) fn sleeps(&self) -> u32 {
        self.sleeps.get()
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn sleep(&self, duration: Duration, _cancel: &CancellationToken) {
        self.now.set(self.now.get() + duration);
        self.sleeps.set(self.sleeps.get() + 1);
    }
}

/// Calls `check` every `policy.interval` until it returns a terminal status.
///
/// Errors from `check` end the wait immediately. Exceeding `max_attempts` or
/// `deadline` yields [`Error::PollLimit`] / [`Error::Deadline`]; a fired
/// `cancel` yields [`Error::Cancelled`].
pub fn wait_for_completion<F>(
    policy: &PollPolicy,
    clock: &dyn Clock,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<JobStatus>
where
    F: FnMut() -> Result<JobStatus>,
{
    let started = clock.now();
    let mut attempts = 0u32;
    let mut last: Option<JobStatus> = None;

    loop {
        if let Some(max) = policy.max_attempts {
            if attempts >= max {
                return Err(Error::PollLimit { attempts });
            }
        }

        debug!(interval = ?policy.interval, "waiting before status check");
        clock.sleep(policy.interval, cancel);
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if let Some(deadline) = policy.deadline {
            let elapsed = clock.now().saturating_duration_since(started);
            if elapsed > deadline {
                return Err(Error::Deadline { elapsed });
            }
        }

        attempts += 1;
        let status = check()?;
        if last.as_ref() != Some(&status) {
            info!(%status, attempts, "work item status");
            last = Some(status.clone());
        }

        if status.is_terminal() {
            return Ok(status);
        }
    }
}
