//! Busy-wait policy shared by bus-lock acquisition and device completion polling
//!
//! Every blocking wait in the crate goes through [`PollPolicy`]. The default
//! is a generous bound so that a dead bus or a stuck status flag surfaces as
//! [`SensorError::BusContentionTimeout`] instead of hanging the caller;
//! [`PollPolicy::unbounded`] restores the plain infinite spin.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::{Result, SensorError};

/// Time limit used by [`PollPolicy::default`]; the default has no attempt limit
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Limits applied to a busy-wait loop
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Maximum number of attempts, `None` for no limit
    pub max_attempts: Option<u32>,
    /// Maximum wall-clock time, `None` for no limit
    pub timeout: Option<Duration>,
    /// Pause between attempts; zero spins with a scheduler yield
    pub interval: Duration,
    /// Cancellation point: the wait aborts once this flag reads `true`
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            timeout: Some(DEFAULT_TIMEOUT),
            interval: Duration::ZERO,
            cancel: None,
        }
    }
}

impl PollPolicy {
    /// Spin forever until the condition holds
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            timeout: None,
            interval: Duration::ZERO,
            cancel: None,
        }
    }

    /// Give up after `max_attempts` attempts, with no time limit
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            timeout: None,
            interval: Duration::ZERO,
            cancel: None,
        }
    }

    /// Set the wall-clock limit
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the pause between attempts
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Attach a cancellation flag
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// True if the wait can end without the condition ever holding
    pub fn is_bounded(&self) -> bool {
        self.max_attempts.is_some() || self.timeout.is_some() || self.cancel.is_some()
    }
}

/// Attempt bookkeeping for one wait
pub(crate) struct PollBudget<'a> {
    policy: &'a PollPolicy,
    waiting_for: &'static str,
    attempts: u32,
    started: Instant,
}

impl<'a> PollBudget<'a> {
    pub(crate) fn start(policy: &'a PollPolicy, waiting_for: &'static str) -> Self {
        Self {
            policy,
            waiting_for,
            attempts: 0,
            started: Instant::now(),
        }
    }

    /// Failed attempts recorded so far
    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a failed attempt, then either wait for the next one or give up
    pub(crate) fn retry(&mut self) -> Result<()> {
        self.attempts = self.attempts.saturating_add(1);

        if let Some(cancel) = &self.policy.cancel {
            if cancel.load(Ordering::SeqCst) {
                return Err(SensorError::Cancelled {
                    waiting_for: self.waiting_for,
                });
            }
        }

        let out_of_attempts = self
            .policy
            .max_attempts
            .is_some_and(|max| self.attempts >= max);
        let out_of_time = self
            .policy
            .timeout
            .is_some_and(|timeout| self.started.elapsed() >= timeout);

        if out_of_attempts || out_of_time {
            return Err(SensorError::BusContentionTimeout {
                waiting_for: self.waiting_for,
                attempts: self.attempts,
            });
        }

        if self.policy.interval.is_zero() {
            std::hint::spin_loop();
            thread::yield_now();
        } else {
            thread::sleep(self.policy.interval);
        }

        Ok(())
    }
}

/// Call `ready` until it returns `true`
///
/// Returns the number of times `ready` was called. Errors from `ready`
/// propagate immediately without another attempt.
pub(crate) fn poll_until<F>(policy: &PollPolicy, waiting_for: &'static str, mut ready: F) -> Result<u32>
where
    F: FnMut() -> Result<bool>,
{
    let mut budget = PollBudget::start(policy, waiting_for);

    loop {
        if ready()? {
            let polls = budget.attempts() + 1;
            trace!(waiting_for, polls, "poll condition met");
            return Ok(polls);
        }
        budget.retry()?;
    }
}
