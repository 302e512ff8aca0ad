//! Bounded wait for a pending enrollment request.
//!
//! A secondary's CSR reaches the CA some time after its installer returns, so the
//! primary retries a few times before concluding that no request is coming.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::CertificateAuthority;
use crate::config::PollConfig;
use crate::error::{Error, Result};

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Attempt bound and interval for [`await_pending_certificate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            interval: Duration::from_secs(5),
        }
    }
}

impl From<&PollConfig> for PollPolicy {
    fn from(config: &PollConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            interval: Duration::from_secs(config.interval_secs),
        }
    }
}

/// Waits between poll attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<()>;
}

/// Sleeps on the current thread, waking early when cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<()> {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let slice = remaining.min(SLEEP_SLICE);
            std::thread::sleep(slice);
            remaining -= slice;
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

/// Return the first pending subject, polling up to `policy.max_attempts` times.
///
/// Sleeps only between empty attempts: never after a hit and never after the
/// last attempt.
pub fn await_pending_certificate(
    ca: &dyn CertificateAuthority,
    policy: &PollPolicy,
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
) -> Result<String> {
    poll(ca, policy, sleeper, cancel, |_| true)
}

/// Like [`await_pending_certificate`], but only a request from `subject` ends the wait.
///
/// Requests left behind by other nodes stay pending and are ignored.
pub fn await_subject_certificate(
    ca: &dyn CertificateAuthority,
    subject: &str,
    policy: &PollPolicy,
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
) -> Result<String> {
    poll(ca, policy, sleeper, cancel, |pending| pending == subject)
}

fn poll(
    ca: &dyn CertificateAuthority,
    policy: &PollPolicy,
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
    wanted: impl Fn(&str) -> bool,
) -> Result<String> {
    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let pending = ca.pending()?;
        if let Some(subject) = pending.iter().find(|s| wanted(s.as_str())) {
            info!(subject, attempt, "pending certificate found");
            return Ok(subject.clone());
        }

        debug!(
            attempt,
            max = policy.max_attempts,
            others = pending.len(),
            "no matching pending certificate yet"
        );
        if attempt < policy.max_attempts {
            sleeper.sleep(policy.interval, cancel)?;
        }
    }

    Err(Error::NoEnrollmentRequest {
        attempts: policy.max_attempts,
    })
}
