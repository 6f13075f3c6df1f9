//! Polling policy: how long to poll, how often, and under which contract.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Contract a poll must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollMode {
    /// Succeed on the first matching sample within the deadline.
    Eventually,
    /// Every sample until the deadline must match.
    Consistently,
}

impl fmt::Display for PollMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollMode::Eventually => write!(f, "Eventually"),
            PollMode::Consistently => write!(f, "Consistently"),
        }
    }
}

/// Rejected policy parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("timeout must be greater than zero")]
    ZeroTimeout,

    #[error("interval must be greater than zero")]
    ZeroInterval,
}

/// Timing and contract for a single poll.
///
/// An interval longer than the timeout is accepted: such a policy evaluates
/// the probe exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    timeout: Duration,
    interval: Duration,
    mode: PollMode,
}

impl PollPolicy {
    /// Create a policy, rejecting zero durations.
    pub fn new(mode: PollMode, timeout: Duration, interval: Duration) -> Result<Self, PolicyError> {
        if timeout.is_zero() {
            return Err(PolicyError::ZeroTimeout);
        }
        if interval.is_zero() {
            return Err(PolicyError::ZeroInterval);
        }
        Ok(Self {
            timeout,
            interval,
            mode,
        })
    }

    /// Create an Eventually policy.
    pub fn eventually(timeout: Duration, interval: Duration) -> Result<Self, PolicyError> {
        Self::new(PollMode::Eventually, timeout, interval)
    }

    /// Create a Consistently policy.
    pub fn consistently(timeout: Duration, interval: Duration) -> Result<Self, PolicyError> {
        Self::new(PollMode::Consistently, timeout, interval)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn mode(&self) -> PollMode {
        self.mode
    }

    /// Same timing under the other contract.
    pub fn with_mode(mut self, mode: PollMode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether the probe is evaluated only once under this policy.
    pub fn is_single_shot(&self) -> bool {
        self.interval >= self.timeout
    }

    /// Maximum number of ticks this policy can run when probes take no time.
    ///
    /// Ticks start at `0, interval, 2*interval, ...` and a tick is only started
    /// while the elapsed time is below the timeout.
    pub fn max_ticks(&self) -> u64 {
        let timeout = self.timeout.as_nanos();
        let interval = self.interval.as_nanos();
        let ticks = timeout.div_ceil(interval);
        u64::try_from(ticks).unwrap_or(u64::MAX).max(1)
    }
}

impl fmt::Display for PollPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (timeout {:?}, interval {:?})",
            self.mode, self.timeout, self.interval
        )
    }
}
