//! Result record of a finished poll.
//!
//! The poller never fails on its own. Timeouts, early failures and
//! cancellation all end up here, and the caller decides whether the outcome is
//! a test failure, a skip or a warning.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::policy::PollMode;
use super::state::PollState;
use crate::error::Error;

/// Why a poll, or its last tick, failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The probe itself returned an error
    ProbeError,
    /// The probe returned a value the matcher rejected
    MatchFailure,
    /// Eventually deadline reached without a match
    Timeout,
    /// Consistently tick failed before the deadline
    EarlyFailure,
    /// Poll was cancelled by the caller
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ProbeError => write!(f, "probe error"),
            FailureKind::MatchFailure => write!(f, "match failure"),
            FailureKind::Timeout => write!(f, "timed out"),
            FailureKind::EarlyFailure => write!(f, "failed before deadline"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Snapshot of a finished poll.
///
/// `last_value` is the most recent value a probe produced. `last_error` is the
/// error of the final tick when that tick's probe failed, and is cleared by any
/// later tick that produces a value.
#[derive(Debug, Clone)]
pub struct PollOutcome<T, E> {
    pub state: PollState,
    pub mode: PollMode,
    pub last_value: Option<T>,
    pub last_error: Option<E>,
    pub attempts: u32,
    pub elapsed: Duration,
    /// Description of the matcher that judged each tick
    pub expectation: String,
}

impl<T, E> PollOutcome<T, E> {
    pub fn succeeded(&self) -> bool {
        self.state == PollState::Succeeded
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == PollState::Cancelled
    }

    /// Terminal reason for a failed poll; `None` when it succeeded
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self.state {
            PollState::TimedOut => Some(FailureKind::Timeout),
            PollState::FailedFast => Some(FailureKind::EarlyFailure),
            PollState::Cancelled => Some(FailureKind::Cancelled),
            PollState::Succeeded | PollState::NotStarted | PollState::Polling => None,
        }
    }

    /// Cause of the last failing tick, if the poll failed after running one
    pub fn last_tick_failure(&self) -> Option<FailureKind> {
        if self.succeeded() || self.attempts == 0 {
            return None;
        }
        if self.last_error.is_some() {
            Some(FailureKind::ProbeError)
        } else if self.last_value.is_some() {
            Some(FailureKind::MatchFailure)
        } else {
            None
        }
    }
}

impl<T: fmt::Debug, E: fmt::Display> PollOutcome<T, E> {
    /// Human-readable report naming attempts, elapsed time and the last observation.
    pub fn failure_message(&self, description: &str) -> String {
        let verdict = match self.failure_kind() {
            Some(kind) => kind.to_string(),
            None => "succeeded".to_string(),
        };
        let mut message = format!(
            "{} expected {} to {}: {} after {} attempt(s) over {:.1?}",
            self.mode, description, self.expectation, verdict, self.attempts, self.elapsed
        );
        if let Some(value) = &self.last_value {
            message.push_str(&format!(", last value: {:?}", value));
        }
        if let Some(error) = &self.last_error {
            message.push_str(&format!(", last error: {}", error));
        }
        message
    }

    /// Convert into a `Result`, yielding the last value on success.
    pub fn into_result(self, description: &str) -> Result<T, Error> {
        let message = self.failure_message(description);
        if self.succeeded() {
            return self.last_value.ok_or(Error::Poll {
                kind: FailureKind::MatchFailure,
                message,
            });
        }
        Err(Error::Poll {
            kind: self.failure_kind().unwrap_or(FailureKind::Timeout),
            message,
        })
    }
}

impl<T: fmt::Debug, E: fmt::Display> fmt::Display for PollOutcome<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.failure_message("probe"))
    }
}
