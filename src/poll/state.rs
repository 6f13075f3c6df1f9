//! Finite state machine for a single poll.
//!
//! A poll starts in `NotStarted`, moves to `Polling` on its first tick and ends
//! in exactly one terminal state. Which terminal state a tick result leads to
//! depends on the poll mode, so transitions are keyed on `(state, event, mode)`.

use std::fmt;

use super::policy::PollMode;

/// Lifecycle state of a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PollState {
    #[default]
    NotStarted,
    Polling,
    Succeeded,
    TimedOut,
    /// A Consistently tick failed before the deadline
    FailedFast,
    Cancelled,
}

impl PollState {
    /// Terminal states accept no further events
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollState::Succeeded | PollState::TimedOut | PollState::FailedFast | PollState::Cancelled
        )
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollState::NotStarted => write!(f, "NotStarted"),
            PollState::Polling => write!(f, "Polling"),
            PollState::Succeeded => write!(f, "Succeeded"),
            PollState::TimedOut => write!(f, "TimedOut"),
            PollState::FailedFast => write!(f, "FailedFast"),
            PollState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Events observed by the poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollEvent {
    /// First tick is about to run
    Started,
    /// Probe produced a value the matcher accepted
    TickMatched,
    /// Probe errored or the matcher rejected its value
    TickFailed,
    /// Elapsed time reached the timeout before the next tick
    DeadlineReached,
    /// Caller cancelled the poll
    CancelRequested,
}

impl fmt::Display for PollEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollEvent::Started => write!(f, "Started"),
            PollEvent::TickMatched => write!(f, "TickMatched"),
            PollEvent::TickFailed => write!(f, "TickFailed"),
            PollEvent::DeadlineReached => write!(f, "DeadlineReached"),
            PollEvent::CancelRequested => write!(f, "CancelRequested"),
        }
    }
}

/// Result of attempting a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    Success {
        from: PollState,
        to: PollState,
        event: PollEvent,
    },
    InvalidTransition {
        current: PollState,
        event: PollEvent,
    },
}

/// A transition definition
#[derive(Debug)]
struct Transition {
    from: PollState,
    to: PollState,
    event: PollEvent,
    /// `None` applies to both modes
    mode: Option<PollMode>,
}

impl Transition {
    const fn new(from: PollState, to: PollState, event: PollEvent, mode: Option<PollMode>) -> Self {
        Self {
            from,
            to,
            event,
            mode,
        }
    }
}

/// Transition table for the poll lifecycle
pub struct PollStateMachine {
    transitions: Vec<Transition>,
}

impl Default for PollStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PollStateMachine {
    pub fn new() -> Self {
        use PollEvent as E;
        use PollMode::{Consistently, Eventually};
        use PollState as S;

        Self {
            transitions: vec![
                // === NotStarted ===
                Transition::new(S::NotStarted, S::Polling, E::Started, None),
                Transition::new(S::NotStarted, S::Cancelled, E::CancelRequested, None),
                // === Polling, Eventually ===
                Transition::new(S::Polling, S::Succeeded, E::TickMatched, Some(Eventually)),
                Transition::new(S::Polling, S::Polling, E::TickFailed, Some(Eventually)),
                Transition::new(S::Polling, S::TimedOut, E::DeadlineReached, Some(Eventually)),
                // === Polling, Consistently ===
                Transition::new(S::Polling, S::Polling, E::TickMatched, Some(Consistently)),
                Transition::new(S::Polling, S::FailedFast, E::TickFailed, Some(Consistently)),
                Transition::new(S::Polling, S::Succeeded, E::DeadlineReached, Some(Consistently)),
                // === Polling, either mode ===
                Transition::new(S::Polling, S::Cancelled, E::CancelRequested, None),
            ],
        }
    }

    /// Check whether an event is valid in the given state and mode
    pub fn can_transition(&self, from: &PollState, event: &PollEvent, mode: PollMode) -> bool {
        self.find(from, event, mode).is_some()
    }

    /// Get the target state for an event, if valid
    pub fn target_state(&self, from: &PollState, event: &PollEvent, mode: PollMode) -> Option<PollState> {
        self.find(from, event, mode).map(|t| t.to)
    }

    /// Attempt a transition
    pub fn transition(&self, from: &PollState, event: PollEvent, mode: PollMode) -> TransitionResult {
        match self.find(from, &event, mode) {
            Some(t) => TransitionResult::Success {
                from: *from,
                to: t.to,
                event,
            },
            None => TransitionResult::InvalidTransition {
                current: *from,
                event,
            },
        }
    }

    /// Events accepted in a state for the given mode
    pub fn valid_events(&self, from: &PollState, mode: PollMode) -> Vec<PollEvent> {
        self.transitions
            .iter()
            .filter(|t| t.from == *from && t.mode.is_none_or(|m| m == mode))
            .map(|t| t.event)
            .collect()
    }

    fn find(&self, from: &PollState, event: &PollEvent, mode: PollMode) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|t| t.from == *from && t.event == *event && t.mode.is_none_or(|m| m == mode))
    }
}
