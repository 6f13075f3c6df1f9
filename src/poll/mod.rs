//! Polling-based eventual-consistency assertions.
//!
//! - `policy`: timeout, interval and Eventually/Consistently contract
//! - `state`: lifecycle state machine of a single poll
//! - `outcome`: result snapshot and failure taxonomy
//! - `poller`: the poll loop itself

pub mod outcome;
pub mod policy;
pub mod poller;
pub mod state;

pub use outcome::{FailureKind, PollOutcome};
pub use policy::{PolicyError, PollMode, PollPolicy};
pub use poller::{Poller, consistently, eventually, poll_until, poll_until_cancellable};
pub use state::{PollEvent, PollState, PollStateMachine, TransitionResult};
