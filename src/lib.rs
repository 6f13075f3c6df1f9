//! kube-conformance library crate
//!
//! Polling-based eventual-consistency assertions for end-to-end cluster
//! tests, plus the typed lookups, fixtures and domain checks built on them.
//!
//! ```no_run
//! # async fn example(pod: &kube_conformance::checks::FrrPod) -> kube_conformance::Result<()> {
//! use std::time::Duration;
//! use kube_conformance::matcher::be_true;
//! use kube_conformance::poll::{PollPolicy, poll_until};
//!
//! let policy = PollPolicy::eventually(Duration::from_secs(240), Duration::from_secs(5))?;
//! poll_until(move || pod.neighbor_established("10.46.81.1"), &be_true(), &policy)
//!     .await
//!     .into_result("BGP session to 10.46.81.1")?;
//! # Ok(())
//! # }
//! ```

pub mod checks;
pub mod cluster;
pub mod config;
pub mod error;
pub mod matcher;
pub mod poll;

pub use config::{SuiteConfig, TimingSpec};
pub use error::{Error, Result};
pub use matcher::{BoxMatcher, Matcher};
pub use poll::{
    FailureKind, PollMode, PollOutcome, PollPolicy, PollState, Poller, consistently, eventually,
    poll_until, poll_until_cancellable,
};
