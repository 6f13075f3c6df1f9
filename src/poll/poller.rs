//! The Eventually/Consistently poll loop.
//!
//! A probe is invoked on a fixed cadence and each result judged by a matcher.
//! Ticks for one poll run strictly in sequence: the loop awaits the probe,
//! applies the matcher, then sleeps for the interval or until the deadline,
//! whichever comes first. Independent polls share nothing and can run
//! concurrently, e.g. one per node via `join_all`.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::outcome::PollOutcome;
use super::policy::{PollMode, PollPolicy};
use super::state::{PollEvent, PollState, PollStateMachine, TransitionResult};
use crate::matcher::Matcher;

/// Runs probes against a policy, optionally under a cancellation token.
#[derive(Debug, Clone)]
pub struct Poller {
    policy: PollPolicy,
    cancel: Option<CancellationToken>,
}

impl Poller {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            cancel: None,
        }
    }

    /// Abort between ticks once `token` is cancelled.
    ///
    /// An in-flight probe is always allowed to finish.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Poll `probe` until `matcher` is satisfied under the configured mode.
    pub async fn run<T, E, F, Fut, M>(&self, mut probe: F, matcher: &M) -> PollOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        M: Matcher<T> + ?Sized,
        E: Display,
    {
        let mode = self.policy.mode();
        let mut run = PollRun::new(mode, matcher.describe());

        if self.is_cancelled() {
            run.advance(PollEvent::CancelRequested);
            return run.finish(Instant::now());
        }

        let start = Instant::now();
        run.advance(PollEvent::Started);

        loop {
            run.attempts += 1;
            let matched = match probe().await {
                Ok(value) => {
                    let matched = matcher.matches(&value);
                    run.last_value = Some(value);
                    run.last_error = None;
                    matched
                }
                Err(e) => {
                    trace!(attempt = run.attempts, error = %e, "Probe returned error");
                    run.last_error = Some(e);
                    false
                }
            };

            trace!(
                attempt = run.attempts,
                matched,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Poll tick complete"
            );

            let event = if matched {
                PollEvent::TickMatched
            } else {
                PollEvent::TickFailed
            };
            if run.advance(event).is_terminal() {
                return run.finish(start);
            }

            let timeout = self.policy.timeout();
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                run.advance(PollEvent::DeadlineReached);
                return run.finish(start);
            }

            if !self.sleep_until_next_tick(timeout - elapsed).await {
                run.advance(PollEvent::CancelRequested);
                return run.finish(start);
            }

            if start.elapsed() >= timeout {
                run.advance(PollEvent::DeadlineReached);
                return run.finish(start);
            }

            if self.is_cancelled() {
                run.advance(PollEvent::CancelRequested);
                return run.finish(start);
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Sleep one interval, cut short at the deadline `remaining` away.
    ///
    /// Returns false if cancelled while sleeping.
    async fn sleep_until_next_tick(&self, remaining: Duration) -> bool {
        let pause = self.policy.interval().min(remaining);
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => true,
                    _ = token.cancelled() => false,
                }
            }
            None => {
                tokio::time::sleep(pause).await;
                true
            }
        }
    }
}

/// Mutable bookkeeping for one poll, frozen into a `PollOutcome` at the end.
struct PollRun<T, E> {
    machine: PollStateMachine,
    state: PollState,
    mode: PollMode,
    expectation: String,
    last_value: Option<T>,
    last_error: Option<E>,
    attempts: u32,
}

impl<T, E> PollRun<T, E> {
    fn new(mode: PollMode, expectation: String) -> Self {
        Self {
            machine: PollStateMachine::new(),
            state: PollState::NotStarted,
            mode,
            expectation,
            last_value: None,
            last_error: None,
            attempts: 0,
        }
    }

    fn advance(&mut self, event: PollEvent) -> PollState {
        match self.machine.transition(&self.state, event, self.mode) {
            TransitionResult::Success { to, .. } => self.state = to,
            TransitionResult::InvalidTransition { current, event } => {
                warn!(state = %current, event = %event, "Ignoring invalid poll transition");
            }
        }
        self.state
    }

    fn finish(self, start: Instant) -> PollOutcome<T, E> {
        let elapsed = start.elapsed();
        debug!(
            mode = %self.mode,
            state = %self.state,
            attempts = self.attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            expectation = %self.expectation,
            "Poll finished"
        );
        PollOutcome {
            state: self.state,
            mode: self.mode,
            last_value: self.last_value,
            last_error: self.last_error,
            attempts: self.attempts,
            elapsed,
            expectation: self.expectation,
        }
    }
}

/// Poll `probe` under `policy` without cancellation.
pub async fn poll_until<T, E, F, Fut, M>(probe: F, matcher: &M, policy: &PollPolicy) -> PollOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    M: Matcher<T> + ?Sized,
    E: Display,
{
    Poller::new(*policy).run(probe, matcher).await
}

/// Poll `probe` under `policy`, aborting between ticks once `token` is cancelled.
pub async fn poll_until_cancellable<T, E, F, Fut, M>(
    probe: F,
    matcher: &M,
    policy: &PollPolicy,
    token: CancellationToken,
) -> PollOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    M: Matcher<T> + ?Sized,
    E: Display,
{
    Poller::new(*policy)
        .with_cancellation(token)
        .run(probe, matcher)
        .await
}

/// Wait until `probe` satisfies `matcher`, using `policy`'s timing.
pub async fn eventually<T, E, F, Fut, M>(probe: F, matcher: &M, policy: &PollPolicy) -> PollOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    M: Matcher<T> + ?Sized,
    E: Display,
{
    poll_until(probe, matcher, &policy.with_mode(PollMode::Eventually)).await
}

/// Require `probe` to satisfy `matcher` on every tick, using `policy`'s timing.
pub async fn consistently<T, E, F, Fut, M>(
    probe: F,
    matcher: &M,
    policy: &PollPolicy,
) -> PollOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    M: Matcher<T> + ?Sized,
    E: Display,
{
    poll_until(probe, matcher, &policy.with_mode(PollMode::Consistently)).await
}
