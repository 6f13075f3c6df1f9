// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for kube-conformance.
//!
//! Uses proptest to generate policies and probe scripts and verify the
//! poller's tick-count and state-machine invariants. Polls run on a paused
//! tokio clock so each case finishes instantly.

use std::future::ready;
use std::time::Duration;

use proptest::prelude::*;

use kube_conformance::matcher::be_true;
use kube_conformance::poll::{PollEvent, PollMode, PollOutcome, PollPolicy, PollState, PollStateMachine, poll_until};

/// Strategy for generating poll modes.
fn any_mode() -> impl Strategy<Value = PollMode> {
    prop_oneof![Just(PollMode::Eventually), Just(PollMode::Consistently)]
}

/// Strategy for generating poll states.
fn any_state() -> impl Strategy<Value = PollState> {
    prop_oneof![
        Just(PollState::NotStarted),
        Just(PollState::Polling),
        Just(PollState::Succeeded),
        Just(PollState::TimedOut),
        Just(PollState::FailedFast),
        Just(PollState::Cancelled),
    ]
}

/// Strategy for generating poll events.
fn any_event() -> impl Strategy<Value = PollEvent> {
    prop_oneof![
        Just(PollEvent::Started),
        Just(PollEvent::TickMatched),
        Just(PollEvent::TickFailed),
        Just(PollEvent::DeadlineReached),
        Just(PollEvent::CancelRequested),
    ]
}

/// Strategy for (timeout, interval) in milliseconds, kept small enough that a
/// poll never exceeds a few hundred ticks.
fn timing() -> impl Strategy<Value = (u64, u64)> {
    (1u64..=200).prop_flat_map(|interval| (interval..=interval * 50, Just(interval)))
}

/// Run a poll over a fixed sequence of boolean observations on a paused clock.
/// The last observation repeats once the script is exhausted.
fn run_script(policy: PollPolicy, script: Vec<bool>) -> PollOutcome<bool, String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();
    runtime.block_on(async move {
        let mut index = 0usize;
        poll_until(
            || {
                let value = script[index.min(script.len() - 1)];
                index += 1;
                ready(Ok::<_, String>(value))
            },
            &be_true(),
            &policy,
        )
        .await
    })
}

/// Run a poll whose probe takes `duration` and never reaches a terminal
/// verdict on its own: Eventually never matches and Consistently always does.
/// Returns the outcome and the offset at which each tick started.
fn run_slow_probe(
    policy: PollPolicy,
    duration: Duration,
    mode: PollMode,
) -> (PollOutcome<bool, String>, Vec<Duration>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();
    runtime.block_on(async move {
        let start = tokio::time::Instant::now();
        let starts = std::cell::RefCell::new(Vec::new());
        let value = mode == PollMode::Consistently;
        let outcome = poll_until(
            || {
                starts.borrow_mut().push(start.elapsed());
                async move {
                    tokio::time::sleep(duration).await;
                    Ok::<_, String>(value)
                }
            },
            &be_true(),
            &policy,
        )
        .await;
        (outcome, starts.into_inner())
    })
}

fn policy(mode: PollMode, timeout_ms: u64, interval_ms: u64) -> PollPolicy {
    PollPolicy::new(
        mode,
        Duration::from_millis(timeout_ms),
        Duration::from_millis(interval_ms),
    )
    .unwrap()
}

proptest! {
    /// Property: a timeout shorter than the interval yields exactly one tick.
    #[test]
    fn timeout_below_interval_is_one_tick(
        mode in any_mode(),
        interval in 2u64..=10_000,
        value in any::<bool>(),
    ) {
        let timeout = interval / 2;
        prop_assume!(timeout > 0);
        let outcome = run_script(policy(mode, timeout, interval), vec![value]);
        prop_assert_eq!(outcome.attempts, 1);
    }

    /// Property: Eventually succeeds on the first matching tick k with attempts == k.
    #[test]
    fn eventually_attempts_equal_first_match(
        (timeout, interval) in timing(),
        k in 1u64..=50,
    ) {
        let policy = policy(PollMode::Eventually, timeout, interval);
        prop_assume!(k <= policy.max_ticks());
        let mut script = vec![false; (k - 1) as usize];
        script.push(true);

        let outcome = run_script(policy, script);
        prop_assert!(outcome.succeeded());
        prop_assert_eq!(u64::from(outcome.attempts), k);
        prop_assert_eq!(outcome.elapsed, Duration::from_millis(interval * (k - 1)));
    }

    /// Property: Eventually that never matches runs every tick the policy allows.
    #[test]
    fn eventually_timeout_exhausts_ticks((timeout, interval) in timing()) {
        let policy = policy(PollMode::Eventually, timeout, interval);
        let outcome = run_script(policy, vec![false]);
        prop_assert_eq!(outcome.state, PollState::TimedOut);
        prop_assert_eq!(u64::from(outcome.attempts), policy.max_ticks());
        prop_assert_eq!(outcome.elapsed, policy.timeout());
    }

    /// Property: a poll never outlives max(timeout, end of its last tick).
    #[test]
    fn poll_ends_at_deadline_or_last_tick(
        mode in any_mode(),
        (timeout, interval) in timing(),
        probe_factor in 0u64..=300,
    ) {
        let probe_ms = interval * probe_factor / 100;
        let policy = policy(mode, timeout, interval);
        let (outcome, starts) = run_slow_probe(policy, Duration::from_millis(probe_ms), mode);

        let last_end = *starts.last().unwrap() + Duration::from_millis(probe_ms);
        prop_assert_eq!(u64::from(outcome.attempts), starts.len() as u64);
        prop_assert!(outcome.elapsed <= policy.timeout().max(last_end));
        prop_assert_eq!(outcome.elapsed, policy.timeout().max(last_end));
    }

    /// Property: Consistently fails at the first failing tick with attempts == its index.
    #[test]
    fn consistently_fails_at_first_bad_tick(
        (timeout, interval) in timing(),
        k in 1u64..=50,
    ) {
        let policy = policy(PollMode::Consistently, timeout, interval);
        prop_assume!(k <= policy.max_ticks());
        let mut script = vec![true; (k - 1) as usize];
        script.push(false);

        let outcome = run_script(policy, script);
        prop_assert_eq!(outcome.state, PollState::FailedFast);
        prop_assert_eq!(u64::from(outcome.attempts), k);
        prop_assert_eq!(outcome.last_value, Some(false));
    }

    /// Property: Consistently passing every tick runs floor(timeout/interval) ticks, give or take the boundary tick.
    #[test]
    fn consistently_full_duration_tick_count((timeout, interval) in timing()) {
        let policy = policy(PollMode::Consistently, timeout, interval);
        let outcome = run_script(policy, vec![true]);
        prop_assert!(outcome.succeeded());

        let floor = timeout / interval;
        let attempts = u64::from(outcome.attempts);
        prop_assert!(attempts == floor || attempts == floor + 1);
        prop_assert_eq!(attempts, policy.max_ticks());
        prop_assert_eq!(outcome.elapsed, policy.timeout());
    }

    /// Property: terminal states accept no events.
    #[test]
    fn terminal_states_are_final(
        state in any_state(),
        event in any_event(),
        mode in any_mode(),
    ) {
        let sm = PollStateMachine::new();
        if state.is_terminal() {
            prop_assert!(!sm.can_transition(&state, &event, mode));
        }
    }

    /// Property: transitions are deterministic.
    #[test]
    fn transitions_are_deterministic(
        state in any_state(),
        event in any_event(),
        mode in any_mode(),
    ) {
        let sm = PollStateMachine::new();
        prop_assert_eq!(
            sm.target_state(&state, &event, mode),
            sm.target_state(&state, &event, mode)
        );
    }

    /// Property: FailedFast is only reachable in Consistently mode.
    #[test]
    fn failed_fast_requires_consistently(state in any_state(), event in any_event()) {
        let sm = PollStateMachine::new();
        prop_assert_ne!(
            sm.target_state(&state, &event, PollMode::Eventually),
            Some(PollState::FailedFast)
        );
    }

    /// Property: every valid transition out of Polling leaves NotStarted behind.
    #[test]
    fn never_returns_to_not_started(state in any_state(), event in any_event(), mode in any_mode()) {
        let sm = PollStateMachine::new();
        if state != PollState::NotStarted {
            prop_assert_ne!(sm.target_state(&state, &event, mode), Some(PollState::NotStarted));
        }
    }
}
