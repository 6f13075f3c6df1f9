//! Multi-poll scenarios modelled on how conformance checks use the poller.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use kube_conformance::cluster::pick_exactly_one;
use kube_conformance::config::{BGP_DOWN, BGP_STAYS_DOWN, SuiteConfig};
use kube_conformance::matcher::{anything, be_false, be_true, contain_elements, predicate};
use kube_conformance::poll::{FailureKind, PollPolicy, PollState, consistently, eventually, poll_until};
use kube_conformance::{Error, Result};
use tokio::time::Instant;

use crate::probes::{always, repeat_then, scripted, secs};

#[tokio::test(start_paused = true)]
async fn test_repeated_polls_are_independent() {
    let policy = PollPolicy::eventually(secs(30), secs(5)).unwrap();

    for _ in 0..2 {
        let outcome = poll_until(always(true), &be_true(), &policy).await;
        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts, 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_polls_per_node() {
    let policy = PollPolicy::eventually(secs(60), secs(5)).unwrap();
    let ready_after = [("worker-0", 0usize), ("worker-1", 2), ("worker-2", 5)];

    let started = Instant::now();
    let outcomes = join_all(ready_after.iter().map(|(node, n)| {
        let (probe, _) = scripted(repeat_then(false, *n, true));
        async move { (*node, poll_until(probe, &be_true(), &policy).await) }
    }))
    .await;

    for (node, outcome) in &outcomes {
        assert!(outcome.succeeded(), "{} never became ready", node);
    }
    let attempts: BTreeMap<_, _> = outcomes.iter().map(|(n, o)| (*n, o.attempts)).collect();
    assert_eq!(attempts["worker-0"], 1);
    assert_eq!(attempts["worker-1"], 3);
    assert_eq!(attempts["worker-2"], 6);

    // The slowest node sets the wall-clock time, not the sum of all polls
    assert_eq!(started.elapsed(), secs(25));
}

#[tokio::test(start_paused = true)]
async fn test_session_goes_down_and_stays_down() {
    let config = SuiteConfig::default();
    let drop_policy = config.policy(BGP_DOWN).unwrap();
    let hold_policy = config.policy(BGP_STAYS_DOWN).unwrap();

    // Established for two ticks, then down for good
    let (probe, _) = scripted(repeat_then(true, 2, false));
    let state = Arc::new(Mutex::new(probe));

    let shared = Arc::clone(&state);
    let dropped = eventually(
        move || {
            let mut probe = shared.lock().unwrap();
            (*probe)()
        },
        &be_false(),
        &drop_policy,
    )
    .await;
    assert!(dropped.succeeded());
    assert_eq!(dropped.attempts, 3);

    let shared = Arc::clone(&state);
    let held = consistently(
        move || {
            let mut probe = shared.lock().unwrap();
            (*probe)()
        },
        &be_false(),
        &hold_policy,
    )
    .await;
    assert!(held.succeeded());
    assert_eq!(held.attempts, 12);
}

#[tokio::test(start_paused = true)]
async fn test_session_flapping_back_up_is_caught() {
    let config = SuiteConfig::default();
    let hold_policy = config.policy(BGP_STAYS_DOWN).unwrap();
    let (probe, _) = scripted(repeat_then(false, 4, true));

    let err = consistently(probe, &be_false(), &hold_policy)
        .await
        .into_result("BGP session to 10.46.81.1 on frr-k8s-abc")
        .unwrap_err();

    match err {
        Error::Poll { kind, message } => {
            assert_eq!(kind, FailureKind::EarlyFailure);
            assert!(message.starts_with("Consistently expected BGP session to 10.46.81.1"));
            assert!(message.contains("5 attempt(s)"));
            assert!(message.contains("last value: true"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_lookup_probe_waits_for_single_match() {
    let policy = PollPolicy::eventually(secs(30), secs(2)).unwrap();
    let listings = [vec![], vec!["frr-k8s-a", "frr-k8s-b"], vec!["frr-k8s-b"]];
    let mut tick = 0usize;

    let outcome = poll_until(
        || {
            let items = listings[tick.min(listings.len() - 1)].clone();
            tick += 1;
            async move { pick_exactly_one(items, "pod with label 'app=frr-k8s'") }
        },
        &anything(),
        &policy,
    )
    .await;

    assert!(outcome.succeeded());
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.into_result("frr pod").unwrap(), "frr-k8s-b");
}

#[tokio::test(start_paused = true)]
async fn test_lookup_timeout_keeps_multiple_found_error() {
    let policy = PollPolicy::eventually(secs(4), secs(2)).unwrap();

    let outcome = poll_until(
        || async { pick_exactly_one(vec!["a", "b"], "pod") },
        &anything(),
        &policy,
    )
    .await;

    assert_eq!(outcome.state, PollState::TimedOut);
    assert!(matches!(
        outcome.last_error,
        Some(Error::MultipleFound { count: 2, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_metrics_scrape_until_expected_names_present() {
    let policy = PollPolicy::eventually(secs(300), secs(5)).unwrap();
    let scrapes = vec![
        Ok(vec![]),
        Ok(vec!["frrk8s_bgp_session_up".to_string()]),
        Ok(vec![
            "frrk8s_bgp_session_up".to_string(),
            "frrk8s_bgp_updates_total".to_string(),
        ]),
    ];
    let (probe, _) = scripted(scrapes);

    let names = poll_until(
        probe,
        &contain_elements([
            "frrk8s_bgp_session_up".to_string(),
            "frrk8s_bgp_updates_total".to_string(),
        ]),
        &policy,
    )
    .await
    .into_result("frr-k8s metrics")
    .unwrap();

    assert_eq!(names.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_predicate_on_structured_value() {
    #[derive(Debug, Clone)]
    struct DaemonSetCounts {
        desired: i32,
        available: i32,
    }

    let policy = PollPolicy::eventually(secs(60), secs(5)).unwrap();
    let (probe, _) = scripted(vec![
        Ok(DaemonSetCounts {
            desired: 3,
            available: 1,
        }),
        Ok(DaemonSetCounts {
            desired: 3,
            available: 3,
        }),
    ]);

    let outcome = poll_until(
        probe,
        &predicate("have every pod available", |c: &DaemonSetCounts| {
            c.available == c.desired
        }),
        &policy,
    )
    .await;

    assert!(outcome.succeeded());
    assert_eq!(outcome.expectation, "have every pod available");
}

async fn checked_flag(flag: bool) -> Result<bool> {
    Ok(flag)
}

#[tokio::test(start_paused = true)]
async fn test_crate_result_probe() {
    let policy = PollPolicy::eventually(secs(10), secs(2)).unwrap();
    let outcome = poll_until(|| checked_flag(true), &be_true(), &policy).await;
    assert!(outcome.into_result("flag").unwrap());
}
