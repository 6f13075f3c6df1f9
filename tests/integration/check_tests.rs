//! Composed checks against real workloads.

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use kube::api::PostParams;
use kube_conformance::SuiteConfig;
use kube_conformance::checks::{Workload, verify_message_in_logs, wait_for_pods_with_selector};
use kube_conformance::cluster::{
    first_container, verify_daemonset_available_and_ready, wait_for_pod_ready,
};
use kube_conformance::matcher::at_least;
use tokio::time::Instant;

use crate::namespace::TestNamespace;
use crate::{LONG_TIMEOUT, eventually_within, init_test, sleeper_daemonset, sleeper_deployment};

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Kubernetes cluster that can pull busybox"]
async fn test_daemonset_available_then_ready() {
    let (_cluster, client) = init_test().await;
    let test_ns = TestNamespace::create(client.clone(), "ds-ready").await;
    let daemonsets = test_ns.api::<DaemonSet>();
    daemonsets
        .create(&PostParams::default(), &sleeper_daemonset("sleeper"))
        .await
        .expect("Failed to create sleeper daemonset");

    let available = verify_daemonset_available_and_ready(
        &daemonsets,
        "sleeper",
        &at_least(1),
        &SuiteConfig::default(),
    )
    .await
    .unwrap();
    assert!(available >= 1);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Kubernetes cluster that can pull busybox"]
async fn test_workload_lookup_and_log_message() {
    let (_cluster, client) = init_test().await;
    let test_ns = TestNamespace::create(client.clone(), "sriov-logs").await;
    let config = SuiteConfig::default();
    let since = Instant::now();

    test_ns
        .api::<Deployment>()
        .create(&PostParams::default(), &sleeper_deployment("workload"))
        .await
        .expect("Failed to create workload deployment");

    let workload = Workload {
        namespace: test_ns.name(),
        selector: "app=workload",
    };
    let pods = wait_for_pods_with_selector(client.clone(), &workload, &config)
        .await
        .unwrap();
    assert_eq!(pods.len(), 1);

    let pods_api = test_ns.api::<Pod>();
    let pod = wait_for_pod_ready(&pods_api, &pods[0].name_any(), &eventually_within(LONG_TIMEOUT))
        .await
        .expect("Workload pod never became Ready");
    let logs = verify_message_in_logs(
        &pods_api,
        &pod.name_any(),
        first_container(&pod),
        "conformance-ready",
        since,
        &config,
    )
    .await
    .unwrap();
    assert!(logs.contains("conformance-ready"));
}
