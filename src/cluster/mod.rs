//! Typed access to the cluster under test.
//!
//! - `find`: single-object lookups with explicit not-found/multiple errors
//! - `fixture`: the per-suite node selection and labelling
//! - `pods`: exec and log helpers
//! - `workloads`: DaemonSet and Deployment readiness

pub mod find;
pub mod fixture;
pub mod pods;
pub mod workloads;

pub use find::{
    find_exactly_one, find_pod_by_label, find_pod_by_name_fragment, first_named, pick_exactly_one,
    wait_for_exactly_one,
};
pub use fixture::{ClusterFixture, WorkerSelection, label_selector, select_test_workers};
pub use pods::{
    exec_in_pod, first_container, log_window_secs, pod_is_ready, pod_logs_since, pods_on_node,
    wait_for_pod_on_node, wait_for_pod_ready,
};
pub use workloads::{
    daemonset_available, daemonset_available_count, daemonset_is_ready, daemonset_ready,
    deployment_is_ready, deployment_ready, verify_daemonset_available_and_ready,
    wait_for_daemonset_available, wait_for_deployment_ready,
};
