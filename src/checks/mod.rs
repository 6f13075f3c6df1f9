//! Domain checks built on the poller.
//!
//! - `bgp`: FRR session, route and protocol checks
//! - `ptp`: clock sync, phc2sys lock and log fault checks
//! - `metrics`: Prometheus metric scraping and stored-series queries
//! - `sriov`: SR-IOV workload connectivity

pub mod bgp;
pub mod metrics;
pub mod ptp;
pub mod sriov;

pub use bgp::{
    BgpRoute, BgpStatus, FrrPod, NextHop, is_protocol_configured, network_prefix,
    parse_bgp_status, parse_neighbor_state, parse_route_prefixes, strip_prefix_len,
    verify_sessions_down, verify_sessions_established, wait_for_prefix,
    wait_for_protocol_configured,
};
pub use metrics::{
    PROMETHEUS_QUERY_URL, PrometheusPod, ScrapeTarget, metric_names_with_prefix, parse_query_metric_names,
    pod_metric_names, scrape_pod_metrics, verify_metrics_in_prometheus, verify_metrics_present,
    wait_for_metrics_in_prometheus,
};
pub use ptp::{PtpLogFault, is_clock_synced, is_phc2sys_locked, scan_ptp_log, validate_ptp_status};
pub use sriov::{
    Workload, connectivity_message, send_command, verify_connectivity, verify_message_in_logs,
    wait_for_pods_with_selector,
};
