//! Clock and PTP synchronisation checks.
//!
//! Three probes make up a PTP health check: the node clock reports
//! synchronisation through `timedatectl`, phc2sys reports a locked
//! CLOCK_REALTIME in the linuxptp daemon metrics, and the daemon log over a
//! recent window is free of known faults.

use std::sync::LazyLock;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cluster::{exec_in_pod, find_pod_by_name_fragment, pod_logs_since};
use crate::config::{PTP_SYNC, SuiteConfig};
use crate::error::{Error, Result};
use crate::matcher::{contain_substring, predicate};
use crate::poll::eventually;

/// `timedatectl` line printed once the system clock is synchronised
pub const CLOCK_SYNC_MESSAGE: &str = "System clock synchronized: yes";

pub const MACHINE_CONFIG_DAEMON_POD: &str = "machine-config-daemon";
pub const LINUXPTP_DAEMON_POD: &str = "linuxptp-daemon";
pub const LINUXPTP_DAEMON_CONTAINER: &str = "linuxptp-daemon-container";

/// Metrics endpoint of the linuxptp daemon, reachable from inside its pod
pub const PTP_METRICS_URL: &str = "http://localhost:9091/metrics";

const TIMEDATECTL: [&str; 5] = ["chroot", "/rootfs", "/bin/sh", "-c", "timedatectl"];

/// Whether `timedatectl` output reports a synchronised clock.
pub fn is_clock_synced(timedatectl: &str) -> bool {
    timedatectl.contains(CLOCK_SYNC_MESSAGE)
}

/// Whether linuxptp metrics report phc2sys locked on CLOCK_REALTIME.
pub fn is_phc2sys_locked(metrics: &str) -> bool {
    static PHC2SYS_LOCKED: LazyLock<Option<regex::Regex>> = LazyLock::new(|| {
        regex::Regex::new(
            r#"openshift_ptp_clock_state\{iface="CLOCK_REALTIME",node=".*",process="phc2sys"\} 1"#,
        )
        .ok()
    });
    PHC2SYS_LOCKED.as_ref().is_some_and(|re| re.is_match(metrics))
}

/// Fault found in a linuxptp daemon log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PtpLogFault {
    #[error("PTP timed out while polling for tx timestamp")]
    TxTimestampTimeout,

    #[error("PTP clock jump detected")]
    ClockJump,

    #[error("PTP log is empty")]
    Empty,
}

/// Scan a linuxptp daemon log for faults. Checked in order: tx timestamp
/// timeout, clock jump, empty log.
pub fn scan_ptp_log(log: &str) -> std::result::Result<(), PtpLogFault> {
    if log.contains("timed out while polling for tx timestamp") {
        Err(PtpLogFault::TxTimestampTimeout)
    } else if log.contains("jump") {
        Err(PtpLogFault::ClockJump)
    } else if log.is_empty() {
        Err(PtpLogFault::Empty)
    } else {
        Ok(())
    }
}

/// Wait for the node clock to report synchronisation through the
/// machine-config daemon.
pub async fn check_clock_sync(client: Client, config: &SuiteConfig) -> Result<()> {
    let pods: Api<Pod> = Api::namespaced(client, &config.machine_config_namespace);
    let pod = find_pod_by_name_fragment(&pods, MACHINE_CONFIG_DAEMON_POD).await?;
    let name = pod.name_any();
    let name = name.as_str();
    let api = &pods;

    let policy = config.policy(PTP_SYNC)?;
    eventually(
        move || exec_in_pod(api, name, None, &TIMEDATECTL),
        &contain_substring(CLOCK_SYNC_MESSAGE),
        &policy,
    )
    .await
    .into_result(&format!("clock sync status from {}", name))?;

    debug!(pod = name, "System clock synchronized");
    Ok(())
}

/// Wait for linuxptp metrics to become readable, then require phc2sys to be
/// locked.
pub async fn check_phc2sys_lock(client: Client, config: &SuiteConfig) -> Result<()> {
    let pods: Api<Pod> = Api::namespaced(client, &config.ptp_namespace);
    let pod = find_pod_by_name_fragment(&pods, LINUXPTP_DAEMON_POD).await?;
    let name = pod.name_any();
    let name = name.as_str();
    let api = &pods;

    let policy = config.policy(PTP_SYNC)?;
    let metrics = eventually(
        move || {
            exec_in_pod(
                api,
                name,
                Some(LINUXPTP_DAEMON_CONTAINER),
                &["curl", "-s", PTP_METRICS_URL],
            )
        },
        &predicate("be non-empty", |s: &String| !s.is_empty()),
        &policy,
    )
    .await
    .into_result(&format!("PTP metrics from {}", name))?;

    if !is_phc2sys_locked(&metrics) {
        return Err(Error::Check(format!("PTP not in sync on {}", name)));
    }
    debug!(pod = name, "phc2sys locked");
    Ok(())
}

/// Scan the recent logs of every linuxptp daemon pod.
pub async fn check_ptp_logs(client: Client, config: &SuiteConfig, window: Duration) -> Result<()> {
    let pods: Api<Pod> = Api::namespaced(client, &config.ptp_namespace);
    let daemons: Vec<Pod> = pods
        .list(&ListParams::default())
        .await?
        .items
        .into_iter()
        .filter(|p| p.name_any().contains(LINUXPTP_DAEMON_POD))
        .collect();
    if daemons.is_empty() {
        return Err(Error::NotFound(format!(
            "{} pod in {}",
            LINUXPTP_DAEMON_POD, config.ptp_namespace
        )));
    }

    for daemon in &daemons {
        let name = daemon.name_any();
        let log = pod_logs_since(&pods, &name, Some(LINUXPTP_DAEMON_CONTAINER), window).await?;
        if let Err(fault) = scan_ptp_log(&log) {
            warn!(pod = %name, %fault, "PTP log fault");
            return Err(Error::Check(format!("{} in {}", fault, name)));
        }
    }
    Ok(())
}

/// Full PTP health check: clock sync, phc2sys lock and a clean log window.
pub async fn validate_ptp_status(client: Client, config: &SuiteConfig, log_window: Duration) -> Result<()> {
    check_clock_sync(client.clone(), config).await?;
    check_phc2sys_lock(client.clone(), config).await?;
    check_ptp_logs(client, config, log_window).await?;
    info!("PTP status validated");
    Ok(())
}
