//! SR-IOV workload connectivity checks.
//!
//! One workload pod sends a tagged message to an address served by a second
//! workload, and the check passes once that message shows up in the second
//! pod's logs.

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cluster::{exec_in_pod, first_container, pick_exactly_one, pod_logs_since, wait_for_pod_ready};
use crate::config::{SRIOV_LOGS, SRIOV_POD_LOOKUP, SRIOV_POD_READY, SRIOV_SEND, SuiteConfig};
use crate::error::{Error, Result};
use crate::matcher::{anything, predicate};
use crate::poll::eventually;

/// Shell used to pipe the message into `nc` inside the sending workload
pub const SEND_SHELL: &str = "/bin/bash";

/// Pods of one workload, addressed by namespace and label selector.
#[derive(Debug, Clone, Copy)]
pub struct Workload<'a> {
    pub namespace: &'a str,
    pub selector: &'a str,
}

impl Workload<'_> {
    fn describe(&self) -> String {
        format!("pod matching {:?} in namespace {}", self.selector, self.namespace)
    }
}

/// Message identifying the sending pod, its node and the send time.
pub fn connectivity_message(pod: &Pod, unix_secs: u64) -> String {
    let node = pod
        .spec
        .as_ref()
        .and_then(|s| s.node_name.as_deref())
        .unwrap_or_default();
    format!("Running from pod {}({}) at {}", pod.name_any(), node, unix_secs)
}

/// Command that sends `message` to `target` (`"<addr> <port>"`) with netcat.
pub fn send_command(message: &str, target: &str) -> Vec<String> {
    vec![
        SEND_SHELL.to_string(),
        "-c".to_string(),
        format!("echo '{}' | nc {}", message, target),
    ]
}

/// Wait until at least one pod in `workload` exists and return them all.
///
/// List errors count as "not yet".
pub async fn wait_for_pods_with_selector(
    client: Client,
    workload: &Workload<'_>,
    config: &SuiteConfig,
) -> Result<Vec<Pod>> {
    let api: Api<Pod> = Api::namespaced(client, workload.namespace);
    let params = ListParams::default().labels(workload.selector);
    let (api, params) = (&api, &params);

    let pods = eventually(
        move || async move { api.list(params).await.map(|list| list.items) },
        &predicate("contain at least one pod", |pods: &Vec<Pod>| !pods.is_empty()),
        &config.policy(SRIOV_POD_LOOKUP)?,
    )
    .await
    .into_result(&workload.describe())?;
    debug!(
        namespace = workload.namespace,
        selector = workload.selector,
        count = pods.len(),
        "Found workload pods"
    );
    Ok(pods)
}

/// Wait for the logs written since `since` to become readable, then require
/// `message` in them.
///
/// The log window is never shorter than one second.
pub async fn verify_message_in_logs(
    api: &Api<Pod>,
    pod: &str,
    container: Option<&str>,
    message: &str,
    since: Instant,
    config: &SuiteConfig,
) -> Result<String> {
    let logs = eventually(
        move || pod_logs_since(api, pod, container, since.elapsed()),
        &anything(),
        &config.policy(SRIOV_LOGS)?,
    )
    .await
    .into_result(&format!("logs of pod {}", pod))?;

    if !logs.contains(message) {
        return Err(Error::Check(format!(
            "message {:?} not found in logs of pod {}",
            message, pod
        )));
    }
    Ok(logs)
}

/// The single pod of `workload`, once it is Ready.
async fn ready_workload_pod(
    client: Client,
    workload: &Workload<'_>,
    config: &SuiteConfig,
) -> Result<(Api<Pod>, Pod)> {
    let pods = wait_for_pods_with_selector(client.clone(), workload, config).await?;
    let pod = pick_exactly_one(pods, &workload.describe())?;
    info!(
        pod = %pod.name_any(),
        node = ?pod.spec.as_ref().and_then(|s| s.node_name.as_deref()),
        "Waiting for workload pod to be Ready"
    );

    let api: Api<Pod> = Api::namespaced(client, workload.namespace);
    let pod = wait_for_pod_ready(&api, &pod.name_any(), &config.policy(SRIOV_POD_READY)?).await?;
    Ok((api, pod))
}

/// Send a message from the `source` pod to `target_addr` and verify that the
/// `target` pod logged it.
pub async fn verify_connectivity(
    client: Client,
    source: &Workload<'_>,
    target: &Workload<'_>,
    target_addr: &str,
    config: &SuiteConfig,
) -> Result<()> {
    let (source_api, source_pod) = ready_workload_pod(client.clone(), source, config).await?;
    let (target_api, target_pod) = ready_workload_pod(client, target, config).await?;

    let unix_secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let message = connectivity_message(&source_pod, unix_secs);
    let command = send_command(&message, target_addr);
    let args: Vec<&str> = command.iter().map(String::as_str).collect();
    let args = args.as_slice();

    let source_name = source_pod.name_any();
    let (api, name, container) = (&source_api, source_name.as_str(), first_container(&source_pod));
    info!(pod = name, target = target_addr, "Sending message from workload pod");

    let start = Instant::now();
    eventually(
        move || exec_in_pod(api, name, container, args),
        &anything(),
        &config.policy(SRIOV_SEND)?,
    )
    .await
    .into_result(&format!("message sent from pod {}", name))?;

    verify_message_in_logs(
        &target_api,
        &target_pod.name_any(),
        first_container(&target_pod),
        &message,
        start,
        config,
    )
    .await?;
    Ok(())
}
