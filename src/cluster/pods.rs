//! Pod exec and log helpers used by probes.

use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams, ListParams, LogParams};
use tokio::io::AsyncReadExt;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::matcher::{anything, predicate};
use crate::poll::{PollPolicy, poll_until};

/// Run `command` in a pod container and return its stdout.
///
/// A non-success exit status reported by the API server is an `Exec` error.
pub async fn exec_in_pod(
    api: &Api<Pod>,
    pod: &str,
    container: Option<&str>,
    command: &[&str],
) -> Result<String> {
    let mut params = AttachParams::default().stdout(true).stderr(false);
    if let Some(container) = container {
        params = params.container(container);
    }

    trace!(pod, ?container, ?command, "Executing command in pod");
    let mut attached = api
        .exec(pod, command.iter().map(|s| s.to_string()), &params)
        .await?;

    let mut output = String::new();
    if let Some(mut stdout) = attached.stdout() {
        stdout.read_to_string(&mut output).await?;
    }

    if let Some(status) = attached.take_status()
        && let Some(status) = status.await
        && status.status.as_deref() == Some("Failure")
    {
        return Err(Error::Exec(format!(
            "command {:?} in pod {} failed: {}",
            command,
            pod,
            status.message.unwrap_or_default()
        )));
    }

    attached
        .join()
        .await
        .map_err(|e| Error::Exec(format!("exec session for pod {} ended abnormally: {}", pod, e)))?;

    debug!(pod, bytes = output.len(), "Command completed");
    Ok(output)
}

/// `sinceSeconds` for a log window; the API server rejects anything below one.
pub fn log_window_secs(window: Duration) -> i64 {
    i64::try_from(window.as_secs()).unwrap_or(i64::MAX).max(1)
}

/// Logs of a pod container covering the last `window`, at least one second.
pub async fn pod_logs_since(
    api: &Api<Pod>,
    pod: &str,
    container: Option<&str>,
    window: Duration,
) -> Result<String> {
    let params = LogParams {
        container: container.map(String::from),
        since_seconds: Some(log_window_secs(window)),
        ..Default::default()
    };
    Ok(api.logs(pod, &params).await?)
}

/// Whether a pod reports the `Ready` condition as true.
pub fn pod_is_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// Name of a pod's first container.
pub fn first_container(pod: &Pod) -> Option<&str> {
    pod.spec
        .as_ref()
        .and_then(|s| s.containers.first())
        .map(|c| c.name.as_str())
}

/// Wait until the named pod is Ready and return it.
pub async fn wait_for_pod_ready(api: &Api<Pod>, name: &str, policy: &PollPolicy) -> Result<Pod> {
    poll_until(
        move || api.get(name),
        &predicate("be Ready", pod_is_ready),
        policy,
    )
    .await
    .into_result(&format!("pod {} ready", name))
}

/// Pods on `node` that match `label_selector`.
pub async fn pods_on_node(api: &Api<Pod>, node: &str, label_selector: &str) -> Result<Vec<Pod>> {
    let params = ListParams::default()
        .fields(&format!("spec.nodeName={}", node))
        .labels(label_selector);
    Ok(api.list(&params).await?.items)
}

/// Wait until at least one pod matching `label_selector` is scheduled on `node`.
pub async fn wait_for_pod_on_node(
    api: &Api<Pod>,
    node: &str,
    label_selector: &str,
    policy: &PollPolicy,
) -> Result<Pod> {
    let description = format!("pod with label '{}' on node {}", label_selector, node);
    let desc = description.as_str();
    poll_until(
        move || async move {
            pods_on_node(api, node, label_selector)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| Error::NotFound(desc.to_string()))
        },
        &anything(),
        policy,
    )
    .await
    .into_result(desc)
}
