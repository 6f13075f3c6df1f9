//! Readiness probes for DaemonSets and Deployments.

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::api::Api;
use tracing::debug;

use crate::config::{DAEMONSET_AVAILABLE, DAEMONSET_READY, SuiteConfig};
use crate::error::Result;
use crate::matcher::{Matcher, be_true};
use crate::poll::{PollOutcome, PollPolicy, poll_until};

/// Number of available pods reported by a DaemonSet's status.
pub fn daemonset_available(daemonset: &DaemonSet) -> i32 {
    daemonset
        .status
        .as_ref()
        .map(|s| s.number_available.unwrap_or(0))
        .unwrap_or(0)
}

/// Whether every scheduled DaemonSet pod is available.
pub fn daemonset_ready(daemonset: &DaemonSet) -> bool {
    daemonset.status.as_ref().is_some_and(|s| {
        s.desired_number_scheduled > 0
            && s.number_available.unwrap_or(0) == s.desired_number_scheduled
            && s.number_ready == s.desired_number_scheduled
    })
}

/// Whether a Deployment has all desired replicas ready.
pub fn deployment_ready(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let ready = deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    ready >= desired
}

/// Available pod count of a DaemonSet; a missing DaemonSet counts as zero.
pub async fn daemonset_available_count(api: &Api<DaemonSet>, name: &str) -> Result<i32> {
    match api.get_opt(name).await? {
        Some(ds) => Ok(daemonset_available(&ds)),
        None => {
            debug!(daemonset = name, "DaemonSet not found, reporting zero available");
            Ok(0)
        }
    }
}

/// Whether a DaemonSet currently has every scheduled pod ready; a missing
/// DaemonSet is not ready.
pub async fn daemonset_is_ready(api: &Api<DaemonSet>, name: &str) -> Result<bool> {
    Ok(api.get_opt(name).await?.is_some_and(|ds| daemonset_ready(&ds)))
}

/// Whether a Deployment currently has all replicas ready.
pub async fn deployment_is_ready(api: &Api<Deployment>, name: &str) -> Result<bool> {
    let deployment = api.get(name).await?;
    Ok(deployment_ready(&deployment))
}

/// Poll a DaemonSet's available count against `matcher`.
pub async fn wait_for_daemonset_available<M>(
    api: &Api<DaemonSet>,
    name: &str,
    matcher: &M,
    policy: &PollPolicy,
) -> PollOutcome<i32, crate::error::Error>
where
    M: Matcher<i32> + ?Sized,
{
    poll_until(move || daemonset_available_count(api, name), matcher, policy).await
}

/// Wait for a DaemonSet's available count to satisfy `matcher`, then for
/// every scheduled pod to be ready.
///
/// Returns the available count seen by the first stage.
pub async fn verify_daemonset_available_and_ready<M>(
    api: &Api<DaemonSet>,
    name: &str,
    matcher: &M,
    config: &SuiteConfig,
) -> Result<i32>
where
    M: Matcher<i32> + ?Sized,
{
    let available = wait_for_daemonset_available(api, name, matcher, &config.policy(DAEMONSET_AVAILABLE)?)
        .await
        .into_result(&format!("daemonset {} available pods", name))?;

    poll_until(
        move || daemonset_is_ready(api, name),
        &be_true(),
        &config.policy(DAEMONSET_READY)?,
    )
    .await
    .into_result(&format!("daemonset {} ready", name))?;
    debug!(daemonset = name, available, "DaemonSet available and ready");
    Ok(available)
}

/// Wait until a Deployment has all replicas ready.
pub async fn wait_for_deployment_ready(
    api: &Api<Deployment>,
    name: &str,
    policy: &PollPolicy,
) -> Result<()> {
    poll_until(move || deployment_is_ready(api, name), &be_true(), policy)
        .await
        .into_result(&format!("deployment {} ready", name))?;
    Ok(())
}
