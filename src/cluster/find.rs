//! Typed single-object lookups.
//!
//! Many checks need "the one pod matching this selector". These helpers turn
//! the list-then-check-length pattern into a lookup with explicit `NotFound`
//! and `MultipleFound` errors, usable directly as a poll probe.

use std::fmt::Debug;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};
use crate::matcher::anything;
use crate::poll::{PollPolicy, poll_until};

/// Take the single item out of `items`.
pub fn pick_exactly_one<K>(items: Vec<K>, description: &str) -> Result<K> {
    let count = items.len();
    let mut items = items.into_iter();
    match (items.next(), count) {
        (Some(item), 1) => Ok(item),
        (None, _) => Err(Error::NotFound(description.to_string())),
        (Some(_), count) => Err(Error::MultipleFound {
            description: description.to_string(),
            count,
        }),
    }
}

/// First object whose name contains `fragment`, in list order.
pub fn first_named<K: Resource>(items: Vec<K>, fragment: &str) -> Result<K> {
    items
        .into_iter()
        .find(|item| item.meta().name.as_deref().is_some_and(|n| n.contains(fragment)))
        .ok_or_else(|| Error::NotFound(format!("object with name containing '{}'", fragment)))
}

/// List with `params` and require exactly one result.
pub async fn find_exactly_one<K>(api: &Api<K>, params: &ListParams, description: &str) -> Result<K>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let list = api.list(params).await?;
    debug!(
        description,
        matches = list.items.len(),
        "Listed objects for single-object lookup"
    );
    pick_exactly_one(list.items, description)
}

/// The single pod, in any namespace, matching a label selector.
pub async fn find_pod_by_label(client: Client, label_selector: &str) -> Result<Pod> {
    let pods: Api<Pod> = Api::all(client);
    let description = format!("pod with label '{}'", label_selector);
    find_exactly_one(&pods, &ListParams::default().labels(label_selector), &description).await
}

/// The first pod in `api` whose name contains `fragment`.
pub async fn find_pod_by_name_fragment(api: &Api<Pod>, fragment: &str) -> Result<Pod> {
    let list = api.list(&ListParams::default()).await?;
    let pod = first_named(list.items, fragment)?;
    debug!(pod = %pod.name_any(), fragment, "Found pod by name");
    Ok(pod)
}

/// Retry `find_exactly_one` until it yields a result or `policy` expires.
pub async fn wait_for_exactly_one<K>(
    api: &Api<K>,
    params: &ListParams,
    description: &str,
    policy: &PollPolicy,
) -> Result<K>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    poll_until(
        move || find_exactly_one(api, params, description),
        &anything(),
        policy,
    )
    .await
    .into_result(description)
}
