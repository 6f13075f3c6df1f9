//! Per-suite cluster fixture.
//!
//! Holds the client, configuration and the nodes a test run operates on.
//! Scenarios receive a `&ClusterFixture` instead of reading shared globals.

use std::collections::BTreeMap;
use std::future::Future;

use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::SuiteConfig;
use crate::error::{Error, Result};

/// Field manager used for label patches
pub const FIELD_MANAGER: &str = "kube-conformance";

/// Render labels as a `k=v,k=v` selector.
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Workers chosen for a test run.
#[derive(Debug, Clone)]
pub struct WorkerSelection {
    pub nodes: Vec<Node>,
    /// Selector that matches exactly the chosen workers
    pub selector: String,
    /// Whether the chosen workers must be labelled with the test label
    pub labelled: bool,
}

/// Decide which workers a test run uses.
///
/// Clusters with more workers than `max_test_workers` are narrowed to the
/// first ones by name, and those are addressed through the test label.
pub fn select_test_workers(mut nodes: Vec<Node>, config: &SuiteConfig) -> WorkerSelection {
    if nodes.len() <= config.max_test_workers {
        return WorkerSelection {
            nodes,
            selector: config.worker_label_selector.clone(),
            labelled: false,
        };
    }

    nodes.sort_by_key(|n| n.name_any());
    nodes.truncate(config.max_test_workers);
    let (key, value) = &config.test_label;
    WorkerSelection {
        nodes,
        selector: format!("{}={}", key, value),
        labelled: true,
    }
}

/// Cluster handle shared by the scenarios of one suite run.
#[derive(Clone)]
pub struct ClusterFixture {
    pub client: Client,
    pub config: SuiteConfig,
    pub workers: Vec<Node>,
    pub control_plane: Vec<Node>,
    /// Selector matching `workers`
    pub worker_selector: String,
    labelled: bool,
}

impl ClusterFixture {
    /// List worker and control-plane nodes and pick the test workers.
    pub async fn discover(client: Client, config: SuiteConfig) -> Result<Self> {
        let nodes: Api<Node> = Api::all(client.clone());

        let control_plane = nodes
            .list(&ListParams::default().labels(&config.control_plane_label_selector))
            .await?
            .items;
        if control_plane.is_empty() {
            return Err(Error::NotFound(format!(
                "control-plane node matching '{}'",
                config.control_plane_label_selector
            )));
        }

        let workers = nodes
            .list(&ListParams::default().labels(&config.worker_label_selector))
            .await?
            .items;
        if workers.is_empty() {
            return Err(Error::NotFound(format!(
                "worker node matching '{}'",
                config.worker_label_selector
            )));
        }

        let selection = select_test_workers(workers, &config);
        if selection.labelled {
            let names: Vec<String> = selection.nodes.iter().map(|n| n.name_any()).collect();
            let (key, value) = &config.test_label;
            let api = &nodes;
            apply_test_labels(&names, move |name: String, apply: bool| async move {
                set_node_label(api, &name, key, apply.then_some(value.as_str())).await
            })
            .await?;
        }

        info!(
            workers = selection.nodes.len(),
            control_plane = control_plane.len(),
            selector = %selection.selector,
            "Discovered cluster nodes"
        );

        Ok(Self {
            client,
            config,
            workers: selection.nodes,
            control_plane,
            worker_selector: selection.selector,
            labelled: selection.labelled,
        })
    }

    /// Names of the workers used by this run.
    pub fn worker_names(&self) -> Vec<String> {
        self.workers.iter().map(|n| n.name_any()).collect()
    }

    /// Remove the test label from the workers this fixture labelled.
    ///
    /// Failures are logged and the first one is returned after every node
    /// has been attempted.
    pub async fn cleanup(&self) -> Result<()> {
        if !self.labelled {
            return Ok(());
        }

        let nodes: Api<Node> = Api::all(self.client.clone());
        let (key, _) = &self.config.test_label;
        let api = &nodes;
        remove_test_labels(&self.worker_names(), &mut move |name: String, _apply: bool| async move {
            set_node_label(api, &name, key, None).await
        })
        .await
    }
}

/// Label `names` in order through `set_label(name, apply)`.
///
/// If one node cannot be labelled, the labels already applied are removed
/// before the error is returned, so a failed discovery leaves no node behind.
async fn apply_test_labels<F, Fut>(names: &[String], mut set_label: F) -> Result<()>
where
    F: FnMut(String, bool) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut labelled = Vec::with_capacity(names.len());
    for name in names {
        if let Err(e) = set_label(name.clone(), true).await {
            warn!(node = %name, error = %e, rollback = labelled.len(), "Failed to apply test label");
            if let Err(rollback) = remove_test_labels(&labelled, &mut set_label).await {
                warn!(error = %rollback, "Test label rollback incomplete");
            }
            return Err(e);
        }
        labelled.push(name.clone());
    }
    Ok(())
}

/// Remove the test label from every node in `names`.
///
/// Failures are logged and the first one is returned after every node has
/// been attempted.
async fn remove_test_labels<F, Fut>(names: &[String], set_label: &mut F) -> Result<()>
where
    F: FnMut(String, bool) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut first_error = None;
    for name in names {
        if let Err(e) = set_label(name.clone(), false).await {
            warn!(node = %name, error = %e, "Failed to remove test label");
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Set or remove (`None`) a single node label with a merge patch.
async fn set_node_label(api: &Api<Node>, node: &str, key: &str, value: Option<&str>) -> Result<()> {
    let patch = json!({ "metadata": { "labels": { key: value } } });
    api.patch(node, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;
    debug!(node, label = key, ?value, "Patched node label");
    Ok(())
}
