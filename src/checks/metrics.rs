//! Prometheus exposition scraping and stored-series queries.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use serde::Deserialize;
use tracing::debug;

use crate::cluster::exec_in_pod;
use crate::config::{METRICS_PRESENT, METRICS_SCRAPED, SuiteConfig};
use crate::error::{Error, Result};
use crate::matcher::{Matcher, contain_elements, predicate};
use crate::poll::eventually;

/// Prometheus HTTP query endpoint as seen from inside the Prometheus pod
pub const PROMETHEUS_QUERY_URL: &str = "http://localhost:9090/api/v1/query";

/// Distinct metric names starting with `prefix`, in first-seen order.
///
/// Comment lines and labels are ignored, so every series of a metric
/// contributes one name.
pub fn metric_names_with_prefix(exposition: &str, prefix: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    exposition
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split(['{', ' ']).next())
        .filter(|name| name.starts_with(prefix))
        .filter(|name| seen.insert(name.to_string()))
        .map(String::from)
        .collect()
}

/// Fetch a metrics endpoint from inside a pod with curl.
pub async fn scrape_pod_metrics(
    api: &Api<Pod>,
    pod: &str,
    container: Option<&str>,
    url: &str,
) -> Result<String> {
    exec_in_pod(api, pod, container, &["curl", "-s", url]).await
}

/// Metric names with `prefix` exposed by a pod.
pub async fn pod_metric_names(
    api: &Api<Pod>,
    pod: &str,
    container: Option<&str>,
    url: &str,
    prefix: &str,
) -> Result<Vec<String>> {
    let exposition = scrape_pod_metrics(api, pod, container, url).await?;
    Ok(metric_names_with_prefix(&exposition, prefix))
}

/// A metrics endpoint reached by running curl inside a pod container.
#[derive(Clone, Copy)]
pub struct ScrapeTarget<'a> {
    pub api: &'a Api<Pod>,
    pub pod: &'a str,
    pub container: Option<&'a str>,
    pub url: &'a str,
}

/// A Prometheus server queried from inside its own pod.
#[derive(Clone, Copy)]
pub struct PrometheusPod<'a> {
    pub api: &'a Api<Pod>,
    pub pod: &'a str,
    pub container: Option<&'a str>,
}

impl PrometheusPod<'_> {
    /// Names of the metrics Prometheus has stored for `source_pod`.
    pub async fn stored_metric_names(&self, source_pod: &str) -> Result<Vec<String>> {
        let query = format!("query={{pod=\"{}\"}}", source_pod);
        let body = exec_in_pod(
            self.api,
            self.pod,
            self.container,
            &["curl", "-s", "-G", PROMETHEUS_QUERY_URL, "--data-urlencode", query.as_str()],
        )
        .await?;
        parse_query_metric_names(&body)
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<QuerySample>,
}

#[derive(Debug, Deserialize)]
struct QuerySample {
    #[serde(default)]
    metric: BTreeMap<String, String>,
}

/// Sorted, distinct `__name__` labels of a Prometheus instant-query response.
pub fn parse_query_metric_names(body: &str) -> Result<Vec<String>> {
    let response: QueryResponse = serde_json::from_str(body)?;
    if response.status != "success" {
        return Err(Error::Parse(format!(
            "prometheus query returned status {:?}: {}",
            response.status,
            response.error.unwrap_or_default()
        )));
    }
    let names: BTreeSet<String> = response
        .data
        .map(|d| d.result)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|mut sample| sample.metric.remove("__name__"))
        .collect();
    Ok(names.into_iter().collect())
}

/// Wait until a pod exposes metrics with `prefix` and return their names.
///
/// With `allowed`, every exposed name must also appear in that list.
pub async fn verify_metrics_present(
    target: &ScrapeTarget<'_>,
    prefix: &str,
    allowed: Option<&[String]>,
    config: &SuiteConfig,
) -> Result<Vec<String>> {
    let policy = config.policy(METRICS_SCRAPED)?;
    let ScrapeTarget {
        api,
        pod,
        container,
        url,
    } = *target;
    let names = eventually(
        move || pod_metric_names(api, pod, container, url, prefix),
        &predicate("be non-empty", |names: &Vec<String>| !names.is_empty()),
        &policy,
    )
    .await
    .into_result(&format!("metrics with prefix {:?} from {}", prefix, pod))?;
    debug!(pod, prefix, count = names.len(), "Collected metrics");

    if let Some(allowed) = allowed {
        let allowed = allowed.to_vec();
        let matcher = contain_elements(names.iter().cloned());
        if !matcher.matches(&allowed) {
            return Err(Error::Check(format!(
                "pod {} exposes unexpected metrics: {:?}",
                pod,
                names
                    .iter()
                    .filter(|n| !allowed.contains(n))
                    .collect::<Vec<_>>()
            )));
        }
    }
    Ok(names)
}

/// Wait until Prometheus has stored every metric in `names` for `source_pod`.
///
/// Query failures count as "not yet".
pub async fn wait_for_metrics_in_prometheus(
    prometheus: &PrometheusPod<'_>,
    source_pod: &str,
    names: &[String],
    config: &SuiteConfig,
) -> Result<Vec<String>> {
    let policy = config.policy(METRICS_PRESENT)?;
    let stored = eventually(
        move || prometheus.stored_metric_names(source_pod),
        &contain_elements(names.iter().cloned()),
        &policy,
    )
    .await
    .into_result(&format!("metrics of {} in prometheus {}", source_pod, prometheus.pod))?;
    debug!(source_pod, stored = stored.len(), "Metrics present in prometheus");
    Ok(stored)
}

/// Scrape `prefix` metrics from a pod, then wait for Prometheus to store them.
pub async fn verify_metrics_in_prometheus(
    target: &ScrapeTarget<'_>,
    prometheus: &PrometheusPod<'_>,
    prefix: &str,
    allowed: Option<&[String]>,
    config: &SuiteConfig,
) -> Result<Vec<String>> {
    let names = verify_metrics_present(target, prefix, allowed, config).await?;
    wait_for_metrics_in_prometheus(prometheus, target.pod, &names, config).await?;
    Ok(names)
}
