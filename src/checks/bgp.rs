//! BGP session and route checks against FRR pods.
//!
//! Parsing works on the JSON that `vtysh` prints; the async checks wrap those
//! parsers in poll-based assertions.

use std::collections::BTreeMap;
use std::net::IpAddr;

use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube::{Client, ResourceExt};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::cluster::exec_in_pod;
use crate::config::{
    BGP_DOWN, BGP_ESTABLISHED, BGP_STAYS_DOWN, PREFIX_ADVERTISED, PROTOCOL_CONFIGURED, SuiteConfig,
};
use crate::error::{Error, Result};
use crate::matcher::{Matcher, be_false, be_true, contain_elements};
use crate::poll::{consistently, eventually};

/// BGP FSM state of an up session
pub const ESTABLISHED: &str = "Established";

/// Container running the FRR daemons in frr-k8s pods
pub const FRR_CONTAINER: &str = "frr";

/// Strip a `/len` suffix from an address.
pub fn strip_prefix_len(address: &str) -> &str {
    address.split('/').next().unwrap_or(address)
}

/// Network address of `address/prefix_len`, rendered in CIDR form.
///
/// `network_prefix("10.10.0.17", 24)` is `"10.10.0.0/24"`.
pub fn network_prefix(address: &str, prefix_len: u8) -> Result<String> {
    let ip: IpAddr = strip_prefix_len(address)
        .parse()
        .map_err(|e| Error::Parse(format!("invalid IP address {:?}: {}", address, e)))?;

    let network = match ip {
        IpAddr::V4(v4) => {
            if prefix_len > 32 {
                return Err(Error::Parse(format!("prefix length {} exceeds 32", prefix_len)));
            }
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix_len)).unwrap_or(0);
            IpAddr::from((u32::from(v4) & mask).to_be_bytes())
        }
        IpAddr::V6(v6) => {
            if prefix_len > 128 {
                return Err(Error::Parse(format!("prefix length {} exceeds 128", prefix_len)));
            }
            let mask = u128::MAX.checked_shl(128 - u32::from(prefix_len)).unwrap_or(0);
            IpAddr::from((u128::from(v6) & mask).to_be_bytes())
        }
    };
    Ok(format!("{}/{}", network, prefix_len))
}

/// BGP state of `peer` from `show bgp neighbor <peer> json` output.
pub fn parse_neighbor_state(output: &str, peer: &str) -> Result<String> {
    let value: Value = serde_json::from_str(output)?;
    value
        .get(peer)
        .and_then(|n| n.get("bgpState"))
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| Error::Parse(format!("no bgpState for neighbor {} in vtysh output", peer)))
}

/// Whether a running config enables `protocol` (e.g. `router bgp`).
pub fn is_protocol_configured(running_config: &str, protocol: &str) -> bool {
    running_config
        .lines()
        .any(|line| line.trim_start().starts_with(protocol))
}

/// Next hop of a BGP route
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NextHop {
    pub ip: String,
}

/// One path for a prefix in the BGP table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BgpRoute {
    pub prefix_len: u8,
    #[serde(default)]
    pub nexthops: Vec<NextHop>,
}

/// BGP table as printed by `show bgp ... json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BgpStatus {
    #[serde(default)]
    pub routes: BTreeMap<String, Vec<BgpRoute>>,
}

impl BgpStatus {
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.routes.contains_key(prefix)
    }

    /// Next-hop addresses across every path to `prefix`.
    pub fn next_hops(&self, prefix: &str) -> Vec<String> {
        self.routes
            .get(prefix)
            .into_iter()
            .flatten()
            .flat_map(|route| route.nexthops.iter().map(|h| h.ip.clone()))
            .collect()
    }

    /// Check that `prefix` is advertised with `prefix_len` via every address
    /// in `expected_next_hops`.
    pub fn verify_prefix(
        &self,
        prefix: &str,
        prefix_len: u8,
        expected_next_hops: &[String],
    ) -> Result<()> {
        let routes = self
            .routes
            .get(prefix)
            .ok_or_else(|| Error::Check(format!("prefix {} missing from BGP table", prefix)))?;

        if let Some(route) = routes.iter().find(|r| r.prefix_len != prefix_len) {
            return Err(Error::Check(format!(
                "prefix {} has length {}, expected {}",
                prefix, route.prefix_len, prefix_len
            )));
        }

        let next_hops = self.next_hops(prefix);
        let matcher = contain_elements(expected_next_hops.iter().cloned());
        if !matcher.matches(&next_hops) {
            return Err(Error::Check(format!(
                "next hops of {} are {:?}, expected to {}",
                prefix,
                next_hops,
                Matcher::<Vec<String>>::describe(&matcher)
            )));
        }
        Ok(())
    }
}

/// Parse `show bgp ... json` output.
pub fn parse_bgp_status(output: &str) -> Result<BgpStatus> {
    Ok(serde_json::from_str(output)?)
}

/// Prefixes present in a BGP table dump.
pub fn parse_route_prefixes(output: &str) -> Result<Vec<String>> {
    Ok(parse_bgp_status(output)?.routes.into_keys().collect())
}

/// An FRR pod addressed through `vtysh`.
#[derive(Clone)]
pub struct FrrPod {
    api: Api<Pod>,
    name: String,
    container: String,
}

impl FrrPod {
    pub fn new(client: Client, namespace: &str, name: impl Into<String>) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.into(),
            container: FRR_CONTAINER.to_string(),
        }
    }

    /// Wrap a pod returned by a lookup.
    pub fn from_pod(client: Client, pod: &Pod) -> Self {
        let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
        Self::new(client, &namespace, pod.name_any())
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run one vtysh command.
    pub async fn vtysh(&self, command: &str) -> Result<String> {
        exec_in_pod(
            &self.api,
            &self.name,
            Some(&self.container),
            &["vtysh", "-c", command],
        )
        .await
    }

    /// BGP FSM state of the session to `peer`.
    pub async fn neighbor_state(&self, peer: &str) -> Result<String> {
        let output = self
            .vtysh(&format!("show bgp neighbor {} json", peer))
            .await?;
        parse_neighbor_state(&output, peer)
    }

    pub async fn neighbor_established(&self, peer: &str) -> Result<bool> {
        Ok(self.neighbor_state(peer).await? == ESTABLISHED)
    }

    pub async fn running_config(&self) -> Result<String> {
        self.vtysh("show running-config").await
    }

    pub async fn protocol_configured(&self, protocol: &str) -> Result<bool> {
        Ok(is_protocol_configured(&self.running_config().await?, protocol))
    }

    /// BGP table for an address family (`ipv4` or `ipv6`), optionally in a VRF.
    pub async fn bgp_status(&self, family: &str, vrf: Option<&str>) -> Result<BgpStatus> {
        let command = match vrf {
            Some(vrf) => format!("show bgp vrf {} {} json", vrf, family),
            None => format!("show bgp {} json", family),
        };
        parse_bgp_status(&self.vtysh(&command).await?)
    }
}

/// Wait for every peer session to reach Established.
pub async fn verify_sessions_established(
    pod: &FrrPod,
    peers: &[String],
    config: &SuiteConfig,
) -> Result<()> {
    let policy = config.policy(BGP_ESTABLISHED)?;
    for peer in peers {
        let peer = strip_prefix_len(peer);
        eventually(move || pod.neighbor_established(peer), &be_true(), &policy)
            .await
            .into_result(&format!("BGP session to {} on {}", peer, pod.name()))?;
        debug!(pod = pod.name(), peer, "BGP session established");
    }
    info!(pod = pod.name(), peers = peers.len(), "All BGP sessions established");
    Ok(())
}

/// Wait for every peer session to leave Established, then require it to stay
/// down.
///
/// While waiting for the session to drop, probe errors count as "not
/// established". Once down, an error fails the check.
pub async fn verify_sessions_down(pod: &FrrPod, peers: &[String], config: &SuiteConfig) -> Result<()> {
    let drop_policy = config.policy(BGP_DOWN)?;
    let hold_policy = config.policy(BGP_STAYS_DOWN)?;
    for peer in peers {
        let peer = strip_prefix_len(peer);
        let description = format!("BGP session to {} on {}", peer, pod.name());

        eventually(
            move || async move { Ok::<_, Error>(pod.neighbor_established(peer).await.unwrap_or(false)) },
            &be_false(),
            &drop_policy,
        )
        .await
        .into_result(&description)?;

        consistently(move || pod.neighbor_established(peer), &be_false(), &hold_policy)
            .await
            .into_result(&description)?;
        debug!(pod = pod.name(), peer, "BGP session stayed down");
    }
    Ok(())
}

/// Wait until the pod's running config enables `protocol`.
pub async fn wait_for_protocol_configured(
    pod: &FrrPod,
    protocol: &str,
    config: &SuiteConfig,
) -> Result<()> {
    let policy = config.policy(PROTOCOL_CONFIGURED)?;
    eventually(move || pod.protocol_configured(protocol), &be_true(), &policy)
        .await
        .into_result(&format!("{:?} in running config of {}", protocol, pod.name()))?;
    Ok(())
}

/// Wait until `prefix` is present in (or absent from) the BGP table.
///
/// Table read errors count as "not yet".
pub async fn wait_for_prefix(
    pod: &FrrPod,
    family: &str,
    vrf: Option<&str>,
    prefix: &str,
    present: bool,
    config: &SuiteConfig,
) -> Result<BgpStatus> {
    let policy = config.policy(PREFIX_ADVERTISED)?;
    let outcome = eventually(
        move || async move {
            Ok::<_, Error>(
                pod.bgp_status(family, vrf)
                    .await
                    .map(|status| status.has_prefix(prefix) == present)
                    .unwrap_or(false),
            )
        },
        &be_true(),
        &policy,
    )
    .await;
    let state = if present { "present" } else { "absent" };
    outcome.into_result(&format!("prefix {} {} on {}", prefix, state, pod.name()))?;

    pod.bgp_status(family, vrf).await
}
