//! Suite configuration.
//!
//! Poll timeouts and intervals were tuned empirically against cluster
//! propagation delay, so they live here as named timing profiles rather than
//! as constants at each call site. Values come from built-in defaults, an
//! optional YAML file and environment overrides, in that order.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::poll::{PollMode, PollPolicy};

/// Path of an optional YAML configuration file
pub const CONFIG_FILE_ENV: &str = "CONFORMANCE_CONFIG_FILE";
/// Override for `default_timeout_secs`
pub const DEFAULT_TIMEOUT_ENV: &str = "CONFORMANCE_DEFAULT_TIMEOUT";
/// Override for `default_interval_secs`
pub const DEFAULT_INTERVAL_ENV: &str = "CONFORMANCE_DEFAULT_INTERVAL";
/// Override for `worker_label_selector`
pub const WORKER_LABEL_ENV: &str = "CONFORMANCE_WORKER_LABEL";
/// Override for `control_plane_label_selector`
pub const CONTROL_PLANE_LABEL_ENV: &str = "CONFORMANCE_CONTROL_PLANE_LABEL";

// Named timing profiles
pub const BGP_ESTABLISHED: &str = "bgp-established";
pub const BGP_DOWN: &str = "bgp-down";
pub const BGP_STAYS_DOWN: &str = "bgp-stays-down";
pub const PROTOCOL_CONFIGURED: &str = "protocol-configured";
pub const PREFIX_ADVERTISED: &str = "prefix-advertised";
pub const METRICS_SCRAPED: &str = "metrics-scraped";
pub const METRICS_PRESENT: &str = "metrics-present";
pub const DAEMONSET_AVAILABLE: &str = "daemonset-available";
pub const DAEMONSET_READY: &str = "daemonset-ready";
pub const SRIOV_POD_LOOKUP: &str = "sriov-pod-lookup";
pub const SRIOV_POD_READY: &str = "sriov-pod-ready";
pub const SRIOV_SEND: &str = "sriov-send";
pub const SRIOV_LOGS: &str = "sriov-logs";
pub const PTP_SYNC: &str = "ptp-sync";
pub const RESOURCE_READY: &str = "resource-ready";
pub const POD_LOOKUP: &str = "pod-lookup";

/// Timing for one named assertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSpec {
    pub timeout_secs: u64,
    pub interval_secs: u64,
    #[serde(default = "default_mode")]
    pub mode: PollMode,
}

fn default_mode() -> PollMode {
    PollMode::Eventually
}

impl TimingSpec {
    pub const fn eventually(timeout_secs: u64, interval_secs: u64) -> Self {
        Self {
            timeout_secs,
            interval_secs,
            mode: PollMode::Eventually,
        }
    }

    pub const fn consistently(timeout_secs: u64, interval_secs: u64) -> Self {
        Self {
            timeout_secs,
            interval_secs,
            mode: PollMode::Consistently,
        }
    }

    pub fn policy(&self) -> Result<PollPolicy> {
        Ok(PollPolicy::new(
            self.mode,
            Duration::from_secs(self.timeout_secs),
            Duration::from_secs(self.interval_secs),
        )?)
    }
}

/// Configuration shared by every scenario in a suite run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Timeout for assertions without a named profile
    pub default_timeout_secs: u64,
    /// Interval for assertions without a named profile
    pub default_interval_secs: u64,
    /// Named timing profiles; entries here replace the built-in ones
    pub timings: BTreeMap<String, TimingSpec>,
    /// Label selector for worker nodes
    pub worker_label_selector: String,
    /// Label selector for control-plane nodes
    pub control_plane_label_selector: String,
    /// Label applied to the workers selected for a test run
    pub test_label: (String, String),
    /// Upper bound on workers used by tests
    pub max_test_workers: usize,
    pub ptp_namespace: String,
    pub machine_config_namespace: String,
    pub frr_namespace: String,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 180,
            default_interval_secs: 5,
            timings: builtin_timings(),
            worker_label_selector: "node-role.kubernetes.io/worker".to_string(),
            control_plane_label_selector: "node-role.kubernetes.io/master".to_string(),
            test_label: ("metallb".to_string(), "metallbtests".to_string()),
            max_test_workers: 2,
            ptp_namespace: "openshift-ptp".to_string(),
            machine_config_namespace: "openshift-machine-config-operator".to_string(),
            frr_namespace: "openshift-frr-k8s".to_string(),
        }
    }
}

fn builtin_timings() -> BTreeMap<String, TimingSpec> {
    [
        (BGP_ESTABLISHED, TimingSpec::eventually(240, 5)),
        (BGP_DOWN, TimingSpec::eventually(30, 5)),
        (BGP_STAYS_DOWN, TimingSpec::consistently(60, 5)),
        (PROTOCOL_CONFIGURED, TimingSpec::eventually(60, 5)),
        (PREFIX_ADVERTISED, TimingSpec::eventually(60, 5)),
        (METRICS_SCRAPED, TimingSpec::eventually(60, 5)),
        (METRICS_PRESENT, TimingSpec::eventually(300, 5)),
        (DAEMONSET_AVAILABLE, TimingSpec::eventually(180, 5)),
        (DAEMONSET_READY, TimingSpec::eventually(120, 5)),
        (SRIOV_POD_LOOKUP, TimingSpec::eventually(300, 15)),
        (SRIOV_POD_READY, TimingSpec::eventually(180, 5)),
        (SRIOV_SEND, TimingSpec::eventually(300, 5)),
        (SRIOV_LOGS, TimingSpec::eventually(60, 5)),
        (PTP_SYNC, TimingSpec::eventually(60, 10)),
        (RESOURCE_READY, TimingSpec::eventually(60, 5)),
        (POD_LOOKUP, TimingSpec::eventually(30, 2)),
    ]
    .into_iter()
    .map(|(name, spec)| (name.to_string(), spec))
    .collect()
}

impl SuiteConfig {
    /// Load configuration from the environment.
    ///
    /// Reads the YAML file named by `CONFORMANCE_CONFIG_FILE` if set, then
    /// applies the individual environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        info!(
            default_timeout_secs = config.default_timeout_secs,
            default_interval_secs = config.default_interval_secs,
            timings = config.timings.len(),
            "Loaded suite configuration"
        );
        Ok(config)
    }

    /// Load configuration from a YAML file, layered over the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Reading suite configuration file");
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse YAML. Missing fields keep their defaults and timing profiles are
    /// merged over the built-in set.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let parsed: SuiteConfig = serde_yaml::from_str(yaml)?;
        let mut timings = builtin_timings();
        timings.extend(parsed.timings.clone());
        Ok(Self { timings, ..parsed })
    }

    /// Apply overrides from a key lookup (the environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(DEFAULT_TIMEOUT_ENV) {
            self.default_timeout_secs = parse_secs(DEFAULT_TIMEOUT_ENV, &value)?;
        }
        if let Some(value) = lookup(DEFAULT_INTERVAL_ENV) {
            self.default_interval_secs = parse_secs(DEFAULT_INTERVAL_ENV, &value)?;
        }
        if let Some(value) = lookup(WORKER_LABEL_ENV) {
            self.worker_label_selector = value;
        }
        if let Some(value) = lookup(CONTROL_PLANE_LABEL_ENV) {
            self.control_plane_label_selector = value;
        }
        Ok(())
    }

    /// Reject values that cannot produce a valid poll policy.
    pub fn validate(&self) -> Result<()> {
        self.default_policy()?;
        for (name, spec) in &self.timings {
            spec.policy()
                .map_err(|e| Error::Config(format!("timing profile {:?}: {}", name, e)))?;
        }
        if self.max_test_workers == 0 {
            return Err(Error::Config("max_test_workers must be at least 1".into()));
        }
        Ok(())
    }

    /// Eventually policy built from the default timeout and interval.
    pub fn default_policy(&self) -> Result<PollPolicy> {
        TimingSpec::eventually(self.default_timeout_secs, self.default_interval_secs).policy()
    }

    /// Timing for a named assertion, falling back to the defaults.
    pub fn timing(&self, name: &str) -> TimingSpec {
        self.timings.get(name).copied().unwrap_or_else(|| {
            debug!(profile = name, "No timing profile, using defaults");
            TimingSpec::eventually(self.default_timeout_secs, self.default_interval_secs)
        })
    }

    /// Poll policy for a named assertion.
    pub fn policy(&self, name: &str) -> Result<PollPolicy> {
        self.timing(name).policy()
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{} must be whole seconds, got {:?}: {}", key, value, e)))
}
