//! Shared test cluster singleton.
//!
//! Provides a Kubernetes cluster connection for all integration tests.
//! Each test creates its own Client from the shared cluster for isolation.

use kube::{Client, Config};
use std::sync::Arc;
use std::sync::OnceLock;
use tokio::sync::OnceCell;

/// Global shared test cluster instance.
static SHARED_CLUSTER: OnceCell<Arc<SharedTestCluster>> = OnceCell::const_new();

/// Shared test cluster providing Kubernetes connectivity.
///
/// Connectivity is validated once; each test gets its own Client via
/// `new_client()`.
pub struct SharedTestCluster {
    server_version: String,
}

impl SharedTestCluster {
    /// Get or create the shared test cluster.
    ///
    /// Safe to call from multiple tests concurrently. The first call
    /// validates connectivity, later calls return the cached instance.
    pub async fn get() -> Arc<SharedTestCluster> {
        SHARED_CLUSTER
            .get_or_init(|| async {
                let cluster = Self::connect().await.expect(
                    "Failed to connect to Kubernetes cluster. Is your kubeconfig configured?",
                );
                Arc::new(cluster)
            })
            .await
            .clone()
    }

    /// Create a new Kubernetes client.
    pub async fn new_client(&self) -> Client {
        let config = Config::infer().await.expect("Failed to infer kube config");
        Client::try_from(config).expect("Failed to create kube client")
    }

    #[allow(dead_code)]
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Connect to the cluster using kubeconfig
    async fn connect() -> Result<Self, kube::Error> {
        let config = Config::infer()
            .await
            .map_err(|e| kube::Error::Service(std::io::Error::other(e.to_string()).into()))?;
        let client = Client::try_from(config)?;

        let version = client.apiserver_version().await?;
        tracing::info!(
            "Connected to Kubernetes cluster: {} {}",
            version.platform,
            version.git_version
        );

        Ok(Self {
            server_version: version.git_version,
        })
    }
}

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Initialize tracing for tests. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("kube_conformance=debug")),
            )
            .with_test_writer()
            .init();
    });
}
