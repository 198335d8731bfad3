use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// GaleraCluster is the Schema for the galeraclusters API
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "galera.example.com",
    version = "v1alpha1",
    kind = "GaleraCluster",
    plural = "galeraclusters",
    shortname = "gc",
    namespaced,
    status = "GaleraClusterStatus",
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Ready", "type":"integer", "jsonPath":".status.database.readyReplicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GaleraClusterSpec {
    /// Name of the Secret holding the system user passwords
    pub secrets_name: String,

    /// Number of Galera members
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Metrics agent (PMM) integration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSpec>,

    /// ProxySQL connection-routing layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxysql: Option<ProxySqlSpec>,
}

fn default_replicas() -> i32 {
    3
}

/// Metrics agent configuration
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSpec {
    /// Enable the PMM metrics agent sidecar
    pub enabled: bool,

    /// PMM server address the agent reports to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_host: Option<String>,
}

/// ProxySQL configuration
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxySqlSpec {
    /// Enable the ProxySQL layer in front of the cluster
    pub enabled: bool,

    /// Number of ProxySQL instances
    #[serde(default = "default_proxy_replicas")]
    pub replicas: i32,
}

fn default_proxy_replicas() -> i32 {
    1
}

/// Status of the GaleraCluster
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct GaleraClusterStatus {
    /// Overall phase of the cluster lifecycle
    #[serde(default)]
    pub phase: ClusterPhase,

    /// Database tier readiness
    #[serde(default)]
    pub database: TierStatus,

    /// Proxy tier readiness
    #[serde(default)]
    pub proxy: TierStatus,

    /// Observed generation of the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Readiness of one tier (database members or proxy instances)
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct TierStatus {
    /// Number of ready instances
    #[serde(default)]
    pub ready_replicas: i32,

    /// Phase of this tier
    #[serde(default)]
    pub phase: ClusterPhase,
}

/// Cluster lifecycle phase
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
pub enum ClusterPhase {
    /// Waiting to be created
    #[default]
    Pending,
    /// Resources are being created
    Creating,
    /// Running and healthy
    Running,
    /// In a failed state
    Failed,
    /// Being deleted
    Deleting,
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterPhase::Pending => write!(f, "Pending"),
            ClusterPhase::Creating => write!(f, "Creating"),
            ClusterPhase::Running => write!(f, "Running"),
            ClusterPhase::Failed => write!(f, "Failed"),
            ClusterPhase::Deleting => write!(f, "Deleting"),
        }
    }
}

impl GaleraCluster {
    /// Whether the PMM metrics agent is enabled
    pub fn metrics_enabled(&self) -> bool {
        self.spec.metrics.as_ref().is_some_and(|m| m.enabled)
    }

    /// Whether the ProxySQL layer is enabled
    pub fn proxy_enabled(&self) -> bool {
        self.spec.proxysql.as_ref().is_some_and(|p| p.enabled)
    }

    /// Whether the cluster as a whole reports ready
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.phase == ClusterPhase::Running)
    }

    /// Number of ready database members
    pub fn database_ready_replicas(&self) -> i32 {
        self.status
            .as_ref()
            .map(|s| s.database.ready_replicas)
            .unwrap_or(0)
    }

    /// Whether the proxy tier reports ready
    pub fn proxy_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.proxy.phase == ClusterPhase::Running)
    }
}
