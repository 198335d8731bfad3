//! Common utilities and naming conventions for cluster components
//!
//! All deterministic component names (StatefulSets, Services, pods) derive
//! from the cluster name through the helpers here so the controller and the
//! credential engine agree on where things live.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::crd::GaleraCluster;

/// API version for the GaleraCluster CRD
pub const API_VERSION: &str = "galera.example.com/v1alpha1";

/// Kind for the GaleraCluster CRD
pub const KIND: &str = "GaleraCluster";

/// Operator field manager name for server-side apply
pub const FIELD_MANAGER: &str = "galera-operator";

/// Name prefix of the operator-owned mirror of the system users Secret
pub const MIRROR_SECRET_PREFIX: &str = "internal-";

/// MySQL wire port of the database tier
pub const MYSQL_PORT: u16 = 3306;

/// ProxySQL admin interface port
pub const PROXY_ADMIN_PORT: u16 = 6032;

/// Container name of ProxySQL inside proxy pods
pub const PROXY_CONTAINER: &str = "proxysql";

/// Name of the mirror Secret for a cluster
pub fn mirror_secret_name(cluster_name: &str) -> String {
    format!("{}{}", MIRROR_SECRET_PREFIX, cluster_name)
}

/// StatefulSet name of the database tier
pub fn database_statefulset_name(cluster_name: &str) -> String {
    format!("{}-db", cluster_name)
}

/// StatefulSet name of the proxy tier
pub fn proxy_statefulset_name(cluster_name: &str) -> String {
    format!("{}-proxysql", cluster_name)
}

/// In-cluster DNS host of the database tier service
pub fn database_host(cluster_name: &str, namespace: &str) -> String {
    format!("{}-db.{}", cluster_name, namespace)
}

/// In-cluster DNS host of the ProxySQL admin service.
///
/// The "unready" service includes instances that are not yet passing
/// readiness, so credential pushes reach every proxy instance.
pub fn proxy_admin_host(cluster_name: &str, namespace: &str) -> String {
    format!("{}-proxysql-unready.{}", cluster_name, namespace)
}

/// Pod name of the proxy primary (ordinal 0 of the proxy StatefulSet)
pub fn proxy_primary_pod(cluster_name: &str) -> String {
    format!("{}-proxysql-0", cluster_name)
}

/// Generate an owner reference for a GaleraCluster
///
/// This ensures that child resources are properly owned by the cluster
/// and will be garbage collected when the cluster is deleted.
pub fn owner_reference(cluster: &GaleraCluster) -> OwnerReference {
    OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        name: cluster.name_any(),
        uid: cluster.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Generate standard labels for resources belonging to a GaleraCluster
pub fn standard_labels(cluster_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "app.kubernetes.io/name".to_string(),
            cluster_name.to_string(),
        ),
        (
            "app.kubernetes.io/component".to_string(),
            "galera".to_string(),
        ),
        (
            "app.kubernetes.io/managed-by".to_string(),
            FIELD_MANAGER.to_string(),
        ),
        (
            "galera.example.com/cluster".to_string(),
            cluster_name.to_string(),
        ),
    ])
}
