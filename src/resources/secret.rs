//! Credential Secret access and mirror construction
//!
//! The credential engine reads and writes two Secrets per cluster: the
//! user-editable source record and the operator-owned mirror. Access goes
//! through the [`SecretStore`] trait so the reconciliation logic can be
//! exercised against an in-memory store in tests.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::PostParams;
use kube::core::ObjectMeta;
use kube::{Api, Client, ResourceExt};
use rand::Rng;

use crate::controller::error::{Error, Result};
use crate::crd::GaleraCluster;
use crate::resources::common::{mirror_secret_name, owner_reference, standard_labels};

/// Named key/value secret storage scoped to one namespace.
///
/// "Not found" is a distinguished, recoverable outcome of `get`, not an error.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<Secret>>;
    async fn create(&self, secret: &Secret) -> Result<()>;
    async fn update(&self, secret: &Secret) -> Result<()>;
}

/// Production [`SecretStore`] backed by the Kubernetes API
pub struct KubeSecretStore {
    api: Api<Secret>,
}

impl KubeSecretStore {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, name: &str) -> Result<Option<Secret>> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn create(&self, secret: &Secret) -> Result<()> {
        self.api.create(&PostParams::default(), secret).await?;
        Ok(())
    }

    async fn update(&self, secret: &Secret) -> Result<()> {
        let name = secret.name_any();
        self.api
            .replace(&name, &PostParams::default(), secret)
            .await?;
        Ok(())
    }
}

/// Build the mirror Secret for a cluster from the source record.
///
/// The mirror starts as a value-for-value copy of the source under fresh
/// metadata: at bootstrap the cluster was provisioned from the source values,
/// so seeding the mirror with them makes the first diff a no-op.
pub fn build_mirror_secret(cluster: &GaleraCluster, source: &Secret) -> Result<Secret> {
    let cluster_name = cluster.name_any();
    let namespace = cluster.namespace().ok_or(Error::MissingNamespace)?;

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(mirror_secret_name(&cluster_name)),
            namespace: Some(namespace),
            labels: Some(standard_labels(&cluster_name)),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        type_: source.type_.clone(),
        data: source.data.clone(),
        ..Default::default()
    })
}

/// Generate a secure random password
pub fn generate_password() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    const PASSWORD_LEN: usize = 24;

    let mut rng = rand::rng();
    (0..PASSWORD_LEN)
        .filter_map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET.get(idx).map(|&c| c as char)
        })
        .collect()
}
