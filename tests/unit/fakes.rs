//! In-memory fakes of the collaborator interfaces
//!
//! These stand in for the Kubernetes Secret store, the MySQL/ProxySQL
//! credential sessions, and the pod exec API, recording every interaction so
//! tests can assert exactly which sessions were opened and what they carried.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use galera_operator::controller::error::{Error, Result};
use galera_operator::crd::{
    ClusterPhase, GaleraCluster, GaleraClusterSpec, GaleraClusterStatus, MetricsSpec, ProxySqlSpec,
    TierStatus,
};
use galera_operator::resources::exec::{ExecOutput, ExecResult, RemoteExecutor};
use galera_operator::resources::mysql::{
    AdminCredentials, CredentialClient, CredentialResult, Endpoint, PasswordUpdate,
};
use galera_operator::resources::secret::SecretStore;

// =============================================================================
// Secret store
// =============================================================================

#[derive(Default)]
pub struct MemorySecretStore {
    secrets: Mutex<BTreeMap<String, Secret>>,
    /// Name of a Secret whose update should fail, for persistence-failure tests
    pub fail_update_of: Mutex<Option<String>>,
}

impl MemorySecretStore {
    pub fn with(secrets: Vec<Secret>) -> Self {
        let store = Self::default();
        {
            let mut map = store.secrets.lock().unwrap();
            for secret in secrets {
                map.insert(secret.name_any(), secret);
            }
        }
        store
    }

    pub fn get_stored(&self, name: &str) -> Option<Secret> {
        self.secrets.lock().unwrap().get(name).cloned()
    }

    pub fn fail_update_of(&self, name: &str) {
        *self.fail_update_of.lock().unwrap() = Some(name.to_string());
    }

    pub fn clear_failures(&self) {
        *self.fail_update_of.lock().unwrap() = None;
    }

    fn injected_failure(&self, name: &str) -> Option<Error> {
        let fail = self.fail_update_of.lock().unwrap();
        if fail.as_deref() == Some(name) {
            Some(Error::KubeError(kube::Error::Api(
                kube::core::ErrorResponse {
                    status: "Failure".to_string(),
                    message: "injected failure".to_string(),
                    reason: "ServerTimeout".to_string(),
                    code: 500,
                },
            )))
        } else {
            None
        }
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, name: &str) -> Result<Option<Secret>> {
        Ok(self.secrets.lock().unwrap().get(name).cloned())
    }

    async fn create(&self, secret: &Secret) -> Result<()> {
        let name = secret.name_any();
        self.secrets.lock().unwrap().insert(name, secret.clone());
        Ok(())
    }

    async fn update(&self, secret: &Secret) -> Result<()> {
        let name = secret.name_any();
        if let Some(err) = self.injected_failure(&name) {
            return Err(err);
        }
        self.secrets.lock().unwrap().insert(name, secret.clone());
        Ok(())
    }
}

// =============================================================================
// Credential client
// =============================================================================

#[derive(Debug, Clone)]
pub struct RecordedSession {
    pub endpoint: Endpoint,
    pub admin: AdminCredentials,
    pub updates: Vec<PasswordUpdate>,
}

#[derive(Default)]
pub struct RecordingCredentialClient {
    pub database_sessions: Mutex<Vec<RecordedSession>>,
    pub proxy_sessions: Mutex<Vec<RecordedSession>>,
    /// (account, password) pairs passed to create_account
    pub created_accounts: Mutex<Vec<(String, String)>>,
}

impl RecordingCredentialClient {
    pub fn database_session_count(&self) -> usize {
        self.database_sessions.lock().unwrap().len()
    }

    pub fn proxy_session_count(&self) -> usize {
        self.proxy_sessions.lock().unwrap().len()
    }

    pub fn created_account_count(&self) -> usize {
        self.created_accounts.lock().unwrap().len()
    }

    pub fn no_sessions_opened(&self) -> bool {
        self.database_session_count() == 0
            && self.proxy_session_count() == 0
            && self.created_account_count() == 0
    }
}

#[async_trait]
impl CredentialClient for RecordingCredentialClient {
    async fn update_database_passwords(
        &self,
        endpoint: &Endpoint,
        admin: &AdminCredentials,
        updates: &[PasswordUpdate],
    ) -> CredentialResult<()> {
        self.database_sessions.lock().unwrap().push(RecordedSession {
            endpoint: endpoint.clone(),
            admin: admin.clone(),
            updates: updates.to_vec(),
        });
        Ok(())
    }

    async fn create_account(
        &self,
        _endpoint: &Endpoint,
        _admin: &AdminCredentials,
        account: &str,
        _hosts: &[&str],
        password: &str,
    ) -> CredentialResult<()> {
        self.created_accounts
            .lock()
            .unwrap()
            .push((account.to_string(), password.to_string()));
        Ok(())
    }

    async fn update_proxy_passwords(
        &self,
        endpoint: &Endpoint,
        admin: &AdminCredentials,
        updates: &[PasswordUpdate],
    ) -> CredentialResult<()> {
        self.proxy_sessions.lock().unwrap().push(RecordedSession {
            endpoint: endpoint.clone(),
            admin: admin.clone(),
            updates: updates.to_vec(),
        });
        Ok(())
    }
}

// =============================================================================
// Remote executor
// =============================================================================

#[derive(Debug, Clone)]
pub struct RecordedExec {
    pub pod: String,
    pub container: String,
    pub command: Vec<String>,
}

#[derive(Default)]
pub struct RecordingExecutor {
    pub calls: Mutex<Vec<RecordedExec>>,
    /// Stderr content returned from every call
    pub stderr: Mutex<String>,
}

impl RecordingExecutor {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn set_stderr(&self, stderr: &str) {
        *self.stderr.lock().unwrap() = stderr.to_string();
    }
}

#[async_trait]
impl RemoteExecutor for RecordingExecutor {
    async fn exec(
        &self,
        _namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> ExecResult<ExecOutput> {
        self.calls.lock().unwrap().push(RecordedExec {
            pod: pod.to_string(),
            container: container.to_string(),
            command: command.to_vec(),
        });
        Ok(ExecOutput {
            stdout: String::new(),
            stderr: self.stderr.lock().unwrap().clone(),
        })
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub const CLUSTER_NAME: &str = "prod";
pub const NAMESPACE: &str = "apps";
pub const SOURCE_SECRET: &str = "prod-secrets";
pub const MIRROR_SECRET: &str = "internal-prod";

/// Build a cluster with the given feature flags and readiness
pub fn cluster(metrics: bool, proxy: bool, ready: bool) -> GaleraCluster {
    let tier = |up: bool| TierStatus {
        ready_replicas: if up { 3 } else { 0 },
        phase: if up {
            ClusterPhase::Running
        } else {
            ClusterPhase::Creating
        },
    };

    GaleraCluster {
        metadata: ObjectMeta {
            name: Some(CLUSTER_NAME.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            uid: Some("test-uid".to_string()),
            ..Default::default()
        },
        spec: GaleraClusterSpec {
            secrets_name: SOURCE_SECRET.to_string(),
            replicas: 3,
            metrics: Some(MetricsSpec {
                enabled: metrics,
                server_host: None,
            }),
            proxysql: Some(ProxySqlSpec {
                enabled: proxy,
                replicas: 1,
            }),
        },
        status: Some(GaleraClusterStatus {
            phase: if ready {
                ClusterPhase::Running
            } else {
                ClusterPhase::Creating
            },
            database: tier(ready),
            proxy: tier(ready),
            observed_generation: None,
        }),
    }
}

/// Build a cluster whose database tier has ready members but whose overall
/// phase is still Creating (mid-provisioning)
pub fn booting_cluster(database_ready: i32) -> GaleraCluster {
    let mut c = cluster(false, false, false);
    if let Some(status) = c.status.as_mut() {
        status.database.ready_replicas = database_ready;
    }
    c
}

/// Build a Secret with the given account values
pub fn secret(name: &str, entries: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

/// The five always-required accounts, all with the given password suffix
pub fn base_entries(suffix: &str) -> Vec<(String, String)> {
    ["root", "xtrabackup", "monitor", "clustercheck", "operator"]
        .iter()
        .map(|a| (a.to_string(), format!("{}-{}", a, suffix)))
        .collect()
}

/// Build a source or mirror Secret holding the base accounts plus extras
pub fn system_secret(name: &str, suffix: &str, extras: &[(&str, &str)]) -> Secret {
    let mut entries: Vec<(String, String)> = base_entries(suffix);
    entries.extend(
        extras
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string())),
    );
    let borrowed: Vec<(&str, &str)> = entries
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    secret(name, &borrowed)
}
