//! System account credential reconciliation
//!
//! Keeps the system database accounts synchronized between the user-supplied
//! credential Secret (the source) and the operator-owned mirror Secret, the
//! live database tier, and the ProxySQL layer. The mirror always reflects the
//! last value set that was successfully pushed everywhere it needed to go; it
//! is the single durable checkpoint, updated only after all pushes succeed,
//! so a failed or timed-out pass can be retried safely.
//!
//! One pass:
//! 1. fetch the source Secret (absence: credentials management is off)
//! 2. fetch the mirror; if absent, create it and stop
//! 3. once the database tier has a ready member, bootstrap the operator account
//! 4. stop unless the cluster as a whole is ready
//! 5. fingerprint the source and compare against the mirror
//! 6. push changed passwords to the database and proxy
//! 7. persist the mirror
//! 8. return restart annotations for the tiers whose obligations fired

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::error::{Error, Result};
use crate::controller::fingerprint::{SecretData, changed, fingerprint};
use crate::controller::policy::{Features, Obligations, PolicyTable, SystemAccount};
use crate::crd::GaleraCluster;
use crate::resources::common::{
    MYSQL_PORT, PROXY_ADMIN_PORT, PROXY_CONTAINER, database_host, mirror_secret_name,
    proxy_admin_host, proxy_primary_pod,
};
use crate::resources::exec::RemoteExecutor;
use crate::resources::mysql::{AdminCredentials, CredentialClient, Endpoint, PasswordUpdate};
use crate::resources::secret::{SecretStore, build_mirror_secret, generate_password};

/// Annotation key marking the fingerprint of the last applied credential set.
/// Placing it on a pod template triggers a rolling restart of that tier.
pub const LAST_APPLIED_ANNOTATION: &str = "last-applied-secret";

/// Restart annotations produced by one pass, per tier
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedAnnotations {
    pub database: BTreeMap<String, String>,
    pub proxy: BTreeMap<String, String>,
}

impl AppliedAnnotations {
    pub fn is_empty(&self) -> bool {
        self.database.is_empty() && self.proxy.is_empty()
    }
}

/// Credential reconciliation engine, generic over its collaborators so tests
/// can substitute in-memory fakes
pub struct UserReconciler<'a, S, C, E> {
    secrets: &'a S,
    credentials: &'a C,
    executor: &'a E,
}

impl<'a, S, C, E> UserReconciler<'a, S, C, E>
where
    S: SecretStore,
    C: CredentialClient,
    E: RemoteExecutor,
{
    pub fn new(secrets: &'a S, credentials: &'a C, executor: &'a E) -> Self {
        Self {
            secrets,
            credentials,
            executor,
        }
    }

    /// Run one reconciliation pass.
    ///
    /// Returns `None` when there was nothing to do (no source record, mirror
    /// just bootstrapped, cluster not ready, or no change detected).
    pub async fn reconcile(&self, cluster: &GaleraCluster) -> Result<Option<AppliedAnnotations>> {
        let name = cluster.name_any();

        let Some(mut source) = self
            .secrets
            .get(&cluster.spec.secrets_name)
            .await
            .map_err(|e| e.context("get system users secret"))?
        else {
            debug!(name = %name, "No system users secret; credentials management disabled");
            return Ok(None);
        };

        let mirror_name = mirror_secret_name(&name);
        let mirror = self
            .secrets
            .get(&mirror_name)
            .await
            .map_err(|e| e.context("get internal users secret"))?;

        let Some(mut mirror) = mirror else {
            // The mirror must exist before any diffing; defer everything else
            // to the next pass.
            let mirror = build_mirror_secret(cluster, &source)?;
            self.secrets
                .create(&mirror)
                .await
                .map_err(|e| e.context("create internal users secret"))?;
            info!(name = %name, mirror = %mirror_name, "Created internal users secret");
            return Ok(None);
        };

        if cluster.database_ready_replicas() > 0 {
            self.bootstrap_operator_account(cluster, &mut source, &mut mirror)
                .await
                .map_err(|e| e.context("manage operator account"))?;
        }

        if !cluster.is_ready() {
            return Ok(None);
        }

        let source_data = source.data.clone().unwrap_or_default();
        let source_fingerprint =
            fingerprint(&source_data).map_err(|e| e.context("fingerprint system users secret"))?;

        if !changed(&source_fingerprint, &mirror)
            .map_err(|e| e.context("check system users changes"))?
        {
            return Ok(None);
        }

        info!(name = %name, "System user credentials changed, applying");

        let obligations = self
            .apply_changed_passwords(cluster, &source, &mirror)
            .await
            .map_err(|e| e.context("manage system users"))?;

        // Only now is the change fully applied downstream; record it.
        mirror.data = source.data.clone();
        self.secrets
            .update(&mirror)
            .await
            .map_err(|e| e.context("update internal users secret"))?;

        let mut annotations = AppliedAnnotations::default();
        if obligations.restart_database {
            annotations.database.insert(
                LAST_APPLIED_ANNOTATION.to_string(),
                source_fingerprint.clone(),
            );
        }
        if obligations.restart_proxy {
            annotations
                .proxy
                .insert(LAST_APPLIED_ANNOTATION.to_string(), source_fingerprint);
        }
        Ok(Some(annotations))
    }

    /// Provision or adopt the privileged account the operator itself uses.
    ///
    /// Idempotent across passes: once the source record carries the value the
    /// database account is never created again.
    async fn bootstrap_operator_account(
        &self,
        cluster: &GaleraCluster,
        source: &mut Secret,
        mirror: &mut Secret,
    ) -> Result<()> {
        let account = SystemAccount::Operator.name();
        let in_source = source
            .data
            .as_ref()
            .and_then(|d| d.get(account))
            .cloned();
        let in_mirror = mirror.data.as_ref().is_some_and(|d| d.contains_key(account));

        if let Some(value) = in_source {
            if !in_mirror {
                // Provisioned out-of-band or by a previous partial attempt;
                // adopt the value without touching the database. Persisted
                // with the rest of the mirror once a change is applied.
                mirror
                    .data
                    .get_or_insert_with(Default::default)
                    .insert(account.to_string(), value);
            }
            return Ok(());
        }

        let name = cluster.name_any();
        let namespace = cluster.namespace().ok_or(Error::MissingNamespace)?;

        let password = generate_password();

        // This path runs before any other account sync, so the mirror may
        // still be empty; prefer the source root value.
        let root = SystemAccount::Root.name();
        let root_password = source
            .data
            .as_ref()
            .and_then(|d| d.get(root))
            .filter(|v| !v.0.is_empty())
            .ok_or_else(|| Error::UndefinedAccount(root.to_string()))?;
        let admin = AdminCredentials {
            user: root.to_string(),
            password: utf8_value(root_password, root)?,
        };

        self.credentials
            .create_account(
                &Endpoint::new(database_host(&name, &namespace), MYSQL_PORT),
                &admin,
                account,
                &["%"],
                &password,
            )
            .await
            .map_err(|e| Error::from(e).context("create operator account"))?;

        info!(name = %name, "Created operator database account");

        let value = ByteString(password.into_bytes());
        source
            .data
            .get_or_insert_with(Default::default)
            .insert(account.to_string(), value.clone());
        mirror
            .data
            .get_or_insert_with(Default::default)
            .insert(account.to_string(), value);

        // The database account already exists; if persistence fails here the
        // next pass adopts the source value instead of creating it again.
        self.secrets
            .update(source)
            .await
            .map_err(|e| e.context("update system users secret"))?;
        self.secrets
            .update(mirror)
            .await
            .map_err(|e| e.context("update internal users secret"))?;

        Ok(())
    }

    /// Push every changed password where it needs to go and accumulate the
    /// restart/resync obligations of the accounts that changed
    async fn apply_changed_passwords(
        &self,
        cluster: &GaleraCluster,
        source: &Secret,
        mirror: &Secret,
    ) -> Result<Obligations> {
        let name = cluster.name_any();
        let namespace = cluster.namespace().ok_or(Error::MissingNamespace)?;

        let empty = SecretData::new();
        let source_data = source.data.as_ref().unwrap_or(&empty);
        let mirror_data = mirror.data.as_ref().unwrap_or(&empty);

        let table = PolicyTable::new(Features::from_cluster(cluster));
        let mut database_batch = Vec::new();
        let mut proxy_batch = Vec::new();

        let obligations =
            table
                .accounts()
                .iter()
                .try_fold(Obligations::default(), |acc, policy| {
                    let account = policy.account.name();
                    let value = source_data
                        .get(account)
                        .filter(|v| !v.0.is_empty())
                        .ok_or_else(|| Error::UndefinedAccount(account.to_string()))?;

                    if mirror_data.get(account) == Some(value) {
                        return Ok::<_, Error>(acc);
                    }

                    let update = PasswordUpdate {
                        account: account.to_string(),
                        password: utf8_value(value, account)?,
                        hosts: policy.hosts,
                    };
                    if policy.proxy_managed {
                        proxy_batch.push(update.clone());
                    }
                    if !policy.hosts.is_empty() {
                        database_batch.push(update);
                    }

                    Ok(acc.merge(policy.obligations(table.features())))
                })?;

        if !database_batch.is_empty() {
            let admin = database_admin(source_data, mirror_data)?;
            self.credentials
                .update_database_passwords(
                    &Endpoint::new(database_host(&name, &namespace), MYSQL_PORT),
                    &admin,
                    &database_batch,
                )
                .await
                .map_err(|e| Error::from(e).context("update system users passwords"))?;
        }

        if !proxy_batch.is_empty() && cluster.proxy_enabled() {
            let admin = proxy_admin(source_data, mirror_data)?;
            self.credentials
                .update_proxy_passwords(
                    &Endpoint::new(proxy_admin_host(&name, &namespace), PROXY_ADMIN_PORT),
                    &admin,
                    &proxy_batch,
                )
                .await
                .map_err(|e| Error::from(e).context("update proxy users passwords"))?;
        }

        // A pending proxy restart re-reads credentials anyway, making the
        // live resync redundant.
        if obligations.sync_proxy_users && !obligations.restart_proxy {
            self.sync_proxy_users(cluster)
                .await
                .map_err(|e| e.context("sync proxy users"))?;
        }

        Ok(obligations)
    }

    /// Resynchronize the ProxySQL user table from the live database grants
    async fn sync_proxy_users(&self, cluster: &GaleraCluster) -> Result<()> {
        if !cluster.proxy_enabled() {
            return Ok(());
        }
        if !cluster.is_ready() || !cluster.proxy_ready() {
            return Ok(());
        }

        let name = cluster.name_any();
        let namespace = cluster.namespace().ok_or(Error::MissingNamespace)?;
        let pod = proxy_primary_pod(&name);
        let command = vec!["proxysql-admin".to_string(), "--syncusers".to_string()];

        let output = self
            .executor
            .exec(&namespace, &pod, PROXY_CONTAINER, &command)
            .await?;

        if !output.stderr.is_empty() {
            return Err(Error::ProxySyncFailed(output.stderr));
        }

        info!(name = %name, pod = %pod, "Synced proxy user table");
        Ok(())
    }
}

/// Pick the administrative account for the database session: the operator
/// account when the source record defines one, root otherwise. The password
/// comes from the mirror (the last applied, therefore live, value), falling
/// back to the source when the mirror lacks the key.
fn database_admin(source_data: &SecretData, mirror_data: &SecretData) -> Result<AdminCredentials> {
    let account = if source_data.contains_key(SystemAccount::Operator.name()) {
        SystemAccount::Operator
    } else {
        SystemAccount::Root
    };
    admin_credentials(account, source_data, mirror_data)
}

/// The proxy-admin session always authenticates as the proxy-admin account
fn proxy_admin(source_data: &SecretData, mirror_data: &SecretData) -> Result<AdminCredentials> {
    admin_credentials(SystemAccount::ProxyAdmin, source_data, mirror_data)
}

fn admin_credentials(
    account: SystemAccount,
    source_data: &SecretData,
    mirror_data: &SecretData,
) -> Result<AdminCredentials> {
    let name = account.name();
    let value = mirror_data
        .get(name)
        .or_else(|| source_data.get(name))
        .filter(|v| !v.0.is_empty())
        .ok_or_else(|| Error::UndefinedAccount(name.to_string()))?;
    Ok(AdminCredentials {
        user: name.to_string(),
        password: utf8_value(value, name)?,
    })
}

fn utf8_value(value: &ByteString, account: &str) -> Result<String> {
    String::from_utf8(value.0.clone()).map_err(|_| Error::InvalidUtf8(account.to_string()))
}
