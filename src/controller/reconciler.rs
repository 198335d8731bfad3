//! Reconciliation entrypoint for GaleraCluster resources
//!
//! Each pass runs the credential engine and applies any resulting restart
//! annotations to the pod templates of the affected tiers. The controller
//! runtime serializes passes per cluster; passes for different clusters run
//! concurrently.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use tracing::{error, info, instrument, warn};

use crate::controller::context::Context;
use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::users::UserReconciler;
use crate::crd::GaleraCluster;
use crate::resources::common::{
    FIELD_MANAGER, database_statefulset_name, proxy_statefulset_name,
};
use crate::resources::exec::PodExecutor;
use crate::resources::mysql::MysqlCredentialClient;
use crate::resources::secret::KubeSecretStore;

/// Default backoff configuration for error handling
fn default_backoff() -> BackoffConfig {
    BackoffConfig::default()
}

/// Interval between periodic reconciliation passes
const REQUEUE_INTERVAL: Duration = Duration::from_secs(10);

/// Main reconciliation function
#[instrument(skip(cluster, ctx), fields(name = %cluster.name_any(), namespace = cluster.namespace().unwrap_or_default()))]
pub async fn reconcile(cluster: Arc<GaleraCluster>, ctx: Arc<Context>) -> Result<Action> {
    let ns = cluster.namespace().ok_or(Error::MissingNamespace)?;
    let name = cluster.name_any();

    // The mirror Secret is garbage collected with the cluster; nothing to do.
    if cluster.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let secrets = KubeSecretStore::new(ctx.client.clone(), &ns);
    let credentials = MysqlCredentialClient;
    let executor = PodExecutor::new(ctx.client.clone());
    let users = UserReconciler::new(&secrets, &credentials, &executor);

    if let Some(annotations) = users.reconcile(&cluster).await? {
        if !annotations.database.is_empty() {
            annotate_pod_template(
                &ctx,
                &ns,
                &database_statefulset_name(&name),
                &annotations.database,
            )
            .await?;
        }
        if !annotations.proxy.is_empty() {
            annotate_pod_template(
                &ctx,
                &ns,
                &proxy_statefulset_name(&name),
                &annotations.proxy,
            )
            .await?;
        }
        info!(
            restart_database = !annotations.database.is_empty(),
            restart_proxy = !annotations.proxy.is_empty(),
            "Applied system user credential changes"
        );
    }

    Ok(Action::requeue(REQUEUE_INTERVAL))
}

/// Merge annotations into a StatefulSet's pod template, triggering a rolling
/// restart of that tier
async fn annotate_pod_template(
    ctx: &Context,
    ns: &str,
    statefulset_name: &str,
    annotations: &BTreeMap<String, String>,
) -> Result<()> {
    let api: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), ns);

    let patch = serde_json::json!({
        "spec": {
            "template": {
                "metadata": {
                    "annotations": annotations
                }
            }
        }
    });

    match api
        .patch(
            statefulset_name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await
    {
        Ok(_) => {
            info!(statefulset = %statefulset_name, "Annotated pod template for restart");
            Ok(())
        }
        // The tier's StatefulSet may not be deployed yet; its pods will read
        // the new credentials at first start.
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            warn!(statefulset = %statefulset_name, "StatefulSet not found, skipping restart annotation");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Error policy for the controller with exponential backoff
pub fn error_policy(cluster: Arc<GaleraCluster>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = cluster.name_any();
    let backoff = default_backoff();

    // Get retry count from status or default to 0
    // In a production system, you'd track this in a separate store or annotation
    let retry_count = 0u32;

    let delay = backoff.delay_for_error(error, retry_count);

    if error.is_retryable() {
        warn!(
            "Retryable error for {}: {:?}, requeuing in {:?}",
            name, error, delay
        );
    } else {
        error!(
            "Non-retryable error for {}: {:?}, requeuing in {:?} for manual intervention",
            name, error, delay
        );
    }

    Action::requeue(delay)
}
