pub mod controller;
pub mod crd;
pub mod resources;

pub use controller::{
    AppliedAnnotations, BackoffConfig, Context, Error, LAST_APPLIED_ANNOTATION, Result,
    UserReconciler, error_policy, reconcile,
};
pub use crd::GaleraCluster;

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::Controller;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Run the operator controller (cluster-wide).
///
/// This is the main controller loop that watches GaleraCluster resources and
/// reconciles their system credentials. It can be called from main.rs or
/// spawned as a background task during integration tests.
pub async fn run_controller(client: Client) {
    run_controller_scoped(client, None).await
}

/// Run the operator controller with optional namespace scoping.
///
/// When `namespace` is `Some(ns)`, only watches resources in that namespace.
/// When `namespace` is `None`, watches resources cluster-wide.
///
/// Use the scoped version for integration tests to enable parallel test execution.
pub async fn run_controller_scoped(client: Client, namespace: Option<&str>) {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    tracing::info!(
        "Starting controller for GaleraCluster resources (scope: {})",
        scope_msg
    );

    let ctx = Arc::new(Context::new(client.clone()));

    // Set up APIs for the controller (namespaced or cluster-wide)
    let clusters: Api<GaleraCluster> = scoped_api(client.clone(), namespace);
    let secrets: Api<Secret> = scoped_api(client.clone(), namespace);

    // Configure watcher to handle dynamic resource creation
    let watcher_config = WatcherConfig::default().any_semantic();

    // Create and run the controller.
    // Watching owned Secrets covers mirror edits; edits to the user-supplied
    // source Secret are picked up by the periodic requeue.
    Controller::new(clusters, watcher_config.clone())
        .owns(secrets, watcher_config)
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    // ObjectNotFound/NotFound errors are expected after deletion when
                    // related watch events trigger reconciliation for a deleted object.
                    // Log these at debug level instead of error.
                    let is_not_found = matches!(
                        &e,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _)
                            if format!("{:?}", err).contains("NotFound")
                    );
                    if is_not_found {
                        tracing::debug!("Object no longer exists (likely deleted): {:?}", e);
                    } else {
                        tracing::error!("Reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    // This should never complete in normal operation
    tracing::error!("Controller stream ended unexpectedly");
}
