//! AuthorizationModel reconciliation controller (binding loop)
//!
//! Watches `AuthorizationModel` resources and binds every deployment
//! labelled with the sibling store to the right model instance: the store id
//! and resolved model id land in container env vars, with annotations
//! recording when each changed. The loop also requeues itself on an interval
//! so deployments labelled after the model was written are eventually bound.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, ListParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use tracing::{info, warn};

use fga_common::crd::{AuthorizationModel, Store};
use fga_common::events::{actions, reasons, EventPublisher};
use fga_common::metrics;
use fga_common::{Error, Result, OPENFGA_STORE_LABEL};

use crate::deployment_operations::{plan_model_id_updates, plan_store_id_updates};

/// Field manager / reporting component for this controller
pub const CONTROLLER_NAME: &str = "authorization-model-controller";

/// Context for the binding controller
pub struct ModelContext {
    /// Kubernetes client
    pub client: Client,
    /// Event sink for per-deployment failures
    pub events: Arc<dyn EventPublisher>,
    /// Self-requeue interval so late-labelled deployments get bound
    pub reconciliation_interval: Duration,
}

/// Error policy: log and retry after a short backoff.
pub fn error_policy(_model: Arc<AuthorizationModel>, error: &Error, _ctx: Arc<ModelContext>) -> Action {
    warn!(error = %error, "Model reconcile error, will retry");
    Action::requeue(Duration::from_secs(30))
}

/// Bind labelled deployments to the store and model ids.
///
/// Each deployment is written at most once per pass; per-deployment
/// failures are reported as events and never abort the batch.
pub async fn reconcile(model: Arc<AuthorizationModel>, ctx: Arc<ModelContext>) -> Result<Action> {
    let name = model.name_any();
    let namespace = model
        .namespace()
        .ok_or_else(|| Error::internal("reconciler", "AuthorizationModel must be namespaced"))?;
    let reconcile_timestamp = Utc::now();

    info!(model = %name, namespace = %namespace, "Reconciling authorization model bindings");

    let stores: Api<Store> = Api::namespaced(ctx.client.clone(), &namespace);
    let store = match stores.get(&name).await {
        Ok(store) => store,
        Err(err) => {
            ctx.events
                .warn(
                    &model.object_ref(&()),
                    reasons::STORE_NOT_FOUND,
                    actions::BIND,
                    err.to_string(),
                )
                .await;
            warn!(model = %name, error = %err, "Unable to fetch sibling store");
            return Err(err.into());
        }
    };

    // The API server filters by the store label; no client-side scan.
    let deployments_api: Api<Deployment> = Api::namespaced(ctx.client.clone(), &namespace);
    let selector = format!("{}={}", OPENFGA_STORE_LABEL, store.name_any());
    let deployments = match deployments_api
        .list(&ListParams::default().labels(&selector))
        .await
    {
        Ok(deployments) => deployments,
        Err(err) => {
            ctx.events
                .warn(
                    &model.object_ref(&()),
                    reasons::FAILED_LISTING_DEPLOYMENTS,
                    actions::BIND,
                    err.to_string(),
                )
                .await;
            warn!(model = %name, error = %err, "Unable to list labelled deployments");
            return Err(err.into());
        }
    };

    let mut updates = plan_store_id_updates(&deployments.items, &store, reconcile_timestamp);
    let failures = plan_model_id_updates(
        &deployments.items,
        &mut updates,
        model.as_ref(),
        reconcile_timestamp,
    );

    for (deployment, err) in &failures {
        warn!(
            deployment = %deployment.name_any(),
            error = %err,
            "Unable to resolve model instance for deployment"
        );
        ctx.events
            .warn(
                &deployment.object_ref(&()),
                reasons::AUTHORIZATION_MODEL_ID_UPDATE_FAILED,
                actions::BIND,
                err.to_string(),
            )
            .await;
    }

    for deployment in updates.into_values() {
        write_deployment(&deployments_api, deployment, &name, ctx.as_ref()).await;
    }

    Ok(Action::requeue(ctx.reconciliation_interval))
}

/// Persist one updated deployment; failures emit an event and move on.
async fn write_deployment(
    api: &Api<Deployment>,
    deployment: Deployment,
    model_name: &str,
    ctx: &ModelContext,
) {
    let deployment_name = deployment.name_any();
    match api
        .replace(&deployment_name, &PostParams::default(), &deployment)
        .await
    {
        Ok(_) => {
            metrics::record_deployment_updated(&deployment_name, model_name);
            info!(deployment = %deployment_name, "Deployment updated");
        }
        Err(err) => {
            ctx.events
                .warn(
                    &deployment.object_ref(&()),
                    reasons::FAILED_UPDATING_DEPLOYMENT,
                    actions::BIND,
                    err.to_string(),
                )
                .await;
            warn!(
                deployment = %deployment_name,
                error = %err,
                "Unable to update deployment"
            );
        }
    }
}
