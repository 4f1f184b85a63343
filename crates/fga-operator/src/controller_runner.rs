//! Controller runner - starts and manages both reconciliation loops
//!
//! The request controller owns the Store and AuthorizationModel resources it
//! writes, so changes to either re-trigger their request. The model
//! controller watches AuthorizationModel directly and self-requeues on the
//! configured interval.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use fga_common::crd::{AuthorizationModel, AuthorizationModelRequest, Store};
use fga_common::events::KubeEventPublisher;
use fga_controllers::{model_controller, request_controller};
use fga_openfga::{Config, OpenFgaServiceFactory};

/// Run both controllers until shutdown
pub async fn run_controllers(
    client: Client,
    openfga_config: Config,
    reconciliation_interval: Duration,
) {
    tracing::info!("Starting FGA controllers...");
    tracing::info!("- AuthorizationModelRequest controller");
    tracing::info!("- AuthorizationModel controller");

    let request_ctx = Arc::new(request_controller::RequestContext {
        client: client.clone(),
        factory: Arc::new(OpenFgaServiceFactory),
        config: openfga_config,
        events: Arc::new(KubeEventPublisher::new(
            client.clone(),
            request_controller::CONTROLLER_NAME,
        )),
    });

    let model_ctx = Arc::new(model_controller::ModelContext {
        client: client.clone(),
        events: Arc::new(KubeEventPublisher::new(
            client.clone(),
            model_controller::CONTROLLER_NAME,
        )),
        reconciliation_interval,
    });

    let requests: Api<AuthorizationModelRequest> = Api::all(client.clone());
    let models: Api<AuthorizationModel> = Api::all(client.clone());
    let stores: Api<Store> = Api::all(client.clone());

    let request_ctrl = Controller::new(requests, WatcherConfig::default())
        .owns(models.clone(), WatcherConfig::default())
        .owns(stores, WatcherConfig::default())
        .shutdown_on_signal()
        .run(
            request_controller::reconcile,
            request_controller::error_policy,
            request_ctx,
        )
        .for_each(|result| async move {
            match result {
                Ok(action) => tracing::debug!(?action, "Request reconciliation completed"),
                Err(e) => tracing::error!(error = ?e, "Request reconciliation error"),
            }
        });

    let model_ctrl = Controller::new(models, WatcherConfig::default())
        .shutdown_on_signal()
        .run(
            model_controller::reconcile,
            model_controller::error_policy,
            model_ctx,
        )
        .for_each(|result| async move {
            match result {
                Ok(action) => tracing::debug!(?action, "Model reconciliation completed"),
                Err(e) => tracing::error!(error = ?e, "Model reconciliation error"),
            }
        });

    tokio::select! {
        _ = request_ctrl => tracing::info!("Request controller completed"),
        _ = model_ctrl => tracing::info!("Model controller completed"),
    }
}
