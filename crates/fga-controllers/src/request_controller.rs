//! AuthorizationModelRequest reconciliation controller
//!
//! Drives a request through the `Pending → Synchronizing → Synchronized`
//! state machine: ensures the external store exists (creating or adopting
//! it), publishes missing model versions to the permission engine, prunes
//! versions the request no longer declares, and records the result in the
//! sibling `Store` and `AuthorizationModel` resources.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, info, warn};

use fga_common::crd::{
    AuthorizationModel, AuthorizationModelDefinition, AuthorizationModelInstance,
    AuthorizationModelRequest, AuthorizationModelRequestInstance, AuthorizationModelRequestState,
    AuthorizationModelRequestStatus, ModelVersion, Store,
};
use fga_common::events::{actions, reasons, EventPublisher};
use fga_common::metrics::{self, Location, ModelEvent};
use fga_common::{Error, Result};
use fga_openfga::{Config, PermissionService, PermissionServiceFactory, StoreRecord};

/// Field manager / reporting component for this controller
pub const CONTROLLER_NAME: &str = "authorization-model-request-controller";

/// Context for the request controller
pub struct RequestContext {
    /// Kubernetes client
    pub client: Client,
    /// Factory producing a permission service per reconcile pass
    pub factory: Arc<dyn PermissionServiceFactory>,
    /// Permission engine credentials
    pub config: Config,
    /// Event sink for failure reasons
    pub events: Arc<dyn EventPublisher>,
}

/// Error policy: retryable errors back off, everything else waits for a
/// spec change (the user must fix the request).
pub fn error_policy(
    _request: Arc<AuthorizationModelRequest>,
    error: &Error,
    _ctx: Arc<RequestContext>,
) -> Action {
    warn!(error = %error, "Request reconcile error");
    if error.is_retryable() {
        Action::requeue(Duration::from_secs(30))
    } else {
        Action::await_change()
    }
}

/// Reconcile an AuthorizationModelRequest against the permission engine.
pub async fn reconcile(
    request: Arc<AuthorizationModelRequest>,
    ctx: Arc<RequestContext>,
) -> Result<Action> {
    let name = request.name_any();
    let namespace = request.namespace().ok_or_else(|| {
        Error::internal("reconciler", "AuthorizationModelRequest must be namespaced")
    })?;

    // Status-only watch events must not restart synchronization: a request
    // already synchronized at this spec generation is a no-op.
    if is_synchronized_at_current_generation(&request) {
        debug!(request = %name, "Spec generation unchanged, nothing to do");
        return Ok(Action::await_change());
    }

    let reconcile_timestamp = Utc::now();
    info!(request = %name, namespace = %namespace, "Reconciling authorization model request");

    if let Err(err) = update_state(
        &ctx.client,
        &name,
        &namespace,
        AuthorizationModelRequestState::Synchronizing,
        None,
    )
    .await
    {
        ctx.events
            .warn(
                &request.object_ref(&()),
                reasons::AUTHORIZATION_MODEL_STATUS_CHANGE_FAILED,
                actions::SYNCHRONIZE,
                err.to_string(),
            )
            .await;
        return Err(err);
    }

    let service = match ctx.factory.get_service(&ctx.config) {
        Ok(service) => service,
        Err(err) => {
            return Err(fail_synchronization(
                &ctx,
                &request,
                &namespace,
                reasons::CLIENT_INITIALIZATION_FAILED,
                err,
            )
            .await);
        }
    };

    if let Err(err) = ensure_store(&ctx.client, service.as_ref(), &request, &name, &namespace).await
    {
        return Err(
            fail_synchronization(&ctx, &request, &namespace, reasons::STORE_FAILED, err).await,
        );
    }

    let mut model = match ensure_authorization_model(
        &ctx.client,
        service.as_ref(),
        &request,
        &name,
        &namespace,
        reconcile_timestamp,
    )
    .await
    {
        Ok(model) => model,
        Err(err) => {
            return Err(fail_synchronization(
                &ctx,
                &request,
                &namespace,
                reasons::AUTHORIZATION_MODEL_CREATION_FAILED,
                err,
            )
            .await);
        }
    };

    if let Err(err) = update_authorization_model(
        &ctx.client,
        service.as_ref(),
        &request,
        &mut model,
        &namespace,
        reconcile_timestamp,
    )
    .await
    {
        return Err(fail_synchronization(
            &ctx,
            &request,
            &namespace,
            reasons::AUTHORIZATION_MODEL_UPDATE_FAILED,
            err,
        )
        .await);
    }

    if let Err(err) = update_state(
        &ctx.client,
        &name,
        &namespace,
        AuthorizationModelRequestState::Synchronized,
        request.metadata.generation,
    )
    .await
    {
        ctx.events
            .warn(
                &request.object_ref(&()),
                reasons::AUTHORIZATION_MODEL_STATUS_CHANGE_FAILED,
                actions::SYNCHRONIZE,
                err.to_string(),
            )
            .await;
        return Err(err);
    }

    info!(request = %name, namespace = %namespace, "Request synchronized");
    Ok(Action::await_change())
}

fn is_synchronized_at_current_generation(request: &AuthorizationModelRequest) -> bool {
    request.status.as_ref().is_some_and(|status| {
        status.state == AuthorizationModelRequestState::Synchronized
            && status.observed_generation == request.metadata.generation
    })
}

/// Emit the failure event, persist `SynchronizationFailed`, and hand back
/// the error that caused it. A failed status write wraps both causes.
async fn fail_synchronization(
    ctx: &RequestContext,
    request: &AuthorizationModelRequest,
    namespace: &str,
    reason: &str,
    err: Error,
) -> Error {
    warn!(request = %request.name_any(), reason, error = %err, "Request synchronization failed");
    ctx.events
        .warn(
            &request.object_ref(&()),
            reason,
            actions::SYNCHRONIZE,
            err.to_string(),
        )
        .await;

    match update_state(
        &ctx.client,
        &request.name_any(),
        namespace,
        AuthorizationModelRequestState::SynchronizationFailed,
        None,
    )
    .await
    {
        Ok(()) => err,
        Err(status_err) => Error::status_update(status_err.to_string(), &err),
    }
}

async fn update_state(
    client: &Client,
    name: &str,
    namespace: &str,
    state: AuthorizationModelRequestState,
    observed_generation: Option<i64>,
) -> Result<()> {
    let api: Api<AuthorizationModelRequest> = Api::namespaced(client.clone(), namespace);
    let status = AuthorizationModelRequestStatus {
        state,
        observed_generation,
    };
    api.patch_status(
        name,
        &PatchParams::apply(CONTROLLER_NAME),
        &Patch::Merge(&serde_json::json!({ "status": status })),
    )
    .await?;
    Ok(())
}

/// Owner reference marking a resource as controlled by the request
fn owner_reference(request: &AuthorizationModelRequest) -> Result<OwnerReference> {
    Ok(OwnerReference {
        api_version: AuthorizationModelRequest::api_version(&()).to_string(),
        kind: AuthorizationModelRequest::kind(&()).to_string(),
        name: request
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::internal("reconciler", "request has no name"))?,
        uid: request
            .metadata
            .uid
            .clone()
            .ok_or_else(|| Error::internal("reconciler", "request has no uid"))?,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

// =============================================================================
// Store
// =============================================================================

/// Ensure the sibling Store resource exists and scope the service to it.
async fn ensure_store(
    client: &Client,
    service: &dyn PermissionService,
    request: &AuthorizationModelRequest,
    name: &str,
    namespace: &str,
) -> Result<()> {
    let stores: Api<Store> = Api::namespaced(client.clone(), namespace);

    if let Some(existing) = stores.get_opt(name).await? {
        service.set_store_id(&existing.spec.id);
        return Ok(());
    }

    let record = resolve_store_record(service, request, name).await?;

    let mut store = Store::from_external(&record.name, &record.id, record.created_at);
    store.metadata.namespace = Some(namespace.to_string());
    store.metadata.owner_references = Some(vec![owner_reference(request)?]);

    match stores.create(&PostParams::default(), &store).await {
        Ok(_) => {
            metrics::record_store_created(Location::Kubernetes, name);
            info!(store = %name, store_id = %record.id, "Created store in Kubernetes");
        }
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            debug!(store = %name, "Store resource already exists");
        }
        Err(err) => return Err(err.into()),
    }

    service.set_store_id(&record.id);
    Ok(())
}

/// Resolve the external store: adopt by id, find by name, or create.
///
/// A missing adopted id is fatal — the user must fix the spec.
async fn resolve_store_record(
    service: &dyn PermissionService,
    request: &AuthorizationModelRequest,
    name: &str,
) -> Result<StoreRecord> {
    if let Some(existing_id) = request.spec.adopted_store_id() {
        return service
            .find_store_by_id(existing_id)
            .await?
            .ok_or_else(|| {
                Error::missing_prerequisite(format!("store with id {existing_id} does not exist"))
            });
    }

    if let Some(found) = service.find_store_by_name(name).await? {
        return Ok(found);
    }

    let created = service.create_store(name).await?;
    metrics::record_store_created(Location::OpenFga, name);
    Ok(created)
}

// =============================================================================
// AuthorizationModel
// =============================================================================

fn validate_instances(name: &str, instances: &[AuthorizationModelRequestInstance]) -> Result<()> {
    if instances.is_empty() {
        return Err(Error::validation_for(name, "spec.instances must not be empty"));
    }
    let mut seen: HashSet<ModelVersion> = HashSet::with_capacity(instances.len());
    for instance in instances {
        if !seen.insert(instance.version) {
            return Err(Error::validation_for(
                name,
                format!("duplicate version {}", instance.version),
            ));
        }
    }
    Ok(())
}

/// Resolve the external model id for one requested instance: verify and
/// adopt an existing id, or publish the model text to the engine.
async fn resolve_model_id(
    service: &dyn PermissionService,
    instance: &AuthorizationModelRequestInstance,
    model_name: &str,
) -> Result<String> {
    if let Some(existing_id) = instance.adopted_authorization_model_id() {
        if !service.authorization_model_exists(existing_id).await? {
            return Err(Error::missing_prerequisite(format!(
                "authorization model with id {existing_id} does not exist"
            )));
        }
        debug!(
            model = %model_name,
            version = %instance.version,
            auth_model_id = %existing_id,
            "Adopted existing authorization model"
        );
        return Ok(existing_id.to_string());
    }

    let id = service
        .create_authorization_model(&instance.authorization_model)
        .await?;
    metrics::record_model_event(Location::OpenFga, ModelEvent::Created, model_name);
    info!(
        model = %model_name,
        version = %instance.version,
        auth_model_id = %id,
        "Created new authorization model in OpenFGA"
    );
    Ok(id)
}

/// Fetch the sibling AuthorizationModel, creating it on first reconcile.
async fn ensure_authorization_model(
    client: &Client,
    service: &dyn PermissionService,
    request: &AuthorizationModelRequest,
    name: &str,
    namespace: &str,
    reconcile_timestamp: DateTime<Utc>,
) -> Result<AuthorizationModel> {
    let models: Api<AuthorizationModel> = Api::namespaced(client.clone(), namespace);

    if let Some(model) = models.get_opt(name).await? {
        return Ok(model);
    }

    validate_instances(name, &request.spec.instances)?;

    let definitions = build_definitions(service, &request.spec.instances, name).await?;

    let mut model = AuthorizationModel::from_definitions(name, definitions, reconcile_timestamp);
    model.metadata.namespace = Some(namespace.to_string());
    model.metadata.owner_references = Some(vec![owner_reference(request)?]);

    let created = models.create(&PostParams::default(), &model).await?;
    metrics::record_model_event(Location::Kubernetes, ModelEvent::Created, name);
    info!(model = %name, namespace = %namespace, "Created authorization model in Kubernetes");

    Ok(created)
}

/// Resolve an external id for every requested instance, in request order
async fn build_definitions(
    service: &dyn PermissionService,
    instances: &[AuthorizationModelRequestInstance],
    model_name: &str,
) -> Result<Vec<AuthorizationModelDefinition>> {
    let mut definitions = Vec::with_capacity(instances.len());
    for instance in instances {
        let id = resolve_model_id(service, instance, model_name).await?;
        definitions.push(AuthorizationModelDefinition {
            id,
            authorization_model: instance.authorization_model.clone(),
            version: instance.version,
        });
    }
    Ok(definitions)
}

/// Reconcile the model's instance list to the request's version set: publish
/// missing versions, drop obsolete ones, and write the model only when
/// something changed.
async fn update_authorization_model(
    client: &Client,
    service: &dyn PermissionService,
    request: &AuthorizationModelRequest,
    model: &mut AuthorizationModel,
    namespace: &str,
    reconcile_timestamp: DateTime<Utc>,
) -> Result<()> {
    validate_instances(&model.name_any(), &request.spec.instances)?;

    let appended = append_missing_instances(service, request, model, reconcile_timestamp).await?;
    let pruned = remove_obsolete_instances(request, model);

    if appended == 0 && pruned == 0 {
        return Ok(());
    }

    let name = model.name_any();
    let models: Api<AuthorizationModel> = Api::namespaced(client.clone(), namespace);
    models.replace(&name, &PostParams::default(), model).await?;
    metrics::record_model_event(Location::Kubernetes, ModelEvent::Updated, &name);
    for _ in 0..pruned {
        metrics::record_model_event(Location::Kubernetes, ModelEvent::Deleted, &name);
    }
    info!(
        model = %name,
        namespace = %namespace,
        appended,
        pruned,
        "Updated authorization model in Kubernetes"
    );

    Ok(())
}

/// Publish versions the request declares but the model lacks, returning how
/// many instances were appended.
///
/// The diff is keyed on version alone: re-declaring an existing version with
/// different text does not rewrite the recorded instance.
async fn append_missing_instances(
    service: &dyn PermissionService,
    request: &AuthorizationModelRequest,
    model: &mut AuthorizationModel,
    reconcile_timestamp: DateTime<Utc>,
) -> Result<usize> {
    let model_name = model.name_any();
    let existing: HashSet<ModelVersion> =
        model.spec.instances.iter().map(|i| i.version).collect();

    let missing: Vec<&AuthorizationModelRequestInstance> = request
        .spec
        .instances
        .iter()
        .filter(|instance| !existing.contains(&instance.version))
        .collect();

    let appended = missing.len();
    for instance in missing {
        let id = resolve_model_id(service, instance, &model_name).await?;
        model.spec.instances.push(AuthorizationModelInstance {
            id,
            authorization_model: instance.authorization_model.clone(),
            version: instance.version,
            created_at: Some(reconcile_timestamp),
        });
    }

    Ok(appended)
}

/// Drop instances whose version the request no longer declares, returning
/// how many were removed
fn remove_obsolete_instances(
    request: &AuthorizationModelRequest,
    model: &mut AuthorizationModel,
) -> usize {
    let requested: HashSet<ModelVersion> =
        request.spec.instances.iter().map(|i| i.version).collect();

    let model_name = model.name_any();
    let before = model.spec.instances.len();
    model.spec.instances.retain(|instance| {
        let keep = requested.contains(&instance.version);
        if !keep {
            info!(
                model = %model_name,
                version = %instance.version,
                auth_model_id = %instance.id,
                "Removing obsolete model instance"
            );
        }
        keep
    });

    before - model.spec.instances.len()
}
