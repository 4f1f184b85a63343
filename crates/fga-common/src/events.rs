//! Kubernetes Event recording for the FGA controllers.
//!
//! Provides a trait-based abstraction over `kube::runtime::events::Recorder`
//! so that controllers can emit standard Kubernetes Events visible via
//! `kubectl describe` and `kubectl get events`.
//!
//! Events are **fire-and-forget**: failures are logged as warnings and never
//! propagate errors. A failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Trait for publishing Kubernetes Events.
///
/// Implementations are expected to be fire-and-forget: `publish()` logs a
/// warning on failure but never returns an error.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a Kubernetes Event on the given resource.
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );

    /// Publish a Warning event, the shape every failure reason uses
    async fn warn(&self, resource_ref: &ObjectReference, reason: &str, action: &str, note: String) {
        self.publish(resource_ref, EventType::Warning, reason, action, Some(note))
            .await;
    }
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a new publisher for the given controller name.
    ///
    /// The controller name appears as the "reportingComponent" on Events
    /// (e.g. "authorization-model-request-controller").
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// No-op implementation for tests: all calls are silently ignored.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Well-known event reason strings.
///
/// These appear in `kubectl get events` under the REASON column.
pub mod reasons {
    // Request loop
    /// The permission-service client could not be constructed
    pub const CLIENT_INITIALIZATION_FAILED: &str = "ClientInitializationFailed";
    /// Store lookup, adoption, or creation failed
    pub const STORE_FAILED: &str = "StoreFailed";
    /// Publishing or recording a model version failed while creating the model
    pub const AUTHORIZATION_MODEL_CREATION_FAILED: &str = "AuthorizationModelCreationFailed";
    /// Publishing or pruning model versions failed while updating the model
    pub const AUTHORIZATION_MODEL_UPDATE_FAILED: &str = "AuthorizationModelUpdateFailed";
    /// A request status write failed
    pub const AUTHORIZATION_MODEL_STATUS_CHANGE_FAILED: &str =
        "AuthorizationModelStatusChangeFailed";

    // Binding loop
    /// The sibling Store resource was not found
    pub const STORE_NOT_FOUND: &str = "StoreNotFound";
    /// The AuthorizationModel resource was not found
    pub const AUTHORIZATION_MODEL_NOT_FOUND: &str = "AuthorizationModelNotFound";
    /// A deployment could not be resolved to a model instance
    pub const AUTHORIZATION_MODEL_ID_UPDATE_FAILED: &str = "AuthorizationModelIdUpdateFailed";
    /// Listing labelled deployments failed
    pub const FAILED_LISTING_DEPLOYMENTS: &str = "FailedListingDeployments";
    /// Writing an updated deployment failed
    pub const FAILED_UPDATING_DEPLOYMENT: &str = "FailedUpdatingDeployment";
}

/// Well-known event action strings.
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Synchronizing a request against the permission engine
    pub const SYNCHRONIZE: &str = "Synchronize";
    /// Binding deployments to store and model ids
    pub const BIND: &str = "Bind";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
    }

    #[test]
    fn reason_constants_match_event_contract() {
        assert_eq!(
            reasons::CLIENT_INITIALIZATION_FAILED,
            "ClientInitializationFailed"
        );
        assert_eq!(reasons::STORE_FAILED, "StoreFailed");
        assert_eq!(
            reasons::AUTHORIZATION_MODEL_STATUS_CHANGE_FAILED,
            "AuthorizationModelStatusChangeFailed"
        );
        assert_eq!(reasons::FAILED_UPDATING_DEPLOYMENT, "FailedUpdatingDeployment");
    }

    #[tokio::test]
    async fn noop_publisher_does_not_panic() {
        let publisher = NoopEventPublisher;
        let obj_ref = ObjectReference::default();
        publisher
            .warn(
                &obj_ref,
                reasons::STORE_FAILED,
                actions::SYNCHRONIZE,
                "store with id 01ABC does not exist".to_string(),
            )
            .await;
    }
}
