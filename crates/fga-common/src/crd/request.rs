//! AuthorizationModelRequest CRD types
//!
//! The desired-state resource: it enumerates the model versions a tenant
//! wants published, and optionally adopts a pre-existing store or model ids
//! when migrating infrastructure the operator did not create.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::version::ModelVersion;

/// State of an AuthorizationModelRequest as it moves through reconciliation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum AuthorizationModelRequestState {
    /// Created but not yet processed
    #[default]
    Pending,
    /// A reconcile pass is actively synchronizing the request
    Synchronizing,
    /// The request was processed successfully and is stable
    Synchronized,
    /// The last reconcile pass failed; see events for the reason
    SynchronizationFailed,
}

/// One requested model version
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationModelRequestInstance {
    /// Id of an existing authorization model to adopt for this version
    /// instead of publishing a new one. Only applicable when migrating from
    /// infrastructure where the operator was not previously used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_authorization_model_id: Option<String>,

    /// Authorization model source text, passed to the engine verbatim
    #[serde(default)]
    pub authorization_model: String,

    /// Semantic version this instance publishes under
    #[serde(default)]
    pub version: ModelVersion,
}

/// AuthorizationModelRequest declares the store and model versions a tenant
/// wants available in the permission engine.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "extensions.fga-operator",
    version = "v1",
    kind = "AuthorizationModelRequest",
    plural = "authorizationmodelrequests",
    namespaced,
    status = "AuthorizationModelRequestStatus",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationModelRequestSpec {
    /// Id of an existing store in the engine to adopt instead of creating
    /// one. Only applicable when migrating from infrastructure where the
    /// operator was not previously used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_store_id: Option<String>,

    /// Requested model versions; versions must be unique within a request
    #[serde(default)]
    pub instances: Vec<AuthorizationModelRequestInstance>,
}

/// Observed state of an AuthorizationModelRequest
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationModelRequestStatus {
    /// Current synchronization state
    #[serde(default)]
    pub state: AuthorizationModelRequestState,

    /// Spec generation last observed by a successful reconcile; used to
    /// suppress re-runs triggered by status-only watch events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl AuthorizationModelRequestSpec {
    /// Store id to adopt, treating an empty string as unset
    pub fn adopted_store_id(&self) -> Option<&str> {
        self.existing_store_id.as_deref().filter(|id| !id.is_empty())
    }
}

impl AuthorizationModelRequestInstance {
    /// Model id to adopt, treating an empty string as unset
    pub fn adopted_authorization_model_id(&self) -> Option<&str> {
        self.existing_authorization_model_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_pending() {
        assert_eq!(
            AuthorizationModelRequestState::default(),
            AuthorizationModelRequestState::Pending
        );
    }

    #[test]
    fn state_serializes_as_plain_name() {
        let json = serde_json::to_string(&AuthorizationModelRequestState::SynchronizationFailed)
            .unwrap();
        assert_eq!(json, "\"SynchronizationFailed\"");
    }

    #[test]
    fn spec_uses_camel_case_field_names() {
        let spec = AuthorizationModelRequestSpec {
            existing_store_id: Some("01ABC".into()),
            instances: vec![AuthorizationModelRequestInstance {
                existing_authorization_model_id: Some("01DEF".into()),
                authorization_model: "model".into(),
                version: ModelVersion::new(1, 2, 3),
            }],
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["existingStoreId"], "01ABC");
        assert_eq!(json["instances"][0]["existingAuthorizationModelId"], "01DEF");
        assert_eq!(json["instances"][0]["authorizationModel"], "model");
        assert_eq!(json["instances"][0]["version"]["major"], 1);
    }

    #[test]
    fn empty_adoption_ids_are_treated_as_unset() {
        let spec = AuthorizationModelRequestSpec {
            existing_store_id: Some(String::new()),
            instances: vec![AuthorizationModelRequestInstance::default()],
        };
        assert_eq!(spec.adopted_store_id(), None);
        assert_eq!(spec.instances[0].adopted_authorization_model_id(), None);
    }
}
