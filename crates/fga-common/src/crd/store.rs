//! Store CRD types
//!
//! Records the external store identity for a reconcile key. Created by the
//! Request loop as a child of the AuthorizationModelRequest and read by the
//! binding loop when stamping deployments.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Store identifies a store in the permission engine.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "extensions.fga-operator",
    version = "v1",
    kind = "Store",
    plural = "stores",
    namespaced,
    printcolumn = r#"{"name":"StoreID","type":"string","jsonPath":".spec.id"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct StoreSpec {
    /// External store id assigned by the engine
    #[serde(default)]
    pub id: String,

    /// When the engine created the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Store {
    /// Build a store resource for the given external identity.
    ///
    /// The caller sets namespace and owner references before creating it.
    pub fn from_external(name: &str, id: &str, created_at: DateTime<Utc>) -> Self {
        let mut store = Store::new(
            name,
            StoreSpec {
                id: id.to_string(),
                created_at: Some(created_at),
            },
        );
        store
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert("store".to_string(), name.to_string());
        store
    }
}
