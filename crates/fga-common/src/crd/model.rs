//! AuthorizationModel CRD types
//!
//! The observed history resource: one instance per published model version,
//! each carrying the external id the engine returned. The binding loop
//! resolves a deployment to one of these instances through the
//! [`InstanceResolver`] trait.

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::OPENFGA_AUTH_MODEL_VERSION_LABEL;

use super::version::ModelVersion;

/// One published authorization model version
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationModelInstance {
    /// External id returned by the permission engine
    #[serde(default)]
    pub id: String,

    /// The authorization model source text this instance was published from
    #[serde(default)]
    pub authorization_model: String,

    /// Semantic version this instance is published under
    #[serde(default)]
    pub version: ModelVersion,

    /// When the operator recorded this instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A resolved model id paired with the version it publishes, before the
/// instance is stamped with a creation timestamp
#[derive(Clone, Debug, PartialEq)]
pub struct AuthorizationModelDefinition {
    /// External id returned by (or adopted from) the engine
    pub id: String,
    /// Authorization model source text
    pub authorization_model: String,
    /// Version the id publishes
    pub version: ModelVersion,
}

impl AuthorizationModelDefinition {
    /// Stamp the definition into an instance created at `now`
    pub fn into_instance(self, now: DateTime<Utc>) -> AuthorizationModelInstance {
        AuthorizationModelInstance {
            id: self.id,
            authorization_model: self.authorization_model,
            version: self.version,
            created_at: Some(now),
        }
    }
}

/// AuthorizationModel records every model version published for a store.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "extensions.fga-operator",
    version = "v1",
    kind = "AuthorizationModel",
    plural = "authorizationmodels",
    namespaced,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationModelSpec {
    /// Published instances, at most one per version
    #[serde(default)]
    pub instances: Vec<AuthorizationModelInstance>,
}

impl AuthorizationModel {
    /// Build a model resource holding `definitions`, all stamped `now`.
    ///
    /// The caller sets namespace and owner references before creating it.
    pub fn from_definitions(
        name: &str,
        definitions: Vec<AuthorizationModelDefinition>,
        now: DateTime<Utc>,
    ) -> Self {
        let instances = definitions
            .into_iter()
            .map(|d| d.into_instance(now))
            .collect();
        let mut model = AuthorizationModel::new(name, AuthorizationModelSpec { instances });
        model
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert("authorization-model".to_string(), name.to_string());
        model
    }
}

/// Sort instances descending by `(version, createdAt)`.
///
/// Higher versions first; among equal versions, the newer instance first.
/// A missing `createdAt` orders as oldest. The compound key keeps selection
/// deterministic even when adoption produced duplicate versions.
pub fn sort_by_version_and_created_at_desc(instances: &mut [AuthorizationModelInstance]) {
    instances.sort_by(|a, b| {
        b.version
            .cmp(&a.version)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

/// Instances matching `version` exactly
pub fn filter_by_version(
    instances: &[AuthorizationModelInstance],
    version: ModelVersion,
) -> Vec<AuthorizationModelInstance> {
    instances
        .iter()
        .filter(|i| i.version == version)
        .cloned()
        .collect()
}

/// Capability of resolving a deployment to the model instance it should bind
///
/// The binding reconciler depends only on this trait so tests can substitute
/// a mock for the full model resource.
pub trait InstanceResolver {
    /// Pick the instance a deployment binds to.
    ///
    /// A deployment labelled with a version gets the newest instance of that
    /// exact version; an unlabelled deployment gets the newest instance
    /// overall.
    fn instance_for_deployment(
        &self,
        deployment: &Deployment,
    ) -> Result<AuthorizationModelInstance, Error>;
}

impl InstanceResolver for AuthorizationModel {
    fn instance_for_deployment(
        &self,
        deployment: &Deployment,
    ) -> Result<AuthorizationModelInstance, Error> {
        if self.spec.instances.is_empty() {
            return Err(Error::resolution("no authorization model exists"));
        }

        let label = deployment
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(OPENFGA_AUTH_MODEL_VERSION_LABEL));

        let mut candidates = match label {
            Some(raw) => {
                let version: ModelVersion = raw.parse()?;
                let filtered = filter_by_version(&self.spec.instances, version);
                if filtered.is_empty() {
                    return Err(Error::resolution(format!(
                        "neither current or any latest models match version {raw}"
                    )));
                }
                filtered
            }
            None => self.spec.instances.clone(),
        };

        sort_by_version_and_created_at_desc(&mut candidates);
        Ok(candidates.remove(0))
    }
}
