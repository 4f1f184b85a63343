//! Deployment mutation planning
//!
//! Pure functions that compute the env-var and annotation changes for a batch
//! of deployments. The controller applies the resulting updates; nothing here
//! touches the API server. Planning runs in two passes — store id first, then
//! model id — batched so each deployment appears at most once in the update
//! set regardless of how many passes touched it.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::EnvVar;
use kube::ResourceExt;

use fga_common::crd::{InstanceResolver, Store};
use fga_common::{
    Error, OPENFGA_AUTH_ID_UPDATED_AT_ANNOTATION, OPENFGA_AUTH_MODEL_ID_ENV,
    OPENFGA_AUTH_MODEL_VERSION_LABEL, OPENFGA_STORE_ID_ENV, OPENFGA_STORE_ID_UPDATED_AT_ANNOTATION,
};

/// Identity of a deployment within the batch
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeploymentKey {
    /// Deployment namespace
    pub namespace: String,
    /// Deployment name
    pub name: String,
}

impl DeploymentKey {
    fn of(deployment: &Deployment) -> Self {
        Self {
            namespace: deployment.namespace().unwrap_or_default(),
            name: deployment.name_any(),
        }
    }
}

/// Deployments with pending changes, keyed so each is written once
pub type DeploymentUpdates = BTreeMap<DeploymentKey, Deployment>;

/// Format a mutation timestamp: RFC3339 in UTC with a `Z` suffix
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Ensure `name=value` is present on every container of the deployment.
///
/// Returns whether anything changed (a value was added or replaced).
pub fn upsert_env_var(deployment: &mut Deployment, name: &str, value: &str) -> bool {
    let Some(pod_spec) = deployment
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
    else {
        return false;
    };

    let mut updated = false;
    for container in &mut pod_spec.containers {
        let env = container.env.get_or_insert_with(Vec::new);
        match env.iter_mut().find(|var| var.name == name) {
            Some(existing) => {
                if existing.value.as_deref() != Some(value) {
                    existing.value = Some(value.to_string());
                    updated = true;
                }
            }
            None => {
                env.push(EnvVar {
                    name: name.to_string(),
                    value: Some(value.to_string()),
                    value_from: None,
                });
                updated = true;
            }
        }
    }
    updated
}

fn set_annotation(deployment: &mut Deployment, key: &str, value: String) {
    deployment
        .metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), value);
}

/// Store pass: stamp the store id env var on every deployment in the batch.
///
/// Deployments whose containers changed are collected into the update set
/// with the store-updated annotation stamped.
pub fn plan_store_id_updates(
    deployments: &[Deployment],
    store: &Store,
    now: DateTime<Utc>,
) -> DeploymentUpdates {
    let mut updates = DeploymentUpdates::new();
    for deployment in deployments {
        let mut candidate = deployment.clone();
        if upsert_env_var(&mut candidate, OPENFGA_STORE_ID_ENV, &store.spec.id) {
            set_annotation(
                &mut candidate,
                OPENFGA_STORE_ID_UPDATED_AT_ANNOTATION,
                format_timestamp(now),
            );
            updates.insert(DeploymentKey::of(deployment), candidate);
        }
    }
    updates
}

/// Model pass: resolve each deployment to its model instance and stamp the
/// model id env var, continuing from any pending store-pass update.
///
/// Deployments that fail to resolve (malformed version label, no matching
/// version) are returned for per-deployment events and skipped; they never
/// abort the batch.
pub fn plan_model_id_updates(
    deployments: &[Deployment],
    updates: &mut DeploymentUpdates,
    resolver: &dyn InstanceResolver,
    now: DateTime<Utc>,
) -> Vec<(Deployment, Error)> {
    let mut failures = Vec::new();

    for deployment in deployments {
        let instance = match resolver.instance_for_deployment(deployment) {
            Ok(instance) => instance,
            Err(err) => {
                failures.push((deployment.clone(), err));
                continue;
            }
        };

        let key = DeploymentKey::of(deployment);
        let mut candidate = updates
            .get(&key)
            .cloned()
            .unwrap_or_else(|| deployment.clone());

        if !upsert_env_var(&mut candidate, OPENFGA_AUTH_MODEL_ID_ENV, &instance.id) {
            continue;
        }

        set_annotation(
            &mut candidate,
            OPENFGA_AUTH_ID_UPDATED_AT_ANNOTATION,
            format_timestamp(now),
        );
        set_annotation(
            &mut candidate,
            OPENFGA_AUTH_MODEL_VERSION_LABEL,
            instance.version.to_string(),
        );
        updates.insert(key, candidate);
    }

    failures
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use fga_common::crd::{
        AuthorizationModel, AuthorizationModelInstance, AuthorizationModelSpec, ModelVersion,
        StoreSpec,
    };
    use fga_common::OPENFGA_STORE_LABEL;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn deployment(name: &str, labels: &[(&str, &str)], containers: usize) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: (0..containers)
                            .map(|i| Container {
                                name: format!("c{i}"),
                                ..Default::default()
                            })
                            .collect(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn store(id: &str) -> Store {
        Store::new(
            "documents",
            StoreSpec {
                id: id.to_string(),
                created_at: Some(now()),
            },
        )
    }

    fn instance(id: &str, version: (u32, u32, u32), ts: i64) -> AuthorizationModelInstance {
        AuthorizationModelInstance {
            id: id.to_string(),
            authorization_model: String::new(),
            version: ModelVersion::new(version.0, version.1, version.2),
            created_at: Some(Utc.timestamp_opt(ts, 0).unwrap()),
        }
    }

    fn model(instances: Vec<AuthorizationModelInstance>) -> AuthorizationModel {
        AuthorizationModel::new("documents", AuthorizationModelSpec { instances })
    }

    fn env_value(deployment: &Deployment, container: usize, name: &str) -> Option<String> {
        deployment.spec.as_ref()?.template.spec.as_ref()?.containers[container]
            .env
            .as_ref()?
            .iter()
            .find(|var| var.name == name)?
            .value
            .clone()
    }

    fn annotation(deployment: &Deployment, key: &str) -> Option<String> {
        deployment.metadata.annotations.as_ref()?.get(key).cloned()
    }

    #[test]
    fn timestamp_is_rfc3339_utc() {
        assert_eq!(format_timestamp(now()), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn upsert_adds_env_var_to_every_container() {
        let mut d = deployment("api", &[], 3);
        assert!(upsert_env_var(&mut d, OPENFGA_STORE_ID_ENV, "01STORE"));
        for i in 0..3 {
            assert_eq!(
                env_value(&d, i, OPENFGA_STORE_ID_ENV).as_deref(),
                Some("01STORE")
            );
        }
    }

    #[test]
    fn upsert_replaces_stale_value() {
        let mut d = deployment("api", &[], 1);
        assert!(upsert_env_var(&mut d, OPENFGA_STORE_ID_ENV, "old"));
        assert!(upsert_env_var(&mut d, OPENFGA_STORE_ID_ENV, "new"));
        assert_eq!(env_value(&d, 0, OPENFGA_STORE_ID_ENV).as_deref(), Some("new"));
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut d = deployment("api", &[], 2);
        assert!(upsert_env_var(&mut d, OPENFGA_STORE_ID_ENV, "01STORE"));
        assert!(!upsert_env_var(&mut d, OPENFGA_STORE_ID_ENV, "01STORE"));
    }

    #[test]
    fn store_pass_collects_only_changed_deployments() {
        let mut stamped = deployment("stamped", &[], 1);
        upsert_env_var(&mut stamped, OPENFGA_STORE_ID_ENV, "01STORE");
        let fresh = deployment("fresh", &[], 1);

        let updates = plan_store_id_updates(&[stamped, fresh], &store("01STORE"), now());
        assert_eq!(updates.len(), 1);
        let key = DeploymentKey {
            namespace: "default".to_string(),
            name: "fresh".to_string(),
        };
        let updated = &updates[&key];
        assert_eq!(
            env_value(updated, 0, OPENFGA_STORE_ID_ENV).as_deref(),
            Some("01STORE")
        );
        assert_eq!(
            annotation(updated, OPENFGA_STORE_ID_UPDATED_AT_ANNOTATION).as_deref(),
            Some("2023-11-14T22:13:20Z")
        );
    }

    #[test]
    fn binding_by_version_label() {
        let model = model(vec![
            instance("X", (1, 2, 3), 10),
            instance("Y", (0, 0, 1), 20),
        ]);
        let deployments = vec![deployment(
            "api",
            &[
                (OPENFGA_STORE_LABEL, "documents"),
                (OPENFGA_AUTH_MODEL_VERSION_LABEL, "0.0.1"),
            ],
            1,
        )];

        let mut updates = plan_store_id_updates(&deployments, &store("01STORE"), now());
        let failures = plan_model_id_updates(&deployments, &mut updates, &model, now());

        assert!(failures.is_empty());
        assert_eq!(updates.len(), 1);
        let updated = updates.values().next().unwrap();
        assert_eq!(
            env_value(updated, 0, OPENFGA_AUTH_MODEL_ID_ENV).as_deref(),
            Some("Y")
        );
        assert_eq!(
            env_value(updated, 0, OPENFGA_STORE_ID_ENV).as_deref(),
            Some("01STORE")
        );
        assert_eq!(
            annotation(updated, OPENFGA_AUTH_MODEL_VERSION_LABEL).as_deref(),
            Some("0.0.1")
        );
        assert_eq!(
            annotation(updated, OPENFGA_AUTH_ID_UPDATED_AT_ANNOTATION).as_deref(),
            Some("2023-11-14T22:13:20Z")
        );
    }

    #[test]
    fn binding_without_label_picks_latest() {
        let model = model(vec![
            instance("X", (1, 2, 3), 10),
            instance("Y", (0, 0, 1), 20),
        ]);
        let deployments = vec![deployment("api", &[(OPENFGA_STORE_LABEL, "documents")], 1)];

        let mut updates = plan_store_id_updates(&deployments, &store("01STORE"), now());
        let failures = plan_model_id_updates(&deployments, &mut updates, &model, now());

        assert!(failures.is_empty());
        let updated = updates.values().next().unwrap();
        assert_eq!(
            env_value(updated, 0, OPENFGA_AUTH_MODEL_ID_ENV).as_deref(),
            Some("X")
        );
        assert_eq!(
            annotation(updated, OPENFGA_AUTH_MODEL_VERSION_LABEL).as_deref(),
            Some("1.2.3")
        );
    }

    #[test]
    fn malformed_version_label_fails_only_that_deployment() {
        let model = model(vec![instance("X", (1, 2, 3), 10)]);
        let deployments = vec![
            deployment(
                "bad",
                &[(OPENFGA_AUTH_MODEL_VERSION_LABEL, "not-a-version")],
                1,
            ),
            deployment("good", &[], 1),
        ];

        let mut updates = plan_store_id_updates(&deployments, &store("01STORE"), now());
        let failures = plan_model_id_updates(&deployments, &mut updates, &model, now());

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0.name_any(), "bad");
        // the bad deployment keeps its store-pass update, the good one gets both
        assert_eq!(updates.len(), 2);
        let good_key = DeploymentKey {
            namespace: "default".to_string(),
            name: "good".to_string(),
        };
        assert_eq!(
            env_value(&updates[&good_key], 0, OPENFGA_AUTH_MODEL_ID_ENV).as_deref(),
            Some("X")
        );
    }

    #[test]
    fn second_pass_plans_no_updates() {
        let model = model(vec![instance("X", (1, 2, 3), 10)]);
        let deployments = vec![deployment("api", &[], 2)];

        let mut updates = plan_store_id_updates(&deployments, &store("01STORE"), now());
        plan_model_id_updates(&deployments, &mut updates, &model, now());
        let first_pass: Vec<Deployment> = updates.into_values().collect();

        let mut second = plan_store_id_updates(&first_pass, &store("01STORE"), now());
        let failures = plan_model_id_updates(&first_pass, &mut second, &model, now());

        assert!(failures.is_empty());
        assert!(second.is_empty());
    }

    #[test]
    fn model_pass_consults_the_resolver_per_deployment() {
        mockall::mock! {
            Resolver {}
            impl InstanceResolver for Resolver {
                fn instance_for_deployment(
                    &self,
                    deployment: &Deployment,
                ) -> Result<AuthorizationModelInstance, Error>;
            }
        }

        let mut resolver = MockResolver::new();
        resolver
            .expect_instance_for_deployment()
            .times(2)
            .returning(|deployment| {
                if deployment.name_any() == "broken" {
                    Err(Error::resolution("no authorization model exists"))
                } else {
                    Ok(instance("X", (1, 0, 0), 10))
                }
            });

        let deployments = vec![deployment("broken", &[], 1), deployment("api", &[], 1)];
        let mut updates = DeploymentUpdates::new();
        let failures = plan_model_id_updates(&deployments, &mut updates, &resolver, now());

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0.name_any(), "broken");
        assert_eq!(updates.len(), 1);
    }

    #[test]
    fn model_pass_annotates_without_prior_store_change() {
        // store id already correct, model id stale: only the model pass runs
        let model = model(vec![instance("NEW", (1, 0, 0), 10)]);
        let mut d = deployment("api", &[], 1);
        upsert_env_var(&mut d, OPENFGA_STORE_ID_ENV, "01STORE");
        upsert_env_var(&mut d, OPENFGA_AUTH_MODEL_ID_ENV, "OLD");
        let deployments = vec![d];

        let mut updates = plan_store_id_updates(&deployments, &store("01STORE"), now());
        assert!(updates.is_empty());
        let failures = plan_model_id_updates(&deployments, &mut updates, &model, now());

        assert!(failures.is_empty());
        assert_eq!(updates.len(), 1);
        let updated = updates.values().next().unwrap();
        assert_eq!(
            env_value(updated, 0, OPENFGA_AUTH_MODEL_ID_ENV).as_deref(),
            Some("NEW")
        );
        assert!(annotation(updated, OPENFGA_AUTH_ID_UPDATED_AT_ANNOTATION).is_some());
        assert!(annotation(updated, OPENFGA_STORE_ID_UPDATED_AT_ANNOTATION).is_none());
    }
}
