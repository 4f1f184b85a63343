//! Metrics for FGA operator observability
//!
//! Counters track where each entity landed (`kubernetes` for CRD writes,
//! `open_fga` for engine calls) so drift between the two sides is visible.

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::KeyValue;

/// Global meter for operator metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("fga-operator"));

/// Counter of authorization model events
///
/// Labels:
/// - `location`: kubernetes, open_fga
/// - `event`: created, updated, deleted
/// - `model`: authorization model name
pub static AUTHORIZATION_MODEL_EVENTS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("authorization_model_events_total")
        .with_description("Total number of authorization models created, updated or deleted")
        .with_unit("{models}")
        .build()
});

/// Counter of stores created
///
/// Labels:
/// - `location`: kubernetes, open_fga
/// - `model`: authorization model name
pub static STORES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("stores_total")
        .with_description("Total number of stores created")
        .with_unit("{stores}")
        .build()
});

/// Counter of deployment updates
///
/// Labels:
/// - `deployment`: deployment name
/// - `model`: authorization model name
pub static DEPLOYMENT_UPDATES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("deployment_updated_total")
        .with_description("Total number of deployments updated")
        .with_unit("{deployments}")
        .build()
});

/// Where an entity was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Persisted as a CRD in Kubernetes
    Kubernetes,
    /// Created in the permission engine
    OpenFga,
}

impl Location {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kubernetes => "kubernetes",
            Self::OpenFga => "open_fga",
        }
    }
}

/// Lifecycle event on an authorization model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelEvent {
    /// Model resource or engine model created
    Created,
    /// Model resource updated
    Updated,
    /// Model resource deleted
    Deleted,
}

impl ModelEvent {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// Record an authorization model event
pub fn record_model_event(location: Location, event: ModelEvent, model: &str) {
    AUTHORIZATION_MODEL_EVENTS.add(
        1,
        &[
            KeyValue::new("location", location.as_str()),
            KeyValue::new("event", event.as_str()),
            KeyValue::new("model", model.to_string()),
        ],
    );
}

/// Record a store creation
pub fn record_store_created(location: Location, model: &str) {
    STORES.add(
        1,
        &[
            KeyValue::new("location", location.as_str()),
            KeyValue::new("model", model.to_string()),
        ],
    );
}

/// Record a deployment update
pub fn record_deployment_updated(deployment: &str, model: &str) {
    DEPLOYMENT_UPDATES.add(
        1,
        &[
            KeyValue::new("deployment", deployment.to_string()),
            KeyValue::new("model", model.to_string()),
        ],
    );
}
