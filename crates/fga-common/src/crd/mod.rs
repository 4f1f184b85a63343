//! Custom Resource Definitions for the FGA operator
//!
//! Three sibling kinds share a reconcile key (name + namespace):
//! `AuthorizationModelRequest` (desired state), `Store` (external store
//! identity), and `AuthorizationModel` (published version history).

mod model;
mod request;
mod store;
mod version;

pub use model::{
    filter_by_version, sort_by_version_and_created_at_desc, AuthorizationModel,
    AuthorizationModelDefinition, AuthorizationModelInstance, AuthorizationModelSpec,
    InstanceResolver,
};
pub use request::{
    AuthorizationModelRequest, AuthorizationModelRequestInstance, AuthorizationModelRequestSpec,
    AuthorizationModelRequestState, AuthorizationModelRequestStatus,
};
pub use store::{Store, StoreSpec};
pub use version::{ModelVersion, ParseVersionError};
