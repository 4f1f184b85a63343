//! Common types for the FGA operator: CRDs, errors, events, and telemetry

#![deny(missing_docs)]

pub mod config;
pub mod crd;
pub mod error;
pub mod events;
pub mod metrics;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Environment variable for a deployment's OpenFGA store id
pub const OPENFGA_STORE_ID_ENV: &str = "OPENFGA_STORE_ID";

/// Environment variable for a deployment's OpenFGA authorization model id
pub const OPENFGA_AUTH_MODEL_ID_ENV: &str = "OPENFGA_AUTH_MODEL_ID";

/// Label selecting the store a deployment binds to (value is the store name)
pub const OPENFGA_STORE_LABEL: &str = "openfga-store";

/// Label pinning a deployment to a model version (value is `"M.m.p"`)
pub const OPENFGA_AUTH_MODEL_VERSION_LABEL: &str = "openfga-auth-model-version";

/// Annotation recording when the store id env var last changed
pub const OPENFGA_STORE_ID_UPDATED_AT_ANNOTATION: &str = "openfga-store-id-updated-at";

/// Annotation recording when the auth model id env var last changed
pub const OPENFGA_AUTH_ID_UPDATED_AT_ANNOTATION: &str = "openfga-auth-id-updated-at";
