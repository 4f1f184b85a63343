//! Permission engine client for the FGA operator
//!
//! The controllers never talk to OpenFGA directly: everything goes through
//! the [`PermissionService`] trait, and the factory that produces services is
//! injected into the Request reconciler. Production wires the HTTP client in
//! [`http`]; tests wire a mock.

#![deny(missing_docs)]

pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use fga_common::{Error, Result};

pub use http::OpenFgaHttpService;

/// Environment variable holding the engine base URL
pub const OPENFGA_API_URL_ENV: &str = "OPENFGA_API_URL";

/// Environment variable holding the engine bearer token
pub const OPENFGA_API_TOKEN_ENV: &str = "OPENFGA_API_TOKEN";

/// Credentials for the permission engine
#[derive(Clone, Debug)]
pub struct Config {
    /// Engine base URL, e.g. "http://openfga.openfga-system:8080"
    pub api_url: String,
    /// Bearer credential presented on every request
    pub api_token: String,
}

impl Config {
    /// Read credentials from the environment.
    ///
    /// Both variables are required; the operator refuses to start without
    /// them.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_url: require_env(OPENFGA_API_URL_ENV)?,
            api_token: require_env(OPENFGA_API_TOKEN_ENV)?,
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::internal(
            "config",
            format!("environment variable {name} not found"),
        )),
    }
}

/// A store as the engine reports it
#[derive(Clone, Debug, PartialEq)]
pub struct StoreRecord {
    /// External store id
    pub id: String,
    /// Store name
    pub name: String,
    /// When the engine created the store
    pub created_at: DateTime<Utc>,
}

/// Abstract contract with the permission engine.
///
/// One service instance is bound to one reconcile pass: the store id set via
/// [`PermissionService::set_store_id`] scopes every subsequent model call and
/// must not be shared across reconcile keys.
#[async_trait]
pub trait PermissionService: Send + Sync {
    /// Scope subsequent model operations to the given store
    fn set_store_id(&self, store_id: &str);

    /// Create a store with the given name
    async fn create_store(&self, name: &str) -> Result<StoreRecord>;

    /// Find a store by name, scanning pages of 10
    async fn find_store_by_name(&self, name: &str) -> Result<Option<StoreRecord>>;

    /// Find a store by id, scanning pages of 10
    async fn find_store_by_id(&self, id: &str) -> Result<Option<StoreRecord>>;

    /// Publish an authorization model in the current store, returning the
    /// id the engine assigned
    async fn create_authorization_model(&self, authorization_model: &str) -> Result<String>;

    /// Whether a model with the given id exists in the current store,
    /// scanning pages of 10
    async fn authorization_model_exists(&self, authorization_model_id: &str) -> Result<bool>;
}

/// Factory producing a [`PermissionService`] bound to the given credentials.
///
/// Injected into the Request reconciler so tests can substitute a mock
/// service without touching the engine.
pub trait PermissionServiceFactory: Send + Sync {
    /// Construct a service for the given credentials
    fn get_service(&self, config: &Config) -> Result<Box<dyn PermissionService>>;
}

/// Production factory wiring the OpenFGA HTTP client
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenFgaServiceFactory;

impl PermissionServiceFactory for OpenFgaServiceFactory {
    fn get_service(&self, config: &Config) -> Result<Box<dyn PermissionService>> {
        Ok(Box::new(OpenFgaHttpService::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_env_var_is_reported_by_name() {
        let err = require_env("FGA_TEST_UNSET_VARIABLE").unwrap_err();
        assert!(err
            .to_string()
            .contains("environment variable FGA_TEST_UNSET_VARIABLE not found"));
    }

    #[test]
    fn factory_builds_a_service() {
        let config = Config {
            api_url: "http://localhost:8080".to_string(),
            api_token: "token".to_string(),
        };
        assert!(OpenFgaServiceFactory.get_service(&config).is_ok());
    }
}
