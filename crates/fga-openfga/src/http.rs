//! OpenFGA HTTP client
//!
//! Thin client over the OpenFGA REST API. Store scans and model-existence
//! scans paginate 10 items per page and follow the continuation token until
//! the engine stops returning one.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use fga_common::{Error, Result};

use crate::{Config, PermissionService, StoreRecord};

/// Items fetched per page when scanning stores or models
const PAGE_SIZE: u32 = 10;

/// Request timeout for every engine call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Production [`PermissionService`] backed by the OpenFGA REST API
pub struct OpenFgaHttpService {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    store_id: Mutex<Option<String>>,
}

impl OpenFgaHttpService {
    /// Build a client bound to the given credentials
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::service("getService", format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            store_id: Mutex::new(None),
        })
    }

    fn current_store_id(&self) -> Result<String> {
        self.store_id
            .lock()
            .expect("store id lock poisoned")
            .clone()
            .ok_or_else(|| Error::internal("openfga", "no store id set on permission service"))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::service(operation, e.to_string()))?;
        decode(operation, response).await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_token)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::service(operation, e.to_string()))?;
        decode(operation, response).await
    }

    /// Scan all stores for one matching `name` or `id` (whichever is set)
    async fn scan_stores(
        &self,
        name: Option<&str>,
        id: Option<&str>,
    ) -> Result<Option<StoreRecord>> {
        let url = format!("{}/stores", self.base_url);
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query = vec![("page_size", PAGE_SIZE.to_string())];
            if let Some(token) = &continuation_token {
                query.push(("continuation_token", token.clone()));
            }

            let page: ListStoresResponse = self.get_json("findStore", &url, &query).await?;

            for store in page.stores {
                let name_matches = name.is_some_and(|n| store.name == n);
                let id_matches = id.is_some_and(|i| store.id == i);
                if name_matches || id_matches {
                    return Ok(Some(store.into()));
                }
            }

            match page.continuation_token.filter(|t| !t.is_empty()) {
                Some(token) => continuation_token = Some(token),
                None => return Ok(None),
            }
        }
    }
}

/// Decode a response, surfacing the engine's message on non-success codes
async fn decode<T: serde::de::DeserializeOwned>(
    operation: &str,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::service(operation, format!("{status}: {body}")));
    }
    response
        .json()
        .await
        .map_err(|e| Error::service(operation, format!("invalid response: {e}")))
}

#[async_trait]
impl PermissionService for OpenFgaHttpService {
    fn set_store_id(&self, store_id: &str) {
        *self.store_id.lock().expect("store id lock poisoned") = Some(store_id.to_string());
    }

    async fn create_store(&self, name: &str) -> Result<StoreRecord> {
        let url = format!("{}/stores", self.base_url);
        let store: ApiStore = self
            .post_json("createStore", &url, &serde_json::json!({ "name": name }))
            .await?;
        info!(store = %store.name, store_id = %store.id, "Created store in OpenFGA");
        Ok(store.into())
    }

    async fn find_store_by_name(&self, name: &str) -> Result<Option<StoreRecord>> {
        self.scan_stores(Some(name), None).await
    }

    async fn find_store_by_id(&self, id: &str) -> Result<Option<StoreRecord>> {
        self.scan_stores(None, Some(id)).await
    }

    async fn create_authorization_model(&self, authorization_model: &str) -> Result<String> {
        let store_id = self.current_store_id()?;
        let url = format!("{}/stores/{}/authorization-models", self.base_url, store_id);

        // The model text is the write body; the engine validates it.
        let body: serde_json::Value = serde_json::from_str(authorization_model)
            .map_err(|e| Error::service("createAuthorizationModel", format!("invalid model: {e}")))?;

        let response: WriteAuthorizationModelResponse = self
            .post_json("createAuthorizationModel", &url, &body)
            .await?;
        info!(
            store_id = %store_id,
            auth_model_id = %response.authorization_model_id,
            "Created authorization model in OpenFGA"
        );
        Ok(response.authorization_model_id)
    }

    async fn authorization_model_exists(&self, authorization_model_id: &str) -> Result<bool> {
        let store_id = self.current_store_id()?;
        let url = format!("{}/stores/{}/authorization-models", self.base_url, store_id);
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query = vec![("page_size", PAGE_SIZE.to_string())];
            if let Some(token) = &continuation_token {
                query.push(("continuation_token", token.clone()));
            }

            let page: ListAuthorizationModelsResponse = self
                .get_json("authorizationModelExists", &url, &query)
                .await?;

            if page
                .authorization_models
                .iter()
                .any(|m| m.id == authorization_model_id)
            {
                return Ok(true);
            }

            match page.continuation_token.filter(|t| !t.is_empty()) {
                Some(token) => continuation_token = Some(token),
                None => {
                    debug!(
                        auth_model_id = %authorization_model_id,
                        "Authorization model not found in OpenFGA"
                    );
                    return Ok(false);
                }
            }
        }
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiStore {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<ApiStore> for StoreRecord {
    fn from(store: ApiStore) -> Self {
        Self {
            id: store.id,
            name: store.name,
            created_at: store.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListStoresResponse {
    #[serde(default)]
    stores: Vec<ApiStore>,
    #[serde(default)]
    continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WriteAuthorizationModelResponse {
    authorization_model_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiAuthorizationModel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ListAuthorizationModelsResponse {
    #[serde(default)]
    authorization_models: Vec<ApiAuthorizationModel>,
    #[serde(default)]
    continuation_token: Option<String>,
}
