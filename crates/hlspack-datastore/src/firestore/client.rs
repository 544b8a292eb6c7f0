//! Firestore REST implementation of the [`Datastore`] trait.
//!
//! Uses `documents:commit` for atomic conditional batches; read operations
//! carry a short-fused transient retry, commits do not (task-level retry
//! owns that path).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, StatusCode};
use tracing::{info_span, Instrument};

use crate::datastore::{Datastore, Doc, Precondition, WriteOp};
use crate::error::{StoreError, StoreResult};
use crate::firestore::retry::{with_retry, RetryConfig};
use crate::firestore::token_cache::TokenCache;
use crate::firestore::wire;
use crate::metrics::record_request;

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration for reads
    pub retry: RetryConfig,
}

impl FirestoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID").map_err(|_| {
            StoreError::auth_error("GCP_PROJECT_ID must be set to access Firestore")
        })?;
        if project_id.is_empty() {
            return Err(StoreError::auth_error("GCP_PROJECT_ID cannot be empty"));
        }

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
        })
    }
}

/// Firestore REST datastore.
pub struct FirestoreDatastore {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    token_cache: Arc<TokenCache>,
}

impl Clone for FirestoreDatastore {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            config: self.config.clone(),
            base_url: self.base_url.clone(),
            token_cache: Arc::clone(&self.token_cache),
        }
    }
}

impl FirestoreDatastore {
    /// Create a new Firestore datastore.
    pub async fn new(config: FirestoreConfig) -> StoreResult<Self> {
        let auth = Self::create_auth_provider()?;

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("hlspack-datastore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(StoreError::Network)?;

        let base_url = format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/{}/documents",
            config.project_id, config.database_id
        );

        Ok(Self {
            http,
            config,
            base_url,
            token_cache: Arc::new(TokenCache::new(auth)),
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StoreResult<Self> {
        Self::new(FirestoreConfig::from_env()?).await
    }

    fn create_auth_provider() -> StoreResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env()
            .map_err(|e| StoreError::auth_error(format!("Failed to load service account: {e}")))?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(StoreError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    fn document_path(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, doc_id)
    }

    /// Full resource name used inside commit requests.
    fn full_document_name(&self, collection: &str, doc_id: &str) -> String {
        format!(
            "projects/{}/databases/{}/documents/{}/{}",
            self.config.project_id, self.config.database_id, collection, doc_id
        )
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    /// Send a request, re-authenticating once if the server reports an
    /// expired access token.
    async fn send_authed<B>(&self, build: B) -> StoreResult<reqwest::Response>
    where
        B: Fn(&str) -> reqwest::RequestBuilder,
    {
        let token = self.token_cache.get_token().await?;
        let response = build(&token).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if Self::is_access_token_expired(&body) {
                self.token_cache.invalidate().await;
                let token = self.token_cache.get_token().await?;
                return Ok(build(&token).send().await?);
            }
            return Err(StoreError::from_http_status(status.as_u16(), body));
        }

        Ok(response)
    }

    /// Execute a request with tracing and metrics.
    async fn execute_request<T, F>(&self, operation: &str, collection: &str, fut: F) -> StoreResult<T>
    where
        F: std::future::Future<Output = StoreResult<T>>,
    {
        let span = info_span!("datastore_request", operation = %operation, collection = %collection);

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn handle_error_response(url: &str, response: reqwest::Response) -> StoreError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        // Commit surfaces failed write preconditions as 400 FAILED_PRECONDITION.
        if body.contains("FAILED_PRECONDITION") {
            return StoreError::precondition_failed(format!("{url} failed: {body}"));
        }
        StoreError::from_http_status(status.as_u16(), format!("{url} failed: {body}"))
    }

    fn to_wire_write(&self, op: &WriteOp) -> StoreResult<wire::Write> {
        let precondition = |p: &Precondition| match p {
            Precondition::None => None,
            Precondition::Exists(exists) => Some(wire::Precondition {
                exists: Some(*exists),
                update_time: None,
            }),
            Precondition::Version(ts) => Some(wire::Precondition {
                exists: None,
                update_time: Some(ts.clone()),
            }),
        };

        Ok(match op {
            WriteOp::Put {
                collection,
                doc_id,
                data,
                precondition: p,
            } => wire::Write {
                update: Some(wire::Document {
                    name: Some(self.full_document_name(collection, doc_id)),
                    fields: Some(wire::json_to_fields(data)?),
                    create_time: None,
                    update_time: None,
                }),
                delete: None,
                current_document: precondition(p),
            },
            WriteOp::Delete {
                collection,
                doc_id,
                precondition: p,
            } => wire::Write {
                update: None,
                delete: Some(self.full_document_name(collection, doc_id)),
                current_document: precondition(p),
            },
        })
    }

    fn doc_from_wire(doc: &wire::Document) -> StoreResult<Doc> {
        Ok(Doc {
            id: doc
                .doc_id()
                .ok_or_else(|| StoreError::invalid_response("document without a name"))?
                .to_string(),
            data: wire::fields_to_json(doc.fields.as_ref())?,
            version: doc
                .update_time
                .clone()
                .ok_or_else(|| StoreError::invalid_response("document without updateTime"))?,
        })
    }
}

#[async_trait]
impl Datastore for FirestoreDatastore {
    async fn get(&self, collection: &str, doc_id: &str) -> StoreResult<Option<Doc>> {
        let url = self.document_path(collection, doc_id);

        self.execute_request("get", collection, async {
            with_retry(&self.config.retry, "get", || async {
                let response = self
                    .send_authed(|token| self.http.get(&url).bearer_auth(token))
                    .await?;

                match response.status() {
                    StatusCode::OK => {
                        let doc: wire::Document = response.json().await?;
                        Ok(Some(Self::doc_from_wire(&doc)?))
                    }
                    StatusCode::NOT_FOUND => Ok(None),
                    _ => Err(Self::handle_error_response(&url, response).await),
                }
            })
            .await
        })
        .await
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<Doc>> {
        self.execute_request("list", collection, async {
            let mut docs = Vec::new();
            let mut page_token: Option<String> = None;

            loop {
                let mut url = format!("{}/{}?pageSize=300", self.base_url, collection);
                if let Some(token) = &page_token {
                    url = format!("{}&pageToken={}", url, token);
                }

                let page: wire::ListDocumentsResponse =
                    with_retry(&self.config.retry, "list", || async {
                        let response = self
                            .send_authed(|token| self.http.get(&url).bearer_auth(token))
                            .await?;

                        match response.status() {
                            StatusCode::OK => Ok(response.json().await?),
                            _ => Err(Self::handle_error_response(&url, response).await),
                        }
                    })
                    .await?;

                for doc in page.documents.iter().flatten() {
                    docs.push(Self::doc_from_wire(doc)?);
                }

                match page.next_page_token {
                    Some(token) if !token.is_empty() => page_token = Some(token),
                    _ => break,
                }
            }

            Ok(docs)
        })
        .await
    }

    async fn batch_write(&self, writes: Vec<WriteOp>) -> StoreResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        if writes.len() > 500 {
            return Err(StoreError::request_failed(
                "Commit exceeds 500 write limit",
            ));
        }

        let url = format!("{}:commit", self.base_url);
        let request = wire::CommitRequest {
            writes: writes
                .iter()
                .map(|w| self.to_wire_write(w))
                .collect::<StoreResult<Vec<_>>>()?,
        };

        self.execute_request("commit", "batch", async {
            let response = self
                .send_authed(|token| self.http.post(&url).bearer_auth(token).json(&request))
                .await?;

            match response.status() {
                StatusCode::OK => Ok(()),
                _ => Err(Self::handle_error_response(&url, response).await),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn config_from_env_requires_project_id() {
        std::env::remove_var("GCP_PROJECT_ID");
        assert!(FirestoreConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn config_default_values() {
        std::env::set_var("GCP_PROJECT_ID", "test-project");
        std::env::remove_var("FIRESTORE_CONNECT_TIMEOUT_SECS");
        let config = FirestoreConfig::from_env().unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.database_id, "(default)");
        std::env::remove_var("GCP_PROJECT_ID");
    }
}
