//! Downstream publisher: the "publish container" RPC invoked once per
//! syncing stage.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use hlspack_models::PublishContainerRequest;

use crate::error::{EngineError, EngineResult};
use crate::retry::{retry_async, RetryConfig};

/// Seam for the downstream catalog RPC.
#[async_trait]
pub trait ContainerPublisher: Send + Sync {
    async fn publish(&self, request: &PublishContainerRequest) -> EngineResult<()>;
}

/// HTTP implementation posting the publish payload as JSON.
pub struct HttpPublisher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPublisher {
    pub fn new(endpoint: impl Into<String>) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Create from the `PUBLISH_ENDPOINT_URL` environment variable.
    pub fn from_env() -> EngineResult<Self> {
        let endpoint = std::env::var("PUBLISH_ENDPOINT_URL")
            .map_err(|_| EngineError::config_error("PUBLISH_ENDPOINT_URL not set"))?;
        Self::new(endpoint)
    }

    async fn post(&self, request: &PublishContainerRequest) -> EngineResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(EngineError::publish_failed(format!(
            "publish returned {status}: {body}"
        )))
    }
}

#[async_trait]
impl ContainerPublisher for HttpPublisher {
    async fn publish(&self, request: &PublishContainerRequest) -> EngineResult<()> {
        let config = RetryConfig::new("publish_container").with_max_retries(2);
        retry_async(
            &config,
            |e: &EngineError| matches!(e, EngineError::Http(_)),
            || self.post(request),
        )
        .await?;

        info!(
            container_id = %request.container_id,
            version = request.version,
            "Published container downstream"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlspack_models::{ContainerId, PublishedTrack};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> PublishContainerRequest {
        PublishContainerRequest {
            container_id: ContainerId::from_string("c1"),
            version: 3,
            r2_root_dirname: "root".to_string(),
            master_playlist_filename: "master-x.m3u8".to_string(),
            duration_sec: 42.0,
            resolution: "1920x1080".to_string(),
            audio_tracks: vec![PublishedTrack {
                name: "English".to_string(),
                is_default: true,
            }],
            subtitle_tracks: vec![],
        }
    }

    #[tokio::test]
    async fn posts_payload_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/publish"))
            .and(body_partial_json(serde_json::json!({
                "container_id": "c1",
                "version": 3
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = HttpPublisher::new(format!("{}/publish", server.uri())).unwrap();
        publisher.publish(&request()).await.unwrap();
    }

    #[tokio::test]
    async fn non_success_surfaces_as_publish_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad payload"))
            .mount(&server)
            .await;

        let publisher = HttpPublisher::new(server.uri()).unwrap();
        let err = publisher.publish(&request()).await.unwrap_err();
        assert!(matches!(err, EngineError::PublishFailed(_)));
    }
}
