//! REST client for the production image store.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list      | `GET {base}/{owner path}/images` |
//! | upload    | `POST {base}/uploads` (multipart: `folder`, `file`) -> `{"url": ...}` |
//! | add       | `POST {base}/images` |
//! | update    | `PATCH {base}/images/{id}` |
//! | delete    | `DELETE {base}/images/{id}` |
//!
//! Bodies are camelCase JSON. Authentication is a bearer token.

use std::sync::Arc;

use async_trait::async_trait;
use opsdesk_core::{GalleryImage, ImageId, ImagePatch, NewImage, Owner, UploadFile};
use reqwest::{RequestBuilder, Response, StatusCode, multipart};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::instrument;
use url::Url;

use super::{RemoteImageStore, StoreError};
use crate::config::StoreConfig;

/// Longest server message kept in an error.
const MAX_ERROR_MESSAGE_LEN: usize = 300;

/// HTTP image store client.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct HttpImageStore {
    inner: Arc<HttpImageStoreInner>,
}

struct HttpImageStoreInner {
    client: reqwest::Client,
    base_url: Url,
    api_token: SecretString,
}

/// Upload response body.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// Error body returned by the store (either field may be used).
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl HttpImageStore {
    /// Create a new store client.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Network` if the HTTP client fails to build.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpImageStoreInner {
                client,
                base_url: normalize_base(config.base_url.clone()),
                api_token: config.api_token.clone(),
            }),
        })
    }

    /// Get the base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| StoreError::Validation(format!("invalid endpoint {path}: {e}")))
    }

    /// Send an authenticated request and map the status to a store error.
    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request
            .bearer_auth(self.inner.api_token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, StoreError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Network(format!("invalid response body: {e}")))
    }
}

#[async_trait]
impl RemoteImageStore for HttpImageStore {
    #[instrument(skip(self, owner), fields(owner = %owner))]
    async fn list(&self, owner: Owner) -> Result<Vec<GalleryImage>, StoreError> {
        let url = self.endpoint(&format!("{}/images", owner.path_segment()))?;
        self.send_json(self.inner.client.get(url)).await
    }

    #[instrument(skip(self, file), fields(file = %file.file_name, bytes = file.len()))]
    async fn upload(&self, file: &UploadFile, folder: &str) -> Result<String, StoreError> {
        let url = self.endpoint("uploads")?;

        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)
            .map_err(|e| StoreError::Upload(format!("invalid content type: {e}")))?;
        let form = multipart::Form::new()
            .text("folder", folder.to_string())
            .part("file", part);

        let response: UploadResponse = self
            .send_json(self.inner.client.post(url).multipart(form))
            .await?;

        if response.url.is_empty() {
            return Err(StoreError::Upload("store returned an empty URL".to_string()));
        }

        Ok(response.url)
    }

    #[instrument(skip(self, image), fields(owner = %image.owner, sort_order = image.sort_order))]
    async fn add(&self, image: NewImage) -> Result<GalleryImage, StoreError> {
        let url = self.endpoint("images")?;
        self.send_json(self.inner.client.post(url).json(&image))
            .await
    }

    #[instrument(skip(self))]
    async fn update(&self, id: ImageId, patch: ImagePatch) -> Result<GalleryImage, StoreError> {
        let url = self.endpoint(&format!("images/{id}"))?;
        self.send_json(self.inner.client.patch(url).json(&patch))
            .await
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: ImageId) -> Result<(), StoreError> {
        let url = self.endpoint(&format!("images/{id}"))?;
        self.send(self.inner.client.delete(url)).await?;
        Ok(())
    }
}

/// Ensure the base path ends with `/` so relative joins append to it.
fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Map a non-success HTTP status to the store error taxonomy.
fn status_error(status: StatusCode, body: &str) -> StoreError {
    let message = error_message(status, body);

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            StoreError::Validation(message)
        }
        StatusCode::NOT_FOUND | StatusCode::GONE => StoreError::NotFound(message),
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => StoreError::Conflict(message),
        StatusCode::PAYLOAD_TOO_LARGE | StatusCode::UNSUPPORTED_MEDIA_TYPE => {
            StoreError::Upload(message)
        }
        _ => StoreError::Network(format!("HTTP {}: {message}", status.as_u16())),
    }
}

/// Extract a human-readable message from an error body.
fn error_message(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.message.or(e.error));

    let message = parsed.unwrap_or_else(|| body.trim().to_string());
    if message.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string();
    }

    message.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use opsdesk_core::ProductId;

    use super::*;

    fn store(base: &str) -> HttpImageStore {
        HttpImageStore::new(&StoreConfig {
            base_url: Url::parse(base).unwrap(),
            api_token: SecretString::from("gk_9fQ2xLr7TmZp4vWb8NcY3sHd"),
            timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_appends_to_base_path() {
        let store = store("https://api.shop.test/v1");
        let owner = Owner::product(ProductId::new(12));
        let url = store
            .endpoint(&format!("{}/images", owner.path_segment()))
            .unwrap();
        assert_eq!(url.as_str(), "https://api.shop.test/v1/products/12/images");
        assert_eq!(
            store.endpoint("images/5").unwrap().as_str(),
            "https://api.shop.test/v1/images/5"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNPROCESSABLE_ENTITY, ""),
            StoreError::Validation(_)
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, ""),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            status_error(StatusCode::CONFLICT, ""),
            StoreError::Conflict(_)
        ));
        assert!(matches!(
            status_error(StatusCode::PAYLOAD_TOO_LARGE, ""),
            StoreError::Upload(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            StoreError::Network(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, ""),
            StoreError::Network(_)
        ));
    }

    #[test]
    fn test_error_message_from_json_body() {
        let err = status_error(StatusCode::CONFLICT, r#"{"message":"sort order taken"}"#);
        assert_eq!(err, StoreError::Conflict("sort order taken".to_string()));

        let err = status_error(StatusCode::NOT_FOUND, r#"{"error":"no such image"}"#);
        assert_eq!(err, StoreError::NotFound("no such image".to_string()));
    }

    #[test]
    fn test_error_message_fallbacks() {
        let err = status_error(StatusCode::NOT_FOUND, "   ");
        assert_eq!(err, StoreError::NotFound("Not Found".to_string()));

        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, "upstream down");
        assert_eq!(err, StoreError::Network("HTTP 503: upstream down".to_string()));

        let long = "x".repeat(1000);
        let StoreError::Validation(message) = status_error(StatusCode::BAD_REQUEST, &long) else {
            panic!("expected validation error");
        };
        assert_eq!(message.len(), MAX_ERROR_MESSAGE_LEN);
    }
}
