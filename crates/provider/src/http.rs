//! HTTP access source backed by reqwest.

use crate::AccessSource;
use async_trait::async_trait;
use lookout_core::error::{LookoutError, LookoutResult};
use lookout_core::{AccessDescriptor, EntityId};
use reqwest::header::ACCEPT;
use url::Url;

/// Placeholder replaced by the percent-encoded entity id.
pub const ENTITY_PLACEHOLDER: &str = "{entity_id}";

/// Error bodies are truncated to this many characters in [`LookoutError::Status`].
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Where and how to reach the access endpoint.
///
/// ```ignore
/// let config = HttpSourceConfig::new("https://app.example.com")?
///     .with_path_template("/api/v2/observers/{entity_id}/access")?
///     .with_bearer_token("secret");
/// ```
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    base_url: Url,
    path_template: String,
    bearer_token: Option<String>,
}

impl HttpSourceConfig {
    pub const DEFAULT_PATH_TEMPLATE: &'static str = "/api/observers/{entity_id}/access";

    pub fn new(base_url: &str) -> LookoutResult<Self> {
        if base_url.is_empty() {
            return Err(LookoutError::InvalidInput("base URL must not be empty".into()));
        }

        let base_url = Url::parse(base_url)
            .map_err(|e| LookoutError::InvalidInput(format!("invalid base URL {base_url}: {e}")))?;

        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(LookoutError::InvalidInput(format!(
                "base URL must be an http(s) URL: {base_url}"
            )));
        }

        Ok(Self {
            base_url,
            path_template: Self::DEFAULT_PATH_TEMPLATE.to_string(),
            bearer_token: None,
        })
    }

    /// Override the endpoint path. The template must contain
    /// `{entity_id}` as a whole path segment.
    pub fn with_path_template(mut self, template: impl Into<String>) -> LookoutResult<Self> {
        let template = template.into();
        if !template.split('/').any(|seg| seg == ENTITY_PLACEHOLDER) {
            return Err(LookoutError::InvalidInput(format!(
                "path template {template:?} must contain {ENTITY_PLACEHOLDER} as a path segment"
            )));
        }
        self.path_template = template;
        Ok(self)
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Resolves the endpoint URL for one entity, appending the template's
    /// segments to whatever path the base URL already carries.
    pub fn endpoint(&self, entity_id: &EntityId) -> LookoutResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                LookoutError::InvalidInput(format!("base URL cannot carry a path: {}", self.base_url))
            })?;
            segments.pop_if_empty();
            for seg in self.path_template.split('/').filter(|s| !s.is_empty()) {
                if seg == ENTITY_PLACEHOLDER {
                    segments.push(entity_id.as_str());
                } else {
                    segments.push(seg);
                }
            }
        }
        Ok(url)
    }
}

/// Fetches access descriptors with a single `GET` per call.
pub struct HttpAccessSource {
    config: HttpSourceConfig,
    client: reqwest::Client,
}

impl HttpAccessSource {
    pub fn new(config: HttpSourceConfig) -> LookoutResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("lookout/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LookoutError::Internal(format!("failed to build HTTP client: {e}")))?;

        tracing::info!(base_url = %config.base_url, template = %config.path_template, "access source ready");

        Ok(Self { config, client })
    }
}

#[async_trait]
impl AccessSource for HttpAccessSource {
    async fn fetch_access(&self, entity_id: &EntityId) -> LookoutResult<AccessDescriptor> {
        let url = self.config.endpoint(entity_id)?;

        tracing::debug!(entity_id = %entity_id, url = %url, "requesting access descriptor");

        let mut request = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json");
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LookoutError::Transport(format!("GET {url}: {e}")))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| LookoutError::Transport(format!("reading body of {url}: {e}")))?;

        if !status.is_success() {
            return Err(LookoutError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body)
                    .chars()
                    .take(MAX_ERROR_BODY_CHARS)
                    .collect(),
            });
        }

        decode_descriptor(&body)
    }
}

/// An empty body or JSON `null` is an empty descriptor, not an error.
fn decode_descriptor(body: &[u8]) -> LookoutResult<AccessDescriptor> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(AccessDescriptor::default());
    }
    let parsed: Option<AccessDescriptor> =
        serde_json::from_slice(body).map_err(|e| LookoutError::Decode(e.to_string()))?;
    Ok(parsed.unwrap_or_default())
}
