//! HTTP session client for the NOWEX backend.
//!
//! Every request attaches the stored bearer token (if any) and every
//! failure is normalized into [`ApiError`] before reaching the caller.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::auth::store::{SessionStore, ACCESS_TOKEN_KEY};
use crate::models::{LoginRequest, Session, User};

use super::{ApiError, RequestConfig};

// ============================================================================
// Constants
// ============================================================================

/// Backend address used when none is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Request timeout applied to every call unless overridden per request.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

const LOGIN_PATH: &str = "/auth/login";
const LOGOUT_PATH: &str = "/auth/logout";
const USERS_PATH: &str = "/admin/users";

/// Page size used by the dashboard's user table.
pub const DEFAULT_USER_PAGE_SIZE: u32 = 10;

/// Transport settings for [`ApiClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// API client for the admin backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: Arc<dyn SessionStore>,
}

impl ApiClient {
    /// Create a client reading its bearer token from `store`
    pub fn new(config: &ClientConfig, store: Arc<dyn SessionStore>) -> Result<Self, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Unknown {
                status: None,
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            store,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The store this client reads its bearer token from
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Current bearer token, if any. Store failures count as "no token".
    fn stored_token(&self) -> Option<String> {
        match self.store.get(ACCESS_TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read access token; sending request unauthenticated");
                None
            }
        }
    }

    fn build(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        config: Option<&RequestConfig>,
    ) -> RequestBuilder {
        let mut request = self.client.request(method, self.url(path));

        if let Some(token) = self.stored_token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        if let Some(config) = config {
            request = config.apply(request);
        }
        request
    }

    /// Send a request and return the raw success body.
    async fn send(&self, method: Method, path: &str, request: RequestBuilder) -> Result<String, ApiError> {
        debug!(method = %method, path = path, "Sending request");

        let response = request.send().await.map_err(|e| {
            let err = ApiError::from_transport(&e);
            debug!(method = %method, path = path, error = %err, "Request failed without a response");
            err
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ApiError::from_transport(&e))?;

        if status.is_success() {
            debug!(method = %method, path = path, status = status.as_u16(), "Request succeeded");
            Ok(body)
        } else {
            debug!(
                method = %method,
                path = path,
                status = status.as_u16(),
                body = %ApiError::truncate_body(&body),
                "Request rejected"
            );
            Err(ApiError::from_status(status, &body))
        }
    }

    fn decode<T: DeserializeOwned>(path: &str, body: &str) -> Result<T, ApiError> {
        // Bodiless responses decode as `null` so `()` and `Option<_>` work.
        let text = if body.trim().is_empty() { "null" } else { body };
        serde_json::from_str(text).map_err(|e| {
            debug!(path = path, error = %e, "Failed to decode response body");
            ApiError::Unknown {
                status: None,
                message: format!("Failed to parse response from {}: {}", path, e),
            }
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        config: Option<&RequestConfig>,
    ) -> Result<T, ApiError> {
        let request = self.build(method.clone(), path, body, config);
        let body = self.send(method, path, request).await?;
        Self::decode(path, &body)
    }

    fn to_body<B: Serialize + ?Sized>(body: &B) -> Result<serde_json::Value, ApiError> {
        serde_json::to_value(body).map_err(|e| ApiError::Unknown {
            status: None,
            message: format!("Failed to serialize request body: {}", e),
        })
    }

    // ===== Authentication =====

    /// Exchange credentials for a session. The endpoint needs no prior token.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<Session, ApiError> {
        self.post(LOGIN_PATH, credentials, None).await
    }

    /// Tell the server to revoke the current token. Local state is untouched.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let request = self.build(Method::POST, LOGOUT_PATH, None, None);
        self.send(Method::POST, LOGOUT_PATH, request).await?;
        Ok(())
    }

    // ===== Generic Requests =====

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        config: Option<&RequestConfig>,
    ) -> Result<T, ApiError> {
        self.request(Method::GET, path, None, config).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        config: Option<&RequestConfig>,
    ) -> Result<T, ApiError> {
        let body = Self::to_body(body)?;
        self.request(Method::POST, path, Some(body), config).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        config: Option<&RequestConfig>,
    ) -> Result<T, ApiError> {
        let body = Self::to_body(body)?;
        self.request(Method::PUT, path, Some(body), config).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        config: Option<&RequestConfig>,
    ) -> Result<T, ApiError> {
        self.request(Method::DELETE, path, None, config).await
    }

    // ===== User Directory =====

    /// Fetch one page of the admin user directory (pages start at 1)
    pub async fn list_users(&self, page: u32, limit: u32) -> Result<Vec<User>, ApiError> {
        let config = RequestConfig::new()
            .param("page", page.max(1))
            .param("limit", limit.max(1));
        self.get(USERS_PATH, Some(&config)).await
    }

    pub async fn get_user(&self, id: &str) -> Result<User, ApiError> {
        let id = Self::path_segment(id)?;
        self.get(&format!("{}/{}", USERS_PATH, id), None).await
    }

    /// Validate an id used as a single path segment. Anything that could
    /// change the request target (`/`, `?`, `#`, `%`, dot segments) is refused.
    fn path_segment(id: &str) -> Result<&str, ApiError> {
        let valid = !id.is_empty()
            && id != "."
            && id != ".."
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'));
        if valid {
            Ok(id)
        } else {
            Err(ApiError::Unknown {
                status: None,
                message: format!("Invalid id {:?}", id),
            })
        }
    }
}
