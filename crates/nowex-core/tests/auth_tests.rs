//! Integration tests for login/logout session handling

use std::sync::Arc;
use std::time::Duration;

use nowex_core::api::{ApiClient, ApiError, ClientConfig};
use nowex_core::auth::{
    AuthError, AuthManager, FileStore, MemoryStore, SessionStore, StoreError,
    ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
};
use nowex_core::models::LoginRequest;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Memory store whose refresh token writes always fail.
struct RefreshWriteFails {
    inner: MemoryStore,
}

impl SessionStore for RefreshWriteFails {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if key == REFRESH_TOKEN_KEY {
            return Err(StoreError::Io("disk full".to_string()));
        }
        self.inner.set(key, value)
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.inner.clear(key)
    }
}

fn manager_with(base_url: &str, store: Arc<dyn SessionStore>) -> AuthManager {
    let client = ApiClient::new(&ClientConfig::new(base_url), store).expect("Failed to build client");
    AuthManager::new(client)
}

fn admin_credentials() -> LoginRequest {
    LoginRequest::new("admin@nowex.com", "password123")
}

async fn mount_login_success(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "T1",
            "refresh_token": "T2",
            "user": {"id": "1", "email": "admin@nowex.com", "name": "Admin", "role": "admin"}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_persists_tokens() {
    let mock_server = MockServer::start().await;
    mount_login_success(&mock_server).await;

    let store = Arc::new(MemoryStore::new());
    let auth = manager_with(&mock_server.uri(), store.clone());

    let session = auth.login(&admin_credentials()).await.unwrap();

    assert_eq!(session.user.email, "admin@nowex.com");
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("T1"));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("T2"));
    assert!(auth.is_authenticated());
    assert!(!auth.is_loading());
    assert!(auth.error().is_none());
}

#[tokio::test]
async fn test_new_login_overwrites_previous_tokens() {
    let mock_server = MockServer::start().await;
    mount_login_success(&mock_server).await;

    let store = Arc::new(MemoryStore::new());
    store.set(ACCESS_TOKEN_KEY, "OLD-ACCESS").unwrap();
    store.set(REFRESH_TOKEN_KEY, "OLD-REFRESH").unwrap();

    let auth = manager_with(&mock_server.uri(), store.clone());
    auth.login(&admin_credentials()).await.unwrap();

    assert_eq!(auth.access_token().as_deref(), Some("T1"));
    assert_eq!(auth.refresh_token().as_deref(), Some("T2"));
}

#[tokio::test]
async fn test_failed_login_records_error_and_keeps_tokens() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": "INVALID_CREDENTIALS",
            "message": "Invalid credentials"
        })))
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.set(ACCESS_TOKEN_KEY, "OLD-ACCESS").unwrap();
    store.set(REFRESH_TOKEN_KEY, "OLD-REFRESH").unwrap();

    let auth = manager_with(&mock_server.uri(), store.clone());
    let err = auth
        .login(&LoginRequest::new("admin@nowex.com", "wrong"))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "INVALID_CREDENTIALS");
    assert!(err.api_error().map(ApiError::is_unauthorized).unwrap_or(false));

    let state = auth.state();
    assert!(!state.is_loading);
    assert_eq!(state.error, Some(err));

    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("OLD-ACCESS"));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("OLD-REFRESH"));
}

#[tokio::test]
async fn test_failed_refresh_write_keeps_previous_tokens() {
    let mock_server = MockServer::start().await;
    mount_login_success(&mock_server).await;

    let store = Arc::new(RefreshWriteFails {
        inner: MemoryStore::new(),
    });
    store.inner.set(ACCESS_TOKEN_KEY, "OLD-ACCESS").unwrap();
    store.inner.set(REFRESH_TOKEN_KEY, "OLD-REFRESH").unwrap();

    let auth = manager_with(&mock_server.uri(), store.clone());
    let err = auth.login(&admin_credentials()).await.unwrap_err();

    assert!(matches!(err, AuthError::Store(_)));
    assert_eq!(auth.error(), Some(err));
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("OLD-ACCESS"));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("OLD-REFRESH"));
}

#[tokio::test]
async fn test_failed_refresh_write_leaves_no_half_session() {
    let mock_server = MockServer::start().await;
    mount_login_success(&mock_server).await;

    let auth = manager_with(
        &mock_server.uri(),
        Arc::new(RefreshWriteFails {
            inner: MemoryStore::new(),
        }),
    );

    assert!(auth.login(&admin_credentials()).await.is_err());
    assert!(!auth.is_authenticated());
    assert_eq!(auth.refresh_token(), None);
}

#[tokio::test]
async fn test_next_login_resets_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    mount_login_success(&mock_server).await;

    let auth = manager_with(&mock_server.uri(), Arc::new(MemoryStore::new()));

    assert!(auth.login(&admin_credentials()).await.is_err());
    assert!(auth.error().is_some());

    auth.login(&admin_credentials()).await.unwrap();
    assert!(auth.error().is_none());
    assert!(auth.is_authenticated());
}

#[tokio::test]
async fn test_login_network_failure_is_recorded() {
    let auth = manager_with("http://127.0.0.1:1", Arc::new(MemoryStore::new()));

    let err = auth.login(&admin_credentials()).await.unwrap_err();

    assert!(matches!(err, AuthError::Api(ApiError::Network { .. })));
    assert!(!auth.is_loading());
    assert!(!auth.is_authenticated());
    assert!(auth.error().is_some());
}

#[tokio::test]
async fn test_subscribers_see_loading_transition() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "access_token": "T1",
                    "refresh_token": "T2",
                    "user": {"id": "1", "email": "admin@nowex.com", "name": "Admin", "role": "admin"}
                }))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&mock_server)
        .await;

    let auth = manager_with(&mock_server.uri(), Arc::new(MemoryStore::new()));
    let mut rx = auth.subscribe();

    let task = {
        let auth = auth.clone();
        tokio::spawn(async move { auth.login(&admin_credentials()).await })
    };

    rx.changed().await.unwrap();
    assert!(rx.borrow_and_update().is_loading);

    task.await.unwrap().unwrap();
    assert!(!rx.borrow().is_loading);
    assert!(auth.is_authenticated());
}

#[tokio::test]
async fn test_cancelled_login_clears_loading() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let auth = manager_with(&mock_server.uri(), Arc::new(MemoryStore::new()));
    let result = tokio::time::timeout(Duration::from_millis(100), auth.login(&admin_credentials())).await;

    assert!(result.is_err());
    assert!(!auth.is_loading());
    assert!(!auth.is_authenticated());
}

#[tokio::test]
async fn test_logout_sends_token_and_clears_store() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Logout successful"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.set(ACCESS_TOKEN_KEY, "T1").unwrap();
    store.set(REFRESH_TOKEN_KEY, "T2").unwrap();

    let auth = manager_with(&mock_server.uri(), store.clone());
    auth.logout().await.unwrap();

    assert!(!auth.is_authenticated());
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap(), None);
}

#[tokio::test]
async fn test_logout_clears_store_when_server_rejects() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "Logout error"})))
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.set(ACCESS_TOKEN_KEY, "T1").unwrap();
    store.set(REFRESH_TOKEN_KEY, "T2").unwrap();

    let auth = manager_with(&mock_server.uri(), store.clone());
    let err = auth.logout().await.unwrap_err();

    assert_eq!(err.message(), "Logout error");
    assert!(!auth.is_authenticated());
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), None);
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap(), None);
}

#[tokio::test]
async fn test_logout_clears_store_when_server_unreachable() {
    let store = Arc::new(MemoryStore::new());
    store.set(ACCESS_TOKEN_KEY, "T1").unwrap();
    store.set(REFRESH_TOKEN_KEY, "T2").unwrap();

    let auth = manager_with("http://127.0.0.1:1", store.clone());
    let err = auth.logout().await.unwrap_err();

    assert!(err.api_error().map(ApiError::is_network).unwrap_or(false));
    assert!(!auth.is_authenticated());
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap(), None);
}

#[tokio::test]
async fn test_cancelled_logout_still_clears_store() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.set(ACCESS_TOKEN_KEY, "T1").unwrap();
    store.set(REFRESH_TOKEN_KEY, "T2").unwrap();

    let auth = manager_with(&mock_server.uri(), store.clone());
    let result = tokio::time::timeout(Duration::from_millis(100), auth.logout()).await;

    assert!(result.is_err());
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), None);
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap(), None);
}

#[tokio::test]
async fn test_is_authenticated_is_stable() {
    let mock_server = MockServer::start().await;
    mount_login_success(&mock_server).await;

    let auth = manager_with(&mock_server.uri(), Arc::new(MemoryStore::new()));
    let before: Vec<bool> = (0..3).map(|_| auth.is_authenticated()).collect();
    assert_eq!(before, vec![false, false, false]);

    auth.login(&admin_credentials()).await.unwrap();
    let after: Vec<bool> = (0..3).map(|_| auth.is_authenticated()).collect();
    assert_eq!(after, vec![true, true, true]);
}

#[tokio::test]
async fn test_session_survives_restart_with_file_store() {
    let mock_server = MockServer::start().await;
    mount_login_success(&mock_server).await;
    let dir = tempfile::tempdir().unwrap();

    let auth = manager_with(&mock_server.uri(), Arc::new(FileStore::new(dir.path())));
    auth.login(&admin_credentials()).await.unwrap();
    drop(auth);

    let restarted = manager_with(&mock_server.uri(), Arc::new(FileStore::new(dir.path())));
    assert!(restarted.is_authenticated());
    assert_eq!(restarted.access_token().as_deref(), Some("T1"));
}
