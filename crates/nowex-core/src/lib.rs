//! Core library for the NOWEX admin client.
//!
//! - [`api`]: the HTTP session client and normalized request errors
//! - [`auth`]: login/logout orchestration and token stores
//! - [`models`]: wire types shared with the dashboard
//! - [`config`]: on-disk and environment configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, ClientConfig, RequestConfig};
pub use auth::{AuthError, AuthManager, AuthState, SessionStore};
pub use config::{Config, StoreKind};
pub use models::{LoginRequest, Session, SessionUser, User};
