//! HTTP session client for the NOWEX admin backend.
//!
//! This module provides the `ApiClient`, the single point of outbound
//! communication with the backend. Requests carry the stored bearer token
//! and failures surface as the normalized `ApiError`.

pub mod client;
pub mod error;
pub mod request;

pub use client::{ApiClient, ClientConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_MS, DEFAULT_USER_PAGE_SIZE};
pub use error::{ApiError, UNKNOWN_ERROR_CODE};
pub use request::RequestConfig;
