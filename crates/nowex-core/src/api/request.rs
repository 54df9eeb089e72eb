use std::time::Duration;

use reqwest::RequestBuilder;

/// Per-call overrides applied on top of the client's defaults.
///
/// Applying a `RequestConfig` only touches the single request being built;
/// the shared client keeps its base address, timeout and headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestConfig {
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub params: Vec<(String, String)>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Append a query parameter
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    pub(crate) fn apply(&self, mut builder: RequestBuilder) -> RequestBuilder {
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if !self.params.is_empty() {
            builder = builder.query(&self.params);
        }
        builder
    }
}
