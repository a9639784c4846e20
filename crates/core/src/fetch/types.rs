use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

fn default_timeout_secs() -> u64 {
    45
}

fn default_connect_timeout_secs() -> u64 {
    15
}

fn default_max_redirects() -> usize {
    3
}

fn default_verify_tls() -> bool {
    true
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_redirects: default_max_redirects(),
            verify_tls: default_verify_tls(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    /// Sent in order.
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            timeout,
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    /// Header names are lowercase; repeated headers appear once per value.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_lowercase(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// 403 and 429 mean the platform is refusing this client.
    pub fn is_blocking(&self) -> bool {
        matches!(self.status, 403 | 429)
    }

    /// `Retry-After` in whole seconds, when present.
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// `name=value` pairs from every `Set-Cookie` header.
    pub fn cookies(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .filter(|(k, _)| k == "set-cookie")
            .filter_map(|(_, v)| set_cookie_pair(v))
            .collect()
    }
}

/// The `name=value` pair at the start of a `Set-Cookie` value.
pub(crate) fn set_cookie_pair(value: &str) -> Option<(String, String)> {
    let pair = value.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Request(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_and_blocking() {
        let response = FetchResponse::new(429, "").with_header("Retry-After", "120");
        assert!(response.is_blocking());
        assert_eq!(response.retry_after(), Some(Duration::from_secs(120)));

        let dated = FetchResponse::new(403, "").with_header("Retry-After", "Wed, 21 Oct 2026 07:28:00 GMT");
        assert_eq!(dated.retry_after(), None);
        assert!(!FetchResponse::ok("").is_blocking());
    }

    #[test]
    fn test_cookies_from_set_cookie() {
        let response = FetchResponse::ok("")
            .with_header("Set-Cookie", "session=abc123; Path=/; HttpOnly")
            .with_header("Set-Cookie", "consent=yes")
            .with_header("Set-Cookie", "; broken");
        assert_eq!(
            response.cookies(),
            vec![
                ("session".to_string(), "abc123".to_string()),
                ("consent".to_string(), "yes".to_string())
            ]
        );
    }
}
