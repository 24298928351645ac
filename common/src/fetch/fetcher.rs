// Secure outbound fetcher for user-supplied endpoints
//
// Every fetch runs the URL validator first, then performs a bounded GET:
// no redirects, hard timeout, response body cap, JSON responses only.
// 5xx answers are hard failures; 4xx pass through for the caller to inspect.

use crate::errors::FetchError;
use crate::fetch::validator::validate_endpoint;
use futures::StreamExt;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONTENT_TYPE, LOCATION, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

const FETCHER_USER_AGENT: &str = "SecureDataFetcher/1.0";

/// Limits applied to a single fetch
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Hard upper bound on the whole request
    pub timeout: Duration,
    /// Maximum accepted response body size in bytes
    pub max_content_length: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            max_content_length: 1024 * 1024, // 1 MiB
        }
    }
}

/// Accepted response from a subscription endpoint
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub data: Value,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub url: String,
}

/// HTTP client wrapper enforcing the fetch policy
pub struct SecureFetcher {
    client: Client,
    options: FetchOptions,
}

impl SecureFetcher {
    pub fn new(options: FetchOptions) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(options.timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|e| FetchError::RequestFailed {
                message: format!("Failed to build HTTP client: {}", e),
                code: "CLIENT".to_string(),
            })?;

        Ok(Self { client, options })
    }

    /// Fetch a user-supplied endpoint. Validation errors propagate unchanged
    /// as the fetch error; no network I/O happens for an invalid URL.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        let validated = validate_endpoint(url)?;
        self.perform(validated).await
    }

    async fn perform(&self, url: Url) -> Result<FetchResult, FetchError> {
        info!(url = %url, "Fetching subscription endpoint");

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, FETCHER_USER_AGENT)
            .header(ACCEPT, "application/json")
            .header(ACCEPT_ENCODING, "gzip")
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();

        // Redirects could point anywhere, including at hosts the validator
        // just rejected. Refuse them outright.
        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("<missing>");
            warn!(status = %status, location, "Endpoint answered with a redirect, refusing to follow");
            return Err(FetchError::RequestFailed {
                message: format!("Redirect to {} refused", location),
                code: "REDIRECT".to_string(),
            });
        }

        if status.is_server_error() {
            return Err(FetchError::RequestFailed {
                message: format!("Upstream returned {}", status),
                code: format!("HTTP_{}", status.as_u16()),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.contains("application/json") {
            return Err(FetchError::InvalidContentType { content_type });
        }

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let final_url = response.url().to_string();
        let status_code = status.as_u16();

        // Read the body in chunks so an oversized response is cut off as soon
        // as it crosses the cap instead of being buffered whole.
        if let Some(length) = response.content_length() {
            if length as usize > self.options.max_content_length {
                return Err(self.body_too_large());
            }
        }

        let mut body: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            if body.len() + chunk.len() > self.options.max_content_length {
                return Err(self.body_too_large());
            }
            body.extend_from_slice(&chunk);
        }

        // The content type promised JSON; fall back to the raw text when the
        // body does not actually parse.
        let data: Value = serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()));

        info!(status = status_code, bytes = body.len(), "Fetch accepted");

        Ok(FetchResult {
            data,
            status: status_code,
            headers,
            url: final_url,
        })
    }

    fn body_too_large(&self) -> FetchError {
        FetchError::RequestFailed {
            message: format!(
                "Response body exceeds {} bytes",
                self.options.max_content_length
            ),
            code: "BODY_TOO_LARGE".to_string(),
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> FetchError {
    let code = if e.is_timeout() {
        "TIMEOUT"
    } else if e.is_connect() {
        "CONNECT"
    } else {
        "UNKNOWN"
    };

    FetchError::RequestFailed {
        message: e.to_string(),
        code: code.to_string(),
    }
}
