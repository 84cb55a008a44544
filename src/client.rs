//! Router API client
//!
//! Every call resolves to a [`ResponseResult`]; transport failures are
//! captured into the result instead of being returned as errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};

use crate::config::Config;

/// Header carrying the caller-supplied credential
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Max chars kept in a history preview
pub const PREVIEW_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    fn as_reqwest(&self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        })
    }
}

/// One HTTP call, built per intent
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl RequestSpec {
    pub fn get(path: &str) -> Self {
        Self {
            method: Method::Get,
            path: path.to_string(),
            body: None,
        }
    }

    pub fn post(path: &str, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.to_string(),
            body: Some(body),
        }
    }
}

/// Uniform outcome of a dispatch
///
/// - `ok == false` with `status == None`: no response (transport failure or local rejection)
/// - `ok == false` with a status: non-2xx response, body still captured
/// - non-JSON bodies are kept as a JSON string holding the raw text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseResult {
    pub ok: bool,
    pub status: Option<u16>,
    pub elapsed_ms: Option<u64>,
    pub body: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseResult {
    /// Rejected before reaching the network
    pub fn local_error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            status: None,
            elapsed_ms: None,
            body: Value::Null,
            error: Some(message.into()),
        }
    }

    fn transport_failure(message: String, elapsed: Duration) -> Self {
        Self {
            ok: false,
            status: None,
            elapsed_ms: Some(elapsed_ms(elapsed)),
            body: Value::Null,
            error: Some(message),
        }
    }

    /// Body for display: raw text as-is, JSON pretty-printed
    pub fn body_text(&self) -> String {
        match &self.body {
            Value::String(s) => s.clone(),
            Value::Null if self.error.is_some() => String::new(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        }
    }

    /// Compact one-line rendering, truncated to `max_chars`
    pub fn preview(&self, max_chars: usize) -> String {
        let text = match (&self.body, &self.error) {
            (Value::Null, Some(err)) => err.clone(),
            (Value::String(s), _) => s.clone(),
            (other, _) => other.to_string(),
        };
        truncate_chars(&text, max_chars)
    }

    /// "Status: 200 | Time: 84ms" style summary line
    pub fn summary(&self) -> String {
        let status = self
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "—".to_string());
        let time = self
            .elapsed_ms
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "—".to_string());
        match &self.error {
            Some(err) => format!("Status: {} | Time: {} | Error: {}", status, time, err),
            None => format!("Status: {} | Time: {}", status, time),
        }
    }
}

/// Truncate on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    elapsed.as_millis().min(u64::MAX as u128) as u64
}

/// Parse as JSON, falling back to the raw text unchanged
pub fn parse_body(text: String) -> Value {
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => value,
        Err(_) => Value::String(text),
    }
}

/// Performs calls against the configured base address
#[derive(Debug, Clone)]
pub struct Dispatcher {
    http: reqwest::Client,
    base_url: String,
    credential: String,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base().to_string(),
            credential: config.credential.trim().to_string(),
            timeout: config.timeout(),
        }
    }

    /// Override the per-request timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> ResponseResult {
        self.execute(&RequestSpec::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> ResponseResult {
        self.execute(&RequestSpec::post(path, body)).await
    }

    /// Issue one request and normalize whatever happens into a result
    pub async fn execute(&self, spec: &RequestSpec) -> ResponseResult {
        let url = self.url(&spec.path);
        let mut request = self.http.request(spec.method.as_reqwest(), &url);

        if !self.credential.is_empty() {
            request = request.header(API_KEY_HEADER, &self.credential);
        }
        if let Some(body) = &spec.body {
            // .json() also sets Content-Type: application/json
            request = request.json(body);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        tracing::debug!(method = %spec.method, %url, "dispatching");
        let start = Instant::now();

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                let message = describe_transport_error(&err, self.timeout);
                tracing::warn!(method = %spec.method, %url, error = %message, "request failed");
                return ResponseResult::transport_failure(message, start.elapsed());
            }
        };

        let status = response.status();
        let text = response.text().await;
        let elapsed = elapsed_ms(start.elapsed());

        let result = match text {
            Ok(text) => ResponseResult {
                ok: status.is_success(),
                status: Some(status.as_u16()),
                elapsed_ms: Some(elapsed),
                body: parse_body(text),
                error: None,
            },
            Err(err) => ResponseResult {
                ok: status.is_success(),
                status: Some(status.as_u16()),
                elapsed_ms: Some(elapsed),
                body: Value::Null,
                error: Some(format!("Failed to read response body: {}", err)),
            },
        };

        tracing::info!(
            method = %spec.method,
            %url,
            status = status.as_u16(),
            elapsed_ms = elapsed,
            "request completed"
        );
        result
    }
}

fn describe_transport_error(err: &reqwest::Error, timeout: Option<Duration>) -> String {
    if err.is_timeout() {
        match timeout {
            Some(t) => format!("Request timed out after {}s", t.as_secs_f32()),
            None => "Request timed out".to_string(),
        }
    } else if err.is_connect() {
        format!("Connection failed: {}", err)
    } else {
        format!("Request failed: {}", err)
    }
}
