//! Thin reqwest wrapper shared by the HTTP backends.

use reqwest::header::HeaderMap;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;

use ftsbench_core::{Error, Result};

pub(crate) struct Api {
    client: reqwest::Client,
    base: String,
    basic_auth: Option<(String, String)>,
}

impl Api {
    pub(crate) fn new(base: &str, headers: HeaderMap, accept_invalid_certs: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| Error::Connection(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, base: base.trim_end_matches('/').to_string(), basic_auth: None })
    }

    pub(crate) fn with_basic_auth(mut self, username: String, password: String) -> Self {
        self.basic_auth = Some((username, password));
        self
    }

    pub(crate) fn base(&self) -> &str {
        &self.base
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.client.request(method, format!("{}{}", self.base, path));
        match &self.basic_auth {
            Some((user, pass)) => req.basic_auth(user, Some(pass)),
            None => req,
        }
    }
}

/// Status and raw body of a finished exchange.
#[derive(Debug)]
pub(crate) struct Reply {
    pub status: StatusCode,
    pub text: String,
}

impl Reply {
    pub(crate) fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Credentials rejected: a connection problem, not an index problem.
    pub(crate) fn is_auth_failure(&self) -> bool {
        matches!(self.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
    }

    pub(crate) fn json(&self) -> std::result::Result<Value, serde_json::Error> {
        if self.text.trim().is_empty() { Ok(Value::Null) } else { serde_json::from_str(&self.text) }
    }

    pub(crate) fn describe(&self) -> String {
        let body = self.text.trim();
        if body.is_empty() { format!("HTTP {}", self.status) } else { format!("HTTP {}: {}", self.status, body) }
    }

    /// Parsed body of a successful reply; anything else goes through `wrap`.
    pub(crate) fn into_json(self, wrap: fn(String) -> Error) -> Result<Value> {
        if !self.is_success() {
            return Err(wrap(self.describe()));
        }
        self.json().map_err(|e| wrap(format!("malformed response body: {}", e)))
    }

    /// Maps a failed setup call: auth failures are connection errors.
    pub(crate) fn setup_error(&self, what: &str) -> Error {
        if self.is_auth_failure() {
            Error::Connection(format!("{} rejected credentials ({})", what, self.describe()))
        } else {
            Error::Initialization(format!("{} failed ({})", what, self.describe()))
        }
    }
}

pub(crate) async fn send(req: RequestBuilder, wrap: fn(String) -> Error) -> Result<Reply> {
    let resp = req.send().await.map_err(|e| wrap(transport_message(&e)))?;
    let status = resp.status();
    let text = resp.text().await.map_err(|e| wrap(transport_message(&e)))?;
    Ok(Reply { status, text })
}

fn transport_message(e: &reqwest::Error) -> String {
    if e.is_connect() {
        format!("backend unreachable: {}", e)
    } else if e.is_timeout() {
        format!("request timed out: {}", e)
    } else {
        e.to_string()
    }
}

/// Reads a required string setting, naming the env var when it is missing.
pub(crate) fn require(value: Option<String>, what: &str, env_var: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Connection(format!("Missing/invalid {} (did you specify {}?)", what, env_var))),
    }
}
