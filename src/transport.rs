//! Authenticated request dispatch.
//!
//! [`GraphTransport`] is the seam every site and document operation goes
//! through. [`GraphConnection`] is the concrete implementation: it attaches
//! the bearer token, validates the status code against the set the caller
//! expects and decodes JSON bodies. It knows nothing about resources, so it
//! never translates errors; call sites do that with [`crate::error::translate`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, LOCATION,
};
use reqwest::redirect::Policy;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::Authenticator;
use crate::config::GraphConfig;
use crate::error::{DriveError, Result};

/// Statuses accepted when the caller does not say otherwise.
pub const DEFAULT_EXPECTED_STATUS: &[u16] = &[200, 201, 204];

/// Body of an outgoing request.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Bytes(Vec<u8>),
}

/// One request to the remote API.
#[derive(Debug, Clone)]
pub struct GraphRequest {
    pub method: Method,
    pub url: String,
    pub expected: Vec<u16>,
    pub token: Option<String>,
    pub body: RequestBody,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub stream: bool,
    pub authenticated: bool,
}

impl GraphRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            expected: DEFAULT_EXPECTED_STATUS.to_vec(),
            token: None,
            body: RequestBody::Empty,
            headers: Vec::new(),
            timeout: None,
            stream: false,
            authenticated: true,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Replace the accepted status set.
    pub fn expect(mut self, statuses: &[u16]) -> Self {
        self.expected = statuses.to_vec();
        self
    }

    /// Use an already acquired token instead of asking the provider.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn bytes(mut self, data: Vec<u8>) -> Self {
        self.body = RequestBody::Bytes(data);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Deadline for the whole exchange, body included. Without one, only the
    /// connection's connect and read-inactivity limits apply.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Hand back the live response instead of buffering it.
    pub fn stream(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Send without a bearer token (upload-session URLs, pre-authenticated
    /// links).
    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    /// Value of a caller-supplied header, case-insensitive.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Buffered response that was not decoded as JSON.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Outcome of an accepted request.
#[derive(Debug)]
pub enum GraphResponse {
    /// JSON body, decoded.
    Json { status: u16, body: Value },
    /// 204, non-JSON content, or JSON that failed to parse.
    Raw(RawResponse),
    /// Live response, returned when the request asked for streaming.
    Stream(reqwest::Response),
}

impl GraphResponse {
    pub fn status(&self) -> u16 {
        match self {
            Self::Json { status, .. } => *status,
            Self::Raw(raw) => raw.status,
            Self::Stream(response) => response.status().as_u16(),
        }
    }

    /// Decoded JSON body, if the response had one.
    pub fn json_body(&self) -> Option<&Value> {
        match self {
            Self::Json { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Deserialize the JSON body into `T`.
    pub fn into_model<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Self::Json { body, .. } => Ok(serde_json::from_value(body)?),
            other => Err(DriveError::Protocol(format!(
                "expected a JSON body, got a raw response (status {})",
                other.status()
            ))),
        }
    }
}

/// Capability every remote operation depends on.
#[async_trait]
pub trait GraphTransport: Send + Sync {
    /// Base URL of the Graph API, without a trailing slash.
    fn graph_base(&self) -> &str;

    /// Acquire a bearer token for the service principal.
    async fn acquire_token(&self) -> Result<String>;

    /// Send a request and validate its status against `request.expected`.
    ///
    /// A status outside the expected set fails with
    /// [`DriveError::Transport`] carrying the status and raw body.
    async fn dispatch(&self, request: GraphRequest) -> Result<GraphResponse>;
}

/// Authenticated HTTP session for one app registration.
///
/// Shared by reference between all sites and documents that use it.
#[derive(Clone)]
pub struct GraphConnection {
    auth: Authenticator,
    http: Client,
    graph_base: String,
}

impl GraphConnection {
    /// Create a connection. Fails with a config error when identity fields
    /// are missing.
    pub fn new(config: GraphConfig) -> Result<Self> {
        let graph_base = config.graph_base().to_string();
        let timeout = config.timeout();
        let auth = Authenticator::new(config)?;

        // Redirects are surfaced, not followed: `/content` answers with a 302
        // to a pre-authenticated link that callers handle themselves.
        // The timeout bounds connecting and each read, not the whole transfer.
        let http = Client::builder()
            .redirect(Policy::none())
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;

        Ok(Self {
            auth,
            http,
            graph_base,
        })
    }

    fn build_headers(request: &GraphRequest) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }
        Ok(headers)
    }

    async fn read_raw(response: reqwest::Response) -> Result<RawResponse> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl GraphTransport for GraphConnection {
    fn graph_base(&self) -> &str {
        &self.graph_base
    }

    async fn acquire_token(&self) -> Result<String> {
        self.auth.get_access_token().await
    }

    async fn dispatch(&self, request: GraphRequest) -> Result<GraphResponse> {
        let mut headers = Self::build_headers(&request)?;

        if request.authenticated && !headers.contains_key(AUTHORIZATION) {
            let token = match request.token.as_deref() {
                Some(token) => token.to_string(),
                None => self.acquire_token().await?,
            };
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        }

        let mut builder = self.http.request(request.method.clone(), &request.url);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        match &request.body {
            RequestBody::Empty => {}
            RequestBody::Json(value) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                builder = builder.body(serde_json::to_vec(value)?);
            }
            RequestBody::Bytes(data) => {
                builder = builder.body(data.clone());
            }
        }

        debug!(method = %request.method, url = %request.url, "graph request");
        let response = builder.headers(headers).send().await?;

        let status = response.status().as_u16();
        if !request.expected.contains(&status) {
            let body = response.text().await.unwrap_or_default();
            warn!(
                method = %request.method,
                url = %request.url,
                status,
                expected = ?request.expected,
                "unexpected graph status"
            );
            return Err(DriveError::Transport {
                method: request.method.to_string(),
                url: request.url,
                status,
                body,
            });
        }

        if request.stream {
            return Ok(GraphResponse::Stream(response));
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false);

        let raw = Self::read_raw(response).await?;
        debug!(status, body_len = raw.body.len(), "graph response");

        if status == 204 || !is_json {
            return Ok(GraphResponse::Raw(raw));
        }

        match serde_json::from_slice::<Value>(&raw.body) {
            Ok(body) => Ok(GraphResponse::Json { status, body }),
            Err(_) => Ok(GraphResponse::Raw(raw)),
        }
    }
}
