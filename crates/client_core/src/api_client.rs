//! Thin JSON-over-HTTP client for the monitoring backend.

use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::Value;
use shared::error::ErrorBody;
use tracing::{debug, warn};
use url::Url;

use crate::error::RequestError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct ApiClientOptions {
    pub timeout: Duration,
}

impl Default for ApiClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
    /// Path segments appended after the request path, percent-encoded.
    pub segments: Vec<String>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            body: None,
            query: Vec::new(),
            segments: Vec::new(),
        }
    }

    pub fn delete() -> Self {
        Self {
            method: Method::DELETE,
            ..Self::get()
        }
    }

    pub fn post(body: Value) -> Self {
        Self::with_body(Method::POST, body)
    }

    pub fn put(body: Value) -> Self {
        Self::with_body(Method::PUT, body)
    }

    pub fn patch(body: Value) -> Self {
        Self::with_body(Method::PATCH, body)
    }

    fn with_body(method: Method, body: Value) -> Self {
        Self {
            method,
            body: Some(body),
            ..Self::get()
        }
    }

    /// Appends one raw path segment, such as an item id.
    pub fn at(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    pub fn with_query<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

/// Result of [`ApiClient::try_request`]; never an `Err`.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub ok: bool,
    /// `None` when the request never produced an HTTP status.
    pub status: Option<u16>,
    pub data: Option<Value>,
    pub error: Option<RequestError>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RequestError> {
        Self::with_options(base_url, ApiClientOptions::default())
    }

    pub fn with_options(
        base_url: impl Into<String>,
        options: ApiClientOptions,
    ) -> Result<Self, RequestError> {
        let http = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|err| RequestError::Network(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str, options: &RequestOptions) -> Result<Url, RequestError> {
        let joined = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut url = Url::parse(&joined)
            .map_err(|err| RequestError::Network(format!("invalid request url {joined}: {err}")))?;
        if !options.segments.is_empty() {
            url.path_segments_mut()
                .map_err(|()| RequestError::Network(format!("request url {joined} has no path")))?
                .pop_if_empty()
                .extend(&options.segments);
        }
        let query = &options.query;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        Ok(url)
    }

    pub async fn request(&self, path: &str, options: RequestOptions) -> Result<Value, RequestError> {
        self.send(path, options).await.map(|(_, data)| data)
    }

    pub async fn try_request(&self, path: &str, options: RequestOptions) -> ApiResponse {
        match self.send(path, options).await {
            Ok((status, data)) => ApiResponse {
                ok: true,
                status: Some(status),
                data: Some(data),
                error: None,
            },
            Err(err) => ApiResponse {
                ok: false,
                status: err.status(),
                data: None,
                error: Some(err),
            },
        }
    }

    async fn send(&self, path: &str, options: RequestOptions) -> Result<(u16, Value), RequestError> {
        let url = self.url(path, &options)?;
        let method = options.method.clone();

        let mut builder = self.http.request(options.method, url.clone());
        if let Some(body) = &options.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|err| {
            warn!("api: {method} {url} failed before response: {err}");
            RequestError::Network(err.to_string())
        })?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(RequestError::from)?;
        debug!("api: {method} {url} -> {}", status.as_u16());

        if !status.is_success() {
            let body = serde_json::from_slice::<ErrorBody>(&bytes).unwrap_or_default();
            return Err(RequestError::http(
                status.as_u16(),
                body.into_message(status.as_u16()),
            ));
        }

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok((status.as_u16(), Value::Null));
        }

        let data = serde_json::from_slice(&bytes)
            .map_err(|err| RequestError::Decode(err.to_string()))?;
        Ok((status.as_u16(), data))
    }
}

#[cfg(test)]
#[path = "tests/api_client_tests.rs"]
mod tests;
