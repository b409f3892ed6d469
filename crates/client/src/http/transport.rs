//! Transport seam between the access layer and the network.
//!
//! [`ApiClient`](super::ApiClient) never talks to `reqwest` directly; it hands
//! fully-formed [`ApiRequest`]s to a [`Transport`]. Production uses
//! [`ReqwestTransport`], whose cookie store is the opaque session-cookie
//! handle. Tests swap in a scripted transport.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::config::ClientConfig;

/// Errors raised before a response status is available.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connect, timeout, TLS, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request path could not be resolved against the API base URL.
    #[error("Invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

/// Body of an outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Multipart(Vec<FormPart>),
}

/// One field of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    pub name: String,
    pub value: FormValue,
}

/// Value of a multipart field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    File {
        file_name: String,
        mime: String,
        bytes: Vec<u8>,
    },
}

impl FormPart {
    /// A plain text field.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: FormValue::Text(value.into()),
        }
    }
}

/// A request as handed to the transport.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL, e.g. `/api/cart/`.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

impl ApiRequest {
    /// Create a request without a body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST` request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Attach a multipart body.
    #[must_use]
    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = Some(RequestBody::Multipart(parts));
        self
    }

    /// Whether the request changes server state and therefore needs CSRF.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        !self.method.is_safe()
    }

    /// JSON body, if any.
    #[must_use]
    pub const fn json_body(&self) -> Option<&Value> {
        match &self.body {
            Some(RequestBody::Json(value)) => Some(value),
            _ => None,
        }
    }
}

/// A response before classification.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Response with a JSON body and no headers.
    #[must_use]
    pub fn json(status: StatusCode, body: &Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.to_string().into_bytes(),
        }
    }

    /// Decode the body as JSON.
    ///
    /// An empty body decodes to `null`; a body that is not JSON is kept as a
    /// string so error payloads from proxies still reach the caller.
    #[must_use]
    pub fn body_value(&self) -> Value {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Value::Null;
        }
        serde_json::from_slice(&self.body).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&self.body).chars().take(500).collect())
        })
    }
}

/// Sends requests to the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return the raw response.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` when no response status could be obtained.
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, TransportError>;
}

/// `reqwest`-backed transport with a cookie store.
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl ReqwestTransport {
    /// Build the transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.api_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: directory_url(&config.api_url),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, TransportError> {
        let url = self.base_url.join(request.path.trim_start_matches('/'))?;

        let mut builder = self
            .client
            .request(request.method, url)
            .headers(request.headers);

        builder = match request.body {
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Multipart(parts)) => builder.multipart(build_form(parts)?),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

/// Ensure the base URL ends with `/` so relative joins keep its path prefix.
fn directory_url(base: &Url) -> Url {
    let mut url = base.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn build_form(parts: Vec<FormPart>) -> Result<Form, TransportError> {
    parts.into_iter().try_fold(Form::new(), |form, part| {
        Ok(match part.value {
            FormValue::Text(text) => form.text(part.name, text),
            FormValue::File {
                file_name,
                mime,
                bytes,
            } => form.part(
                part.name,
                Part::bytes(bytes).file_name(file_name).mime_str(&mime)?,
            ),
        })
    })
}
