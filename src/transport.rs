//! The transport seam: what the request pipeline calls to move bytes.
//!
//! The core never talks to the network directly; it hands a fully
//! resolved [`TransportRequest`] to a [`Transport`]. The default
//! implementation rides on reqwest. Tests swap in scripted transports.

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use indexmap::IndexMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Network-level failure with a transient classification.
///
/// Transient failures are safe to re-dispatch; everything else surfaces
/// to the caller on the first occurrence.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection refused or could not be established.
    Connect,
    /// Connection reset mid-exchange.
    Reset,
    /// Open or read timeout.
    Timeout,
    /// Name resolution or socket-level failure.
    Dns,
    /// Body read failed or the stream ended early.
    Read,
    /// Anything the transport could not classify; never retried.
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Connect => "connection failed",
            Self::Reset => "connection reset",
            Self::Timeout => "timed out",
            Self::Dns => "name resolution failed",
            Self::Read => "body read failed",
            Self::Other => "transport error",
        };
        f.write_str(text)
    }
}

impl TransportError {
    #[must_use]
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    #[must_use]
    pub fn reset(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Reset, message)
    }

    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    #[must_use]
    pub const fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !matches!(self.kind, TransportErrorKind::Other)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_connect() {
            TransportErrorKind::Connect
        } else if e.is_timeout() {
            TransportErrorKind::Timeout
        } else if e.is_body() || e.is_decode() {
            TransportErrorKind::Read
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, e.to_string())
    }
}

/// A fully resolved request, ready to dispatch.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: reqwest::Method,
    pub url: String,
    pub body: Option<String>,
    pub headers: IndexMap<String, String>,
    pub connection_options: IndexMap<String, Value>,
}

/// Status and headers, known before the body arrives.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: IndexMap<String, String>,
}

impl ResponseHead {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// A complete, buffered response.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    pub body: String,
}

impl Response {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn head(&self) -> ResponseHead {
        ResponseHead {
            status: self.status,
            headers: self.headers.clone(),
        }
    }

    pub(crate) fn from_head(head: ResponseHead) -> Self {
        Self {
            status: head.status,
            headers: head.headers,
            body: String::new(),
        }
    }
}

/// Per-chunk callback for streaming dispatch. Receives the response head
/// alongside each raw chunk; returning an error aborts the transfer.
pub type ChunkSink<'a> = &'a mut (dyn FnMut(&ResponseHead, &[u8]) -> Result<()> + Send);

#[async_trait]
pub trait Transport: Send + Sync {
    /// Single request/response exchange with the body fully buffered.
    async fn perform_request(&self, request: TransportRequest) -> Result<Response>;

    /// Dispatches a request and hands received chunks to `on_chunk` as
    /// they arrive, returning the response head once the body ends.
    async fn perform_streaming_request(
        &self,
        request: TransportRequest,
        on_chunk: ChunkSink<'_>,
    ) -> Result<ResponseHead>;
}

/// Default transport on a shared reqwest client.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds the underlying client with the default timeouts
    /// (10 s connect, 30 s request).
    pub fn new() -> Result<Self> {
        Self::with_timeouts(Duration::from_secs(10), Duration::from_secs(30))
    }

    pub fn with_timeouts(connect: Duration, request: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect)
            .timeout(request)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn build(&self, request: &TransportRequest) -> Result<reqwest::RequestBuilder> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let header_name = HeaderName::from_str(name).map_err(|e| Error::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| Error::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            headers.insert(header_name, header_value);
        }

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(headers);

        // read_timeout_ms / timeout_ms override the client-wide request
        // timeout for this call; other options pass through untouched.
        if let Some(ms) = request
            .connection_options
            .get("read_timeout_ms")
            .or_else(|| request.connection_options.get("timeout_ms"))
            .and_then(Value::as_u64)
        {
            builder = builder.timeout(Duration::from_millis(ms));
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        Ok(builder)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn perform_request(&self, request: TransportRequest) -> Result<Response> {
        let response = self
            .build(&request)?
            .send()
            .await
            .map_err(TransportError::from)?;

        let status = response.status().as_u16();
        let headers = header_pairs(response.headers());
        let body = response.text().await.map_err(TransportError::from)?;

        Ok(Response {
            status,
            headers,
            body,
        })
    }

    async fn perform_streaming_request(
        &self,
        request: TransportRequest,
        on_chunk: ChunkSink<'_>,
    ) -> Result<ResponseHead> {
        let response = self
            .build(&request)?
            .send()
            .await
            .map_err(TransportError::from)?;

        let head = ResponseHead {
            status: response.status().as_u16(),
            headers: header_pairs(response.headers()),
        };

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(TransportError::from)?;
            on_chunk(&head, &chunk)?;
        }
        Ok(head)
    }
}

fn header_pairs(headers: &HeaderMap) -> IndexMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                v.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}
