//! Per-client configuration: accumulated during declaration, immutable
//! once the client is built.

use crate::client::Client;
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::value::ValueSource;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Encoder invoked with the instance context and the value to serialize.
/// Covers both ad-hoc closures and "call this method on the instance"
/// style strategies.
pub type EncodeFn = Arc<dyn Fn(&Client, &Value) -> Result<String> + Send + Sync>;

/// How request bodies are serialized.
#[derive(Clone, Default)]
pub enum BodyEncoding {
    /// Structured value to JSON text.
    #[default]
    Json,
    /// Bracket-notation form encoding via [`crate::query::QueryEncoder`].
    FormQuery,
    Custom(EncodeFn),
}

impl fmt::Debug for BodyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("Json"),
            Self::FormQuery => f.write_str("FormQuery"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// How query structures are serialized.
#[derive(Clone, Default)]
pub enum QueryEncoding {
    #[default]
    FormQuery,
    Custom(EncodeFn),
}

impl fmt::Debug for QueryEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FormQuery => f.write_str("FormQuery"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One configuration scope: the root client or a section.
///
/// Fields left unset inherit from the parent scope at call time; maps
/// overlay parent entries key by key. Every setter consumes and returns
/// the snapshot, so declaration reads as a chain and intermediate states
/// are never observable.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    base_url: Option<String>,
    headers: IndexMap<String, ValueSource>,
    query_params: IndexMap<String, ValueSource>,
    connection_options: IndexMap<String, Value>,
    body_encoding: Option<BodyEncoding>,
    query_encoding: Option<QueryEncoding>,
    retry: Option<RetryPolicy>,
}

impl ClientConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL. Only `http` and `https` schemes are accepted.
    pub fn set_base_url(mut self, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        validate_base_url(&url)?;
        self.base_url = Some(url);
        Ok(self)
    }

    #[must_use]
    pub fn add_header(mut self, name: impl Into<String>, value: impl Into<ValueSource>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn add_query_param(mut self, name: impl Into<String>, value: impl Into<ValueSource>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn set_connection_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.connection_options.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn set_body_encoding(mut self, encoding: BodyEncoding) -> Self {
        self.body_encoding = Some(encoding);
        self
    }

    #[must_use]
    pub fn set_query_encoding(mut self, encoding: QueryEncoding) -> Self {
        self.query_encoding = Some(encoding);
        self
    }

    #[must_use]
    pub fn set_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    #[must_use]
    pub fn headers(&self) -> &IndexMap<String, ValueSource> {
        &self.headers
    }

    #[must_use]
    pub fn query_params(&self) -> &IndexMap<String, ValueSource> {
        &self.query_params
    }

    #[must_use]
    pub fn connection_options(&self) -> &IndexMap<String, Value> {
        &self.connection_options
    }

    #[must_use]
    pub fn body_encoding(&self) -> Option<&BodyEncoding> {
        self.body_encoding.as_ref()
    }

    #[must_use]
    pub fn query_encoding(&self) -> Option<&QueryEncoding> {
        self.query_encoding.as_ref()
    }

    #[must_use]
    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }
}

fn validate_base_url(url: &str) -> Result<()> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| Error::Config(format!("invalid base URL `{url}`: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(Error::Config(format!(
            "base URL scheme `{scheme}` is not allowed; use http or https"
        ))),
    }
}
