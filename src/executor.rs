//! Per-call orchestration: resolve the request from declared
//! configuration plus call-time overrides, dispatch through the
//! transport with bounded transient retry, validate the response status,
//! and decode or stream the result.

use crate::client::{Blueprint, Client, Scope};
use crate::error::{Error, Result};
use crate::logging;
use crate::query;
use crate::route::{BodyKind, CompiledRoute, ResponseHook, ReturnMode, StreamMode};
use crate::transport::{Response, ResponseHead, TransportRequest};
use indexmap::IndexMap;
use serde_json::Value;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Destination for a streaming route, supplied at call time.
pub enum StreamSink {
    File { path: PathBuf, append: bool },
    Writer(Box<dyn Write + Send>),
    Callback(Box<dyn FnMut(&ResponseHead, &[u8]) -> Result<()> + Send>),
}

impl std::fmt::Debug for StreamSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File { path, append } => f
                .debug_struct("File")
                .field("path", path)
                .field("append", append)
                .finish(),
            Self::Writer(_) => f.write_str("Writer(..)"),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Call-time inputs: named arguments bound to route placeholders plus
/// per-call overrides layered over the declared configuration.
#[derive(Default)]
pub struct CallArgs {
    pub(crate) params: IndexMap<String, Value>,
    pub(crate) query: Option<Value>,
    pub(crate) body: Option<Value>,
    pub(crate) headers: IndexMap<String, String>,
    pub(crate) connection_options: IndexMap<String, Value>,
    pub(crate) on_response: Option<ResponseHook>,
    pub(crate) sink: Option<StreamSink>,
}

impl CallArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a named route parameter.
    #[must_use]
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Supplies the verbatim body for routes with a `body` parameter.
    #[must_use]
    pub fn body_arg(mut self, value: impl Into<Value>) -> Self {
        self.params.insert("body".to_string(), value.into());
        self
    }

    /// Extra query parameters merged over the declared defaults.
    #[must_use]
    pub fn query(mut self, value: Value) -> Self {
        self.query = Some(value);
        self
    }

    /// Call-time body override: merged into a map body, otherwise a full
    /// replacement.
    #[must_use]
    pub fn body(mut self, value: Value) -> Self {
        self.body = Some(value);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn connection_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.connection_options.insert(name.into(), value.into());
        self
    }

    /// Per-call response hook; takes precedence over the hook declared
    /// on the route.
    #[must_use]
    pub fn on_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Client, Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.on_response = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn stream_to_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sink = Some(StreamSink::File {
            path: path.into(),
            append: false,
        });
        self
    }

    #[must_use]
    pub fn stream_append_to_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sink = Some(StreamSink::File {
            path: path.into(),
            append: true,
        });
        self
    }

    #[must_use]
    pub fn stream_to_writer(mut self, writer: Box<dyn Write + Send>) -> Self {
        self.sink = Some(StreamSink::Writer(writer));
        self
    }

    #[must_use]
    pub fn stream_with<F>(mut self, on_chunk: F) -> Self
    where
        F: FnMut(&ResponseHead, &[u8]) -> Result<()> + Send + 'static,
    {
        self.sink = Some(StreamSink::Callback(Box::new(on_chunk)));
        self
    }
}

/// What a call hands back, shaped by the route's return mode.
#[derive(Debug)]
pub enum Reply {
    /// Decoded body, after any response hook.
    Decoded(Value),
    /// Unparsed body text.
    Raw(String),
    /// The transport response itself (also used by streaming routes,
    /// whose body has already gone to the sink).
    Response(Response),
}

impl Reply {
    #[must_use]
    pub fn decoded(self) -> Option<Value> {
        match self {
            Self::Decoded(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn text(self) -> Option<String> {
        match self {
            Self::Raw(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn response(self) -> Option<Response> {
        match self {
            Self::Response(response) => Some(response),
            _ => None,
        }
    }
}

enum Dispatched {
    Buffered(Response),
    Streamed(ResponseHead),
}

/// Runs one route invocation to its terminal state.
pub(crate) async fn execute(
    root: &Client,
    chain: &[Arc<Blueprint>],
    route_name: &str,
    mut args: CallArgs,
) -> Result<Reply> {
    let scope = Scope { root, chain };
    let route = scope.find_route(route_name)?;

    for name in &route.required_params {
        if !args.params.contains_key(name) {
            return Err(Error::MissingArgument {
                route: route_name.to_string(),
                name: name.clone(),
            });
        }
    }
    if route.has_body_param && !args.params.contains_key("body") {
        return Err(Error::MissingArgument {
            route: route_name.to_string(),
            name: "body".to_string(),
        });
    }

    let policy = scope.retry_policy();
    let started = Instant::now();
    let mut attempt = 0u32;
    let outcome = loop {
        attempt += 1;
        match dispatch_once(&scope, &route, &mut args).await {
            Ok(dispatched) => break Ok(dispatched),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    target: "routebind::executor",
                    "attempt {attempt}/{} for `{route_name}` failed ({e}); retrying in {delay:?}",
                    policy.max_attempts
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => break Err(e),
        }
    };
    let elapsed = started.elapsed();
    root.record_elapsed(elapsed);

    match outcome? {
        Dispatched::Buffered(response) => {
            root.record_response(response.clone());
            logging::log_response(response.status, elapsed.as_millis());
            if !expects(&route.expected_statuses, response.status) {
                return Err(Error::unexpected_response(
                    format!("unexpected response status {}", response.status),
                    response,
                ));
            }
            finish(&scope, &route, &mut args, response)
        }
        Dispatched::Streamed(head) => {
            let response = Response::from_head(head);
            root.record_response(response.clone());
            logging::log_response(response.status, elapsed.as_millis());
            if !expects(&route.expected_statuses, response.status) {
                return Err(Error::unexpected_response(
                    format!("unexpected response status {}", response.status),
                    response,
                ));
            }
            Ok(Reply::Response(response))
        }
    }
}

fn finish(
    scope: &Scope<'_>,
    route: &CompiledRoute,
    args: &mut CallArgs,
    response: Response,
) -> Result<Reply> {
    match route.returns {
        ReturnMode::RawResponse => Ok(Reply::Response(response)),
        ReturnMode::RawBody => Ok(Reply::Raw(response.body)),
        ReturnMode::DecodedBody => {
            let decoded = decode_body(&response)?;
            let hook = args.on_response.take().or_else(|| route.callback.clone());
            let value = match hook {
                Some(hook) => hook(scope.root(), decoded)?,
                None => decoded,
            };
            Ok(Reply::Decoded(value))
        }
    }
}

/// Single-attempt dispatch: resolve every request part from instance
/// state and call-time overrides, then hand it to the transport.
async fn dispatch_once(
    scope: &Scope<'_>,
    route: &CompiledRoute,
    args: &mut CallArgs,
) -> Result<Dispatched> {
    let base = scope.base_url()?;
    let path = route.path.render(&route.name, &args.params, scope)?;
    let query_string = build_query_string(scope, route, args)?;

    let mut url = format!("{}{path}", base.trim_end_matches('/'));
    if let Some(q) = &query_string {
        url.push('?');
        url.push_str(q);
    }

    let body = build_body(scope, route, args)?;
    let headers = build_headers(scope, args)?;

    let mut connection_options = scope.resolve_connection_options();
    for (name, value) in &args.connection_options {
        connection_options.insert(name.clone(), value.clone());
    }

    let request = TransportRequest {
        method: route.method.clone(),
        url,
        body,
        headers,
        connection_options,
    };
    logging::log_request(&request);

    if route.stream == StreamMode::None {
        let response = scope.root().transport().perform_request(request).await?;
        return Ok(Dispatched::Buffered(response));
    }

    let expected = route.expected_statuses.clone();
    let check = move |head: &ResponseHead| -> Result<()> {
        if expects(&expected, head.status) {
            Ok(())
        } else {
            Err(Error::unexpected_response(
                format!("unexpected response status {}", head.status),
                Response::from_head(head.clone()),
            ))
        }
    };

    let transport = scope.root().transport();
    let head = match (route.stream, args.sink.as_mut()) {
        (StreamMode::ToFile, Some(StreamSink::File { path, append })) => {
            validate_stream_path(path)?;
            let mut file = open_stream_file(path, *append)?;
            let mut on_chunk = |head: &ResponseHead, chunk: &[u8]| -> Result<()> {
                check(head)?;
                file.write_all(chunk).map_err(Error::Io)
            };
            let head = transport
                .perform_streaming_request(request, &mut on_chunk)
                .await?;
            file.flush()?;
            head
        }
        (StreamMode::ToWriter, Some(StreamSink::Writer(writer))) => {
            let mut on_chunk = |head: &ResponseHead, chunk: &[u8]| -> Result<()> {
                check(head)?;
                writer.write_all(chunk).map_err(Error::Io)
            };
            let head = transport
                .perform_streaming_request(request, &mut on_chunk)
                .await?;
            writer.flush()?;
            head
        }
        (StreamMode::ToCallback, Some(StreamSink::Callback(callback))) => {
            let mut on_chunk = |head: &ResponseHead, chunk: &[u8]| -> Result<()> {
                check(head)?;
                callback(head, chunk)
            };
            transport
                .perform_streaming_request(request, &mut on_chunk)
                .await?
        }
        (mode, _) => {
            return Err(Error::MissingStreamTarget {
                route: route.name.clone(),
                expected: match mode {
                    StreamMode::ToFile => "a file path",
                    StreamMode::ToWriter => "a writer",
                    _ => "a chunk callback",
                },
            })
        }
    };
    Ok(Dispatched::Streamed(head))
}

fn build_query_string(
    scope: &Scope<'_>,
    route: &CompiledRoute,
    args: &CallArgs,
) -> Result<Option<String>> {
    let defaults = scope.resolve_query_defaults()?;
    if route.query.is_none() && defaults.is_empty() && args.query.is_none() {
        return Ok(None);
    }

    let mut merged = serde_json::Map::new();
    for (name, value) in defaults {
        merged.insert(name, value);
    }
    if let Some(over) = &args.query {
        let Value::Object(entries) = over else {
            return Err(Error::Config(
                "call-time query override must be a map".to_string(),
            ));
        };
        for (name, value) in entries {
            merged.insert(name.clone(), value.clone());
        }
    }
    if let Some(template) = &route.query {
        if let Value::Object(entries) = template.render(&route.name, &args.params)? {
            for (name, value) in entries {
                merged.insert(name, value);
            }
        }
    }
    if merged.is_empty() {
        return Ok(None);
    }

    let value = Value::Object(merged);
    let text = match scope.query_encoding() {
        crate::config::QueryEncoding::FormQuery => query::to_query(&value),
        crate::config::QueryEncoding::Custom(f) => f(scope.root(), &value)?,
    };
    Ok((!text.is_empty()).then_some(text))
}

fn build_body(scope: &Scope<'_>, route: &CompiledRoute, args: &CallArgs) -> Result<Option<String>> {
    let built = match &route.body {
        BodyKind::None => None,
        BodyKind::CallerProvided => args.params.get("body").cloned(),
        BodyKind::Template(template) => Some(template.render(&route.name, &args.params)?),
    };
    let Some(mut value) = built else {
        return Ok(None);
    };

    if let Some(over) = &args.body {
        if let (Value::Object(base), Value::Object(entries)) = (&mut value, over) {
            for (name, entry) in entries {
                base.insert(name.clone(), entry.clone());
            }
        } else {
            value = over.clone();
        }
    }

    // An explicit string body goes out untouched.
    if let Value::String(raw) = &value {
        return Ok(Some(raw.clone()));
    }

    let text = match scope.body_encoding() {
        crate::config::BodyEncoding::Json => serde_json::to_string(&value)?,
        crate::config::BodyEncoding::FormQuery => query::to_query(&value),
        crate::config::BodyEncoding::Custom(f) => f(scope.root(), &value)?,
    };
    Ok(Some(text))
}

fn build_headers(scope: &Scope<'_>, args: &CallArgs) -> Result<IndexMap<String, String>> {
    let mut headers = scope.resolve_headers()?;
    for (name, value) in &args.headers {
        headers.insert(name.clone(), value.clone());
    }
    Ok(headers)
}

fn expects(expected: &[String], status: u16) -> bool {
    if expected.is_empty() {
        (200..300).contains(&status)
    } else {
        let status = status.to_string();
        expected.iter().any(|code| *code == status)
    }
}

fn decode_body(response: &Response) -> Result<Value> {
    if response.body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&response.body).map_err(|e| {
        Error::unexpected_response(
            format!("response body is not valid JSON: {e}"),
            response.clone(),
        )
    })
}

fn validate_stream_path(path: &Path) -> Result<()> {
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!(
                "refusing stream destination with parent traversal: {}",
                path.display()
            ),
        )));
    }
    Ok(())
}

fn open_stream_file(path: &Path, append: bool) -> Result<std::fs::File> {
    let file = if append {
        std::fs::OpenOptions::new().create(true).append(true).open(path)?
    } else {
        std::fs::File::create(path)?
    };
    Ok(file)
}
