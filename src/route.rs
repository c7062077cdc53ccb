//! Route declaration and compilation.
//!
//! A [`RouteSpec`] is the declarative description a caller writes; a
//! [`CompiledRoute`] is the analyzed artifact built once at declaration
//! time and reused for every call: verb, path template, required
//! parameter set, expected statuses, stream and return modes.

use crate::client::Client;
use crate::error::{Error, Result};
use crate::template::{is_identifier, PathTemplate, Template};
use reqwest::Method;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Post-processing hook evaluated with the decoded response body in the
/// context of the root client instance.
pub type ResponseHook = Arc<dyn Fn(&Client, Value) -> Result<Value> + Send + Sync>;

/// What to do with the response body as it arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    #[default]
    None,
    ToFile,
    ToWriter,
    ToCallback,
}

/// What the compiled method hands back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnMode {
    /// Parse the body as JSON and return the decoded value
    /// (after any response hook).
    #[default]
    DecodedBody,
    /// The unparsed body text.
    RawBody,
    /// The transport response, untouched.
    RawResponse,
}

/// Declarative description of one route.
#[derive(Clone, Default)]
pub struct RouteSpec {
    name: String,
    path: String,
    method: Option<Method>,
    query: Option<Value>,
    body: Option<Value>,
    expected_statuses: Vec<u16>,
    stream: StreamMode,
    returns: ReturnMode,
    no_body: Option<bool>,
    has_body: Option<bool>,
    callback: Option<ResponseHook>,
}

impl RouteSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Sets the HTTP verb explicitly, overriding name-based inference.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Declares the query template. Must be a map at the top level;
    /// `":name"` values bind caller arguments.
    #[must_use]
    pub fn query(mut self, template: Value) -> Self {
        self.query = Some(template);
        self
    }

    /// Declares the body template. `":name"` values bind caller
    /// arguments; a plain string body is sent unencoded.
    #[must_use]
    pub fn body(mut self, template: Value) -> Self {
        self.body = Some(template);
        self
    }

    #[must_use]
    pub fn expect_status(mut self, code: u16) -> Self {
        self.expected_statuses.push(code);
        self
    }

    #[must_use]
    pub fn expect_statuses(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.expected_statuses.extend(codes);
        self
    }

    #[must_use]
    pub const fn stream(mut self, mode: StreamMode) -> Self {
        self.stream = mode;
        self
    }

    #[must_use]
    pub const fn returning(mut self, mode: ReturnMode) -> Self {
        self.returns = mode;
        self
    }

    /// Declares that the route sends no body even if the verb usually
    /// requires one.
    #[must_use]
    pub const fn no_body(mut self) -> Self {
        self.no_body = Some(true);
        self
    }

    /// Declares that the route takes a `body` argument even if the verb
    /// usually has none.
    #[must_use]
    pub const fn has_body(mut self) -> Self {
        self.has_body = Some(true);
        self
    }

    /// Installs the default decoding hook for this route. A hook passed
    /// at call time takes precedence.
    #[must_use]
    pub fn on_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Client, Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(hook));
        self
    }
}

/// How the request body is produced at call time.
#[derive(Clone)]
pub(crate) enum BodyKind {
    None,
    Template(Template),
    /// No template was declared but the verb requires a body: the caller
    /// passes it verbatim through a required `body` argument.
    CallerProvided,
}

/// The cached compilation artifact for one route.
#[derive(Clone)]
pub struct CompiledRoute {
    pub(crate) name: String,
    pub(crate) method: Method,
    pub(crate) path: PathTemplate,
    pub(crate) query: Option<Template>,
    pub(crate) body: BodyKind,
    pub(crate) required_params: Vec<String>,
    pub(crate) has_body_param: bool,
    pub(crate) expected_statuses: Vec<String>,
    pub(crate) stream: StreamMode,
    pub(crate) returns: ReturnMode,
    pub(crate) callback: Option<ResponseHook>,
}

impl CompiledRoute {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Named parameters the caller must supply: path parameters first,
    /// then query placeholders, then body placeholders, deduplicated
    /// keeping the first occurrence.
    #[must_use]
    pub fn required_params(&self) -> &[String] {
        &self.required_params
    }

    /// True when the route has no body template but its verb requires a
    /// body, so the caller passes one verbatim.
    #[must_use]
    pub const fn has_body_param(&self) -> bool {
        self.has_body_param
    }

    #[must_use]
    pub fn expected_statuses(&self) -> &[String] {
        &self.expected_statuses
    }

    #[must_use]
    pub const fn stream_mode(&self) -> StreamMode {
        self.stream
    }

    #[must_use]
    pub const fn return_mode(&self) -> ReturnMode {
        self.returns
    }
}

impl fmt::Debug for CompiledRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRoute")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("required_params", &self.required_params)
            .field("has_body_param", &self.has_body_param)
            .field("expected_statuses", &self.expected_statuses)
            .field("stream", &self.stream)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

/// Infers the HTTP verb from the route name prefix. First match wins;
/// anything unmatched is a GET.
#[must_use]
pub fn infer_method(name: &str) -> Method {
    let lower = name.to_ascii_lowercase();
    const POST: [&str; 4] = ["post", "create", "add", "insert"];
    const PUT: [&str; 4] = ["put", "update", "modify", "change"];
    const DELETE: [&str; 2] = ["delete", "remove"];

    if POST.iter().any(|p| lower.starts_with(p)) {
        Method::POST
    } else if PUT.iter().any(|p| lower.starts_with(p)) {
        Method::PUT
    } else if DELETE.iter().any(|p| lower.starts_with(p)) {
        Method::DELETE
    } else {
        Method::GET
    }
}

fn requires_body(method: &Method, no_body: Option<bool>, has_body: Option<bool>) -> bool {
    if let Some(no) = no_body {
        return !no;
    }
    if let Some(has) = has_body {
        return has;
    }
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

/// Compiles a route declaration under a namespace prefix.
///
/// Pure: the same spec and namespace always produce an equivalent
/// artifact, so compilation can run at any point during declaration.
pub fn compile(spec: &RouteSpec, namespace: &str) -> Result<CompiledRoute> {
    if !is_identifier(&spec.name) {
        return Err(Error::Config(format!(
            "route name `{}` is not a valid identifier",
            spec.name
        )));
    }

    let method = spec
        .method
        .clone()
        .unwrap_or_else(|| infer_method(&spec.name));

    let full_path = format!("{namespace}{}", spec.path);
    let (path, path_params) = PathTemplate::parse(&full_path)?;

    let query = match &spec.query {
        Some(value) => {
            if !value.is_object() {
                return Err(Error::Config(format!(
                    "route `{}`: query template must be a map",
                    spec.name
                )));
            }
            Some(Template::from_value(value))
        }
        None => None,
    };

    let (body, has_body_param) = match &spec.body {
        Some(value) => (BodyKind::Template(Template::from_value(value)), false),
        None if requires_body(&method, spec.no_body, spec.has_body) => {
            (BodyKind::CallerProvided, true)
        }
        None => (BodyKind::None, false),
    };

    let mut required_params = path_params;
    if let Some(template) = &query {
        template.collect_params(&mut required_params);
    }
    if let BodyKind::Template(template) = &body {
        template.collect_params(&mut required_params);
    }

    let expected_statuses = spec
        .expected_statuses
        .iter()
        .map(ToString::to_string)
        .collect();

    Ok(CompiledRoute {
        name: spec.name.clone(),
        method,
        path,
        query,
        body,
        required_params,
        has_body_param,
        expected_statuses,
        stream: spec.stream,
        returns: spec.returns,
        callback: spec.callback.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn verb_inference_by_name_prefix() {
        assert_eq!(infer_method("get_user"), Method::GET);
        assert_eq!(infer_method("create_user"), Method::POST);
        assert_eq!(infer_method("AddWidget"), Method::POST);
        assert_eq!(infer_method("update_user"), Method::PUT);
        assert_eq!(infer_method("change_password"), Method::PUT);
        assert_eq!(infer_method("delete_user"), Method::DELETE);
        assert_eq!(infer_method("remove_tag"), Method::DELETE);
        assert_eq!(infer_method("unknown"), Method::GET);
    }

    #[test]
    fn explicit_method_overrides_inference() {
        let route = compile(
            &RouteSpec::new("create_user", "/users").method(Method::GET),
            "",
        )
        .unwrap();
        assert_eq!(route.method, Method::GET);
        assert!(!route.has_body_param);
    }

    #[test]
    fn path_then_query_params_deduplicated() {
        let route = compile(
            &RouteSpec::new("get_user", "/users/:id").query(json!({"app_id": ":app_id", "id": ":id"})),
            "",
        )
        .unwrap();
        assert_eq!(route.required_params, vec!["id", "app_id"]);
        assert_eq!(route.method, Method::GET);
        assert!(matches!(route.body, BodyKind::None));
    }

    #[test]
    fn post_without_template_takes_body_param() {
        let route = compile(&RouteSpec::new("create_user", "/users"), "").unwrap();
        assert!(route.has_body_param);
        assert!(matches!(route.body, BodyKind::CallerProvided));
    }

    #[test]
    fn no_body_overrides_inference() {
        let route = compile(&RouteSpec::new("create_token", "/tokens").no_body(), "").unwrap();
        assert!(!route.has_body_param);
        assert!(matches!(route.body, BodyKind::None));
    }

    #[test]
    fn has_body_forces_body_param_on_get() {
        let route = compile(&RouteSpec::new("search", "/search").has_body(), "").unwrap();
        assert_eq!(route.method, Method::GET);
        assert!(route.has_body_param);
    }

    #[test]
    fn no_body_wins_over_has_body() {
        let route = compile(
            &RouteSpec::new("create_user", "/users").no_body().has_body(),
            "",
        )
        .unwrap();
        assert!(!route.has_body_param);
    }

    #[test]
    fn statuses_are_stringified() {
        let route = compile(
            &RouteSpec::new("create_user", "/users").expect_statuses([201, 202]),
            "",
        )
        .unwrap();
        assert_eq!(route.expected_statuses, vec!["201", "202"]);
    }

    #[test]
    fn namespace_prefixes_the_path() {
        let route = compile(&RouteSpec::new("get_user", "/users/:id"), "/api/v2").unwrap();
        let rendered_empty = format!("{:?}", route.path);
        assert!(rendered_empty.contains("/api/v2/users/"));
    }

    #[test]
    fn rejects_invalid_route_names() {
        assert!(compile(&RouteSpec::new("9lives", "/cats"), "").is_err());
        assert!(compile(&RouteSpec::new("bad-name", "/x"), "").is_err());
        assert!(compile(&RouteSpec::new("", "/x"), "").is_err());
        assert!(compile(&RouteSpec::new("ok_name", "/x"), "").is_ok());
    }

    #[test]
    fn rejects_non_map_query_template() {
        assert!(compile(
            &RouteSpec::new("get_user", "/users/:id").query(json!([1, 2])),
            ""
        )
        .is_err());
    }

    #[test]
    fn compilation_is_idempotent() {
        let spec = RouteSpec::new("get_user", "/users/:id")
            .query(json!({"app_id": ":app_id"}))
            .expect_status(200);
        let first = compile(&spec, "").unwrap();
        let second = compile(&spec, "").unwrap();
        assert_eq!(first.required_params, second.required_params);
        assert_eq!(first.method, second.method);
        assert_eq!(first.expected_statuses, second.expected_statuses);
        assert_eq!(first.has_body_param, second.has_body_param);
    }
}
