//! Client declaration and runtime instances.
//!
//! [`ClientBuilder`] is the declaration surface: configuration, routes,
//! providers, and sections accumulate on it, and [`ClientBuilder::build`]
//! seals everything into an immutable blueprint. [`Client`] is the
//! runtime instance: it owns the transport, the instance state shared
//! with sections, and the generic `call` dispatch.

use crate::config::{BodyEncoding, ClientConfig, QueryEncoding};
use crate::error::{Error, Result};
use crate::executor::{self, CallArgs, Reply};
use crate::retry::RetryPolicy;
use crate::route::{self, CompiledRoute, RouteSpec};
use crate::section::Section;
use crate::template::is_identifier;
use crate::transport::{HttpTransport, Response, Transport};
use crate::value::ValueSource;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Named value provider evaluated against the root instance, the Rust
/// rendition of "call this instance method".
pub type Provider = Arc<dyn Fn(&Client) -> Value + Send + Sync>;

/// Sealed declaration of one configuration scope (root client or
/// section): config, compiled routes, providers, nested sections.
pub(crate) struct Blueprint {
    pub(crate) name: String,
    pub(crate) config: ClientConfig,
    pub(crate) routes: IndexMap<String, CompiledRoute>,
    pub(crate) providers: IndexMap<String, Provider>,
    pub(crate) sections: IndexMap<String, Arc<Blueprint>>,
    pub(crate) ignore_parent_headers: bool,
    pub(crate) ignore_parent_query: bool,
}

/// Declarative builder for a client type.
///
/// Configuration accessors accumulate; `route` compiles immediately, so
/// declaration errors surface at the declaration site. The builder is
/// the only mutation window: after [`build`](Self::build) the client is
/// immutable.
pub struct ClientBuilder {
    name: String,
    config: ClientConfig,
    routes: IndexMap<String, CompiledRoute>,
    providers: IndexMap<String, Provider>,
    sections: IndexMap<String, Arc<Blueprint>>,
    namespace: String,
    ignore_parent_headers: bool,
    ignore_parent_query: bool,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: ClientConfig::new(),
            routes: IndexMap::new(),
            providers: IndexMap::new(),
            sections: IndexMap::new(),
            namespace: String::new(),
            ignore_parent_headers: false,
            ignore_parent_query: false,
            transport: None,
        }
    }

    /// Sets the base URL (http or https only).
    pub fn base_url(mut self, url: impl Into<String>) -> Result<Self> {
        self.config = self.config.set_base_url(url)?;
        Ok(self)
    }

    /// Adds a default header sent with every request of this scope.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<ValueSource>) -> Self {
        self.config = self.config.add_header(name, value);
        self
    }

    /// Adds a default query parameter sent with every request.
    #[must_use]
    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<ValueSource>) -> Self {
        self.config = self.config.add_query_param(name, value);
        self
    }

    #[must_use]
    pub fn connection_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config = self.config.set_connection_option(name, value);
        self
    }

    #[must_use]
    pub fn body_encoding(mut self, encoding: BodyEncoding) -> Self {
        self.config = self.config.set_body_encoding(encoding);
        self
    }

    #[must_use]
    pub fn query_encoding(mut self, encoding: QueryEncoding) -> Self {
        self.config = self.config.set_query_encoding(encoding);
        self
    }

    /// Shorthand for a fixed-delay retry policy.
    #[must_use]
    pub fn retries(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.config = self
            .config
            .set_retry_policy(RetryPolicy::new(max_attempts, delay));
        self
    }

    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config = self.config.set_retry_policy(policy);
        self
    }

    /// Registers a named provider, referenced by `{name}` path
    /// placeholders and [`ValueSource::FromMethod`] values.
    #[must_use]
    pub fn provider<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Client) -> Value + Send + Sync + 'static,
    {
        self.providers.insert(name.into(), Arc::new(f));
        self
    }

    /// Declares a route. Compilation happens here: the verb is fixed,
    /// templates are analyzed, and the required parameter set is cached.
    pub fn route(mut self, spec: RouteSpec) -> Result<Self> {
        let compiled = route::compile(&spec, &self.namespace)?;
        self.routes.insert(compiled.name().to_string(), compiled);
        Ok(self)
    }

    /// Declares routes under a path prefix. Nested namespaces
    /// concatenate; the prefix applies only to routes declared inside
    /// the closure.
    pub fn namespace<F>(mut self, prefix: &str, f: F) -> Result<Self>
    where
        F: FnOnce(Self) -> Result<Self>,
    {
        let saved = self.namespace.clone();
        self.namespace = format!("{}{prefix}", self.namespace);
        let mut built = f(self)?;
        built.namespace = saved;
        Ok(built)
    }

    /// Declares a nested section: a sub-client reachable as
    /// `client.section(name)`, inheriting this scope's configuration.
    /// Sections nest without bound.
    pub fn section<F>(mut self, name: &str, f: F) -> Result<Self>
    where
        F: FnOnce(Self) -> Result<Self>,
    {
        if !is_identifier(name) {
            return Err(Error::Config(format!(
                "section name `{name}` is not a valid identifier"
            )));
        }
        let child = f(Self::new(name))?;
        if child.transport.is_some() {
            return Err(Error::Config(format!(
                "section `{name}` cannot carry its own transport"
            )));
        }
        self.sections.insert(name.to_string(), Arc::new(child.into_blueprint()));
        Ok(self)
    }

    /// Drops inherited parent headers for this section; only its own
    /// declared headers apply.
    #[must_use]
    pub const fn ignore_parent_headers(mut self) -> Self {
        self.ignore_parent_headers = true;
        self
    }

    /// Drops inherited parent query parameters for this section.
    #[must_use]
    pub const fn ignore_parent_query(mut self) -> Self {
        self.ignore_parent_query = true;
        self
    }

    /// Replaces the default reqwest-backed transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    fn into_blueprint(self) -> Blueprint {
        Blueprint {
            name: self.name,
            config: self.config,
            routes: self.routes,
            providers: self.providers,
            sections: self.sections,
            ignore_parent_headers: self.ignore_parent_headers,
            ignore_parent_query: self.ignore_parent_query,
        }
    }

    /// Seals the declaration and produces a ready client instance.
    pub fn build(mut self) -> Result<Client> {
        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };
        Ok(Client {
            inner: Arc::new(ClientInner {
                blueprint: Arc::new(self.into_blueprint()),
                transport,
                state: Mutex::new(IndexMap::new()),
                last_response: Mutex::new(None),
                last_elapsed: Mutex::new(None),
                sections: Mutex::new(HashMap::new()),
            }),
        })
    }
}

struct ClientInner {
    blueprint: Arc<Blueprint>,
    transport: Arc<dyn Transport>,
    state: Mutex<IndexMap<String, Value>>,
    last_response: Mutex<Option<Response>>,
    last_elapsed: Mutex<Option<Duration>>,
    sections: Mutex<HashMap<String, Section>>,
}

/// A root client instance.
///
/// Cheap to clone; clones share the transport, instance state, and
/// section cache. A single instance is meant for one logical caller at
/// a time: concurrent calls through one instance race on the
/// introspection fields (`last_response`, `last_elapsed`).
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.blueprint.name
    }

    /// Invokes a compiled route by name.
    pub async fn call(&self, route: &str, args: CallArgs) -> Result<Reply> {
        let chain = [Arc::clone(&self.inner.blueprint)];
        executor::execute(self, &chain, route, args).await
    }

    /// Returns the named section instance, creating and caching it on
    /// first access.
    pub fn section(&self, name: &str) -> Result<Section> {
        let mut cache = self.inner.sections.lock().expect("section cache poisoned");
        if let Some(section) = cache.get(name) {
            return Ok(section.clone());
        }
        let blueprint = self.inner.blueprint.sections.get(name).ok_or_else(|| {
            Error::Config(format!("client `{}` has no section `{name}`", self.name()))
        })?;
        let chain = vec![Arc::clone(&self.inner.blueprint), Arc::clone(blueprint)];
        let section = Section::new(self.clone(), chain);
        cache.insert(name.to_string(), section.clone());
        Ok(section)
    }

    /// Compiled route introspection, mainly for tooling and tests.
    #[must_use]
    pub fn route(&self, name: &str) -> Option<&CompiledRoute> {
        self.inner.blueprint.routes.get(name)
    }

    /// Stores an instance-state value, visible to providers and to all
    /// sections of this instance.
    pub fn set_state(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.inner
            .state
            .lock()
            .expect("state poisoned")
            .insert(name.into(), value.into());
    }

    #[must_use]
    pub fn state(&self, name: &str) -> Option<Value> {
        self.inner.state.lock().expect("state poisoned").get(name).cloned()
    }

    /// The raw response of the most recent completed dispatch.
    #[must_use]
    pub fn last_response(&self) -> Option<Response> {
        self.inner
            .last_response
            .lock()
            .expect("last_response poisoned")
            .clone()
    }

    /// Wall-clock duration of the most recent call, retries included.
    #[must_use]
    pub fn last_elapsed(&self) -> Option<Duration> {
        *self.inner.last_elapsed.lock().expect("last_elapsed poisoned")
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub(crate) fn record_response(&self, response: Response) {
        *self
            .inner
            .last_response
            .lock()
            .expect("last_response poisoned") = Some(response);
    }

    pub(crate) fn record_elapsed(&self, elapsed: Duration) {
        *self.inner.last_elapsed.lock().expect("last_elapsed poisoned") = Some(elapsed);
    }
}

/// The resolution context for one call: the root instance plus the
/// blueprint chain from the root scope down to the scope being called.
pub(crate) struct Scope<'a> {
    pub(crate) root: &'a Client,
    pub(crate) chain: &'a [Arc<Blueprint>],
}

impl Scope<'_> {
    pub(crate) fn root(&self) -> &Client {
        self.root
    }

    /// Looks up a named provider from the innermost scope outward, then
    /// falls back to root instance state.
    pub(crate) fn eval_provider(&self, name: &str) -> Result<Value> {
        for blueprint in self.chain.iter().rev() {
            if let Some(provider) = blueprint.providers.get(name) {
                return Ok(provider(self.root));
            }
        }
        self.root
            .state(name)
            .ok_or_else(|| Error::UnresolvedValue {
                name: name.to_string(),
            })
    }

    pub(crate) fn find_route(&self, name: &str) -> Result<CompiledRoute> {
        let scope = self.chain.last().expect("empty scope chain");
        scope
            .routes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownRoute {
                route: name.to_string(),
            })
    }
}
