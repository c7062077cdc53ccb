//! Nested sections and configuration inheritance.
//!
//! A section is a sub-client scoped under a parent: it keeps its own
//! routes and configuration overrides while delegating dispatch,
//! streaming, and instance state to the root instance, so a token stored
//! by a section callback is visible to the root and to sibling sections.
//!
//! Inheritance is an explicit chain of blueprints from the root scope to
//! the section being called, resolved top-down per call.

use crate::client::{Client, Scope};
use crate::config::{BodyEncoding, QueryEncoding};
use crate::error::{Error, Result};
use crate::executor::{CallArgs, Reply};
use crate::retry::RetryPolicy;
use crate::value::wire_text;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct SectionInner {
    root: Client,
    chain: Vec<Arc<crate::client::Blueprint>>,
    sections: Mutex<HashMap<String, Section>>,
}

/// A section instance. Created lazily on first access and cached on its
/// owner; cheap to clone.
#[derive(Clone)]
pub struct Section {
    inner: Arc<SectionInner>,
}

impl Section {
    pub(crate) fn new(root: Client, chain: Vec<Arc<crate::client::Blueprint>>) -> Self {
        Self {
            inner: Arc::new(SectionInner {
                root,
                chain,
                sections: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.chain.last().expect("empty section chain").name
    }

    /// The root (top-most non-section) client instance.
    #[must_use]
    pub fn root(&self) -> &Client {
        &self.inner.root
    }

    /// Invokes a route declared on this section.
    pub async fn call(&self, route: &str, args: CallArgs) -> Result<Reply> {
        crate::executor::execute(&self.inner.root, &self.inner.chain, route, args).await
    }

    /// Descends into a nested section, creating and caching it on first
    /// access.
    pub fn section(&self, name: &str) -> Result<Self> {
        let mut cache = self.inner.sections.lock().expect("section cache poisoned");
        if let Some(section) = cache.get(name) {
            return Ok(section.clone());
        }
        let own = self.inner.chain.last().expect("empty section chain");
        let blueprint = own.sections.get(name).ok_or_else(|| {
            Error::Config(format!("section `{}` has no section `{name}`", own.name))
        })?;
        let mut chain = self.inner.chain.clone();
        chain.push(Arc::clone(blueprint));
        let section = Self::new(self.inner.root.clone(), chain);
        cache.insert(name.to_string(), section.clone());
        Ok(section)
    }
}

// Chain resolution. Each method walks the blueprint chain; sections
// override or extend what their ancestors declared.
impl Scope<'_> {
    /// Innermost base URL wins; a section without one falls back to its
    /// parent, recursively.
    pub(crate) fn base_url(&self) -> Result<&str> {
        self.chain
            .iter()
            .rev()
            .find_map(|bp| bp.config.base_url())
            .ok_or_else(|| Error::Config("no base URL configured".to_string()))
    }

    /// Parent defaults overlaid with section headers, top-down. A scope
    /// declared with `ignore_parent_headers` restarts the accumulation,
    /// so only its own (and deeper) headers apply.
    pub(crate) fn resolve_headers(&self) -> Result<IndexMap<String, String>> {
        let mut resolved = IndexMap::new();
        for blueprint in self.chain {
            if blueprint.ignore_parent_headers {
                resolved.clear();
            }
            for (name, source) in blueprint.config.headers() {
                resolved.insert(name.clone(), wire_text(&source.resolve(self)?));
            }
        }
        Ok(resolved)
    }

    /// Default query parameters, same overlay rules as headers with
    /// `ignore_parent_query`.
    pub(crate) fn resolve_query_defaults(&self) -> Result<IndexMap<String, Value>> {
        let mut resolved = IndexMap::new();
        for blueprint in self.chain {
            if blueprint.ignore_parent_query {
                resolved.clear();
            }
            for (name, source) in blueprint.config.query_params() {
                resolved.insert(name.clone(), source.resolve(self)?);
            }
        }
        Ok(resolved)
    }

    /// Connection options overlay key by key, section values winning.
    pub(crate) fn resolve_connection_options(&self) -> IndexMap<String, Value> {
        let mut resolved = IndexMap::new();
        for blueprint in self.chain {
            for (name, value) in blueprint.config.connection_options() {
                resolved.insert(name.clone(), value.clone());
            }
        }
        resolved
    }

    /// Innermost explicitly-set policy wins; otherwise the default
    /// single attempt.
    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        self.chain
            .iter()
            .rev()
            .find_map(|bp| bp.config.retry_policy())
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn body_encoding(&self) -> BodyEncoding {
        self.chain
            .iter()
            .rev()
            .find_map(|bp| bp.config.body_encoding())
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn query_encoding(&self) -> QueryEncoding {
        self.chain
            .iter()
            .rev()
            .find_map(|bp| bp.config.query_encoding())
            .cloned()
            .unwrap_or_default()
    }
}
