//! Header and query parameter values resolved per request.

use crate::client::{Client, Scope};
use crate::error::Result;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A default header or query parameter declared on a client.
///
/// Three cases: a literal sent as-is, a named provider evaluated against
/// the root instance at call time, or a closure over the root instance.
#[derive(Clone)]
pub enum ValueSource {
    Literal(Value),
    FromMethod(String),
    Computed(Arc<dyn Fn(&Client) -> Value + Send + Sync>),
}

impl ValueSource {
    #[must_use]
    pub fn from_method(name: impl Into<String>) -> Self {
        Self::FromMethod(name.into())
    }

    #[must_use]
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Client) -> Value + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }

    /// Resolves to a concrete value in the context of a client instance.
    pub(crate) fn resolve(&self, scope: &Scope<'_>) -> Result<Value> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::FromMethod(name) => scope.eval_provider(name),
            Self::Computed(f) => Ok(f(scope.root())),
        }
    }
}

impl fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::FromMethod(name) => f.debug_tuple("FromMethod").field(name).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<Value> for ValueSource {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for ValueSource {
    fn from(value: &str) -> Self {
        Self::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for ValueSource {
    fn from(value: String) -> Self {
        Self::Literal(Value::String(value))
    }
}

impl From<i64> for ValueSource {
    fn from(value: i64) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<i32> for ValueSource {
    fn from(value: i32) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<bool> for ValueSource {
    fn from(value: bool) -> Self {
        Self::Literal(Value::Bool(value))
    }
}

/// Renders a resolved value the way it appears on the wire: strings bare,
/// everything else in its JSON form.
#[must_use]
pub fn wire_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
