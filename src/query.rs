//! Recursive bracket-notation query string encoding.
//!
//! Nested maps become `parent[child]=v`, sequences become `parent[]=v`,
//! preserving insertion order at every level. Encoding is deterministic:
//! the same input always produces the same string.

use serde_json::Value;
use std::sync::Arc;

/// Pluggable escape function. The default percent-encodes per URL
/// form-encoding rules, with spaces as `+`.
pub type EscapeFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Form-encodes a single token, space as `+`.
#[must_use]
pub fn form_escape(raw: &str) -> String {
    urlencoding::encode(raw).replace("%20", "+")
}

/// Encodes nested structures into a query string.
///
/// Stateless apart from its separators and escape function; one instance
/// can serve any number of requests.
#[derive(Clone)]
pub struct QueryEncoder {
    name_value_separator: String,
    param_separator: String,
    escape: Option<EscapeFn>,
}

impl Default for QueryEncoder {
    fn default() -> Self {
        Self {
            name_value_separator: "=".to_string(),
            param_separator: "&".to_string(),
            escape: None,
        }
    }
}

impl QueryEncoder {
    #[must_use]
    pub fn new(name_value_separator: &str, param_separator: &str) -> Self {
        Self {
            name_value_separator: name_value_separator.to_string(),
            param_separator: param_separator.to_string(),
            escape: None,
        }
    }

    /// Replaces the default form-encoding escape with a custom function.
    #[must_use]
    pub fn with_escape(mut self, escape: EscapeFn) -> Self {
        self.escape = Some(escape);
        self
    }

    /// Encodes `value` under an optional namespace.
    ///
    /// A scalar with a namespace yields `ns=v`; without one, just `v`.
    /// `null` encodes as an empty string after the separator.
    #[must_use]
    pub fn encode(&self, value: &Value, namespace: Option<&str>) -> String {
        match value {
            Value::Object(map) => self
                .pairs_from_map(map, namespace.map(|ns| self.escape(ns)))
                .join(&self.param_separator),
            Value::Array(list) => {
                let ns = namespace.map_or_else(|| "[]".to_string(), |ns| format!("{}[]", self.escape(ns)));
                self.pairs_from_seq(list, &ns).join(&self.param_separator)
            }
            scalar => match namespace {
                Some(ns) => format!(
                    "{}{}{}",
                    self.escape(ns),
                    self.name_value_separator,
                    self.escape(&scalar_text(scalar))
                ),
                None => self.escape(&scalar_text(scalar)),
            },
        }
    }

    fn pairs_from_map(&self, map: &serde_json::Map<String, Value>, namespace: Option<String>) -> Vec<String> {
        let mut pairs = Vec::new();
        for (key, value) in map {
            let child = match &namespace {
                Some(ns) => format!("{ns}[{}]", self.escape(key)),
                None => self.escape(key),
            };
            match value {
                Value::Object(inner) => pairs.extend(self.pairs_from_map(inner, Some(child))),
                Value::Array(inner) => pairs.extend(self.pairs_from_seq(inner, &format!("{child}[]"))),
                scalar => pairs.push(format!(
                    "{child}{}{}",
                    self.name_value_separator,
                    self.escape(&scalar_text(scalar))
                )),
            }
        }
        pairs
    }

    fn pairs_from_seq(&self, list: &[Value], namespace: &str) -> Vec<String> {
        let mut pairs = Vec::new();
        for value in list {
            match value {
                Value::Object(inner) => pairs.extend(self.pairs_from_map(inner, Some(namespace.to_string()))),
                Value::Array(inner) => pairs.extend(self.pairs_from_seq(inner, &format!("{namespace}[]"))),
                scalar => pairs.push(format!(
                    "{namespace}{}{}",
                    self.name_value_separator,
                    self.escape(&scalar_text(scalar))
                )),
            }
        }
        pairs
    }

    fn escape(&self, raw: &str) -> String {
        self.escape.as_ref().map_or_else(|| form_escape(raw), |f| f(raw))
    }
}

/// Encodes with the default separators and escape.
#[must_use]
pub fn to_query(value: &Value) -> String {
    QueryEncoder::default().encode(value, None)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
