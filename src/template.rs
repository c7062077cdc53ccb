//! Declarative templates for paths, query structures, and bodies.
//!
//! A template is the declared shape with named placeholders still in it.
//! Placeholder extraction happens once at route-compile time; rendering
//! binds caller arguments (and instance providers, for paths) per call.

use crate::client::Scope;
use crate::error::{Error, Result};
use crate::value::wire_text;
use indexmap::IndexMap;
use serde_json::Value;

/// One piece of a path template.
///
/// `:name` binds a caller argument; `{name}` evaluates a named provider on
/// the client instance. Both are percent-encoded when rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPart {
    Literal(String),
    Param(String),
    Method(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    parts: Vec<PathPart>,
}

impl PathTemplate {
    /// Parses a path template, returning it with the caller-bound
    /// parameter names in order of appearance.
    pub fn parse(path: &str) -> Result<(Self, Vec<String>)> {
        let mut parts = Vec::new();
        let mut params = Vec::new();
        let mut literal = String::new();
        let mut chars = path.char_indices().peekable();

        while let Some((_, ch)) = chars.next() {
            match ch {
                ':' => {
                    let name = take_ident(&mut chars);
                    if name.is_empty() {
                        literal.push(':');
                    } else {
                        flush_literal(&mut parts, &mut literal);
                        params.push(name.clone());
                        parts.push(PathPart::Param(name));
                    }
                }
                '{' => {
                    let name = take_ident(&mut chars);
                    match chars.peek() {
                        Some(&(_, '}')) if !name.is_empty() => {
                            chars.next();
                            flush_literal(&mut parts, &mut literal);
                            parts.push(PathPart::Method(name));
                        }
                        _ => {
                            return Err(Error::Config(format!(
                                "unterminated `{{` placeholder in path `{path}`"
                            )))
                        }
                    }
                }
                _ => literal.push(ch),
            }
        }
        flush_literal(&mut parts, &mut literal);
        Ok((Self { parts }, params))
    }

    /// Substitutes caller arguments and instance providers, escaping each
    /// substituted value for URL-path safety.
    pub(crate) fn render(
        &self,
        route: &str,
        args: &IndexMap<String, Value>,
        scope: &Scope<'_>,
    ) -> Result<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                PathPart::Literal(text) => out.push_str(text),
                PathPart::Param(name) => {
                    let value = args.get(name).ok_or_else(|| Error::MissingArgument {
                        route: route.to_string(),
                        name: name.clone(),
                    })?;
                    out.push_str(&urlencoding::encode(&wire_text(value)));
                }
                PathPart::Method(name) => {
                    let value = scope.eval_provider(name)?;
                    out.push_str(&urlencoding::encode(&wire_text(&value)));
                }
            }
        }
        Ok(out)
    }
}

fn flush_literal(parts: &mut Vec<PathPart>, literal: &mut String) {
    if !literal.is_empty() {
        parts.push(PathPart::Literal(std::mem::take(literal)));
    }
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> String {
    let mut name = String::new();
    while let Some(&(_, ch)) = chars.peek() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            name.push(ch);
            chars.next();
        } else {
            break;
        }
    }
    name
}

/// A piece of an interpolated template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpPart {
    Text(String),
    Param(String),
}

/// A query or body template: the declared structure with placeholders.
#[derive(Debug, Clone)]
pub enum Template {
    Map(Vec<(String, Template)>),
    Seq(Vec<Template>),
    Literal(Value),
    /// A `":name"` string value: the whole slot binds one caller argument.
    Param(String),
    /// A string containing `{name}` references, rendered by substitution.
    Interp(Vec<InterpPart>),
}

impl Template {
    /// Builds a template from a declared JSON-shaped structure.
    ///
    /// String values of the form `":name"` become parameters; strings
    /// containing `{name}` become interpolations. A literal leading colon
    /// can be written as `"::"`.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_value(v)))
                    .collect(),
            ),
            Value::Array(list) => Self::Seq(list.iter().map(Self::from_value).collect()),
            Value::String(s) => from_string(s),
            other => Self::Literal(other.clone()),
        }
    }

    /// Collects parameter names first-seen, depth-first.
    pub(crate) fn collect_params(&self, out: &mut Vec<String>) {
        match self {
            Self::Map(entries) => {
                for (_, template) in entries {
                    template.collect_params(out);
                }
            }
            Self::Seq(items) => {
                for template in items {
                    template.collect_params(out);
                }
            }
            Self::Param(name) => push_unique(out, name),
            Self::Interp(parts) => {
                for part in parts {
                    if let InterpPart::Param(name) = part {
                        push_unique(out, name);
                    }
                }
            }
            Self::Literal(_) => {}
        }
    }

    /// Binds caller arguments, producing the concrete structure.
    pub(crate) fn render(&self, route: &str, args: &IndexMap<String, Value>) -> Result<Value> {
        match self {
            Self::Map(entries) => {
                let mut map = serde_json::Map::new();
                for (key, template) in entries {
                    map.insert(key.clone(), template.render(route, args)?);
                }
                Ok(Value::Object(map))
            }
            Self::Seq(items) => {
                let mut list = Vec::with_capacity(items.len());
                for template in items {
                    list.push(template.render(route, args)?);
                }
                Ok(Value::Array(list))
            }
            Self::Literal(value) => Ok(value.clone()),
            Self::Param(name) => args.get(name).cloned().ok_or_else(|| Error::MissingArgument {
                route: route.to_string(),
                name: name.clone(),
            }),
            Self::Interp(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        InterpPart::Text(text) => out.push_str(text),
                        InterpPart::Param(name) => {
                            let value = args.get(name).ok_or_else(|| Error::MissingArgument {
                                route: route.to_string(),
                                name: name.clone(),
                            })?;
                            out.push_str(&wire_text(value));
                        }
                    }
                }
                Ok(Value::String(out))
            }
        }
    }
}

fn from_string(s: &str) -> Template {
    if let Some(rest) = s.strip_prefix(':') {
        if let Some(escaped) = rest.strip_prefix(':') {
            return interp_or_literal(&format!(":{escaped}"));
        }
        if is_identifier(rest) {
            return Template::Param(rest.to_string());
        }
    }
    interp_or_literal(s)
}

fn interp_or_literal(s: &str) -> Template {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut rest = s;
    let mut found = false;

    while let Some(open) = rest.find('{') {
        if let Some(close) = rest[open..].find('}') {
            let name = &rest[open + 1..open + close];
            if is_identifier(name) {
                found = true;
                text.push_str(&rest[..open]);
                if !text.is_empty() {
                    parts.push(InterpPart::Text(std::mem::take(&mut text)));
                }
                parts.push(InterpPart::Param(name.to_string()));
                rest = &rest[open + close + 1..];
                continue;
            }
        }
        text.push_str(&rest[..=open]);
        rest = &rest[open + 1..];
    }

    if !found {
        return Template::Literal(Value::String(s.to_string()));
    }
    text.push_str(rest);
    if !text.is_empty() {
        parts.push(InterpPart::Text(text));
    }
    Template::Interp(parts)
}

fn push_unique(out: &mut Vec<String>, name: &str) {
    if !out.iter().any(|existing| existing == name) {
        out.push(name.to_string());
    }
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
