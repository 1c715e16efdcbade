//! Search parameter definitions and value matchers.
//!
//! Each resource type has a static catalog of [`ParamDef`]s; a definition
//! knows how to test a candidate resource for a match. The catalogs cover
//! the parameters the engine itself needs for conditional operations plus
//! the common client-facing ones.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Parameter value semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchParamKind {
    /// Code or identifier, optionally system-qualified (`system|code`).
    Token,
    /// Case-insensitive prefix match.
    String,
    /// Match against a reference field.
    Reference,
    /// Instant comparison with prefixes.
    Date,
}

impl fmt::Display for SearchParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchParamKind::Token => write!(f, "token"),
            SearchParamKind::String => write!(f, "string"),
            SearchParamKind::Reference => write!(f, "reference"),
            SearchParamKind::Date => write!(f, "date"),
        }
    }
}

/// Comparison prefixes for date parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchPrefix {
    /// Equal (default).
    #[default]
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Less than.
    Lt,
    /// Greater than or equal.
    Ge,
    /// Less than or equal.
    Le,
}

impl FromStr for SearchPrefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(SearchPrefix::Eq),
            "ne" => Ok(SearchPrefix::Ne),
            "gt" => Ok(SearchPrefix::Gt),
            "lt" => Ok(SearchPrefix::Lt),
            "ge" => Ok(SearchPrefix::Ge),
            "le" => Ok(SearchPrefix::Le),
            _ => Err(format!("unknown search prefix: {}", s)),
        }
    }
}

impl SearchPrefix {
    /// Extracts a prefix from the beginning of a value string, returning
    /// the prefix and the remaining value.
    pub fn extract(value: &str) -> (Self, &str) {
        if value.len() >= 2 {
            if let Ok(p) = value[..2].parse() {
                return (p, &value[2..]);
            }
        }
        (SearchPrefix::Eq, value)
    }
}

/// A search parameter definition for one resource type.
#[derive(Debug)]
pub struct ParamDef {
    /// The parameter name as supplied by clients.
    pub name: &'static str,
    /// The value semantics.
    pub kind: SearchParamKind,
    /// Dotted JSON paths into the resource content that hold candidate
    /// values; arrays along the path are flattened.
    pub paths: &'static [&'static str],
}

const ORGANIZATION: &[ParamDef] = &[
    ParamDef {
        name: "identifier",
        kind: SearchParamKind::Token,
        paths: &["identifier"],
    },
    ParamDef {
        name: "name",
        kind: SearchParamKind::String,
        paths: &["name"],
    },
    ParamDef {
        name: "active",
        kind: SearchParamKind::Token,
        paths: &["active"],
    },
];

const ENDPOINT: &[ParamDef] = &[
    ParamDef {
        name: "identifier",
        kind: SearchParamKind::Token,
        paths: &["identifier"],
    },
    ParamDef {
        name: "address",
        kind: SearchParamKind::String,
        paths: &["address"],
    },
    ParamDef {
        name: "organization",
        kind: SearchParamKind::Reference,
        paths: &["managingOrganization"],
    },
    ParamDef {
        name: "status",
        kind: SearchParamKind::Token,
        paths: &["status"],
    },
];

const LOCATION: &[ParamDef] = &[ParamDef {
    name: "name",
    kind: SearchParamKind::String,
    paths: &["name"],
}];

const BINARY: &[ParamDef] = &[];

const BUNDLE: &[ParamDef] = &[ParamDef {
    name: "identifier",
    kind: SearchParamKind::Token,
    paths: &["identifier"],
}];

/// Returns the parameter catalog for a resource type, or `None` if the
/// type is not searchable.
pub fn parameters_for(resource_type: &str) -> Option<&'static [ParamDef]> {
    match resource_type {
        "Organization" => Some(ORGANIZATION),
        "Endpoint" => Some(ENDPOINT),
        "Location" => Some(LOCATION),
        "Binary" => Some(BINARY),
        "Bundle" => Some(BUNDLE),
        _ => None,
    }
}

/// Collects the JSON nodes under a dotted path, flattening arrays.
fn select<'a>(content: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut nodes = vec![content];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for node in nodes {
            let candidates = match node {
                Value::Array(items) => items.iter().filter_map(|i| i.get(segment)).collect(),
                other => other.get(segment).into_iter().collect::<Vec<_>>(),
            };
            for c in candidates {
                match c {
                    Value::Array(items) => next.extend(items.iter()),
                    other => next.push(other),
                }
            }
        }
        nodes = next;
    }
    nodes
}

impl ParamDef {
    /// Tests whether the resource content matches the raw search value.
    pub fn matches(&self, content: &Value, raw_value: &str) -> bool {
        self.paths.iter().any(|path| {
            select(content, path)
                .into_iter()
                .any(|node| self.node_matches(node, raw_value))
        })
    }

    fn node_matches(&self, node: &Value, raw_value: &str) -> bool {
        match self.kind {
            SearchParamKind::Token => token_matches(node, raw_value),
            SearchParamKind::String => string_matches(node, raw_value),
            SearchParamKind::Reference => reference_matches(node, raw_value),
            // Date parameters compare against resource metadata, handled by
            // the query itself.
            SearchParamKind::Date => false,
        }
    }
}

/// Splits a token value into optional system and code parts.
fn split_token(raw: &str) -> (Option<&str>, &str) {
    match raw.split_once('|') {
        Some((system, code)) => (Some(system), code),
        None => (None, raw),
    }
}

fn token_matches(node: &Value, raw: &str) -> bool {
    let (system, code) = split_token(raw);
    match node {
        Value::Array(items) => items.iter().any(|i| token_matches(i, raw)),
        Value::String(s) => system.is_none_or(str::is_empty) && s == code,
        Value::Bool(b) => system.is_none() && b.to_string() == code,
        Value::Object(map) => {
            // Identifier: {system, value}
            if let Some(value) = map.get("value").and_then(Value::as_str) {
                let system_ok = match system {
                    None => true,
                    Some("") => !map.contains_key("system"),
                    Some(s) => map.get("system").and_then(Value::as_str) == Some(s),
                };
                return system_ok && value == code;
            }
            // CodeableConcept: {coding: [{system, code}]}
            if let Some(codings) = map.get("coding").and_then(Value::as_array) {
                return codings.iter().any(|c| token_matches(c, raw));
            }
            // Coding: {system, code}
            if let Some(c) = map.get("code").and_then(Value::as_str) {
                let system_ok = match system {
                    None => true,
                    Some("") => !map.contains_key("system"),
                    Some(s) => map.get("system").and_then(Value::as_str) == Some(s),
                };
                return system_ok && c == code;
            }
            false
        }
        _ => false,
    }
}

fn string_matches(node: &Value, raw: &str) -> bool {
    match node {
        Value::Array(items) => items.iter().any(|i| string_matches(i, raw)),
        Value::String(s) => s.to_lowercase().starts_with(&raw.to_lowercase()),
        _ => false,
    }
}

fn reference_matches(node: &Value, raw: &str) -> bool {
    match node {
        Value::Array(items) => items.iter().any(|i| reference_matches(i, raw)),
        Value::Object(map) => match map.get("reference").and_then(Value::as_str) {
            // An absolute stored reference still matches a relative query
            // value.
            Some(stored) => stored == raw || stored.ends_with(&format!("/{raw}")),
            None => false,
        },
        _ => false,
    }
}
