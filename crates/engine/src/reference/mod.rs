//! Reference classification and rewriting.
//!
//! References are carried as `{"reference": "..."}` objects anywhere in a
//! resource's JSON tree. Four kinds are distinguished for resolution:
//! external literal, internal literal, conditional, and temporary; contained
//! (`#id`) references are passed through untouched.

mod cleaner;
mod resolver;

pub use cleaner::clean;
pub use resolver::ReferenceResolver;

use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::ReferenceError;

/// One reference found in a resource's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReference {
    /// Dotted path to the reference object, for diagnostics.
    pub path: String,
    /// The raw reference string.
    pub value: String,
}

/// Classification of a reference string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Absolute URL outside this server; left untouched.
    ExternalLiteral,
    /// A `Type/id` on this server; must resolve to an existing, readable,
    /// non-deleted resource.
    InternalLiteral {
        /// The target resource type.
        resource_type: String,
        /// The target logical id.
        id: String,
    },
    /// A `Type?query` search expression; must resolve to exactly one match.
    Conditional {
        /// The searched resource type.
        resource_type: String,
        /// The raw query string after `?`.
        query: String,
    },
    /// A URN matching another entry's fullUrl in the same bundle.
    Temporary,
    /// A `#id` reference to a contained resource; passed through.
    Contained,
}

impl ResourceReference {
    /// Classifies the reference string relative to the server base URL.
    pub fn classify(&self, config: &EngineConfig) -> Result<ReferenceKind, ReferenceError> {
        let value = self.value.as_str();

        if value.starts_with('#') {
            return Ok(ReferenceKind::Contained);
        }
        if value.starts_with("urn:uuid:") || value.starts_with("urn:oid:") {
            return Ok(ReferenceKind::Temporary);
        }
        if let Some((head, query)) = value.split_once('?') {
            if is_resource_type(head) && !query.is_empty() {
                return Ok(ReferenceKind::Conditional {
                    resource_type: head.to_string(),
                    query: query.to_string(),
                });
            }
            return Err(self.malformed());
        }

        if value.starts_with("http://") || value.starts_with("https://") {
            let base = config.base_with_slash();
            return match value.strip_prefix(base.as_str()) {
                Some(rest) => parse_relative(rest)
                    .map(|(resource_type, id)| ReferenceKind::InternalLiteral {
                        resource_type,
                        id,
                    })
                    .ok_or_else(|| self.malformed()),
                None => Ok(ReferenceKind::ExternalLiteral),
            };
        }

        parse_relative(value)
            .map(|(resource_type, id)| ReferenceKind::InternalLiteral { resource_type, id })
            .ok_or_else(|| self.malformed())
    }

    fn malformed(&self) -> ReferenceError {
        ReferenceError::Malformed {
            reference: self.value.clone(),
        }
    }
}

fn is_resource_type(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && s.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Parses `Type/id` or `Type/id/_history/version` into its parts.
fn parse_relative(path: &str) -> Option<(String, String)> {
    let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();
    let ok_id = |id: &str| {
        !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
    };
    match segments.as_slice() {
        [resource_type, id] if is_resource_type(resource_type) && ok_id(id) => {
            Some((resource_type.to_string(), id.to_string()))
        }
        [resource_type, id, "_history", version]
            if is_resource_type(resource_type) && ok_id(id) && !version.is_empty() =>
        {
            Some((resource_type.to_string(), id.to_string()))
        }
        _ => None,
    }
}

/// Collects every reference object in the content tree.
pub fn collect_references(content: &Value) -> Vec<ResourceReference> {
    let mut found = Vec::new();
    walk(content, String::new(), &mut found);
    found
}

fn walk(node: &Value, path: String, found: &mut Vec<ResourceReference>) {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("reference") {
                found.push(ResourceReference {
                    path: path.clone(),
                    value: reference.clone(),
                });
            }
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                walk(child, child_path, found);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                walk(child, format!("{path}[{i}]"), found);
            }
        }
        _ => {}
    }
}

/// Produces a new content tree with reference strings replaced according to
/// `replacements` (original value to final value). The input is never
/// mutated.
pub fn rewrite_references(
    content: &Value,
    replacements: &std::collections::HashMap<String, String>,
) -> Value {
    match content {
        Value::Object(map) => {
            let rewritten = map
                .iter()
                .map(|(key, child)| {
                    if key == "reference" {
                        if let Value::String(s) = child {
                            if let Some(replacement) = replacements.get(s) {
                                return (key.clone(), Value::String(replacement.clone()));
                            }
                        }
                    }
                    (key.clone(), rewrite_references(child, replacements))
                })
                .collect();
            Value::Object(rewritten)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|i| rewrite_references(i, replacements))
                .collect(),
        ),
        other => other.clone(),
    }
}
