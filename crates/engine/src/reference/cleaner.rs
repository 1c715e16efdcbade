//! Normalization of encoder round-trip artifacts.
//!
//! Resource encoders that inline referenced resources on round-trip leave
//! two artifacts behind: `contained` entries nothing points at, and
//! contained copies of resources that the content also references by
//! literal id. Both are stripped before resolution so that a reference and
//! its target are not redundantly embedded.

use serde_json::Value;
use std::collections::HashSet;

use super::collect_references;

/// Returns a cleaned copy of the content. The input is never mutated.
pub fn clean(content: &Value) -> Value {
    let mut cleaned = content.clone();

    let references = collect_references(content);
    let local_ids: HashSet<&str> = references
        .iter()
        .filter_map(|r| r.value.strip_prefix('#'))
        .collect();
    let literal_ids: HashSet<(String, String)> = references
        .iter()
        .filter_map(|r| {
            let (resource_type, id) = r.value.split_once('/')?;
            if resource_type.chars().next()?.is_ascii_uppercase() {
                Some((resource_type.to_string(), id.to_string()))
            } else {
                None
            }
        })
        .collect();

    if let Some(Value::Array(contained)) = cleaned.get_mut("contained") {
        contained.retain(|entry| {
            let id = entry.get("id").and_then(Value::as_str).unwrap_or_default();
            let resource_type = entry
                .get("resourceType")
                .and_then(Value::as_str)
                .unwrap_or_default();

            // Duplicate of a literal reference target: redundant embedding.
            if literal_ids.contains(&(resource_type.to_string(), id.to_string())) {
                return false;
            }
            // Only keep contained resources something points at.
            local_ids.contains(id)
        });
        if contained.is_empty() {
            if let Value::Object(map) = &mut cleaned {
                map.remove("contained");
            }
        }
    }

    cleaned
}
