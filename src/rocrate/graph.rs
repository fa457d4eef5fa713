//! JSON-LD `@graph` editing.

use crate::error::CrateError;
use serde_json::{json, Map, Value};

pub const RO_CRATE_CONTEXT: &str = "https://w3id.org/ro/crate/1.1/context";

/// Empty crate with only the metadata descriptor.
pub fn empty_crate() -> Value {
    json!({
        "@context": RO_CRATE_CONTEXT,
        "@graph": [
            {
                "@id": super::CRATE_METADATA_FILE,
                "@type": "CreativeWork",
                "conformsTo": { "@id": "https://w3id.org/ro/crate/1.1" },
                "about": { "@id": crate::model::ROOT_DATASET_EID }
            }
        ]
    })
}

fn graph_mut(doc: &mut Value) -> Result<&mut Vec<Value>, CrateError> {
    doc.get_mut("@graph")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| CrateError::Malformed("missing @graph array".into()))
}

/// Replace the node with the same `@id`, or append it.
pub fn upsert_node(doc: &mut Value, node: Value) -> Result<(), CrateError> {
    let id = node
        .get("@id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CrateError::Malformed("node without @id".into()))?;
    let graph = graph_mut(doc)?;
    match graph.iter_mut().find(|n| n.get("@id").and_then(Value::as_str) == Some(id.as_str())) {
        Some(existing) => *existing = node,
        None => graph.push(node),
    }
    Ok(())
}

/// Drop the node with `id` and every `{"@id": id}` reference to it.
pub fn remove_node(doc: &mut Value, id: &str) -> Result<(), CrateError> {
    let graph = graph_mut(doc)?;
    graph.retain(|n| n.get("@id").and_then(Value::as_str) != Some(id));
    for node in graph.iter_mut() {
        if let Value::Object(map) = node {
            strip_references(map, id);
        }
    }
    Ok(())
}

/// Give the node `from` the `@id` `to` and repoint every `{"@id": from}` reference.
pub fn rename_node(doc: &mut Value, from: &str, to: &str) -> Result<(), CrateError> {
    let graph = graph_mut(doc)?;
    if graph.iter().any(|n| n.get("@id").and_then(Value::as_str) == Some(to)) {
        graph.retain(|n| n.get("@id").and_then(Value::as_str) != Some(from));
    }
    for node in graph.iter_mut() {
        let Value::Object(map) = node else { continue };
        if map.get("@id").and_then(Value::as_str) == Some(from) {
            map.insert("@id".into(), json!(to));
        }
        for (key, value) in map.iter_mut() {
            if key.starts_with('@') {
                continue;
            }
            if let Value::Array(items) = value {
                for item in items.iter_mut().filter(|v| is_reference_to(v, from)) {
                    *item = json!({ "@id": to });
                }
            } else if is_reference_to(value, from) {
                *value = json!({ "@id": to });
            }
        }
    }
    Ok(())
}

fn is_reference_to(v: &Value, id: &str) -> bool {
    v.as_object()
        .map(|o| o.len() == 1 && o.get("@id").and_then(Value::as_str) == Some(id))
        .unwrap_or(false)
}

fn strip_references(node: &mut Map<String, Value>, id: &str) {
    let mut emptied = Vec::new();
    for (key, value) in node.iter_mut() {
        if key.starts_with('@') {
            continue;
        }
        if is_reference_to(value, id) {
            emptied.push(key.clone());
        } else if let Value::Array(items) = value {
            items.retain(|v| !is_reference_to(v, id));
            if items.is_empty() {
                emptied.push(key.clone());
            }
        }
    }
    for key in emptied {
        node.remove(&key);
    }
}

/// Add `value` under `key`, turning repeated keys into arrays.
pub fn push_value(node: &mut Map<String, Value>, key: &str, value: Value) {
    match node.get_mut(key) {
        None => {
            node.insert(key.to_string(), value);
        }
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
    }
}
