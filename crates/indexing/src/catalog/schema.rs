//! Index schema derivation.
//!
//! A document type's declared fields (inherited ones included) become the
//! mapping properties of its index. The catalog entry itself travels in the
//! mapping `_meta` so the backend can hand it back on reload.

use serde_json::{Map, Value, json};

use crate::config::ClusterConfig;
use crate::core::IndexMapping;
use crate::error::IndexResult;
use crate::query::filter::{DOC_TYPE_FIELD, escape_field};
use crate::registry::TypeRegistry;
use crate::types::{FieldKind, Index, IndexField};

/// Key of the catalog entry inside the mapping `_meta` object.
pub const CATALOG_META_KEY: &str = "catalog";

/// Field metadata for a registered type, ancestors' fields first.
pub fn derive_fields(types: &TypeRegistry, document_type: &str) -> IndexResult<Vec<IndexField>> {
    Ok(types
        .fields_of(document_type)?
        .into_iter()
        .map(|descriptor| {
            let mut field = IndexField::new(descriptor.name, descriptor.kind).with_boost(descriptor.boosted);
            field.label = descriptor.label;
            field
        })
        .collect())
}

/// Mapping for one field kind.
fn kind_mapping(kind: FieldKind) -> Value {
    match kind {
        FieldKind::Text => json!({
            "type": "text",
            "fields": { "keyword": { "type": "keyword", "ignore_above": 256 } }
        }),
        FieldKind::Keyword => json!({ "type": "keyword" }),
        FieldKind::Integer => json!({ "type": "long" }),
        FieldKind::Float => json!({ "type": "double" }),
        FieldKind::Date => json!({ "type": "date" }),
        FieldKind::Boolean => json!({ "type": "boolean" }),
        FieldKind::Object => json!({ "type": "object" }),
    }
}

/// Builds mapping `properties`, expanding dotted names into object properties.
pub fn mapping_properties(fields: &[IndexField]) -> Value {
    let mut root = Map::new();
    for field in fields {
        let name = escape_field(&field.name);
        let segments: Vec<&str> = name.split('.').collect();
        insert_property(&mut root, &segments, field.kind);
    }
    root.insert(DOC_TYPE_FIELD.to_string(), json!({ "type": "keyword" }));
    Value::Object(root)
}

fn insert_property(properties: &mut Map<String, Value>, segments: &[&str], kind: FieldKind) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        match properties.get_mut(*head) {
            // An object already created for dotted children keeps them.
            Some(existing) if kind == FieldKind::Object && existing.get("properties").is_some() => {}
            _ => {
                properties.insert(head.to_string(), kind_mapping(kind));
            }
        }
        return;
    }

    let parent = properties
        .entry(head.to_string())
        .or_insert_with(|| json!({ "type": "object", "properties": {} }));
    if parent.get("type").and_then(Value::as_str) != Some("object") {
        *parent = json!({ "type": "object", "properties": {} });
    }
    if !parent.get("properties").is_some_and(Value::is_object) {
        parent["properties"] = json!({});
    }
    if let Some(Value::Object(children)) = parent.get_mut("properties") {
        insert_property(children, rest, kind);
    }
}

/// Index settings from the cluster configuration.
pub fn index_settings(config: &ClusterConfig) -> Value {
    json!({
        "index": {
            "number_of_shards": config.number_of_shards,
            "number_of_replicas": config.number_of_replicas,
            "refresh_interval": config.refresh_interval,
            "max_result_window": config.max_result_window
        }
    })
}

/// The `_meta` object carrying a catalog entry.
pub fn catalog_meta(index: &Index) -> IndexResult<Value> {
    Ok(json!({ CATALOG_META_KEY: serde_json::to_value(index)? }))
}

/// Full create-index body for a catalog entry.
pub fn index_body(config: &ClusterConfig, index: &Index) -> IndexResult<Value> {
    index_body_with_properties(config, index, mapping_properties(&index.fields))
}

/// Create-index body reusing existing mapping properties.
pub fn index_body_with_properties(config: &ClusterConfig, index: &Index, properties: Value) -> IndexResult<Value> {
    Ok(json!({
        "settings": index_settings(config),
        "mappings": {
            "properties": properties,
            "_meta": catalog_meta(index)?
        }
    }))
}

/// Reads the catalog entry stored in a mapping, if any.
pub fn index_from_mapping(mapping: &IndexMapping) -> Option<Index> {
    let stored = mapping.meta.get(CATALOG_META_KEY)?;
    match serde_json::from_value::<Index>(stored.clone()) {
        Ok(mut index) => {
            index.name = mapping.index.clone();
            Some(index)
        }
        Err(e) => {
            tracing::warn!(index = %mapping.index, "Ignoring unreadable catalog metadata: {}", e);
            None
        }
    }
}
