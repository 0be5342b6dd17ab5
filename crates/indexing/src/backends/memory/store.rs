//! Index storage and mapping lookup for the in-memory backend.

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use super::analysis::{looks_like_date, parse_bool, parse_date_value, parse_number, scalar_text, tokenize};

/// A mapped field type, collapsed to the families the engine distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FieldType {
    Text,
    Keyword,
    Long,
    Double,
    Date,
    Boolean,
    Object,
}

impl FieldType {
    fn from_mapping(ty: &str) -> Self {
        match ty {
            "text" | "match_only_text" => FieldType::Text,
            "long" | "integer" | "short" | "byte" | "unsigned_long" => FieldType::Long,
            "double" | "float" | "half_float" | "scaled_float" => FieldType::Double,
            "date" | "date_nanos" => FieldType::Date,
            "boolean" => FieldType::Boolean,
            "object" | "nested" => FieldType::Object,
            _ => FieldType::Keyword,
        }
    }

    pub(super) fn name(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Keyword => "keyword",
            FieldType::Long => "long",
            FieldType::Double => "double",
            FieldType::Date => "date",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
        }
    }

    pub(super) fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Long | FieldType::Double)
    }
}

/// A field name resolved against a mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ResolvedField {
    /// Path into the document source (multi-field suffixes removed).
    pub path: String,
    pub ty: FieldType,
}

/// A typed field value extracted from a source document.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Scalar {
    Str(String),
    Num(f64),
    Date(i64),
    Bool(bool),
}

impl Scalar {
    /// Parses a query-side value for a field of type `ty`.
    pub(super) fn parse(value: &Value, ty: FieldType) -> Option<Scalar> {
        match ty {
            FieldType::Text | FieldType::Keyword => scalar_text(value).map(Scalar::Str),
            FieldType::Long | FieldType::Double => parse_number(value).map(Scalar::Num),
            FieldType::Date => parse_date_value(value).map(Scalar::Date),
            FieldType::Boolean => parse_bool(value).map(Scalar::Bool),
            FieldType::Object => None,
        }
    }

    /// Orders two scalars of the same family.
    pub(super) fn compare(&self, other: &Scalar) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (Scalar::Str(a), Scalar::Str(b)) => a.cmp(b),
            (Scalar::Num(a), Scalar::Num(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Scalar::Date(a), Scalar::Date(b)) => a.cmp(b),
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }

    /// The numeric view used by metric aggregations.
    pub(super) fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Num(n) => Some(*n),
            Scalar::Date(d) => Some(*d as f64),
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::Str(_) => None,
        }
    }
}

/// A stored document.
#[derive(Debug, Clone)]
pub(super) struct StoredDocument {
    pub id: String,
    pub source: Value,
    pub version: i64,
    /// Insertion order, used as the final sort tie-breaker.
    pub seq: u64,
}

impl StoredDocument {
    /// Raw source values at a dotted path, flattening arrays at every level.
    pub(super) fn values_at(&self, path: &str) -> Vec<&Value> {
        values_at(&self.source, path)
    }

    /// Typed values at a resolved field. Text values are tokenized; values
    /// that do not coerce to the field type are skipped.
    pub(super) fn scalars(&self, field: &ResolvedField) -> Vec<Scalar> {
        self.values_at(&field.path)
            .into_iter()
            .filter_map(|v| Scalar::parse(v, field.ty))
            .collect()
    }

    /// Tokens of every text value at `path`, one list per value.
    pub(super) fn token_lists(&self, path: &str) -> Vec<Vec<String>> {
        self.values_at(path)
            .into_iter()
            .filter_map(scalar_text)
            .map(|s| tokenize(&s))
            .collect()
    }
}

/// One physical index.
#[derive(Debug, Clone)]
pub(super) struct MemoryIndex {
    /// Mapping `properties` (always an object).
    pub properties: Value,
    /// Mapping `_meta`.
    pub meta: Value,
    pub documents: HashMap<String, StoredDocument>,
    pub max_result_window: usize,
    /// `false` when the mapping disables dynamic field mapping.
    dynamic: bool,
    next_seq: u64,
}

impl MemoryIndex {
    /// Creates an index from a `{ settings, mappings }` body.
    pub(super) fn from_body(body: &Value) -> Self {
        let settings = body.get("settings").cloned().unwrap_or_else(|| json!({}));
        let max_result_window = settings
            .get("index.max_result_window")
            .or_else(|| settings.pointer("/index/max_result_window"))
            .or_else(|| settings.get("max_result_window"))
            .and_then(parse_number)
            .map(|n| n as usize)
            .unwrap_or(10_000);
        let properties = body
            .pointer("/mappings/properties")
            .filter(|p| p.is_object())
            .cloned()
            .unwrap_or_else(|| json!({}));
        let meta = body.pointer("/mappings/_meta").cloned().unwrap_or(Value::Null);
        let dynamic = match body.pointer("/mappings/dynamic") {
            Some(Value::Bool(enabled)) => *enabled,
            Some(Value::String(mode)) => mode == "true",
            _ => true,
        };

        Self {
            properties,
            meta,
            documents: HashMap::new(),
            max_result_window,
            dynamic,
            next_seq: 0,
        }
    }

    /// Inserts or replaces a document, extending the mapping for new fields.
    pub(super) fn put(&mut self, id: &str, source: Value) {
        if let (true, Value::Object(props), Value::Object(fields)) =
            (self.dynamic, &mut self.properties, &source)
        {
            map_dynamic(props, fields);
        }
        match self.documents.get_mut(id) {
            Some(existing) => {
                existing.source = source;
                existing.version += 1;
            }
            None => {
                self.next_seq += 1;
                self.documents.insert(
                    id.to_string(),
                    StoredDocument {
                        id: id.to_string(),
                        source,
                        version: 1,
                        seq: self.next_seq,
                    },
                );
            }
        }
    }

    /// Resolves a field name, including `.keyword`-style multi-fields.
    pub(super) fn resolve(&self, field: &str) -> Option<ResolvedField> {
        resolve_field(&self.properties, field)
    }

    /// Dotted paths of every leaf field in the mapping.
    pub(super) fn leaf_fields(&self) -> Vec<(String, FieldType)> {
        let mut out = Vec::new();
        collect_leaves(&self.properties, "", &mut out);
        out
    }
}

fn mapping_node<'a>(properties: &'a Value, path: &str) -> Option<&'a Value> {
    let mut props = properties;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let node = props.get(segment)?;
        if segments.peek().is_none() {
            return Some(node);
        }
        props = node.get("properties")?;
    }
    None
}

fn node_type(node: &Value) -> FieldType {
    match node.get("type").and_then(Value::as_str) {
        Some(ty) => FieldType::from_mapping(ty),
        None => FieldType::Object,
    }
}

/// Resolves `field` against a mapping `properties` object.
pub(super) fn resolve_field(properties: &Value, field: &str) -> Option<ResolvedField> {
    if let Some(node) = mapping_node(properties, field) {
        return Some(ResolvedField {
            path: field.to_string(),
            ty: node_type(node),
        });
    }
    let (parent, sub) = field.rsplit_once('.')?;
    let sub_node = mapping_node(properties, parent)?.get("fields")?.get(sub)?;
    Some(ResolvedField {
        path: parent.to_string(),
        ty: node_type(sub_node),
    })
}

fn collect_leaves(properties: &Value, prefix: &str, out: &mut Vec<(String, FieldType)>) {
    let Some(props) = properties.as_object() else {
        return;
    };
    for (name, node) in props {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        match node.get("properties") {
            Some(children) => collect_leaves(children, &path, out),
            None => out.push((path, node_type(node))),
        }
    }
}

/// Adds mapping entries for source fields the mapping does not know yet.
fn map_dynamic(properties: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (name, value) in source {
        let sample = first_non_null(value);
        let Some(sample) = sample else {
            continue;
        };
        match properties.get_mut(name) {
            Some(Value::Object(entry)) if is_object_entry(entry) => {
                if let Value::Object(child) = sample {
                    let nested = entry
                        .entry("properties")
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(nested) = nested {
                        map_dynamic(nested, child);
                    }
                }
            }
            Some(_) => {}
            None => {
                if let Some(mapping) = infer_mapping(sample) {
                    properties.insert(name.clone(), mapping);
                }
            }
        }
    }
}

fn is_object_entry(entry: &Map<String, Value>) -> bool {
    matches!(
        entry.get("type").and_then(Value::as_str),
        None | Some("object") | Some("nested")
    )
}

fn first_non_null(value: &Value) -> Option<&Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => items.iter().find_map(first_non_null),
        other => Some(other),
    }
}

fn infer_mapping(sample: &Value) -> Option<Value> {
    Some(match sample {
        Value::Bool(_) => json!({ "type": "boolean" }),
        Value::Number(n) if n.is_f64() => json!({ "type": "float" }),
        Value::Number(_) => json!({ "type": "long" }),
        Value::String(s) if looks_like_date(s) => json!({ "type": "date" }),
        Value::String(_) => json!({
            "type": "text",
            "fields": { "keyword": { "type": "keyword", "ignore_above": 256 } }
        }),
        Value::Object(fields) => {
            let mut nested = Map::new();
            map_dynamic(&mut nested, fields);
            json!({ "properties": nested })
        }
        Value::Null | Value::Array(_) => return None,
    })
}

/// Source values at a dotted path, flattening arrays at every level and
/// dropping nulls.
pub(super) fn values_at<'a>(source: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![source];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            let mut step = |object: &'a Map<String, Value>| {
                if let Some(child) = object.get(segment) {
                    flatten_into(child, &mut next);
                }
            };
            match value {
                Value::Object(object) => step(object),
                Value::Array(items) => {
                    for item in items {
                        if let Value::Object(object) = item {
                            step(object);
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current.into_iter().filter(|v| !v.is_null()).collect()
}

fn flatten_into<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        other => out.push(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_index() -> MemoryIndex {
        let mut index = MemoryIndex::from_body(&json!({
            "mappings": { "properties": { "customer": { "type": "keyword" } } }
        }));
        index.put(
            "1",
            json!({
                "customer": "acme",
                "total": 12,
                "placed": "2024-01-02",
                "products": [
                    { "product_name": "Basic Widget", "price": 2.5 },
                    { "product_name": "Deluxe Widget", "price": 9.5 }
                ]
            }),
        );
        index
    }

    #[test]
    fn test_dynamic_mapping() {
        let index = order_index();
        assert_eq!(index.resolve("customer").unwrap().ty, FieldType::Keyword);
        assert_eq!(index.resolve("total").unwrap().ty, FieldType::Long);
        assert_eq!(index.resolve("placed").unwrap().ty, FieldType::Date);
        assert_eq!(index.resolve("products.product_name").unwrap().ty, FieldType::Text);
        assert_eq!(index.resolve("products.price").unwrap().ty, FieldType::Double);
        assert!(index.resolve("missing").is_none());
    }

    #[test]
    fn test_keyword_subfield_resolves_to_parent_path() {
        let index = order_index();
        let resolved = index.resolve("products.product_name.keyword").unwrap();
        assert_eq!(resolved.path, "products.product_name");
        assert_eq!(resolved.ty, FieldType::Keyword);
    }

    #[test]
    fn test_values_flatten_arrays() {
        let index = order_index();
        let doc = &index.documents["1"];
        let names: Vec<_> = doc.values_at("products.product_name");
        assert_eq!(names.len(), 2);
        assert_eq!(doc.token_lists("products.product_name")[0], vec!["basic", "widget"]);
    }

    #[test]
    fn test_put_bumps_version_keeps_seq() {
        let mut index = order_index();
        index.put("1", json!({ "customer": "other" }));
        let doc = &index.documents["1"];
        assert_eq!(doc.version, 2);
        assert_eq!(doc.seq, 1);
    }

    #[test]
    fn test_max_result_window_setting() {
        let index = MemoryIndex::from_body(&json!({ "settings": { "index.max_result_window": 50 } }));
        assert_eq!(index.max_result_window, 50);
        assert_eq!(MemoryIndex::from_body(&json!({})).max_result_window, 10_000);
    }

    #[test]
    fn test_leaf_fields() {
        let leaves = order_index().leaf_fields();
        assert!(leaves.contains(&("products.product_name".to_string(), FieldType::Text)));
    }
}
