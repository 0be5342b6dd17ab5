//! Filter composition and field-name normalization.
//!
//! [`FilterEngine::compose`] AND's every filter field through its comparator
//! and, when free text is present, adds a phrase-prefix match over the boosted
//! fields. Field names that collide with backend-reserved names are escaped
//! on the way in and restored on the way out.

use std::collections::HashSet;

use serde_json::{Map, Value, json};

use crate::error::{IndexError, IndexResult};
use crate::types::FilterField;

use super::comparator::ComparatorRegistry;

/// Prefix marking an escaped field name.
pub const ESCAPE_PREFIX: &str = "__esc";

/// Source field holding each document's concrete type.
pub const DOC_TYPE_FIELD: &str = "__doc_type";

/// Root-level names the backend reserves for document metadata.
const RESERVED_NAMES: &[&str] = &[
    "_id",
    "_index",
    "_source",
    "_type",
    "_routing",
    "_score",
    "_version",
    "_seq_no",
    "_primary_term",
    "_field_names",
    "_ignored",
    "_meta",
    "_doc_count",
    "_tier",
    "_data_stream_timestamp",
    DOC_TYPE_FIELD,
];

fn needs_escape(root: &str) -> bool {
    RESERVED_NAMES.contains(&root) || root.starts_with(ESCAPE_PREFIX)
}

/// Escapes a (possibly dotted) field name whose root segment is reserved.
pub fn escape_field(name: &str) -> String {
    let root = name.split('.').next().unwrap_or(name);
    if needs_escape(root) {
        format!("{}{}", ESCAPE_PREFIX, name)
    } else {
        name.to_string()
    }
}

/// Reverses [`escape_field`].
pub fn unescape_field(name: &str) -> String {
    match name.strip_prefix(ESCAPE_PREFIX) {
        Some(original) if needs_escape(original.split('.').next().unwrap_or(original)) => {
            original.to_string()
        }
        _ => name.to_string(),
    }
}

/// Escapes the root keys of a document source.
pub fn escape_source(source: Value) -> Value {
    match source {
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(key, value)| (escape_field(&key), value))
                .collect(),
        ),
        other => other,
    }
}

/// Restores the root keys of a stored source and drops the type marker.
pub fn unescape_source(source: Value) -> Value {
    match source {
        Value::Object(fields) => {
            let mut out = Map::with_capacity(fields.len());
            for (key, value) in fields {
                if key == DOC_TYPE_FIELD {
                    continue;
                }
                out.insert(unescape_field(&key), value);
            }
            Value::Object(out)
        }
        other => other,
    }
}

/// Maps logical field names to the backend paths used for matching,
/// bucketing and sorting.
#[derive(Debug, Clone, Default)]
pub struct FieldPaths {
    text_fields: HashSet<String>,
}

impl FieldPaths {
    /// Creates paths knowing which fields are analyzed text.
    pub fn new<I, S>(text_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            text_fields: text_fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Path for matching and metric aggregations.
    pub fn value_path(&self, field: &str) -> String {
        escape_field(field)
    }

    /// Path for exact matches, terms buckets and sorting; text fields use their
    /// keyword subfield.
    pub fn exact_path(&self, field: &str) -> String {
        if self.text_fields.contains(field) {
            format!("{}.keyword", escape_field(field))
        } else {
            escape_field(field)
        }
    }
}

/// Composes filter fields and free text into one bool query.
#[derive(Debug)]
pub struct FilterEngine<'a> {
    comparators: &'a ComparatorRegistry,
}

impl<'a> FilterEngine<'a> {
    /// Creates an engine over a comparator registry.
    pub fn new(comparators: &'a ComparatorRegistry) -> Self {
        Self { comparators }
    }

    /// Builds the query.
    ///
    /// Field filters are AND'd; exact comparators address the keyword path
    /// of text fields. Free text is a phrase-prefix match across
    /// `boosted_fields` (every field when empty); alongside field filters it
    /// only contributes relevance, on its own it must match. `restrictions`
    /// are non-scoring filters added by the caller.
    pub fn compose(
        &self,
        filters: &[FilterField],
        paths: &FieldPaths,
        text: Option<&str>,
        boosted_fields: &[String],
        restrictions: Vec<Value>,
    ) -> IndexResult<Value> {
        let mut must = Vec::with_capacity(filters.len());
        for filter in filters {
            if filter.field.trim().is_empty() {
                return Err(IndexError::invalid_argument(format!(
                    "filter using '{}' has no field name",
                    filter.comparator
                )));
            }
            let comparator = self.comparators.resolve(&filter.comparator)?;
            let path = if comparator.exact() {
                paths.exact_path(&filter.field)
            } else {
                paths.value_path(&filter.field)
            };
            must.push(comparator.build(&path, &filter.value)?);
        }

        let text = text.map(str::trim).filter(|t| !t.is_empty());
        if must.is_empty() && restrictions.is_empty() && text.is_none() {
            return Ok(json!({ "match_all": {} }));
        }

        let mut query = Map::new();
        let has_filters = !must.is_empty();
        if has_filters {
            query.insert("must".to_string(), Value::Array(must));
        }
        if !restrictions.is_empty() {
            query.insert("filter".to_string(), Value::Array(restrictions));
        }
        if let Some(text) = text {
            let fields: Vec<String> = if boosted_fields.is_empty() {
                vec!["*".to_string()]
            } else {
                boosted_fields.iter().map(|f| escape_field(f)).collect()
            };
            query.insert(
                "should".to_string(),
                json!([{
                    "multi_match": {
                        "query": text,
                        "type": "phrase_prefix",
                        "fields": fields,
                        "lenient": true
                    }
                }]),
            );
            query.insert(
                "minimum_should_match".to_string(),
                json!(if has_filters { 0 } else { 1 }),
            );
        }
        Ok(json!({ "bool": query }))
    }
}
