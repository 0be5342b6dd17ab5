//! In-process search backend.
//!
//! [`MemoryBackend`] interprets the same JSON request bodies a cluster
//! receives: index bodies with settings and mappings, the bool/match/term/
//! range query family, sort, paging, source filtering and the metric and
//! bucket aggregations. Unknown fields are mapped dynamically on first write,
//! and requests that a cluster would reject (sorting or aggregating on
//! analyzed text, numeric aggregations over keywords, unparseable range
//! bounds) are rejected with the same status codes.
//!
//! Writes are visible to search immediately; `refresh` only checks that the
//! index exists.
//!
//! # Example
//!
//! ```
//! use helios_indexing::backends::MemoryBackend;
//! use helios_indexing::core::SearchBackend;
//! use serde_json::json;
//!
//! # let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # runtime.block_on(async {
//! let backend = MemoryBackend::new();
//! backend.upsert("acme_orders", "1", json!({ "customer": "Basic Co" }), false).await.unwrap();
//!
//! let response = backend
//!     .search(&["acme_orders".to_string()], json!({ "query": { "match": { "customer": "basic" } } }))
//!     .await
//!     .unwrap();
//! assert_eq!(response["hits"]["total"]["value"], 1);
//! # });
//! ```

mod aggregations;
mod analysis;
mod query;
mod store;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value, json};

use crate::core::backend::wildcard_regex;
use crate::core::{BackendKind, BulkOperation, BulkResponse, IndexMapping, SearchBackend};
use crate::error::{BackendError, BackendResult};

use aggregations::AggregationContext;
use analysis::parse_number;
use store::{FieldType, MemoryIndex, ResolvedField, Scalar, StoredDocument};

const BACKEND_NAME: &str = "memory";

/// Search backend holding every index in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    indices: RwLock<HashMap<String, MemoryIndex>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in an index, or `None` if it does not exist.
    pub fn document_count(&self, index: &str) -> Option<usize> {
        self.indices.read().get(index).map(|i| i.documents.len())
    }

    /// Names of all physical indices, sorted.
    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.read().keys().cloned().collect();
        names.sort();
        names
    }
}

fn rejected(status: u16, message: impl Into<String>) -> BackendError {
    BackendError::QueryError {
        status,
        message: message.into(),
    }
}

fn index_not_found(index: &str) -> BackendError {
    rejected(
        404,
        format!("index_not_found_exception: no such index [{}]", index),
    )
}

fn search_failure(message: String) -> BackendError {
    rejected(
        400,
        format!("search_phase_execution_exception: {}", message),
    )
}

fn validate_index_name(name: &str) -> BackendResult<()> {
    let problem = if name.is_empty() {
        Some("must not be empty")
    } else if name.chars().any(|c| c.is_uppercase()) {
        Some("must be lowercase")
    } else if name.starts_with(['_', '-', '+']) {
        Some("must not start with '_', '-', or '+'")
    } else if name
        .chars()
        .any(|c| matches!(c, '\\' | '/' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' | ',' | '#' | ':'))
    {
        Some("must not contain the following characters [ , \", *, \\, <, |, ,, >, /, ?, #, :]")
    } else {
        None
    };
    match problem {
        Some(reason) => Err(rejected(
            400,
            format!("invalid_index_name_exception: Invalid index name [{}], {}", name, reason),
        )),
        None => Ok(()),
    }
}

/// Resolves search targets: explicit names must exist, wildcards may match nothing.
fn resolve_targets<'a>(
    indices: &'a HashMap<String, MemoryIndex>,
    requested: &[String],
) -> BackendResult<Vec<(&'a str, &'a MemoryIndex)>> {
    let names: Vec<&str> = requested
        .iter()
        .flat_map(|r| r.split(','))
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .collect();

    let mut targets: Vec<(&'a str, &'a MemoryIndex)> = Vec::new();
    let mut push = |name: &'a str, index: &'a MemoryIndex| {
        if !targets.iter().any(|(n, _)| *n == name) {
            targets.push((name, index));
        }
    };

    if names.is_empty() || names == ["_all"] {
        for (name, index) in indices {
            push(name.as_str(), index);
        }
    } else {
        for name in names {
            if name.contains('*') {
                let re = wildcard_regex(name).map_err(|e| search_failure(e.to_string()))?;
                for (candidate, index) in indices {
                    if re.is_match(candidate) {
                        push(candidate.as_str(), index);
                    }
                }
            } else {
                let (key, index) = indices
                    .get_key_value(name)
                    .ok_or_else(|| index_not_found(name))?;
                push(key.as_str(), index);
            }
        }
    }
    targets.sort_by(|a, b| a.0.cmp(b.0));
    Ok(targets)
}

struct Candidate<'a> {
    index: &'a str,
    doc: &'a StoredDocument,
    score: f64,
}

enum SortTarget {
    Score,
    Id,
    Field(Option<ResolvedField>),
}

struct SortKey {
    target: SortTarget,
    ascending: bool,
}

fn parse_sort(sort: Option<&Value>, targets: &[(&str, &MemoryIndex)]) -> BackendResult<Vec<SortKey>> {
    let entries: Vec<&Value> = match sort {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    };

    let mut keys = Vec::with_capacity(entries.len());
    for entry in entries {
        let (field, options) = match entry {
            Value::String(field) => (field.as_str(), None),
            Value::Object(object) if object.len() == 1 => {
                let (field, options) = object.iter().next().ok_or_else(|| {
                    search_failure("malformed sort".to_string())
                })?;
                (field.as_str(), Some(options))
            }
            other => return Err(search_failure(format!("malformed sort [{}]", other))),
        };
        let order = match options {
            Some(Value::String(order)) => Some(order.as_str()),
            Some(Value::Object(o)) => o.get("order").and_then(Value::as_str),
            _ => None,
        };
        let unmapped_type = options
            .and_then(|o| o.get("unmapped_type"))
            .and_then(Value::as_str);

        let target = match field {
            "_score" => SortTarget::Score,
            "_id" | "_doc" => SortTarget::Id,
            name => {
                let resolved = targets.iter().find_map(|(_, index)| index.resolve(name));
                match resolved {
                    Some(r) if r.ty == FieldType::Text => {
                        return Err(search_failure(format!(
                            "Text fields are not optimised for operations that require per-document field data like aggregations and sorting, so these operations are disabled by default. Please use a keyword field instead. Alternatively, set fielddata=true on [{}] in order to load field data by uninverting the inverted index.",
                            name
                        )));
                    }
                    Some(r) if r.ty == FieldType::Object => {
                        return Err(search_failure(format!("can't sort on object field [{}]", name)));
                    }
                    Some(r) => SortTarget::Field(Some(r)),
                    None if unmapped_type.is_some() => SortTarget::Field(None),
                    None => {
                        return Err(search_failure(format!(
                            "No mapping found for [{}] in order to sort on",
                            name
                        )));
                    }
                }
            }
        };
        let ascending = match order {
            Some(order) => !order.eq_ignore_ascii_case("desc"),
            None => !matches!(target, SortTarget::Score),
        };
        keys.push(SortKey { target, ascending });
    }
    Ok(keys)
}

/// The value a document sorts by: the minimum for ascending, the maximum for descending.
fn sort_value(doc: &StoredDocument, key: &SortKey) -> Option<Scalar> {
    let SortTarget::Field(Some(field)) = &key.target else {
        return None;
    };
    let values = doc.scalars(field);
    let pick = if key.ascending {
        Ordering::Less
    } else {
        Ordering::Greater
    };
    values
        .into_iter()
        .reduce(|best, v| if v.compare(&best) == pick { v } else { best })
}

fn compare_candidates(
    a: &(Vec<Option<Scalar>>, Candidate<'_>),
    b: &(Vec<Option<Scalar>>, Candidate<'_>),
    keys: &[SortKey],
) -> Ordering {
    for (i, key) in keys.iter().enumerate() {
        let ordering = match key.target {
            SortTarget::Score => a.1.score.total_cmp(&b.1.score),
            SortTarget::Id => a.1.doc.id.cmp(&b.1.doc.id),
            SortTarget::Field(_) => match (&a.0[i], &b.0[i]) {
                (Some(x), Some(y)) => x.compare(y),
                // Missing values sort last in both directions.
                (Some(_), None) => return Ordering::Less,
                (None, Some(_)) => return Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };
        let ordering = if key.ascending {
            ordering
        } else {
            ordering.reverse()
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// `_source` filtering.
enum SourceFilter {
    All,
    Disabled,
    Paths {
        includes: Vec<String>,
        excludes: Vec<String>,
    },
}

impl SourceFilter {
    fn parse(raw: Option<&Value>) -> Self {
        fn list(value: Option<&Value>) -> Vec<String> {
            match value {
                Some(Value::String(s)) => vec![s.clone()],
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            }
        }

        match raw {
            None | Some(Value::Null) | Some(Value::Bool(true)) => SourceFilter::All,
            Some(Value::Bool(false)) => SourceFilter::Disabled,
            Some(Value::Object(o)) => SourceFilter::Paths {
                includes: list(o.get("includes").or_else(|| o.get("include"))),
                excludes: list(o.get("excludes").or_else(|| o.get("exclude"))),
            },
            Some(other) => SourceFilter::Paths {
                includes: list(Some(other)),
                excludes: Vec::new(),
            },
        }
    }

    fn apply(&self, source: &Value) -> Option<Value> {
        match self {
            SourceFilter::All => Some(source.clone()),
            SourceFilter::Disabled => None,
            SourceFilter::Paths { includes, excludes } => {
                Some(filter_source(source, "", includes, excludes).unwrap_or_else(|| json!({})))
            }
        }
    }
}

fn path_matches(pattern: &str, path: &str) -> bool {
    if pattern.contains('*') {
        wildcard_regex(pattern).is_ok_and(|re| re.is_match(path))
    } else {
        pattern == path
    }
}

fn filter_source(value: &Value, prefix: &str, includes: &[String], excludes: &[String]) -> Option<Value> {
    match value {
        Value::Object(object) => {
            let mut out = Map::new();
            for (key, child) in object {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                if excludes.iter().any(|e| path_matches(e, &path)) {
                    continue;
                }
                let included = includes.is_empty()
                    || includes
                        .iter()
                        .any(|i| path_matches(i, &path) || path.starts_with(&format!("{}.", i)));
                let descend = includes
                    .iter()
                    .any(|i| i.contains('*') || i.starts_with(&format!("{}.", path)));
                if included && excludes.is_empty() {
                    out.insert(key.clone(), child.clone());
                } else if included || descend {
                    let sub_includes: &[String] = if included { &[] } else { includes };
                    if let Some(filtered) = filter_source(child, &path, sub_includes, excludes) {
                        out.insert(key.clone(), filtered);
                    }
                }
            }
            (!out.is_empty() || prefix.is_empty()).then_some(Value::Object(out))
        }
        Value::Array(items) => {
            let filtered: Vec<Value> = items
                .iter()
                .filter_map(|item| filter_source(item, prefix, includes, excludes))
                .collect();
            (!filtered.is_empty()).then_some(Value::Array(filtered))
        }
        // A scalar reached through a parent match is kept; otherwise it was
        // not selected.
        other => includes.is_empty().then(|| other.clone()),
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn health_check(&self) -> BackendResult<()> {
        Ok(())
    }

    async fn list_indices(&self, pattern: &str) -> BackendResult<Vec<String>> {
        let re = wildcard_regex(pattern).map_err(|e| rejected(400, e.to_string()))?;
        let mut names: Vec<String> = self
            .indices
            .read()
            .keys()
            .filter(|name| re.is_match(name))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    async fn index_exists(&self, index: &str) -> BackendResult<bool> {
        Ok(self.indices.read().contains_key(index))
    }

    async fn create_index(&self, index: &str, body: Value) -> BackendResult<()> {
        validate_index_name(index)?;
        let mut indices = self.indices.write();
        if indices.contains_key(index) {
            return Err(rejected(
                400,
                format!("resource_already_exists_exception: index [{}] already exists", index),
            ));
        }
        indices.insert(index.to_string(), MemoryIndex::from_body(&body));
        tracing::debug!(index = %index, "Created in-memory index");
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> BackendResult<bool> {
        let removed = self.indices.write().remove(index).is_some();
        if removed {
            tracing::debug!(index = %index, "Deleted in-memory index");
        }
        Ok(removed)
    }

    async fn get_mapping(&self, index: &str) -> BackendResult<Option<IndexMapping>> {
        Ok(self.indices.read().get(index).map(|i| IndexMapping {
            index: index.to_string(),
            properties: i.properties.clone(),
            meta: i.meta.clone(),
        }))
    }

    async fn put_mapping_meta(&self, index: &str, meta: Value) -> BackendResult<()> {
        let mut indices = self.indices.write();
        let target = indices.get_mut(index).ok_or_else(|| index_not_found(index))?;
        target.meta = meta;
        Ok(())
    }

    async fn reindex(&self, source: &str, target: &str) -> BackendResult<u64> {
        validate_index_name(target)?;
        let mut indices = self.indices.write();
        let mut documents: Vec<StoredDocument> = indices
            .get(source)
            .ok_or_else(|| index_not_found(source))?
            .documents
            .values()
            .cloned()
            .collect();
        documents.sort_by_key(|d| d.seq);

        let destination = indices
            .entry(target.to_string())
            .or_insert_with(|| MemoryIndex::from_body(&json!({})));
        for doc in &documents {
            destination.put(&doc.id, doc.source.clone());
        }
        Ok(documents.len() as u64)
    }

    async fn refresh(&self, index: &str) -> BackendResult<()> {
        if self.indices.read().contains_key(index) {
            Ok(())
        } else {
            Err(index_not_found(index))
        }
    }

    async fn upsert(&self, index: &str, id: &str, source: Value, _refresh: bool) -> BackendResult<()> {
        validate_index_name(index)?;
        self.indices
            .write()
            .entry(index.to_string())
            .or_insert_with(|| MemoryIndex::from_body(&json!({})))
            .put(id, source);
        Ok(())
    }

    async fn get(&self, index: &str, id: &str) -> BackendResult<Option<Value>> {
        let indices = self.indices.read();
        let target = indices.get(index).ok_or_else(|| index_not_found(index))?;
        Ok(target.documents.get(id).map(|d| d.source.clone()))
    }

    async fn delete(&self, index: &str, id: &str, _refresh: bool) -> BackendResult<bool> {
        let mut indices = self.indices.write();
        let target = indices.get_mut(index).ok_or_else(|| index_not_found(index))?;
        Ok(target.documents.remove(id).is_some())
    }

    async fn bulk(&self, operations: Vec<BulkOperation>, _refresh: bool) -> BackendResult<BulkResponse> {
        let started = Instant::now();
        let items = operations.len();
        let mut errors = false;
        let mut indices = self.indices.write();
        for operation in operations {
            match operation {
                BulkOperation::Index { index, id, source } => {
                    if validate_index_name(&index).is_err() {
                        errors = true;
                        continue;
                    }
                    indices
                        .entry(index)
                        .or_insert_with(|| MemoryIndex::from_body(&json!({})))
                        .put(&id, source);
                }
                BulkOperation::Delete { index, id } => match indices.get_mut(&index) {
                    Some(target) => {
                        target.documents.remove(&id);
                    }
                    None => errors = true,
                },
            }
        }
        Ok(BulkResponse {
            items,
            errors,
            took: started.elapsed().as_millis() as u64,
        })
    }

    async fn search(&self, indices: &[String], body: Value) -> BackendResult<Value> {
        let started = Instant::now();
        let guard = self.indices.read();
        let targets = resolve_targets(&guard, indices)?;

        let match_all = json!({ "match_all": {} });
        let query = body.get("query").unwrap_or(&match_all);

        let mut candidates: Vec<Candidate<'_>> = Vec::new();
        for &(name, index) in &targets {
            let compiled = query::compile(query, index).map_err(search_failure)?;
            let mut docs: Vec<&StoredDocument> = index.documents.values().collect();
            docs.sort_by_key(|d| d.seq);
            for doc in docs {
                if let Some(score) = compiled.score(doc) {
                    candidates.push(Candidate {
                        index: name,
                        doc,
                        score,
                    });
                }
            }
        }

        let aggregations = match body.get("aggs").or_else(|| body.get("aggregations")) {
            Some(Value::Object(definitions)) => {
                let docs: Vec<&StoredDocument> = candidates.iter().map(|c| c.doc).collect();
                let ctx = AggregationContext::new(targets.iter().map(|(_, index)| *index).collect());
                Some(aggregations::compute(definitions, &docs, &ctx).map_err(search_failure)?)
            }
            _ => None,
        };

        let mut keys = parse_sort(body.get("sort"), &targets)?;
        let scored = keys.is_empty() || keys.iter().any(|k| matches!(k.target, SortTarget::Score));
        if keys.is_empty() {
            keys.push(SortKey {
                target: SortTarget::Score,
                ascending: false,
            });
        }
        let mut keyed: Vec<(Vec<Option<Scalar>>, Candidate<'_>)> = candidates
            .into_iter()
            .map(|c| (keys.iter().map(|k| sort_value(c.doc, k)).collect(), c))
            .collect();
        keyed.sort_by(|a, b| compare_candidates(a, b, &keys));

        let from = body
            .get("from")
            .and_then(parse_number)
            .map(|n| n.max(0.0) as usize)
            .unwrap_or(0);
        let size = body
            .get("size")
            .and_then(parse_number)
            .map(|n| n.max(0.0) as usize)
            .unwrap_or(10);
        let window = targets
            .iter()
            .map(|(_, index)| index.max_result_window)
            .min()
            .unwrap_or(10_000);
        if from + size > window {
            return Err(search_failure(format!(
                "Result window is too large, from + size must be less than or equal to: [{}] but was [{}].",
                window,
                from + size
            )));
        }

        let source_filter = SourceFilter::parse(body.get("_source"));
        let with_version = body.get("version").and_then(Value::as_bool).unwrap_or(false);
        let max_score = if scored {
            keyed.iter().map(|(_, c)| c.score).reduce(f64::max)
        } else {
            None
        };
        let total = keyed.len();

        let hits: Vec<Value> = keyed
            .iter()
            .skip(from)
            .take(size)
            .map(|(_, c)| {
                let mut hit = json!({
                    "_index": c.index,
                    "_id": c.doc.id,
                    "_score": if scored { json!(c.score) } else { Value::Null },
                });
                if let Some(source) = source_filter.apply(&c.doc.source) {
                    hit["_source"] = source;
                }
                if with_version {
                    hit["_version"] = json!(c.doc.version);
                }
                hit
            })
            .collect();

        let mut response = json!({
            "took": started.elapsed().as_millis() as u64,
            "timed_out": false,
            "_shards": { "total": targets.len(), "successful": targets.len(), "skipped": 0, "failed": 0 },
            "hits": {
                "total": { "value": total, "relation": "eq" },
                "max_score": max_score,
                "hits": hits
            }
        });
        if let Some(aggregations) = aggregations {
            response["aggregations"] = aggregations;
        }
        Ok(response)
    }
}
