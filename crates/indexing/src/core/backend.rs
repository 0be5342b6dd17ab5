//! Search engine driver abstraction.
//!
//! This module defines the [`SearchBackend`] trait, the narrow set of index
//! administration, document and search calls the catalog, router and query
//! layers need from a search engine. Request and response bodies use the
//! Elasticsearch JSON wire shapes, so an implementation either forwards them
//! to a cluster or interprets them itself.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendResult;

/// Identifies the type of search backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// In-process backend.
    Memory,
    /// Elasticsearch (or a wire-compatible engine).
    Elasticsearch,
    /// Custom or unknown backend.
    Custom(&'static str),
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Elasticsearch => write!(f, "elasticsearch"),
            BackendKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// The mapping of one physical index as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexMapping {
    /// Physical index name.
    pub index: String,
    /// Mapping `properties` object.
    #[serde(default)]
    pub properties: Value,
    /// Mapping `_meta` object (`Value::Null` when absent).
    #[serde(default)]
    pub meta: Value,
}

/// One entry of a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    /// Insert or replace a document.
    Index {
        /// Target index.
        index: String,
        /// Document id.
        id: String,
        /// Document source.
        source: Value,
    },
    /// Delete a document.
    Delete {
        /// Target index.
        index: String,
        /// Document id.
        id: String,
    },
}

impl BulkOperation {
    /// The index this operation targets.
    pub fn index(&self) -> &str {
        match self {
            BulkOperation::Index { index, .. } | BulkOperation::Delete { index, .. } => index,
        }
    }
}

/// Summary of a bulk response.
///
/// Only the item count is relied upon; per-item shapes vary across engine
/// versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkResponse {
    /// Number of items in the response.
    pub items: usize,
    /// Whether the engine flagged any item as failed.
    pub errors: bool,
    /// Execution time in milliseconds.
    pub took: u64,
}

/// Search engine driver.
///
/// Errors the engine reports for a well-delivered request (bad query, missing
/// index, incompatible aggregation) come back as
/// [`BackendError::QueryError`](crate::error::BackendError::QueryError) with
/// the engine's status code.
#[async_trait]
pub trait SearchBackend: Send + Sync + Debug {
    /// Returns the kind of this backend.
    fn kind(&self) -> BackendKind;

    /// Returns the backend name for logging.
    fn name(&self) -> &'static str;

    /// Checks that the backend is reachable.
    async fn health_check(&self) -> BackendResult<()>;

    /// Lists physical index names matching a `*` wildcard pattern.
    async fn list_indices(&self, pattern: &str) -> BackendResult<Vec<String>>;

    /// Returns true if the index exists.
    async fn index_exists(&self, index: &str) -> BackendResult<bool>;

    /// Creates an index from a `{ settings, mappings }` body.
    async fn create_index(&self, index: &str, body: Value) -> BackendResult<()>;

    /// Deletes an index. Returns false if it did not exist.
    async fn delete_index(&self, index: &str) -> BackendResult<bool>;

    /// Reads an index mapping. Returns `None` if the index does not exist.
    async fn get_mapping(&self, index: &str) -> BackendResult<Option<IndexMapping>>;

    /// Replaces the mapping `_meta` object.
    async fn put_mapping_meta(&self, index: &str, meta: Value) -> BackendResult<()>;

    /// Copies every document of `source` into `target`. Returns the number copied.
    async fn reindex(&self, source: &str, target: &str) -> BackendResult<u64>;

    /// Makes recent writes visible to search.
    async fn refresh(&self, index: &str) -> BackendResult<()>;

    /// Inserts or replaces a document.
    async fn upsert(&self, index: &str, id: &str, source: Value, refresh: bool)
    -> BackendResult<()>;

    /// Reads a document source. Returns `None` if it does not exist.
    async fn get(&self, index: &str, id: &str) -> BackendResult<Option<Value>>;

    /// Deletes a document. Returns false if it did not exist.
    async fn delete(&self, index: &str, id: &str, refresh: bool) -> BackendResult<bool>;

    /// Executes a batch of index/delete operations in one call.
    async fn bulk(&self, operations: Vec<BulkOperation>, refresh: bool)
    -> BackendResult<BulkResponse>;

    /// Runs a search body against the given indices and returns the raw response.
    async fn search(&self, indices: &[String], body: Value) -> BackendResult<Value>;
}

/// Converts a `*` wildcard pattern to an anchored regex.
pub(crate) fn wildcard_regex(pattern: &str) -> Result<regex::Regex, regex::Error> {
    let escaped = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    regex::Regex::new(&format!("^{}$", escaped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::Memory.to_string(), "memory");
        assert_eq!(BackendKind::Elasticsearch.to_string(), "elasticsearch");
        assert_eq!(BackendKind::Custom("opensearch").to_string(), "opensearch");
    }

    #[test]
    fn test_wildcard_regex() {
        let re = wildcard_regex("acme_*").unwrap();
        assert!(re.is_match("acme_orders"));
        assert!(re.is_match("acme_"));
        assert!(!re.is_match("other_acme_orders"));

        let re = wildcard_regex("a.b*").unwrap();
        assert!(re.is_match("a.bc"));
        assert!(!re.is_match("axbc"));
    }

    #[test]
    fn test_bulk_operation_index() {
        let op = BulkOperation::Delete {
            index: "acme_orders".to_string(),
            id: "1".to_string(),
        };
        assert_eq!(op.index(), "acme_orders");
    }
}
