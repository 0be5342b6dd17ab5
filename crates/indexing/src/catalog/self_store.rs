//! The reserved index persisting catalog entries.
//!
//! Each entry is stored as one document keyed by index name. The backend's
//! own mapping metadata is not trusted to survive every round trip, so this
//! copy is authoritative for flags, field labels and meta on reload.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::core::{BulkOperation, SearchBackend};
use crate::error::{BackendError, IndexError, IndexResult};
use crate::types::Index;

use super::catalog::self_store_name;

/// Entries read per search.
const PAGE_SIZE: usize = 1_000;

/// Deepest `from + size` the backend accepts by default.
const MAX_WINDOW: usize = 10_000;

/// Handle on the self-store index of one scope.
#[derive(Debug, Clone)]
pub struct SelfStore {
    backend: Arc<dyn SearchBackend>,
    index: String,
}

impl SelfStore {
    /// Creates a handle for a scope.
    pub fn new(backend: Arc<dyn SearchBackend>, scope: &str) -> Self {
        Self {
            backend,
            index: self_store_name(scope),
        }
    }

    /// Physical name of the self-store index.
    pub fn name(&self) -> &str {
        &self.index
    }

    /// Returns true if the self-store index exists.
    pub async fn exists(&self) -> IndexResult<bool> {
        Ok(self.backend.index_exists(&self.index).await?)
    }

    /// Creates the self-store index.
    pub async fn create(&self) -> IndexResult<()> {
        let body = json!({
            "settings": { "index": { "number_of_shards": 1, "number_of_replicas": 0 } },
            "mappings": {
                "dynamic": false,
                "properties": {
                    "name": { "type": "keyword" },
                    "documentType": { "type": "keyword" },
                    "indexAsType": { "type": "keyword" }
                }
            }
        });
        self.backend.create_index(&self.index, body).await?;
        tracing::info!("Created catalog self-store '{}'", self.index);
        Ok(())
    }

    /// Creates the self-store index unless it already exists.
    pub async fn ensure(&self) -> IndexResult<()> {
        if !self.exists().await? {
            self.create().await?;
        }
        Ok(())
    }

    /// Reads every stored entry, one page at a time.
    pub async fn load(&self) -> IndexResult<Vec<Index>> {
        let mut entries = Vec::new();
        let mut from = 0usize;
        let mut total = 0u64;
        while from + PAGE_SIZE <= MAX_WINDOW {
            let body = json!({
                "query": { "match_all": {} },
                "from": from,
                "size": PAGE_SIZE,
                "track_total_hits": true,
                "sort": [{ "name": { "order": "asc", "unmapped_type": "keyword" } }]
            });
            let response = self
                .backend
                .search(std::slice::from_ref(&self.index), body)
                .await?;
            total = response
                .pointer("/hits/total/value")
                .or_else(|| response.pointer("/hits/total"))
                .and_then(Value::as_u64)
                .unwrap_or(0);

            let hits = response
                .pointer("/hits/hits")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let page_len = hits.len();
            for hit in hits {
                let id = hit.get("_id").and_then(Value::as_str).unwrap_or_default().to_string();
                let Some(source) = hit.get("_source") else {
                    continue;
                };
                match serde_json::from_value::<Index>(source.clone()) {
                    Ok(index) => entries.push(index),
                    Err(e) => {
                        tracing::warn!(store = %self.index, id = %id, "Skipping unreadable catalog entry: {}", e);
                    }
                }
            }

            from += page_len;
            if page_len < PAGE_SIZE || from as u64 >= total {
                break;
            }
        }

        if total > from as u64 {
            tracing::warn!(
                store = %self.index,
                total = total,
                read = from,
                "Catalog self-store holds more entries than one scan can read"
            );
        }
        Ok(entries)
    }

    /// Reads one stored entry. A missing self-store holds no entries.
    pub async fn get(&self, name: &str) -> IndexResult<Option<Index>> {
        match self.backend.get(&self.index, name).await {
            Ok(Some(source)) => Ok(Some(serde_json::from_value(source)?)),
            Ok(None) => Ok(None),
            Err(e) if is_missing_index(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes one entry, creating the self-store if needed.
    pub async fn save(&self, index: &Index) -> IndexResult<()> {
        self.ensure().await?;
        let source = serde_json::to_value(index)?;
        self.backend.upsert(&self.index, &index.name, source, true).await?;
        Ok(())
    }

    /// Writes many entries in one call.
    pub async fn save_all(&self, indices: &[Index]) -> IndexResult<()> {
        if indices.is_empty() {
            return Ok(());
        }
        self.ensure().await?;
        let mut operations = Vec::with_capacity(indices.len());
        for index in indices {
            operations.push(BulkOperation::Index {
                index: self.index.clone(),
                id: index.name.clone(),
                source: serde_json::to_value(index)?,
            });
        }
        let response = self.backend.bulk(operations, true).await?;
        if response.items != indices.len() {
            return Err(IndexError::ExecutionFailure {
                message: format!(
                    "seeding the catalog self-store returned {} items for {} entries",
                    response.items,
                    indices.len()
                ),
            });
        }
        Ok(())
    }

    /// Removes one entry. Returns false if it was not stored.
    pub async fn remove(&self, name: &str) -> IndexResult<bool> {
        match self.backend.delete(&self.index, name, true).await {
            Ok(removed) => Ok(removed),
            Err(e) if is_missing_index(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_missing_index(error: &BackendError) -> bool {
    matches!(error, BackendError::QueryError { status: 404, .. })
}
