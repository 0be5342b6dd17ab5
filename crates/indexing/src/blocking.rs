//! Synchronous cluster API.
//!
//! [`Cluster`] owns a current-thread tokio runtime and blocks on the async
//! implementation for each call. It must not be used from inside another
//! runtime.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use tokio::runtime::{Builder, Runtime};

use crate::cluster::{Cluster as AsyncCluster, ClusterBuilder};
use crate::error::{BackendError, IndexResult};
use crate::types::{Document, DocumentEnvelope, Index, IndexConfig, IndexField, QueryCriteria, QueryResults};

/// Blocking wrapper around [`crate::cluster::Cluster`].
#[derive(Debug)]
pub struct Cluster {
    inner: AsyncCluster,
    runtime: Runtime,
}

impl Cluster {
    /// Wraps an async cluster.
    pub fn new(inner: AsyncCluster) -> IndexResult<Self> {
        let runtime = Builder::new_current_thread().enable_all().build().map_err(|e| {
            BackendError::Internal {
                backend_name: "runtime".to_string(),
                message: format!("failed to start runtime: {}", e),
                source: Some(Box::new(e)),
            }
        })?;
        Ok(Self { inner, runtime })
    }

    /// Builds the async cluster and wraps it.
    pub fn build(builder: ClusterBuilder) -> IndexResult<Self> {
        Self::new(builder.build()?)
    }

    /// The wrapped async cluster, for catalog inspection and subscriptions.
    pub fn inner(&self) -> &AsyncCluster {
        &self.inner
    }

    /// See [`AsyncCluster::initialize`].
    pub fn initialize(&self) -> IndexResult<usize> {
        self.runtime.block_on(self.inner.initialize())
    }

    /// See [`AsyncCluster::refresh`].
    pub fn refresh(&self) -> IndexResult<usize> {
        self.runtime.block_on(self.inner.refresh())
    }

    /// See [`AsyncCluster::set_auto_create_indices`].
    pub fn set_auto_create_indices(&self, enabled: bool) {
        self.inner.set_auto_create_indices(enabled);
    }

    /// See [`AsyncCluster::index`].
    pub fn index(&self, name: &str) -> Option<Index> {
        self.inner.index(name)
    }

    /// See [`AsyncCluster::create_index`].
    pub fn create_index(&self, config: IndexConfig) -> IndexResult<Option<Index>> {
        self.runtime.block_on(self.inner.create_index(config))
    }

    /// See [`AsyncCluster::delete_index`].
    pub fn delete_index(&self, name: &str, preserve_dependents: bool) -> IndexResult<bool> {
        self.runtime
            .block_on(self.inner.delete_index(name, preserve_dependents))
    }

    /// See [`AsyncCluster::copy_index`].
    pub fn copy_index(&self, source: &str, target: &str, include_docs: bool) -> IndexResult<Option<Index>> {
        self.runtime
            .block_on(self.inner.copy_index(source, target, include_docs))
    }

    /// See [`AsyncCluster::update_index_definition`].
    pub fn update_index_definition<F>(&self, name: &str, change: F) -> IndexResult<Option<Index>>
    where
        F: FnOnce(&mut Index),
    {
        self.runtime
            .block_on(self.inner.update_index_definition(name, change))
    }

    /// See [`AsyncCluster::update_field`].
    pub fn update_field(&self, name: &str, field: IndexField) -> IndexResult<Option<Index>> {
        self.runtime.block_on(self.inner.update_field(name, field))
    }

    /// See [`AsyncCluster::deprecate_index`].
    pub fn deprecate_index(&self, name: &str, message: Option<String>) -> IndexResult<Option<Index>> {
        self.runtime
            .block_on(self.inner.deprecate_index(name, message))
    }

    /// See [`AsyncCluster::undeprecate_index`].
    pub fn undeprecate_index(&self, name: &str) -> IndexResult<Option<Index>> {
        self.runtime.block_on(self.inner.undeprecate_index(name))
    }

    /// See [`AsyncCluster::set_hidden`].
    pub fn set_hidden(&self, name: &str, hidden: bool) -> IndexResult<Option<Index>> {
        self.runtime.block_on(self.inner.set_hidden(name, hidden))
    }

    /// See [`AsyncCluster::set_global_search`].
    pub fn set_global_search(&self, name: &str, visible: bool) -> IndexResult<Option<Index>> {
        self.runtime
            .block_on(self.inner.set_global_search(name, visible))
    }

    /// See [`AsyncCluster::set_force_refresh`].
    pub fn set_force_refresh(&self, name: &str, force: bool) -> IndexResult<Option<Index>> {
        self.runtime
            .block_on(self.inner.set_force_refresh(name, force))
    }

    /// See [`AsyncCluster::set_meta`].
    pub fn set_meta(&self, name: &str, key: &str, value: &str) -> IndexResult<Option<Index>> {
        self.runtime.block_on(self.inner.set_meta(name, key, value))
    }

    /// See [`AsyncCluster::remove_meta`].
    pub fn remove_meta(&self, name: &str, key: &str) -> IndexResult<Option<Index>> {
        self.runtime.block_on(self.inner.remove_meta(name, key))
    }

    /// See [`AsyncCluster::set_field_labels`].
    pub fn set_field_labels(&self, name: &str, labels: &BTreeMap<String, String>) -> IndexResult<Option<Index>> {
        self.runtime
            .block_on(self.inner.set_field_labels(name, labels))
    }

    /// See [`AsyncCluster::commit`].
    pub fn commit<D: Document>(&self, document: &D) -> IndexResult<String> {
        self.runtime.block_on(self.inner.commit(document))
    }

    /// See [`AsyncCluster::commit_envelope`].
    pub fn commit_envelope(&self, envelope: &DocumentEnvelope) -> IndexResult<String> {
        self.runtime.block_on(self.inner.commit_envelope(envelope))
    }

    /// See [`AsyncCluster::commit_many`].
    pub fn commit_many<D: Document>(&self, documents: &[D]) -> IndexResult<usize> {
        self.runtime.block_on(self.inner.commit_many(documents))
    }

    /// See [`AsyncCluster::delete`].
    pub fn delete<D: Document>(&self, document: &D) -> IndexResult<bool> {
        self.runtime.block_on(self.inner.delete(document))
    }

    /// See [`AsyncCluster::delete_by_id`].
    pub fn delete_by_id<D: Document>(&self, id: &str) -> IndexResult<bool> {
        self.runtime.block_on(self.inner.delete_by_id::<D>(id))
    }

    /// See [`AsyncCluster::delete_many`].
    pub fn delete_many<D: Document>(&self, documents: &[D]) -> IndexResult<usize> {
        self.runtime.block_on(self.inner.delete_many(documents))
    }

    /// See [`AsyncCluster::get`].
    pub fn get<D: Document>(&self, id: &str) -> IndexResult<Option<D>> {
        self.runtime.block_on(self.inner.get(id))
    }

    /// See [`AsyncCluster::get_from`].
    pub fn get_from<D: Document>(&self, index_name: Option<&str>, id: &str) -> IndexResult<Option<D>> {
        self.runtime.block_on(self.inner.get_from(index_name, id))
    }

    /// See [`AsyncCluster::query`].
    pub fn query<T: DeserializeOwned>(&self, criteria: QueryCriteria) -> IndexResult<QueryResults<T>> {
        self.runtime.block_on(self.inner.query(criteria))
    }
}
