//! The cluster facade.
//!
//! [`Cluster`] wires a backend, the type registry, the catalog, the router and
//! the query registries together. It is the entry point most callers need.
//!
//! # Example
//!
//! ```
//! use helios_indexing::cluster::Cluster;
//! use helios_indexing::config::ClusterConfig;
//! use helios_indexing::registry::{FieldDescriptor, TypeDescriptor};
//! use helios_indexing::types::{Document, FieldKind, QueryCriteria};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Order {
//!     id: String,
//!     customer: String,
//! }
//!
//! impl Document for Order {
//!     const TYPE_NAME: &'static str = "acme.Order";
//!
//!     fn id(&self) -> String {
//!         self.id.clone()
//!     }
//! }
//!
//! let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! runtime.block_on(async {
//!     let cluster = Cluster::in_memory(ClusterConfig::with_scope("acme"))
//!         .register_type(
//!             TypeDescriptor::new("acme.Order")
//!                 .with_index_name("orders")
//!                 .with_field(FieldDescriptor::new("customer", FieldKind::Text)),
//!         )
//!         .build()
//!         .unwrap();
//!     cluster.initialize().await.unwrap();
//!
//!     let order = Order { id: "1".into(), customer: "Ada Lovelace".into() };
//!     cluster.commit(&order).await.unwrap();
//!
//!     let results = cluster
//!         .query::<Order>(QueryCriteria::simple("ada").for_type("acme.Order"))
//!         .await
//!         .unwrap();
//!     assert_eq!(results.total, 1);
//! });
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use tokio::sync::broadcast;

use crate::backends::MemoryBackend;
use crate::catalog::{CatalogEvent, IndexCatalog, IndexManager};
use crate::config::ClusterConfig;
use crate::core::SearchBackend;
use crate::error::{IndexError, IndexResult};
use crate::query::{AggregationRegistry, ComparatorRegistry, materialize};
use crate::registry::{TypeDescriptor, TypeRegistry};
use crate::router::DocumentRouter;
use crate::types::{
    Document, DocumentEnvelope, DocumentSerializer, Index, IndexConfig, IndexField, JsonSerializer, QueryCriteria,
    QueryResults,
};

/// A connected, typed view of one cluster scope.
#[derive(Debug)]
pub struct Cluster {
    config: ClusterConfig,
    backend: Arc<dyn SearchBackend>,
    catalog: Arc<IndexCatalog>,
    manager: Arc<IndexManager>,
    router: DocumentRouter,
    comparators: Arc<ComparatorRegistry>,
    aggregations: Arc<AggregationRegistry>,
    serializer: Arc<dyn DocumentSerializer>,
    auto_create: Arc<AtomicBool>,
}

/// Builder for [`Cluster`].
#[derive(Debug)]
pub struct ClusterBuilder {
    config: ClusterConfig,
    backend: Arc<dyn SearchBackend>,
    types: Arc<TypeRegistry>,
    comparators: Arc<ComparatorRegistry>,
    aggregations: Arc<AggregationRegistry>,
    serializer: Arc<dyn DocumentSerializer>,
}

impl ClusterBuilder {
    /// Creates a builder with the built-in comparators and aggregation kinds
    /// and an empty type registry.
    pub fn new(backend: Arc<dyn SearchBackend>, config: ClusterConfig) -> Self {
        Self {
            config,
            backend,
            types: Arc::new(TypeRegistry::new()),
            comparators: Arc::new(ComparatorRegistry::with_builtins()),
            aggregations: Arc::new(AggregationRegistry::with_builtins()),
            serializer: Arc::new(JsonSerializer),
        }
    }

    /// Uses a shared type registry.
    pub fn with_types(mut self, types: Arc<TypeRegistry>) -> Self {
        self.types = types;
        self
    }

    /// Registers a document type.
    pub fn register_type(self, descriptor: TypeDescriptor) -> Self {
        self.types.register(descriptor);
        self
    }

    /// Uses a custom comparator registry.
    pub fn with_comparators(mut self, comparators: Arc<ComparatorRegistry>) -> Self {
        self.comparators = comparators;
        self
    }

    /// Uses a custom aggregation registry.
    pub fn with_aggregations(mut self, aggregations: Arc<AggregationRegistry>) -> Self {
        self.aggregations = aggregations;
        self
    }

    /// Uses a custom document serializer.
    pub fn with_serializer(mut self, serializer: Arc<dyn DocumentSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Validates the configuration and builds the cluster.
    pub fn build(self) -> IndexResult<Cluster> {
        self.config
            .validate()
            .map_err(|errors| IndexError::invalid_argument(errors.join("; ")))?;

        let catalog = Arc::new(IndexCatalog::new(self.config.scope(), self.types));
        let manager = Arc::new(IndexManager::new(
            self.backend.clone(),
            catalog.clone(),
            self.config.clone(),
        ));
        let auto_create = Arc::new(AtomicBool::new(self.config.auto_create_indices));
        let router = DocumentRouter::new(
            self.backend.clone(),
            manager.clone(),
            self.serializer.clone(),
            auto_create.clone(),
        );

        tracing::debug!(
            scope = %catalog.scope(),
            backend = self.backend.name(),
            "Cluster built"
        );
        Ok(Cluster {
            config: self.config,
            backend: self.backend,
            catalog,
            manager,
            router,
            comparators: self.comparators,
            aggregations: self.aggregations,
            serializer: self.serializer,
            auto_create,
        })
    }
}

impl Cluster {
    /// Starts building a cluster over any backend.
    pub fn builder(backend: Arc<dyn SearchBackend>, config: ClusterConfig) -> ClusterBuilder {
        ClusterBuilder::new(backend, config)
    }

    /// Starts building a cluster over a fresh in-memory backend.
    pub fn in_memory(config: ClusterConfig) -> ClusterBuilder {
        ClusterBuilder::new(Arc::new(MemoryBackend::new()), config)
    }

    /// Starts building a cluster over Elasticsearch.
    #[cfg(feature = "elasticsearch")]
    pub fn elasticsearch(config: ClusterConfig) -> IndexResult<ClusterBuilder> {
        let backend = crate::backends::ElasticsearchBackend::new(config.clone())?;
        Ok(ClusterBuilder::new(Arc::new(backend), config))
    }

    /// The configuration.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// The backend.
    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    /// The type registry.
    pub fn types(&self) -> &Arc<TypeRegistry> {
        self.catalog.types()
    }

    /// The in-memory catalog.
    pub fn catalog(&self) -> &Arc<IndexCatalog> {
        &self.catalog
    }

    /// The document router.
    pub fn router(&self) -> &DocumentRouter {
        &self.router
    }

    /// The comparator registry.
    pub fn comparators(&self) -> &Arc<ComparatorRegistry> {
        &self.comparators
    }

    /// The aggregation registry.
    pub fn aggregations(&self) -> &Arc<AggregationRegistry> {
        &self.aggregations
    }

    /// Whether commits create missing indices.
    pub fn auto_create_indices(&self) -> bool {
        self.auto_create.load(Ordering::SeqCst)
    }

    /// Toggles automatic index creation; the next commit sees the change.
    pub fn set_auto_create_indices(&self, enabled: bool) {
        self.auto_create.store(enabled, Ordering::SeqCst);
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    /// Loads the catalog, creating the self-store if needed.
    pub async fn initialize(&self) -> IndexResult<usize> {
        self.backend.health_check().await?;
        self.manager.initialize().await
    }

    /// Reloads the catalog.
    pub async fn refresh(&self) -> IndexResult<usize> {
        self.manager.refresh().await
    }

    /// Subscribes to catalog lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.manager.subscribe()
    }

    /// Looks an index up by name, coercing the scope if needed.
    pub fn index(&self, name: &str) -> Option<Index> {
        self.catalog.resolve_name(name)
    }

    /// Every catalog entry.
    pub fn indices(&self) -> Vec<Index> {
        self.catalog.all()
    }

    /// See [`IndexManager::create_index`].
    pub async fn create_index(&self, config: IndexConfig) -> IndexResult<Option<Index>> {
        self.manager.create_index(config).await
    }

    /// See [`IndexManager::delete_index`].
    pub async fn delete_index(&self, name: &str, preserve_dependents: bool) -> IndexResult<bool> {
        self.manager.delete_index(name, preserve_dependents).await
    }

    /// See [`IndexManager::copy_index`].
    pub async fn copy_index(&self, source: &str, target: &str, include_docs: bool) -> IndexResult<Option<Index>> {
        self.manager.copy_index(source, target, include_docs).await
    }

    /// See [`IndexManager::update_index_definition`].
    pub async fn update_index_definition<F>(&self, name: &str, change: F) -> IndexResult<Option<Index>>
    where
        F: FnOnce(&mut Index),
    {
        self.manager.update_index_definition(name, change).await
    }

    /// See [`IndexManager::update_field`].
    pub async fn update_field(&self, name: &str, field: IndexField) -> IndexResult<Option<Index>> {
        self.manager.update_field(name, field).await
    }

    /// See [`IndexManager::deprecate_index`].
    pub async fn deprecate_index(&self, name: &str, message: Option<String>) -> IndexResult<Option<Index>> {
        self.manager.deprecate_index(name, message).await
    }

    /// See [`IndexManager::undeprecate_index`].
    pub async fn undeprecate_index(&self, name: &str) -> IndexResult<Option<Index>> {
        self.manager.undeprecate_index(name).await
    }

    /// See [`IndexManager::set_hidden`].
    pub async fn set_hidden(&self, name: &str, hidden: bool) -> IndexResult<Option<Index>> {
        self.manager.set_hidden(name, hidden).await
    }

    /// See [`IndexManager::set_global_search`].
    pub async fn set_global_search(&self, name: &str, visible: bool) -> IndexResult<Option<Index>> {
        self.manager.set_global_search(name, visible).await
    }

    /// See [`IndexManager::set_force_refresh`].
    pub async fn set_force_refresh(&self, name: &str, force: bool) -> IndexResult<Option<Index>> {
        self.manager.set_force_refresh(name, force).await
    }

    /// See [`IndexManager::set_meta`].
    pub async fn set_meta(&self, name: &str, key: &str, value: &str) -> IndexResult<Option<Index>> {
        self.manager.set_meta(name, key, value).await
    }

    /// See [`IndexManager::remove_meta`].
    pub async fn remove_meta(&self, name: &str, key: &str) -> IndexResult<Option<Index>> {
        self.manager.remove_meta(name, key).await
    }

    /// See [`IndexManager::set_field_labels`].
    pub async fn set_field_labels(&self, name: &str, labels: &BTreeMap<String, String>) -> IndexResult<Option<Index>> {
        self.manager.set_field_labels(name, labels).await
    }

    // ========================================================================
    // Documents
    // ========================================================================

    /// Commits one document. Returns the physical index written to.
    pub async fn commit<D: Document>(&self, document: &D) -> IndexResult<String> {
        self.router.commit(&DocumentEnvelope::from_document(document)?).await
    }

    /// Commits an untyped document.
    pub async fn commit_envelope(&self, envelope: &DocumentEnvelope) -> IndexResult<String> {
        self.router.commit(envelope).await
    }

    /// Commits many documents in one bulk call.
    pub async fn commit_many<D: Document>(&self, documents: &[D]) -> IndexResult<usize> {
        let envelopes = documents
            .iter()
            .map(DocumentEnvelope::from_document)
            .collect::<IndexResult<Vec<_>>>()?;
        self.router.commit_many(&envelopes).await
    }

    /// Deletes one document. Returns false if it did not exist.
    pub async fn delete<D: Document>(&self, document: &D) -> IndexResult<bool> {
        self.router
            .delete(document.index_name().as_deref(), D::TYPE_NAME, &document.id())
            .await
    }

    /// Deletes a document of type `D` by id.
    pub async fn delete_by_id<D: Document>(&self, id: &str) -> IndexResult<bool> {
        self.router.delete(None, D::TYPE_NAME, id).await
    }

    /// Deletes many documents in one bulk call.
    pub async fn delete_many<D: Document>(&self, documents: &[D]) -> IndexResult<usize> {
        let envelopes = documents
            .iter()
            .map(DocumentEnvelope::from_document)
            .collect::<IndexResult<Vec<_>>>()?;
        self.router.delete_many(&envelopes).await
    }

    /// Reads a document of type `D` by id.
    pub async fn get<D: Document>(&self, id: &str) -> IndexResult<Option<D>> {
        self.get_from(None, id).await
    }

    /// Reads a document of type `D` by id from a named index.
    pub async fn get_from<D: Document>(&self, index_name: Option<&str>, id: &str) -> IndexResult<Option<D>> {
        match self.router.get(index_name, D::TYPE_NAME, id).await? {
            Some(source) => Ok(Some(serde_json::from_value(source)?)),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Runs a query.
    ///
    /// Unresolvable targets, unknown comparator tokens or aggregation kinds
    /// and malformed filter values fail with `Err`. Once the request is
    /// submitted, a backend failure is returned as a failure-shaped result
    /// (`total == -1`, failure detail in `messages`).
    pub async fn query<T: DeserializeOwned>(&self, mut criteria: QueryCriteria) -> IndexResult<QueryResults<T>> {
        criteria.apply_cluster_settings(&self.catalog)?;
        let body = criteria.to_request(&self.comparators, &self.aggregations, self.config.default_take)?;

        match self.backend.search(&criteria.effective_indices, body).await {
            Ok(response) => Ok(materialize(
                &criteria,
                &response,
                &self.aggregations,
                self.serializer.as_ref(),
            )),
            Err(e) => {
                tracing::warn!(indices = ?criteria.effective_indices, "Query failed: {}", e);
                let mut messages = criteria.messages;
                messages.push(e.to_string());
                Ok(QueryResults::failed(messages))
            }
        }
    }
}
