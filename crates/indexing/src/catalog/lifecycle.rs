//! Index lifecycle operations.
//!
//! [`IndexManager`] is the only writer of the [`IndexCatalog`]. Every
//! mutation goes to the backend first, then to the self-store, and finally to
//! the in-memory catalog before the call returns.
//!
//! Validation failures (unknown type, missing alias target, invalid alias
//! hierarchy) are logged and reported as `Ok(None)`/`Ok(false)`. A write the
//! backend acknowledged but whose definition cannot be read back afterwards
//! is reported as [`IndexError::InvalidOperation`].

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::ClusterConfig;
use crate::core::SearchBackend;
use crate::error::{BackendError, IndexError, IndexResult};
use crate::types::{Index, IndexConfig, IndexField};

use super::catalog::IndexCatalog;
use super::events::{CatalogEvent, CatalogEvents};
use super::schema;
use super::self_store::SelfStore;

/// Creates, copies, updates and deletes catalog entries.
#[derive(Debug)]
pub struct IndexManager {
    backend: Arc<dyn SearchBackend>,
    catalog: Arc<IndexCatalog>,
    self_store: SelfStore,
    config: ClusterConfig,
    events: CatalogEvents,
}

impl IndexManager {
    /// Creates a manager writing through to `catalog`.
    pub fn new(backend: Arc<dyn SearchBackend>, catalog: Arc<IndexCatalog>, config: ClusterConfig) -> Self {
        let self_store = SelfStore::new(backend.clone(), catalog.scope());
        Self {
            backend,
            catalog,
            self_store,
            config,
            events: CatalogEvents::new(),
        }
    }

    /// The catalog this manager maintains.
    pub fn catalog(&self) -> &Arc<IndexCatalog> {
        &self.catalog
    }

    /// The self-store backing the catalog.
    pub fn self_store(&self) -> &SelfStore {
        &self.self_store
    }

    /// Subscribes to catalog lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.events.subscribe()
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Loads every index of the scope, creating and seeding the self-store
    /// if it does not exist yet. Returns the number of catalog entries.
    pub async fn initialize(&self) -> IndexResult<usize> {
        self.events.emit(CatalogEvent::InitializeStarted);
        let count = self.load(true).await?;
        tracing::info!(scope = %self.catalog.scope(), count, "Index catalog initialized");
        self.events.emit(CatalogEvent::InitializeCompleted { count });
        Ok(count)
    }

    /// Reloads the catalog from the backend and the self-store.
    pub async fn refresh(&self) -> IndexResult<usize> {
        self.events.emit(CatalogEvent::RefreshStarted);
        let count = self.load(false).await?;
        tracing::debug!(scope = %self.catalog.scope(), count, "Index catalog refreshed");
        self.events.emit(CatalogEvent::RefreshCompleted { count });
        Ok(count)
    }

    async fn load(&self, create_self_store: bool) -> IndexResult<usize> {
        let pattern = format!("{}_*", self.catalog.scope());
        let physical: HashSet<String> = self
            .backend
            .list_indices(&pattern)
            .await?
            .into_iter()
            .filter(|name| name != self.self_store.name())
            .collect();

        let mut loaded = Vec::with_capacity(physical.len());
        for name in &physical {
            let mapping = self.backend.get_mapping(name).await?;
            match mapping.as_ref().and_then(schema::index_from_mapping) {
                Some(index) => loaded.push(index),
                None => tracing::debug!(index = %name, "Skipping index without catalog metadata"),
            }
        }

        let stored = if self.self_store.exists().await? {
            self.self_store.load().await?
        } else if create_self_store {
            self.self_store.create().await?;
            self.self_store.save_all(&loaded).await?;
            tracing::info!(
                store = %self.self_store.name(),
                seeded = loaded.len(),
                "Seeded catalog self-store"
            );
            Vec::new()
        } else {
            Vec::new()
        };

        let (merged, stale) = merge_entries(loaded, &physical, stored);
        for name in stale {
            tracing::debug!(index = %name, "Removing stale self-store entry");
            self.self_store.remove(&name).await?;
        }

        let count = merged.len();
        self.catalog.replace_all(merged);
        Ok(count)
    }

    // ========================================================================
    // Create / copy / delete
    // ========================================================================

    /// Creates a catalog entry, and a physical index unless the entry aliases
    /// another type's index.
    ///
    /// Returns the existing entry if the normalized name is already taken, and
    /// `None` for the self-store's reserved name.
    pub async fn create_index(&self, config: IndexConfig) -> IndexResult<Option<Index>> {
        let (name, coerced) = self.catalog.normalize_name(&config.name);
        if coerced {
            tracing::warn!(requested = %config.name, normalized = %name, "Index name coerced");
        }
        if name == self.self_store.name() {
            tracing::warn!(index = %name, "Index name is reserved for the catalog self-store");
            return Ok(None);
        }

        if let Some(existing) = self.catalog.get(&name) {
            tracing::debug!(index = %name, "Index already exists");
            return Ok(Some(existing));
        }

        let types = self.catalog.types();
        if !types.contains(&config.document_type) {
            tracing::error!(
                index = %name,
                document_type = %config.document_type,
                "Cannot create index for an unregistered document type"
            );
            return Ok(None);
        }

        let mut index = Index::new(name.clone(), config.document_type.clone());
        index.index_as_type = config.index_as_type.clone();
        index.is_hidden = config.is_hidden;
        index.return_in_global_search = config.return_in_global_search.unwrap_or(true);
        index.force_refresh_on_document_commit = config.force_refresh_on_document_commit;
        index.meta = config.meta.clone();

        let index = match &config.index_as_type {
            Some(target_type) => {
                let Some(target) = self.catalog.physical_index_for_type(target_type) else {
                    if self.catalog.indices_for_type(target_type).iter().any(Index::is_alias) {
                        tracing::error!(
                            index = %name,
                            target_type = %target_type,
                            "Alias target is itself an alias"
                        );
                    } else {
                        tracing::error!(
                            index = %name,
                            target_type = %target_type,
                            "No index exists for the alias target type"
                        );
                    }
                    return Ok(None);
                };
                if !types.is_subtype_of(&config.document_type, target_type) {
                    tracing::error!(
                        index = %name,
                        document_type = %config.document_type,
                        target_type = %target_type,
                        "Alias document type is not a subtype of its target type"
                    );
                    return Ok(None);
                }

                index.fields = target.fields.clone();
                apply_field_overrides(&mut index, &config.fields);
                self.self_store.save(&index).await?;
                tracing::info!(index = %name, target = %target.name, "Created alias index");
                index
            }
            None => {
                index.fields = schema::derive_fields(types, &config.document_type)?;
                apply_field_overrides(&mut index, &config.fields);

                let body = schema::index_body(&self.config, &index)?;
                self.create_physical(&name, body).await?;
                let confirmed = self.read_back(&name).await?;
                self.self_store.save(&confirmed).await?;
                tracing::info!(index = %name, document_type = %confirmed.document_type, "Created index");
                confirmed
            }
        };

        self.catalog.insert(index.clone());
        self.events.emit(CatalogEvent::IndexCreated(name));
        Ok(Some(index))
    }

    /// Clones `source`'s definition under `target`, optionally reindexing its
    /// documents. Returns `None` if the source is unknown or the target name
    /// is taken or reserved.
    pub async fn copy_index(&self, source: &str, target: &str, include_docs: bool) -> IndexResult<Option<Index>> {
        let Some(source_index) = self.catalog.resolve_name(source) else {
            tracing::warn!(source = %source, "Cannot copy an unknown index");
            return Ok(None);
        };
        let (target_name, coerced) = self.catalog.normalize_name(target);
        if coerced {
            tracing::warn!(requested = %target, normalized = %target_name, "Index name coerced");
        }
        if target_name == self.self_store.name() {
            tracing::warn!(target = %target_name, "Index name is reserved for the catalog self-store");
            return Ok(None);
        }
        if self.catalog.contains(&target_name) {
            tracing::warn!(target = %target_name, "Copy target already exists");
            return Ok(None);
        }

        let mut copy = source_index.clone();
        copy.name = target_name.clone();

        let copy = if source_index.is_alias() {
            if include_docs {
                tracing::debug!(source = %source_index.name, "Alias copies share their target's documents");
            }
            self.self_store.save(&copy).await?;
            copy
        } else {
            let properties = match self.backend.get_mapping(&source_index.name).await? {
                Some(mapping) if mapping.properties.is_object() => mapping.properties,
                _ => schema::mapping_properties(&copy.fields),
            };
            let body = schema::index_body_with_properties(&self.config, &copy, properties)?;
            self.create_physical(&target_name, body).await?;
            if include_docs {
                let copied = self.backend.reindex(&source_index.name, &target_name).await?;
                tracing::info!(source = %source_index.name, target = %target_name, copied, "Reindexed documents");
            }
            let confirmed = self.read_back(&target_name).await?;
            self.self_store.save(&confirmed).await?;
            confirmed
        };

        tracing::info!(source = %source_index.name, target = %target_name, "Copied index");
        self.catalog.insert(copy.clone());
        self.events.emit(CatalogEvent::IndexCreated(target_name));
        Ok(Some(copy))
    }

    /// Deletes an index and, unless `preserve_dependents`, every alias whose
    /// target type is the deleted index's document type.
    ///
    /// Returns false if the name is unknown.
    pub async fn delete_index(&self, name: &str, preserve_dependents: bool) -> IndexResult<bool> {
        let Some(index) = self.catalog.resolve_name(name) else {
            tracing::warn!(index = %name, "Cannot delete an unknown index");
            return Ok(false);
        };

        let mut seen = HashSet::from([index.name.clone()]);
        let mut pending = vec![index];
        while let Some(current) = pending.pop() {
            if !preserve_dependents {
                for dependent in self.catalog.dependents_of(&current) {
                    if seen.insert(dependent.name.clone()) {
                        tracing::info!(index = %dependent.name, target = %current.name, "Cascading delete");
                        pending.push(dependent);
                    }
                }
            }
            self.remove_entry(&current).await?;
        }
        Ok(true)
    }

    async fn remove_entry(&self, index: &Index) -> IndexResult<()> {
        if !index.is_alias() && !self.backend.delete_index(&index.name).await? {
            tracing::debug!(index = %index.name, "Physical index was already gone");
        }
        self.self_store.remove(&index.name).await?;
        self.catalog.remove(&index.name);
        tracing::info!(index = %index.name, "Deleted index");
        self.events.emit(CatalogEvent::IndexDeleted(index.name.clone()));
        Ok(())
    }

    async fn create_physical(&self, name: &str, body: serde_json::Value) -> IndexResult<()> {
        match self.backend.create_index(name, body).await {
            Ok(()) => Ok(()),
            Err(BackendError::QueryError { message, .. }) if message.contains("resource_already_exists") => {
                tracing::warn!(index = %name, "Physical index already exists, adopting it");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The backend's stored definition of a physical index.
    async fn read_back(&self, name: &str) -> IndexResult<Index> {
        let mapping = self.backend.get_mapping(name).await?;
        mapping.as_ref().and_then(schema::index_from_mapping).ok_or_else(|| {
            IndexError::invalid_operation(format!(
                "index '{}' was written but its definition could not be read back",
                name
            ))
        })
    }

    // ========================================================================
    // Updates
    // ========================================================================

    /// Applies `change` to the stored definition of `name`.
    ///
    /// The current definition is re-read from the backend (or the self-store
    /// for aliases) so changes made by other recent calls are kept. The name,
    /// document type and alias target cannot be changed. Returns `None` if the
    /// name is unknown.
    pub async fn update_index_definition<F>(&self, name: &str, change: F) -> IndexResult<Option<Index>>
    where
        F: FnOnce(&mut Index),
    {
        let Some(cached) = self.catalog.resolve_name(name) else {
            tracing::warn!(index = %name, "Cannot update an unknown index");
            return Ok(None);
        };

        let mut current = self.read_current(&cached).await?;
        change(&mut current);
        current.name = cached.name.clone();
        current.document_type = cached.document_type.clone();
        current.index_as_type = cached.index_as_type.clone();

        if !current.is_alias() {
            self.backend
                .put_mapping_meta(&current.name, schema::catalog_meta(&current)?)
                .await?;
        }
        self.self_store.save(&current).await?;

        let confirmed = if current.is_alias() {
            self.self_store.get(&current.name).await?.ok_or_else(|| {
                IndexError::invalid_operation(format!(
                    "index '{}' was updated but its definition could not be read back",
                    current.name
                ))
            })?
        } else {
            self.read_back(&current.name).await?
        };

        self.catalog.insert(confirmed.clone());
        tracing::debug!(index = %confirmed.name, "Updated index definition");
        self.events.emit(CatalogEvent::IndexUpdated(confirmed.name.clone()));
        Ok(Some(confirmed))
    }

    async fn read_current(&self, cached: &Index) -> IndexResult<Index> {
        if !cached.is_alias() {
            let mapping = self.backend.get_mapping(&cached.name).await?;
            if let Some(index) = mapping.as_ref().and_then(schema::index_from_mapping) {
                return Ok(index);
            }
        }
        Ok(self
            .self_store
            .get(&cached.name)
            .await?
            .unwrap_or_else(|| cached.clone()))
    }

    /// Inserts or replaces one field's metadata.
    pub async fn update_field(&self, name: &str, field: IndexField) -> IndexResult<Option<Index>> {
        self.update_index_definition(name, |index| index.upsert_field(field))
            .await
    }

    /// Marks an index deprecated. Queries touching it carry the notice.
    pub async fn deprecate_index(&self, name: &str, message: Option<String>) -> IndexResult<Option<Index>> {
        self.update_index_definition(name, |index| {
            index.is_deprecated = true;
            index.deprecation_message = message;
        })
        .await
    }

    /// Clears the deprecation flag and message.
    pub async fn undeprecate_index(&self, name: &str) -> IndexResult<Option<Index>> {
        self.update_index_definition(name, |index| {
            index.is_deprecated = false;
            index.deprecation_message = None;
        })
        .await
    }

    /// Sets the hidden flag.
    pub async fn set_hidden(&self, name: &str, hidden: bool) -> IndexResult<Option<Index>> {
        self.update_index_definition(name, |index| index.is_hidden = hidden)
            .await
    }

    /// Sets global-search visibility.
    pub async fn set_global_search(&self, name: &str, visible: bool) -> IndexResult<Option<Index>> {
        self.update_index_definition(name, |index| index.return_in_global_search = visible)
            .await
    }

    /// Sets whether commits refresh the index immediately.
    pub async fn set_force_refresh(&self, name: &str, force: bool) -> IndexResult<Option<Index>> {
        self.update_index_definition(name, |index| index.force_refresh_on_document_commit = force)
            .await
    }

    /// Sets one metadata entry.
    pub async fn set_meta(&self, name: &str, key: &str, value: &str) -> IndexResult<Option<Index>> {
        self.update_index_definition(name, |index| {
            index.meta.insert(key.to_string(), value.to_string());
        })
        .await
    }

    /// Removes one metadata entry.
    pub async fn remove_meta(&self, name: &str, key: &str) -> IndexResult<Option<Index>> {
        self.update_index_definition(name, |index| {
            index.meta.remove(key);
        })
        .await
    }

    /// Sets display labels by field name. Labels for unknown fields are ignored.
    pub async fn set_field_labels(&self, name: &str, labels: &BTreeMap<String, String>) -> IndexResult<Option<Index>> {
        self.update_index_definition(name, |index| {
            for field in &mut index.fields {
                if let Some(label) = labels.get(&field.name) {
                    field.label = Some(label.clone());
                }
            }
        })
        .await
    }
}

fn apply_field_overrides(index: &mut Index, overrides: &[IndexField]) {
    for field in overrides {
        index.upsert_field(field.clone());
    }
}

/// Merges backend-derived entries with self-store entries.
///
/// A stored entry wins when its physical index still exists or when it is an
/// alias. Stored entries for vanished physical indices are returned as stale.
fn merge_entries(loaded: Vec<Index>, physical: &HashSet<String>, stored: Vec<Index>) -> (Vec<Index>, Vec<String>) {
    let mut merged: BTreeMap<String, Index> = loaded.into_iter().map(|i| (i.name.clone(), i)).collect();
    let mut stale = Vec::new();
    for entry in stored {
        if entry.is_alias() || physical.contains(&entry.name) {
            merged.insert(entry.name.clone(), entry);
        } else {
            stale.push(entry.name);
        }
    }
    (merged.into_values().collect(), stale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;
    use crate::registry::{FieldDescriptor, TypeDescriptor, TypeRegistry};
    use crate::types::FieldKind;

    fn types() -> Arc<TypeRegistry> {
        let types = TypeRegistry::new();
        types.register(
            TypeDescriptor::new("acme.Order")
                .with_field(FieldDescriptor::new("customer", FieldKind::Text))
                .with_field(FieldDescriptor::new("total", FieldKind::Float).boosted(false)),
        );
        types.register(TypeDescriptor::new("acme.RushOrder").with_parent("acme.Order"));
        types.register(TypeDescriptor::new("acme.Invoice"));
        Arc::new(types)
    }

    fn manager() -> (Arc<MemoryBackend>, IndexManager) {
        let backend = Arc::new(MemoryBackend::new());
        let catalog = Arc::new(IndexCatalog::new("acme", types()));
        let manager = IndexManager::new(backend.clone(), catalog, ClusterConfig::with_scope("acme"));
        (backend, manager)
    }

    #[tokio::test]
    async fn test_create_normalizes_and_is_idempotent() {
        let (backend, manager) = manager();
        let first = manager
            .create_index(IndexConfig::new("Orders", "acme.Order"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.name, "acme_orders");
        assert_eq!(first.fields.len(), 2);

        let second = manager
            .create_index(IndexConfig::new("acme_orders", "acme.Order"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.index_names(), vec!["acme__catalog", "acme_orders"]);
    }

    #[tokio::test]
    async fn test_self_store_name_is_reserved() {
        let (backend, manager) = manager();
        for name in ["_catalog", "acme__catalog", "ACME__Catalog"] {
            let created = manager
                .create_index(IndexConfig::new(name, "acme.Order"))
                .await
                .unwrap();
            assert!(created.is_none(), "{} was accepted", name);
        }
        assert!(backend.index_names().is_empty());
        assert!(manager.catalog().get("acme__catalog").is_none());

        manager
            .create_index(IndexConfig::new("orders", "acme.Order"))
            .await
            .unwrap()
            .unwrap();
        assert!(manager.copy_index("orders", "_catalog", true).await.unwrap().is_none());
        assert_eq!(backend.index_names(), vec!["acme__catalog", "acme_orders"]);
        assert_eq!(manager.self_store().load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_type_and_bad_alias() {
        let (_, manager) = manager();
        assert!(
            manager
                .create_index(IndexConfig::new("ghosts", "acme.Ghost"))
                .await
                .unwrap()
                .is_none()
        );

        // Target type has no index yet.
        let rush = IndexConfig::new("rush", "acme.RushOrder").with_index_as_type("acme.Order");
        assert!(manager.create_index(rush.clone()).await.unwrap().is_none());

        manager
            .create_index(IndexConfig::new("orders", "acme.Order"))
            .await
            .unwrap();
        // Invoice does not descend from Order.
        let invoices = IndexConfig::new("invoices", "acme.Invoice").with_index_as_type("acme.Order");
        assert!(manager.create_index(invoices).await.unwrap().is_none());

        let alias = manager.create_index(rush).await.unwrap().unwrap();
        assert!(alias.is_alias());
        assert_eq!(alias.fields.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_aliases() {
        let (backend, manager) = manager();
        manager
            .create_index(IndexConfig::new("orders", "acme.Order"))
            .await
            .unwrap();
        manager
            .create_index(IndexConfig::new("rush", "acme.RushOrder").with_index_as_type("acme.Order"))
            .await
            .unwrap();

        let mut events = manager.subscribe();
        assert!(manager.delete_index("orders", false).await.unwrap());
        assert!(manager.catalog().is_empty());
        assert_eq!(backend.index_names(), vec!["acme__catalog"]);
        assert!(manager.self_store().load().await.unwrap().is_empty());
        assert!(matches!(events.recv().await.unwrap(), CatalogEvent::IndexDeleted(_)));

        assert!(!manager.delete_index("orders", false).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_can_preserve_dependents() {
        let (_, manager) = manager();
        manager
            .create_index(IndexConfig::new("orders", "acme.Order"))
            .await
            .unwrap();
        manager
            .create_index(IndexConfig::new("rush", "acme.RushOrder").with_index_as_type("acme.Order"))
            .await
            .unwrap();

        assert!(manager.delete_index("acme_orders", true).await.unwrap());
        assert_eq!(manager.catalog().names(), vec!["acme_rush"]);
    }

    #[tokio::test]
    async fn test_flag_updates_survive_refresh() {
        let (_, manager) = manager();
        manager.initialize().await.unwrap();
        manager
            .create_index(IndexConfig::new("orders", "acme.Order"))
            .await
            .unwrap();

        manager
            .deprecate_index("orders", Some("use invoices".to_string()))
            .await
            .unwrap();
        manager.set_meta("orders", "owner", "sales").await.unwrap();
        let labels = BTreeMap::from([("customer".to_string(), "Customer".to_string())]);
        let updated = manager
            .set_field_labels("orders", &labels)
            .await
            .unwrap()
            .unwrap();
        assert!(updated.is_deprecated);
        assert_eq!(updated.meta.get("owner").map(String::as_str), Some("sales"));

        manager.catalog().replace_all(Vec::new());
        assert_eq!(manager.refresh().await.unwrap(), 1);
        let reloaded = manager.catalog().get("acme_orders").unwrap();
        assert_eq!(reloaded, updated);
        assert_eq!(reloaded.field("customer").unwrap().label.as_deref(), Some("Customer"));

        assert!(manager.set_hidden("missing", true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_initialize_seeds_self_store() {
        let (backend, manager) = manager();
        let existing = Index::new("acme_orders", "acme.Order");
        let body = schema::index_body(&ClusterConfig::with_scope("acme"), &existing).unwrap();
        backend.create_index("acme_orders", body).await.unwrap();
        backend
            .create_index("other_orders", serde_json::json!({}))
            .await
            .unwrap();

        let mut events = manager.subscribe();
        assert_eq!(manager.initialize().await.unwrap(), 1);
        assert_eq!(events.recv().await.unwrap(), CatalogEvent::InitializeStarted);
        assert_eq!(
            events.recv().await.unwrap(),
            CatalogEvent::InitializeCompleted { count: 1 }
        );
        assert_eq!(manager.self_store().load().await.unwrap(), vec![existing]);
        assert!(manager.catalog().contains("acme_orders"));
    }

    #[tokio::test]
    async fn test_copy_with_documents() {
        let (backend, manager) = manager();
        manager
            .create_index(IndexConfig::new("orders", "acme.Order"))
            .await
            .unwrap();
        backend
            .upsert("acme_orders", "1", serde_json::json!({ "customer": "Ada" }), true)
            .await
            .unwrap();

        let copy = manager
            .copy_index("orders", "orders_archive", true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(copy.name, "acme_orders_archive");
        assert_eq!(copy.document_type, "acme.Order");
        assert_eq!(backend.document_count("acme_orders_archive"), Some(1));

        assert!(manager.copy_index("orders", "orders_archive", false).await.unwrap().is_none());
        assert!(manager.copy_index("missing", "other", false).await.unwrap().is_none());
    }

    #[test]
    fn test_merge_drops_stale_entries() {
        let physical = HashSet::from(["acme_orders".to_string()]);
        let mut stored_orders = Index::new("acme_orders", "acme.Order");
        stored_orders.is_hidden = true;
        let mut alias = Index::new("acme_rush", "acme.RushOrder");
        alias.index_as_type = Some("acme.Order".to_string());
        let stale = Index::new("acme_gone", "acme.Invoice");

        let (merged, dropped) = merge_entries(
            vec![Index::new("acme_orders", "acme.Order")],
            &physical,
            vec![stored_orders, alias, stale],
        );
        assert_eq!(merged.len(), 2);
        assert!(merged[0].is_hidden);
        assert_eq!(dropped, vec!["acme_gone"]);
    }
}
