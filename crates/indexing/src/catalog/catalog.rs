//! In-memory index catalog.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::registry::TypeRegistry;
use crate::types::Index;

/// Name of the reserved index persisting catalog entries for a scope.
pub fn self_store_name(scope: &str) -> String {
    format!("{}__catalog", scope)
}

/// The catalog of indices owned by one cluster scope.
///
/// Entries are keyed by their normalized name. The catalog is write-through:
/// lifecycle operations update it before returning, so later calls in the
/// same process see the change immediately.
#[derive(Debug)]
pub struct IndexCatalog {
    scope: String,
    types: Arc<TypeRegistry>,
    entries: RwLock<BTreeMap<String, Index>>,
}

impl IndexCatalog {
    /// Creates an empty catalog for a scope.
    pub fn new(scope: impl Into<String>, types: Arc<TypeRegistry>) -> Self {
        Self {
            scope: scope.into().trim().to_lowercase(),
            types,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// The normalized scope.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The type registry the catalog validates against.
    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// Lower-cases a name and puts the scope prefix on it.
    ///
    /// Returns the normalized name and whether it differed from the input.
    pub fn normalize_name(&self, name: &str) -> (String, bool) {
        let lowered = name.trim().to_lowercase();
        let prefix = format!("{}_", self.scope);
        let normalized = if lowered.starts_with(&prefix) {
            lowered
        } else {
            format!("{}{}", prefix, lowered)
        };
        let coerced = normalized != name;
        (normalized, coerced)
    }

    /// Exact-name lookup.
    pub fn get(&self, name: &str) -> Option<Index> {
        self.entries.read().get(name).cloned()
    }

    /// Looks a name up as given, then with the scope coerced on.
    pub fn resolve_name(&self, name: &str) -> Option<Index> {
        self.get(name).or_else(|| self.get(&self.normalize_name(name).0))
    }

    /// Returns true if an entry with this exact name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// All entries, ordered by name.
    pub fn all(&self) -> Vec<Index> {
        self.entries.read().values().cloned().collect()
    }

    /// Entry names, ordered.
    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Every entry whose owning type is `document_type`.
    pub fn indices_for_type(&self, document_type: &str) -> Vec<Index> {
        self.entries
            .read()
            .values()
            .filter(|i| i.document_type == document_type)
            .cloned()
            .collect()
    }

    /// The physical index holding documents of `document_type`, ignoring aliases.
    pub fn physical_index_for_type(&self, document_type: &str) -> Option<Index> {
        self.entries
            .read()
            .values()
            .find(|i| i.document_type == document_type && !i.is_alias())
            .cloned()
    }

    /// Follows one `index_as_type` hop. A physical entry is its own target.
    pub fn physical_target(&self, index: &Index) -> Option<Index> {
        match &index.index_as_type {
            Some(target_type) => self.physical_index_for_type(target_type),
            None => Some(index.clone()),
        }
    }

    /// Entries that alias into `index`'s document type.
    pub fn dependents_of(&self, index: &Index) -> Vec<Index> {
        self.entries
            .read()
            .values()
            .filter(|i| i.name != index.name && i.index_as_type.as_deref() == Some(&index.document_type))
            .cloned()
            .collect()
    }

    /// Inserts or replaces an entry.
    pub fn insert(&self, index: Index) {
        self.entries.write().insert(index.name.clone(), index);
    }

    /// Removes an entry.
    pub fn remove(&self, name: &str) -> Option<Index> {
        self.entries.write().remove(name)
    }

    /// Replaces every entry.
    pub fn replace_all(&self, indices: Vec<Index>) {
        let mut entries = self.entries.write();
        entries.clear();
        for index in indices {
            entries.insert(index.name.clone(), index);
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the catalog has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> IndexCatalog {
        let catalog = IndexCatalog::new("Acme", Arc::new(TypeRegistry::new()));
        catalog.insert(Index::new("acme_orders", "acme.Order"));
        let mut alias = Index::new("acme_rush_orders", "acme.RushOrder");
        alias.index_as_type = Some("acme.Order".to_string());
        catalog.insert(alias);
        catalog
    }

    #[test]
    fn test_normalize_name() {
        let catalog = catalog();
        assert_eq!(catalog.normalize_name("Orders"), ("acme_orders".to_string(), true));
        assert_eq!(catalog.normalize_name("acme_orders"), ("acme_orders".to_string(), false));
        assert_eq!(catalog.normalize_name("ACME_Orders"), ("acme_orders".to_string(), true));
    }

    #[test]
    fn test_resolve_name_coerces_scope() {
        let catalog = catalog();
        assert!(catalog.resolve_name("orders").is_some());
        assert!(catalog.resolve_name("acme_orders").is_some());
        assert!(catalog.resolve_name("invoices").is_none());
    }

    #[test]
    fn test_alias_targets_and_dependents() {
        let catalog = catalog();
        let alias = catalog.get("acme_rush_orders").unwrap();
        assert_eq!(catalog.physical_target(&alias).unwrap().name, "acme_orders");

        let orders = catalog.get("acme_orders").unwrap();
        assert_eq!(catalog.physical_target(&orders).unwrap().name, "acme_orders");
        let dependents = catalog.dependents_of(&orders);
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].name, "acme_rush_orders");
    }

    #[test]
    fn test_self_store_name() {
        assert_eq!(self_store_name("acme"), "acme__catalog");
    }
}
