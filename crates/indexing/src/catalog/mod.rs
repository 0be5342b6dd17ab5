//! Index catalog and lifecycle management.
//!
//! The catalog is the authoritative list of logical indices in one cluster
//! scope. Each entry is either physical (it owns a backend index) or an alias
//! (`index_as_type` names the document type whose physical index holds its
//! documents). Entries are persisted twice: in the backend mapping `_meta` of
//! physical indices, and in a reserved self-store index that also covers
//! aliases and survives mapping metadata loss.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use helios_indexing::backends::MemoryBackend;
//! use helios_indexing::catalog::{IndexCatalog, IndexManager};
//! use helios_indexing::config::ClusterConfig;
//! use helios_indexing::registry::{TypeDescriptor, TypeRegistry};
//! use helios_indexing::types::IndexConfig;
//!
//! let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! runtime.block_on(async {
//!     let types = Arc::new(TypeRegistry::new());
//!     types.register(TypeDescriptor::new("acme.Order"));
//!
//!     let catalog = Arc::new(IndexCatalog::new("acme", types));
//!     let manager = IndexManager::new(
//!         Arc::new(MemoryBackend::new()),
//!         catalog.clone(),
//!         ClusterConfig::with_scope("acme"),
//!     );
//!     manager.initialize().await.unwrap();
//!
//!     let index = manager
//!         .create_index(IndexConfig::new("Orders", "acme.Order"))
//!         .await
//!         .unwrap()
//!         .unwrap();
//!     assert_eq!(index.name, "acme_orders");
//!     assert!(catalog.contains("acme_orders"));
//! });
//! ```

#[allow(clippy::module_inception)]
mod catalog;
pub mod events;
pub mod lifecycle;
pub mod schema;
pub mod self_store;

pub use catalog::{IndexCatalog, self_store_name};
pub use events::{CatalogEvent, CatalogEvents};
pub use lifecycle::IndexManager;
pub use self_store::SelfStore;
