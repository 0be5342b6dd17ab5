//! Helios Indexing Layer
//!
//! This crate sits in front of a document search engine. It keeps an
//! authoritative catalog of logical indices (one per document type,
//! optionally aliased), routes documents to the right physical index on
//! write, and composes structured criteria (filters, sorts, projections,
//! facets, metrics) into backend queries and back into typed results.
//!
//! # Features
//!
//! - **Index Catalog**: scope-prefixed, lower-case index names; aliases that
//!   store a subtype's documents in its supertype's index; cascading delete
//! - **Document Routing**: explicit name, scope-coerced name, then type lookup,
//!   with optional automatic index creation
//! - **Filter Composition**: token-keyed comparators (`equal`, `anyWord`,
//!   `between`, ...), extensible at runtime
//! - **Aggregations**: metrics, terms, histograms and date histograms with
//!   nested sub-aggregations, extensible at runtime
//! - **Uniform Results**: rejected queries come back as a failure-shaped
//!   result instead of an error
//!
//! # Backend Features
//!
//! ```toml
//! [dependencies]
//! helios-indexing = { version = "0.1", features = ["elasticsearch"] }
//! ```
//!
//! - `elasticsearch` - Elasticsearch 8 over HTTP
//!
//! The in-memory backend is always available.
//!
//! # Architecture
//!
//! - [`types`] - catalog entries, documents, criteria and results
//! - [`error`] - error types for all operations
//! - [`config`] - cluster connection parameters
//! - [`registry`] - document type registration
//! - [`core`] - the search engine driver contract
//! - [`backends`] - driver implementations
//! - [`query`] - comparators, filters, aggregations, request composition
//! - [`catalog`] - index catalog and lifecycle
//! - [`router`] - document routing
//! - [`cluster`] - the async facade
//! - [`blocking`] - the synchronous facade
//!
//! # Quick Start
//!
//! ```
//! use helios_indexing::blocking;
//! use helios_indexing::cluster::Cluster;
//! use helios_indexing::config::ClusterConfig;
//! use helios_indexing::registry::{FieldDescriptor, TypeDescriptor};
//! use helios_indexing::types::{Document, FieldKind, FilterField, QueryCriteria};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Product {
//!     sku: String,
//!     name: String,
//!     price: f64,
//! }
//!
//! impl Document for Product {
//!     const TYPE_NAME: &'static str = "shop.Product";
//!
//!     fn id(&self) -> String {
//!         self.sku.clone()
//!     }
//! }
//!
//! let cluster = blocking::Cluster::build(
//!     Cluster::in_memory(ClusterConfig::with_scope("shop")).register_type(
//!         TypeDescriptor::new("shop.Product")
//!             .with_field(FieldDescriptor::new("name", FieldKind::Text))
//!             .with_field(FieldDescriptor::new("price", FieldKind::Float)),
//!     ),
//! )
//! .unwrap();
//! cluster.initialize().unwrap();
//!
//! cluster
//!     .commit(&Product { sku: "p-1".into(), name: "Basic Widget".into(), price: 4.5 })
//!     .unwrap();
//!
//! let results = cluster
//!     .query::<Product>(
//!         QueryCriteria::advanced()
//!             .for_type("shop.Product")
//!             .filter(FilterField::new("price", "lessThan", "10")),
//!     )
//!     .unwrap();
//! assert_eq!(results.total, 1);
//! assert_eq!(results.documents[0].index, "shop_product");
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod blocking;
pub mod catalog;
pub mod cluster;
pub mod config;
pub mod core;
pub mod error;
pub mod query;
pub mod registry;
pub mod router;
pub mod types;

// Re-export commonly used types at crate root
pub use cluster::{Cluster, ClusterBuilder};
pub use config::{ClusterAuth, ClusterConfig};
pub use error::{BackendError, BackendResult, IndexError, IndexResult, NotFoundError};
pub use registry::{FieldDescriptor, TypeDescriptor, TypeRegistry};
pub use types::{Document, Index, IndexConfig, QueryCriteria, QueryResults};

// Re-export core traits
pub use core::{BackendKind, SearchBackend};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
