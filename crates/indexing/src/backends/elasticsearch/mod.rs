//! Elasticsearch backend implementation.
//!
//! [`ElasticsearchBackend`] forwards the request bodies built by the catalog,
//! router and query layers to a cluster over HTTP and turns non-success
//! responses into [`BackendError::QueryError`](crate::error::BackendError::QueryError)
//! values carrying the cluster's status code and error reason.
//!
//! # Example
//!
//! ```ignore
//! use helios_indexing::backends::ElasticsearchBackend;
//! use helios_indexing::config::ClusterConfig;
//!
//! let config = ClusterConfig {
//!     nodes: vec!["http://localhost:9200".to_string()],
//!     ..ClusterConfig::with_scope("acme")
//! };
//! let backend = ElasticsearchBackend::new(config)?;
//! backend.health_check().await?;
//! ```

mod backend;

pub use backend::ElasticsearchBackend;
