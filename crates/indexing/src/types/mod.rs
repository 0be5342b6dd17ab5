//! Core data types for the indexing layer.
//!
//! - [`Index`], [`IndexField`], [`IndexConfig`] - catalog entries
//! - [`Document`], [`DocumentEnvelope`] - what gets committed
//! - [`QueryCriteria`] and its parts - what gets asked
//! - [`QueryResults`] - what comes back
//!
//! # Building a Query
//!
//! ```
//! use helios_indexing::types::{BucketField, FilterField, QueryCriteria, SortField};
//!
//! let criteria = QueryCriteria::advanced()
//!     .for_type("acme.sales.Order")
//!     .filter(FilterField::new("products.product_name", "anyWord", "Basic"))
//!     .sort(SortField::desc("order_date", 0))
//!     .bucket(BucketField::new("customer_name"))
//!     .page(0, 25);
//!
//! assert_eq!(criteria.filters.len(), 1);
//! assert_eq!(criteria.take, Some(25));
//! ```

mod criteria;
mod document;
mod index;
mod results;

pub use criteria::{
    AggregationOptions, AggregationRequest, BucketField, CriteriaKind, FilterField, QueryCriteria,
    ReturnField, SortField,
};
pub use document::{Document, DocumentEnvelope, DocumentSerializer, JsonSerializer};
pub use index::{FieldKind, Index, IndexConfig, IndexField};
pub use results::{
    AggregationBucket, AggregationResult, AggregationValue, BucketResult, BucketValue, Hit,
    QueryResults, StatsValue,
};
