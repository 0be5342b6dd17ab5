//! Query composition.
//!
//! A [`QueryCriteria`](crate::types::QueryCriteria) travels through three
//! stages:
//!
//! 1. [`apply_cluster_settings`](crate::types::QueryCriteria::apply_cluster_settings)
//!    resolves the target indices, boosted fields and deprecation notices.
//! 2. [`to_request`](crate::types::QueryCriteria::to_request) composes the
//!    search body through the [`ComparatorRegistry`] and the
//!    [`AggregationRegistry`].
//! 3. [`materialize`] turns the backend response into typed results.
//!
//! Comparators and aggregation kinds are strategies keyed by token; custom
//! ones are registered the same way as the built-ins.

pub mod aggregation;
pub mod comparator;
pub mod criteria;
pub mod filter;
pub mod results;

pub use aggregation::{AggregationKind, AggregationRegistry, aggregation_key};
pub use comparator::{Comparator, ComparatorRegistry, FnComparator, tokens};
pub use filter::{FieldPaths, FilterEngine, escape_field, unescape_field};
pub use results::materialize;
