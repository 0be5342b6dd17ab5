//! Core abstractions.
//!
//! - [`SearchBackend`] - search engine driver contract
//! - [`BackendKind`] - runtime identification of a backend

pub mod backend;

pub use backend::{BackendKind, BulkOperation, BulkResponse, IndexMapping, SearchBackend};
