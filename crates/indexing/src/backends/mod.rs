//! Search backend implementations.
//!
//! - [`MemoryBackend`]: in-process engine, always available
//! - `ElasticsearchBackend`: HTTP client for a cluster (`elasticsearch` feature)

pub mod memory;

#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;

pub use memory::MemoryBackend;

#[cfg(feature = "elasticsearch")]
pub use self::elasticsearch::ElasticsearchBackend;
