//! Documents and their serialized form.

use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{IndexError, IndexResult};

/// A typed document that can be committed to the cluster.
///
/// `TYPE_NAME` must match a name registered with the
/// [`TypeRegistry`](crate::registry::TypeRegistry) before the first commit.
///
/// # Example
///
/// ```
/// use helios_indexing::types::Document;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Order {
///     order_id: String,
///     customer_name: String,
/// }
///
/// impl Document for Order {
///     const TYPE_NAME: &'static str = "acme.sales.Order";
///
///     fn id(&self) -> String {
///         self.order_id.clone()
///     }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// Fully-qualified type name.
    const TYPE_NAME: &'static str;

    /// Document id, unique within its index.
    fn id(&self) -> String;

    /// Explicit target index, bypassing type-based resolution.
    fn index_name(&self) -> Option<String> {
        None
    }
}

/// A document in transit: identity plus its JSON source.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEnvelope {
    /// Document id.
    pub id: String,
    /// Explicitly requested index name, if any.
    pub index_name: Option<String>,
    /// Fully-qualified concrete type name.
    pub document_type: String,
    /// JSON source as it will be stored.
    pub source: Value,
}

impl DocumentEnvelope {
    /// Creates an envelope without an explicit index name.
    pub fn new(id: impl Into<String>, document_type: impl Into<String>, source: Value) -> Self {
        Self {
            id: id.into(),
            index_name: None,
            document_type: document_type.into(),
            source,
        }
    }

    /// Sets the explicit target index.
    pub fn with_index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    /// Builds an envelope from a typed document.
    pub fn from_document<D: Document>(document: &D) -> IndexResult<Self> {
        let source = serde_json::to_value(document)?;
        if !source.is_object() {
            return Err(IndexError::invalid_argument(format!(
                "document of type {} must serialize to a JSON object",
                D::TYPE_NAME
            )));
        }
        Ok(Self {
            id: document.id(),
            index_name: document.index_name(),
            document_type: D::TYPE_NAME.to_string(),
            source,
        })
    }
}

/// Converts document sources on their way to and from the backend.
///
/// Typed documents are first turned into JSON with serde; a serializer can
/// then reshape that JSON (rename fields, drop transient data) before it is
/// stored, and must undo the reshaping when hits are read back.
pub trait DocumentSerializer: Send + Sync + Debug {
    /// Transforms a document's JSON into the stored source.
    fn serialize(&self, document: Value) -> IndexResult<Value>;

    /// Transforms a stored source back into the document's JSON.
    fn deserialize(&self, source: Value) -> IndexResult<Value>;
}

/// Stores documents exactly as serde produces them.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl DocumentSerializer for JsonSerializer {
    fn serialize(&self, document: Value) -> IndexResult<Value> {
        Ok(document)
    }

    fn deserialize(&self, source: Value) -> IndexResult<Value> {
        Ok(source)
    }
}
