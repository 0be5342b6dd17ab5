//! Error types for the indexing layer.
//!
//! Errors are layered the same way as in the persistence crate: a crate-wide
//! [`IndexError`] wraps a [`NotFoundError`] for unresolved references and a
//! [`BackendError`] for anything the search engine driver reports.
//!
//! Only a subset of failures surface as `Err`. Catalog validation failures
//! (duplicate names, unknown types, bad alias hierarchies) are logged and
//! reported as `None`/`false`, and query execution failures are folded into
//! the returned [`QueryResults`](crate::types::QueryResults).

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for catalog, routing and query operations.
#[derive(Error, Debug)]
pub enum IndexError {
    /// A comparator, aggregation kind, index or document type could not be resolved.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// A caller-supplied value does not have the shape its consumer expects.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The catalog is in a state that does not allow the operation.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    /// The backend rejected a composed request.
    #[error("execution failed: {message}")]
    ExecutionFailure { message: String },

    /// Driver-level failure.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl IndexError {
    /// Creates an [`IndexError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        IndexError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an [`IndexError::InvalidOperation`].
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        IndexError::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for any not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexError::NotFound(_))
    }
}

/// Unresolved references.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("comparator not registered: {token}")]
    Comparator { token: String },

    #[error("aggregation kind not registered: {kind}")]
    Aggregation { kind: String },

    #[error("index not found: {name}")]
    Index { name: String },

    #[error(
        "document type not registered: {type_name} (register it with the type registry before it is referenced)"
    )]
    DocumentType { type_name: String },
}

/// Errors originating from the search engine backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}: {message}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The backend rejected the request.
    #[error("request rejected (status {status}): {message}")]
    QueryError { status: u16, message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

impl BackendError {
    /// Creates an [`BackendError::Internal`] without a source.
    pub fn internal(backend_name: &str, message: impl Into<String>) -> Self {
        BackendError::Internal {
            backend_name: backend_name.to_string(),
            message: message.into(),
            source: None,
        }
    }

    /// Returns true when the backend refused the request itself rather than
    /// failing to deliver it.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BackendError::QueryError { .. })
    }
}

/// Result type alias for indexing operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Result type alias for backend driver calls.
pub type BackendResult<T> = Result<T, BackendError>;

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Backend(BackendError::from(err))
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::SerializationError {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = IndexError::from(NotFoundError::Comparator {
            token: "fuzzy".to_string(),
        });
        assert_eq!(err.to_string(), "comparator not registered: fuzzy");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_document_type_message_names_the_type() {
        let err = NotFoundError::DocumentType {
            type_name: "acme.sales.Order".to_string(),
        };
        assert!(err.to_string().contains("acme.sales.Order"));
    }

    #[test]
    fn test_backend_rejection() {
        let err = BackendError::QueryError {
            status: 400,
            message: "illegal_argument_exception".to_string(),
        };
        assert!(err.is_rejection());
        assert!(err.to_string().contains("status 400"));
        assert!(!BackendError::internal("memory", "boom").is_rejection());
    }

    #[test]
    fn test_from_serde_json() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: IndexError = parse_err.into();
        assert!(matches!(
            err,
            IndexError::Backend(BackendError::SerializationError { .. })
        ));
    }
}
