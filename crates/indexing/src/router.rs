//! Document routing.
//!
//! A document is routed to a catalog entry in three steps: its declared
//! index name as given, the same name with the scope coerced on, then the
//! single type-resolvable entry of its document type. The physical write
//! target follows one `index_as_type` hop from that entry.
//!
//! When nothing resolves and automatic index creation is on, an index is
//! created for the document's concrete type first. The flag is read on every
//! call, so toggling it takes effect on the next write.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use crate::catalog::{IndexCatalog, IndexManager};
use crate::core::{BulkOperation, SearchBackend};
use crate::error::{IndexError, IndexResult, NotFoundError};
use crate::query::filter::{DOC_TYPE_FIELD, escape_source, unescape_source};
use crate::types::{DocumentEnvelope, DocumentSerializer, Index, IndexConfig};

/// Where a document lives.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// The catalog entry the document resolved to.
    pub logical: Index,
    /// The index physically holding the document.
    pub physical: Index,
}

impl Route {
    /// Whether writes through this route refresh immediately.
    pub fn force_refresh(&self) -> bool {
        self.logical.force_refresh_on_document_commit || self.physical.force_refresh_on_document_commit
    }
}

/// Resolves write, delete and read targets for documents.
#[derive(Debug)]
pub struct DocumentRouter {
    backend: Arc<dyn SearchBackend>,
    catalog: Arc<IndexCatalog>,
    manager: Arc<IndexManager>,
    serializer: Arc<dyn DocumentSerializer>,
    auto_create: Arc<AtomicBool>,
}

impl DocumentRouter {
    /// Creates a router. `auto_create` is shared with the owner so the policy
    /// can be toggled at runtime.
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        manager: Arc<IndexManager>,
        serializer: Arc<dyn DocumentSerializer>,
        auto_create: Arc<AtomicBool>,
    ) -> Self {
        Self {
            backend,
            catalog: manager.catalog().clone(),
            manager,
            serializer,
            auto_create,
        }
    }

    /// Resolves the catalog entry for a document.
    ///
    /// Returns `None` when nothing matches and fails with
    /// [`IndexError::InvalidOperation`] when the type lookup is ambiguous.
    pub fn resolve(&self, index_name: Option<&str>, document_type: &str) -> IndexResult<Option<Index>> {
        if let Some(name) = index_name {
            if let Some(index) = self.catalog.get(name) {
                return Ok(Some(index));
            }
            let (normalized, coerced) = self.catalog.normalize_name(name);
            if coerced && let Some(index) = self.catalog.get(&normalized) {
                return Ok(Some(index));
            }
        }

        let mut candidates: Vec<Index> = self
            .catalog
            .indices_for_type(document_type)
            .into_iter()
            .filter(Index::is_type_resolvable)
            .collect();
        match candidates.len() {
            0 => Ok(None),
            1 => Ok(candidates.pop()),
            n => Err(IndexError::invalid_operation(format!(
                "{} indices hold documents of type '{}'; name one explicitly",
                n, document_type
            ))),
        }
    }

    /// Resolves the full route of a document, without creating anything.
    pub fn route(&self, index_name: Option<&str>, document_type: &str) -> IndexResult<Option<Route>> {
        match self.resolve(index_name, document_type)? {
            Some(logical) => Ok(Some(Route {
                physical: self.physical_target(&logical)?,
                logical,
            })),
            None => Ok(None),
        }
    }

    /// Follows one `index_as_type` hop.
    pub fn physical_target(&self, index: &Index) -> IndexResult<Index> {
        self.catalog.physical_target(index).ok_or_else(|| {
            IndexError::invalid_operation(format!(
                "alias index '{}' has no physical index for type '{}'",
                index.name,
                index.index_as_type.as_deref().unwrap_or_default()
            ))
        })
    }

    /// Fails unless `index` holds `document_type` or one of its supertypes.
    fn ensure_holds(&self, index: &Index, document_type: &str) -> IndexResult<()> {
        if index.document_type == document_type
            || self.catalog.types().is_subtype_of(document_type, &index.document_type)
        {
            return Ok(());
        }
        tracing::warn!(
            index = %index.name,
            holds = %index.document_type,
            document_type = %document_type,
            "Refusing to write a document into an index of another type"
        );
        Err(IndexError::invalid_operation(format!(
            "index '{}' holds documents of type '{}', not '{}'",
            index.name, index.document_type, document_type
        )))
    }

    /// Routes a document for writing, creating its index if allowed.
    async fn write_route(&self, envelope: &DocumentEnvelope) -> IndexResult<Route> {
        if let Some(route) = self.route(envelope.index_name.as_deref(), &envelope.document_type)? {
            self.ensure_holds(&route.logical, &envelope.document_type)?;
            return Ok(route);
        }

        let requested = envelope
            .index_name
            .clone()
            .unwrap_or_else(|| envelope.document_type.clone());
        if !self.auto_create.load(Ordering::SeqCst) {
            return Err(NotFoundError::Index { name: requested }.into());
        }

        let descriptor = self.catalog.types().get(&envelope.document_type)?;
        let mut config = IndexConfig::new(
            envelope
                .index_name
                .clone()
                .unwrap_or_else(|| descriptor.default_index_name()),
            envelope.document_type.clone(),
        );
        config.index_as_type = descriptor.index_as_type.clone();

        tracing::info!(
            document_type = %envelope.document_type,
            index = %config.name,
            "Creating index automatically"
        );
        let logical = self.manager.create_index(config).await?.ok_or_else(|| {
            IndexError::invalid_operation(format!(
                "no index could be created for document type '{}'",
                envelope.document_type
            ))
        })?;
        // Creation returns an existing entry unchanged when the name is taken.
        self.ensure_holds(&logical, &envelope.document_type)?;
        Ok(Route {
            physical: self.physical_target(&logical)?,
            logical,
        })
    }

    /// The stored form of a document: serialized, reserved names escaped and
    /// tagged with its concrete type.
    fn stored_source(&self, envelope: &DocumentEnvelope) -> IndexResult<Value> {
        let source = escape_source(self.serializer.serialize(envelope.source.clone())?);
        let Value::Object(mut fields) = source else {
            return Err(IndexError::invalid_argument(format!(
                "document '{}' of type '{}' is not a JSON object",
                envelope.id, envelope.document_type
            )));
        };
        fields.insert(
            DOC_TYPE_FIELD.to_string(),
            Value::String(envelope.document_type.clone()),
        );
        Ok(Value::Object(fields))
    }

    /// Writes one document. Returns the physical index it was written to.
    pub async fn commit(&self, envelope: &DocumentEnvelope) -> IndexResult<String> {
        let route = self.write_route(envelope).await?;
        let source = self.stored_source(envelope)?;
        self.backend
            .upsert(&route.physical.name, &envelope.id, source, route.force_refresh())
            .await?;
        tracing::debug!(id = %envelope.id, index = %route.physical.name, "Committed document");
        Ok(route.physical.name)
    }

    /// Writes many documents in one bulk call. Returns the number written.
    pub async fn commit_many(&self, envelopes: &[DocumentEnvelope]) -> IndexResult<usize> {
        if envelopes.is_empty() {
            return Ok(0);
        }

        let mut targets: HashMap<String, Index> = HashMap::new();
        let mut refresh = false;
        let mut operations = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            let logical = match self.resolve(envelope.index_name.as_deref(), &envelope.document_type)? {
                Some(logical) => logical,
                None => self.write_route(envelope).await?.logical,
            };
            let physical = match targets.get(&logical.name) {
                Some(physical) => physical.clone(),
                None => {
                    let physical = self.physical_target(&logical)?;
                    targets.insert(logical.name.clone(), physical.clone());
                    physical
                }
            };
            refresh |= logical.force_refresh_on_document_commit || physical.force_refresh_on_document_commit;
            operations.push(BulkOperation::Index {
                index: physical.name,
                id: envelope.id.clone(),
                source: self.stored_source(envelope)?,
            });
        }

        self.submit(operations, refresh).await
    }

    /// Deletes one document. Returns false if it or its index does not exist.
    pub async fn delete(&self, index_name: Option<&str>, document_type: &str, id: &str) -> IndexResult<bool> {
        let Some(route) = self.route(index_name, document_type)? else {
            tracing::debug!(id = %id, document_type = %document_type, "No index to delete from");
            return Ok(false);
        };
        Ok(self
            .backend
            .delete(&route.physical.name, id, route.force_refresh())
            .await?)
    }

    /// Deletes many documents in one bulk call. Every document must resolve.
    pub async fn delete_many(&self, envelopes: &[DocumentEnvelope]) -> IndexResult<usize> {
        if envelopes.is_empty() {
            return Ok(0);
        }

        let mut targets: HashMap<String, Index> = HashMap::new();
        let mut refresh = false;
        let mut operations = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            let logical = self
                .resolve(envelope.index_name.as_deref(), &envelope.document_type)?
                .ok_or_else(|| NotFoundError::Index {
                    name: envelope
                        .index_name
                        .clone()
                        .unwrap_or_else(|| envelope.document_type.clone()),
                })?;
            let physical = match targets.get(&logical.name) {
                Some(physical) => physical.clone(),
                None => {
                    let physical = self.physical_target(&logical)?;
                    targets.insert(logical.name.clone(), physical.clone());
                    physical
                }
            };
            refresh |= logical.force_refresh_on_document_commit || physical.force_refresh_on_document_commit;
            operations.push(BulkOperation::Delete {
                index: physical.name,
                id: envelope.id.clone(),
            });
        }

        self.submit(operations, refresh).await
    }

    async fn submit(&self, operations: Vec<BulkOperation>, refresh: bool) -> IndexResult<usize> {
        let expected = operations.len();
        let response = self.backend.bulk(operations, refresh).await?;
        if response.items != expected {
            tracing::warn!(expected, items = response.items, "Bulk response item count mismatch");
            return Err(IndexError::ExecutionFailure {
                message: format!(
                    "bulk request of {} operations returned {} items",
                    expected, response.items
                ),
            });
        }
        if response.errors {
            tracing::warn!(items = response.items, "Bulk response flagged item errors");
        }
        tracing::debug!(items = expected, took = response.took, "Bulk request completed");
        Ok(expected)
    }

    /// Reads one document's JSON. Through an alias, documents of types outside
    /// the alias's type hierarchy are not returned.
    pub async fn get(&self, index_name: Option<&str>, document_type: &str, id: &str) -> IndexResult<Option<Value>> {
        let Some(route) = self.route(index_name, document_type)? else {
            return Ok(None);
        };
        let Some(stored) = self.backend.get(&route.physical.name, id).await? else {
            return Ok(None);
        };

        if route.logical.is_alias() {
            let stored_type = stored.get(DOC_TYPE_FIELD).and_then(Value::as_str).unwrap_or_default();
            let allowed = self.catalog.types().type_and_subtypes(&route.logical.document_type);
            if !allowed.iter().any(|t| t == stored_type) {
                tracing::debug!(id = %id, stored_type = %stored_type, "Document belongs to another type");
                return Ok(None);
            }
        }

        Ok(Some(self.serializer.deserialize(unescape_source(stored))?))
    }
}
