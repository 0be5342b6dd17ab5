//! Cluster-aware criteria resolution and request composition.

use std::collections::BTreeSet;

use serde_json::{Map, Value, json};

use crate::catalog::IndexCatalog;
use crate::error::{IndexError, IndexResult, NotFoundError};
use crate::types::{CriteriaKind, FieldKind, Index, QueryCriteria};

use super::aggregation::{AggregationRegistry, DEFAULT_TERMS_SIZE, KEY_SEPARATOR};
use super::comparator::ComparatorRegistry;
use super::filter::{DOC_TYPE_FIELD, FieldPaths, FilterEngine};

/// Key prefix tagging terms facets in the outgoing `aggs` object.
pub const BUCKET_PREFIX: &str = "bucket";

/// Key prefix tagging the distinct-values aggregation.
pub const VALUES_PREFIX: &str = "values";

/// Maximum number of distinct values returned by a field-values query.
pub const FIELD_VALUES_SIZE: usize = 10_000;

/// Response key of the facet over `field`.
pub fn bucket_key(field: &str) -> String {
    format!("{}{}{}", BUCKET_PREFIX, KEY_SEPARATOR, field)
}

/// Response key of the distinct-values aggregation over `field`.
pub fn values_key(field: &str) -> String {
    format!("{}{}{}", VALUES_PREFIX, KEY_SEPARATOR, field)
}

impl QueryCriteria {
    /// Resolves target indices, boosted fields and deprecation notices from
    /// the catalog. Runs once per query, right before execution.
    ///
    /// Explicit index names win. Otherwise the query targets the visible
    /// indices of `document_type`, or every visible index included in global
    /// search. Aliases are redirected to their target's physical index with a
    /// filter on the concrete document type.
    pub fn apply_cluster_settings(&mut self, catalog: &IndexCatalog) -> IndexResult<()> {
        self.effective_indices.clear();
        self.type_filter.clear();
        self.boosted_fields.clear();
        self.text_fields.clear();
        self.messages.clear();

        let resolved = self.resolve_indices(catalog)?;

        let mut physical: Vec<Index> = Vec::with_capacity(resolved.len());
        for index in &resolved {
            if let Some(notice) = index.deprecation_notice() {
                self.messages.push(notice);
            }
            let target = catalog.physical_target(index).ok_or_else(|| {
                IndexError::invalid_operation(format!(
                    "alias index '{}' has no physical index for type '{}'",
                    index.name,
                    index.index_as_type.as_deref().unwrap_or_default()
                ))
            })?;
            if !self.effective_indices.contains(&target.name) {
                self.effective_indices.push(target.name.clone());
                physical.push(target);
            }
        }

        if resolved.iter().any(Index::is_alias) {
            let types = catalog.types();
            let mut allowed = BTreeSet::new();
            for index in &resolved {
                allowed.extend(types.type_and_subtypes(&index.document_type));
            }
            self.type_filter = allowed.into_iter().collect();
        }

        // Any index without field metadata means every field is searched.
        if resolved.iter().all(|i| !i.fields.is_empty()) {
            let mut boosted = Vec::new();
            for name in resolved.iter().flat_map(Index::boosted_fields) {
                if !boosted.iter().any(|b: &String| b == name) {
                    boosted.push(name.to_string());
                }
            }
            self.boosted_fields = boosted;
        }

        let text: BTreeSet<String> = resolved
            .iter()
            .chain(physical.iter())
            .flat_map(|i| i.fields.iter())
            .filter(|f| f.kind == FieldKind::Text)
            .map(|f| f.name.clone())
            .collect();
        self.text_fields = text.into_iter().collect();

        tracing::debug!(
            indices = ?self.effective_indices,
            type_filter = ?self.type_filter,
            "Resolved query targets"
        );
        Ok(())
    }

    fn resolve_indices(&self, catalog: &IndexCatalog) -> IndexResult<Vec<Index>> {
        if !self.indices.is_empty() {
            return self
                .indices
                .iter()
                .map(|name| {
                    catalog.resolve_name(name).ok_or_else(|| {
                        NotFoundError::Index {
                            name: name.clone(),
                        }
                        .into()
                    })
                })
                .collect();
        }

        if let Some(document_type) = &self.document_type {
            catalog.types().get(document_type)?;
            let candidates: Vec<Index> = catalog
                .indices_for_type(document_type)
                .into_iter()
                .filter(|i| !i.is_hidden)
                .collect();
            if candidates.is_empty() {
                return Err(IndexError::invalid_operation(format!(
                    "no visible index exists for document type '{}'",
                    document_type
                )));
            }
            return Ok(candidates);
        }

        let global: Vec<Index> = catalog
            .all()
            .into_iter()
            .filter(|i| i.return_in_global_search && !i.is_hidden)
            .collect();
        if global.is_empty() {
            return Err(IndexError::invalid_operation(
                "no index is included in global search",
            ));
        }
        Ok(global)
    }

    /// Number of hits the request asks for.
    pub fn effective_take(&self, default_take: usize) -> usize {
        match self.kind {
            CriteriaKind::Aggregation | CriteriaKind::FieldValues => 0,
            CriteriaKind::GetByIds => self.take.unwrap_or(self.ids.len()),
            CriteriaKind::Simple | CriteriaKind::Advanced => self.take.unwrap_or(default_take),
        }
    }

    /// Composes the backend search body.
    ///
    /// Comparator tokens and aggregation kinds are resolved here, so an
    /// unregistered one fails with [`IndexError::NotFound`].
    pub fn to_request(
        &self,
        comparators: &ComparatorRegistry,
        aggregations: &AggregationRegistry,
        default_take: usize,
    ) -> IndexResult<Value> {
        let paths = FieldPaths::new(self.text_fields.iter().cloned());

        let mut restrictions = Vec::new();
        if !self.type_filter.is_empty() {
            restrictions.push(json!({ "terms": { DOC_TYPE_FIELD: self.type_filter } }));
        }
        if self.kind == CriteriaKind::GetByIds {
            restrictions.push(json!({ "ids": { "values": self.ids } }));
        }
        let query = FilterEngine::new(comparators).compose(
            &self.filters,
            &paths,
            self.text.as_deref(),
            &self.boosted_fields,
            restrictions,
        )?;

        let returns_documents = !matches!(self.kind, CriteriaKind::Aggregation | CriteriaKind::FieldValues);
        let mut body = json!({
            "query": query,
            "from": if returns_documents { self.skip } else { 0 },
            "size": self.effective_take(default_take),
            "track_total_hits": true,
            "version": true
        });

        if !returns_documents {
            body["_source"] = json!(false);
        } else if !self.returns.is_empty() {
            let includes: Vec<String> = self.returns.iter().map(|r| paths.value_path(&r.field)).collect();
            body["_source"] = json!({ "includes": includes });
        }

        if returns_documents && !self.sorts.is_empty() {
            let mut sorts: Vec<_> = self.sorts.iter().collect();
            sorts.sort_by_key(|s| s.priority);
            let sort: Vec<Value> = sorts
                .into_iter()
                .map(|s| {
                    json!({
                        paths.exact_path(&s.field): {
                            "order": if s.ascending { "asc" } else { "desc" },
                            "unmapped_type": "keyword"
                        }
                    })
                })
                .collect();
            body["sort"] = Value::Array(sort);
        }

        let mut aggs = Map::new();
        if self.kind == CriteriaKind::FieldValues {
            let field = self
                .value_field
                .as_deref()
                .filter(|f| !f.trim().is_empty())
                .ok_or_else(|| IndexError::invalid_argument("field values query has no field name"))?;
            aggs.insert(
                values_key(field),
                json!({ "terms": { "field": paths.exact_path(field), "size": FIELD_VALUES_SIZE } }),
            );
        }
        if self.kind != CriteriaKind::Aggregation {
            for bucket in &self.buckets {
                if bucket.field.trim().is_empty() {
                    return Err(IndexError::invalid_argument("bucket field has no field name"));
                }
                aggs.insert(
                    bucket_key(&bucket.field),
                    json!({
                        "terms": {
                            "field": paths.exact_path(&bucket.field),
                            "size": bucket.size.unwrap_or(DEFAULT_TERMS_SIZE)
                        }
                    }),
                );
            }
        }
        aggs.extend(aggregations.compose(&self.aggregations, &paths)?);
        if !aggs.is_empty() {
            body["aggs"] = Value::Object(aggs);
        }

        Ok(body)
    }
}
