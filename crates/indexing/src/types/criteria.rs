//! Query criteria data.
//!
//! Everything here is plain data. Comparator tokens and aggregation kinds are
//! only looked up when a criteria is composed against concrete registries, so
//! building a request with an unregistered token never fails.

use serde::{Deserialize, Serialize};

/// A per-field predicate: `field <comparator> value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterField {
    /// Field name (dotted for nested object leaves).
    pub field: String,
    /// Raw value, interpreted by the comparator.
    pub value: String,
    /// Comparator token, e.g. `anyWord` or `between`.
    pub comparator: String,
}

impl FilterField {
    /// Creates a filter.
    pub fn new(
        field: impl Into<String>,
        comparator: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            comparator: comparator.into(),
        }
    }
}

/// A sort key. Lower `priority` sorts first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    /// Field name.
    pub field: String,
    /// Position among the sort keys.
    #[serde(default)]
    pub priority: i32,
    /// Sort direction.
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl SortField {
    /// Ascending sort on `field`.
    pub fn asc(field: impl Into<String>, priority: i32) -> Self {
        Self {
            field: field.into(),
            priority,
            ascending: true,
        }
    }

    /// Descending sort on `field`.
    pub fn desc(field: impl Into<String>, priority: i32) -> Self {
        Self {
            field: field.into(),
            priority,
            ascending: false,
        }
    }
}

/// A projected field. An empty projection list returns whole documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnField {
    /// Field name.
    pub field: String,
}

impl ReturnField {
    /// Creates a projection entry.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

/// A terms facet requested alongside the primary results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketField {
    /// Field name.
    pub field: String,
    /// Maximum number of buckets (default 10).
    #[serde(default)]
    pub size: Option<usize>,
}

impl BucketField {
    /// Creates a bucket request with the default size.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            size: None,
        }
    }
}

/// Kind-specific aggregation parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationOptions {
    /// Bucket width for `histogram`.
    #[serde(default)]
    pub interval: Option<f64>,
    /// Calendar unit for `date_histogram` (`day`, `month`, ...).
    #[serde(default)]
    pub calendar_interval: Option<String>,
    /// Inclusive bounds for `date_histogram`, forcing empty buckets to appear.
    #[serde(default)]
    pub extended_bounds: Option<(String, String)>,
    /// Percentiles to compute; defaults to the usual set when empty.
    #[serde(default)]
    pub percents: Vec<f64>,
    /// Maximum number of buckets for `terms`.
    #[serde(default)]
    pub size: Option<usize>,
}

/// A metric or bucket computation tree over one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRequest {
    /// Aggregation kind, e.g. `avg` or `terms`.
    pub kind: String,
    /// Target field.
    pub field: String,
    /// Child aggregations computed per bucket.
    #[serde(default)]
    pub nested: Vec<AggregationRequest>,
    /// Kind-specific parameters.
    #[serde(default)]
    pub options: AggregationOptions,
}

impl AggregationRequest {
    /// Creates a request with no children and default options.
    pub fn new(kind: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            field: field.into(),
            nested: Vec::new(),
            options: AggregationOptions::default(),
        }
    }

    /// Adds a child aggregation.
    pub fn with_nested(mut self, child: AggregationRequest) -> Self {
        self.nested.push(child);
        self
    }

    /// Sets the histogram interval.
    pub fn with_interval(mut self, interval: f64) -> Self {
        self.options.interval = Some(interval);
        self
    }

    /// Sets the date-histogram calendar interval.
    pub fn with_calendar_interval(mut self, interval: impl Into<String>) -> Self {
        self.options.calendar_interval = Some(interval.into());
        self
    }

    /// Sets the date-histogram extended bounds.
    pub fn with_extended_bounds(mut self, min: impl Into<String>, max: impl Into<String>) -> Self {
        self.options.extended_bounds = Some((min.into(), max.into()));
        self
    }

    /// Sets the percentiles to compute.
    pub fn with_percents(mut self, percents: Vec<f64>) -> Self {
        self.options.percents = percents;
        self
    }

    /// Sets the terms size.
    pub fn with_size(mut self, size: usize) -> Self {
        self.options.size = Some(size);
        self
    }
}

/// The shape of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CriteriaKind {
    /// Free text plus light filters, ranked documents.
    #[default]
    Simple,
    /// Full filter, sort, bucket and paging composition.
    Advanced,
    /// Metrics only; never returns documents.
    Aggregation,
    /// Documents by id.
    GetByIds,
    /// Distinct values of one field.
    FieldValues,
}

/// A query request.
///
/// The caller-facing fields describe the request. `effective_indices`,
/// `type_filter`, `boosted_fields`, `text_fields` and `messages` are filled in by
/// [`apply_cluster_settings`](QueryCriteria::apply_cluster_settings)
/// right before execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryCriteria {
    /// Query shape.
    pub kind: CriteriaKind,
    /// Free text searched across the boosted fields.
    pub text: Option<String>,
    /// Restricts the query to the indices of this document type.
    pub document_type: Option<String>,
    /// Explicit index names; takes precedence over `document_type`.
    pub indices: Vec<String>,
    /// Number of hits to skip.
    pub skip: usize,
    /// Page size; the cluster default applies when unset.
    pub take: Option<usize>,
    /// AND'd field predicates.
    pub filters: Vec<FilterField>,
    /// Sort keys.
    pub sorts: Vec<SortField>,
    /// Projection allow-list.
    pub returns: Vec<ReturnField>,
    /// Terms facets.
    pub buckets: Vec<BucketField>,
    /// Aggregation trees.
    pub aggregations: Vec<AggregationRequest>,
    /// Ids for [`CriteriaKind::GetByIds`].
    pub ids: Vec<String>,
    /// Field for [`CriteriaKind::FieldValues`].
    pub value_field: Option<String>,

    /// Physical indices the query is sent to.
    #[serde(default)]
    pub effective_indices: Vec<String>,
    /// Concrete types allowed when querying through an alias.
    #[serde(default)]
    pub type_filter: Vec<String>,
    /// Fields searched by free text.
    #[serde(default)]
    pub boosted_fields: Vec<String>,
    /// Fields mapped as analyzed text, bucketed, sorted and matched exactly through `.keyword`.
    #[serde(default)]
    pub text_fields: Vec<String>,
    /// Deprecation notices for the targeted indices.
    #[serde(default)]
    pub messages: Vec<String>,
}

impl QueryCriteria {
    /// Free-text query.
    pub fn simple(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            kind: CriteriaKind::Simple,
            text: (!text.trim().is_empty()).then_some(text),
            ..Default::default()
        }
    }

    /// Full composition query.
    pub fn advanced() -> Self {
        Self {
            kind: CriteriaKind::Advanced,
            ..Default::default()
        }
    }

    /// Metrics-only query.
    pub fn aggregation() -> Self {
        Self {
            kind: CriteriaKind::Aggregation,
            take: Some(0),
            ..Default::default()
        }
    }

    /// Fetches the given ids.
    pub fn by_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: CriteriaKind::GetByIds,
            ids: ids.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Distinct values of `field`.
    pub fn field_values(field: impl Into<String>) -> Self {
        Self {
            kind: CriteriaKind::FieldValues,
            value_field: Some(field.into()),
            take: Some(0),
            ..Default::default()
        }
    }

    /// Restricts the query to a document type.
    pub fn for_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = Some(document_type.into());
        self
    }

    /// Targets an explicit index.
    pub fn in_index(mut self, index: impl Into<String>) -> Self {
        self.indices.push(index.into());
        self
    }

    /// Sets the paging window.
    pub fn page(mut self, skip: usize, take: usize) -> Self {
        self.skip = skip;
        self.take = Some(take);
        self
    }

    /// Adds a filter.
    pub fn filter(mut self, filter: FilterField) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds a sort key.
    pub fn sort(mut self, sort: SortField) -> Self {
        self.sorts.push(sort);
        self
    }

    /// Adds a projected field.
    pub fn returning(mut self, field: impl Into<String>) -> Self {
        self.returns.push(ReturnField::new(field));
        self
    }

    /// Adds a terms facet.
    pub fn bucket(mut self, bucket: BucketField) -> Self {
        self.buckets.push(bucket);
        self
    }

    /// Adds an aggregation request.
    pub fn aggregate(mut self, request: AggregationRequest) -> Self {
        self.aggregations.push(request);
        self
    }

    /// Sets the free text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregation_forces_zero_take() {
        let criteria = QueryCriteria::aggregation().aggregate(AggregationRequest::new("avg", "total"));
        assert_eq!(criteria.kind, CriteriaKind::Aggregation);
        assert_eq!(criteria.take, Some(0));
    }

    #[test]
    fn test_blank_simple_text_is_dropped() {
        assert!(QueryCriteria::simple("   ").text.is_none());
        assert_eq!(QueryCriteria::simple("basic").text.as_deref(), Some("basic"));
    }

    #[test]
    fn test_unregistered_kind_builds_fine() {
        let request = AggregationRequest::new("no_such_kind", "total")
            .with_nested(AggregationRequest::new("avg", "total"));
        assert_eq!(request.nested.len(), 1);
    }

    #[test]
    fn test_sort_defaults_ascending() {
        let sort: SortField = serde_json::from_str(r#"{ "field": "created" }"#).unwrap();
        assert!(sort.ascending);
        assert_eq!(sort.priority, 0);
    }
}
