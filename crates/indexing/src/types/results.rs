//! Query results.

use serde::{Deserialize, Serialize};

/// One matched document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit<T> {
    /// Document id.
    pub id: String,
    /// Physical index the document was found in.
    pub index: String,
    /// Relevance score, absent when sorting by field.
    pub score: Option<f64>,
    /// Backend document version.
    pub version: Option<i64>,
    /// Decoded document.
    pub document: T,
}

/// One value of a terms facet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketValue {
    /// Bucket key.
    pub key: String,
    /// Number of matching documents.
    pub count: u64,
}

/// A terms facet result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketResult {
    /// Faceted field.
    pub field: String,
    /// Values ordered by descending count.
    pub values: Vec<BucketValue>,
}

/// Bundled numeric statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsValue {
    /// Number of values.
    pub count: u64,
    /// Minimum, absent when no values matched.
    pub min: Option<f64>,
    /// Maximum.
    pub max: Option<f64>,
    /// Average.
    pub avg: Option<f64>,
    /// Sum.
    pub sum: f64,
}

/// One bucket of a bucketing aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationBucket {
    /// Bucket key rendered as a string (dates as RFC 3339).
    pub key: String,
    /// Number of documents in the bucket.
    pub count: u64,
    /// Results of the child aggregations for this bucket.
    #[serde(default)]
    pub nested: Vec<AggregationResult>,
}

/// The parsed value of an aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AggregationValue {
    /// avg, min, max or sum. `None` when no documents had the field.
    Single(Option<f64>),
    /// stats.
    Stats(StatsValue),
    /// percentiles as `(percent, value)` pairs in request order.
    Percentiles(Vec<(f64, Option<f64>)>),
    /// terms, histogram and date_histogram.
    Buckets(Vec<AggregationBucket>),
}

/// An aggregation result tagged with its request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    /// Aggregation kind.
    pub kind: String,
    /// Aggregated field.
    pub field: String,
    /// Parsed value.
    pub value: AggregationValue,
}

impl AggregationResult {
    /// The single metric value, if this is a single-value aggregation.
    pub fn as_single(&self) -> Option<f64> {
        match &self.value {
            AggregationValue::Single(v) => *v,
            _ => None,
        }
    }

    /// The buckets, if this is a bucketing aggregation.
    pub fn buckets(&self) -> &[AggregationBucket] {
        match &self.value {
            AggregationValue::Buckets(buckets) => buckets,
            _ => &[],
        }
    }
}

/// The uniform result of every query shape.
///
/// A query the backend rejected comes back with `total == -1`, no documents,
/// no buckets, no aggregations and at least one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResults<T> {
    /// Matched documents for the requested page.
    pub documents: Vec<Hit<T>>,
    /// Terms facets.
    pub buckets: Vec<BucketResult>,
    /// Aggregation results in request order.
    pub aggregations: Vec<AggregationResult>,
    /// Total matches, or -1 on failure.
    pub total: i64,
    /// Backend execution time in milliseconds.
    pub took: u64,
    /// Deprecation notices and failure details.
    pub messages: Vec<String>,
}

impl<T> Default for QueryResults<T> {
    fn default() -> Self {
        Self {
            documents: Vec::new(),
            buckets: Vec::new(),
            aggregations: Vec::new(),
            total: 0,
            took: 0,
            messages: Vec::new(),
        }
    }
}

impl<T> QueryResults<T> {
    /// A failure-shaped result carrying the given messages.
    pub fn failed(messages: Vec<String>) -> Self {
        Self {
            total: -1,
            messages,
            ..Default::default()
        }
    }

    /// Returns true when the backend rejected the query.
    pub fn is_failure(&self) -> bool {
        self.total < 0
    }

    /// Looks up an aggregation result by kind and field.
    pub fn aggregation(&self, kind: &str, field: &str) -> Option<&AggregationResult> {
        self.aggregations
            .iter()
            .find(|a| a.kind == kind && a.field == field)
    }

    /// Looks up a facet by field.
    pub fn bucket(&self, field: &str) -> Option<&BucketResult> {
        self.buckets.iter().find(|b| b.field == field)
    }

    /// Iterates over the decoded documents.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.documents.iter().map(|hit| &hit.document)
    }
}
