//! Turns raw search responses into typed [`QueryResults`].

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::IndexResult;
use crate::types::{BucketResult, BucketValue, CriteriaKind, DocumentSerializer, Hit, QueryCriteria, QueryResults};

use super::aggregation::{AggregationRegistry, bucket_key as render_key};
use super::criteria::{bucket_key, values_key};
use super::filter::unescape_source;

/// Builds the typed result of a successful search.
///
/// A hit that cannot be decoded into `T` is skipped and reported in
/// `messages`. An aggregation subtree that cannot be parsed turns the whole
/// result into a failure-shaped one.
pub fn materialize<T: DeserializeOwned>(
    criteria: &QueryCriteria,
    response: &Value,
    aggregations: &AggregationRegistry,
    serializer: &dyn DocumentSerializer,
) -> QueryResults<T> {
    let mut messages = criteria.messages.clone();
    let raw_aggs = response.get("aggregations").cloned().unwrap_or(Value::Null);

    let aggregation_results = if criteria.aggregations.is_empty() {
        Vec::new()
    } else {
        match aggregations.parse(&criteria.aggregations, &raw_aggs) {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!("Failed to parse aggregation response: {}", e);
                messages.push(e.to_string());
                return QueryResults::failed(messages);
            }
        }
    };

    let mut documents = Vec::new();
    if !matches!(criteria.kind, CriteriaKind::Aggregation | CriteriaKind::FieldValues) {
        let hits = response
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for raw in hits {
            match decode_hit(raw, serializer) {
                Ok(hit) => documents.push(hit),
                Err(e) => {
                    let id = raw.get("_id").and_then(Value::as_str).unwrap_or_default();
                    let index = raw.get("_index").and_then(Value::as_str).unwrap_or_default();
                    tracing::warn!(id = %id, index = %index, "Skipping undecodable hit: {}", e);
                    messages.push(format!("Document '{}' in '{}' could not be decoded: {}", id, index, e));
                }
            }
        }
    }

    let mut buckets = Vec::new();
    if criteria.kind == CriteriaKind::FieldValues
        && let Some(field) = criteria.value_field.as_deref()
    {
        buckets.push(bucket_result(field, raw_aggs.get(values_key(field))));
    }
    if criteria.kind != CriteriaKind::Aggregation {
        for bucket in &criteria.buckets {
            buckets.push(bucket_result(&bucket.field, raw_aggs.get(bucket_key(&bucket.field))));
        }
    }

    QueryResults {
        documents,
        buckets,
        aggregations: aggregation_results,
        total: total_hits(response),
        took: response.get("took").and_then(Value::as_u64).unwrap_or(0),
        messages,
    }
}

fn decode_hit<T: DeserializeOwned>(raw: &Value, serializer: &dyn DocumentSerializer) -> IndexResult<Hit<T>> {
    let source = unescape_source(raw.get("_source").cloned().unwrap_or_else(|| Value::Object(Default::default())));
    let document = serde_json::from_value(serializer.deserialize(source)?)?;
    Ok(Hit {
        id: raw.get("_id").and_then(Value::as_str).unwrap_or_default().to_string(),
        index: raw.get("_index").and_then(Value::as_str).unwrap_or_default().to_string(),
        score: raw.get("_score").and_then(Value::as_f64),
        version: raw.get("_version").and_then(Value::as_i64),
        document,
    })
}

fn bucket_result(field: &str, raw: Option<&Value>) -> BucketResult {
    let values = raw
        .and_then(|r| r.get("buckets"))
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .map(|entry| BucketValue {
                    key: render_key(entry),
                    count: entry.get("doc_count").and_then(Value::as_u64).unwrap_or(0),
                })
                .collect()
        })
        .unwrap_or_default();
    BucketResult {
        field: field.to_string(),
        values,
    }
}

/// `hits.total` as either `{ "value": n }` or a bare number.
fn total_hits(response: &Value) -> i64 {
    match response.pointer("/hits/total") {
        Some(Value::Object(total)) => total.get("value").and_then(Value::as_i64).unwrap_or(0),
        Some(total) => total.as_i64().unwrap_or(0),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::types::{AggregationRequest, BucketField, JsonSerializer};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Order {
        #[serde(rename = "_id")]
        key: String,
        customer: String,
    }

    fn response() -> Value {
        json!({
            "took": 3,
            "hits": {
                "total": { "value": 2, "relation": "eq" },
                "hits": [
                    {
                        "_index": "acme_orders", "_id": "1", "_score": 1.5, "_version": 2,
                        "_source": { "__esc_id": "o-1", "customer": "Ada", "__doc_type": "acme.Order" }
                    },
                    {
                        "_index": "acme_orders", "_id": "2", "_score": 1.0, "_version": 1,
                        "_source": { "customer": 7 }
                    }
                ]
            },
            "aggregations": {
                "bucket::customer": { "buckets": [{ "key": "Ada", "doc_count": 1 }] },
                "avg::total": { "value": 12.5 }
            }
        })
    }

    #[test]
    fn test_hits_and_undecodable_documents() {
        let mut criteria = QueryCriteria::advanced().bucket(BucketField::new("customer"));
        criteria.messages.push("Index 'acme_orders' is deprecated".to_string());
        let results: QueryResults<Order> =
            materialize(&criteria, &response(), &AggregationRegistry::default(), &JsonSerializer);

        assert_eq!(results.total, 2);
        assert_eq!(results.took, 3);
        assert_eq!(results.documents.len(), 1);
        let hit = &results.documents[0];
        assert_eq!(hit.document, Order { key: "o-1".to_string(), customer: "Ada".to_string() });
        assert_eq!(hit.score, Some(1.5));
        assert_eq!(hit.version, Some(2));
        assert_eq!(results.messages.len(), 2);
        assert!(results.messages[1].starts_with("Document '2' in 'acme_orders'"));
        assert_eq!(results.bucket("customer").unwrap().values[0].count, 1);
    }

    #[test]
    fn test_aggregation_shape_has_no_documents() {
        let criteria = QueryCriteria::aggregation().aggregate(AggregationRequest::new("avg", "total"));
        let results: QueryResults<Value> =
            materialize(&criteria, &response(), &AggregationRegistry::default(), &JsonSerializer);
        assert!(results.documents.is_empty());
        assert!(results.buckets.is_empty());
        assert_eq!(results.aggregation("avg", "total").unwrap().as_single(), Some(12.5));
    }

    #[test]
    fn test_missing_aggregation_is_failure() {
        let criteria = QueryCriteria::aggregation().aggregate(AggregationRequest::new("sum", "total"));
        let results: QueryResults<Value> =
            materialize(&criteria, &response(), &AggregationRegistry::default(), &JsonSerializer);
        assert!(results.is_failure());
        assert!(results.aggregations.is_empty());
        assert!(!results.messages.is_empty());
    }
}
