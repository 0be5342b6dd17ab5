//! Aggregation registry.
//!
//! Each aggregation kind contributes its part of the outgoing request tree and
//! parses its part of the response. Requests are keyed `{kind}::{field}` in
//! both directions, and bucketing kinds recurse into their children once per
//! bucket.
//!
//! Kinds are resolved when a request is composed against a registry, so an
//! [`AggregationRequest`] naming an unknown kind is still a valid value until
//! it is executed.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value, json};

use crate::error::{IndexError, IndexResult, NotFoundError};
use crate::types::{AggregationBucket, AggregationRequest, AggregationResult, AggregationValue, StatsValue};

use super::filter::FieldPaths;

/// Separator between kind and field in an aggregation key.
pub const KEY_SEPARATOR: &str = "::";

/// Default `terms` size.
pub const DEFAULT_TERMS_SIZE: usize = 10;

/// Builds the response key of an aggregation.
pub fn aggregation_key(kind: &str, field: &str) -> String {
    format!("{}{}{}", kind, KEY_SEPARATOR, field)
}

/// One aggregation kind.
pub trait AggregationKind: Send + Sync + Debug {
    /// Registry name, e.g. `avg`.
    fn name(&self) -> &str;

    /// Whether requests of this kind may carry child aggregations.
    fn supports_nested(&self) -> bool {
        false
    }

    /// Builds this kind's request body, without children.
    fn contribute(&self, request: &AggregationRequest, paths: &FieldPaths) -> IndexResult<Value>;

    /// Parses this kind's response subtree.
    fn parse(
        &self,
        request: &AggregationRequest,
        raw: &Value,
        registry: &AggregationRegistry,
    ) -> IndexResult<AggregationValue>;
}

/// avg, min, max and sum.
#[derive(Debug)]
struct SingleMetric {
    name: &'static str,
}

impl AggregationKind for SingleMetric {
    fn name(&self) -> &str {
        self.name
    }

    fn contribute(&self, request: &AggregationRequest, paths: &FieldPaths) -> IndexResult<Value> {
        Ok(json!({ self.name: { "field": paths.value_path(&request.field) } }))
    }

    fn parse(&self, _: &AggregationRequest, raw: &Value, _: &AggregationRegistry) -> IndexResult<AggregationValue> {
        Ok(AggregationValue::Single(raw.get("value").and_then(Value::as_f64)))
    }
}

#[derive(Debug)]
struct Stats;

impl AggregationKind for Stats {
    fn name(&self) -> &str {
        "stats"
    }

    fn contribute(&self, request: &AggregationRequest, paths: &FieldPaths) -> IndexResult<Value> {
        Ok(json!({ "stats": { "field": paths.value_path(&request.field) } }))
    }

    fn parse(&self, _: &AggregationRequest, raw: &Value, _: &AggregationRegistry) -> IndexResult<AggregationValue> {
        Ok(AggregationValue::Stats(StatsValue {
            count: raw.get("count").and_then(Value::as_u64).unwrap_or(0),
            min: raw.get("min").and_then(Value::as_f64),
            max: raw.get("max").and_then(Value::as_f64),
            avg: raw.get("avg").and_then(Value::as_f64),
            sum: raw.get("sum").and_then(Value::as_f64).unwrap_or(0.0),
        }))
    }
}

#[derive(Debug)]
struct Percentiles;

impl AggregationKind for Percentiles {
    fn name(&self) -> &str {
        "percentiles"
    }

    fn contribute(&self, request: &AggregationRequest, paths: &FieldPaths) -> IndexResult<Value> {
        let mut body = json!({ "field": paths.value_path(&request.field) });
        if !request.options.percents.is_empty() {
            body["percents"] = json!(request.options.percents);
        }
        Ok(json!({ "percentiles": body }))
    }

    fn parse(&self, _: &AggregationRequest, raw: &Value, _: &AggregationRegistry) -> IndexResult<AggregationValue> {
        let mut values: Vec<(f64, Option<f64>)> = match raw.get("values") {
            Some(Value::Object(values)) => values
                .iter()
                .filter_map(|(key, value)| Some((key.parse::<f64>().ok()?, value.as_f64())))
                .collect(),
            // keyed: false
            Some(Value::Array(entries)) => entries
                .iter()
                .filter_map(|e| Some((e.get("key")?.as_f64()?, e.get("value").and_then(Value::as_f64))))
                .collect(),
            _ => Vec::new(),
        };
        values.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(AggregationValue::Percentiles(values))
    }
}

#[derive(Debug)]
struct Terms;

impl AggregationKind for Terms {
    fn name(&self) -> &str {
        "terms"
    }

    fn supports_nested(&self) -> bool {
        true
    }

    fn contribute(&self, request: &AggregationRequest, paths: &FieldPaths) -> IndexResult<Value> {
        Ok(json!({
            "terms": {
                "field": paths.exact_path(&request.field),
                "size": request.options.size.unwrap_or(DEFAULT_TERMS_SIZE)
            }
        }))
    }

    fn parse(&self, request: &AggregationRequest, raw: &Value, registry: &AggregationRegistry) -> IndexResult<AggregationValue> {
        parse_buckets(request, raw, registry)
    }
}

#[derive(Debug)]
struct Histogram;

impl AggregationKind for Histogram {
    fn name(&self) -> &str {
        "histogram"
    }

    fn supports_nested(&self) -> bool {
        true
    }

    fn contribute(&self, request: &AggregationRequest, paths: &FieldPaths) -> IndexResult<Value> {
        let interval = request
            .options
            .interval
            .filter(|i| *i > 0.0)
            .ok_or_else(|| {
                IndexError::invalid_argument(format!(
                    "histogram on '{}' needs a positive interval",
                    request.field
                ))
            })?;
        let mut body = json!({
            "field": paths.value_path(&request.field),
            "interval": interval,
            "min_doc_count": 0
        });
        if let Some((min, max)) = &request.options.extended_bounds {
            let (Ok(min), Ok(max)) = (min.trim().parse::<f64>(), max.trim().parse::<f64>()) else {
                return Err(IndexError::invalid_argument(format!(
                    "histogram bounds on '{}' must be numbers",
                    request.field
                )));
            };
            body["extended_bounds"] = json!({ "min": min, "max": max });
        }
        Ok(json!({ "histogram": body }))
    }

    fn parse(&self, request: &AggregationRequest, raw: &Value, registry: &AggregationRegistry) -> IndexResult<AggregationValue> {
        parse_buckets(request, raw, registry)
    }
}

#[derive(Debug)]
struct DateHistogram;

impl AggregationKind for DateHistogram {
    fn name(&self) -> &str {
        "date_histogram"
    }

    fn supports_nested(&self) -> bool {
        true
    }

    fn contribute(&self, request: &AggregationRequest, paths: &FieldPaths) -> IndexResult<Value> {
        let mut body = json!({
            "field": paths.value_path(&request.field),
            "min_doc_count": 0
        });
        match (&request.options.calendar_interval, request.options.interval) {
            (Some(calendar), _) => body["calendar_interval"] = json!(calendar),
            (None, Some(millis)) if millis > 0.0 => {
                body["fixed_interval"] = json!(format!("{}ms", millis as i64))
            }
            _ => body["calendar_interval"] = json!("month"),
        }
        if let Some((min, max)) = &request.options.extended_bounds {
            body["extended_bounds"] = json!({ "min": min, "max": max });
        }
        Ok(json!({ "date_histogram": body }))
    }

    fn parse(&self, request: &AggregationRequest, raw: &Value, registry: &AggregationRegistry) -> IndexResult<AggregationValue> {
        parse_buckets(request, raw, registry)
    }
}

/// Renders a bucket key: `key_as_string` when present, integral numbers without a fraction.
pub(crate) fn bucket_key(bucket: &Value) -> String {
    if let Some(text) = bucket.get("key_as_string").and_then(Value::as_str) {
        return text.to_string();
    }
    match bucket.get("key") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => (f as i64).to_string(),
            _ => n.to_string(),
        },
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn parse_buckets(
    request: &AggregationRequest,
    raw: &Value,
    registry: &AggregationRegistry,
) -> IndexResult<AggregationValue> {
    let entries = raw
        .get("buckets")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut buckets = Vec::with_capacity(entries.len());
    for entry in &entries {
        let nested = if request.nested.is_empty() {
            Vec::new()
        } else {
            registry.parse(&request.nested, entry)?
        };
        buckets.push(AggregationBucket {
            key: bucket_key(entry),
            count: entry.get("doc_count").and_then(Value::as_u64).unwrap_or(0),
            nested,
        });
    }
    Ok(AggregationValue::Buckets(buckets))
}

/// Collapses duplicate `(kind, field)` requests: a later request replaces the
/// earlier one at the earlier one's position.
fn dedupe(requests: &[AggregationRequest]) -> Vec<&AggregationRequest> {
    let mut out: Vec<&AggregationRequest> = Vec::with_capacity(requests.len());
    for request in requests {
        match out
            .iter_mut()
            .find(|r| r.kind == request.kind && r.field == request.field)
        {
            Some(slot) => *slot = request,
            None => out.push(request),
        }
    }
    out
}

/// Kind-keyed aggregation registry.
#[derive(Debug)]
pub struct AggregationRegistry {
    kinds: RwLock<HashMap<String, Arc<dyn AggregationKind>>>,
}

impl Default for AggregationRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl AggregationRegistry {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self {
            kinds: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry holding the built-in kinds.
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        for name in ["avg", "min", "max", "sum"] {
            registry.register(Arc::new(SingleMetric { name }));
        }
        registry.register(Arc::new(Stats));
        registry.register(Arc::new(Percentiles));
        registry.register(Arc::new(Terms));
        registry.register(Arc::new(Histogram));
        registry.register(Arc::new(DateHistogram));
        registry
    }

    /// Registers a kind. Returns false if the name is already taken.
    pub fn register(&self, kind: Arc<dyn AggregationKind>) -> bool {
        let name = kind.name().to_string();
        let mut kinds = self.kinds.write();
        if kinds.contains_key(&name) {
            tracing::debug!(kind = %name, "Aggregation kind already registered, keeping the first");
            return false;
        }
        kinds.insert(name, kind);
        true
    }

    /// Looks up a kind.
    pub fn resolve(&self, name: &str) -> IndexResult<Arc<dyn AggregationKind>> {
        self.kinds.read().get(name).cloned().ok_or_else(|| {
            NotFoundError::Aggregation {
                kind: name.to_string(),
            }
            .into()
        })
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut names: Vec<String> = self.kinds.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Builds the `aggs` object for a set of requests.
    pub fn compose(&self, requests: &[AggregationRequest], paths: &FieldPaths) -> IndexResult<Map<String, Value>> {
        let mut aggs = Map::new();
        for request in dedupe(requests) {
            let kind = self.resolve(&request.kind)?;
            if !request.nested.is_empty() && !kind.supports_nested() {
                return Err(IndexError::invalid_argument(format!(
                    "aggregation '{}' cannot carry child aggregations",
                    request.kind
                )));
            }
            let mut body = kind.contribute(request, paths)?;
            if !request.nested.is_empty() {
                body["aggs"] = Value::Object(self.compose(&request.nested, paths)?);
            }
            aggs.insert(aggregation_key(&request.kind, &request.field), body);
        }
        Ok(aggs)
    }

    /// Parses the response subtrees for a set of requests, in request order.
    pub fn parse(&self, requests: &[AggregationRequest], raw: &Value) -> IndexResult<Vec<AggregationResult>> {
        let mut results = Vec::with_capacity(requests.len());
        for request in dedupe(requests) {
            let kind = self.resolve(&request.kind)?;
            let key = aggregation_key(&request.kind, &request.field);
            let subtree = raw.get(&key).ok_or_else(|| IndexError::ExecutionFailure {
                message: format!("aggregation response has no entry for '{}'", key),
            })?;
            results.push(AggregationResult {
                kind: request.kind.clone(),
                field: request.field.clone(),
                value: kind.parse(request, subtree, self)?,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> FieldPaths {
        FieldPaths::new(["customer"])
    }

    #[test]
    fn test_compose_keys_and_nesting() {
        let registry = AggregationRegistry::with_builtins();
        let requests = vec![
            AggregationRequest::new("terms", "customer")
                .with_nested(AggregationRequest::new("sum", "total")),
            AggregationRequest::new("avg", "total"),
        ];
        let aggs = registry.compose(&requests, &paths()).unwrap();
        assert_eq!(aggs["terms::customer"]["terms"]["field"], "customer.keyword");
        assert_eq!(aggs["terms::customer"]["aggs"]["sum::total"]["sum"]["field"], "total");
        assert_eq!(aggs["avg::total"], json!({ "avg": { "field": "total" } }));
    }

    #[test]
    fn test_unknown_kind_fails_at_compose() {
        let registry = AggregationRegistry::with_builtins();
        let request = AggregationRequest::new("median", "total");
        let err = registry.compose(&[request], &paths()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_metric_children_rejected() {
        let registry = AggregationRegistry::with_builtins();
        let request = AggregationRequest::new("avg", "total").with_nested(AggregationRequest::new("sum", "total"));
        assert!(registry.compose(&[request], &paths()).is_err());
    }

    #[test]
    fn test_duplicate_requests_collapse_in_place() {
        let registry = AggregationRegistry::with_builtins();
        let requests = vec![
            AggregationRequest::new("terms", "customer").with_size(5),
            AggregationRequest::new("avg", "total"),
            AggregationRequest::new("terms", "customer").with_size(2),
        ];
        let aggs = registry.compose(&requests, &paths()).unwrap();
        assert_eq!(aggs.len(), 2);
        assert_eq!(aggs["terms::customer"]["terms"]["size"], 2);

        let raw = json!({
            "terms::customer": { "buckets": [{ "key": "Acme", "doc_count": 2 }] },
            "avg::total": { "value": 12.5 }
        });
        let results = registry.parse(&requests, &raw).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].kind, "terms");
        assert_eq!(results[1].as_single(), Some(12.5));
    }

    #[test]
    fn test_parse_nested_buckets() {
        let registry = AggregationRegistry::with_builtins();
        let request = AggregationRequest::new("date_histogram", "order_date")
            .with_calendar_interval("month")
            .with_nested(AggregationRequest::new("stats", "total"));
        let raw = json!({
            "date_histogram::order_date": {
                "buckets": [{
                    "key_as_string": "2024-01-01T00:00:00.000Z",
                    "key": 1704067200000_i64,
                    "doc_count": 2,
                    "stats::total": { "count": 2, "min": 1.0, "max": 3.0, "avg": 2.0, "sum": 4.0 }
                }]
            }
        });
        let results = registry.parse(std::slice::from_ref(&request), &raw).unwrap();
        let bucket = &results[0].buckets()[0];
        assert_eq!(bucket.key, "2024-01-01T00:00:00.000Z");
        assert_eq!(bucket.count, 2);
        match &bucket.nested[0].value {
            AggregationValue::Stats(stats) => assert_eq!(stats.sum, 4.0),
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_percentiles_sorted() {
        let registry = AggregationRegistry::with_builtins();
        let request = AggregationRequest::new("percentiles", "total").with_percents(vec![50.0, 95.0]);
        let aggs = registry.compose(std::slice::from_ref(&request), &paths()).unwrap();
        assert_eq!(aggs["percentiles::total"]["percentiles"]["percents"], json!([50.0, 95.0]));

        let raw = json!({ "percentiles::total": { "values": { "95.0": 9.0, "50.0": 5.0 } } });
        let results = registry.parse(&[request], &raw).unwrap();
        assert_eq!(
            results[0].value,
            AggregationValue::Percentiles(vec![(50.0, Some(5.0)), (95.0, Some(9.0))])
        );
    }

    #[test]
    fn test_histogram_requires_interval() {
        let registry = AggregationRegistry::with_builtins();
        let err = registry
            .compose(&[AggregationRequest::new("histogram", "total")], &paths())
            .unwrap_err();
        assert!(matches!(err, IndexError::InvalidArgument { .. }));
    }

    #[test]
    fn test_bucket_key_rendering() {
        assert_eq!(bucket_key(&json!({ "key": 10.0 })), "10");
        assert_eq!(bucket_key(&json!({ "key": 2.5 })), "2.5");
        assert_eq!(bucket_key(&json!({ "key": "Acme" })), "Acme");
    }
}
