//! Aggregation evaluation.
//!
//! Field types are checked against the mappings of the searched indices the
//! same way a cluster checks them: numeric metrics need a numeric, date or
//! boolean field, `terms` refuses analyzed text, `histogram` needs a number and
//! `date_histogram` needs a date. An unmapped field yields empty results.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde_json::{Map, Value, json};

use super::analysis::{format_millis, parse_date_value, parse_number};
use super::store::{FieldType, MemoryIndex, ResolvedField, Scalar, StoredDocument};

const MAX_BUCKETS: usize = 65_535;
const DAY_MILLIS: i64 = 86_400_000;
const DEFAULT_PERCENTS: [f64; 7] = [1.0, 5.0, 25.0, 50.0, 75.0, 95.0, 99.0];

/// The mappings of the indices a search runs against.
pub(super) struct AggregationContext<'a> {
    indices: Vec<&'a MemoryIndex>,
}

impl<'a> AggregationContext<'a> {
    pub(super) fn new(indices: Vec<&'a MemoryIndex>) -> Self {
        Self { indices }
    }

    fn resolve(&self, field: &str) -> Option<ResolvedField> {
        self.indices.iter().find_map(|index| index.resolve(field))
    }
}

/// Evaluates an `aggs` object over the matched documents.
pub(super) fn compute(
    definitions: &Map<String, Value>,
    docs: &[&StoredDocument],
    ctx: &AggregationContext<'_>,
) -> Result<Value, String> {
    let mut out = Map::new();
    for (name, definition) in definitions {
        out.insert(name.clone(), compute_one(name, definition, docs, ctx)?);
    }
    Ok(Value::Object(out))
}

fn compute_one(
    name: &str,
    definition: &Value,
    docs: &[&StoredDocument],
    ctx: &AggregationContext<'_>,
) -> Result<Value, String> {
    let object = definition
        .as_object()
        .ok_or_else(|| format!("Expected an object for aggregation [{}]", name))?;
    let children = object
        .get("aggs")
        .or_else(|| object.get("aggregations"))
        .and_then(Value::as_object);
    let mut kinds = object
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "aggs" | "aggregations" | "meta"));
    let (kind, params) = kinds
        .next()
        .ok_or_else(|| format!("Missing definition for aggregation [{}]", name))?;
    if let Some((other, _)) = kinds.next() {
        return Err(format!(
            "Found two aggregation type definitions in [{}]: [{}] and [{}]",
            name, kind, other
        ));
    }

    let is_bucketing = matches!(kind.as_str(), "terms" | "histogram" | "date_histogram");
    if children.is_some() && !is_bucketing {
        return Err(format!(
            "Aggregator [{}] of type [{}] cannot accept sub-aggregations",
            name, kind
        ));
    }

    let field = params
        .get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| format!("Required [field] missing for aggregation [{}]", name))?;

    match kind.as_str() {
        "avg" | "min" | "max" | "sum" => {
            let values = numeric_values(field, kind, docs, ctx)?;
            let is_date = ctx.resolve(field).is_some_and(|f| f.ty == FieldType::Date);
            Ok(single_metric(kind, &values, is_date))
        }
        "stats" => {
            let values = numeric_values(field, kind, docs, ctx)?;
            Ok(stats(&values))
        }
        "percentiles" => {
            let values = numeric_values(field, kind, docs, ctx)?;
            let percents: Vec<f64> = match params.get("percents").and_then(Value::as_array) {
                Some(list) => list.iter().filter_map(parse_number).collect(),
                None => DEFAULT_PERCENTS.to_vec(),
            };
            Ok(percentiles(&values, &percents))
        }
        "terms" => terms(field, params, children, docs, ctx),
        "histogram" => histogram(name, field, params, children, docs, ctx),
        "date_histogram" => date_histogram(field, params, children, docs, ctx),
        other => Err(format!("Unknown aggregation type [{}] did you mean [terms]?", other)),
    }
}

fn unsupported(field: &str, ty: FieldType, kind: &str) -> String {
    format!(
        "Field [{}] of type [{}] is not supported for aggregation [{}]",
        field,
        ty.name(),
        kind
    )
}

fn fielddata_disabled(field: &str) -> String {
    format!(
        "Text fields are not optimised for operations that require per-document field data like aggregations and sorting, so these operations are disabled by default. Please use a keyword field instead. Alternatively, set fielddata=true on [{}] in order to load field data by uninverting the inverted index.",
        field
    )
}

fn numeric_values(
    field: &str,
    kind: &str,
    docs: &[&StoredDocument],
    ctx: &AggregationContext<'_>,
) -> Result<Vec<f64>, String> {
    let Some(resolved) = ctx.resolve(field) else {
        return Ok(Vec::new());
    };
    match resolved.ty {
        FieldType::Long | FieldType::Double | FieldType::Date | FieldType::Boolean => Ok(docs
            .iter()
            .flat_map(|doc| doc.scalars(&resolved))
            .filter_map(|s| s.as_f64())
            .collect()),
        FieldType::Text => Err(fielddata_disabled(field)),
        ty => Err(unsupported(field, ty, kind)),
    }
}

fn single_metric(kind: &str, values: &[f64], is_date: bool) -> Value {
    let value = match kind {
        "sum" => Some(values.iter().sum::<f64>()),
        "avg" if !values.is_empty() => Some(values.iter().sum::<f64>() / values.len() as f64),
        "min" => values.iter().copied().reduce(f64::min),
        "max" => values.iter().copied().reduce(f64::max),
        _ => None,
    };
    let mut out = json!({ "value": value });
    if let (true, Some(v)) = (is_date, value) {
        if kind == "min" || kind == "max" {
            out["value_as_string"] = json!(format_millis(v as i64));
        }
    }
    out
}

fn stats(values: &[f64]) -> Value {
    if values.is_empty() {
        return json!({ "count": 0, "min": null, "max": null, "avg": null, "sum": 0.0 });
    }
    let sum: f64 = values.iter().sum();
    json!({
        "count": values.len(),
        "min": values.iter().copied().reduce(f64::min),
        "max": values.iter().copied().reduce(f64::max),
        "avg": sum / values.len() as f64,
        "sum": sum
    })
}

fn percentiles(values: &[f64], percents: &[f64]) -> Value {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mut out = Map::new();
    for percent in percents {
        let value = if sorted.is_empty() {
            Value::Null
        } else {
            let rank = (percent.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
            let low = rank.floor() as usize;
            let high = rank.ceil() as usize;
            let fraction = rank - low as f64;
            json!(sorted[low] + (sorted[high] - sorted[low]) * fraction)
        };
        out.insert(format!("{:?}", percent), value);
    }
    json!({ "values": out })
}

/// Bucket key with its JSON rendering.
#[derive(Debug, Clone)]
struct TermKey {
    scalar: Scalar,
}

impl TermKey {
    fn render(&self, bucket: &mut Map<String, Value>) {
        match &self.scalar {
            Scalar::Str(s) => {
                bucket.insert("key".to_string(), json!(s));
            }
            Scalar::Num(n) => {
                bucket.insert("key".to_string(), json!(n));
            }
            Scalar::Date(d) => {
                bucket.insert("key".to_string(), json!(d));
                bucket.insert("key_as_string".to_string(), json!(format_millis(*d)));
            }
            Scalar::Bool(b) => {
                bucket.insert("key".to_string(), json!(if *b { 1 } else { 0 }));
                bucket.insert("key_as_string".to_string(), json!(b.to_string()));
            }
        }
    }
}

fn terms(
    field: &str,
    params: &Value,
    children: Option<&Map<String, Value>>,
    docs: &[&StoredDocument],
    ctx: &AggregationContext<'_>,
) -> Result<Value, String> {
    let size = params
        .get("size")
        .and_then(parse_number)
        .map(|n| n as usize)
        .unwrap_or(10);
    let Some(resolved) = ctx.resolve(field) else {
        return Ok(json!({ "doc_count_error_upper_bound": 0, "sum_other_doc_count": 0, "buckets": [] }));
    };
    match resolved.ty {
        FieldType::Text => return Err(fielddata_disabled(field)),
        FieldType::Object => return Err(unsupported(field, resolved.ty, "terms")),
        _ => {}
    }

    let mut groups: Vec<(TermKey, Vec<&StoredDocument>)> = Vec::new();
    for doc in docs.iter().copied() {
        let mut seen: Vec<Scalar> = Vec::new();
        for value in doc.scalars(&resolved) {
            if seen.iter().any(|s| s == &value) {
                continue;
            }
            seen.push(value.clone());
            match groups.iter_mut().find(|(key, _)| key.scalar == value) {
                Some((_, members)) => members.push(doc),
                None => groups.push((TermKey { scalar: value }, vec![doc])),
            }
        }
    }
    groups.sort_by(|(a, a_docs), (b, b_docs)| {
        b_docs
            .len()
            .cmp(&a_docs.len())
            .then_with(|| a.scalar.compare(&b.scalar))
    });

    let other: usize = groups.iter().skip(size).map(|(_, members)| members.len()).sum();
    let mut buckets = Vec::new();
    for (key, members) in groups.into_iter().take(size) {
        let mut bucket = Map::new();
        key.render(&mut bucket);
        bucket.insert("doc_count".to_string(), json!(members.len()));
        add_children(&mut bucket, children, &members, ctx)?;
        buckets.push(Value::Object(bucket));
    }
    Ok(json!({
        "doc_count_error_upper_bound": 0,
        "sum_other_doc_count": other,
        "buckets": buckets
    }))
}

fn add_children(
    bucket: &mut Map<String, Value>,
    children: Option<&Map<String, Value>>,
    members: &[&StoredDocument],
    ctx: &AggregationContext<'_>,
) -> Result<(), String> {
    if let Some(children) = children {
        if let Value::Object(results) = compute(children, members, ctx)? {
            bucket.extend(results);
        }
    }
    Ok(())
}

fn histogram(
    name: &str,
    field: &str,
    params: &Value,
    children: Option<&Map<String, Value>>,
    docs: &[&StoredDocument],
    ctx: &AggregationContext<'_>,
) -> Result<Value, String> {
    let interval = params
        .get("interval")
        .and_then(parse_number)
        .filter(|i| *i > 0.0)
        .ok_or_else(|| format!("[interval] must be >0 for histogram aggregation [{}]", name))?;
    let Some(resolved) = ctx.resolve(field) else {
        return Ok(json!({ "buckets": [] }));
    };
    if !resolved.ty.is_numeric() {
        return Err(unsupported(field, resolved.ty, "histogram"));
    }

    let key_of = |v: f64| (v / interval).floor() * interval;
    let mut keyed: Vec<(i64, &StoredDocument)> = Vec::new();
    for doc in docs {
        let mut keys: Vec<i64> = doc
            .scalars(&resolved)
            .iter()
            .filter_map(Scalar::as_f64)
            .map(|v| (key_of(v) / interval).round() as i64)
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keyed.extend(keys.into_iter().map(|k| (k, *doc)));
    }

    let bounds = params.get("extended_bounds").map(|b| {
        (
            b.get("min").and_then(parse_number).map(|v| (key_of(v) / interval).round() as i64),
            b.get("max").and_then(parse_number).map(|v| (key_of(v) / interval).round() as i64),
        )
    });
    let steps = bucket_range(keyed.iter().map(|(k, _)| *k), bounds)?;

    let mut buckets = Vec::new();
    for step in steps {
        let members: Vec<&StoredDocument> = keyed
            .iter()
            .filter(|(k, _)| *k == step)
            .map(|(_, doc)| *doc)
            .collect();
        let mut bucket = Map::new();
        bucket.insert("key".to_string(), json!(step as f64 * interval));
        bucket.insert("doc_count".to_string(), json!(members.len()));
        add_children(&mut bucket, children, &members, ctx)?;
        buckets.push(Value::Object(bucket));
    }
    Ok(json!({ "buckets": buckets }))
}

/// Contiguous step indices covering the observed keys and the bounds.
fn bucket_range(
    keys: impl Iterator<Item = i64>,
    bounds: Option<(Option<i64>, Option<i64>)>,
) -> Result<Vec<i64>, String> {
    let (mut low, mut high) = (i64::MAX, i64::MIN);
    for key in keys {
        low = low.min(key);
        high = high.max(key);
    }
    if let Some((min, max)) = bounds {
        if let Some(min) = min {
            low = low.min(min);
            high = high.max(min);
        }
        if let Some(max) = max {
            low = low.min(max);
            high = high.max(max);
        }
    }
    if low > high {
        return Ok(Vec::new());
    }
    let count = (high - low) as u64 + 1;
    if count > MAX_BUCKETS as u64 {
        return Err(format!(
            "Trying to create too many buckets. Must be less than or equal to: [{}] but was [{}].",
            MAX_BUCKETS, count
        ));
    }
    Ok((low..=high).collect())
}

/// Calendar-aware rounding for date histograms.
#[derive(Debug, Clone, Copy)]
enum DateRounding {
    Fixed(i64),
    Week,
    Months(i32),
}

impl DateRounding {
    fn parse(params: &Value) -> Result<Self, String> {
        if let Some(unit) = params.get("calendar_interval").and_then(Value::as_str) {
            return match unit {
                "minute" | "1m" => Ok(DateRounding::Fixed(60_000)),
                "hour" | "1h" => Ok(DateRounding::Fixed(3_600_000)),
                "day" | "1d" => Ok(DateRounding::Fixed(DAY_MILLIS)),
                "week" | "1w" => Ok(DateRounding::Week),
                "month" | "1M" => Ok(DateRounding::Months(1)),
                "quarter" | "1q" => Ok(DateRounding::Months(3)),
                "year" | "1y" => Ok(DateRounding::Months(12)),
                other => Err(format!(
                    "The supplied interval [{}] could not be parsed as a calendar interval.",
                    other
                )),
            };
        }
        if let Some(fixed) = params.get("fixed_interval").and_then(Value::as_str) {
            return parse_fixed(fixed).map(DateRounding::Fixed).ok_or_else(|| {
                format!("failed to parse setting [date_histogram.fixedInterval] with value [{}]", fixed)
            });
        }
        Err("Required one of fields [interval, calendar_interval, fixed_interval], but none were specified.".to_string())
    }

    fn round(&self, millis: i64) -> i64 {
        match self {
            DateRounding::Fixed(width) => millis.div_euclid(*width) * width,
            DateRounding::Week => {
                let day = millis.div_euclid(DAY_MILLIS);
                // 1970-01-01 was a Thursday; weeks start on Monday.
                let from_monday = (day + 3).rem_euclid(7);
                (day - from_monday) * DAY_MILLIS
            }
            DateRounding::Months(step) => {
                let Some(dt) = DateTime::<Utc>::from_timestamp_millis(millis) else {
                    return millis;
                };
                let total = dt.year() * 12 + dt.month0() as i32;
                month_start(total - total.rem_euclid(*step)).unwrap_or(millis)
            }
        }
    }

    fn next(&self, key: i64) -> i64 {
        match self {
            DateRounding::Fixed(width) => key + width,
            DateRounding::Week => key + 7 * DAY_MILLIS,
            DateRounding::Months(step) => match DateTime::<Utc>::from_timestamp_millis(key) {
                Some(dt) => {
                    let total = dt.year() * 12 + dt.month0() as i32 + step;
                    month_start(total).unwrap_or(i64::MAX)
                }
                None => i64::MAX,
            },
        }
    }
}

fn month_start(total_months: i32) -> Option<i64> {
    let year = total_months.div_euclid(12);
    let month = total_months.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1)?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
}

fn parse_fixed(text: &str) -> Option<i64> {
    let split = text.find(|c: char| !c.is_ascii_digit())?;
    let (amount, unit) = text.split_at(split);
    let amount: i64 = amount.parse().ok().filter(|a| *a > 0)?;
    let unit_millis = match unit {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => DAY_MILLIS,
        _ => return None,
    };
    Some(amount * unit_millis)
}

fn date_histogram(
    field: &str,
    params: &Value,
    children: Option<&Map<String, Value>>,
    docs: &[&StoredDocument],
    ctx: &AggregationContext<'_>,
) -> Result<Value, String> {
    let rounding = DateRounding::parse(params)?;
    let Some(resolved) = ctx.resolve(field) else {
        return Ok(json!({ "buckets": [] }));
    };
    if resolved.ty != FieldType::Date {
        return Err(unsupported(field, resolved.ty, "date_histogram"));
    }

    let mut groups: BTreeMap<i64, Vec<&StoredDocument>> = BTreeMap::new();
    for doc in docs.iter().copied() {
        let mut keys: Vec<i64> = doc
            .scalars(&resolved)
            .iter()
            .filter_map(|s| match s {
                Scalar::Date(d) => Some(rounding.round(*d)),
                _ => None,
            })
            .collect();
        keys.sort_unstable();
        keys.dedup();
        for key in keys {
            groups.entry(key).or_default().push(doc);
        }
    }

    let bound = |name: &str| {
        params
            .get("extended_bounds")
            .and_then(|b| b.get(name))
            .and_then(parse_date_value)
            .map(|d| rounding.round(d))
    };
    let first = groups.keys().next().copied().into_iter().chain(bound("min")).min();
    let last = groups.keys().next_back().copied().into_iter().chain(bound("max")).max();

    let mut buckets = Vec::new();
    if let (Some(first), Some(last)) = (first, last) {
        let mut key = first;
        while key <= last {
            if buckets.len() >= MAX_BUCKETS {
                return Err(format!(
                    "Trying to create too many buckets. Must be less than or equal to: [{}].",
                    MAX_BUCKETS
                ));
            }
            let members = groups.get(&key).cloned().unwrap_or_default();
            let mut bucket = Map::new();
            bucket.insert("key_as_string".to_string(), json!(format_millis(key)));
            bucket.insert("key".to_string(), json!(key));
            bucket.insert("doc_count".to_string(), json!(members.len()));
            add_children(&mut bucket, children, &members, ctx)?;
            buckets.push(Value::Object(bucket));
            key = rounding.next(key);
        }
    }
    Ok(json!({ "buckets": buckets }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::analysis::parse_date_millis;

    fn index() -> MemoryIndex {
        let mut index = MemoryIndex::from_body(&serde_json::json!({
            "mappings": { "properties": { "customer": { "type": "keyword" } } }
        }));
        let rows = [
            ("1", "acme", 10.0, "2024-01-05"),
            ("2", "acme", 20.0, "2024-01-20"),
            ("3", "globex", 30.0, "2024-03-02"),
        ];
        for (id, customer, total, placed) in rows {
            index.put(
                id,
                json!({ "customer": customer, "total": total, "placed": placed, "note": "free text" }),
            );
        }
        index
    }

    fn run(aggs: Value) -> Result<Value, String> {
        let index = index();
        let mut docs: Vec<&StoredDocument> = index.documents.values().collect();
        docs.sort_by_key(|d| d.seq);
        let ctx = AggregationContext::new(vec![&index]);
        compute(aggs.as_object().unwrap(), &docs, &ctx)
    }

    #[test]
    fn test_metrics() {
        let out = run(json!({
            "a": { "avg": { "field": "total" } },
            "s": { "stats": { "field": "total" } },
            "p": { "percentiles": { "field": "total", "percents": [50] } }
        }))
        .unwrap();
        assert_eq!(out["a"]["value"], 20.0);
        assert_eq!(out["s"]["count"], 3);
        assert_eq!(out["s"]["max"], 30.0);
        assert_eq!(out["p"]["values"]["50.0"], 20.0);
    }

    #[test]
    fn test_metric_on_text_fails() {
        let err = run(json!({ "a": { "avg": { "field": "note" } } })).unwrap_err();
        assert!(err.contains("Text fields"));
        let err = run(json!({ "a": { "sum": { "field": "customer" } } })).unwrap_err();
        assert!(err.contains("[keyword]"));
    }

    #[test]
    fn test_metric_on_unmapped_is_null() {
        let out = run(json!({ "a": { "avg": { "field": "nope" } } })).unwrap();
        assert!(out["a"]["value"].is_null());
    }

    #[test]
    fn test_terms_with_nested_metric() {
        let out = run(json!({
            "t": { "terms": { "field": "customer" }, "aggs": { "avg": { "avg": { "field": "total" } } } }
        }))
        .unwrap();
        let buckets = out["t"]["buckets"].as_array().unwrap();
        assert_eq!(buckets[0]["key"], "acme");
        assert_eq!(buckets[0]["doc_count"], 2);
        assert_eq!(buckets[0]["avg"]["value"], 15.0);
        assert_eq!(buckets[1]["key"], "globex");
    }

    #[test]
    fn test_metric_with_children_fails() {
        assert!(run(json!({
            "a": { "avg": { "field": "total" }, "aggs": { "b": { "max": { "field": "total" } } } }
        }))
        .is_err());
    }

    #[test]
    fn test_histogram_fills_gaps() {
        let out = run(json!({ "h": { "histogram": { "field": "total", "interval": 10 } } })).unwrap();
        let buckets = out["h"]["buckets"].as_array().unwrap();
        let keys: Vec<f64> = buckets.iter().map(|b| b["key"].as_f64().unwrap()).collect();
        assert_eq!(keys, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_date_histogram_by_month() {
        let out = run(json!({
            "d": { "date_histogram": { "field": "placed", "calendar_interval": "month" } }
        }))
        .unwrap();
        let buckets = out["d"]["buckets"].as_array().unwrap();
        let counts: Vec<u64> = buckets.iter().map(|b| b["doc_count"].as_u64().unwrap()).collect();
        assert_eq!(counts, vec![2, 0, 1]);
        assert_eq!(buckets[1]["key_as_string"], "2024-02-01T00:00:00.000Z");
    }

    #[test]
    fn test_date_histogram_extended_bounds() {
        let out = run(json!({
            "d": { "date_histogram": {
                "field": "placed",
                "calendar_interval": "month",
                "extended_bounds": { "min": "2023-12-01", "max": "2024-04-01" }
            } }
        }))
        .unwrap();
        assert_eq!(out["d"]["buckets"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_date_histogram_on_keyword_fails() {
        let err = run(json!({
            "d": { "date_histogram": { "field": "customer", "calendar_interval": "day" } }
        }))
        .unwrap_err();
        assert!(err.contains("date_histogram"));
    }

    #[test]
    fn test_week_rounding_starts_monday() {
        let rounding = DateRounding::Week;
        // 2024-01-05 is a Friday
        let key = rounding.round(parse_date_millis("2024-01-05").unwrap());
        assert_eq!(format_millis(key), "2024-01-01T00:00:00.000Z");
    }
}
