//! Comparator registry.
//!
//! A comparator turns one `(field, value)` filter into a backend predicate.
//! Comparators are looked up by token; the built-in set covers equality, word
//! and phrase matching, and numeric/date ranges. Additional comparators can be
//! registered at startup, but a token can only be registered once.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::{Value, json};

use crate::error::{IndexError, IndexResult, NotFoundError};

/// Built-in comparator tokens.
pub mod tokens {
    /// Exact value match.
    pub const EQUAL: &str = "equal";
    /// Negated exact value match.
    pub const NOT_EQUAL: &str = "notEqual";
    /// At least one word matches.
    pub const ANY_WORD: &str = "anyWord";
    /// No word matches.
    pub const NOT_ANY_WORD: &str = "notAnyWord";
    /// Whole phrase in order.
    pub const FULL_PHRASE: &str = "fullPhrase";
    /// Phrase prefix; comma-separated values are OR'd.
    pub const PARTIAL_PHRASE: &str = "partialPhrase";
    /// Strictly greater.
    pub const GREATER_THAN: &str = "greaterThan";
    /// Greater or equal.
    pub const GREATER_THAN_OR_EQUAL: &str = "greaterThanOrEqual";
    /// Strictly less.
    pub const LESS_THAN: &str = "lessThan";
    /// Less or equal.
    pub const LESS_THAN_OR_EQUAL: &str = "lessThanOrEqual";
    /// Inclusive range, `low|high`.
    pub const BETWEEN: &str = "between";
}

/// Separator between the two bounds of a `between` value.
pub const BETWEEN_SEPARATOR: char = '|';

/// Builds a backend predicate for one filter.
pub trait Comparator: Send + Sync + Debug {
    /// Builds the predicate. `field` is already escaped for the backend.
    fn build(&self, field: &str, value: &str) -> IndexResult<Value>;

    /// Whether the predicate compares whole values. Such comparators receive
    /// the keyword subfield of text fields instead of the analyzed field.
    fn exact(&self) -> bool {
        false
    }
}

/// A comparator backed by a closure.
pub struct FnComparator<F>(F);

impl<F> FnComparator<F>
where
    F: Fn(&str, &str) -> IndexResult<Value> + Send + Sync,
{
    /// Wraps a closure.
    pub fn new(build: F) -> Self {
        Self(build)
    }
}

impl<F> Debug for FnComparator<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnComparator")
    }
}

impl<F> Comparator for FnComparator<F>
where
    F: Fn(&str, &str) -> IndexResult<Value> + Send + Sync,
{
    fn build(&self, field: &str, value: &str) -> IndexResult<Value> {
        (self.0)(field, value)
    }
}

#[derive(Debug)]
struct Equal {
    negated: bool,
}

impl Comparator for Equal {
    fn build(&self, field: &str, value: &str) -> IndexResult<Value> {
        Ok(negate_if(self.negated, json!({ "term": { field: value } })))
    }

    fn exact(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct AnyWord {
    negated: bool,
}

impl Comparator for AnyWord {
    fn build(&self, field: &str, value: &str) -> IndexResult<Value> {
        let clause = json!({ "match": { field: { "query": value, "operator": "or" } } });
        Ok(negate_if(self.negated, clause))
    }
}

#[derive(Debug)]
struct FullPhrase;

impl Comparator for FullPhrase {
    fn build(&self, field: &str, value: &str) -> IndexResult<Value> {
        Ok(json!({ "match_phrase": { field: { "query": value, "slop": 0 } } }))
    }
}

#[derive(Debug)]
struct PartialPhrase;

impl Comparator for PartialPhrase {
    fn build(&self, field: &str, value: &str) -> IndexResult<Value> {
        let phrases: Vec<&str> = value
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        let prefix = |phrase: &str| json!({ "match_phrase_prefix": { field: { "query": phrase } } });
        match phrases.as_slice() {
            [] => Err(IndexError::invalid_argument(format!(
                "partialPhrase on '{}' needs at least one non-empty phrase",
                field
            ))),
            [single] => Ok(prefix(single)),
            many => Ok(json!({
                "bool": {
                    "should": many.iter().map(|p| prefix(p)).collect::<Vec<_>>(),
                    "minimum_should_match": 1
                }
            })),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RangeOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl RangeOp {
    fn key(self) -> &'static str {
        match self {
            RangeOp::Gt => "gt",
            RangeOp::Gte => "gte",
            RangeOp::Lt => "lt",
            RangeOp::Lte => "lte",
        }
    }
}

#[derive(Debug)]
struct Range {
    op: RangeOp,
}

impl Comparator for Range {
    fn build(&self, field: &str, value: &str) -> IndexResult<Value> {
        let bound = range_bound(value).ok_or_else(|| {
            IndexError::invalid_argument(format!(
                "'{}' is neither a number nor a date (field '{}')",
                value, field
            ))
        })?;
        Ok(json!({ "range": { field: { self.op.key(): bound.into_json() } } }))
    }
}

#[derive(Debug)]
struct Between;

impl Comparator for Between {
    fn build(&self, field: &str, value: &str) -> IndexResult<Value> {
        let malformed = || {
            IndexError::invalid_argument(format!(
                "between on '{}' expects 'low{}high' with two numbers or two dates, got '{}'",
                field, BETWEEN_SEPARATOR, value
            ))
        };
        let (low, high) = value.split_once(BETWEEN_SEPARATOR).ok_or_else(malformed)?;
        let bounds = match (range_bound(low), range_bound(high)) {
            (Some(low @ Bound::Number(_)), Some(high @ Bound::Number(_)))
            | (Some(low @ Bound::Date(_)), Some(high @ Bound::Date(_))) => (low, high),
            _ => return Err(malformed()),
        };
        Ok(json!({
            "range": { field: { "gte": bounds.0.into_json(), "lte": bounds.1.into_json() } }
        }))
    }
}

fn negate_if(negated: bool, clause: Value) -> Value {
    if negated {
        json!({ "bool": { "must_not": [clause] } })
    } else {
        clause
    }
}

enum Bound {
    Number(f64),
    Date(String),
}

impl Bound {
    fn into_json(self) -> Value {
        match self {
            Bound::Number(n) => json!(n),
            Bound::Date(d) => Value::String(d),
        }
    }
}

/// A range bound parses as a number first, then as a date.
fn range_bound(value: &str) -> Option<Bound> {
    let value = value.trim();
    if let Ok(n) = value.parse::<f64>() {
        if n.is_finite() {
            return Some(Bound::Number(n));
        }
    }
    parse_date(value).map(Bound::Date)
}

/// Normalizes a date or date-time to `2024-03-01T00:00:00.000Z`.
fn parse_date(value: &str) -> Option<String> {
    let utc = if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        dt.with_timezone(&Utc)
    } else if let Some(dt) = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
    {
        dt.and_utc()
    } else {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()?
            .and_hms_opt(0, 0, 0)?
            .and_utc()
    };
    Some(utc.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Token-keyed comparator registry.
#[derive(Debug)]
pub struct ComparatorRegistry {
    comparators: RwLock<HashMap<String, Arc<dyn Comparator>>>,
}

impl Default for ComparatorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ComparatorRegistry {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self {
            comparators: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry holding the built-in comparators.
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        registry.register(tokens::EQUAL, Arc::new(Equal { negated: false }));
        registry.register(tokens::NOT_EQUAL, Arc::new(Equal { negated: true }));
        registry.register(tokens::ANY_WORD, Arc::new(AnyWord { negated: false }));
        registry.register(tokens::NOT_ANY_WORD, Arc::new(AnyWord { negated: true }));
        registry.register(tokens::FULL_PHRASE, Arc::new(FullPhrase));
        registry.register(tokens::PARTIAL_PHRASE, Arc::new(PartialPhrase));
        registry.register(tokens::GREATER_THAN, Arc::new(Range { op: RangeOp::Gt }));
        registry.register(tokens::GREATER_THAN_OR_EQUAL, Arc::new(Range { op: RangeOp::Gte }));
        registry.register(tokens::LESS_THAN, Arc::new(Range { op: RangeOp::Lt }));
        registry.register(tokens::LESS_THAN_OR_EQUAL, Arc::new(Range { op: RangeOp::Lte }));
        registry.register(tokens::BETWEEN, Arc::new(Between));
        registry
    }

    /// Registers a comparator. Returns false, leaving the existing entry in
    /// place, if the token is already taken.
    pub fn register(&self, token: impl Into<String>, comparator: Arc<dyn Comparator>) -> bool {
        let token = token.into();
        let mut comparators = self.comparators.write();
        if comparators.contains_key(&token) {
            tracing::debug!(token = %token, "Comparator already registered, keeping the first");
            return false;
        }
        comparators.insert(token, comparator);
        true
    }

    /// Registers a closure as a comparator.
    pub fn register_fn<F>(&self, token: impl Into<String>, build: F) -> bool
    where
        F: Fn(&str, &str) -> IndexResult<Value> + Send + Sync + 'static,
    {
        self.register(token, Arc::new(FnComparator::new(build)))
    }

    /// Looks up a comparator.
    pub fn resolve(&self, token: &str) -> IndexResult<Arc<dyn Comparator>> {
        self.comparators.read().get(token).cloned().ok_or_else(|| {
            NotFoundError::Comparator {
                token: token.to_string(),
            }
            .into()
        })
    }

    /// Returns true if the token is registered.
    pub fn contains(&self, token: &str) -> bool {
        self.comparators.read().contains_key(token)
    }

    /// Registered tokens, sorted.
    pub fn tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.comparators.read().keys().cloned().collect();
        tokens.sort();
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(token: &str, field: &str, value: &str) -> IndexResult<Value> {
        ComparatorRegistry::with_builtins()
            .resolve(token)
            .unwrap()
            .build(field, value)
    }

    #[test]
    fn test_first_registration_wins() {
        let registry = ComparatorRegistry::with_builtins();
        let replaced = registry.register_fn(tokens::EQUAL, |_, _| Ok(json!({ "match_none": {} })));
        assert!(!replaced);
        let equal = registry.resolve(tokens::EQUAL).unwrap();
        assert!(equal.exact());
        assert_eq!(equal.build("a", "b").unwrap(), json!({ "term": { "a": "b" } }));

        assert!(registry.register_fn("startsWith", |field, value| {
            Ok(json!({ "prefix": { field: value } }))
        }));
        assert!(registry.contains("startsWith"));
    }

    #[test]
    fn test_unknown_token_is_not_found() {
        let err = ComparatorRegistry::with_builtins().resolve("fuzzy").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_equal_is_a_single_term() {
        assert_eq!(
            build(tokens::NOT_EQUAL, "customer.keyword", "Ada Lovelace").unwrap(),
            json!({ "bool": { "must_not": [{ "term": { "customer.keyword": "Ada Lovelace" } }] } })
        );
        let registry = ComparatorRegistry::with_builtins();
        assert!(registry.resolve(tokens::NOT_EQUAL).unwrap().exact());
        assert!(!registry.resolve(tokens::ANY_WORD).unwrap().exact());
        assert!(registry.register_fn("startsWith", |field, value| {
            Ok(json!({ "prefix": { field: value } }))
        }));
        assert!(!registry.resolve("startsWith").unwrap().exact());
    }

    #[test]
    fn test_negations_wrap_in_must_not() {
        let clause = build(tokens::NOT_ANY_WORD, "customer", "acme").unwrap();
        assert_eq!(
            clause,
            json!({ "bool": { "must_not": [{ "match": { "customer": { "query": "acme", "operator": "or" } } }] } })
        );
    }

    #[test]
    fn test_partial_phrase_fans_out_on_commas() {
        let clause = build(tokens::PARTIAL_PHRASE, "name", "bas, gad ,").unwrap();
        let should = clause["bool"]["should"].as_array().unwrap();
        assert_eq!(should.len(), 2);
        assert_eq!(should[1]["match_phrase_prefix"]["name"]["query"], "gad");

        let single = build(tokens::PARTIAL_PHRASE, "name", "bas").unwrap();
        assert!(single.get("match_phrase_prefix").is_some());

        assert!(build(tokens::PARTIAL_PHRASE, "name", " , ").is_err());
    }

    #[test]
    fn test_range_prefers_numbers_then_dates() {
        let numeric = build(tokens::GREATER_THAN, "total", "10").unwrap();
        assert_eq!(numeric, json!({ "range": { "total": { "gt": 10.0 } } }));

        let date = build(tokens::LESS_THAN_OR_EQUAL, "order_date", "2024-03-01").unwrap();
        assert_eq!(
            date,
            json!({ "range": { "order_date": { "lte": "2024-03-01T00:00:00.000Z" } } })
        );

        let err = build(tokens::LESS_THAN, "total", "soon").unwrap_err();
        assert!(matches!(err, IndexError::InvalidArgument { .. }));
    }

    #[test]
    fn test_between_requires_matching_bound_kinds() {
        let clause = build(tokens::BETWEEN, "total", "5|15").unwrap();
        assert_eq!(clause, json!({ "range": { "total": { "gte": 5.0, "lte": 15.0 } } }));

        assert!(build(tokens::BETWEEN, "total", "5|2024-01-01").is_err());
        assert!(build(tokens::BETWEEN, "total", "5").is_err());
        assert!(build(tokens::BETWEEN, "total", "a|b").is_err());
    }
}
