//! Query DSL compilation and evaluation.
//!
//! A query body is compiled once per index against that index's mapping.
//! Compilation is where malformed clauses and values that do not fit the
//! mapped field type are rejected, so a bad query fails even when no document
//! would have reached the offending clause.

use std::collections::HashSet;
use std::mem::discriminant;

use serde_json::{Map, Value};

use crate::core::backend::wildcard_regex;

use super::analysis::{scalar_text, tokenize};
use super::store::{FieldType, MemoryIndex, ResolvedField, Scalar, StoredDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextMode {
    Match,
    Phrase,
    PhrasePrefix,
}

impl TextMode {
    fn name(&self) -> &'static str {
        match self {
            TextMode::Match => "match",
            TextMode::Phrase => "match_phrase",
            TextMode::PhrasePrefix => "match_phrase_prefix",
        }
    }
}

#[derive(Debug, Clone)]
enum Predicate {
    /// At least one query token occurs among the field's tokens.
    AnyToken(Vec<String>),
    /// Every query token occurs among the field's tokens.
    AllTokens(Vec<String>),
    /// Tokens occur contiguously within one value; the last may be a prefix.
    Phrase { tokens: Vec<String>, prefix: bool },
    /// One of the values equals the given scalar.
    Equals(Vec<Scalar>),
    /// A keyword value starts with the given text.
    Prefix(String),
    /// A value lies inside the bounds. The flag marks an inclusive bound.
    Range {
        lower: Option<(Scalar, bool)>,
        upper: Option<(Scalar, bool)>,
    },
}

/// A query bound to one index's mapping.
#[derive(Debug, Clone)]
pub(super) enum Compiled {
    All,
    Nothing,
    Ids(HashSet<String>),
    Exists(String),
    Field {
        field: ResolvedField,
        predicate: Predicate,
    },
    /// Best-scoring alternative (multi_match).
    Any(Vec<Compiled>),
    Bool {
        must: Vec<Compiled>,
        filter: Vec<Compiled>,
        should: Vec<Compiled>,
        must_not: Vec<Compiled>,
        minimum_should_match: usize,
    },
}

/// Compiles a query clause against `index`'s mapping.
pub(super) fn compile(query: &Value, index: &MemoryIndex) -> Result<Compiled, String> {
    let (kind, body) = single_entry(query, "query")?;
    match kind {
        "match_all" => Ok(Compiled::All),
        "match_none" => Ok(Compiled::Nothing),
        "bool" => compile_bool(body, index),
        "match" => compile_match(body, index, TextMode::Match),
        "match_phrase" => compile_match(body, index, TextMode::Phrase),
        "match_phrase_prefix" => compile_match(body, index, TextMode::PhrasePrefix),
        "multi_match" => compile_multi_match(body, index),
        "term" => compile_term(body, index),
        "terms" => compile_terms(body, index),
        "ids" => compile_ids(body),
        "range" => compile_range(body, index),
        "exists" => {
            let field = body
                .get("field")
                .and_then(Value::as_str)
                .ok_or("[exists] must be provided with a [field]")?;
            Ok(match index.resolve(field) {
                Some(resolved) => Compiled::Exists(resolved.path),
                None => Compiled::Nothing,
            })
        }
        other => Err(format!("unknown query [{}]", other)),
    }
}

fn single_entry<'a>(value: &'a Value, context: &str) -> Result<(&'a str, &'a Value), String> {
    let object = value
        .as_object()
        .ok_or_else(|| format!("[{}] malformed, expected an object", context))?;
    let mut entries = object
        .iter()
        .filter(|(key, _)| key.as_str() != "boost" && key.as_str() != "_name");
    let (key, inner) = entries
        .next()
        .ok_or_else(|| format!("[{}] malformed, no field specified", context))?;
    if let Some((other, _)) = entries.next() {
        return Err(format!(
            "[{}] query doesn't support multiple fields, found [{}] and [{}]",
            context, key, other
        ));
    }
    Ok((key.as_str(), inner))
}

fn clauses<'a>(body: &'a Value, key: &str) -> Vec<&'a Value> {
    match body.get(key) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Object(_)) => body.get(key).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn compile_all(items: Vec<&Value>, index: &MemoryIndex) -> Result<Vec<Compiled>, String> {
    items.into_iter().map(|q| compile(q, index)).collect()
}

fn compile_bool(body: &Value, index: &MemoryIndex) -> Result<Compiled, String> {
    if !body.is_object() {
        return Err("[bool] malformed, expected an object".to_string());
    }
    let must = compile_all(clauses(body, "must"), index)?;
    let filter = compile_all(clauses(body, "filter"), index)?;
    let should = compile_all(clauses(body, "should"), index)?;
    let must_not = compile_all(clauses(body, "must_not"), index)?;

    let minimum_should_match = match body.get("minimum_should_match") {
        Some(value) => parse_minimum_should_match(value, should.len())?,
        // With no scoring clause present, at least one should clause must match.
        None if must.is_empty() && filter.is_empty() && !should.is_empty() => 1,
        None => 0,
    };

    Ok(Compiled::Bool {
        must,
        filter,
        should,
        must_not,
        minimum_should_match,
    })
}

fn parse_minimum_should_match(value: &Value, should_count: usize) -> Result<usize, String> {
    let raw = scalar_text(value).unwrap_or_default();
    let raw = raw.trim();
    let parsed = match raw.strip_suffix('%') {
        Some(percent) => percent
            .parse::<f64>()
            .map(|p| ((should_count as f64) * p / 100.0).floor() as i64),
        None => raw.parse::<f64>().map(|n| n as i64),
    }
    .map_err(|_| format!("failed to parse [minimum_should_match] value [{}]", raw))?;
    // Negative values mean "all but n".
    let resolved = if parsed < 0 {
        (should_count as i64 + parsed).max(0)
    } else {
        parsed
    };
    Ok(resolved as usize)
}

fn compile_match(body: &Value, index: &MemoryIndex, mode: TextMode) -> Result<Compiled, String> {
    let (field, params) = single_entry(body, mode.name())?;
    let (query, operator_and, lenient) = match params {
        Value::Object(options) => (
            options
                .get("query")
                .ok_or_else(|| format!("[{}] requires query value", mode.name()))?,
            is_and_operator(options),
            options.get("lenient").and_then(Value::as_bool).unwrap_or(false),
        ),
        other => (other, false, false),
    };
    compile_text(index, field, query, mode, operator_and, lenient)
}

fn is_and_operator(options: &Map<String, Value>) -> bool {
    options
        .get("operator")
        .and_then(Value::as_str)
        .is_some_and(|op| op.eq_ignore_ascii_case("and"))
}

fn compile_text(
    index: &MemoryIndex,
    field: &str,
    query: &Value,
    mode: TextMode,
    operator_and: bool,
    lenient: bool,
) -> Result<Compiled, String> {
    let Some(resolved) = index.resolve(field) else {
        return Ok(Compiled::Nothing);
    };
    let text = scalar_text(query)
        .ok_or_else(|| format!("[{}] unknown token [{}] after [query]", mode.name(), query))?;

    let predicate = match resolved.ty {
        FieldType::Text => {
            let tokens = tokenize(&text);
            if tokens.is_empty() {
                return Ok(Compiled::Nothing);
            }
            match mode {
                TextMode::Match if operator_and => Predicate::AllTokens(tokens),
                TextMode::Match => Predicate::AnyToken(tokens),
                TextMode::Phrase => Predicate::Phrase {
                    tokens,
                    prefix: false,
                },
                TextMode::PhrasePrefix => Predicate::Phrase {
                    tokens,
                    prefix: true,
                },
            }
        }
        FieldType::Keyword => match mode {
            TextMode::PhrasePrefix => Predicate::Prefix(text),
            _ => Predicate::Equals(vec![Scalar::Str(text)]),
        },
        FieldType::Object => return Ok(Compiled::Nothing),
        ty => {
            if mode == TextMode::PhrasePrefix {
                if lenient {
                    return Ok(Compiled::Nothing);
                }
                return Err(format!(
                    "can only use phrase prefix queries on text fields - not on [{}] which is of type [{}]",
                    field,
                    ty.name()
                ));
            }
            match Scalar::parse(query, ty) {
                Some(value) => Predicate::Equals(vec![value]),
                None if lenient => return Ok(Compiled::Nothing),
                None => return Err(parse_failure(field, ty, &text)),
            }
        }
    };

    Ok(Compiled::Field {
        field: resolved,
        predicate,
    })
}

fn parse_failure(field: &str, ty: FieldType, value: &str) -> String {
    format!(
        "failed to create query: failed to parse value [{}] for field [{}] of type [{}]",
        value,
        field,
        ty.name()
    )
}

fn compile_multi_match(body: &Value, index: &MemoryIndex) -> Result<Compiled, String> {
    let query = body
        .get("query")
        .ok_or("[multi_match] requires query value")?;
    let mode = match body.get("type").and_then(Value::as_str).unwrap_or("best_fields") {
        "best_fields" | "most_fields" | "cross_fields" => TextMode::Match,
        "phrase" => TextMode::Phrase,
        "phrase_prefix" | "bool_prefix" => TextMode::PhrasePrefix,
        other => return Err(format!("[multi_match] query does not support type [{}]", other)),
    };
    let lenient = body.get("lenient").and_then(Value::as_bool).unwrap_or(false);
    let operator_and = body
        .as_object()
        .map(is_and_operator)
        .unwrap_or(false);

    let patterns: Vec<String> = match body.get("fields") {
        Some(Value::Array(fields)) => fields.iter().filter_map(scalar_text).collect(),
        Some(Value::String(field)) => vec![field.clone()],
        _ => vec!["*".to_string()],
    };

    let mut options = Vec::new();
    for pattern in patterns {
        let name = pattern.split('^').next().unwrap_or_default();
        if name.contains('*') {
            let re = wildcard_regex(name).map_err(|e| e.to_string())?;
            for (leaf, ty) in index.leaf_fields() {
                if ty != FieldType::Object && re.is_match(&leaf) {
                    // Wildcard expansion is always lenient.
                    options.push(compile_text(index, &leaf, query, mode, operator_and, true)?);
                }
            }
        } else {
            options.push(compile_text(index, name, query, mode, operator_and, lenient)?);
        }
    }
    Ok(Compiled::Any(options))
}

fn term_value(body: &Value) -> &Value {
    match body {
        Value::Object(options) => options.get("value").unwrap_or(body),
        other => other,
    }
}

fn compile_term(body: &Value, index: &MemoryIndex) -> Result<Compiled, String> {
    let (field, params) = single_entry(body, "term")?;
    let value = term_value(params);
    let Some(resolved) = index.resolve(field) else {
        return Ok(Compiled::Nothing);
    };
    let predicate = exact_predicate(field, &resolved, std::slice::from_ref(value))?;
    Ok(match predicate {
        Some(predicate) => Compiled::Field {
            field: resolved,
            predicate,
        },
        None => Compiled::Nothing,
    })
}

fn compile_terms(body: &Value, index: &MemoryIndex) -> Result<Compiled, String> {
    let (field, values) = single_entry(body, "terms")?;
    let values = values
        .as_array()
        .ok_or_else(|| format!("[terms] query does not support [{}]", field))?;
    let Some(resolved) = index.resolve(field) else {
        return Ok(Compiled::Nothing);
    };
    let predicate = exact_predicate(field, &resolved, values)?;
    Ok(match predicate {
        Some(predicate) => Compiled::Field {
            field: resolved,
            predicate,
        },
        None => Compiled::Nothing,
    })
}

/// Unanalyzed equality against any of `values`.
fn exact_predicate(
    field: &str,
    resolved: &ResolvedField,
    values: &[Value],
) -> Result<Option<Predicate>, String> {
    match resolved.ty {
        FieldType::Object => Ok(None),
        // Terms on a text field compare against the indexed tokens verbatim.
        FieldType::Text => Ok(Some(Predicate::AnyToken(
            values.iter().filter_map(scalar_text).collect(),
        ))),
        ty => {
            let mut parsed = Vec::with_capacity(values.len());
            for value in values {
                let scalar = Scalar::parse(value, ty).ok_or_else(|| {
                    parse_failure(field, ty, &scalar_text(value).unwrap_or_else(|| value.to_string()))
                })?;
                parsed.push(scalar);
            }
            Ok(Some(Predicate::Equals(parsed)))
        }
    }
}

fn compile_ids(body: &Value) -> Result<Compiled, String> {
    let values = body
        .get("values")
        .and_then(Value::as_array)
        .ok_or("[ids] query requires [values]")?;
    Ok(Compiled::Ids(values.iter().filter_map(scalar_text).collect()))
}

fn compile_range(body: &Value, index: &MemoryIndex) -> Result<Compiled, String> {
    let (field, params) = single_entry(body, "range")?;
    let params = params
        .as_object()
        .ok_or_else(|| format!("[range] query malformed for field [{}]", field))?;
    let Some(resolved) = index.resolve(field) else {
        return Ok(Compiled::Nothing);
    };
    let ty = match resolved.ty {
        FieldType::Object => return Ok(Compiled::Nothing),
        FieldType::Text => FieldType::Keyword,
        ty => ty,
    };

    let bound = |key: &str| -> Result<Option<Scalar>, String> {
        match params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Scalar::parse(value, ty).map(Some).ok_or_else(|| {
                parse_failure(field, resolved.ty, &scalar_text(value).unwrap_or_default())
            }),
        }
    };

    let lower = match (bound("gt")?, bound("gte")?) {
        (Some(v), _) => Some((v, false)),
        (None, Some(v)) => Some((v, true)),
        (None, None) => None,
    };
    let upper = match (bound("lt")?, bound("lte")?) {
        (Some(v), _) => Some((v, false)),
        (None, Some(v)) => Some((v, true)),
        (None, None) => None,
    };

    Ok(Compiled::Field {
        field: resolved,
        predicate: Predicate::Range { lower, upper },
    })
}

impl Compiled {
    /// Scores a document, or returns `None` when it does not match.
    pub(super) fn score(&self, doc: &StoredDocument) -> Option<f64> {
        match self {
            Compiled::All => Some(1.0),
            Compiled::Nothing => None,
            Compiled::Ids(ids) => ids.contains(&doc.id).then_some(1.0),
            Compiled::Exists(path) => (!doc.values_at(path).is_empty()).then_some(1.0),
            Compiled::Field { field, predicate } => predicate.score(field, doc),
            Compiled::Any(options) => options
                .iter()
                .filter_map(|option| option.score(doc))
                .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s)))),
            Compiled::Bool {
                must,
                filter,
                should,
                must_not,
                minimum_should_match,
            } => {
                let mut score = 0.0;
                for clause in must {
                    score += clause.score(doc)?;
                }
                if filter.iter().any(|clause| clause.score(doc).is_none()) {
                    return None;
                }
                if must_not.iter().any(|clause| clause.score(doc).is_some()) {
                    return None;
                }
                let mut matched = 0;
                for clause in should {
                    if let Some(s) = clause.score(doc) {
                        matched += 1;
                        score += s;
                    }
                }
                (matched >= *minimum_should_match).then_some(score)
            }
        }
    }
}

impl Predicate {
    fn score(&self, field: &ResolvedField, doc: &StoredDocument) -> Option<f64> {
        match self {
            Predicate::AnyToken(tokens) => {
                let indexed: HashSet<String> = doc.token_lists(&field.path).into_iter().flatten().collect();
                let hits = tokens.iter().filter(|t| indexed.contains(*t)).count();
                (hits > 0).then_some(hits as f64)
            }
            Predicate::AllTokens(tokens) => {
                let indexed: HashSet<String> = doc.token_lists(&field.path).into_iter().flatten().collect();
                tokens
                    .iter()
                    .all(|t| indexed.contains(t))
                    .then_some(tokens.len() as f64)
            }
            Predicate::Phrase { tokens, prefix } => doc
                .token_lists(&field.path)
                .iter()
                .any(|value| contains_phrase(value, tokens, *prefix))
                .then_some(tokens.len() as f64),
            Predicate::Equals(expected) => doc
                .scalars(field)
                .iter()
                .any(|value| expected.iter().any(|e| same(value, e)))
                .then_some(1.0),
            Predicate::Prefix(prefix) => doc
                .scalars(field)
                .iter()
                .any(|value| matches!(value, Scalar::Str(s) if s.starts_with(prefix.as_str())))
                .then_some(1.0),
            Predicate::Range { lower, upper } => {
                let candidates: Vec<Scalar> = if field.ty == FieldType::Text {
                    doc.token_lists(&field.path)
                        .into_iter()
                        .flatten()
                        .map(Scalar::Str)
                        .collect()
                } else {
                    doc.scalars(field)
                };
                candidates
                    .iter()
                    .any(|value| within(value, lower.as_ref(), upper.as_ref()))
                    .then_some(1.0)
            }
        }
    }
}

fn same(a: &Scalar, b: &Scalar) -> bool {
    discriminant(a) == discriminant(b) && a.compare(b) == std::cmp::Ordering::Equal
}

fn within(value: &Scalar, lower: Option<&(Scalar, bool)>, upper: Option<&(Scalar, bool)>) -> bool {
    use std::cmp::Ordering;
    let lower_ok = lower.is_none_or(|(bound, inclusive)| match value.compare(bound) {
        Ordering::Greater => true,
        Ordering::Equal => *inclusive,
        Ordering::Less => false,
    });
    let upper_ok = upper.is_none_or(|(bound, inclusive)| match value.compare(bound) {
        Ordering::Less => true,
        Ordering::Equal => *inclusive,
        Ordering::Greater => false,
    });
    lower_ok && upper_ok
}

fn contains_phrase(value: &[String], tokens: &[String], prefix: bool) -> bool {
    let n = tokens.len();
    if n == 0 || value.len() < n {
        return false;
    }
    value.windows(n).any(|window| {
        window[..n - 1] == tokens[..n - 1]
            && if prefix {
                window[n - 1].starts_with(tokens[n - 1].as_str())
            } else {
                window[n - 1] == tokens[n - 1]
            }
    })
}
