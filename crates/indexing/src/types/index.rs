//! Index catalog entries.
//!
//! An [`Index`] is the catalog's typed description of either a physical index
//! on the search cluster or an `index_as_type` alias that stores its documents
//! in another type's physical index.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The storage kind of a document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Analyzed full text with an exact-value `keyword` subfield.
    #[default]
    Text,
    /// Exact-value string.
    Keyword,
    /// Whole number.
    Integer,
    /// Floating point number.
    Float,
    /// Date or date-time.
    Date,
    /// Boolean.
    Boolean,
    /// Structured object; its leaves are declared as dotted field names.
    Object,
}

impl FieldKind {
    /// Returns true for kinds that numeric metric aggregations accept.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::Float)
    }

    /// Returns true when sorting or bucketing must target the `keyword` subfield.
    pub fn needs_keyword_subfield(&self) -> bool {
        *self == FieldKind::Text
    }
}

/// Field metadata kept on a catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexField {
    /// Field name (dotted for object leaves, e.g. `products.product_name`).
    pub name: String,
    /// Human-readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Storage kind.
    #[serde(default)]
    pub kind: FieldKind,
    /// Whether free-text queries should search this field.
    #[serde(default)]
    pub is_boosted: bool,
    /// Whether this field can be bucketed or aggregated.
    #[serde(default)]
    pub is_aggregatable: bool,
}

impl IndexField {
    /// Creates field metadata with defaults derived from the kind.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            label: None,
            kind,
            is_boosted: kind == FieldKind::Text,
            is_aggregatable: kind != FieldKind::Object,
        }
    }

    /// Sets the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the boost flag.
    pub fn with_boost(mut self, boosted: bool) -> Self {
        self.is_boosted = boosted;
        self
    }

    /// Sets the aggregatable flag.
    pub fn with_aggregatable(mut self, aggregatable: bool) -> Self {
        self.is_aggregatable = aggregatable;
        self
    }
}

/// A catalog entry describing a physical index or an `index_as_type` alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    /// Scope-prefixed, lower-case index name.
    pub name: String,

    /// Fully-qualified name of the owning document type.
    pub document_type: String,

    /// When set, documents of this index live in the physical index of the
    /// named type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_as_type: Option<String>,

    /// Ordered field metadata, unique by name.
    #[serde(default)]
    pub fields: Vec<IndexField>,

    /// Deprecated indices stay queryable but attach a message to results.
    #[serde(default)]
    pub is_deprecated: bool,

    /// Message shown for deprecated indices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation_message: Option<String>,

    /// Hidden indices are skipped by type-based resolution.
    #[serde(default)]
    pub is_hidden: bool,

    /// Whether untyped queries include this index.
    #[serde(default = "default_true")]
    pub return_in_global_search: bool,

    /// Whether document commits wait for the index to refresh.
    #[serde(default)]
    pub force_refresh_on_document_commit: bool,

    /// Free-form metadata.
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl Index {
    /// Creates a visible, non-deprecated entry with no field metadata.
    pub fn new(name: impl Into<String>, document_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            document_type: document_type.into(),
            index_as_type: None,
            fields: Vec::new(),
            is_deprecated: false,
            deprecation_message: None,
            is_hidden: false,
            return_in_global_search: true,
            force_refresh_on_document_commit: false,
            meta: BTreeMap::new(),
        }
    }

    /// Returns true when this entry has no physical index of its own.
    pub fn is_alias(&self) -> bool {
        self.index_as_type.is_some()
    }

    /// Returns true when type-based resolution may pick this index.
    pub fn is_type_resolvable(&self) -> bool {
        !self.is_hidden && !self.is_deprecated
    }

    /// Looks up field metadata by name.
    pub fn field(&self, name: &str) -> Option<&IndexField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Inserts or replaces field metadata, keeping the original position on replace.
    pub fn upsert_field(&mut self, field: IndexField) {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// Names of the fields flagged for free-text boosting.
    pub fn boosted_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.is_boosted)
            .map(|f| f.name.as_str())
    }

    /// The human-readable deprecation notice, if this index is deprecated.
    pub fn deprecation_notice(&self) -> Option<String> {
        if !self.is_deprecated {
            return None;
        }
        Some(match self.deprecation_message.as_deref() {
            Some(message) if !message.trim().is_empty() => {
                format!("Index '{}' is deprecated: {}", self.name, message.trim())
            }
            _ => format!("Index '{}' is deprecated", self.name),
        })
    }
}

/// Request to create a catalog entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Requested name; normalized to lower-case and scope-prefixed on create.
    pub name: String,
    /// Fully-qualified document type name; must be registered.
    pub document_type: String,
    /// Store documents in the physical index of this (super)type.
    #[serde(default)]
    pub index_as_type: Option<String>,
    /// Field metadata overriding what is derived from the type.
    #[serde(default)]
    pub fields: Vec<IndexField>,
    /// Hide from type-based resolution.
    #[serde(default)]
    pub is_hidden: bool,
    /// Exclude from untyped queries when `Some(false)`.
    #[serde(default)]
    pub return_in_global_search: Option<bool>,
    /// Wait for refresh on every commit.
    #[serde(default)]
    pub force_refresh_on_document_commit: bool,
    /// Free-form metadata.
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl IndexConfig {
    /// Creates a config for the given name and document type.
    pub fn new(name: impl Into<String>, document_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            document_type: document_type.into(),
            ..Default::default()
        }
    }

    /// Stores documents in the physical index of `target_type`.
    pub fn with_index_as_type(mut self, target_type: impl Into<String>) -> Self {
        self.index_as_type = Some(target_type.into());
        self
    }

    /// Adds a field metadata override.
    pub fn with_field(mut self, field: IndexField) -> Self {
        self.fields.push(field);
        self
    }

    /// Sets the hidden flag.
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.is_hidden = hidden;
        self
    }

    /// Sets global-search visibility.
    pub fn with_global_search(mut self, visible: bool) -> Self {
        self.return_in_global_search = Some(visible);
        self
    }

    /// Sets the force-refresh flag.
    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh_on_document_commit = force;
        self
    }

    /// Adds a metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_serializes_camel_case() {
        let mut index = Index::new("acme_orders", "acme.sales.Order");
        index.index_as_type = Some("acme.sales.Document".to_string());
        index.upsert_field(IndexField::new("customer_name", FieldKind::Text).with_label("Customer"));

        let json = serde_json::to_value(&index).unwrap();
        assert_eq!(json["documentType"], "acme.sales.Order");
        assert_eq!(json["indexAsType"], "acme.sales.Document");
        assert_eq!(json["fields"][0]["label"], "Customer");
        assert_eq!(json["returnInGlobalSearch"], true);

        let back: Index = serde_json::from_value(json).unwrap();
        assert_eq!(back, index);
    }

    #[test]
    fn test_missing_flags_default() {
        let index: Index =
            serde_json::from_str(r#"{ "name": "acme_orders", "documentType": "Order" }"#).unwrap();
        assert!(index.return_in_global_search);
        assert!(!index.is_hidden);
        assert!(index.fields.is_empty());
        assert!(!index.is_alias());
    }

    #[test]
    fn test_upsert_field_keeps_position() {
        let mut index = Index::new("acme_orders", "Order");
        index.upsert_field(IndexField::new("a", FieldKind::Text));
        index.upsert_field(IndexField::new("b", FieldKind::Integer));
        index.upsert_field(IndexField::new("a", FieldKind::Keyword));

        let names: Vec<_> = index.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(index.field("a").unwrap().kind, FieldKind::Keyword);
    }

    #[test]
    fn test_boosted_fields_default_to_text() {
        let mut index = Index::new("acme_orders", "Order");
        index.upsert_field(IndexField::new("name", FieldKind::Text));
        index.upsert_field(IndexField::new("total", FieldKind::Float));
        assert_eq!(index.boosted_fields().collect::<Vec<_>>(), vec!["name"]);
    }

    #[test]
    fn test_deprecation_notice() {
        let mut index = Index::new("acme_orders", "Order");
        assert!(index.deprecation_notice().is_none());

        index.is_deprecated = true;
        assert_eq!(
            index.deprecation_notice().unwrap(),
            "Index 'acme_orders' is deprecated"
        );

        index.deprecation_message = Some("use acme_orders_v2".to_string());
        assert!(index.deprecation_notice().unwrap().ends_with("use acme_orders_v2"));
        assert!(!index.is_type_resolvable());
    }
}
