//! Document type registry.
//!
//! Document types are registered explicitly at startup. The registry maps a
//! fully-qualified type name to a [`TypeDescriptor`] and answers the
//! hierarchy questions the catalog asks when validating `index_as_type`
//! aliases.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{IndexResult, NotFoundError};
use crate::types::FieldKind;

/// A declared field of a document type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name; dotted for object leaves.
    pub name: String,
    /// Storage kind.
    pub kind: FieldKind,
    /// Default label.
    #[serde(default)]
    pub label: Option<String>,
    /// Whether free text should search this field.
    #[serde(default)]
    pub boosted: bool,
}

impl FieldDescriptor {
    /// Creates a field; text fields are boosted by default.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            label: None,
            boosted: kind == FieldKind::Text,
        }
    }

    /// Sets the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the boost flag.
    pub fn boosted(mut self, boosted: bool) -> Self {
        self.boosted = boosted;
        self
    }
}

/// A registered document type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Fully-qualified type name.
    pub name: String,
    /// Direct supertype, if any.
    #[serde(default)]
    pub parent: Option<String>,
    /// Name of the field holding the document id.
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// Index name used when an index is created for this type automatically.
    #[serde(default)]
    pub index_name: Option<String>,
    /// Store documents of this type in the index of the named supertype.
    #[serde(default)]
    pub index_as_type: Option<String>,
    /// Declared fields, excluding inherited ones.
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

fn default_id_field() -> String {
    "id".to_string()
}

impl TypeDescriptor {
    /// Creates a descriptor with no parent and no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            id_field: default_id_field(),
            index_name: None,
            index_as_type: None,
            fields: Vec::new(),
        }
    }

    /// Sets the direct supertype.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Sets the id field name.
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    /// Sets the default index name.
    pub fn with_index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    /// Stores documents of this type in the index of `target`.
    pub fn with_index_as_type(mut self, target: impl Into<String>) -> Self {
        self.index_as_type = Some(target.into());
        self
    }

    /// Adds a field.
    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// The index name to use when none is given: the declared one, or the
    /// last segment of the type name.
    pub fn default_index_name(&self) -> String {
        self.index_name.clone().unwrap_or_else(|| {
            self.name
                .rsplit(['.', ':'])
                .next()
                .unwrap_or(&self.name)
                .to_string()
        })
    }
}

/// Process-wide map of document types.
///
/// Cheap to share behind an `Arc`; registration takes `&self`.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<TypeDescriptor>>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type. Returns false, leaving the existing entry in place,
    /// if the name is already registered.
    pub fn register(&self, descriptor: TypeDescriptor) -> bool {
        let mut types = self.types.write();
        if types.contains_key(&descriptor.name) {
            tracing::debug!(type_name = %descriptor.name, "Type already registered");
            return false;
        }
        tracing::debug!(type_name = %descriptor.name, parent = ?descriptor.parent, "Registered document type");
        types.insert(descriptor.name.clone(), Arc::new(descriptor));
        true
    }

    /// Returns true if the type is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }

    /// Looks up a type, failing with [`NotFoundError::DocumentType`].
    pub fn get(&self, name: &str) -> IndexResult<Arc<TypeDescriptor>> {
        self.lookup(name).ok_or_else(|| {
            NotFoundError::DocumentType {
                type_name: name.to_string(),
            }
            .into()
        })
    }

    /// Looks up a type.
    pub fn lookup(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.read().get(name).cloned()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }

    /// Supertypes of `name`, nearest first. Stops at unregistered parents
    /// and at cycles.
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let types = self.types.read();
        let mut chain = Vec::new();
        let mut seen = HashSet::from([name.to_string()]);
        let mut current = types.get(name).and_then(|t| t.parent.clone());
        while let Some(parent) = current {
            if !seen.insert(parent.clone()) {
                break;
            }
            current = types.get(&parent).and_then(|t| t.parent.clone());
            chain.push(parent);
        }
        chain
    }

    /// Returns true if `child` is a strict subtype of `parent`.
    pub fn is_subtype_of(&self, child: &str, parent: &str) -> bool {
        child != parent && self.ancestors(child).iter().any(|a| a == parent)
    }

    /// `name` followed by every registered type that descends from it.
    pub fn type_and_subtypes(&self, name: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .types
            .read()
            .keys()
            .filter(|candidate| candidate.as_str() != name)
            .cloned()
            .collect();
        names.retain(|candidate| self.is_subtype_of(candidate, name));
        names.sort();
        names.insert(0, name.to_string());
        names
    }

    /// All fields of a type including inherited ones. Ancestor fields come
    /// first; a redeclared field replaces the inherited one in place.
    pub fn fields_of(&self, name: &str) -> IndexResult<Vec<FieldDescriptor>> {
        let descriptor = self.get(name)?;
        let mut lineage: Vec<Arc<TypeDescriptor>> = self
            .ancestors(name)
            .iter()
            .rev()
            .filter_map(|ancestor| self.lookup(ancestor))
            .collect();
        lineage.push(descriptor);

        let mut fields: Vec<FieldDescriptor> = Vec::new();
        for field in lineage.iter().flat_map(|t| t.fields.iter()) {
            match fields.iter_mut().find(|f| f.name == field.name) {
                Some(existing) => *existing = field.clone(),
                None => fields.push(field.clone()),
            }
        }
        Ok(fields)
    }
}
