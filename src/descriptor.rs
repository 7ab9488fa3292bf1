//! Resource descriptors: declarative per-kind serialization metadata.
//!
//! A descriptor never holds a "current record". Every operation takes the
//! record explicitly, so one descriptor can serve many records and clones are
//! cheap (closures are reference counted).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EncodeError;
use crate::record::{Record, RecordKind, RelationHandle};

/// Custom attribute accessor.
pub type Accessor = Arc<dyn Fn(&dyn Record) -> Value + Send + Sync>;

/// Per-record resource meta provider.
pub type MetaProvider = Arc<dyn Fn(&dyn Record) -> Map<String, Value> + Send + Sync>;

/// Which include keys get `{type, id}` reference data when not fully included.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "ReferencePolicyRepr", into = "ReferencePolicyRepr")]
pub enum ReferencePolicy {
    All,
    #[default]
    None,
    Only(Vec<String>),
    Except(Vec<String>),
}

impl ReferencePolicy {
    pub fn applies_to(&self, key: &str) -> bool {
        match self {
            ReferencePolicy::All => true,
            ReferencePolicy::None => false,
            ReferencePolicy::Only(keys) => keys.iter().any(|k| k == key),
            ReferencePolicy::Except(keys) => !keys.iter().any(|k| k == key),
        }
    }
}

/// Wire form: `true`, `false`, `{"only": [...]}` or `{"except": [...]}`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ReferencePolicyRepr {
    Flag(bool),
    Only { only: Vec<String> },
    Except { except: Vec<String> },
}

impl From<ReferencePolicyRepr> for ReferencePolicy {
    fn from(repr: ReferencePolicyRepr) -> Self {
        match repr {
            ReferencePolicyRepr::Flag(true) => ReferencePolicy::All,
            ReferencePolicyRepr::Flag(false) => ReferencePolicy::None,
            ReferencePolicyRepr::Only { only } => ReferencePolicy::Only(only),
            ReferencePolicyRepr::Except { except } => ReferencePolicy::Except(except),
        }
    }
}

impl From<ReferencePolicy> for ReferencePolicyRepr {
    fn from(policy: ReferencePolicy) -> Self {
        match policy {
            ReferencePolicy::All => ReferencePolicyRepr::Flag(true),
            ReferencePolicy::None => ReferencePolicyRepr::Flag(false),
            ReferencePolicy::Only(only) => ReferencePolicyRepr::Only { only },
            ReferencePolicy::Except(except) => ReferencePolicyRepr::Except { except },
        }
    }
}

/// Facts about one relationship of one record, computed per serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub key: String,
    pub singular: bool,
    /// Polymorphic: the related kind varies per instance.
    pub variable: bool,
    /// Declared related kind; `None` when variable.
    pub related_kind: Option<RecordKind>,
}

/// Serialization metadata for one record kind.
#[derive(Clone)]
pub struct ResourceDescriptor {
    kind: RecordKind,
    resource_type: Option<String>,
    id_attribute: Option<String>,
    attributes: Vec<String>,
    includes: IndexMap<String, String>,
    default_includes: Vec<String>,
    reference_policy: ReferencePolicy,
    filters: Vec<String>,
    default_filters: Map<String, Value>,
    sort_attributes: Vec<String>,
    default_sort: Vec<String>,
    attribute_defaults: Map<String, Value>,
    dates: Vec<String>,
    accessors: HashMap<String, Accessor>,
    meta: Option<MetaProvider>,
}

impl ResourceDescriptor {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            resource_type: None,
            id_attribute: None,
            attributes: Vec::new(),
            includes: IndexMap::new(),
            default_includes: Vec::new(),
            reference_policy: ReferencePolicy::None,
            filters: Vec::new(),
            default_filters: Map::new(),
            sort_attributes: Vec::new(),
            default_sort: Vec::new(),
            attribute_defaults: Map::new(),
            dates: Vec::new(),
            accessors: HashMap::new(),
            meta: None,
        }
    }

    /// Pin the resource type instead of deriving it from the kind.
    pub fn with_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    /// Read the id from this attribute instead of the primary key.
    pub fn id_attribute(mut self, name: impl Into<String>) -> Self {
        self.id_attribute = Some(name.into());
        self
    }

    pub fn attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = names.into_iter().map(Into::into).collect();
        self
    }

    /// Expose an include whose relation accessor has the same name.
    pub fn include(self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.include_as(key.clone(), key)
    }

    /// Expose an include backed by a differently named relation accessor.
    pub fn include_as(mut self, key: impl Into<String>, relation: impl Into<String>) -> Self {
        self.includes.insert(key.into(), relation.into());
        self
    }

    pub fn default_includes<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_includes = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn reference_policy(mut self, policy: ReferencePolicy) -> Self {
        self.reference_policy = policy;
        self
    }

    pub fn filters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_filters(mut self, filters: Map<String, Value>) -> Self {
        self.default_filters = filters;
        self
    }

    pub fn sort_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort_attributes = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_sort<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_sort = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Value substituted when an attribute resolves to null.
    pub fn attribute_default(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attribute_defaults.insert(name.into(), value);
        self
    }

    /// Attributes reformatted with the configured datetime format.
    pub fn dates<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dates = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn accessor<F>(mut self, name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&dyn Record) -> Value + Send + Sync + 'static,
    {
        self.accessors.insert(name.into(), Arc::new(accessor));
        self
    }

    pub fn meta<F>(mut self, provider: F) -> Self
    where
        F: Fn(&dyn Record) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.meta = Some(Arc::new(provider));
        self
    }

    // --- Accessors ---

    pub fn kind(&self) -> &RecordKind {
        &self.kind
    }

    pub fn type_override(&self) -> Option<&str> {
        self.resource_type.as_deref()
    }

    pub fn available_attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn available_includes(&self) -> &IndexMap<String, String> {
        &self.includes
    }

    pub fn default_include_keys(&self) -> &[String] {
        &self.default_includes
    }

    pub fn references(&self) -> &ReferencePolicy {
        &self.reference_policy
    }

    pub fn available_filters(&self) -> &[String] {
        &self.filters
    }

    pub fn default_filter_values(&self) -> &Map<String, Value> {
        &self.default_filters
    }

    pub fn available_sort_attributes(&self) -> &[String] {
        &self.sort_attributes
    }

    pub fn default_sort_fields(&self) -> &[String] {
        &self.default_sort
    }

    pub fn is_date(&self, name: &str) -> bool {
        self.dates.iter().any(|d| d == name)
    }

    pub fn has_include(&self, key: &str) -> bool {
        self.includes.contains_key(key)
    }

    pub fn is_default_include(&self, key: &str) -> bool {
        self.default_includes.iter().any(|k| k == key)
    }

    pub fn allows_filter(&self, name: &str) -> bool {
        self.filters.iter().any(|f| f == name)
    }

    pub fn allows_sort(&self, name: &str) -> bool {
        self.sort_attributes.iter().any(|s| s == name)
    }

    // --- Per-record operations ---

    /// Resource id for `record`.
    pub fn id(&self, record: &dyn Record) -> String {
        match &self.id_attribute {
            Some(name) => match record.attribute(name) {
                Some(Value::String(s)) => s,
                Some(Value::Null) | None => record.primary_key(),
                Some(other) => other.to_string(),
            },
            None => record.primary_key(),
        }
    }

    /// Attribute value: custom accessor, else raw field, else configured default.
    pub fn attribute_value(&self, record: &dyn Record, name: &str) -> Value {
        let value = match self.accessors.get(name) {
            Some(accessor) => accessor(record),
            None => record.attribute(name).unwrap_or(Value::Null),
        };
        if value.is_null() {
            self.attribute_defaults
                .get(name)
                .cloned()
                .unwrap_or(Value::Null)
        } else {
            value
        }
    }

    /// Resource-level meta for `record` (empty when none is configured).
    pub fn resource_meta(&self, record: &dyn Record) -> Map<String, Value> {
        match &self.meta {
            Some(provider) => provider(record),
            None => Map::new(),
        }
    }

    /// Check that every default include is an available include.
    pub fn check_default_includes(&self, resource_type: &str) -> Result<(), EncodeError> {
        match self.default_includes.iter().find(|k| !self.has_include(k)) {
            Some(key) => Err(EncodeError::InvalidIncludeKey {
                key: key.clone(),
                resource_type: resource_type.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Inspect the relation behind include `key` on `record`.
    ///
    /// # Errors
    ///
    /// `UnknownRelation` if the record lacks the relation accessor,
    /// `UnresolvableRelatedKind` if a non-polymorphic relation declares no kind.
    pub fn relation(
        &self,
        record: &dyn Record,
        key: &str,
    ) -> Result<(RelationDescriptor, RelationHandle), EncodeError> {
        let relation_name = self.includes.get(key).map(String::as_str).unwrap_or(key);
        let handle = record
            .relation(relation_name)
            .ok_or_else(|| EncodeError::UnknownRelation {
                kind: record.kind().to_string(),
                relation: relation_name.to_string(),
            })?;

        let variable = handle.is_polymorphic();
        let related_kind = if variable {
            None
        } else {
            Some(handle.declared_kind().cloned().ok_or_else(|| {
                EncodeError::UnresolvableRelatedKind {
                    kind: record.kind().to_string(),
                    relation: relation_name.to_string(),
                }
            })?)
        };

        let descriptor = RelationDescriptor {
            key: key.to_string(),
            singular: handle.is_singular(),
            variable,
            related_kind,
        };
        Ok((descriptor, handle))
    }
}

impl fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("kind", &self.kind)
            .field("resource_type", &self.resource_type)
            .field("attributes", &self.attributes)
            .field("includes", &self.includes)
            .field("default_includes", &self.default_includes)
            .field("reference_policy", &self.reference_policy)
            .finish_non_exhaustive()
    }
}

/// Include declaration in a definition file: a list of keys or a key → relation map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IncludeDeclaration {
    Keys(Vec<String>),
    Mapped(IndexMap<String, String>),
}

impl Default for IncludeDeclaration {
    fn default() -> Self {
        IncludeDeclaration::Keys(Vec::new())
    }
}

/// Serde form of a [`ResourceDescriptor`], as read from definition files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub kind: String,
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default, rename = "type")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub id_attribute: Option<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub includes: IncludeDeclaration,
    #[serde(default)]
    pub default_includes: Vec<String>,
    #[serde(default)]
    pub references: ReferencePolicy,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub default_filters: Map<String, Value>,
    #[serde(default)]
    pub sort: Vec<String>,
    #[serde(default)]
    pub default_sort: Vec<String>,
    #[serde(default)]
    pub defaults: Map<String, Value>,
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl From<ResourceDefinition> for ResourceDescriptor {
    fn from(def: ResourceDefinition) -> Self {
        let kind = def
            .extends
            .into_iter()
            .fold(RecordKind::new(def.kind), |kind, ancestor| kind.extends(ancestor));

        let mut descriptor = ResourceDescriptor::new(kind)
            .attributes(def.attributes)
            .default_includes(def.default_includes)
            .reference_policy(def.references)
            .filters(def.filters)
            .default_filters(def.default_filters)
            .sort_attributes(def.sort)
            .default_sort(def.default_sort)
            .dates(def.dates);

        descriptor = match def.includes {
            IncludeDeclaration::Keys(keys) => keys.into_iter().fold(descriptor, |d, k| d.include(k)),
            IncludeDeclaration::Mapped(map) => map
                .into_iter()
                .fold(descriptor, |d, (k, rel)| d.include_as(k, rel)),
        };

        if let Some(resource_type) = def.resource_type {
            descriptor = descriptor.with_type(resource_type);
        }
        if let Some(id_attribute) = def.id_attribute {
            descriptor = descriptor.id_attribute(id_attribute);
        }
        for (name, value) in def.defaults {
            descriptor = descriptor.attribute_default(name, value);
        }
        if !def.meta.is_empty() {
            let meta = def.meta;
            descriptor = descriptor.meta(move |_| meta.clone());
        }
        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Model};
    use serde_json::json;

    fn post_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert(
            Model::new("app::Post", "1")
                .attr("title", json!("Hello"))
                .attr("subtitle", Value::Null)
                .attr("slug", json!("hello"))
                .belongs_to("author", "app::User", Some("9"))
                .morph_to("subject", None),
        );
        store
    }

    #[test]
    fn reference_policy_rules() {
        assert!(ReferencePolicy::All.applies_to("author"));
        assert!(!ReferencePolicy::None.applies_to("author"));
        let only = ReferencePolicy::Only(vec!["author".into()]);
        assert!(only.applies_to("author"));
        assert!(!only.applies_to("comments"));
        let except = ReferencePolicy::Except(vec!["author".into()]);
        assert!(!except.applies_to("author"));
        assert!(except.applies_to("comments"));
    }

    #[test]
    fn reference_policy_serde_forms() {
        let policy: ReferencePolicy = serde_json::from_value(json!(true)).unwrap();
        assert_eq!(policy, ReferencePolicy::All);
        let policy: ReferencePolicy = serde_json::from_value(json!({ "only": ["a"] })).unwrap();
        assert_eq!(policy, ReferencePolicy::Only(vec!["a".into()]));
        let policy: ReferencePolicy = serde_json::from_value(json!({ "except": ["b"] })).unwrap();
        assert_eq!(policy, ReferencePolicy::Except(vec!["b".into()]));
        assert_eq!(serde_json::to_value(ReferencePolicy::None).unwrap(), json!(false));
    }

    #[test]
    fn attribute_value_accessor_and_default() {
        let store = post_store();
        let post = store.get("app::Post", "1").unwrap();
        let descriptor = ResourceDescriptor::new(RecordKind::new("app::Post"))
            .attributes(["title", "subtitle", "shout"])
            .attribute_default("subtitle", json!("n/a"))
            .accessor("shout", |r| {
                let title = r.attribute("title").unwrap_or(Value::Null);
                json!(title.as_str().unwrap_or_default().to_uppercase())
            });

        assert_eq!(descriptor.attribute_value(post.as_ref(), "title"), json!("Hello"));
        assert_eq!(descriptor.attribute_value(post.as_ref(), "subtitle"), json!("n/a"));
        assert_eq!(descriptor.attribute_value(post.as_ref(), "shout"), json!("HELLO"));
        assert_eq!(descriptor.attribute_value(post.as_ref(), "missing"), Value::Null);
    }

    #[test]
    fn id_from_attribute() {
        let store = post_store();
        let post = store.get("app::Post", "1").unwrap();
        let descriptor = ResourceDescriptor::new(RecordKind::new("app::Post")).id_attribute("slug");
        assert_eq!(descriptor.id(post.as_ref()), "hello");
    }

    #[test]
    fn relation_descriptor_for_singular() {
        let store = post_store();
        let post = store.get("app::Post", "1").unwrap();
        let descriptor = ResourceDescriptor::new(RecordKind::new("app::Post"))
            .include_as("writer", "author")
            .include("subject");

        let (rel, handle) = descriptor.relation(post.as_ref(), "writer").unwrap();
        assert!(rel.singular);
        assert!(!rel.variable);
        assert_eq!(rel.related_kind, Some(RecordKind::new("app::User")));
        assert_eq!(handle.foreign_key_value(), Some("9"));

        let (rel, _) = descriptor.relation(post.as_ref(), "subject").unwrap();
        assert!(rel.variable);
        assert!(rel.related_kind.is_none());
    }

    #[test]
    fn relation_unknown_errors() {
        let store = post_store();
        let post = store.get("app::Post", "1").unwrap();
        let descriptor = ResourceDescriptor::new(RecordKind::new("app::Post")).include("tags");
        let result = descriptor.relation(post.as_ref(), "tags");
        assert!(matches!(result, Err(EncodeError::UnknownRelation { .. })));
    }

    #[test]
    fn default_includes_must_be_available() {
        let descriptor = ResourceDescriptor::new(RecordKind::new("app::Post"))
            .include("author")
            .default_includes(["comments"]);
        let result = descriptor.check_default_includes("posts");
        assert!(matches!(
            result,
            Err(EncodeError::InvalidIncludeKey { key, .. }) if key == "comments"
        ));
    }

    #[test]
    fn definition_into_descriptor() {
        let def: ResourceDefinition = serde_json::from_value(json!({
            "kind": "app::Post",
            "extends": ["app::Model"],
            "attributes": ["title"],
            "includes": { "writer": "author", "comments": "comments" },
            "default_includes": ["comments"],
            "references": { "only": ["writer"] },
            "sort": ["title"],
            "meta": { "version": 2 }
        }))
        .unwrap();

        let descriptor = ResourceDescriptor::from(def);
        assert!(descriptor.kind().is_a("app::Model"));
        assert_eq!(
            descriptor.available_includes().get("writer").map(String::as_str),
            Some("author")
        );
        assert!(descriptor.is_default_include("comments"));
        assert!(descriptor.references().applies_to("writer"));
        assert!(descriptor.allows_sort("title"));

        let store = post_store();
        let post = store.get("app::Post", "1").unwrap();
        assert_eq!(descriptor.resource_meta(post.as_ref())["version"], 2);
    }

    #[test]
    fn definition_include_list() {
        let def: ResourceDefinition = serde_json::from_value(json!({
            "kind": "app::Post",
            "includes": ["author"]
        }))
        .unwrap();
        let descriptor = ResourceDescriptor::from(def);
        assert_eq!(
            descriptor.available_includes().get("author").map(String::as_str),
            Some("author")
        );
    }
}
