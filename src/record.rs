//! Record-store contract consumed by the encoder.
//!
//! The persistence layer is opaque: it only has to expose records with a kind,
//! a primary key, attributes and named relations. [`MemoryStore`](crate::MemoryStore)
//! is the in-crate implementation used by fixtures and tests.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

/// Shared handle to a record.
pub type RecordRef = Arc<dyn Record>;

/// A domain record exposed by the record store.
pub trait Record: fmt::Debug + Send + Sync {
    /// The record's kind (its "class").
    fn kind(&self) -> &RecordKind;

    /// Primary key, stringified.
    fn primary_key(&self) -> String;

    /// Raw attribute value, `None` when the record has no such field.
    fn attribute(&self, name: &str) -> Option<Value>;

    /// Relation handle by accessor name, `None` when no such relation exists.
    fn relation(&self, name: &str) -> Option<RelationHandle>;

    /// Plain map conversion used when a record is wrapped as an opaque value.
    fn to_map(&self) -> Map<String, Value> {
        Map::new()
    }
}

/// Fully qualified record kind, e.g. `app::models::BlogPost`.
///
/// `ancestors` lists the kinds this one "is an instance of" (base kinds and
/// interfaces), most specific first. Dispatch overrides and registry lookups
/// fall back to them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKind {
    path: String,
    ancestors: Vec<String>,
}

impl RecordKind {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ancestors: Vec::new(),
        }
    }

    /// Declare a base kind or interface this kind is an instance of.
    pub fn extends(mut self, ancestor: impl Into<String>) -> Self {
        self.ancestors.push(ancestor.into());
        self
    }

    /// Fully qualified path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment.
    pub fn short_name(&self) -> &str {
        self.path.rsplit("::").next().unwrap_or(&self.path)
    }

    /// Path without the short name (empty for a bare name).
    pub fn namespace(&self) -> &str {
        match self.path.rfind("::") {
            Some(idx) => &self.path[..idx],
            None => "",
        }
    }

    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// Is-instance-of check: exact match or any declared ancestor.
    pub fn is_a(&self, path: &str) -> bool {
        self.path == path || self.ancestors.iter().any(|a| a == path)
    }

    /// Own path followed by ancestors, in lookup order.
    pub fn lineage(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.path.as_str()).chain(self.ancestors.iter().map(String::as_str))
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Declared cardinality of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Loaded value(s) of a relation.
#[derive(Debug, Clone)]
pub enum Related {
    One(Option<RecordRef>),
    Many(Vec<RecordRef>),
}

impl Related {
    pub fn records(&self) -> Vec<RecordRef> {
        match self {
            Related::One(record) => record.iter().cloned().collect(),
            Related::Many(records) => records.clone(),
        }
    }
}

type Loader = Box<dyn Fn() -> Related + Send + Sync>;

enum RelatedSource {
    Loaded(Related),
    Lazy(Loader),
}

/// Relation metadata plus access to the related value(s).
pub struct RelationHandle {
    cardinality: Cardinality,
    polymorphic: bool,
    related_kind: Option<RecordKind>,
    foreign_key: Option<String>,
    source: RelatedSource,
}

impl RelationHandle {
    /// Relation whose related value is already loaded.
    pub fn loaded(cardinality: Cardinality, related: Related) -> Self {
        Self {
            cardinality,
            polymorphic: false,
            related_kind: None,
            foreign_key: None,
            source: RelatedSource::Loaded(related),
        }
    }

    /// Relation that fetches its related value on first [`load`](Self::load).
    pub fn lazy<F>(cardinality: Cardinality, loader: F) -> Self
    where
        F: Fn() -> Related + Send + Sync + 'static,
    {
        Self {
            cardinality,
            polymorphic: false,
            related_kind: None,
            foreign_key: None,
            source: RelatedSource::Lazy(Box::new(loader)),
        }
    }

    pub fn polymorphic(mut self, polymorphic: bool) -> Self {
        self.polymorphic = polymorphic;
        self
    }

    pub fn related_kind(mut self, kind: RecordKind) -> Self {
        self.related_kind = Some(kind);
        self
    }

    /// Foreign key held by the owning record (singular relations only).
    pub fn foreign_key(mut self, key: Option<String>) -> Self {
        self.foreign_key = key;
        self
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_singular(&self) -> bool {
        self.cardinality == Cardinality::One
    }

    pub fn is_polymorphic(&self) -> bool {
        self.polymorphic
    }

    /// Statically declared related kind; `None` for polymorphic relations.
    pub fn declared_kind(&self) -> Option<&RecordKind> {
        self.related_kind.as_ref()
    }

    pub fn foreign_key_value(&self) -> Option<&str> {
        self.foreign_key.as_deref()
    }

    /// Resolve the related value(s), fetching if the relation is lazy.
    pub fn load(&self) -> Related {
        match &self.source {
            RelatedSource::Loaded(related) => related.clone(),
            RelatedSource::Lazy(loader) => {
                tracing::trace!(polymorphic = self.polymorphic, "loading lazy relation");
                loader()
            }
        }
    }
}

impl fmt::Debug for RelationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationHandle")
            .field("cardinality", &self.cardinality)
            .field("polymorphic", &self.polymorphic)
            .field("related_kind", &self.related_kind)
            .field("foreign_key", &self.foreign_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parts() {
        let kind = RecordKind::new("app::models::blog::Post");
        assert_eq!(kind.short_name(), "Post");
        assert_eq!(kind.namespace(), "app::models::blog");

        let bare = RecordKind::new("Post");
        assert_eq!(bare.short_name(), "Post");
        assert_eq!(bare.namespace(), "");
    }

    #[test]
    fn kind_instance_of() {
        let kind = RecordKind::new("app::models::Admin").extends("app::models::User");
        assert!(kind.is_a("app::models::Admin"));
        assert!(kind.is_a("app::models::User"));
        assert!(!kind.is_a("app::models::Post"));
        assert_eq!(
            kind.lineage().collect::<Vec<_>>(),
            vec!["app::models::Admin", "app::models::User"]
        );
    }

    #[test]
    fn lazy_relation_loads_on_demand() {
        let handle = RelationHandle::lazy(Cardinality::Many, || Related::Many(Vec::new()))
            .related_kind(RecordKind::new("app::models::Comment"));
        assert!(!handle.is_singular());
        assert!(handle.load().records().is_empty());
        assert_eq!(
            handle.declared_kind().map(RecordKind::path),
            Some("app::models::Comment")
        );
    }
}
