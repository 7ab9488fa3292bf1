//! In-memory record store.
//!
//! Backs fixtures, tests and the CLI. Relations are stored as keys and resolved
//! lazily against the store, so cyclic record graphs need no reference cycles.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::descriptor::ResourceDefinition;
use crate::record::{Cardinality, Record, RecordKind, RecordRef, Related, RelationHandle};

/// `(kind, id)` address of a model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelKey {
    pub kind: String,
    pub id: String,
}

impl ModelKey {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// Relation declared on a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationSpec {
    /// Singular, owning the foreign key.
    BelongsTo {
        kind: String,
        #[serde(default)]
        key: Option<String>,
    },
    /// Singular, key held by the related side.
    HasOne {
        kind: String,
        #[serde(default)]
        key: Option<String>,
    },
    HasMany {
        kind: String,
        #[serde(default)]
        keys: Vec<String>,
    },
    /// Singular polymorphic.
    MorphTo {
        #[serde(default)]
        target: Option<ModelKey>,
    },
    /// Plural polymorphic.
    MorphMany {
        #[serde(default)]
        targets: Vec<ModelKey>,
    },
}

/// A stored record: kind, id, attributes and relation keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub relations: IndexMap<String, RelationSpec>,
}

impl Model {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            extends: Vec::new(),
            attributes: Map::new(),
            relations: IndexMap::new(),
        }
    }

    pub fn extends(mut self, ancestor: impl Into<String>) -> Self {
        self.extends.push(ancestor.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn belongs_to(mut self, name: impl Into<String>, kind: &str, key: Option<&str>) -> Self {
        self.relations.insert(
            name.into(),
            RelationSpec::BelongsTo {
                kind: kind.to_string(),
                key: key.map(str::to_string),
            },
        );
        self
    }

    pub fn has_one(mut self, name: impl Into<String>, kind: &str, key: Option<&str>) -> Self {
        self.relations.insert(
            name.into(),
            RelationSpec::HasOne {
                kind: kind.to_string(),
                key: key.map(str::to_string),
            },
        );
        self
    }

    pub fn has_many<I, S>(mut self, name: impl Into<String>, kind: &str, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relations.insert(
            name.into(),
            RelationSpec::HasMany {
                kind: kind.to_string(),
                keys: keys.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    pub fn morph_to(mut self, name: impl Into<String>, target: Option<ModelKey>) -> Self {
        self.relations
            .insert(name.into(), RelationSpec::MorphTo { target });
        self
    }

    pub fn morph_many(mut self, name: impl Into<String>, targets: Vec<ModelKey>) -> Self {
        self.relations
            .insert(name.into(), RelationSpec::MorphMany { targets });
        self
    }

    fn record_kind(&self) -> RecordKind {
        self.extends
            .iter()
            .fold(RecordKind::new(self.kind.as_str()), |kind, a| {
                kind.extends(a.as_str())
            })
    }
}

#[derive(Debug)]
struct StoredModel {
    kind: RecordKind,
    model: Model,
}

#[derive(Debug, Default)]
struct StoreInner {
    models: IndexMap<ModelKey, Arc<StoredModel>>,
    kinds: IndexMap<String, RecordKind>,
}

/// Shared, cheaply clonable in-memory record store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a model.
    pub fn insert(&self, model: Model) {
        let kind = model.record_kind();
        let key = ModelKey::new(model.kind.as_str(), model.id.as_str());
        let mut inner = self.inner.write();
        // keep the richest known lineage for the kind
        let known = inner
            .kinds
            .entry(model.kind.clone())
            .or_insert_with(|| kind.clone());
        if known.ancestors().len() < kind.ancestors().len() {
            *known = kind.clone();
        }
        inner
            .models
            .insert(key, Arc::new(StoredModel { kind, model }));
    }

    pub fn len(&self) -> usize {
        self.inner.read().models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a record by kind path and id.
    pub fn get(&self, kind: &str, id: &str) -> Option<RecordRef> {
        let stored = self
            .inner
            .read()
            .models
            .get(&ModelKey::new(kind, id))
            .cloned()?;
        Some(self.wrap(stored))
    }

    /// All records of a kind, in insertion order.
    pub fn all(&self, kind: &str) -> Vec<RecordRef> {
        let stored: Vec<Arc<StoredModel>> = self
            .inner
            .read()
            .models
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .map(|(_, stored)| Arc::clone(stored))
            .collect();
        stored.into_iter().map(|s| self.wrap(s)).collect()
    }

    /// Known kind for a path (with declared ancestors), or a bare kind.
    pub fn kind(&self, path: &str) -> RecordKind {
        self.inner
            .read()
            .kinds
            .get(path)
            .cloned()
            .unwrap_or_else(|| RecordKind::new(path))
    }

    fn wrap(&self, stored: Arc<StoredModel>) -> RecordRef {
        Arc::new(MemoryRecord {
            stored,
            store: self.clone(),
        })
    }

    fn lookup(&self, key: &ModelKey) -> Option<RecordRef> {
        self.get(&key.kind, &key.id)
    }
}

/// Record handle backed by a [`MemoryStore`].
#[derive(Debug)]
struct MemoryRecord {
    stored: Arc<StoredModel>,
    store: MemoryStore,
}

impl Record for MemoryRecord {
    fn kind(&self) -> &RecordKind {
        &self.stored.kind
    }

    fn primary_key(&self) -> String {
        self.stored.model.id.clone()
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        if name == "id" {
            return Some(Value::String(self.stored.model.id.clone()));
        }
        self.stored.model.attributes.get(name).cloned()
    }

    fn relation(&self, name: &str) -> Option<RelationHandle> {
        let spec = self.stored.model.relations.get(name)?.clone();
        let store = self.store.clone();

        let handle = match spec {
            RelationSpec::BelongsTo { kind, key } => {
                let related_kind = store.kind(&kind);
                let target = key.clone().map(|id| ModelKey::new(kind, id));
                RelationHandle::lazy(Cardinality::One, move || {
                    Related::One(target.as_ref().and_then(|k| store.lookup(k)))
                })
                .related_kind(related_kind)
                .foreign_key(key)
            }
            RelationSpec::HasOne { kind, key } => {
                let related_kind = store.kind(&kind);
                let target = key.map(|id| ModelKey::new(kind, id));
                RelationHandle::lazy(Cardinality::One, move || {
                    Related::One(target.as_ref().and_then(|k| store.lookup(k)))
                })
                .related_kind(related_kind)
            }
            RelationSpec::HasMany { kind, keys } => {
                let related_kind = store.kind(&kind);
                let targets: Vec<ModelKey> = keys
                    .into_iter()
                    .map(|id| ModelKey::new(kind.as_str(), id))
                    .collect();
                RelationHandle::lazy(Cardinality::Many, move || {
                    Related::Many(targets.iter().filter_map(|k| store.lookup(k)).collect())
                })
                .related_kind(related_kind)
            }
            RelationSpec::MorphTo { target } => {
                RelationHandle::lazy(Cardinality::One, move || {
                    Related::One(target.as_ref().and_then(|k| store.lookup(k)))
                })
                .polymorphic(true)
            }
            RelationSpec::MorphMany { targets } => {
                RelationHandle::lazy(Cardinality::Many, move || {
                    Related::Many(targets.iter().filter_map(|k| store.lookup(k)).collect())
                })
                .polymorphic(true)
            }
        };
        Some(handle)
    }

    fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".into(), Value::String(self.stored.model.id.clone()));
        for (k, v) in &self.stored.model.attributes {
            map.insert(k.clone(), v.clone());
        }
        map
    }
}

/// Primary data selection of a fixture.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FixtureData {
    #[default]
    Null,
    One(ModelKey),
    Many(Vec<ModelKey>),
}

/// Self-contained encoding input: resource definitions, records and the
/// primary data to encode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub resources: Vec<ResourceDefinition>,
    #[serde(default)]
    pub records: Vec<Model>,
    #[serde(default)]
    pub data: FixtureData,
}

impl Fixture {
    /// Load every record into a fresh store.
    pub fn store(&self) -> MemoryStore {
        let store = MemoryStore::new();
        for model in &self.records {
            store.insert(model.clone());
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blog() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert(Model::new("app::User", "9").attr("name", json!("Ada")));
        store.insert(
            Model::new("app::Post", "1")
                .attr("title", json!("Hello"))
                .belongs_to("author", "app::User", Some("9"))
                .has_many("comments", "app::Comment", ["1", "2"])
                .morph_to("pinned", Some(ModelKey::new("app::Comment", "2"))),
        );
        store.insert(Model::new("app::Comment", "1").attr("body", json!("first")));
        store.insert(Model::new("app::Comment", "2").attr("body", json!("second")));
        store
    }

    #[test]
    fn get_and_attributes() {
        let store = blog();
        assert_eq!(store.len(), 4);
        let post = store.get("app::Post", "1").unwrap();
        assert_eq!(post.primary_key(), "1");
        assert_eq!(post.attribute("title"), Some(json!("Hello")));
        assert_eq!(post.attribute("id"), Some(json!("1")));
        assert!(post.attribute("missing").is_none());
        assert!(store.get("app::Post", "2").is_none());
    }

    #[test]
    fn belongs_to_resolves_lazily() {
        let store = blog();
        let post = store.get("app::Post", "1").unwrap();
        let author = post.relation("author").unwrap();
        assert!(author.is_singular());
        assert_eq!(author.foreign_key_value(), Some("9"));
        match author.load() {
            Related::One(Some(user)) => assert_eq!(user.primary_key(), "9"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn has_many_skips_missing() {
        let store = blog();
        store.insert(
            Model::new("app::Post", "3").has_many("comments", "app::Comment", ["1", "404"]),
        );
        let post = store.get("app::Post", "3").unwrap();
        let comments = post.relation("comments").unwrap().load().records();
        assert_eq!(comments.len(), 1);
    }

    #[test]
    fn morph_to_is_polymorphic() {
        let store = blog();
        let post = store.get("app::Post", "1").unwrap();
        let pinned = post.relation("pinned").unwrap();
        assert!(pinned.is_polymorphic());
        assert!(pinned.declared_kind().is_none());
        let records = pinned.load().records();
        assert_eq!(records[0].kind().path(), "app::Comment");
    }

    #[test]
    fn kind_lineage_is_kept() {
        let store = MemoryStore::new();
        store.insert(Model::new("app::Admin", "1").extends("app::User"));
        let admin = store.get("app::Admin", "1").unwrap();
        assert!(admin.kind().is_a("app::User"));
        assert!(store.kind("app::Admin").is_a("app::User"));
    }

    #[test]
    fn fixture_from_json() {
        let fixture: Fixture = serde_json::from_value(json!({
            "resources": [{ "kind": "app::Post", "attributes": ["title"] }],
            "records": [{
                "kind": "app::Post",
                "id": "1",
                "attributes": { "title": "Hello" },
                "relations": {
                    "author": { "belongs_to": { "kind": "app::User", "key": "9" } },
                    "tags": { "morph_many": { "targets": [{ "kind": "app::Tag", "id": "t" }] } }
                }
            }],
            "data": { "kind": "app::Post", "id": "1" }
        }))
        .unwrap();
        assert!(matches!(fixture.data, FixtureData::One(_)));
        let store = fixture.store();
        let post = store.get("app::Post", "1").unwrap();
        assert!(post.relation("tags").unwrap().is_polymorphic());
        assert_eq!(post.to_map()["title"], "Hello");
    }
}
