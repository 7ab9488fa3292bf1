//! Parsed JSON-API documents.
//!
//! A [`Document`] wraps a raw decoded object and promotes nested members to
//! typed nodes the first time they are accessed. Nodes live in an arena and
//! are addressed by [`NodeId`]; promotion results are cached per key, so
//! repeated access yields the same node. Writing a key with
//! [`Document::set`] drops its cached promotion, and the next access promotes
//! the new raw value.
//!
//! # Example
//!
//! ```
//! use jsonapi_doc::{Data, Document, RootType};
//!
//! let mut doc = Document::parse(r#"{
//!     "data": { "type": "posts", "id": "1", "attributes": { "title": "Hello" } }
//! }"#).unwrap();
//!
//! assert_eq!(doc.root_type(), RootType::Resource);
//! let Data::Single(post) = doc.data().unwrap() else { panic!() };
//! assert_eq!(doc.resource_type(post), Some("posts"));
//! assert_eq!(doc.attribute(post, "title").unwrap(), Some(&serde_json::json!("Hello")));
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::DocumentError;
use crate::loader::{load_json, load_json_str};
use crate::types::json_type_name;

/// Index of a node in a document's arena.
///
/// Handles are only meaningful for the document that issued them. Passing one
/// to another document is rejected: accessors return `None` or
/// [`DocumentError::ForeignNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    document: u32,
    index: usize,
}

static NEXT_DOCUMENT: AtomicU32 = AtomicU32::new(0);

/// What a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Resource,
    Attributes,
    Relationships,
    Relationship,
    Links,
    Meta,
    Error,
    JsonApi,
}

/// Document classification by its top-level members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootType {
    Resource,
    Error,
    Meta,
    Unknown,
}

macro_rules! node_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(NodeId);

        impl $name {
            pub fn id(self) -> NodeId {
                self.0
            }
        }

        impl From<$name> for NodeId {
            fn from(handle: $name) -> NodeId {
                handle.0
            }
        }
    };
}

node_handle!(
    /// A resource object or resource identifier.
    Resource
);
node_handle!(
    /// One entry of a resource's `relationships`.
    Relationship
);
node_handle!(
    /// One entry of the top-level `errors`.
    ErrorNode
);

/// Promoted `data`-like member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Data {
    /// Absent or `null`.
    Null,
    Single(Resource),
    /// List-shaped; `null` entries are preserved as `None`.
    Many(Vec<Option<Resource>>),
}

impl Data {
    /// Non-null resources, in order.
    pub fn resources(&self) -> Vec<Resource> {
        match self {
            Data::Null => Vec::new(),
            Data::Single(resource) => vec![*resource],
            Data::Many(items) => items.iter().flatten().copied().collect(),
        }
    }
}

#[derive(Debug, Clone)]
enum Promoted {
    Absent,
    Null,
    One(NodeId),
    /// From a JSON array.
    List(Vec<Option<NodeId>>),
    /// From an object without `type`, iterated as a list of its values.
    Keyed(Vec<(String, Option<NodeId>)>),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    raw: Map<String, Value>,
    /// Key path from the root, `/`-separated.
    path: String,
    /// Promotions in first-access order.
    promoted: IndexMap<String, Promoted>,
    /// Materialized for an absent key.
    synthetic: bool,
}

/// How a key's raw value is promoted.
#[derive(Debug, Clone, Copy)]
enum Rule {
    /// Single node; absent keys yield an empty node.
    Forced(NodeKind),
    /// Single node or nothing.
    Optional(NodeKind),
    /// Single node when the value has `type`, else a list of nodes.
    DualShape(NodeKind),
    /// A list of nodes (array or keyed object).
    List(NodeKind),
}

/// A lazily promoted JSON-API document.
#[derive(Debug)]
pub struct Document {
    tag: u32,
    nodes: Vec<Node>,
}

impl Document {
    /// Parse a document from JSON text.
    pub fn parse(content: &str) -> Result<Self, DocumentError> {
        Self::from_value(load_json_str(content)?)
    }

    /// Load a document from a file.
    pub fn from_file(path: &Path) -> Result<Self, DocumentError> {
        Self::from_value(load_json(path)?)
    }

    /// Wrap a decoded value; the root must be an object.
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        match value {
            Value::Object(raw) => Ok(Self::from_map(raw)),
            other => Err(DocumentError::NotAnObject {
                actual: json_type_name(&other).to_string(),
            }),
        }
    }

    pub fn from_map(raw: Map<String, Value>) -> Self {
        Self {
            tag: NEXT_DOCUMENT.fetch_add(1, Ordering::Relaxed),
            nodes: vec![Node {
                kind: NodeKind::Root,
                raw,
                path: String::new(),
                promoted: IndexMap::new(),
                synthetic: false,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId {
            document: self.tag,
            index: 0,
        }
    }

    /// Whether `node` was issued by this document.
    pub fn contains(&self, node: impl Into<NodeId>) -> bool {
        self.lookup(node.into()).is_some()
    }

    pub fn kind(&self, node: impl Into<NodeId>) -> Option<NodeKind> {
        self.lookup(node.into()).map(|node| node.kind)
    }

    /// Key path of a node, e.g. `data/relationships/author`.
    pub fn path(&self, node: impl Into<NodeId>) -> Option<&str> {
        self.lookup(node.into()).map(|node| node.path.as_str())
    }

    /// Raw members of a node (not including promoted changes below it).
    pub fn raw(&self, node: impl Into<NodeId>) -> Option<&Map<String, Value>> {
        self.lookup(node.into()).map(|node| &node.raw)
    }

    /// Raw value of a node's member.
    pub fn get(&self, node: impl Into<NodeId>, key: &str) -> Option<&Value> {
        self.lookup(node.into())?.raw.get(key)
    }

    /// Replace a node's member and drop its cached promotion.
    pub fn set(&mut self, node: impl Into<NodeId>, key: &str, value: Value) -> Result<(), DocumentError> {
        let id = self.owned(node.into())?;
        let node = self.node_mut(id);
        node.promoted.shift_remove(key);
        node.raw.insert(key.to_string(), value);
        Ok(())
    }

    /// Remove a node's member and its cached promotion.
    pub fn remove(&mut self, node: impl Into<NodeId>, key: &str) -> Option<Value> {
        let id = self.owned(node.into()).ok()?;
        let node = self.node_mut(id);
        node.promoted.shift_remove(key);
        node.raw.remove(key)
    }

    // --- Root queries ---

    pub fn root_type(&self) -> RootType {
        let raw = &self.node(self.root()).raw;
        if raw.contains_key("data") {
            RootType::Resource
        } else if raw.contains_key("errors") {
            RootType::Error
        } else if raw.contains_key("meta") {
            RootType::Meta
        } else {
            RootType::Unknown
        }
    }

    /// Primary data.
    pub fn data(&mut self) -> Result<Data, DocumentError> {
        self.data_member(self.root(), "data")
    }

    pub fn has_single_resource_data(&mut self) -> Result<bool, DocumentError> {
        Ok(matches!(self.data()?, Data::Single(_)))
    }

    pub fn has_multiple_resource_data(&mut self) -> Result<bool, DocumentError> {
        Ok(matches!(self.data()?, Data::Many(_)))
    }

    /// Side-loaded resources, in order.
    pub fn included(&mut self) -> Result<Vec<Resource>, DocumentError> {
        Ok(self.data_member(self.root(), "included")?.resources())
    }

    pub fn errors(&mut self) -> Result<Vec<ErrorNode>, DocumentError> {
        let promoted = self.materialize(self.root(), "errors", Rule::List(NodeKind::Error))?;
        Ok(list_nodes(&promoted).into_iter().map(ErrorNode).collect())
    }

    /// `jsonapi` member, if present.
    pub fn jsonapi(&mut self) -> Result<Option<NodeId>, DocumentError> {
        let promoted = self.materialize(self.root(), "jsonapi", Rule::Optional(NodeKind::JsonApi))?;
        Ok(single_node(&promoted))
    }

    /// Included resource with the given identity.
    pub fn find_included(
        &mut self,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<Resource>, DocumentError> {
        let included = self.included()?;
        Ok(included.into_iter().find(|r| {
            self.resource_type(*r) == Some(resource_type) && self.resource_id(*r).as_deref() == Some(id)
        }))
    }

    // --- Shared sub-objects ---

    /// `links` of any node; empty when absent.
    pub fn links(&mut self, node: impl Into<NodeId>) -> Result<NodeId, DocumentError> {
        let id = self.owned(node.into())?;
        self.forced(id, "links", NodeKind::Links)
    }

    /// One link, as its raw value (string or link object).
    pub fn link(&mut self, node: impl Into<NodeId>, name: &str) -> Result<Option<&Value>, DocumentError> {
        let links = self.links(node)?;
        Ok(self.get(links, name))
    }

    /// `meta` of any node; empty when absent.
    pub fn meta(&mut self, node: impl Into<NodeId>) -> Result<NodeId, DocumentError> {
        let id = self.owned(node.into())?;
        self.forced(id, "meta", NodeKind::Meta)
    }

    // --- Resources ---

    pub fn resource_type(&self, resource: Resource) -> Option<&str> {
        self.get(resource, "type").and_then(Value::as_str)
    }

    /// Resource id; numeric ids are stringified.
    pub fn resource_id(&self, resource: Resource) -> Option<String> {
        match self.get(resource, "id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// `attributes` node; empty when absent.
    pub fn attributes(&mut self, resource: Resource) -> Result<NodeId, DocumentError> {
        let id = self.owned(resource.0)?;
        self.forced(id, "attributes", NodeKind::Attributes)
    }

    pub fn attribute(
        &mut self,
        resource: Resource,
        name: &str,
    ) -> Result<Option<&Value>, DocumentError> {
        let attributes = self.attributes(resource)?;
        Ok(self.get(attributes, name))
    }

    pub fn set_attribute(
        &mut self,
        resource: Resource,
        name: &str,
        value: Value,
    ) -> Result<(), DocumentError> {
        let attributes = self.attributes(resource)?;
        self.set(attributes, name, value)
    }

    /// `relationships` node; empty when absent.
    pub fn relationships(&mut self, resource: Resource) -> Result<NodeId, DocumentError> {
        let id = self.owned(resource.0)?;
        self.forced(id, "relationships", NodeKind::Relationships)
    }

    /// Relationship names in document order.
    pub fn relationship_keys(&mut self, resource: Resource) -> Result<Vec<String>, DocumentError> {
        let relationships = self.relationships(resource)?;
        Ok(self.node(relationships).raw.keys().cloned().collect())
    }

    pub fn relationship(
        &mut self,
        resource: Resource,
        key: &str,
    ) -> Result<Option<Relationship>, DocumentError> {
        let relationships = self.relationships(resource)?;
        let promoted =
            self.materialize(relationships, key, Rule::Optional(NodeKind::Relationship))?;
        Ok(single_node(&promoted).map(Relationship))
    }

    /// A relationship's identifier data.
    pub fn relationship_data(&mut self, relationship: Relationship) -> Result<Data, DocumentError> {
        let id = self.owned(relationship.0)?;
        self.data_member(id, "data")
    }

    // --- Errors ---

    /// A string member of an error (`status`, `code`, `title`, `detail`).
    ///
    /// Numeric values are stringified.
    pub fn error_field(&self, error: ErrorNode, name: &str) -> Option<String> {
        match self.get(error, name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// `source.pointer` of an error.
    pub fn error_pointer(&self, error: ErrorNode) -> Option<&str> {
        self.get(error, "source")?.get("pointer")?.as_str()
    }

    // --- Write-back ---

    /// Re-serialize the document, including changes made through nodes.
    pub fn to_value(&self) -> Value {
        self.render(self.root()).unwrap_or_else(|| Value::Object(Map::new()))
    }

    // --- Promotion ---

    fn lookup(&self, id: NodeId) -> Option<&Node> {
        if id.document == self.tag {
            self.nodes.get(id.index)
        } else {
            None
        }
    }

    /// Reject handles issued by another document.
    fn owned(&self, id: NodeId) -> Result<NodeId, DocumentError> {
        match self.lookup(id) {
            Some(_) => Ok(id),
            None => Err(DocumentError::ForeignNode),
        }
    }

    // Callers pass ids that went through `owned` or were issued here.
    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index]
    }

    fn forced(&mut self, parent: NodeId, key: &str, kind: NodeKind) -> Result<NodeId, DocumentError> {
        let promoted = self.materialize(parent, key, Rule::Forced(kind))?;
        match single_node(&promoted) {
            Some(id) => Ok(id),
            // cached as null by an earlier read; a forced read replaces it
            None => {
                let id = self.push(kind, Map::new(), self.child_path(parent, key), true);
                self.node_mut(parent)
                    .promoted
                    .insert(key.to_string(), Promoted::One(id));
                Ok(id)
            }
        }
    }

    fn data_member(&mut self, parent: NodeId, key: &str) -> Result<Data, DocumentError> {
        let promoted = self.materialize(parent, key, Rule::DualShape(NodeKind::Resource))?;
        Ok(match promoted {
            Promoted::Absent | Promoted::Null => Data::Null,
            Promoted::One(id) => Data::Single(Resource(id)),
            Promoted::List(items) => Data::Many(items.into_iter().map(|i| i.map(Resource)).collect()),
            Promoted::Keyed(items) => {
                Data::Many(items.into_iter().map(|(_, i)| i.map(Resource)).collect())
            }
        })
    }

    /// Promote `parent[key]` according to `rule`, once.
    fn materialize(&mut self, parent: NodeId, key: &str, rule: Rule) -> Result<Promoted, DocumentError> {
        if let Some(cached) = self.node(parent).promoted.get(key) {
            return Ok(cached.clone());
        }

        let path = self.child_path(parent, key);
        let raw = self.node(parent).raw.get(key).cloned();
        let promoted = match (rule, raw) {
            (Rule::Forced(kind), None) => Promoted::One(self.push(kind, Map::new(), path, true)),
            (_, None) => Promoted::Absent,
            (Rule::Forced(kind), Some(Value::Null)) => {
                Promoted::One(self.push(kind, Map::new(), path, true))
            }
            (_, Some(Value::Null)) => Promoted::Null,
            (Rule::Forced(kind) | Rule::Optional(kind), Some(value)) => {
                Promoted::One(self.promote_one(kind, value, path)?)
            }
            (Rule::DualShape(kind), Some(Value::Object(map))) if map.contains_key("type") => {
                Promoted::One(self.push(kind, map, path, false))
            }
            (Rule::DualShape(kind) | Rule::List(kind), Some(value)) => {
                self.promote_list(kind, value, path)?
            }
        };

        tracing::trace!(path = %self.child_path(parent, key), "promoted");
        self.node_mut(parent)
            .promoted
            .insert(key.to_string(), promoted.clone());
        Ok(promoted)
    }

    fn promote_one(&mut self, kind: NodeKind, value: Value, path: String) -> Result<NodeId, DocumentError> {
        match value {
            Value::Object(map) => Ok(self.push(kind, map, path, false)),
            // an empty list is how some encoders write an empty object
            Value::Array(items) if items.is_empty() => Ok(self.push(kind, Map::new(), path, false)),
            other => Err(DocumentError::InvalidNestedDataShape {
                path,
                actual: json_type_name(&other).to_string(),
            }),
        }
    }

    fn promote_list(&mut self, kind: NodeKind, value: Value, path: String) -> Result<Promoted, DocumentError> {
        match value {
            Value::Array(items) => {
                let mut nodes = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    nodes.push(self.promote_item(kind, item, format!("{}/{}", path, i))?);
                }
                Ok(Promoted::List(nodes))
            }
            Value::Object(map) => {
                let mut nodes = Vec::with_capacity(map.len());
                for (k, item) in map {
                    let node = self.promote_item(kind, item, format!("{}/{}", path, k))?;
                    nodes.push((k, node));
                }
                Ok(Promoted::Keyed(nodes))
            }
            other => Err(DocumentError::InvalidNestedDataShape {
                path,
                actual: json_type_name(&other).to_string(),
            }),
        }
    }

    fn promote_item(
        &mut self,
        kind: NodeKind,
        item: Value,
        path: String,
    ) -> Result<Option<NodeId>, DocumentError> {
        match item {
            Value::Null => Ok(None),
            other => self.promote_one(kind, other, path).map(Some),
        }
    }

    fn push(&mut self, kind: NodeKind, raw: Map<String, Value>, path: String, synthetic: bool) -> NodeId {
        let id = NodeId {
            document: self.tag,
            index: self.nodes.len(),
        };
        self.nodes.push(Node {
            kind,
            raw,
            path,
            promoted: IndexMap::new(),
            synthetic,
        });
        id
    }

    fn child_path(&self, parent: NodeId, key: &str) -> String {
        let parent = &self.node(parent).path;
        if parent.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", parent, key)
        }
    }

    /// Render a node, `None` for untouched synthetic nodes.
    fn render(&self, id: NodeId) -> Option<Value> {
        let node = self.node(id);
        let mut out = node.raw.clone();

        for (key, promoted) in &node.promoted {
            let value = match promoted {
                Promoted::Absent => continue,
                Promoted::Null => Value::Null,
                Promoted::One(child) => match self.render(*child) {
                    Some(value) => value,
                    None => continue,
                },
                Promoted::List(items) => Value::Array(
                    items
                        .iter()
                        .map(|item| self.render_item(*item))
                        .collect(),
                ),
                Promoted::Keyed(items) => Value::Object(
                    items
                        .iter()
                        .map(|(k, item)| (k.clone(), self.render_item(*item)))
                        .collect(),
                ),
            };
            out.insert(key.clone(), value);
        }

        if node.synthetic && out.is_empty() {
            None
        } else {
            Some(Value::Object(out))
        }
    }

    fn render_item(&self, item: Option<NodeId>) -> Value {
        item.and_then(|id| self.render(id))
            .unwrap_or(Value::Null)
    }
}

fn single_node(promoted: &Promoted) -> Option<NodeId> {
    match promoted {
        Promoted::One(id) => Some(*id),
        _ => None,
    }
}

fn list_nodes(promoted: &Promoted) -> Vec<NodeId> {
    match promoted {
        Promoted::One(id) => vec![*id],
        Promoted::List(items) => items.iter().flatten().copied().collect(),
        Promoted::Keyed(items) => items.iter().filter_map(|(_, id)| *id).collect(),
        Promoted::Absent | Promoted::Null => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn promotion_is_cached() {
        let mut d = doc(json!({ "data": { "type": "posts", "id": "1" } }));
        let first = d.data().unwrap();
        let second = d.data().unwrap();
        assert_eq!(first, second);
        let nodes = d.nodes.len();
        d.data().unwrap();
        assert_eq!(d.nodes.len(), nodes);
    }

    #[test]
    fn set_invalidates_cache() {
        let mut d = doc(json!({ "data": { "type": "posts", "id": "1" } }));
        let Data::Single(before) = d.data().unwrap() else { panic!("single") };

        d.set(d.root(), "data", json!({ "type": "posts", "id": "2" })).unwrap();
        let Data::Single(after) = d.data().unwrap() else { panic!("single") };
        assert_ne!(before, after);
        assert_eq!(d.resource_id(after).as_deref(), Some("2"));
    }

    #[test]
    fn forced_nodes_for_absent_members() {
        let mut d = doc(json!({ "data": { "type": "posts", "id": "1" } }));
        let Data::Single(post) = d.data().unwrap() else { panic!("single") };
        let attributes = d.attributes(post).unwrap();
        assert_eq!(d.kind(attributes), Some(NodeKind::Attributes));
        assert!(d.raw(attributes).unwrap().is_empty());
        assert!(d.relationship_keys(post).unwrap().is_empty());

        // untouched synthetic nodes are not written back
        assert_eq!(d.to_value(), json!({ "data": { "type": "posts", "id": "1" } }));
    }

    #[test]
    fn new_members_written_back_in_access_order() {
        let mut d = doc(json!({ "data": { "type": "posts", "id": "1" } }));
        let Data::Single(post) = d.data().unwrap() else { panic!("single") };

        let relationships = d.relationships(post).unwrap();
        let meta = d.meta(post).unwrap();
        d.set(relationships, "author", json!({ "data": null })).unwrap();
        d.set(meta, "rank", json!(1)).unwrap();
        d.set_attribute(post, "title", json!("Hello")).unwrap();

        let value = d.to_value();
        let keys: Vec<&String> = value["data"].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["type", "id", "relationships", "meta", "attributes"]);
    }

    #[test]
    fn handles_from_another_document_are_rejected() {
        let mut a = doc(json!({ "data": { "type": "posts", "id": "1" } }));
        let mut b = doc(json!({ "data": { "type": "people", "id": "9" } }));
        let Data::Single(post) = a.data().unwrap() else { panic!("single") };
        let Data::Single(person) = b.data().unwrap() else { panic!("single") };
        assert_eq!(post.id().index, person.id().index);

        assert!(a.contains(post));
        assert!(!b.contains(post));
        assert_eq!(b.resource_type(post), None);
        assert_eq!(b.kind(post), None);
        assert_eq!(b.path(post), None);
        assert!(matches!(b.attributes(post), Err(DocumentError::ForeignNode)));
        assert!(matches!(
            b.set(post, "id", json!("2")),
            Err(DocumentError::ForeignNode)
        ));
        assert_eq!(b.remove(post, "type"), None);

        assert_eq!(b.resource_type(person), Some("people"));
        assert_eq!(a.resource_id(post).as_deref(), Some("1"));
    }

    #[test]
    fn non_map_item_reports_path() {
        let mut d = doc(json!({ "data": [{ "type": "posts", "id": "1" }, 5] }));
        match d.data() {
            Err(DocumentError::InvalidNestedDataShape { path, actual }) => {
                assert_eq!(path, "data/1");
                assert_eq!(actual, "number");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn keyed_object_is_list_shaped() {
        let mut d = doc(json!({
            "data": { "a": { "type": "posts", "id": "1" }, "b": null }
        }));
        match d.data().unwrap() {
            Data::Many(items) => {
                assert_eq!(items.len(), 2);
                assert!(items[0].is_some());
                assert!(items[1].is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn write_back_through_nodes() {
        let mut d = doc(json!({
            "data": { "type": "posts", "id": "1", "attributes": { "title": "Old" } }
        }));
        let Data::Single(post) = d.data().unwrap() else { panic!("single") };
        d.set_attribute(post, "title", json!("New")).unwrap();
        d.set_attribute(post, "views", json!(3)).unwrap();
        assert_eq!(
            d.to_value(),
            json!({
                "data": { "type": "posts", "id": "1", "attributes": { "title": "New", "views": 3 } }
            })
        );
    }

    #[test]
    fn root_must_be_object() {
        let result = Document::from_value(json!([1]));
        assert!(matches!(result, Err(DocumentError::NotAnObject { actual }) if actual == "array"));
    }
}
