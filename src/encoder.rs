//! Document assembly.
//!
//! An [`Encoder`] runs one top-level transformation per [`encode`](Encoder::encode)
//! call and owns the state strategies write into along the way: the
//! deduplicated `included` bag, top-level `links` and `meta`, the requested
//! include paths, sparse fieldsets and the top resource URL. All of it is reset
//! once the document is assembled.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::EncoderConfig;
use crate::descriptor::ResourceDescriptor;
use crate::error::EncodeError;
use crate::factory::TransformerFactory;
use crate::payload::{ApiException, Payload};
use crate::record::{Record, RecordKind};
use crate::registry::ResourceRegistry;
use crate::transform::{self, Scope, Transformer};
use crate::types::ResourceIdentifier;

/// Key of an entry in the included bag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BagKey {
    /// `"type:id"`, deduplicated.
    Id(String),
    /// Anonymous entry, never deduplicated.
    Seq(u64),
}

/// Status and body handed to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

/// Builds JSON-API documents from payloads.
#[derive(Debug)]
pub struct Encoder {
    config: Arc<EncoderConfig>,
    registry: Arc<ResourceRegistry>,
    factory: TransformerFactory,
    included: IndexMap<BagKey, Value>,
    next_seq: u64,
    /// `"type:id"` → shallowest depth the resource was serialized at.
    expanded: HashMap<String, usize>,
    links: BTreeMap<String, Value>,
    meta: Map<String, Value>,
    requested_includes: Vec<String>,
    fieldsets: HashMap<String, Vec<String>>,
    primary_kind: Option<RecordKind>,
    top_resource_url: Option<String>,
    request_url: Option<String>,
}

impl Encoder {
    pub fn new(
        config: impl Into<Arc<EncoderConfig>>,
        registry: impl Into<Arc<ResourceRegistry>>,
    ) -> Self {
        Self {
            config: config.into(),
            registry: registry.into(),
            factory: TransformerFactory::default(),
            included: IndexMap::new(),
            next_seq: 0,
            expanded: HashMap::new(),
            links: BTreeMap::new(),
            meta: Map::new(),
            requested_includes: Vec::new(),
            fieldsets: HashMap::new(),
            primary_kind: None,
            top_resource_url: None,
            request_url: None,
        }
    }

    /// Replace the dispatch factory (for transformer overrides).
    pub fn with_factory(mut self, factory: TransformerFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Encode `payload` into a complete document.
    ///
    /// `includes` are the client-requested include paths, if any.
    ///
    /// # Errors
    ///
    /// Any [`EncodeError`] raised while transforming; transient state is reset
    /// either way.
    pub fn encode(
        &mut self,
        payload: &Payload,
        includes: Option<Vec<String>>,
    ) -> Result<Value, EncodeError> {
        let result = self.assemble(payload, includes);
        self.reset();
        result
    }

    /// Encode `payload` for the HTTP layer.
    ///
    /// Encode failures are re-encoded as error documents. The status is 200
    /// for data documents and the first error's status otherwise.
    pub fn response(&mut self, payload: &Payload, includes: Option<Vec<String>>) -> ApiResponse {
        let body = match self.encode(payload, includes) {
            Ok(body) => body,
            Err(err) => {
                tracing::debug!(error = %err, "encode failed, rendering error document");
                self.encode_failure(ApiException::from(err))
            }
        };
        ApiResponse {
            status: response_status(&body),
            body,
        }
    }

    fn encode_failure(&mut self, exception: ApiException) -> Value {
        let fallback = transform::error_objects(&self.config, &exception);
        match self.encode(&Payload::Exception(exception), None) {
            Ok(body) => body,
            // an override refused the exception; use the built-in error shape
            Err(_) => serde_json::json!({ "errors": fallback }),
        }
    }

    fn assemble(
        &mut self,
        payload: &Payload,
        includes: Option<Vec<String>>,
    ) -> Result<Value, EncodeError> {
        if let Some(includes) = includes {
            self.set_requested_includes(includes);
        }
        if self.top_resource_url.is_none() && self.config.auto_top_resource_url {
            // query kept; page links only replace the page parameter
            self.top_resource_url = self.request_url.clone();
        }

        let transformer = self.transformer_for(payload);
        let scope = Scope::top_level(is_variable(payload));
        let fragment = transformer.transform(self, payload, &scope)?;

        let mut document = match fragment {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("data".into(), other);
                map
            }
        };

        // primary data never appears in included
        for key in primary_keys(document.get("data")) {
            self.remove_included_data(&key);
        }

        if !self.included.is_empty() {
            let included: Vec<Value> = self.included.values().cloned().collect();
            document.insert("included".into(), Value::Array(included));
        }
        if !self.links.is_empty() {
            let links: Map<String, Value> = self
                .links
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            document.insert("links".into(), Value::Object(links));
        }
        if !self.meta.is_empty() {
            document.insert("meta".into(), Value::Object(self.meta.clone()));
        }

        tracing::debug!(
            transformer = transformer.name(),
            included = self.included.len(),
            links = self.links.len(),
            "document encoded"
        );
        Ok(Value::Object(document))
    }

    fn reset(&mut self) {
        self.included.clear();
        self.next_seq = 0;
        self.expanded.clear();
        self.links.clear();
        self.meta.clear();
        self.requested_includes.clear();
        self.fieldsets.clear();
        self.primary_kind = None;
        self.top_resource_url = None;
    }

    // --- Included bag ---

    /// Add a side-loaded resource.
    ///
    /// With an identifier the first write wins and later duplicates are
    /// dropped; without one the fragment is always appended. Returns whether
    /// the fragment was stored.
    pub fn add_included_data(&mut self, fragment: Value, identifier: Option<String>) -> bool {
        let key = match identifier {
            Some(id) => {
                let key = BagKey::Id(id);
                if self.included.contains_key(&key) {
                    tracing::trace!(?key, "included resource already present");
                    return false;
                }
                key
            }
            None => {
                self.next_seq += 1;
                BagKey::Seq(self.next_seq)
            }
        };
        self.included.insert(key, fragment);
        true
    }

    /// Whether a side-loaded resource with `"type:id"` is present.
    pub fn has_included_data(&self, identifier: &str) -> bool {
        self.included.contains_key(&BagKey::Id(identifier.to_string()))
    }

    /// Record that `identifier` is being serialized at `depth`.
    pub(crate) fn mark_expanded(&mut self, identifier: String, depth: usize) {
        self.expanded
            .entry(identifier)
            .and_modify(|seen| *seen = (*seen).min(depth))
            .or_insert(depth);
    }

    /// Whether `identifier` was already serialized at `depth` or shallower.
    ///
    /// Such a resource is either an ancestor still being serialized or one
    /// whose default includes were followed at least as far as they would be
    /// from here.
    pub(crate) fn is_expanded_within(&self, identifier: &str, depth: usize) -> bool {
        self.expanded.get(identifier).is_some_and(|seen| *seen <= depth)
    }

    /// Remove a side-loaded resource by `"type:id"`.
    pub fn remove_included_data(&mut self, identifier: &str) -> Option<Value> {
        self.included
            .shift_remove(&BagKey::Id(identifier.to_string()))
    }

    // --- Links and meta ---

    pub fn set_link(&mut self, name: impl Into<String>, value: Value) {
        self.links.insert(name.into(), value);
    }

    pub fn remove_link(&mut self, name: &str) -> Option<Value> {
        self.links.remove(name)
    }

    /// Replace top-level meta.
    pub fn set_meta(&mut self, meta: Map<String, Value>) {
        self.meta = meta;
    }

    /// Set a meta value at a dot path, creating intermediate objects.
    pub fn add_meta(&mut self, path: &str, value: Value) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let Some(last) = segments.pop() else { return };

        let mut target = &mut self.meta;
        for segment in segments {
            let entry = target
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            target = match entry {
                Value::Object(map) => map,
                _ => return,
            };
        }
        target.insert(last.to_string(), value);
    }

    /// Remove the meta value at a dot path.
    pub fn remove_meta_key(&mut self, path: &str) -> Option<Value> {
        let mut segments: Vec<&str> = path.split('.').collect();
        let last = segments.pop()?;

        let mut target = &mut self.meta;
        for segment in segments {
            target = target.get_mut(segment)?.as_object_mut()?;
        }
        target.remove(last)
    }

    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    // --- Request context ---

    pub fn set_requested_includes(&mut self, includes: Vec<String>) {
        self.requested_includes = includes
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    pub fn requested_includes(&self) -> &[String] {
        &self.requested_includes
    }

    /// Whether `path` or any path below it was requested.
    pub fn is_include_requested(&self, path: &str) -> bool {
        self.requested_includes.iter().any(|requested| {
            requested == path
                || requested
                    .strip_prefix(path)
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    /// Limit serialized attributes per resource type.
    pub fn set_fieldsets(&mut self, fieldsets: HashMap<String, Vec<String>>) {
        self.fieldsets = fieldsets;
    }

    /// Requested attributes for `resource_type`, `None` when unrestricted.
    pub fn fieldset(&self, resource_type: &str) -> Option<&[String]> {
        self.fieldsets.get(resource_type).map(Vec::as_slice)
    }

    /// Kind of the primary data.
    ///
    /// Lets requested includes be checked when the primary collection or page
    /// turns out empty.
    pub fn set_primary_kind(&mut self, kind: RecordKind) {
        self.primary_kind = Some(kind);
    }

    pub fn primary_kind(&self) -> Option<&RecordKind> {
        self.primary_kind.as_ref()
    }

    /// URL pagination links are built from.
    ///
    /// Relative URLs are joined to the configured base URL.
    pub fn set_top_resource_url(&mut self, url: &str, absolute: bool) {
        let url = if absolute {
            url.to_string()
        } else {
            self.config.url(url)
        };
        self.top_resource_url = Some(url);
    }

    pub fn top_resource_url(&self) -> Option<&str> {
        self.top_resource_url.as_deref()
    }

    /// URL of the request being served, used to derive the top resource URL.
    pub fn set_request_url(&mut self, url: impl Into<String>) {
        self.request_url = Some(url.into());
    }

    // --- Lookups used by strategies ---

    pub fn transformer_for(&self, payload: &Payload) -> Arc<dyn Transformer> {
        self.factory.make_for(payload)
    }

    /// Descriptor for a record.
    ///
    /// # Errors
    ///
    /// `EncodeError::UnresolvableResource` when no descriptor is registered.
    pub fn resource_for(&self, record: &dyn Record) -> Result<ResourceDescriptor, EncodeError> {
        self.registry
            .get_by_record(record)
            .ok_or_else(|| EncodeError::UnresolvableResource {
                kind: record.kind().to_string(),
            })
    }

    /// `{type, id}` of a record, derived when it has no descriptor.
    pub fn identify(&self, record: &dyn Record) -> ResourceIdentifier {
        match self.registry.get_by_record(record) {
            Some(descriptor) => ResourceIdentifier::new(
                self.registry.type_for_descriptor(&descriptor),
                descriptor.id(record),
            ),
            None => ResourceIdentifier::new(
                self.registry.type_maker().make_for_record(record, None),
                record.primary_key(),
            ),
        }
    }
}

/// Members of a record collection differ in kind.
fn is_variable(payload: &Payload) -> bool {
    match payload.records() {
        Some(records) => records
            .split_first()
            .is_some_and(|(first, rest)| rest.iter().any(|r| r.kind() != first.kind())),
        None => false,
    }
}

fn primary_keys(data: Option<&Value>) -> Vec<String> {
    match data {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(ResourceIdentifier::from_fragment)
            .map(|id| id.key())
            .collect(),
        Some(resource @ Value::Object(_)) => ResourceIdentifier::from_fragment(resource)
            .map(|id| vec![id.key()])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn response_status(body: &Value) -> u16 {
    match body.get("errors") {
        Some(errors) => errors
            .get(0)
            .and_then(|e| e.get("status"))
            .and_then(|s| match s {
                Value::String(s) => s.parse().ok(),
                Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
                _ => None,
            })
            .unwrap_or(500),
        None => 200,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_maker::TypeMaker;
    use serde_json::json;

    fn encoder() -> Encoder {
        Encoder::new(
            EncoderConfig::default(),
            ResourceRegistry::new(TypeMaker::default()),
        )
    }

    #[test]
    fn included_first_write_wins() {
        let mut encoder = encoder();
        assert!(encoder.add_included_data(json!({ "v": 1 }), Some("posts:1".into())));
        assert!(!encoder.add_included_data(json!({ "v": 2 }), Some("posts:1".into())));
        assert_eq!(encoder.included.len(), 1);
        assert_eq!(encoder.included[0], json!({ "v": 1 }));
    }

    #[test]
    fn anonymous_included_never_dedups() {
        let mut encoder = encoder();
        assert!(encoder.add_included_data(json!({ "v": 1 }), None));
        assert!(encoder.add_included_data(json!({ "v": 1 }), None));
        assert_eq!(encoder.included.len(), 2);
    }

    #[test]
    fn remove_included_keeps_order() {
        let mut encoder = encoder();
        encoder.add_included_data(json!(1), Some("a:1".into()));
        encoder.add_included_data(json!(2), Some("a:2".into()));
        encoder.add_included_data(json!(3), Some("a:3".into()));
        assert_eq!(encoder.remove_included_data("a:2"), Some(json!(2)));
        assert!(!encoder.has_included_data("a:2"));
        assert!(encoder.has_included_data("a:3"));
        let values: Vec<&Value> = encoder.included.values().collect();
        assert_eq!(values, vec![&json!(1), &json!(3)]);
    }

    #[test]
    fn expansion_keeps_shallowest_depth() {
        let mut encoder = encoder();
        encoder.mark_expanded("posts:1".into(), 3);
        assert!(!encoder.is_expanded_within("posts:1", 2));
        encoder.mark_expanded("posts:1".into(), 1);
        encoder.mark_expanded("posts:1".into(), 4);
        assert!(encoder.is_expanded_within("posts:1", 1));
        assert!(encoder.is_expanded_within("posts:1", 5));
        assert!(!encoder.is_expanded_within("posts:1", 0));
        assert!(!encoder.is_expanded_within("users:9", 8));

        encoder.encode(&Payload::Value(json!([1])), None).unwrap();
        assert!(!encoder.is_expanded_within("posts:1", 8));
    }

    #[test]
    fn meta_dot_paths() {
        let mut encoder = encoder();
        encoder.add_meta("page.total", json!(10));
        encoder.add_meta("page.size", json!(5));
        encoder.add_meta("version", json!("1"));
        assert_eq!(
            Value::Object(encoder.meta().clone()),
            json!({ "page": { "total": 10, "size": 5 }, "version": "1" })
        );

        assert_eq!(encoder.remove_meta_key("page.total"), Some(json!(10)));
        assert_eq!(encoder.remove_meta_key("page.missing"), None);
        assert_eq!(encoder.remove_meta_key("version.deep"), None);
        assert_eq!(
            Value::Object(encoder.meta().clone()),
            json!({ "page": { "size": 5 }, "version": "1" })
        );
    }

    #[test]
    fn include_requested_matches_prefix_paths() {
        let mut encoder = encoder();
        encoder.set_requested_includes(vec!["comments.author".into(), " tags ".into()]);
        assert!(encoder.is_include_requested("comments"));
        assert!(encoder.is_include_requested("comments.author"));
        assert!(encoder.is_include_requested("tags"));
        assert!(!encoder.is_include_requested("comment"));
        assert!(!encoder.is_include_requested("author"));
    }

    #[test]
    fn value_payload_and_state_reset() {
        let mut encoder = encoder();
        encoder.set_link("self", json!("/things"));
        encoder.add_meta("count", json!(2));
        encoder.set_top_resource_url("/things", true);

        let document = encoder
            .encode(&Payload::Value(json!([1, 2])), None)
            .unwrap();
        assert_eq!(
            document,
            json!({ "data": [1, 2], "links": { "self": "/things" }, "meta": { "count": 2 } })
        );

        assert!(encoder.links.is_empty());
        assert!(encoder.meta().is_empty());
        assert!(encoder.top_resource_url().is_none());
        let again = encoder.encode(&Payload::Value(json!("x")), None).unwrap();
        assert_eq!(again, json!({ "data": ["x"] }));
    }

    #[test]
    fn relative_top_resource_url_uses_base() {
        let config = EncoderConfig {
            base_url: "https://api.test".into(),
            ..Default::default()
        };
        let mut encoder = Encoder::new(config, ResourceRegistry::new(TypeMaker::default()));
        encoder.set_top_resource_url("posts", false);
        assert_eq!(encoder.top_resource_url(), Some("https://api.test/posts"));
    }

    #[test]
    fn response_status_from_first_error() {
        assert_eq!(response_status(&json!({ "data": null })), 200);
        assert_eq!(
            response_status(&json!({ "errors": [{ "status": "404" }, { "status": "500" }] })),
            404
        );
        assert_eq!(response_status(&json!({ "errors": [{ "title": "x" }] })), 500);
    }
}
