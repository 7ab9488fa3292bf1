//! Transformer dispatch.
//!
//! Overrides registered by type name are consulted first, using each
//! payload's "is an instance of" names, so an override for a base kind or a
//! generic payload type also covers its specializations. Without a matching
//! override the pure [`classify`] result picks a built-in strategy.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::payload::{classify, Payload, Shape};
use crate::transform::{
    CollectionTransformer, ExceptionTransformer, PaginatorTransformer, ResourceTransformer,
    SimpleTransformer, Transformer,
};

/// Picks the transformation strategy for a payload.
#[derive(Clone)]
pub struct TransformerFactory {
    overrides: IndexMap<String, Arc<dyn Transformer>>,
    resource: Arc<dyn Transformer>,
    collection: Arc<dyn Transformer>,
    paginator: Arc<dyn Transformer>,
    exception: Arc<dyn Transformer>,
    simple: Arc<dyn Transformer>,
}

impl Default for TransformerFactory {
    fn default() -> Self {
        Self {
            overrides: IndexMap::new(),
            resource: Arc::new(ResourceTransformer),
            collection: Arc::new(CollectionTransformer),
            paginator: Arc::new(PaginatorTransformer),
            exception: Arc::new(ExceptionTransformer),
            simple: Arc::new(SimpleTransformer),
        }
    }
}

impl TransformerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `transformer` for payloads that are instances of `type_name`.
    ///
    /// `type_name` is a record kind path, an exception class, or one of the
    /// payload type constants such as [`PAGINATOR_TYPE`](crate::payload::PAGINATOR_TYPE).
    pub fn with_override(
        mut self,
        type_name: impl Into<String>,
        transformer: impl Transformer + 'static,
    ) -> Self {
        self.overrides.insert(type_name.into(), Arc::new(transformer));
        self
    }

    /// Strategy for `payload`, first match wins.
    pub fn make_for(&self, payload: &Payload) -> Arc<dyn Transformer> {
        if !self.overrides.is_empty() {
            for name in payload.type_names() {
                if let Some(transformer) = self.overrides.get(name) {
                    tracing::trace!(type_name = name, transformer = transformer.name(), "dispatch override");
                    return Arc::clone(transformer);
                }
            }
        }

        let shape = classify(payload);
        tracing::trace!(?shape, "dispatch");
        let transformer = match shape {
            Shape::Record => &self.resource,
            Shape::Collection => &self.collection,
            Shape::Paginated => &self.paginator,
            Shape::Exception => &self.exception,
            Shape::Value => &self.simple,
        };
        Arc::clone(transformer)
    }
}

impl std::fmt::Debug for TransformerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformerFactory")
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use crate::error::EncodeError;
    use crate::payload::{ApiException, Paginator, PAGINATOR_TYPE};
    use crate::store::{MemoryStore, Model};
    use crate::transform::Scope;
    use serde_json::{json, Value};

    struct Named(&'static str);

    impl Transformer for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn transform(
            &self,
            _encoder: &mut Encoder,
            _payload: &Payload,
            _scope: &Scope,
        ) -> Result<Value, EncodeError> {
            Ok(json!({ "data": self.0 }))
        }
    }

    fn admin() -> Payload {
        let store = MemoryStore::new();
        store.insert(Model::new("app::Admin", "1").extends("app::User"));
        Payload::Record(store.get("app::Admin", "1").unwrap())
    }

    #[test]
    fn builtin_strategies() {
        let factory = TransformerFactory::new();
        assert_eq!(factory.make_for(&admin()).name(), "resource transformer");
        assert_eq!(
            factory.make_for(&Payload::Records(Vec::new())).name(),
            "collection transformer"
        );
        assert_eq!(
            factory
                .make_for(&Payload::Exception(ApiException::new("E", "")))
                .name(),
            "exception transformer"
        );
        assert_eq!(
            factory
                .make_for(&Payload::Page(Paginator::simple(Vec::new(), 1, 1)))
                .name(),
            "paginator transformer"
        );
        assert_eq!(
            factory.make_for(&Payload::Value(json!(1))).name(),
            "simple transformer"
        );
    }

    #[test]
    fn override_matches_ancestor_kind() {
        let factory = TransformerFactory::new().with_override("app::User", Named("users"));
        assert_eq!(factory.make_for(&admin()).name(), "users");
    }

    #[test]
    fn override_matches_generic_paginator() {
        let factory = TransformerFactory::new().with_override(PAGINATOR_TYPE, Named("pages"));
        let page = Paginator::length_aware(Vec::new(), 0, 10, 1);
        assert_eq!(factory.make_for(&Payload::Page(page)).name(), "pages");
    }

    #[test]
    fn override_wins_over_builtin_exception() {
        let factory = TransformerFactory::new().with_override("NotFound", Named("not-found"));
        let exception = Payload::Exception(ApiException::new("NotFound", "gone"));
        assert_eq!(factory.make_for(&exception).name(), "not-found");

        let other = Payload::Exception(ApiException::new("Other", "gone"));
        assert_eq!(factory.make_for(&other).name(), "exception transformer");
    }
}
