//! JSON-API documents
//!
//! Encoding of domain records into JSON-API compound documents, and lazy
//! parsing of inbound JSON-API documents into typed nodes.
//!
//! Records come from an opaque record store through the [`Record`] trait.
//! Each record kind is described by a [`ResourceDescriptor`] held in a
//! [`ResourceRegistry`]; an [`Encoder`] dispatches a [`Payload`] to a
//! transformation strategy and assembles `data`, `included`, `links` and
//! `meta`.
//!
//! # Example
//!
//! ```
//! use jsonapi_doc::{
//!     Encoder, EncoderConfig, MemoryStore, Model, Payload, RecordKind, ResourceDescriptor,
//!     ResourceRegistry, TypeMaker,
//! };
//! use serde_json::json;
//!
//! let store = MemoryStore::new();
//! store.insert(Model::new("app::Post", "1").attr("title", json!("Hello")));
//!
//! let mut registry = ResourceRegistry::new(TypeMaker::default());
//! registry.register(ResourceDescriptor::new(RecordKind::new("app::Post")).attributes(["title"]));
//!
//! let mut encoder = Encoder::new(EncoderConfig::default(), registry);
//! let post = store.get("app::Post", "1").unwrap();
//! let document = encoder.encode(&Payload::Record(post), None).unwrap();
//!
//! assert_eq!(
//!     document,
//!     json!({ "data": { "id": "1", "type": "posts", "attributes": { "title": "Hello" } } })
//! );
//! ```
//!
//! # Inclusion Rules
//!
//! | Relationship | Result |
//! |--------------|--------|
//! | requested (or below a requested path) | full inclusion, side-loaded in `included` |
//! | default include, allowed at this depth | full inclusion |
//! | covered by the reference policy | `{type, id}` data only |
//! | otherwise | links only |

mod config;
mod descriptor;
mod document;
mod encoder;
mod error;
mod factory;
mod inflector;
mod link;
mod loader;
mod payload;
mod query;
mod record;
mod registry;
mod store;
mod transform;
mod type_maker;
mod types;
mod validator;

pub use config::EncoderConfig;
pub use descriptor::{
    Accessor, IncludeDeclaration, MetaProvider, ReferencePolicy, RelationDescriptor,
    ResourceDefinition, ResourceDescriptor,
};
pub use document::{Data, Document, ErrorNode, NodeId, NodeKind, Relationship, Resource, RootType};
pub use encoder::{ApiResponse, Encoder};
pub use error::{ConfigError, DocumentError, EncodeError, SchemaError, ValidateError};
pub use factory::TransformerFactory;
pub use inflector::{dasherize, humanize, pluralize};
pub use link::{join, with_query_param};
pub use loader::{json_files_in, load_json, load_json_str};
pub use payload::{
    classify, ApiException, ErrorObject, ErrorSource, ExceptionKind, Paginator,
    Payload, Shape, COLLECTION_TYPE, EXCEPTION_TYPE, LENGTH_AWARE_PAGINATOR_TYPE, LIST_TYPE,
    PAGINATOR_TYPE, VALUE_TYPE,
};
pub use query::{
    disallowed_sort, effective_sort, parse_fieldsets, parse_includes, parse_sort, SortDirection,
    SortField,
};
pub use record::{Cardinality, Record, RecordKind, RecordRef, Related, RelationHandle};
pub use registry::{DefinitionDir, ResourceRegistry, ResourceSource};
pub use store::{Fixture, FixtureData, MemoryStore, Model, ModelKey, RelationSpec};
pub use transform::{
    decide_inclusion, CollectionTransformer, ExceptionTransformer, Inclusion, InclusionFacts,
    PaginatorTransformer, ResourceTransformer, Scope, SimpleTransformer, Transformer,
};
pub use type_maker::{TypeMaker, TypeSource};
pub use types::{json_type_name, ResourceIdentifier, MEDIA_TYPE};
pub use validator::{envelope_schema, validate_against_schema, validate_file, validation_exception};
