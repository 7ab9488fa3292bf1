//! Single-record transformation: attributes, relationships, side-loading.

use serde_json::{Map, Value};

use super::{decide_inclusion, Inclusion, InclusionFacts, Scope, Transformer};
use crate::descriptor::{RelationDescriptor, ResourceDescriptor};
use crate::encoder::Encoder;
use crate::error::EncodeError;
use crate::inflector::dasherize;
use crate::payload::Payload;
use crate::record::{Record, RecordKind, RecordRef, Related, RelationHandle};
use crate::types::{json_type_name, ResourceIdentifier};

/// Transforms one record into `{"data": resource}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceTransformer;

impl Transformer for ResourceTransformer {
    fn name(&self) -> &'static str {
        "resource transformer"
    }

    fn transform(
        &self,
        encoder: &mut Encoder,
        payload: &Payload,
        scope: &Scope,
    ) -> Result<Value, EncodeError> {
        let Payload::Record(record) = payload else {
            return Err(EncodeError::UnsupportedPayload {
                transformer: self.name(),
                actual: format!("{:?}", crate::payload::classify(payload)),
            });
        };

        let descriptor = encoder.resource_for(record.as_ref())?;
        let data = serialize_record(encoder, record, &descriptor, scope)?;

        let mut fragment = Map::new();
        fragment.insert("data".into(), data);
        Ok(Value::Object(fragment))
    }
}

/// Serialize `record` as a resource object using `descriptor`.
pub(crate) fn serialize_record(
    encoder: &mut Encoder,
    record: &RecordRef,
    descriptor: &ResourceDescriptor,
    scope: &Scope,
) -> Result<Value, EncodeError> {
    let resource_type = encoder.registry().type_for_descriptor(descriptor);
    descriptor.check_default_includes(&resource_type)?;
    check_requested_includes(encoder, descriptor, &resource_type, scope)?;

    let id = descriptor.id(record.as_ref());
    encoder.mark_expanded(format!("{}:{}", resource_type, id), scope.depth());

    let mut resource = Map::new();
    resource.insert("id".into(), Value::String(id.clone()));
    resource.insert("type".into(), Value::String(resource_type.clone()));

    let attributes = serialize_attributes(encoder, record.as_ref(), descriptor, &resource_type);
    if !attributes.is_empty() {
        resource.insert("attributes".into(), Value::Object(attributes));
    }

    let relationships = serialize_relationships(
        encoder,
        record.as_ref(),
        descriptor,
        &ResourceIdentifier::new(resource_type, id),
        scope,
    )?;
    if !relationships.is_empty() {
        resource.insert("relationships".into(), Value::Object(relationships));
    }

    let meta = descriptor.resource_meta(record.as_ref());
    if !meta.is_empty() {
        resource.insert("meta".into(), Value::Object(meta));
    }

    Ok(Value::Object(resource))
}

/// Every requested path continuing below this scope must name an available include.
fn check_requested_includes(
    encoder: &Encoder,
    descriptor: &ResourceDescriptor,
    resource_type: &str,
    scope: &Scope,
) -> Result<(), EncodeError> {
    for path in encoder.requested_includes() {
        let rest = if scope.parent_path.is_empty() {
            Some(path.as_str())
        } else {
            path.strip_prefix(scope.parent_path.as_str())
                .and_then(|rest| rest.strip_prefix('.'))
        };
        let Some(rest) = rest else { continue };
        let key = rest.split('.').next().unwrap_or(rest);
        if !descriptor.has_include(key) {
            return Err(EncodeError::InvalidIncludeKey {
                key: key.to_string(),
                resource_type: resource_type.to_string(),
            });
        }
    }
    Ok(())
}

/// Check requested includes below `scope` when no record of `kind` was reached.
///
/// Kinds without a descriptor are skipped.
pub(crate) fn check_requested_includes_for_kind(
    encoder: &Encoder,
    kind: &RecordKind,
    scope: &Scope,
) -> Result<(), EncodeError> {
    let Some(descriptor) = encoder.registry().get_by_kind(kind) else {
        tracing::debug!(%kind, "no descriptor to check requested includes against");
        return Ok(());
    };
    let resource_type = encoder.registry().type_for_descriptor(&descriptor);
    check_requested_includes(encoder, &descriptor, &resource_type, scope)
}

fn serialize_attributes(
    encoder: &Encoder,
    record: &dyn Record,
    descriptor: &ResourceDescriptor,
    resource_type: &str,
) -> Map<String, Value> {
    let fieldset = encoder.fieldset(resource_type);
    let mut attributes = Map::new();

    for name in descriptor.available_attributes() {
        let key = dasherize(name);
        if let Some(fields) = fieldset {
            if !fields.iter().any(|f| f == name || *f == key) {
                continue;
            }
        }

        let mut value = descriptor.attribute_value(record, name);
        if descriptor.is_date(name) {
            value = format_date(&value, &encoder.config().datetime_format);
        }
        attributes.insert(key, value);
    }

    attributes
}

/// Reformat an RFC 3339 / `Y-m-d H:M:S` string or a unix timestamp.
///
/// Values that are neither are returned unchanged.
fn format_date(value: &Value, format: &str) -> Value {
    use chrono::{DateTime, NaiveDateTime, Utc};

    let parsed: Option<DateTime<chrono::FixedOffset>> = match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok().or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc().fixed_offset())
        }),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .map(|dt| dt.fixed_offset()),
        _ => None,
    };

    match parsed {
        Some(dt) => Value::String(dt.format(format).to_string()),
        None => value.clone(),
    }
}

fn serialize_relationships(
    encoder: &mut Encoder,
    record: &dyn Record,
    descriptor: &ResourceDescriptor,
    owner: &ResourceIdentifier,
    scope: &Scope,
) -> Result<Map<String, Value>, EncodeError> {
    let mut relationships = Map::new();

    for key in descriptor.available_includes().keys() {
        let (relation, handle) = descriptor.relation(record, key)?;
        let path = scope.path_to(key);

        let mut object = Map::new();
        let links = relationship_links(encoder, owner, &relation);
        if !links.is_empty() {
            object.insert("links".into(), Value::Object(links));
        }

        let facts = InclusionFacts {
            requested: encoder.is_include_requested(&path),
            any_requested: !encoder.requested_includes().is_empty(),
            is_default: descriptor.is_default_include(key),
            is_top_level: scope.is_top_level,
            depth: path.split('.').count(),
            references: descriptor.references().applies_to(key),
        };
        if facts.is_default && !facts.requested && facts.depth > encoder.config().max_include_depth {
            tracing::debug!(%path, "default include past depth cap");
        }
        let inclusion = decide_inclusion(encoder.config(), facts);
        tracing::trace!(%path, ?inclusion, "relationship");

        match inclusion {
            Inclusion::Full => {
                let data = include_related(encoder, &relation, &handle, scope, facts.requested)?;
                object.insert("data".into(), data);
            }
            Inclusion::Reference => {
                object.insert("data".into(), reference_data(encoder, &relation, &handle));
            }
            Inclusion::LinksOnly => {}
        }

        if !object.is_empty() {
            relationships.insert(key.clone(), Value::Object(object));
        }
    }

    Ok(relationships)
}

fn relationship_links(
    encoder: &Encoder,
    owner: &ResourceIdentifier,
    relation: &RelationDescriptor,
) -> Map<String, Value> {
    let config = encoder.config();
    let base = format!("{}/{}", owner.resource_type, owner.id);
    let mut links = Map::new();

    if config.relationship_links {
        let url = config.url(&format!(
            "{}/{}/{}",
            base, config.relationships_segment, relation.key
        ));
        links.insert("self".into(), Value::String(url));
    }
    if config.related_links && !relation.variable {
        let url = config.url(&format!("{}/{}", base, relation.key));
        links.insert("related".into(), Value::String(url));
    }

    links
}

/// Transform the related value fully, side-load it, return its identifiers.
///
/// Outside requested paths, related resources already serialized at this
/// depth or shallower are referenced instead of serialized again.
fn include_related(
    encoder: &mut Encoder,
    relation: &RelationDescriptor,
    handle: &RelationHandle,
    scope: &Scope,
    requested: bool,
) -> Result<Value, EncodeError> {
    let child_scope = scope.nested(&relation.key, relation.variable);
    let depth = child_scope.depth();

    let payload = match handle.load() {
        Related::One(Some(record)) => {
            if !requested {
                let identifier = encoder.identify(record.as_ref());
                if encoder.is_expanded_within(&identifier.key(), depth) {
                    tracing::trace!(
                        path = %child_scope.parent_path,
                        key = %identifier.key(),
                        "already serialized"
                    );
                    return Ok(identifier.to_value());
                }
            }
            Payload::Record(record)
        }
        Related::One(None) => {
            check_unreached(encoder, relation, &child_scope)?;
            return Ok(Value::Null);
        }
        Related::Many(records) if records.is_empty() => {
            check_unreached(encoder, relation, &child_scope)?;
            return Ok(Value::Array(Vec::new()));
        }
        Related::Many(records) => {
            if !requested {
                let identifiers: Vec<ResourceIdentifier> = records
                    .iter()
                    .map(|record| encoder.identify(record.as_ref()))
                    .collect();
                if identifiers
                    .iter()
                    .any(|identifier| encoder.is_expanded_within(&identifier.key(), depth))
                {
                    return include_unexpanded(encoder, relation, records, identifiers, &child_scope);
                }
            }
            Payload::Records(records)
        }
    };

    let transformer = encoder.transformer_for(&payload);
    let fragment = transformer.transform(encoder, &payload, &child_scope)?;
    Ok(side_load_data(encoder, relation, &fragment))
}

/// Serialize only the members not yet serialized at this depth and reference
/// every member.
fn include_unexpanded(
    encoder: &mut Encoder,
    relation: &RelationDescriptor,
    records: Vec<RecordRef>,
    identifiers: Vec<ResourceIdentifier>,
    scope: &Scope,
) -> Result<Value, EncodeError> {
    let depth = scope.depth();
    let fresh: Vec<RecordRef> = records
        .into_iter()
        .zip(&identifiers)
        .filter(|(_, identifier)| !encoder.is_expanded_within(&identifier.key(), depth))
        .map(|(record, _)| record)
        .collect();

    if !fresh.is_empty() {
        let payload = Payload::Records(fresh);
        let transformer = encoder.transformer_for(&payload);
        let fragment = transformer.transform(encoder, &payload, scope)?;
        side_load_data(encoder, relation, &fragment);
    }

    Ok(Value::Array(
        identifiers.iter().map(ResourceIdentifier::to_value).collect(),
    ))
}

/// Requested includes continuing below an empty relation must still be valid.
fn check_unreached(
    encoder: &Encoder,
    relation: &RelationDescriptor,
    scope: &Scope,
) -> Result<(), EncodeError> {
    match &relation.related_kind {
        Some(kind) => check_requested_includes_for_kind(encoder, kind, scope),
        None => Ok(()),
    }
}

/// Side-load every resource in a related fragment's `data`, returning the
/// identifiers in the same shape.
fn side_load_data(encoder: &mut Encoder, relation: &RelationDescriptor, fragment: &Value) -> Value {
    match fragment.get("data") {
        Some(Value::Array(resources)) => Value::Array(
            resources
                .iter()
                .filter_map(|resource| side_load(encoder, resource))
                .collect(),
        ),
        Some(resource @ Value::Object(_)) => side_load(encoder, resource).unwrap_or(Value::Null),
        Some(Value::Null) | None => Value::Null,
        Some(other) => {
            tracing::warn!(
                key = %relation.key,
                actual = json_type_name(other),
                "related transform produced non-resource data"
            );
            Value::Null
        }
    }
}

/// Register an identifiable resource with the encoder, returning its identifier.
fn side_load(encoder: &mut Encoder, resource: &Value) -> Option<Value> {
    let identifier = ResourceIdentifier::from_fragment(resource)?;
    encoder.add_included_data(resource.clone(), Some(identifier.key()));
    Some(identifier.to_value())
}

/// `{type, id}` data without transforming the related value.
fn reference_data(
    encoder: &Encoder,
    relation: &RelationDescriptor,
    handle: &RelationHandle,
) -> Value {
    if relation.singular && !relation.variable {
        if let (Some(id), Some(kind)) = (handle.foreign_key_value(), &relation.related_kind) {
            let resource_type = encoder.registry().type_for_kind(kind);
            return ResourceIdentifier::new(resource_type, id).to_value();
        }
    }

    match handle.load() {
        Related::One(Some(record)) => encoder.identify(record.as_ref()).to_value(),
        Related::One(None) => Value::Null,
        Related::Many(records) => Value::Array(
            records
                .iter()
                .map(|record| encoder.identify(record.as_ref()).to_value())
                .collect(),
        ),
    }
}
