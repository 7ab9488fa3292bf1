use serde_json::{json, Value};

use super::resource::{check_requested_includes_for_kind, serialize_record};
use super::{Scope, Transformer};
use crate::descriptor::ResourceDescriptor;
use crate::encoder::Encoder;
use crate::error::EncodeError;
use crate::payload::{classify, Payload};

/// Transforms a record collection into `{"data": [resource, ...]}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionTransformer;

impl Transformer for CollectionTransformer {
    fn name(&self) -> &'static str {
        "collection transformer"
    }

    fn transform(
        &self,
        encoder: &mut Encoder,
        payload: &Payload,
        scope: &Scope,
    ) -> Result<Value, EncodeError> {
        let records = payload
            .records()
            .ok_or_else(|| EncodeError::UnsupportedPayload {
                transformer: self.name(),
                actual: format!("{:?}", classify(payload)),
            })?;

        if records.is_empty() {
            if scope.is_top_level {
                if let Some(kind) = encoder.primary_kind() {
                    check_requested_includes_for_kind(encoder, kind, scope)?;
                }
            }
            return Ok(json!({ "data": [] }));
        }

        // One registry lookup for homogeneous collections.
        let mut shared: Option<ResourceDescriptor> = None;
        if !scope.is_variable {
            shared = Some(encoder.resource_for(records[0].as_ref())?);
        }

        let mut data = Vec::with_capacity(records.len());
        for record in &records {
            let descriptor = match &shared {
                Some(d) if d.kind().path() == record.kind().path() => d.clone(),
                _ => encoder.resource_for(record.as_ref())?,
            };
            data.push(serialize_record(encoder, record, &descriptor, scope)?);
        }

        Ok(json!({ "data": data }))
    }
}
