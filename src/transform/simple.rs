use serde_json::{json, Value};

use super::{Scope, Transformer};
use crate::encoder::Encoder;
use crate::error::EncodeError;
use crate::payload::Payload;

/// Wraps an arbitrary value as `{"data": arrayified}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleTransformer;

impl Transformer for SimpleTransformer {
    fn name(&self) -> &'static str {
        "simple transformer"
    }

    fn transform(
        &self,
        _encoder: &mut Encoder,
        payload: &Payload,
        _scope: &Scope,
    ) -> Result<Value, EncodeError> {
        Ok(json!({ "data": arrayify(payload.to_plain()) }))
    }
}

/// Objects and arrays pass through, `null` becomes `[]`, scalars become `[scalar]`.
fn arrayify(value: Value) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => value,
        Value::Null => Value::Array(Vec::new()),
        scalar => Value::Array(vec![scalar]),
    }
}
