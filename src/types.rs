//! Core types shared by the encoder and the document model.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Media type of JSON-API documents.
pub const MEDIA_TYPE: &str = "application/vnd.api+json";

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A `{type, id}` reference to a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
}

impl ResourceIdentifier {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Read `type` and `id` from a serialized resource fragment.
    ///
    /// Numeric ids are accepted and stringified.
    pub fn from_fragment(fragment: &Value) -> Option<Self> {
        let resource_type = fragment.get("type")?.as_str()?;
        let id = match fragment.get("id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(Self::new(resource_type, id))
    }

    /// Included-bag key, `"type:id"`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.resource_type, self.id)
    }

    pub fn to_value(&self) -> Value {
        json!({ "type": self.resource_type, "id": self.id })
    }
}
