//! Inbound document validation against JSON Schemas.
//!
//! Only the contract is fixed here: a document is checked against a schema and
//! every failure is reported with a JSON pointer. Failures convert into a
//! validation [`ApiException`] so they can be rendered as an error document.

use std::path::Path;

use serde_json::{json, Value};

use crate::error::{SchemaError, ValidateError};
use crate::loader::load_json;
use crate::payload::ApiException;

/// Minimal schema of a JSON-API top-level document.
///
/// Requires at least one of `data`, `errors` or `meta`, forbids `data`
/// alongside `errors`, and checks resource and error object shapes.
pub fn envelope_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "anyOf": [
            { "required": ["data"] },
            { "required": ["errors"] },
            { "required": ["meta"] }
        ],
        "not": { "required": ["data", "errors"] },
        "properties": {
            "data": {
                "oneOf": [
                    { "type": "null" },
                    { "$ref": "#/$defs/resource" },
                    { "type": "array", "items": { "$ref": "#/$defs/resource" } }
                ]
            },
            "included": { "type": "array", "items": { "$ref": "#/$defs/resource" } },
            "errors": { "type": "array", "items": { "$ref": "#/$defs/error" } },
            "links": { "type": "object" },
            "meta": { "type": "object" },
            "jsonapi": { "type": "object" }
        },
        "$defs": {
            "resource": {
                "type": "object",
                "required": ["type"],
                "properties": {
                    "id": { "type": "string" },
                    "type": { "type": "string" },
                    "attributes": { "type": "object" },
                    "relationships": {
                        "type": "object",
                        "additionalProperties": { "$ref": "#/$defs/relationship" }
                    },
                    "links": { "type": "object" },
                    "meta": { "type": "object" }
                }
            },
            "relationship": {
                "type": "object",
                "properties": {
                    "data": {
                        "oneOf": [
                            { "type": "null" },
                            { "$ref": "#/$defs/identifier" },
                            { "type": "array", "items": { "$ref": "#/$defs/identifier" } }
                        ]
                    },
                    "links": { "type": "object" },
                    "meta": { "type": "object" }
                }
            },
            "identifier": {
                "type": "object",
                "required": ["type", "id"],
                "properties": {
                    "type": { "type": "string" },
                    "id": { "type": "string" }
                }
            },
            "error": {
                "type": "object",
                "properties": {
                    "status": { "type": "string" },
                    "code": { "type": "string" },
                    "title": { "type": "string" },
                    "detail": { "type": "string" },
                    "source": { "type": "object" }
                }
            }
        }
    })
}

/// Validate a document against a schema.
///
/// # Errors
///
/// Returns `ValidateError::InvalidSchema` if the schema does not compile, or
/// `ValidateError::Invalid` with every failure if the document doesn't match.
pub fn validate_against_schema(schema: &Value, document: &Value) -> Result<(), ValidateError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| ValidateError::InvalidSchema {
        message: e.to_string(),
    })?;

    let errors: Vec<SchemaError> = validator
        .iter_errors(document)
        .map(|e| SchemaError {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        tracing::debug!(errors = errors.len(), "document failed validation");
        Err(ValidateError::Invalid { errors })
    }
}

/// Validate a document file, against `schema` or the envelope schema.
pub fn validate_file(document: &Path, schema: Option<&Path>) -> Result<(), ValidateError> {
    let document = load_json(document)?;
    let schema = match schema {
        Some(path) => load_json(path)?,
        None => envelope_schema(),
    };
    validate_against_schema(&schema, &document)
}

/// Error document source for a validation failure.
pub fn validation_exception(err: &ValidateError) -> ApiException {
    match err {
        ValidateError::Invalid { errors } => ApiException::from_schema_errors(errors),
        ValidateError::InvalidSchema { message } => {
            ApiException::new("InvalidSchema", message.clone()).with_status(500)
        }
        ValidateError::Load(e) => ApiException::new("InvalidDocument", e.to_string()).with_status(400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::ExceptionKind;

    #[test]
    fn valid_resource_document() {
        let document = json!({
            "data": {
                "type": "posts",
                "id": "1",
                "attributes": { "title": "Hello" },
                "relationships": {
                    "author": { "data": { "type": "people", "id": "9" } }
                }
            }
        });
        assert!(validate_against_schema(&envelope_schema(), &document).is_ok());
    }

    #[test]
    fn data_and_errors_together_rejected() {
        let document = json!({ "data": null, "errors": [] });
        let result = validate_against_schema(&envelope_schema(), &document);
        assert!(matches!(result, Err(ValidateError::Invalid { .. })));
    }

    #[test]
    fn empty_document_rejected() {
        let result = validate_against_schema(&envelope_schema(), &json!({}));
        assert!(matches!(result, Err(ValidateError::Invalid { .. })));
    }

    #[test]
    fn errors_carry_pointers() {
        let schema = json!({
            "type": "object",
            "properties": {
                "data": {
                    "type": "object",
                    "properties": { "type": { "type": "string" } }
                }
            }
        });
        let document = json!({ "data": { "type": 7 } });
        match validate_against_schema(&schema, &document) {
            Err(ValidateError::Invalid { errors }) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].path, "/data/type");
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn invalid_schema_reported() {
        let schema = json!({ "type": "not-a-type" });
        let result = validate_against_schema(&schema, &json!({}));
        assert!(matches!(result, Err(ValidateError::InvalidSchema { .. })));
    }

    #[test]
    fn failures_become_validation_exception() {
        let err = ValidateError::Invalid {
            errors: vec![SchemaError {
                path: "/data/type".into(),
                message: "7 is not of type \"string\"".into(),
            }],
        };
        let exception = validation_exception(&err);
        assert_eq!(exception.status, Some(422));
        assert!(matches!(exception.kind, ExceptionKind::Validation { .. }));
    }
}
