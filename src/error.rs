//! Error types for JSON-API encoding, document parsing and validation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning domain values into a JSON-API document.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("no resource registered for record kind '{kind}'")]
    UnresolvableResource { kind: String },

    #[error("include '{key}' is not available on resource type '{resource_type}'")]
    InvalidIncludeKey { key: String, resource_type: String },

    #[error("cannot derive a resource type from {actual}")]
    UnsupportedTypeSource { actual: String },

    #[error("relation '{relation}' on '{kind}' does not declare a related record kind")]
    UnresolvableRelatedKind { kind: String, relation: String },

    #[error("record kind '{kind}' has no relation named '{relation}'")]
    UnknownRelation { kind: String, relation: String },

    #[error("{transformer} cannot transform {actual}")]
    UnsupportedPayload {
        transformer: &'static str,
        actual: String,
    },
}

impl EncodeError {
    /// HTTP status used when the failure is rendered as an error document.
    pub fn status(&self) -> u16 {
        match self {
            EncodeError::InvalidIncludeKey { .. } => 400,
            _ => 500,
        }
    }

    /// Short name of the failure, used as the error "class" when re-encoded.
    pub fn name(&self) -> &'static str {
        match self {
            EncodeError::UnresolvableResource { .. } => "UnresolvableResource",
            EncodeError::InvalidIncludeKey { .. } => "InvalidIncludeKey",
            EncodeError::UnsupportedTypeSource { .. } => "UnsupportedTypeSource",
            EncodeError::UnresolvableRelatedKind { .. } => "UnresolvableRelatedKind",
            EncodeError::UnknownRelation { .. } => "UnknownRelation",
            EncodeError::UnsupportedPayload { .. } => "UnsupportedPayload",
        }
    }
}

/// Errors raised while reading an inbound JSON-API document.
#[derive(Debug, Error)]
pub enum DocumentError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("document root must be an object, got {actual}")]
    NotAnObject { actual: String },

    #[error("invalid nested data at {path}: expected object or array, got {actual}")]
    InvalidNestedDataShape { path: String, actual: String },

    #[error("node handle belongs to another document")]
    ForeignNode,
}

impl DocumentError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            DocumentError::FileNotFound { .. } | DocumentError::ReadError { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors while loading or checking an [`EncoderConfig`](crate::EncoderConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] DocumentError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConfigError::Load(e) => e.exit_code(),
            ConfigError::Invalid(_) => 2,
        }
    }
}

/// Errors during document validation.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error(transparent)]
    Load(#[from] DocumentError),

    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    #[error("validation failed with {} error(s)", errors.len())]
    Invalid { errors: Vec<SchemaError> },
}

/// Single validation error with path context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchemaError {
    /// JSON Pointer (RFC 6901) to the invalid member.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl ValidateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidateError::Load(e) => e.exit_code(),
            ValidateError::InvalidSchema { .. } => 2,
            ValidateError::Invalid { .. } => 1,
        }
    }
}
