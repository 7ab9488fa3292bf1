//! Values handed to the encoder and their classification.
//!
//! [`Payload`] is the closed set of things the encoder knows how to turn into a
//! document. [`classify`] decides, without side effects, which built-in
//! transformation applies to a payload.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EncodeError, SchemaError};
use crate::link;
use crate::record::RecordRef;

/// Type name matched by dispatch overrides for record collections.
pub const COLLECTION_TYPE: &str = "collection";
/// Type name matched by dispatch overrides for generic lists.
pub const LIST_TYPE: &str = "list";
/// Type name matched by dispatch overrides for every paginator.
pub const PAGINATOR_TYPE: &str = "paginator";
/// Type name matched by dispatch overrides for length-aware paginators.
pub const LENGTH_AWARE_PAGINATOR_TYPE: &str = "length-aware-paginator";
/// Type name matched by dispatch overrides for every exception.
pub const EXCEPTION_TYPE: &str = "exception";
/// Type name matched by dispatch overrides for plain values.
pub const VALUE_TYPE: &str = "value";

/// Anything the encoder can transform.
#[derive(Debug, Clone)]
pub enum Payload {
    /// A single record.
    Record(RecordRef),
    /// A native record collection.
    Records(Vec<RecordRef>),
    /// A generic list that may or may not hold only records.
    List(Vec<Payload>),
    /// One page of a paginated result.
    Page(Paginator),
    /// An error to render as an error document.
    Exception(ApiException),
    /// An opaque value wrapped as `{"data": ...}`.
    Value(Value),
}

/// Built-in transformation chosen for a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Record,
    Collection,
    Exception,
    Paginated,
    Value,
}

/// Classify a payload, first match wins.
pub fn classify(payload: &Payload) -> Shape {
    match payload {
        Payload::Record(_) => Shape::Record,
        Payload::Records(_) => Shape::Collection,
        Payload::Exception(_) => Shape::Exception,
        Payload::List(items) if all_records(items) => Shape::Collection,
        Payload::Page(page) if all_records(page.items()) => Shape::Paginated,
        _ => Shape::Value,
    }
}

fn all_records(items: &[Payload]) -> bool {
    items.iter().all(|item| matches!(item, Payload::Record(_)))
}

impl Payload {
    /// Records of a record-shaped payload, `None` when any member is not a record.
    pub fn records(&self) -> Option<Vec<RecordRef>> {
        match self {
            Payload::Record(record) => Some(vec![record.clone()]),
            Payload::Records(records) => Some(records.clone()),
            Payload::List(items) => collect_records(items),
            Payload::Page(page) => collect_records(page.items()),
            _ => None,
        }
    }

    /// Names this payload "is an instance of", most specific first.
    pub fn type_names(&self) -> Vec<&str> {
        match self {
            Payload::Record(record) => record.kind().lineage().collect(),
            Payload::Records(_) => vec![COLLECTION_TYPE],
            Payload::List(_) => vec![LIST_TYPE],
            Payload::Page(page) if page.is_length_aware() => {
                vec![LENGTH_AWARE_PAGINATOR_TYPE, PAGINATOR_TYPE]
            }
            Payload::Page(_) => vec![PAGINATOR_TYPE],
            Payload::Exception(exception) => vec![exception.class.as_str(), EXCEPTION_TYPE],
            Payload::Value(_) => vec![VALUE_TYPE],
        }
    }

    /// Shallow conversion to a plain JSON value.
    pub fn to_plain(&self) -> Value {
        match self {
            Payload::Record(record) => Value::Object(record.to_map()),
            Payload::Records(records) => Value::Array(
                records
                    .iter()
                    .map(|r| Value::Object(r.to_map()))
                    .collect(),
            ),
            Payload::List(items) => Value::Array(items.iter().map(Payload::to_plain).collect()),
            Payload::Page(page) => {
                Value::Array(page.items().iter().map(Payload::to_plain).collect())
            }
            Payload::Exception(exception) => {
                let mut map = Map::new();
                map.insert("class".into(), Value::String(exception.class.clone()));
                map.insert("message".into(), Value::String(exception.message.clone()));
                Value::Object(map)
            }
            Payload::Value(value) => value.clone(),
        }
    }
}

fn collect_records(items: &[Payload]) -> Option<Vec<RecordRef>> {
    items
        .iter()
        .map(|item| match item {
            Payload::Record(record) => Some(record.clone()),
            _ => None,
        })
        .collect()
}

impl From<RecordRef> for Payload {
    fn from(record: RecordRef) -> Self {
        Payload::Record(record)
    }
}

impl From<Vec<RecordRef>> for Payload {
    fn from(records: Vec<RecordRef>) -> Self {
        Payload::Records(records)
    }
}

impl From<Paginator> for Payload {
    fn from(page: Paginator) -> Self {
        Payload::Page(page)
    }
}

impl From<ApiException> for Payload {
    fn from(exception: ApiException) -> Self {
        Payload::Exception(exception)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Value(value)
    }
}

/// One page of results plus the information needed to link other pages.
#[derive(Debug, Clone)]
pub struct Paginator {
    items: Vec<Payload>,
    current_page: u64,
    per_page: u64,
    total: Option<u64>,
    path: String,
    page_name: String,
}

impl Paginator {
    /// Paginator that does not know the total count.
    pub fn simple(items: Vec<Payload>, per_page: u64, current_page: u64) -> Self {
        Self {
            items,
            current_page: current_page.max(1),
            per_page: per_page.max(1),
            total: None,
            path: String::from("/"),
            page_name: String::from("page"),
        }
    }

    /// Paginator that knows the total count (and so the last page).
    pub fn length_aware(items: Vec<Payload>, total: u64, per_page: u64, current_page: u64) -> Self {
        Self {
            total: Some(total),
            ..Self::simple(items, per_page, current_page)
        }
    }

    /// Base path used by the paginator's own URL builder.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_page_name(mut self, name: impl Into<String>) -> Self {
        self.page_name = name.into();
        self
    }

    pub fn items(&self) -> &[Payload] {
        &self.items
    }

    pub fn current_page(&self) -> u64 {
        self.current_page
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn is_length_aware(&self) -> bool {
        self.total.is_some()
    }

    pub fn first_page(&self) -> u64 {
        1
    }

    /// Last page, `None` for simple paginators.
    pub fn last_page(&self) -> Option<u64> {
        self.total
            .map(|total| total.div_ceil(self.per_page).max(1))
    }

    pub fn has_more_pages(&self) -> bool {
        match self.last_page() {
            Some(last) => self.current_page < last,
            None => false,
        }
    }

    /// Native URL for a page number.
    pub fn url(&self, page: u64) -> String {
        link::with_query_param(&self.path, &self.page_name, page)
    }
}

/// An error value to be rendered as a JSON-API error document.
#[derive(Debug, Clone)]
pub struct ApiException {
    /// Exception class name, e.g. `ModelNotFoundException`.
    pub class: String,
    pub message: String,
    pub code: i64,
    /// Status the exception itself reports, if any.
    pub status: Option<u16>,
    pub kind: ExceptionKind,
}

/// Exception variants that change how errors are produced.
#[derive(Debug, Clone)]
pub enum ExceptionKind {
    Generic,
    /// Field → messages. `pointer_prefix` overrides the configured prefix.
    Validation {
        messages: IndexMap<String, Vec<String>>,
        pointer_prefix: Option<String>,
    },
    /// Carries an already built HTTP response; its status wins.
    Response { status: u16 },
    /// Already built error objects, emitted as-is.
    Errors(Vec<ErrorObject>),
}

impl ApiException {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
            code: 0,
            status: None,
            kind: ExceptionKind::Generic,
        }
    }

    /// Exception reporting an HTTP status of its own.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new("HttpException", message)
        }
    }

    /// Validation failure with messages per field.
    pub fn validation(messages: IndexMap<String, Vec<String>>) -> Self {
        Self {
            status: Some(422),
            kind: ExceptionKind::Validation {
                messages,
                pointer_prefix: None,
            },
            ..Self::new("ValidationException", "The given data was invalid.")
        }
    }

    /// Exception wrapping a prepared response.
    pub fn response(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ExceptionKind::Response { status },
            ..Self::new("HttpResponseException", message)
        }
    }

    /// Pre-built error payload.
    pub fn errors(errors: Vec<ErrorObject>) -> Self {
        Self {
            kind: ExceptionKind::Errors(errors),
            ..Self::new("ErrorPayload", "")
        }
    }

    /// Schema validation failures, pointers taken verbatim.
    pub fn from_schema_errors(errors: &[SchemaError]) -> Self {
        let mut messages: IndexMap<String, Vec<String>> = IndexMap::new();
        for error in errors {
            messages
                .entry(error.path.clone())
                .or_default()
                .push(error.message.clone());
        }
        Self {
            status: Some(422),
            kind: ExceptionKind::Validation {
                messages,
                pointer_prefix: Some(String::new()),
            },
            ..Self::new("SchemaValidationException", "The document does not match the schema.")
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = code;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl From<EncodeError> for ApiException {
    fn from(err: EncodeError) -> Self {
        ApiException::new(err.name(), err.to_string()).with_status(err.status())
    }
}

/// `source` member of an error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSource {
    pub pointer: String,
}

/// One JSON-API error object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
}
