//! Derivation of JSON-API type strings from record kinds.

use serde_json::Value;

use crate::config::EncoderConfig;
use crate::error::EncodeError;
use crate::inflector::{dasherize, pluralize};
use crate::record::{Record, RecordKind};
use crate::types::json_type_name;

/// Separator between namespace segments and the base type.
const NAMESPACE_SEPARATOR: &str = "--";

/// Anything a type can be derived from.
#[derive(Debug, Clone, Copy)]
pub enum TypeSource<'a> {
    Record(&'a dyn Record),
    Kind(&'a RecordKind),
    /// A fully qualified kind path.
    Name(&'a str),
    /// An arbitrary value; only JSON strings are accepted.
    Value(&'a Value),
}

/// Derives stable type strings: pluralized, dash-cased short name, optionally
/// qualified by the namespace remainder after a configured prefix.
#[derive(Debug, Clone, Default)]
pub struct TypeMaker {
    namespace_prefix: Option<String>,
}

impl TypeMaker {
    pub fn new(namespace_prefix: Option<String>) -> Self {
        Self { namespace_prefix }
    }

    /// Type maker using the configured namespace prefix.
    pub fn from_config(config: &EncoderConfig) -> Self {
        Self::new(config.type_namespace_prefix.clone())
    }

    pub fn namespace_prefix(&self) -> Option<&str> {
        self.namespace_prefix.as_deref()
    }

    /// Derive a type from any supported source using the configured prefix.
    ///
    /// # Errors
    ///
    /// Returns `EncodeError::UnsupportedTypeSource` for non-string values.
    pub fn make_for(&self, source: TypeSource<'_>) -> Result<String, EncodeError> {
        match source {
            TypeSource::Record(record) => Ok(self.make_for_record(record, None)),
            TypeSource::Kind(kind) => Ok(self.make_for_kind(kind, None)),
            TypeSource::Name(name) => Ok(self.make_for_kind(&RecordKind::new(name), None)),
            TypeSource::Value(Value::String(name)) => {
                Ok(self.make_for_kind(&RecordKind::new(name.as_str()), None))
            }
            TypeSource::Value(other) => Err(EncodeError::UnsupportedTypeSource {
                actual: json_type_name(other).to_string(),
            }),
        }
    }

    /// Derive the type for a record; `prefix` overrides the configured one.
    pub fn make_for_record(&self, record: &dyn Record, prefix: Option<&str>) -> String {
        self.make_for_kind(record.kind(), prefix)
    }

    /// Derive the type for a record kind; `prefix` overrides the configured one.
    pub fn make_for_kind(&self, kind: &RecordKind, prefix: Option<&str>) -> String {
        let base = dasherize(&pluralize(kind.short_name()));
        let prefix = prefix.or(self.namespace_prefix.as_deref());

        let namespace = match prefix {
            None => return base,
            Some("") => kind.namespace(),
            Some(prefix) => match strip_namespace_prefix(kind.namespace(), prefix) {
                Some(rest) => rest,
                None => return base,
            },
        };

        if namespace.is_empty() {
            return base;
        }

        let mut segments: Vec<String> = namespace
            .split("::")
            .filter(|s| !s.is_empty())
            .map(dasherize)
            .collect();
        segments.push(base);
        segments.join(NAMESPACE_SEPARATOR)
    }
}

/// Strip `prefix` from `namespace` on a segment boundary.
fn strip_namespace_prefix<'a>(namespace: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches("::");
    let rest = namespace.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix("::")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_type() {
        let maker = TypeMaker::default();
        let kind = RecordKind::new("app::models::BlogPost");
        assert_eq!(maker.make_for_kind(&kind, None), "blog-posts");
    }

    #[test]
    fn prefix_strips_namespace() {
        let maker = TypeMaker::new(Some("app::models".into()));
        let kind = RecordKind::new("app::models::Post");
        assert_eq!(maker.make_for_kind(&kind, None), "posts");

        let nested = RecordKind::new("app::models::BlogAdmin::Post");
        assert_eq!(maker.make_for_kind(&nested, None), "blog-admin--posts");
    }

    #[test]
    fn prefix_not_matching_yields_base() {
        let maker = TypeMaker::new(Some("app::models".into()));
        let kind = RecordKind::new("vendor::billing::Invoice");
        assert_eq!(maker.make_for_kind(&kind, None), "invoices");

        // partial segment must not match
        let kind = RecordKind::new("app::modelsx::Invoice");
        assert_eq!(maker.make_for_kind(&kind, None), "invoices");
    }

    #[test]
    fn empty_prefix_uses_whole_namespace() {
        let maker = TypeMaker::new(Some(String::new()));
        let kind = RecordKind::new("app::models::Post");
        assert_eq!(maker.make_for_kind(&kind, None), "app--models--posts");
    }

    #[test]
    fn explicit_prefix_overrides_configured() {
        let maker = TypeMaker::new(Some("app".into()));
        let kind = RecordKind::new("app::models::Post");
        assert_eq!(maker.make_for_kind(&kind, None), "models--posts");
        assert_eq!(maker.make_for_kind(&kind, Some("app::models")), "posts");
    }

    #[test]
    fn deterministic() {
        let maker = TypeMaker::new(Some(String::new()));
        let kind = RecordKind::new("app::Person");
        let first = maker.make_for_kind(&kind, None);
        for _ in 0..5 {
            assert_eq!(maker.make_for_kind(&kind, None), first);
        }
        assert_eq!(first, "app--people");
    }

    #[test]
    fn make_for_sources() {
        let maker = TypeMaker::default();
        assert_eq!(
            maker.make_for(TypeSource::Name("app::Comment")).unwrap(),
            "comments"
        );
        assert_eq!(
            maker
                .make_for(TypeSource::Value(&json!("app::Category")))
                .unwrap(),
            "categories"
        );
        let result = maker.make_for(TypeSource::Value(&json!(42)));
        assert!(matches!(
            result,
            Err(EncodeError::UnsupportedTypeSource { actual }) if actual == "number"
        ));
    }
}
