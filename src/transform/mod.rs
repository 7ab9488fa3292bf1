//! Transformation strategies: record, collection, paginator, exception and
//! plain value.
//!
//! Each strategy turns one [`Payload`] into a document fragment
//! (`{"data": ...}` or `{"errors": [...]}`), recursing through the encoder for
//! related values and registering side-loaded resources with it.

mod collection;
mod exception;
mod paginator;
mod resource;
mod simple;

use serde_json::Value;

use crate::config::EncoderConfig;
use crate::encoder::Encoder;
use crate::error::EncodeError;
use crate::payload::Payload;

pub(crate) use exception::error_objects;

pub use collection::CollectionTransformer;
pub use exception::ExceptionTransformer;
pub use paginator::PaginatorTransformer;
pub use resource::ResourceTransformer;
pub use simple::SimpleTransformer;

/// Position of a transformation within the document being built.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scope {
    /// Transforming the primary data rather than a related value.
    pub is_top_level: bool,
    /// Dot-separated include path leading to this value (empty at top level).
    pub parent_path: String,
    /// Collection members may differ in kind.
    pub is_variable: bool,
}

impl Scope {
    /// Scope of the primary data.
    pub fn top_level(is_variable: bool) -> Self {
        Self {
            is_top_level: true,
            parent_path: String::new(),
            is_variable,
        }
    }

    /// Scope of a related value reached through `key`.
    pub fn nested(&self, key: &str, is_variable: bool) -> Self {
        Self {
            is_top_level: false,
            parent_path: self.path_to(key),
            is_variable,
        }
    }

    /// Include path of `key` relative to this scope.
    /// Number of include segments between the primary data and this value.
    pub fn depth(&self) -> usize {
        if self.parent_path.is_empty() {
            0
        } else {
            self.parent_path.split('.').count()
        }
    }

    pub fn path_to(&self, key: &str) -> String {
        if self.parent_path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.parent_path, key)
        }
    }
}

/// A transformation strategy.
pub trait Transformer: Send + Sync {
    /// Human-readable strategy name for logs and errors.
    fn name(&self) -> &'static str;

    fn transform(
        &self,
        encoder: &mut Encoder,
        payload: &Payload,
        scope: &Scope,
    ) -> Result<Value, EncodeError>;
}

/// How a relationship is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    /// Transform the related value and side-load it.
    Full,
    /// Emit `{type, id}` data only.
    Reference,
    /// Emit links only, no `data` member.
    LinksOnly,
}

/// Facts about one relationship that decide its [`Inclusion`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InclusionFacts {
    /// The client requested this exact path (or a path below it).
    pub requested: bool,
    /// The client requested any include at all.
    pub any_requested: bool,
    /// The key is one of the descriptor's default includes.
    pub is_default: bool,
    /// The owning record is primary data.
    pub is_top_level: bool,
    /// Number of segments in the relationship's include path.
    pub depth: usize,
    /// The descriptor's reference policy covers the key.
    pub references: bool,
}

/// Decide how to render a relationship.
///
/// Precedence: requested or eligible default → [`Inclusion::Full`]; else a
/// reference-policy hit → [`Inclusion::Reference`]; else
/// [`Inclusion::LinksOnly`].
pub fn decide_inclusion(config: &EncoderConfig, facts: InclusionFacts) -> Inclusion {
    if facts.requested {
        return Inclusion::Full;
    }

    let defaults_apply = facts.is_default
        && !(config.top_level_default_includes_only && !facts.is_top_level)
        && !(config.requested_includes_cancel_defaults && facts.any_requested)
        && facts.depth <= config.max_include_depth;

    if defaults_apply {
        Inclusion::Full
    } else if facts.references {
        Inclusion::Reference
    } else {
        Inclusion::LinksOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_paths() {
        let top = Scope::top_level(false);
        assert_eq!(top.path_to("comments"), "comments");
        let nested = top.nested("comments", true);
        assert!(!nested.is_top_level);
        assert!(nested.is_variable);
        assert_eq!(nested.path_to("author"), "comments.author");
        assert_eq!(top.depth(), 0);
        assert_eq!(nested.nested("author", false).depth(), 2);
    }

    fn facts() -> InclusionFacts {
        InclusionFacts {
            depth: 1,
            is_top_level: true,
            ..Default::default()
        }
    }

    /// (config flags, facts, expected) rows in precedence order.
    #[test]
    fn inclusion_rule_table() {
        let plain = EncoderConfig::default();
        let top_only = EncoderConfig {
            top_level_default_includes_only: true,
            ..Default::default()
        };
        let cancel = EncoderConfig {
            requested_includes_cancel_defaults: true,
            ..Default::default()
        };

        let rows: Vec<(&EncoderConfig, InclusionFacts, Inclusion)> = vec![
            // requested always wins, even over reference policy
            (&plain, InclusionFacts { requested: true, references: true, ..facts() }, Inclusion::Full),
            // requested wins even on nested levels with top-only defaults
            (&top_only, InclusionFacts { requested: true, is_top_level: false, ..facts() }, Inclusion::Full),
            // default at top level
            (&plain, InclusionFacts { is_default: true, ..facts() }, Inclusion::Full),
            // default on a nested level without top-only policy
            (&plain, InclusionFacts { is_default: true, is_top_level: false, ..facts() }, Inclusion::Full),
            // default on a nested level with top-only policy falls back
            (&top_only, InclusionFacts { is_default: true, is_top_level: false, ..facts() }, Inclusion::LinksOnly),
            (&top_only, InclusionFacts { is_default: true, is_top_level: false, references: true, ..facts() }, Inclusion::Reference),
            // requested includes cancel defaults
            (&cancel, InclusionFacts { is_default: true, any_requested: true, ..facts() }, Inclusion::LinksOnly),
            (&cancel, InclusionFacts { is_default: true, any_requested: false, ..facts() }, Inclusion::Full),
            // without cancel policy, defaults survive other requests
            (&plain, InclusionFacts { is_default: true, any_requested: true, ..facts() }, Inclusion::Full),
            // reference-only fallback
            (&plain, InclusionFacts { references: true, ..facts() }, Inclusion::Reference),
            (&plain, facts(), Inclusion::LinksOnly),
        ];

        for (i, (config, facts, expected)) in rows.into_iter().enumerate() {
            assert_eq!(decide_inclusion(config, facts), expected, "row {}", i);
        }
    }

    #[test]
    fn default_includes_stop_at_depth_cap() {
        let config = EncoderConfig {
            max_include_depth: 2,
            ..Default::default()
        };
        let deep = InclusionFacts {
            is_default: true,
            depth: 3,
            references: true,
            ..Default::default()
        };
        assert_eq!(decide_inclusion(&config, deep), Inclusion::Reference);

        let requested = InclusionFacts {
            requested: true,
            depth: 5,
            ..Default::default()
        };
        assert_eq!(decide_inclusion(&config, requested), Inclusion::Full);
    }
}
