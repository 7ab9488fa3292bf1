//! Query parameter parsing: `include`, `sort` and `fields[type]`.

use std::collections::HashMap;

use crate::config::EncoderConfig;
use crate::descriptor::ResourceDescriptor;

/// Sort direction of one sort field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One field of a `sort` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

impl SortField {
    pub fn is_descending(&self) -> bool {
        self.direction == SortDirection::Descending
    }
}

fn split<'a>(value: &'a str, separator: &'a str) -> impl Iterator<Item = String> + 'a {
    value
        .split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Split an `include` parameter into paths.
pub fn parse_includes(value: &str, config: &EncoderConfig) -> Vec<String> {
    split(value, &config.include_separator).collect()
}

/// Split a `sort` parameter; a leading `-` means descending.
pub fn parse_sort(value: &str, config: &EncoderConfig) -> Vec<SortField> {
    split(value, &config.sort_separator)
        .map(|field| match field.strip_prefix('-') {
            Some(name) => SortField {
                field: name.to_string(),
                direction: SortDirection::Descending,
            },
            None => SortField {
                field,
                direction: SortDirection::Ascending,
            },
        })
        .collect()
}

/// Collect sparse fieldsets from `(name, value)` query pairs.
///
/// Only `fields[type]` names are considered; values are comma separated.
pub fn parse_fieldsets<'a, I>(params: I) -> HashMap<String, Vec<String>>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    params
        .into_iter()
        .filter_map(|(name, value)| {
            let resource_type = name.strip_prefix("fields[")?.strip_suffix(']')?;
            Some((resource_type.to_string(), split(value, ",").collect()))
        })
        .collect()
}

/// Sort fields the descriptor does not allow.
pub fn disallowed_sort<'a>(
    descriptor: &ResourceDescriptor,
    sort: &'a [SortField],
) -> Vec<&'a SortField> {
    sort.iter()
        .filter(|s| !descriptor.allows_sort(&s.field))
        .collect()
}

/// Sort to apply: the requested one, or the descriptor's default sort.
pub fn effective_sort(
    descriptor: &ResourceDescriptor,
    value: Option<&str>,
    config: &EncoderConfig,
) -> Vec<SortField> {
    match value {
        Some(value) if !value.trim().is_empty() => parse_sort(value, config),
        _ => {
            let joined = descriptor.default_sort_fields().join(&config.sort_separator);
            parse_sort(&joined, config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordKind;

    #[test]
    fn includes_trimmed_and_split() {
        let config = EncoderConfig::default();
        assert_eq!(
            parse_includes("comments.author, tags,,", &config),
            vec!["comments.author", "tags"]
        );
        assert!(parse_includes("", &config).is_empty());
    }

    #[test]
    fn custom_separator() {
        let config = EncoderConfig {
            include_separator: ";".into(),
            ..Default::default()
        };
        assert_eq!(parse_includes("a;b.c", &config), vec!["a", "b.c"]);
    }

    #[test]
    fn sort_directions() {
        let sort = parse_sort("-created-at,title", &EncoderConfig::default());
        assert_eq!(sort.len(), 2);
        assert_eq!(sort[0].field, "created-at");
        assert!(sort[0].is_descending());
        assert_eq!(sort[1].direction, SortDirection::Ascending);
    }

    #[test]
    fn fieldsets_from_params() {
        let params = [
            ("fields[posts]", "title, body"),
            ("fields[people]", "name"),
            ("include", "author"),
            ("fields", "ignored"),
        ];
        let fieldsets = parse_fieldsets(params);
        assert_eq!(fieldsets.len(), 2);
        assert_eq!(fieldsets["posts"], vec!["title", "body"]);
        assert_eq!(fieldsets["people"], vec!["name"]);
    }

    #[test]
    fn sort_whitelist_and_default() {
        let descriptor = ResourceDescriptor::new(RecordKind::new("app::Post"))
            .sort_attributes(["title"])
            .default_sort(["-title"]);
        let config = EncoderConfig::default();

        let sort = parse_sort("title,-secret", &config);
        let rejected = disallowed_sort(&descriptor, &sort);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].field, "secret");

        let default = effective_sort(&descriptor, None, &config);
        assert_eq!(default[0].field, "title");
        assert!(default[0].is_descending());
    }
}
