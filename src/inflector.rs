//! Word inflection helpers: pluralization, dash-case and humanized titles.

use heck::{ToKebabCase, ToSnakeCase};

/// Words that are the same in singular and plural form.
const UNCOUNTABLE: &[&str] = &[
    "audio",
    "data",
    "deer",
    "equipment",
    "feedback",
    "fish",
    "information",
    "metadata",
    "money",
    "news",
    "police",
    "rice",
    "series",
    "sheep",
    "software",
    "species",
];

/// Irregular singular/plural pairs (lowercase).
const IRREGULAR: &[(&str, &str)] = &[
    ("child", "children"),
    ("foot", "feet"),
    ("goose", "geese"),
    ("man", "men"),
    ("mouse", "mice"),
    ("ox", "oxen"),
    ("person", "people"),
    ("tooth", "teeth"),
    ("woman", "women"),
];

/// Pluralize an identifier, inflecting only its last word.
///
/// `BlogPost` becomes `BlogPosts`, `Category` becomes `Categories`.
pub fn pluralize(name: &str) -> String {
    let split = last_word_start(name);
    let (head, word) = name.split_at(split);
    format!("{}{}", head, pluralize_word(word))
}

/// Convert an identifier to dash-case (`created_at` → `created-at`).
pub fn dasherize(name: &str) -> String {
    name.to_kebab_case()
}

/// Turn an identifier into a sentence-case title.
///
/// `ModelNotFoundException` becomes `Model not found exception`.
pub fn humanize(name: &str) -> String {
    let words = name.to_snake_case().replace('_', " ");
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Byte offset where the last word of a PascalCase, snake or dash identifier starts.
fn last_word_start(name: &str) -> usize {
    let mut start = 0;
    let mut prev: Option<char> = None;
    for (i, c) in name.char_indices() {
        match prev {
            Some('_') | Some('-') => start = i,
            Some(p) if c.is_uppercase() && !p.is_uppercase() => start = i,
            _ => {}
        }
        prev = Some(c);
    }
    start
}

fn pluralize_word(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    let lower = word.to_lowercase();

    if UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }

    if let Some((_, plural)) = IRREGULAR.iter().find(|(singular, _)| *singular == lower) {
        return match_case(word, plural);
    }

    let ends_with = |suffix: &str| lower.ends_with(suffix);

    if ends_with("quiz") {
        return format!("{}zes", word);
    }
    if ends_with("is") && lower.len() > 3 {
        // analysis -> analyses
        return format!("{}es", &word[..word.len() - 2]);
    }
    if ends_with("s") || ends_with("x") || ends_with("z") || ends_with("ch") || ends_with("sh")
    {
        return format!("{}es", word);
    }
    if ends_with("y") && !ends_with_vowel_y(&lower) {
        return format!("{}ies", &word[..word.len() - 1]);
    }
    if ends_with("fe") {
        return format!("{}ves", &word[..word.len() - 2]);
    }
    format!("{}s", word)
}

fn ends_with_vowel_y(lower: &str) -> bool {
    let mut rev = lower.chars().rev();
    rev.next();
    matches!(rev.next(), Some('a' | 'e' | 'i' | 'o' | 'u'))
}

fn match_case(original: &str, replacement: &str) -> String {
    let upper_first = original.chars().next().is_some_and(char::is_uppercase);
    if upper_first {
        let mut chars = replacement.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    } else {
        replacement.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pluralize_regular() {
        assert_eq!(pluralize("Post"), "Posts");
        assert_eq!(pluralize("BlogPost"), "BlogPosts");
        assert_eq!(pluralize("Category"), "Categories");
        assert_eq!(pluralize("Day"), "Days");
        assert_eq!(pluralize("Address"), "Addresses");
        assert_eq!(pluralize("Box"), "Boxes");
        assert_eq!(pluralize("Branch"), "Branches");
    }

    #[test]
    fn pluralize_irregular_and_uncountable() {
        assert_eq!(pluralize("Person"), "People");
        assert_eq!(pluralize("SalesPerson"), "SalesPeople");
        assert_eq!(pluralize("child"), "children");
        assert_eq!(pluralize("Equipment"), "Equipment");
        assert_eq!(pluralize("Analysis"), "Analyses");
    }

    #[test]
    fn pluralize_snake_identifier() {
        assert_eq!(pluralize("blog_post"), "blog_posts");
        assert_eq!(pluralize("line-item"), "line-items");
    }

    #[test]
    fn dasherize_keys() {
        assert_eq!(dasherize("created_at"), "created-at");
        assert_eq!(dasherize("BlogPosts"), "blog-posts");
        assert_eq!(dasherize("title"), "title");
    }

    #[test]
    fn humanize_class_names() {
        assert_eq!(humanize("ModelNotFoundException"), "Model not found exception");
        assert_eq!(humanize("ValidationException"), "Validation exception");
        assert_eq!(humanize(""), "");
    }
}
