use serde_json::Value;

use super::{CollectionTransformer, Scope, Transformer};
use crate::encoder::Encoder;
use crate::error::EncodeError;
use crate::link;
use crate::payload::{classify, Paginator, Payload};

/// Registers pagination links, then transforms the page like a collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaginatorTransformer;

impl Transformer for PaginatorTransformer {
    fn name(&self) -> &'static str {
        "paginator transformer"
    }

    fn transform(
        &self,
        encoder: &mut Encoder,
        payload: &Payload,
        scope: &Scope,
    ) -> Result<Value, EncodeError> {
        let Payload::Page(page) = payload else {
            return Err(EncodeError::UnsupportedPayload {
                transformer: self.name(),
                actual: format!("{:?}", classify(payload)),
            });
        };

        for (name, number) in page_links(page) {
            let url = page_url(encoder, page, number);
            encoder.set_link(name, Value::String(url));
        }

        CollectionTransformer.transform(encoder, payload, scope)
    }
}

/// Link names and the page numbers they point at.
fn page_links(page: &Paginator) -> Vec<(&'static str, u64)> {
    let current = page.current_page();
    let first = page.first_page();

    let mut links = vec![("first", first)];
    if current > first {
        links.push(("prev", current - 1));
    }
    if let Some(last) = page.last_page() {
        if page.has_more_pages() {
            links.push(("next", (current + 1).min(last)));
        }
        links.push(("last", last));
    }
    links
}

fn page_url(encoder: &Encoder, page: &Paginator, number: u64) -> String {
    match encoder.top_resource_url() {
        Some(url) => link::with_query_param(url, &encoder.config().page_parameter, number),
        None => page.url(number),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_aware_middle_page() {
        let page = Paginator::length_aware(Vec::new(), 40, 10, 2);
        assert_eq!(
            page_links(&page),
            vec![("first", 1), ("prev", 1), ("next", 3), ("last", 4)]
        );
    }

    #[test]
    fn length_aware_last_page_has_no_next() {
        let page = Paginator::length_aware(Vec::new(), 40, 10, 4);
        assert_eq!(
            page_links(&page),
            vec![("first", 1), ("prev", 3), ("last", 4)]
        );
    }

    #[test]
    fn simple_paginator_links() {
        let page = Paginator::simple(Vec::new(), 10, 1);
        assert_eq!(page_links(&page), vec![("first", 1)]);

        let page = Paginator::simple(Vec::new(), 10, 3);
        assert_eq!(page_links(&page), vec![("first", 1), ("prev", 2)]);
    }
}
