//! Link building on top of [`url::Url`].
//!
//! Links may be absolute (`https://api.test/posts`) or relative to the host
//! (`/posts`). Relative links are resolved against a placeholder origin so the
//! same parsing applies, and only their path and query are emitted.

use url::{ParseError, Position, Url};

const RELATIVE_ORIGIN: &str = "http://localhost/";

/// Set query parameter `name` to `value`, replacing every existing occurrence
/// and keeping the other parameters in order.
///
/// Unparseable input is returned unchanged.
pub fn with_query_param(href: &str, name: &str, value: impl std::fmt::Display) -> String {
    let result = resolve(href).map(|(mut url, relative)| {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .into_owned()
            .filter(|(key, _)| key != name)
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(name, &value.to_string());
        render(&url, relative)
    });

    result.unwrap_or_else(|err| {
        tracing::warn!(%href, %err, "cannot parse link; query left unchanged");
        href.to_string()
    })
}

/// Append `path` to the path of `base`.
///
/// Segments of `path` are percent-encoded as needed. A query in `path` is kept
/// as the query of the result. An empty base yields a host-relative link.
pub fn join(base: &str, path: &str) -> String {
    let (path, query) = match path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path, None),
    };
    let base = if base.is_empty() { "/" } else { base };

    let result = resolve(base).and_then(|(mut url, relative)| {
        url.path_segments_mut()
            .map_err(|()| ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        if query.is_some() {
            url.set_query(query);
        }
        Ok(render(&url, relative))
    });

    result.unwrap_or_else(|err| {
        tracing::warn!(%base, %path, %err, "cannot join link");
        format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
    })
}

/// Parse `href`, falling back to the placeholder origin for relative input.
/// The flag is true when the placeholder was used.
fn resolve(href: &str) -> Result<(Url, bool), ParseError> {
    match Url::parse(href) {
        Ok(url) => Ok((url, false)),
        Err(ParseError::RelativeUrlWithoutBase) => {
            Ok((Url::parse(RELATIVE_ORIGIN)?.join(href)?, true))
        }
        Err(err) => Err(err),
    }
}

fn render(url: &Url, relative: bool) -> String {
    if relative {
        url[Position::BeforePath..].to_string()
    } else {
        url.to_string()
    }
}
