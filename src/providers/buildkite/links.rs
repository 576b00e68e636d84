use crate::error::{MetricsError, Result};

/// One `<url>; rel="..."` entry of a `Link` response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    pub url: String,
    pub rels: Vec<String>,
}

impl LinkEntry {
    pub fn has_rel(&self, rel: &str) -> bool {
        self.rels.iter().any(|r| r.eq_ignore_ascii_case(rel))
    }
}

/// Extracts the continuation URL from a Buildkite `Link` header.
///
/// Buildkite paginates with headers such as
/// `<https://api.buildkite.com/v2/...&page=2>; rel="next", <...&page=9>; rel="last"`.
/// Returns `None` when there is no `rel="next"` entry, i.e. on the last page.
///
/// # Errors
///
/// Returns `ContinuationParse` if the header is not a list of
/// angle-bracketed URLs followed by `;`-separated parameters.
pub fn next_page_url(header: &str) -> Result<Option<String>> {
    Ok(parse_link_header(header)?
        .into_iter()
        .find(|entry| entry.has_rel("next"))
        .map(|entry| entry.url))
}

pub fn parse_link_header(header: &str) -> Result<Vec<LinkEntry>> {
    let mut entries = Vec::new();
    let mut rest = header.trim();

    while !rest.is_empty() {
        let Some(after_open) = rest.strip_prefix('<') else {
            return Err(malformed(header, "expected '<' at start of link entry"));
        };
        let Some(close) = after_open.find('>') else {
            return Err(malformed(header, "unterminated '<'"));
        };

        let url = after_open[..close].trim();
        if url.is_empty() {
            return Err(malformed(header, "empty link target"));
        }

        let after_url = &after_open[close + 1..];
        let end = entry_end(after_url);
        let rels = parse_rels(header, &after_url[..end])?;

        entries.push(LinkEntry {
            url: url.to_string(),
            rels,
        });

        rest = after_url[end..].strip_prefix(',').unwrap_or("").trim_start();
    }

    Ok(entries)
}

// Index of the comma ending this entry's parameters, ignoring commas inside quotes.
fn entry_end(params: &str) -> usize {
    let mut quoted = false;
    for (idx, ch) in params.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            ',' if !quoted => return idx,
            _ => {}
        }
    }
    params.len()
}

fn parse_rels(header: &str, params: &str) -> Result<Vec<String>> {
    let params = params.trim();
    if params.is_empty() {
        return Ok(Vec::new());
    }

    let Some(params) = params.strip_prefix(';') else {
        return Err(malformed(header, "expected ';' after link target"));
    };

    let mut rels = Vec::new();
    for param in params.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("rel") {
            continue;
        }
        let value = value.trim();
        let value = match value.strip_prefix('"') {
            Some(inner) => inner
                .strip_suffix('"')
                .ok_or_else(|| malformed(header, "unterminated quoted rel value"))?,
            None => value,
        };
        rels.extend(value.split_whitespace().map(str::to_ascii_lowercase));
    }

    Ok(rels)
}

fn malformed(header: &str, reason: &str) -> MetricsError {
    MetricsError::ContinuationParse {
        header: header.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUILDKITE_HEADER: &str = r#"<https://api.buildkite.com/v2/organizations/acme/builds?page=2&per_page=100>; rel="next", <https://api.buildkite.com/v2/organizations/acme/builds?page=7&per_page=100>; rel="last""#;

    mod next_page_url {
        use super::*;

        #[test]
        fn picks_the_next_relation() {
            let next = next_page_url(BUILDKITE_HEADER).unwrap();
            assert_eq!(
                next.as_deref(),
                Some("https://api.buildkite.com/v2/organizations/acme/builds?page=2&per_page=100")
            );
        }

        #[test]
        fn returns_none_on_last_page() {
            let header = r#"<https://api.buildkite.com/v2/x?page=1>; rel="first", <https://api.buildkite.com/v2/x?page=6>; rel="prev""#;
            assert_eq!(next_page_url(header).unwrap(), None);
        }

        #[test]
        fn returns_none_for_empty_header() {
            assert_eq!(next_page_url("").unwrap(), None);
        }

        #[test]
        fn accepts_unquoted_and_multi_valued_rels() {
            assert_eq!(
                next_page_url("<https://x/a>; rel=next").unwrap().as_deref(),
                Some("https://x/a")
            );
            assert_eq!(
                next_page_url(r#"<https://x/b>; rel="last next""#)
                    .unwrap()
                    .as_deref(),
                Some("https://x/b")
            );
        }

        #[test]
        fn ignores_other_parameters() {
            let header = r#"<https://x/c>; title="page, two"; rel="next""#;
            assert_eq!(next_page_url(header).unwrap().as_deref(), Some("https://x/c"));
        }
    }

    mod malformed_headers {
        use super::*;

        #[test]
        fn rejects_missing_angle_brackets() {
            let err = next_page_url(r#"https://x/a; rel="next""#).unwrap_err();
            assert!(matches!(err, MetricsError::ContinuationParse { .. }));
        }

        #[test]
        fn rejects_unterminated_target() {
            assert!(next_page_url(r#"<https://x/a; rel="next""#).is_err());
        }

        #[test]
        fn rejects_empty_target() {
            assert!(next_page_url(r#"<>; rel="next""#).is_err());
        }

        #[test]
        fn rejects_garbage_between_target_and_params() {
            assert!(next_page_url(r#"<https://x/a> rel="next""#).is_err());
        }
    }

    #[test]
    fn parses_every_entry_in_order() {
        let entries = parse_link_header(BUILDKITE_HEADER).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].has_rel("next"));
        assert!(entries[1].has_rel("last"));
    }
}
