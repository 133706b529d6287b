//! CDX listing response parsing.
//!
//! The listing API returns a JSON array of `[timestamp, original]` rows,
//! optionally led by a header row. Archive listings accumulate decades of
//! junk, so anything that does not parse is simply dropped.

/// Parses a listing body into (timestamp, url) pairs. A malformed body is
/// an empty page.
pub(crate) fn parse_rows(body: &str) -> Vec<(String, String)> {
    let rows: Vec<Vec<String>> = match serde_json::from_str(body) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::debug!("unparsable listing page: {}", e);
            return Vec::new();
        }
    };

    let mut out = Vec::with_capacity(rows.len());
    for (i, row) in rows.into_iter().enumerate() {
        if i == 0 && row == ["timestamp", "original"] {
            continue;
        }
        let mut fields = row.into_iter();
        if let (Some(timestamp), Some(url)) = (fields.next(), fields.next()) {
            out.push((timestamp, url));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_and_skips_header() {
        let body = r#"[["timestamp","original"],["20200101000000","https://x.com/"],["20210101000000","https://x.com/a"]]"#;
        let rows = parse_rows(body);
        assert_eq!(
            rows,
            vec![
                ("20200101000000".to_string(), "https://x.com/".to_string()),
                ("20210101000000".to_string(), "https://x.com/a".to_string()),
            ]
        );
    }

    #[test]
    fn body_without_header_is_taken_as_is() {
        let body = r#"[["20200101000000","https://x.com/"]]"#;
        assert_eq!(parse_rows(body).len(), 1);
    }

    #[test]
    fn malformed_body_is_an_empty_page() {
        assert!(parse_rows("<html>rate limited</html>").is_empty());
        assert!(parse_rows("").is_empty());
        assert!(parse_rows(r#"{"not":"rows"}"#).is_empty());
    }

    #[test]
    fn short_rows_are_dropped() {
        let body = r#"[["20200101000000","https://x.com/"],["only-one"]]"#;
        assert_eq!(parse_rows(body).len(), 1);
    }
}
