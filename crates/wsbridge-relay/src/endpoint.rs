//! Upstream target URL assembly.
//!
//! The channel path is joined onto the base URL path and the custom query
//! parameters are encoded in name order, so the same settings always produce
//! the same URL.

use std::collections::BTreeMap;

use url::Url;
use wsbridge_core::errors::RelayError;

/// Build the upstream URL for a channel.
///
/// - `base` must parse as an absolute URL, otherwise [`RelayError::InvalidHost`]
/// - exactly one `/` separates the base path from `channel_path`
/// - the joined path is cleaned: runs of `/` collapse, `.` segments and
///   trailing slashes are dropped, and `..` removes the segment before it
///   (never climbing above the root)
/// - non-empty `query_params` replace the base query, percent-encoded and
///   sorted by name
pub fn build_url(
    base: &str,
    channel_path: &str,
    query_params: &BTreeMap<String, String>,
) -> Result<Url, RelayError> {
    let mut url = Url::parse(base).map_err(|e| RelayError::InvalidHost {
        url: base.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(RelayError::InvalidHost {
            url: base.to_string(),
            reason: "URL cannot carry a path".to_string(),
        });
    }

    let joined = join_path(url.path(), channel_path);
    url.set_path(&joined);

    if !query_params.is_empty() {
        let _ = url.query_pairs_mut().clear().extend_pairs(query_params);
    }
    Ok(url)
}

fn join_path(base: &str, channel: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(channel.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                let _ = segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Render a URL for logs with every query value masked.
pub fn redact_url(url: &Url) -> String {
    if url.query().is_none() {
        return url.to_string();
    }
    let names: Vec<String> = url.query_pairs().map(|(name, _)| name.into_owned()).collect();
    let mut redacted = url.clone();
    let _ = redacted
        .query_pairs_mut()
        .clear()
        .extend_pairs(names.iter().map(|name| (name.as_str(), "***")));
    redacted.to_string()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn join_with_both_separators() {
        let url = build_url("https://h/api/", "/v1/stream", &BTreeMap::new()).unwrap();
        assert_eq!(url.as_str(), "https://h/api/v1/stream");
    }

    #[test]
    fn join_with_no_separators() {
        let url = build_url("https://h/api", "v1/stream", &BTreeMap::new()).unwrap();
        assert_eq!(url.as_str(), "https://h/api/v1/stream");
    }

    #[test]
    fn join_onto_root() {
        let url = build_url("wss://feed.example.com", "ticks", &BTreeMap::new()).unwrap();
        assert_eq!(url.as_str(), "wss://feed.example.com/ticks");
    }

    #[test]
    fn empty_channel_keeps_base_path() {
        let url = build_url("ws://h/api", "", &BTreeMap::new()).unwrap();
        assert_eq!(url.path(), "/api");
    }

    #[test]
    fn duplicate_separators_collapse() {
        let url = build_url("ws://h//api//", "//a//b", &BTreeMap::new()).unwrap();
        assert_eq!(url.path(), "/api/a/b");
    }

    #[test]
    fn lone_dot_channel_dials_base_path() {
        let url = build_url("ws://h/api", ".", &BTreeMap::new()).unwrap();
        assert_eq!(url.as_str(), "ws://h/api");
        let url = build_url("ws://h/api/", "./", &BTreeMap::new()).unwrap();
        assert_eq!(url.path(), "/api");
    }

    #[test]
    fn dot_segments_are_resolved() {
        let url = build_url("ws://h/api", "a/../b", &BTreeMap::new()).unwrap();
        assert_eq!(url.path(), "/api/b");
        let url = build_url("ws://h/api", "a/./b/", &BTreeMap::new()).unwrap();
        assert_eq!(url.path(), "/api/a/b");
    }

    #[test]
    fn parent_segments_stop_at_root() {
        let url = build_url("ws://h/api", "../../x", &BTreeMap::new()).unwrap();
        assert_eq!(url.path(), "/x");
        let url = build_url("ws://h/api", "..", &BTreeMap::new()).unwrap();
        assert_eq!(url.path(), "/");
    }

    #[test]
    fn query_params_sorted_and_encoded() {
        let url = build_url(
            "wss://h/api",
            "s",
            &params(&[("token", "a b&c"), ("region", "eu"), ("Alpha", "1")]),
        )
        .unwrap();
        assert_eq!(url.query(), Some("Alpha=1&region=eu&token=a+b%26c"));
    }

    #[test]
    fn query_params_replace_base_query() {
        let url = build_url("ws://h/api?old=1", "s", &params(&[("new", "2")])).unwrap();
        assert_eq!(url.query(), Some("new=2"));
    }

    #[test]
    fn base_query_kept_without_params() {
        let url = build_url("ws://h/api?keep=1", "s", &BTreeMap::new()).unwrap();
        assert_eq!(url.as_str(), "ws://h/api/s?keep=1");
    }

    #[test]
    fn relative_base_is_invalid_host() {
        assert_matches!(
            build_url("feed.example.com/api", "s", &BTreeMap::new()),
            Err(RelayError::InvalidHost { .. })
        );
        assert_matches!(
            build_url("", "s", &BTreeMap::new()),
            Err(RelayError::InvalidHost { .. })
        );
    }

    #[test]
    fn opaque_base_is_invalid_host() {
        assert_matches!(
            build_url("mailto:ops@example.com", "s", &BTreeMap::new()),
            Err(RelayError::InvalidHost { .. })
        );
    }

    #[test]
    fn redaction_masks_values_only() {
        let url = build_url(
            "ws://h/api",
            "s",
            &params(&[("token", "hunter2"), ("region", "eu")]),
        )
        .unwrap();
        let redacted = redact_url(&url);
        assert_eq!(redacted, "ws://h/api/s?region=***&token=***");
        assert!(!redacted.contains("hunter2"));
    }

    #[test]
    fn redaction_without_query_is_identity() {
        let url = Url::parse("ws://h/api").unwrap();
        assert_eq!(redact_url(&url), "ws://h/api");
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        fn segments() -> impl Strategy<Value = Vec<String>> {
            prop::collection::vec("[a-z0-9]{1,8}", 0..4)
        }

        proptest! {
            #[test]
            fn join_never_doubles_separator(
                base in segments(),
                channel in segments(),
                base_trailing in any::<bool>(),
                channel_leading in any::<bool>(),
            ) {
                let mut base_url = format!("ws://h/{}", base.join("/"));
                if base_trailing {
                    base_url.push('/');
                }
                let mut channel_path = channel.join("/");
                if channel_leading {
                    channel_path.insert(0, '/');
                }

                let url = build_url(&base_url, &channel_path, &BTreeMap::new()).unwrap();
                prop_assert!(!url.path().contains("//"), "path {}", url.path());

                let expected: Vec<&str> = base.iter().chain(channel.iter()).map(String::as_str).collect();
                let actual: Vec<&str> = url.path().split('/').filter(|s| !s.is_empty()).collect();
                prop_assert_eq!(actual, expected);
            }
        }
    }
}
