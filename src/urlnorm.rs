//! URL normalization into the canonical `normalized_url_group` form used
//! to cluster snapshots of the same logical page across captures.
//!
//! Rules: lowercase host, strip fragment, drop known tracking query
//! parameters, normalize a trailing slash on the path. The result is
//! pure and idempotent: `normalize(normalize(u)) == normalize(u)`.

use url::Url;

/// Tracking query parameters dropped unconditionally, compared
/// case-insensitively. Anything prefixed with `utm_` is dropped even if
/// not explicitly listed here.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "gclid",
    "fbclid",
    "msclkid",
    "mc_cid",
    "mc_eid",
    "ref",
    "fb_action_ids",
    "fb_action_types",
];

fn is_tracking_param(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.starts_with("utm_") || TRACKING_PARAMS.contains(&lower.as_str())
}

/// Normalize a captured URL into its canonical group key.
///
/// Falls back to a lowercased, trimmed copy of the input when the URL
/// cannot be parsed (malformed captures still need a stable group key
/// rather than failing the whole extraction pipeline).
pub fn normalize(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return raw.trim().to_ascii_lowercase();
    };

    parsed.set_fragment(None);

    if let Some(host) = parsed.host_str() {
        let lower = host.to_ascii_lowercase();
        // host_str borrows from `parsed`; clone before mutating.
        let _ = parsed.set_host(Some(&lower));
    }

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed
            .query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_string();
        parsed.set_path(&trimmed);
    } else if path.is_empty() {
        parsed.set_path("/");
    }

    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_host() {
        assert_eq!(
            normalize("https://WWW.Canada.CA/en/health.html"),
            normalize("https://www.canada.ca/en/health.html")
        );
    }

    #[test]
    fn strips_fragment() {
        let n = normalize("https://canada.ca/en/health.html#section-2");
        assert!(!n.contains('#'));
    }

    #[test]
    fn drops_tracking_params() {
        let n = normalize("https://canada.ca/en/health.html?utm_source=newsletter&id=5");
        assert!(!n.contains("utm_source"));
        assert!(n.contains("id=5"));
    }

    #[test]
    fn drops_unlisted_utm_prefixed_params() {
        let n = normalize("https://canada.ca/en/health.html?utm_weird_thing=1");
        assert!(!n.contains("utm_weird_thing"));
    }

    #[test]
    fn normalizes_trailing_slash() {
        assert_eq!(
            normalize("https://canada.ca/en/health/"),
            normalize("https://canada.ca/en/health")
        );
    }

    #[test]
    fn keeps_root_slash() {
        let n = normalize("https://canada.ca/");
        assert!(n.ends_with('/'));
    }

    #[test]
    fn is_idempotent() {
        let once = normalize("https://WWW.Canada.CA/en/health/?utm_source=x&b=2#frag");
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn falls_back_on_unparseable_input() {
        let n = normalize("  Not A URL At All  ");
        assert_eq!(n, "not a url at all");
    }

    #[test]
    fn distinct_paths_stay_distinct() {
        assert_ne!(
            normalize("https://canada.ca/en/a.html"),
            normalize("https://canada.ca/en/b.html")
        );
    }
}
