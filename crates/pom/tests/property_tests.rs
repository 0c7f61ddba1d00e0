//! Property-based tests for URL matching, URL joining and locators.

use pom::{join_url, Locator, UrlMatcher};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    "[a-z0-9_-]{1,12}"
}

proptest! {
    /// A literal pattern matches exactly its own path.
    #[test]
    fn prop_literal_pattern_matches_itself(segments in prop::collection::vec(segment(), 0..6)) {
        let path = format!("/{}", segments.join("/"));
        let matcher = UrlMatcher::new(&path);
        prop_assert!(matcher.matches(&path));
        let with_query = format!("{}?q=1#frag", path);
        prop_assert!(matcher.matches(&with_query));
    }

    /// An extra trailing segment never matches.
    #[test]
    fn prop_extra_segment_rejected(
        segments in prop::collection::vec(segment(), 0..6),
        extra in segment(),
    ) {
        let path = format!("/{}", segments.join("/"));
        let matcher = UrlMatcher::new(&path);
        let longer = format!("{}/{}", path.trim_end_matches('/'), extra);
        prop_assert!(!matcher.matches(&longer));
    }

    /// Parameters capture exactly the segment at their position.
    #[test]
    fn prop_param_captures_value(prefix in segment(), value in segment()) {
        let matcher = UrlMatcher::new(&format!("/{prefix}/:id"));
        let params = matcher.capture(&format!("/{}/{}", prefix, value));
        prop_assert_eq!(params.and_then(|p| p.get("id").cloned()), Some(value));
    }

    /// Wildcards accept any single segment.
    #[test]
    fn prop_wildcard_accepts_any_segment(prefix in segment(), value in segment()) {
        let matcher = UrlMatcher::new(&format!("/{prefix}/*"));
        let target = format!("/{}/{}", prefix, value);
        prop_assert!(matcher.matches(&target));
    }

    /// Joining never produces a double slash after the authority.
    #[test]
    fn prop_join_has_single_separator(
        trailing in any::<bool>(),
        leading in any::<bool>(),
        path in segment(),
    ) {
        let base = if trailing { "http://host:1/app/" } else { "http://host:1/app" };
        let url = if leading { format!("/{path}") } else { path.clone() };
        prop_assert_eq!(join_url(base, &url), format!("http://host:1/app/{path}"));
    }

    /// Locator display always names strategy and value.
    #[test]
    fn prop_locator_display(value in "[a-z#.]{1,16}", index in prop::option::of(0usize..10)) {
        let mut locator = Locator::css(value.clone());
        if let Some(i) = index {
            locator = locator.nth(i);
        }
        let shown = locator.to_string();
        let expected_prefix = format!("css={}", value);
        prop_assert!(shown.starts_with(&expected_prefix));
        prop_assert_eq!(shown.ends_with(']'), index.is_some());
    }
}
