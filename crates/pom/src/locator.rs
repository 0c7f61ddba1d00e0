//! Locator abstraction for element selection.
//!
//! A [`Locator`] describes how to find exactly one element relative to a
//! parent scope. Locators are immutable once declared and carry no runtime
//! state; the cache that turns them into live references lives in the node
//! tree.
//!
//! # Design Philosophy
//!
//! - **Scoped Search**: A locator is always evaluated inside its parent's
//!   live element, never against the whole document (unless the parent is a
//!   page)
//! - **Strict Selection**: More than one match is an error unless an explicit
//!   index is given
//! - **Fluent API**: `Locator::css("li.item").nth(2)`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy used to interpret a locator value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// CSS selector (e.g., "button.primary")
    Css,
    /// XPath expression, evaluated relative to the scope element
    XPath,
    /// Element `id` attribute
    Id,
    /// Element `name` attribute
    Name,
    /// Tag name (e.g., "input")
    TagName,
    /// Single CSS class name
    ClassName,
    /// Exact visible text of a link
    LinkText,
    /// Substring of the visible text of a link
    PartialLinkText,
    /// Test ID selector (data-testid attribute)
    TestId,
}

impl Strategy {
    /// Short name used in diagnostics (`css=...`)
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::XPath => "xpath",
            Self::Id => "id",
            Self::Name => "name",
            Self::TagName => "tag",
            Self::ClassName => "class",
            Self::LinkText => "link",
            Self::PartialLinkText => "partial_link",
            Self::TestId => "testid",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to find one element relative to a parent scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    strategy: Strategy,
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
}

impl Locator {
    /// Create a locator from a strategy and value
    #[must_use]
    pub fn new(strategy: Strategy, value: impl Into<String>) -> Self {
        Self {
            strategy,
            value: value.into(),
            index: None,
        }
    }

    /// Create a CSS locator
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(Strategy::Css, selector)
    }

    /// Create an XPath locator
    #[must_use]
    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::new(Strategy::XPath, expr)
    }

    /// Create an `id` locator
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self::new(Strategy::Id, id)
    }

    /// Create a `name` attribute locator
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::new(Strategy::Name, name)
    }

    /// Create a tag-name locator
    #[must_use]
    pub fn tag(tag: impl Into<String>) -> Self {
        Self::new(Strategy::TagName, tag)
    }

    /// Create a class-name locator
    #[must_use]
    pub fn class(class: impl Into<String>) -> Self {
        Self::new(Strategy::ClassName, class)
    }

    /// Create an exact link-text locator
    #[must_use]
    pub fn link_text(text: impl Into<String>) -> Self {
        Self::new(Strategy::LinkText, text)
    }

    /// Create a partial link-text locator
    #[must_use]
    pub fn partial_link_text(text: impl Into<String>) -> Self {
        Self::new(Strategy::PartialLinkText, text)
    }

    /// Create a test ID locator
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::new(Strategy::TestId, id)
    }

    /// Select the n-th match (zero-based) instead of requiring a unique one
    #[must_use]
    pub fn nth(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Get the strategy
    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Get the raw selector value
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Get the match index, if any
    #[must_use]
    pub const fn index(&self) -> Option<usize> {
        self.index
    }

    /// Whether this locator demands exactly one match
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.index.is_none()
    }

    /// JavaScript expression returning an array of all matches under `scope`.
    ///
    /// `scope` must be a JS expression evaluating to an `Element` or
    /// `Document`. The index is not applied here; selection happens on the
    /// engine side so ambiguity can be reported.
    #[must_use]
    pub fn to_query(&self, scope: &str) -> String {
        let v = js_string(&self.value);
        match self.strategy {
            Strategy::Css => format!("Array.from({scope}.querySelectorAll({v}))"),
            Strategy::XPath => format!(
                "(() => {{ const r = document.evaluate({v}, {scope}, null, \
                 XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); \
                 const out = []; for (let i = 0; i < r.snapshotLength; i++) out.push(r.snapshotItem(i)); \
                 return out; }})()"
            ),
            Strategy::Id => format!(
                "Array.from({scope}.querySelectorAll('[id=' + JSON.stringify({v}) + ']'))"
            ),
            Strategy::Name => format!(
                "Array.from({scope}.querySelectorAll('[name=' + JSON.stringify({v}) + ']'))"
            ),
            Strategy::TagName => format!("Array.from({scope}.getElementsByTagName({v}))"),
            Strategy::ClassName => format!("Array.from({scope}.getElementsByClassName({v}))"),
            Strategy::LinkText => format!(
                "Array.from({scope}.querySelectorAll('a')).filter(el => el.textContent.trim() === {v})"
            ),
            Strategy::PartialLinkText => format!(
                "Array.from({scope}.querySelectorAll('a')).filter(el => el.textContent.includes({v}))"
            ),
            Strategy::TestId => format!(
                "Array.from({scope}.querySelectorAll('[data-testid=' + JSON.stringify({v}) + ']'))"
            ),
        }
    }
}

/// Quote `s` as a JavaScript string literal.
///
/// JSON string syntax is a subset of JS string syntax, so every literal sent
/// to the page goes through serde_json's escaping.
pub(crate) fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_owned()).to_string()
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy, self.value)?;
        if let Some(index) = self.index {
            write!(f, "[{index}]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod locator_tests {
        use super::*;

        #[test]
        fn test_css_locator() {
            let locator = Locator::css("button.primary");
            assert_eq!(locator.strategy(), Strategy::Css);
            assert_eq!(locator.value(), "button.primary");
            assert!(locator.is_strict());
        }

        #[test]
        fn test_nth_is_not_strict() {
            let locator = Locator::css("li").nth(2);
            assert_eq!(locator.index(), Some(2));
            assert!(!locator.is_strict());
        }

        #[test]
        fn test_display() {
            assert_eq!(Locator::css("form#login").to_string(), "css=form#login");
            assert_eq!(Locator::tag("li").nth(1).to_string(), "tag=li[1]");
            assert_eq!(Locator::test_id("score").to_string(), "testid=score");
        }

        #[test]
        fn test_equality_includes_index() {
            assert_eq!(Locator::css("a"), Locator::css("a"));
            assert_ne!(Locator::css("a"), Locator::css("a").nth(0));
            assert_ne!(Locator::css("a"), Locator::tag("a"));
        }

        #[test]
        fn test_serde_round_trip_omits_missing_index() {
            let json = serde_json::to_string(&Locator::name("username")).unwrap();
            assert_eq!(json, r#"{"strategy":"name","value":"username"}"#);
            let back: Locator = serde_json::from_str(&json).unwrap();
            assert_eq!(back, Locator::name("username"));
        }
    }

    mod query_tests {
        use super::*;

        #[test]
        fn test_css_query_is_scoped() {
            let query = Locator::css("input").to_query("scope");
            assert_eq!(query, r#"Array.from(scope.querySelectorAll("input"))"#);
        }

        #[test]
        fn test_xpath_query_uses_scope_as_context() {
            let query = Locator::xpath(".//button").to_query("el");
            assert!(query.contains("document.evaluate"));
            assert!(query.contains(", el, null"));
        }

        #[test]
        fn test_link_text_filters_anchors() {
            let query = Locator::link_text("Sign in").to_query("document");
            assert!(query.contains("querySelectorAll('a')"));
            assert!(query.contains("=== \"Sign in\""));
        }

        #[test]
        fn test_query_escapes_quotes_and_control_chars() {
            let query = Locator::css("a[title=\"x\"]\n").to_query("document");
            assert_eq!(
                query,
                r#"Array.from(document.querySelectorAll("a[title=\"x\"]\n"))"#
            );
        }

        #[test]
        fn test_query_keeps_non_ascii_literal() {
            let query = Locator::link_text("Connexion é").to_query("document");
            assert!(query.ends_with("=== \"Connexion é\")"));
        }

        #[test]
        fn test_js_string_escapes() {
            assert_eq!(js_string(r#"a"b"#), r#""a\"b""#);
            assert_eq!(js_string("line\nbreak"), r#""line\nbreak""#);
            assert_eq!(js_string("back\\slash"), r#""back\\slash""#);
        }

        #[test]
        fn test_test_id_query() {
            let query = Locator::test_id("score").to_query("document");
            assert!(query.contains("data-testid"));
            assert!(query.contains("score"));
        }
    }
}
