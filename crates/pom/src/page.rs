//! Page declarations and page views.
//!
//! A page is a named root of the element tree with a URL and an identity
//! rule that decides whether the browser is currently showing it.
//!
//! # Example
//!
//! ```ignore
//! let login = PageSpec::new("/login").child(
//!     "form",
//!     ui::form(Locator::css("form#login"))
//!         .child("username", ui::text_field(Locator::name("user")))
//!         .child("submit", ui::button(Locator::css("button[type=submit]"))),
//! );
//! ```

use crate::app::App;
use crate::node::{Block, Button, CheckBox, Form, Link, TextField, UiNode};
use crate::result::PomResult;
use crate::tree::{insert_child, NodeId, UiSpec};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use url::Url;

/// How the app decides that the browser is showing a page
#[derive(Debug, Clone, Default)]
pub enum PageIdentity {
    /// Current URL has the page's origin and its path matches the page URL
    /// as a pattern (`*` and `:param` segments; query and fragment ignored)
    #[default]
    UrlPath,
    /// Current URL matches the regex anywhere
    UrlRegex(Regex),
    /// The named descendant (dotted path) is present in the document
    Marker(String),
}

/// Declaration of one page
#[derive(Debug, Clone)]
pub struct PageSpec {
    url: String,
    identity: PageIdentity,
    children: Vec<(String, UiSpec)>,
}

impl PageSpec {
    /// Page reachable at `url`, relative to the app base URL unless absolute
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            identity: PageIdentity::UrlPath,
            children: Vec::new(),
        }
    }

    /// Declare a top-level element. Re-declaring a name replaces it in place.
    #[must_use]
    pub fn child(mut self, name: impl Into<String>, spec: UiSpec) -> Self {
        insert_child(&mut self.children, name.into(), spec);
        self
    }

    /// Override how the page is recognised as current
    #[must_use]
    pub fn identified_by(mut self, identity: PageIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Declared URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Identity rule
    #[must_use]
    pub const fn identity(&self) -> &PageIdentity {
        &self.identity
    }

    pub(crate) fn children(&self) -> &[(String, UiSpec)] {
        &self.children
    }
}

// ============================================================================
// URL handling
// ============================================================================

/// Join a page URL onto the base URL; absolute page URLs are used verbatim.
///
/// A URL counts as absolute only when it parses on its own with a
/// hierarchical scheme, so a scheme appearing inside a query string does not.
#[must_use]
pub fn join_url(base: &str, url: &str) -> String {
    if Url::parse(url).is_ok_and(|parsed| !parsed.cannot_be_a_base()) {
        return url.to_string();
    }
    if url.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
}

/// URL pattern matcher for page paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlMatcher {
    pattern: String,
    segments: Vec<UrlSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum UrlSegment {
    Literal(String),
    Wildcard,
    Parameter(String),
}

impl UrlMatcher {
    /// Create a new URL matcher from a path pattern
    ///
    /// Patterns support:
    /// - Literal segments: `/login`
    /// - Wildcards: `/users/*`
    /// - Named parameters: `/users/:id`
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let segments = split_path(pattern)
            .map(|s| match s {
                "*" => UrlSegment::Wildcard,
                _ => s.strip_prefix(':').map_or_else(
                    || UrlSegment::Literal(s.to_string()),
                    |name| UrlSegment::Parameter(name.to_string()),
                ),
            })
            .collect();

        Self {
            pattern: pattern.to_string(),
            segments,
        }
    }

    /// Whether `path` matches; every segment consumes exactly one path segment
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.capture(path).is_some()
    }

    /// Values of `:param` segments, `None` if `path` does not match
    #[must_use]
    pub fn capture(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = split_path(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                UrlSegment::Literal(lit) if lit != part => return None,
                UrlSegment::Parameter(name) => {
                    let _ = params.insert(name.clone(), part.to_string());
                }
                UrlSegment::Literal(_) | UrlSegment::Wildcard => {}
            }
        }
        Some(params)
    }

    /// Get the original pattern
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// Path segments without query string or fragment
fn split_path(path: &str) -> impl Iterator<Item = &str> {
    let end = path.find(|c| c == '?' || c == '#').unwrap_or(path.len());
    path[..end].split('/').filter(|s| !s.is_empty())
}

// ============================================================================
// Registered page
// ============================================================================

#[derive(Debug)]
pub(crate) struct PageSlot {
    pub(crate) name: String,
    pub(crate) url: String,
    pub(crate) full_url: String,
    pub(crate) identity: PageIdentity,
    pub(crate) matcher: UrlMatcher,
    pub(crate) root: NodeId,
}

impl PageSlot {
    pub(crate) fn new(name: String, spec: &PageSpec, base_url: &str, root: NodeId) -> Self {
        let full_url = join_url(base_url, &spec.url);
        let matcher = UrlMatcher::new(&path_of(&full_url));
        Self {
            name,
            url: spec.url.clone(),
            full_url,
            identity: spec.identity.clone(),
            matcher,
            root,
        }
    }

    /// Params of the current URL if it is on this page's origin and path
    pub(crate) fn capture(&self, current: &str) -> Option<HashMap<String, String>> {
        let actual = Url::parse(current).ok()?;
        if let Ok(expected) = Url::parse(&self.full_url) {
            let same_origin = expected.scheme() == actual.scheme()
                && expected.host_str() == actual.host_str()
                && expected.port_or_known_default() == actual.port_or_known_default();
            if !same_origin {
                return None;
            }
        }
        self.matcher.capture(actual.path())
    }
}

/// Path component of an absolute URL, or the input itself when relative
fn path_of(url: &str) -> String {
    Url::parse(url).map_or_else(|_| url.to_string(), |u| u.path().to_string())
}

/// View of one registered page
#[derive(Clone, Copy)]
pub struct Page<'a> {
    app: &'a App,
    index: usize,
}

impl<'a> Page<'a> {
    pub(crate) const fn new(app: &'a App, index: usize) -> Self {
        Self { app, index }
    }

    pub(crate) const fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn belongs_to(&self, app: &App) -> bool {
        std::ptr::eq(self.app, app)
    }

    fn slot(&self) -> &'a PageSlot {
        self.app.page_slot(self.index)
    }

    /// Registered name
    #[must_use]
    pub fn name(&self) -> &'a str {
        &self.slot().name
    }

    /// Declared URL
    #[must_use]
    pub fn url(&self) -> &'a str {
        &self.slot().url
    }

    /// URL the page is opened at
    #[must_use]
    pub fn full_url(&self) -> &'a str {
        &self.slot().full_url
    }

    /// Identity rule
    #[must_use]
    pub fn identity(&self) -> &'a PageIdentity {
        &self.slot().identity
    }

    /// Navigate to this page. All cached references are invalidated.
    ///
    /// # Errors
    ///
    /// Returns [`PomError::Navigation`](crate::PomError::Navigation) on failure
    pub fn open(&self) -> PomResult<Self> {
        self.app.open(*self)?;
        Ok(*self)
    }

    /// Whether the browser is showing this page right now
    ///
    /// # Errors
    ///
    /// Driver failure while reading the current URL or checking a marker
    pub fn is_current(&self) -> PomResult<bool> {
        self.app.is_showing(self.index)
    }

    /// `:param` values of the current URL for this page's pattern.
    /// Empty when the browser is elsewhere.
    ///
    /// # Errors
    ///
    /// Driver failure while reading the current URL
    pub fn url_params(&self) -> PomResult<HashMap<String, String>> {
        let current = self.app.current_url()?;
        Ok(self.slot().capture(&current).unwrap_or_default())
    }

    /// Element by dotted path from the page root
    ///
    /// # Errors
    ///
    /// Returns [`PomError::UnknownElement`](crate::PomError::UnknownElement)
    pub fn element(&self, path: &str) -> PomResult<UiNode<'a>> {
        let id = self.app.tree().lookup(self.slot().root, path)?;
        Ok(UiNode::new(self.app, id))
    }

    /// Names of top-level elements, in declaration order
    #[must_use]
    pub fn element_names(&self) -> Vec<&'a str> {
        self.app
            .tree()
            .slot(self.slot().root)
            .children
            .iter()
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Element as a text field
    ///
    /// # Errors
    ///
    /// Unknown path or a different declared kind
    pub fn text_field(&self, path: &str) -> PomResult<TextField<'a>> {
        self.element(path)?.try_into()
    }

    /// Element as a button
    ///
    /// # Errors
    ///
    /// Unknown path or a different declared kind
    pub fn button(&self, path: &str) -> PomResult<Button<'a>> {
        self.element(path)?.try_into()
    }

    /// Element as a checkbox
    ///
    /// # Errors
    ///
    /// Unknown path or a different declared kind
    pub fn checkbox(&self, path: &str) -> PomResult<CheckBox<'a>> {
        self.element(path)?.try_into()
    }

    /// Element as a form
    ///
    /// # Errors
    ///
    /// Unknown path or a different declared kind
    pub fn form(&self, path: &str) -> PomResult<Form<'a>> {
        self.element(path)?.try_into()
    }

    /// Element as a link
    ///
    /// # Errors
    ///
    /// Unknown path or a different declared kind
    pub fn link(&self, path: &str) -> PomResult<Link<'a>> {
        self.element(path)?.try_into()
    }

    /// Element as a block
    ///
    /// # Errors
    ///
    /// Unknown path or a different declared kind
    pub fn block(&self, path: &str) -> PomResult<Block<'a>> {
        self.element(path)?.try_into()
    }
}

impl PartialEq for Page<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.app, other.app) && self.index == other.index
    }
}

impl Eq for Page<'_> {}

impl fmt::Debug for Page<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("name", &self.name())
            .field("url", &self.full_url())
            .finish()
    }
}

impl fmt::Display for Page<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
