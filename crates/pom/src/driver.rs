//! Driver - Abstract Browser Automation Trait
//!
//! The engine never talks to a browser directly. Everything it needs from the
//! automation protocol is expressed by the blocking [`Driver`] trait, so the
//! same page tree runs against Chromium (feature `browser`) or against the
//! in-memory [`MockDriver`] used by the test suite.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Driver (Abstract Trait)                                  │
//! ├───────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────┐      ┌─────────────────────┐     │
//! │  │  CdpDriver          │      │  MockDriver         │     │
//! │  │  (feature browser)  │      │  (Unit Tests)       │     │
//! │  │  chromiumoxide      │      │  in-memory DOM      │     │
//! │  └─────────────────────┘      └─────────────────────┘     │
//! └───────────────────────────────────────────────────────────┘
//! ```

use crate::locator::Locator;
use crate::result::{DriverError, DriverResult};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Opaque driver-native reference to one live DOM element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeRef {
    id: String,
}

impl NativeRef {
    /// Wrap a driver-issued element id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Driver-issued element id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for NativeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Where a find-operation searches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchRoot {
    /// The whole current document (page roots)
    Document,
    /// Descendants of one live element
    Element(NativeRef),
}

/// Browser configuration for driver
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Run in headless mode
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Timeout for navigation
    pub navigation_timeout: Duration,
    /// Run Chromium with its sandbox enabled
    pub sandbox: bool,
    /// Executable path override
    pub executable_path: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            navigation_timeout: Duration::from_secs(30),
            sandbox: true,
            executable_path: None,
        }
    }
}

impl DriverConfig {
    /// Create new config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set headless mode
    #[must_use]
    pub const fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set viewport dimensions
    #[must_use]
    pub const fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set navigation timeout
    #[must_use]
    pub const fn navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Disable the Chromium sandbox (containers, CI)
    #[must_use]
    pub const fn no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }

    /// Use a specific browser executable
    #[must_use]
    pub fn executable(mut self, path: impl Into<String>) -> Self {
        self.executable_path = Some(path.into());
        self
    }
}

/// Blocking browser automation capability consumed by the engine.
///
/// Every call is synchronous. Element-level calls report
/// [`DriverError::StaleElement`] when the reference no longer points at a
/// live element.
pub trait Driver {
    /// All elements matching `locator` under `root`, in document order.
    ///
    /// The locator's index is ignored; the engine applies it.
    fn find_elements(&self, root: &SearchRoot, locator: &Locator) -> DriverResult<Vec<NativeRef>>;

    /// Whether the element is rendered and visible
    fn is_visible(&self, element: &NativeRef) -> DriverResult<bool>;

    /// Cheap liveness check: the reference still points at an attached element
    fn is_present(&self, element: &NativeRef) -> bool;

    /// Navigate the session to `url`
    fn navigate(&self, url: &str) -> DriverResult<()>;

    /// URL currently shown by the browser
    fn current_url(&self) -> DriverResult<String>;

    /// Click the element
    fn click(&self, element: &NativeRef) -> DriverResult<()>;

    /// Double-click the element
    fn double_click(&self, element: &NativeRef) -> DriverResult<()>;

    /// Right-click the element, opening its context menu
    fn context_click(&self, element: &NativeRef) -> DriverResult<()>;

    /// Move the pointer over the element
    fn hover(&self, element: &NativeRef) -> DriverResult<()>;

    /// Scroll the window until the element is in view
    fn scroll_into_view(&self, element: &NativeRef) -> DriverResult<()>;

    /// Type text into the element
    fn send_keys(&self, element: &NativeRef, text: &str) -> DriverResult<()>;

    /// Clear an editable element
    fn clear(&self, element: &NativeRef) -> DriverResult<()>;

    /// Submit the form the element belongs to
    fn submit(&self, element: &NativeRef) -> DriverResult<()>;

    /// Visible text of the element
    fn text(&self, element: &NativeRef) -> DriverResult<String>;

    /// Attribute or property value
    fn attribute(&self, element: &NativeRef, name: &str) -> DriverResult<Option<String>>;

    /// Whether the element is enabled
    fn is_enabled(&self, element: &NativeRef) -> DriverResult<bool>;

    /// Whether a checkbox / radio / option is selected
    fn is_selected(&self, element: &NativeRef) -> DriverResult<bool>;

    /// Close the browser session
    fn quit(&mut self) -> DriverResult<()>;
}

// ============================================================================
// MockDriver
// ============================================================================

/// Visibility schedule of a mock element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visibility {
    Visible,
    Hidden,
    After(Instant),
}

impl Visibility {
    fn is_visible(self) -> bool {
        match self {
            Self::Visible => true,
            Self::Hidden => false,
            Self::After(at) => Instant::now() >= at,
        }
    }
}

/// Declaration of an element inside the [`MockDriver`] DOM
#[derive(Debug, Clone)]
pub struct MockElement {
    key: String,
    locator: Locator,
    parent: Option<String>,
    visibility: Visibility,
    text: String,
    attributes: HashMap<String, String>,
    enabled: bool,
}

impl MockElement {
    /// Create a visible element matched by `locator`. `key` names it for
    /// later manipulation.
    #[must_use]
    pub fn new(key: impl Into<String>, locator: Locator) -> Self {
        Self {
            key: key.into(),
            locator,
            parent: None,
            visibility: Visibility::Visible,
            text: String::new(),
            attributes: HashMap::new(),
            enabled: true,
        }
    }

    /// Nest under a previously added element
    #[must_use]
    pub fn inside(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Start hidden
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.visibility = Visibility::Hidden;
        self
    }

    /// Become visible once `delay` has passed from now
    #[must_use]
    pub fn visible_after(mut self, delay: Duration) -> Self {
        self.visibility = Visibility::After(Instant::now() + delay);
        self
    }

    /// Set visible text
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.attributes.insert(name.into(), value.into());
        self
    }

    /// Mark disabled
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug)]
struct MockNode {
    spec: MockElement,
    parent: Option<usize>,
    attached: bool,
    version: u64,
    selected: bool,
}

#[derive(Debug, Clone, Copy)]
struct Issued {
    node: usize,
    epoch: u64,
    version: u64,
}

#[derive(Debug, Default)]
struct MockDom {
    url: String,
    nodes: Vec<MockNode>,
    by_key: HashMap<String, usize>,
    issued: HashMap<String, Issued>,
    epoch: u64,
    next_ref: u64,
    call_history: Vec<String>,
    failures: VecDeque<(String, DriverError)>,
    closed: bool,
}

impl MockDom {
    fn record(&mut self, call: String) {
        self.call_history.push(call);
    }

    fn injected(&mut self, op: &str) -> DriverResult<()> {
        if self.failures.front().is_some_and(|(o, _)| o == op) {
            if let Some((_, err)) = self.failures.pop_front() {
                return Err(err);
            }
        }
        Ok(())
    }

    fn attached_chain(&self, mut idx: usize) -> bool {
        loop {
            let node = &self.nodes[idx];
            if !node.attached {
                return false;
            }
            match node.parent {
                Some(p) => idx = p,
                None => return true,
            }
        }
    }

    fn visible_chain(&self, mut idx: usize) -> bool {
        loop {
            let node = &self.nodes[idx];
            if !node.spec.visibility.is_visible() {
                return false;
            }
            match node.parent {
                Some(p) => idx = p,
                None => return true,
            }
        }
    }

    fn is_descendant(&self, idx: usize, ancestor: usize) -> bool {
        let mut cursor = self.nodes[idx].parent;
        while let Some(p) = cursor {
            if p == ancestor {
                return true;
            }
            cursor = self.nodes[p].parent;
        }
        false
    }

    fn live(&self, element: &NativeRef) -> DriverResult<usize> {
        let issued = self
            .issued
            .get(element.id())
            .ok_or(DriverError::NoSuchElement)?;
        let node = &self.nodes[issued.node];
        if issued.epoch != self.epoch
            || issued.version != node.version
            || !self.attached_chain(issued.node)
        {
            return Err(DriverError::StaleElement);
        }
        Ok(issued.node)
    }

    fn issue(&mut self, node: usize) -> NativeRef {
        self.next_ref += 1;
        let id = format!("{}#{}", self.nodes[node].spec.key, self.next_ref);
        let _ = self.issued.insert(
            id.clone(),
            Issued {
                node,
                epoch: self.epoch,
                version: self.nodes[node].version,
            },
        );
        NativeRef::new(id)
    }

    fn interactable(&mut self, element: &NativeRef) -> DriverResult<usize> {
        let idx = self.live(element)?;
        if !self.visible_chain(idx) {
            return Err(DriverError::Protocol(format!(
                "element {} is not interactable",
                self.nodes[idx].spec.key
            )));
        }
        Ok(idx)
    }

    fn subtree(&self, root: usize) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&i| i == root || self.is_descendant(i, root))
            .collect()
    }
}

/// In-memory driver for unit testing.
///
/// Holds a tiny DOM of [`MockElement`]s. Clones share the same DOM, so a test
/// can keep one handle to script the page and count calls while the
/// [`App`](crate::App) owns another.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    dom: Rc<RefCell<MockDom>>,
}

impl MockDriver {
    /// Create new mock driver
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element. Panics if its parent key is unknown.
    pub fn add(&self, element: MockElement) -> &Self {
        let mut dom = self.dom.borrow_mut();
        let parent = element.parent.as_ref().map(|key| {
            *dom.by_key
                .get(key)
                .unwrap_or_else(|| panic!("mock parent {key:?} not declared"))
        });
        let idx = dom.nodes.len();
        let _ = dom.by_key.insert(element.key.clone(), idx);
        dom.nodes.push(MockNode {
            spec: element,
            parent,
            attached: true,
            version: 0,
            selected: false,
        });
        self
    }

    fn with_node(&self, key: &str, f: impl Fn(&mut MockDom, usize)) {
        let mut dom = self.dom.borrow_mut();
        let idx = *dom
            .by_key
            .get(key)
            .unwrap_or_else(|| panic!("mock element {key:?} not declared"));
        f(&mut dom, idx);
    }

    /// Make an element visible now
    pub fn show(&self, key: &str) {
        self.with_node(key, |dom, idx| {
            dom.nodes[idx].spec.visibility = Visibility::Visible;
        });
    }

    /// Hide an element
    pub fn hide(&self, key: &str) {
        self.with_node(key, |dom, idx| {
            dom.nodes[idx].spec.visibility = Visibility::Hidden;
        });
    }

    /// Make an element visible once `delay` has passed from now
    pub fn show_after(&self, key: &str, delay: Duration) {
        let at = Instant::now() + delay;
        self.with_node(key, |dom, idx| {
            dom.nodes[idx].spec.visibility = Visibility::After(at);
        });
    }

    /// Replace an element and its subtree with fresh copies; every reference
    /// issued for them goes stale
    pub fn rerender(&self, key: &str) {
        self.with_node(key, |dom, idx| {
            for i in dom.subtree(idx) {
                dom.nodes[i].version += 1;
            }
        });
    }

    /// Detach an element (and its subtree) from the DOM
    pub fn remove(&self, key: &str) {
        self.with_node(key, |dom, idx| {
            dom.nodes[idx].attached = false;
        });
    }

    /// Re-attach a removed element as a fresh copy
    pub fn restore(&self, key: &str) {
        self.with_node(key, |dom, idx| {
            dom.nodes[idx].attached = true;
            for i in dom.subtree(idx) {
                dom.nodes[i].version += 1;
            }
        });
    }

    /// Change the URL without a document reload (client-side routing)
    pub fn set_url(&self, url: impl Into<String>) {
        self.dom.borrow_mut().url = url.into();
    }

    /// Make the next call of `op` (e.g. "click", "navigate") fail with `error`
    pub fn fail_next(&self, op: impl Into<String>, error: DriverError) {
        self.dom.borrow_mut().failures.push_back((op.into(), error));
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.dom.borrow().call_history.clone()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.dom
            .borrow()
            .call_history
            .iter()
            .any(|c| c.starts_with(method))
    }

    /// Number of recorded calls starting with `prefix`
    #[must_use]
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.dom
            .borrow()
            .call_history
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Number of find-operations issued for `locator`
    #[must_use]
    pub fn find_calls_for(&self, locator: &Locator) -> usize {
        self.count_calls(&format!("find:{}", base_locator(locator)))
    }

    /// Total number of find-operations
    #[must_use]
    pub fn find_calls(&self) -> usize {
        self.count_calls("find:")
    }

    /// Forget recorded calls
    pub fn reset_calls(&self) {
        self.dom.borrow_mut().call_history.clear();
    }

    /// Current value of the `value` attribute of an element
    #[must_use]
    pub fn value_of(&self, key: &str) -> Option<String> {
        let dom = self.dom.borrow();
        let idx = *dom.by_key.get(key)?;
        dom.nodes[idx].spec.attributes.get("value").cloned()
    }

    /// Whether [`Driver::quit`] was called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.dom.borrow().closed
    }
}

fn base_locator(locator: &Locator) -> Locator {
    Locator::new(locator.strategy(), locator.value())
}

impl Driver for MockDriver {
    fn find_elements(&self, root: &SearchRoot, locator: &Locator) -> DriverResult<Vec<NativeRef>> {
        let mut dom = self.dom.borrow_mut();
        let wanted = base_locator(locator);
        dom.record(format!("find:{wanted}"));
        dom.injected("find")?;
        let scope = match root {
            SearchRoot::Document => None,
            SearchRoot::Element(element) => Some(dom.live(element)?),
        };
        let matches: Vec<usize> = (0..dom.nodes.len())
            .filter(|&i| dom.attached_chain(i))
            .filter(|&i| scope.map_or(true, |s| dom.is_descendant(i, s)))
            .filter(|&i| base_locator(&dom.nodes[i].spec.locator) == wanted)
            .collect();
        Ok(matches.into_iter().map(|i| dom.issue(i)).collect())
    }

    fn is_visible(&self, element: &NativeRef) -> DriverResult<bool> {
        let mut dom = self.dom.borrow_mut();
        dom.record(format!("is_visible:{element}"));
        dom.injected("is_visible")?;
        let idx = dom.live(element)?;
        Ok(dom.visible_chain(idx))
    }

    fn is_present(&self, element: &NativeRef) -> bool {
        let mut dom = self.dom.borrow_mut();
        dom.record(format!("is_present:{element}"));
        dom.live(element).is_ok()
    }

    fn navigate(&self, url: &str) -> DriverResult<()> {
        let mut dom = self.dom.borrow_mut();
        dom.record(format!("navigate:{url}"));
        dom.injected("navigate")?;
        dom.url = url.to_string();
        dom.epoch += 1;
        Ok(())
    }

    fn current_url(&self) -> DriverResult<String> {
        let mut dom = self.dom.borrow_mut();
        dom.record("current_url".to_string());
        dom.injected("current_url")?;
        Ok(dom.url.clone())
    }

    fn click(&self, element: &NativeRef) -> DriverResult<()> {
        let mut dom = self.dom.borrow_mut();
        dom.record(format!("click:{element}"));
        dom.injected("click")?;
        let idx = dom.interactable(element)?;
        let node = &mut dom.nodes[idx];
        if node.spec.attributes.get("type").map(String::as_str) == Some("checkbox") {
            node.selected = !node.selected;
        }
        Ok(())
    }

    fn double_click(&self, element: &NativeRef) -> DriverResult<()> {
        let mut dom = self.dom.borrow_mut();
        dom.record(format!("double_click:{element}"));
        dom.injected("double_click")?;
        dom.interactable(element).map(|_| ())
    }

    fn context_click(&self, element: &NativeRef) -> DriverResult<()> {
        let mut dom = self.dom.borrow_mut();
        dom.record(format!("context_click:{element}"));
        dom.injected("context_click")?;
        dom.interactable(element).map(|_| ())
    }

    fn hover(&self, element: &NativeRef) -> DriverResult<()> {
        let mut dom = self.dom.borrow_mut();
        dom.record(format!("hover:{element}"));
        dom.injected("hover")?;
        dom.interactable(element).map(|_| ())
    }

    fn scroll_into_view(&self, element: &NativeRef) -> DriverResult<()> {
        let mut dom = self.dom.borrow_mut();
        dom.record(format!("scroll_into_view:{element}"));
        dom.injected("scroll_into_view")?;
        dom.live(element).map(|_| ())
    }

    fn send_keys(&self, element: &NativeRef, text: &str) -> DriverResult<()> {
        let mut dom = self.dom.borrow_mut();
        dom.record(format!("send_keys:{element}"));
        dom.injected("send_keys")?;
        let idx = dom.interactable(element)?;
        let value = dom.nodes[idx]
            .spec
            .attributes
            .entry("value".to_string())
            .or_default();
        value.push_str(text);
        Ok(())
    }

    fn clear(&self, element: &NativeRef) -> DriverResult<()> {
        let mut dom = self.dom.borrow_mut();
        dom.record(format!("clear:{element}"));
        dom.injected("clear")?;
        let idx = dom.interactable(element)?;
        let _ = dom.nodes[idx]
            .spec
            .attributes
            .insert("value".to_string(), String::new());
        Ok(())
    }

    fn submit(&self, element: &NativeRef) -> DriverResult<()> {
        let mut dom = self.dom.borrow_mut();
        dom.record(format!("submit:{element}"));
        dom.injected("submit")?;
        dom.interactable(element).map(|_| ())
    }

    fn text(&self, element: &NativeRef) -> DriverResult<String> {
        let mut dom = self.dom.borrow_mut();
        dom.record(format!("text:{element}"));
        dom.injected("text")?;
        let idx = dom.live(element)?;
        Ok(dom.nodes[idx].spec.text.clone())
    }

    fn attribute(&self, element: &NativeRef, name: &str) -> DriverResult<Option<String>> {
        let mut dom = self.dom.borrow_mut();
        dom.record(format!("attribute:{element}:{name}"));
        dom.injected("attribute")?;
        let idx = dom.live(element)?;
        Ok(dom.nodes[idx].spec.attributes.get(name).cloned())
    }

    fn is_enabled(&self, element: &NativeRef) -> DriverResult<bool> {
        let mut dom = self.dom.borrow_mut();
        dom.record(format!("is_enabled:{element}"));
        dom.injected("is_enabled")?;
        let idx = dom.live(element)?;
        Ok(dom.nodes[idx].spec.enabled)
    }

    fn is_selected(&self, element: &NativeRef) -> DriverResult<bool> {
        let mut dom = self.dom.borrow_mut();
        dom.record(format!("is_selected:{element}"));
        dom.injected("is_selected")?;
        let idx = dom.live(element)?;
        Ok(dom.nodes[idx].selected)
    }

    fn quit(&mut self) -> DriverResult<()> {
        let mut dom = self.dom.borrow_mut();
        dom.record("quit".to_string());
        dom.closed = true;
        Ok(())
    }
}
