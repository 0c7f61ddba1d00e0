//! Declared element tree and its per-level handle cache.
//!
//! Nodes live in an arena indexed by [`NodeId`]; a child points at its parent
//! by id, parents list children by declared name. Every page contributes one
//! root node whose search scope is the whole document.
//!
//! # Cache invariant
//!
//! A node's cached [`ResolvedHandle`] records the generation of its parent at
//! the time it was found. It is reused only while that recorded generation
//! equals the parent's current generation (checked recursively, parent
//! first) and the driver still reports the reference as present. Page roots
//! take their generation from the tree-wide root counter, which navigation
//! bumps; an element's generation is bumped every time it is re-found. Bumps
//! are never pushed down: descendants notice the mismatch when next resolved.

use crate::driver::{Driver, NativeRef, SearchRoot};
use crate::locator::Locator;
use crate::result::{DriverError, PomError, PomResult};
use std::cell::{Cell, RefCell};
use std::fmt;
use tracing::{debug, warn};

/// Index of a declared node in the tree arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Closed set of element kinds a node can be declared as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Plain element: click, read text and attributes
    Element,
    /// Container of other elements
    Block,
    /// Container that can be submitted
    Form,
    /// Editable text input
    TextField,
    /// Clickable button
    Button,
    /// Checkbox that can be toggled
    CheckBox,
    /// Hyperlink
    Link,
}

impl NodeKind {
    /// Name used in diagnostics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Element => "element",
            Self::Block => "block",
            Self::Form => "form",
            Self::TextField => "text field",
            Self::Button => "button",
            Self::CheckBox => "checkbox",
            Self::Link => "link",
        }
    }

    /// Whether child elements may be declared on this kind
    #[must_use]
    pub const fn is_container(&self) -> bool {
        matches!(self, Self::Block | Self::Form)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of one UI element and the elements nested in it.
///
/// Specs are plain data: the same spec can be attached to several pages and
/// every attachment gets its own node and cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiSpec {
    kind: NodeKind,
    locator: Locator,
    children: Vec<(String, UiSpec)>,
}

impl UiSpec {
    /// Declare an element of `kind` found by `locator`
    #[must_use]
    pub fn new(kind: NodeKind, locator: Locator) -> Self {
        Self {
            kind,
            locator,
            children: Vec::new(),
        }
    }

    /// Declare a nested element. Re-declaring a name replaces it in place.
    #[must_use]
    pub fn child(mut self, name: impl Into<String>, spec: UiSpec) -> Self {
        insert_child(&mut self.children, name.into(), spec);
        self
    }

    /// Declared kind
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Declared locator
    #[must_use]
    pub const fn locator(&self) -> &Locator {
        &self.locator
    }
}

pub(crate) fn insert_child(children: &mut Vec<(String, UiSpec)>, name: String, spec: UiSpec) {
    match children.iter_mut().find(|(n, _)| *n == name) {
        Some(slot) => slot.1 = spec,
        None => children.push((name, spec)),
    }
}

/// Builders for [`UiSpec`], one per [`NodeKind`].
pub mod ui {
    use super::{NodeKind, UiSpec};
    use crate::locator::Locator;

    /// Plain element
    #[must_use]
    pub fn element(locator: Locator) -> UiSpec {
        UiSpec::new(NodeKind::Element, locator)
    }

    /// Container block
    #[must_use]
    pub fn block(locator: Locator) -> UiSpec {
        UiSpec::new(NodeKind::Block, locator)
    }

    /// Form container
    #[must_use]
    pub fn form(locator: Locator) -> UiSpec {
        UiSpec::new(NodeKind::Form, locator)
    }

    /// Text input
    #[must_use]
    pub fn text_field(locator: Locator) -> UiSpec {
        UiSpec::new(NodeKind::TextField, locator)
    }

    /// Button
    #[must_use]
    pub fn button(locator: Locator) -> UiSpec {
        UiSpec::new(NodeKind::Button, locator)
    }

    /// Checkbox
    #[must_use]
    pub fn checkbox(locator: Locator) -> UiSpec {
        UiSpec::new(NodeKind::CheckBox, locator)
    }

    /// Link
    #[must_use]
    pub fn link(locator: Locator) -> UiSpec {
        UiSpec::new(NodeKind::Link, locator)
    }
}

/// Cached driver-native reference of one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHandle {
    native: NativeRef,
    parent_generation: u64,
}

impl ResolvedHandle {
    /// Driver-native reference
    #[must_use]
    pub const fn native(&self) -> &NativeRef {
        &self.native
    }

    /// Parent generation this handle was resolved against
    #[must_use]
    pub const fn parent_generation(&self) -> u64 {
        self.parent_generation
    }
}

/// A node's live search scope together with the generation it is valid for
#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    pub(crate) root: SearchRoot,
    pub(crate) generation: u64,
}

#[derive(Debug)]
pub(crate) struct NodeSlot {
    pub(crate) path: String,
    pub(crate) kind: NodeKind,
    /// `None` for page roots
    pub(crate) locator: Option<Locator>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<(String, NodeId)>,
    cache: RefCell<Option<ResolvedHandle>>,
    generation: Cell<u64>,
}

impl NodeSlot {
    pub(crate) fn locator_label(&self) -> String {
        self.locator
            .as_ref()
            .map_or_else(|| "document".to_string(), ToString::to_string)
    }
}

/// Arena of declared nodes plus the root generation counter
#[derive(Debug, Default)]
pub(crate) struct NodeTree {
    nodes: Vec<NodeSlot>,
    root_generation: Cell<u64>,
}

impl NodeTree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a page root and instantiate its declared children
    pub(crate) fn add_root(&mut self, name: &str, children: &[(String, UiSpec)]) -> PomResult<NodeId> {
        let id = self.push(name.to_string(), NodeKind::Block, None, None);
        for (child_name, spec) in children {
            let child = self.instantiate(id, child_name, spec)?;
            self.nodes[id.0].children.push((child_name.clone(), child));
        }
        Ok(id)
    }

    fn instantiate(&mut self, parent: NodeId, name: &str, spec: &UiSpec) -> PomResult<NodeId> {
        let path = format!("{}.{}", self.nodes[parent.0].path, name);
        if name.is_empty() || name.contains('.') {
            return Err(PomError::InvalidConfig {
                message: format!("invalid element name {name:?} under {}", self.nodes[parent.0].path),
            });
        }
        if !spec.children.is_empty() && !spec.kind.is_container() {
            return Err(PomError::InvalidConfig {
                message: format!("{path} is a {} and cannot declare children", spec.kind),
            });
        }
        let id = self.push(path, spec.kind, Some(spec.locator.clone()), Some(parent));
        for (child_name, child_spec) in &spec.children {
            let child = self.instantiate(id, child_name, child_spec)?;
            self.nodes[id.0].children.push((child_name.clone(), child));
        }
        Ok(id)
    }

    fn push(&mut self, path: String, kind: NodeKind, locator: Option<Locator>, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeSlot {
            path,
            kind,
            locator,
            parent,
            children: Vec::new(),
            cache: RefCell::new(None),
            generation: Cell::new(0),
        });
        id
    }

    pub(crate) fn slot(&self, id: NodeId) -> &NodeSlot {
        &self.nodes[id.0]
    }

    /// Walk a dotted path ("form.username") down from `from`
    pub(crate) fn lookup(&self, from: NodeId, path: &str) -> PomResult<NodeId> {
        let mut cursor = from;
        for segment in path.split('.') {
            cursor = self
                .slot(cursor)
                .children
                .iter()
                .find(|(name, _)| name == segment)
                .map(|(_, id)| *id)
                .ok_or_else(|| PomError::UnknownElement {
                    path: format!("{}.{}", self.slot(from).path, path),
                })?;
        }
        Ok(cursor)
    }

    pub(crate) fn root_generation(&self) -> u64 {
        self.root_generation.get()
    }

    /// Invalidate every cache in the tree lazily
    pub(crate) fn bump_root(&self) {
        self.root_generation.set(self.root_generation.get() + 1);
    }

    /// Drop one node's cache; it is re-found on next resolution
    pub(crate) fn invalidate(&self, id: NodeId) {
        let _ = self.slot(id).cache.borrow_mut().take();
    }

    /// Current generation of a node (root generation for page roots)
    pub(crate) fn generation(&self, id: NodeId) -> u64 {
        let slot = self.slot(id);
        match slot.parent {
            None => self.root_generation(),
            Some(_) => slot.generation.get(),
        }
    }

    pub(crate) fn cached(&self, id: NodeId) -> Option<ResolvedHandle> {
        self.slot(id).cache.borrow().clone()
    }

    /// Live scope of a node: the document for page roots, the node's own
    /// element otherwise
    pub(crate) fn resolve_scope(&self, driver: &dyn Driver, id: NodeId) -> PomResult<Resolved> {
        if self.slot(id).parent.is_none() {
            return Ok(Resolved {
                root: SearchRoot::Document,
                generation: self.root_generation(),
            });
        }
        let handle = self.resolve(driver, id)?;
        Ok(Resolved {
            root: SearchRoot::Element(handle.native),
            generation: self.generation(id),
        })
    }

    /// Resolve a node to a live native reference, reusing the cache when
    /// the whole ancestor chain is unchanged
    pub(crate) fn resolve(&self, driver: &dyn Driver, id: NodeId) -> PomResult<ResolvedHandle> {
        let slot = self.slot(id);
        let (Some(parent_id), Some(locator)) = (slot.parent, slot.locator.as_ref()) else {
            return Err(PomError::UnknownElement {
                path: slot.path.clone(),
            });
        };

        let mut restarted = false;
        loop {
            let parent = self.resolve_scope(driver, parent_id)?;

            if let Some(handle) = self.cached(id) {
                if handle.parent_generation == parent.generation {
                    if driver.is_present(&handle.native) {
                        debug!(path = %slot.path, "cache hit");
                        return Ok(handle);
                    }
                    debug!(path = %slot.path, "cached reference is stale, re-resolving");
                } else {
                    debug!(
                        path = %slot.path,
                        cached = handle.parent_generation,
                        current = parent.generation,
                        "ancestor changed, re-resolving"
                    );
                }
                self.invalidate(id);
            }

            match driver.find_elements(&parent.root, locator) {
                Ok(found) => {
                    let native = pick(slot, locator, found)?;
                    let handle = ResolvedHandle {
                        native,
                        parent_generation: parent.generation,
                    };
                    *slot.cache.borrow_mut() = Some(handle.clone());
                    slot.generation.set(slot.generation.get() + 1);
                    debug!(path = %slot.path, native = %handle.native, "resolved");
                    return Ok(handle);
                }
                Err(DriverError::StaleElement) if !restarted => {
                    warn!(path = %slot.path, "parent went stale during find, restarting from parent");
                    self.invalidate(parent_id);
                    restarted = true;
                }
                Err(e) => return Err(PomError::driver(slot.path.clone(), e)),
            }
        }
    }
}

fn pick(slot: &NodeSlot, locator: &Locator, found: Vec<NativeRef>) -> PomResult<NativeRef> {
    let not_found = || PomError::NotFound {
        path: slot.path.clone(),
        locator: locator.to_string(),
    };
    match locator.index() {
        Some(index) => found.into_iter().nth(index).ok_or_else(not_found),
        None => {
            let count = found.len();
            let mut found = found.into_iter();
            match (found.next(), count) {
                (Some(native), 1) => Ok(native),
                (None, _) => Err(not_found()),
                (Some(_), _) => Err(PomError::Ambiguous {
                    path: slot.path.clone(),
                    locator: locator.to_string(),
                    count,
                }),
            }
        }
    }
}
