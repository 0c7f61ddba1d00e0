//! Element views.
//!
//! A [`UiNode`] is a cheap, copyable view of one declared element of an
//! [`App`]. It owns nothing: the cache lives in the app's node tree and every
//! call goes through the app's driver.
//!
//! Every interaction first waits for the element to be visible, then acts on
//! the fresh reference. If the reference goes stale between the wait and the
//! action, the wait and the action are retried once.

use crate::app::App;
use crate::driver::{Driver, NativeRef};
use crate::locator::Locator;
use crate::result::{DriverError, DriverResult, PomError, PomResult};
use crate::tree::{NodeId, NodeKind, ResolvedHandle};
use crate::wait::WaitOptions;
use std::fmt;
use std::ops::Deref;
use tracing::{debug, warn};

/// View of one declared element
#[derive(Clone, Copy)]
pub struct UiNode<'a> {
    app: &'a App,
    id: NodeId,
    wait: WaitOptions,
}

impl<'a> UiNode<'a> {
    pub(crate) fn new(app: &'a App, id: NodeId) -> Self {
        Self {
            app,
            id,
            wait: app.wait_options(),
        }
    }

    /// Tree id of the node
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Declared name (last path segment)
    #[must_use]
    pub fn name(&self) -> &'a str {
        let path = self.path();
        path.rsplit('.').next().unwrap_or(path)
    }

    /// Full declared path, `page.block.element`
    #[must_use]
    pub fn path(&self) -> &'a str {
        &self.app.tree().slot(self.id).path
    }

    /// Declared kind
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.app.tree().slot(self.id).kind
    }

    /// Declared locator
    #[must_use]
    pub fn locator(&self) -> Option<&'a Locator> {
        self.app.tree().slot(self.id).locator.as_ref()
    }

    /// Names of declared children, in declaration order
    #[must_use]
    pub fn child_names(&self) -> Vec<&'a str> {
        self.app
            .tree()
            .slot(self.id)
            .children
            .iter()
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Wait options used by this view
    #[must_use]
    pub const fn wait(&self) -> WaitOptions {
        self.wait
    }

    /// Same element with different wait options for subsequent calls
    #[must_use]
    pub const fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    /// Same element with a different wait timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.wait.timeout_ms = timeout_ms;
        self
    }

    /// Direct child by declared name
    ///
    /// # Errors
    ///
    /// Returns [`PomError::UnknownElement`] if no such child is declared
    pub fn child(&self, name: &str) -> PomResult<Self> {
        self.element(name)
    }

    /// Descendant by dotted path relative to this element
    ///
    /// # Errors
    ///
    /// Returns [`PomError::UnknownElement`] if the path is not declared
    pub fn element(&self, path: &str) -> PomResult<Self> {
        let id = self.app.tree().lookup(self.id, path)?;
        Ok(Self {
            app: self.app,
            id,
            wait: self.wait,
        })
    }

    /// Descendant as a text field
    ///
    /// # Errors
    ///
    /// Unknown path or a different declared kind
    pub fn text_field(&self, path: &str) -> PomResult<TextField<'a>> {
        self.element(path)?.try_into()
    }

    /// Descendant as a button
    ///
    /// # Errors
    ///
    /// Unknown path or a different declared kind
    pub fn button(&self, path: &str) -> PomResult<Button<'a>> {
        self.element(path)?.try_into()
    }

    /// Descendant as a checkbox
    ///
    /// # Errors
    ///
    /// Unknown path or a different declared kind
    pub fn checkbox(&self, path: &str) -> PomResult<CheckBox<'a>> {
        self.element(path)?.try_into()
    }

    /// Descendant as a form
    ///
    /// # Errors
    ///
    /// Unknown path or a different declared kind
    pub fn form(&self, path: &str) -> PomResult<Form<'a>> {
        self.element(path)?.try_into()
    }

    /// Descendant as a link
    ///
    /// # Errors
    ///
    /// Unknown path or a different declared kind
    pub fn link(&self, path: &str) -> PomResult<Link<'a>> {
        self.element(path)?.try_into()
    }

    /// Descendant as a block
    ///
    /// # Errors
    ///
    /// Unknown path or a different declared kind
    pub fn block(&self, path: &str) -> PomResult<Block<'a>> {
        self.element(path)?.try_into()
    }

    fn expect_kind(&self, expected: NodeKind) -> PomResult<()> {
        let actual = self.kind();
        if actual == expected {
            Ok(())
        } else {
            Err(PomError::KindMismatch {
                path: self.path().to_string(),
                expected: expected.as_str(),
                actual: actual.as_str(),
            })
        }
    }

    // ------------------------------------------------------------------
    // Resolution and waits
    // ------------------------------------------------------------------

    /// Resolve to a native reference without waiting
    ///
    /// # Errors
    ///
    /// `NotFound`, `Ambiguous`, or a driver failure
    pub fn resolve(&self) -> PomResult<ResolvedHandle> {
        self.app.tree().resolve(self.app.driver()?, self.id)
    }

    /// Wait until visible using this view's wait options
    ///
    /// # Errors
    ///
    /// `Timeout`, `Ambiguous`, or a driver failure
    pub fn await_visible(&self) -> PomResult<ResolvedHandle> {
        self.await_visible_with(&self.wait)
    }

    /// Wait until visible with explicit options
    ///
    /// # Errors
    ///
    /// `Timeout`, `Ambiguous`, or a driver failure
    pub fn await_visible_with(&self, options: &WaitOptions) -> PomResult<ResolvedHandle> {
        self.app.tree().await_visible(self.app.driver()?, self.id, options)
    }

    /// Wait until absent, detached, or hidden
    ///
    /// # Errors
    ///
    /// `Timeout`, `Ambiguous`, or a driver failure
    pub fn await_gone(&self) -> PomResult<()> {
        self.await_gone_with(&self.wait)
    }

    /// Wait until gone with explicit options
    ///
    /// # Errors
    ///
    /// `Timeout`, `Ambiguous`, or a driver failure
    pub fn await_gone_with(&self, options: &WaitOptions) -> PomResult<()> {
        self.app.tree().await_gone(self.app.driver()?, self.id, options)
    }

    /// Drop the cached reference; the next call re-finds the element
    pub fn invalidate(&self) {
        self.app.tree().invalidate(self.id);
    }

    /// Whether the element is visible right now (no waiting)
    ///
    /// # Errors
    ///
    /// `Ambiguous` or a driver failure
    pub fn is_visible(&self) -> PomResult<bool> {
        let driver = self.app.driver()?;
        let handle = match self.app.tree().resolve(driver, self.id) {
            Ok(handle) => handle,
            Err(e) if e.is_not_found() || e.is_stale() => return Ok(false),
            Err(e) => return Err(e),
        };
        match driver.is_visible(handle.native()) {
            Ok(visible) => Ok(visible),
            Err(DriverError::StaleElement) => {
                self.invalidate();
                Ok(false)
            }
            Err(e) => Err(PomError::driver(self.path(), e)),
        }
    }

    /// Whether the element is attached to the document right now
    ///
    /// # Errors
    ///
    /// `Ambiguous` or a driver failure
    pub fn is_present(&self) -> PomResult<bool> {
        match self.resolve() {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() || e.is_stale() => Ok(false),
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Interactions
    // ------------------------------------------------------------------

    /// Wait for visibility, then run `op` on the fresh reference.
    fn interact<T, F>(&self, action: &'static str, op: F) -> PomResult<T>
    where
        F: Fn(&dyn Driver, &NativeRef) -> DriverResult<T>,
    {
        let driver = self.app.driver()?;
        let tree = self.app.tree();
        let mut retried = false;
        loop {
            let handle = tree.await_visible(driver, self.id, &self.wait)?;
            match op(driver, handle.native()) {
                Ok(value) => {
                    debug!(path = %self.path(), action, "done");
                    return Ok(value);
                }
                Err(DriverError::StaleElement) if !retried => {
                    warn!(path = %self.path(), action, "reference went stale, retrying once");
                    tree.invalidate(self.id);
                    retried = true;
                }
                Err(DriverError::StaleElement) => {
                    tree.invalidate(self.id);
                    return Err(PomError::StaleReference {
                        path: self.path().to_string(),
                    });
                }
                Err(e) => return Err(PomError::driver(self.path(), e)),
            }
        }
    }

    /// Click
    ///
    /// # Errors
    ///
    /// Wait or driver failure
    pub fn click(&self) -> PomResult<()> {
        self.interact("click", |d, r| d.click(r))
    }

    /// Double-click
    ///
    /// # Errors
    ///
    /// Wait or driver failure
    pub fn double_click(&self) -> PomResult<()> {
        self.interact("double_click", |d, r| d.double_click(r))
    }

    /// Context click
    ///
    /// # Errors
    ///
    /// Wait or driver failure
    pub fn right_click(&self) -> PomResult<()> {
        self.interact("right_click", |d, r| d.context_click(r))
    }

    /// Move the pointer over the element
    ///
    /// # Errors
    ///
    /// Wait or driver failure
    pub fn hover(&self) -> PomResult<()> {
        self.interact("hover", |d, r| d.hover(r))
    }

    /// Scroll the window to the element
    ///
    /// # Errors
    ///
    /// Wait or driver failure
    pub fn scroll_to(&self) -> PomResult<()> {
        self.interact("scroll_to", |d, r| d.scroll_into_view(r))
    }

    /// Visible text
    ///
    /// # Errors
    ///
    /// Wait or driver failure
    pub fn text(&self) -> PomResult<String> {
        self.interact("text", |d, r| d.text(r))
    }

    /// Attribute value, `None` if absent
    ///
    /// # Errors
    ///
    /// Wait or driver failure
    pub fn attribute(&self, name: &str) -> PomResult<Option<String>> {
        self.interact("attribute", |d, r| d.attribute(r, name))
    }

    /// Whether the element is enabled
    ///
    /// # Errors
    ///
    /// Wait or driver failure
    pub fn is_enabled(&self) -> PomResult<bool> {
        self.interact("is_enabled", |d, r| d.is_enabled(r))
    }
}

impl PartialEq for UiNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.app, other.app) && self.id == other.id
    }
}

impl Eq for UiNode<'_> {}

impl fmt::Debug for UiNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiNode")
            .field("path", &self.path())
            .field("kind", &self.kind())
            .field("locator", &self.locator())
            .finish()
    }
}

// ============================================================================
// Typed views
// ============================================================================

macro_rules! typed_view {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name<'a>(UiNode<'a>);

        impl<'a> $name<'a> {
            /// Kind this view accepts
            pub const KIND: NodeKind = NodeKind::$kind;

            /// Untyped view of the same element
            #[must_use]
            pub const fn node(&self) -> UiNode<'a> {
                self.0
            }

            /// Same element with different wait options
            #[must_use]
            pub const fn with_wait(self, wait: WaitOptions) -> Self {
                Self(self.0.with_wait(wait))
            }

            /// Same element with a different wait timeout
            #[must_use]
            pub const fn with_timeout(self, timeout_ms: u64) -> Self {
                Self(self.0.with_timeout(timeout_ms))
            }
        }

        impl<'a> Deref for $name<'a> {
            type Target = UiNode<'a>;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl<'a> TryFrom<UiNode<'a>> for $name<'a> {
            type Error = PomError;

            fn try_from(node: UiNode<'a>) -> PomResult<Self> {
                node.expect_kind(NodeKind::$kind)?;
                Ok(Self(node))
            }
        }
    };
}

typed_view!(
    /// Editable text input
    TextField => TextField
);
typed_view!(
    /// Clickable button
    Button => Button
);
typed_view!(
    /// Checkbox
    CheckBox => CheckBox
);
typed_view!(
    /// Submittable container
    Form => Form
);
typed_view!(
    /// Hyperlink
    Link => Link
);
typed_view!(
    /// Container of other elements
    Block => Block
);

impl TextField<'_> {
    /// Replace the current content with `text`
    ///
    /// # Errors
    ///
    /// Wait or driver failure
    pub fn fill(&self, text: &str) -> PomResult<()> {
        self.clear()?;
        self.send_keys(text)
    }

    /// Type `text` after the current content
    ///
    /// # Errors
    ///
    /// Wait or driver failure
    pub fn send_keys(&self, text: &str) -> PomResult<()> {
        self.0.interact("send_keys", |d, r| d.send_keys(r, text))
    }

    /// Empty the field
    ///
    /// # Errors
    ///
    /// Wait or driver failure
    pub fn clear(&self) -> PomResult<()> {
        self.0.interact("clear", |d, r| d.clear(r))
    }

    /// Current value, empty if unset
    ///
    /// # Errors
    ///
    /// Wait or driver failure
    pub fn value(&self) -> PomResult<String> {
        Ok(self.attribute("value")?.unwrap_or_default())
    }

    /// Submit the enclosing form
    ///
    /// # Errors
    ///
    /// Wait or driver failure
    pub fn submit(&self) -> PomResult<()> {
        self.0.interact("submit", |d, r| d.submit(r))
    }
}

impl CheckBox<'_> {
    /// Whether the box is ticked
    ///
    /// # Errors
    ///
    /// Wait or driver failure
    pub fn is_checked(&self) -> PomResult<bool> {
        self.0.interact("is_selected", |d, r| d.is_selected(r))
    }

    /// Tick the box if it is not ticked
    ///
    /// # Errors
    ///
    /// Wait or driver failure
    pub fn check(&self) -> PomResult<()> {
        self.set_checked(true)
    }

    /// Untick the box if it is ticked
    ///
    /// # Errors
    ///
    /// Wait or driver failure
    pub fn uncheck(&self) -> PomResult<()> {
        self.set_checked(false)
    }

    fn set_checked(&self, wanted: bool) -> PomResult<()> {
        if self.is_checked()? != wanted {
            self.click()?;
        }
        Ok(())
    }
}

impl Form<'_> {
    /// Submit the form
    ///
    /// # Errors
    ///
    /// Wait or driver failure
    pub fn submit(&self) -> PomResult<()> {
        self.0.interact("submit", |d, r| d.submit(r))
    }

    /// Fill several text fields by path, in order
    ///
    /// # Errors
    ///
    /// Unknown path, kind mismatch, wait or driver failure
    pub fn fill(&self, values: &[(&str, &str)]) -> PomResult<()> {
        for (path, text) in values {
            self.text_field(path)?.fill(text)?;
        }
        Ok(())
    }
}

impl Link<'_> {
    /// Link target
    ///
    /// # Errors
    ///
    /// Wait or driver failure
    pub fn href(&self) -> PomResult<Option<String>> {
        self.attribute("href")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::driver::{MockDriver, MockElement};
    use crate::page::PageSpec;
    use crate::tree::ui;
    use std::time::Duration;

    fn login_app() -> (App, MockDriver) {
        let driver = MockDriver::new();
        driver
            .add(MockElement::new("form", Locator::css("form#login")))
            .add(MockElement::new("user", Locator::name("user")).inside("form"))
            .add(MockElement::new("remember", Locator::id("remember")).attr("type", "checkbox").inside("form"))
            .add(MockElement::new("submit", Locator::css("button")).text("Sign in").inside("form"))
            .add(MockElement::new("help", Locator::link_text("Help")).attr("href", "/help"));
        let app = App::builder("http://localhost:8080")
            .wait_options(WaitOptions::new().with_timeout(200).with_poll_interval(10))
            .page(
                "login",
                PageSpec::new("/login")
                    .child(
                        "form",
                        ui::form(Locator::css("form#login"))
                            .child("username", ui::text_field(Locator::name("user")))
                            .child("remember", ui::checkbox(Locator::id("remember")))
                            .child("submit", ui::button(Locator::css("button"))),
                    )
                    .child("help", ui::link(Locator::link_text("Help"))),
            )
            .build(driver.clone())
            .unwrap();
        (app, driver)
    }

    mod view_tests {
        use super::*;

        #[test]
        fn test_names_and_paths() {
            let (app, _) = login_app();
            let page = app.page("login").unwrap();
            let user = page.element("form.username").unwrap();
            assert_eq!(user.name(), "username");
            assert_eq!(user.path(), "login.form.username");
            assert_eq!(user.kind(), NodeKind::TextField);
            assert_eq!(user.locator(), Some(&Locator::name("user")));

            let form = page.element("form").unwrap();
            assert_eq!(form.child_names(), ["username", "remember", "submit"]);
            assert_eq!(form.child("username").unwrap(), user);
        }

        #[test]
        fn test_kind_mismatch() {
            let (app, _) = login_app();
            let page = app.page("login").unwrap();
            match page.button("form.username").unwrap_err() {
                PomError::KindMismatch {
                    path,
                    expected,
                    actual,
                } => {
                    assert_eq!(path, "login.form.username");
                    assert_eq!(expected, "button");
                    assert_eq!(actual, "text field");
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[test]
        fn test_unknown_child() {
            let (app, _) = login_app();
            let form = app.page("login").unwrap().form("form").unwrap();
            assert!(matches!(
                form.element("password"),
                Err(PomError::UnknownElement { .. })
            ));
        }

        #[test]
        fn test_with_timeout_only_changes_timeout() {
            let (app, _) = login_app();
            let user = app.page("login").unwrap().text_field("form.username").unwrap();
            let slow = user.with_timeout(9000);
            assert_eq!(slow.wait().timeout_ms, 9000);
            assert_eq!(slow.wait().poll_interval_ms, 10);
            assert_eq!(slow, user);
        }
    }

    mod interaction_tests {
        use super::*;

        #[test]
        fn test_fill_replaces_value() {
            let (app, driver) = login_app();
            let user = app.page("login").unwrap().text_field("form.username").unwrap();
            user.fill("alice").unwrap();
            user.fill("bob").unwrap();
            assert_eq!(user.value().unwrap(), "bob");
            assert_eq!(driver.value_of("user").as_deref(), Some("bob"));
        }

        #[test]
        fn test_interactions_reuse_cache() {
            let (app, driver) = login_app();
            let user = app.page("login").unwrap().text_field("form.username").unwrap();
            user.send_keys("a").unwrap();
            let finds = driver.find_calls();
            user.send_keys("b").unwrap();
            user.clear().unwrap();
            assert_eq!(driver.find_calls(), finds);
        }

        #[test]
        fn test_checkbox_check_is_idempotent() {
            let (app, driver) = login_app();
            let remember = app.page("login").unwrap().checkbox("form.remember").unwrap();
            assert!(!remember.is_checked().unwrap());
            remember.check().unwrap();
            remember.check().unwrap();
            assert!(remember.is_checked().unwrap());
            assert_eq!(driver.count_calls("click:"), 1);
            remember.uncheck().unwrap();
            assert!(!remember.is_checked().unwrap());
        }

        #[test]
        fn test_text_and_href() {
            let (app, _) = login_app();
            let page = app.page("login").unwrap();
            assert_eq!(page.button("form.submit").unwrap().text().unwrap(), "Sign in");
            assert_eq!(page.link("help").unwrap().href().unwrap().as_deref(), Some("/help"));
        }

        #[test]
        fn test_form_fill_and_submit() {
            let (app, driver) = login_app();
            let form = app.page("login").unwrap().form("form").unwrap();
            form.fill(&[("username", "carol")]).unwrap();
            form.submit().unwrap();
            assert_eq!(driver.value_of("user").as_deref(), Some("carol"));
            assert!(driver.was_called("submit:form#"));
        }

        #[test]
        fn test_right_click_and_scroll_to() {
            let (app, driver) = login_app();
            let submit = app.page("login").unwrap().button("form.submit").unwrap();
            submit.scroll_to().unwrap();
            submit.right_click().unwrap();
            assert!(driver.was_called("scroll_into_view:submit#"));
            assert!(driver.was_called("context_click:submit#"));
            assert_eq!(driver.count_calls("click:"), 0);
        }

        #[test]
        fn test_right_click_retries_stale_reference_once() {
            let (app, driver) = login_app();
            let submit = app.page("login").unwrap().button("form.submit").unwrap();
            submit.resolve().unwrap();

            driver.fail_next("context_click", DriverError::StaleElement);
            driver.reset_calls();
            submit.right_click().unwrap();

            assert_eq!(driver.count_calls("context_click:"), 2);
            assert_eq!(driver.find_calls_for(&Locator::css("button")), 1);
        }

        #[test]
        fn test_stale_before_action_retries_once() {
            let (app, driver) = login_app();
            let submit = app.page("login").unwrap().button("form.submit").unwrap();
            submit.resolve().unwrap();

            driver.fail_next("click", DriverError::StaleElement);
            driver.reset_calls();
            submit.click().unwrap();

            assert_eq!(driver.count_calls("click:"), 2);
            assert_eq!(driver.find_calls_for(&Locator::css("button")), 1);
        }

        #[test]
        fn test_second_staleness_surfaces() {
            let (app, driver) = login_app();
            let submit = app.page("login").unwrap().button("form.submit").unwrap();
            driver.fail_next("click", DriverError::StaleElement);
            driver.fail_next("click", DriverError::StaleElement);

            match submit.click().unwrap_err() {
                PomError::StaleReference { path } => assert_eq!(path, "login.form.submit"),
                other => panic!("unexpected error: {other}"),
            }
        }

        #[test]
        fn test_other_driver_errors_carry_path() {
            let (app, driver) = login_app();
            let submit = app.page("login").unwrap().button("form.submit").unwrap();
            driver.fail_next("click", DriverError::Protocol("intercepted".into()));

            match submit.click().unwrap_err() {
                PomError::Driver { path, source } => {
                    assert_eq!(path, "login.form.submit");
                    assert_eq!(source, DriverError::Protocol("intercepted".into()));
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[test]
        fn test_interaction_waits_for_visibility() {
            let (app, driver) = login_app();
            driver.hide("submit");
            driver.show_after("submit", Duration::from_millis(50));
            let submit = app.page("login").unwrap().button("form.submit").unwrap();
            submit.click().unwrap();
        }

        #[test]
        fn test_hidden_element_times_out() {
            let (app, driver) = login_app();
            driver.hide("submit");
            let submit = app.page("login").unwrap().button("form.submit").unwrap();
            assert!(submit.click().unwrap_err().is_timeout());
            assert!(!driver.was_called("click:"));
        }
    }

    mod presence_tests {
        use super::*;

        #[test]
        fn test_is_visible_does_not_wait() {
            let (app, driver) = login_app();
            driver.hide("submit");
            let submit = app.page("login").unwrap().button("form.submit").unwrap();
            assert!(!submit.is_visible().unwrap());
            assert!(submit.is_present().unwrap());
        }

        #[test]
        fn test_removed_element_is_absent() {
            let (app, driver) = login_app();
            let submit = app.page("login").unwrap().button("form.submit").unwrap();
            submit.resolve().unwrap();
            driver.remove("submit");
            assert!(!submit.is_present().unwrap());
            assert!(!submit.is_visible().unwrap());
            submit.await_gone().unwrap();
        }

        #[test]
        fn test_invalidate_forces_refind() {
            let (app, driver) = login_app();
            let submit = app.page("login").unwrap().button("form.submit").unwrap();
            submit.resolve().unwrap();
            submit.invalidate();
            driver.reset_calls();
            submit.resolve().unwrap();
            assert_eq!(driver.find_calls(), 1);
        }
    }
}
