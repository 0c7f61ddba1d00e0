//! Scoped interaction on container elements.
//!
//! Entering a container waits for it to be visible and refreshes its cached
//! reference, so children resolved inside the scope search a live parent.
//! Leaving the scope performs no driver call.
//!
//! ```ignore
//! let form = page.form("login_form")?;
//! form.within(|f| {
//!     f.text_field("username")?.fill("alice")?;
//!     f.button("submit")?.click()
//! })?;
//! ```

use crate::node::{Block, Form, UiNode};
use crate::result::PomResult;
use crate::tree::ResolvedHandle;
use std::ops::Deref;
use tracing::debug;

/// Guard over an entered container; derefs to the container view
#[derive(Debug)]
pub struct Scoped<'a, T: Container<'a>> {
    view: T,
    handle: ResolvedHandle,
    _app: std::marker::PhantomData<&'a ()>,
}

impl<'a, T: Container<'a>> Scoped<'a, T> {
    /// Reference the container was entered with
    #[must_use]
    pub const fn handle(&self) -> &ResolvedHandle {
        &self.handle
    }
}

impl<'a, T: Container<'a>> Deref for Scoped<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.view
    }
}

impl<'a, T: Container<'a>> Drop for Scoped<'a, T> {
    fn drop(&mut self) {
        debug!(path = %self.view.path(), "left scope");
    }
}

/// Element kinds that may contain other declared elements
pub trait Container<'a>: Copy + Deref<Target = UiNode<'a>> + std::fmt::Debug {
    /// Wait for the container to be visible and open a scope on it
    ///
    /// # Errors
    ///
    /// `Timeout`, `Ambiguous`, or a driver failure
    fn enter(self) -> PomResult<Scoped<'a, Self>> {
        let handle = self.await_visible()?;
        debug!(path = %self.path(), native = %handle.native(), "entered scope");
        Ok(Scoped {
            view: self,
            handle,
            _app: std::marker::PhantomData,
        })
    }

    /// Run `f` inside a scope on this container and return its result
    ///
    /// # Errors
    ///
    /// Entering fails, or `f` fails (propagated unchanged)
    fn within<R, F>(self, f: F) -> PomResult<R>
    where
        F: FnOnce(&Scoped<'a, Self>) -> PomResult<R>,
    {
        let scope = self.enter()?;
        f(&scope)
    }
}

impl<'a> Container<'a> for Block<'a> {}

impl<'a> Container<'a> for Form<'a> {}
