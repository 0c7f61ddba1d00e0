//! pom: lazy page objects for browser UI tests
//!
//! Pages and their elements are declared once, as a tree of named
//! [`Locator`]s. Nothing touches the browser until an element is used; then
//! the element is found inside its parent's live element, cached, and reused
//! for as long as no ancestor has been re-found and no navigation happened.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        pom Architecture                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐             │
//! │   │ App        │    │ NodeTree   │    │ Driver     │             │
//! │   │ pages,     │───►│ cache +    │───►│ Mock /     │             │
//! │   │ navigation │    │ waits      │    │ Chromium   │             │
//! │   └────────────┘    └────────────┘    └────────────┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use pom::prelude::*;
//!
//! let driver = MockDriver::new();
//! driver
//!     .add(MockElement::new("form", Locator::css("form#login")))
//!     .add(MockElement::new("user", Locator::name("user")).inside("form"))
//!     .add(MockElement::new("go", Locator::css("button")).inside("form"));
//!
//! let app = App::builder("http://localhost:8080")
//!     .page(
//!         "login",
//!         PageSpec::new("/login").child(
//!             "form",
//!             ui::form(Locator::css("form#login"))
//!                 .child("username", ui::text_field(Locator::name("user")))
//!                 .child("submit", ui::button(Locator::css("button"))),
//!         ),
//!     )
//!     .build(driver.clone())?;
//!
//! let login = app.page("login")?.open()?;
//! login.form("form")?.within(|form| {
//!     form.text_field("username")?.fill("alice")?;
//!     form.button("submit")?.click()
//! })?;
//!
//! assert_eq!(driver.value_of("user").as_deref(), Some("alice"));
//! assert_eq!(app.current_page()?, Some(login));
//! # Ok::<(), pom::PomError>(())
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod app;
#[cfg(feature = "browser")]
mod cdp;
mod config;
#[allow(clippy::missing_panics_doc)]
mod driver;
mod locator;
pub mod logging;
mod node;
mod page;
mod result;
mod scope;
mod tree;
mod wait;

pub use app::{App, AppBuilder};
#[cfg(feature = "browser")]
pub use cdp::CdpDriver;
pub use config::{AppConfig, ENV_POLL_INTERVAL_MS, ENV_TIMEOUT_MS};
pub use driver::{Driver, DriverConfig, MockDriver, MockElement, NativeRef, SearchRoot};
pub use locator::{Locator, Strategy};
pub use node::{Block, Button, CheckBox, Form, Link, TextField, UiNode};
pub use page::{join_url, Page, PageIdentity, PageSpec, UrlMatcher};
pub use result::{DriverError, DriverResult, PomError, PomResult};
pub use scope::{Container, Scoped};
pub use tree::{ui, NodeId, NodeKind, ResolvedHandle, UiSpec};
pub use wait::{
    wait_until, Polled, Probe, WaitEngine, WaitOptions, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_WAIT_TIMEOUT_MS,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::app::*;
    #[cfg(feature = "browser")]
    pub use super::cdp::*;
    pub use super::config::*;
    pub use super::driver::*;
    pub use super::locator::*;
    pub use super::node::*;
    pub use super::page::*;
    pub use super::result::*;
    pub use super::scope::*;
    pub use super::tree::{ui, NodeId, NodeKind, ResolvedHandle, UiSpec};
    pub use super::wait::*;
}
