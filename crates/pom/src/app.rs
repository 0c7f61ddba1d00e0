//! The application under test: one driver session plus its declared pages.
//!
//! ```ignore
//! let app = App::builder("http://localhost:8080")
//!     .page("login", PageSpec::new("/login").child("form", login_form()))
//!     .page("home", PageSpec::new("/home"))
//!     .build(MockDriver::new())?;
//!
//! let login = app.page("login")?.open()?;
//! login.text_field("form.username")?.fill("alice")?;
//! assert_eq!(app.current_page()?, Some(login));
//! ```

use crate::config::AppConfig;
use crate::driver::Driver;
use crate::page::{Page, PageIdentity, PageSlot, PageSpec};
use crate::result::{PomError, PomResult};
use crate::tree::NodeTree;
use crate::wait::WaitOptions;
use std::fmt;
use tracing::{debug, info, info_span, warn, Span};
use uuid::Uuid;

/// Path used in errors raised by session-level driver calls
const SESSION_PATH: &str = "<app>";

/// Builder for [`App`]
#[derive(Debug, Clone)]
pub struct AppBuilder {
    base_url: String,
    config: AppConfig,
    pages: Vec<(String, PageSpec)>,
}

impl AppBuilder {
    /// Replace the whole config
    #[must_use]
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Default wait options for every element of the app
    #[must_use]
    pub fn wait_options(mut self, options: WaitOptions) -> Self {
        self.config.timeout_ms = options.timeout_ms;
        self.config.poll_interval_ms = options.poll_interval_ms;
        self
    }

    /// Register a page. Registration order decides ties in
    /// [`App::current_page`].
    #[must_use]
    pub fn page(mut self, name: impl Into<String>, spec: PageSpec) -> Self {
        self.pages.push((name.into(), spec));
        self
    }

    /// Build the app on top of an existing driver session
    ///
    /// # Errors
    ///
    /// Returns [`PomError::InvalidConfig`] for a relative base URL, duplicate
    /// or malformed page names, invalid element declarations, markers that
    /// name undeclared elements, or an invalid config
    pub fn build(self, driver: impl Driver + 'static) -> PomResult<App> {
        self.config.validate()?;
        let base = url::Url::parse(&self.base_url).map_err(|e| PomError::InvalidConfig {
            message: format!("base URL {:?}: {e}", self.base_url),
        })?;
        if base.cannot_be_a_base() {
            return Err(PomError::InvalidConfig {
                message: format!("base URL {:?} cannot be a base", self.base_url),
            });
        }

        let mut tree = NodeTree::new();
        let mut pages: Vec<PageSlot> = Vec::with_capacity(self.pages.len());
        for (name, spec) in &self.pages {
            if name.is_empty() || name.contains('.') {
                return Err(PomError::InvalidConfig {
                    message: format!("invalid page name {name:?}"),
                });
            }
            if pages.iter().any(|p| p.name == *name) {
                return Err(PomError::InvalidConfig {
                    message: format!("page {name:?} registered twice"),
                });
            }
            let root = tree.add_root(name, spec.children())?;
            if let PageIdentity::Marker(path) = spec.identity() {
                let _ = tree.lookup(root, path).map_err(|e| PomError::InvalidConfig {
                    message: format!("identity marker of page {name:?}: {e}"),
                })?;
            }
            pages.push(PageSlot::new(name.clone(), spec, &self.base_url, root));
        }

        let session_id = Uuid::new_v4();
        let span = info_span!("pom_session", session = %session_id);
        info!(parent: &span, base_url = %self.base_url, pages = pages.len(), "session started");

        Ok(App {
            base_url: self.base_url,
            driver: Box::new(driver),
            tree,
            pages,
            config: self.config,
            session_id,
            span,
            closed: false,
        })
    }

    /// Launch Chromium and build the app on it
    ///
    /// # Errors
    ///
    /// Browser launch failure, or any [`build`](Self::build) error
    #[cfg(feature = "browser")]
    pub fn launch(self, config: &crate::driver::DriverConfig) -> PomResult<App> {
        let driver = crate::cdp::CdpDriver::launch(config)?;
        self.build(driver)
    }
}

/// One driver session and the declared pages of the application under test.
///
/// All element access goes through shared references: caches use interior
/// mutability, so page and element views can be held side by side.
pub struct App {
    base_url: String,
    driver: Box<dyn Driver>,
    tree: NodeTree,
    pages: Vec<PageSlot>,
    config: AppConfig,
    session_id: Uuid,
    span: Span,
    closed: bool,
}

impl App {
    /// Start declaring an app served from `base_url`
    #[must_use]
    pub fn builder(base_url: impl Into<String>) -> AppBuilder {
        AppBuilder {
            base_url: base_url.into(),
            config: AppConfig::default(),
            pages: Vec::new(),
        }
    }

    /// Base URL pages are resolved against
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Unique id of this session, attached to every log event
    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Config in effect
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Default wait options for elements of this app
    #[must_use]
    pub const fn wait_options(&self) -> WaitOptions {
        self.config.wait_options()
    }

    /// Whether [`quit`](Self::quit) has been called
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) const fn tree(&self) -> &NodeTree {
        &self.tree
    }

    pub(crate) fn driver(&self) -> PomResult<&dyn Driver> {
        if self.closed {
            return Err(PomError::SessionClosed);
        }
        Ok(self.driver.as_ref())
    }

    pub(crate) fn page_slot(&self, index: usize) -> &PageSlot {
        &self.pages[index]
    }

    /// Registered page by name
    ///
    /// # Errors
    ///
    /// Returns [`PomError::UnknownPage`] if no page has that name
    pub fn page(&self, name: &str) -> PomResult<Page<'_>> {
        self.pages
            .iter()
            .position(|p| p.name == name)
            .map(|index| Page::new(self, index))
            .ok_or_else(|| PomError::UnknownPage {
                name: name.to_string(),
            })
    }

    /// All registered pages, in registration order
    #[must_use]
    pub fn pages(&self) -> Vec<Page<'_>> {
        (0..self.pages.len()).map(|index| Page::new(self, index)).collect()
    }

    /// Navigate to `page`. Every cached reference of the app is invalidated,
    /// whether or not navigation succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`PomError::Navigation`] if the driver fails to navigate
    pub fn open(&self, page: Page<'_>) -> PomResult<()> {
        if !page.belongs_to(self) {
            return Err(PomError::UnknownPage {
                name: page.name().to_string(),
            });
        }
        let _enter = self.span.enter();
        let slot = self.page_slot(page.index());
        let result = self.driver()?.navigate(&slot.full_url);
        self.tree.bump_root();
        match result {
            Ok(()) => {
                info!(page = %slot.name, url = %slot.full_url, "opened page");
                Ok(())
            }
            Err(e) => {
                warn!(page = %slot.name, url = %slot.full_url, error = %e, "navigation failed");
                Err(PomError::Navigation {
                    url: slot.full_url.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Invalidate every cached reference without navigating
    pub fn refresh(&self) {
        let _enter = self.span.enter();
        self.tree.bump_root();
        debug!(generation = self.tree.root_generation(), "caches invalidated");
    }

    /// URL the browser is showing
    ///
    /// # Errors
    ///
    /// Driver failure or closed session
    pub fn current_url(&self) -> PomResult<String> {
        self.driver()?
            .current_url()
            .map_err(|e| PomError::driver(SESSION_PATH, e))
    }

    pub(crate) fn is_showing(&self, index: usize) -> PomResult<bool> {
        let current = self.current_url()?;
        self.identity_holds(index, &current)
    }

    fn identity_holds(&self, index: usize, current: &str) -> PomResult<bool> {
        let slot = self.page_slot(index);
        match &slot.identity {
            PageIdentity::UrlPath => Ok(slot.capture(current).is_some()),
            PageIdentity::UrlRegex(re) => Ok(re.is_match(current)),
            PageIdentity::Marker(path) => {
                let id = self.tree.lookup(slot.root, path)?;
                match self.tree.resolve(self.driver()?, id) {
                    Ok(_) | Err(PomError::Ambiguous { .. }) => Ok(true),
                    Err(e) if e.is_not_found() || e.is_stale() => Ok(false),
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Every registered page whose identity matches the live browser state,
    /// in registration order
    ///
    /// # Errors
    ///
    /// Driver failure or closed session
    pub fn matching_pages(&self) -> PomResult<Vec<Page<'_>>> {
        let current = self.current_url()?;
        let mut matching = Vec::new();
        for index in 0..self.pages.len() {
            if self.identity_holds(index, &current)? {
                matching.push(Page::new(self, index));
            }
        }
        Ok(matching)
    }

    /// The page the browser is showing, recomputed on every call.
    ///
    /// When several pages match, the first registered one wins and a warning
    /// naming all candidates is logged.
    ///
    /// # Errors
    ///
    /// Driver failure or closed session
    pub fn current_page(&self) -> PomResult<Option<Page<'_>>> {
        let _enter = self.span.enter();
        let matching = self.matching_pages()?;
        if matching.len() > 1 {
            let names: Vec<&str> = matching.iter().map(Page::name).collect();
            warn!(candidates = ?names, chosen = names[0], "several pages match the current state");
        }
        Ok(matching.into_iter().next())
    }

    /// Close the driver session. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Driver failure while closing
    pub fn quit(&mut self) -> PomResult<()> {
        if self.closed {
            return Ok(());
        }
        let _enter = self.span.enter();
        self.closed = true;
        self.tree.bump_root();
        self.driver
            .quit()
            .map_err(|e| PomError::driver(SESSION_PATH, e))?;
        info!("session closed");
        Ok(())
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("base_url", &self.base_url)
            .field("session_id", &self.session_id)
            .field("pages", &self.pages.iter().map(|p| p.name.as_str()).collect::<Vec<_>>())
            .field("config", &self.config)
            .field("closed", &self.closed)
            .finish()
    }
}
