//! Chromium driver over the Chrome DevTools Protocol.
//!
//! `chromiumoxide` is async; [`CdpDriver`] owns a private tokio runtime and
//! blocks on every call so it can implement the synchronous [`Driver`] trait.
//!
//! Element references live in a page-side registry (`window.__pom_refs`).
//! A navigation replaces the window and with it the registry, so every
//! reference issued for the previous document reports stale, as does any
//! reference whose element was detached.

use crate::driver::{Driver, DriverConfig, NativeRef, SearchRoot};
use crate::locator::{js_string, Locator};
use crate::result::{DriverError, DriverResult, PomError, PomResult};
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Registry bootstrap evaluated in front of every script.
///
/// `doc` is a random token minted once per document; ids are `<doc>-<n>`, so
/// a reference issued for an earlier document never names an element of the
/// current one.
const REGISTRY: &str = "const R = (window.__pom_refs = window.__pom_refs || { \
     doc: (globalThis.crypto && crypto.randomUUID) ? crypto.randomUUID() \
          : Math.random().toString(36).slice(2) + Date.now().toString(36), \
     next: 0, map: new Map() });";

/// Register every element of `found` and return their ids
const MINT_IDS: &str =
    "found.map(el => { const id = R.doc + '-' + (++R.next); R.map.set(id, el); return id; })";

/// Script resolving `query` after `guard` has bound the search scope
fn find_script(guard: &str, query: &str) -> String {
    format!(
        "(() => {{ {REGISTRY} {guard} const found = {query}; return {{ ok: {MINT_IDS} }}; }})()"
    )
}

/// Page-side reply envelope
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Reply<T> {
    Ok(T),
    Stale,
    Error(String),
}

impl<T> Reply<T> {
    fn into_result(self) -> DriverResult<T> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Stale => Err(DriverError::StaleElement),
            Self::Error(message) => Err(DriverError::Protocol(message)),
        }
    }
}

fn protocol(e: impl fmt::Display) -> DriverError {
    DriverError::Protocol(e.to_string())
}

/// Blocking Chromium driver
pub struct CdpDriver {
    browser: Option<CdpBrowser>,
    page: CdpPage,
    handler: tokio::task::JoinHandle<()>,
    navigation_timeout: Duration,
    // Dropped last: the page handle and handler task belong to it.
    runtime: tokio::runtime::Runtime,
}

impl CdpDriver {
    /// Launch Chromium and open a blank page
    ///
    /// # Errors
    ///
    /// Returns [`PomError::Launch`] if the runtime or browser cannot start
    pub fn launch(config: &DriverConfig) -> PomResult<Self> {
        let launch_err = |e: &dyn fmt::Display| PomError::Launch {
            message: e.to_string(),
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| launch_err(&e))?;

        let mut builder = CdpConfig::builder()
            .window_size(config.viewport_width, config.viewport_height)
            .request_timeout(config.navigation_timeout);
        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = config.executable_path {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder.build().map_err(|e| launch_err(&e))?;

        let (browser, mut events) = runtime
            .block_on(CdpBrowser::launch(cdp_config))
            .map_err(|e| launch_err(&e))?;

        let handler = runtime.spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = runtime
            .block_on(browser.new_page("about:blank"))
            .map_err(|e| launch_err(&e))?;

        info!(headless = config.headless, "chromium launched");
        Ok(Self {
            browser: Some(browser),
            page,
            handler,
            navigation_timeout: config.navigation_timeout,
            runtime,
        })
    }

    fn eval<T: DeserializeOwned>(&self, script: String) -> DriverResult<T> {
        self.runtime.block_on(async {
            self.page
                .evaluate(script)
                .await
                .map_err(protocol)?
                .into_value::<T>()
                .map_err(protocol)
        })
    }

    /// Run `body` with `el` bound to the registered element
    fn on_element<T: DeserializeOwned>(&self, element: &NativeRef, body: &str) -> DriverResult<T> {
        let script = format!(
            "(() => {{ {REGISTRY} const el = R.map.get({id}); \
             if (!el || !el.isConnected) return 'stale'; {body} }})()",
            id = js_string(element.id()),
        );
        self.eval::<Reply<T>>(script)?.into_result()
    }
}

impl Driver for CdpDriver {
    fn find_elements(&self, root: &SearchRoot, locator: &Locator) -> DriverResult<Vec<NativeRef>> {
        let (scope, guard) = match root {
            SearchRoot::Document => ("document".to_string(), String::new()),
            SearchRoot::Element(element) => (
                "scope".to_string(),
                format!(
                    "const scope = R.map.get({id}); if (!scope || !scope.isConnected) return 'stale';",
                    id = js_string(element.id())
                ),
            ),
        };
        let script = find_script(&guard, &locator.to_query(&scope));
        let ids = self.eval::<Reply<Vec<String>>>(script)?.into_result()?;
        debug!(%locator, count = ids.len(), "find_elements");
        Ok(ids.into_iter().map(NativeRef::new).collect())
    }

    fn is_visible(&self, element: &NativeRef) -> DriverResult<bool> {
        self.on_element(
            element,
            "const s = getComputedStyle(el); const r = el.getBoundingClientRect(); \
             return { ok: s.visibility !== 'hidden' && s.display !== 'none' && r.width > 0 && r.height > 0 };",
        )
    }

    fn is_present(&self, element: &NativeRef) -> bool {
        self.on_element::<bool>(element, "return { ok: true };")
            .unwrap_or(false)
    }

    fn navigate(&self, url: &str) -> DriverResult<()> {
        let timeout = self.navigation_timeout;
        self.runtime.block_on(async {
            match tokio::time::timeout(timeout, self.page.goto(url)).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(DriverError::Navigation(e.to_string())),
                Err(_) => Err(DriverError::Navigation(format!("timed out after {timeout:?}"))),
            }
        })
    }

    fn current_url(&self) -> DriverResult<String> {
        self.runtime.block_on(async {
            self.page
                .url()
                .await
                .map_err(protocol)
                .map(Option::unwrap_or_default)
        })
    }

    fn click(&self, element: &NativeRef) -> DriverResult<()> {
        self.on_element(
            element,
            "el.scrollIntoView({ block: 'center' }); el.click(); return { ok: null };",
        )
    }

    fn double_click(&self, element: &NativeRef) -> DriverResult<()> {
        self.on_element(
            element,
            "el.scrollIntoView({ block: 'center' }); \
             el.dispatchEvent(new MouseEvent('dblclick', { bubbles: true, cancelable: true })); \
             return { ok: null };",
        )
    }

    fn context_click(&self, element: &NativeRef) -> DriverResult<()> {
        self.on_element(
            element,
            "el.scrollIntoView({ block: 'center' }); \
             const r = el.getBoundingClientRect(); \
             const at = { bubbles: true, cancelable: true, button: 2, buttons: 2, \
                          clientX: r.left + r.width / 2, clientY: r.top + r.height / 2 }; \
             el.dispatchEvent(new MouseEvent('mousedown', at)); \
             el.dispatchEvent(new MouseEvent('mouseup', at)); \
             el.dispatchEvent(new MouseEvent('contextmenu', at)); \
             return { ok: null };",
        )
    }

    fn hover(&self, element: &NativeRef) -> DriverResult<()> {
        self.on_element(
            element,
            "el.scrollIntoView({ block: 'center' }); \
             for (const t of ['mouseover', 'mouseenter', 'mousemove']) \
               el.dispatchEvent(new MouseEvent(t, { bubbles: t !== 'mouseenter' })); \
             return { ok: null };",
        )
    }

    fn scroll_into_view(&self, element: &NativeRef) -> DriverResult<()> {
        self.on_element(
            element,
            "el.scrollIntoView({ block: 'start', inline: 'nearest' }); return { ok: null };",
        )
    }

    fn send_keys(&self, element: &NativeRef, text: &str) -> DriverResult<()> {
        let body = format!(
            "el.focus(); el.value = (el.value ?? '') + {text}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return {{ ok: null }};",
            text = js_string(text),
        );
        self.on_element(element, &body)
    }

    fn clear(&self, element: &NativeRef) -> DriverResult<()> {
        self.on_element(
            element,
            "el.focus(); el.value = ''; \
             el.dispatchEvent(new Event('input', { bubbles: true })); \
             el.dispatchEvent(new Event('change', { bubbles: true })); \
             return { ok: null };",
        )
    }

    fn submit(&self, element: &NativeRef) -> DriverResult<()> {
        self.on_element(
            element,
            "const f = el.form || el.closest('form'); \
             if (!f) return { error: 'element is not inside a form' }; \
             if (f.requestSubmit) f.requestSubmit(); else f.submit(); \
             return { ok: null };",
        )
    }

    fn text(&self, element: &NativeRef) -> DriverResult<String> {
        self.on_element(element, "return { ok: el.innerText ?? el.textContent ?? '' };")
    }

    fn attribute(&self, element: &NativeRef, name: &str) -> DriverResult<Option<String>> {
        let body = format!(
            "const n = {name}; \
             const v = n === 'value' && 'value' in el ? el.value : el.getAttribute(n); \
             return {{ ok: v == null ? null : String(v) }};",
            name = js_string(name),
        );
        self.on_element(element, &body)
    }

    fn is_enabled(&self, element: &NativeRef) -> DriverResult<bool> {
        self.on_element(element, "return { ok: !el.disabled };")
    }

    fn is_selected(&self, element: &NativeRef) -> DriverResult<bool> {
        self.on_element(element, "return { ok: !!(el.checked || el.selected) };")
    }

    fn quit(&mut self) -> DriverResult<()> {
        if let Some(mut browser) = self.browser.take() {
            self.runtime.block_on(async {
                browser.close().await.map_err(protocol)?;
                let _ = browser.wait().await;
                Ok::<(), DriverError>(())
            })?;
            self.handler.abort();
            info!("chromium closed");
        }
        Ok(())
    }
}

impl fmt::Debug for CdpDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdpDriver")
            .field("open", &self.browser.is_some())
            .field("navigation_timeout", &self.navigation_timeout)
            .finish()
    }
}

impl Drop for CdpDriver {
    fn drop(&mut self) {
        if self.browser.is_some() {
            let _ = self.quit();
        }
    }
}
