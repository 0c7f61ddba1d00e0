//! Wait Mechanisms
//!
//! Explicit, cache-aware waits. There is no driver-wide implicit wait: every
//! interaction first polls the live visibility of its own element.
//!
//! Polling is a blocking sleep loop measured against a wall-clock deadline.
//! A probe is always taken before the deadline is checked, so a zero timeout
//! still performs exactly one check.

use crate::driver::Driver;
use crate::result::{DriverError, PomError, PomResult};
use crate::tree::{NodeId, NodeTree, ResolvedHandle};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait operations (5 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5_000;

/// Default polling interval (100ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// POLLING
// =============================================================================

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// Condition holds
    Ready(T),
    /// Not yet; poll again
    Pending,
}

/// Outcome of a whole poll loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled<T> {
    /// A probe reported ready
    Ready {
        /// Value produced by the probe
        value: T,
        /// Time spent waiting
        elapsed: Duration,
    },
    /// The deadline passed first
    TimedOut {
        /// Time spent waiting
        elapsed: Duration,
    },
}

/// Blocking poll loop with a wall-clock deadline
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitEngine {
    options: WaitOptions,
}

impl WaitEngine {
    /// Create a wait engine
    #[must_use]
    pub const fn new(options: WaitOptions) -> Self {
        Self { options }
    }

    /// Options in effect
    #[must_use]
    pub const fn options(&self) -> &WaitOptions {
        &self.options
    }

    /// Run `probe` until it reports ready, fails, or the deadline passes.
    ///
    /// Errors returned by the probe abort the loop immediately.
    pub fn poll<T, F>(&self, mut probe: F) -> PomResult<Polled<T>>
    where
        F: FnMut() -> PomResult<Probe<T>>,
    {
        let start = Instant::now();
        let timeout = self.options.timeout();
        let poll_interval = self.options.poll_interval();

        loop {
            if let Probe::Ready(value) = probe()? {
                return Ok(Polled::Ready {
                    value,
                    elapsed: start.elapsed(),
                });
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Ok(Polled::TimedOut { elapsed });
            }
            std::thread::sleep(poll_interval.min(timeout - elapsed));
        }
    }
}

// =============================================================================
// VISIBILITY PROTOCOL
// =============================================================================

impl NodeTree {
    /// Resolve `id` and poll its live visibility until it is visible.
    ///
    /// Not-found counts as "not yet visible"; a reference that goes stale
    /// mid-poll is dropped and re-resolved by the next probe.
    pub(crate) fn await_visible(
        &self,
        driver: &dyn Driver,
        id: NodeId,
        options: &WaitOptions,
    ) -> PomResult<ResolvedHandle> {
        let slot = self.slot(id);
        let outcome = WaitEngine::new(*options).poll(|| match self.resolve(driver, id) {
            Ok(handle) => match driver.is_visible(handle.native()) {
                Ok(true) => Ok(Probe::Ready(handle)),
                Ok(false) => Ok(Probe::Pending),
                Err(DriverError::StaleElement) => {
                    debug!(path = %slot.path, "went stale while waiting, dropping cache");
                    self.invalidate(id);
                    Ok(Probe::Pending)
                }
                Err(e) => Err(PomError::driver(slot.path.clone(), e)),
            },
            Err(e) if e.is_not_found() || e.is_stale() => Ok(Probe::Pending),
            Err(e) => Err(e),
        })?;

        match outcome {
            Polled::Ready { value, elapsed } => {
                debug!(path = %slot.path, ?elapsed, "visible");
                Ok(value)
            }
            Polled::TimedOut { elapsed } => Err(PomError::Timeout {
                path: slot.path.clone(),
                locator: slot.locator_label(),
                condition: "visible",
                elapsed,
            }),
        }
    }

    /// Poll until `id` is absent, detached, or hidden
    pub(crate) fn await_gone(
        &self,
        driver: &dyn Driver,
        id: NodeId,
        options: &WaitOptions,
    ) -> PomResult<()> {
        let slot = self.slot(id);
        let outcome = WaitEngine::new(*options).poll(|| match self.resolve(driver, id) {
            Ok(handle) => match driver.is_visible(handle.native()) {
                Ok(true) => Ok(Probe::Pending),
                Ok(false) => Ok(Probe::Ready(())),
                Err(DriverError::StaleElement) => {
                    self.invalidate(id);
                    Ok(Probe::Pending)
                }
                Err(e) => Err(PomError::driver(slot.path.clone(), e)),
            },
            Err(e) if e.is_not_found() || e.is_stale() => Ok(Probe::Ready(())),
            Err(e) => Err(e),
        })?;

        match outcome {
            Polled::Ready { elapsed, .. } => {
                debug!(path = %slot.path, ?elapsed, "gone");
                Ok(())
            }
            Polled::TimedOut { elapsed } => Err(PomError::Timeout {
                path: slot.path.clone(),
                locator: slot.locator_label(),
                condition: "gone",
                elapsed,
            }),
        }
    }
}

// =============================================================================
// CONVENIENCE FUNCTIONS
// =============================================================================

/// Wait for a predicate with the default poll interval
pub fn wait_until<F>(predicate: F, timeout_ms: u64) -> PomResult<bool>
where
    F: Fn() -> bool,
{
    let engine = WaitEngine::new(WaitOptions::new().with_timeout(timeout_ms));
    let outcome = engine.poll(|| Ok(if predicate() { Probe::Ready(()) } else { Probe::Pending }))?;
    Ok(matches!(outcome, Polled::Ready { .. }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use std::cell::Cell;

    mod wait_options_tests {
        use super::*;

        #[test]
        fn test_wait_options_default() {
            let opts = WaitOptions::default();
            assert_eq!(opts.timeout_ms, DEFAULT_WAIT_TIMEOUT_MS);
            assert_eq!(opts.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        }

        #[test]
        fn test_wait_options_builders() {
            let opts = WaitOptions::new().with_timeout(250).with_poll_interval(10);
            assert_eq!(opts.timeout(), Duration::from_millis(250));
            assert_eq!(opts.poll_interval(), Duration::from_millis(10));
        }
    }

    mod engine_tests {
        use super::*;

        #[test]
        fn test_immediate_success_does_not_sleep() {
            let engine = WaitEngine::new(WaitOptions::new().with_timeout(1000));
            let outcome = engine.poll(|| Ok(Probe::Ready(7))).unwrap();
            match outcome {
                Polled::Ready { value, elapsed } => {
                    assert_eq!(value, 7);
                    assert!(elapsed < Duration::from_millis(50));
                }
                Polled::TimedOut { .. } => panic!("should be ready"),
            }
        }

        #[test]
        fn test_becomes_ready_after_a_few_polls() {
            let calls = Cell::new(0);
            let engine = WaitEngine::new(WaitOptions::new().with_timeout(1000).with_poll_interval(5));
            let outcome = engine
                .poll(|| {
                    calls.set(calls.get() + 1);
                    Ok(if calls.get() >= 3 { Probe::Ready(()) } else { Probe::Pending })
                })
                .unwrap();
            assert!(matches!(outcome, Polled::Ready { .. }));
            assert_eq!(calls.get(), 3);
        }

        #[test]
        fn test_times_out_on_wall_clock() {
            let engine = WaitEngine::new(WaitOptions::new().with_timeout(100).with_poll_interval(20));
            let outcome: Polled<()> = engine.poll(|| Ok(Probe::Pending)).unwrap();
            match outcome {
                Polled::TimedOut { elapsed } => {
                    assert!(elapsed >= Duration::from_millis(100));
                    assert!(elapsed < Duration::from_millis(300));
                }
                Polled::Ready { .. } => panic!("should time out"),
            }
        }

        #[test]
        fn test_zero_timeout_probes_once() {
            let calls = Cell::new(0);
            let engine = WaitEngine::new(WaitOptions::new().with_timeout(0));
            let outcome: Polled<()> = engine
                .poll(|| {
                    calls.set(calls.get() + 1);
                    Ok(Probe::Pending)
                })
                .unwrap();
            assert!(matches!(outcome, Polled::TimedOut { .. }));
            assert_eq!(calls.get(), 1);
        }

        #[test]
        fn test_probe_error_aborts() {
            let engine = WaitEngine::new(WaitOptions::new().with_timeout(1000));
            let result: PomResult<Polled<()>> =
                engine.poll(|| Err(PomError::UnknownPage { name: "x".into() }));
            assert!(matches!(result, Err(PomError::UnknownPage { .. })));
        }

        #[test]
        fn test_wait_until() {
            assert!(wait_until(|| true, 100).unwrap());
            assert!(!wait_until(|| false, 50).unwrap());
        }
    }

    mod visibility_tests {
        use super::*;
        use crate::driver::{MockDriver, MockElement};
        use crate::locator::Locator;
        use crate::tree::ui;

        fn banner_tree() -> (NodeTree, NodeId) {
            let mut tree = NodeTree::new();
            let root = tree
                .add_root("home", &[("banner".to_string(), ui::element(Locator::id("banner")))])
                .unwrap();
            let banner = tree.lookup(root, "banner").unwrap();
            (tree, banner)
        }

        fn fast(timeout_ms: u64) -> WaitOptions {
            WaitOptions::new().with_timeout(timeout_ms).with_poll_interval(10)
        }

        #[test]
        fn test_waits_for_element_to_appear() {
            let (tree, banner) = banner_tree();
            let driver = MockDriver::new();
            driver.add(MockElement::new("banner", Locator::id("banner")).visible_after(Duration::from_millis(60)));

            let start = Instant::now();
            tree.await_visible(&driver, banner, &fast(1000)).unwrap();
            assert!(start.elapsed() >= Duration::from_millis(60));
        }

        #[test]
        fn test_missing_element_times_out_with_context() {
            let (tree, banner) = banner_tree();
            let driver = MockDriver::new();

            match tree.await_visible(&driver, banner, &fast(50)).unwrap_err() {
                PomError::Timeout {
                    path,
                    locator,
                    condition,
                    elapsed,
                } => {
                    assert_eq!(path, "home.banner");
                    assert_eq!(locator, "id=banner");
                    assert_eq!(condition, "visible");
                    assert!(elapsed >= Duration::from_millis(50));
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[test]
        fn test_stale_mid_poll_is_re_resolved() {
            let (tree, banner) = banner_tree();
            let driver = MockDriver::new();
            driver.add(MockElement::new("banner", Locator::id("banner")));
            tree.resolve(&driver, banner).unwrap();

            driver.fail_next("is_visible", DriverError::StaleElement);
            driver.reset_calls();
            tree.await_visible(&driver, banner, &fast(500)).unwrap();
            assert_eq!(driver.find_calls(), 1);
        }

        #[test]
        fn test_await_gone_on_removal() {
            let (tree, banner) = banner_tree();
            let driver = MockDriver::new();
            driver.add(MockElement::new("banner", Locator::id("banner")));
            tree.await_visible(&driver, banner, &fast(100)).unwrap();

            driver.remove("banner");
            tree.await_gone(&driver, banner, &fast(100)).unwrap();
        }

        #[test]
        fn test_await_gone_times_out_while_visible() {
            let (tree, banner) = banner_tree();
            let driver = MockDriver::new();
            driver.add(MockElement::new("banner", Locator::id("banner")));

            let err = tree.await_gone(&driver, banner, &fast(40)).unwrap_err();
            assert!(err.to_string().contains("still not gone"));
        }

        #[test]
        fn test_ambiguity_aborts_wait() {
            let (tree, banner) = banner_tree();
            let driver = MockDriver::new();
            driver
                .add(MockElement::new("a", Locator::id("banner")))
                .add(MockElement::new("b", Locator::id("banner")));

            let start = Instant::now();
            let err = tree.await_visible(&driver, banner, &fast(2000)).unwrap_err();
            assert!(matches!(err, PomError::Ambiguous { count: 2, .. }));
            assert!(start.elapsed() < Duration::from_millis(500));
        }
    }
}
