//! Result and error types for pom.

use std::time::Duration;
use thiserror::Error;

/// Result type for pom operations
pub type PomResult<T> = Result<T, PomError>;

/// Result type for raw driver calls
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors reported by a [`Driver`](crate::Driver) implementation.
///
/// These carry no knowledge of the declared element tree; the engine wraps
/// them into [`PomError`] with the failing node's path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    /// The referenced element does not exist
    #[error("no such element")]
    NoSuchElement,

    /// The native reference no longer points at a live element
    #[error("stale element reference")]
    StaleElement,

    /// Navigation failed at the driver level
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Any other protocol or transport failure
    #[error("driver error: {0}")]
    Protocol(String),
}

/// Errors that can occur in pom
#[derive(Debug, Error)]
pub enum PomError {
    /// Locator matched zero elements where exactly one was required
    #[error("{path} ({locator}) not found")]
    NotFound {
        /// Declared path of the node
        path: String,
        /// Locator that failed
        locator: String,
    },

    /// Locator matched more than one element where exactly one was required
    #[error("{path} ({locator}) is ambiguous: {count} elements match")]
    Ambiguous {
        /// Declared path of the node
        path: String,
        /// Locator that failed
        locator: String,
        /// Number of matches
        count: usize,
    },

    /// Native reference went stale and the single recovery attempt failed too
    #[error("{path} went stale again after re-resolution")]
    StaleReference {
        /// Declared path of the node
        path: String,
    },

    /// Wait protocol exceeded its deadline
    #[error("{path} ({locator}) still not {condition} after {elapsed:?}")]
    Timeout {
        /// Declared path of the node
        path: String,
        /// Locator of the node
        locator: String,
        /// Condition waited for ("visible", "gone")
        condition: &'static str,
        /// Time spent waiting
        elapsed: Duration,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// No element declared under this path
    #[error("no element declared at {path}")]
    UnknownElement {
        /// Requested path
        path: String,
    },

    /// No page registered under this name
    #[error("no page registered as {name:?}")]
    UnknownPage {
        /// Requested page name
        name: String,
    },

    /// Element was requested through a typed view of a different kind
    #[error("{path} is a {actual}, not a {expected}")]
    KindMismatch {
        /// Declared path of the node
        path: String,
        /// Kind requested
        expected: &'static str,
        /// Kind declared
        actual: &'static str,
    },

    /// Driver failure while interacting with a node
    #[error("{path}: {source}")]
    Driver {
        /// Declared path of the node, or "<app>" for session-level calls
        path: String,
        /// Underlying driver error
        #[source]
        source: DriverError,
    },

    /// Configuration could not be loaded
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// Browser could not be started
    #[error("Failed to launch browser: {message}")]
    Launch {
        /// Error message
        message: String,
    },

    /// The driver session has already been closed
    #[error("driver session already closed")]
    SessionClosed,

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PomError {
    /// Wrap a driver error with the path of the node it happened on
    pub(crate) fn driver(path: impl Into<String>, source: DriverError) -> Self {
        Self::Driver {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the element is simply not there (yet)
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Staleness that survived the resolver's own restart
    pub(crate) const fn is_stale(&self) -> bool {
        matches!(
            self,
            Self::StaleReference { .. }
                | Self::Driver {
                    source: DriverError::StaleElement,
                    ..
                }
        )
    }

    /// Whether this error is a wait timeout
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_path_and_locator() {
        let err = PomError::NotFound {
            path: "login.form.username".into(),
            locator: "css=input[name=user]".into(),
        };
        assert_eq!(
            err.to_string(),
            "login.form.username (css=input[name=user]) not found"
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_timeout_message() {
        let err = PomError::Timeout {
            path: "home.banner".into(),
            locator: "id=banner".into(),
            condition: "visible",
            elapsed: Duration::from_millis(1000),
        };
        assert!(err.to_string().contains("still not visible after 1s"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_driver_error_keeps_source() {
        let err = PomError::driver("home.submit", DriverError::Protocol("boom".into()));
        assert_eq!(err.to_string(), "home.submit: driver error: boom");
        assert!(std::error::Error::source(&err).is_some());
    }
}
