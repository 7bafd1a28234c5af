use std::fmt;
use std::time::Duration;

use crate::PassKind;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors a store adapter may return.
///
/// "Nothing matched" is not an error: lookups return
/// [`Lookup::NotFound`](crate::Lookup::NotFound) for an empty result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Network or transport failure before a response was received.
    Transport(String),
    /// The remote asked us to slow down.
    RateLimited { retry_after: Option<Duration> },
    /// The remote answered with a 5xx status.
    Unavailable { status: u16 },
    /// The remote answered with a non-success status that is not retryable.
    Api { status: u16, message: String },
    /// A response payload could not be decoded into the typed model.
    Decode(String),
}

impl StoreError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, retry_after: Option<Duration>, message: impl Into<String>) -> Self {
        match status {
            429 => StoreError::RateLimited { retry_after },
            500..=599 => StoreError::Unavailable { status },
            _ => StoreError::Api {
                status,
                message: message.into(),
            },
        }
    }

    /// Transient errors go away on their own; the scheduler owns the retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Transport(_) | StoreError::RateLimited { .. } | StoreError::Unavailable { .. }
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, StoreError::RateLimited { .. })
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::RateLimited { .. } => Some(429),
            StoreError::Unavailable { status } | StoreError::Api { status, .. } => Some(*status),
            StoreError::Transport(_) | StoreError::Decode(_) => None,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Transport(msg) => write!(f, "transport error: {msg}"),
            StoreError::RateLimited {
                retry_after: Some(d),
            } => write!(f, "rate limited: retry after {}s", d.as_secs()),
            StoreError::RateLimited { retry_after: None } => write!(f, "rate limited"),
            StoreError::Unavailable { status } => write!(f, "remote unavailable (status={status})"),
            StoreError::Api { status, message } => {
                write!(f, "remote api error status={status}: {message}")
            }
            StoreError::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// SyncError
// ---------------------------------------------------------------------------

/// Errors that escape an engine pass and reach the scheduler.
///
/// Everything else (failed joins, failed writes) is isolated per item and
/// only shows up in the [`PassSummary`](crate::PassSummary) counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A listing call the whole pass depends on failed.
    Enumeration { pass: PassKind, source: StoreError },
    /// A per-item call was rate limited; continuing would only hit the limit again.
    RateLimited {
        pass: PassKind,
        retry_after: Option<Duration>,
    },
}

impl SyncError {
    pub fn pass(&self) -> PassKind {
        match self {
            SyncError::Enumeration { pass, .. } | SyncError::RateLimited { pass, .. } => *pass,
        }
    }

    /// Delay the remote asked for, if it told us.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::RateLimited { retry_after, .. } => *retry_after,
            SyncError::Enumeration {
                source: StoreError::RateLimited { retry_after },
                ..
            } => *retry_after,
            SyncError::Enumeration { .. } => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        match self {
            SyncError::RateLimited { .. } => true,
            SyncError::Enumeration { source, .. } => source.is_rate_limited(),
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Enumeration { pass, source } => {
                write!(f, "{pass} pass could not enumerate items: {source}")
            }
            SyncError::RateLimited {
                pass,
                retry_after: Some(d),
            } => write!(f, "{pass} pass rate limited: retry after {}s", d.as_secs()),
            SyncError::RateLimited {
                pass,
                retry_after: None,
            } => write!(f, "{pass} pass rate limited"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Enumeration { source, .. } => Some(source),
            SyncError::RateLimited { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(StoreError::Transport("reset".into()).is_transient());
        assert!(StoreError::Unavailable { status: 503 }.is_transient());
        assert!(StoreError::RateLimited { retry_after: None }.is_transient());
        assert!(!StoreError::Api {
            status: 404,
            message: "gone".into()
        }
        .is_transient());
        assert!(!StoreError::Decode("bad json".into()).is_transient());
    }

    #[test]
    fn enumeration_rate_limit_exposes_retry_after() {
        let err = SyncError::Enumeration {
            pass: PassKind::Reports,
            source: StoreError::RateLimited {
                retry_after: Some(Duration::from_secs(120)),
            },
        };
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(120)));
        assert_eq!(
            err.to_string(),
            "reports pass could not enumerate items: rate limited: retry after 120s"
        );
    }

    #[test]
    fn status_classification() {
        assert_eq!(
            StoreError::from_status(429, Some(Duration::from_secs(5)), ""),
            StoreError::RateLimited {
                retry_after: Some(Duration::from_secs(5))
            }
        );
        assert_eq!(
            StoreError::from_status(502, None, "bad gateway"),
            StoreError::Unavailable { status: 502 }
        );
        assert_eq!(
            StoreError::from_status(404, None, "not found"),
            StoreError::Api {
                status: 404,
                message: "not found".into()
            }
        );
    }

    #[test]
    fn api_error_display() {
        let err = StoreError::Api {
            status: 400,
            message: "bad filter".into(),
        };
        assert_eq!(err.to_string(), "remote api error status=400: bad filter");
        assert_eq!(err.status(), Some(400));
    }
}
