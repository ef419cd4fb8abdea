use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single `fetch_recent` call.
///
/// The variant decides how the scheduler reacts: rate limits trigger a
/// cooldown, transient errors count toward the failure ceiling, fatal errors
/// stop polling the source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("rate limited{}", fmt_retry_after(.retry_after))]
    RateLimited { retry_after: Option<Duration> },
    #[error("transient error: {0}")]
    Transient(String),
    #[error("fatal error: {0}")]
    Fatal(String),
}

fn fmt_retry_after(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

impl FetchError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn malformed(what: impl std::fmt::Display) -> Self {
        Self::Transient(format!("malformed response: {what}"))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> Self {
        let snippet = truncate(body, 200);
        match status.as_u16() {
            429 => Self::RateLimited { retry_after },
            400 | 401 | 403 | 404 | 410 => {
                Self::Fatal(format!("HTTP {status}: {snippet}"))
            }
            408 | 425 => Self::Transient(format!("HTTP {status}")),
            _ if status.is_server_error() => Self::Transient(format!("HTTP {status}")),
            _ => Self::Transient(format!("unexpected HTTP {status}: {snippet}")),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return Self::from_status(status, None, "");
        }
        if e.is_timeout() {
            Self::Transient(format!("request timed out: {e}"))
        } else if e.is_decode() {
            Self::malformed(e)
        } else {
            Self::Transient(format!("request failed: {e}"))
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        Self::malformed(e)
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    let trimmed = s.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let mut out: String = trimmed.chars().take(max_chars).collect();
        out.push('…');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            FetchError::from_status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(5)), ""),
            FetchError::RateLimited {
                retry_after: Some(Duration::from_secs(5))
            }
        );
        assert!(FetchError::from_status(StatusCode::NOT_FOUND, None, "").is_fatal());
        assert!(FetchError::from_status(StatusCode::UNAUTHORIZED, None, "").is_fatal());
        assert!(matches!(
            FetchError::from_status(StatusCode::BAD_GATEWAY, None, ""),
            FetchError::Transient(_)
        ));
    }

    #[test]
    fn test_display() {
        let e = FetchError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(e.to_string(), "rate limited (retry after 30s)");
        let e = FetchError::RateLimited { retry_after: None };
        assert_eq!(e.to_string(), "rate limited");
    }

    #[test]
    fn test_json_error_is_transient() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let fe: FetchError = err.into();
        assert!(matches!(fe, FetchError::Transient(msg) if msg.starts_with("malformed")));
    }
}
