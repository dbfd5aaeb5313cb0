use std::time::Duration;

use tally_types::Page;
use thiserror::Error;

/// Failure of a single request attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP {status}")]
    Status {
        status: u16,
        /// Server-provided `Retry-After`, if any.
        retry_after: Option<Duration>,
    },
    #[error("malformed response body: {0}")]
    MalformedBody(String),
    #[error("invalid request: {0}")]
    Request(String),
}

impl AttemptError {
    /// Transport failures and server/overload statuses are worth repeating;
    /// everything else will fail the same way again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Status { status, .. } => matches!(status, 408 | 429 | 500..=599),
            Self::MalformedBody(_) | Self::Request(_) => false,
        }
    }

    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub(crate) fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::MalformedBody(error.to_string())
        } else if error.is_builder() || error.is_redirect() {
            Self::Request(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// A page that could not be fetched. The page is skipped; the run goes on.
#[derive(Debug, Clone, Error)]
pub enum PageError {
    #[error("page {page} abandoned after {attempts} attempts: {last}")]
    Exhausted {
        page: Page,
        attempts: u32,
        #[source]
        last: AttemptError,
    },
    #[error("page {page} rejected: {source}")]
    Rejected {
        page: Page,
        #[source]
        source: AttemptError,
    },
}

impl PageError {
    pub(crate) fn abandoned(page: Page, attempts: u32, error: AttemptError) -> Self {
        if error.is_retryable() {
            Self::Exhausted {
                page,
                attempts,
                last: error,
            }
        } else {
            Self::Rejected {
                page,
                source: error,
            }
        }
    }

    #[must_use]
    pub fn page(&self) -> Page {
        match self {
            Self::Exhausted { page, .. } | Self::Rejected { page, .. } => *page,
        }
    }
}
