//! Paginated REST collection access for tally.
//!
//! - [`PageSource`] - one request for one page; [`HttpPageSource`] is the real one
//! - [`RetryPolicy`] - classifies attempt outcomes and computes backoff
//! - [`PageFetcher`] - drives attempts for a page until success, abandonment or cancellation
//! - [`CancelFlag`] - the run-wide stop signal

mod cancel;
mod error;
mod fetcher;
mod http;
mod retry;

use std::future::Future;

pub use cancel::CancelFlag;
pub use error::{AttemptError, PageError};
pub use fetcher::{Fetched, PageFetcher};
pub use http::{HttpPageSource, HttpSettings};
pub use retry::{RetryDecision, RetryPolicy, parse_retry_after};

use tally_types::{Item, Page};

/// Decoded content of one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageBody {
    pub items: Vec<Item>,
    /// Collection size, when the server reports it.
    pub total: Option<u64>,
}

/// A single attempt at fetching one page. Retries live in [`PageFetcher`].
pub trait PageSource: Send + Sync + 'static {
    fn fetch_page(&self, page: Page)
    -> impl Future<Output = Result<PageBody, AttemptError>> + Send;
}
