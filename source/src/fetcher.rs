//! One page, many attempts.

use tally_types::Page;
use tracing::debug;

use crate::retry::{RetryDecision, RetryPolicy};
use crate::{CancelFlag, PageBody, PageError, PageSource};

/// Result of a fetch that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Page(PageBody),
    /// The cancellation flag was observed before the page was obtained.
    Cancelled,
}

/// Fetches a single page through a [`PageSource`], retrying per the
/// [`RetryPolicy`] and honouring the shared [`CancelFlag`].
#[derive(Debug)]
pub struct PageFetcher<S> {
    source: S,
    policy: RetryPolicy,
    cancel: CancelFlag,
}

impl<S: PageSource> PageFetcher<S> {
    pub fn new(source: S, policy: RetryPolicy, cancel: CancelFlag) -> Self {
        Self {
            source,
            policy,
            cancel,
        }
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[must_use]
    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub async fn fetch(&self, page: Page) -> Result<Fetched, PageError> {
        let mut attempt: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Fetched::Cancelled);
            }

            let outcome = self.source.fetch_page(page).await;
            match (self.policy.decide(&outcome, attempt), outcome) {
                (_, Ok(body)) => return Ok(Fetched::Page(body)),
                (RetryDecision::RetryAfter(delay), Err(error)) => {
                    debug!(
                        offset = page.offset(),
                        limit = page.limit(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "Retrying page"
                    );
                    if self.cancel.is_cancelled() || !self.cancel.sleep(delay).await {
                        return Ok(Fetched::Cancelled);
                    }
                    attempt += 1;
                }
                (_, Err(error)) => return Err(PageError::abandoned(page, attempt + 1, error)),
            }
        }
    }
}
