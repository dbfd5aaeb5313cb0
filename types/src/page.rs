//! Pages: bounded `(offset, limit)` slices of the remote collection.

use std::fmt;
use std::num::NonZeroU32;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// A request descriptor for one slice of the collection.
///
/// `limit` is non-zero by construction, so an empty page is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Page {
    offset: u64,
    limit: NonZeroU32,
}

impl Page {
    #[must_use]
    pub const fn new(offset: u64, limit: NonZeroU32) -> Self {
        Self { offset, limit }
    }

    #[must_use]
    pub const fn offset(self) -> u64 {
        self.offset
    }

    #[must_use]
    pub const fn limit(self) -> u32 {
        self.limit.get()
    }

    /// Exclusive end offset of this page.
    #[must_use]
    pub const fn end(self) -> u64 {
        self.offset.saturating_add(self.limit.get() as u64)
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}

/// Splits `range` into contiguous, disjoint pages of at most `limit` items.
///
/// The last page is truncated to the remaining count. An empty range yields
/// no pages.
#[must_use]
pub fn partition(range: Range<u64>, limit: NonZeroU32) -> Partition {
    Partition {
        next: range.start,
        end: range.end,
        limit,
    }
}

/// Iterator returned by [`partition`].
#[derive(Debug, Clone)]
pub struct Partition {
    next: u64,
    end: u64,
    limit: NonZeroU32,
}

impl Iterator for Partition {
    type Item = Page;

    fn next(&mut self) -> Option<Page> {
        if self.next >= self.end {
            return None;
        }
        let remaining = self.end - self.next;
        let take = remaining.min(u64::from(self.limit.get())) as u32;
        // `take` is at least 1 because `remaining > 0` and `limit > 0`.
        let limit = NonZeroU32::new(take)?;
        let page = Page::new(self.next, limit);
        self.next += u64::from(take);
        Some(page)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.next);
        let per_page = u64::from(self.limit.get());
        let pages = remaining.div_ceil(per_page) as usize;
        (pages, Some(pages))
    }
}

impl ExactSizeIterator for Partition {}
