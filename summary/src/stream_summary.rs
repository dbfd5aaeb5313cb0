//! Space-Saving top-k counter over a Stream-Summary layout.
//!
//! Tracks at most `capacity` distinct keys. Each tracked key carries an
//! estimated `count` and an `error` bound such that
//! `count - error <= true_count <= count`.
//!
//! ## Layout
//!
//! ```text
//!   index: HashMap<K, slot>        entries: Vec<Entry<K>> (slot-addressed)
//!
//!   buckets: HashMap<count, Bucket>, linked in ascending count order
//!
//!   head                                                      tail
//!    │                                                          │
//!    ▼                                                          ▼
//!   count=1 ◄──► count=2 ◄──► count=5 ◄──► ... ◄──► count=max
//!   {(err,slot)} {(err,slot)}  {(err,slot)}
//! ```
//!
//! Members of a bucket are ordered by `(error, slot)`, so eviction takes the
//! first member of the head bucket and `top` walks from the tail.
//!
//! ## Operations
//!
//! | Operation   | Cost                                         |
//! |-------------|----------------------------------------------|
//! | `increment` | O(1) bucket moves, O(log b) within a bucket  |
//! | `top(k)`    | O(k) after locating the tail                 |
//! | `get`       | O(1)                                         |

use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::num::NonZeroUsize;

use serde::Serialize;

use crate::SummaryError;

#[derive(Debug)]
struct Entry<K> {
    key: K,
    count: u64,
    error: u64,
}

#[derive(Debug, Default)]
struct Bucket {
    members: BTreeSet<(u64, usize)>,
    prev: Option<u64>,
    next: Option<u64>,
}

/// One ranked key with its estimated count and error bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopEntry<K> {
    pub key: K,
    pub count: u64,
    pub error: u64,
}

impl<K> TopEntry<K> {
    /// Lower bound on the true count.
    #[must_use]
    pub fn guaranteed(&self) -> u64 {
        self.count - self.error
    }
}

/// Bounded-memory approximate frequency counter.
#[derive(Debug)]
pub struct StreamSummary<K> {
    capacity: NonZeroUsize,
    entries: Vec<Entry<K>>,
    index: HashMap<K, usize>,
    buckets: HashMap<u64, Bucket>,
    head: Option<u64>,
    tail: Option<u64>,
    total: u64,
}

impl<K> StreamSummary<K>
where
    K: Eq + Hash + Clone,
{
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity.get()),
            index: HashMap::with_capacity(capacity.get()),
            buckets: HashMap::new(),
            head: None,
            tail: None,
            total: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Result<Self, SummaryError> {
        NonZeroUsize::new(capacity)
            .map(Self::new)
            .ok_or(SummaryError::ZeroCapacity)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Number of distinct keys currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of increments observed, tracked or not.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Smallest estimated count among tracked keys.
    #[must_use]
    pub fn min_count(&self) -> Option<u64> {
        self.head
    }

    /// Returns `(count, error)` for a tracked key.
    pub fn get<Q>(&self, key: &Q) -> Option<(u64, u64)>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let slot = *self.index.get(key)?;
        let entry = self.entries.get(slot)?;
        Some((entry.count, entry.error))
    }

    /// Records one occurrence of `key` and returns its new estimated count.
    pub fn increment(&mut self, key: K) -> u64 {
        self.total += 1;

        if let Some(&slot) = self.index.get(&key) {
            let count = self.entries[slot].count;
            let below = self.detach(slot);
            self.entries[slot].count = count + 1;
            self.attach(slot, below);
            return count + 1;
        }

        if self.entries.len() < self.capacity.get() {
            let slot = self.entries.len();
            self.entries.push(Entry {
                key: key.clone(),
                count: 1,
                error: 0,
            });
            self.index.insert(key, slot);
            self.attach(slot, None);
            return 1;
        }

        self.replace_min(key)
    }

    /// Up to `k` keys by descending count; ties go to the smaller error.
    #[must_use]
    pub fn top(&self, k: usize) -> Vec<TopEntry<K>> {
        let mut out = Vec::with_capacity(k.min(self.entries.len()));
        let mut cursor = self.tail;
        while let Some(count) = cursor {
            let Some(bucket) = self.buckets.get(&count) else {
                break;
            };
            for &(_, slot) in &bucket.members {
                if out.len() == k {
                    return out;
                }
                let entry = &self.entries[slot];
                out.push(TopEntry {
                    key: entry.key.clone(),
                    count: entry.count,
                    error: entry.error,
                });
            }
            cursor = bucket.prev;
        }
        out
    }

    /// All tracked keys, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, u64, u64)> {
        self.entries.iter().map(|e| (&e.key, e.count, e.error))
    }

    /// Evicts the head bucket's member with the smallest error and reuses its
    /// slot for `key` at `min + 1` with error `min`.
    fn replace_min(&mut self, key: K) -> u64 {
        let Some(min) = self.head else {
            return 0;
        };
        let Some(&(_, slot)) = self
            .buckets
            .get(&min)
            .and_then(|bucket| bucket.members.first())
        else {
            return 0;
        };

        let below = self.detach(slot);
        let evicted = std::mem::replace(
            &mut self.entries[slot],
            Entry {
                key: key.clone(),
                count: min + 1,
                error: min,
            },
        );
        self.index.remove(&evicted.key);
        self.index.insert(key, slot);
        self.attach(slot, below);

        tracing::trace!(evicted_count = min, "stream summary eviction");
        min + 1
    }

    /// Removes `slot` from its bucket, dropping the bucket if it empties.
    ///
    /// Returns the bucket that now sits immediately below the slot's old
    /// count: the old bucket itself if it survived, else its predecessor.
    fn detach(&mut self, slot: usize) -> Option<u64> {
        let (count, error) = (self.entries[slot].count, self.entries[slot].error);
        let Some(bucket) = self.buckets.get_mut(&count) else {
            return None;
        };
        bucket.members.remove(&(error, slot));
        if !bucket.members.is_empty() {
            return Some(count);
        }

        let (prev, next) = (bucket.prev, bucket.next);
        self.buckets.remove(&count);
        match prev {
            Some(p) => {
                if let Some(b) = self.buckets.get_mut(&p) {
                    b.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(b) = self.buckets.get_mut(&n) {
                    b.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        prev
    }

    /// Inserts `slot` into the bucket for its current count, creating the
    /// bucket right after `below` when absent.
    ///
    /// `below` must be the largest existing count smaller than the slot's
    /// count (or `None` if there is none).
    fn attach(&mut self, slot: usize, below: Option<u64>) {
        let (count, error) = (self.entries[slot].count, self.entries[slot].error);

        if let Some(bucket) = self.buckets.get_mut(&count) {
            bucket.members.insert((error, slot));
            return;
        }

        let next = match below {
            Some(p) => self.buckets.get(&p).and_then(|b| b.next),
            None => self.head,
        };
        let mut bucket = Bucket {
            members: BTreeSet::new(),
            prev: below,
            next,
        };
        bucket.members.insert((error, slot));
        self.buckets.insert(count, bucket);

        match below {
            Some(p) => {
                if let Some(b) = self.buckets.get_mut(&p) {
                    b.next = Some(count);
                }
            }
            None => self.head = Some(count),
        }
        match next {
            Some(n) => {
                if let Some(b) = self.buckets.get_mut(&n) {
                    b.prev = Some(count);
                }
            }
            None => self.tail = Some(count),
        }
    }

    #[cfg(test)]
    fn debug_validate_invariants(&self) {
        assert!(self.entries.len() <= self.capacity.get());
        assert_eq!(self.entries.len(), self.index.len());

        let mut seen = 0;
        let mut cursor = self.head;
        let mut last: Option<u64> = None;
        while let Some(count) = cursor {
            let bucket = &self.buckets[&count];
            assert!(!bucket.members.is_empty(), "empty bucket {count}");
            assert_eq!(bucket.prev, last);
            if let Some(prev) = last {
                assert!(prev < count, "buckets out of order");
            }
            for &(error, slot) in &bucket.members {
                let entry = &self.entries[slot];
                assert_eq!(entry.count, count);
                assert_eq!(entry.error, error);
                assert!(entry.error < entry.count);
                assert_eq!(self.index[&entry.key], slot);
                seen += 1;
            }
            last = Some(count);
            cursor = bucket.next;
        }
        assert_eq!(self.tail, last);
        assert_eq!(seen, self.entries.len());
        assert_eq!(self.buckets.len() > 0, !self.entries.is_empty());
    }
}
