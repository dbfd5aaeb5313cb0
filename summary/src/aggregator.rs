//! Per-category top-k aggregation shared across fetch workers.
//!
//! Each category owns a [`StreamSummary`] behind its own mutex. The category
//! map sits behind an `RwLock` that is write-locked only when a category is
//! seen for the first time, so workers recording different categories do not
//! serialize on each other.
//!
//! The overall item ranking is split into shards keyed by item id hash. An id
//! always lands in the same shard, so each shard is an independent summary of
//! its share of the ids and the shard tops merge into the overall top. The
//! category ranking needs no counter of its own: every category counter
//! already knows how many items it has seen.

use std::collections::{BTreeMap, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;
use tally_types::{CategoryId, Item, ItemId};

use crate::{StreamSummary, TopEntry};

type Counter<K> = Arc<Mutex<StreamSummary<K>>>;

const OVERALL_SHARDS: usize = 16;

/// Sizing of the aggregator's counters and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Entries reported per category and for the overall item ranking.
    pub top_items: usize,
    /// Counter size per category and per overall ranking shard.
    pub item_capacity: NonZeroUsize,
    /// Entries reported in the category ranking.
    pub top_categories: usize,
}

/// Snapshot produced by [`CategoryAggregator::report`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateReport {
    /// Top items per category, keyed in category order.
    pub categories: BTreeMap<CategoryId, Vec<TopEntry<ItemId>>>,
    /// Top items across all categories.
    pub top_items: Vec<TopEntry<ItemId>>,
    /// Categories ranked by number of items seen. Counts are exact.
    pub top_categories: Vec<TopEntry<CategoryId>>,
    /// Items recorded over the run.
    pub items_recorded: u64,
}

#[derive(Debug)]
pub struct CategoryAggregator {
    config: AggregatorConfig,
    categories: RwLock<HashMap<CategoryId, Counter<ItemId>>>,
    overall: Box<[Mutex<StreamSummary<ItemId>>]>,
}

impl CategoryAggregator {
    #[must_use]
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            categories: RwLock::new(HashMap::new()),
            overall: (0..OVERALL_SHARDS)
                .map(|_| Mutex::new(StreamSummary::new(config.item_capacity)))
                .collect(),
        }
    }

    /// Records a single item.
    pub fn record(&self, item: &Item) {
        self.record_batch(std::slice::from_ref(item));
    }

    /// Records a page worth of items, taking each category lock and each
    /// overall shard lock at most once.
    ///
    /// Returns the number of items recorded.
    pub fn record_batch(&self, items: &[Item]) -> usize {
        if items.is_empty() {
            return 0;
        }

        let mut by_category: HashMap<&CategoryId, Vec<&ItemId>> = HashMap::new();
        let mut by_shard: HashMap<usize, Vec<&ItemId>> = HashMap::new();
        for item in items {
            by_category
                .entry(&item.category_id)
                .or_default()
                .push(&item.id);
            by_shard
                .entry(shard_of(&item.id, self.overall.len()))
                .or_default()
                .push(&item.id);
        }

        for (category, ids) in &by_category {
            let counter = self.counter(category);
            let mut summary = counter.lock().unwrap_or_else(PoisonError::into_inner);
            for &id in ids {
                summary.increment(id.clone());
            }
        }

        for (shard, ids) in by_shard {
            let mut overall = self.overall[shard]
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for id in ids {
                overall.increment(id.clone());
            }
        }

        items.len()
    }

    /// Number of distinct categories seen so far.
    #[must_use]
    pub fn category_count(&self) -> usize {
        self.categories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Current top-k for every category plus the overall rankings.
    ///
    /// Intended to be called once fetch workers have stopped; a report taken
    /// while items are still being recorded is best-effort.
    #[must_use]
    pub fn report(&self) -> AggregateReport {
        let mut categories = BTreeMap::new();
        let mut top_categories = Vec::new();
        let mut items_recorded = 0;
        for (category, counter) in self
            .categories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            let summary = counter.lock().unwrap_or_else(PoisonError::into_inner);
            items_recorded += summary.total();
            top_categories.push(TopEntry {
                key: category.clone(),
                count: summary.total(),
                error: 0,
            });
            categories.insert(category.clone(), summary.top(self.config.top_items));
        }

        let mut top_items = Vec::new();
        for shard in &self.overall {
            let summary = shard.lock().unwrap_or_else(PoisonError::into_inner);
            top_items.extend(summary.top(self.config.top_items));
        }

        AggregateReport {
            categories,
            top_items: ranked(top_items, self.config.top_items),
            top_categories: ranked(top_categories, self.config.top_categories),
            items_recorded,
        }
    }

    /// Looks up the counter for `category`, creating it on first sight.
    fn counter(&self, category: &CategoryId) -> Counter<ItemId> {
        if let Some(counter) = self
            .categories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(category)
        {
            return Arc::clone(counter);
        }

        let mut map = self
            .categories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let counter = map.entry(category.clone()).or_insert_with(|| {
            tracing::debug!(category = %category, "tracking new category");
            Arc::new(Mutex::new(StreamSummary::new(self.config.item_capacity)))
        });
        Arc::clone(counter)
    }
}

fn shard_of(id: &ItemId, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    usize::try_from(hasher.finish() % shards as u64).unwrap_or(0)
}

/// Highest counts first, then lowest error, then key order.
fn ranked<K: Ord>(mut entries: Vec<TopEntry<K>>, k: usize) -> Vec<TopEntry<K>> {
    entries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(a.error.cmp(&b.error))
            .then_with(|| a.key.cmp(&b.key))
    });
    entries.truncate(k);
    entries
}
