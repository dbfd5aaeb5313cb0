//! Core domain types for tally.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the workspace.

mod ids;
mod page;

pub use ids::{CategoryId, ItemId};
pub use page::{Page, Partition, partition};

use serde::{Deserialize, Serialize};

/// One element of the remote collection.
///
/// Immutable once fetched. Older deployments of the API name the fields
/// `food_id` / `food_category_id`; both spellings are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    #[serde(alias = "food_id")]
    pub id: ItemId,
    #[serde(alias = "food_category_id")]
    pub category_id: CategoryId,
}

impl Item {
    #[must_use]
    pub fn new(id: impl Into<ItemId>, category_id: impl Into<CategoryId>) -> Self {
        Self {
            id: id.into(),
            category_id: category_id.into(),
        }
    }
}
