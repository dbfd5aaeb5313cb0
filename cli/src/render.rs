//! Plain-text rendering of a [`RunReport`].

use std::fmt;

use tally_engine::RunReport;
use tally_summary::{AggregatorConfig, TopEntry};

/// Text form of a report, printed to stdout when `--json` is not given.
pub struct TextReport<'a> {
    report: &'a RunReport,
    config: AggregatorConfig,
}

impl<'a> TextReport<'a> {
    pub fn new(report: &'a RunReport, config: AggregatorConfig) -> Self {
        Self { report, config }
    }
}

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let aggregate = &self.report.aggregate;

        heading(f, &format!("Top {} Items", self.config.top_items))?;
        entries(f, &aggregate.top_items, |f, e| {
            write!(f, "Item {} occurs {} {}", e.key, e.count, times(e.count))
        })?;

        writeln!(f)?;
        heading(f, &format!("Top {} Categories", self.config.top_categories))?;
        entries(f, &aggregate.top_categories, |f, e| {
            write!(f, "Category {} has {} {}", e.key, e.count, items(e.count))
        })?;

        for (category, top) in &aggregate.categories {
            writeln!(f)?;
            heading(
                f,
                &format!("Top {} Items in Category {category}", self.config.top_items),
            )?;
            entries(f, top, |f, e| {
                write!(f, "Item {} occurs {} {}", e.key, e.count, times(e.count))
            })?;
        }

        writeln!(f)?;
        writeln!(f, "{}", self.report.completeness)
    }
}

fn heading(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f, "{title}")?;
    writeln!(f, "{}", "=".repeat(title.chars().count()))
}

fn entries<K>(
    f: &mut fmt::Formatter<'_>,
    list: &[TopEntry<K>],
    line: impl Fn(&mut fmt::Formatter<'_>, &TopEntry<K>) -> fmt::Result,
) -> fmt::Result {
    if list.is_empty() {
        return writeln!(f, "(none)");
    }
    for (rank, entry) in list.iter().enumerate() {
        write!(f, "{}) ", rank + 1)?;
        line(f, entry)?;
        writeln!(f, " (±{}).", entry.error)?;
    }
    Ok(())
}

fn times(count: u64) -> &'static str {
    if count == 1 { "time" } else { "times" }
}

fn items(count: u64) -> &'static str {
    if count == 1 { "item" } else { "items" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::num::NonZeroUsize;
    use std::time::Duration;
    use tally_engine::{RunPhase, RunState};
    use tally_summary::AggregateReport;
    use tally_types::{CategoryId, ItemId};

    fn config() -> AggregatorConfig {
        AggregatorConfig {
            top_items: 5,
            item_capacity: NonZeroUsize::new(500).unwrap(),
            top_categories: 2,
        }
    }

    fn item(key: &str, count: u64, error: u64) -> TopEntry<ItemId> {
        TopEntry {
            key: ItemId::from(key),
            count,
            error,
        }
    }

    fn report(state: RunState) -> RunReport {
        let mut categories = BTreeMap::new();
        categories.insert(CategoryId::from("10"), vec![item("8", 5, 0), item("3", 1, 0)]);
        let aggregate = AggregateReport {
            categories,
            top_items: vec![item("8", 5, 0), item("3", 1, 0)],
            top_categories: vec![TopEntry {
                key: CategoryId::from("10"),
                count: 6,
                error: 0,
            }],
            items_recorded: 6,
        };
        RunReport::new(aggregate, state, Duration::from_secs(2))
    }

    #[test]
    fn renders_complete_report() {
        let state = RunState {
            phase: RunPhase::Done,
            pages_completed: 1,
            items_recorded: 6,
            ..RunState::default()
        };
        let text = TextReport::new(&report(state), config()).to_string();

        let expected = "\
Top 5 Items
===========
1) Item 8 occurs 5 times (±0).
2) Item 3 occurs 1 time (±0).

Top 2 Categories
================
1) Category 10 has 6 items (±0).

Top 5 Items in Category 10
==========================
1) Item 8 occurs 5 times (±0).
2) Item 3 occurs 1 time (±0).

complete
";
        assert_eq!(text, expected);
    }

    #[test]
    fn partial_report_ends_with_status() {
        let state = RunState {
            cancelled: true,
            pages_failed: 3,
            ..RunState::default()
        };
        let text = TextReport::new(&report(state), config()).to_string();
        assert!(text.ends_with("\npartial: cancelled, 3 page(s) skipped\n"), "{text}");
    }

    #[test]
    fn empty_sections_are_marked() {
        let empty = RunReport::new(
            AggregateReport::default(),
            RunState::default(),
            Duration::ZERO,
        );
        let text = TextReport::new(&empty, config()).to_string();
        assert!(text.starts_with("Top 5 Items\n===========\n(none)\n"), "{text}");
    }
}
