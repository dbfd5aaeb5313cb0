//! End-to-end runs against a well-behaved or partly broken collection

use std::collections::HashMap;

use tally_engine::{Completeness, Orchestrator, RunPhase};
use tally_source::HttpPageSource;
use tally_types::{CategoryId, ItemId};

use crate::common::{Collection, TotalIn, requested_offsets, run_config, serve};

fn source(config: &tally_engine::RunConfig) -> HttpPageSource {
    HttpPageSource::new(config.endpoint.clone(), &config.http).unwrap()
}

#[tokio::test]
async fn every_page_is_fetched_exactly_once() {
    let server = serve(Collection::new(250)).await;
    let config = run_config(&server, 100, 4);

    let report = Orchestrator::new(source(&config), &config)
        .run()
        .await
        .unwrap();

    let mut offsets = requested_offsets(&server).await;
    offsets.sort_unstable();
    assert_eq!(offsets, vec![0, 100, 200]);

    assert_eq!(report.completeness, Completeness::Complete);
    assert_eq!(report.state.phase, RunPhase::Done);
    assert_eq!(report.state.total_items, 250);
    assert_eq!(report.state.pages_completed, 3);
    assert_eq!(report.state.items_recorded, 250);
}

#[tokio::test]
async fn counts_are_exact_when_everything_fits() {
    let server = serve(Collection::new(1000)).await;
    let config = run_config(&server, 64, 8);

    let report = Orchestrator::new(source(&config), &config)
        .run()
        .await
        .unwrap();

    let mut expected: HashMap<(u64, u64), u64> = HashMap::new();
    for i in 0..1000_u64 {
        *expected.entry((i % 3, i % 7)).or_default() += 1;
    }

    assert_eq!(report.aggregate.categories.len(), 3);
    for (category, top) in &report.aggregate.categories {
        assert_eq!(top.len(), 7, "category {category}");
        for entry in top {
            assert_eq!(entry.error, 0);
            let key = (
                category.as_str().parse::<u64>().unwrap(),
                entry.key.as_str().parse::<u64>().unwrap(),
            );
            assert_eq!(entry.count, expected[&key], "{key:?}");
        }
        let counts: Vec<u64> = top.iter().map(|e| e.count).collect();
        assert!(counts.windows(2).all(|w| w[0] >= w[1]), "{counts:?}");
    }

    let top_category = &report.aggregate.top_categories[0];
    assert_eq!(top_category.key, CategoryId::from("0"));
    assert_eq!(top_category.count, 334);

    let overall: u64 = report.aggregate.top_items.iter().map(|e| e.count).sum();
    assert_eq!(overall, 1000);
    assert!(
        report
            .aggregate
            .top_items
            .iter()
            .any(|e| e.key == ItemId::from("0"))
    );
}

#[tokio::test]
async fn header_total_is_honoured() {
    let mut collection = Collection::new(150);
    collection.total_in = TotalIn::Header;
    let server = serve(collection).await;
    let config = run_config(&server, 50, 2);

    let report = Orchestrator::new(source(&config), &config)
        .run()
        .await
        .unwrap();

    assert_eq!(report.state.total_items, 150);
    assert_eq!(report.state.items_recorded, 150);
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let mut collection = Collection::new(300);
    collection.flaky.insert(100, 2);
    collection.flaky.insert(200, 1);
    let server = serve(collection).await;
    let config = run_config(&server, 100, 2);

    let report = Orchestrator::new(source(&config), &config)
        .run()
        .await
        .unwrap();

    assert_eq!(report.completeness, Completeness::Complete);
    assert_eq!(report.state.items_recorded, 300);

    let offsets = requested_offsets(&server).await;
    assert_eq!(offsets.iter().filter(|&&o| o == 100).count(), 3);
    assert_eq!(offsets.iter().filter(|&&o| o == 200).count(), 2);
}

#[tokio::test]
async fn failed_pages_make_a_partial_report() {
    let mut collection = Collection::new(500);
    collection.missing = vec![100];
    collection.flaky.insert(300, 10);
    let server = serve(collection).await;
    let config = run_config(&server, 100, 3);

    let report = Orchestrator::new(source(&config), &config)
        .run()
        .await
        .unwrap();

    assert_eq!(
        report.completeness,
        Completeness::Partial {
            cancelled: false,
            pages_skipped: 2
        }
    );
    assert_eq!(report.state.pages_failed, 2);
    assert_eq!(report.state.pages_completed, 3);
    assert_eq!(report.state.items_recorded, 300);

    let offsets = requested_offsets(&server).await;
    assert_eq!(offsets.iter().filter(|&&o| o == 100).count(), 1);
    assert_eq!(offsets.iter().filter(|&&o| o == 300).count(), 3);
}

#[tokio::test]
async fn offset_window_limits_the_run() {
    let mut collection = Collection::new(10_000);
    collection.total_in = TotalIn::Nowhere;
    let server = serve(collection).await;
    let mut config = run_config(&server, 100, 2);
    config.min_offset = 1000;
    config.max_offset = Some(1249);

    let report = Orchestrator::new(source(&config), &config)
        .run()
        .await
        .unwrap();

    let mut offsets = requested_offsets(&server).await;
    offsets.sort_unstable();
    assert_eq!(offsets, vec![1000, 1100, 1200]);
    assert_eq!(report.state.total_items, 250);
    assert_eq!(report.state.items_recorded, 250);
}

#[tokio::test]
async fn report_serializes_to_json() {
    let server = serve(Collection::new(30)).await;
    let config = run_config(&server, 10, 2);

    let report = Orchestrator::new(source(&config), &config)
        .run()
        .await
        .unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["completeness"]["status"], "complete");
    assert_eq!(json["state"]["phase"], "done");
    assert_eq!(json["items_recorded"], 30);
    assert_eq!(json["categories"]["0"][0]["count"], 2);
    assert!(json["elapsed_seconds"].is_f64());
}
