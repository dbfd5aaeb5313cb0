//! Cancellation mid-run yields a partial report and stops new requests

use std::time::Duration;

use tally_engine::{Completeness, Orchestrator, RunPhase};
use tally_source::HttpPageSource;

use crate::common::{Collection, requested_offsets, run_config, serve};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_stops_new_requests_and_reports_partial() {
    let mut collection = Collection::new(5_000);
    collection.delay = Duration::from_millis(100);
    let server = serve(collection).await;
    let config = run_config(&server, 100, 2);
    let source = HttpPageSource::new(config.endpoint.clone(), &config.http).unwrap();

    let orchestrator = Orchestrator::new(source, &config);
    let cancel = orchestrator.cancel_flag();
    let run = tokio::spawn(orchestrator.run());

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert!(cancel.cancel());
    let at_cancel = requested_offsets(&server).await.len();

    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run drains promptly")
        .unwrap()
        .unwrap();

    // Only requests already past their cancellation check may still arrive.
    let after_run = requested_offsets(&server).await.len();
    assert!(
        after_run <= at_cancel + config.workers.get(),
        "{after_run} requests after cancel, {at_cancel} before"
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(requested_offsets(&server).await.len(), after_run);

    assert!(report.state.cancelled);
    assert_eq!(report.state.phase, RunPhase::Done);
    assert!(matches!(
        report.completeness,
        Completeness::Partial {
            cancelled: true,
            pages_skipped: 0
        }
    ));
    assert!(report.state.pages_completed < 50);
    assert_eq!(
        report.state.items_recorded,
        report.state.pages_completed * 100
    );
    assert_eq!(report.aggregate.items_recorded, report.state.items_recorded);
}

#[tokio::test]
async fn cancel_before_first_page_reports_empty_partial() {
    let server = serve(Collection::new(100)).await;
    let mut config = run_config(&server, 100, 1);
    config.max_offset = Some(499);
    let source = HttpPageSource::new(config.endpoint.clone(), &config.http).unwrap();

    let orchestrator = Orchestrator::new(source, &config);
    let cancel = orchestrator.cancel_flag();
    assert!(cancel.cancel());
    assert!(!cancel.cancel());
    let report = orchestrator.run().await.unwrap();

    assert!(requested_offsets(&server).await.is_empty());
    assert_eq!(report.state.phase, RunPhase::Done);
    assert_eq!(report.state.total_items, 500);
    assert!(report.aggregate.top_items.is_empty());
    assert_eq!(
        report.completeness,
        Completeness::Partial {
            cancelled: true,
            pages_skipped: 0
        }
    );
}

#[tokio::test]
async fn cancel_after_completion_keeps_report_complete() {
    let server = serve(Collection::new(200)).await;
    let config = run_config(&server, 100, 2);
    let source = HttpPageSource::new(config.endpoint.clone(), &config.http).unwrap();

    let orchestrator = Orchestrator::new(source, &config);
    let cancel = orchestrator.cancel_flag();
    let report = orchestrator.run().await.unwrap();
    cancel.cancel();

    assert_eq!(report.completeness, Completeness::Complete);
}
