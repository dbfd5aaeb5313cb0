//! Probe failures end the run before any worker starts

use std::time::Duration;

use tally_engine::{Orchestrator, RunError};
use tally_source::{HttpPageSource, PageError};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{Collection, TotalIn, requested_offsets, run_config, serve};

fn orchestrator(server: &MockServer) -> Orchestrator<HttpPageSource> {
    let config = run_config(server, 100, 4);
    let source = HttpPageSource::new(config.endpoint.clone(), &config.http).unwrap();
    Orchestrator::new(source, &config)
}

#[tokio::test]
async fn unknown_total_is_fatal() {
    let mut collection = Collection::new(1_000);
    collection.total_in = TotalIn::Nowhere;
    let server = serve(collection).await;

    let err = orchestrator(&server).run().await.unwrap_err();

    assert!(matches!(err, RunError::UnknownTotal), "{err:?}");
    assert_eq!(requested_offsets(&server).await, vec![0]);
}

#[tokio::test]
async fn server_errors_exhaust_the_probe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let err = orchestrator(&server).run().await.unwrap_err();

    match err {
        RunError::Probe(PageError::Exhausted { attempts, page, .. }) => {
            assert_eq!(attempts, 3);
            assert_eq!(page.offset(), 0);
        }
        other => panic!("expected exhausted probe, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_probe_body_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"response\": [oops"))
        .expect(1)
        .mount(&server)
        .await;

    let err = orchestrator(&server).run().await.unwrap_err();
    assert!(
        matches!(err, RunError::Probe(PageError::Rejected { .. })),
        "{err:?}"
    );
}

#[tokio::test]
async fn retry_after_is_respected_on_probe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After-Ms", "5"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"response": [], "total": 0})),
        )
        .mount(&server)
        .await;

    let report = tokio::time::timeout(Duration::from_secs(5), orchestrator(&server).run())
        .await
        .unwrap()
        .unwrap();

    assert!(report.completeness.is_complete());
    assert_eq!(report.state.total_items, 0);
    assert_eq!(requested_offsets(&server).await.len(), 2);
}
