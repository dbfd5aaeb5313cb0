//! Shared test utilities and fixtures
//!
//! An in-memory paginated collection served over HTTP by wiremock.

#![allow(dead_code)]

use std::collections::HashMap;
use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::Mutex;
use std::time::Duration;

use tally_engine::RunConfig;
use tally_source::{HttpSettings, RetryPolicy};
use tally_summary::AggregatorConfig;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Where the collection size is advertised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalIn {
    Body,
    Header,
    Nowhere,
}

/// Item `i` of the collection is `{"id": i % 7, "category_id": i % 3}`.
pub struct Collection {
    pub total: u64,
    pub total_in: TotalIn,
    /// Offsets answered with 404.
    pub missing: Vec<u64>,
    /// Offsets answered with 503 this many times before succeeding.
    pub flaky: HashMap<u64, u32>,
    pub delay: Duration,
    served: Mutex<HashMap<u64, u32>>,
}

impl Collection {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            total_in: TotalIn::Body,
            missing: Vec::new(),
            flaky: HashMap::new(),
            delay: Duration::ZERO,
            served: Mutex::new(HashMap::new()),
        }
    }
}

fn query(request: &Request, key: &str) -> u64 {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or_else(|| panic!("request without {key}: {}", request.url))
}

impl Respond for Collection {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let offset = query(request, "offset");
        let limit = query(request, "limit");

        if self.missing.contains(&offset) {
            return ResponseTemplate::new(404);
        }

        let attempt = {
            let mut served = self.served.lock().unwrap();
            let count = served.entry(offset).or_default();
            *count += 1;
            *count
        };
        if self.flaky.get(&offset).is_some_and(|&fails| attempt <= fails) {
            return ResponseTemplate::new(503);
        }

        let end = (offset + limit).min(self.total);
        let items: Vec<serde_json::Value> = (offset..end)
            .map(|i| serde_json::json!({"id": i % 7, "category_id": i % 3}))
            .collect();

        let mut body = serde_json::json!({ "response": items });
        let mut template = ResponseTemplate::new(200).set_delay(self.delay);
        match self.total_in {
            TotalIn::Body => body["total"] = self.total.into(),
            TotalIn::Header => {
                template = template.insert_header("X-Total-Count", self.total.to_string());
            }
            TotalIn::Nowhere => {}
        }
        template.set_body_json(body)
    }
}

pub async fn serve(collection: Collection) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(collection)
        .mount(&server)
        .await;
    server
}

pub fn run_config(server: &MockServer, limit: u32, workers: usize) -> RunConfig {
    RunConfig {
        endpoint: Url::parse(&format!("{}/items", server.uri())).unwrap(),
        limit: NonZeroU32::new(limit).unwrap(),
        min_offset: 0,
        max_offset: None,
        workers: NonZeroUsize::new(workers).unwrap(),
        http: HttpSettings {
            request_timeout: Duration::from_secs(5),
            ..HttpSettings::default()
        },
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            jitter_factor: 0.0,
        },
        aggregator: AggregatorConfig {
            top_items: 7,
            item_capacity: NonZeroUsize::new(700).unwrap(),
            top_categories: 3,
        },
    }
}

/// Offsets of every request the server received, in arrival order.
pub async fn requested_offsets(server: &MockServer) -> Vec<u64> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| query(request, "offset"))
        .collect()
}
