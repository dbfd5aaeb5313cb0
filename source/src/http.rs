//! `reqwest`-backed [`PageSource`].

use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use tally_types::{Item, Page};
use url::Url;

use crate::retry::parse_retry_after;
use crate::{AttemptError, PageBody, PageSource};

const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;
const POOL_MAX_IDLE_PER_HOST: usize = 16;
const MAX_REDIRECTS: usize = 5;
const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// Client settings shared by every request of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    /// Whole-request timeout, body included.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            user_agent: concat!("tally/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

fn client_builder(settings: &HttpSettings) -> reqwest::ClientBuilder {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .timeout(settings.request_timeout)
        .connect_timeout(settings.connect_timeout)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .user_agent(settings.user_agent.clone())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
        .default_headers(default_headers)
}

/// Response envelope: `{"response": [...], "total": N}`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    response: Option<Vec<Item>>,
    #[serde(default, alias = "count", alias = "total_count")]
    total: Option<u64>,
}

/// `GET <endpoint>?offset=O&limit=L` against a JSON collection.
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpPageSource {
    pub fn new(endpoint: Url, settings: &HttpSettings) -> Result<Self, reqwest::Error> {
        let client = client_builder(settings).build()?;
        Ok(Self { client, endpoint })
    }

    /// Endpoint with `offset`/`limit` set, keeping any other query pairs.
    #[must_use]
    pub fn page_url(&self, page: Page) -> Url {
        let retained: Vec<(String, String)> = self
            .endpoint
            .query_pairs()
            .filter(|(key, _)| key != "offset" && key != "limit")
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(retained)
            .append_pair("offset", &page.offset().to_string())
            .append_pair("limit", &page.limit().to_string());
        url
    }

    async fn get(&self, page: Page) -> Result<PageBody, AttemptError> {
        let response = self
            .client
            .get(self.page_url(page))
            .send()
            .await
            .map_err(|e| AttemptError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Status {
                status: status.as_u16(),
                retry_after: parse_retry_after(response.headers()),
            });
        }

        let header_total = response
            .headers()
            .get(TOTAL_COUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AttemptError::from_reqwest(&e))?;
        let envelope: Envelope = serde_json::from_slice(&bytes)
            .map_err(|e| AttemptError::MalformedBody(e.to_string()))?;

        Ok(PageBody {
            items: envelope.response.unwrap_or_default(),
            total: envelope.total.or(header_total),
        })
    }
}

impl PageSource for HttpPageSource {
    async fn fetch_page(&self, page: Page) -> Result<PageBody, AttemptError> {
        self.get(page).await
    }
}
