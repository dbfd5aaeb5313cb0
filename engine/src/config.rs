use serde::Deserialize;
use std::num::{NonZeroU32, NonZeroUsize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tally_source::{HttpSettings, RetryPolicy};
use tally_summary::AggregatorConfig;
use thiserror::Error;
use url::Url;

const DEFAULT_LIMIT: u32 = 500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_WORKERS: usize = 8;
const DEFAULT_TOP_ITEMS: usize = 100;
const DEFAULT_TOP_CATEGORIES: usize = 5;
/// Counter capacity per reported entry when no capacity is configured.
const CAPACITY_FACTOR: usize = 100;

/// Raw contents of `~/.tally/config.toml`. Every field is optional.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TallyConfig {
    pub api: Option<ApiConfig>,
    pub workers: Option<WorkersConfig>,
    pub retry: Option<RetryConfig>,
    pub report: Option<ReportConfig>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ApiConfig {
    /// Collection URL, queried as `GET <endpoint>?offset=O&limit=L`.
    pub endpoint: Option<String>,
    /// Page size.
    pub limit: Option<u32>,
    pub request_timeout_seconds: Option<u64>,
    pub connect_timeout_seconds: Option<u64>,
    /// First offset to fetch.
    pub min_offset: Option<u64>,
    /// Last offset to fetch (inclusive). Bounds the run when the API does not
    /// report a total, and caps it when it does.
    pub max_offset: Option<u64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct WorkersConfig {
    pub count: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub jitter_factor: Option<f64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ReportConfig {
    pub top_items: Option<usize>,
    /// Item counter capacity; defaults to `top_items * 100`.
    pub capacity: Option<usize>,
    pub top_categories: Option<usize>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Invalid { .. } => None,
        }
    }

    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl TallyConfig {
    /// Load from the default location. A missing file yields `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    /// Load from an explicit path. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub limit: Option<u32>,
    pub workers: Option<usize>,
    pub top_items: Option<usize>,
    pub top_categories: Option<usize>,
    pub capacity: Option<usize>,
    pub max_attempts: Option<u32>,
}

/// Fully resolved and validated settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub endpoint: Url,
    pub limit: NonZeroU32,
    pub min_offset: u64,
    pub max_offset: Option<u64>,
    pub workers: NonZeroUsize,
    pub http: HttpSettings,
    pub retry: RetryPolicy,
    pub aggregator: AggregatorConfig,
}

impl RunConfig {
    /// Merge the config file with command-line overrides and validate.
    pub fn resolve(file: &TallyConfig, overrides: &Overrides) -> Result<Self, ConfigError> {
        let api = file.api.clone().unwrap_or_default();
        let workers = file.workers.clone().unwrap_or_default();
        let retry = file.retry.clone().unwrap_or_default();
        let report = file.report.clone().unwrap_or_default();

        let endpoint = overrides
            .endpoint
            .clone()
            .or_else(|| api.endpoint.clone())
            .ok_or_else(|| ConfigError::invalid("endpoint", "no endpoint configured"))?;
        let endpoint = parse_endpoint(&endpoint)?;

        let limit = overrides.limit.or(api.limit).unwrap_or(DEFAULT_LIMIT);
        let limit =
            NonZeroU32::new(limit).ok_or_else(|| ConfigError::invalid("limit", "must be at least 1"))?;

        let min_offset = api.min_offset.unwrap_or(0);
        if let Some(max_offset) = api.max_offset
            && max_offset < min_offset
        {
            return Err(ConfigError::invalid(
                "max_offset",
                format!("{max_offset} is below min_offset {min_offset}"),
            ));
        }

        let worker_count = overrides
            .workers
            .or(workers.count)
            .unwrap_or(DEFAULT_WORKERS);
        let worker_count = NonZeroUsize::new(worker_count)
            .ok_or_else(|| ConfigError::invalid("workers", "must be at least 1"))?;

        let http = resolve_http(&api)?;
        let retry = resolve_retry(&retry, overrides)?;
        let aggregator = resolve_report(&report, overrides)?;

        Ok(Self {
            endpoint,
            limit,
            min_offset,
            max_offset: api.max_offset,
            workers: worker_count,
            http,
            retry,
            aggregator,
        })
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::invalid("endpoint", format!("{raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::invalid(
            "endpoint",
            format!("unsupported scheme {other:?}"),
        )),
    }
}

fn resolve_http(api: &ApiConfig) -> Result<HttpSettings, ConfigError> {
    let request = api
        .request_timeout_seconds
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    let connect = api
        .connect_timeout_seconds
        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
    if request == 0 {
        return Err(ConfigError::invalid(
            "request_timeout_seconds",
            "must be at least 1",
        ));
    }
    if connect == 0 {
        return Err(ConfigError::invalid(
            "connect_timeout_seconds",
            "must be at least 1",
        ));
    }

    let mut http = HttpSettings {
        request_timeout: Duration::from_secs(request),
        connect_timeout: Duration::from_secs(connect),
        ..HttpSettings::default()
    };
    if let Some(agent) = api.user_agent.as_deref().map(str::trim)
        && !agent.is_empty()
    {
        http.user_agent = agent.to_string();
    }
    Ok(http)
}

fn resolve_retry(retry: &RetryConfig, overrides: &Overrides) -> Result<RetryPolicy, ConfigError> {
    let defaults = RetryPolicy::default();
    let max_attempts = overrides
        .max_attempts
        .or(retry.max_attempts)
        .unwrap_or(defaults.max_attempts);
    if max_attempts == 0 {
        return Err(ConfigError::invalid("max_attempts", "must be at least 1"));
    }

    let base_delay = retry
        .base_delay_ms
        .map_or(defaults.base_delay, Duration::from_millis);
    let max_delay = retry
        .max_delay_ms
        .map_or(defaults.max_delay, Duration::from_millis);
    if base_delay > max_delay {
        return Err(ConfigError::invalid(
            "base_delay_ms",
            format!(
                "{}ms exceeds max_delay_ms {}ms",
                base_delay.as_millis(),
                max_delay.as_millis()
            ),
        ));
    }

    let jitter_factor = retry.jitter_factor.unwrap_or(defaults.jitter_factor);
    if !(0.0..=1.0).contains(&jitter_factor) {
        return Err(ConfigError::invalid(
            "jitter_factor",
            format!("{jitter_factor} is outside [0, 1]"),
        ));
    }

    Ok(RetryPolicy {
        max_attempts,
        base_delay,
        max_delay,
        jitter_factor,
    })
}

fn resolve_report(
    report: &ReportConfig,
    overrides: &Overrides,
) -> Result<AggregatorConfig, ConfigError> {
    let top_items = overrides
        .top_items
        .or(report.top_items)
        .unwrap_or(DEFAULT_TOP_ITEMS);
    let top_categories = overrides
        .top_categories
        .or(report.top_categories)
        .unwrap_or(DEFAULT_TOP_CATEGORIES);

    let item_capacity = overrides
        .capacity
        .or(report.capacity)
        .unwrap_or_else(|| top_items.saturating_mul(CAPACITY_FACTOR));

    let item_capacity = capacity("capacity", item_capacity, top_items, "top_items")?;

    Ok(AggregatorConfig {
        top_items,
        item_capacity,
        top_categories,
    })
}

fn capacity(
    field: &'static str,
    value: usize,
    top: usize,
    top_field: &str,
) -> Result<NonZeroUsize, ConfigError> {
    if value < top {
        return Err(ConfigError::invalid(
            field,
            format!("{value} is smaller than {top_field} ({top})"),
        ));
    }
    NonZeroUsize::new(value).ok_or_else(|| ConfigError::invalid(field, "must be at least 1"))
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".tally").join("config.toml"))
}
