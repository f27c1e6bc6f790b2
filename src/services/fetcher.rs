use crate::models::PoiRecord;
use crate::services::retry::RetryPolicy;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// Items per page; the provider's maximum for the text-search endpoint.
pub const PAGE_SIZE: usize = 20;

/// Default AMap text-search endpoint.
pub const DEFAULT_SEARCH_URL: &str = "https://restapi.amap.com/v3/place/text";

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const INFO_DAILY_LIMIT: &str = "USER_DAILY_QUERY_OVER_LIMIT";
const INFO_INVALID_KEY: &str = "INVALID_USER_KEY";

/// Why the provider refused a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaReason {
    DailyLimitExceeded,
    InvalidCredential,
}

impl QuotaReason {
    pub fn describe(self) -> &'static str {
        match self {
            QuotaReason::DailyLimitExceeded => "daily query limit exceeded",
            QuotaReason::InvalidCredential => "invalid API key",
        }
    }
}

/// Interpreted outcome of one page request.
#[derive(Debug, Clone, PartialEq)]
pub enum PageResult {
    /// Results for the page. `item_count < PAGE_SIZE` means this was the last page.
    Ok {
        items: Vec<PoiRecord>,
        item_count: usize,
    },

    /// The key was refused; rotate and retry the same page.
    QuotaOrAuthError { reason: QuotaReason },

    /// No more pages for this region (no results, unrecognized failure, or
    /// transient failures that outlasted the retry policy).
    Empty,
}

impl PageResult {
    pub fn is_last_page(&self) -> bool {
        match self {
            PageResult::Ok { item_count, .. } => *item_count < PAGE_SIZE,
            PageResult::QuotaOrAuthError { .. } => false,
            PageResult::Empty => true,
        }
    }
}

/// Response envelope of the place-search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchEnvelope {
    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub info: String,

    /// Total result count; the provider sends it as a string.
    #[serde(default)]
    pub count: Value,

    #[serde(default)]
    pub pois: Vec<Map<String, Value>>,
}

impl SearchEnvelope {
    fn total_count(&self) -> u64 {
        match &self.count {
            Value::String(s) => s.trim().parse().unwrap_or(0),
            Value::Number(n) => n.as_u64().unwrap_or(0),
            _ => 0,
        }
    }
}

/// Map a decoded envelope to a [`PageResult`].
pub fn interpret_envelope(envelope: SearchEnvelope) -> PageResult {
    match envelope.status.as_str() {
        "1" if envelope.total_count() > 0 => {
            let items: Vec<PoiRecord> = envelope.pois.into_iter().map(PoiRecord::from).collect();
            let item_count = items.len();
            PageResult::Ok { items, item_count }
        }
        "0" => match envelope.info.as_str() {
            INFO_DAILY_LIMIT => PageResult::QuotaOrAuthError {
                reason: QuotaReason::DailyLimitExceeded,
            },
            INFO_INVALID_KEY => PageResult::QuotaOrAuthError {
                reason: QuotaReason::InvalidCredential,
            },
            other => {
                tracing::warn!("Provider failure '{}' treated as end of region", other);
                PageResult::Empty
            }
        },
        _ => PageResult::Empty,
    }
}

/// One page request against the place-search endpoint.
///
/// Implementations must not mutate shared state; the orchestrator owns all
/// bookkeeping.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(
        &self,
        credential: &str,
        keyword: &str,
        region_code: &str,
        page: u32,
    ) -> PageResult;
}

/// HTTP fetcher for the AMap `v3/place/text` endpoint.
///
/// Transient failures (retryable HTTP statuses and transport errors) are retried
/// according to the [`RetryPolicy`]; once it gives up the page is reported as
/// [`PageResult::Empty`].
pub struct AmapFetcher {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl AmapFetcher {
    /// Create a fetcher for the public endpoint with the default retry policy.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_base_url(DEFAULT_SEARCH_URL, RetryPolicy::default())
    }

    pub fn with_base_url(base_url: impl Into<String>, retry: RetryPolicy) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            retry,
        })
    }
}

#[async_trait]
impl PageFetcher for AmapFetcher {
    async fn fetch_page(
        &self,
        credential: &str,
        keyword: &str,
        region_code: &str,
        page: u32,
    ) -> PageResult {
        let page_str = page.to_string();
        let offset = PAGE_SIZE.to_string();
        let params = [
            ("key", credential),
            ("keywords", keyword),
            ("city", region_code),
            ("offset", offset.as_str()),
            ("output", "json"),
            ("page", page_str.as_str()),
        ];

        let mut attempt = 1;
        loop {
            let failure = match self.client.get(&self.base_url).query(&params).send().await {
                Ok(response) => {
                    let status = response.status();
                    if self.retry.is_retryable(status.as_u16()) {
                        format!("HTTP {}", status.as_u16())
                    } else if !status.is_success() {
                        tracing::warn!(
                            "Page {} for {} returned HTTP {}, ending region",
                            page,
                            region_code,
                            status.as_u16()
                        );
                        return PageResult::Empty;
                    } else {
                        return match response.json::<SearchEnvelope>().await {
                            Ok(envelope) => {
                                tracing::debug!(
                                    "Page {} for {}: status={}, info={}, pois={}",
                                    page,
                                    region_code,
                                    envelope.status,
                                    envelope.info,
                                    envelope.pois.len()
                                );
                                interpret_envelope(envelope)
                            }
                            Err(e) => {
                                tracing::warn!(
                                    "Undecodable response for {} page {}: {}",
                                    region_code,
                                    page,
                                    e
                                );
                                PageResult::Empty
                            }
                        };
                    }
                }
                Err(e) => e.to_string(),
            };

            match self.retry.delay_after(attempt) {
                Some(delay) => {
                    tracing::debug!(
                        "Transient failure on {} page {} (attempt {}/{}): {}; retrying in {:?}",
                        region_code,
                        page,
                        attempt,
                        self.retry.max_attempts,
                        failure,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    tracing::warn!(
                        "Giving up on {} page {} after {} attempts: {}",
                        region_code,
                        page,
                        attempt,
                        failure
                    );
                    return PageResult::Empty;
                }
            }
        }
    }
}
