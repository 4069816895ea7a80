//! One logical nearby search: every page the API will hand out for a
//! (location, radius, category) query.
//!
//! The executor never fails. Transport errors and non-success statuses are
//! retried with exponential backoff; once a page's retries are exhausted the
//! results gathered so far are returned and the query is flagged as
//! exhausted.

use std::time::Duration;

use serde_json::Value;

use crate::error::AppError;
use crate::models::{CategoryFilter, LatLng, NearbyPage, NearbyRequest, SearchStatus};
use crate::retry::RetryPolicy;
use crate::traits::{PlacesApi, Sleeper};

/// Timing and retry parameters for the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub radius_m: u32,
    /// Pause after every query, and between pages, to respect rate limits.
    pub request_delay: Duration,
    /// Pause before a pagination token may be used.
    pub pagination_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            radius_m: 1000,
            request_delay: Duration::from_millis(500),
            pagination_delay: Duration::from_millis(2500),
            retry: RetryPolicy::default(),
        }
    }
}

/// Everything one query produced.
#[derive(Debug, Default, Clone)]
pub struct SearchOutcome {
    pub results: Vec<Value>,
    /// Pages successfully fetched.
    pub pages: u32,
    /// Calls issued, retries included.
    pub api_calls: u32,
    /// True when a page gave up after its last retry.
    pub exhausted: bool,
}

pub struct SearchExecutor<A, Z>
where
    A: PlacesApi,
    Z: Sleeper,
{
    api: A,
    sleeper: Z,
    config: SearchConfig,
}

impl<A, Z> SearchExecutor<A, Z>
where
    A: PlacesApi,
    Z: Sleeper,
{
    pub fn new(api: A, sleeper: Z, config: SearchConfig) -> Self {
        Self {
            api,
            sleeper,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run the query at `location`, following pagination tokens until the
    /// API stops returning one.
    pub async fn search(&self, location: LatLng, category: &CategoryFilter) -> SearchOutcome {
        let mut outcome = SearchOutcome::default();
        let mut request = NearbyRequest {
            location,
            radius_m: self.config.radius_m,
            category: category.as_type().map(str::to_string),
            page_token: None,
        };

        loop {
            let Some(page) = self.fetch_page(&request, category, &mut outcome).await else {
                outcome.exhausted = true;
                break;
            };

            outcome.pages += 1;
            let zero_results = page.status == SearchStatus::ZeroResults;
            outcome.results.extend(page.results);

            match page.next_page_token {
                Some(token) if !zero_results => {
                    tracing::debug!(
                        page = outcome.pages,
                        wait_ms = %self.config.pagination_delay.as_millis(),
                        "Waiting for next page token"
                    );
                    self.sleeper.sleep(self.config.pagination_delay).await;
                    self.sleeper.sleep(self.config.request_delay).await;
                    request.page_token = Some(token);
                }
                _ => break,
            }
        }

        self.sleeper.sleep(self.config.request_delay).await;
        outcome
    }

    /// Fetch one page, retrying until it succeeds or the attempt budget is
    /// spent.
    async fn fetch_page(
        &self,
        request: &NearbyRequest,
        category: &CategoryFilter,
        outcome: &mut SearchOutcome,
    ) -> Option<NearbyPage> {
        let mut backoff = self.config.retry.start();

        loop {
            let attempt = backoff.begin_attempt();
            outcome.api_calls += 1;

            let error = match self.api.nearby_search(request).await {
                Ok(page) if page.status.is_success() => return Some(page),
                Ok(page) => AppError::ApiStatus {
                    status: page.status.to_string(),
                    message: page.error_message,
                },
                Err(e) => e,
            };

            tracing::warn!(
                location = %request.location,
                %category,
                attempt,
                max_attempts = backoff.max_attempts(),
                error = %error,
                "Nearby search failed"
            );

            match backoff.on_failure() {
                Some(delay) => self.sleeper.sleep(delay).await,
                None => {
                    tracing::error!(
                        location = %request.location,
                        %category,
                        page = outcome.pages + 1,
                        collected = outcome.results.len(),
                        "Max retries exceeded, keeping partial results"
                    );
                    return None;
                }
            }
        }
    }
}
