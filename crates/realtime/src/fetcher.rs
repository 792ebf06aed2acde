use std::time::Duration;

use common::{AggregateStats, CallLogRequest, CallLogResponse, CallRecord, CallStatus, OutcomeUpdate, RealtimeHealth};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, ConfigError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub timeout_ms: u64,
    pub recent_limit: usize,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self { max_retries: 3, retry_base_ms: 1_000, timeout_ms: 10_000, recent_limit: 20 }
    }
}

impl FetchPolicy {
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.retry_base_ms.saturating_mul(factor))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Seed data for the dashboard. `degraded` is set when either half fell back
/// to its empty default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardSnapshot {
    pub stats: AggregateStats,
    pub calls: Vec<CallRecord>,
    pub degraded: bool,
}

/// REST client for the screening backend.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    policy: FetchPolicy,
}

impl ApiClient {
    pub fn new(base: Url, policy: FetchPolicy) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(policy.timeout())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { http, base, policy })
    }

    pub fn from_config(cfg: &ClientConfig) -> Result<Self, ConfigError> {
        Self::new(cfg.base_url()?, cfg.fetch)
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segs) = url.path_segments_mut() {
            segs.pop_if_empty().extend(segments);
        }
        url
    }

    async fn execute<T, B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut attempt = 0u32;
        loop {
            match self.execute_once(method.clone(), url.clone(), body).await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    let wait = self.policy.retry_delay(attempt);
                    attempt += 1;
                    warn!(
                        url = %url,
                        attempt,
                        max = self.policy.max_retries,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute_once<T, B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut req = self.http.request(method, url);
        if let Some(b) = body {
            req = req.json(b);
        }
        let resp = req.send().await.map_err(|e| ApiError::network(&e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| ApiError::network(&e))?;
        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), &text));
        }
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| ApiError::decode(e.to_string()))
    }

    // ---- endpoints (errors propagate) ----

    pub async fn dashboard_stats(&self) -> Result<AggregateStats, ApiError> {
        self.execute::<_, ()>(Method::GET, self.url(&["api", "dashboard", "stats"]), None).await
    }

    pub async fn recent_calls(&self, limit: usize) -> Result<Vec<CallRecord>, ApiError> {
        let mut url = self.url(&["api", "calls", "recent"]);
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        self.execute::<_, ()>(Method::GET, url, None).await
    }

    pub async fn call(&self, id: &str) -> Result<CallRecord, ApiError> {
        self.execute::<_, ()>(Method::GET, self.url(&["api", "calls", id]), None).await
    }

    pub async fn update_call_outcome(&self, id: &str, outcome: CallStatus) -> Result<(), ApiError> {
        let body = OutcomeUpdate { outcome };
        let _: serde_json::Value = self.execute(Method::PATCH, self.url(&["api", "calls", id]), Some(&body)).await?;
        info!(call = %id, outcome = %outcome, "updated call outcome");
        Ok(())
    }

    pub async fn log_call(&self, req: &CallLogRequest) -> Result<CallLogResponse, ApiError> {
        self.execute(Method::POST, self.url(&["api", "calls", "log"]), Some(req)).await
    }

    pub async fn realtime_health(&self) -> Result<RealtimeHealth, ApiError> {
        self.execute::<_, ()>(Method::GET, self.url(&["api", "realtime", "health"]), None).await
    }

    // ---- fallbacks (never fail) ----

    pub async fn fetch_stats_or_default(&self) -> (AggregateStats, bool) {
        match self.dashboard_stats().await {
            Ok(stats) => (stats, false),
            Err(e) => {
                warn!(error = %e, "stats fetch failed, using zeroed stats");
                (AggregateStats::default(), true)
            }
        }
    }

    pub async fn fetch_recent_calls_or_empty(&self, limit: usize) -> (Vec<CallRecord>, bool) {
        match self.recent_calls(limit).await {
            Ok(calls) => (calls, false),
            Err(e) => {
                warn!(error = %e, "recent calls fetch failed, using empty list");
                (Vec::new(), true)
            }
        }
    }

    pub async fn fetch_call_or_none(&self, id: &str) -> Option<CallRecord> {
        match self.call(id).await {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(call = %id, error = %e, "call fetch failed");
                None
            }
        }
    }

    pub async fn try_update_call_outcome(&self, id: &str, outcome: CallStatus) -> bool {
        match self.update_call_outcome(id, outcome).await {
            Ok(()) => true,
            Err(e) => {
                warn!(call = %id, error = %e, "outcome update failed");
                false
            }
        }
    }

    /// Stats and recent calls fetched concurrently; failures degrade to
    /// empty values.
    pub async fn load_snapshot(&self, limit: usize) -> DashboardSnapshot {
        let ((stats, stats_failed), (calls, calls_failed)) =
            tokio::join!(self.fetch_stats_or_default(), self.fetch_recent_calls_or_empty(limit));
        debug!(calls = calls.len(), degraded = stats_failed || calls_failed, "loaded dashboard snapshot");
        DashboardSnapshot { stats, calls, degraded: stats_failed || calls_failed }
    }
}
