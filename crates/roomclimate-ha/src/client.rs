// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of RoomClimate.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use crate::errors::{HaError, HaResult};
use crate::types::{HaEntityState, HaHistoryState};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use roomclimate_types::{HaConnectionConfig, RawSample};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const DEFAULT_BASE_URL: &str = "http://localhost:8123";

/// Home Assistant REST API client
#[derive(Clone)]
pub struct HomeAssistantClient {
    base_url: String,
    token: String,
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl fmt::Debug for HomeAssistantClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HomeAssistantClient")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

impl HomeAssistantClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> HaResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| HaError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        let base_url: String = base_url.into();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.into(),
            client,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Client for the Supervisor proxy (running as an HA addon)
    pub fn from_supervisor() -> HaResult<Self> {
        let token = std::env::var("SUPERVISOR_TOKEN").map_err(|_| {
            HaError::ConfigError(
                "SUPERVISOR_TOKEN environment variable not set. Are you running as an HA addon?"
                    .to_owned(),
            )
        })?;

        info!("Initializing HA client using Supervisor API");
        Self::new("http://supervisor/core", token)
    }

    /// Client from widget configuration, falling back to the environment.
    ///
    /// Without a configured token the Supervisor token is tried, then `HA_TOKEN`.
    pub fn from_config(config: &HaConnectionConfig) -> HaResult<Self> {
        if config.token.is_none()
            && config.base_url.is_none()
            && std::env::var("SUPERVISOR_TOKEN").is_ok()
        {
            return Self::from_supervisor();
        }

        let base_url = config
            .base_url
            .clone()
            .or_else(|| std::env::var("HA_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let token = config
            .token
            .clone()
            .or_else(|| std::env::var("HA_TOKEN").ok())
            .ok_or_else(|| {
                HaError::ConfigError(
                    "HA token not found in config or HA_TOKEN environment variable".to_owned(),
                )
            })?;

        info!("Initializing HA client from configuration: {}", base_url);
        Self::new(base_url, token)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Every entity state in one request
    pub async fn get_all_states(&self) -> HaResult<Vec<HaEntityState>> {
        let url = format!("{}/api/states", self.base_url);
        debug!("Fetching all entity states");

        let response = self.get(&url).await?;
        match response.status() {
            StatusCode::OK => Ok(response.json::<Vec<HaEntityState>>().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(HaError::AuthenticationFailed),
            status => Err(Self::api_error(status, response).await),
        }
    }

    /// Health check - ping HA API
    pub async fn ping(&self) -> HaResult<bool> {
        let url = format!("{}/api/", self.base_url);
        debug!("Performing health check");

        match self.client.get(&url).bearer_auth(&self.token).send().await {
            Ok(response) => {
                let is_ok = response.status().is_success();
                if is_ok {
                    debug!("Health check passed");
                } else {
                    warn!("Health check failed: status {}", response.status());
                }
                Ok(is_ok)
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
                Ok(false)
            }
        }
    }

    /// Get Home Assistant configuration (including timezone)
    pub async fn get_config(&self) -> HaResult<Value> {
        let url = format!("{}/api/config", self.base_url);
        debug!("Fetching Home Assistant configuration");

        let response = self.get(&url).await?;
        match response.status() {
            StatusCode::OK => Ok(response.json::<Value>().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(HaError::AuthenticationFailed),
            status => Err(Self::api_error(status, response).await),
        }
    }

    pub async fn get_timezone(&self) -> HaResult<String> {
        let config = self.get_config().await?;

        config
            .get("time_zone")
            .and_then(|tz| tz.as_str())
            .map(|tz| {
                info!("🌍 Home Assistant timezone: {}", tz);
                tz.to_owned()
            })
            .ok_or_else(|| HaError::ConfigError("Timezone not found in HA config".to_owned()))
    }

    /// Raw state changes of one entity in `[start, end]`.
    ///
    /// States are returned as reported, including non-numeric ones; entries
    /// without a parseable timestamp are skipped.
    pub async fn get_history_raw(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> HaResult<Vec<RawSample>> {
        let start_str = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let end_str = end.to_rfc3339_opts(SecondsFormat::Millis, true);

        let url = format!(
            "{}/api/history/period/{}?filter_entity_id={}&end_time={}&minimal_response&no_attributes",
            self.base_url,
            start_str,
            urlencoding::encode(entity_id),
            urlencoding::encode(&end_str)
        );

        debug!("📊 [HA HISTORY] Fetching history for: {}", entity_id);
        debug!("   Time range: {} to {}", start_str, end_str);

        let response = self.get(&url).await?;
        match response.status() {
            StatusCode::OK => {
                // one inner array per entity
                let history: Vec<Vec<HaHistoryState>> = response.json().await?;
                let Some(entity_history) = history.into_iter().next() else {
                    debug!("⚠️ [HA HISTORY] No history data returned for {}", entity_id);
                    return Ok(Vec::new());
                };

                let samples: Vec<RawSample> = entity_history
                    .iter()
                    .filter_map(|state| {
                        let sample = state.to_sample();
                        if sample.is_none() {
                            trace!("Could not parse timestamp for state '{}'", state.state);
                        }
                        sample
                    })
                    .collect();

                debug!(
                    "✅ [HA HISTORY] Retrieved {} samples for {}",
                    samples.len(),
                    entity_id
                );
                Ok(samples)
            }
            StatusCode::NOT_FOUND => {
                error!("❌ [HA HISTORY] Entity not found: {}", entity_id);
                Err(HaError::EntityNotFound(entity_id.to_owned()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("❌ [HA HISTORY] Authentication failed for: {}", entity_id);
                Err(HaError::AuthenticationFailed)
            }
            status => Err(Self::api_error(status, response).await),
        }
    }

    async fn get(&self, url: &str) -> HaResult<reqwest::Response> {
        self.retry_request(|| async { self.client.get(url).bearer_auth(&self.token).send().await })
            .await
    }

    async fn api_error(status: StatusCode, response: reqwest::Response) -> HaError {
        let message = response.text().await.unwrap_or_default();
        error!("❌ [HA ERROR] Status {}: {}", status, message);
        HaError::ApiError {
            status: status.as_u16(),
            message,
        }
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, Fut>(&self, mut request_fn: F) -> HaResult<reqwest::Response>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempts = 0;
        let mut delay = self.retry_delay;

        loop {
            attempts += 1;
            match request_fn().await {
                Ok(response) => return Ok(response),
                Err(e) if attempts >= self.max_retries => {
                    error!("Request failed after {} attempts: {}", attempts, e);
                    return Err(HaError::HttpError(e));
                }
                Err(e) => {
                    warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempts, self.max_retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}
