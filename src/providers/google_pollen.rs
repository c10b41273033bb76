//! Pollen forecast client for the Google Pollen API
//!
//! Wraps `forecast:lookup` and converts its daily pollen type readings into
//! [`RawDailyMeasurement`]s. Transient failures are retried with exponential
//! backoff; everything else is mapped onto [`FetchError`].

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::ForecastProvider;
use crate::config::ProviderConfig;
use crate::error::{FetchError, PollenCastError};
use crate::models::{CategoryMeasurement, IndexInfo, Location, PollenCategory, RawDailyMeasurement};

/// Google Pollen API client
pub struct GooglePollenClient {
    client: ClientWithMiddleware,
    api_key: String,
    base_url: String,
}

impl GooglePollenClient {
    /// Create a new client. Fails when no API key is configured.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                PollenCastError::config("A pollen API key is required (provider.api_key)")
            })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .user_agent(concat!("PollenCast/", env!("CARGO_PKG_VERSION")))
            .build()
            .with_context(|| "Failed to create HTTP client")?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn lookup_url(&self, location: &Location, days: u32) -> String {
        format!(
            "{}/forecast:lookup?key={}&location.latitude={}&location.longitude={}&days={}&plantsDescription=false",
            self.base_url,
            urlencoding::encode(&self.api_key),
            location.latitude,
            location.longitude,
            days
        )
    }

    async fn lookup(&self, location: &Location, days: u32) -> Result<Vec<RawDailyMeasurement>, FetchError> {
        let start_time = Instant::now();

        let response = self
            .client
            .get(self.lookup_url(location, days))
            .send()
            .await
            .map_err(|e| FetchError::Network(format!("API request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(map_status(status.as_u16(), error_text));
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| FetchError::MalformedResponse(format!("Failed to parse pollen response: {e}")))?;

        let days = body.into_measurements()?;

        let total_duration = start_time.elapsed();
        info!(
            "Retrieved {} pollen forecast days in {:.3}s",
            days.len(),
            total_duration.as_secs_f64()
        );
        if total_duration.as_secs() > 5 {
            warn!("Slow API response detected: {:.3}s", total_duration.as_secs_f64());
        }

        Ok(days)
    }
}

fn map_status(status: u16, error_text: String) -> FetchError {
    match status {
        401 | 403 => FetchError::InvalidApiKey("Invalid or missing pollen API key".to_string()),
        429 => FetchError::QuotaExceeded("Pollen API quota exceeded".to_string()),
        404 => FetchError::NoData(error_text),
        _ => FetchError::Http {
            status,
            message: error_text,
        },
    }
}

#[async_trait]
impl ForecastProvider for GooglePollenClient {
    #[instrument(skip(self, cancel), fields(lat = location.latitude, lon = location.longitude))]
    async fn fetch(
        &self,
        location: &Location,
        days: u32,
        cancel: CancellationToken,
    ) -> Result<Vec<RawDailyMeasurement>, FetchError> {
        debug!("Requesting {days}-day pollen forecast");
        tokio::select! {
            () = cancel.cancelled() => Err(FetchError::Aborted),
            result = self.lookup(location, days) => result,
        }
    }
}

/// `forecast:lookup` response body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    #[serde(default)]
    daily_info: Vec<DailyInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyInfo {
    date: ApiDate,
    #[serde(default)]
    pollen_type_info: Vec<PollenTypeInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiDate {
    year: i32,
    month: u32,
    day: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollenTypeInfo {
    code: String,
    #[serde(default)]
    in_season: bool,
    index_info: Option<ApiIndexInfo>,
    #[serde(default)]
    health_recommendations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiIndexInfo {
    #[serde(default)]
    value: f64,
    category: Option<String>,
}

impl LookupResponse {
    fn into_measurements(self) -> Result<Vec<RawDailyMeasurement>, FetchError> {
        self.daily_info
            .into_iter()
            .map(|day| {
                let date = NaiveDate::from_ymd_opt(day.date.year, day.date.month, day.date.day)
                    .ok_or_else(|| {
                        FetchError::MalformedResponse(format!(
                            "Invalid forecast date {}-{}-{}",
                            day.date.year, day.date.month, day.date.day
                        ))
                    })?;

                let categories = day
                    .pollen_type_info
                    .into_iter()
                    .filter_map(|info| {
                        let category = PollenCategory::from_provider_code(&info.code)?;
                        Some(CategoryMeasurement {
                            category,
                            index_info: info.index_info.map(|index| IndexInfo {
                                value: index.value,
                                category: index.category,
                            }),
                            in_season: info.in_season,
                            health_recommendations: info.health_recommendations,
                        })
                    })
                    .collect();

                Ok(RawDailyMeasurement::new(date, categories))
            })
            .collect()
    }
}
