//! Place search backed by the Open-Meteo geocoding API (no API key required)

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::PlaceSearch;
use crate::config::ProviderConfig;
use crate::error::FetchError;
use crate::models::PlaceResult;

/// Open-Meteo geocoding client
pub struct OpenMeteoGeocoder {
    client: ClientWithMiddleware,
    base_url: String,
}

impl OpenMeteoGeocoder {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
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
            base_url: config.geocoding_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PlaceSearch for OpenMeteoGeocoder {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PlaceResult>, FetchError> {
        let url = format!(
            "{}/search?name={}&count={}&language=en&format=json",
            self.base_url,
            urlencoding::encode(query.trim()),
            limit.clamp(1, 20)
        );
        debug!("Geocoding request URL: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(format!("Geocoding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => FetchError::QuotaExceeded("Geocoding rate limit exceeded".to_string()),
                code => FetchError::Http {
                    status: code,
                    message,
                },
            });
        }

        let body: GeocodingResponse = response.json().await.map_err(|e| {
            FetchError::MalformedResponse(format!("Failed to parse geocoding response: {e}"))
        })?;

        Ok(body.into_places())
    }
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    results: Option<Vec<GeocodingResult>>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResult {
    name: String,
    latitude: f64,
    longitude: f64,
    country: Option<String>,
    admin1: Option<String>,
}

impl GeocodingResponse {
    fn into_places(self) -> Vec<PlaceResult> {
        self.results
            .unwrap_or_default()
            .into_iter()
            .map(|result| PlaceResult {
                address: Some(
                    [Some(result.name.as_str()), result.admin1.as_deref(), result.country.as_deref()]
                        .into_iter()
                        .flatten()
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
                city: Some(result.name.clone()),
                name: result.name,
                latitude: result.latitude,
                longitude: result.longitude,
                region: result.admin1,
                country: result.country,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_geocoding_results() {
        let body: GeocodingResponse = serde_json::from_str(
            r#"{"results": [{"id": 1, "name": "Interlaken", "latitude": 46.68, "longitude": 7.86, "country": "Switzerland", "admin1": "Bern"}]}"#,
        )
        .unwrap();
        let places = body.into_places();

        assert_eq!(places.len(), 1);
        assert_eq!(places[0].name, "Interlaken");
        assert_eq!(places[0].region.as_deref(), Some("Bern"));
        assert_eq!(places[0].address.as_deref(), Some("Interlaken, Bern, Switzerland"));
    }

    #[test]
    fn test_no_results() {
        let body: GeocodingResponse = serde_json::from_str(r#"{"generationtime_ms": 0.5}"#).unwrap();
        assert!(body.into_places().is_empty());
    }
}
