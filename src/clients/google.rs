//! Google Geocoding API client (secondary, authenticated fallback).
//!
//! The client only exists when an API key is supplied; without one the
//! resolver skips the fallback tier entirely.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

use super::{Coordinates, GeocodeProvider};

/// Google Geocoding client settings.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub base_url: String,
    pub api_key: String,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeHit>,
}

#[derive(Debug, Deserialize)]
struct GeocodeHit {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Clone)]
pub struct GoogleClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl GoogleClient {
    /// Build the client with bounded connect/total timeouts.
    ///
    /// # Errors
    /// Returns an error if the base URL does not parse or the HTTP
    /// client cannot be constructed.
    pub fn new(config: GoogleConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build google HTTP client")?;

        let base_url = Url::parse(&config.base_url).context("invalid google base URL")?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
        })
    }
}

#[async_trait]
impl GeocodeProvider for GoogleClient {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>> {
        let mut url = self
            .base_url
            .join("maps/api/geocode/json")
            .context("failed to build google geocode URL")?;

        url.query_pairs_mut()
            .append_pair("address", address)
            .append_pair("key", &self.api_key);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("google geocode request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("google returned error status {status}: {error_body}");
        }

        let body: GeocodeResponse = response
            .json()
            .await
            .context("failed to deserialize google geocode response")?;

        // ZERO_RESULTS is a valid "no location found" answer; anything
        // other than OK alongside it means the request was rejected.
        if body.status != "OK" && body.status != "ZERO_RESULTS" {
            anyhow::bail!("google geocode rejected the request: {}", body.status);
        }

        Ok(body
            .results
            .into_iter()
            .next()
            .map(|hit| Coordinates {
                lat: hit.geometry.location.lat,
                lng: hit.geometry.location.lng,
            }))
    }
}
