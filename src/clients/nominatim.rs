//! Nominatim search client (primary, unauthenticated provider).
//!
//! Nominatim's usage policy requires an identifying `User-Agent` and a
//! courteous request rate; the pacing itself lives in the batch
//! scheduler, this client only performs single lookups.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

use super::{Coordinates, GeocodeProvider};

/// Nominatim client settings.
#[derive(Debug, Clone)]
pub struct NominatimConfig {
    pub base_url: String,
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
}

/// One search hit. Nominatim encodes coordinates as decimal strings.
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

#[derive(Debug, Clone)]
pub struct NominatimClient {
    client: Client,
    base_url: Url,
}

impl NominatimClient {
    /// Build the client with bounded connect/total timeouts.
    ///
    /// # Errors
    /// Returns an error if the base URL does not parse or the HTTP
    /// client cannot be constructed.
    pub fn new(config: NominatimConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build nominatim HTTP client")?;

        let base_url = Url::parse(&config.base_url).context("invalid nominatim base URL")?;

        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl GeocodeProvider for NominatimClient {
    fn name(&self) -> &'static str {
        "nominatim"
    }

    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>> {
        let mut url = self
            .base_url
            .join("search")
            .context("failed to build nominatim search URL")?;

        url.query_pairs_mut()
            .append_pair("q", address)
            .append_pair("format", "json")
            .append_pair("limit", "1");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("nominatim search request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("nominatim returned error status {status}: {error_body}");
        }

        let places: Vec<NominatimPlace> = response
            .json()
            .await
            .context("failed to deserialize nominatim response")?;

        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };

        let lat: f64 = place
            .lat
            .parse()
            .context("nominatim returned a non-numeric latitude")?;
        let lng: f64 = place
            .lon
            .parse()
            .context("nominatim returned a non-numeric longitude")?;

        Ok(Some(Coordinates { lat, lng }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> NominatimConfig {
        NominatimConfig {
            base_url,
            user_agent: "geocode-worker-tests".to_string(),
            connect_timeout: Duration::from_secs(3),
            total_timeout: Duration::from_secs(8),
        }
    }

    #[tokio::test]
    async fn geocode_parses_first_search_hit() {
        let server = MockServer::start().await;
        let body = serde_json::json!([
            {"lat": "40.4168", "lon": "-3.7038", "display_name": "Madrid"},
            {"lat": "0.0", "lon": "0.0", "display_name": "elsewhere"}
        ]);

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Puerta del Sol, Madrid"))
            .and(query_param("format", "json"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = NominatimClient::new(test_config(server.uri())).expect("client should build");
        let coords = client
            .geocode("Puerta del Sol, Madrid")
            .await
            .expect("geocode should succeed");

        assert_eq!(
            coords,
            Some(Coordinates {
                lat: 40.4168,
                lng: -3.7038
            })
        );
    }

    #[tokio::test]
    async fn geocode_returns_none_for_empty_result_set() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let client = NominatimClient::new(test_config(server.uri())).expect("client should build");
        let coords = client
            .geocode("nowhere at all")
            .await
            .expect("geocode should succeed");

        assert_eq!(coords, None);
    }

    #[tokio::test]
    async fn geocode_surfaces_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = NominatimClient::new(test_config(server.uri())).expect("client should build");
        let result = client.geocode("anywhere").await;

        assert!(result.is_err());
    }
}
