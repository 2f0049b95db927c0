//! Tiered geocoding resolver: cache, then primary, then fallback.
//!
//! Provider errors are never fatal here. Every failure mode collapses
//! into a [`CoordinateResult`] whose `source` says what happened, so the
//! batch scheduler can treat `resolve` as infallible.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::GeocodeCache;
use crate::clients::{Coordinates, GeocodeProvider};
use crate::normalize::normalize_address;

/// Why a row carries (or lacks) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeocodeSource {
    /// Resolved by the primary (free, rate-limited) provider.
    Primary,
    /// Resolved by the secondary (paid) fallback provider.
    Secondary,
    /// Served from the result cache without any provider call.
    Cached,
    /// The input address was empty or whitespace-only.
    Empty,
    /// Both providers failed or found nothing.
    Failed,
    /// The whole batch crashed; the row was never resolved individually.
    BatchFailed,
    /// Accounting shortfall in the scheduler; padded to keep row order.
    Missing,
}

impl GeocodeSource {
    /// Stable label written to the `geocoding_source` output column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            GeocodeSource::Primary => "primary",
            GeocodeSource::Secondary => "secondary",
            GeocodeSource::Cached => "cached",
            GeocodeSource::Empty => "empty",
            GeocodeSource::Failed => "failed",
            GeocodeSource::BatchFailed => "batch_failed",
            GeocodeSource::Missing => "missing",
        }
    }
}

/// Resolution outcome for one address. Absent coordinates are valid and
/// mean "no location found"; `source` always explains why.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateResult {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub source: GeocodeSource,
}

impl CoordinateResult {
    #[must_use]
    pub fn located(lat: f64, lng: f64, source: GeocodeSource) -> Self {
        Self {
            lat: Some(lat),
            lng: Some(lng),
            source,
        }
    }

    #[must_use]
    pub fn unlocated(source: GeocodeSource) -> Self {
        Self {
            lat: None,
            lng: None,
            source,
        }
    }
}

/// Seam between the batch scheduler and the concrete resolver, so tests
/// can substitute scripted or crashing implementations.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, address: &str) -> CoordinateResult;
}

/// Resolver settings; timeouts bound each provider call individually.
#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    pub primary_timeout: Duration,
    pub secondary_timeout: Duration,
}

pub struct GeocodeResolver {
    cache: Arc<dyn GeocodeCache>,
    primary: Arc<dyn GeocodeProvider>,
    secondary: Option<Arc<dyn GeocodeProvider>>,
    config: ResolverConfig,
}

impl GeocodeResolver {
    #[must_use]
    pub fn new(
        cache: Arc<dyn GeocodeCache>,
        primary: Arc<dyn GeocodeProvider>,
        secondary: Option<Arc<dyn GeocodeProvider>>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            cache,
            primary,
            secondary,
            config,
        }
    }

    /// Run one provider with its timeout, flattening every failure mode
    /// (error, timeout, empty answer) into `None`.
    async fn query_provider(
        &self,
        provider: &dyn GeocodeProvider,
        query: &str,
        timeout: Duration,
    ) -> Option<Coordinates> {
        match tokio::time::timeout(timeout, provider.geocode(query)).await {
            Ok(Ok(Some(coords))) => Some(coords),
            Ok(Ok(None)) => {
                debug!(provider = provider.name(), "provider found no location");
                None
            }
            Ok(Err(error)) => {
                warn!(
                    provider = provider.name(),
                    error = %error,
                    "provider request failed, continuing"
                );
                None
            }
            Err(_) => {
                warn!(
                    provider = provider.name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "provider request timed out, continuing"
                );
                None
            }
        }
    }
}

#[async_trait]
impl AddressResolver for GeocodeResolver {
    async fn resolve(&self, address: &str) -> CoordinateResult {
        if address.trim().is_empty() {
            return CoordinateResult::unlocated(GeocodeSource::Empty);
        }

        // Cache lookup on the raw address; a store failure is a miss.
        match self.cache.get(address).await {
            Ok(Some(hit)) => {
                return CoordinateResult {
                    lat: hit.lat,
                    lng: hit.lng,
                    source: GeocodeSource::Cached,
                };
            }
            Ok(None) => {}
            Err(error) => {
                warn!(error = %error, "cache lookup failed, treating as miss");
            }
        }

        let normalized = normalize_address(address);
        let primary_hit = self
            .query_provider(
                self.primary.as_ref(),
                &normalized,
                self.config.primary_timeout,
            )
            .await;

        let result = if let Some(coords) = primary_hit {
            CoordinateResult::located(coords.lat, coords.lng, GeocodeSource::Primary)
        } else if let Some(secondary) = &self.secondary {
            // The fallback gets the original text; its own parser copes
            // better with the component words the normalizer strips.
            match self
                .query_provider(secondary.as_ref(), address, self.config.secondary_timeout)
                .await
            {
                Some(coords) => {
                    CoordinateResult::located(coords.lat, coords.lng, GeocodeSource::Secondary)
                }
                None => CoordinateResult::unlocated(GeocodeSource::Failed),
            }
        } else {
            CoordinateResult::unlocated(GeocodeSource::Failed)
        };

        // Write-through for every outcome, failures included, so a
        // known-bad address does not hammer the providers again.
        if let Err(error) = self.cache.put(address, result).await {
            warn!(error = %error, "cache write failed, dropping entry");
        }

        result
    }
}
