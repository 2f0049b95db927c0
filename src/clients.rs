//! HTTP clients for the external geocoding providers.
//!
//! Each client is built once at startup with bounded timeouts and
//! injected as an `Arc`; nothing here is ambient global state.

use anyhow::Result;
use async_trait::async_trait;

pub mod google;
pub mod nominatim;

pub use google::{GoogleClient, GoogleConfig};
pub use nominatim::{NominatimClient, NominatimConfig};

/// A pair of resolved coordinates as returned by a provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Abstract capability `geocode(text) -> coordinates | none`.
///
/// `Ok(None)` means the provider answered but found no location; an error
/// means the request itself failed. The resolver treats both the same
/// way, but tests and logs want the distinction.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    /// Short provider label used in log fields.
    fn name(&self) -> &'static str;

    /// Resolve free-form address text to coordinates.
    ///
    /// # Errors
    /// Returns an error if the request fails or the response cannot be
    /// parsed. Callers are expected to recover locally.
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>>;
}
