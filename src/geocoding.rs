//! Address resolution.
//!
//! Providers are tried in a fixed order and the first hit wins:
//! 1. Geopunt location lookup with the raw text
//! 2. Geopunt location lookup with Geopunt's own suggestion (once)
//! 3. Google geocoding, only when an API key is configured
use crate::config::{AddressSource, Config};
use crate::errors::{EnrichError, FetchError};
use crate::fetcher::Fetcher;
use crate::models::{
    GeopuntLocationResponse, GeopuntSuggestionResponse, GoogleGeocodeResponse, ResolvedLocation,
};
use url::Url;

const GEOPUNT_HEADERS: &[(&str, &str)] = &[
    ("Accept", "*/*"),
    ("Accept-Encoding", "gzip"),
    ("Accept-Language", "nl-NL,nl;q=0.9"),
];

const GOOGLE_HEADERS: &[(&str, &str)] = &[("Accept", "*/*"), ("Accept-Encoding", "gzip")];

/// Suffix Geopunt leaves off its formatted addresses.
const GEOPUNT_COUNTRY: &str = "Belgium";

/// Client for the Flemish national address service (Geopunt).
pub struct GeopuntClient {
    fetcher: Fetcher,
    base_url: String,
}

impl GeopuntClient {
    pub fn new(fetcher: Fetcher, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, name: &str, query: &str) -> Result<Url, FetchError> {
        Ok(Url::parse_with_params(
            &format!("{}/{}", self.base_url, name),
            &[("q", query)],
        )?)
    }

    /// Looks up `address`; `None` when Geopunt has no match.
    pub async fn locate(&self, address: &str) -> Result<Option<ResolvedLocation>, FetchError> {
        let url = self.endpoint("location", address)?;
        let response: GeopuntLocationResponse = self.fetcher.fetch_json(&url, GEOPUNT_HEADERS).await?;

        let location = geopunt_location(response, address);
        match &location {
            Some(found) => tracing::debug!("Geopunt: '{}' -> {}", address, found.address),
            None => tracing::debug!("Geopunt: no match for '{}'", address),
        }
        Ok(location)
    }

    /// Returns Geopunt's best guess at what `address` was meant to be.
    pub async fn suggest(&self, address: &str) -> Result<Option<String>, FetchError> {
        let url = self.endpoint("suggestion", address)?;
        let response: GeopuntSuggestionResponse =
            self.fetcher.fetch_json(&url, GEOPUNT_HEADERS).await?;

        Ok(response
            .suggestion_result
            .into_iter()
            .next()
            .filter(|s| !s.trim().is_empty()))
    }
}

/// Maps the first Geopunt result onto a [`ResolvedLocation`]. Without a
/// formatted address the queried text is kept.
fn geopunt_location(response: GeopuntLocationResponse, queried: &str) -> Option<ResolvedLocation> {
    let first = response.location_result.into_iter().next()?;
    let coordinates = first.location?;
    let (lat, lon) = (coordinates.lat_wgs84?, coordinates.lon_wgs84?);
    let address = match first.formatted_address.filter(|f| !f.trim().is_empty()) {
        Some(formatted) => format!("{}, {}", formatted, GEOPUNT_COUNTRY),
        None => queried.to_string(),
    };
    Some(ResolvedLocation { address, lat, lon })
}

/// Google geocoding API client, used as the last resort.
pub struct GoogleGeocoder {
    fetcher: Fetcher,
    url: String,
    api_key: String,
}

impl GoogleGeocoder {
    pub fn new(fetcher: Fetcher, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    pub async fn locate(&self, address: &str) -> Result<Option<ResolvedLocation>, FetchError> {
        let url = Url::parse_with_params(
            &self.url,
            &[("key", self.api_key.as_str()), ("address", address)],
        )?;
        let response: GoogleGeocodeResponse = self.fetcher.fetch_json(&url, GOOGLE_HEADERS).await?;

        if let Some(status) = response.status.as_deref() {
            tracing::debug!("Google geocoding status for '{}': {}", address, status);
        }
        Ok(google_location(response, address))
    }
}

fn google_location(response: GoogleGeocodeResponse, queried: &str) -> Option<ResolvedLocation> {
    let first = response.results.into_iter().next()?;
    let location = first.geometry?.location?;
    Some(ResolvedLocation {
        address: first
            .formatted_address
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| queried.to_string()),
        lat: location.lat?,
        lon: location.lng?,
    })
}

/// Resolves free text to coordinates, trying providers in priority order.
pub struct GeoResolver {
    geopunt: GeopuntClient,
    google: Option<GoogleGeocoder>,
    use_suggestions: bool,
    address_source: AddressSource,
}

impl GeoResolver {
    pub fn new(fetcher: Fetcher, config: &Config) -> Self {
        let google = config.google_api_key.as_ref().map(|key| {
            GoogleGeocoder::new(fetcher.clone(), config.google_geocode_url.clone(), key.clone())
        });
        Self {
            geopunt: GeopuntClient::new(fetcher, config.geopunt_base_url.clone()),
            google,
            use_suggestions: config.use_suggestions,
            address_source: config.address_source,
        }
    }

    /// Resolves `address` or fails with [`EnrichError::LocationNotFound`].
    ///
    /// Network and parse failures of any provider are returned as-is; they
    /// do not trigger the next provider.
    pub async fn resolve(&self, address: &str) -> Result<ResolvedLocation, EnrichError> {
        if let Some(found) = self.geopunt.locate(address).await? {
            return Ok(self.finish(found, address));
        }

        if self.use_suggestions {
            if let Some(suggestion) = self.geopunt.suggest(address).await? {
                tracing::warn!(
                    "Trying suggested address '{}' instead of '{}'",
                    suggestion,
                    address
                );
                if let Some(found) = self.geopunt.locate(&suggestion).await? {
                    return Ok(self.finish(found, address));
                }
            }
        }

        if let Some(google) = &self.google {
            if let Some(found) = google.locate(address).await? {
                tracing::info!("Resolved '{}' through Google geocoding", address);
                return Ok(self.finish(found, address));
            }
        }

        Err(EnrichError::LocationNotFound {
            address: address.to_string(),
        })
    }

    fn finish(&self, mut found: ResolvedLocation, input: &str) -> ResolvedLocation {
        if self.address_source == AddressSource::Input {
            found.address = input.to_string();
        }
        found
    }
}
