/// Per-record enrichment workflow
///
/// 1. Resolve the address to coordinates (Geopunt, suggestion, Google)
/// 2. Fetch the mobility score at those coordinates
/// 3. Look up the statistical unit under the point
///
/// Any failure is returned to the caller untouched; a result is only ever
/// built once every step succeeded.
use crate::config::Config;
use crate::errors::EnrichError;
use crate::features::FeatureLookup;
use crate::fetcher::Fetcher;
use crate::geocoding::GeoResolver;
use crate::models::{EnrichmentResult, LocationQuery, MobiScore, ResolvedLocation};
use crate::score::ScoreClient;

pub struct EnrichmentPipeline {
    resolver: GeoResolver,
    scores: ScoreClient,
    features: FeatureLookup,
}

impl EnrichmentPipeline {
    /// Wires every upstream client from `config`, sharing one HTTP client.
    pub fn new(config: &Config) -> Result<Self, EnrichError> {
        let fetcher = Fetcher::new(config.request_timeout())?;
        Ok(Self {
            resolver: GeoResolver::new(fetcher.clone(), config),
            scores: ScoreClient::new(fetcher.clone(), config.mobiscore_url.clone()),
            features: FeatureLookup::new(fetcher, config.wms_url.clone())?,
        })
    }

    /// Enriches a free-text address.
    pub async fn enrich(&self, address: &str) -> Result<EnrichmentResult, EnrichError> {
        let location = self.resolver.resolve(address).await?;
        tracing::debug!(
            "Resolved '{}' to ({}, {})",
            address,
            location.lat,
            location.lon
        );
        self.enrich_location(location).await
    }

    /// Enriches either an address or a coordinate pair. Coordinates skip
    /// geocoding and are echoed back as the address.
    pub async fn enrich_query(&self, query: &LocationQuery) -> Result<EnrichmentResult, EnrichError> {
        match query {
            LocationQuery::Address(address) => self.enrich(address).await,
            LocationQuery::Coordinates { lat, lon } => {
                self.enrich_location(ResolvedLocation {
                    address: format!("{},{}", lat, lon),
                    lat: *lat,
                    lon: *lon,
                })
                .await
            }
        }
    }

    /// Score and statistical units for an already resolved location.
    pub async fn enrich_location(
        &self,
        location: ResolvedLocation,
    ) -> Result<EnrichmentResult, EnrichError> {
        let mobi_score = self.scores.get_score(location.lat, location.lon).await?;
        let statistical_units = self
            .features
            .get_statistical_units(location.lat, location.lon)
            .await?;

        Ok(EnrichmentResult {
            address: location.address,
            lat: location.lat,
            lon: location.lon,
            mobi_score,
            statistical_units,
        })
    }

    /// Mobility score only, for callers that already have coordinates.
    pub async fn score(&self, lat: f64, lon: f64) -> Result<MobiScore, EnrichError> {
        self.scores.get_score(lat, lon).await
    }

    /// PNG rendering of the statistical units around a coordinate.
    pub async fn map(&self, lat: f64, lon: f64, radius: f64) -> Result<Vec<u8>, EnrichError> {
        self.features.get_map(lat, lon, radius).await
    }
}
