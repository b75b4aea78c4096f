use crate::errors::{EnrichError, FetchError};
use crate::fetcher::Fetcher;
use crate::models::MobiScore;
use serde_json::{Map, Value};
use url::Url;

const MOBISCORE_HEADERS: &[(&str, &str)] = &[
    ("Accept", "*/*"),
    ("Accept-Encoding", "gzip"),
    ("Accept-Language", "nl-NL,nl;q=0.9"),
    ("Referer", "https://mobiscore.omgeving.vlaanderen.be/"),
];

/// Client for the Flemish mobility score service.
pub struct ScoreClient {
    fetcher: Fetcher,
    url: String,
}

impl ScoreClient {
    pub fn new(fetcher: Fetcher, url: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
        }
    }

    /// Fetches the mobility score at a WGS-84 coordinate.
    ///
    /// Any JSON body without a `score.scores` object is
    /// [`EnrichError::ScoreUnavailable`]; only a body that is not JSON at
    /// all is a fetch error.
    pub async fn get_score(&self, lat: f64, lon: f64) -> Result<MobiScore, EnrichError> {
        let url = Url::parse_with_params(
            &self.url,
            &[("lat", lat.to_string()), ("lon", lon.to_string())],
        )
        .map_err(FetchError::from)?;

        let response: Value = self.fetcher.fetch_json(&url, MOBISCORE_HEADERS).await?;

        let scores = response
            .get("score")
            .and_then(|s| s.get("scores"))
            .and_then(Value::as_object)
            .ok_or_else(|| EnrichError::ScoreUnavailable {
                lat,
                lon,
                reason: "response has no score.scores object".to_string(),
            })?;

        Ok(translate(scores))
    }
}

/// Renames the service's sub-scores to the stable field set.
fn translate(scores: &Map<String, Value>) -> MobiScore {
    MobiScore {
        total: number(scores, "totaal"),
        health: number(scores, "gezondheid"),
        education: number(scores, "onderwijs"),
        culture: number(scores, "ontspanning_sport_cultuur"),
        public_transportation: number(scores, "ov"),
        services: number(scores, "winkels_en_diensten"),
    }
}

/// Numbers and numeric strings pass through; anything else is null.
fn number(scores: &Map<String, Value>, field: &str) -> Option<f64> {
    match scores.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => match s.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => ignore(field, s),
        },
        Some(other) => ignore(field, other),
    }
}

fn ignore(field: &str, value: impl std::fmt::Display) -> Option<f64> {
    tracing::debug!("Ignoring non-numeric mobiscore field {}: {}", field, value);
    None
}
