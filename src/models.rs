use serde::{Deserialize, Serialize};

// ============ Domain Models ============

/// What a record asks to be enriched.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationQuery {
    /// Free-text address, resolved through the geocoders.
    Address(String),
    /// WGS-84 coordinates supplied directly; no geocoding happens.
    Coordinates { lat: f64, lon: f64 },
}

/// A geocoded location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    /// Canonical address (or the input text, depending on configuration).
    pub address: String,
    /// Latitude in WGS-84 decimal degrees.
    pub lat: f64,
    /// Longitude in WGS-84 decimal degrees.
    pub lon: f64,
}

/// The six sub-scores published by the mobility score service.
///
/// Every field is optional: the service may leave any of them out and the
/// values are passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MobiScore {
    pub total: Option<f64>,
    pub health: Option<f64>,
    pub education: Option<f64>,
    pub culture: Option<f64>,
    pub public_transportation: Option<f64>,
    pub services: Option<f64>,
}

impl MobiScore {
    /// Sub-scores in output column order.
    pub fn values(&self) -> [Option<f64>; 6] {
        [
            self.total,
            self.health,
            self.education,
            self.culture,
            self.public_transportation,
            self.services,
        ]
    }
}

/// Fully enriched record. Only ever built from a resolved location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub address: String,
    pub lat: f64,
    pub lon: f64,
    pub mobi_score: MobiScore,
    /// Statistical unit codes under the point, in document order.
    pub statistical_units: Vec<String>,
}

impl EnrichmentResult {
    /// The statistical unit written to the output (`su` column).
    pub fn primary_statistical_unit(&self) -> Option<&str> {
        self.statistical_units.first().map(String::as_str)
    }
}

// ============ Geopunt (national geocoder) ============

#[derive(Debug, Deserialize)]
pub struct GeopuntLocationResponse {
    #[serde(rename = "LocationResult", default)]
    pub location_result: Vec<GeopuntLocation>,
}

#[derive(Debug, Deserialize)]
pub struct GeopuntLocation {
    #[serde(rename = "FormattedAddress")]
    pub formatted_address: Option<String>,
    #[serde(rename = "Location")]
    pub location: Option<GeopuntCoordinates>,
}

#[derive(Debug, Deserialize)]
pub struct GeopuntCoordinates {
    #[serde(rename = "Lat_WGS84")]
    pub lat_wgs84: Option<f64>,
    #[serde(rename = "Lon_WGS84")]
    pub lon_wgs84: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct GeopuntSuggestionResponse {
    #[serde(rename = "SuggestionResult", default)]
    pub suggestion_result: Vec<String>,
}

// ============ Google geocoding ============

#[derive(Debug, Deserialize)]
pub struct GoogleGeocodeResponse {
    #[serde(default)]
    pub results: Vec<GoogleGeocodeResult>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GoogleGeocodeResult {
    pub formatted_address: Option<String>,
    pub geometry: Option<GoogleGeometry>,
}

#[derive(Debug, Deserialize)]
pub struct GoogleGeometry {
    pub location: Option<GoogleLatLng>,
}

#[derive(Debug, Deserialize)]
pub struct GoogleLatLng {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_geopunt_response_tolerates_missing_list() {
        let response: GeopuntLocationResponse = serde_json::from_value(json!({})).unwrap();
        assert!(response.location_result.is_empty());
    }

    #[test]
    fn test_google_response_parses_first_result() {
        let response: GoogleGeocodeResponse = serde_json::from_value(json!({
            "status": "OK",
            "results": [{
                "formatted_address": "Wijnbergenstraat 97, 3010 Leuven, Belgium",
                "geometry": {"location": {"lat": 50.88, "lng": 4.71}}
            }]
        }))
        .unwrap();
        let location = response.results[0]
            .geometry
            .as_ref()
            .and_then(|g| g.location.as_ref())
            .unwrap();
        assert_eq!(location.lat, Some(50.88));
        assert_eq!(location.lng, Some(4.71));
    }

    #[test]
    fn test_primary_statistical_unit_is_first() {
        let result = EnrichmentResult {
            address: "x".to_string(),
            lat: 0.0,
            lon: 0.0,
            mobi_score: MobiScore::default(),
            statistical_units: vec!["24062A01-".to_string(), "24062A02-".to_string()],
        };
        assert_eq!(result.primary_statistical_unit(), Some("24062A01-"));
    }
}
