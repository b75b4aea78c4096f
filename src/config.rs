use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_GEOPUNT_BASE_URL: &str = "https://loc.geopunt.be/geolocation";
pub const DEFAULT_GOOGLE_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
pub const DEFAULT_MOBISCORE_URL: &str = "https://mobiscore.omgeving.vlaanderen.be/ajax/get-score";
pub const DEFAULT_WMS_URL: &str = "https://wms.ngi.be/inspire/dgstatistics/service";

/// Which address string ends up in the output row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AddressSource {
    /// The geocoder's canonical formatted address.
    #[default]
    Formatted,
    /// The address text exactly as read from the input record.
    Input,
}

/// Upstream endpoints and the variant switches of the resolution pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub geopunt_base_url: String,
    pub google_geocode_url: String,
    /// Enables the secondary geocoder when present.
    pub google_api_key: Option<String>,
    pub mobiscore_url: String,
    pub wms_url: String,
    pub request_timeout_secs: u64,
    /// Retry the primary geocoder with its own suggestion before falling back.
    pub use_suggestions: bool,
    pub address_source: AddressSource,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            geopunt_base_url: DEFAULT_GEOPUNT_BASE_URL.to_string(),
            google_geocode_url: DEFAULT_GOOGLE_GEOCODE_URL.to_string(),
            google_api_key: None,
            mobiscore_url: DEFAULT_MOBISCORE_URL.to_string(),
            wms_url: DEFAULT_WMS_URL.to_string(),
            request_timeout_secs: 30,
            use_suggestions: true,
            address_source: AddressSource::Formatted,
        }
    }
}

impl Config {
    /// Builds the configuration from defaults overridden by the environment
    /// (and a `.env` file, if one exists).
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            geopunt_base_url: url_var("GEOPUNT_BASE_URL", defaults.geopunt_base_url)?,
            google_geocode_url: url_var("GOOGLE_GEOCODE_URL", defaults.google_geocode_url)?,
            google_api_key: std::env::var("GOOGLE_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            mobiscore_url: url_var("MOBISCORE_URL", defaults.mobiscore_url)?,
            wms_url: url_var("WMS_URL", defaults.wms_url)?,
            request_timeout_secs: match std::env::var("HTTP_TIMEOUT_SECS") {
                Ok(raw) => raw.trim().parse().map_err(|_| {
                    anyhow::anyhow!("HTTP_TIMEOUT_SECS must be a whole number of seconds")
                })?,
                Err(_) => defaults.request_timeout_secs,
            },
            use_suggestions: defaults.use_suggestions,
            address_source: defaults.address_source,
        };

        tracing::debug!("Geopunt URL: {}", config.geopunt_base_url);
        tracing::debug!("Mobiscore URL: {}", config.mobiscore_url);
        tracing::debug!("WMS URL: {}", config.wms_url);
        if config.google_api_key.is_some() {
            tracing::info!("Google geocoding fallback enabled");
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn url_var(name: &str, default: String) -> anyhow::Result<String> {
    match std::env::var(name) {
        Ok(url) => validate_url(name, url),
        Err(_) => Ok(default),
    }
}

fn validate_url(name: &str, url: String) -> anyhow::Result<String> {
    if url.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(url.trim_end_matches('/').to_string())
}
