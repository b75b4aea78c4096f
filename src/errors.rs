use crate::features::UnknownPrefix;
use thiserror::Error;

/// Transport-level failures raised by the [`Fetcher`](crate::fetcher::Fetcher).
///
/// The core never branches on the variant; it only exists so diagnostics
/// say what went wrong.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request URL could not be built.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Connection, TLS or timeout failure.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The upstream answered with a non-success status.
    #[error("{url} returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL with secrets redacted.
        url: String,
    },
    /// A body declared as gzip could not be inflated.
    #[error("failed to decompress response body: {0}")]
    Decompress(#[source] std::io::Error),
    /// The body was not the JSON we expected.
    #[error("failed to parse JSON response: {0}")]
    Json(#[from] serde_json::Error),
    /// The body was not well-formed XML.
    #[error("failed to parse XML response: {0}")]
    Xml(#[from] quick_xml::Error),
    /// The body had no root element, e.g. an empty or plain-text error page.
    #[error("response is not an XML document")]
    NoXmlRoot,
}

/// Outcome of a failed per-record enrichment.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Every configured geocoder came back empty.
    #[error("Could not determine location '{address}'")]
    LocationNotFound { address: String },
    /// The scoring service answered without a usable score.
    #[error("No mobility score available for ({lat}, {lon}): {reason}")]
    ScoreUnavailable { lat: f64, lon: f64, reason: String },
    /// The record itself could not be interpreted (e.g. a bad coordinate).
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// A built-in element path names a namespace prefix that is not declared.
    #[error(transparent)]
    NamespacePath(#[from] UnknownPrefix),
}

impl EnrichError {
    /// Short machine-friendly label, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            EnrichError::Fetch(_) => "fetch",
            EnrichError::LocationNotFound { .. } => "location_not_found",
            EnrichError::ScoreUnavailable { .. } => "score_unavailable",
            EnrichError::InvalidInput(_) => "invalid_input",
            EnrichError::NamespacePath(_) => "namespace_path",
        }
    }
}
