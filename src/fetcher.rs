use crate::errors::FetchError;
use flate2::read::GzDecoder;
use reqwest::header::CONTENT_ENCODING;
use serde::de::DeserializeOwned;
use std::io::Read;
use std::time::Duration;
use url::Url;

/// HTTP GET wrapper shared by every upstream client.
///
/// Gzip bodies are inflated here rather than by reqwest so the behaviour
/// does not depend on crate features.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    /// Creates a new `Fetcher` with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Performs a single GET and returns the (decompressed) body.
    ///
    /// # Arguments
    ///
    /// * `url` - Fully built request URL.
    /// * `headers` - Extra request headers.
    pub async fn fetch(&self, url: &Url, headers: &[(&str, &str)]) -> Result<Vec<u8>, FetchError> {
        tracing::debug!("GET {}", redact(url));

        let mut request = self.client.get(url.clone());
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        // reqwest errors embed the URL, which may carry an API key
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Request(e.without_url()))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!("{} returned status {}", redact(url), status);
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: redact(url),
            });
        }

        let encoding = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Request(e.without_url()))?;

        decode_body(encoding.as_deref(), &body)
    }

    /// Like [`fetch`](Self::fetch), parsing the body as JSON.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        headers: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let body = self.fetch(url, headers).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Inflates `body` when `content_encoding` says gzip; returns it unchanged otherwise.
pub fn decode_body(content_encoding: Option<&str>, body: &[u8]) -> Result<Vec<u8>, FetchError> {
    match content_encoding {
        Some(encoding) if encoding.trim().eq_ignore_ascii_case("gzip") => {
            let mut decoded = Vec::with_capacity(body.len() * 4);
            GzDecoder::new(body)
                .read_to_end(&mut decoded)
                .map_err(FetchError::Decompress)?;
            Ok(decoded)
        }
        _ => Ok(body.to_vec()),
    }
}

/// URL for logs and errors, with API keys blanked out.
pub fn redact(url: &Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == "key") {
        return url.to_string();
    }
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "key" {
                "[REDACTED]".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}
