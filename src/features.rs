//! Statistical unit lookup through the NGI dgstatistics WMS.
//!
//! A `GetFeatureInfo` request renders a 100x100 pixel tile around the point
//! and queries its centre pixel, which selects the feature under the point
//! no matter how large the box is in degrees.
use crate::errors::{EnrichError, FetchError};
use crate::fetcher::Fetcher;
use quick_xml::encoding::Decoder;
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use thiserror::Error;
use url::Url;

const STATISTICAL_UNIT_LAYER: &str = "su_vectorstatisticalunits";

/// Half the side of the feature-info bounding box, in degrees (~1 km).
const FEATURE_INFO_RADIUS: f64 = 0.01;
const FEATURE_INFO_TILE: u32 = 100;

/// Default half side for [`FeatureLookup::get_map`], in degrees.
pub const DEFAULT_MAP_RADIUS: f64 = 0.5;
const MAP_TILE: u32 = 400;

/// Prefixes used in [`STATISTICAL_UNIT_PATH`].
pub const WMS_NAMESPACES: &[(&str, &str)] = &[
    ("wfs", "http://www.opengis.net/wfs"),
    ("gml", "http://www.opengis.net/gml"),
    ("dgstatistics", "http://dgstatistics"),
];

/// Statistical sector code as of 1 January 2019.
pub const STATISTICAL_UNIT_PATH: &str = "//dgstatistics:CS01012019";

#[derive(Debug, Error, PartialEq)]
#[error("unknown namespace prefix '{0}' in '{1}'")]
pub struct UnknownPrefix(pub String, pub String);

/// A `//prefix:name/prefix:name` element path with prefixes already resolved
/// to namespace URIs. Matches the chain anywhere in the document.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespacePath {
    steps: Vec<(String, String)>,
}

impl NamespacePath {
    pub fn parse(expr: &str, namespaces: &[(&str, &str)]) -> Result<Self, UnknownPrefix> {
        let steps = expr
            .trim_start_matches('/')
            .split('/')
            .filter(|step| !step.is_empty())
            .map(|step| {
                let (prefix, local) = step.split_once(':').unwrap_or(("", step));
                namespaces
                    .iter()
                    .find(|(p, _)| *p == prefix)
                    .map(|(_, uri)| (uri.to_string(), local.to_string()))
                    .ok_or_else(|| UnknownPrefix(prefix.to_string(), expr.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { steps })
    }

    fn matches(&self, open: &[(String, String)]) -> bool {
        !self.steps.is_empty() && open.ends_with(&self.steps)
    }
}

/// Text of every element matching `path`, in document order.
///
/// Element names are compared by namespace URI, so the document may bind
/// the namespaces to any prefixes it likes. The body is decoded by the
/// reader, honouring the encoding in the XML declaration. A body without a
/// root element is an error; a document with no matches gives an empty list.
pub fn select_texts(xml: &[u8], path: &NamespacePath) -> Result<Vec<String>, FetchError> {
    let mut reader = NsReader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut open: Vec<(String, String)> = Vec::new();
    // (depth of the matched element, text collected so far)
    let mut capture: Option<(usize, String)> = None;
    let mut found = Vec::new();
    let mut has_root = false;

    loop {
        // copied out: the resolved event keeps the reader borrowed
        let decoder = reader.decoder();
        match reader.read_resolved_event()? {
            (ns, Event::Start(e)) => {
                has_root = true;
                open.push(qualified(decoder, ns, e.local_name().as_ref())?);
                if capture.is_none() && path.matches(&open) {
                    capture = Some((open.len(), String::new()));
                }
            }
            (ns, Event::Empty(e)) => {
                has_root = true;
                open.push(qualified(decoder, ns, e.local_name().as_ref())?);
                if capture.is_none() && path.matches(&open) {
                    found.push(String::new());
                }
                open.pop();
            }
            (_, Event::Text(t)) => {
                if let Some((_, text)) = capture.as_mut() {
                    text.push_str(&t.unescape()?);
                }
            }
            (_, Event::CData(t)) => {
                if let Some((_, text)) = capture.as_mut() {
                    text.push_str(&decoder.decode(&t)?);
                }
            }
            (_, Event::End(_)) => {
                if matches!(capture, Some((depth, _)) if depth == open.len()) {
                    if let Some((_, text)) = capture.take() {
                        found.push(text.trim().to_string());
                    }
                }
                open.pop();
            }
            (_, Event::Eof) => break,
            _ => {}
        }
    }

    if !has_root {
        return Err(FetchError::NoXmlRoot);
    }
    Ok(found)
}

fn qualified(
    decoder: Decoder,
    ns: ResolveResult,
    local: &[u8],
) -> Result<(String, String), FetchError> {
    let uri = match ns {
        ResolveResult::Bound(Namespace(uri)) => decoder.decode(uri)?.into_owned(),
        _ => String::new(),
    };
    Ok((uri, decoder.decode(local)?.into_owned()))
}

/// Client for the statistical units WMS.
pub struct FeatureLookup {
    fetcher: Fetcher,
    url: String,
    path: NamespacePath,
}

impl FeatureLookup {
    pub fn new(fetcher: Fetcher, url: impl Into<String>) -> Result<Self, EnrichError> {
        let path = NamespacePath::parse(STATISTICAL_UNIT_PATH, WMS_NAMESPACES)?;
        Ok(Self {
            fetcher,
            url: url.into(),
            path,
        })
    }

    /// Statistical unit codes at a WGS-84 coordinate.
    ///
    /// An empty list means there is no feature under the point, which is
    /// not an error.
    pub async fn get_statistical_units(&self, lat: f64, lon: f64) -> Result<Vec<String>, EnrichError> {
        let url = feature_info_url(&self.url, lat, lon)?;
        let body = self.fetcher.fetch(&url, &[]).await?;

        let units = select_texts(&body, &self.path)?;
        tracing::debug!("WMS: {} statistical unit(s) at ({}, {})", units.len(), lat, lon);
        Ok(units)
    }

    /// Renders the statistical units layer around a coordinate as a PNG.
    pub async fn get_map(&self, lat: f64, lon: f64, radius: f64) -> Result<Vec<u8>, EnrichError> {
        let url = map_url(&self.url, lat, lon, radius)?;
        Ok(self.fetcher.fetch(&url, &[]).await?)
    }
}

/// WMS 1.3.0 with EPSG:4326 uses latitude-first axis order.
fn bbox(lat: f64, lon: f64, radius: f64) -> String {
    format!(
        "{},{},{},{}",
        lat - radius,
        lon - radius,
        lat + radius,
        lon + radius
    )
}

fn feature_info_url(base: &str, lat: f64, lon: f64) -> Result<Url, FetchError> {
    let bbox = bbox(lat, lon, FEATURE_INFO_RADIUS);
    let tile = FEATURE_INFO_TILE.to_string();
    let centre = (FEATURE_INFO_TILE / 2).to_string();
    Ok(Url::parse_with_params(
        base,
        &[
            ("version", "1.3.0"),
            ("request", "GetFeatureInfo"),
            ("service", "WMS"),
            ("layers", STATISTICAL_UNIT_LAYER),
            ("styles", ""),
            ("crs", "EPSG:4326"),
            ("bbox", bbox.as_str()),
            ("width", tile.as_str()),
            ("height", tile.as_str()),
            ("format", "image/png"),
            ("query_layers", STATISTICAL_UNIT_LAYER),
            ("info_format", "text/xml"),
            ("i", centre.as_str()),
            ("j", centre.as_str()),
        ],
    )?)
}

fn map_url(base: &str, lat: f64, lon: f64, radius: f64) -> Result<Url, FetchError> {
    let bbox = bbox(lat, lon, radius);
    let tile = MAP_TILE.to_string();
    Ok(Url::parse_with_params(
        base,
        &[
            ("service", "WMS"),
            ("version", "1.3.0"),
            ("request", "GetMap"),
            ("layers", STATISTICAL_UNIT_LAYER),
            ("styles", ""),
            ("crs", "EPSG:4326"),
            ("bbox", bbox.as_str()),
            ("width", tile.as_str()),
            ("height", tile.as_str()),
            ("format", "image/png"),
            ("transparent", "true"),
        ],
    )?)
}
