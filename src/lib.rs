//! Mobiscore Enrichment Library
//!
//! Enriches addresses (or coordinate pairs) with the Flemish mobility score
//! and the statistical sector they fall in, one CSV row per input record.
//!
//! # Modules
//!
//! - `core`: Enrichment workflow, models and errors.
//! - `integrations`: Upstream service clients.
//! - `batch`: Line-by-line batch driver.
//! - `config`: Configuration management.
//! - `enrichment`: Per-record enrichment pipeline.
//! - `errors`: Error handling types.
//! - `features`: Statistical unit lookup (WMS).
//! - `fetcher`: HTTP GET with gzip decoding.
//! - `geocoding`: Address resolution with provider fallback.
//! - `models`: Domain models and upstream wire types.
//! - `output`: CSV value formatting.
//! - `score`: Mobility score client.

pub mod core;
pub mod integrations;

pub mod batch;
pub mod config;
pub mod enrichment;
pub mod errors;
pub mod features;
pub mod fetcher;
pub mod geocoding;
pub mod models;
pub mod output;
pub mod score;
