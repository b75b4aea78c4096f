//! Line-by-line batch enrichment.
//!
//! Every input line produces exactly one output row. A record that fails is
//! logged with its line number and written with empty result columns; the
//! batch always carries on.
use crate::enrichment::EnrichmentPipeline;
use crate::errors::EnrichError;
use crate::models::EnrichmentResult;
use crate::output::RowFormatter;
use std::io::{BufRead, Write};

pub const ADDRESS_HEADER: &[&str] = &[
    "adres",
    "lon",
    "lat",
    "mobi_totaal",
    "mobi_gezondheid",
    "mobi_onderwijs",
    "mobi_ontspanning",
    "mobi_ov",
    "mobi_winkel",
    "su",
];

pub const COORDINATE_HEADER: &[&str] = &[
    "su",
    "naam",
    "lon",
    "lat",
    "mobi_totaal",
    "mobi_gezondheid",
    "mobi_onderwijs",
    "mobi_ontspanning",
    "mobi_ov",
    "mobi_winkel",
];

/// Batch-level settings, handed down from the CLI.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// 0-based input field indices joined into the address text.
    pub fields: Vec<usize>,
    pub input_separator: String,
    /// Output field separator.
    pub separator: String,
    /// Replacement for the decimal point in numbers.
    pub decimal: String,
    /// Quote every value instead of only those containing the separator.
    pub quote: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            fields: vec![0, 1, 2],
            input_separator: ";".to_string(),
            separator: ";".to_string(),
            decimal: ",".to_string(),
            quote: false,
        }
    }
}

impl BatchOptions {
    fn formatter(&self) -> RowFormatter {
        RowFormatter::new(self.separator.clone(), self.decimal.clone(), self.quote)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn record<T>(&mut self, outcome: &Result<T, EnrichError>) {
        self.processed += 1;
        if outcome.is_ok() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Builds the address text from the configured fields of `line`.
/// Fields past the end of the line count as empty.
pub fn extract_address(line: &str, separator: &str, fields: &[usize]) -> String {
    let parts: Vec<&str> = if separator.is_empty() {
        vec![line]
    } else {
        line.split(separator).collect()
    };
    fields
        .iter()
        .map(|&i| parts.get(i).map(|p| p.trim()).unwrap_or(""))
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Enriches one address per input line.
pub async fn run_addresses<R: BufRead, W: Write>(
    pipeline: &EnrichmentPipeline,
    options: &BatchOptions,
    input: R,
    out: &mut W,
) -> anyhow::Result<BatchSummary> {
    let formatter = options.formatter();
    let mut summary = BatchSummary::default();

    writeln!(out, "{}", formatter.header(ADDRESS_HEADER))?;

    for (index, line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = line?;
        let line = line.trim();

        let address = extract_address(line, &options.input_separator, &options.fields);
        let outcome = if address.is_empty() {
            Err(EnrichError::InvalidInput("empty address".to_string()))
        } else {
            pipeline.enrich(&address).await
        };
        summary.record(&outcome);

        let values = match outcome {
            Ok(result) => address_row(&formatter, &result),
            Err(e) => {
                report_failure(line_no, line, &e);
                let mut values = vec![String::new(); ADDRESS_HEADER.len()];
                values[0] = address;
                values
            }
        };
        writeln!(out, "{}", formatter.row(&values))?;
    }

    out.flush()?;
    Ok(summary)
}

fn address_row(formatter: &RowFormatter, result: &EnrichmentResult) -> Vec<String> {
    let mut values = vec![
        result.address.clone(),
        formatter.decimal(Some(result.lon)),
        formatter.decimal(Some(result.lat)),
    ];
    values.extend(result.mobi_score.values().iter().map(|v| formatter.decimal(*v)));
    values.push(
        result
            .primary_statistical_unit()
            .unwrap_or_default()
            .to_string(),
    );
    values
}

/// Scores `su,name,lon,lat` records; coordinates are taken as given.
pub async fn run_coordinates<R: BufRead, W: Write>(
    pipeline: &EnrichmentPipeline,
    options: &BatchOptions,
    input: R,
    out: &mut W,
) -> anyhow::Result<BatchSummary> {
    let formatter = options.formatter();
    let mut summary = BatchSummary::default();

    writeln!(out, "{}", formatter.header(COORDINATE_HEADER))?;

    for (index, line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = line?;
        let line = line.trim();

        let record = CoordinateRecord::parse(line, &options.input_separator);
        let outcome = match record.coordinates() {
            Ok((lat, lon)) => pipeline.score(lat, lon).await,
            Err(e) => Err(e),
        };
        summary.record(&outcome);

        let mut values = vec![
            record.su.to_string(),
            record.name.to_string(),
            record.lon.replace('.', &options.decimal),
            record.lat.replace('.', &options.decimal),
        ];
        match outcome {
            Ok(score) => values.extend(score.values().iter().map(|v| formatter.decimal(*v))),
            Err(e) => {
                report_failure(line_no, line, &e);
                values.resize(COORDINATE_HEADER.len(), String::new());
            }
        }
        writeln!(out, "{}", formatter.row(&values))?;
    }

    out.flush()?;
    Ok(summary)
}

/// One `su,name,lon,lat` input line.
#[derive(Debug, PartialEq)]
pub struct CoordinateRecord<'a> {
    pub su: &'a str,
    pub name: &'a str,
    pub lon: &'a str,
    pub lat: &'a str,
}

impl<'a> CoordinateRecord<'a> {
    pub fn parse(line: &'a str, separator: &str) -> Self {
        let mut fields = line.split(separator).map(str::trim);
        Self {
            su: fields.next().unwrap_or(""),
            name: fields.next().unwrap_or(""),
            lon: fields.next().unwrap_or(""),
            lat: fields.next().unwrap_or(""),
        }
    }

    /// `(lat, lon)` as numbers.
    pub fn coordinates(&self) -> Result<(f64, f64), EnrichError> {
        let parse = |name: &str, raw: &str| {
            raw.parse::<f64>()
                .map_err(|_| EnrichError::InvalidInput(format!("{} '{}' is not a number", name, raw)))
        };
        Ok((parse("lat", self.lat)?, parse("lon", self.lon)?))
    }
}

fn report_failure(line_no: usize, line: &str, error: &EnrichError) {
    tracing::warn!(
        kind = error.kind(),
        "Line {}: {}\n  {}",
        line_no,
        line,
        error
    );
}
