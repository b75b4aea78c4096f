use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mobiscore_enrich::batch::{self, BatchOptions, BatchSummary};
use mobiscore_enrich::config::{AddressSource, Config};
use mobiscore_enrich::enrichment::EnrichmentPipeline;
use mobiscore_enrich::features::DEFAULT_MAP_RADIUS;

#[derive(Parser, Debug)]
#[command(name = "mobiscore", version, about = "Enrich addresses with the Flemish mobility score")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Geocode addresses and add score and statistical sector
    Addresses(AddressArgs),
    /// Score `su,name,lon,lat` records without geocoding
    Coordinates(CoordinateArgs),
    /// Save a PNG of the statistical sectors around a point
    Map(MapArgs),
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Value separator
    #[arg(short, long, default_value = ";")]
    separator: String,

    /// Decimal point
    #[arg(short, long, default_value = ",")]
    decimal: String,

    /// Output file, `-` for stdout
    #[arg(short, long, default_value = "-")]
    output: String,
}

#[derive(Args, Debug)]
struct AddressArgs {
    /// Input file, one record per line
    input: PathBuf,

    /// Input field numbers (1-based) making up the address
    #[arg(short, long, value_delimiter = ',', default_value = "1,2,3")]
    fields: Vec<usize>,

    #[command(flatten)]
    output: OutputArgs,

    /// Google API key; enables Google geocoding as last resort
    #[arg(short, long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    google_api_key: Option<String>,

    /// Address written to the output
    #[arg(long, value_enum, default_value_t = AddressSource::Formatted)]
    address_source: AddressSource,

    /// Do not retry with Geopunt's suggested address
    #[arg(long)]
    no_suggestions: bool,

    /// Quote every value
    #[arg(long)]
    quote: bool,
}

#[derive(Args, Debug)]
struct CoordinateArgs {
    /// Input file with `su,name,lon,lat` lines
    input: PathBuf,

    /// Input field separator
    #[arg(long, default_value = ",")]
    input_separator: String,

    #[command(flatten)]
    output: OutputArgs,

    /// Only quote values that contain the separator
    #[arg(long)]
    no_quote: bool,
}

#[derive(Args, Debug)]
struct MapArgs {
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    /// Half the side of the bounding box, in degrees
    #[arg(long, default_value_t = DEFAULT_MAP_RADIUS)]
    radius: f64,

    /// Output PNG file
    #[arg(short, long, default_value = "map.png")]
    output: PathBuf,
}

/// Main entry point.
///
/// Logs go to stderr so the CSV on stdout stays clean.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mobiscore_enrich=info,mobiscore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Command::Addresses(args) => {
            if args.google_api_key.is_some() {
                config.google_api_key = args.google_api_key.filter(|k| !k.trim().is_empty());
            }
            config.use_suggestions = !args.no_suggestions;
            config.address_source = args.address_source;

            let options = BatchOptions {
                fields: to_indices(&args.fields)?,
                input_separator: args.output.separator.clone(),
                separator: args.output.separator,
                decimal: args.output.decimal,
                quote: args.quote,
            };
            let pipeline = EnrichmentPipeline::new(&config)?;
            let input = open_input(&args.input)?;
            let mut out = open_output(&args.output.output)?;

            let summary = batch::run_addresses(&pipeline, &options, input, &mut out).await?;
            log_summary(&summary);
        }
        Command::Coordinates(args) => {
            let options = BatchOptions {
                fields: Vec::new(),
                input_separator: args.input_separator,
                separator: args.output.separator,
                decimal: args.output.decimal,
                quote: !args.no_quote,
            };
            let pipeline = EnrichmentPipeline::new(&config)?;
            let input = open_input(&args.input)?;
            let mut out = open_output(&args.output.output)?;

            let summary = batch::run_coordinates(&pipeline, &options, input, &mut out).await?;
            log_summary(&summary);
        }
        Command::Map(args) => {
            let pipeline = EnrichmentPipeline::new(&config)?;
            let png = pipeline.map(args.lat, args.lon, args.radius).await?;
            std::fs::write(&args.output, &png)
                .with_context(|| format!("Failed to write {}", args.output.display()))?;
            tracing::info!("Wrote {} bytes to {}", png.len(), args.output.display());
        }
    }

    Ok(())
}

fn to_indices(fields: &[usize]) -> anyhow::Result<Vec<usize>> {
    fields
        .iter()
        .map(|&f| {
            f.checked_sub(1)
                .ok_or_else(|| anyhow::anyhow!("Field numbers start at 1"))
        })
        .collect()
}

fn open_input(path: &Path) -> anyhow::Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn open_output(target: &str) -> anyhow::Result<Box<dyn Write>> {
    if target == "-" {
        return Ok(Box::new(BufWriter::new(io::stdout())));
    }
    let file = File::create(target).with_context(|| format!("Failed to create {}", target))?;
    Ok(Box::new(BufWriter::new(file)))
}

fn log_summary(summary: &BatchSummary) {
    tracing::info!(
        "Processed {} record(s): {} enriched, {} failed",
        summary.processed,
        summary.succeeded,
        summary.failed
    );
}
