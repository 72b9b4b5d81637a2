#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for landslide risk mapping.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use landslide_cli_utils::IndicatifProgress;
use landslide_covariate::extract::CancelFlag;
use landslide_covariate::http::{DEFAULT_REQUEST_TIMEOUT, HttpSampler};
use landslide_pipeline::config::{ModelSettings, SamplerSettings, open_meteo_url};
use landslide_pipeline::output::{self, ExtractionFile};
use landslide_pipeline::region::{Region, all_regions};
use landslide_pipeline::{ConfigError, PipelineContext, ThresholdProfile};
use landslide_rainfall::open_meteo::OpenMeteoClient;
use landslide_risk_models::LabeledCell;

#[derive(Parser)]
#[command(name = "landslide", about = "Landslide risk mapping over a regular grid")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured study regions
    Regions,
    /// Generate a region's sampling grid
    Grid {
        /// Region identifier (e.g., "nan")
        #[arg(long, default_value = "nan")]
        region: String,
        /// Write the cells as JSON to this path
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Extract covariates for every grid cell and save the valid ones
    Extract {
        /// Region identifier (e.g., "nan")
        #[arg(long, default_value = "nan")]
        region: String,
        #[command(flatten)]
        sampler: SamplerArgs,
        /// Where to write the extraction
        #[arg(long, default_value = "output/extraction.json")]
        output: PathBuf,
    },
    /// Classify a saved extraction with the rainfall it already carries
    Score {
        /// Extraction written by `extract` or `run`
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        model: ModelArgs,
        /// Threshold profile (`batch` or `serving`)
        #[arg(long, default_value = "batch")]
        profile: ThresholdProfile,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Classify a saved extraction with live rainfall from Open-Meteo
    Rescore {
        /// Extraction written by `extract` or `run`
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        model: ModelArgs,
        /// Forecast endpoint (overrides `LANDSLIDE_OPEN_METEO_URL`)
        #[arg(long)]
        open_meteo_url: Option<String>,
        /// Threshold profile (`batch` or `serving`)
        #[arg(long, default_value = "serving")]
        profile: ThresholdProfile,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Grid, extract, and classify a region in one go
    Run {
        /// Region identifier (e.g., "nan")
        #[arg(long, default_value = "nan")]
        region: String,
        #[command(flatten)]
        sampler: SamplerArgs,
        #[command(flatten)]
        model: ModelArgs,
        /// Also write the raw extraction here, for later re-scoring
        #[arg(long)]
        extraction: Option<PathBuf>,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct SamplerArgs {
    /// Sampling service base URL (overrides `LANDSLIDE_SAMPLER_URL`)
    #[arg(long)]
    sampler_url: Option<String>,
    /// Sampling service token (overrides `LANDSLIDE_SAMPLER_TOKEN`)
    #[arg(long)]
    sampler_token: Option<String>,
}

#[derive(Args)]
struct ModelArgs {
    /// Logistic model JSON (overrides `LANDSLIDE_MODEL_PATH`)
    #[arg(long)]
    model: Option<PathBuf>,
    /// Feature scaler JSON (overrides `LANDSLIDE_SCALER_PATH`)
    #[arg(long)]
    scaler: Option<PathBuf>,
}

#[derive(Args)]
struct OutputArgs {
    /// Labeled cells as JSON
    #[arg(long, default_value = "output/risk.json")]
    output: PathBuf,
    /// Labeled cells as a `GeoJSON` `FeatureCollection`
    #[arg(long)]
    geojson: Option<PathBuf>,
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = landslide_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Regions => {
            println!("{:<10} {:<30} CELL (m)  BATCH", "ID", "NAME");
            println!("{}", "-".repeat(60));
            for region in all_regions() {
                println!(
                    "{:<10} {:<30} {:<9} {}",
                    region.id, region.name, region.cell_size_m, region.batch_size
                );
            }
        }
        Commands::Grid { region, output } => {
            let region = find_region(&region)?;
            let cells = landslide_grid::generate_grid(&region.bbox, region.cell_size_m);
            log::info!("{}: {} cells at {} m", region.name, cells.len(), region.cell_size_m);
            if let Some(path) = output {
                ensure_parent(&path)?;
                std::fs::write(&path, serde_json::to_string(&cells)?)?;
                log::info!("Wrote grid to {}", path.display());
            }
        }
        Commands::Extract {
            region,
            sampler,
            output,
        } => {
            let region = find_region(&region)?;
            let settings = SamplerSettings::resolve(sampler.sampler_url, sampler.sampler_token)?;
            let http =
                HttpSampler::new(&settings.url, &settings.token, DEFAULT_REQUEST_TIMEOUT)?;

            let start = Instant::now();
            let today = chrono::Utc::now().date_naive();
            let spec = landslide_pipeline::covariate_spec(&region, today);
            let cells = landslide_grid::generate_grid(&region.bbox, region.cell_size_m);
            let extraction = landslide_pipeline::extract_cells(
                &region,
                &spec,
                &http,
                &cells,
                IndicatifProgress::batches_bar(&multi, "Extracting covariates"),
                cancel_on_ctrl_c(),
            )
            .await;

            output::write_extraction(
                &output,
                &ExtractionFile {
                    region: region.id.clone(),
                    summary: extraction.summary,
                    cells: extraction.cells,
                },
            )?;
            log::info!("Extraction finished in {:.1}s", start.elapsed().as_secs_f64());
        }
        Commands::Score {
            input,
            model,
            profile,
            output,
        } => {
            let extraction = output::read_extraction(&input)?;
            let region = find_region(&extraction.region)?;
            let settings = ModelSettings::resolve(model.model, model.scaler)?;
            let classifier = landslide_pipeline::load_classifier(&region, &settings)?;

            let labeled = landslide_pipeline::score_cells(
                &classifier,
                &region,
                &extraction.cells,
                profile,
            )?;
            write_outputs(&output, &labeled)?;
        }
        Commands::Rescore {
            input,
            model,
            open_meteo_url: url,
            profile,
            output,
        } => {
            let extraction = output::read_extraction(&input)?;
            let region = find_region(&extraction.region)?;
            let settings = ModelSettings::resolve(model.model, model.scaler)?;
            let classifier = landslide_pipeline::load_classifier(&region, &settings)?;
            let provider = OpenMeteoClient::new(&open_meteo_url(url))?;

            let labeled = landslide_pipeline::rescore_cells(
                &classifier,
                &region,
                &extraction.cells,
                &provider,
                profile,
            )
            .await?;
            write_outputs(&output, &labeled)?;
        }
        Commands::Run {
            region,
            sampler,
            model,
            extraction,
            output,
        } => {
            let region = find_region(&region)?;
            let sampler = SamplerSettings::resolve(sampler.sampler_url, sampler.sampler_token)?;
            let model = ModelSettings::resolve(model.model, model.scaler)?;
            let context = PipelineContext::from_settings(region, &sampler, &model)?;

            let start = Instant::now();
            let report = context
                .run(
                    IndicatifProgress::batches_bar(&multi, "Extracting covariates"),
                    cancel_on_ctrl_c(),
                )
                .await?;

            if let Some(path) = extraction {
                output::write_extraction(
                    &path,
                    &ExtractionFile {
                        region: context.region().id.clone(),
                        summary: report.summary,
                        cells: report.extracted,
                    },
                )?;
            }
            write_outputs(&output, &report.labeled)?;

            log::info!(
                "Run finished in {:.1}s: {}/{} cells valid, {} high / {} medium / {} low",
                start.elapsed().as_secs_f64(),
                report.summary.valid_cells,
                report.summary.total_cells,
                report.tiers.high,
                report.tiers.medium,
                report.tiers.low
            );
        }
    }

    Ok(())
}

fn find_region(id: &str) -> Result<Region, ConfigError> {
    landslide_pipeline::region::region(id).ok_or_else(|| ConfigError::UnknownRegion {
        id: id.to_string(),
    })
}

/// Returns a flag that is set on the first Ctrl-C. The batch in flight
/// completes and everything extracted so far is kept.
fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; stopping after the current batch");
            flag.cancel();
        }
    });
    cancel
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn write_outputs(
    args: &OutputArgs,
    labeled: &[LabeledCell],
) -> Result<(), Box<dyn std::error::Error>> {
    output::write_json(&args.output, labeled)?;
    if let Some(path) = &args.geojson {
        output::write_geojson(path, labeled)?;
    }
    Ok(())
}
