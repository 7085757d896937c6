#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI for building the census tract to fire response area crosswalk.
//!
//! `run` loads the boundary files named in the pipeline config, builds
//! and normalizes the crosswalk, apportions tract population and housing
//! to response areas and writes the outputs. `validate` stops after
//! checking the input geometries. `show-config` prints the effective
//! configuration.
//!
//! Uses `indicatif-log-bridge` (via [`fire_resource_cli_utils::init_logger`])
//! so log lines and the progress bar never fight for the terminal.

mod config;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use fire_resource_cli_utils::TractProgress;
use fire_resource_crosswalk::export::write_outputs;
use fire_resource_crosswalk::progress::null_progress;
use fire_resource_crosswalk::run_crosswalk;
use fire_resource_geography::load::{load_source_regions, load_target_regions};
use fire_resource_geography_models::{RegionRole, SourceRegion, TargetRegion};
use fire_resource_spatial::repair::{GeometryStatus, validate};

use crate::config::PipelineConfig;

#[derive(Parser)]
#[command(
    name = "fire_resource_cli",
    about = "Census tract to fire response area crosswalk"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the crosswalk, apportion tract attributes and write outputs
    Run {
        /// Pipeline config (TOML). Defaults to the built-in config
        #[arg(long)]
        config: Option<PathBuf>,
        /// Overrides `outputs.dir` from the config
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },
    /// Load the inputs and report geometry problems without writing outputs
    Validate {
        /// Pipeline config (TOML). Defaults to the built-in config
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the effective pipeline config
    ShowConfig {
        /// Pipeline config (TOML). Defaults to the built-in config
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = fire_resource_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            output_dir,
            no_progress,
        } => {
            let mut config = PipelineConfig::load(config.as_deref())?;
            if let Some(dir) = output_dir {
                config.outputs.dir = dir;
            }
            let progress = if no_progress {
                null_progress()
            } else {
                TractProgress::attach(&multi, "Preparing response areas")
            };
            run(&config, progress.as_ref())?;
        }
        Commands::Validate { config } => {
            let config = PipelineConfig::load(config.as_deref())?;
            validate_inputs(&config)?;
        }
        Commands::ShowConfig { config } => {
            let config = PipelineConfig::load(config.as_deref())?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn load_inputs(
    config: &PipelineConfig,
) -> Result<(Vec<SourceRegion>, Vec<TargetRegion>), Box<dyn std::error::Error>> {
    let sources = load_source_regions(
        &config.inputs.tracts,
        config.inputs.tract_attributes.as_deref(),
        &config.fields.source,
    )?;
    let targets = load_target_regions(&config.inputs.response_areas, &config.fields.target)?;
    Ok((sources, targets))
}

fn run(
    config: &PipelineConfig,
    progress: &dyn fire_resource_crosswalk::progress::ProgressCallback,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let (sources, targets) = load_inputs(config)?;

    let result = run_crosswalk(
        &sources,
        &targets,
        &config.crosswalk,
        &config.classification,
        progress,
    )?;

    let diagnostics = &result.report.diagnostics;
    if diagnostics.has_skipped() {
        log::warn!(
            "{} regions were skipped for invalid geometry; see diagnostics.json",
            diagnostics.skipped_regions.len()
        );
    }

    let paths = write_outputs(&config.outputs.dir, &result, &targets)?;
    log::info!("Crosswalk: {}", paths.crosswalk.display());
    log::info!("Apportioned estimates: {}", paths.apportioned.display());
    log::info!("Diagnostics: {}", paths.diagnostics.display());
    log::info!("Response areas: {}", paths.response_areas.display());
    log::info!("Done in {:.1}s", start.elapsed().as_secs_f64());

    Ok(())
}

/// Counts of each [`GeometryStatus`] outcome for one collection.
#[derive(Debug, Default, PartialEq, Eq)]
struct ValidationTally {
    valid: usize,
    repaired: usize,
    invalid: usize,
}

fn tally<'a>(
    role: RegionRole,
    regions: impl Iterator<Item = (&'a str, &'a geo::MultiPolygon<f64>)>,
) -> ValidationTally {
    let mut tally = ValidationTally::default();
    for (id, geometry) in regions {
        match validate(geometry) {
            GeometryStatus::Valid(_) => tally.valid += 1,
            GeometryStatus::Repaired(_) => {
                log::info!("{role} {id}: geometry repaired");
                tally.repaired += 1;
            }
            GeometryStatus::Invalid { reason } => {
                log::warn!("{role} {id}: {reason}");
                tally.invalid += 1;
            }
        }
    }
    log::info!(
        "{role}s: {} valid, {} repaired, {} unusable",
        tally.valid,
        tally.repaired,
        tally.invalid
    );
    tally
}

fn validate_inputs(config: &PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (sources, targets) = load_inputs(config)?;

    let tracts = tally(
        RegionRole::Source,
        sources.iter().map(|s| (s.id.as_str(), &s.geometry)),
    );
    let areas = tally(
        RegionRole::Target,
        targets.iter().map(|t| (t.id.as_str(), &t.geometry)),
    );

    if areas.valid + areas.repaired == 0 {
        return Err("no response area has usable geometry".into());
    }
    if tracts.valid + tracts.repaired == 0 {
        return Err("no census tract has usable geometry".into());
    }

    let population: f64 = sources.iter().map(|s| s.population).sum();
    log::info!(
        "Inputs look usable: {} census tracts ({population:.0} residents), {} response areas",
        sources.len(),
        targets.len()
    );
    Ok(())
}
