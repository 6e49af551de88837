//! muograph CLI: muon scattering tomography from detector hit files.
//!
//! `muograph info` summarizes the tracks of a hit file, `muograph
//! reconstruct` runs the POCA reconstruction and writes per-voxel scores.
#![allow(clippy::too_many_lines)]

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, LevelFilter};
use muograph_algorithms::{
    Distribution, Poca, PocaConfig, ScoreFeature, ScoreMethod, Tracking, TrackingConfig, Vec3,
    VoxelGrid,
};
use muograph_io::{read_hits_csv, save_json, write_poca_points_csv, write_voxel_map_csv, HitFile};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] muograph_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] muograph_core::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Per-event quantity scored in each voxel.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Feature {
    /// 3D scattering angle
    Dtheta,
    /// Scattering angle projected on x-z
    DthetaX,
    /// Scattering angle projected on y-z
    DthetaY,
    /// Zenith angle of the incoming track
    ThetaIn,
    /// Zenith angle of the outgoing track
    ThetaOut,
    /// Azimuth of the incoming track
    PhiIn,
    /// Azimuth of the outgoing track
    PhiOut,
    /// Muon energy (requires an E column)
    Energy,
}

impl From<Feature> for ScoreFeature {
    fn from(feature: Feature) -> Self {
        match feature {
            Feature::Dtheta => Self::Dtheta,
            Feature::DthetaX => Self::DthetaX,
            Feature::DthetaY => Self::DthetaY,
            Feature::ThetaIn => Self::ThetaIn,
            Feature::ThetaOut => Self::ThetaOut,
            Feature::PhiIn => Self::PhiIn,
            Feature::PhiOut => Self::PhiOut,
            Feature::Energy => Self::Energy,
        }
    }
}

/// Per-voxel reduction.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Method {
    Median,
    Mean,
    /// Quantile given by --quantile
    Quantile,
    Variance,
    Std,
    Max,
    Min,
    Sum,
}

impl Method {
    fn to_score_method(self, q: f64) -> Result<ScoreMethod> {
        Ok(match self {
            Self::Median => ScoreMethod::Median,
            Self::Mean => ScoreMethod::Mean,
            Self::Quantile => {
                if !(0.0..=1.0).contains(&q) {
                    return Err(CliError::InvalidArgument(format!(
                        "quantile must lie in [0, 1], got {q}"
                    )));
                }
                ScoreMethod::Quantile(q)
            }
            Self::Variance => ScoreMethod::Variance,
            Self::Std => ScoreMethod::StdDev,
            Self::Max => ScoreMethod::Max,
            Self::Min => ScoreMethod::Min,
            Self::Sum => ScoreMethod::Sum,
        })
    }
}

/// Muon scattering tomography reconstruction.
#[derive(Parser)]
#[command(name = "muograph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Run every stage on a single thread
    #[arg(long, global = true)]
    sequential: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a summary of the tracks in a hit file
    Info {
        /// Input hits CSV
        input: PathBuf,

        /// Scattering angle cut (rad) used to count scattered events
        #[arg(long, default_value = "0.005")]
        dtheta_cut: f64,
    },

    /// Reconstruct per-voxel scores with the POCA method
    Reconstruct {
        /// Input hits CSV
        input: PathBuf,

        /// VOI center (mm), as x,y,z
        #[arg(long, value_parser = parse_triplet, allow_hyphen_values = true)]
        center: [f64; 3],

        /// VOI extent (mm), as dx,dy,dz
        #[arg(long, value_parser = parse_triplet)]
        extent: [f64; 3],

        /// Voxel width (mm)
        #[arg(long)]
        voxel_width: f64,

        /// Events scattering by this angle (rad) or less are dropped
        #[arg(long, default_value = "0.005")]
        dtheta_cut: f64,

        /// Scored feature
        #[arg(short, long, value_enum, default_value = "dtheta")]
        feature: Feature,

        /// Per-voxel reduction
        #[arg(short, long, value_enum, default_value = "median")]
        method: Method,

        /// Quantile used by --method quantile
        #[arg(long, default_value = "0.5")]
        quantile: f64,

        /// Voxel scores CSV
        #[arg(short, long)]
        output: PathBuf,

        /// POCA points CSV
        #[arg(long)]
        poca_output: Option<PathBuf>,

        /// Save the tracking as JSON
        #[arg(long)]
        save_tracking: Option<PathBuf>,

        /// Save the POCA reconstruction as JSON
        #[arg(long)]
        save_poca: Option<PathBuf>,
    },
}

fn parse_triplet(s: &str) -> std::result::Result<[f64; 3], String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("{v:?}: {e}")))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    <[f64; 3]>::try_from(values)
        .map_err(|v| format!("expected 3 comma-separated values, got {}", v.len()))
}

fn load_tracking(input: &Path, parallel: bool) -> Result<Tracking> {
    let HitFile { hits, energy } = read_hits_csv(input)?;
    let config = TrackingConfig::new().with_parallel(parallel);
    Ok(Tracking::with_config(hits, energy, &config)?)
}

fn print_distribution(name: &str, d: &Distribution) {
    println!(
        "{name:<10} mean {:>9.5}  std {:>9.5}  min {:>9.5}  max {:>9.5}  ({} finite)",
        d.mean, d.std, d.min, d.max, d.count
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
    let parallel = !cli.sequential;

    match cli.command {
        Commands::Info { input, dtheta_cut } => {
            let tracking = load_tracking(&input, parallel)?;
            let summary = tracking.summary(None)?;
            let scattered = tracking.dtheta().iter().filter(|&&d| d > dtheta_cut).count();

            println!("File: {}", input.display());
            println!("Events: {}", summary.n_event);
            println!("Planes: {}", tracking.n_plane());
            println!(
                "Energy: {}",
                if tracking.energy().is_some() { "yes" } else { "no" }
            );
            print_distribution("theta_in", &summary.theta_in);
            print_distribution("theta_out", &summary.theta_out);
            print_distribution("dtheta", &summary.dtheta);
            println!("Scattered (dtheta > {dtheta_cut}): {scattered}");
        }

        Commands::Reconstruct {
            input,
            center,
            extent,
            voxel_width,
            dtheta_cut,
            feature,
            method,
            quantile,
            output,
            poca_output,
            save_tracking,
            save_poca,
        } => {
            let method = method.to_score_method(quantile)?;
            let voi = VoxelGrid::new(Vec3::from(center), Vec3::from(extent), voxel_width)?;
            info!(
                "VOI of {:?} voxels of {} mm centred on {:?}",
                voi.n_voxels(),
                voxel_width,
                center
            );

            let start = Instant::now();
            let tracking = load_tracking(&input, parallel)?;
            if let Some(path) = &save_tracking {
                save_json(&tracking, path)?;
            }

            let config = PocaConfig::new()
                .with_dtheta_cut(dtheta_cut)
                .with_parallel(parallel);
            let poca = Poca::new(tracking, voi, config)?;
            let map = poca.reconstruct_feature(feature.into(), &method, None)?;

            write_voxel_map_csv(&output, poca.voi(), &map)?;
            if let Some(path) = &poca_output {
                write_poca_points_csv(path, poca.poca_points())?;
            }
            if let Some(path) = &save_poca {
                save_json(&poca, path)?;
            }

            let in_voi = poca.mask_in_voi().iter().filter(|&&m| m).count();
            println!(
                "Reconstructed {} events in {:.2}s",
                poca.all_tracks().n_event(),
                start.elapsed().as_secs_f64()
            );
            println!("Passing dtheta cut: {}", poca.tracks().n_event());
            println!("POCA points in VOI: {in_voi}");
            println!(
                "Scored voxels: {} ({} by {:?})",
                map.hits.iter().filter(|&&h| h > 0).count(),
                ScoreFeature::from(feature).name(),
                method
            );
            println!("Scores written to {}", output.display());
        }
    }

    Ok(())
}
