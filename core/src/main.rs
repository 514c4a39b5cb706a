//! MCL: a Monte Carlo localization driver.
//!
//! Runs the particle filter over a recorded dataset: a landmark map, one
//! motion command per cycle, and the vehicle-frame landmark sightings for
//! each cycle. When a ground-truth file is supplied the run is scored and the
//! position/heading RMSE reported. Per-cycle pose estimates (the
//! highest-weight particle) are written to a CSV file.

use clap::Parser;
use log::{error, info};
use std::error::Error;
use std::io::Write;
use std::path::PathBuf;

use mcl::map::Map;
use mcl::sim::{
    ControlRecord, EstimateRecord, GroundTruthRecord, ObservationRecord, SimConfig, run_simulation,
};

/// Command line arguments
#[derive(Parser)]
#[command(
    version,
    about = "Landmark-based Monte Carlo localization over a recorded dataset."
)]
struct Cli {
    /// Landmark map CSV (id,x,y)
    #[arg(long, default_value = "data/map.csv")]
    map: PathBuf,

    /// Control input CSV (velocity,yaw_rate), one row per cycle
    #[arg(long, default_value = "data/control.csv")]
    control: PathBuf,

    /// Observation CSV (step,x,y), vehicle frame, grouped by cycle index
    #[arg(long, default_value = "data/observations.csv")]
    observations: PathBuf,

    /// Ground-truth CSV (x,y,theta); enables error reporting and seeds the
    /// initial estimate from its first row
    #[arg(long)]
    ground_truth: Option<PathBuf>,

    /// Output CSV for per-cycle pose estimates
    #[arg(short, long, default_value = "estimates.csv")]
    output: PathBuf,

    /// Particle population size
    #[arg(long, default_value_t = 100)]
    num_particles: usize,

    /// Cycle duration in seconds
    #[arg(long, default_value_t = 0.1)]
    dt: f64,

    /// Maximum sensing distance in meters
    #[arg(long, default_value_t = 50.0)]
    sensor_range: f64,

    /// Initialization / process noise standard deviations: x y theta
    #[arg(long, num_args = 3, default_values_t = [0.3, 0.3, 0.01])]
    pose_std: Vec<f64>,

    /// Landmark measurement standard deviations: x y
    #[arg(long, num_args = 2, default_values_t = [0.3, 0.3])]
    measurement_std: Vec<f64>,

    /// RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logger(log_level: &str) {
    let level = log_level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
        log::LevelFilter::Info
    });
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.args()
        )
    });
    builder.init();
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let map = Map::from_csv(&cli.map)?;
    info!("loaded {} landmarks from {}", map.len(), cli.map.display());

    let controls = ControlRecord::from_csv(&cli.control)?;
    let observation_records = ObservationRecord::from_csv(&cli.observations)?;
    let observations = ObservationRecord::group_by_step(&observation_records, controls.len());
    info!(
        "loaded {} control cycles and {} observations",
        controls.len(),
        observation_records.len()
    );

    let ground_truth = match &cli.ground_truth {
        Some(path) => Some(GroundTruthRecord::from_csv(path)?),
        None => None,
    };

    let config = SimConfig {
        num_particles: cli.num_particles,
        dt: cli.dt,
        sensor_range: cli.sensor_range,
        pose_std: cli
            .pose_std
            .as_slice()
            .try_into()
            .expect("clap enforces three pose std values"),
        measurement_std: cli
            .measurement_std
            .as_slice()
            .try_into()
            .expect("clap enforces two measurement std values"),
        seed: cli.seed,
    };

    let summary = run_simulation(
        &config,
        &map,
        &controls,
        &observations,
        ground_truth.as_deref(),
    )?;

    if let Some(final_estimate) = summary.estimates.last() {
        info!(
            "final estimate: ({:.3}, {:.3}, {:.3})",
            final_estimate.x, final_estimate.y, final_estimate.theta
        );
    }
    match (summary.position_rmse, summary.heading_rmse) {
        (Some(position), Some(heading)) => {
            info!("position RMSE: {position:.3} m, heading RMSE: {heading:.4} rad");
        }
        _ => info!("no ground truth supplied; skipping error report"),
    }

    EstimateRecord::to_csv(&summary.estimates, &cli.output)?;
    info!(
        "wrote {} estimates to {}",
        summary.estimates.len(),
        cli.output.display()
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logger(&cli.log_level);
    if let Err(err) = run(&cli) {
        error!("localization run failed: {err}");
        std::process::exit(1);
    }
}
