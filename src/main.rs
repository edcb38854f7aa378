use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use kalmanlab::config::{KinematicParameters, LinearParameters};
use kalmanlab::simulation::{NoiseSource, SeededNoise, ThreadNoise};
use kalmanlab::{Export, ModelDefinition, Session};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the filter procedure of a model as ".m" source
    Export {
        #[command(subcommand)]
        model: ModelArgs,

        /// Target path, the suggested file name if omitted
        #[arg(short, long, global = true)]
        out: Option<PathBuf>,
    },
    /// Simulate a model and filter its measurements
    Run {
        #[command(subcommand)]
        model: ModelArgs,

        /// Seed of the measurement noise, fresh entropy if omitted
        #[arg(short, long, global = true)]
        seed: Option<u64>,

        /// Print the full series as JSON instead of a summary
        #[arg(long, global = true)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ModelArgs {
    /// Position and velocity with a noisy position sensor
    Kinematic(KinematicArgs),
    /// Generic two-state model, fully observed
    Linear(LinearArgs),
}

#[derive(clap::Args, Debug)]
struct KinematicArgs {
    /// JSON parameter file, overridden by flags
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    steps: Option<usize>,
    #[arg(long)]
    dt: Option<f64>,
    /// Constant deceleration
    #[arg(long, allow_hyphen_values = true)]
    u: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    y0: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    v0: Option<f64>,
    /// Measurement noise variance
    #[arg(long)]
    r: Option<f64>,
}

#[derive(clap::Args, Debug)]
struct LinearArgs {
    /// JSON parameter file, overridden by flags
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    steps: Option<usize>,
    #[arg(long, allow_hyphen_values = true)]
    a00: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    a01: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    a10: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    a11: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    x0: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    x1: Option<f64>,
    #[arg(long = "x0-est-0", allow_hyphen_values = true)]
    x0_estimate_0: Option<f64>,
    #[arg(long = "x0-est-1", allow_hyphen_values = true)]
    x0_estimate_1: Option<f64>,
}

fn read_config(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Could not read config {}", path.display()))
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

impl ModelArgs {
    fn build(&self) -> Result<ModelDefinition> {
        match self {
            ModelArgs::Kinematic(args) => {
                let mut parameters = match &args.config {
                    Some(path) => KinematicParameters::from_json(&read_config(path)?)?,
                    None => KinematicParameters::default(),
                };
                set(&mut parameters.steps, args.steps);
                set(&mut parameters.dt, args.dt);
                set(&mut parameters.u, args.u);
                set(&mut parameters.y0, args.y0);
                set(&mut parameters.v0, args.v0);
                set(&mut parameters.r, args.r);

                Ok(ModelDefinition::kinematic(&parameters.clamped())?)
            }
            ModelArgs::Linear(args) => {
                let mut parameters = match &args.config {
                    Some(path) => LinearParameters::from_json(&read_config(path)?)?,
                    None => LinearParameters::default(),
                };
                set(&mut parameters.steps, args.steps);
                set(&mut parameters.a[0][0], args.a00);
                set(&mut parameters.a[0][1], args.a01);
                set(&mut parameters.a[1][0], args.a10);
                set(&mut parameters.a[1][1], args.a11);
                set(&mut parameters.x0[0], args.x0);
                set(&mut parameters.x0[1], args.x1);
                set(&mut parameters.x0_estimate[0], args.x0_estimate_0);
                set(&mut parameters.x0_estimate[1], args.x0_estimate_1);

                Ok(ModelDefinition::linear(&parameters.clamped())?)
            }
        }
    }
}

fn write_export(export: &Export, out: Option<PathBuf>) -> Result<()> {
    let path = out.unwrap_or_else(|| PathBuf::from(&export.file_name));
    fs::write(&path, &export.source).with_context(|| format!("Could not write {}", path.display()))?;
    info!("Wrote procedure to {}", path.display());
    Ok(())
}

fn run(session: &mut Session, noise: &mut impl NoiseSource, json: bool) -> Result<()> {
    let name = session.model().name().to_string();
    let dimension = session.model().get_state_dimension();
    session.generate();
    let result = session.run(noise)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result.to_report())?);
        return Ok(());
    }

    let last = result.len() - 1;
    let half = result.len() / 2;
    println!("Model: {}", name);
    println!("Steps: {}", result.len());
    println!("Final state:    {}", result.trajectory[last]);
    println!("Final estimate: {}", result.estimates[last]);
    println!("Final covariance:\n{}", result.final_covariance);
    for index in 0..dimension {
        println!(
            "Component {}: RMSE {:.6}, mean |error| first half {:.6}, second half {:.6}",
            index,
            result.root_mean_square_error(index).unwrap_or(f64::NAN),
            result.mean_absolute_error(index, 0..half).unwrap_or(f64::NAN),
            result.mean_absolute_error(index, half..result.len()).unwrap_or(f64::NAN),
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Command::Export { model, out } => {
            let model = model.build()?;
            write_export(&Export::for_model(&model), out)?;
        }
        Command::Run { model, seed, json } => {
            let mut session = Session::new(model.build()?);
            match seed {
                Some(seed) => {
                    info!("Seeding measurement noise with {}", seed);
                    run(&mut session, &mut SeededNoise::from_seed(seed), json)?
                }
                None => run(&mut session, &mut ThreadNoise::default(), json)?,
            }
        }
    }

    Ok(())
}
