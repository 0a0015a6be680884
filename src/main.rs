// src/main.rs - Command-line entry point: simulate one gain set or tune new ones
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use hotend_tuner::config::{self, Config};
use hotend_tuner::tuning::control::GenerationReport;
use hotend_tuner::{
    CancelToken, CostEvaluator, OptimizationResult, ParameterSet, PidTuner, SearchControl, Simulator, Stability,
    TuningProblem,
};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Hotend PID simulator and gain tuner
#[derive(Parser, Debug)]
#[command(name = "hotend-tuner", version, about = "Simulate a PID-controlled hotend and search for better gains.")]
struct Cli {
    /// Path to a TOML config file (overrides defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Parameter override (e.g. --param controller.setpoint=240)
    #[arg(long, value_parser = parse_key_val, number_of_values = 1)]
    param: Vec<(String, String)>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Simulate the configured gains and report the trajectory cost
    Simulate {
        /// Write every sample to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Search for gains that minimize the trajectory cost
    Tune {
        /// Seed for a reproducible search
        #[arg(long)]
        seed: Option<u64>,
        /// Stop after this many seconds and report the best gains so far
        #[arg(long)]
        time_limit: Option<f64>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    Defaults,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.find('=') {
        Some(pos) => Ok((s[..pos].to_string(), s[pos + 1..].to_string())),
        None => Err(format!("Invalid KEY=VAL: no `=` found in '{}'.", s)),
    }
}

#[derive(Serialize)]
struct TuneReport<'a> {
    result: &'a OptimizationResult,
    parameters: &'a ParameterSet,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    let config = build_config(&cli)?;

    match cli.command {
        Commands::Simulate { output } => simulate(&config, output),
        Commands::Tune { seed, time_limit, json } => tune(&config, seed, time_limit, json).await,
        Commands::Defaults => {
            println!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn build_config(cli: &Cli) -> Result<Config, BoxError> {
    let mut config = match &cli.config {
        Some(path) => {
            let path = path.to_str().ok_or("config path is not valid UTF-8")?;
            tracing::info!("Loading configuration from: {}", path);
            config::load_config(path)?
        }
        None => Config::default(),
    };

    for (key, value) in &cli.param {
        tracing::debug!("Override param: {}={}", key, value);
        config.apply_override(key, value).map_err(|e| {
            tracing::error!("Failed to apply override {}={}: {}", key, value, e);
            e
        })?;
    }

    config.validate()?;
    Ok(config)
}

fn simulate(config: &Config, output: Option<PathBuf>) -> Result<(), BoxError> {
    let params = config.parameter_set();
    tracing::info!("Simulating {} at setpoint {:.1}C", params.gains, params.setpoint);

    let trajectory = Simulator::new(params.clone())?
        .with_grid(config.time_grid()?)
        .with_initial_state(config.initial_state())
        .with_tolerances(config.tolerances())
        .run();
    let cost = CostEvaluator::default().evaluate(&trajectory, params.setpoint);

    if let Some(path) = output {
        let mut writer = csv::Writer::from_path(&path)?;
        for sample in trajectory.samples() {
            writer.serialize(sample)?;
        }
        writer.flush()?;
        tracing::info!("Wrote {} samples to {}", trajectory.len(), path.display());
    }

    match trajectory.stability() {
        Stability::Stable => println!("stable over {} samples", trajectory.len()),
        Stability::Unstable { time } => println!("UNSTABLE at t = {:.3}s after {} samples", time, trajectory.len()),
    }
    if let (Some(last), Some(peak)) = (trajectory.final_temperature(), trajectory.peak_temperature()) {
        println!("final temperature: {:.2}C, peak: {:.2}C", last, peak);
    }
    println!(
        "cost: {:.6e} (tracking {:.6e}, overshoot {:.3}, stabilization {:.3}, oscillation {:.3})",
        cost.total, cost.tracking_error, cost.overshoot_penalty, cost.stabilization_penalty, cost.oscillation_penalty
    );
    Ok(())
}

async fn tune(config: &Config, seed: Option<u64>, time_limit: Option<f64>, json: bool) -> Result<(), BoxError> {
    let problem = TuningProblem::from_parameters(config.parameter_set())?
        .with_grid(config.time_grid()?)
        .with_initial_state(config.initial_state())
        .with_tolerances(config.tolerances());

    let mut tuner_config = config.tuner_config()?;
    if seed.is_some() {
        tuner_config.seed = seed;
    }
    if let Some(secs) = time_limit {
        tuner_config.time_budget = Some(Duration::try_from_secs_f64(secs)?);
    }

    let token = CancelToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current generation");
            signal_token.cancel();
        }
    });

    let (result, parameters) = tokio::task::spawn_blocking(move || {
        PidTuner::new(problem)
            .with_config(tuner_config)
            .with_cancel_token(token)
            .on_generation(log_progress)
            .tune_parameters()
    })
    .await??;

    if json {
        let report = TuneReport {
            result: &result,
            parameters: &parameters,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", result.summary());
    }
    Ok(())
}

fn log_progress(report: &GenerationReport) -> SearchControl {
    if report.generation % 10 == 0 {
        tracing::info!(
            "generation {}: best cost {:.6e} at {:?} ({:.1}s)",
            report.generation,
            -report.best_fitness,
            report.best_candidate,
            report.elapsed.as_secs_f64()
        );
    }
    SearchControl::Continue
}
