//! Tracking Experiment CLI.
//!
//! Commands:
//! - run: Run one simulated session (staircases or constant stimuli)
//! - trajectory: Generate one tracking stimulus and report on its motion
//! - summarize: Print the thresholds of a saved session

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use threshold_kernel::{ConditionKind, SelectionPolicy, Side};
use tracking_experiment::experiment::{
    Block, ExperimentRunner, ExperimentRunnerConfig, Paradigm, TimeoutPolicy,
};
use tracking_experiment::observer::{Observer, PsychometricObserver, ThresholdObserver};
use tracking_experiment::results::{ExperimentResult, TrialLog};
use tracking_experiment::stimulus::TrackingStimulus;

/// Generate a timestamped output path from the given path.
/// e.g., "session.json" -> "session-20260108-010530.json"
fn timestamped_path(path: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d-%H%M%S");
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("session");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("json");
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!("{}-{}.{}", stem, timestamp, ext))
}

#[derive(Parser)]
#[command(name = "tracking-experiment")]
#[command(version)]
#[command(about = "Adaptive staircase threshold sessions with a simulated observer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one session
    Run {
        /// JSON configuration file (missing fields take defaults)
        #[arg(long, env = "TRACKING_CONFIG")]
        config: Option<PathBuf>,

        /// Paradigm: tracking, flicker, or contrast
        #[arg(long)]
        paradigm: Option<String>,

        /// Method: staircase or constant (fixed intensities)
        #[arg(long, default_value = "staircase")]
        method: String,

        /// Condition block: unilateral, bilateral, or both
        #[arg(long)]
        block: Option<String>,

        /// Staircase selection: random or sequential
        #[arg(long)]
        selection: Option<String>,

        /// Timeout handling: skip or incorrect
        #[arg(long)]
        timeouts: Option<String>,

        /// Probability of a catch trial
        #[arg(long)]
        catch_probability: Option<f64>,

        /// Number of training trials
        #[arg(long)]
        training: Option<usize>,

        /// Simulated observer: psychometric or threshold
        #[arg(long, default_value = "psychometric")]
        observer: String,

        /// Observer threshold (intensity of 50% errors)
        #[arg(long)]
        observer_mean: Option<f64>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Output file for results (a timestamp is appended)
        #[arg(long, default_value = "session.json")]
        output: PathBuf,

        /// JSON-lines trial log written as the session runs
        #[arg(long)]
        trial_log: Option<PathBuf>,
    },

    /// Generate one tracking stimulus
    Trajectory {
        /// Condition kind: unilateral or bilateral
        #[arg(long, default_value = "unilateral")]
        kind: String,

        /// Reported side: left or right
        #[arg(long, default_value = "left")]
        side: String,

        /// Body speed in cm/s
        #[arg(long, default_value = "5.0")]
        speed: f64,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Write the full stimulus as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print thresholds from a saved session
    Summarize {
        /// Session result file
        input: PathBuf,

        /// Bins for the pooled psychometric fit
        #[arg(long, default_value = "10")]
        bins: usize,

        /// Response level at which to read the fitted threshold
        #[arg(long, default_value = "0.5")]
        level: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    match cli.command {
        Commands::Run {
            config,
            paradigm,
            method,
            block,
            selection,
            timeouts,
            catch_probability,
            training,
            observer,
            observer_mean,
            seed,
            output,
            trial_log,
        } => {
            let mut config = match config {
                Some(path) => ExperimentRunnerConfig::load(&path)?,
                None => ExperimentRunnerConfig::default(),
            };
            if let Some(p) = paradigm {
                config.paradigm = parse_paradigm(&p)?;
            }
            if let Some(b) = block {
                config.block = parse_block(&b)?;
            }
            if let Some(s) = selection {
                config.selection = parse_selection(&s)?;
            }
            if let Some(t) = timeouts {
                config.timeout_policy = parse_timeout_policy(&t)?;
            }
            if let Some(p) = catch_probability {
                config.catch_probability = p;
            }
            if let Some(n) = training {
                config.training_trials = n;
            }
            if let Some(m) = observer_mean {
                config.observer.mean = m;
            }
            if seed.is_some() {
                config.seed = seed;
                config.observer.seed = seed.map(|s| s.wrapping_add(2));
            }

            let constant = parse_method(&method)?;
            let mut observer: Box<dyn Observer> = match observer.to_lowercase().as_str() {
                "psychometric" | "psy" => Box::new(PsychometricObserver::new(config.observer.clone())?),
                "threshold" | "ideal" => {
                    Box::new(ThresholdObserver::new(config.observer.mean, config.polarity)?)
                }
                _ => anyhow::bail!("Unknown observer: {}. Valid: psychometric, threshold", observer),
            };
            let mut log = trial_log.as_deref().map(TrialLog::create).transpose()?;
            let runner = ExperimentRunner::new(config);
            let output_path = timestamped_path(&output);

            println!("\n=== Session Result ===");
            println!("Paradigm: {}", runner.config().paradigm.name());
            println!("Block: {}", runner.config().block.name());
            println!("Selection: {}", runner.config().selection.name());
            println!("Timeouts: {}", runner.config().timeout_policy.name());
            println!();
            if constant {
                let result = runner.run_constant(observer.as_mut(), log.as_mut())?;
                result.save(&output_path)?;
                print!("{}", result.format_summary());
            } else {
                let result = runner.run(observer.as_mut(), log.as_mut())?;
                result.save(&output_path)?;
                print!("{}", result.format_summary());
            }
            println!("\nResults saved to: {}", output_path.display());
            if let Some(log) = &log {
                println!("Trial log: {} ({} trials)", log.path().display(), log.written());
            }
        }
        Commands::Trajectory {
            kind,
            side,
            speed,
            seed,
            output,
        } => {
            let side = parse_side(&side)?;
            let kind = parse_kind(&kind, side)?;
            let config = ExperimentRunnerConfig::default();
            let mut rng = match seed {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_rng(&mut rand::rng()),
            };

            info!(kind = kind.name(), side = side.name(), speed, "Generating stimulus");
            let stimulus = TrackingStimulus::generate(&mut rng, &config.stimulus, kind, side, speed)?;
            let stats = stimulus.stats();

            println!("\n=== Tracking Stimulus ===");
            println!("Frames: {} ({} cue frames)", stats.frames, stimulus.cue.total_frames());
            println!("Bodies: {}", stats.bodies);
            println!("Targets: {:?}", stimulus.targets.iter().map(|b| b.0).collect::<Vec<_>>());
            println!("Probe: {} (target: {})", stimulus.probe.0, stimulus.probe_is_target());
            println!("Mean step: {:.5} (nominal {:.5})", stats.mean_step, speed / config.stimulus.frame_rate);
            println!("Max step error: {:.2e}", stats.max_step_error);
            println!("Min separation: {:.3}", stats.min_separation);
            println!("Samples outside region: {}", stats.samples_outside_region);

            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&stimulus)?;
                std::fs::write(&path, json)?;
                println!("Stimulus saved to: {}", path.display());
            }
        }
        Commands::Summarize { input, bins, level } => {
            let result = ExperimentResult::load(&input)?;
            println!("\n=== {} ===", input.display());
            println!(
                "Paradigm: {}, block: {}, observer: {}",
                result.config.paradigm.name(),
                result.config.block.name(),
                result.observer
            );
            print!("{}", result.format_summary());
            match result.pooled_fit(bins) {
                Ok(fit) => {
                    let threshold = fit
                        .inverse(level)
                        .map(|t| format!("{t:.3}"))
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "Pooled fit: mean {:.3}, sd {:.3}, threshold at {} = {}",
                        fit.mean, fit.std_dev, level, threshold
                    );
                }
                Err(e) => println!("Pooled fit unavailable: {e}"),
            }
        }
    }

    Ok(())
}

fn parse_paradigm(s: &str) -> Result<Paradigm> {
    match s.to_lowercase().as_str() {
        "tracking" | "track" => Ok(Paradigm::Tracking),
        "flicker" | "flick" => Ok(Paradigm::Flicker),
        "contrast" => Ok(Paradigm::Contrast),
        _ => anyhow::bail!(
            "Unknown paradigm: {}. Valid: {}",
            s,
            Paradigm::all().iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
        ),
    }
}

/// `true` for constant stimuli.
fn parse_method(s: &str) -> Result<bool> {
    match s.to_lowercase().as_str() {
        "staircase" | "stairs" => Ok(false),
        "constant" | "fixed" => Ok(true),
        _ => anyhow::bail!("Unknown method: {}. Valid: staircase, constant", s),
    }
}

fn parse_block(s: &str) -> Result<Block> {
    match s.to_lowercase().as_str() {
        "unilateral" | "uni" => Ok(Block::Unilateral),
        "bilateral" | "bi" => Ok(Block::Bilateral),
        "both" | "uni+bi" => Ok(Block::Both),
        _ => anyhow::bail!(
            "Unknown block: {}. Valid: {}",
            s,
            Block::all().iter().map(|b| b.name()).collect::<Vec<_>>().join(", ")
        ),
    }
}

fn parse_selection(s: &str) -> Result<SelectionPolicy> {
    match s.to_lowercase().as_str() {
        "random" | "rand" => Ok(SelectionPolicy::Random),
        "sequential" | "seq" => Ok(SelectionPolicy::Sequential),
        _ => anyhow::bail!("Unknown selection: {}. Valid: random, sequential", s),
    }
}

fn parse_timeout_policy(s: &str) -> Result<TimeoutPolicy> {
    match s.to_lowercase().as_str() {
        "skip" => Ok(TimeoutPolicy::Skip),
        "incorrect" | "treat_as_incorrect" => Ok(TimeoutPolicy::TreatAsIncorrect),
        _ => anyhow::bail!("Unknown timeout policy: {}. Valid: skip, incorrect", s),
    }
}

fn parse_side(s: &str) -> Result<Side> {
    match s.to_lowercase().as_str() {
        "left" | "l" => Ok(Side::Left),
        "right" | "r" => Ok(Side::Right),
        _ => anyhow::bail!("Unknown side: {}. Valid: left, right", s),
    }
}

fn parse_kind(s: &str, side: Side) -> Result<ConditionKind> {
    match s.to_lowercase().as_str() {
        "unilateral" | "uni" => Ok(ConditionKind::Unilateral(side)),
        "bilateral" | "bi" => Ok(ConditionKind::Bilateral),
        _ => anyhow::bail!("Unknown kind: {}. Valid: unilateral, bilateral", s),
    }
}
