//! Constant-stimuli blocks.
//!
//! Every condition is shown at one fixed intensity instead of being driven
//! by a staircase. The trial list is built before the first trial:
//! conditions cycle in a fixed pattern so the sides alternate, bilateral
//! trials may gain a catch copy shown on the opposite side, and random
//! selection shuffles the whole list. Accuracy is counted per condition
//! over its first `trials_per_condition` answers.

use anyhow::{Result, bail};
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use threshold_kernel::{ConditionKind, SelectionPolicy, Side, Trial};

use crate::experiment::{
    Block, ExperimentRunner, ExperimentRunnerConfig, Paradigm, Recorder, TimeoutPolicy,
};
use crate::observer::{Observer, Response};
use crate::results::{ConditionAccuracy, ConstantStimuliResult, TrialLog};

/// Fixed intensity of each condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedIntensities {
    pub unilateral_left: f64,
    pub unilateral_right: f64,
    pub bilateral_left: f64,
    pub bilateral_right: f64,
    pub flicker_left: f64,
    pub flicker_right: f64,
    pub contrast_left: f64,
    pub contrast_right: f64,
}

impl Default for FixedIntensities {
    fn default() -> Self {
        Self {
            unilateral_left: 5.0,
            unilateral_right: 5.0,
            bilateral_left: 2.5,
            bilateral_right: 2.5,
            flicker_left: 10.0,
            flicker_right: 10.0,
            contrast_left: 0.5,
            contrast_right: 0.5,
        }
    }
}

/// Settings for `ExperimentRunner::run_constant`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstantStimuliSettings {
    pub trials_per_condition: usize,
    /// Chance that a bilateral trial gets a catch copy
    pub catch_probability: f64,
    pub intensities: FixedIntensities,
}

impl Default for ConstantStimuliSettings {
    fn default() -> Self {
        Self {
            trials_per_condition: 16,
            catch_probability: 0.5,
            intensities: FixedIntensities::default(),
        }
    }
}

impl ConstantStimuliSettings {
    pub fn validate(&self) -> Result<()> {
        if self.trials_per_condition == 0 {
            bail!("trials_per_condition must be > 0");
        }
        if !(0.0..=1.0).contains(&self.catch_probability) {
            bail!(
                "constant catch_probability {} outside [0, 1]",
                self.catch_probability
            );
        }
        Ok(())
    }
}

/// The fixed conditions of a block, in the order the trial list cycles
/// through them.
pub fn fixed_conditions(config: &ExperimentRunnerConfig) -> Vec<Trial> {
    let fixed = &config.constant.intensities;
    let condition = |label: String, side: Side, kind: ConditionKind, intensity: f64| Trial {
        label,
        side,
        kind,
        intensity,
        is_catch: false,
    };
    let mut conditions = Vec::new();
    match config.paradigm {
        Paradigm::Tracking => {
            let uni = matches!(config.block, Block::Unilateral | Block::Both);
            let bi = matches!(config.block, Block::Bilateral | Block::Both);
            if uni {
                conditions.push(condition(
                    "Unilateral-Right".to_string(),
                    Side::Right,
                    ConditionKind::Unilateral(Side::Right),
                    fixed.unilateral_right,
                ));
                conditions.push(condition(
                    "Unilateral-Left".to_string(),
                    Side::Left,
                    ConditionKind::Unilateral(Side::Left),
                    fixed.unilateral_left,
                ));
            }
            if bi {
                conditions.push(condition(
                    "Bilateral-Right".to_string(),
                    Side::Right,
                    ConditionKind::Bilateral,
                    fixed.bilateral_right,
                ));
                conditions.push(condition(
                    "Bilateral-Left".to_string(),
                    Side::Left,
                    ConditionKind::Bilateral,
                    fixed.bilateral_left,
                ));
            }
        }
        Paradigm::Flicker | Paradigm::Contrast => {
            let (prefix, right, left) = match config.paradigm {
                Paradigm::Flicker => ("Flicker", fixed.flicker_right, fixed.flicker_left),
                _ => ("Contrast", fixed.contrast_right, fixed.contrast_left),
            };
            for (side, intensity) in [(Side::Right, right), (Side::Left, left)] {
                conditions.push(condition(
                    format!("{prefix}-{}", side.name()),
                    side,
                    ConditionKind::Unilateral(side),
                    intensity,
                ));
            }
        }
    }
    conditions
}

/// Build the full trial list for a block.
///
/// Trial `n` uses condition `n mod len`. Each bilateral trial then gets a
/// catch copy with probability `catch_probability`, appended after the
/// regular trials and moved to the opposite side. Random selection shuffles
/// the list; sequential keeps it as built.
pub fn plan_trials(
    conditions: &[Trial],
    settings: &ConstantStimuliSettings,
    selection: SelectionPolicy,
    rng: &mut impl Rng,
) -> Vec<Trial> {
    if conditions.is_empty() {
        return Vec::new();
    }
    let regular = settings.trials_per_condition * conditions.len();
    let mut plan: Vec<Trial> = (0..regular)
        .map(|n| conditions[n % conditions.len()].clone())
        .collect();

    for i in 0..regular {
        if plan[i].kind == ConditionKind::Bilateral
            && rng.random::<f64>() < settings.catch_probability
        {
            let original = &plan[i];
            let copy = Trial {
                side: original.side.opposite(),
                is_catch: true,
                ..original.clone()
            };
            plan.push(copy);
        }
    }

    if selection == SelectionPolicy::Random {
        plan.shuffle(rng);
    }
    plan
}

impl ExperimentRunner {
    /// Run one constant-stimuli block.
    ///
    /// Catch trials and timeouts are logged but never counted, unless the
    /// timeout policy turns timeouts into wrong answers.
    pub fn run_constant(
        &self,
        observer: &mut dyn Observer,
        log: Option<&mut TrialLog>,
    ) -> Result<ConstantStimuliResult> {
        let config = self.config();
        config.validate()?;
        let started_at = Utc::now();

        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let mut plan_rng = ChaCha8Rng::seed_from_u64(seed);
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));

        let conditions = fixed_conditions(config);
        let plan = plan_trials(&conditions, &config.constant, config.selection, &mut plan_rng);
        let mut tallies: Vec<ConditionAccuracy> = conditions
            .iter()
            .map(|c| ConditionAccuracy {
                label: c.label.clone(),
                side: c.side,
                kind: c.kind,
                intensity: c.intensity,
                answered: 0,
                correct: 0,
            })
            .collect();

        info!(
            paradigm = config.paradigm.name(),
            block = config.block.name(),
            conditions = conditions.len(),
            trials = plan.len(),
            observer = observer.name(),
            "Starting constant-stimuli block"
        );

        let mut recorder = Recorder::new(log);
        self.train(&mut rng, observer, &mut recorder, &conditions)?;

        let cap = config.constant.trials_per_condition;
        let mut catch_trials = 0;
        let mut timeouts = 0;
        let mut completed = true;
        for (n, trial) in plan.iter().enumerate() {
            if n >= config.max_trials {
                warn!(
                    max_trials = config.max_trials,
                    planned = plan.len(),
                    "Trial cap reached before the list was done"
                );
                completed = false;
                break;
            }
            let stimulus = self.present(&mut rng, trial)?;
            let response = observer.respond(trial, &stimulus);
            debug!(
                label = %trial.label,
                intensity = trial.intensity,
                catch = trial.is_catch,
                response = response.name(),
                "Trial"
            );
            recorder.push(trial, false, response)?;

            if response == Response::Timeout {
                timeouts += 1;
            }
            if trial.is_catch {
                catch_trials += 1;
                continue;
            }
            let correct = match (response.correct(), config.timeout_policy) {
                (Some(correct), _) => correct,
                (None, TimeoutPolicy::TreatAsIncorrect) => false,
                (None, TimeoutPolicy::Skip) => continue,
            };
            if let Some(tally) = tallies.iter_mut().find(|t| t.label == trial.label)
                && tally.answered < cap
            {
                tally.answered += 1;
                if correct {
                    tally.correct += 1;
                }
            }
        }

        for t in &tallies {
            info!(
                label = %t.label,
                intensity = t.intensity,
                answered = t.answered,
                accuracy = ?t.accuracy(),
                "Condition accuracy"
            );
        }

        Ok(ConstantStimuliResult {
            config: config.clone(),
            observer: observer.name().to_string(),
            started_at,
            ended_at: Utc::now(),
            trials: recorder.records,
            conditions: tallies,
            catch_trials,
            timeouts,
            completed,
        })
    }
}
