//! Experiment runner for threshold sessions.
//!
//! Orchestrates the session lifecycle:
//! 1. Expand the block into staircase conditions
//! 2. Present training trials at fixed intensities
//! 3. Run the interleaved staircases until every one has terminated,
//!    with catch trials mixed in
//! 4. Collect per-trial records and per-staircase summaries

use anyhow::{Result, bail};
use chrono::Utc;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use threshold_kernel::{
    ConditionConfig, KindTag, SelectionPolicy, SessionConfig, Side, StaircaseSession, StepType,
    Trial,
};

use crate::constant::ConstantStimuliSettings;
use crate::contrast::{ContrastSettings, ContrastStimulus};
use crate::flicker::FlickerStimulus;
use crate::observer::{Observer, ObserverConfig, Response};
use crate::results::{ExperimentResult, StaircaseSummary, TrialLog, TrialRecord};
use crate::stimulus::{Stimulus, StimulusConfig, TrackingStimulus};

/// Which stimulus the staircases control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Paradigm {
    /// Multiple-object tracking; intensity is body speed in cm/s
    #[default]
    Tracking,
    /// Odd-element flicker; intensity is the toggle frequency in Hz
    Flicker,
    /// Odd-patch contrast; intensity is Michelson contrast
    Contrast,
}

impl Paradigm {
    pub fn all() -> Vec<Self> {
        vec![Self::Tracking, Self::Flicker, Self::Contrast]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Tracking => "tracking",
            Self::Flicker => "flicker",
            Self::Contrast => "contrast",
        }
    }

    /// Intensity of training trial `index` out of `count`.
    ///
    /// Tracking speeds climb in 1.25 cm/s steps, flicker trains at 1 Hz, and
    /// contrast sweeps evenly from 0 to full contrast.
    pub fn training_intensity(&self, index: usize, count: usize) -> f64 {
        match self {
            Self::Tracking => 1.25 * (index + 1) as f64,
            Self::Flicker => 1.0,
            Self::Contrast if count > 1 => index as f64 / (count - 1) as f64,
            Self::Contrast => 0.0,
        }
    }
}

/// Set of tracking conditions run in one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Block {
    #[default]
    Unilateral,
    Bilateral,
    /// Unilateral and bilateral conditions interleaved
    Both,
}

impl Block {
    pub fn all() -> Vec<Self> {
        vec![Self::Unilateral, Self::Bilateral, Self::Both]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Unilateral => "unilateral",
            Self::Bilateral => "bilateral",
            Self::Both => "both",
        }
    }

    pub fn kinds(&self) -> Vec<KindTag> {
        match self {
            Self::Unilateral => vec![KindTag::Unilateral],
            Self::Bilateral => vec![KindTag::Bilateral],
            Self::Both => vec![KindTag::Unilateral, KindTag::Bilateral],
        }
    }
}

/// How intensity relates to difficulty.
///
/// The staircase lowers intensity after correct answers. When a higher
/// intensity is harder (faster motion, faster flicker) the runner feeds the
/// negated answer so that correct answers push intensity up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    HigherIsEasier,
    #[default]
    HigherIsHarder,
}

impl Polarity {
    pub fn staircase_response(&self, correct: bool) -> bool {
        match self {
            Self::HigherIsEasier => correct,
            Self::HigherIsHarder => !correct,
        }
    }
}

/// What to do with a staircase trial that got no answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Present the same staircase trial again
    #[default]
    Skip,
    /// Count the trial as answered incorrectly
    TreatAsIncorrect,
}

impl TimeoutPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::TreatAsIncorrect => "treat_as_incorrect",
        }
    }
}

/// Step rule shared by every staircase of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaircaseSettings {
    pub step_sizes: Vec<f64>,
    pub step_type: StepType,
    pub n_up: u32,
    pub n_down: u32,
    /// Minimum trials per staircase
    pub n_trials: u32,
    /// Minimum reversals per staircase
    pub n_reversals: u32,
    pub min_val: f64,
    pub max_val: f64,
    /// Reversals averaged into the threshold estimate
    pub average_reversals: usize,
}

impl Default for StaircaseSettings {
    fn default() -> Self {
        Self {
            step_sizes: vec![0.5, 0.25],
            step_type: StepType::Linear,
            n_up: 1,
            n_down: 1,
            n_trials: 10,
            n_reversals: 6,
            min_val: 0.0,
            max_val: 1000.0,
            average_reversals: 3,
        }
    }
}

/// Starting intensities. Each tracking list yields one staircase per entry,
/// labelled `<Kind>-<Side>_<index>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartValues {
    pub unilateral_left: Vec<f64>,
    pub unilateral_right: Vec<f64>,
    pub bilateral_left: Vec<f64>,
    pub bilateral_right: Vec<f64>,
    pub flicker_left: f64,
    pub flicker_right: f64,
}

impl Default for StartValues {
    fn default() -> Self {
        Self {
            unilateral_left: vec![5.0, 6.0],
            unilateral_right: vec![5.0, 6.0],
            bilateral_left: vec![2.5, 4.0],
            bilateral_right: vec![2.5, 4.0],
            flicker_left: 10.0,
            flicker_right: 10.0,
        }
    }
}

impl StartValues {
    fn tracking(&self, kind: KindTag, side: Side) -> &[f64] {
        match (kind, side) {
            (KindTag::Unilateral, Side::Left) => &self.unilateral_left,
            (KindTag::Unilateral, Side::Right) => &self.unilateral_right,
            (KindTag::Bilateral, Side::Left) => &self.bilateral_left,
            (KindTag::Bilateral, Side::Right) => &self.bilateral_right,
        }
    }

    fn flicker(&self, side: Side) -> f64 {
        match side {
            Side::Left => self.flicker_left,
            Side::Right => self.flicker_right,
        }
    }
}

/// Configuration for the experiment runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentRunnerConfig {
    pub paradigm: Paradigm,
    pub block: Block,
    pub selection: SelectionPolicy,
    /// Probability of replacing an eligible trial by a catch trial
    pub catch_probability: f64,
    /// Trials presented before catch trials may appear
    pub catch_warmup_trials: usize,
    /// Seed for trial order, catch draws, and stimulus generation
    pub seed: Option<u64>,
    pub staircase: StaircaseSettings,
    pub start_values: StartValues,
    pub stimulus: StimulusConfig,
    pub polarity: Polarity,
    pub timeout_policy: TimeoutPolicy,
    /// Fixed-intensity warm-up trials, never fed to a staircase
    pub training_trials: usize,
    /// Hard cap on non-training trials
    pub max_trials: usize,
    pub observer: ObserverConfig,
    pub contrast: ContrastSettings,
    /// Fixed-intensity blocks run by `run_constant`
    pub constant: ConstantStimuliSettings,
}

impl Default for ExperimentRunnerConfig {
    fn default() -> Self {
        Self {
            paradigm: Paradigm::Tracking,
            block: Block::Unilateral,
            selection: SelectionPolicy::Random,
            catch_probability: 0.25,
            catch_warmup_trials: 3,
            seed: None,
            staircase: StaircaseSettings::default(),
            start_values: StartValues::default(),
            stimulus: StimulusConfig::default(),
            polarity: Polarity::HigherIsHarder,
            timeout_policy: TimeoutPolicy::Skip,
            training_trials: 0,
            max_trials: 2000,
            observer: ObserverConfig::default(),
            contrast: ContrastSettings::default(),
            constant: ConstantStimuliSettings::default(),
        }
    }
}

impl ExperimentRunnerConfig {
    /// Load a configuration from JSON; missing fields take their defaults.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_trials == 0 {
            bail!("max_trials must be > 0");
        }
        if self.staircase.average_reversals == 0 {
            bail!("average_reversals must be > 0");
        }
        self.stimulus.validate()?;
        self.contrast.validate()?;
        self.constant.validate()?;
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            selection: self.selection,
            catch_probability: self.catch_probability,
            catch_warmup_trials: self.catch_warmup_trials,
            seed: self.seed,
        }
    }

    fn condition(&self, label: String, side: Side, kind: KindTag, start_val: f64) -> ConditionConfig {
        let s = &self.staircase;
        ConditionConfig {
            label,
            side,
            kind,
            start_val,
            step_sizes: s.step_sizes.clone(),
            step_type: s.step_type,
            n_up: s.n_up,
            n_down: s.n_down,
            n_trials: s.n_trials,
            n_reversals: s.n_reversals,
            min_val: s.min_val,
            max_val: s.max_val,
        }
    }

    /// Staircase descriptors for the configured paradigm and block.
    ///
    /// Tracking conditions come right side first within each index, the
    /// order in which the sequential policy will offer them.
    pub fn conditions(&self) -> Vec<ConditionConfig> {
        let mut conditions = Vec::new();
        match self.paradigm {
            Paradigm::Tracking => {
                for kind in self.block.kinds() {
                    let kind_name = match kind {
                        KindTag::Unilateral => "Unilateral",
                        KindTag::Bilateral => "Bilateral",
                    };
                    let count = Side::both()
                        .iter()
                        .map(|side| self.start_values.tracking(kind, *side).len())
                        .max()
                        .unwrap_or(0);
                    for i in 0..count {
                        for side in [Side::Right, Side::Left] {
                            if let Some(start) = self.start_values.tracking(kind, side).get(i) {
                                let label = format!("{kind_name}-{}_{i}", side.name());
                                conditions.push(self.condition(label, side, kind, *start));
                            }
                        }
                    }
                }
            }
            Paradigm::Flicker => {
                // the slowest flicker shown is one step
                let floor = self
                    .staircase
                    .step_sizes
                    .iter()
                    .copied()
                    .fold(f64::INFINITY, f64::min);
                for side in [Side::Right, Side::Left] {
                    let label = format!("Flicker-{}", side.name());
                    let mut c =
                        self.condition(label, side, KindTag::Unilateral, self.start_values.flicker(side));
                    c.min_val = c.min_val.max(floor);
                    conditions.push(c);
                }
            }
            Paradigm::Contrast => {
                let floor = self.contrast.floor();
                for side in [Side::Right, Side::Left] {
                    let label = format!("Contrast-{}", side.name());
                    let mut c = self.condition(label, side, KindTag::Unilateral, 0.0);
                    c.step_sizes = self.contrast.step_sizes.clone();
                    c.min_val = floor;
                    c.max_val = 1.0;
                    c.start_val = self.contrast.start(side).clamp(floor.min(1.0), 1.0);
                    conditions.push(c);
                }
            }
        }
        conditions
    }
}

/// Collects trial records and mirrors them into the optional log.
pub(crate) struct Recorder<'a> {
    pub(crate) records: Vec<TrialRecord>,
    log: Option<&'a mut TrialLog>,
}

impl<'a> Recorder<'a> {
    pub(crate) fn new(log: Option<&'a mut TrialLog>) -> Self {
        Self {
            records: Vec::new(),
            log,
        }
    }

    pub(crate) fn push(&mut self, trial: &Trial, is_training: bool, response: Response) -> Result<()> {
        let record = TrialRecord {
            trial_index: self.records.len(),
            condition_label: trial.label.clone(),
            side: trial.side,
            kind: trial.kind,
            is_catch_trial: trial.is_catch,
            is_training,
            intensity: trial.intensity,
            response,
        };
        if let Some(log) = self.log.as_deref_mut() {
            log.append(&record)?;
        }
        self.records.push(record);
        Ok(())
    }
}

/// The experiment runner.
pub struct ExperimentRunner {
    config: ExperimentRunnerConfig,
}

impl ExperimentRunner {
    /// Create a new experiment runner.
    pub fn new(config: ExperimentRunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExperimentRunnerConfig {
        &self.config
    }

    /// Build the stimulus for one trial.
    pub fn present(&self, rng: &mut impl Rng, trial: &Trial) -> Result<Stimulus> {
        let stimulus = &self.config.stimulus;
        let presented = match self.config.paradigm {
            Paradigm::Tracking => Stimulus::Tracking(TrackingStimulus::generate(
                rng,
                stimulus,
                trial.kind,
                trial.side,
                trial.intensity,
            )?),
            Paradigm::Flicker => Stimulus::Flicker(FlickerStimulus::new(
                rng,
                stimulus.blink_time,
                trial.intensity,
                stimulus.frame_rate,
                trial.side,
            )?),
            Paradigm::Contrast => Stimulus::Contrast(ContrastStimulus::new(
                rng,
                &self.config.contrast,
                trial.intensity,
                stimulus.frame_rate,
                trial.side,
            )?),
        };
        Ok(presented)
    }

    /// Present the configured training trials. Each one borrows the label
    /// and side of one of the first two templates; responses are recorded
    /// and go nowhere else.
    pub(crate) fn train(
        &self,
        rng: &mut ChaCha8Rng,
        observer: &mut dyn Observer,
        recorder: &mut Recorder<'_>,
        templates: &[Trial],
    ) -> Result<()> {
        let count = self.config.training_trials;
        if count > 0 && templates.is_empty() {
            bail!("training trials need at least one condition");
        }
        for i in 0..count {
            let template = &templates[rng.random_range(0..templates.len().min(2))];
            let trial = Trial {
                intensity: self.config.paradigm.training_intensity(i, count),
                is_catch: false,
                ..template.clone()
            };
            let stimulus = self.present(rng, &trial)?;
            let response = observer.respond(&trial, &stimulus);
            debug!(
                label = %trial.label,
                intensity = trial.intensity,
                response = response.name(),
                "Training trial"
            );
            recorder.push(&trial, true, response)?;
        }
        Ok(())
    }

    /// Run one session to completion.
    pub fn run(
        &self,
        observer: &mut dyn Observer,
        log: Option<&mut TrialLog>,
    ) -> Result<ExperimentResult> {
        let config = &self.config;
        config.validate()?;
        let started_at = Utc::now();

        let conditions = config.conditions();
        let mut session = StaircaseSession::new(&conditions, config.session_config())?;
        let stimulus_seed = match config.seed {
            Some(seed) => seed.wrapping_add(1),
            None => rand::rng().random(),
        };
        let mut rng = ChaCha8Rng::seed_from_u64(stimulus_seed);
        let mut recorder = Recorder::new(log);

        info!(
            paradigm = config.paradigm.name(),
            block = config.block.name(),
            selection = config.selection.name(),
            staircases = conditions.len(),
            observer = observer.name(),
            "Starting session"
        );

        let templates: Vec<Trial> = conditions
            .iter()
            .map(|c| Trial {
                label: c.label.clone(),
                side: c.side,
                kind: c.kind(),
                intensity: c.start_val,
                is_catch: false,
            })
            .collect();
        self.train(&mut rng, observer, &mut recorder, &templates)?;

        let mut valid_trials = 0;
        let mut catch_trials = 0;
        let mut timeouts = 0;
        let mut presented = 0;
        let completed = loop {
            if presented >= config.max_trials {
                warn!(
                    max_trials = config.max_trials,
                    active = session.active_labels().len(),
                    "Trial cap reached before every staircase terminated"
                );
                break false;
            }
            let trial = match session.next_trial() {
                Ok(trial) => trial,
                Err(e) if e.is_exhausted() => break true,
                Err(e) => return Err(e.into()),
            };
            presented += 1;

            let stimulus = self.present(&mut rng, &trial)?;
            let response = observer.respond(&trial, &stimulus);
            debug!(
                label = %trial.label,
                intensity = trial.intensity,
                catch = trial.is_catch,
                response = response.name(),
                "Trial"
            );
            recorder.push(&trial, false, response)?;

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
            let step = session.record_response(
                &trial.label,
                config.polarity.staircase_response(correct),
            )?;
            valid_trials += 1;

            if step.terminated {
                let threshold = session
                    .staircase(&trial.label)
                    .and_then(|s| s.threshold(config.staircase.average_reversals));
                info!(
                    label = %trial.label,
                    threshold = ?threshold,
                    remaining = session.active_labels().len(),
                    "Staircase finished"
                );
            }
        };

        let staircases: Vec<StaircaseSummary> = session
            .staircases()
            .iter()
            .map(|s| StaircaseSummary::from_staircase(s, config.staircase.average_reversals))
            .collect();

        info!(
            valid_trials,
            catch_trials,
            timeouts,
            completed,
            "Session finished"
        );

        Ok(ExperimentResult {
            config: config.clone(),
            observer: observer.name().to_string(),
            started_at,
            ended_at: Utc::now(),
            trials: recorder.records,
            staircases,
            valid_trials,
            catch_trials,
            training_trials: config.training_trials,
            timeouts,
            completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{PsychometricObserver, ThresholdObserver};

    /// Answers every trial the same way.
    struct ConstantObserver(Response);

    impl Observer for ConstantObserver {
        fn name(&self) -> &str {
            "constant"
        }

        fn respond(&mut self, _trial: &Trial, _stimulus: &Stimulus) -> Response {
            self.0
        }
    }

    fn quick_config() -> ExperimentRunnerConfig {
        let mut config = ExperimentRunnerConfig {
            seed: Some(42),
            ..ExperimentRunnerConfig::default()
        };
        config.stimulus.duration_seconds = 0.1;
        config.stimulus.blink_time = 0.1;
        config.observer.seed = Some(7);
        config
    }

    #[test]
    fn test_unilateral_block_labels() {
        let labels: Vec<String> = quick_config()
            .conditions()
            .into_iter()
            .map(|c| c.label)
            .collect();
        assert_eq!(
            labels,
            vec![
                "Unilateral-Right_0",
                "Unilateral-Left_0",
                "Unilateral-Right_1",
                "Unilateral-Left_1",
            ]
        );
    }

    #[test]
    fn test_both_block_has_eight_staircases() {
        let config = ExperimentRunnerConfig {
            block: Block::Both,
            ..ExperimentRunnerConfig::default()
        };
        let conditions = config.conditions();
        assert_eq!(conditions.len(), 8);
        assert_eq!(conditions[4].label, "Bilateral-Right_0");
        assert_eq!(conditions[4].start_val, 2.5);
        assert_eq!(conditions[4].kind, KindTag::Bilateral);
    }

    #[test]
    fn test_flicker_conditions_floor_at_smallest_step() {
        let config = ExperimentRunnerConfig {
            paradigm: Paradigm::Flicker,
            ..ExperimentRunnerConfig::default()
        };
        let conditions = config.conditions();
        assert_eq!(conditions.len(), 2);
        assert!(conditions.iter().all(|c| c.min_val == 0.25));
        assert!(conditions.iter().all(|c| c.start_val == 10.0));
    }

    #[test]
    fn test_polarity_mapping() {
        assert!(Polarity::HigherIsHarder.staircase_response(false));
        assert!(!Polarity::HigherIsHarder.staircase_response(true));
        assert!(Polarity::HigherIsEasier.staircase_response(true));
    }

    #[test]
    fn test_session_completes_with_psychometric_observer() {
        let config = quick_config();
        let mut observer = PsychometricObserver::new(config.observer.clone()).unwrap();
        let result = ExperimentRunner::new(config).run(&mut observer, None).unwrap();

        assert!(result.completed);
        assert_eq!(result.staircases.len(), 4);
        assert!(result.staircases.iter().all(|s| s.terminated));
        assert_eq!(
            result.trials.len(),
            result.valid_trials + result.catch_trials
        );
        for s in &result.staircases {
            let t = s.threshold.unwrap();
            assert!((t - 3.0).abs() < 1.5, "{} threshold {t}", s.label);
        }
    }

    #[test]
    fn test_skipped_timeouts_hit_the_trial_cap() {
        let mut config = quick_config();
        config.max_trials = 25;
        let result = ExperimentRunner::new(config)
            .run(&mut ConstantObserver(Response::Timeout), None)
            .unwrap();
        assert!(!result.completed);
        assert_eq!(result.valid_trials, 0);
        assert_eq!(result.timeouts, 25);
        assert!(result.staircases.iter().all(|s| s.trials_presented == 0));
    }

    #[test]
    fn test_timeouts_as_incorrect_reach_staircases() {
        let mut config = quick_config();
        config.timeout_policy = TimeoutPolicy::TreatAsIncorrect;
        config.max_trials = 40;
        let result = ExperimentRunner::new(config)
            .run(&mut ConstantObserver(Response::Timeout), None)
            .unwrap();
        assert!(result.valid_trials > 0);
        // every answer counts as incorrect, so speeds only go down
        for s in &result.staircases {
            assert!(s.responses.iter().all(|r| *r));
            assert!(s.intensities.windows(2).all(|w| w[1] <= w[0]));
        }
    }

    #[test]
    fn test_training_trials_never_reach_staircases() {
        let mut config = quick_config();
        config.training_trials = 3;
        config.max_trials = 8;
        let result = ExperimentRunner::new(config)
            .run(&mut ConstantObserver(Response::Correct), None)
            .unwrap();
        let training: Vec<_> = result.trials.iter().filter(|t| t.is_training).collect();
        assert_eq!(training.len(), 3);
        assert_eq!(training[2].intensity, 3.75);
        let fed: usize = result.staircases.iter().map(|s| s.trials_presented).sum();
        assert_eq!(fed, result.valid_trials);
    }

    #[test]
    fn test_flicker_session_runs() {
        let mut config = quick_config();
        config.paradigm = Paradigm::Flicker;
        config.observer.mean = 12.0;
        config.observer.std_dev = 1.0;
        let mut observer = PsychometricObserver::new(config.observer.clone()).unwrap();
        let result = ExperimentRunner::new(config).run(&mut observer, None).unwrap();
        assert!(result.completed);
        assert_eq!(result.staircases.len(), 2);
    }

    #[test]
    fn test_contrast_conditions_are_bounded_to_unit_range() {
        let mut config = ExperimentRunnerConfig {
            paradigm: Paradigm::Contrast,
            ..ExperimentRunnerConfig::default()
        };
        config.contrast.start_left = 0.0;
        let conditions = config.conditions();
        let labels: Vec<&str> = conditions.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Contrast-Right", "Contrast-Left"]);
        for c in &conditions {
            assert_eq!(c.step_sizes, vec![0.05]);
            assert_eq!(c.min_val, 0.05);
            assert_eq!(c.max_val, 1.0);
        }
        assert_eq!(conditions[0].start_val, 0.5);
        // a zero start is raised to the floor
        assert_eq!(conditions[1].start_val, 0.05);
    }

    #[test]
    fn test_contrast_session_with_threshold_observer() {
        let mut config = quick_config();
        config.paradigm = Paradigm::Contrast;
        config.polarity = Polarity::HigherIsEasier;
        config.training_trials = 3;
        let mut observer = ThresholdObserver::new(0.3, Polarity::HigherIsEasier).unwrap();
        let result = ExperimentRunner::new(config).run(&mut observer, None).unwrap();

        assert!(result.completed);
        assert_eq!(result.staircases.len(), 2);
        let training: Vec<f64> = result
            .trials
            .iter()
            .filter(|t| t.is_training)
            .map(|t| t.intensity)
            .collect();
        assert_eq!(training, vec![0.0, 0.5, 1.0]);
        for t in result.trials.iter().filter(|t| !t.is_training) {
            assert!((0.05..=1.0).contains(&t.intensity));
            // contrast the observer can see is always answered right
            if t.intensity >= 0.3 {
                assert_eq!(t.response, Response::Correct, "{t:?}");
            }
        }
        for s in &result.staircases {
            let threshold = s.threshold.unwrap();
            assert!(threshold >= 0.05 && threshold < 0.6, "{} threshold {threshold}", s.label);
        }
    }

    #[test]
    fn test_training_intensity_per_paradigm() {
        assert_eq!(Paradigm::Tracking.training_intensity(2, 5), 3.75);
        assert_eq!(Paradigm::Flicker.training_intensity(4, 5), 1.0);
        assert_eq!(Paradigm::Contrast.training_intensity(1, 5), 0.25);
        assert_eq!(Paradigm::Contrast.training_intensity(0, 1), 0.0);
    }

    #[test]
    fn test_config_loads_with_defaults() {
        let config: ExperimentRunnerConfig =
            serde_json::from_str(r#"{"block": "both", "seed": 3, "observer": {"mean": 4.0}}"#)
                .unwrap();
        assert_eq!(config.block, Block::Both);
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.observer.mean, 4.0);
        assert_eq!(config.observer.std_dev, 0.1);
        assert_eq!(config.staircase.step_sizes, vec![0.5, 0.25]);
    }
}
