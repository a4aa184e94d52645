//! Configuration types for staircases, sessions, and the force field.
//!
//! Condition descriptors are loaded from JSON at runtime and validated
//! for internal consistency only; everything else is the caller's business.

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// Which half of the display a condition reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Side::Left => "Left",
            Side::Right => "Right",
        }
    }

    /// Both sides, left first.
    pub fn both() -> [Side; 2] {
        [Side::Left, Side::Right]
    }
}

/// Serialized tag for the kind of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindTag {
    Unilateral,
    Bilateral,
}

/// Where the targets of a condition live.
///
/// `Unilateral(side)` puts every target in one region; `Bilateral` spreads
/// them over both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionKind {
    Unilateral(Side),
    Bilateral,
}

impl ConditionKind {
    pub fn tag(self) -> KindTag {
        match self {
            ConditionKind::Unilateral(_) => KindTag::Unilateral,
            ConditionKind::Bilateral => KindTag::Bilateral,
        }
    }

    /// Sides whose regions hold targets.
    pub fn target_sides(self) -> Vec<Side> {
        match self {
            ConditionKind::Unilateral(side) => vec![side],
            ConditionKind::Bilateral => Side::both().to_vec(),
        }
    }

    pub fn name(self) -> &'static str {
        match self.tag() {
            KindTag::Unilateral => "Unilateral",
            KindTag::Bilateral => "Bilateral",
        }
    }
}

/// How a step size is applied to the current intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    /// `intensity ± step`
    #[default]
    #[serde(alias = "lin")]
    Linear,
    /// `intensity × 10^(±step / 20)`
    #[serde(alias = "db")]
    Decibel,
    /// `intensity × 10^(±step)`
    Log,
}

impl StepType {
    /// Move `intensity` by `step` in the requested direction (unclamped).
    pub fn apply(self, intensity: f64, step: f64, increase: bool) -> f64 {
        let signed = if increase { step } else { -step };
        match self {
            StepType::Linear => intensity + signed,
            StepType::Decibel => intensity * 10f64.powf(signed / 20.0),
            StepType::Log => intensity * 10f64.powf(signed),
        }
    }

    fn is_multiplicative(self) -> bool {
        !matches!(self, StepType::Linear)
    }
}

/// Order in which the scheduler offers staircases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPolicy {
    /// Round-robin in configuration order.
    Sequential,
    /// A fresh shuffle for every full pass.
    #[default]
    Random,
}

impl SelectionPolicy {
    pub fn name(self) -> &'static str {
        match self {
            SelectionPolicy::Sequential => "sequential",
            SelectionPolicy::Random => "random",
        }
    }
}

fn default_max_val() -> f64 {
    f64::MAX
}

/// Descriptor for a single staircase.
///
/// `n_up` is the number of consecutive incorrect responses before the
/// intensity increases; `n_down` the number of consecutive correct ones
/// before it decreases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    /// Unique label, e.g. `Unilateral-Right_0`
    pub label: String,
    /// Side the condition reports on
    pub side: Side,
    /// Unilateral or bilateral target placement
    pub kind: KindTag,
    /// Initial intensity
    pub start_val: f64,
    /// Step sizes, coarse to fine
    pub step_sizes: Vec<f64>,
    #[serde(default)]
    pub step_type: StepType,
    pub n_up: u32,
    pub n_down: u32,
    /// Minimum number of trials before the staircase may terminate
    pub n_trials: u32,
    /// Minimum number of reversals before the staircase may terminate
    pub n_reversals: u32,
    #[serde(default)]
    pub min_val: f64,
    #[serde(default = "default_max_val")]
    pub max_val: f64,
}

impl ConditionConfig {
    /// Tagged condition kind; unilateral conditions target their own side.
    pub fn kind(&self) -> ConditionKind {
        match self.kind {
            KindTag::Unilateral => ConditionKind::Unilateral(self.side),
            KindTag::Bilateral => ConditionKind::Bilateral,
        }
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        let label = &self.label;
        if label.is_empty() {
            return Err(KernelError::invalid("condition label must not be empty"));
        }
        if !(self.min_val.is_finite() && self.max_val.is_finite() && self.start_val.is_finite()) {
            return Err(KernelError::invalid(format!(
                "{label}: start/min/max values must be finite"
            )));
        }
        if self.min_val > self.max_val {
            return Err(KernelError::invalid(format!(
                "{label}: min_val {} exceeds max_val {}",
                self.min_val, self.max_val
            )));
        }
        if self.start_val < self.min_val || self.start_val > self.max_val {
            return Err(KernelError::invalid(format!(
                "{label}: start_val {} outside [{}, {}]",
                self.start_val, self.min_val, self.max_val
            )));
        }
        if self.step_sizes.is_empty() {
            return Err(KernelError::invalid(format!("{label}: step_sizes is empty")));
        }
        if let Some(bad) = self
            .step_sizes
            .iter()
            .find(|s| !s.is_finite() || **s <= 0.0)
        {
            return Err(KernelError::invalid(format!(
                "{label}: step size {bad} must be positive and finite"
            )));
        }
        for (name, value) in [
            ("n_up", self.n_up),
            ("n_down", self.n_down),
            ("n_trials", self.n_trials),
            ("n_reversals", self.n_reversals),
        ] {
            if value == 0 {
                return Err(KernelError::invalid(format!("{label}: {name} must be > 0")));
            }
        }
        if self.step_type.is_multiplicative() && self.min_val <= 0.0 {
            return Err(KernelError::invalid(format!(
                "{label}: {:?} steps need min_val > 0",
                self.step_type
            )));
        }
        Ok(())
    }
}

/// Session-wide settings, fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub selection: SelectionPolicy,
    /// Probability that an eligible trial is replaced by a catch trial
    pub catch_probability: f64,
    /// Trials that must be presented before catch trials may appear
    pub catch_warmup_trials: usize,
    /// Seed for trial ordering and catch draws (None for entropy)
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            selection: SelectionPolicy::Random,
            catch_probability: 0.25,
            catch_warmup_trials: 3,
            seed: None,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.catch_probability) {
            return Err(KernelError::invalid(format!(
                "catch_probability {} outside [0, 1]",
                self.catch_probability
            )));
        }
        Ok(())
    }
}

/// Strengths of the three terms of the synthetic force field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForceParams {
    /// Pairwise inverse-fourth-power repulsion between bodies of a group
    pub repulsion_strength: f64,
    /// Inverse-square repulsion from each region edge
    pub edge_repulsion_strength: f64,
    /// Gain applied to the total force before it perturbs the heading
    pub center_attraction: f64,
}

impl ForceParams {
    /// No forces at all: bodies travel in straight lines.
    pub const NONE: ForceParams = ForceParams {
        repulsion_strength: 0.0,
        edge_repulsion_strength: 0.0,
        center_attraction: 0.0,
    };

    /// Strengths used by the tracking paradigm for a given speed (units/s).
    pub fn scaled_for_speed(speed: f64) -> Self {
        Self {
            repulsion_strength: 2000.0 * speed,
            edge_repulsion_strength: 10.0 * speed,
            center_attraction: 0.0001,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let all = [
            self.repulsion_strength,
            self.edge_repulsion_strength,
            self.center_attraction,
        ];
        if all.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(KernelError::invalid(format!(
                "force parameters must be finite and non-negative: {self:?}"
            )));
        }
        Ok(())
    }
}
