//! Transformed up/down staircase for a single condition.
//!
//! A correct streak of `n_down` lowers the intensity, an incorrect streak of
//! `n_up` raises it. Every change of direction is a reversal: the intensity
//! at that moment is recorded and the step size moves one entry further down
//! `step_sizes`, holding the last entry once exhausted. The staircase ends
//! when both the reversal target and the trial target have been met.

use serde::Serialize;
use tracing::debug;

use crate::config::{ConditionConfig, ConditionKind, Side, StepType};
use crate::error::{KernelError, Result};

/// Direction of the most recent step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Direction {
    #[default]
    None,
    Up,
    Down,
}

/// What a single response did to the staircase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepResult {
    pub new_intensity: f64,
    pub reversal_occurred: bool,
    pub terminated: bool,
}

/// One response fed into a staircase, with the intensity it was given at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResponseRecord {
    pub intensity: f64,
    pub correct: bool,
}

/// Which streak fired, if any. An incorrect streak wins a tie.
fn step_trigger(consecutive_correct: u32, consecutive_incorrect: u32, n_up: u32, n_down: u32) -> Direction {
    if consecutive_incorrect >= n_up {
        Direction::Up
    } else if consecutive_correct >= n_down {
        Direction::Down
    } else {
        Direction::None
    }
}

/// Adaptive sequence controlling one condition's intensity.
#[derive(Debug, Clone, Serialize)]
pub struct Staircase {
    label: String,
    side: Side,
    kind: ConditionKind,
    step_type: StepType,
    intensity: f64,
    min_val: f64,
    max_val: f64,
    step_sizes: Vec<f64>,
    step_index: usize,
    direction: Direction,
    consecutive_correct: u32,
    consecutive_incorrect: u32,
    n_up: u32,
    n_down: u32,
    reversal_intensities: Vec<f64>,
    n_reversals_target: usize,
    n_trials_target: usize,
    trials_presented: usize,
    terminated: bool,
    history: Vec<ResponseRecord>,
}

impl Staircase {
    /// Build an active staircase at `start_val`.
    pub fn new(config: &ConditionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            label: config.label.clone(),
            side: config.side,
            kind: config.kind(),
            step_type: config.step_type,
            intensity: config.start_val,
            min_val: config.min_val,
            max_val: config.max_val,
            step_sizes: config.step_sizes.clone(),
            step_index: 0,
            direction: Direction::None,
            consecutive_correct: 0,
            consecutive_incorrect: 0,
            n_up: config.n_up,
            n_down: config.n_down,
            reversal_intensities: Vec::new(),
            n_reversals_target: config.n_reversals as usize,
            n_trials_target: config.n_trials as usize,
            trials_presented: 0,
            terminated: false,
            history: Vec::new(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn kind(&self) -> ConditionKind {
        self.kind
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min_val, self.max_val)
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn current_step_size(&self) -> f64 {
        self.step_sizes[self.step_index]
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn reversal_intensities(&self) -> &[f64] {
        &self.reversal_intensities
    }

    pub fn trials_presented(&self) -> usize {
        self.trials_presented
    }

    pub fn history(&self) -> &[ResponseRecord] {
        &self.history
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Feed one response and move the intensity.
    ///
    /// Either every field is updated or, on error, none is.
    pub fn record_response(&mut self, correct: bool) -> Result<StepResult> {
        if self.terminated {
            return Err(KernelError::StaircaseTerminated {
                label: self.label.clone(),
            });
        }

        let presented = self.intensity;
        let trials_presented = self.trials_presented + 1;
        let (mut n_correct, mut n_incorrect) = if correct {
            (self.consecutive_correct + 1, 0)
        } else {
            (0, self.consecutive_incorrect + 1)
        };

        let mut intensity = self.intensity;
        let mut direction = self.direction;
        let mut step_index = self.step_index;
        let mut reversal = false;

        let trigger = step_trigger(n_correct, n_incorrect, self.n_up, self.n_down);
        if trigger != Direction::None {
            match trigger {
                Direction::Up => n_incorrect = 0,
                _ => n_correct = 0,
            }
            if self.direction != Direction::None && trigger != self.direction {
                reversal = true;
                step_index = (step_index + 1).min(self.step_sizes.len() - 1);
            }
            let step = self.step_sizes[step_index];
            intensity = self
                .step_type
                .apply(intensity, step, trigger == Direction::Up)
                .clamp(self.min_val, self.max_val);
            direction = trigger;
        }

        let n_reversals = self.reversal_intensities.len() + usize::from(reversal);
        let terminated =
            n_reversals >= self.n_reversals_target && trials_presented >= self.n_trials_target;

        // commit
        if reversal {
            self.reversal_intensities.push(presented);
            debug!(
                label = %self.label,
                intensity = presented,
                reversals = n_reversals,
                "Staircase reversal"
            );
        }
        self.history.push(ResponseRecord {
            intensity: presented,
            correct,
        });
        self.trials_presented = trials_presented;
        self.consecutive_correct = n_correct;
        self.consecutive_incorrect = n_incorrect;
        self.intensity = intensity;
        self.direction = direction;
        self.step_index = step_index;
        self.terminated = terminated;

        if terminated {
            debug!(
                label = %self.label,
                trials = trials_presented,
                reversals = n_reversals,
                "Staircase terminated"
            );
        }

        Ok(StepResult {
            new_intensity: intensity,
            reversal_occurred: reversal,
            terminated,
        })
    }

    /// Mean of the last `n_last` reversal intensities (all of them if fewer).
    pub fn threshold(&self, n_last: usize) -> Option<f64> {
        let revs = &self.reversal_intensities;
        if revs.is_empty() || n_last == 0 {
            return None;
        }
        let tail = &revs[revs.len().saturating_sub(n_last)..];
        Some(tail.iter().sum::<f64>() / tail.len() as f64)
    }
}
