//! Contrast stimuli.
//!
//! An arrow cue points at one side, then four noise patches sit on the
//! corners of a square around fixation. One patch is drawn at the trial
//! contrast and the others at full contrast. On a share of trials every
//! patch takes the trial contrast and the right answer is "same".

use anyhow::{Result, bail};
use glam::DVec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use threshold_kernel::{Side, frame_count};

/// Contrast-paradigm settings. Contrast is Michelson contrast in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContrastSettings {
    /// Staircase steps; the smallest one is also the lowest contrast shown
    pub step_sizes: Vec<f64>,
    pub start_left: f64,
    pub start_right: f64,
    /// Chance that all four patches share the trial contrast
    pub uniform_probability: f64,
    /// Edge of the square whose corners hold the patches, in cm
    pub square_edge: f64,
    pub patch_radius: f64,
    /// Arrow cue length
    pub cue_seconds: f64,
    /// Patch display length
    pub duration_seconds: f64,
}

impl Default for ContrastSettings {
    fn default() -> Self {
        Self {
            step_sizes: vec![0.05],
            start_left: 0.5,
            start_right: 0.5,
            uniform_probability: 0.25,
            square_edge: 6.0,
            patch_radius: 2.0,
            cue_seconds: 2.0,
            duration_seconds: 2.0,
        }
    }
}

impl ContrastSettings {
    pub fn validate(&self) -> Result<()> {
        if self.step_sizes.is_empty() {
            bail!("contrast step_sizes is empty");
        }
        if !(0.0..=1.0).contains(&self.uniform_probability) {
            bail!(
                "uniform_probability {} outside [0, 1]",
                self.uniform_probability
            );
        }
        if !(self.square_edge > 0.0 && self.patch_radius > 0.0) {
            bail!("square_edge and patch_radius must be > 0");
        }
        if !(self.cue_seconds >= 0.0 && self.duration_seconds >= 0.0) {
            bail!("contrast timings must be >= 0");
        }
        Ok(())
    }

    /// Lowest contrast a staircase may reach.
    pub fn floor(&self) -> f64 {
        self.step_sizes
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min)
    }

    pub fn start(&self, side: Side) -> f64 {
        match side {
            Side::Left => self.start_left,
            Side::Right => self.start_right,
        }
    }
}

/// One contrast trial: cue, four patches, and where the odd one is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContrastStimulus {
    pub contrast: f64,
    /// Corner index: 0 and 1 are on the left, 2 and 3 on the right
    pub odd_index: usize,
    pub cued_side: Side,
    /// All four patches share the trial contrast
    pub uniform: bool,
    pub cue_frames: usize,
    pub patch_frames: usize,
    positions: [DVec2; 4],
}

impl ContrastStimulus {
    pub fn new(
        rng: &mut impl Rng,
        settings: &ContrastSettings,
        contrast: f64,
        frame_rate: f64,
        cued_side: Side,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&contrast) {
            bail!("contrast {contrast} outside [0, 1]");
        }
        let half = settings.square_edge / 2.0;
        let odd_index = rng.random_range(0..4);
        let uniform = rng.random::<f64>() < settings.uniform_probability;
        Ok(Self {
            contrast,
            odd_index,
            cued_side,
            uniform,
            cue_frames: frame_count(settings.cue_seconds, frame_rate)?,
            patch_frames: frame_count(settings.duration_seconds, frame_rate)?,
            positions: [
                DVec2::new(-half, -half),
                DVec2::new(-half, half),
                DVec2::new(half, -half),
                DVec2::new(half, half),
            ],
        })
    }

    pub fn odd_side(&self) -> Side {
        if self.odd_index < 2 { Side::Left } else { Side::Right }
    }

    /// Contrast of the patch at corner `index`.
    pub fn patch_contrast(&self, index: usize) -> Option<f64> {
        if index >= 4 {
            return None;
        }
        Some(if self.uniform || index == self.odd_index {
            self.contrast
        } else {
            1.0
        })
    }

    pub fn patch_position(&self, index: usize) -> Option<DVec2> {
        self.positions.get(index).copied()
    }

    /// The "yes" answer is right when the odd patch is on the cued side, or
    /// when there is no odd patch at all.
    pub fn expects_yes(&self) -> bool {
        self.uniform || self.odd_side() == self.cued_side
    }
}
