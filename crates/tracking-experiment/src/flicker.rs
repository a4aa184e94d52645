//! Frame-exact flicker schedules.
//!
//! Instead of polling a clock between display refreshes, the whole phase
//! sequence is computed up front: a stimulus lasting `duration` seconds at
//! `frame_rate` Hz has `round(duration * frame_rate)` frames, and the phase
//! toggles every `round(frame_rate / frequency)` frames.
//!
//! The same schedule drives the target cue of a tracking trial and the
//! stimulus of a flicker-rate trial.

use anyhow::{Result, bail};
use rand::Rng;
use serde::{Deserialize, Serialize};
use threshold_kernel::{Side, frame_count};

/// Luminance phase of a flickering element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Dark,
    Light,
}

impl Phase {
    pub fn toggled(self) -> Self {
        match self {
            Phase::Dark => Phase::Light,
            Phase::Light => Phase::Dark,
        }
    }
}

/// Precomputed phase for every frame of a flickering stimulus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlickerSchedule {
    /// Requested toggle frequency in Hz
    pub frequency: f64,
    pub frame_rate: f64,
    /// Frames between two toggles (at least one)
    pub frames_per_phase: usize,
    phases: Vec<Phase>,
    switch_frames: Vec<usize>,
}

impl FlickerSchedule {
    pub fn new(duration_seconds: f64, frequency: f64, frame_rate: f64) -> Result<Self> {
        if !(frequency > 0.0 && frequency.is_finite()) {
            bail!("flicker frequency {frequency} must be > 0");
        }
        let total_frames = frame_count(duration_seconds, frame_rate)?;
        let frames_per_phase = ((frame_rate / frequency).round() as usize).max(1);

        let mut phases = Vec::with_capacity(total_frames);
        let mut switch_frames = Vec::new();
        let mut phase = Phase::Dark;
        let mut counter = 0;
        for frame in 0..total_frames {
            counter += 1;
            if counter >= frames_per_phase {
                counter = 0;
                phase = phase.toggled();
                switch_frames.push(frame);
            }
            phases.push(phase);
        }

        Ok(Self {
            frequency,
            frame_rate,
            frames_per_phase,
            phases,
            switch_frames,
        })
    }

    pub fn total_frames(&self) -> usize {
        self.phases.len()
    }

    pub fn phase(&self, frame: usize) -> Option<Phase> {
        self.phases.get(frame).copied()
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Frame indices at which the phase toggles.
    pub fn switch_frames(&self) -> &[usize] {
        &self.switch_frames
    }

    /// Toggle rate actually shown once the period is rounded to whole frames.
    pub fn effective_frequency(&self) -> f64 {
        self.frame_rate / self.frames_per_phase as f64
    }
}

/// Four elements on the corners of a square; one of them flickers in
/// counter-phase. The subject reports whether the odd element sits on the
/// cued side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlickerStimulus {
    pub schedule: FlickerSchedule,
    /// Corner index: 0 and 1 are on the left, 2 and 3 on the right
    pub odd_index: usize,
    pub cued_side: Side,
}

impl FlickerStimulus {
    pub fn new(
        rng: &mut impl Rng,
        duration_seconds: f64,
        frequency: f64,
        frame_rate: f64,
        cued_side: Side,
    ) -> Result<Self> {
        Ok(Self {
            schedule: FlickerSchedule::new(duration_seconds, frequency, frame_rate)?,
            odd_index: rng.random_range(0..4),
            cued_side,
        })
    }

    pub fn odd_side(&self) -> Side {
        if self.odd_index < 2 { Side::Left } else { Side::Right }
    }

    /// The answer a perfect subject would give.
    pub fn odd_on_cued_side(&self) -> bool {
        self.odd_side() == self.cued_side
    }

    /// Phase of corner `index` at `frame`; the odd corner is inverted.
    pub fn element_phase(&self, index: usize, frame: usize) -> Option<Phase> {
        let phase = self.schedule.phase(frame)?;
        Some(if index == self.odd_index { phase.toggled() } else { phase })
    }
}
