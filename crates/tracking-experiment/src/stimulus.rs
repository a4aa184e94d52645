//! Trial stimuli for the tracking paradigm.
//!
//! Two rectangular regions sit left and right of the fixation point. Each
//! region gets its own group of bodies, spawned one per sub-quadrant. Two
//! bodies per target side are cued by blinking, then every group moves for
//! the stimulus duration and a probe body on the reported side is
//! highlighted. The subject answers whether the probe was a cued target.

use anyhow::{Result, bail};
use glam::DVec2;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use threshold_kernel::{
    BodyId, ConditionKind, ForceParams, Group, GroupId, Rect, Side, Trajectory, simulate,
    spawn_bodies,
};

use crate::contrast::ContrastStimulus;
use crate::flicker::{FlickerSchedule, FlickerStimulus};

/// Bodies cued as targets in each target region.
pub const TARGETS_PER_REGION: usize = 2;

/// Display geometry and timing, in centimetres and seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StimulusConfig {
    /// Width of each region
    pub rect_width: f64,
    /// Height of each region
    pub rect_height: f64,
    /// Horizontal gap between the two regions, centred on fixation
    pub displacement: f64,
    /// Bodies spawned per region (1..=4, one per sub-quadrant)
    pub bodies_per_region: usize,
    pub body_radius: f64,
    /// Motion phase length
    pub duration_seconds: f64,
    /// Target cue (and flicker stimulus) length
    pub blink_time: f64,
    /// Toggle rate of the target cue
    pub cue_frequency: f64,
    /// Display refresh rate
    pub frame_rate: f64,
}

impl Default for StimulusConfig {
    fn default() -> Self {
        Self {
            rect_width: 6.0,
            rect_height: 6.0,
            displacement: 4.0,
            bodies_per_region: 4,
            body_radius: 0.25,
            duration_seconds: 2.0,
            blink_time: 1.0,
            cue_frequency: 8.0,
            frame_rate: 60.0,
        }
    }
}

impl StimulusConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=4).contains(&self.bodies_per_region) {
            bail!(
                "bodies_per_region must be between 1 and 4, got {}",
                self.bodies_per_region
            );
        }
        if !(self.displacement >= 0.0) {
            bail!("displacement must be >= 0, got {}", self.displacement);
        }
        for side in Side::both() {
            self.region(side)?;
        }
        Ok(())
    }

    /// Bounding rectangle of one side.
    pub fn region(&self, side: Side) -> Result<Rect> {
        let half_gap = self.displacement / 2.0;
        let half_height = self.rect_height / 2.0;
        let rect = match side {
            Side::Left => Rect::new(
                -self.rect_width - half_gap,
                -half_height,
                -half_gap,
                half_height,
            )?,
            Side::Right => Rect::new(
                half_gap,
                -half_height,
                self.rect_width + half_gap,
                half_height,
            )?,
        };
        Ok(rect)
    }

    /// Per-frame displacement for a speed in cm/s.
    pub fn speed_per_frame(&self, speed: f64) -> f64 {
        speed / self.frame_rate
    }
}

pub fn group_id(side: Side) -> GroupId {
    match side {
        Side::Left => GroupId(0),
        Side::Right => GroupId(1),
    }
}

/// Everything needed to present one tracking trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingStimulus {
    /// Groups at their starting positions, left then right
    pub initial: Vec<Group>,
    /// Cued bodies
    pub targets: Vec<BodyId>,
    /// Body highlighted after the motion phase
    pub probe: BodyId,
    /// Blink pattern of the targets before motion starts
    pub cue: FlickerSchedule,
    pub trajectory: Trajectory,
    /// Speed in cm/s the trajectory was generated for
    pub speed: f64,
}

impl TrackingStimulus {
    /// Spawn, cue, and precompute the motion for one trial.
    pub fn generate(
        rng: &mut impl Rng,
        config: &StimulusConfig,
        kind: ConditionKind,
        side: Side,
        speed: f64,
    ) -> Result<Self> {
        config.validate()?;
        if !(speed >= 0.0 && speed.is_finite()) {
            bail!("speed {speed} must be finite and >= 0");
        }
        let per_frame = config.speed_per_frame(speed);
        let n = config.bodies_per_region;

        let mut groups = Vec::with_capacity(2);
        for (g, region_side) in Side::both().into_iter().enumerate() {
            let region = config.region(region_side)?;
            let bodies = spawn_bodies(rng, g * n, n, config.body_radius, &region, per_frame)?;
            groups.push(Group::new(group_id(region_side), bodies, region)?);
        }

        let mut targets = Vec::new();
        for target_side in kind.target_sides() {
            let group = &groups[group_id(target_side).0];
            targets.extend(group.bodies.iter().take(TARGETS_PER_REGION).map(|b| b.id));
        }

        let probe = match groups[group_id(side).0].bodies.choose(rng) {
            Some(body) => body.id,
            None => bail!("no bodies on the {} side", side.name()),
        };

        let cue = FlickerSchedule::new(config.blink_time, config.cue_frequency, config.frame_rate)?;

        let initial = groups.clone();
        let trajectory = simulate(
            &mut groups,
            per_frame,
            config.duration_seconds,
            config.frame_rate,
            &ForceParams::scaled_for_speed(speed),
        )?;

        debug!(
            kind = kind.name(),
            side = side.name(),
            speed,
            frames = trajectory.len(),
            targets = targets.len(),
            "Tracking stimulus generated"
        );

        Ok(Self {
            initial,
            targets,
            probe,
            cue,
            trajectory,
            speed,
        })
    }

    pub fn probe_is_target(&self) -> bool {
        self.targets.contains(&self.probe)
    }

    /// Summary of the motion, for inspection and sanity checks.
    pub fn stats(&self) -> TrajectoryStats {
        let frame_rate = self.trajectory.frame_rate();
        let mut step_sum = 0.0;
        let mut steps = 0usize;
        let mut max_step_error: f64 = 0.0;
        let expected = self.speed / frame_rate;
        let mut outside = 0usize;
        let mut min_separation = f64::INFINITY;

        for group in &self.initial {
            for body in &group.bodies {
                let mut previous = body.position;
                for position in self.trajectory.path(body.id) {
                    let step = (position - previous).length();
                    step_sum += step;
                    steps += 1;
                    max_step_error = max_step_error.max((step - expected).abs());
                    if !group.region.contains(position) {
                        outside += 1;
                    }
                    previous = position;
                }
            }
        }

        for frame in self.trajectory.frames() {
            for group in &self.initial {
                let positions: Vec<DVec2> = group
                    .bodies
                    .iter()
                    .filter_map(|b| frame.position(b.id))
                    .collect();
                for (i, a) in positions.iter().enumerate() {
                    for b in &positions[i + 1..] {
                        min_separation = min_separation.min((*a - *b).length());
                    }
                }
            }
        }

        TrajectoryStats {
            frames: self.trajectory.len(),
            bodies: self.initial.iter().map(|g| g.bodies.len()).sum(),
            mean_step: if steps == 0 { 0.0 } else { step_sum / steps as f64 },
            max_step_error,
            min_separation,
            samples_outside_region: outside,
        }
    }
}

/// Motion summary of a tracking stimulus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryStats {
    pub frames: usize,
    pub bodies: usize,
    /// Mean displacement per frame
    pub mean_step: f64,
    /// Largest deviation of a single step from the nominal per-frame speed
    pub max_step_error: f64,
    /// Closest approach of two bodies in the same region
    pub min_separation: f64,
    /// Body positions found outside their region
    pub samples_outside_region: usize,
}

/// Stimulus presented on one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stimulus {
    Tracking(TrackingStimulus),
    Flicker(FlickerStimulus),
    Contrast(ContrastStimulus),
}

impl Stimulus {
    /// Whether the right answer is "yes" (probe was a target, odd element on the cued side).
    pub fn expects_yes(&self) -> bool {
        match self {
            Stimulus::Tracking(t) => t.probe_is_target(),
            Stimulus::Flicker(f) => f.odd_on_cued_side(),
            Stimulus::Contrast(c) => c.expects_yes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_regions_flank_fixation() {
        let config = StimulusConfig::default();
        let left = config.region(Side::Left).unwrap();
        let right = config.region(Side::Right).unwrap();
        assert_eq!(left.x_min, -8.0);
        assert_eq!(left.x_max, -2.0);
        assert_eq!(right.x_min, 2.0);
        assert_eq!(right.x_max, 8.0);
        assert_eq!(left.y_min, -3.0);
        assert_eq!(right.y_max, 3.0);
    }

    #[test]
    fn test_unilateral_targets_on_one_side() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let config = StimulusConfig::default();
        let stim = TrackingStimulus::generate(
            &mut rng,
            &config,
            ConditionKind::Unilateral(Side::Right),
            Side::Right,
            3.0,
        )
        .unwrap();

        assert_eq!(stim.targets.len(), 2);
        let right = &stim.initial[1];
        for t in &stim.targets {
            assert!(right.body(*t).is_some(), "target {t:?} not on the right");
        }
        assert!(right.body(stim.probe).is_some());
        assert_eq!(stim.trajectory.len(), 120);
        assert_eq!(stim.cue.total_frames(), 60);
    }

    #[test]
    fn test_bilateral_targets_on_both_sides() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let stim = TrackingStimulus::generate(
            &mut rng,
            &StimulusConfig::default(),
            ConditionKind::Bilateral,
            Side::Left,
            2.5,
        )
        .unwrap();
        assert_eq!(stim.targets.len(), 4);
        for group in &stim.initial {
            let in_group = stim
                .targets
                .iter()
                .filter(|t| group.body(**t).is_some())
                .count();
            assert_eq!(in_group, 2);
        }
        assert!(stim.initial[0].body(stim.probe).is_some());
    }

    #[test]
    fn test_probe_hits_target_about_half_the_time() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut config = StimulusConfig::default();
        config.duration_seconds = 0.1;
        let n = 400;
        let mut hits = 0;
        for _ in 0..n {
            let stim = TrackingStimulus::generate(
                &mut rng,
                &config,
                ConditionKind::Unilateral(Side::Left),
                Side::Left,
                4.0,
            )
            .unwrap();
            if stim.probe_is_target() {
                hits += 1;
            }
        }
        let rate = hits as f64 / n as f64;
        assert!((rate - 0.5).abs() < 0.1, "probe hit rate {rate}");
    }

    #[test]
    fn test_motion_keeps_nominal_speed() {
        let mut rng = ChaCha8Rng::seed_from_u64(10);
        let stim = TrackingStimulus::generate(
            &mut rng,
            &StimulusConfig::default(),
            ConditionKind::Bilateral,
            Side::Right,
            5.0,
        )
        .unwrap();
        let stats = stim.stats();
        assert_eq!(stats.bodies, 8);
        assert_eq!(stats.frames, 120);
        assert!(stats.max_step_error < 1e-9, "step error {}", stats.max_step_error);
        assert!((stats.mean_step - 5.0 / 60.0).abs() < 1e-9);
        assert!(stats.min_separation > 0.0);
    }

    #[test]
    fn test_too_many_bodies_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let config = StimulusConfig {
            bodies_per_region: 5,
            ..StimulusConfig::default()
        };
        assert!(
            TrackingStimulus::generate(
                &mut rng,
                &config,
                ConditionKind::Bilateral,
                Side::Left,
                1.0
            )
            .is_err()
        );
    }
}
