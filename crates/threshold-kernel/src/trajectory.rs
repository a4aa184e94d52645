//! Precomputed trajectories for groups of bodies confined to rectangles.
//!
//! The whole trajectory is materialized before playback, so no force is
//! ever evaluated while frames are being shown.
//!
//! ## Update order
//!
//! Groups are processed in ascending `GroupId`; inside a group, bodies are
//! processed in their index order within `Group::bodies`. Updates are applied
//! in place, so a body sees the already-moved positions of the bodies before
//! it in the same frame. Given the same initial bodies this order makes the
//! output bit-for-bit reproducible.
//!
//! ## Per-body step
//!
//! ```text
//! F  = Σ_other  k_rep · r·r' · Δ / |Δ|⁴          pairwise repulsion
//!    + Σ_edges  ± k_edge / d_edge²               push inward, per axis
//!    − (p − center)                              spring to the centroid
//! d  = normalize(d + c · F) · speed               direction only changes
//! p += d
//! ```
//!
//! `d` starts as the body's unit heading, so the first frame steers a unit
//! vector and every later frame steers a vector of length `speed`.

use glam::DVec2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::body::{Body, BodyId};
use crate::config::ForceParams;
use crate::error::{KernelError, Result};
use crate::geometry::{Rect, normalized};

/// Identity of a group (one bounding region).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub usize);

/// Bodies sharing one bounding region. Forces only act within a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub bodies: Vec<Body>,
    pub region: Rect,
}

impl Group {
    pub fn new(id: GroupId, bodies: Vec<Body>, region: Rect) -> Result<Self> {
        region.validate()?;
        if bodies.is_empty() {
            return Err(KernelError::invalid(format!("group {} has no bodies", id.0)));
        }
        Ok(Self { id, bodies, region })
    }

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.iter().find(|b| b.id == id)
    }
}

/// Positions of every body at one simulation step, in processing order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    positions: Vec<(BodyId, DVec2)>,
}

impl Frame {
    fn with_capacity(n: usize) -> Self {
        Self {
            positions: Vec::with_capacity(n),
        }
    }

    pub fn position(&self, id: BodyId) -> Option<DVec2> {
        self.positions
            .iter()
            .find_map(|(bid, p)| (*bid == id).then_some(*p))
    }

    pub fn iter(&self) -> impl Iterator<Item = &(BodyId, DVec2)> {
        self.positions.iter()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Fixed-length sequence of frames for one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    frame_rate: f64,
    frames: Vec<Frame>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    /// Positions of one body across all frames.
    pub fn path(&self, id: BodyId) -> Vec<DVec2> {
        self.frames.iter().filter_map(|f| f.position(id)).collect()
    }
}

impl IntoIterator for Trajectory {
    type Item = Frame;
    type IntoIter = std::vec::IntoIter<Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}

/// Longest trajectory `simulate` will materialize (over four hours at 60 Hz).
pub const MAX_FRAMES: usize = 1_000_000;

/// Number of frames for a stimulus of `duration_seconds` at `frame_rate` Hz.
pub fn frame_count(duration_seconds: f64, frame_rate: f64) -> Result<usize> {
    if !(duration_seconds >= 0.0 && duration_seconds.is_finite()) {
        return Err(KernelError::invalid(format!(
            "duration {duration_seconds} must be finite and >= 0"
        )));
    }
    if !(frame_rate > 0.0 && frame_rate.is_finite()) {
        return Err(KernelError::invalid(format!("frame rate {frame_rate} must be > 0")));
    }
    let frames = (duration_seconds * frame_rate).round();
    if frames > MAX_FRAMES as f64 {
        return Err(KernelError::invalid(format!(
            "{duration_seconds} s at {frame_rate} Hz is {frames} frames, more than {MAX_FRAMES}"
        )));
    }
    Ok(frames as usize)
}

/// Precompute the motion of every group for one trial.
///
/// `speed` is the displacement per frame and is written into every body
/// before the first step. Bodies are left at their final state.
pub fn simulate(
    groups: &mut [Group],
    speed: f64,
    duration_seconds: f64,
    frame_rate: f64,
    forces: &ForceParams,
) -> Result<Trajectory> {
    forces.validate()?;
    if !(speed >= 0.0 && speed.is_finite()) {
        return Err(KernelError::invalid(format!("speed {speed} must be finite and >= 0")));
    }
    let n_frames = frame_count(duration_seconds, frame_rate)?;

    let mut order: Vec<usize> = (0..groups.len()).collect();
    order.sort_by_key(|&i| groups[i].id);
    check_identities(groups, &order)?;

    let n_bodies: usize = groups.iter().map(|g| g.bodies.len()).sum();
    for body in groups.iter_mut().flat_map(|g| g.bodies.iter_mut()) {
        body.speed = speed;
    }

    debug!(
        frames = n_frames,
        groups = groups.len(),
        bodies = n_bodies,
        speed,
        "Precomputing trajectory"
    );

    let mut directions: Vec<Vec<DVec2>> = groups
        .iter()
        .map(|g| g.bodies.iter().map(|b| b.heading).collect())
        .collect();

    let mut frames = Vec::with_capacity(n_frames);
    for frame_idx in 0..n_frames {
        let mut frame = Frame::with_capacity(n_bodies);
        for &gi in &order {
            step_group(&mut groups[gi], &mut directions[gi], frame_idx, forces, &mut frame)?;
        }
        frames.push(frame);
    }

    Ok(Trajectory { frame_rate, frames })
}

fn check_identities(groups: &[Group], order: &[usize]) -> Result<()> {
    for pair in order.windows(2) {
        if groups[pair[0]].id == groups[pair[1]].id {
            return Err(KernelError::invalid(format!(
                "duplicate group id {}",
                groups[pair[0]].id.0
            )));
        }
    }
    let mut ids: Vec<BodyId> = groups
        .iter()
        .flat_map(|g| g.bodies.iter().map(|b| b.id))
        .collect();
    ids.sort();
    if let Some(dup) = ids.windows(2).find(|w| w[0] == w[1]) {
        return Err(KernelError::invalid(format!("duplicate body id {}", dup[0].0)));
    }
    for group in groups {
        group.region.validate()?;
    }
    Ok(())
}

fn step_group(
    group: &mut Group,
    directions: &mut [DVec2],
    frame_idx: usize,
    forces: &ForceParams,
    frame: &mut Frame,
) -> Result<()> {
    let region = group.region;
    let center = region.center();

    for i in 0..group.bodies.len() {
        let body = &group.bodies[i];
        let pos = body.position;
        let degenerate = |reason| KernelError::SimulationDegenerate {
            frame: frame_idx,
            group: group.id.0,
            body: body.id.0,
            reason,
        };

        let mut force = DVec2::ZERO;
        for (j, other) in group.bodies.iter().enumerate() {
            if j == i {
                continue;
            }
            let delta = pos - other.position;
            let dist2 = delta.length_squared();
            if dist2 == 0.0 {
                return Err(degenerate("coincident bodies"));
            }
            force += forces.repulsion_strength * (body.radius * other.radius) * delta
                / (dist2 * dist2);
        }

        force += edge_force(&region, pos, forces.edge_repulsion_strength);
        force -= pos - center;

        if !force.is_finite() {
            return Err(degenerate("non-finite force"));
        }

        let speed = body.speed;
        if speed > 0.0 {
            let heading = normalized(directions[i] + forces.center_attraction * force)?;
            directions[i] = heading * speed;
            let body = &mut group.bodies[i];
            body.heading = heading;
            body.position += directions[i];
        }

        let body = &group.bodies[i];
        frame.positions.push((body.id, body.position));
    }
    Ok(())
}

/// Inverse-square push away from each of the four edges.
fn edge_force(region: &Rect, pos: DVec2, strength: f64) -> DVec2 {
    if strength == 0.0 {
        return DVec2::ZERO;
    }
    DVec2::new(
        strength / (region.x_min - pos.x).powi(2) - strength / (region.x_max - pos.x).powi(2),
        strength / (region.y_min - pos.y).powi(2) - strength / (region.y_max - pos.y).powi(2),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn body(id: usize, x: f64, y: f64, hx: f64, hy: f64) -> Body {
        Body::new(BodyId(id), DVec2::new(x, y), DVec2::new(hx, hy), 0.0, 0.25).unwrap()
    }

    fn square() -> Rect {
        Rect::new(-3.0, -3.0, 3.0, 3.0).unwrap()
    }

    #[test]
    fn test_frame_count_rounds() {
        assert_eq!(frame_count(2.0, 60.0).unwrap(), 120);
        assert_eq!(frame_count(1.0, 59.95).unwrap(), 60);
        assert_eq!(frame_count(0.0, 60.0).unwrap(), 0);
        assert!(frame_count(1.0, 0.0).is_err());
    }

    #[test]
    fn test_frame_count_rejects_runaway_durations() {
        assert_eq!(frame_count(MAX_FRAMES as f64 / 60.0, 60.0).unwrap(), MAX_FRAMES);
        assert!(matches!(
            frame_count(1e300, 60.0),
            Err(KernelError::InvalidConfiguration(_))
        ));
        let mut groups = vec![
            Group::new(GroupId(0), vec![body(0, -1.0, 0.0, 1.0, 0.0)], square()).unwrap(),
        ];
        assert!(simulate(&mut groups, 0.1, 1e12, 60.0, &ForceParams::NONE).is_err());
    }

    #[test]
    fn test_first_frame_steers_unit_heading() {
        let start = DVec2::new(1.0, 0.5);
        let mut groups = vec![
            Group::new(GroupId(0), vec![body(0, start.x, start.y, 0.0, 1.0)], square()).unwrap(),
        ];
        let forces = ForceParams {
            repulsion_strength: 0.0,
            edge_repulsion_strength: 50.0,
            center_attraction: 0.01,
        };
        let speed = 5.0 / 60.0;
        let traj = simulate(&mut groups, speed, 2.0 / 60.0, 60.0, &forces).unwrap();
        assert_eq!(traj.len(), 2);

        // square() is centered on the origin
        let force_at = |p: DVec2| {
            DVec2::new(
                50.0 / (-3.0 - p.x).powi(2) - 50.0 / (3.0 - p.x).powi(2),
                50.0 / (-3.0 - p.y).powi(2) - 50.0 / (3.0 - p.y).powi(2),
            ) - p
        };
        let d0 = (DVec2::Y + 0.01 * force_at(start)).normalize() * speed;
        let p0 = start + d0;
        let d1 = (d0 + 0.01 * force_at(p0)).normalize() * speed;
        let p1 = p0 + d1;

        let got0 = traj.frames()[0].position(BodyId(0)).unwrap();
        assert_abs_diff_eq!(got0.x, 0.99101, epsilon = 1e-5);
        assert_abs_diff_eq!(got0.y, 0.58285, epsilon = 1e-5);
        assert_abs_diff_eq!(got0.x, p0.x, epsilon = 1e-12);
        assert_abs_diff_eq!(got0.y, p0.y, epsilon = 1e-12);
        let got1 = traj.frames()[1].position(BodyId(0)).unwrap();
        assert_abs_diff_eq!(got1.x, p1.x, epsilon = 1e-12);
        assert_abs_diff_eq!(got1.y, p1.y, epsilon = 1e-12);
    }

    #[test]
    fn test_no_forces_means_straight_lines() {
        let mut groups = vec![
            Group::new(GroupId(0), vec![body(0, -1.0, -1.0, 1.0, 0.5), body(1, 1.0, 1.0, -0.3, 1.0)], square())
                .unwrap(),
        ];
        let initial: Vec<DVec2> = groups[0].bodies.iter().map(|b| b.heading).collect();
        let traj = simulate(&mut groups, 0.01, 1.0, 60.0, &ForceParams::NONE).unwrap();

        for (k, b) in groups[0].bodies.iter().enumerate() {
            assert_abs_diff_eq!(b.heading.x, initial[k].x, epsilon = 1e-12);
            assert_abs_diff_eq!(b.heading.y, initial[k].y, epsilon = 1e-12);
            let path = traj.path(b.id);
            for w in path.windows(2) {
                let step = w[1] - w[0];
                assert_abs_diff_eq!(step.length(), 0.01, epsilon = 1e-12);
                assert_abs_diff_eq!(step.x / 0.01, initial[k].x, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_speed_preserved_under_forces() {
        let mut groups = vec![
            Group::new(
                GroupId(0),
                vec![
                    body(0, -1.5, -1.5, 1.0, 0.0),
                    body(1, 1.5, -1.5, 0.0, 1.0),
                    body(2, -1.5, 1.5, -1.0, -1.0),
                    body(3, 1.5, 1.5, 1.0, -1.0),
                ],
                square(),
            )
            .unwrap(),
        ];
        let speed = 5.0 / 60.0;
        let forces = ForceParams::scaled_for_speed(5.0);
        let traj = simulate(&mut groups, speed, 2.0, 60.0, &forces).unwrap();
        assert_eq!(traj.len(), 120);

        for id in 0..4 {
            let path = traj.path(BodyId(id));
            assert_eq!(path.len(), 120);
            for w in path.windows(2) {
                assert_abs_diff_eq!((w[1] - w[0]).length(), speed, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_groups_processed_in_id_order() {
        let right = Rect::new(2.0, -3.0, 8.0, 3.0).unwrap();
        let left = Rect::new(-8.0, -3.0, -2.0, 3.0).unwrap();
        let mut groups = vec![
            Group::new(GroupId(1), vec![body(10, 5.0, 0.0, 1.0, 0.0)], right).unwrap(),
            Group::new(GroupId(0), vec![body(20, -5.0, 0.0, 1.0, 0.0)], left).unwrap(),
        ];
        let traj = simulate(&mut groups, 0.05, 0.1, 60.0, &ForceParams::NONE).unwrap();
        let first: Vec<BodyId> = traj.frames()[0].iter().map(|(id, _)| *id).collect();
        assert_eq!(first, vec![BodyId(20), BodyId(10)]);
    }

    #[test]
    fn test_coincident_bodies_are_fatal() {
        let mut groups = vec![
            Group::new(
                GroupId(0),
                vec![body(0, 0.5, 0.5, 1.0, 0.0), body(1, 0.5, 0.5, 0.0, 1.0)],
                square(),
            )
            .unwrap(),
        ];
        let err = simulate(&mut groups, 0.1, 1.0, 60.0, &ForceParams::scaled_for_speed(1.0)).unwrap_err();
        assert!(matches!(
            err,
            KernelError::SimulationDegenerate {
                frame: 0,
                reason: "coincident bodies",
                ..
            }
        ));
    }

    #[test]
    fn test_body_on_edge_is_fatal() {
        let mut groups = vec![
            Group::new(GroupId(0), vec![body(0, 3.0, 0.0, 1.0, 0.0)], square()).unwrap(),
        ];
        let err = simulate(&mut groups, 0.1, 1.0, 60.0, &ForceParams::scaled_for_speed(1.0)).unwrap_err();
        assert!(matches!(
            err,
            KernelError::SimulationDegenerate {
                reason: "non-finite force",
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_body_ids_rejected() {
        let mut groups = vec![
            Group::new(GroupId(0), vec![body(0, -1.0, 0.0, 1.0, 0.0)], square()).unwrap(),
            Group::new(GroupId(1), vec![body(0, 1.0, 0.0, 1.0, 0.0)], square()).unwrap(),
        ];
        assert!(matches!(
            simulate(&mut groups, 0.1, 1.0, 60.0, &ForceParams::NONE),
            Err(KernelError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_zero_speed_keeps_bodies_still() {
        let mut groups = vec![
            Group::new(GroupId(0), vec![body(0, -1.0, 0.0, 1.0, 0.0)], square()).unwrap(),
        ];
        let traj = simulate(&mut groups, 0.0, 0.5, 60.0, &ForceParams::scaled_for_speed(0.0)).unwrap();
        assert!(traj.path(BodyId(0)).iter().all(|p| *p == DVec2::new(-1.0, 0.0)));
    }
}
