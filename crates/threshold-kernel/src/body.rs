//! Moving point bodies and the quadrant spawner that places them.

use glam::DVec2;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::geometry::{Rect, normalized};

/// Stable identity of a body for the duration of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub usize);

/// A single moving element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub id: BodyId,
    pub position: DVec2,
    /// Unit direction of travel
    pub heading: DVec2,
    /// Displacement per frame
    pub speed: f64,
    pub radius: f64,
}

impl Body {
    pub fn new(id: BodyId, position: DVec2, heading: DVec2, speed: f64, radius: f64) -> Result<Self> {
        if !(radius > 0.0 && radius.is_finite()) {
            return Err(KernelError::invalid(format!("body radius {radius} must be > 0")));
        }
        if !(speed >= 0.0 && speed.is_finite()) {
            return Err(KernelError::invalid(format!("body speed {speed} must be >= 0")));
        }
        Ok(Self {
            id,
            position,
            heading: normalized(heading)?,
            speed,
            radius,
        })
    }
}

/// Place `count` bodies inside `region` without overlap.
///
/// Body `i` lands uniformly inside sub-quadrant `i mod 4`, inset by its
/// radius from the quadrant edges, with a uniformly random heading. Ids are
/// assigned from `first_id` upward and the resulting list is shuffled.
pub fn spawn_bodies(
    rng: &mut impl Rng,
    first_id: usize,
    count: usize,
    radius: f64,
    region: &Rect,
    speed: f64,
) -> Result<Vec<Body>> {
    region.validate()?;
    if count > 4 {
        return Err(KernelError::invalid(format!(
            "at most 4 bodies fit one per quadrant, asked for {count}"
        )));
    }
    let quadrants = region.quadrants();
    if let Some(q) = quadrants
        .iter()
        .find(|q| q.width() <= 2.0 * radius || q.height() <= 2.0 * radius)
    {
        return Err(KernelError::invalid(format!(
            "radius {radius} does not fit quadrant {q:?}"
        )));
    }

    let mut bodies = Vec::with_capacity(count);
    for i in 0..count {
        let q = &quadrants[i % 4];
        let position = DVec2::new(
            rng.random_range(q.x_min + radius..q.x_max - radius),
            rng.random_range(q.y_min + radius..q.y_max - radius),
        );
        let heading = loop {
            let candidate = DVec2::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0));
            if candidate != DVec2::ZERO {
                break candidate;
            }
        };
        bodies.push(Body::new(BodyId(first_id + i), position, heading, speed, radius)?);
    }

    bodies.shuffle(rng);
    Ok(bodies)
}
