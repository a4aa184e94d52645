//! Plane geometry helpers shared by the body spawner and the simulator.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// Unit vector in the direction of `v`.
///
/// Fails on a zero or non-finite vector instead of producing NaNs.
pub fn normalized(v: DVec2) -> Result<DVec2> {
    let norm = v.length();
    if norm == 0.0 || !norm.is_finite() {
        return Err(KernelError::DegenerateVector);
    }
    Ok(v / norm)
}

/// Polar coordinates: magnitude and angle in radians, angle in (-π, π].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Polar {
    pub magnitude: f64,
    pub angle: f64,
}

pub fn cartesian_to_polar(v: DVec2) -> Polar {
    Polar {
        magnitude: v.length(),
        angle: v.y.atan2(v.x),
    }
}

pub fn polar_to_cartesian(p: Polar) -> DVec2 {
    DVec2::new(p.magnitude * p.angle.cos(), p.magnitude * p.angle.sin())
}

/// Axis-aligned rectangle with `x_min < x_max` and `y_min < y_max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl Rect {
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Result<Self> {
        let rect = Self {
            x_min,
            y_min,
            x_max,
            y_max,
        };
        rect.validate()?;
        Ok(rect)
    }

    pub fn validate(&self) -> Result<()> {
        let finite = [self.x_min, self.y_min, self.x_max, self.y_max]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.x_min >= self.x_max || self.y_min >= self.y_max {
            return Err(KernelError::invalid(format!("degenerate rectangle {self:?}")));
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Midpoint of the diagonal.
    pub fn center(&self) -> DVec2 {
        rectangle_center(self)
    }

    /// Strict interior test.
    pub fn contains(&self, p: DVec2) -> bool {
        p.x > self.x_min && p.x < self.x_max && p.y > self.y_min && p.y < self.y_max
    }

    /// The four sub-quadrants: bottom-left, bottom-right, top-left, top-right.
    pub fn quadrants(&self) -> [Rect; 4] {
        let c = self.center();
        [
            Rect {
                x_min: self.x_min,
                y_min: self.y_min,
                x_max: c.x,
                y_max: c.y,
            },
            Rect {
                x_min: c.x,
                y_min: self.y_min,
                x_max: self.x_max,
                y_max: c.y,
            },
            Rect {
                x_min: self.x_min,
                y_min: c.y,
                x_max: c.x,
                y_max: self.y_max,
            },
            Rect {
                x_min: c.x,
                y_min: c.y,
                x_max: self.x_max,
                y_max: self.y_max,
            },
        ]
    }
}

pub fn rectangle_center(rect: &Rect) -> DVec2 {
    DVec2::new(
        (rect.x_min + rect.x_max) / 2.0,
        (rect.y_min + rect.y_max) / 2.0,
    )
}
