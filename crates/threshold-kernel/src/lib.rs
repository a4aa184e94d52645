//! Threshold Kernel: adaptive staircases and precomputed multi-body motion
//!
//! This crate holds the two algorithmic cores of a perceptual-threshold
//! experiment: interleaved transformed up/down staircases with catch-trial
//! injection, and a deterministic simulator that precomputes the paths of
//! bodies confined to rectangular regions under a synthetic force field.
//!
//! Everything here is synchronous and free of I/O. Rendering, input, and
//! persistence belong to the caller.

pub mod body;
pub mod config;
pub mod error;
pub mod geometry;
pub mod scheduler;
pub mod staircase;
pub mod trajectory;

pub use body::{Body, BodyId, spawn_bodies};
pub use config::{
    ConditionConfig, ConditionKind, ForceParams, KindTag, SelectionPolicy, SessionConfig, Side,
    StepType,
};
pub use error::{KernelError, Result};
pub use geometry::{Polar, Rect, cartesian_to_polar, normalized, polar_to_cartesian, rectangle_center};
pub use scheduler::{StaircaseSession, Trial};
pub use staircase::{Direction, ResponseRecord, Staircase, StepResult};
pub use trajectory::{Frame, Group, GroupId, MAX_FRAMES, Trajectory, frame_count, simulate};
