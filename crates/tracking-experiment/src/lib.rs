//! Tracking Experiment: simulated perceptual-threshold sessions.
//!
//! This crate drives the threshold kernel the way a laboratory session does:
//! - Expands a block of conditions into interleaved staircases
//! - Generates a tracking, flicker, or contrast stimulus for every trial
//! - Lets a simulated observer answer, mixing in catch and training trials
//! - Streams every trial to a JSON-lines log and saves a summary at the end
//! - Runs fixed-intensity (constant stimuli) blocks as an alternative to staircases

pub mod constant;
pub mod contrast;
pub mod experiment;
pub mod flicker;
pub mod observer;
pub mod psychometric;
pub mod results;
pub mod stimulus;
