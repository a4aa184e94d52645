//! Error taxonomy for the kernel.
//!
//! None of these are retried internally. `StaircaseExhausted` is the normal
//! end-of-run signal from the scheduler; everything else is either a setup
//! failure or a logic violation the operator needs to see.

use thiserror::Error;

/// Errors raised by staircases, the scheduler, geometry, and the simulator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum KernelError {
    /// Malformed staircase, session, or simulation parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Every staircase in the session has terminated.
    #[error("all staircases have terminated")]
    StaircaseExhausted,

    /// A response was delivered to a staircase that already finished.
    #[error("staircase '{label}' has already terminated")]
    StaircaseTerminated { label: String },

    /// A response was addressed to a label the session does not own.
    #[error("no staircase labelled '{label}' in this session")]
    UnknownCondition { label: String },

    /// Normalization of a zero-length vector.
    #[error("cannot normalize a zero-length vector")]
    DegenerateVector,

    /// The force field became undefined during simulation.
    #[error("degenerate simulation at frame {frame}, group {group}, body {body}: {reason}")]
    SimulationDegenerate {
        frame: usize,
        group: usize,
        body: usize,
        reason: &'static str,
    },
}

impl KernelError {
    /// Build an `InvalidConfiguration` from anything printable.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// True for the end-of-sequence signal rather than a failure.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::StaircaseExhausted)
    }
}

/// Result alias used throughout the kernel.
pub type Result<T> = std::result::Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_is_not_a_failure_signal() {
        assert!(KernelError::StaircaseExhausted.is_exhausted());
        assert!(!KernelError::DegenerateVector.is_exhausted());
        assert!(!KernelError::invalid("x").is_exhausted());
    }

    #[test]
    fn test_messages_name_the_offender() {
        let err = KernelError::StaircaseTerminated {
            label: "Unilateral-Left_0".to_string(),
        };
        assert!(err.to_string().contains("Unilateral-Left_0"));

        let err = KernelError::SimulationDegenerate {
            frame: 12,
            group: 1,
            body: 3,
            reason: "coincident bodies",
        };
        let msg = err.to_string();
        assert!(msg.contains("frame 12"));
        assert!(msg.contains("coincident bodies"));
    }
}
