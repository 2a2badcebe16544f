//! Error types for the control core.
//!
//! Mirrors the error taxonomy of spec §7: transient I/O (tracker gap, sensor
//! gap, single failed driver poll) is absorbed by callers and never surfaces
//! here. `ControlError` covers everything else that can legitimately fail a
//! tick or a startup step, using `thiserror` so it composes with `?`
//! throughout the crate. `anyhow` is reserved for the bootstrap binary.

use thiserror::Error;

/// Convenience alias for results using the crate's error type.
pub type ControlResult<T> = std::result::Result<T, ControlError>;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("configuration validation error: {0}")]
    Configuration(String),

    #[error("unknown robot driver: {0}")]
    UnknownRobot(String),

    #[error("unknown movement algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("robot driver error: {0}")]
    Driver(String),

    #[error("robot is not connected")]
    NotConnected,

    #[error("tracker-to-robot transform is not set")]
    TransformNotSet,

    #[error("calibration system is singular; keeping prior transform")]
    SingularCalibration,

    #[error("calibration requires at least 4 paired samples, got {0}")]
    InsufficientSamples(usize),

    #[error("calibration sample sequences have mismatched lengths: {0} vs {1}")]
    MismatchedSamples(usize, usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ControlError::Driver("stop timed out".to_string());
        assert_eq!(err.to_string(), "robot driver error: stop timed out");
    }

    #[test]
    fn test_unknown_robot_display() {
        let err = ControlError::UnknownRobot("acme".to_string());
        assert_eq!(err.to_string(), "unknown robot driver: acme");
    }
}
