//! Error types shared by the acoustic link crates.

use std::fmt;

/// Errors that can surface from the audio port / sample-queue layer (L0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreError {
    /// The host has no usable audio input/output driver.
    AudioUnavailable,
    /// An operation was attempted on a port that has not been started.
    NotRunning,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::AudioUnavailable => write!(f, "no audio input/output device available"),
            CoreError::NotRunning => write!(f, "audio port is not running"),
        }
    }
}

impl std::error::Error for CoreError {}

/// Result type alias for `aflink_core` operations.
pub type Result<T> = std::result::Result<T, CoreError>;
