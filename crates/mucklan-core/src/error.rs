//! Unified error types for Mucklan.

use thiserror::Error;

/// Result type alias using MucklanError.
pub type Result<T> = std::result::Result<T, MucklanError>;

#[derive(Error, Debug)]
pub enum MucklanError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rotation needs as many tasks as residents (residents: {residents}, tasks: {tasks})")]
    RotationMismatch { residents: usize, tasks: usize },

    #[error("Rotation needs at least one resident and one task")]
    EmptyRotation,

    #[error("Rotation counter {counter} out of range for {tasks} tasks")]
    CounterOutOfRange { counter: usize, tasks: usize },

    #[error("Unknown payer group: {0}")]
    UnknownPayerGroup(String),

    // Bill errors
    #[error("No amount found in document")]
    NoAmountFound,

    #[error("Document error: {0}")]
    Document(String),

    #[error("Amount overflow: {0}")]
    AmountOverflow(String),

    // Channel errors
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("HTTP error: {0}")]
    Http(String),

    // Persistence / scheduling
    #[error("State store error: {0}")]
    State(String),

    #[error("Schedule error: {0}")]
    Schedule(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MucklanError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    pub fn document(msg: impl Into<String>) -> Self {
        Self::Document(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// True for errors that come from a broken configuration rather than a runtime fault.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::RotationMismatch { .. }
                | Self::EmptyRotation
                | Self::CounterOutOfRange { .. }
                | Self::UnknownPayerGroup(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MucklanError::RotationMismatch {
            residents: 3,
            tasks: 2,
        };
        let text = err.to_string();
        assert!(text.contains("residents: 3"));
        assert!(text.contains("tasks: 2"));
    }

    #[test]
    fn test_error_constructors() {
        assert!(matches!(MucklanError::config("x"), MucklanError::Config(_)));
        assert!(matches!(MucklanError::channel("x"), MucklanError::Channel(_)));
        assert!(matches!(MucklanError::document("x"), MucklanError::Document(_)));
        assert!(matches!(MucklanError::state("x"), MucklanError::State(_)));
    }

    #[test]
    fn test_config_classification() {
        assert!(MucklanError::EmptyRotation.is_config());
        assert!(MucklanError::UnknownPayerGroup("x".into()).is_config());
        assert!(!MucklanError::NoAmountFound.is_config());
        assert!(!MucklanError::AmountOverflow("total".into()).is_config());
        assert!(!MucklanError::channel("down").is_config());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MucklanError = io_err.into();
        assert!(matches!(err, MucklanError::Io(_)));
    }
}
