//! Error types for stockhand.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StockhandError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio relay errors
    #[error("Audio relay used after the transcription channel closed")]
    ChannelClosed,

    // Transcription backend errors
    #[error("Recognition exchange error: {message}")]
    Recognition { message: String },

    #[error("Transcription backend unavailable: {message}")]
    TranscriptionUnavailable { message: String },

    // Command interpretation errors
    #[error("Command interpretation failed: {message}")]
    InterpretationFailed { message: String },

    // Confirmation gate errors
    #[error("Confirmation does not match a pending command: {command_id}")]
    StaleConfirmation { command_id: String },

    // Dispatch errors
    #[error("Action credentials expired or rejected")]
    AuthExpired,

    #[error("External service error: {message}")]
    ExternalServiceError { message: String },

    #[error("Invalid command: {message}")]
    InvalidCommand { message: String },

    // Client connection errors
    #[error("Client connection error: {message}")]
    Connection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl StockhandError {
    /// Stable error kind string used in client-facing `error` frames.
    pub fn kind(&self) -> &'static str {
        match self {
            StockhandError::ConfigFileNotFound { .. }
            | StockhandError::ConfigInvalidValue { .. }
            | StockhandError::Config(_) => "config",
            StockhandError::ChannelClosed => "channel_closed",
            StockhandError::Recognition { .. } => "recognition",
            StockhandError::TranscriptionUnavailable { .. } => "transcription_unavailable",
            StockhandError::InterpretationFailed { .. } => "interpretation_failed",
            StockhandError::StaleConfirmation { .. } => "stale_confirmation",
            StockhandError::AuthExpired => "auth_expired",
            StockhandError::ExternalServiceError { .. } => "external_service_error",
            StockhandError::InvalidCommand { .. } => "invalid_command",
            StockhandError::Connection { .. } => "connection",
            StockhandError::Io(_) => "io",
            StockhandError::Other(_) => "other",
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, StockhandError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_channel_closed_display() {
        let error = StockhandError::ChannelClosed;
        assert_eq!(
            error.to_string(),
            "Audio relay used after the transcription channel closed"
        );
    }

    #[test]
    fn test_transcription_unavailable_display() {
        let error = StockhandError::TranscriptionUnavailable {
            message: "exchange failed twice".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Transcription backend unavailable: exchange failed twice"
        );
    }

    #[test]
    fn test_interpretation_failed_display() {
        let error = StockhandError::InterpretationFailed {
            message: "generation service timed out".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Command interpretation failed: generation service timed out"
        );
    }

    #[test]
    fn test_stale_confirmation_display() {
        let error = StockhandError::StaleConfirmation {
            command_id: "abc-123".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Confirmation does not match a pending command: abc-123"
        );
    }

    #[test]
    fn test_dispatch_error_displays() {
        assert_eq!(
            StockhandError::AuthExpired.to_string(),
            "Action credentials expired or rejected"
        );
        assert_eq!(
            StockhandError::ExternalServiceError {
                message: "503 from spreadsheet API".to_string(),
            }
            .to_string(),
            "External service error: 503 from spreadsheet API"
        );
        assert_eq!(
            StockhandError::InvalidCommand {
                message: "no executor for unknown".to_string(),
            }
            .to_string(),
            "Invalid command: no executor for unknown"
        );
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = StockhandError::ConfigInvalidValue {
            key: "session.confirmation_window".to_string(),
            message: "not a duration".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for session.confirmation_window: not a duration"
        );
    }

    #[test]
    fn test_error_kinds_are_stable() {
        assert_eq!(StockhandError::ChannelClosed.kind(), "channel_closed");
        assert_eq!(
            StockhandError::TranscriptionUnavailable {
                message: String::new(),
            }
            .kind(),
            "transcription_unavailable"
        );
        assert_eq!(
            StockhandError::InterpretationFailed {
                message: String::new(),
            }
            .kind(),
            "interpretation_failed"
        );
        assert_eq!(
            StockhandError::StaleConfirmation {
                command_id: String::new(),
            }
            .kind(),
            "stale_confirmation"
        );
        assert_eq!(StockhandError::AuthExpired.kind(), "auth_expired");
        assert_eq!(
            StockhandError::ExternalServiceError {
                message: String::new(),
            }
            .kind(),
            "external_service_error"
        );
        assert_eq!(
            StockhandError::InvalidCommand {
                message: String::new(),
            }
            .kind(),
            "invalid_command"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: StockhandError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_str = "invalid = toml = syntax";
        let toml_error = toml::from_str::<toml::Value>(toml_str).unwrap_err();
        let error: StockhandError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<StockhandError>();
        assert_sync::<StockhandError>();
    }
}
