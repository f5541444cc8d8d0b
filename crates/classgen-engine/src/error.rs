//! Error types for the classgen generation engine.
//!
//! This module defines the error hierarchy for configuration loading,
//! connection sessions, and remote generation failures.

use std::path::PathBuf;

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while configuring or driving generation sessions.
///
/// Error variants are organized by subsystem and include actionable suggestions
/// where possible.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your classgen.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// No endpoint is configured for a purpose.
    #[error("Unknown purpose '{purpose}'\n\nSuggestion: Add it to the 'purposes' map in classgen.json")]
    UnknownPurpose {
        /// The purpose key that was requested.
        purpose: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// A prompt was sent while the session had no open transport.
    #[error("Not connected to the generation service ({identity} is {state})\n\nSuggestion: Wait for the connection to open and try again")]
    NotConnected {
        /// The session identity.
        identity: String,
        /// The session state at the time of the send.
        state: String,
    },

    /// A prompt was sent while another generation was still streaming.
    #[error("A generation is already in progress for {identity}\n\nSuggestion: Wait for it to finish before sending another prompt")]
    Busy {
        /// The session identity.
        identity: String,
    },

    /// The session was closed, either by the caller or by a newer session.
    #[error("Session {identity} is closed")]
    SessionClosed {
        /// The session identity.
        identity: String,
    },

    /// The transport could not be opened or failed while in use.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// The generation service reported an error for the request.
    #[error("Generation failed: {message}")]
    Generation {
        /// The message sent by the service.
        message: String,
    },

    // ========================================================================
    // General Errors
    // ========================================================================
    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `UnknownPurpose` error.
    #[must_use]
    pub fn unknown_purpose(purpose: impl Into<String>) -> Self {
        Self::UnknownPurpose {
            purpose: purpose.into(),
        }
    }

    /// Creates a new `NotConnected` error.
    #[must_use]
    pub fn not_connected(identity: impl std::fmt::Display, state: impl std::fmt::Display) -> Self {
        Self::NotConnected {
            identity: identity.to_string(),
            state: state.to_string(),
        }
    }

    /// Creates a new `Busy` error.
    #[must_use]
    pub fn busy(identity: impl std::fmt::Display) -> Self {
        Self::Busy {
            identity: identity.to_string(),
        }
    }

    /// Creates a new `SessionClosed` error.
    #[must_use]
    pub fn session_closed(identity: impl std::fmt::Display) -> Self {
        Self::SessionClosed {
            identity: identity.to_string(),
        }
    }

    /// Creates a new `Transport` error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a new `Generation` error.
    #[must_use]
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is transient and the caller may retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NotConnected { .. } | Self::Busy { .. } | Self::Transport { .. }
        )
    }

    /// Returns `true` if this error is fatal and requires immediate termination.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::UnknownPurpose { .. }
        )
    }
}
