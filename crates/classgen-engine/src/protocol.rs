//! Streaming protocol spoken with the generation service.
//!
//! Every frame is a JSON text message.
//!
//! # Outbound
//!
//! - `{"prompt": "..."}` or `{"message": "..."}`, depending on the purpose
//!
//! # Inbound
//!
//! - `token` - One fragment of generated text
//! - `done` - Generation finished, optionally with the full response
//! - `error` - Generation failed
//!
//! Anything else is malformed and dropped.

use serde::{Deserialize, Serialize};

use crate::config::PromptField;

/// A frame sent by the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// One fragment of generated text.
    Token {
        /// The fragment.
        content: String,
    },
    /// The generation finished.
    Done {
        /// The whole response, for services that do not stream tokens.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        full_response: Option<String>,
    },
    /// The generation failed.
    Error {
        /// Human-readable error message.
        message: String,
    },
}

impl ServerFrame {
    /// Creates a `Token` frame.
    #[must_use]
    pub fn token(content: impl Into<String>) -> Self {
        Self::Token {
            content: content.into(),
        }
    }

    /// Creates a `Done` frame.
    #[must_use]
    pub const fn done(full_response: Option<String>) -> Self {
        Self::Done { full_response }
    }

    /// Creates an `Error` frame.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Returns the frame type as a string.
    #[must_use]
    pub const fn frame_name(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Decodes a text frame, logging and dropping anything malformed.
    #[must_use]
    pub fn decode(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    frame = %truncate(text, 120),
                    "Dropping malformed frame"
                );
                None
            }
        }
    }

    /// Encodes the frame as JSON text.
    #[must_use]
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Encodes a prompt under the field the purpose expects.
#[must_use]
pub fn encode_prompt(field: PromptField, prompt: &str) -> String {
    let mut body = serde_json::Map::new();
    body.insert(
        field.key().to_string(),
        serde_json::Value::String(prompt.to_string()),
    );
    serde_json::Value::Object(body).to_string()
}

fn truncate(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(index, _)| &text[..index])
}
