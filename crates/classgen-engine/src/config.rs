//! Configuration for the classgen generation engine.
//!
//! Loaded from `classgen.json`. Every field has a default, so a missing file
//! or a partial file is always usable.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// The default config file name.
pub const CONFIG_FILE_NAME: &str = "classgen.json";

/// Default base URL of the generation service.
fn default_service_url() -> String {
    "ws://127.0.0.1:8000/ws".to_string()
}

/// Default delay before reopening a dropped connection.
const fn default_retry_delay_ms() -> u64 {
    2000
}

/// Default capacity of each session's event channel.
const fn default_event_capacity() -> usize {
    256
}

/// Default directory for saved records.
fn default_records_dir() -> String {
    ".classgen/records".to_string()
}

/// Default purposes: one endpoint per content kind.
fn default_purposes() -> BTreeMap<String, PurposeConfig> {
    BTreeMap::from([
        (
            "quiz".to_string(),
            PurposeConfig {
                path: "quiz".to_string(),
                prompt_field: PromptField::Prompt,
            },
        ),
        (
            "lesson-plan".to_string(),
            PurposeConfig {
                path: "lesson-plan".to_string(),
                prompt_field: PromptField::Message,
            },
        ),
    ])
}

/// Main engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Base WebSocket URL of the generation service.
    #[serde(default = "default_service_url")]
    pub service_url: String,

    /// Delay in milliseconds between reconnect attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Capacity of each session's event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Directory where saved records are kept.
    #[serde(default = "default_records_dir")]
    pub records_dir: String,

    /// Endpoint settings per purpose key.
    #[serde(default = "default_purposes")]
    pub purposes: BTreeMap<String, PurposeConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            retry_delay_ms: default_retry_delay_ms(),
            event_capacity: default_event_capacity(),
            records_dir: default_records_dir(),
            purposes: default_purposes(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            EngineError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `classgen.json` from a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ConfigParseError` if the file exists but contains
    /// invalid JSON, and `EngineError::ConfigValidationError` if the values
    /// are invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(EngineError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| EngineError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.retry_delay_ms == 0 {
            return Err(EngineError::config_validation(
                "retryDelayMs must be greater than 0",
                "Set retryDelayMs to at least 1 in your classgen.json",
            ));
        }

        if self.event_capacity == 0 {
            return Err(EngineError::config_validation(
                "eventCapacity must be greater than 0",
                "Set eventCapacity to at least 1 in your classgen.json",
            ));
        }

        let url = self.service_url.trim();
        if url.is_empty() {
            return Err(EngineError::config_validation(
                "serviceUrl must not be empty",
                "Provide the generation service URL, e.g. ws://127.0.0.1:8000/ws",
            ));
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(EngineError::config_validation(
                format!("serviceUrl '{url}' is not a WebSocket URL"),
                "Use a ws:// or wss:// URL for serviceUrl",
            ));
        }

        if self.records_dir.trim().is_empty() {
            return Err(EngineError::config_validation(
                "recordsDir must not be empty",
                "Provide a directory for saved records in your classgen.json",
            ));
        }

        if let Some((key, _)) = self
            .purposes
            .iter()
            .find(|(_, p)| p.path.trim_matches('/').is_empty())
        {
            return Err(EngineError::config_validation(
                format!("purposes.{key}.path must not be empty"),
                "Give every purpose the service path it streams from",
            ));
        }

        Ok(())
    }

    /// Returns the reconnect delay.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Looks up the settings for a purpose.
    pub fn purpose(&self, purpose: &str) -> Result<&PurposeConfig> {
        self.purposes
            .get(purpose)
            .ok_or_else(|| EngineError::unknown_purpose(purpose))
    }

    /// Builds the WebSocket URL `{serviceUrl}/{purpose path}/{owner}`.
    pub fn endpoint(&self, purpose: &str, owner: &str) -> Result<String> {
        let settings = self.purpose(purpose)?;
        Ok(format!(
            "{}/{}/{}",
            self.service_url.trim().trim_end_matches('/'),
            settings.path.trim_matches('/'),
            urlencoding::encode(owner)
        ))
    }
}

/// Endpoint settings for one purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurposeConfig {
    /// Path segment appended to the service URL.
    pub path: String,

    /// JSON field the prompt is sent in.
    #[serde(default)]
    pub prompt_field: PromptField,
}

/// The field name the service expects the prompt under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PromptField {
    /// `{ "prompt": ... }`
    #[default]
    Prompt,
    /// `{ "message": ... }`
    Message,
}

impl PromptField {
    /// Returns the JSON key.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Message => "message",
        }
    }
}

impl<'de> Deserialize<'de> for PromptField {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "prompt" => Ok(Self::Prompt),
            "message" => Ok(Self::Message),
            _ => Err(serde::de::Error::custom(format!(
                "invalid prompt field '{s}': expected one of 'prompt', 'message'"
            ))),
        }
    }
}

impl Serialize for PromptField {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.key())
    }
}
