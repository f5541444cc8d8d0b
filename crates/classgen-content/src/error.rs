//! Error types for content documents, edit sessions and saved records.
//!
//! Parsing never produces an error (it degrades to a fallback document), so
//! everything here comes from edit operations that reference something that
//! does not exist, or from record persistence.

use std::path::PathBuf;

/// A specialized `Result` type for content operations.
pub type Result<T> = std::result::Result<T, ContentError>;

/// Errors that can occur while editing or persisting content.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    // ========================================================================
    // Edit Errors
    // ========================================================================
    /// An edit referenced a block id that is not in the document.
    #[error("No block with id {id} in this document\n\nSuggestion: Reload the document; the block may have been removed")]
    UnknownBlock {
        /// The id that was not found.
        id: u64,
    },

    /// An edit is not legal for the block or metadata it targets.
    #[error("Invalid edit: {message}")]
    InvalidEdit {
        /// Description of why the edit was rejected.
        message: String,
    },

    // ========================================================================
    // Record Errors
    // ========================================================================
    /// No saved record exists with the given id.
    #[error("Record not found: '{id}'\n\nSuggestion: Run 'classgen records list' to see saved records")]
    RecordNotFound {
        /// The missing record id.
        id: String,
    },

    /// A saved record file could not be decoded.
    #[error("Corrupted record file '{path}': {message}\n\nSuggestion: Remove the file or restore it from backup")]
    RecordCorrupted {
        /// Path to the corrupted record.
        path: PathBuf,
        /// Description of the corruption.
        message: String,
    },

    /// General I/O error during record storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ContentError {
    /// Creates a new `UnknownBlock` error.
    #[must_use]
    pub const fn unknown_block(id: u64) -> Self {
        Self::UnknownBlock { id }
    }

    /// Creates a new `InvalidEdit` error.
    #[must_use]
    pub fn invalid_edit(message: impl Into<String>) -> Self {
        Self::InvalidEdit {
            message: message.into(),
        }
    }

    /// Creates a new `RecordNotFound` error.
    #[must_use]
    pub fn record_not_found(id: impl Into<String>) -> Self {
        Self::RecordNotFound { id: id.into() }
    }

    /// Creates a new `RecordCorrupted` error.
    #[must_use]
    pub fn record_corrupted(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::RecordCorrupted {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if the error came from an edit operation.
    ///
    /// Edit errors leave the draft untouched, so the caller can keep editing.
    #[must_use]
    pub const fn is_edit_error(&self) -> bool {
        matches!(self, Self::UnknownBlock { .. } | Self::InvalidEdit { .. })
    }
}
