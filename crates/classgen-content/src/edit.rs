//! Isolated editing of a document with explicit commit or discard.
//!
//! A [`Canonical`] pairs the committed document with its canonical text. An
//! [`EditSession`] works on a deep copy, so nothing the user does is visible
//! until [`Canonical::commit`] swaps both values in at once.

use crate::document::{BlockBody, BlockId, ContentKind, Document, MetadataFields};
use crate::error::Result;

/// Tag type of a kind's blocks.
pub type BlockTag<K> = <<K as ContentKind>::Block as BlockBody>::Tag;
/// Field-edit type of a kind's blocks.
pub type BlockEdit<K> = <<K as ContentKind>::Block as BlockBody>::Edit;
/// Edit type of a kind's metadata.
pub type MetadataEdit<K> = <<K as ContentKind>::Metadata as MetadataFields>::Edit;

/// One operation on a draft document.
#[derive(Debug, Clone)]
pub enum EditOp<K: ContentKind> {
    /// Appends a block of the given type with default fields.
    AddBlock(BlockTag<K>),
    /// Removes a block.
    RemoveBlock(BlockId),
    /// Swaps a block with its predecessor.
    MoveUp(BlockId),
    /// Swaps a block with its successor.
    MoveDown(BlockId),
    /// Edits a field of one block, including list toggles.
    UpdateBlock(BlockId, BlockEdit<K>),
    /// Changes a block's type, resetting its type-specific fields.
    ChangeType(BlockId, BlockTag<K>),
    /// Edits the document metadata.
    UpdateMetadata(MetadataEdit<K>),
}

/// A committed document and its canonical text.
#[derive(Debug, Clone)]
pub struct Canonical<K: ContentKind> {
    document: Document<K>,
    text: String,
}

impl<K: ContentKind> Canonical<K> {
    /// Wraps a document, computing its canonical text.
    #[must_use]
    pub fn new(document: Document<K>) -> Self {
        let text = document.to_text();
        Self { document, text }
    }

    /// Returns the committed document.
    #[must_use]
    pub const fn document(&self) -> &Document<K> {
        &self.document
    }

    /// Returns the canonical text of the committed document.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Opens an edit session on a deep copy of the committed document.
    #[must_use]
    pub fn edit(&self) -> EditSession<K> {
        EditSession::open(&self.document)
    }

    /// Replaces the document and its text with the session's draft.
    pub fn commit(&mut self, session: EditSession<K>) {
        *self = session.commit();
    }

    /// Consumes the wrapper, returning the document and text.
    #[must_use]
    pub fn into_parts(self) -> (Document<K>, String) {
        (self.document, self.text)
    }
}

/// An exclusively owned draft of a document.
#[derive(Debug, Clone)]
pub struct EditSession<K: ContentKind> {
    draft: Document<K>,
    modified: bool,
}

impl<K: ContentKind> EditSession<K> {
    /// Starts a session on a copy of `document`.
    #[must_use]
    pub fn open(document: &Document<K>) -> Self {
        Self {
            draft: document.clone(),
            modified: false,
        }
    }

    /// Returns the current draft.
    #[must_use]
    pub const fn draft(&self) -> &Document<K> {
        &self.draft
    }

    /// Returns `true` once any operation has succeeded.
    #[must_use]
    pub const fn is_modified(&self) -> bool {
        self.modified
    }

    /// Applies one operation to the draft.
    ///
    /// Returns the id of the block an [`EditOp::AddBlock`] created. A failed
    /// operation leaves the draft exactly as it was.
    pub fn apply(&mut self, op: EditOp<K>) -> Result<Option<BlockId>> {
        let mut added = None;
        match op {
            EditOp::AddBlock(tag) => {
                added = Some(self.draft.push(<K::Block as BlockBody>::with_defaults(tag)));
            }
            EditOp::RemoveBlock(id) => {
                self.draft.remove(id)?;
            }
            EditOp::MoveUp(id) => self.draft.move_up(id)?,
            EditOp::MoveDown(id) => self.draft.move_down(id)?,
            EditOp::UpdateBlock(id, edit) => {
                let body = self.draft.body_mut(id)?;
                let mut updated = body.clone();
                updated.apply(edit)?;
                *body = updated;
            }
            EditOp::ChangeType(id, tag) => self.draft.body_mut(id)?.change_tag(tag),
            EditOp::UpdateMetadata(edit) => {
                let mut updated = self.draft.metadata.clone();
                updated.apply(edit)?;
                self.draft.metadata = updated;
            }
        }
        self.modified = true;
        Ok(added)
    }

    /// Finishes the session, producing the new canonical document and text.
    #[must_use]
    pub fn commit(self) -> Canonical<K> {
        tracing::debug!(
            kind = K::NAME,
            blocks = self.draft.len(),
            modified = self.modified,
            "Committing edit session"
        );
        Canonical::new(self.draft)
    }

    /// Drops the draft without touching the committed document.
    pub fn discard(self) {
        tracing::debug!(kind = K::NAME, modified = self.modified, "Discarding edit session");
    }
}
