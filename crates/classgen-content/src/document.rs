//! The generic content document shared by every generated artifact kind.
//!
//! A [`Document`] is kind-specific metadata plus an ordered list of
//! [`Block`]s. Each kind (quiz, lesson plan) plugs in through the
//! [`ContentKind`] trait, which ties together its metadata, its closed set of
//! block variants, its grammar parser and its serializer.

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ContentError, Result};

// ============================================================================
// Block identity
// ============================================================================

/// Stable identifier of a block within one document.
///
/// Ids are allocated from a per-document counter and are never reused, even
/// after the block they named is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(u64);

impl BlockId {
    /// Wraps a raw id, e.g. one typed by a user or read from a saved record.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One addressable unit of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block<B> {
    /// Stable id of this block.
    pub id: BlockId,
    /// The typed body. Its tag never changes except through a change-type edit.
    pub body: B,
}

// ============================================================================
// Kind traits
// ============================================================================

/// A block body: a closed set of tagged variants for one content kind.
pub trait BlockBody: fmt::Debug + Clone + PartialEq + Serialize + DeserializeOwned {
    /// The tag type naming each variant.
    type Tag: fmt::Debug + Clone + Copy + PartialEq + Eq;
    /// Field-level edits this body accepts.
    type Edit: fmt::Debug + Clone;

    /// Returns the tag of this body.
    fn tag(&self) -> Self::Tag;

    /// Builds a body of the given tag with type-appropriate default fields.
    fn with_defaults(tag: Self::Tag) -> Self;

    /// Switches the body to another tag, resetting tag-specific fields to
    /// their defaults while keeping fields common to every tag.
    fn change_tag(&mut self, tag: Self::Tag);

    /// Applies a field edit. On error the body is left unchanged.
    fn apply(&mut self, edit: Self::Edit) -> Result<()>;
}

/// Kind-specific document metadata.
pub trait MetadataFields:
    fmt::Debug + Clone + PartialEq + Default + Serialize + DeserializeOwned
{
    /// Metadata edits this kind accepts.
    type Edit: fmt::Debug + Clone;

    /// Applies a metadata edit. On error the metadata is left unchanged.
    fn apply(&mut self, edit: Self::Edit) -> Result<()>;

    /// Fills every empty field from `other`, keeping fields already set.
    fn fill_missing_from(&mut self, other: &Self);
}

/// One generated artifact kind and its textual grammar.
pub trait ContentKind: fmt::Debug + Clone + Copy + PartialEq + Default + 'static {
    /// Metadata carried in the document header.
    type Metadata: MetadataFields;
    /// The closed set of block variants.
    type Block: BlockBody;

    /// Human-readable name of the kind, used in logs and records.
    const NAME: &'static str;

    /// Parses text into a document, reporting dropped segments.
    fn parse(text: &str) -> ParseReport<Self>;

    /// Serializes a document into canonical text.
    fn serialize(document: &Document<Self>) -> String;

    /// Wraps unparsed raw text in a single block.
    fn fallback_block(raw: &str) -> Self::Block;
}

// ============================================================================
// Document
// ============================================================================

/// A typed, editable content document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "", rename_all = "camelCase", from = "DocumentRepr<K>")]
pub struct Document<K: ContentKind> {
    /// Kind-specific header fields.
    pub metadata: K::Metadata,
    blocks: Vec<Block<K::Block>>,
    next_id: u64,
    #[serde(skip)]
    kind: PhantomData<K>,
}

/// Wire shape of a document; ids are repaired on the way in.
#[derive(Deserialize)]
#[serde(bound = "", rename_all = "camelCase")]
struct DocumentRepr<K: ContentKind> {
    #[serde(default)]
    metadata: K::Metadata,
    #[serde(default)]
    blocks: Vec<Block<K::Block>>,
    #[serde(default)]
    next_id: u64,
}

impl<K: ContentKind> From<DocumentRepr<K>> for Document<K> {
    fn from(repr: DocumentRepr<K>) -> Self {
        let max_id = repr.blocks.iter().map(|b| b.id.get()).max().unwrap_or(0);
        let mut document = Self {
            metadata: repr.metadata,
            blocks: Vec::with_capacity(repr.blocks.len()),
            next_id: repr.next_id.max(max_id + 1).max(1),
            kind: PhantomData,
        };

        // Persisted documents may carry duplicate ids; later duplicates get fresh ones.
        let mut seen = HashSet::new();
        for mut block in repr.blocks {
            if !seen.insert(block.id) {
                block.id = document.allocate_id();
            }
            document.blocks.push(block);
        }
        document
    }
}

impl<K: ContentKind> Default for Document<K> {
    fn default() -> Self {
        Self::new(K::Metadata::default())
    }
}

impl<K: ContentKind> Document<K> {
    /// Creates an empty document with the given metadata.
    #[must_use]
    pub const fn new(metadata: K::Metadata) -> Self {
        Self {
            metadata,
            blocks: Vec::new(),
            next_id: 1,
            kind: PhantomData,
        }
    }

    /// Creates a document from block bodies, assigning fresh ids in order.
    #[must_use]
    pub fn with_blocks(
        metadata: K::Metadata,
        bodies: impl IntoIterator<Item = K::Block>,
    ) -> Self {
        let mut document = Self::new(metadata);
        for body in bodies {
            document.push(body);
        }
        document
    }

    /// Builds the single-block fallback document wrapping raw text.
    #[must_use]
    pub fn fallback(raw: &str, metadata: K::Metadata) -> Self {
        Self::with_blocks(metadata, [K::fallback_block(raw)])
    }

    /// Parses text with this kind's grammar.
    #[must_use]
    pub fn parse(text: &str) -> ParseReport<K> {
        K::parse(text)
    }

    /// Serializes the document into canonical text.
    #[must_use]
    pub fn to_text(&self) -> String {
        K::serialize(self)
    }

    /// Returns the blocks in document order.
    #[must_use]
    pub fn blocks(&self) -> &[Block<K::Block>] {
        &self.blocks
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if the document has no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Looks up a block by id.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&Block<K::Block>> {
        self.blocks.iter().find(|b| b.id == id)
    }

    /// Returns the index of a block in document order.
    #[must_use]
    pub fn position(&self, id: BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == id)
    }

    /// Appends a block and returns its freshly allocated id.
    pub fn push(&mut self, body: K::Block) -> BlockId {
        let id = self.allocate_id();
        self.blocks.push(Block { id, body });
        id
    }

    /// Removes a block, returning it.
    pub fn remove(&mut self, id: BlockId) -> Result<Block<K::Block>> {
        let index = self.require(id)?;
        Ok(self.blocks.remove(index))
    }

    /// Swaps a block with its predecessor. A block already first stays put.
    pub fn move_up(&mut self, id: BlockId) -> Result<()> {
        let index = self.require(id)?;
        if index > 0 {
            self.blocks.swap(index, index - 1);
        }
        Ok(())
    }

    /// Swaps a block with its successor. A block already last stays put.
    pub fn move_down(&mut self, id: BlockId) -> Result<()> {
        let index = self.require(id)?;
        if index + 1 < self.blocks.len() {
            self.blocks.swap(index, index + 1);
        }
        Ok(())
    }

    /// Returns a mutable reference to a block body.
    pub(crate) fn body_mut(&mut self, id: BlockId) -> Result<&mut K::Block> {
        self.blocks
            .iter_mut()
            .find(|b| b.id == id)
            .map(|b| &mut b.body)
            .ok_or_else(|| ContentError::unknown_block(id.get()))
    }

    /// Returns `true` if both documents carry the same metadata and the same
    /// block bodies in the same order, ignoring block ids.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.metadata == other.metadata
            && self.blocks.len() == other.blocks.len()
            && self
                .blocks
                .iter()
                .zip(&other.blocks)
                .all(|(a, b)| a.body == b.body)
    }

    fn require(&self, id: BlockId) -> Result<usize> {
        self.position(id)
            .ok_or_else(|| ContentError::unknown_block(id.get()))
    }

    fn allocate_id(&mut self) -> BlockId {
        let id = BlockId(self.next_id);
        self.next_id += 1;
        id
    }
}

// ============================================================================
// Parse results
// ============================================================================

/// A note about a segment the parser could not use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The segment number as written in the text (e.g. `3` for `Question 3:`).
    pub segment: u32,
    /// What went wrong.
    pub message: String,
}

impl Diagnostic {
    /// Creates a new diagnostic.
    #[must_use]
    pub fn new(segment: u32, message: impl Into<String>) -> Self {
        Self {
            segment,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment {}: {}", self.segment, self.message)
    }
}

/// Output of a grammar parser.
///
/// `document` is `None` when no segment was recognized; callers turn that
/// into the fallback document with [`ParseReport::resolve`].
#[derive(Debug, Clone)]
pub struct ParseReport<K: ContentKind> {
    /// The parsed document, if any segment survived.
    pub document: Option<Document<K>>,
    /// Segments that were dropped and why.
    pub diagnostics: Vec<Diagnostic>,
    /// Number of anchored segments found in the text.
    pub segments_found: usize,
}

impl<K: ContentKind> ParseReport<K> {
    /// Resolves the report into a document that always exists.
    ///
    /// A parsed document keeps its own header fields and borrows any missing
    /// ones from `metadata`. Without a parsed document, the raw text is
    /// wrapped in the single-block fallback.
    #[must_use]
    pub fn resolve(self, raw: &str, metadata: K::Metadata) -> Resolved<K> {
        match self.document {
            Some(mut document) => {
                document.metadata.fill_missing_from(&metadata);
                Resolved {
                    document,
                    structured: true,
                    diagnostics: self.diagnostics,
                }
            }
            None => {
                tracing::debug!(kind = K::NAME, "No structure recognized, using fallback");
                Resolved {
                    document: Document::fallback(raw, metadata),
                    structured: false,
                    diagnostics: self.diagnostics,
                }
            }
        }
    }
}

/// A document that is guaranteed to exist, plus how it was obtained.
#[derive(Debug, Clone)]
pub struct Resolved<K: ContentKind> {
    /// The document (parsed or fallback).
    pub document: Document<K>,
    /// `false` when the document is the raw-text fallback.
    pub structured: bool,
    /// Diagnostics from parsing.
    pub diagnostics: Vec<Diagnostic>,
}

/// Parses text and resolves it to a document in one step.
#[must_use]
pub fn parse_or_fallback<K: ContentKind>(text: &str, metadata: K::Metadata) -> Resolved<K> {
    K::parse(text).resolve(text, metadata)
}
