//! classgen content documents
//!
//! Typed documents for generated classroom material: the grammar parsers that
//! read service output, the serializers that write canonical text back, edit
//! sessions, and saved records.

pub mod document;
pub mod edit;
pub mod error;
mod grammar;
pub mod lesson_plan;
pub mod quiz;
pub mod record;

pub use document::{
    parse_or_fallback, Block, BlockBody, BlockId, ContentKind, Diagnostic, Document,
    MetadataFields, ParseReport, Resolved,
};
pub use edit::{BlockEdit, BlockTag, Canonical, EditOp, EditSession, MetadataEdit};
pub use error::{ContentError, Result};
pub use lesson_plan::{
    LessonMetadata, LessonMetadataEdit, LessonPlan, LessonVariant, Section, SectionContent,
    SectionEdit, SectionKind,
};
pub use quiz::{
    AnswerSpec, Question, QuestionEdit, QuestionKind, Quiz, QuizMetadata, QuizMetadataEdit,
    MAX_OPTIONS,
};
pub use record::{DirRecordStore, RecordStore, SavedRecord};
