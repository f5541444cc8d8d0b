//! Lesson plan documents: header fields, section variants and edits.

mod parse;
mod serialize;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::{BlockBody, ContentKind, Document, MetadataFields, ParseReport};
use crate::error::{ContentError, Result};
use crate::grammar::{label_key, multi_line, raw_text, single_line};

/// Marker type for lesson plan documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LessonPlan;

impl ContentKind for LessonPlan {
    type Metadata = LessonMetadata;
    type Block = Section;

    const NAME: &'static str = "lesson-plan";

    fn parse(text: &str) -> ParseReport<Self> {
        parse::parse_lesson_plan(text)
    }

    fn serialize(document: &Document<Self>) -> String {
        serialize::serialize_lesson_plan(document)
    }

    fn fallback_block(raw: &str) -> Section {
        Section {
            heading: String::new(),
            content: SectionContent::Notes {
                text: raw_text(raw),
            },
        }
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// The lesson structure the plan follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LessonVariant {
    /// Objectives, direct instruction, practice, assessment.
    #[default]
    Standard,
    /// Engage, explore, explain, elaborate, evaluate.
    FiveE,
    /// Mini-lesson, work time, share.
    Workshop,
}

impl LessonVariant {
    /// Returns the label written in the `Format:` header.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Standard => "Standard",
            Self::FiveE => "5E",
            Self::Workshop => "Workshop",
        }
    }

    /// Recognizes a format label, ignoring case and punctuation.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label_key(label).as_str() {
            "standard" | "traditional" | "direct" => Some(Self::Standard),
            "5e" | "fivee" | "5emodel" => Some(Self::FiveE),
            "workshop" | "workshopmodel" => Some(Self::Workshop),
            _ => None,
        }
    }
}

impl fmt::Display for LessonVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Header fields of a lesson plan.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LessonMetadata {
    /// Lesson title.
    pub title: String,
    /// Subject area.
    pub subject: String,
    /// Grade level as entered on the request form.
    pub grade_level: String,
    /// Total lesson length in minutes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    /// Lesson structure.
    pub variant: LessonVariant,
    /// Curriculum standards addressed.
    pub standards: Vec<String>,
}

/// Edits to lesson plan metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LessonMetadataEdit {
    /// Replaces the title.
    SetTitle(String),
    /// Replaces the subject.
    SetSubject(String),
    /// Replaces the grade level.
    SetGradeLevel(String),
    /// Replaces or clears the total duration.
    SetDuration(Option<u32>),
    /// Switches the lesson structure.
    SetVariant(LessonVariant),
    /// Adds the standard if absent, removes it if present.
    ToggleStandard(String),
}

impl MetadataFields for LessonMetadata {
    type Edit = LessonMetadataEdit;

    fn apply(&mut self, edit: LessonMetadataEdit) -> Result<()> {
        match edit {
            LessonMetadataEdit::SetTitle(title) => self.title = single_line(&title),
            LessonMetadataEdit::SetSubject(subject) => self.subject = single_line(&subject),
            LessonMetadataEdit::SetGradeLevel(grade) => self.grade_level = single_line(&grade),
            LessonMetadataEdit::SetDuration(minutes) => self.duration_minutes = minutes,
            LessonMetadataEdit::SetVariant(variant) => self.variant = variant,
            LessonMetadataEdit::ToggleStandard(standard) => {
                let standard = single_line(&standard);
                // The header lists standards comma-separated
                if standard.is_empty() || standard.contains(',') {
                    return Err(ContentError::invalid_edit(
                        "a standard must be non-empty and must not contain commas",
                    ));
                }
                toggle(&mut self.standards, standard);
            }
        }
        Ok(())
    }

    fn fill_missing_from(&mut self, other: &Self) {
        if self.title.is_empty() {
            self.title.clone_from(&other.title);
        }
        if self.subject.is_empty() {
            self.subject.clone_from(&other.subject);
        }
        if self.grade_level.is_empty() {
            self.grade_level.clone_from(&other.grade_level);
        }
        if self.duration_minutes.is_none() {
            self.duration_minutes = other.duration_minutes;
        }
        if self.variant == LessonVariant::default() {
            self.variant = other.variant;
        }
        if self.standards.is_empty() {
            self.standards.clone_from(&other.standards);
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// The tag of a lesson plan section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionKind {
    /// Learning objectives.
    Objectives,
    /// Materials and resources.
    Materials,
    /// A timed activity with ordered steps.
    Activity,
    /// How learning is checked.
    Assessment,
    /// Free text.
    Notes,
}

impl SectionKind {
    /// All section kinds in display order.
    pub const ALL: [Self; 5] = [
        Self::Objectives,
        Self::Materials,
        Self::Activity,
        Self::Assessment,
        Self::Notes,
    ];

    /// Returns the label written in canonical text.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Objectives => "Objectives",
            Self::Materials => "Materials",
            Self::Activity => "Activity",
            Self::Assessment => "Assessment",
            Self::Notes => "Notes",
        }
    }

    /// Recognizes a section type label, ignoring case and punctuation.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label_key(label).as_str() {
            "objectives" | "objective" | "learningobjectives" | "goals" => Some(Self::Objectives),
            "materials" | "material" | "resources" => Some(Self::Materials),
            "activity" | "procedure" | "steps" => Some(Self::Activity),
            "assessment" | "evaluation" => Some(Self::Assessment),
            "notes" | "note" => Some(Self::Notes),
            _ => None,
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One lesson plan section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// The section heading from its anchor line.
    #[serde(default)]
    pub heading: String,
    /// Type-specific body.
    pub content: SectionContent,
}

/// Type-specific fields of a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SectionContent {
    /// Objective statements; never empty once parsed.
    Objectives {
        /// One objective per item.
        #[serde(default)]
        items: Vec<String>,
    },
    /// Materials list; never empty once parsed.
    Materials {
        /// One material per item.
        #[serde(default)]
        items: Vec<String>,
    },
    /// A timed activity.
    Activity {
        /// Length in minutes.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_minutes: Option<u32>,
        /// Ordered steps.
        #[serde(default)]
        steps: Vec<String>,
    },
    /// An assessment.
    Assessment {
        /// What students do.
        #[serde(default)]
        description: String,
        /// How it is graded.
        #[serde(default)]
        criteria: Vec<String>,
    },
    /// Free text, kept verbatim.
    Notes {
        /// The note text.
        #[serde(default)]
        text: String,
    },
}

impl SectionContent {
    /// Returns the default body for a section kind.
    #[must_use]
    pub fn default_for(kind: SectionKind) -> Self {
        match kind {
            SectionKind::Objectives => Self::Objectives {
                items: vec!["New objective".to_string()],
            },
            SectionKind::Materials => Self::Materials {
                items: vec!["New material".to_string()],
            },
            SectionKind::Activity => Self::Activity {
                duration_minutes: None,
                steps: Vec::new(),
            },
            SectionKind::Assessment => Self::Assessment {
                description: String::new(),
                criteria: Vec::new(),
            },
            SectionKind::Notes => Self::Notes {
                text: String::new(),
            },
        }
    }

    /// Returns the kind of this body.
    #[must_use]
    pub const fn kind(&self) -> SectionKind {
        match self {
            Self::Objectives { .. } => SectionKind::Objectives,
            Self::Materials { .. } => SectionKind::Materials,
            Self::Activity { .. } => SectionKind::Activity,
            Self::Assessment { .. } => SectionKind::Assessment,
            Self::Notes { .. } => SectionKind::Notes,
        }
    }

    /// Returns the list edited by item edits, and the minimum length it must keep.
    fn primary_list(&mut self) -> Option<(&mut Vec<String>, usize)> {
        match self {
            Self::Objectives { items } | Self::Materials { items } => Some((items, 1)),
            Self::Activity { steps, .. } => Some((steps, 0)),
            Self::Assessment { criteria, .. } => Some((criteria, 0)),
            Self::Notes { .. } => None,
        }
    }
}

/// Field edits on a single section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionEdit {
    /// Replaces the heading.
    SetHeading(String),
    /// Replaces the text of a notes section.
    SetText(String),
    /// Replaces the description of an assessment section.
    SetDescription(String),
    /// Replaces or clears the duration of an activity section.
    SetDuration(Option<u32>),
    /// Appends an item (objective, material, step or criterion).
    AddItem(String),
    /// Replaces one item.
    SetItem {
        /// Item index.
        index: usize,
        /// New item text.
        text: String,
    },
    /// Removes one item.
    RemoveItem(usize),
    /// Adds the item if absent, removes it if present.
    ToggleItem(String),
}

impl BlockBody for Section {
    type Tag = SectionKind;
    type Edit = SectionEdit;

    fn tag(&self) -> SectionKind {
        self.content.kind()
    }

    fn with_defaults(tag: SectionKind) -> Self {
        Self {
            heading: tag.label().to_string(),
            content: SectionContent::default_for(tag),
        }
    }

    fn change_tag(&mut self, tag: SectionKind) {
        if self.tag() != tag {
            self.content = SectionContent::default_for(tag);
        }
    }

    fn apply(&mut self, edit: SectionEdit) -> Result<()> {
        let kind = self.tag();
        match (edit, &mut self.content) {
            (SectionEdit::SetHeading(heading), _) => self.heading = single_line(&heading),
            (SectionEdit::SetText(value), SectionContent::Notes { text }) => {
                *text = multi_line(&value);
            }
            (
                SectionEdit::SetDescription(value),
                SectionContent::Assessment { description, .. },
            ) => {
                *description = multi_line(&value);
            }
            (
                SectionEdit::SetDuration(minutes),
                SectionContent::Activity {
                    duration_minutes, ..
                },
            ) => {
                *duration_minutes = minutes;
            }
            (
                edit @ (SectionEdit::AddItem(_)
                | SectionEdit::SetItem { .. }
                | SectionEdit::RemoveItem(_)
                | SectionEdit::ToggleItem(_)),
                content,
            ) => {
                let Some((list, min_len)) = content.primary_list() else {
                    return Err(ContentError::invalid_edit(format!(
                        "a {kind} section has no item list"
                    )));
                };
                apply_item_edit(list, min_len, edit, kind)?;
            }
            (edit, _) => {
                return Err(ContentError::invalid_edit(format!(
                    "{edit:?} does not apply to a {kind} section"
                )));
            }
        }
        Ok(())
    }
}

fn apply_item_edit(
    list: &mut Vec<String>,
    min_len: usize,
    edit: SectionEdit,
    kind: SectionKind,
) -> Result<()> {
    let missing = |index: usize| ContentError::invalid_edit(format!("item {index} does not exist"));
    let too_short = || {
        ContentError::invalid_edit(format!("a {kind} section needs at least {min_len} item"))
    };

    match edit {
        SectionEdit::AddItem(text) => list.push(non_empty_item(&text)?),
        SectionEdit::SetItem { index, text } => {
            let item = non_empty_item(&text)?;
            *list.get_mut(index).ok_or_else(|| missing(index))? = item;
        }
        SectionEdit::RemoveItem(index) => {
            if index >= list.len() {
                return Err(missing(index));
            }
            if list.len() <= min_len {
                return Err(too_short());
            }
            list.remove(index);
        }
        SectionEdit::ToggleItem(text) => {
            let item = non_empty_item(&text)?;
            if list.contains(&item) && list.len() <= min_len {
                return Err(too_short());
            }
            toggle(list, item);
        }
        other => {
            return Err(ContentError::invalid_edit(format!(
                "{other:?} is not an item edit"
            )));
        }
    }
    Ok(())
}

fn non_empty_item(text: &str) -> Result<String> {
    let item = single_line(text);
    if item.is_empty() {
        return Err(ContentError::invalid_edit("item must not be empty"));
    }
    Ok(item)
}

fn toggle(list: &mut Vec<String>, value: String) {
    if let Some(index) = list.iter().position(|v| *v == value) {
        list.remove(index);
    } else {
        list.push(value);
    }
}
