//! Quiz documents: metadata, the closed set of question variants, and edits.
//!
//! The textual grammar lives in [`parse`](self::parse) and
//! [`serialize`](self::serialize); this module only defines the typed model.

mod parse;
mod serialize;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::{BlockBody, ContentKind, Document, MetadataFields, ParseReport};
use crate::error::{ContentError, Result};
use crate::grammar::{label_key, multi_line, raw_text, single_line};

/// Maximum number of options a multiple-choice question may carry (`A`-`F`).
pub const MAX_OPTIONS: usize = 6;

/// Marker type for quiz documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quiz;

impl ContentKind for Quiz {
    type Metadata = QuizMetadata;
    type Block = Question;

    const NAME: &'static str = "quiz";

    fn parse(text: &str) -> ParseReport<Self> {
        parse::parse_quiz(text)
    }

    fn serialize(document: &Document<Self>) -> String {
        serialize::serialize_quiz(document)
    }

    fn fallback_block(raw: &str) -> Question {
        Question {
            text: raw_text(raw),
            explanation: None,
            points: None,
            answer: AnswerSpec::default_for(QuestionKind::OpenEnded),
        }
    }
}

// ============================================================================
// QuestionKind
// ============================================================================

/// The tag of a quiz question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    /// Lettered options with one correct option.
    MultipleChoice,
    /// A statement that is either true or false.
    TrueFalse,
    /// A sentence with a blank and its expected answer.
    FillBlank,
    /// A free-response question.
    OpenEnded,
}

impl QuestionKind {
    /// All question kinds in display order.
    pub const ALL: [Self; 4] = [
        Self::MultipleChoice,
        Self::TrueFalse,
        Self::FillBlank,
        Self::OpenEnded,
    ];

    /// Returns the label written in canonical text.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::MultipleChoice => "Multiple Choice",
            Self::TrueFalse => "True/False",
            Self::FillBlank => "Fill in the Blank",
            Self::OpenEnded => "Open Ended",
        }
    }

    /// Recognizes a type label, ignoring case and punctuation.
    ///
    /// # Examples
    ///
    /// ```
    /// use classgen_content::quiz::QuestionKind;
    ///
    /// assert_eq!(QuestionKind::from_label("True / False"), Some(QuestionKind::TrueFalse));
    /// assert_eq!(QuestionKind::from_label("MCQ"), Some(QuestionKind::MultipleChoice));
    /// assert_eq!(QuestionKind::from_label("riddle"), None);
    /// ```
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label_key(label).as_str() {
            "multiplechoice" | "multiplechoicequestion" | "mc" | "mcq" => {
                Some(Self::MultipleChoice)
            }
            "truefalse" | "trueorfalse" | "tf" => Some(Self::TrueFalse),
            "fillintheblank" | "fillintheblanks" | "fillblank" | "fillblanks" | "cloze" => {
                Some(Self::FillBlank)
            }
            "openended" | "open" | "openresponse" | "shortanswer" | "freeresponse" | "essay" => {
                Some(Self::OpenEnded)
            }
            _ => None,
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// QuizMetadata
// ============================================================================

/// Header fields of a quiz.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QuizMetadata {
    /// Quiz title.
    pub title: String,
    /// Subject area.
    pub subject: String,
    /// Grade level as entered on the request form.
    pub grade_level: String,
    /// Question types requested on the form.
    pub question_types: Vec<QuestionKind>,
}

/// Edits to quiz metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizMetadataEdit {
    /// Replaces the title.
    SetTitle(String),
    /// Replaces the subject.
    SetSubject(String),
    /// Replaces the grade level.
    SetGradeLevel(String),
    /// Adds the question type if absent, removes it if present.
    ToggleQuestionType(QuestionKind),
}

impl MetadataFields for QuizMetadata {
    type Edit = QuizMetadataEdit;

    fn apply(&mut self, edit: QuizMetadataEdit) -> Result<()> {
        match edit {
            QuizMetadataEdit::SetTitle(title) => self.title = single_line(&title),
            QuizMetadataEdit::SetSubject(subject) => self.subject = single_line(&subject),
            QuizMetadataEdit::SetGradeLevel(grade) => self.grade_level = single_line(&grade),
            QuizMetadataEdit::ToggleQuestionType(kind) => {
                if let Some(index) = self.question_types.iter().position(|k| *k == kind) {
                    self.question_types.remove(index);
                } else {
                    self.question_types.push(kind);
                }
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
        if self.question_types.is_empty() {
            self.question_types.clone_from(&other.question_types);
        }
    }
}

// ============================================================================
// Question
// ============================================================================

/// One quiz question.
///
/// The fields every question has live here; everything that depends on the
/// question's type lives in [`AnswerSpec`], so a question can never carry
/// fields that do not belong to its tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// The question prompt. May span several lines.
    #[serde(default)]
    pub text: String,
    /// Why the answer is correct.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Point value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
    /// Type-specific answer fields.
    pub answer: AnswerSpec,
}

/// Type-specific fields of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum AnswerSpec {
    /// Lettered options; `correct_answer` indexes into `options`.
    MultipleChoice {
        /// Option texts in letter order.
        options: Vec<String>,
        /// Index of the correct option.
        #[serde(default)]
        correct_answer: Option<usize>,
    },
    /// A true/false statement.
    TrueFalse {
        /// The correct value, if stated.
        #[serde(default)]
        correct_answer: Option<bool>,
    },
    /// A fill-in-the-blank sentence.
    FillBlank {
        /// The expected answer.
        #[serde(default)]
        answer: String,
    },
    /// A free-response question.
    OpenEnded {
        /// A model answer.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sample_answer: Option<String>,
        /// Points a good answer should cover.
        #[serde(default)]
        key_points: Vec<String>,
    },
}

impl AnswerSpec {
    /// Returns the default answer fields for a question kind.
    #[must_use]
    pub fn default_for(kind: QuestionKind) -> Self {
        match kind {
            QuestionKind::MultipleChoice => Self::MultipleChoice {
                options: ["Option A", "Option B", "Option C", "Option D"]
                    .map(String::from)
                    .to_vec(),
                correct_answer: Some(0),
            },
            QuestionKind::TrueFalse => Self::TrueFalse {
                correct_answer: Some(true),
            },
            QuestionKind::FillBlank => Self::FillBlank {
                answer: String::new(),
            },
            QuestionKind::OpenEnded => Self::OpenEnded {
                sample_answer: None,
                key_points: Vec::new(),
            },
        }
    }

    /// Returns the kind these fields belong to.
    #[must_use]
    pub const fn kind(&self) -> QuestionKind {
        match self {
            Self::MultipleChoice { .. } => QuestionKind::MultipleChoice,
            Self::TrueFalse { .. } => QuestionKind::TrueFalse,
            Self::FillBlank { .. } => QuestionKind::FillBlank,
            Self::OpenEnded { .. } => QuestionKind::OpenEnded,
        }
    }
}

/// Field edits on a single question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionEdit {
    /// Replaces the prompt text.
    SetText(String),
    /// Replaces or clears the explanation.
    SetExplanation(Option<String>),
    /// Replaces or clears the point value.
    SetPoints(Option<u32>),
    /// Replaces the text of one multiple-choice option.
    SetOption {
        /// Option index.
        index: usize,
        /// New option text.
        text: String,
    },
    /// Appends a multiple-choice option.
    AddOption(String),
    /// Removes a multiple-choice option.
    RemoveOption(usize),
    /// Marks which multiple-choice option is correct.
    SetCorrectOption(Option<usize>),
    /// Sets the true/false answer.
    SetTrueFalse(Option<bool>),
    /// Sets the fill-in-the-blank answer.
    SetAnswer(String),
    /// Replaces or clears the open-ended sample answer.
    SetSampleAnswer(Option<String>),
    /// Adds the key point if absent, removes it if present.
    ToggleKeyPoint(String),
}

impl BlockBody for Question {
    type Tag = QuestionKind;
    type Edit = QuestionEdit;

    fn tag(&self) -> QuestionKind {
        self.answer.kind()
    }

    fn with_defaults(tag: QuestionKind) -> Self {
        Self {
            text: String::new(),
            explanation: None,
            points: None,
            answer: AnswerSpec::default_for(tag),
        }
    }

    fn change_tag(&mut self, tag: QuestionKind) {
        if self.tag() != tag {
            self.answer = AnswerSpec::default_for(tag);
        }
    }

    fn apply(&mut self, edit: QuestionEdit) -> Result<()> {
        let kind = self.tag();
        match (edit, &mut self.answer) {
            (QuestionEdit::SetText(text), _) => self.text = multi_line(&text),
            (QuestionEdit::SetExplanation(explanation), _) => {
                self.explanation = non_empty(explanation.as_deref().map(multi_line));
            }
            (QuestionEdit::SetPoints(points), _) => self.points = points,
            (
                QuestionEdit::SetOption { index, text },
                AnswerSpec::MultipleChoice { options, .. },
            ) => {
                let slot = options.get_mut(index).ok_or_else(|| {
                    ContentError::invalid_edit(format!("option {index} does not exist"))
                })?;
                *slot = single_line(&text);
            }
            (QuestionEdit::AddOption(text), AnswerSpec::MultipleChoice { options, .. }) => {
                if options.len() >= MAX_OPTIONS {
                    return Err(ContentError::invalid_edit(format!(
                        "a question can have at most {MAX_OPTIONS} options"
                    )));
                }
                options.push(single_line(&text));
            }
            (
                QuestionEdit::RemoveOption(index),
                AnswerSpec::MultipleChoice {
                    options,
                    correct_answer,
                },
            ) => {
                if index >= options.len() {
                    return Err(ContentError::invalid_edit(format!(
                        "option {index} does not exist"
                    )));
                }
                if options.len() <= 2 {
                    return Err(ContentError::invalid_edit(
                        "a multiple-choice question needs at least two options",
                    ));
                }
                options.remove(index);
                *correct_answer = match *correct_answer {
                    Some(c) if c == index => None,
                    Some(c) if c > index => Some(c - 1),
                    other => other,
                };
            }
            (
                QuestionEdit::SetCorrectOption(choice),
                AnswerSpec::MultipleChoice {
                    options,
                    correct_answer,
                },
            ) => {
                if let Some(index) = choice.filter(|i| *i >= options.len()) {
                    return Err(ContentError::invalid_edit(format!(
                        "option {index} does not exist"
                    )));
                }
                *correct_answer = choice;
            }
            (QuestionEdit::SetTrueFalse(value), AnswerSpec::TrueFalse { correct_answer }) => {
                *correct_answer = value;
            }
            (QuestionEdit::SetAnswer(value), AnswerSpec::FillBlank { answer }) => {
                *answer = single_line(&value);
            }
            (
                QuestionEdit::SetSampleAnswer(sample),
                AnswerSpec::OpenEnded { sample_answer, .. },
            ) => {
                *sample_answer = non_empty(sample.as_deref().map(multi_line));
            }
            (QuestionEdit::ToggleKeyPoint(point), AnswerSpec::OpenEnded { key_points, .. }) => {
                let point = single_line(&point);
                if point.is_empty() {
                    return Err(ContentError::invalid_edit("key point must not be empty"));
                }
                if let Some(index) = key_points.iter().position(|p| *p == point) {
                    key_points.remove(index);
                } else {
                    key_points.push(point);
                }
            }
            (edit, _) => {
                return Err(ContentError::invalid_edit(format!(
                    "{edit:?} does not apply to a {kind} question"
                )));
            }
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn multiple_choice() -> Question {
        Question {
            text: "2+2?".to_string(),
            explanation: None,
            points: None,
            answer: AnswerSpec::MultipleChoice {
                options: vec!["3".into(), "4".into(), "5".into()],
                correct_answer: Some(1),
            },
        }
    }

    #[test]
    fn test_question_kind_labels_round_trip() {
        for kind in QuestionKind::ALL {
            assert_eq!(QuestionKind::from_label(kind.label()), Some(kind));
        }
    }

    #[test]
    fn test_question_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&QuestionKind::MultipleChoice).unwrap(),
            r#""multiple-choice""#
        );
        assert_eq!(
            serde_json::to_string(&QuestionKind::FillBlank).unwrap(),
            r#""fill-blank""#
        );
    }

    #[test]
    fn test_question_serialization_shape() {
        let json = serde_json::to_string(&multiple_choice()).unwrap();
        assert!(json.contains(r#""type":"multiple-choice""#));
        assert!(json.contains(r#""correctAnswer":1"#));
        assert!(!json.contains("explanation"));
    }

    #[test]
    fn test_change_tag_resets_type_fields() {
        let mut question = multiple_choice();
        question.explanation = Some("because".to_string());

        question.change_tag(QuestionKind::TrueFalse);

        assert_eq!(question.tag(), QuestionKind::TrueFalse);
        assert_eq!(question.text, "2+2?");
        assert_eq!(question.explanation.as_deref(), Some("because"));
        assert_eq!(
            question.answer,
            AnswerSpec::TrueFalse {
                correct_answer: Some(true)
            }
        );
    }

    #[test]
    fn test_change_tag_to_same_kind_keeps_fields() {
        let mut question = multiple_choice();
        question.change_tag(QuestionKind::MultipleChoice);
        assert_eq!(question, multiple_choice());
    }

    #[test]
    fn test_remove_option_shifts_correct_answer() {
        let mut question = multiple_choice();
        question.apply(QuestionEdit::RemoveOption(0)).unwrap();

        let AnswerSpec::MultipleChoice {
            options,
            correct_answer,
        } = &question.answer
        else {
            panic!("expected multiple choice");
        };
        assert_eq!(options, &vec!["4".to_string(), "5".to_string()]);
        assert_eq!(*correct_answer, Some(0));
    }

    #[test]
    fn test_remove_option_keeps_two() {
        let mut question = multiple_choice();
        question.apply(QuestionEdit::RemoveOption(2)).unwrap();
        let err = question.apply(QuestionEdit::RemoveOption(0)).unwrap_err();
        assert!(err.is_edit_error());
    }

    #[test]
    fn test_add_option_limit() {
        let mut question = multiple_choice();
        for n in 0..3 {
            question.apply(QuestionEdit::AddOption(format!("x{n}"))).unwrap();
        }
        assert!(question.apply(QuestionEdit::AddOption("x".into())).is_err());
    }

    #[test]
    fn test_edit_for_wrong_kind_is_rejected() {
        let mut question = multiple_choice();
        let before = question.clone();
        let err = question
            .apply(QuestionEdit::SetAnswer("four".into()))
            .unwrap_err();
        assert!(err.to_string().contains("Multiple Choice"));
        assert_eq!(question, before);
    }

    #[test]
    fn test_toggle_key_point() {
        let mut question = Question::with_defaults(QuestionKind::OpenEnded);
        question
            .apply(QuestionEdit::ToggleKeyPoint("photosynthesis".into()))
            .unwrap();
        question
            .apply(QuestionEdit::ToggleKeyPoint("light".into()))
            .unwrap();
        question
            .apply(QuestionEdit::ToggleKeyPoint("photosynthesis".into()))
            .unwrap();

        assert_eq!(
            question.answer,
            AnswerSpec::OpenEnded {
                sample_answer: None,
                key_points: vec!["light".to_string()],
            }
        );
    }

    #[test]
    fn test_set_explanation_normalizes_empty() {
        let mut question = multiple_choice();
        question
            .apply(QuestionEdit::SetExplanation(Some("  ".into())))
            .unwrap();
        assert!(question.explanation.is_none());
    }

    #[test]
    fn test_metadata_toggle_question_type() {
        let mut metadata = QuizMetadata::default();
        metadata
            .apply(QuizMetadataEdit::ToggleQuestionType(QuestionKind::TrueFalse))
            .unwrap();
        assert_eq!(metadata.question_types, vec![QuestionKind::TrueFalse]);
        metadata
            .apply(QuizMetadataEdit::ToggleQuestionType(QuestionKind::TrueFalse))
            .unwrap();
        assert!(metadata.question_types.is_empty());
    }

    #[test]
    fn test_metadata_fill_missing_from() {
        let mut parsed = QuizMetadata {
            title: "Parsed".to_string(),
            ..Default::default()
        };
        let supplied = QuizMetadata {
            title: "Supplied".to_string(),
            subject: "Science".to_string(),
            grade_level: "5".to_string(),
            question_types: vec![QuestionKind::OpenEnded],
        };

        parsed.fill_missing_from(&supplied);

        assert_eq!(parsed.title, "Parsed");
        assert_eq!(parsed.subject, "Science");
        assert_eq!(parsed.question_types, vec![QuestionKind::OpenEnded]);
    }
}
