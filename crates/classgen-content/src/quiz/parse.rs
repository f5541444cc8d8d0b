//! Quiz grammar.
//!
//! ```text
//! Title: Fractions
//! Question 1 (Multiple Choice): What is 1/2 + 1/4?
//! A) 3/4
//! B) 2/6
//! Correct Answer: A
//! Explanation: Convert to quarters first.
//! ```
//!
//! Each `Question N:` anchor starts a segment. The type is classified from,
//! in order: an explicit label, a `Correct Answer: True/False` line, two or
//! more lettered options, an `Answer:` line, a sample answer or key points.
//! Anything else is open-ended.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{AnswerSpec, Question, QuestionKind, Quiz, QuizMetadata, MAX_OPTIONS};
use crate::document::{Diagnostic, Document, ParseReport};
use crate::grammar::{
    anchor_regex, bullet_item, join_lines, leading_number, list_item, marker_regex,
    marker_value, split_list, split_segments, strip_noise, unescape_line, Segment,
};

static ANCHOR_RE: Lazy<Regex> = Lazy::new(|| anchor_regex("question"));

static TITLE_RE: Lazy<Regex> = Lazy::new(|| marker_regex(r"(?:quiz\s+)?title"));
static SUBJECT_RE: Lazy<Regex> = Lazy::new(|| marker_regex("subject"));
static GRADE_RE: Lazy<Regex> = Lazy::new(|| marker_regex(r"grade(?:\s+level)?"));
static TYPES_RE: Lazy<Regex> = Lazy::new(|| marker_regex(r"question\s+types"));

static TYPE_RE: Lazy<Regex> = Lazy::new(|| marker_regex(r"(?:question\s+)?type"));
static CORRECT_RE: Lazy<Regex> = Lazy::new(|| marker_regex(r"correct\s+(?:answer|option)"));
static SAMPLE_RE: Lazy<Regex> = Lazy::new(|| marker_regex(r"(?:sample|model|example)\s+answer"));
static ANSWER_RE: Lazy<Regex> = Lazy::new(|| marker_regex("answer"));
static KEY_POINTS_RE: Lazy<Regex> = Lazy::new(|| marker_regex(r"key\s+points"));
static EXPLANATION_RE: Lazy<Regex> = Lazy::new(|| marker_regex("explanation|rationale"));
static POINTS_RE: Lazy<Regex> = Lazy::new(|| marker_regex("points?"));

static OPTION_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^\(?([A-Fa-f])\s*[).:]\s*(.*)$").unwrap()
});

/// A bare letter reference such as `B`, `(B)`, `B)` or `B. 4`.
static LETTER_REF_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^\(?([A-Fa-f])\s*(?:[).:](?:\s.*)?)?$").unwrap()
});

/// One classified body line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line<'a> {
    Type(&'a str),
    Choice(char, &'a str),
    Correct(&'a str),
    Answer(&'a str),
    Sample(&'a str),
    KeyPoints(&'a str),
    Explanation(&'a str),
    Points(&'a str),
    Text(&'a str),
}

fn classify_line(line: &str) -> Line<'_> {
    // `Correct Answer:` and `Sample Answer:` must be tried before `Answer:`
    if let Some(value) = marker_value(line, &CORRECT_RE) {
        return Line::Correct(value);
    }
    if let Some(value) = marker_value(line, &SAMPLE_RE) {
        return Line::Sample(value);
    }
    if let Some(value) = marker_value(line, &KEY_POINTS_RE) {
        return Line::KeyPoints(value);
    }
    if let Some(value) = marker_value(line, &EXPLANATION_RE) {
        return Line::Explanation(value);
    }
    if let Some(value) = marker_value(line, &POINTS_RE) {
        return Line::Points(value);
    }
    if let Some(value) = marker_value(line, &TYPE_RE) {
        return Line::Type(value);
    }
    if let Some(value) = marker_value(line, &ANSWER_RE) {
        return Line::Answer(value);
    }

    let candidate = bullet_item(line).unwrap_or(line);
    if let Some(caps) = OPTION_RE.captures(candidate) {
        let letter = caps[1]
            .chars()
            .next()
            .map_or('A', |c| c.to_ascii_uppercase());
        let text = caps.get(2).map_or("", |m| m.as_str().trim());
        return Line::Choice(letter, text);
    }

    Line::Text(line)
}

/// Where free text lines currently go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Stem,
    Explanation,
    Sample,
    KeyPoints,
    Closed,
}

/// Raw fields collected from one segment before classification.
#[derive(Debug, Default)]
struct Fields<'a> {
    type_label: Option<&'a str>,
    stem: Vec<String>,
    choices: Vec<(char, String)>,
    correct: Option<&'a str>,
    answer: Option<&'a str>,
    sample: Option<Vec<String>>,
    key_points: Option<Vec<String>>,
    explanation: Option<Vec<String>>,
    points: Option<u32>,
}

impl<'a> Fields<'a> {
    fn collect(segment: &'a Segment) -> Self {
        let mut fields = Self::default();
        if !segment.title.is_empty() {
            fields.stem.push(segment.title.clone());
        }

        let mut cursor = Cursor::Stem;
        let mut seen_content = false;
        for line in &segment.body {
            let first = !seen_content && !line.is_empty();
            seen_content |= first;
            // Bullets under `Key Points:` are points, even when they read like options
            let classified = if cursor == Cursor::KeyPoints && bullet_item(line).is_some() {
                Line::Text(line)
            } else {
                classify_line(line)
            };
            match classified {
                Line::Type(label) if first => {
                    fields.type_label = Some(label);
                    cursor = Cursor::Closed;
                }
                Line::Choice(letter, text) => {
                    if fields.choices.iter().any(|(l, _)| *l == letter) {
                        tracing::debug!(
                            segment = segment.number,
                            %letter,
                            "Ignoring repeated option letter"
                        );
                    } else {
                        fields.choices.push((letter, text.to_string()));
                    }
                    cursor = Cursor::Closed;
                }
                Line::Correct(value) => {
                    fields.correct.get_or_insert(value);
                    cursor = Cursor::Closed;
                }
                Line::Answer(value) => {
                    fields.answer.get_or_insert(value);
                    cursor = Cursor::Closed;
                }
                Line::Points(value) => {
                    if fields.points.is_none() {
                        fields.points = leading_number(value);
                    }
                    cursor = Cursor::Closed;
                }
                Line::Sample(value) if fields.sample.is_none() => {
                    fields.sample = Some(vec![value.to_string()]);
                    cursor = Cursor::Sample;
                }
                Line::KeyPoints(value) if fields.key_points.is_none() => {
                    let inline = value
                        .split(';')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(ToString::to_string)
                        .collect();
                    fields.key_points = Some(inline);
                    cursor = Cursor::KeyPoints;
                }
                Line::Explanation(value) if fields.explanation.is_none() => {
                    fields.explanation = Some(vec![value.to_string()]);
                    cursor = Cursor::Explanation;
                }
                Line::Text(text) => fields.push_text(cursor, text, segment.number),
                // Late `Type:` lines and repeated markers
                Line::Type(_) | Line::Sample(_) | Line::KeyPoints(_) | Line::Explanation(_) => {
                    cursor = Cursor::Closed;
                }
            }
        }
        fields
    }

    fn push_text(&mut self, cursor: Cursor, text: &str, segment: u32) {
        match cursor {
            Cursor::Stem => self.stem.push(text.to_string()),
            Cursor::Explanation => push_line(&mut self.explanation, text),
            Cursor::Sample => push_line(&mut self.sample, text),
            Cursor::KeyPoints => {
                if !text.is_empty() {
                    let item = list_item(text).unwrap_or_else(|| unescape_line(text));
                    push_line(&mut self.key_points, item);
                }
            }
            Cursor::Closed => {
                if !text.is_empty() {
                    tracing::debug!(segment, line = text, "Ignoring stray line");
                }
            }
        }
    }

    fn classify(&self, label: Option<QuestionKind>) -> QuestionKind {
        if let Some(kind) = label {
            return kind;
        }
        // A lone `T`/`F` is an option letter once there are options to pick from
        let boolean = if self.choices.len() >= 2 {
            self.correct.and_then(parse_bool)
        } else {
            self.correct.and_then(parse_bool_or_letter)
        };
        if boolean.is_some() {
            return QuestionKind::TrueFalse;
        }
        if self.choices.len() >= 2 {
            return QuestionKind::MultipleChoice;
        }
        if self.answer.is_some() {
            return QuestionKind::FillBlank;
        }
        QuestionKind::OpenEnded
    }

    fn extract(mut self, kind: QuestionKind) -> Result<Question, String> {
        let answer = match kind {
            QuestionKind::MultipleChoice => {
                if self.choices.len() < 2 {
                    return Err(format!(
                        "multiple-choice question needs at least two options, found {}",
                        self.choices.len()
                    ));
                }
                self.choices.sort_by_key(|(letter, _)| *letter);
                self.choices.truncate(MAX_OPTIONS);
                let letters: Vec<char> = self.choices.iter().map(|(l, _)| *l).collect();
                let options: Vec<String> = self.choices.into_iter().map(|(_, t)| t).collect();
                let correct_answer = self
                    .correct
                    .or(self.answer)
                    .and_then(|value| resolve_choice(value, &letters, &options));
                AnswerSpec::MultipleChoice {
                    options,
                    correct_answer,
                }
            }
            QuestionKind::TrueFalse => AnswerSpec::TrueFalse {
                correct_answer: self.correct.or(self.answer).and_then(parse_bool_or_letter),
            },
            QuestionKind::FillBlank => match self.answer.or(self.correct) {
                Some(answer) => AnswerSpec::FillBlank {
                    answer: answer.to_string(),
                },
                None => {
                    return Err("fill-in-the-blank question has no answer line".to_string());
                }
            },
            QuestionKind::OpenEnded => {
                let sample_answer = self
                    .sample
                    .as_deref()
                    .map(join_lines)
                    .or_else(|| self.answer.map(ToString::to_string))
                    .filter(|s| !s.is_empty());
                AnswerSpec::OpenEnded {
                    sample_answer,
                    key_points: self.key_points.unwrap_or_default(),
                }
            }
        };

        Ok(Question {
            text: join_lines(&self.stem),
            explanation: self
                .explanation
                .as_deref()
                .map(join_lines)
                .filter(|s| !s.is_empty()),
            points: self.points,
            answer,
        })
    }
}

fn push_line(target: &mut Option<Vec<String>>, text: &str) {
    target.get_or_insert_with(Vec::new).push(text.to_string());
}

/// Reads the word `True` or `False` from the start of a value.
fn parse_bool(value: &str) -> Option<bool> {
    match leading_word(value).as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Like [`parse_bool`], also accepting the abbreviations `T` and `F`.
fn parse_bool_or_letter(value: &str) -> Option<bool> {
    match leading_word(value).as_str() {
        "t" => Some(true),
        "f" => Some(false),
        _ => parse_bool(value),
    }
}

fn leading_word(value: &str) -> String {
    value
        .trim_start()
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Resolves a correct-answer value to an option index, by letter or by text.
fn resolve_choice(value: &str, letters: &[char], options: &[String]) -> Option<usize> {
    let value = value.trim();
    if let Some(caps) = LETTER_REF_RE.captures(value) {
        let letter = caps[1].chars().next().map(|c| c.to_ascii_uppercase());
        if let Some(index) = letters.iter().position(|l| Some(*l) == letter) {
            return Some(index);
        }
    }
    options.iter().position(|o| o.eq_ignore_ascii_case(value))
}

fn parse_metadata(header: &[String]) -> QuizMetadata {
    let mut metadata = QuizMetadata::default();
    for line in header {
        if let Some(value) = marker_value(line, &TYPES_RE) {
            if metadata.question_types.is_empty() {
                for kind in split_list(value)
                    .iter()
                    .filter_map(|l| QuestionKind::from_label(l))
                {
                    if !metadata.question_types.contains(&kind) {
                        metadata.question_types.push(kind);
                    }
                }
            }
        } else if let Some(value) = marker_value(line, &TITLE_RE) {
            if metadata.title.is_empty() {
                metadata.title = value.to_string();
            }
        } else if let Some(value) = marker_value(line, &SUBJECT_RE) {
            if metadata.subject.is_empty() {
                metadata.subject = value.to_string();
            }
        } else if let Some(value) = marker_value(line, &GRADE_RE) {
            if metadata.grade_level.is_empty() {
                metadata.grade_level = value.to_string();
            }
        }
    }
    metadata
}

/// Parses quiz text.
pub(crate) fn parse_quiz(text: &str) -> ParseReport<Quiz> {
    let lines = strip_noise(text);
    let (header, segments) = split_segments(&lines, &ANCHOR_RE);

    let mut diagnostics = Vec::new();
    let mut questions = Vec::with_capacity(segments.len());

    for segment in &segments {
        let fields = Fields::collect(segment);
        let label = segment
            .label
            .as_deref()
            .or(fields.type_label)
            .and_then(QuestionKind::from_label);
        let kind = fields.classify(label);

        match fields.extract(kind) {
            Ok(question) => questions.push(question),
            Err(message) => {
                tracing::debug!(segment = segment.number, %message, "Dropping quiz segment");
                diagnostics.push(Diagnostic::new(segment.number, message));
            }
        }
    }

    let document = if questions.is_empty() {
        None
    } else {
        Some(Document::with_blocks(parse_metadata(&header), questions))
    };

    ParseReport {
        document,
        diagnostics,
        segments_found: segments.len(),
    }
}
