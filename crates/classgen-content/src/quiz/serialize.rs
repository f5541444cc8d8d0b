//! Canonical quiz text.
//!
//! The output always re-parses to the same document: the type label is
//! written into every anchor, so classification never depends on heuristics,
//! and field values are escaped wherever they would read as syntax.

use std::fmt::Write;

use super::{AnswerSpec, Question, Quiz, QuizMetadata};
use crate::document::Document;
use crate::grammar::{escape_inline, escape_line, fits_marker_line};

/// Serializes a quiz into canonical text.
pub(crate) fn serialize_quiz(document: &Document<Quiz>) -> String {
    let mut out = String::new();
    write_header(&mut out, &document.metadata);

    for (index, block) in document.blocks().iter().enumerate() {
        if !out.is_empty() {
            out.push('\n');
        }
        write_question(&mut out, index + 1, &block.body);
    }
    out
}

fn write_header(out: &mut String, metadata: &QuizMetadata) {
    let fields = [
        ("Title", metadata.title.as_str()),
        ("Subject", metadata.subject.as_str()),
        ("Grade Level", metadata.grade_level.as_str()),
    ];
    for (name, value) in fields {
        if !value.is_empty() {
            let _ = writeln!(out, "{name}: {}", escape_inline(value));
        }
    }
    if !metadata.question_types.is_empty() {
        let labels: Vec<&str> = metadata.question_types.iter().map(|k| k.label()).collect();
        let _ = writeln!(out, "Question Types: {}", labels.join(", "));
    }
}

fn write_question(out: &mut String, number: usize, question: &Question) {
    let label = question.answer.kind().label();
    write_field(out, &format!("Question {number} ({label})"), &question.text);

    match &question.answer {
        AnswerSpec::MultipleChoice {
            options,
            correct_answer,
        } => {
            for (letter, option) in ('A'..).zip(options) {
                let _ = writeln!(out, "{letter}) {}", escape_inline(option));
            }
            if let Some(letter) = correct_answer.and_then(option_letter) {
                let _ = writeln!(out, "Correct Answer: {letter}");
            }
        }
        AnswerSpec::TrueFalse { correct_answer } => {
            if let Some(value) = correct_answer {
                let value = if *value { "True" } else { "False" };
                let _ = writeln!(out, "Correct Answer: {value}");
            }
        }
        AnswerSpec::FillBlank { answer } => {
            if answer.is_empty() {
                out.push_str("Answer:\n");
            } else {
                let _ = writeln!(out, "Answer: {}", escape_inline(answer));
            }
        }
        AnswerSpec::OpenEnded {
            sample_answer,
            key_points,
        } => {
            if let Some(sample) = sample_answer {
                write_field(out, "Sample Answer", sample);
            }
            if !key_points.is_empty() {
                out.push_str("Key Points:\n");
                for point in key_points {
                    let _ = writeln!(out, "- {}", escape_inline(point));
                }
            }
        }
    }

    if let Some(explanation) = &question.explanation {
        write_field(out, "Explanation", explanation);
    }
    if let Some(points) = question.points {
        let _ = writeln!(out, "Points: {points}");
    }
}

fn option_letter(index: usize) -> Option<char> {
    u8::try_from(index)
        .ok()
        .filter(|i| usize::from(*i) < super::MAX_OPTIONS)
        .map(|i| char::from(b'A' + i))
}

/// Writes `Name: value`, continuing multi-line values on following lines.
///
/// A first line with outer whitespace moves below the marker so it can be
/// written as a literal line.
fn write_field(out: &mut String, name: &str, value: &str) {
    let mut lines = value.lines();
    match lines.next() {
        Some(first) if fits_marker_line(first) => {
            let _ = writeln!(out, "{name}: {}", escape_inline(first));
        }
        Some(first) => {
            let _ = writeln!(out, "{name}:");
            let _ = writeln!(out, "{}", escape_line(first));
        }
        None => {
            let _ = writeln!(out, "{name}:");
        }
    }
    for line in lines {
        let _ = writeln!(out, "{}", escape_line(line));
    }
}
