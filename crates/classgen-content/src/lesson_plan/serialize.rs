//! Canonical lesson plan text.

use std::fmt::Write;

use super::{LessonMetadata, LessonPlan, Section, SectionContent};
use crate::document::Document;
use crate::grammar::{escape_inline, escape_line};

/// Serializes a lesson plan into canonical text.
pub(crate) fn serialize_lesson_plan(document: &Document<LessonPlan>) -> String {
    let mut out = String::new();
    write_header(&mut out, &document.metadata);

    for (index, block) in document.blocks().iter().enumerate() {
        out.push('\n');
        write_section(&mut out, index + 1, &block.body);
    }
    out
}

fn write_header(out: &mut String, metadata: &LessonMetadata) {
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
    if let Some(minutes) = metadata.duration_minutes {
        let _ = writeln!(out, "Duration: {minutes} minutes");
    }
    let _ = writeln!(out, "Format: {}", metadata.variant.label());
    if !metadata.standards.is_empty() {
        let standards: Vec<_> = metadata.standards.iter().map(|s| escape_inline(s)).collect();
        let _ = writeln!(out, "Standards: {}", standards.join(", "));
    }
}

fn write_section(out: &mut String, number: usize, section: &Section) {
    let label = section.content.kind().label();
    if section.heading.is_empty() {
        let _ = writeln!(out, "Section {number} ({label}):");
    } else {
        let _ = writeln!(
            out,
            "Section {number} ({label}): {}",
            escape_inline(&section.heading)
        );
    }

    match &section.content {
        SectionContent::Objectives { items } | SectionContent::Materials { items } => {
            for item in items {
                let _ = writeln!(out, "- {}", escape_inline(item));
            }
        }
        SectionContent::Activity {
            duration_minutes,
            steps,
        } => {
            if let Some(minutes) = duration_minutes {
                let _ = writeln!(out, "Duration: {minutes} minutes");
            }
            for (n, step) in steps.iter().enumerate() {
                let _ = writeln!(out, "{}. {}", n + 1, escape_inline(step));
            }
        }
        SectionContent::Assessment {
            description,
            criteria,
        } => {
            write_text(out, description);
            if !criteria.is_empty() {
                out.push_str("Criteria:\n");
                for criterion in criteria {
                    let _ = writeln!(out, "- {}", escape_inline(criterion));
                }
            }
        }
        SectionContent::Notes { text } => write_text(out, text),
    }
}

/// Writes free text below an anchor, one escaped line at a time.
fn write_text(out: &mut String, text: &str) {
    for line in text.lines() {
        let _ = writeln!(out, "{}", escape_line(line));
    }
}
