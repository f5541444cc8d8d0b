//! Lesson plan grammar.
//!
//! ```text
//! Title: Fractions
//! Duration: 45 minutes
//! Format: 5E
//! Section 1 (Objectives): Learning Objectives
//! - Add fractions with unlike denominators
//! Section 2 (Activity): Explore
//! Duration: 15 minutes
//! 1. Hand out fraction strips
//! ```
//!
//! Sections are classified from an explicit label, then heading keywords,
//! then body markers. Notes keep their body verbatim.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{LessonMetadata, LessonPlan, LessonVariant, Section, SectionContent, SectionKind};
use crate::document::{Diagnostic, Document, ParseReport};
use crate::grammar::{
    anchor_regex, join_lines, leading_number, list_item, marker_regex, marker_value,
    numbered_item, split_list, split_segments, strip_noise, unescape_line, Segment,
};

static ANCHOR_RE: Lazy<Regex> = Lazy::new(|| anchor_regex("section|part"));

static TITLE_RE: Lazy<Regex> = Lazy::new(|| marker_regex(r"(?:lesson\s+)?title"));
static SUBJECT_RE: Lazy<Regex> = Lazy::new(|| marker_regex("subject"));
static GRADE_RE: Lazy<Regex> = Lazy::new(|| marker_regex(r"grade(?:\s+level)?"));
static FORMAT_RE: Lazy<Regex> = Lazy::new(|| marker_regex("format|variant|model"));
static STANDARDS_RE: Lazy<Regex> = Lazy::new(|| marker_regex("standards?"));

static TYPE_RE: Lazy<Regex> = Lazy::new(|| marker_regex(r"(?:section\s+)?type"));
static DURATION_RE: Lazy<Regex> = Lazy::new(|| marker_regex(r"duration|time"));
static CRITERIA_RE: Lazy<Regex> = Lazy::new(|| marker_regex(r"(?:success\s+)?criteria"));

/// Parses lesson plan text.
pub(crate) fn parse_lesson_plan(text: &str) -> ParseReport<LessonPlan> {
    let lines = strip_noise(text);
    let (header, segments) = split_segments(&lines, &ANCHOR_RE);

    let mut diagnostics = Vec::new();
    let mut sections = Vec::with_capacity(segments.len());

    for segment in &segments {
        match parse_section(segment) {
            Ok(section) => sections.push(section),
            Err(message) => {
                tracing::debug!(segment = segment.number, %message, "Dropping lesson plan segment");
                diagnostics.push(Diagnostic::new(segment.number, message));
            }
        }
    }

    let document = if sections.is_empty() {
        None
    } else {
        Some(Document::with_blocks(parse_metadata(&header), sections))
    };

    ParseReport {
        document,
        diagnostics,
        segments_found: segments.len(),
    }
}

fn parse_section(segment: &Segment) -> Result<Section, String> {
    let mut body = segment.trimmed_body();
    let mut label = segment.label.as_deref().and_then(SectionKind::from_label);

    if let Some(value) = body.first().and_then(|l| marker_value(l, &TYPE_RE)) {
        if label.is_none() {
            label = SectionKind::from_label(value);
        }
        body = &body[1..];
    }

    let kind = label
        .or_else(|| kind_from_heading(&segment.title))
        .unwrap_or_else(|| kind_from_body(body));

    let content = match kind {
        SectionKind::Objectives | SectionKind::Materials => {
            let items: Vec<String> = body
                .iter()
                .filter(|l| !l.is_empty())
                .map(|l| item_text(l))
                .collect();
            if items.is_empty() {
                return Err(format!("{kind} section has no items"));
            }
            if kind == SectionKind::Objectives {
                SectionContent::Objectives { items }
            } else {
                SectionContent::Materials { items }
            }
        }
        SectionKind::Activity => {
            let mut duration_minutes = None;
            let mut steps = Vec::new();
            for line in body.iter().filter(|l| !l.is_empty()) {
                if let Some(value) = marker_value(line, &DURATION_RE) {
                    duration_minutes = duration_minutes.or_else(|| leading_number(value));
                } else {
                    steps.push(item_text(line));
                }
            }
            SectionContent::Activity {
                duration_minutes,
                steps,
            }
        }
        SectionKind::Assessment => {
            let split = body.iter().position(|l| CRITERIA_RE.is_match(l));
            let (described, criteria) = match split {
                Some(index) => (&body[..index], criteria_lines(&body[index..])),
                None => (body, Vec::new()),
            };
            SectionContent::Assessment {
                description: join_lines(described),
                criteria,
            }
        }
        SectionKind::Notes => SectionContent::Notes {
            text: join_lines(body),
        },
    };

    Ok(Section {
        heading: segment.title.clone(),
        content,
    })
}

/// Reads a list item, or a whole line when it is not one.
fn item_text(line: &str) -> String {
    list_item(line)
        .unwrap_or_else(|| unescape_line(line))
        .to_string()
}

fn kind_from_heading(heading: &str) -> Option<SectionKind> {
    let heading = heading.to_ascii_lowercase();
    if heading.contains("objective") || heading.contains("goal") {
        Some(SectionKind::Objectives)
    } else if heading.contains("material") || heading.contains("resource") {
        Some(SectionKind::Materials)
    } else if heading.contains("assessment") || heading.contains("evaluat") {
        Some(SectionKind::Assessment)
    } else {
        None
    }
}

fn kind_from_body(body: &[String]) -> SectionKind {
    if body
        .iter()
        .any(|l| DURATION_RE.is_match(l) || numbered_item(l).is_some())
    {
        SectionKind::Activity
    } else if body.iter().any(|l| CRITERIA_RE.is_match(l)) {
        SectionKind::Assessment
    } else {
        SectionKind::Notes
    }
}

/// Reads the criteria list starting at the `Criteria:` marker line.
fn criteria_lines(lines: &[String]) -> Vec<String> {
    let mut criteria: Vec<String> = lines
        .first()
        .and_then(|l| marker_value(l, &CRITERIA_RE))
        .map(|inline| {
            inline
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();

    criteria.extend(
        lines
            .iter()
            .skip(1)
            .filter(|l| !l.is_empty())
            .map(|l| item_text(l)),
    );
    criteria
}

fn parse_metadata(header: &[String]) -> LessonMetadata {
    let mut metadata = LessonMetadata::default();
    let mut variant = None;
    for line in header {
        if let Some(value) = marker_value(line, &TITLE_RE) {
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
        } else if let Some(value) = marker_value(line, &DURATION_RE) {
            metadata.duration_minutes = metadata.duration_minutes.or_else(|| leading_number(value));
        } else if let Some(value) = marker_value(line, &FORMAT_RE) {
            variant = variant.or_else(|| LessonVariant::from_label(value));
        } else if let Some(value) = marker_value(line, &STANDARDS_RE) {
            for standard in split_list(value) {
                if !metadata.standards.contains(&standard) {
                    metadata.standards.push(standard);
                }
            }
        }
    }
    metadata.variant = variant.unwrap_or_default();
    metadata
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sections(text: &str) -> Vec<Section> {
        parse_lesson_plan(text)
            .document
            .map(|d| d.blocks().iter().map(|b| b.body.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_header() {
        let report = parse_lesson_plan(
            "Title: Fractions\nSubject: Math\nGrade Level: 5\nDuration: 45 minutes\nFormat: 5E\nStandards: 5.NF.1, 5.NF.2\n\nSection 1: Notes\nBring snacks.",
        );
        let metadata = report.document.unwrap().metadata;
        assert_eq!(metadata.title, "Fractions");
        assert_eq!(metadata.duration_minutes, Some(45));
        assert_eq!(metadata.variant, LessonVariant::FiveE);
        assert_eq!(metadata.standards, vec!["5.NF.1", "5.NF.2"]);
    }

    #[test]
    fn test_heading_keywords() {
        let parsed = sections(
            "Section 1: Learning Goals\n- add fractions\n\nSection 2: Resources\n* strips\n* markers\n\nSection 3: Exit Ticket Evaluation\nSolve two problems.",
        );
        assert_eq!(
            parsed[0].content,
            SectionContent::Objectives {
                items: vec!["add fractions".into()]
            }
        );
        assert_eq!(
            parsed[1].content,
            SectionContent::Materials {
                items: vec!["strips".into(), "markers".into()]
            }
        );
        assert_eq!(
            parsed[2].content,
            SectionContent::Assessment {
                description: "Solve two problems.".into(),
                criteria: vec![]
            }
        );
    }

    #[test]
    fn test_activity_from_body() {
        let parsed = sections("Part 2: Explore\nDuration: 15 minutes\n1. Hand out strips\n2. Compare");
        assert_eq!(parsed[0].heading, "Explore");
        assert_eq!(
            parsed[0].content,
            SectionContent::Activity {
                duration_minutes: Some(15),
                steps: vec!["Hand out strips".into(), "Compare".into()]
            }
        );
    }

    #[test]
    fn test_assessment_from_criteria() {
        let parsed = sections("Section 4: Wrap up\nStudents present.\nCriteria:\n- clear\n- correct");
        assert_eq!(
            parsed[0].content,
            SectionContent::Assessment {
                description: "Students present.".into(),
                criteria: vec!["clear".into(), "correct".into()]
            }
        );
    }

    #[test]
    fn test_bullets_only_become_verbatim_notes() {
        let parsed = sections("Section 1: Reminders\n- bring rulers\n- collect homework");
        assert_eq!(
            parsed[0].content,
            SectionContent::Notes {
                text: "- bring rulers\n- collect homework".into()
            }
        );
    }

    #[test]
    fn test_type_line_label() {
        let parsed = sections("Section 1: Warm-up\nType: Activity\nThink-pair-share");
        assert_eq!(
            parsed[0].content,
            SectionContent::Activity {
                duration_minutes: None,
                steps: vec!["Think-pair-share".into()]
            }
        );
    }

    #[test]
    fn test_empty_objectives_dropped() {
        let report = parse_lesson_plan("Section 1: Objectives\n\nSection 2: Notes\nhello");
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].segment, 1);
        assert_eq!(report.document.unwrap().len(), 1);
    }

    #[test]
    fn test_no_sections() {
        assert!(parse_lesson_plan("Just a paragraph.").document.is_none());
    }
}
