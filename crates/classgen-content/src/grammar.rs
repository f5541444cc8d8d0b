//! Line-level scanning shared by the kind-specific grammars.
//!
//! Every grammar has the same outer shape: a metadata header, then segments
//! introduced by a numbered anchor line (`Question 3: ...`, `Section 2: ...`).
//! This module strips generator noise, splits the text into segments and
//! provides the small helpers for markers and list items.
//!
//! Canonical text escapes user content that would otherwise read as syntax.
//! A line starting with `\` is literal: it skips noise stripping and every
//! classifier, and the backslash is removed when the value is read back.
//! Inside other lines, `\*` and `\\` stand for a literal `*` and `\`.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

/// A segment of text introduced by an anchor line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment {
    /// The number written in the anchor.
    pub number: u32,
    /// A type label written in the anchor, e.g. `Question 1 (True/False):`.
    pub label: Option<String>,
    /// The remainder of the anchor line after the separator.
    pub title: String,
    /// Trimmed body lines up to the next anchor, blank lines included.
    pub body: Vec<String>,
}

impl Segment {
    /// Returns the body with leading and trailing blank lines removed.
    pub fn trimmed_body(&self) -> &[String] {
        let start = self
            .body
            .iter()
            .position(|l| !l.is_empty())
            .unwrap_or(self.body.len());
        let end = self
            .body
            .iter()
            .rposition(|l| !l.is_empty())
            .map_or(start, |i| i + 1);
        &self.body[start..end]
    }
}

/// Builds the anchor regex for a keyword such as `question` or `section|part`.
///
/// Captures: 1 = number, 2/3 = bracketed label, 4 = title remainder.
pub(crate) fn anchor_regex(keywords: &str) -> Regex {
    let pattern = format!(
        r"(?i)^(?:{keywords})\s+(\d+)\s*(?:\(([^)]*)\)|\[([^\]]*)\])?\s*(?:[:.)\-]\s*(.*?)|)\s*$"
    );
    #[allow(clippy::expect_used)]
    Regex::new(&pattern).expect("anchor pattern is built from fixed keywords")
}

static FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^`{3,}[\w-]*$").unwrap()
});

static RULE_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^(?:-{3,}|\*{3,}|={3,})$").unwrap()
});

static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^#{1,6}\s*").unwrap()
});

static BULLET_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[-*•+]\s+(.*)$").unwrap()
});

static NUMBERED_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^(?:(?i:step)\s+)?\d+[.):]\s+(.*)$").unwrap()
});

/// Lines that some grammar would read as an anchor, marker or list item.
static STRUCTURAL_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^(?:[\p{L}\s]+[:\-]|\p{L}\s*[).:]|\p{L}+\s+\d|\d+\s*[.):])").unwrap()
});

const LITERAL: char = '\\';

/// Removes markup the generation service wraps around content.
///
/// Drops code fences, horizontal rules and blockquote/heading prefixes, and
/// removes `**` emphasis. Underscores are left alone because fill-in-the-blank
/// questions use them as blanks. Literal lines are kept untouched, prefix
/// included, so classifiers pass over them.
pub(crate) fn strip_noise(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|raw| {
            let start = raw.trim_start();
            if start.starts_with(LITERAL) {
                return Some(start.to_string());
            }
            let line = raw.trim();
            if FENCE_RE.is_match(line) || RULE_RE.is_match(line) {
                return None;
            }
            let line = line.strip_prefix('>').map_or(line, str::trim_start);
            let line = HEADING_RE.replace(line, "");
            Some(strip_emphasis(&line).trim().to_string())
        })
        .collect()
}

/// Drops `**` and resolves the `\*` and `\\` escapes.
fn strip_emphasis(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            LITERAL if matches!(chars.peek(), Some(&(LITERAL | '*'))) => {
                out.extend(chars.next());
            }
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

/// Returns the text of a line, without the literal prefix if it has one.
pub(crate) fn unescape_line(line: &str) -> &str {
    line.strip_prefix(LITERAL).unwrap_or(line)
}

/// Escapes a value written after a marker or list prefix on the same line.
pub(crate) fn escape_inline(value: &str) -> Cow<'_, str> {
    if value.contains("**") || value.contains(LITERAL) {
        Cow::Owned(value.replace(LITERAL, "\\\\").replace('*', "\\*"))
    } else {
        Cow::Borrowed(value)
    }
}

/// Escapes a free-text line written on a line of its own.
///
/// Lines the grammar would strip, trim or classify get the literal prefix;
/// plain prose and blank lines are written as they are.
pub(crate) fn escape_line(line: &str) -> Cow<'_, str> {
    let literal = !line.is_empty()
        && (line.trim() != line
            || line.contains("**")
            || line.contains(LITERAL)
            || !line.starts_with(char::is_alphanumeric)
            || STRUCTURAL_RE.is_match(line));
    if literal {
        Cow::Owned(format!("{LITERAL}{line}"))
    } else {
        Cow::Borrowed(line)
    }
}

/// Returns `true` if a value's first line can share a line with its marker.
pub(crate) fn fits_marker_line(first: &str) -> bool {
    !first.is_empty() && first.trim() == first
}

/// Normalizes raw text kept whole in a fallback block.
///
/// Line endings become `\n`; leading blank lines and trailing whitespace are
/// dropped. Indentation and inner whitespace survive.
pub(crate) fn raw_text(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n");
    let text = text.trim_end();
    let start = text
        .find(|c: char| !c.is_whitespace())
        .map_or(text.len(), |first| text[..first].rfind('\n').map_or(0, |nl| nl + 1));
    text[start..].to_string()
}

/// Splits noise-stripped lines into the header and anchored segments.
pub(crate) fn split_segments(lines: &[String], anchor: &Regex) -> (Vec<String>, Vec<Segment>) {
    let mut header = Vec::new();
    let mut segments: Vec<Segment> = Vec::new();

    for line in lines {
        if let Some(caps) = anchor.captures(line) {
            let number = caps
                .get(1)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            let label = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty());
            let title = caps
                .get(4)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            segments.push(Segment {
                number,
                label,
                title,
                body: Vec::new(),
            });
        } else if let Some(current) = segments.last_mut() {
            current.body.push(line.clone());
        } else {
            header.push(line.clone());
        }
    }

    (header, segments)
}

/// Matches `Name: value` for any of the given names, case-insensitively.
///
/// Returns the trimmed value, which may be empty.
pub(crate) fn marker_value<'a>(line: &'a str, re: &Regex) -> Option<&'a str> {
    re.captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Builds a case-insensitive `Name: value` regex for the given name pattern.
pub(crate) fn marker_regex(names: &str) -> Regex {
    let pattern = format!(r"(?i)^(?:{names})\s*[:\-]\s*(.*)$");
    #[allow(clippy::expect_used)]
    Regex::new(&pattern).expect("marker pattern is built from fixed names")
}

/// Returns the text of a bullet item (`- x`, `* x`, `• x`).
pub(crate) fn bullet_item(line: &str) -> Option<&str> {
    BULLET_RE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Returns the text of a numbered item (`1. x`, `2) x`, `Step 3: x`).
pub(crate) fn numbered_item(line: &str) -> Option<&str> {
    NUMBERED_RE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Returns the text of any list item, bulleted or numbered.
pub(crate) fn list_item(line: &str) -> Option<&str> {
    bullet_item(line).or_else(|| numbered_item(line))
}

/// Extracts the first unsigned integer in a value such as `45 minutes`.
pub(crate) fn leading_number(value: &str) -> Option<u32> {
    let digits: String = value
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Joins collected lines into a multi-line value, trimming the outer blank
/// lines and reading literal lines back.
pub(crate) fn join_lines(lines: &[String]) -> String {
    let start = lines
        .iter()
        .position(|l| !l.is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.is_empty())
        .map_or(start, |i| i + 1);
    lines[start..end]
        .iter()
        .map(|l| unescape_line(l))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits a comma-separated header list, dropping empty entries.
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Normalizes a single-line field: inner line breaks become spaces.
pub(crate) fn single_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalizes a multi-line field the way the parser reads it back.
pub(crate) fn multi_line(value: &str) -> String {
    value
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Reduces a free-form label to lowercase alphanumerics for comparison.
pub(crate) fn label_key(label: &str) -> String {
    label
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
