use anyhow::{Context, Result};
use regex::Regex;

use crate::model::Clause;

use super::format::ClauseFormat;

/// Line-anchored header patterns; capture group 1 is the clause id.
pub struct HeaderPatterns {
    section: Regex,
    decimal: Regex,
    numeric: Regex,
    roman: Regex,
    letter: Regex,
}

impl HeaderPatterns {
    pub fn new() -> Result<Self> {
        Ok(Self {
            section: Regex::new(r"^\s*(§\s*\d+(?:\.\d+)*)")
                .context("failed to compile section header regex")?,
            decimal: Regex::new(r"^\s*(\d+(?:\.\d+)+\.?|\d+\.)")
                .context("failed to compile decimal header regex")?,
            numeric: Regex::new(r"^\s*(\d+[.)])(?:\D|$)")
                .context("failed to compile numeric header regex")?,
            roman: Regex::new(r"^\s*([IVXLCDMivxlcdm]+[.)])")
                .context("failed to compile roman header regex")?,
            letter: Regex::new(r"^\s*(\([A-Za-z]\)|[A-Za-z][.)])")
                .context("failed to compile letter header regex")?,
        })
    }

    pub fn for_format(&self, format: ClauseFormat) -> &Regex {
        match format {
            ClauseFormat::Section => &self.section,
            ClauseFormat::Decimal => &self.decimal,
            ClauseFormat::Numeric => &self.numeric,
            ClauseFormat::Roman => &self.roman,
            ClauseFormat::Letter => &self.letter,
        }
    }
}

/// Splits raw text into lines, treating form feeds and carriage returns as breaks.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split(['\n', '\r', '\u{000C}']).collect()
}

/// Walks `lines` and emits one clause per header match, in document order.
///
/// Lines before the first header are dropped. Continuation lines are appended to the open clause
/// with a single space, except that a trailing hyphen is removed and the next line is glued on.
pub fn segment_lines(lines: &[&str], header: &Regex) -> Vec<Clause> {
    let mut clauses = Vec::<Clause>::new();
    let mut current: Option<Clause> = None;

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }

        if let Some(id) = header.captures(line).and_then(|captures| captures.get(1)) {
            if let Some(open) = current.take() {
                clauses.push(close_clause(open));
            }
            let remainder = normalize_fragment(&line[id.end()..]);
            current = Some(Clause::new(id.as_str(), remainder));
            continue;
        }

        let Some(open) = current.as_mut() else {
            continue;
        };
        merge_continuation(&mut open.text, &normalize_fragment(line));
    }

    if let Some(open) = current.take() {
        clauses.push(close_clause(open));
    }

    clauses
}

fn close_clause(mut clause: Clause) -> Clause {
    let trimmed_len = clause.text.trim_end().len();
    clause.text.truncate(trimmed_len);
    clause
}

fn merge_continuation(text: &mut String, fragment: &str) {
    if text.ends_with('-') {
        text.pop();
        text.push_str(fragment);
        return;
    }

    if !text.is_empty() {
        text.push(' ');
    }
    text.push_str(fragment);
}

fn normalize_fragment(input: &str) -> String {
    input.split_whitespace().collect::<Vec<&str>>().join(" ")
}
