use std::fmt;

use anyhow::{Context, Result};
use regex::Regex;

/// Enumeration convention used for clause headers in a document.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ClauseFormat {
    Section,
    Decimal,
    Numeric,
    Roman,
    Letter,
}

impl ClauseFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Section => "section",
            Self::Decimal => "decimal",
            Self::Numeric => "numeric",
            Self::Roman => "roman",
            Self::Letter => "letter",
        }
    }
}

impl fmt::Display for ClauseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatCounts {
    pub section: usize,
    pub decimal: usize,
    pub numeric: usize,
    pub roman: usize,
    pub letter: usize,
}

pub struct FormatDetector {
    section: Regex,
    decimal: Regex,
    numeric: Regex,
    roman: Regex,
    letter: Regex,
}

impl FormatDetector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            section: Regex::new(r"^\s*§\s*\d").context("failed to compile section detector")?,
            decimal: Regex::new(r"^\s*\d+\.\d").context("failed to compile decimal detector")?,
            numeric: Regex::new(r"^\s*\d+[.)](?:\D|$)")
                .context("failed to compile numeric detector")?,
            roman: Regex::new(r"^\s*[IVXLCDMivxlcdm]+[.)]")
                .context("failed to compile roman detector")?,
            letter: Regex::new(r"^\s*(?:\([A-Za-z]\)|[A-Za-z][.)])")
                .context("failed to compile letter detector")?,
        })
    }

    pub fn count_matches(&self, lines: &[&str]) -> FormatCounts {
        let mut counts = FormatCounts::default();
        for line in lines {
            if self.section.is_match(line) {
                counts.section += 1;
            }
            if self.decimal.is_match(line) {
                counts.decimal += 1;
            }
            if self.numeric.is_match(line) {
                counts.numeric += 1;
            }
            if self.roman.is_match(line) {
                counts.roman += 1;
            }
            if self.letter.is_match(line) {
                counts.letter += 1;
            }
        }
        counts
    }

    /// Picks the governing enumeration convention, or `None` when no header style occurs.
    pub fn detect(&self, lines: &[&str]) -> Option<ClauseFormat> {
        let counts = self.count_matches(lines);

        if counts.section > 0 {
            return Some(ClauseFormat::Section);
        }
        if counts.decimal > 0 {
            return Some(ClauseFormat::Decimal);
        }
        if counts.roman > 0 && counts.letter > 0 {
            if let Some(resolved) = self.resolve_roman_letter_conflict(lines) {
                return Some(resolved);
            }
            return if counts.roman >= counts.letter {
                Some(ClauseFormat::Roman)
            } else {
                Some(ClauseFormat::Letter)
            };
        }
        if counts.roman > 0 {
            return Some(ClauseFormat::Roman);
        }
        if counts.letter > 0 {
            return Some(ClauseFormat::Letter);
        }
        if counts.numeric > 0 {
            return Some(ClauseFormat::Numeric);
        }

        None
    }

    /// Single-character tokens ("I.", "C)") are valid in both alphabets; only multi-character
    /// tokens can tell roman numbering from lettering.
    fn resolve_roman_letter_conflict(&self, lines: &[&str]) -> Option<ClauseFormat> {
        let mut has_multi_roman = false;
        let mut has_multi_letter = false;

        for line in lines {
            if !self.roman.is_match(line) && !self.letter.is_match(line) {
                continue;
            }

            let Some(token) = line.split_whitespace().next() else {
                continue;
            };
            let token = token
                .trim_end_matches(['.', ')'])
                .trim_start_matches('(');
            if token.chars().count() <= 1 {
                continue;
            }

            if token.chars().all(is_roman_glyph) {
                has_multi_roman = true;
            } else {
                has_multi_letter = true;
            }
        }

        match (has_multi_roman, has_multi_letter) {
            (true, false) => Some(ClauseFormat::Roman),
            (false, true) => Some(ClauseFormat::Letter),
            _ => None,
        }
    }
}

fn is_roman_glyph(character: char) -> bool {
    matches!(
        character,
        'I' | 'V' | 'X' | 'L' | 'C' | 'D' | 'M' | 'i' | 'v' | 'x' | 'l' | 'c' | 'd' | 'm'
    )
}
