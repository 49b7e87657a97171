use anyhow::{Context, Result, bail};
use regex::Regex;

use crate::model::{Clause, ClauseRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterConfig {
    pub min_chars: usize,
    /// Length of a non-alphanumeric, non-whitespace run that marks a clause as noise.
    /// `None` disables the rule.
    pub noise_run_len: Option<usize>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_chars: 5,
            noise_run_len: Some(6),
        }
    }
}

/// Drops empty, too-short and symbol-dominated clauses.
///
/// The symbol rule is coarse: anything outside ASCII letters and digits counts, so OCR garbage
/// and non-Latin scripts are treated alike.
pub struct ClauseFilter {
    min_chars: usize,
    noise: Option<Regex>,
}

impl ClauseFilter {
    pub fn new(config: FilterConfig) -> Result<Self> {
        let noise = match config.noise_run_len {
            Some(0) => bail!("noise run length must be at least 1"),
            Some(run_len) => Some(
                Regex::new(&format!(r"[^A-Za-z0-9\s]{{{run_len},}}"))
                    .context("failed to compile noise run regex")?,
            ),
            None => None,
        };

        Ok(Self {
            min_chars: config.min_chars,
            noise,
        })
    }

    pub fn keep(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.chars().count() < self.min_chars {
            return false;
        }

        match &self.noise {
            Some(noise) => !noise.is_match(text),
            None => true,
        }
    }

    pub fn apply(&self, clauses: Vec<Clause>) -> Vec<Clause> {
        clauses
            .into_iter()
            .filter(|clause| self.keep(&clause.text))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitConfig {
    /// Sentences per derived clause; clauses with more sentences are split.
    pub threshold: usize,
    /// Documents with fewer clauses than this are considered under-segmented.
    pub sparse_clause_limit: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            sparse_clause_limit: 5,
        }
    }
}

impl SplitConfig {
    pub fn new(threshold: usize, sparse_clause_limit: usize) -> Result<Self> {
        if threshold == 0 {
            bail!("split threshold must be at least 1");
        }

        Ok(Self {
            threshold,
            sparse_clause_limit,
        })
    }
}

/// Sentences end at `.`, `!` or `?` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((index, character)) = chars.next() {
        if !matches!(character, '.' | '!' | '?') {
            continue;
        }
        let Some(&(_, next)) = chars.peek() else {
            continue;
        };
        if !next.is_whitespace() {
            continue;
        }

        let end = index + character.len_utf8();
        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = end;
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

/// Splits one document's records into `-part-N` windows when the document is sparse.
///
/// Returns the records and whether at least one record was split.
pub fn split_sparse_document(
    records: Vec<ClauseRecord>,
    config: SplitConfig,
) -> (Vec<ClauseRecord>, bool) {
    if records.len() >= config.sparse_clause_limit {
        return (records, false);
    }

    let mut out = Vec::with_capacity(records.len());
    let mut split_any = false;
    for record in records {
        let sentences = split_sentences(&record.text);
        if sentences.len() <= config.threshold {
            out.push(record);
            continue;
        }

        split_any = true;
        for (index, window) in sentences.chunks(config.threshold).enumerate() {
            out.push(ClauseRecord {
                doc_id: record.doc_id.clone(),
                id: format!("{}-part-{}", record.id, index + 1),
                text: window.join(" "),
            });
        }
    }

    (out, split_any)
}
