//! Clause segmentation engine: enumeration format detection, line segmentation, decimal
//! hierarchy reconstruction, noise filtering, sparse-document splitting, stable identity and
//! SOP word chunking.

mod chunker;
mod filter;
mod format;
mod hierarchy;
mod identity;
mod segment;

use anyhow::Result;

use crate::model::Clause;

pub use chunker::{ChunkConfig, chunk_words};
pub use filter::{FilterConfig, SplitConfig, split_sparse_document};
pub use format::ClauseFormat;
pub use hierarchy::flatten_clauses;
pub use identity::{assign_stable_ids, base_key};

use filter::ClauseFilter;
use format::FormatDetector;
use segment::{HeaderPatterns, segment_lines, split_lines};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub format: Option<ClauseFormat>,
    pub segmented_count: usize,
    pub filtered_count: usize,
    pub clauses: Vec<Clause>,
}

impl Extraction {
    fn empty() -> Self {
        Self {
            format: None,
            segmented_count: 0,
            filtered_count: 0,
            clauses: Vec::new(),
        }
    }
}

/// Text-to-clauses pipeline for one document.
pub struct ClauseExtractor {
    detector: FormatDetector,
    headers: HeaderPatterns,
    filter: ClauseFilter,
}

impl ClauseExtractor {
    pub fn new(filter_config: FilterConfig) -> Result<Self> {
        Ok(Self {
            detector: FormatDetector::new()?,
            headers: HeaderPatterns::new()?,
            filter: ClauseFilter::new(filter_config)?,
        })
    }

    pub fn extract(&self, text: &str) -> Extraction {
        let lines = split_lines(text);
        let Some(format) = self.detector.detect(&lines) else {
            return Extraction::empty();
        };

        let segmented = segment_lines(&lines, self.headers.for_format(format));
        let segmented_count = segmented.len();
        let kept = self.filter.apply(segmented);
        let filtered_count = segmented_count - kept.len();

        let clauses = if format == ClauseFormat::Decimal {
            hierarchy::build_decimal_hierarchy(kept)
        } else {
            kept
        };

        Extraction {
            format: Some(format),
            segmented_count,
            filtered_count,
            clauses,
        }
    }
}
