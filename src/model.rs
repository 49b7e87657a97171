use serde::{Deserialize, Serialize};

/// One addressable unit of regulatory text, keyed by the header token it was found under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subclauses: Vec<Clause>,
}

impl Clause {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            subclauses: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClauseRecord {
    pub doc_id: String,
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedClause {
    pub doc_id: String,
    pub id: String,
    pub text: String,
    pub stable_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseMetadata {
    pub doc_id: String,
    pub clause_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedClause {
    pub id: String,
    pub text: String,
    pub metadata: ClauseMetadata,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SopChunk {
    pub chunk_text: String,
    #[serde(default)]
    pub relevant_clauses: Vec<RetrievedClause>,
}

/// Column-oriented result of one index query, one entry per hit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<ClauseMetadata>,
    pub distances: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentExtractSummary {
    pub doc_id: String,
    pub source_path: String,
    pub output_path: Option<String>,
    pub format: Option<String>,
    pub segmented_clauses: usize,
    pub filtered_clauses: usize,
    pub root_clauses: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub input_dir: String,
    pub output_dir: String,
    pub document_count: usize,
    pub written_count: usize,
    pub documents: Vec<DocumentExtractSummary>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClauseSourceEntry {
    pub filename: String,
    pub doc_id: String,
    pub sha256: String,
    pub record_count: usize,
    pub split_applied: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub db_path: String,
    pub model_id: String,
    pub embedding_dim: usize,
    pub batch_size: usize,
    pub split_threshold: usize,
    pub sparse_clause_limit: usize,
    pub records_upserted: usize,
    pub suffixed_ids: usize,
    pub index_total: i64,
    pub duration_ms: u128,
    pub sources: Vec<ClauseSourceEntry>,
    pub warnings: Vec<String>,
}
