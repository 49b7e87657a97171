use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::clauses::{ChunkConfig, chunk_words};
use crate::cli::{RetrieveArgs, RetrieveOptions};
use crate::model::{QueryResult, RetrievedClause, SopChunk};
use crate::semantic::resolve_model_config;
use crate::store::ClauseIndex;
use crate::util::{WorkspaceLayout, list_files_with_extension, write_json_pretty};

#[derive(Debug, Clone, Copy)]
pub struct RetrieveSettings {
    pub chunking: ChunkConfig,
    pub top_k: usize,
}

impl RetrieveSettings {
    pub fn from_options(options: &RetrieveOptions) -> Result<Self> {
        if options.top_k == 0 {
            bail!("top-k must be at least 1");
        }

        Ok(Self {
            chunking: ChunkConfig::new(options.chunk_size, options.chunk_overlap)?,
            top_k: options.top_k,
        })
    }
}

pub fn run(args: RetrieveArgs) -> Result<()> {
    let settings = RetrieveSettings::from_options(&args.options)?;

    let layout = WorkspaceLayout::new(&args.workspace.workspace_root);
    let db_path = args.db_path.clone().unwrap_or_else(|| layout.index_db_path());
    let sop_text_path = resolve_sop_text_path(&layout, args.sop_text_path.as_deref())?;
    let output_path = args
        .output_path
        .clone()
        .unwrap_or_else(|| layout.retrieved_chunks_path());

    let index = ClauseIndex::open_existing(&db_path, resolve_model_config(&args.embedding.model_id))?;
    retrieve_to_file(&index, &sop_text_path, &output_path, settings)?;
    Ok(())
}

pub fn retrieve_to_file(
    index: &ClauseIndex,
    sop_text_path: &Path,
    output_path: &Path,
    settings: RetrieveSettings,
) -> Result<Vec<SopChunk>> {
    let sop_text = fs::read_to_string(sop_text_path)
        .with_context(|| format!("failed to read {}", sop_text_path.display()))?;

    let chunks = retrieve_relevant_clauses(index, &sop_text, &settings.chunking, settings.top_k)?;
    write_json_pretty(output_path, &chunks)?;
    info!(
        path = %output_path.display(),
        chunks = chunks.len(),
        "wrote retrieved clauses"
    );

    Ok(chunks)
}

/// Picks the parsed SOP text: the explicit path when given, otherwise the first `.txt` (by
/// name) in the parsed SOP directory.
pub fn resolve_sop_text_path(layout: &WorkspaceLayout, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let sop_dir = layout.parsed_sop_dir();
    let candidates = list_files_with_extension(&sop_dir, "txt")?;
    let Some(first) = candidates.first() else {
        bail!(
            "no parsed SOP text found in {}; run the parse command with --sop-path first",
            sop_dir.display()
        );
    };
    if candidates.len() > 1 {
        warn!(
            path = %first.display(),
            candidates = candidates.len(),
            "multiple parsed SOP files found; using the first"
        );
    }

    Ok(first.clone())
}

pub fn retrieve_relevant_clauses(
    index: &ClauseIndex,
    sop_text: &str,
    chunking: &ChunkConfig,
    top_k: usize,
) -> Result<Vec<SopChunk>> {
    let chunks = chunk_words(sop_text, chunking);
    if chunks.is_empty() {
        warn!("SOP text is empty; nothing to retrieve");
        return Ok(Vec::new());
    }

    info!(
        chunks = chunks.len(),
        chunk_size = chunking.chunk_size(),
        overlap = chunking.overlap(),
        top_k,
        model_id = %index.model().model_id,
        "retrieving clauses for SOP chunks"
    );

    let mut results = Vec::with_capacity(chunks.len());
    for chunk_text in chunks {
        let hits = index.query(&chunk_text, top_k)?;
        results.push(to_sop_chunk(chunk_text, hits));
    }

    Ok(results)
}

fn to_sop_chunk(chunk_text: String, hits: QueryResult) -> SopChunk {
    let QueryResult {
        ids,
        documents,
        metadatas,
        distances,
    } = hits;

    let relevant_clauses = ids
        .into_iter()
        .zip(documents)
        .zip(metadatas)
        .zip(distances)
        .map(|(((id, text), metadata), distance)| RetrievedClause {
            id,
            text,
            metadata,
            distance,
        })
        .collect();

    SopChunk {
        chunk_text,
        relevant_clauses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IndexedClause;

    fn indexed(stable_id: &str, id: &str, text: &str) -> IndexedClause {
        IndexedClause {
            doc_id: "gmp".to_string(),
            id: id.to_string(),
            text: text.to_string(),
            stable_id: stable_id.to_string(),
        }
    }

    fn seeded_index(db_path: &Path) -> ClauseIndex {
        let mut index = ClauseIndex::open(db_path, resolve_model_config("")).expect("open");
        index
            .upsert_batch(&[
                indexed("gmp-1.", "1.", "Cleaning records shall be retained for each batch"),
                indexed("gmp-2.", "2.", "Deviations shall be investigated and documented"),
                indexed("gmp-3.", "3.", "Training of personnel shall be recorded"),
            ])
            .expect("upsert");
        index
    }

    #[test]
    fn each_chunk_gets_top_k_clauses_with_metadata() {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = seeded_index(&dir.path().join("index.sqlite"));

        let sop_text = "Deviations are investigated and documented by operators. \
                        Cleaning records are retained for every batch.";
        let chunking = ChunkConfig::new(8, 2).expect("chunking");
        let chunks = retrieve_relevant_clauses(&index, sop_text, &chunking, 2).expect("retrieve");

        // 14 words in windows of 8 with a step of 6
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert_eq!(chunk.relevant_clauses.len(), 2);
            assert!(chunk.relevant_clauses[0].distance <= chunk.relevant_clauses[1].distance);
            assert_eq!(chunk.relevant_clauses[0].metadata.doc_id, "gmp");
        }
        assert_eq!(chunks[0].relevant_clauses[0].id, "gmp-2.");
        assert_eq!(chunks[0].relevant_clauses[0].metadata.clause_id, "2.");
    }

    #[test]
    fn top_k_larger_than_index_returns_every_clause() {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = seeded_index(&dir.path().join("index.sqlite"));

        let chunking = ChunkConfig::new(150, 40).expect("chunking");
        let chunks =
            retrieve_relevant_clauses(&index, "training records", &chunking, 10).expect("retrieve");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].relevant_clauses.len(), 3);
    }

    #[test]
    fn empty_sop_yields_no_chunks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = seeded_index(&dir.path().join("index.sqlite"));

        let chunking = ChunkConfig::new(150, 40).expect("chunking");
        let chunks = retrieve_relevant_clauses(&index, "  \n ", &chunking, 3).expect("retrieve");
        assert!(chunks.is_empty());
    }

    #[test]
    fn sop_text_resolution_prefers_explicit_path_then_first_parsed_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = WorkspaceLayout::new(dir.path());
        assert!(resolve_sop_text_path(&layout, None).is_err());

        let sop_dir = layout.parsed_sop_dir();
        fs::create_dir_all(&sop_dir).expect("mkdir");
        fs::write(sop_dir.join("b_sop.txt"), "b").expect("write");
        fs::write(sop_dir.join("a_sop.txt"), "a").expect("write");

        assert_eq!(
            resolve_sop_text_path(&layout, None).expect("resolve"),
            sop_dir.join("a_sop.txt")
        );
        let explicit = dir.path().join("other.txt");
        assert_eq!(
            resolve_sop_text_path(&layout, Some(&explicit)).expect("resolve"),
            explicit
        );
    }

    #[test]
    fn retrieve_settings_validate_before_io() {
        let options = RetrieveOptions {
            chunk_size: 10,
            chunk_overlap: 10,
            top_k: 3,
        };
        assert!(RetrieveSettings::from_options(&options).is_err());

        let options = RetrieveOptions {
            chunk_size: 10,
            chunk_overlap: 2,
            top_k: 0,
        };
        assert!(RetrieveSettings::from_options(&options).is_err());
    }
}
