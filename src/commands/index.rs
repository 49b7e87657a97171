use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::clauses::{
    SplitConfig, assign_stable_ids, base_key, flatten_clauses, split_sparse_document,
};
use crate::cli::IndexArgs;
use crate::model::{Clause, ClauseRecord, ClauseSourceEntry, IndexRunManifest, IndexedClause};
use crate::semantic::{SemanticModelConfig, resolve_model_config};
use crate::store::ClauseIndex;
use crate::util::{
    WorkspaceLayout, doc_id_from_clause_file, list_files_with_extension, now_utc_string,
    sha256_file, utc_compact_string, write_json_pretty,
};

#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub batch_size: usize,
    pub split: SplitConfig,
    pub model: SemanticModelConfig,
}

impl IndexSettings {
    pub fn from_args(args: &IndexArgs) -> Result<Self> {
        Self::new(
            args.options.batch_size,
            args.options.split_threshold,
            args.options.sparse_clause_limit,
            &args.embedding.model_id,
        )
    }

    pub fn new(
        batch_size: usize,
        split_threshold: usize,
        sparse_clause_limit: usize,
        model_id: &str,
    ) -> Result<Self> {
        if batch_size == 0 {
            bail!("batch size must be at least 1");
        }

        Ok(Self {
            batch_size,
            split: SplitConfig::new(split_threshold, sparse_clause_limit)?,
            model: resolve_model_config(model_id),
        })
    }
}

struct LoadedClauseFile {
    source: ClauseSourceEntry,
    records: Vec<ClauseRecord>,
}

pub fn run(args: IndexArgs) -> Result<()> {
    let settings = IndexSettings::from_args(&args)?;

    let layout = WorkspaceLayout::new(&args.workspace.workspace_root);
    let clauses_dir = args.clauses_dir.clone().unwrap_or_else(|| layout.clauses_dir());
    let db_path = args.db_path.clone().unwrap_or_else(|| layout.index_db_path());

    let manifest = index_clauses(&clauses_dir, &db_path, &settings)?;
    write_index_manifest(&layout, &manifest)
}

pub fn write_index_manifest(layout: &WorkspaceLayout, manifest: &IndexRunManifest) -> Result<()> {
    let manifest_path = layout.manifest_dir().join(format!(
        "index_run_{}.json",
        utc_compact_string(Utc::now())
    ));
    write_json_pretty(&manifest_path, manifest)?;
    info!(path = %manifest_path.display(), "wrote index run manifest");
    Ok(())
}

/// Loads every clause file (sorted by name), assigns run-unique stable ids and replaces the
/// model's rows in the index with these records, written in batches.
pub fn index_clauses(
    clauses_dir: &Path,
    db_path: &Path,
    settings: &IndexSettings,
) -> Result<IndexRunManifest> {
    let started = Instant::now();
    info!(path = %clauses_dir.display(), "loading extracted clauses");

    let mut warnings = Vec::<String>::new();
    let mut sources = Vec::<ClauseSourceEntry>::new();
    let mut records = Vec::<ClauseRecord>::new();

    for path in list_files_with_extension(clauses_dir, "json")? {
        match load_clause_file(&path, settings.split) {
            Ok(loaded) => {
                sources.push(loaded.source);
                records.extend(loaded.records);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %format!("{err:#}"), "skipping clause file");
                warnings.push(format!("{}: {err:#}", path.display()));
            }
        }
    }

    if records.is_empty() {
        warn!(path = %clauses_dir.display(), "no clauses found; skipping insertion");
        warnings.push(format!("no clauses found in {}", clauses_dir.display()));
    }

    let indexed = assign_stable_ids(records);
    let suffixed_ids = count_suffixed(&indexed);
    if suffixed_ids > 0 {
        info!(suffixed_ids, "disambiguated repeated clause ids");
    }

    // Stable ids only hold within one run, so the model's rows are rebuilt from scratch.
    let mut index = ClauseIndex::open(db_path, settings.model.clone())?;
    let removed = index.clear_model()?;
    if removed > 0 {
        info!(removed, model_id = %settings.model.model_id, "cleared previous run's clauses");
    }

    let mut records_upserted = 0usize;
    for batch in indexed.chunks(settings.batch_size) {
        records_upserted += index.upsert_batch(batch)?;
        info!(
            upserted = records_upserted,
            total = indexed.len(),
            "clause batch committed"
        );
    }

    let index_total = index.count()?;
    info!(
        path = %db_path.display(),
        records_upserted,
        index_total,
        "clause indexing completed"
    );

    Ok(IndexRunManifest {
        manifest_version: 1,
        run_id: format!("index-{}", utc_compact_string(Utc::now())),
        generated_at: now_utc_string(),
        db_path: db_path.display().to_string(),
        model_id: settings.model.model_id.clone(),
        embedding_dim: settings.model.dimensions,
        batch_size: settings.batch_size,
        split_threshold: settings.split.threshold,
        sparse_clause_limit: settings.split.sparse_clause_limit,
        records_upserted,
        suffixed_ids,
        index_total,
        duration_ms: started.elapsed().as_millis(),
        sources,
        warnings,
    })
}

fn load_clause_file(path: &Path, split: SplitConfig) -> Result<LoadedClauseFile> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;
    let doc_id = doc_id_from_clause_file(&filename);

    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let forest: Vec<Clause> = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let (records, split_applied) = split_sparse_document(flatten_clauses(&doc_id, &forest), split);
    if split_applied {
        info!(doc_id = %doc_id, records = records.len(), "sparse document split into sentence windows");
    }

    Ok(LoadedClauseFile {
        source: ClauseSourceEntry {
            sha256: sha256_file(path)?,
            filename,
            doc_id,
            record_count: records.len(),
            split_applied,
        },
        records,
    })
}

fn count_suffixed(indexed: &[IndexedClause]) -> usize {
    indexed
        .iter()
        .filter(|clause| clause.stable_id != base_key(&clause.doc_id, &clause.id))
        .count()
}
