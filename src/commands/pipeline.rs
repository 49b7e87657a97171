use std::fs;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;

use crate::clauses::ClauseExtractor;
use crate::cli::RunArgs;
use crate::commands::extract::{extract_clauses, filter_config, write_extract_manifest};
use crate::commands::index::{IndexSettings, index_clauses, write_index_manifest};
use crate::commands::parse::{SopFormat, parse_regulatory_documents, parse_sop_document};
use crate::commands::report::{write_prompt, write_report};
use crate::commands::retrieve::{RetrieveSettings, retrieve_to_file};
use crate::llm::AnthropicProvider;
use crate::store::ClauseIndex;
use crate::util::WorkspaceLayout;

/// Runs parse, extract, index, retrieve and report against one workspace.
///
/// Every setting (chunking, splitting, filtering, SOP type, API key) is validated before any
/// file is touched.
pub fn run(args: RunArgs) -> Result<()> {
    let started = Instant::now();

    SopFormat::from_path(&args.sop_path)?;
    let extractor = ClauseExtractor::new(filter_config(&args.extract))?;
    let index_settings = IndexSettings::new(
        args.index.batch_size,
        args.index.split_threshold,
        args.index.sparse_clause_limit,
        &args.embedding.model_id,
    )?;
    let retrieve_settings = RetrieveSettings::from_options(&args.retrieve)?;
    let provider = if args.llm.prompt_only {
        None
    } else {
        Some(AnthropicProvider::from_options(&args.llm)?)
    };

    let layout = WorkspaceLayout::new(&args.workspace.workspace_root);
    info!(
        workspace_root = %args.workspace.workspace_root.display(),
        regulatory_dir = %args.regulatory_dir.display(),
        sop_path = %args.sop_path.display(),
        "starting compliance pipeline"
    );

    info!(stage = "parse", "pipeline stage started");
    let parsed = parse_regulatory_documents(&args.regulatory_dir, &layout.parsed_regulation_dir())?;
    info!(
        parsed = parsed.parsed.len(),
        failed = parsed.failed.len(),
        "regulatory documents parsed"
    );
    let sop_text_path = parse_sop_document(&args.sop_path, &layout.parsed_sop_dir())?;

    info!(stage = "extract", "pipeline stage started");
    let extract_manifest = extract_clauses(
        &layout.parsed_regulation_dir(),
        &layout.clauses_dir(),
        &extractor,
    )?;
    write_extract_manifest(&layout, &extract_manifest)?;

    info!(stage = "index", "pipeline stage started");
    let db_path = layout.index_db_path();
    let index_manifest = index_clauses(&layout.clauses_dir(), &db_path, &index_settings)?;
    write_index_manifest(&layout, &index_manifest)?;

    info!(stage = "retrieve", "pipeline stage started");
    let index = ClauseIndex::open_existing(&db_path, index_settings.model.clone())?;
    let chunks = retrieve_to_file(
        &index,
        &sop_text_path,
        &layout.retrieved_chunks_path(),
        retrieve_settings,
    )?;

    info!(stage = "report", "pipeline stage started");
    let sop_text = fs::read_to_string(&sop_text_path)
        .with_context(|| format!("failed to read {}", sop_text_path.display()))?;
    match provider {
        Some(provider) => {
            write_report(&provider, &sop_text, &chunks, &args.llm, &layout.report_path())?
        }
        None => write_prompt(&sop_text, &chunks, &layout.prompt_path())?,
    }

    info!(
        documents = extract_manifest.document_count,
        clauses_indexed = index_manifest.records_upserted,
        chunks = chunks.len(),
        duration_ms = started.elapsed().as_millis() as u64,
        "compliance pipeline completed"
    );

    Ok(())
}
