use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::clauses::{ClauseExtractor, FilterConfig};
use crate::cli::{ExtractArgs, ExtractOptions};
use crate::model::{DocumentExtractSummary, ExtractRunManifest};
use crate::util::{
    CLAUSES_FILE_SUFFIX, WorkspaceLayout, ensure_directory, file_stem_string,
    list_files_with_extension, now_utc_string, utc_compact_string, write_json_pretty,
};

pub fn run(args: ExtractArgs) -> Result<()> {
    let extractor = ClauseExtractor::new(filter_config(&args.options))?;

    let layout = WorkspaceLayout::new(&args.workspace.workspace_root);
    let input_dir = args
        .input_dir
        .clone()
        .unwrap_or_else(|| layout.parsed_regulation_dir());
    let output_dir = args.output_dir.clone().unwrap_or_else(|| layout.clauses_dir());

    let manifest = extract_clauses(&input_dir, &output_dir, &extractor)?;
    write_extract_manifest(&layout, &manifest)
}

pub fn filter_config(options: &ExtractOptions) -> FilterConfig {
    FilterConfig {
        min_chars: options.min_clause_chars,
        noise_run_len: if options.keep_non_latin {
            None
        } else {
            Some(options.noise_run_len)
        },
    }
}

pub fn write_extract_manifest(layout: &WorkspaceLayout, manifest: &ExtractRunManifest) -> Result<()> {
    let manifest_path = layout.manifest_dir().join(format!(
        "extract_run_{}.json",
        utc_compact_string(Utc::now())
    ));
    write_json_pretty(&manifest_path, manifest)?;
    info!(path = %manifest_path.display(), "wrote extract run manifest");
    Ok(())
}

/// Segments every `.txt` document in `input_dir` into `{stem}_clauses.json` under `output_dir`.
pub fn extract_clauses(
    input_dir: &Path,
    output_dir: &Path,
    extractor: &ClauseExtractor,
) -> Result<ExtractRunManifest> {
    ensure_directory(output_dir)?;
    let text_paths = list_files_with_extension(input_dir, "txt")?;
    if text_paths.is_empty() {
        warn!(path = %input_dir.display(), "no parsed regulatory text files found");
    }

    let mut documents = Vec::with_capacity(text_paths.len());
    let mut warnings = Vec::<String>::new();

    for text_path in &text_paths {
        match extract_document(text_path, output_dir, extractor) {
            Ok(summary) => {
                if summary.format.is_none() {
                    warnings.push(format!(
                        "no recognizable clause format in {}",
                        text_path.display()
                    ));
                }
                documents.push(summary);
            }
            Err(err) => {
                warn!(path = %text_path.display(), error = %format!("{err:#}"), "skipping document");
                warnings.push(format!("{}: {err:#}", text_path.display()));
            }
        }
    }

    let written_count = documents
        .iter()
        .filter(|summary| summary.output_path.is_some())
        .count();
    info!(
        documents = text_paths.len(),
        written = written_count,
        "clause extraction completed"
    );

    Ok(ExtractRunManifest {
        manifest_version: 1,
        run_id: format!("extract-{}", utc_compact_string(Utc::now())),
        generated_at: now_utc_string(),
        input_dir: input_dir.display().to_string(),
        output_dir: output_dir.display().to_string(),
        document_count: text_paths.len(),
        written_count,
        documents,
        warnings,
    })
}

fn extract_document(
    text_path: &Path,
    output_dir: &Path,
    extractor: &ClauseExtractor,
) -> Result<DocumentExtractSummary> {
    let text = fs::read_to_string(text_path)
        .with_context(|| format!("failed to read {}", text_path.display()))?;
    let doc_id = file_stem_string(text_path)?;

    let extraction = extractor.extract(&text);
    match extraction.format {
        Some(format) => info!(
            doc_id = %doc_id,
            format = %format,
            clauses = extraction.segmented_count,
            filtered = extraction.filtered_count,
            "segmented document"
        ),
        None => warn!(doc_id = %doc_id, "no recognizable clause format; emitting empty clause list"),
    }

    let output_path = output_dir.join(format!("{doc_id}{CLAUSES_FILE_SUFFIX}"));
    write_json_pretty(&output_path, &extraction.clauses)?;

    Ok(DocumentExtractSummary {
        doc_id,
        source_path: text_path.display().to_string(),
        output_path: Some(output_path.display().to_string()),
        format: extraction.format.map(|format| format.as_str().to_string()),
        segmented_clauses: extraction.segmented_count,
        filtered_clauses: extraction.filtered_count,
        root_clauses: extraction.clauses.len(),
    })
}
