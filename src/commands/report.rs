use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::{LlmOptions, ReportArgs};
use crate::commands::retrieve::resolve_sop_text_path;
use crate::llm::{AnthropicProvider, CompletionRequest, LlmProvider};
use crate::model::{RetrievedClause, SopChunk};
use crate::util::{WorkspaceLayout, write_text};

pub fn run(args: ReportArgs) -> Result<()> {
    let provider = if args.llm.prompt_only {
        None
    } else {
        Some(AnthropicProvider::from_options(&args.llm)?)
    };

    let layout = WorkspaceLayout::new(&args.workspace.workspace_root);
    let retrieved_path = args
        .retrieved_path
        .clone()
        .unwrap_or_else(|| layout.retrieved_chunks_path());
    let sop_text_path = resolve_sop_text_path(&layout, args.sop_text_path.as_deref())?;

    let chunks = load_retrieved_chunks(&retrieved_path)?;
    let sop_text = fs::read_to_string(&sop_text_path)
        .with_context(|| format!("failed to read {}", sop_text_path.display()))?;

    match provider {
        Some(provider) => {
            let output_path = args.output_path.clone().unwrap_or_else(|| layout.report_path());
            write_report(&provider, &sop_text, &chunks, &args.llm, &output_path)
        }
        None => {
            let output_path = args.output_path.clone().unwrap_or_else(|| layout.prompt_path());
            write_prompt(&sop_text, &chunks, &output_path)
        }
    }
}

pub fn load_retrieved_chunks(path: &Path) -> Result<Vec<SopChunk>> {
    let raw = fs::read(path).with_context(|| {
        format!(
            "failed to read {}; run the retrieve command first",
            path.display()
        )
    })?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn write_prompt(sop_text: &str, chunks: &[SopChunk], output_path: &Path) -> Result<()> {
    let prompt = build_compliance_prompt(sop_text, chunks);
    write_text(output_path, &prompt)?;
    info!(path = %output_path.display(), "wrote compliance prompt");
    Ok(())
}

pub fn write_report(
    provider: &dyn LlmProvider,
    sop_text: &str,
    chunks: &[SopChunk],
    options: &LlmOptions,
    output_path: &Path,
) -> Result<()> {
    let prompt = build_compliance_prompt(sop_text, chunks);
    info!(
        model = %options.llm_model,
        prompt_chars = prompt.len(),
        "generating annotated SOP report"
    );

    let report = provider
        .complete(&CompletionRequest {
            prompt: &prompt,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        })
        .context("failed to generate compliance report")?;

    write_text(output_path, &report)?;
    info!(path = %output_path.display(), "saved annotated SOP report");
    Ok(())
}

/// Clauses across all chunks, each id once, in first-seen order.
pub fn unique_clauses(chunks: &[SopChunk]) -> Vec<&RetrievedClause> {
    let mut seen = HashSet::<&str>::new();
    chunks
        .iter()
        .flat_map(|chunk| chunk.relevant_clauses.iter())
        .filter(|clause| !clause.id.is_empty() && seen.insert(clause.id.as_str()))
        .collect()
}

pub fn build_compliance_prompt(sop_text: &str, chunks: &[SopChunk]) -> String {
    let clauses = unique_clauses(chunks);
    if clauses.is_empty() {
        warn!("no retrieved clauses; the prompt carries only the SOP text");
    }

    let formatted = clauses
        .iter()
        .map(|clause| {
            format!(
                "- ID: {}\n  Text: {}\n  Source: {}",
                clause.id, clause.text, clause.metadata.doc_id
            )
        })
        .collect::<Vec<String>>()
        .join("\n");

    format!(
        "You are a regulatory compliance expert.\n\n\
         Below is a Standard Operating Procedure (SOP) followed by the regulatory clauses retrieved \
         for it. Produce an annotated version of the SOP: insert inline notes in square brackets \
         wherever the SOP meets or fails a regulatory requirement, citing the clause IDs.\n\n\
         === SOP TEXT ===\n{sop_text}\n\n\
         === RETRIEVED REGULATORY CLAUSES ===\n{formatted}\n\n\
         Provide a detailed compliance analysis formatted as Markdown.\n"
    )
}
