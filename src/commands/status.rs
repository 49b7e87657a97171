use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::store::read_index_status;
use crate::util::{CLAUSES_FILE_SUFFIX, WorkspaceLayout, list_files_with_extension};

pub fn run(args: StatusArgs) -> Result<()> {
    let layout = WorkspaceLayout::new(&args.workspace.workspace_root);
    info!(workspace_root = %args.workspace.workspace_root.display(), "status requested");

    report_directory(&layout.parsed_regulation_dir(), "txt", "parsed regulatory texts")?;
    report_directory(&layout.parsed_sop_dir(), "txt", "parsed SOP texts")?;

    let clauses_dir = layout.clauses_dir();
    if let Some(files) = existing_files(&clauses_dir, "json")? {
        let clause_files = files
            .iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with(CLAUSES_FILE_SUFFIX))
            })
            .count();
        info!(path = %clauses_dir.display(), clause_files, "clause files");
    }

    if let Some(manifests) = existing_files(&layout.manifest_dir(), "json")? {
        let latest = latest_manifest(
            manifests
                .iter()
                .filter_map(|path| path.file_name().and_then(|name| name.to_str())),
        )
        .unwrap_or_default();
        info!(manifests = manifests.len(), latest = %latest, "run manifests");
    }

    let db_path = layout.index_db_path();
    if db_path.exists() {
        match read_index_status(&db_path) {
            Ok(status) => info!(
                path = %db_path.display(),
                schema_version = %status.schema_version.unwrap_or_default(),
                updated_at = %status.updated_at.unwrap_or_default(),
                clauses = status.clause_count,
                documents = status.document_count,
                models = %status.model_ids.join(","),
                "clause index status"
            ),
            Err(err) => warn!(
                path = %db_path.display(),
                error = %format!("{err:#}"),
                "clause index unreadable"
            ),
        }
    } else {
        warn!(path = %db_path.display(), "clause index missing");
    }

    for output_path in [
        layout.retrieved_chunks_path(),
        layout.prompt_path(),
        layout.report_path(),
    ] {
        if output_path.exists() {
            info!(path = %output_path.display(), "output present");
        }
    }

    Ok(())
}

fn report_directory(dir: &Path, extension: &str, label: &str) -> Result<()> {
    if let Some(files) = existing_files(dir, extension)? {
        info!(path = %dir.display(), count = files.len(), "{label}");
    }
    Ok(())
}

fn existing_files(dir: &Path, extension: &str) -> Result<Option<Vec<PathBuf>>> {
    if !dir.is_dir() {
        warn!(path = %dir.display(), "directory missing");
        return Ok(None);
    }
    list_files_with_extension(dir, extension).map(Some)
}

/// Newest manifest by the `{kind}_run_{timestamp}.json` timestamp, regardless of kind.
fn latest_manifest<'a>(names: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    names.max_by(|left, right| {
        manifest_timestamp(left)
            .cmp(manifest_timestamp(right))
            .then_with(|| left.cmp(right))
    })
}

fn manifest_timestamp(name: &str) -> &str {
    name.strip_suffix(".json")
        .and_then(|stem| stem.rsplit_once('_'))
        .map(|(_, timestamp)| timestamp)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_manifest_compares_timestamps_across_kinds() {
        let names = [
            "index_run_20260101T090000Z.json",
            "extract_run_20260102T080000Z.json",
            "extract_run_20251231T235959Z.json",
        ];
        assert_eq!(
            latest_manifest(names.into_iter()),
            Some("extract_run_20260102T080000Z.json")
        );
        assert_eq!(latest_manifest(std::iter::empty()), None);
    }
}
