use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub const CLAUSES_FILE_SUFFIX: &str = "_clauses.json";

/// On-disk layout of one pipeline workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    pub root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn parsed_regulation_dir(&self) -> PathBuf {
        self.root.join("parsed_data").join("parsed_regulation_files")
    }

    pub fn parsed_sop_dir(&self) -> PathBuf {
        self.root.join("parsed_data").join("parsed_sop")
    }

    pub fn clauses_dir(&self) -> PathBuf {
        self.root.join("clauses")
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.root.join("manifests")
    }

    pub fn index_db_path(&self) -> PathBuf {
        self.root.join("index").join("clause_index.sqlite")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn retrieved_chunks_path(&self) -> PathBuf {
        self.output_dir().join("retrieved_chunks.json")
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir().join("annotated_sop_report.md")
    }

    pub fn prompt_path(&self) -> PathBuf {
        self.output_dir().join("compliance_prompt.md")
    }
}

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// Pretty JSON with a trailing newline; parent directories are created.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut data = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;
    data.push('\n');
    write_text(path, &data)
}

pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

/// Regular files in `dir` whose extension matches `extension` (case-insensitive), sorted by path.
pub fn list_files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(extension))
            .unwrap_or(false);

        if matches {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

pub fn file_stem_string(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 file name: {}", path.display()))
}

/// Document id for a clause file: the file name minus `_clauses.json`, or minus `.json`.
pub fn doc_id_from_clause_file(file_name: &str) -> String {
    if let Some(stem) = file_name.strip_suffix(CLAUSES_FILE_SUFFIX) {
        return stem.to_string();
    }

    file_name
        .strip_suffix(".json")
        .unwrap_or(file_name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_id_strips_known_suffixes() {
        assert_eq!(doc_id_from_clause_file("gmp_annex1_clauses.json"), "gmp_annex1");
        assert_eq!(doc_id_from_clause_file("legacy.json"), "legacy");
        assert_eq!(doc_id_from_clause_file("plain"), "plain");
    }

    #[test]
    fn list_files_with_extension_is_sorted_and_case_insensitive() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("b.PDF"), b"x").expect("write");
        fs::write(dir.path().join("a.pdf"), b"x").expect("write");
        fs::write(dir.path().join("c.txt"), b"x").expect("write");
        fs::create_dir(dir.path().join("d.pdf")).expect("mkdir");

        let files = list_files_with_extension(dir.path(), "pdf").expect("list");
        let names = files
            .iter()
            .map(|path| path.file_name().and_then(|n| n.to_str()).unwrap_or_default())
            .collect::<Vec<&str>>();
        assert_eq!(names, vec!["a.pdf", "b.PDF"]);
    }
}
