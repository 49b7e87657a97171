use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{error, info, warn};

use crate::cli::ParseArgs;
use crate::util::{
    WorkspaceLayout, ensure_directory, file_stem_string, list_files_with_extension, write_text,
};

#[derive(Debug, Default)]
pub struct ParseSummary {
    pub parsed: Vec<PathBuf>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SopFormat {
    Docx,
    PlainText,
}

impl SopFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "docx" => Ok(Self::Docx),
            "txt" | "md" => Ok(Self::PlainText),
            _ => bail!(
                "unsupported SOP file type for {}; expected .docx, .txt or .md",
                path.display()
            ),
        }
    }
}

pub fn run(args: ParseArgs) -> Result<()> {
    let layout = WorkspaceLayout::new(&args.workspace.workspace_root);

    if let Some(sop_path) = &args.sop_path {
        SopFormat::from_path(sop_path)?;
    }

    let summary = parse_regulatory_documents(&args.regulatory_dir, &layout.parsed_regulation_dir())?;
    info!(
        parsed = summary.parsed.len(),
        failed = summary.failed.len(),
        "regulatory documents parsed"
    );

    if let Some(sop_path) = &args.sop_path {
        parse_sop_document(sop_path, &layout.parsed_sop_dir())?;
    }

    Ok(())
}

/// Converts every PDF in `regulatory_dir` to `{stem}.txt` in `output_dir`.
///
/// A document that fails to convert is logged and skipped.
pub fn parse_regulatory_documents(regulatory_dir: &Path, output_dir: &Path) -> Result<ParseSummary> {
    info!(path = %regulatory_dir.display(), "processing regulatory documents");
    ensure_directory(output_dir)?;

    let pdf_paths = list_files_with_extension(regulatory_dir, "pdf")?;
    let mut summary = ParseSummary::default();
    if pdf_paths.is_empty() {
        warn!(path = %regulatory_dir.display(), "no PDF files found");
        return Ok(summary);
    }

    info!(pdf_count = pdf_paths.len(), "found regulatory PDF files");

    for pdf_path in pdf_paths {
        match parse_single_pdf(&pdf_path, output_dir) {
            Ok(output_path) => {
                info!(path = %output_path.display(), "parsed regulatory document");
                summary.parsed.push(output_path);
            }
            Err(err) => {
                error!(path = %pdf_path.display(), error = %format!("{err:#}"), "failed to process regulatory document");
                summary.failed.push(pdf_path.display().to_string());
            }
        }
    }

    Ok(summary)
}

fn parse_single_pdf(pdf_path: &Path, output_dir: &Path) -> Result<PathBuf> {
    let text = extract_pdf_text(pdf_path)?;
    if text.trim().is_empty() {
        warn!(path = %pdf_path.display(), "no text extracted");
    }

    let output_path = output_dir.join(format!("{}.txt", file_stem_string(pdf_path)?));
    write_text(&output_path, &text)?;
    Ok(output_path)
}

/// Text layer of a PDF via `pdftotext`; page breaks become line breaks.
pub fn extract_pdf_text(pdf_path: &Path) -> Result<String> {
    let output = Command::new("pdftotext")
        .arg("-enc")
        .arg("UTF-8")
        .arg(pdf_path)
        .arg("-")
        .output()
        .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .replace('\u{0000}', "")
        .replace('\u{000C}', "\n"))
}

/// Writes the SOP's text to `{stem}.txt` in `output_dir` and returns that path.
pub fn parse_sop_document(sop_path: &Path, output_dir: &Path) -> Result<PathBuf> {
    info!(path = %sop_path.display(), "parsing SOP document");

    let content = match SopFormat::from_path(sop_path)? {
        SopFormat::Docx => extract_docx_text(sop_path)?,
        SopFormat::PlainText => fs::read_to_string(sop_path)
            .with_context(|| format!("failed to read {}", sop_path.display()))?,
    };
    if content.trim().is_empty() {
        warn!(path = %sop_path.display(), "SOP document contains no text");
    }

    let output_path = output_dir.join(format!("{}.txt", file_stem_string(sop_path)?));
    write_text(&output_path, &content)?;
    info!(path = %output_path.display(), "extracted SOP text");

    Ok(output_path)
}

pub fn extract_docx_text(docx_path: &Path) -> Result<String> {
    let file =
        File::open(docx_path).with_context(|| format!("failed to open {}", docx_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("failed to read DOCX archive {}", docx_path.display()))?;
    let mut entry = archive
        .by_name("word/document.xml")
        .with_context(|| format!("DOCX {} has no word/document.xml", docx_path.display()))?;

    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .with_context(|| format!("failed to read document.xml from {}", docx_path.display()))?;

    docx_xml_to_text(&xml)
}

/// One output line per `<w:p>` paragraph, runs concatenated.
fn docx_xml_to_text(xml: &str) -> Result<String> {
    let token_regex = Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:tab/>|<w:br/>|<w:p/>|</w:p>")
        .context("failed to compile DOCX token regex")?;
    let entity_regex = Regex::new(r"&(?:#x([0-9A-Fa-f]+)|#([0-9]+)|(lt|gt|quot|apos|amp));")
        .context("failed to compile XML entity regex")?;

    let mut paragraphs = Vec::<String>::new();
    let mut current = String::new();
    for captures in token_regex.captures_iter(xml) {
        if let Some(text) = captures.get(1) {
            current.push_str(&decode_xml_entities(text.as_str(), &entity_regex));
            continue;
        }

        match captures.get(0).map(|token| token.as_str()) {
            Some("<w:tab/>") => current.push('\t'),
            Some("<w:br/>") => current.push('\n'),
            _ => paragraphs.push(std::mem::take(&mut current)),
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    Ok(paragraphs.join("\n"))
}

/// Decodes the five predefined entities and numeric character references in one pass, so a
/// decoded `&` never starts another entity. Invalid code points are left as written.
fn decode_xml_entities(raw: &str, entity_regex: &Regex) -> String {
    entity_regex
        .replace_all(raw, |captures: &regex::Captures<'_>| {
            let code_point = match (captures.get(1), captures.get(2)) {
                (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
                (None, Some(decimal)) => decimal.as_str().parse::<u32>().ok(),
                (None, None) => None,
            };
            if let Some(character) = code_point.and_then(char::from_u32) {
                return character.to_string();
            }

            match captures.get(3).map(|name| name.as_str()) {
                Some("lt") => "<".to_string(),
                Some("gt") => ">".to_string(),
                Some("quot") => "\"".to_string(),
                Some("apos") => "'".to_string(),
                Some("amp") => "&".to_string(),
                _ => captures[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document><w:body>
<w:p><w:r><w:t>1. Purpose</w:t></w:r></w:p>
<w:p><w:r><w:t xml:space="preserve">Clean </w:t></w:r><w:r><w:t>equipment &amp; rooms</w:t></w:r></w:p>
<w:p/>
<w:tbl><w:tr><w:tc><w:p><w:r><w:t>Cell</w:t><w:tab/><w:t>&lt;value&gt;</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
</w:body></w:document>"#;

    #[test]
    fn docx_paragraphs_become_lines() {
        let text = docx_xml_to_text(DOCUMENT_XML).expect("text");
        assert_eq!(
            text,
            "1. Purpose\nClean equipment & rooms\n\nCell\t<value>"
        );
    }

    #[test]
    fn character_references_are_decoded_once() {
        let xml = r#"<w:p><w:r><w:t>Operator&#8217;s check &#x2013; see &amp;#38; and &amp;lt; &#xD800;</w:t></w:r></w:p>"#;
        let text = docx_xml_to_text(xml).expect("text");
        assert_eq!(text, "Operator\u{2019}s check \u{2013} see &#38; and &lt; &#xD800;");
    }

    #[test]
    fn sop_docx_is_extracted_to_parsed_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let docx_path = dir.path().join("cleaning_sop.docx");
        {
            let file = File::create(&docx_path).expect("create");
            let mut writer = zip::ZipWriter::new(file);
            writer
                .start_file(
                    "word/document.xml",
                    zip::write::SimpleFileOptions::default()
                        .compression_method(zip::CompressionMethod::Stored),
                )
                .expect("start file");
            writer.write_all(DOCUMENT_XML.as_bytes()).expect("write");
            writer.finish().expect("finish");
        }

        let output_dir = dir.path().join("parsed_sop");
        let output_path = parse_sop_document(&docx_path, &output_dir).expect("parse");

        assert_eq!(output_path, output_dir.join("cleaning_sop.txt"));
        let text = fs::read_to_string(&output_path).expect("read");
        assert!(text.starts_with("1. Purpose\nClean equipment & rooms"));
    }

    #[test]
    fn unsupported_sop_type_fails_fast() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sop_path = dir.path().join("sop.pdf");
        fs::write(&sop_path, b"%PDF").expect("write");

        let result = parse_sop_document(&sop_path, &dir.path().join("out"));
        assert!(result.is_err());
        assert!(!dir.path().join("out").join("sop.txt").exists());
    }

    #[test]
    fn plain_text_sop_is_copied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sop_path = dir.path().join("sop.TXT");
        fs::write(&sop_path, "Step one.\nStep two.").expect("write");

        let output_path = parse_sop_document(&sop_path, &dir.path().join("out")).expect("parse");
        assert_eq!(fs::read_to_string(output_path).expect("read"), "Step one.\nStep two.");
    }

    #[test]
    fn broken_pdf_is_skipped_without_aborting_the_batch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let regulatory_dir = dir.path().join("regs");
        fs::create_dir(&regulatory_dir).expect("mkdir");
        fs::write(regulatory_dir.join("broken.pdf"), b"not a pdf").expect("write");
        fs::write(regulatory_dir.join("notes.txt"), b"ignored").expect("write");

        let output_dir = dir.path().join("parsed");
        let summary = parse_regulatory_documents(&regulatory_dir, &output_dir).expect("batch");

        assert!(summary.parsed.is_empty());
        assert_eq!(summary.failed.len(), 1);
        assert!(!output_dir.join("broken.txt").exists());
    }

    #[test]
    fn empty_regulatory_directory_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let summary = parse_regulatory_documents(dir.path(), &dir.path().join("parsed"))
            .expect("batch");
        assert!(summary.parsed.is_empty());
        assert!(summary.failed.is_empty());
    }
}
