use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "regclause",
    version,
    about = "Regulatory clause extraction and SOP compliance retrieval tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert regulatory PDFs and the SOP document into plain text.
    Parse(ParseArgs),
    /// Segment parsed regulatory text into clause JSON files.
    Extract(ExtractArgs),
    /// Assign stable ids to extracted clauses and upsert them into the clause index.
    Index(IndexArgs),
    /// Chunk the SOP and retrieve the most relevant clauses per chunk.
    Retrieve(RetrieveArgs),
    /// Build the compliance prompt and produce the annotated SOP report.
    Report(ReportArgs),
    /// Run parse, extract, index, retrieve and report in sequence.
    Run(RunArgs),
    /// Summarize parsed texts, clause files, manifests and the clause index in a workspace.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct WorkspaceArgs {
    #[arg(long, default_value = ".")]
    pub workspace_root: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractOptions {
    #[arg(long, default_value_t = 5)]
    pub min_clause_chars: usize,

    #[arg(long, default_value_t = 6)]
    pub noise_run_len: usize,

    /// Disable the non-alphanumeric run heuristic (keeps non-Latin clauses).
    #[arg(long, default_value_t = false)]
    pub keep_non_latin: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EmbeddingOptions {
    #[arg(long, default_value = "hash-bow-384-v1")]
    pub model_id: String,
}

#[derive(Args, Debug, Clone)]
pub struct IndexOptions {
    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 5)]
    pub split_threshold: usize,

    #[arg(long, default_value_t = 5)]
    pub sparse_clause_limit: usize,
}

#[derive(Args, Debug, Clone)]
pub struct RetrieveOptions {
    #[arg(long, default_value_t = 150)]
    pub chunk_size: usize,

    #[arg(long, default_value_t = 40)]
    pub chunk_overlap: usize,

    #[arg(long, default_value_t = 3)]
    pub top_k: usize,
}

#[derive(Args, Debug, Clone)]
pub struct LlmOptions {
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, default_value = "claude-3-5-sonnet-latest")]
    pub llm_model: String,

    #[arg(long, default_value_t = 4096)]
    pub max_tokens: usize,

    #[arg(long, default_value_t = 0.0)]
    pub temperature: f32,

    #[arg(long, default_value_t = 120)]
    pub llm_timeout_secs: u64,

    /// Write the rendered prompt instead of calling the language model.
    #[arg(long, default_value_t = false)]
    pub prompt_only: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ParseArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    #[arg(long)]
    pub regulatory_dir: PathBuf,

    #[arg(long)]
    pub sop_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[command(flatten)]
    pub options: ExtractOptions,
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    #[arg(long)]
    pub clauses_dir: Option<PathBuf>,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[command(flatten)]
    pub options: IndexOptions,

    #[command(flatten)]
    pub embedding: EmbeddingOptions,
}

#[derive(Args, Debug, Clone)]
pub struct RetrieveArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub sop_text_path: Option<PathBuf>,

    #[arg(long)]
    pub output_path: Option<PathBuf>,

    #[command(flatten)]
    pub options: RetrieveOptions,

    #[command(flatten)]
    pub embedding: EmbeddingOptions,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    #[arg(long)]
    pub retrieved_path: Option<PathBuf>,

    #[arg(long)]
    pub sop_text_path: Option<PathBuf>,

    #[arg(long)]
    pub output_path: Option<PathBuf>,

    #[command(flatten)]
    pub llm: LlmOptions,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    #[arg(long)]
    pub regulatory_dir: PathBuf,

    #[arg(long)]
    pub sop_path: PathBuf,

    #[command(flatten)]
    pub extract: ExtractOptions,

    #[command(flatten)]
    pub index: IndexOptions,

    #[command(flatten)]
    pub embedding: EmbeddingOptions,

    #[command(flatten)]
    pub retrieve: RetrieveOptions,

    #[command(flatten)]
    pub llm: LlmOptions,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,
}
