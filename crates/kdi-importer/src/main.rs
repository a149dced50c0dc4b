mod adapters;
mod api;
mod attach;
mod config;
mod error;
mod identity;
mod jobs;
mod models;
mod parser;
mod store;
mod upload;
mod writer;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::{
    adapters::{adapter_for, SourceFormat},
    api::KennaClient,
    config::AppConfig,
    jobs::{run_import, Collaborators},
    store::SessionMode,
    writer::JsonFileWriter,
};

#[derive(Parser)]
#[command(name = "kdi-importer")]
#[command(about = "Normalize asset and vulnerability records into a KDI document and upload it")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Source file to import
    input: PathBuf,
    /// Source format
    #[arg(short, long, value_enum, default_value = "jsonl")]
    format: SourceFormat,
    /// Output directory (overrides config)
    #[arg(short, long)]
    out: Option<PathBuf>,
    /// Output file name (overrides config)
    #[arg(long)]
    filename: Option<String>,
    /// Store session mode (overrides config). The default, isolated, keeps
    /// only the last record of the run; pass `batched` to import a whole file
    #[arg(long, value_enum)]
    session_mode: Option<SessionMode>,
    /// Page size for batched output (overrides config)
    #[arg(long)]
    page_size: Option<usize>,
    /// Write the document but never upload it
    #[arg(long)]
    no_upload: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(out) = cli.out {
        config.output_dir = out;
    }
    if let Some(filename) = cli.filename {
        config.filename = filename;
    }
    if let Some(mode) = cli.session_mode {
        config.session_mode = mode;
    }
    if let Some(page_size) = cli.page_size {
        config.page_size = page_size;
    }
    if cli.no_upload {
        config.api_key = None;
    }

    let adapter = adapter_for(cli.format);
    let submissions = adapter
        .load(&cli.input)
        .await
        .with_context(|| format!("{} source could not be loaded", adapter.name()))?;
    info!(source = adapter.name(), count = submissions.len(), "loaded submissions");

    let client = KennaClient::from_config(&config);
    let summary = run_import(
        submissions,
        &config,
        Collaborators {
            writer: &JsonFileWriter,
            uploader: &client,
            kickoff: &client,
        },
    )
    .await?;

    info!(
        batches = summary.batches,
        uploaded = ?summary.uploaded_files,
        "done"
    );
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();
}
