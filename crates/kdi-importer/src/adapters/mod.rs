use std::path::Path;

use anyhow::Context;

use crate::{models::Submission, parser::parse_nmap_xml};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceFormat {
    /// One JSON submission per line.
    Jsonl,
    /// nmap `-oX` report.
    Nmap,
}

#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    async fn load(&self, path: &Path) -> anyhow::Result<Vec<Submission>>;
}

pub struct NmapAdapter;

#[async_trait::async_trait]
impl SourceAdapter for NmapAdapter {
    fn name(&self) -> &'static str {
        "nmap"
    }

    async fn load(&self, path: &Path) -> anyhow::Result<Vec<Submission>> {
        let xml = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        parse_nmap_xml(&xml).with_context(|| format!("invalid nmap report {}", path.display()))
    }
}

pub struct JsonLinesAdapter;

impl JsonLinesAdapter {
    fn parse(raw: &str) -> anyhow::Result<Vec<Submission>> {
        raw.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("invalid submission on line {}", idx + 1))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl SourceAdapter for JsonLinesAdapter {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    async fn load(&self, path: &Path) -> anyhow::Result<Vec<Submission>> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&raw)
    }
}

pub fn adapter_for(format: SourceFormat) -> Box<dyn SourceAdapter> {
    match format {
        SourceFormat::Jsonl => Box::new(JsonLinesAdapter),
        SourceFormat::Nmap => Box::new(NmapAdapter),
    }
}
