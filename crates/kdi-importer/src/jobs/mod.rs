use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, warn};

use crate::{
    config::{AppConfig, ConnectorCredentials},
    error::KdiResult,
    models::Submission,
    store::KdiStore,
    upload::{DocumentWriter, FlushOptions, KickoffClient, Uploader},
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub submissions: usize,
    pub duplicates: usize,
    pub batches: usize,
    pub uploaded_files: Vec<u64>,
}

pub struct Collaborators<'a> {
    pub writer: &'a dyn DocumentWriter,
    pub uploader: &'a dyn Uploader,
    pub kickoff: &'a dyn KickoffClient,
}

/// Feeds every submission through a fresh store, flushing a batch each time
/// the paged collection reaches `page_size`, then flushes the remainder and
/// kicks off the connector.
pub async fn run_import(
    submissions: Vec<Submission>,
    cfg: &AppConfig,
    collab: Collaborators<'_>,
) -> anyhow::Result<ImportSummary> {
    let mut store = KdiStore::new(cfg.session_mode);
    let creds = cfg.credentials();
    let mut summary = ImportSummary::default();
    let mut dirty = false;

    if creds.is_none() {
        info!("connector credentials incomplete, output will not be uploaded");
    }

    for (idx, submission) in submissions.into_iter().enumerate() {
        summary.submissions += 1;
        apply(&mut store, submission, &mut summary)
            .with_context(|| format!("submission {} rejected", idx + 1))?;
        dirty = true;

        if cfg.page_size > 0 && store.paged_assets().len() >= cfg.page_size {
            flush_batch(&mut store, cfg, creds.as_ref(), &collab, &mut summary).await?;
            dirty = false;
        }
    }

    if dirty {
        flush_batch(&mut store, cfg, creds.as_ref(), &collab, &mut summary).await?;
    }

    if let (true, Some(creds)) = (cfg.kickoff, creds.as_ref()) {
        store.kickoff(collab.kickoff, creds).await?;
    }

    info!(
        submissions = summary.submissions,
        duplicates = summary.duplicates,
        batches = summary.batches,
        uploaded = summary.uploaded_files.len(),
        "import finished"
    );
    Ok(summary)
}

fn apply(store: &mut KdiStore, submission: Submission, summary: &mut ImportSummary) -> KdiResult<()> {
    match submission {
        Submission::Asset { asset, dedup } => {
            if store.create(asset, dedup).is_none() {
                summary.duplicates += 1;
            }
        }
        Submission::Vuln { asset, vuln, match_key } => {
            store.add_vuln(asset, vuln, match_key.as_deref())?;
        }
        Submission::Finding { asset, finding, match_key } => {
            store.add_finding(asset, finding, match_key.as_deref())?;
        }
        Submission::PagedVuln { asset, vuln, match_key } => {
            store.add_paged_vuln(asset, vuln, match_key.as_deref())?;
        }
        Submission::VulnDef { vuln_def } => {
            if store.create_vuln_def(vuln_def).is_none() {
                summary.duplicates += 1;
            }
        }
    }
    Ok(())
}

async fn flush_batch(
    store: &mut KdiStore,
    cfg: &AppConfig,
    creds: Option<&ConnectorCredentials>,
    collab: &Collaborators<'_>,
    summary: &mut ImportSummary,
) -> anyhow::Result<()> {
    if store.write_set().is_empty() {
        warn!("nothing to flush");
        return Ok(());
    }

    summary.batches += 1;
    let path = batch_path(cfg, summary.batches);
    let uploaded = store
        .flush(
            collab.writer,
            collab.uploader,
            FlushOptions {
                path: &path,
                skip_autoclose: cfg.skip_autoclose,
                version: cfg.version,
                max_retries: cfg.max_retries,
                credentials: creds,
            },
        )
        .await?;
    if let Some(data_file) = uploaded.and_then(|r| r.data_file) {
        summary.uploaded_files.push(data_file);
    }
    Ok(())
}

/// Output file for a batch. Without paging there is a single file.
fn batch_path(cfg: &AppConfig, batch: usize) -> PathBuf {
    if cfg.page_size == 0 {
        return cfg.output_path();
    }
    let name = Path::new(&cfg.filename);
    let stem = name.file_stem().and_then(|s| s.to_str()).unwrap_or("kdi");
    let file = match name.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_{batch}.{ext}"),
        None => format!("{stem}_{batch}"),
    };
    cfg.output_dir.join(file)
}
