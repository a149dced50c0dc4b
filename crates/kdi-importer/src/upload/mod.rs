use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::{
    config::ConnectorCredentials,
    error::KdiResult,
    models::{Asset, VulnDef},
    store::KdiStore,
};

/// Serializes a KDI document to `path`.
pub trait DocumentWriter: Send + Sync {
    fn write(
        &self,
        path: &Path,
        assets: &[Asset],
        vuln_defs: &[VulnDef],
        skip_autoclose: bool,
        version: u32,
    ) -> KdiResult<()>;
}

#[async_trait::async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(
        &self,
        credentials: &ConnectorCredentials,
        file_path: &Path,
        max_retries: u32,
    ) -> anyhow::Result<UploadResult>;
}

#[async_trait::async_trait]
pub trait KickoffClient: Send + Sync {
    async fn run(&self, credentials: &ConnectorCredentials, data_files: &[u64]) -> anyhow::Result<()>;
}

/// Response of a connector data file upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    #[serde(default)]
    pub data_file: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy)]
pub struct FlushOptions<'a> {
    pub path: &'a Path,
    pub skip_autoclose: bool,
    pub version: u32,
    pub max_retries: u32,
    pub credentials: Option<&'a ConnectorCredentials>,
}

impl KdiStore {
    /// Writes the current write set and uploads it when credentials are
    /// given. Returns `None` when nothing was uploaded. Collaborator errors
    /// propagate before any state transition.
    pub async fn flush(
        &mut self,
        writer: &dyn DocumentWriter,
        uploader: &dyn Uploader,
        opts: FlushOptions<'_>,
    ) -> anyhow::Result<Option<UploadResult>> {
        let write_set = self.write_set();
        if write_set.is_empty() {
            return Ok(None);
        }

        writer
            .write(
                opts.path,
                write_set,
                self.vuln_defs(),
                opts.skip_autoclose,
                opts.version,
            )
            .with_context(|| format!("failed to write {}", opts.path.display()))?;
        info!(path = %opts.path.display(), assets = write_set.len(), "output is available");

        let mut result = None;
        if let Some(creds) = opts.credentials {
            info!(api_host = %creds.api_host, connector_id = creds.connector_id, "uploading to connector");
            let uploaded = uploader
                .upload(creds, opts.path, opts.max_retries)
                .await
                .with_context(|| format!("failed to upload {}", opts.path.display()))?;
            match uploaded.data_file {
                Some(id) => self.record_upload(id),
                None => warn!(path = %opts.path.display(), "upload response carried no data_file"),
            }
            result = Some(uploaded);
        }

        self.reset_after_flush();
        Ok(result)
    }

    /// Asks the connector to process every uploaded data file.
    pub async fn kickoff(
        &self,
        client: &dyn KickoffClient,
        credentials: &ConnectorCredentials,
    ) -> anyhow::Result<()> {
        if self.uploaded_files().is_empty() {
            return Ok(());
        }

        info!(
            api_host = %credentials.api_host,
            files = self.uploaded_files().len(),
            "running connector"
        );
        client.run(credentials, self.uploaded_files()).await
    }
}
