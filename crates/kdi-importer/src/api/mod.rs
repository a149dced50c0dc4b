use std::{path::Path, time::Duration};

use anyhow::Context;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    config::{AppConfig, ConnectorCredentials},
    upload::{KickoffClient, UploadResult, Uploader},
};

const TOKEN_HEADER: &str = "X-Risk-Token";

#[derive(Debug, Deserialize)]
struct ConnectorStatus {
    connector: ConnectorState,
}

#[derive(Debug, Deserialize)]
struct ConnectorState {
    #[serde(default)]
    running: bool,
}

/// HTTP client for the connector data file API.
#[derive(Clone)]
pub struct KennaClient {
    http: reqwest::Client,
    retry_delay: Duration,
    poll_interval: Duration,
    max_polls: u32,
}

impl KennaClient {
    pub fn new(retry_delay: Duration, poll_interval: Duration, max_polls: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            retry_delay,
            poll_interval,
            max_polls,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(
            Duration::from_secs(cfg.retry_delay_secs),
            Duration::from_secs(cfg.kickoff_poll_secs),
            cfg.kickoff_max_polls,
        )
    }

    async fn post_data_file(
        &self,
        url: &str,
        api_key: &str,
        file_name: &str,
        body: Vec<u8>,
    ) -> anyhow::Result<UploadResult> {
        let part = Part::bytes(body)
            .file_name(file_name.to_string())
            .mime_str("application/json")?;
        let form = Form::new().part("file", part).text("run", "false");

        let response = self
            .http
            .post(url)
            .header(TOKEN_HEADER, api_key)
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            anyhow::bail!("upload failed with status {status}: {body}");
        }
        Ok(response.json::<UploadResult>().await?)
    }

    async fn connector_running(&self, creds: &ConnectorCredentials) -> anyhow::Result<bool> {
        let status: ConnectorStatus = self
            .http
            .get(connector_url(&creds.api_host, creds.connector_id))
            .header(TOKEN_HEADER, &creds.api_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(status.connector.running)
    }
}

fn base_url(api_host: &str) -> String {
    let host = api_host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

fn connector_url(api_host: &str, connector_id: u64) -> String {
    format!("{}/connectors/{connector_id}", base_url(api_host))
}

fn data_file_url(api_host: &str, connector_id: u64) -> String {
    format!("{}/data_file", connector_url(api_host, connector_id))
}

fn run_url(api_host: &str, connector_id: u64, data_files: &[u64]) -> String {
    let query = data_files
        .iter()
        .map(|id| format!("data_files[]={id}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}/run?{query}", connector_url(api_host, connector_id))
}

#[async_trait::async_trait]
impl Uploader for KennaClient {
    async fn upload(
        &self,
        credentials: &ConnectorCredentials,
        file_path: &Path,
        max_retries: u32,
    ) -> anyhow::Result<UploadResult> {
        let body = tokio::fs::read(file_path)
            .await
            .with_context(|| format!("failed to read {}", file_path.display()))?;
        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("kdi.json");
        let url = data_file_url(&credentials.api_host, credentials.connector_id);

        let mut attempt = 0;
        loop {
            match self
                .post_data_file(&url, &credentials.api_key, file_name, body.clone())
                .await
            {
                Ok(result) => {
                    info!(data_file = ?result.data_file, "upload accepted");
                    return Ok(result);
                }
                Err(e) if attempt < max_retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, max_retries, "upload failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e.context(format!("giving up after {} attempts", attempt + 1))),
            }
        }
    }
}

#[async_trait::async_trait]
impl KickoffClient for KennaClient {
    async fn run(&self, credentials: &ConnectorCredentials, data_files: &[u64]) -> anyhow::Result<()> {
        let url = run_url(&credentials.api_host, credentials.connector_id, data_files);
        self.http
            .get(&url)
            .header(TOKEN_HEADER, &credentials.api_key)
            .send()
            .await?
            .error_for_status()
            .context("connector run request rejected")?;
        info!(connector_id = credentials.connector_id, files = data_files.len(), "connector run started");

        for poll in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            match self.connector_running(credentials).await {
                Ok(false) => {
                    info!(connector_id = credentials.connector_id, "connector run finished");
                    return Ok(());
                }
                Ok(true) => debug!(poll, "connector still running"),
                Err(e) => warn!(error = %e, poll, "connector status check failed"),
            }
        }
        warn!(
            connector_id = credentials.connector_id,
            max_polls = self.max_polls,
            "stopped waiting for connector run"
        );
        Ok(())
    }
}
