use std::{env, fmt, fs, path::PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::store::SessionMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub output_dir: PathBuf,
    pub filename: String,
    pub connector_id: Option<u64>,
    pub api_host: Option<String>,
    pub api_key: Option<String>,
    pub skip_autoclose: bool,
    pub version: u32,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub kickoff: bool,
    pub kickoff_poll_secs: u64,
    pub kickoff_max_polls: u32,
    /// Isolated (the default) keeps only the last call's records. Multi-record
    /// imports need batched.
    pub session_mode: SessionMode,
    /// Flush a batch once this many assets are paged. 0 disables paging.
    pub page_size: usize,
}

/// Connector upload target. Only exists when id, host and key are all set.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectorCredentials {
    pub connector_id: u64,
    pub api_host: String,
    pub api_key: String,
}

impl fmt::Debug for ConnectorCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorCredentials")
            .field("connector_id", &self.connector_id)
            .field("api_host", &self.api_host)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var("KDI_CONFIG").unwrap_or_else(|_| "kdi-config.json".to_string());
        let file_cfg: Option<AppConfig> = fs::read_to_string(&path)
            .ok()
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .with_context(|| format!("failed to parse {path}"))?;

        let mut cfg = file_cfg.unwrap_or_default();
        cfg.apply_env(|key| env::var(key).ok());
        Ok(cfg)
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("KDI_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("KDI_FILENAME") {
            self.filename = v;
        }
        if let Some(v) = lookup("KDI_CONNECTOR_ID") {
            self.connector_id = v.trim().parse().ok().or(self.connector_id);
        }
        if let Some(v) = lookup("KDI_API_HOST") {
            self.api_host = Some(v);
        }
        if let Some(v) = lookup("KDI_API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = lookup("KDI_MAX_RETRIES") {
            self.max_retries = v.parse().unwrap_or(self.max_retries);
        }
        if let Some(v) = lookup("KDI_SESSION_MODE") {
            self.session_mode = match v.trim().to_ascii_lowercase().as_str() {
                "batched" => SessionMode::Batched,
                "isolated" => SessionMode::Isolated,
                _ => self.session_mode,
            };
        }
        if let Some(v) = lookup("KDI_PAGE_SIZE") {
            self.page_size = v.parse().unwrap_or(self.page_size);
        }
    }

    pub fn credentials(&self) -> Option<ConnectorCredentials> {
        let connector_id = self.connector_id.filter(|id| *id != 0)?;
        let api_host = self.api_host.as_deref().filter(|h| !h.is_empty())?;
        let api_key = self.api_key.as_deref().filter(|k| !k.is_empty())?;
        Some(ConnectorCredentials {
            connector_id,
            api_host: api_host.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.filename)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            filename: "kdi.json".to_string(),
            connector_id: None,
            api_host: None,
            api_key: None,
            skip_autoclose: false,
            version: 1,
            max_retries: 3,
            retry_delay_secs: 15,
            kickoff: true,
            kickoff_poll_secs: 10,
            kickoff_max_polls: 60,
            session_mode: SessionMode::Isolated,
            page_size: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::AppConfig;
    use crate::store::SessionMode;

    #[test]
    fn credentials_need_all_three_parts() {
        let mut cfg = AppConfig {
            connector_id: Some(42),
            api_host: Some("api.kennasecurity.com".into()),
            ..AppConfig::default()
        };
        assert!(cfg.credentials().is_none());

        cfg.api_key = Some(String::new());
        assert!(cfg.credentials().is_none());

        cfg.api_key = Some("secret".into());
        let creds = cfg.credentials().expect("credentials should be complete");
        assert_eq!(creds.connector_id, 42);
        assert!(!format!("{creds:?}").contains("secret"));
    }

    #[test]
    fn env_overrides_file_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("KDI_OUTPUT_DIR", "/tmp/kdi"),
            ("KDI_CONNECTOR_ID", "17"),
            ("KDI_MAX_RETRIES", "not-a-number"),
            ("KDI_SESSION_MODE", "Batched"),
            ("KDI_PAGE_SIZE", "500"),
        ]);
        let mut cfg = AppConfig::default();
        cfg.apply_env(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.output_dir.to_str(), Some("/tmp/kdi"));
        assert_eq!(cfg.connector_id, Some(17));
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.session_mode, SessionMode::Batched);
        assert_eq!(cfg.page_size, 500);
    }

    #[test]
    fn partial_file_config_keeps_defaults() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{"filename": "nessus.json", "session_mode": "batched"}"#)
                .expect("config should parse");
        assert_eq!(cfg.filename, "nessus.json");
        assert_eq!(cfg.session_mode, SessionMode::Batched);
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.output_path().to_str(), Some("output/nessus.json"));
    }
}
