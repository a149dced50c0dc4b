use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{KdiError, KdiResult},
    identity::identity,
    models::{Asset, VulnDef},
};

/// How store state behaves across public mutating calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Every `create`, `find_or_create`, `add_vuln`, `add_finding` and
    /// `add_paged_vuln` starts from empty collections. Only `flush` carries
    /// state forward.
    #[default]
    Isolated,
    /// Collections accumulate across calls until flushed.
    Batched,
}

/// In-memory KDI document under construction.
///
/// `assets` and `paged_assets` are disjoint: an asset moved to the paged
/// collection is removed from the primary one.
#[derive(Debug, Default)]
pub struct KdiStore {
    mode: SessionMode,
    assets: Vec<Asset>,
    paged_assets: Vec<Asset>,
    vuln_defs: Vec<VulnDef>,
    uploaded_files: Vec<u64>,
}

impl KdiStore {
    pub fn new(mode: SessionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn paged_assets(&self) -> &[Asset] {
        &self.paged_assets
    }

    pub fn vuln_defs(&self) -> &[VulnDef] {
        &self.vuln_defs
    }

    pub fn uploaded_files(&self) -> &[u64] {
        &self.uploaded_files
    }

    /// Start of a public mutating call. In isolated mode this drops
    /// everything, uploaded file ids included.
    pub(crate) fn begin_call(&mut self) {
        if self.mode == SessionMode::Isolated {
            self.assets.clear();
            self.vuln_defs.clear();
            self.paged_assets.clear();
            self.uploaded_files.clear();
        }
    }

    /// Adds `asset` to the primary collection. Returns `None` when
    /// `dedup_check` is set and an asset with the same identity exists.
    pub fn create(&mut self, asset: Asset, dedup_check: bool) -> Option<&Asset> {
        self.begin_call();
        let idx = self.insert_asset(asset, dedup_check)?;
        Some(&self.assets[idx])
    }

    /// First primary asset whose `match_key` value equals the one on `asset`,
    /// creating it (without the identity check) when nothing matches.
    pub fn find_or_create(&mut self, asset: Asset, match_key: Option<&str>) -> KdiResult<&mut Asset> {
        self.begin_call();
        let idx = self.resolve_asset(asset, match_key)?;
        Ok(&mut self.assets[idx])
    }

    /// Resolves the paged asset for `asset`: an existing paged match, else a
    /// primary match migrated over, else `asset` itself appended as-is.
    pub fn move_paged(&mut self, match_key: Option<&str>, asset: Asset) -> KdiResult<&mut Asset> {
        let idx = self.resolve_paged(match_key, asset)?;
        Ok(&mut self.paged_assets[idx])
    }

    /// Registers a vulnerability definition unless one with the same
    /// scanner identifier and type is already present.
    pub fn create_vuln_def(&mut self, mut vuln_def: VulnDef) -> Option<&VulnDef> {
        let exists = self.vuln_defs.iter().any(|d| {
            d.scanner_identifier == vuln_def.scanner_identifier
                && d.scanner_type == vuln_def.scanner_type
        });
        if exists {
            debug!(
                scanner_identifier = ?vuln_def.scanner_identifier,
                "duplicate vuln def suppressed"
            );
            return None;
        }
        vuln_def.strip_nulls();
        self.vuln_defs.push(vuln_def);
        self.vuln_defs.last()
    }

    /// Collection handed to the writer: paged assets when there are any.
    pub fn write_set(&self) -> &[Asset] {
        if self.paged_assets.is_empty() {
            &self.assets
        } else {
            &self.paged_assets
        }
    }

    /// Post-flush transition. Paged assets become the primary collection;
    /// with none paged, the primary collection is emptied.
    pub fn reset_after_flush(&mut self) {
        self.assets = std::mem::take(&mut self.paged_assets);
    }

    pub(crate) fn record_upload(&mut self, data_file: u64) {
        self.uploaded_files.push(data_file);
    }

    fn insert_asset(&mut self, asset: Asset, dedup_check: bool) -> Option<usize> {
        if dedup_check {
            let key = identity(&asset);
            if self.assets.iter().any(|a| identity(a) == key) {
                debug!(identity = ?key, "duplicate asset suppressed");
                return None;
            }
        }
        Some(self.push_asset(asset))
    }

    fn push_asset(&mut self, mut asset: Asset) -> usize {
        asset.tags.get_or_insert_with(Vec::new);
        asset.vulns = Some(Vec::new());
        asset.strip_nulls();
        self.assets.push(asset);
        self.assets.len() - 1
    }

    fn resolve_asset(&mut self, asset: Asset, match_key: Option<&str>) -> KdiResult<usize> {
        let key = checked_match_key(match_key)?;
        let wanted = asset.value_of(key);
        if let Some(idx) = self.assets.iter().position(|a| a.value_of(key) == wanted) {
            return Ok(idx);
        }

        debug!(match_key = key, value = ?wanted, "unable to find asset, creating a new one");
        Ok(self.push_asset(asset))
    }

    fn resolve_paged(&mut self, match_key: Option<&str>, mut asset: Asset) -> KdiResult<usize> {
        let key = checked_match_key(match_key)?;
        let wanted = asset.value_of(key);
        if let Some(idx) = self.paged_assets.iter().position(|a| a.value_of(key) == wanted) {
            return Ok(idx);
        }

        match self.assets.iter().position(|a| a.value_of(key) == wanted) {
            Some(idx) => {
                let moved = self.assets.remove(idx);
                debug!(match_key = key, value = ?wanted, "migrating asset to paged collection");
                self.paged_assets.push(moved);
            }
            None => {
                asset.strip_nulls();
                self.paged_assets.push(asset);
            }
        }
        Ok(self.paged_assets.len() - 1)
    }
}

/// Match keys must name a scalar field. The list fields never compare as a
/// value, so they are refused up front.
fn checked_match_key(match_key: Option<&str>) -> KdiResult<&str> {
    match match_key {
        None => Err(KdiError::MissingMatchKey),
        Some(key @ ("tags" | "vulns" | "findings")) => {
            Err(KdiError::UnsupportedMatchKey { key: key.to_string() })
        }
        Some(key) => Ok(key),
    }
}
