use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use serde::Serialize;

use crate::{
    error::KdiResult,
    models::{Asset, VulnDef},
    upload::DocumentWriter,
};

#[derive(Serialize)]
struct KdiDocument<'a> {
    skip_autoclose: bool,
    version: u32,
    assets: &'a [Asset],
    vuln_defs: &'a [VulnDef],
}

/// Writes the KDI JSON document to disk, creating parent directories.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFileWriter;

impl DocumentWriter for JsonFileWriter {
    fn write(
        &self,
        path: &Path,
        assets: &[Asset],
        vuln_defs: &[VulnDef],
        skip_autoclose: bool,
        version: u32,
    ) -> KdiResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut out = BufWriter::new(File::create(path)?);
        let doc = KdiDocument {
            skip_autoclose,
            version,
            assets,
            vuln_defs,
        };
        serde_json::to_writer(&mut out, &doc)?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use tempfile::TempDir;

    use super::JsonFileWriter;
    use crate::{
        models::{Asset, VulnDef},
        store::{KdiStore, SessionMode},
        upload::DocumentWriter,
    };

    #[test]
    fn writes_kdi_document_with_nested_vulns() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("kdi.json");

        let mut store = KdiStore::new(SessionMode::Batched);
        let asset = Asset {
            ip_address: Some("10.0.0.1".into()),
            ..Asset::default()
        };
        store
            .add_vuln(asset, Default::default(), Some("ip_address"))
            .expect("add_vuln should work");
        store.create_vuln_def(VulnDef {
            scanner_identifier: Some("open_port_22_tcp".into()),
            scanner_type: Some("nmap".into()),
            ..VulnDef::default()
        });

        JsonFileWriter
            .write(&path, store.assets(), store.vuln_defs(), true, 2)
            .expect("write should work");

        let raw = std::fs::read_to_string(&path).expect("file should exist");
        let doc: Value = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(doc["skip_autoclose"], Value::Bool(true));
        assert_eq!(doc["version"], Value::from(2));
        assert_eq!(doc["assets"][0]["ip_address"], Value::from("10.0.0.1"));
        assert_eq!(doc["assets"][0]["tags"], serde_json::json!([]));
        assert_eq!(doc["assets"][0]["vulns"][0]["status"], Value::from("open"));
        assert!(doc["assets"][0].get("hostname").is_none());
        assert!(doc["assets"][0]["vulns"][0].get("port").is_none());
        assert_eq!(doc["vuln_defs"][0]["scanner_type"], Value::from("nmap"));
    }

    #[test]
    fn unwritable_target_is_an_io_error() {
        let dir = TempDir::new().expect("tempdir");
        let err = JsonFileWriter
            .write(dir.path(), &[], &[], false, 1)
            .unwrap_err();
        assert!(matches!(err, crate::error::KdiError::Io(_)));
    }
}
