use chrono::Utc;

use crate::{
    error::{KdiError, KdiResult},
    models::{Asset, Finding, PortValue, Vuln},
    store::KdiStore,
};

fn today_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Zero, empty text and absence all mean "no port".
fn coerce_port(port: Option<PortValue>) -> KdiResult<Option<PortValue>> {
    match port {
        None | Some(PortValue::Number(0)) => Ok(None),
        Some(PortValue::Number(n)) => Ok(Some(PortValue::Number(n))),
        Some(PortValue::Text(text)) if text.is_empty() => Ok(None),
        Some(PortValue::Text(text)) => text
            .trim()
            .parse::<i64>()
            .map(|n| Some(PortValue::Number(n)))
            .map_err(|_| KdiError::InvalidPort { value: text }),
    }
}

fn normalize_vuln(mut vuln: Vuln, stamp_created: bool) -> KdiResult<Vuln> {
    let today = today_utc();
    vuln.status.get_or_insert_with(|| "open".to_string());
    vuln.port = coerce_port(vuln.port.take())?;
    vuln.last_seen_at.get_or_insert_with(|| today.clone());
    if stamp_created {
        vuln.created_at.get_or_insert(today);
    }
    vuln.strip_nulls();
    Ok(vuln)
}

fn normalize_finding(mut finding: Finding) -> Finding {
    finding.triage_state.get_or_insert_with(|| "new".to_string());
    finding.last_seen_at.get_or_insert_with(today_utc);
    finding.strip_nulls();
    finding
}

impl KdiStore {
    /// Attaches `vuln` to the primary asset matched on `match_key`,
    /// creating the asset when needed. Returns the stored vuln.
    /// Starts a fresh call through `find_or_create`.
    pub fn add_vuln(&mut self, asset: Asset, vuln: Vuln, match_key: Option<&str>) -> KdiResult<Vuln> {
        let owner = self.find_or_create(asset, match_key)?;
        let vuln = normalize_vuln(vuln, true)?;
        owner.vulns.get_or_insert_with(Vec::new).push(vuln.clone());
        Ok(vuln)
    }

    pub fn add_finding(
        &mut self,
        asset: Asset,
        finding: Finding,
        match_key: Option<&str>,
    ) -> KdiResult<Finding> {
        let owner = self.find_or_create(asset, match_key)?;
        let finding = normalize_finding(finding);
        owner.findings.get_or_insert_with(Vec::new).push(finding.clone());
        Ok(finding)
    }

    /// Attaches `vuln` to the paged copy of the asset, migrating it out of
    /// the primary collection first if it lives there. `created_at` is left
    /// alone on this path.
    pub fn add_paged_vuln(&mut self, asset: Asset, vuln: Vuln, match_key: Option<&str>) -> KdiResult<bool> {
        self.begin_call();
        let owner = self.move_paged(match_key, asset)?;
        let vuln = normalize_vuln(vuln, false)?;
        owner.vulns.get_or_insert_with(Vec::new).push(vuln);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::{coerce_port, today_utc};
    use crate::{
        error::KdiError,
        models::{Asset, Finding, PortValue, Vuln},
        store::{KdiStore, SessionMode},
    };

    fn host(name: &str) -> Asset {
        Asset {
            hostname: Some(name.into()),
            ..Asset::default()
        }
    }

    fn vuln(id: &str) -> Vuln {
        Vuln {
            scanner_identifier: Some(id.into()),
            scanner_type: Some("test".into()),
            ..Vuln::default()
        }
    }

    #[test]
    fn add_vuln_on_empty_store_creates_asset_with_defaults() {
        let mut store = KdiStore::new(SessionMode::Isolated);
        let stored = store
            .add_vuln(host("web-01"), vuln("v1"), Some("hostname"))
            .expect("add_vuln should work");

        assert_eq!(stored.status.as_deref(), Some("open"));
        assert_eq!(stored.port, None);
        assert_eq!(store.assets().len(), 1);
        let vulns = store.assets()[0].vulns.as_ref().expect("vulns");
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0], stored);
    }

    #[test]
    fn add_vuln_stamps_dates_and_keeps_explicit_values() {
        let mut store = KdiStore::new(SessionMode::Batched);
        let mut v = vuln("v1");
        v.status = Some("closed".into());
        v.created_at = Some("2020-01-01".into());

        let stored = store
            .add_vuln(host("web-01"), v, Some("hostname"))
            .expect("add_vuln should work");
        assert_eq!(stored.status.as_deref(), Some("closed"));
        assert_eq!(stored.created_at.as_deref(), Some("2020-01-01"));
        assert_eq!(stored.last_seen_at, Some(today_utc()));
    }

    #[test]
    fn textual_port_becomes_integer() {
        let mut store = KdiStore::new(SessionMode::Batched);
        let mut v = vuln("v1");
        v.port = Some(PortValue::Text("443".into()));
        let stored = store
            .add_vuln(host("web-01"), v, Some("hostname"))
            .expect("add_vuln should work");
        assert_eq!(stored.port_number(), Some(443));

        let json = serde_json::to_value(&stored).expect("serialize");
        assert_eq!(json["port"], serde_json::json!(443));
    }

    #[test]
    fn falsy_ports_are_dropped() {
        assert_eq!(coerce_port(None).expect("none"), None);
        assert_eq!(coerce_port(Some(PortValue::Number(0))).expect("zero"), None);
        assert_eq!(coerce_port(Some(PortValue::Text(String::new()))).expect("empty"), None);
        assert_eq!(
            coerce_port(Some(PortValue::Text("0".into()))).expect("text zero"),
            Some(PortValue::Number(0))
        );
        assert_eq!(
            coerce_port(Some(PortValue::Text(" 8080 ".into()))).expect("padded"),
            Some(PortValue::Number(8080))
        );
    }

    #[test]
    fn unparsable_port_is_an_error() {
        let mut store = KdiStore::new(SessionMode::Batched);
        let mut v = vuln("v1");
        v.port = Some(PortValue::Text("https".into()));
        let err = store
            .add_vuln(host("web-01"), v, Some("hostname"))
            .unwrap_err();
        assert!(matches!(err, KdiError::InvalidPort { ref value } if value == "https"));
    }

    #[test]
    fn add_vuln_without_match_key_fails_fast() {
        let mut store = KdiStore::new(SessionMode::Batched);
        let err = store.add_vuln(host("web-01"), vuln("v1"), None).unwrap_err();
        assert!(matches!(err, KdiError::MissingMatchKey));
        assert!(store.assets().is_empty());
    }

    #[test]
    fn batched_vulns_accumulate_on_one_asset() {
        let mut store = KdiStore::new(SessionMode::Batched);
        store
            .add_vuln(host("web-01"), vuln("v1"), Some("hostname"))
            .expect("first");
        store
            .add_vuln(host("web-01"), vuln("v2"), Some("hostname"))
            .expect("second");
        assert_eq!(store.assets().len(), 1);
        assert_eq!(store.assets()[0].vulns.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn add_vuln_strips_null_extras() {
        let mut store = KdiStore::new(SessionMode::Batched);
        let mut v = vuln("v1");
        v.extra.insert("plugin_output".into(), serde_json::Value::Null);
        let stored = store
            .add_vuln(host("web-01"), v, Some("hostname"))
            .expect("add_vuln should work");
        let json = serde_json::to_value(&stored).expect("serialize");
        assert!(json.get("plugin_output").is_none());
        assert!(json.get("closed_at").is_none());
    }

    #[test]
    fn add_finding_defaults_triage_state() {
        let mut store = KdiStore::new(SessionMode::Batched);
        let finding = Finding {
            scanner_identifier: Some("f1".into()),
            ..Finding::default()
        };
        let stored = store
            .add_finding(host("app"), finding, Some("hostname"))
            .expect("add_finding should work");
        assert_eq!(stored.triage_state.as_deref(), Some("new"));
        assert!(stored.last_seen_at.is_some());
        assert!(stored.created_at.is_none());
        assert_eq!(store.assets()[0].findings.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn add_finding_strips_null_extras() {
        let mut store = KdiStore::new(SessionMode::Batched);
        let mut finding = Finding {
            scanner_identifier: Some("f1".into()),
            ..Finding::default()
        };
        finding.extra.insert("severity".into(), serde_json::Value::Null);
        finding.extra.insert("source".into(), serde_json::json!("sast"));

        let stored = store
            .add_finding(host("app"), finding, Some("hostname"))
            .expect("add_finding should work");
        assert!(!stored.extra.contains_key("severity"));
        assert_eq!(stored.extra.get("source"), Some(&serde_json::json!("sast")));

        let kept = &store.assets()[0].findings.as_ref().expect("findings")[0];
        assert!(!kept.extra.contains_key("severity"));
        let json = serde_json::to_value(kept).expect("serialize");
        assert!(json.get("severity").is_none());
        assert_eq!(json["source"], serde_json::json!("sast"));
    }

    #[test]
    fn paged_vuln_twice_creates_one_paged_asset() {
        for mode in [SessionMode::Isolated, SessionMode::Batched] {
            let mut store = KdiStore::new(mode);
            assert!(store
                .add_paged_vuln(host("web-01"), vuln("v1"), Some("hostname"))
                .expect("first"));
            assert!(store
                .add_paged_vuln(host("web-01"), vuln("v2"), Some("hostname"))
                .expect("second"));
            assert_eq!(store.paged_assets().len(), 1);
            assert!(store.assets().is_empty());
        }
    }

    #[test]
    fn paged_vuln_migrates_primary_asset() {
        let mut store = KdiStore::new(SessionMode::Batched);
        store
            .add_vuln(host("web-01"), vuln("v1"), Some("hostname"))
            .expect("primary");
        store
            .add_paged_vuln(host("web-01"), vuln("v2"), Some("hostname"))
            .expect("paged");

        assert!(store.assets().is_empty());
        let paged = &store.paged_assets()[0];
        let vulns = paged.vulns.as_ref().expect("vulns");
        assert_eq!(vulns.len(), 2);
        assert!(vulns[0].created_at.is_some());
        assert!(vulns[1].created_at.is_none());
        assert_eq!(vulns[1].status.as_deref(), Some("open"));
    }
}
