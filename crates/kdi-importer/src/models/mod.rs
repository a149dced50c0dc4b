use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn strip_null_extras(extra: &mut Map<String, Value>) {
    extra.retain(|_, v| !v.is_null());
}

/// A KDI asset. Only present fields are serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Asset {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ec2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub netbios: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vulns: Option<Vec<Vuln>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub findings: Option<Vec<Finding>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Asset {
    /// Value stored under `key`, whether a known field or an extra one.
    /// Absent and null both come back as `None`, and so do the list fields
    /// `tags`, `vulns` and `findings`, which the store refuses as match keys.
    pub fn value_of(&self, key: &str) -> Option<Value> {
        let text = |v: &Option<String>| v.clone().map(Value::String);
        match key {
            "file" => text(&self.file),
            "ip_address" => text(&self.ip_address),
            "mac_address" => text(&self.mac_address),
            "hostname" => text(&self.hostname),
            "ec2" => text(&self.ec2),
            "netbios" => text(&self.netbios),
            "url" => text(&self.url),
            "fqdn" => text(&self.fqdn),
            "external_id" => text(&self.external_id),
            "database" => text(&self.database),
            "application" => text(&self.application),
            "image_id" => text(&self.image_id),
            "container_id" => text(&self.container_id),
            "os" => text(&self.os),
            "os_version" => text(&self.os_version),
            "owner" => text(&self.owner),
            "priority" => self.priority.map(Value::from),
            _ => self.extra.get(key).filter(|v| !v.is_null()).cloned(),
        }
    }

    pub fn strip_nulls(&mut self) {
        strip_null_extras(&mut self.extra);
    }
}

/// Port as supplied by a source: either already numeric or textual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vuln {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scanner_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scanner_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scanner_score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<PortValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vuln_def_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Vuln {
    /// Numeric port once normalized.
    pub fn port_number(&self) -> Option<i64> {
        match self.port {
            Some(PortValue::Number(n)) => Some(n),
            _ => None,
        }
    }

    pub fn strip_nulls(&mut self) {
        strip_null_extras(&mut self.extra);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Finding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scanner_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scanner_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triage_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vuln_def_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_fields: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Finding {
    pub fn strip_nulls(&mut self) {
        strip_null_extras(&mut self.extra);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulnDef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scanner_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scanner_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cve_identifiers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwe_identifiers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wasc_identifiers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VulnDef {
    pub fn strip_nulls(&mut self) {
        strip_null_extras(&mut self.extra);
    }
}

/// One unit of source input, as read from a JSON-lines file or produced by a
/// scanner parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Submission {
    Asset {
        asset: Asset,
        #[serde(default = "default_dedup")]
        dedup: bool,
    },
    Vuln {
        asset: Asset,
        vuln: Vuln,
        match_key: Option<String>,
    },
    Finding {
        asset: Asset,
        finding: Finding,
        match_key: Option<String>,
    },
    PagedVuln {
        asset: Asset,
        vuln: Vuln,
        match_key: Option<String>,
    },
    VulnDef {
        vuln_def: VulnDef,
    },
}

fn default_dedup() -> bool {
    true
}
