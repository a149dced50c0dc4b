use std::collections::BTreeSet;

use quick_xml::de::from_str;

use crate::models::{Asset, PortValue, Submission, Vuln, VulnDef};

const SCANNER_TYPE: &str = "nmap";

#[derive(Debug, serde::Deserialize)]
struct NmapRun {
    #[serde(rename = "host", default)]
    hosts: Vec<NmapHost>,
}

#[derive(Debug, serde::Deserialize)]
struct NmapHost {
    #[serde(rename = "address")]
    address: NmapAddress,
    #[serde(default)]
    hostnames: Option<NmapHostnames>,
    #[serde(default)]
    ports: Option<NmapPorts>,
}

#[derive(Debug, serde::Deserialize)]
struct NmapAddress {
    #[serde(rename = "@addr")]
    addr: String,
}

#[derive(Debug, serde::Deserialize)]
struct NmapHostnames {
    #[serde(rename = "hostname", default)]
    hostnames: Vec<NmapHostname>,
}

#[derive(Debug, serde::Deserialize)]
struct NmapHostname {
    #[serde(rename = "@name")]
    name: String,
}

#[derive(Debug, serde::Deserialize)]
struct NmapPorts {
    #[serde(rename = "port", default)]
    ports: Vec<NmapPort>,
}

#[derive(Debug, serde::Deserialize)]
struct NmapPort {
    #[serde(rename = "@portid")]
    portid: u16,
    #[serde(rename = "@protocol")]
    protocol: String,
    state: NmapState,
    #[serde(default)]
    service: Option<NmapService>,
}

#[derive(Debug, serde::Deserialize)]
struct NmapState {
    #[serde(rename = "@state")]
    state: String,
}

#[derive(Debug, serde::Deserialize)]
struct NmapService {
    #[serde(rename = "@name")]
    name: String,
}

/// Turns an nmap XML report into KDI submissions keyed on `ip_address`.
/// Each open port becomes a vuln, each distinct port/protocol a vuln def.
pub fn parse_nmap_xml(xml: &str) -> anyhow::Result<Vec<Submission>> {
    let run: NmapRun = from_str(xml)?;
    let mut submissions = Vec::new();
    let mut defined = BTreeSet::new();

    for host in run.hosts {
        let hostname = host
            .hostnames
            .as_ref()
            .and_then(|h| h.hostnames.first().map(|e| e.name.clone()));
        let asset = Asset {
            ip_address: Some(host.address.addr.clone()),
            hostname,
            ..Asset::default()
        };

        let open: Vec<NmapPort> = host
            .ports
            .map(|p| p.ports)
            .unwrap_or_default()
            .into_iter()
            .filter(|p| p.state.state == "open")
            .collect();

        if open.is_empty() {
            submissions.push(Submission::Asset { asset, dedup: true });
            continue;
        }

        for p in open {
            let identifier = format!("open_port_{}_{}", p.portid, p.protocol);
            let service = p.service.as_ref().map(|s| s.name.clone());

            if defined.insert(identifier.clone()) {
                let name = match &service {
                    Some(s) => format!("Open port {}/{} ({s})", p.portid, p.protocol),
                    None => format!("Open port {}/{}", p.portid, p.protocol),
                };
                submissions.push(Submission::VulnDef {
                    vuln_def: VulnDef {
                        scanner_identifier: Some(identifier.clone()),
                        scanner_type: Some(SCANNER_TYPE.to_string()),
                        name: Some(name),
                        description: Some("Network service exposed, detected by nmap".to_string()),
                        ..VulnDef::default()
                    },
                });
            }

            submissions.push(Submission::Vuln {
                asset: asset.clone(),
                vuln: Vuln {
                    scanner_identifier: Some(identifier.clone()),
                    scanner_type: Some(SCANNER_TYPE.to_string()),
                    port: Some(PortValue::Number(i64::from(p.portid))),
                    details: Some(format!("open {} {}", p.protocol, p.portid)),
                    vuln_def_name: Some(identifier),
                    ..Vuln::default()
                },
                match_key: Some("ip_address".to_string()),
            });
        }
    }

    Ok(submissions)
}
