use crate::models::Asset;

/// The 13 identifying attributes of an asset, in fixed order. `None` marks an
/// absent attribute and never equals an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub file: Option<String>,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub ec2: Option<String>,
    pub netbios: Option<String>,
    pub url: Option<String>,
    pub fqdn: Option<String>,
    pub external_id: Option<String>,
    pub database: Option<String>,
    pub application: Option<String>,
    pub image: Option<String>,
    pub container: Option<String>,
}

pub fn identity(asset: &Asset) -> IdentityKey {
    IdentityKey {
        file: asset.file.clone(),
        ip_address: asset.ip_address.clone(),
        mac_address: asset.mac_address.clone(),
        hostname: asset.hostname.clone(),
        ec2: asset.ec2.clone(),
        netbios: asset.netbios.clone(),
        url: asset.url.clone(),
        fqdn: asset.fqdn.clone(),
        external_id: asset.external_id.clone(),
        database: asset.database.clone(),
        application: asset.application.clone(),
        image: asset.image_id.clone(),
        container: asset.container_id.clone(),
    }
}
