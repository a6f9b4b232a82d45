use crate::construct::{AssetPointer, Representation};
use crate::enricher::{HrefKind, LocatorBuilder};

/// Builds locators under the `/cat/assets` routes served by this repository.
#[derive(Debug, Clone)]
pub struct HrefBuilder {
    base_url: String,
}

// keeps a representation code intact inside a query string
fn encode_query_value(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '%' => "%25".to_string(),
            '#' => "%23".to_string(),
            '?' => "%3F".to_string(),
            ';' => "%3B".to_string(),
            '=' => "%3D".to_string(),
            '+' => "%2B".to_string(),
            ',' => "%2C".to_string(),
            '/' => "%2F".to_string(),
            ' ' => "%20".to_string(),
            '&' => "%26".to_string(),
            _ => c.to_string(),
        })
        .collect()
}

impl HrefBuilder {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
    pub fn asset_href(&self, asset: &AssetPointer) -> String {
        format!("{}/cat/assets/{}", self.base_url, asset.id())
    }
    pub fn asset_version_href(&self, asset: &AssetPointer) -> String {
        format!("{}/versions/{}", self.asset_href(asset), asset.version())
    }
    pub fn carrier_version_href(&self, asset: &AssetPointer, carrier: &AssetPointer) -> String {
        format!(
            "{}/carriers/{}/versions/{}",
            self.asset_version_href(asset),
            carrier.id(),
            carrier.version()
        )
    }
    pub fn surrogate_version_href(&self, asset: &AssetPointer, surrogate: &AssetPointer) -> String {
        format!(
            "{}/surrogate/{}/versions/{}",
            self.asset_version_href(asset),
            surrogate.id(),
            surrogate.version()
        )
    }
}

impl LocatorBuilder for HrefBuilder {
    fn content_href(
        &self,
        asset: &AssetPointer,
        artifact: Option<&AssetPointer>,
        representation: &Representation,
        kind: HrefKind,
    ) -> String {
        let negotiated = |path: &str| {
            format!(
                "{}/{}?xAccept={}",
                self.asset_version_href(asset),
                path,
                encode_query_value(&representation.to_string())
            )
        };
        match (kind, artifact) {
            (HrefKind::AssetCarrierVersionContent, Some(carrier)) => {
                self.carrier_version_href(asset, carrier)
            }
            (HrefKind::AssetSurrogateVersionContent, Some(surrogate)) => {
                self.surrogate_version_href(asset, surrogate)
            }
            (HrefKind::AssetCarrierVersionContent | HrefKind::EphemeralCarrier, _) => {
                negotiated("carrier")
            }
            (HrefKind::AssetSurrogateVersionContent | HrefKind::EphemeralSurrogate, _) => {
                negotiated("surrogate")
            }
        }
    }
}
