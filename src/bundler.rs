use std::collections::HashSet;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::construct::{AssetPointer, KnowledgeAsset, KnowledgeCarrier, Relationship};
use crate::error::{RepositoryError, Result};
use crate::index::Index;
use crate::store::ArtifactStore;

/// Loads the surrogate registered for `asset`, if both the index entry and
/// the stored document exist.
pub fn resolve_surrogate(
    index: &dyn Index,
    store: &dyn ArtifactStore,
    asset: &AssetPointer,
) -> Result<Option<KnowledgeAsset>> {
    let Some(surrogate) = index.get_surrogate_for_asset(asset)? else {
        return Ok(None);
    };
    match store.get_canonical_content(&surrogate.id(), surrogate.version()) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(RepositoryError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Assembles the carriers of an asset and of everything it relates to.
pub struct Bundler<'a> {
    index: &'a dyn Index,
    store: &'a dyn ArtifactStore,
}

impl<'a> Bundler<'a> {
    pub fn new(index: &'a dyn Index, store: &'a dyn ArtifactStore) -> Self {
        Self { index, store }
    }

    fn closure(
        &self,
        asset_id: &Uuid,
        version: &str,
        rel: Option<Relationship>,
        depth: Option<usize>,
    ) -> Result<(AssetPointer, HashSet<AssetPointer>)> {
        let root = AssetPointer::new(*asset_id, version);
        if resolve_surrogate(self.index, self.store, &root)?.is_none() {
            return Err(RepositoryError::NotFound(format!("no surrogate for {}", root)));
        }
        let related = self.index.get_related_assets_bounded(&root, rel, depth)?;
        Ok((root, related))
    }

    /// One carrier per resolvable pointer in the closure, root included.
    /// Pointers whose content cannot be found are skipped, so the result may
    /// be smaller than the closure.
    pub fn bundle(
        &self,
        asset_id: &Uuid,
        version: &str,
        rel: Option<Relationship>,
        depth: Option<usize>,
    ) -> Result<Vec<KnowledgeCarrier>> {
        let (root, related) = self.closure(asset_id, version, rel, depth)?;
        let mut carriers = Vec::new();
        for pointer in &related {
            match self.carriers_of(pointer) {
                Ok(found) if found.is_empty() => {
                    warn!(asset = %pointer, root = %root, "no carrier available, skipping");
                }
                Ok(found) => carriers.extend(found),
                Err(e) => {
                    warn!(asset = %pointer, root = %root, error = %e, "skipping unresolvable dependency");
                }
            }
        }
        info!(root = %root, related = related.len(), carriers = carriers.len(), "bundled carriers");
        Ok(carriers)
    }

    /// The surrogates of the closure, root included.
    pub fn bundle_surrogates(
        &self,
        asset_id: &Uuid,
        version: &str,
        rel: Option<Relationship>,
        depth: Option<usize>,
    ) -> Result<Vec<KnowledgeAsset>> {
        let (root, related) = self.closure(asset_id, version, rel, depth)?;
        let mut surrogates = Vec::new();
        for pointer in &related {
            match resolve_surrogate(self.index, self.store, pointer) {
                Ok(Some(surrogate)) => surrogates.push(surrogate),
                Ok(None) => warn!(asset = %pointer, root = %root, "no surrogate available, skipping"),
                Err(e) => warn!(asset = %pointer, root = %root, error = %e, "skipping unreadable surrogate"),
            }
        }
        Ok(surrogates)
    }

    fn carriers_of(&self, pointer: &AssetPointer) -> Result<Vec<KnowledgeCarrier>> {
        if !pointer.is_complete() {
            return Err(RepositoryError::NotFound(format!("incomplete pointer {}", pointer)));
        }
        let surrogate = resolve_surrogate(self.index, self.store, pointer)?
            .ok_or_else(|| RepositoryError::NotFound(format!("no surrogate for {}", pointer)))?;

        for carrier in &surrogate.carriers {
            let Some(artifact) = &carrier.artifact_id else {
                continue;
            };
            match self.store.get_canonical_content(&artifact.id(), artifact.version()) {
                Ok(content) => {
                    return Ok(vec![KnowledgeCarrier {
                        asset_id: pointer.clone(),
                        artifact_id: Some(artifact.clone()),
                        representation: carrier.representation.clone(),
                        label: carrier.name.clone().or_else(|| surrogate.name.clone()),
                        content,
                    }]);
                }
                Err(RepositoryError::NotFound(_)) => {
                    debug!(asset = %pointer, artifact = %artifact, "carrier content not materialized");
                }
                Err(e) => return Err(e),
            }
        }

        // fall back to inline artifacts that only say where their content lives
        let mut anonymous = Vec::new();
        for carrier in surrogate.carriers.iter().filter(|c| c.artifact_id.is_none()) {
            let Some(locator) = &carrier.locator else {
                continue;
            };
            match self.store.read_locator(locator) {
                Ok(content) => anonymous.push(KnowledgeCarrier {
                    asset_id: pointer.clone(),
                    artifact_id: None,
                    representation: carrier.representation.clone(),
                    label: carrier.name.clone().or_else(|| surrogate.name.clone()),
                    content,
                }),
                Err(e) => warn!(asset = %pointer, locator = %locator, error = %e, "could not read anonymous carrier"),
            }
        }
        Ok(anonymous)
    }
}
