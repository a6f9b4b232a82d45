use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bundler::{Bundler, resolve_surrogate};
use crate::composite::{Composite, CompositeStructure, composite_structure};
use crate::construct::{
    AssetPointer, KnowledgeArtifact, KnowledgeAsset, KnowledgeCarrier, Relationship, Representation,
};
use crate::enricher::{HrefKind, LocatorBuilder, SurrogateEnricher, Transcoder};
use crate::error::{RepositoryError, Result};
use crate::href::HrefBuilder;
use crate::index::Index;
use crate::keeper::KeeperIndex;
use crate::negotiation::{HTML, any_carrier, decode_preferences, negotiate_within};
use crate::settings::{IndexBackend, RepositorySettings, Settings};
use crate::store::{ArtifactStore, ContentReceipt, MemoryArtifactStore, SqliteArtifactStore};
use crate::triple::TripleIndex;

/// The pointer a surrogate document of `asset` is stored under.
pub fn surrogate_pointer(asset: &AssetPointer) -> AssetPointer {
    AssetPointer::new(Uuid::new_v5(&asset.id(), b"surrogate"), asset.version())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetSummary {
    pub asset_id: AssetPointer,
    pub name: Option<String>,
    pub primary_type: Option<String>,
}

/// A carrier or surrogate of an asset version, as listed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactEntry {
    pub artifact_id: AssetPointer,
    pub representation: Option<Representation>,
    pub href: Option<String>,
    /// Absent when the artifact is indexed but its content is not stored.
    pub content: Option<ContentReceipt>,
}

/// The service surface: lookups, registration, negotiation and bundling
/// over an index and an artifact store.
pub struct Repository {
    index: Arc<dyn Index>,
    artifacts: Arc<dyn ArtifactStore>,
    locators: Option<Arc<dyn LocatorBuilder>>,
    transcoder: Option<Arc<dyn Transcoder>>,
    settings: RepositorySettings,
}

impl Repository {
    pub fn new(
        index: Arc<dyn Index>,
        artifacts: Arc<dyn ArtifactStore>,
        settings: RepositorySettings,
    ) -> Self {
        Self {
            index,
            artifacts,
            locators: None,
            transcoder: None,
            settings,
        }
    }

    pub fn with_locators(mut self, locators: Arc<dyn LocatorBuilder>) -> Self {
        self.locators = Some(locators);
        self
    }

    pub fn with_transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    /// A self-contained repository: the configured index, an artifact store
    /// and locators under the configured base url. With an index path the
    /// artifact content is kept in the same file, otherwise in memory.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let index: Arc<dyn Index> = match settings.index.backend {
            IndexBackend::Keeper => Arc::new(KeeperIndex::new(settings.persistence_mode())?),
            IndexBackend::Triple => {
                if settings.index.path.is_some() {
                    return Err(RepositoryError::Config(
                        "the triple index cannot be backed by a file".to_string(),
                    ));
                }
                Arc::new(TripleIndex::new())
            }
        };
        let artifacts: Arc<dyn ArtifactStore> = match &settings.index.path {
            Some(path) => Arc::new(SqliteArtifactStore::open(path)?),
            None => Arc::new(MemoryArtifactStore::new()),
        };
        info!(backend = ?settings.index.backend, "index ready");
        Ok(Repository::new(index, artifacts, settings.repository.clone())
            .with_locators(Arc::new(HrefBuilder::new(&settings.server.base_url))))
    }

    pub fn index(&self) -> &dyn Index {
        &*self.index
    }

    pub fn artifacts(&self) -> &dyn ArtifactStore {
        &*self.artifacts
    }

    pub fn settings(&self) -> &RepositorySettings {
        &self.settings
    }

    fn enricher(&self) -> SurrogateEnricher<'_> {
        SurrogateEnricher::new(self.settings.surrogate_representation())
            .with_locators(self.locators.as_deref())
            .with_transcoder(self.transcoder.as_deref())
            .with_index(Some(&*self.index))
    }

    fn require_surrogate(&self, asset: &AssetPointer) -> Result<KnowledgeAsset> {
        resolve_surrogate(&*self.index, &*self.artifacts, asset)?
            .ok_or_else(|| RepositoryError::NotFound(format!("no surrogate for {}", asset)))
    }

    // ------------- listing -------------

    /// One entry per asset series matching both filters, preferring the
    /// latest registered version, ordered by name.
    pub fn list_assets(
        &self,
        asset_type: Option<&str>,
        annotation: Option<&str>,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<AssetSummary>> {
        let by_type = self.index.get_asset_ids_by_type(asset_type)?;
        let by_annotation = self.index.get_asset_ids_by_annotation(annotation)?;
        let mut series: BTreeMap<Uuid, Vec<AssetPointer>> = BTreeMap::new();
        for pointer in by_type.intersection(&by_annotation) {
            series.entry(pointer.id()).or_default().push(pointer.clone());
        }
        let mut summaries = Vec::with_capacity(series.len());
        for (id, mut versions) in series {
            let latest = self.index.get_latest_asset_for_id(&id)?;
            versions.sort();
            let chosen = match latest {
                Some(latest) if versions.contains(&latest) => latest,
                _ => match versions.pop() {
                    Some(last) => last,
                    None => continue,
                },
            };
            let metadata = self.index.get_descriptive_metadata(&chosen)?.unwrap_or_default();
            summaries.push(AssetSummary {
                asset_id: chosen,
                name: metadata.name,
                primary_type: metadata.primary_type,
            });
        }
        summaries.sort_by(|a, b| (&a.name, &a.asset_id).cmp(&(&b.name, &b.asset_id)));
        Ok(summaries
            .into_iter()
            .skip(offset.unwrap_or(0))
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Every registered version of a series, newest version tag first.
    pub fn list_asset_versions(&self, id: &Uuid) -> Result<Vec<AssetPointer>> {
        let mut versions: Vec<AssetPointer> = self.index.get_asset_versions(id)?.into_iter().collect();
        if versions.is_empty() {
            return Err(RepositoryError::NotFound(format!("no asset series {}", id)));
        }
        versions.sort_by(|a, b| b.cmp(a));
        Ok(versions)
    }

    fn entry(
        &self,
        asset: &AssetPointer,
        artifact: &AssetPointer,
        representation: Option<Representation>,
        kind: HrefKind,
    ) -> Result<ArtifactEntry> {
        let href = self.locators.as_ref().map(|l| {
            l.content_href(
                asset,
                Some(artifact),
                representation.as_ref().unwrap_or(&Representation::any()),
                kind,
            )
        });
        Ok(ArtifactEntry {
            artifact_id: artifact.clone(),
            content: self
                .artifacts
                .stored(&artifact.id(), artifact.version())?
                .map(|s| s.receipt()),
            representation,
            href,
        })
    }

    /// The carriers registered to an asset version, newest version tag first.
    pub fn list_carriers(&self, asset: &AssetPointer) -> Result<Vec<ArtifactEntry>> {
        let surrogate = self.require_surrogate(asset)?;
        let mut artifacts: Vec<AssetPointer> = self.index.get_artifacts_for_asset(asset)?.into_iter().collect();
        artifacts.sort_by(|a, b| b.cmp(a));
        artifacts
            .iter()
            .map(|artifact| {
                let representation = surrogate
                    .carriers
                    .iter()
                    .find(|c| c.artifact_id.as_ref() == Some(artifact))
                    .map(|c| c.representation.clone());
                self.entry(asset, artifact, representation, HrefKind::AssetCarrierVersionContent)
            })
            .collect()
    }

    /// The canonical surrogate of an asset version, then any alternate
    /// surrogates its document names.
    pub fn list_surrogates(&self, asset: &AssetPointer) -> Result<Vec<ArtifactEntry>> {
        let surrogate = self.require_surrogate(asset)?;
        let mut entries = Vec::new();
        if let Some(canonical) = self.index.get_surrogate_for_asset(asset)? {
            entries.push(self.entry(
                asset,
                &canonical,
                Some(self.settings.surrogate_representation()),
                HrefKind::AssetSurrogateVersionContent,
            )?);
        }
        for alternate in surrogate.surrogates.iter().filter(|s| !s.ephemeral) {
            if let Some(id) = &alternate.artifact_id {
                entries.push(self.entry(
                    asset,
                    id,
                    Some(alternate.representation.clone()),
                    HrefKind::AssetSurrogateVersionContent,
                )?);
            }
        }
        Ok(entries)
    }

    // ------------- surrogates -------------

    pub fn get_latest_surrogate(&self, id: &Uuid, accept: Option<&str>) -> Result<KnowledgeAsset> {
        let latest = self
            .index
            .get_latest_asset_for_id(id)?
            .ok_or_else(|| RepositoryError::NotFound(format!("no asset series {}", id)))?;
        self.get_surrogate(&latest, accept)
    }

    /// The enriched surrogate. Only the canonical surrogate form and HTML
    /// are acceptable alternatives.
    pub fn get_surrogate(&self, asset: &AssetPointer, accept: Option<&str>) -> Result<KnowledgeAsset> {
        let surrogate = self.require_surrogate(asset)?;
        if let Some(accept) = accept.filter(|a| !a.trim().is_empty()) {
            let canonical = self.settings.surrogate_representation();
            let acceptable = decode_preferences(accept, Some(&canonical))
                .into_iter()
                .any(|p| p.rep.has_language(HTML) || p.rep.has_language(&self.settings.surrogate_language));
            if !acceptable {
                return Err(RepositoryError::NotAcceptable(format!(
                    "no surrogate of {} matches '{}'",
                    asset, accept
                )));
            }
        }
        self.enricher().enrich(surrogate, true)
    }

    fn store_surrogate(&self, surrogate: &KnowledgeAsset) -> Result<AssetPointer> {
        let pointer = surrogate_pointer(&surrogate.asset_id);
        let document = serde_json::to_vec(surrogate)?;
        self.artifacts
            .put_content(&pointer.id(), pointer.version(), document)?;
        Ok(pointer)
    }

    /// Stores and indexes a surrogate. Ephemeral descriptors are never kept.
    pub fn register_surrogate(&self, asset: &AssetPointer, mut surrogate: KnowledgeAsset) -> Result<()> {
        if &surrogate.asset_id != asset {
            return Err(RepositoryError::Conflict(format!(
                "surrogate describes {} but was registered as {}",
                surrogate.asset_id, asset
            )));
        }
        surrogate.carriers.retain(|c| !c.ephemeral);
        surrogate.surrogates.retain(|s| !s.ephemeral);
        let stored = self.store_surrogate(&surrogate)?;
        self.index.index_surrogate(&surrogate, &stored)?;
        if let Some(locators) = &self.locators {
            let href = locators.content_href(
                asset,
                Some(&stored),
                &self.settings.surrogate_representation(),
                HrefKind::AssetSurrogateVersionContent,
            );
            self.index.register_location(asset, &href)?;
        }
        info!(asset = %asset, carriers = surrogate.carriers.len(), links = surrogate.links.len(), "registered surrogate");
        Ok(())
    }

    // ------------- carriers -------------

    /// Stores carrier content for an asset version. Registering the same
    /// bytes again is a no-op, different bytes are a conflict.
    pub fn register_carrier(
        &self,
        asset: &AssetPointer,
        artifact: &AssetPointer,
        representation: Representation,
        label: Option<&str>,
        content: Vec<u8>,
    ) -> Result<()> {
        let mut surrogate = self.require_surrogate(asset)?;
        match self.artifacts.digest(&artifact.id(), artifact.version())? {
            Some(existing) if existing != blake3::hash(&content) => {
                return Err(RepositoryError::Conflict(format!(
                    "carrier {} of {} already holds different content",
                    artifact, asset
                )));
            }
            Some(_) => {
                debug!(asset = %asset, artifact = %artifact, "carrier content unchanged");
            }
            None => {
                self.artifacts
                    .put_content(&artifact.id(), artifact.version(), content)?;
            }
        }
        self.index.register_artifact_to_asset(asset, artifact)?;
        if !surrogate
            .carriers
            .iter()
            .any(|c| c.artifact_id.as_ref() == Some(artifact))
        {
            let mut descriptor = KnowledgeArtifact::new(artifact.clone(), representation);
            descriptor.name = label.map(str::to_string);
            surrogate.carriers.push(descriptor);
            self.store_surrogate(&surrogate)?;
        }
        info!(asset = %asset, artifact = %artifact, "registered carrier");
        Ok(())
    }

    fn materialize(&self, asset: &AssetPointer, carrier: &KnowledgeArtifact) -> Result<KnowledgeCarrier> {
        let content = match (&carrier.artifact_id, &carrier.locator) {
            (Some(artifact), _) => self
                .artifacts
                .get_canonical_content(&artifact.id(), artifact.version())?,
            (None, Some(locator)) => self.artifacts.read_locator(locator)?,
            (None, None) => {
                return Err(RepositoryError::NotFound(format!(
                    "carrier of {} has neither id nor locator",
                    asset
                )));
            }
        };
        Ok(KnowledgeCarrier {
            asset_id: asset.clone(),
            artifact_id: carrier.artifact_id.clone(),
            representation: carrier.representation.clone(),
            label: carrier.name.clone(),
            content,
        })
    }

    /// The carrier best matching the client's preferences, or any carrier
    /// when no preferences are given.
    pub fn get_canonical_carrier(&self, asset: &AssetPointer, accept: Option<&str>) -> Result<KnowledgeCarrier> {
        let surrogate = self.require_surrogate(asset)?;
        let candidates: Vec<KnowledgeArtifact> = surrogate
            .carriers
            .into_iter()
            .filter(|c| !c.ephemeral && (c.artifact_id.is_some() || c.locator.is_some()))
            .collect();
        if candidates.is_empty() {
            return Err(RepositoryError::NotFound(format!("{} has no carriers", asset)));
        }
        let chosen = match accept.filter(|a| !a.trim().is_empty()) {
            None => any_carrier(&candidates),
            Some(accept) => {
                let preferences = decode_preferences(accept, None);
                negotiate_within(&candidates, &preferences, self.settings.lenient_weight)
            }
        };
        let chosen = chosen.ok_or_else(|| {
            RepositoryError::NotAcceptable(format!(
                "no carrier of {} matches '{}'",
                asset,
                accept.unwrap_or_default()
            ))
        })?;
        debug!(asset = %asset, representation = %chosen.representation, "negotiated carrier");
        self.materialize(asset, chosen)
    }

    /// A specific carrier version, which must be registered to the asset.
    pub fn get_carrier_version(&self, asset: &AssetPointer, artifact: &AssetPointer) -> Result<KnowledgeCarrier> {
        if !self.index.get_artifacts_for_asset(asset)?.contains(artifact) {
            return Err(RepositoryError::NotFound(format!(
                "{} is not a carrier of {}",
                artifact, asset
            )));
        }
        let surrogate = self.require_surrogate(asset)?;
        let descriptor = surrogate
            .carriers
            .into_iter()
            .find(|c| c.artifact_id.as_ref() == Some(artifact))
            .unwrap_or_else(|| KnowledgeArtifact::new(artifact.clone(), Representation::any()));
        self.materialize(asset, &descriptor)
    }

    // ------------- bundles -------------

    pub fn get_bundle(
        &self,
        asset: &AssetPointer,
        rel: Option<Relationship>,
        depth: Option<usize>,
    ) -> Result<Vec<KnowledgeCarrier>> {
        Bundler::new(&*self.index, &*self.artifacts).bundle(&asset.id(), asset.version(), rel, depth)
    }

    pub fn get_surrogate_bundle(
        &self,
        asset: &AssetPointer,
        rel: Option<Relationship>,
        depth: Option<usize>,
    ) -> Result<Vec<KnowledgeAsset>> {
        let surrogates = Bundler::new(&*self.index, &*self.artifacts)
            .bundle_surrogates(&asset.id(), asset.version(), rel, depth)?;
        surrogates
            .into_iter()
            .map(|s| self.enricher().enrich(s, false))
            .collect()
    }

    // ------------- composites -------------

    pub fn get_composite_structure(&self, asset: &AssetPointer) -> Result<CompositeStructure> {
        self.require_surrogate(asset)?;
        composite_structure(&*self.index, asset)?.ok_or_else(|| {
            RepositoryError::PreconditionFailed(format!("{} is not a composite asset", asset))
        })
    }

    /// The composite's surrogate name and structure, with the surrogate of
    /// every component that can be resolved under `accept`.
    pub fn get_composite_surrogate(
        &self,
        asset: &AssetPointer,
        accept: Option<&str>,
    ) -> Result<Composite<KnowledgeAsset>> {
        let composite = self.get_surrogate(asset, accept)?;
        let structure = self.get_composite_structure(asset)?;
        let components = self.resolve_components(&structure, |c| self.get_surrogate(c, accept));
        Ok(Composite {
            name: composite.name,
            structure,
            components,
        })
    }

    /// Like [`Repository::get_composite_surrogate`], with the negotiated
    /// canonical carrier of every component.
    pub fn get_composite_carrier(
        &self,
        asset: &AssetPointer,
        accept: Option<&str>,
    ) -> Result<Composite<KnowledgeCarrier>> {
        let composite = self.require_surrogate(asset)?;
        let structure = self.get_composite_structure(asset)?;
        let components = self.resolve_components(&structure, |c| self.get_canonical_carrier(c, accept));
        Ok(Composite {
            name: composite.name,
            structure,
            components,
        })
    }

    fn resolve_components<T, F>(&self, structure: &CompositeStructure, resolve: F) -> Vec<T>
    where
        F: Fn(&AssetPointer) -> Result<T>,
    {
        structure
            .components
            .iter()
            .filter_map(|component| match resolve(component) {
                Ok(found) => Some(found),
                Err(e) => {
                    warn!(composite = %structure.composite, component = %component, error = %e, "skipping component");
                    None
                }
            })
            .collect()
    }

    // ------------- deletion -------------

    fn require_deletion(&self, what: &str) -> Result<()> {
        if self.settings.allow_clear_all {
            return Ok(());
        }
        error!(what, "refusing to delete, deletion is disabled");
        Err(RepositoryError::Forbidden(format!("deleting {} is disabled", what)))
    }

    /// Removes an asset version with its surrogate and carrier content.
    /// Succeeds when the version is not registered.
    pub fn delete_asset_version(&self, asset: &AssetPointer) -> Result<()> {
        self.require_deletion("asset versions")?;
        let mut artifacts: Vec<AssetPointer> = self.index.get_artifacts_for_asset(asset)?.into_iter().collect();
        if let Some(stored) = self.index.get_surrogate_for_asset(asset)? {
            if let Some(surrogate) = resolve_surrogate(&*self.index, &*self.artifacts, asset)? {
                artifacts.extend(
                    surrogate
                        .carriers
                        .iter()
                        .chain(surrogate.surrogates.iter())
                        .filter_map(|a| a.artifact_id.clone()),
                );
            }
            artifacts.push(stored);
        }
        self.index.unregister_asset_version(asset)?;
        let mut removed = 0;
        for artifact in &artifacts {
            if self.artifacts.remove_content(&artifact.id(), artifact.version())? {
                removed += 1;
            }
        }
        warn!(asset = %asset, artifacts = removed, "deleted asset version");
        Ok(())
    }

    /// Removes every version of a series.
    pub fn delete_asset(&self, id: &Uuid) -> Result<()> {
        self.require_deletion("assets")?;
        let versions = self.index.get_asset_versions(id)?;
        if versions.is_empty() {
            return Err(RepositoryError::NotFound(format!("no asset series {}", id)));
        }
        for version in &versions {
            self.delete_asset_version(version)?;
        }
        self.index.unregister_asset(id)
    }

    // ------------- administration -------------

    /// Wipes the index and the artifact store, when enabled by settings.
    pub fn clear_all(&self) -> Result<()> {
        if !self.settings.allow_clear_all {
            error!("refusing to clear the repository, clearing is disabled");
            return Err(RepositoryError::Forbidden(
                "clearing the repository is disabled".to_string(),
            ));
        }
        warn!("clearing the repository");
        self.index.reset()?;
        self.artifacts.clear()
    }
}
