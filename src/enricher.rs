//! Surrogate enrichment.
//!
//! Before a surrogate is handed to a client it is augmented with
//! information the stored document does not carry: content locators for
//! its carriers and alternate surrogates, the full set of relationship
//! links known to the index (inbound ones included), and ephemeral
//! descriptors for every representation a transcoder could produce on
//! demand.

use tracing::debug;
use uuid::Uuid;

use crate::construct::{AssetPointer, KnowledgeArtifact, KnowledgeAsset, Link, Relationship, Representation};
use crate::error::{RepositoryError, Result};
use crate::index::Index;

const EPHEMERAL_DESCRIPTION: &str = "(Ephemeral)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HrefKind {
    AssetCarrierVersionContent,
    AssetSurrogateVersionContent,
    EphemeralCarrier,
    EphemeralSurrogate,
}

/// Computes where the content of an artifact can be fetched from.
pub trait LocatorBuilder: Send + Sync {
    fn content_href(
        &self,
        asset: &AssetPointer,
        artifact: Option<&AssetPointer>,
        representation: &Representation,
        kind: HrefKind,
    ) -> String;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslationOperator {
    pub from: Vec<Representation>,
    pub into: Vec<Representation>,
}
impl TranslationOperator {
    pub fn new(from: Vec<Representation>, into: Vec<Representation>) -> Self {
        Self { from, into }
    }
    pub fn accepts(&self, representation: &Representation) -> bool {
        self.from.iter().any(|f| f.is_broader_or_equal(representation))
    }
    // the most specific target: encoding, then charset, format, language
    pub fn canonical_target(&self) -> Representation {
        let by = |has: fn(&Representation) -> bool| self.into.iter().find(|r| has(r));
        by(|r| r.encoding.is_some())
            .or_else(|| by(|r| r.charset.is_some()))
            .or_else(|| by(|r| r.format.is_some()))
            .or_else(|| by(|r| r.language.is_some()))
            .or_else(|| self.into.first())
            .cloned()
            .unwrap_or_default()
    }
}

/// Knows which representation translations are available.
pub trait Transcoder: Send + Sync {
    fn list_operators(&self, source_code: &str) -> Vec<TranslationOperator>;
}

pub fn ephemeral_artifact_id(asset: &AssetPointer, language: Option<&str>) -> AssetPointer {
    let name = format!("carrier:{}", language.unwrap_or_default());
    AssetPointer::new(Uuid::new_v5(&asset.id(), name.as_bytes()), asset.version())
}

pub fn ephemeral_surrogate_id(asset: &AssetPointer, language: Option<&str>) -> AssetPointer {
    let name = format!("surrogate:{}", language.unwrap_or_default());
    AssetPointer::new(Uuid::new_v5(&asset.id(), name.as_bytes()), asset.version())
}

// an ephemeral is pointless when a concrete artifact already covers it
fn superseded(ephemeral: &KnowledgeArtifact, concretes: &[KnowledgeArtifact]) -> bool {
    concretes.iter().any(|c| {
        (ephemeral.locator.is_some() && c.locator == ephemeral.locator)
            || c.representation.is_broader_or_equal(&ephemeral.representation)
    })
}

pub struct SurrogateEnricher<'a> {
    locators: Option<&'a dyn LocatorBuilder>,
    transcoder: Option<&'a dyn Transcoder>,
    index: Option<&'a dyn Index>,
    canonical: Representation,
}

impl<'a> SurrogateEnricher<'a> {
    /// `canonical` is the representation surrogates are stored in.
    pub fn new(canonical: Representation) -> Self {
        Self {
            locators: None,
            transcoder: None,
            index: None,
            canonical,
        }
    }
    pub fn with_locators(mut self, locators: Option<&'a dyn LocatorBuilder>) -> Self {
        self.locators = locators;
        self
    }
    pub fn with_transcoder(mut self, transcoder: Option<&'a dyn Transcoder>) -> Self {
        self.transcoder = transcoder;
        self
    }
    pub fn with_index(mut self, index: Option<&'a dyn Index>) -> Self {
        self.index = index;
        self
    }

    fn is_canonical_form(&self, representation: &Representation) -> bool {
        self.canonical
            .language
            .as_deref()
            .is_some_and(|l| representation.has_language(l))
    }

    pub fn enrich(&self, mut asset: KnowledgeAsset, with_inverses: bool) -> Result<KnowledgeAsset> {
        if let Some(locators) = self.locators {
            self.add_default_locators(&mut asset, locators);
        }
        if with_inverses {
            if let Some(index) = self.index {
                Self::rewrite_links(&mut asset, index)?;
            }
        }
        if let Some(transcoder) = self.transcoder {
            self.add_ephemeral_translations(&mut asset, transcoder);
        }
        Ok(asset)
    }

    fn add_default_locators(&self, asset: &mut KnowledgeAsset, locators: &dyn LocatorBuilder) {
        let pointer = asset.asset_id.clone();
        for carrier in asset.carriers.iter_mut().filter(|c| c.locator.is_none()) {
            carrier.locator = Some(locators.content_href(
                &pointer,
                carrier.artifact_id.as_ref(),
                &carrier.representation,
                HrefKind::AssetCarrierVersionContent,
            ));
        }
        // the canonical surrogate is the document itself
        for surrogate in asset.surrogates.iter_mut().filter(|s| s.locator.is_none()) {
            if self.is_canonical_form(&surrogate.representation) {
                continue;
            }
            surrogate.locator = Some(locators.content_href(
                &pointer,
                surrogate.artifact_id.as_ref(),
                &surrogate.representation,
                HrefKind::AssetSurrogateVersionContent,
            ));
        }
    }

    fn rewrite_links(asset: &mut KnowledgeAsset, index: &dyn Index) -> Result<()> {
        let full = index.get_neighbour_assets(&asset.asset_id)?;
        if let Some(missing) = asset.links.iter().find(|old| !full.contains(old)) {
            return Err(RepositoryError::Invariant(format!(
                "authored link {} {} of {} is missing from the index",
                missing.rel, missing.href, asset.asset_id
            )));
        }
        asset.links = full;
        Ok(())
    }

    fn add_ephemeral_translations(&self, asset: &mut KnowledgeAsset, transcoder: &dyn Transcoder) {
        let surrogates = self.ephemerals(asset, &asset.surrogates, transcoder, HrefKind::EphemeralSurrogate);
        let carriers = self.ephemerals(asset, &asset.carriers, transcoder, HrefKind::EphemeralCarrier);
        debug!(
            asset = %asset.asset_id,
            carriers = carriers.len(),
            surrogates = surrogates.len(),
            "added ephemeral representations"
        );
        asset.surrogates.extend(surrogates);
        asset.carriers.extend(carriers);
    }

    fn ephemerals(
        &self,
        asset: &KnowledgeAsset,
        concretes: &[KnowledgeArtifact],
        transcoder: &dyn Transcoder,
        kind: HrefKind,
    ) -> Vec<KnowledgeArtifact> {
        let mut found: Vec<KnowledgeArtifact> = Vec::new();
        for source in concretes {
            let operators = transcoder
                .list_operators(&source.representation.to_string())
                .into_iter()
                .filter(|op| !op.into.iter().any(|r| self.is_canonical_form(r)))
                .filter(|op| op.accepts(&source.representation));
            for operator in operators {
                let target = operator.canonical_target();
                let ephemeral = self.ephemeral(asset, source, target, kind);
                if superseded(&ephemeral, concretes)
                    || found.iter().any(|f| f.artifact_id == ephemeral.artifact_id)
                {
                    continue;
                }
                found.push(ephemeral);
            }
        }
        found
    }

    fn ephemeral(
        &self,
        asset: &KnowledgeAsset,
        source: &KnowledgeArtifact,
        target: Representation,
        kind: HrefKind,
    ) -> KnowledgeArtifact {
        let language = target.language.as_deref();
        let artifact_id = match kind {
            HrefKind::EphemeralSurrogate => ephemeral_surrogate_id(&asset.asset_id, language),
            _ => ephemeral_artifact_id(&asset.asset_id, language),
        };
        let locator = self.locators.map(|l| {
            l.content_href(&asset.asset_id, source.artifact_id.as_ref(), &target, kind)
        });
        KnowledgeArtifact {
            artifact_id: Some(artifact_id),
            name: source.name.clone(),
            description: Some(EPHEMERAL_DESCRIPTION.to_string()),
            representation: target,
            locator,
            ephemeral: true,
            links: source
                .artifact_id
                .iter()
                .map(|src| Link::outbound(Relationship::IsTranscreationOf, src.clone()))
                .collect(),
        }
    }
}
