//! The asset index contract shared by every backend.

use std::collections::{HashSet, VecDeque};

use uuid::Uuid;

use crate::construct::{
    Annotation, AssetPointer, DescriptiveMetadata, KnowledgeAsset, Link, Relationship,
};
use crate::error::Result;

/// Registry of asset pointers, their surrogates and classifications, and the
/// relationship graph between them.
///
/// Listing queries never fail on absent keys, they return empty sets. A
/// blank or missing filter matches every registered asset. Lookups of a
/// specific pointer either resolve or report `NotFound`.
pub trait Index: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    fn register_asset(
        &self,
        asset: &AssetPointer,
        surrogate: &AssetPointer,
        types: &[String],
        roles: &[String],
        annotations: &[Annotation],
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<()>;

    fn register_artifact_to_asset(&self, asset: &AssetPointer, artifact: &AssetPointer) -> Result<()>;
    fn register_surrogate_to_asset(&self, asset: &AssetPointer, surrogate: &AssetPointer) -> Result<()>;
    fn get_surrogate_for_asset(&self, asset: &AssetPointer) -> Result<Option<AssetPointer>>;

    fn register_location(&self, pointer: &AssetPointer, href: &str) -> Result<()>;
    fn get_location(&self, pointer: &AssetPointer) -> Result<String>;

    fn get_asset_ids_by_type(&self, asset_type: Option<&str>) -> Result<HashSet<AssetPointer>>;
    fn get_asset_ids_by_role(&self, role: Option<&str>) -> Result<HashSet<AssetPointer>>;
    fn get_asset_ids_by_annotation(&self, annotation: Option<&str>) -> Result<HashSet<AssetPointer>>;
    fn get_annotations_of_type(&self, predicate: &str) -> Result<HashSet<String>>;
    fn get_all_asset_ids(&self) -> Result<HashSet<AssetPointer>>;
    fn get_artifacts_for_asset(&self, asset: &AssetPointer) -> Result<HashSet<AssetPointer>>;

    fn get_latest_asset_for_id(&self, id: &Uuid) -> Result<Option<AssetPointer>>;
    fn get_asset_versions(&self, id: &Uuid) -> Result<HashSet<AssetPointer>>;
    fn get_descriptive_metadata(&self, asset: &AssetPointer) -> Result<Option<DescriptiveMetadata>>;

    fn register_relationship(
        &self,
        from: &AssetPointer,
        rel: Relationship,
        to: &AssetPointer,
    ) -> Result<()>;

    /// Direct successors along `rel`, or along every relationship when `rel`
    /// is `None`.
    fn get_outbound(&self, from: &AssetPointer, rel: Option<Relationship>) -> Result<HashSet<AssetPointer>>;

    /// One hop links in both directions.
    fn get_neighbour_assets(&self, asset: &AssetPointer) -> Result<Vec<Link>>;

    /// Forgets what this version asserted about itself: classification,
    /// annotations, surrogate, carriers, location, metadata and its outbound
    /// relationships. Links other assets hold towards it are theirs and
    /// stay. When it was the latest of its series, the remaining version with
    /// the greatest tag takes over. Unknown versions are ignored.
    fn unregister_asset_version(&self, asset: &AssetPointer) -> Result<()>;

    /// Forgets every version of a series, and the series itself.
    fn unregister_asset(&self, id: &Uuid) -> Result<()> {
        for version in self.get_asset_versions(id)? {
            self.unregister_asset_version(&version)?;
        }
        Ok(())
    }

    fn reset(&self) -> Result<()>;

    /// The transitive closure from `root`, root included, bounded to `depth`
    /// hops when given.
    fn get_related_assets_bounded(
        &self,
        root: &AssetPointer,
        rel: Option<Relationship>,
        depth: Option<usize>,
    ) -> Result<HashSet<AssetPointer>> {
        closure(root, depth, |p| self.get_outbound(p, rel))
    }

    fn get_related_assets(
        &self,
        root: &AssetPointer,
        rel: Option<Relationship>,
    ) -> Result<HashSet<AssetPointer>> {
        self.get_related_assets_bounded(root, rel, None)
    }

    /// Indexes a whole surrogate: classification, annotations, carriers and
    /// links. An authored inbound link is the reversed edge from its target.
    fn index_surrogate(&self, asset: &KnowledgeAsset, surrogate: &AssetPointer) -> Result<()> {
        let pointer = &asset.asset_id;
        self.register_asset(
            pointer,
            surrogate,
            &asset.formal_types,
            &asset.roles,
            &asset.annotations,
            asset.name.as_deref(),
            asset.description.as_deref(),
        )?;
        for artifact in asset.carriers.iter().filter_map(|c| c.artifact_id.as_ref()) {
            self.register_artifact_to_asset(pointer, artifact)?;
        }
        for link in asset.outbound_links() {
            self.register_relationship(pointer, link.rel, &link.href)?;
        }
        for link in asset.inbound_links() {
            self.register_relationship(&link.href, link.rel, pointer)?;
        }
        Ok(())
    }
}

/// Iterative breadth first walk with a visited set, so cycles terminate.
pub fn closure<F>(root: &AssetPointer, depth: Option<usize>, mut successors: F) -> Result<HashSet<AssetPointer>>
where
    F: FnMut(&AssetPointer) -> Result<HashSet<AssetPointer>>,
{
    let mut visited = HashSet::new();
    let mut frontier = VecDeque::new();
    visited.insert(root.clone());
    frontier.push_back((root.clone(), 0usize));
    while let Some((current, hops)) = frontier.pop_front() {
        if depth.is_some_and(|limit| hops >= limit) {
            continue;
        }
        for next in successors(&current)? {
            if visited.insert(next.clone()) {
                frontier.push_back((next, hops + 1));
            }
        }
    }
    Ok(visited)
}
