//! Composite assets.
//!
//! A composite is an asset whose components are reached through `HasPart`
//! links. Its arrangement may also be described by a structuring asset, the
//! target of a `HasStructuringComponent` link. The structure is read off the
//! index; components are resolved by the repository.

use serde::Serialize;

use crate::construct::{AssetPointer, Relationship};
use crate::error::Result;
use crate::index::Index;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct StructureEdge {
    pub from: AssetPointer,
    pub rel: Relationship,
    pub to: AssetPointer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeStructure {
    pub composite: AssetPointer,
    pub structuring: Option<AssetPointer>,
    /// Every asset reachable through `HasPart`, the composite excluded.
    pub components: Vec<AssetPointer>,
    pub edges: Vec<StructureEdge>,
}

/// A composite together with one resolved item per component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Composite<T> {
    pub name: Option<String>,
    pub structure: CompositeStructure,
    pub components: Vec<T>,
}

/// The structure of `composite`, or `None` when it has neither components
/// nor a structuring asset.
pub fn composite_structure(index: &dyn Index, composite: &AssetPointer) -> Result<Option<CompositeStructure>> {
    let structuring = index
        .get_outbound(composite, Some(Relationship::HasStructuringComponent))?
        .into_iter()
        .min();
    let mut components: Vec<AssetPointer> = index
        .get_related_assets(composite, Some(Relationship::HasPart))?
        .into_iter()
        .filter(|c| c != composite)
        .collect();
    if components.is_empty() && structuring.is_none() {
        return Ok(None);
    }
    components.sort();

    let mut edges = Vec::new();
    for from in std::iter::once(composite).chain(components.iter()) {
        for rel in Relationship::ALL.into_iter().filter(Relationship::is_structural) {
            for to in index.get_outbound(from, Some(rel))? {
                edges.push(StructureEdge {
                    from: from.clone(),
                    rel,
                    to,
                });
            }
        }
    }
    edges.sort();
    Ok(Some(CompositeStructure {
        composite: composite.clone(),
        structuring,
        components,
        edges,
    }))
}
