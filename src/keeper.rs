use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tracing::{debug, info};
use uuid::Uuid;

use crate::construct::{
    Annotation, AssetPointer, DescriptiveMetadata, Link, Lookup, OtherHasher, Relationship,
};
use crate::error::{RepositoryError, Result, lock};
use crate::index::Index;
use crate::persist::{ClassificationKind, PersistenceMode, Persistor};

type PointerLookup<K> = Lookup<K, AssetPointer, OtherHasher>;
type EdgeLookup = Lookup<AssetPointer, (Relationship, AssetPointer), OtherHasher>;

fn is_blank(filter: Option<&str>) -> bool {
    filter.is_none_or(|f| f.trim().is_empty())
}

/// Index kept in maps-of-sets, each structure behind its own lock.
///
/// In [`PersistenceMode::File`] every structure update is written through to
/// SQLite and the whole index is restored when it is opened again.
pub struct KeeperIndex {
    assets: Mutex<HashSet<AssetPointer, OtherHasher>>,
    by_type: Mutex<PointerLookup<String>>,
    by_role: Mutex<PointerLookup<String>>,
    by_annotation: Mutex<PointerLookup<String>>,
    // predicate -> (concept, annotated asset)
    annotation_predicates: Mutex<Lookup<String, (String, AssetPointer), OtherHasher>>,
    asset_to_surrogate: Mutex<HashMap<AssetPointer, AssetPointer, OtherHasher>>,
    asset_to_artifacts: Mutex<PointerLookup<AssetPointer>>,
    locations: Mutex<HashMap<AssetPointer, String, OtherHasher>>,
    metadata: Mutex<HashMap<AssetPointer, DescriptiveMetadata, OtherHasher>>,
    latest: Mutex<HashMap<Uuid, AssetPointer, OtherHasher>>,
    versions: Mutex<PointerLookup<Uuid>>,
    outbound: Mutex<EdgeLookup>,
    inbound: Mutex<EdgeLookup>,
    // responsible for the persistence layer
    persistor: Option<Mutex<Persistor>>,
}

impl KeeperIndex {
    pub fn new(mode: PersistenceMode) -> Result<Self> {
        let persistor = match &mode {
            PersistenceMode::InMemory => None,
            PersistenceMode::File(path) => Some(Mutex::new(Persistor::open(path)?)),
        };
        let index = KeeperIndex {
            assets: Mutex::new(HashSet::default()),
            by_type: Mutex::new(Lookup::new()),
            by_role: Mutex::new(Lookup::new()),
            by_annotation: Mutex::new(Lookup::new()),
            annotation_predicates: Mutex::new(Lookup::new()),
            asset_to_surrogate: Mutex::new(HashMap::default()),
            asset_to_artifacts: Mutex::new(Lookup::new()),
            locations: Mutex::new(HashMap::default()),
            metadata: Mutex::new(HashMap::default()),
            latest: Mutex::new(HashMap::default()),
            versions: Mutex::new(Lookup::new()),
            outbound: Mutex::new(Lookup::new()),
            inbound: Mutex::new(Lookup::new()),
            persistor,
        };
        // Restore the existing index
        index.restore()?;
        Ok(index)
    }

    fn persist<F>(&self, write: F) -> Result<()>
    where
        F: FnOnce(&Persistor) -> Result<()>,
    {
        if let Some(persistor) = &self.persistor {
            let persistor = lock(persistor, "persistor")?;
            write(&persistor)?;
        }
        Ok(())
    }

    fn restore(&self) -> Result<()> {
        let Some(persistor) = &self.persistor else {
            return Ok(());
        };
        let persistor = lock(persistor, "persistor")?;
        let assets = persistor.restore_assets()?;
        let restored = assets.len();
        for asset in assets {
            lock(&self.versions, "versions")?.insert(asset.id(), asset.clone());
            lock(&self.assets, "assets")?.insert(asset);
        }
        for (asset, kind, tag) in persistor.restore_classifications()? {
            self.classify(&asset, kind, &tag)?;
        }
        for (asset, annotation) in persistor.restore_annotations()? {
            self.annotate(&asset, &annotation)?;
        }
        for (asset, surrogate) in persistor.restore_surrogates()? {
            lock(&self.asset_to_surrogate, "asset_to_surrogate")?.insert(asset, surrogate);
        }
        for (asset, artifact) in persistor.restore_artifacts()? {
            lock(&self.asset_to_artifacts, "asset_to_artifacts")?.insert(asset, artifact);
        }
        for (pointer, location) in persistor.restore_locations()? {
            lock(&self.locations, "locations")?.insert(pointer, location);
        }
        for (asset, metadata) in persistor.restore_metadata()? {
            lock(&self.metadata, "metadata")?.insert(asset, metadata);
        }
        for asset in persistor.restore_latest()? {
            lock(&self.latest, "latest")?.insert(asset.id(), asset);
        }
        for (from, rel, to) in persistor.restore_relationships()? {
            self.link(&from, rel, &to)?;
        }
        info!(assets = restored, "restored index");
        Ok(())
    }

    fn classify(&self, asset: &AssetPointer, kind: ClassificationKind, tag: &str) -> Result<()> {
        // roles double as types so that a type filter also finds them
        if kind == ClassificationKind::Role {
            lock(&self.by_role, "by_role")?.insert(tag.to_string(), asset.clone());
        }
        lock(&self.by_type, "by_type")?.insert(tag.to_string(), asset.clone());
        Ok(())
    }

    fn annotate(&self, asset: &AssetPointer, annotation: &Annotation) -> Result<()> {
        {
            let mut by_annotation = lock(&self.by_annotation, "by_annotation")?;
            for key in annotation.keys() {
                by_annotation.insert(key, asset.clone());
            }
        }
        if let Some(rel) = &annotation.rel {
            lock(&self.annotation_predicates, "annotation_predicates")?
                .insert(rel.clone(), (annotation.concept.clone(), asset.clone()));
        }
        Ok(())
    }

    fn link(&self, from: &AssetPointer, rel: Relationship, to: &AssetPointer) -> Result<()> {
        lock(&self.outbound, "outbound")?.insert(from.clone(), (rel, to.clone()));
        lock(&self.inbound, "inbound")?.insert(to.clone(), (rel, from.clone()));
        Ok(())
    }
}

impl Index for KeeperIndex {
    fn register_asset(
        &self,
        asset: &AssetPointer,
        surrogate: &AssetPointer,
        types: &[String],
        roles: &[String],
        annotations: &[Annotation],
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        lock(&self.assets, "assets")?.insert(asset.clone());
        // a version already known to the series does not move the latest pointer
        let fresh = lock(&self.versions, "versions")?.insert(asset.id(), asset.clone());
        self.persist(|p| p.persist_asset(asset))?;

        for asset_type in types {
            self.classify(asset, ClassificationKind::Type, asset_type)?;
            self.persist(|p| p.persist_classification(asset, ClassificationKind::Type, asset_type))?;
        }
        for role in roles {
            self.classify(asset, ClassificationKind::Role, role)?;
            self.persist(|p| p.persist_classification(asset, ClassificationKind::Role, role))?;
        }
        for annotation in annotations {
            self.annotate(asset, annotation)?;
            self.persist(|p| p.persist_annotation(asset, annotation))?;
        }

        if fresh {
            lock(&self.latest, "latest")?.insert(asset.id(), asset.clone());
            self.persist(|p| p.persist_latest(asset))?;
        }

        self.register_surrogate_to_asset(asset, surrogate)?;

        let metadata = DescriptiveMetadata {
            name: name.map(str::to_string),
            description: description.map(str::to_string),
            primary_type: types.first().cloned(),
        };
        self.persist(|p| p.persist_metadata(asset, &metadata))?;
        lock(&self.metadata, "metadata")?.insert(asset.clone(), metadata);

        info!(asset = %asset, types = types.len(), annotations = annotations.len(), "registered asset");
        Ok(())
    }

    fn register_artifact_to_asset(&self, asset: &AssetPointer, artifact: &AssetPointer) -> Result<()> {
        lock(&self.asset_to_artifacts, "asset_to_artifacts")?.insert(asset.clone(), artifact.clone());
        self.persist(|p| p.persist_artifact(asset, artifact))
    }

    fn register_surrogate_to_asset(&self, asset: &AssetPointer, surrogate: &AssetPointer) -> Result<()> {
        lock(&self.asset_to_surrogate, "asset_to_surrogate")?.insert(asset.clone(), surrogate.clone());
        self.persist(|p| p.persist_surrogate(asset, surrogate))
    }

    fn get_surrogate_for_asset(&self, asset: &AssetPointer) -> Result<Option<AssetPointer>> {
        Ok(lock(&self.asset_to_surrogate, "asset_to_surrogate")?.get(asset).cloned())
    }

    fn register_location(&self, pointer: &AssetPointer, href: &str) -> Result<()> {
        lock(&self.locations, "locations")?.insert(pointer.clone(), href.to_string());
        self.persist(|p| p.persist_location(pointer, href))
    }

    fn get_location(&self, pointer: &AssetPointer) -> Result<String> {
        lock(&self.locations, "locations")?
            .get(pointer)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("no location for {}", pointer)))
    }

    fn get_asset_ids_by_type(&self, asset_type: Option<&str>) -> Result<HashSet<AssetPointer>> {
        match asset_type {
            Some(t) if !is_blank(asset_type) => {
                Ok(lock(&self.by_type, "by_type")?.values_of(&t.to_string()))
            }
            _ => self.get_all_asset_ids(),
        }
    }

    fn get_asset_ids_by_role(&self, role: Option<&str>) -> Result<HashSet<AssetPointer>> {
        match role {
            Some(r) if !is_blank(role) => Ok(lock(&self.by_role, "by_role")?.values_of(&r.to_string())),
            _ => self.get_all_asset_ids(),
        }
    }

    fn get_asset_ids_by_annotation(&self, annotation: Option<&str>) -> Result<HashSet<AssetPointer>> {
        match annotation {
            Some(a) if !is_blank(annotation) => {
                Ok(lock(&self.by_annotation, "by_annotation")?.values_of(&a.to_string()))
            }
            _ => self.get_all_asset_ids(),
        }
    }

    fn get_annotations_of_type(&self, predicate: &str) -> Result<HashSet<String>> {
        Ok(lock(&self.annotation_predicates, "annotation_predicates")?
            .values_of(&predicate.to_string())
            .into_iter()
            .map(|(concept, _)| concept)
            .collect())
    }

    fn get_all_asset_ids(&self) -> Result<HashSet<AssetPointer>> {
        Ok(lock(&self.assets, "assets")?.iter().cloned().collect())
    }

    fn get_artifacts_for_asset(&self, asset: &AssetPointer) -> Result<HashSet<AssetPointer>> {
        Ok(lock(&self.asset_to_artifacts, "asset_to_artifacts")?.values_of(asset))
    }

    fn get_latest_asset_for_id(&self, id: &Uuid) -> Result<Option<AssetPointer>> {
        Ok(lock(&self.latest, "latest")?.get(id).cloned())
    }

    fn get_asset_versions(&self, id: &Uuid) -> Result<HashSet<AssetPointer>> {
        Ok(lock(&self.versions, "versions")?.values_of(id))
    }

    fn get_descriptive_metadata(&self, asset: &AssetPointer) -> Result<Option<DescriptiveMetadata>> {
        Ok(lock(&self.metadata, "metadata")?.get(asset).cloned())
    }

    fn register_relationship(
        &self,
        from: &AssetPointer,
        rel: Relationship,
        to: &AssetPointer,
    ) -> Result<()> {
        self.link(from, rel, to)?;
        debug!(from = %from, rel = %rel, to = %to, "registered relationship");
        self.persist(|p| p.persist_relationship(from, rel, to))
    }

    fn get_outbound(&self, from: &AssetPointer, rel: Option<Relationship>) -> Result<HashSet<AssetPointer>> {
        let outbound = lock(&self.outbound, "outbound")?;
        Ok(outbound
            .lookup(from)
            .map(|edges| {
                edges
                    .iter()
                    .filter(|(r, _)| rel.is_none_or(|wanted| wanted == *r))
                    .map(|(_, to)| to.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_neighbour_assets(&self, asset: &AssetPointer) -> Result<Vec<Link>> {
        let mut links: Vec<Link> = lock(&self.outbound, "outbound")?
            .values_of(asset)
            .into_iter()
            .map(|(rel, to)| Link::outbound(rel, to))
            .collect();
        links.extend(
            lock(&self.inbound, "inbound")?
                .values_of(asset)
                .into_iter()
                .map(|(rel, from)| Link::inbound(rel, from)),
        );
        links.sort();
        Ok(links)
    }

    fn unregister_asset_version(&self, asset: &AssetPointer) -> Result<()> {
        if !lock(&self.assets, "assets")?.remove(asset) {
            return Ok(());
        }
        let others = |_: &String, a: &AssetPointer| a != asset;
        lock(&self.by_type, "by_type")?.retain(others);
        lock(&self.by_role, "by_role")?.retain(others);
        lock(&self.by_annotation, "by_annotation")?.retain(others);
        lock(&self.annotation_predicates, "annotation_predicates")?.retain(|_, (_, a)| a != asset);
        lock(&self.asset_to_surrogate, "asset_to_surrogate")?.remove(asset);
        lock(&self.asset_to_artifacts, "asset_to_artifacts")?.remove_key(asset);
        lock(&self.locations, "locations")?.remove(asset);
        lock(&self.metadata, "metadata")?.remove(asset);
        {
            let edges = lock(&self.outbound, "outbound")?.remove_key(asset);
            let mut inbound = lock(&self.inbound, "inbound")?;
            for (rel, to) in edges {
                inbound.remove(&to, &(rel, asset.clone()));
            }
        }
        let remaining = {
            let mut versions = lock(&self.versions, "versions")?;
            versions.remove(&asset.id(), asset);
            versions.values_of(&asset.id())
        };
        self.persist(|p| p.forget_asset_version(asset))?;
        let mut latest = lock(&self.latest, "latest")?;
        if latest.get(&asset.id()) == Some(asset) {
            match remaining.into_iter().max() {
                Some(successor) => {
                    self.persist(|p| p.persist_latest(&successor))?;
                    latest.insert(asset.id(), successor);
                }
                None => {
                    latest.remove(&asset.id());
                }
            }
        }
        info!(asset = %asset, "unregistered asset version");
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        lock(&self.assets, "assets")?.clear();
        lock(&self.by_type, "by_type")?.clear();
        lock(&self.by_role, "by_role")?.clear();
        lock(&self.by_annotation, "by_annotation")?.clear();
        lock(&self.annotation_predicates, "annotation_predicates")?.clear();
        lock(&self.asset_to_surrogate, "asset_to_surrogate")?.clear();
        lock(&self.asset_to_artifacts, "asset_to_artifacts")?.clear();
        lock(&self.locations, "locations")?.clear();
        lock(&self.metadata, "metadata")?.clear();
        lock(&self.latest, "latest")?.clear();
        lock(&self.versions, "versions")?.clear();
        lock(&self.outbound, "outbound")?.clear();
        lock(&self.inbound, "inbound")?.clear();
        self.persist(|p| p.clear())?;
        info!("index reset");
        Ok(())
    }
}
