//! Triple-store backed index.
//!
//! Every fact about an asset is a `(subject, predicate, object)` triple over
//! interned terms. Assets are named by their pointer urn, series by
//! `urn:series:<uuid>`, and relationships use the `kars:` vocabulary below.
//! Annotation predicates are kept under `annot:` so a client predicate can
//! never shadow one of ours.
//! Adjacency is kept in roaring bitmaps so the closure query is a plain
//! reachability walk over term ids.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use bimap::BiMap;
use roaring::RoaringTreemap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::construct::{
    Annotation, AssetPointer, DescriptiveMetadata, Link, OtherHasher, Relationship,
};
use crate::error::{RepositoryError, Result, lock};
use crate::index::Index;

pub type Term = u64;

pub const RDF_TYPE: &str = "rdf:type";
pub const RDFS_LABEL: &str = "rdfs:label";
pub const DESCRIPTION: &str = "dc:description";
pub const ACCESS_URL: &str = "dcat:accessURL";
pub const ASSET_CLASS: &str = "kars:KnowledgeAsset";
pub const ANNOTATED_WITH: &str = "kars:annotatedWith";
// annotation predicates live apart from the store's own vocabulary
pub const ANNOTATION_NAMESPACE: &str = "annot:";
pub const HAS_ROLE: &str = "kars:hasRole";
pub const HAS_SURROGATE: &str = "kars:hasCanonicalSurrogate";
pub const IS_CARRIED_BY: &str = "kars:isCarriedBy";
pub const PRIMARY_TYPE: &str = "kars:primaryType";
pub const HAS_VERSION: &str = "kars:hasVersion";
pub const HAS_LATEST_VERSION: &str = "kars:hasLatestVersion";

pub fn relationship_predicate(rel: Relationship) -> String {
    format!("kars:{}", rel.as_str())
}

fn series_term(id: &Uuid) -> String {
    format!("urn:series:{}", id)
}

pub fn annotation_predicate(rel: &str) -> String {
    format!("{}{}", ANNOTATION_NAMESPACE, rel)
}

// ------------- TripleStore -------------
#[derive(Debug, Default)]
pub struct TripleStore {
    terms: BiMap<String, Term>,
    next_term: Term,
    spo: HashMap<(Term, Term), RoaringTreemap, OtherHasher>,
    pos: HashMap<(Term, Term), RoaringTreemap, OtherHasher>,
    subject_predicates: HashMap<Term, RoaringTreemap, OtherHasher>,
    predicate_subjects: HashMap<Term, RoaringTreemap, OtherHasher>,
    object_predicates: HashMap<Term, RoaringTreemap, OtherHasher>,
    length: usize,
}

impl TripleStore {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn intern(&mut self, term: &str) -> Term {
        if let Some(t) = self.terms.get_by_left(term) {
            return *t;
        }
        let t = self.next_term;
        self.next_term += 1;
        self.terms.insert(term.to_string(), t);
        t
    }
    pub fn term(&self, term: &str) -> Option<Term> {
        self.terms.get_by_left(term).copied()
    }
    pub fn resolve(&self, term: Term) -> Option<&str> {
        self.terms.get_by_right(&term).map(String::as_str)
    }
    pub fn len(&self) -> usize {
        self.length
    }
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns true if the triple was not already present.
    pub fn insert(&mut self, subject: &str, predicate: &str, object: &str) -> bool {
        let (s, p, o) = (self.intern(subject), self.intern(predicate), self.intern(object));
        if !self.spo.entry((s, p)).or_default().insert(o) {
            return false;
        }
        self.pos.entry((p, o)).or_default().insert(s);
        self.subject_predicates.entry(s).or_default().insert(p);
        self.predicate_subjects.entry(p).or_default().insert(s);
        self.object_predicates.entry(o).or_default().insert(p);
        self.length += 1;
        true
    }

    fn remove_terms(&mut self, s: Term, p: Term, o: Term) -> bool {
        let Some(objects) = self.spo.get_mut(&(s, p)) else {
            return false;
        };
        if !objects.remove(o) {
            return false;
        }
        if objects.is_empty() {
            self.spo.remove(&(s, p));
            if let Some(predicates) = self.subject_predicates.get_mut(&s) {
                predicates.remove(p);
            }
            if let Some(subjects) = self.predicate_subjects.get_mut(&p) {
                subjects.remove(s);
            }
        }
        if let Some(subjects) = self.pos.get_mut(&(p, o)) {
            subjects.remove(s);
            if subjects.is_empty() {
                self.pos.remove(&(p, o));
                if let Some(predicates) = self.object_predicates.get_mut(&o) {
                    predicates.remove(p);
                }
            }
        }
        self.length -= 1;
        true
    }

    /// Removes every triple matching the pattern, returning how many went.
    pub fn remove_matching(
        &mut self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
    ) -> usize {
        let matches = self.matching_terms(subject, predicate, object);
        matches
            .into_iter()
            .filter(|(s, p, o)| self.remove_terms(*s, *p, *o))
            .count()
    }

    fn objects_of(&self, s: Term, p: Term) -> impl Iterator<Item = Term> + '_ {
        self.spo.get(&(s, p)).into_iter().flat_map(|o| o.iter())
    }

    fn matching_terms(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
    ) -> Vec<(Term, Term, Term)> {
        // a bound term that was never interned cannot match anything
        let bind = |term: Option<&str>| match term {
            Some(t) => self.term(t).map(Some),
            None => Some(None),
        };
        let (Some(s), Some(p), Some(o)) = (bind(subject), bind(predicate), bind(object)) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        match (s, p, o) {
            (Some(s), Some(p), _) => {
                found.extend(self.objects_of(s, p).map(|obj| (s, p, obj)));
            }
            (Some(s), None, _) => {
                if let Some(predicates) = self.subject_predicates.get(&s) {
                    for p in predicates.iter() {
                        found.extend(self.objects_of(s, p).map(|obj| (s, p, obj)));
                    }
                }
            }
            (None, Some(p), Some(o)) => {
                if let Some(subjects) = self.pos.get(&(p, o)) {
                    found.extend(subjects.iter().map(|subj| (subj, p, o)));
                }
            }
            (None, Some(p), None) => {
                if let Some(subjects) = self.predicate_subjects.get(&p) {
                    for s in subjects.iter() {
                        found.extend(self.objects_of(s, p).map(|obj| (s, p, obj)));
                    }
                }
            }
            (None, None, Some(o)) => {
                if let Some(predicates) = self.object_predicates.get(&o) {
                    for p in predicates.iter() {
                        if let Some(subjects) = self.pos.get(&(p, o)) {
                            found.extend(subjects.iter().map(|subj| (subj, p, o)));
                        }
                    }
                }
            }
            (None, None, None) => {
                for ((s, p), objects) in &self.spo {
                    found.extend(objects.iter().map(|obj| (*s, *p, obj)));
                }
            }
        }
        if let Some(o) = o {
            found.retain(|(_, _, obj)| *obj == o);
        }
        found
    }

    /// Every triple matching the pattern, with unbound positions as wildcards.
    pub fn matching(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
    ) -> Vec<(String, String, String)> {
        self.matching_terms(subject, predicate, object)
            .into_iter()
            .filter_map(|(s, p, o)| {
                Some((
                    self.resolve(s)?.to_string(),
                    self.resolve(p)?.to_string(),
                    self.resolve(o)?.to_string(),
                ))
            })
            .collect()
    }

    pub fn subjects(&self, predicate: &str, object: &str) -> Vec<String> {
        self.matching(None, Some(predicate), Some(object))
            .into_iter()
            .map(|(s, _, _)| s)
            .collect()
    }

    pub fn objects(&self, subject: &str, predicate: &str) -> Vec<String> {
        self.matching(Some(subject), Some(predicate), None)
            .into_iter()
            .map(|(_, _, o)| o)
            .collect()
    }

    pub fn contains(&self, subject: &str, predicate: &str, object: &str) -> bool {
        match (self.term(subject), self.term(predicate), self.term(object)) {
            (Some(s), Some(p), Some(o)) => self.spo.get(&(s, p)).is_some_and(|objs| objs.contains(o)),
            _ => false,
        }
    }

    /// Terms reachable from `start` along any of `predicates`, `start`
    /// included, within `depth` hops when given.
    pub fn reachable(&self, start: &str, predicates: &[String], depth: Option<usize>) -> Vec<String> {
        let Some(root) = self.term(start) else {
            return vec![start.to_string()];
        };
        let predicates: Vec<Term> = predicates.iter().filter_map(|p| self.term(p)).collect();
        let mut visited = RoaringTreemap::new();
        let mut frontier = VecDeque::new();
        visited.insert(root);
        frontier.push_back((root, 0usize));
        while let Some((current, hops)) = frontier.pop_front() {
            if depth.is_some_and(|limit| hops >= limit) {
                continue;
            }
            for p in &predicates {
                for next in self.objects_of(current, *p) {
                    if visited.insert(next) {
                        frontier.push_back((next, hops + 1));
                    }
                }
            }
        }
        visited
            .iter()
            .filter_map(|t| self.resolve(t).map(str::to_string))
            .collect()
    }

    pub fn clear(&mut self) {
        *self = TripleStore::default();
    }
}

// ------------- TripleIndex -------------
/// Index over a [`TripleStore`]; a single lock makes each registration atomic.
pub struct TripleIndex {
    store: Mutex<TripleStore>,
}

impl Default for TripleIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn pointers<I: IntoIterator<Item = String>>(terms: I) -> HashSet<AssetPointer> {
    terms
        .into_iter()
        .filter_map(|t| AssetPointer::from_urn(&t).ok())
        .collect()
}

fn relationship_predicates(rel: Option<Relationship>) -> Vec<String> {
    match rel {
        Some(rel) => vec![relationship_predicate(rel)],
        None => Relationship::ALL.iter().map(|r| relationship_predicate(*r)).collect(),
    }
}

impl TripleIndex {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(TripleStore::new()),
        }
    }

    fn store(&self) -> Result<std::sync::MutexGuard<'_, TripleStore>> {
        lock(&self.store, "triple store")
    }

    fn is_annotation_predicate(predicate: &str) -> bool {
        predicate == ANNOTATED_WITH || predicate.starts_with(ANNOTATION_NAMESPACE)
    }

    fn replace(store: &mut TripleStore, subject: &str, predicate: &str, object: Option<&str>) {
        store.remove_matching(Some(subject), Some(predicate), None);
        if let Some(object) = object {
            store.insert(subject, predicate, object);
        }
    }

    fn single_object(store: &TripleStore, subject: &str, predicate: &str) -> Option<String> {
        store.objects(subject, predicate).into_iter().next()
    }
}

impl Index for TripleIndex {
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
        let node = asset.to_urn();
        let series = series_term(&asset.id());
        let mut store = self.store()?;
        store.insert(&node, RDF_TYPE, ASSET_CLASS);
        let fresh = store.insert(&series, HAS_VERSION, &node);
        for asset_type in types {
            store.insert(&node, RDF_TYPE, asset_type);
        }
        for role in roles {
            store.insert(&node, HAS_ROLE, role);
            store.insert(&node, RDF_TYPE, role);
        }
        for annotation in annotations {
            match &annotation.rel {
                Some(rel) => {
                    store.insert(&node, &annotation_predicate(rel), &annotation.concept);
                }
                None => {
                    store.insert(&node, ANNOTATED_WITH, &annotation.concept);
                }
            }
        }
        if fresh {
            Self::replace(&mut store, &series, HAS_LATEST_VERSION, Some(&node));
        }
        Self::replace(&mut store, &node, HAS_SURROGATE, Some(&surrogate.to_urn()));
        Self::replace(&mut store, &node, RDFS_LABEL, name);
        Self::replace(&mut store, &node, DESCRIPTION, description);
        Self::replace(&mut store, &node, PRIMARY_TYPE, types.first().map(String::as_str));
        info!(asset = %asset, triples = store.len(), "registered asset");
        Ok(())
    }

    fn register_artifact_to_asset(&self, asset: &AssetPointer, artifact: &AssetPointer) -> Result<()> {
        self.store()?.insert(&asset.to_urn(), IS_CARRIED_BY, &artifact.to_urn());
        Ok(())
    }

    fn register_surrogate_to_asset(&self, asset: &AssetPointer, surrogate: &AssetPointer) -> Result<()> {
        let mut store = self.store()?;
        Self::replace(&mut store, &asset.to_urn(), HAS_SURROGATE, Some(&surrogate.to_urn()));
        Ok(())
    }

    fn get_surrogate_for_asset(&self, asset: &AssetPointer) -> Result<Option<AssetPointer>> {
        let store = self.store()?;
        Ok(Self::single_object(&store, &asset.to_urn(), HAS_SURROGATE)
            .and_then(|t| AssetPointer::from_urn(&t).ok()))
    }

    fn register_location(&self, pointer: &AssetPointer, href: &str) -> Result<()> {
        let mut store = self.store()?;
        Self::replace(&mut store, &pointer.to_urn(), ACCESS_URL, Some(href));
        Ok(())
    }

    fn get_location(&self, pointer: &AssetPointer) -> Result<String> {
        let store = self.store()?;
        Self::single_object(&store, &pointer.to_urn(), ACCESS_URL)
            .ok_or_else(|| RepositoryError::NotFound(format!("no location for {}", pointer)))
    }

    fn get_asset_ids_by_type(&self, asset_type: Option<&str>) -> Result<HashSet<AssetPointer>> {
        let class = match asset_type {
            Some(t) if !t.trim().is_empty() => t,
            _ => ASSET_CLASS,
        };
        Ok(pointers(self.store()?.subjects(RDF_TYPE, class)))
    }

    fn get_asset_ids_by_role(&self, role: Option<&str>) -> Result<HashSet<AssetPointer>> {
        match role {
            Some(r) if !r.trim().is_empty() => Ok(pointers(self.store()?.subjects(HAS_ROLE, r))),
            _ => self.get_all_asset_ids(),
        }
    }

    fn get_asset_ids_by_annotation(&self, annotation: Option<&str>) -> Result<HashSet<AssetPointer>> {
        let key = match annotation {
            Some(a) if !a.trim().is_empty() => a,
            _ => return self.get_all_asset_ids(),
        };
        let store = self.store()?;
        // the bare concept under any annotation predicate
        let mut found: HashSet<AssetPointer> = pointers(
            store
                .matching(None, None, Some(key))
                .into_iter()
                .filter(|(_, p, _)| Self::is_annotation_predicate(p))
                .map(|(s, _, _)| s),
        );
        // and every predicate:concept reading of the key
        for (idx, _) in key.match_indices(':') {
            let (predicate, concept) = (&key[..idx], &key[idx + 1..]);
            found.extend(pointers(store.subjects(&annotation_predicate(predicate), concept)));
        }
        Ok(found)
    }

    fn get_annotations_of_type(&self, predicate: &str) -> Result<HashSet<String>> {
        Ok(self
            .store()?
            .matching(None, Some(&annotation_predicate(predicate)), None)
            .into_iter()
            .map(|(_, _, o)| o)
            .collect())
    }

    fn get_all_asset_ids(&self) -> Result<HashSet<AssetPointer>> {
        Ok(pointers(self.store()?.subjects(RDF_TYPE, ASSET_CLASS)))
    }

    fn get_artifacts_for_asset(&self, asset: &AssetPointer) -> Result<HashSet<AssetPointer>> {
        Ok(pointers(self.store()?.objects(&asset.to_urn(), IS_CARRIED_BY)))
    }

    fn get_latest_asset_for_id(&self, id: &Uuid) -> Result<Option<AssetPointer>> {
        let store = self.store()?;
        Ok(Self::single_object(&store, &series_term(id), HAS_LATEST_VERSION)
            .and_then(|t| AssetPointer::from_urn(&t).ok()))
    }

    fn get_asset_versions(&self, id: &Uuid) -> Result<HashSet<AssetPointer>> {
        Ok(pointers(self.store()?.objects(&series_term(id), HAS_VERSION)))
    }

    fn get_descriptive_metadata(&self, asset: &AssetPointer) -> Result<Option<DescriptiveMetadata>> {
        let store = self.store()?;
        let node = asset.to_urn();
        if !store.contains(&node, RDF_TYPE, ASSET_CLASS) {
            return Ok(None);
        }
        Ok(Some(DescriptiveMetadata {
            name: Self::single_object(&store, &node, RDFS_LABEL),
            description: Self::single_object(&store, &node, DESCRIPTION),
            primary_type: Self::single_object(&store, &node, PRIMARY_TYPE),
        }))
    }

    fn register_relationship(
        &self,
        from: &AssetPointer,
        rel: Relationship,
        to: &AssetPointer,
    ) -> Result<()> {
        self.store()?
            .insert(&from.to_urn(), &relationship_predicate(rel), &to.to_urn());
        debug!(from = %from, rel = %rel, to = %to, "registered relationship");
        Ok(())
    }

    fn get_outbound(&self, from: &AssetPointer, rel: Option<Relationship>) -> Result<HashSet<AssetPointer>> {
        let store = self.store()?;
        let node = from.to_urn();
        Ok(pointers(
            relationship_predicates(rel)
                .iter()
                .flat_map(|p| store.objects(&node, p)),
        ))
    }

    fn get_related_assets_bounded(
        &self,
        root: &AssetPointer,
        rel: Option<Relationship>,
        depth: Option<usize>,
    ) -> Result<HashSet<AssetPointer>> {
        let store = self.store()?;
        Ok(pointers(store.reachable(
            &root.to_urn(),
            &relationship_predicates(rel),
            depth,
        )))
    }

    fn get_neighbour_assets(&self, asset: &AssetPointer) -> Result<Vec<Link>> {
        let store = self.store()?;
        let node = asset.to_urn();
        let mut links = Vec::new();
        for rel in Relationship::ALL {
            let predicate = relationship_predicate(rel);
            for to in pointers(store.objects(&node, &predicate)) {
                links.push(Link::outbound(rel, to));
            }
            for from in pointers(store.subjects(&predicate, &node)) {
                links.push(Link::inbound(rel, from));
            }
        }
        links.sort();
        Ok(links)
    }

    fn unregister_asset_version(&self, asset: &AssetPointer) -> Result<()> {
        let node = asset.to_urn();
        let series = series_term(&asset.id());
        let mut store = self.store()?;
        if !store.contains(&node, RDF_TYPE, ASSET_CLASS) {
            return Ok(());
        }
        let removed = store.remove_matching(Some(&node), None, None);
        store.remove_matching(Some(&series), Some(HAS_VERSION), Some(&node));
        if store.contains(&series, HAS_LATEST_VERSION, &node) {
            let successor = pointers(store.objects(&series, HAS_VERSION))
                .into_iter()
                .max()
                .map(|p| p.to_urn());
            Self::replace(&mut store, &series, HAS_LATEST_VERSION, successor.as_deref());
        }
        info!(asset = %asset, triples = removed, "unregistered asset version");
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        self.store()?.clear();
        info!("index reset");
        Ok(())
    }
}
