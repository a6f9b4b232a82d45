use std::collections::hash_map::RandomState;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{BuildHasher, BuildHasherDefault, Hash};
use std::str::FromStr;

use seahash::SeaHasher;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RepositoryError, Result};

// we will use a fast hasher for maps keyed by strings and pointers
pub type OtherHasher = BuildHasherDefault<SeaHasher>;

const URN_PREFIX: &str = "urn:asset:";

// ------------- AssetPointer -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetPointer {
    id: Uuid,
    version: String,
}
impl AssetPointer {
    pub fn new(id: Uuid, version: impl Into<String>) -> Self {
        Self {
            id,
            version: version.into(),
        }
    }
    pub fn id(&self) -> Uuid {
        self.id
    }
    pub fn version(&self) -> &str {
        &self.version
    }
    // a nil id or a blank version tag cannot be resolved
    pub fn is_complete(&self) -> bool {
        !self.id.is_nil() && !self.version.trim().is_empty()
    }
    pub fn to_urn(&self) -> String {
        format!("{}{}:{}", URN_PREFIX, self.id, self.version)
    }
    pub fn from_urn(urn: &str) -> Result<Self> {
        let rest = urn.strip_prefix(URN_PREFIX).ok_or_else(|| RepositoryError::Parse {
            message: format!("'{}' is not an asset urn", urn),
        })?;
        let (id, version) = rest.split_once(':').ok_or_else(|| RepositoryError::Parse {
            message: format!("'{}' has no version tag", urn),
        })?;
        let id = Uuid::parse_str(id).map_err(|e| RepositoryError::Parse {
            message: format!("'{}': {}", urn, e),
        })?;
        Ok(Self::new(id, version))
    }
}
impl fmt::Display for AssetPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.version)
    }
}

// ------------- Relationship -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Relationship {
    Imports,
    IncludesByReference,
    DependsOn,
    HasStructuringComponent,
    HasPart,
    IsTranscreationOf,
    IsDerivedFrom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipCategory {
    Dependency,
    Structural,
    Derivation,
}

impl Relationship {
    pub const ALL: [Relationship; 7] = [
        Relationship::Imports,
        Relationship::IncludesByReference,
        Relationship::DependsOn,
        Relationship::HasStructuringComponent,
        Relationship::HasPart,
        Relationship::IsTranscreationOf,
        Relationship::IsDerivedFrom,
    ];
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::Imports => "Imports",
            Relationship::IncludesByReference => "IncludesByReference",
            Relationship::DependsOn => "DependsOn",
            Relationship::HasStructuringComponent => "HasStructuringComponent",
            Relationship::HasPart => "HasPart",
            Relationship::IsTranscreationOf => "IsTranscreationOf",
            Relationship::IsDerivedFrom => "IsDerivedFrom",
        }
    }
    pub fn category(&self) -> RelationshipCategory {
        match self {
            Relationship::Imports | Relationship::IncludesByReference | Relationship::DependsOn => {
                RelationshipCategory::Dependency
            }
            Relationship::HasStructuringComponent | Relationship::HasPart => {
                RelationshipCategory::Structural
            }
            Relationship::IsTranscreationOf | Relationship::IsDerivedFrom => {
                RelationshipCategory::Derivation
            }
        }
    }
    pub fn is_structural(&self) -> bool {
        self.category() == RelationshipCategory::Structural
    }
}
impl FromStr for Relationship {
    type Err = RepositoryError;
    // accepts "DependsOn", "depends_on", "Depends-On" and the like
    fn from_str(s: &str) -> Result<Self> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect();
        Relationship::ALL
            .iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(&folded))
            .copied()
            .ok_or_else(|| RepositoryError::Parse {
                message: format!("unknown relationship '{}'", s),
            })
    }
}
impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Direction {
    #[default]
    Outbound,
    Inbound,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Link {
    pub rel: Relationship,
    pub href: AssetPointer,
    #[serde(default)]
    pub direction: Direction,
}
impl Link {
    pub fn outbound(rel: Relationship, href: AssetPointer) -> Self {
        Self {
            rel,
            href,
            direction: Direction::Outbound,
        }
    }
    pub fn inbound(rel: Relationship, href: AssetPointer) -> Self {
        Self {
            rel,
            href,
            direction: Direction::Inbound,
        }
    }
}

// ------------- Annotation -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel: Option<String>,
    pub concept: String,
}
impl Annotation {
    pub fn new(rel: Option<&str>, concept: &str) -> Self {
        Self {
            rel: rel.map(str::to_string),
            concept: concept.to_string(),
        }
    }
    /// The keys an annotation is indexed under: the bare concept and, when a
    /// predicate is present, `predicate:concept`. The two forms can collide
    /// when either part itself contains a colon.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = vec![self.concept.clone()];
        if let Some(rel) = &self.rel {
            keys.push(format!("{}:{}", rel, self.concept));
        }
        keys
    }
}

// ------------- Representation -------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Representation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

fn dimension_covers(requested: &Option<String>, candidate: &Option<String>) -> bool {
    match (requested, candidate) {
        (None, _) => true,
        (Some(r), Some(c)) => r.eq_ignore_ascii_case(c),
        (Some(_), None) => false,
    }
}
fn same_dimension(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

impl Representation {
    pub fn new(language: &str) -> Self {
        Self {
            language: Some(language.to_string()),
            ..Default::default()
        }
    }
    pub fn any() -> Self {
        Self::default()
    }
    pub fn with_format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }
    pub fn with_charset(mut self, charset: &str) -> Self {
        self.charset = Some(charset.to_string());
        self
    }
    pub fn with_encoding(mut self, encoding: &str) -> Self {
        self.encoding = Some(encoding.to_string());
        self
    }
    pub fn is_wildcard(&self) -> bool {
        self.language.is_none()
            && self.format.is_none()
            && self.charset.is_none()
            && self.encoding.is_none()
    }
    /// True when every dimension set on `self` is also set, to the same value,
    /// on `other`. Unset dimensions act as wildcards.
    pub fn is_broader_or_equal(&self, other: &Representation) -> bool {
        dimension_covers(&self.language, &other.language)
            && dimension_covers(&self.format, &other.format)
            && dimension_covers(&self.charset, &other.charset)
            && dimension_covers(&self.encoding, &other.encoding)
    }
    pub fn same_as(&self, other: &Representation) -> bool {
        same_dimension(&self.language, &other.language)
            && same_dimension(&self.format, &other.format)
            && same_dimension(&self.charset, &other.charset)
            && same_dimension(&self.encoding, &other.encoding)
    }
    pub fn has_language(&self, language: &str) -> bool {
        self.language
            .as_deref()
            .is_some_and(|l| l.eq_ignore_ascii_case(language))
    }
}
impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = [
            ("lang", &self.language),
            ("fmt", &self.format),
            ("charset", &self.charset),
            ("enc", &self.encoding),
        ]
        .iter()
        .filter_map(|(name, value)| value.as_ref().map(|v| format!("{}={}", name, v)))
        .collect();
        if parts.is_empty() {
            f.write_str("*/*")
        } else {
            f.write_str(&parts.join(";"))
        }
    }
}

// ------------- Artifacts and Assets -------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeArtifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<AssetPointer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub representation: Representation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default)]
    pub ephemeral: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
}
impl KnowledgeArtifact {
    pub fn new(artifact_id: AssetPointer, representation: Representation) -> Self {
        Self {
            artifact_id: Some(artifact_id),
            name: None,
            description: None,
            representation,
            locator: None,
            ephemeral: false,
            links: Vec::new(),
        }
    }
    // an inline artifact known only by where its content lives
    pub fn anonymous(representation: Representation, locator: &str) -> Self {
        Self {
            artifact_id: None,
            name: None,
            description: None,
            representation,
            locator: Some(locator.to_string()),
            ephemeral: false,
            links: Vec::new(),
        }
    }
    pub fn with_locator(mut self, locator: &str) -> Self {
        self.locator = Some(locator.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeAsset {
    pub asset_id: AssetPointer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub formal_types: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub carriers: Vec<KnowledgeArtifact>,
    #[serde(default)]
    pub surrogates: Vec<KnowledgeArtifact>,
    #[serde(default)]
    pub links: Vec<Link>,
}
impl KnowledgeAsset {
    pub fn new(asset_id: AssetPointer) -> Self {
        Self {
            asset_id,
            name: None,
            description: None,
            formal_types: Vec::new(),
            roles: Vec::new(),
            annotations: Vec::new(),
            carriers: Vec::new(),
            surrogates: Vec::new(),
            links: Vec::new(),
        }
    }
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
    pub fn with_type(mut self, formal_type: &str) -> Self {
        self.formal_types.push(formal_type.to_string());
        self
    }
    pub fn with_role(mut self, role: &str) -> Self {
        self.roles.push(role.to_string());
        self
    }
    pub fn with_annotation(mut self, rel: Option<&str>, concept: &str) -> Self {
        self.annotations.push(Annotation::new(rel, concept));
        self
    }
    pub fn with_carrier(mut self, carrier: KnowledgeArtifact) -> Self {
        self.carriers.push(carrier);
        self
    }
    pub fn with_surrogate(mut self, surrogate: KnowledgeArtifact) -> Self {
        self.surrogates.push(surrogate);
        self
    }
    pub fn with_link(mut self, rel: Relationship, target: AssetPointer) -> Self {
        self.links.push(Link::outbound(rel, target));
        self
    }
    pub fn outbound_links(&self) -> impl Iterator<Item = &Link> {
        self.links
            .iter()
            .filter(|l| l.direction == Direction::Outbound)
    }
    pub fn inbound_links(&self) -> impl Iterator<Item = &Link> {
        self.links
            .iter()
            .filter(|l| l.direction == Direction::Inbound)
    }
}

// materialized content handed back to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeCarrier {
    pub asset_id: AssetPointer,
    pub artifact_id: Option<AssetPointer>,
    pub representation: Representation,
    pub label: Option<String>,
    pub content: Vec<u8>,
}
impl KnowledgeCarrier {
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptiveMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
    pub primary_type: Option<String>,
}

// ------------- Lookups -------------
#[derive(Debug)]
pub struct Lookup<K, V, H = RandomState> {
    index: HashMap<K, HashSet<V>, H>,
}
impl<K: Eq + Hash + Clone, V: Eq + Hash + Clone, H: BuildHasher + Default> Lookup<K, V, H> {
    pub fn new() -> Self {
        Self {
            index: HashMap::<K, HashSet<V>, H>::default(),
        }
    }
    // returns true if the value was not already present under the key
    pub fn insert(&mut self, key: K, value: V) -> bool {
        let set = self.index.entry(key).or_insert(HashSet::<V>::new());
        set.insert(value)
    }
    pub fn lookup(&self, key: &K) -> Option<&HashSet<V>> {
        self.index.get(key)
    }
    pub fn values_of(&self, key: &K) -> HashSet<V> {
        self.index.get(key).cloned().unwrap_or_default()
    }
    pub fn contains(&self, key: &K, value: &V) -> bool {
        self.index.get(key).is_some_and(|set| set.contains(value))
    }
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.index.keys()
    }
    pub fn all_values(&self) -> HashSet<V> {
        self.index.values().flatten().cloned().collect()
    }
    pub fn remove_key(&mut self, key: &K) -> HashSet<V> {
        self.index.remove(key).unwrap_or_default()
    }
    pub fn remove(&mut self, key: &K, value: &V) -> bool {
        let Some(set) = self.index.get_mut(key) else {
            return false;
        };
        let removed = set.remove(value);
        if set.is_empty() {
            self.index.remove(key);
        }
        removed
    }
    // drops every value failing the predicate, and keys left without values
    pub fn retain<F: FnMut(&K, &V) -> bool>(&mut self, mut keep: F) {
        self.index.retain(|k, set| {
            set.retain(|v| keep(k, v));
            !set.is_empty()
        });
    }
    pub fn clear(&mut self) {
        self.index.clear();
    }
    pub fn len(&self) -> usize {
        self.index.len()
    }
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
impl<K: Eq + Hash + Clone, V: Eq + Hash + Clone, H: BuildHasher + Default> Default
    for Lookup<K, V, H>
{
    fn default() -> Self {
        Self::new()
    }
}
