use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::construct::OtherHasher;
use crate::error::{RepositoryError, Result, lock};
use crate::persist::Persistor;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredContent {
    pub bytes: Vec<u8>,
    pub digest: blake3::Hash,
    pub stored_at: DateTime<Utc>,
}
impl StoredContent {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            digest: blake3::hash(&bytes),
            bytes,
            stored_at: Utc::now(),
        }
    }
    pub fn receipt(&self) -> ContentReceipt {
        ContentReceipt {
            digest: self.digest.to_hex().to_string(),
            size: self.bytes.len(),
            stored_at: self.stored_at,
        }
    }
}

/// What a listing reports about stored content without handing out the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentReceipt {
    pub digest: String,
    pub size: usize,
    pub stored_at: DateTime<Utc>,
}

/// Raw blob storage for artifact content, keyed by artifact id and version.
pub trait ArtifactStore: Send + Sync {
    fn stored(&self, artifact_id: &Uuid, version: &str) -> Result<Option<StoredContent>>;
    fn put_content(&self, artifact_id: &Uuid, version: &str, content: Vec<u8>) -> Result<()>;
    /// Returns whether there was anything to remove.
    fn remove_content(&self, artifact_id: &Uuid, version: &str) -> Result<bool>;
    fn clear(&self) -> Result<()>;

    fn get_canonical_content(&self, artifact_id: &Uuid, version: &str) -> Result<Vec<u8>> {
        self.stored(artifact_id, version)?
            .map(|s| s.bytes)
            .ok_or_else(|| {
                RepositoryError::NotFound(format!("no content for artifact {}:{}", artifact_id, version))
            })
    }

    /// Digest of the stored content, if any.
    fn digest(&self, artifact_id: &Uuid, version: &str) -> Result<Option<blake3::Hash>> {
        Ok(self.stored(artifact_id, version)?.map(|s| s.digest))
    }

    /// Reads the bytes behind a content locator. Only local files, as
    /// `file://` urls or plain paths, are dereferenced; any other scheme,
    /// `http(s)` included, is reported as `Unsupported`. A store that can
    /// reach remote content overrides this.
    fn read_locator(&self, locator: &str) -> Result<Vec<u8>> {
        let path = locator.strip_prefix("file://").unwrap_or(locator);
        if path.contains("://") {
            return Err(RepositoryError::Unsupported(format!(
                "cannot dereference locator '{}'",
                locator
            )));
        }
        Ok(std::fs::read(path)?)
    }
}

// ------------- MemoryArtifactStore -------------
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    contents: Mutex<HashMap<(Uuid, String), StoredContent, OtherHasher>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> Result<usize> {
        Ok(lock(&self.contents, "artifact contents")?.len())
    }
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn stored(&self, artifact_id: &Uuid, version: &str) -> Result<Option<StoredContent>> {
        Ok(lock(&self.contents, "artifact contents")?
            .get(&(*artifact_id, version.to_string()))
            .cloned())
    }

    fn put_content(&self, artifact_id: &Uuid, version: &str, content: Vec<u8>) -> Result<()> {
        let stored = StoredContent::new(content);
        debug!(artifact = %artifact_id, version, digest = %stored.digest, "stored content");
        lock(&self.contents, "artifact contents")?.insert((*artifact_id, version.to_string()), stored);
        Ok(())
    }

    fn remove_content(&self, artifact_id: &Uuid, version: &str) -> Result<bool> {
        Ok(lock(&self.contents, "artifact contents")?
            .remove(&(*artifact_id, version.to_string()))
            .is_some())
    }

    fn clear(&self) -> Result<()> {
        lock(&self.contents, "artifact contents")?.clear();
        Ok(())
    }
}

// ------------- SqliteArtifactStore -------------
/// Content kept in the `Content` table of an index file, so surrogates and
/// carriers survive alongside the index that points at them.
pub struct SqliteArtifactStore {
    persistor: Mutex<Persistor>,
}

impl SqliteArtifactStore {
    pub fn open(path: &str) -> Result<Self> {
        let persistor = Persistor::open(path)?;
        info!(path, contents = persistor.count_content()?, "opened content store");
        Ok(Self {
            persistor: Mutex::new(persistor),
        })
    }
    pub fn len(&self) -> Result<usize> {
        lock(&self.persistor, "content persistor")?.count_content()
    }
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl ArtifactStore for SqliteArtifactStore {
    fn stored(&self, artifact_id: &Uuid, version: &str) -> Result<Option<StoredContent>> {
        let persistor = lock(&self.persistor, "content persistor")?;
        let Some((bytes, digest, stored_at)) = persistor.restore_content(artifact_id, version)? else {
            return Ok(None);
        };
        let digest = blake3::Hash::from_hex(&digest).map_err(|e| {
            RepositoryError::Persistence(format!("bad digest for {}:{}: {}", artifact_id, version, e))
        })?;
        Ok(Some(StoredContent {
            bytes,
            digest,
            stored_at,
        }))
    }

    fn put_content(&self, artifact_id: &Uuid, version: &str, content: Vec<u8>) -> Result<()> {
        let stored = StoredContent::new(content);
        lock(&self.persistor, "content persistor")?.persist_content(
            artifact_id,
            version,
            &stored.bytes,
            &stored.digest,
            &stored.stored_at,
        )?;
        debug!(artifact = %artifact_id, version, digest = %stored.digest, "persisted content");
        Ok(())
    }

    fn remove_content(&self, artifact_id: &Uuid, version: &str) -> Result<bool> {
        lock(&self.persistor, "content persistor")?.forget_content(artifact_id, version)
    }

    fn clear(&self) -> Result<()> {
        lock(&self.persistor, "content persistor")?.clear_content()
    }
}
