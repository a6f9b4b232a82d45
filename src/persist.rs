// used for persistence
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;
use uuid::Uuid;

use crate::construct::{Annotation, AssetPointer, DescriptiveMetadata, Relationship};
use crate::error::Result;

/// Where an index keeps its state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    /// Nothing survives the process.
    InMemory,
    /// Every update is written through to the SQLite file at the given path.
    File(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassificationKind {
    Type,
    Role,
}
impl ClassificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationKind::Type => "type",
            ClassificationKind::Role => "role",
        }
    }
    fn parse(s: &str) -> Option<Self> {
        match s {
            "type" => Some(ClassificationKind::Type),
            "role" => Some(ClassificationKind::Role),
            _ => None,
        }
    }
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

// reads an (identity, version) column pair as a pointer
fn pointer_at(row: &Row, idx: usize) -> rusqlite::Result<AssetPointer> {
    let id: String = row.get(idx)?;
    let version: String = row.get(idx + 1)?;
    let id = Uuid::parse_str(&id).map_err(|e| conversion_error(idx, e))?;
    Ok(AssetPointer::new(id, version))
}

fn blank_to_none(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

pub struct Persistor {
    db: Connection,
}
impl Persistor {
    pub fn open(path: &str) -> Result<Self> {
        info!(path, "opening index file");
        Self::new(Connection::open(path)?)
    }
    pub fn new(connection: Connection) -> Result<Self> {
        // Tables are kept free of the "STRICT" keyword so that external tools
        // can still browse the file
        connection.execute_batch(
            "
            create table if not exists Asset (
                Asset_Identity text not null,
                Asset_Version text not null,
                constraint referenceable_Asset primary key (
                    Asset_Identity,
                    Asset_Version
                )
            );
            create table if not exists Classification (
                Asset_Identity text not null,
                Asset_Version text not null,
                Kind text not null,
                Tag text not null,
                constraint Classification_of_Asset foreign key (
                    Asset_Identity,
                    Asset_Version
                ) references Asset(Asset_Identity, Asset_Version),
                constraint unique_Classification unique (
                    Asset_Identity,
                    Asset_Version,
                    Kind,
                    Tag
                )
            );
            create table if not exists Annotation (
                Asset_Identity text not null,
                Asset_Version text not null,
                Predicate text not null,
                Concept text not null,
                constraint Annotation_of_Asset foreign key (
                    Asset_Identity,
                    Asset_Version
                ) references Asset(Asset_Identity, Asset_Version),
                constraint unique_Annotation unique (
                    Asset_Identity,
                    Asset_Version,
                    Predicate,
                    Concept
                )
            );
            create table if not exists Surrogate (
                Asset_Identity text not null,
                Asset_Version text not null,
                Surrogate_Identity text not null,
                Surrogate_Version text not null,
                constraint single_Surrogate_per_Asset primary key (
                    Asset_Identity,
                    Asset_Version
                )
            );
            create table if not exists Artifact (
                Asset_Identity text not null,
                Asset_Version text not null,
                Artifact_Identity text not null,
                Artifact_Version text not null,
                constraint unique_Artifact unique (
                    Asset_Identity,
                    Asset_Version,
                    Artifact_Identity,
                    Artifact_Version
                )
            );
            create table if not exists Location (
                Pointer_Identity text not null,
                Pointer_Version text not null,
                Location text not null,
                constraint single_Location primary key (
                    Pointer_Identity,
                    Pointer_Version
                )
            );
            create table if not exists Metadata (
                Asset_Identity text not null,
                Asset_Version text not null,
                Name text null,
                Description text null,
                PrimaryType text null,
                constraint single_Metadata primary key (
                    Asset_Identity,
                    Asset_Version
                )
            );
            create table if not exists Latest (
                Series_Identity text not null,
                Asset_Version text not null,
                constraint single_Latest primary key (
                    Series_Identity
                )
            );
            create table if not exists Relationship (
                From_Identity text not null,
                From_Version text not null,
                Predicate text not null,
                To_Identity text not null,
                To_Version text not null,
                constraint unique_Relationship unique (
                    From_Identity,
                    From_Version,
                    Predicate,
                    To_Identity,
                    To_Version
                )
            );
            create table if not exists Content (
                Artifact_Identity text not null,
                Artifact_Version text not null,
                Bytes blob not null,
                Digest text not null,
                Stored_At text not null,
                constraint single_Content primary key (
                    Artifact_Identity,
                    Artifact_Version
                )
            );
            ",
        )?;
        Ok(Persistor { db: connection })
    }

    // ------------- writes -------------
    pub fn persist_asset(&self, asset: &AssetPointer) -> Result<()> {
        self.db
            .prepare_cached(
                "
                insert or ignore into Asset (
                    Asset_Identity,
                    Asset_Version
                ) values (?, ?)
            ",
            )?
            .execute(params![asset.id().to_string(), asset.version()])?;
        Ok(())
    }
    pub fn persist_classification(
        &self,
        asset: &AssetPointer,
        kind: ClassificationKind,
        tag: &str,
    ) -> Result<()> {
        self.db
            .prepare_cached(
                "
                insert or ignore into Classification (
                    Asset_Identity,
                    Asset_Version,
                    Kind,
                    Tag
                ) values (?, ?, ?, ?)
            ",
            )?
            .execute(params![
                asset.id().to_string(),
                asset.version(),
                kind.as_str(),
                tag
            ])?;
        Ok(())
    }
    pub fn persist_annotation(&self, asset: &AssetPointer, annotation: &Annotation) -> Result<()> {
        self.db
            .prepare_cached(
                "
                insert or ignore into Annotation (
                    Asset_Identity,
                    Asset_Version,
                    Predicate,
                    Concept
                ) values (?, ?, ?, ?)
            ",
            )?
            .execute(params![
                asset.id().to_string(),
                asset.version(),
                annotation.rel.as_deref().unwrap_or(""),
                &annotation.concept
            ])?;
        Ok(())
    }
    pub fn persist_surrogate(&self, asset: &AssetPointer, surrogate: &AssetPointer) -> Result<()> {
        self.db
            .prepare_cached(
                "
                insert or replace into Surrogate (
                    Asset_Identity,
                    Asset_Version,
                    Surrogate_Identity,
                    Surrogate_Version
                ) values (?, ?, ?, ?)
            ",
            )?
            .execute(params![
                asset.id().to_string(),
                asset.version(),
                surrogate.id().to_string(),
                surrogate.version()
            ])?;
        Ok(())
    }
    pub fn persist_artifact(&self, asset: &AssetPointer, artifact: &AssetPointer) -> Result<()> {
        self.db
            .prepare_cached(
                "
                insert or ignore into Artifact (
                    Asset_Identity,
                    Asset_Version,
                    Artifact_Identity,
                    Artifact_Version
                ) values (?, ?, ?, ?)
            ",
            )?
            .execute(params![
                asset.id().to_string(),
                asset.version(),
                artifact.id().to_string(),
                artifact.version()
            ])?;
        Ok(())
    }
    pub fn persist_location(&self, pointer: &AssetPointer, location: &str) -> Result<()> {
        self.db
            .prepare_cached(
                "
                insert or replace into Location (
                    Pointer_Identity,
                    Pointer_Version,
                    Location
                ) values (?, ?, ?)
            ",
            )?
            .execute(params![pointer.id().to_string(), pointer.version(), location])?;
        Ok(())
    }
    pub fn persist_metadata(&self, asset: &AssetPointer, metadata: &DescriptiveMetadata) -> Result<()> {
        self.db
            .prepare_cached(
                "
                insert or replace into Metadata (
                    Asset_Identity,
                    Asset_Version,
                    Name,
                    Description,
                    PrimaryType
                ) values (?, ?, ?, ?, ?)
            ",
            )?
            .execute(params![
                asset.id().to_string(),
                asset.version(),
                metadata.name,
                metadata.description,
                metadata.primary_type
            ])?;
        Ok(())
    }
    pub fn persist_latest(&self, asset: &AssetPointer) -> Result<()> {
        self.db
            .prepare_cached(
                "
                insert or replace into Latest (
                    Series_Identity,
                    Asset_Version
                ) values (?, ?)
            ",
            )?
            .execute(params![asset.id().to_string(), asset.version()])?;
        Ok(())
    }
    pub fn persist_relationship(
        &self,
        from: &AssetPointer,
        rel: Relationship,
        to: &AssetPointer,
    ) -> Result<()> {
        self.db
            .prepare_cached(
                "
                insert or ignore into Relationship (
                    From_Identity,
                    From_Version,
                    Predicate,
                    To_Identity,
                    To_Version
                ) values (?, ?, ?, ?, ?)
            ",
            )?
            .execute(params![
                from.id().to_string(),
                from.version(),
                rel.as_str(),
                to.id().to_string(),
                to.version()
            ])?;
        Ok(())
    }
    pub fn forget_asset_version(&self, asset: &AssetPointer) -> Result<()> {
        let (id, version) = (asset.id().to_string(), asset.version().to_string());
        for statement in [
            "delete from Classification where Asset_Identity = ? and Asset_Version = ?",
            "delete from Annotation where Asset_Identity = ? and Asset_Version = ?",
            "delete from Surrogate where Asset_Identity = ? and Asset_Version = ?",
            "delete from Artifact where Asset_Identity = ? and Asset_Version = ?",
            "delete from Location where Pointer_Identity = ? and Pointer_Version = ?",
            "delete from Metadata where Asset_Identity = ? and Asset_Version = ?",
            "delete from Relationship where From_Identity = ? and From_Version = ?",
            "delete from Latest where Series_Identity = ? and Asset_Version = ?",
            "delete from Asset where Asset_Identity = ? and Asset_Version = ?",
        ] {
            self.db.prepare_cached(statement)?.execute(params![id, version])?;
        }
        Ok(())
    }
    pub fn persist_content(
        &self,
        artifact_id: &Uuid,
        version: &str,
        bytes: &[u8],
        digest: &blake3::Hash,
        stored_at: &DateTime<Utc>,
    ) -> Result<()> {
        self.db
            .prepare_cached(
                "
                insert or replace into Content (
                    Artifact_Identity,
                    Artifact_Version,
                    Bytes,
                    Digest,
                    Stored_At
                ) values (?, ?, ?, ?, ?)
            ",
            )?
            .execute(params![
                artifact_id.to_string(),
                version,
                bytes,
                digest.to_hex().to_string(),
                stored_at
            ])?;
        Ok(())
    }
    pub fn forget_content(&self, artifact_id: &Uuid, version: &str) -> Result<bool> {
        let removed = self
            .db
            .prepare_cached(
                "delete from Content where Artifact_Identity = ? and Artifact_Version = ?",
            )?
            .execute(params![artifact_id.to_string(), version])?;
        Ok(removed > 0)
    }
    pub fn clear_content(&self) -> Result<()> {
        self.db.execute_batch("delete from Content;")?;
        info!("cleared persisted content");
        Ok(())
    }
    pub fn clear(&self) -> Result<()> {
        self.db.execute_batch(
            "
            delete from Classification;
            delete from Annotation;
            delete from Surrogate;
            delete from Artifact;
            delete from Location;
            delete from Metadata;
            delete from Latest;
            delete from Relationship;
            delete from Asset;
            ",
        )?;
        info!("cleared persisted index");
        Ok(())
    }

    // ------------- restores -------------
    pub fn restore_assets(&self) -> Result<Vec<AssetPointer>> {
        let mut stmt = self.db.prepare_cached(
            "
            select Asset_Identity, Asset_Version
                from Asset
            ",
        )?;
        let rows = stmt.query_map([], |r| pointer_at(r, 0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
    pub fn restore_classifications(
        &self,
    ) -> Result<Vec<(AssetPointer, ClassificationKind, String)>> {
        let mut stmt = self.db.prepare_cached(
            "
            select Asset_Identity, Asset_Version, Kind, Tag
                from Classification
            ",
        )?;
        let rows = stmt.query_map([], |r| {
            let kind: String = r.get(2)?;
            let kind = ClassificationKind::parse(&kind).ok_or_else(|| {
                conversion_error(
                    2,
                    crate::error::RepositoryError::Persistence(format!(
                        "unknown classification kind '{}'",
                        kind
                    )),
                )
            })?;
            Ok((pointer_at(r, 0)?, kind, r.get(3)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
    pub fn restore_annotations(&self) -> Result<Vec<(AssetPointer, Annotation)>> {
        let mut stmt = self.db.prepare_cached(
            "
            select Asset_Identity, Asset_Version, Predicate, Concept
                from Annotation
            ",
        )?;
        let rows = stmt.query_map([], |r| {
            let annotation = Annotation {
                rel: blank_to_none(r.get(2)?),
                concept: r.get(3)?,
            };
            Ok((pointer_at(r, 0)?, annotation))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
    pub fn restore_surrogates(&self) -> Result<Vec<(AssetPointer, AssetPointer)>> {
        let mut stmt = self.db.prepare_cached(
            "
            select Asset_Identity, Asset_Version, Surrogate_Identity, Surrogate_Version
                from Surrogate
            ",
        )?;
        let rows = stmt.query_map([], |r| Ok((pointer_at(r, 0)?, pointer_at(r, 2)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
    pub fn restore_artifacts(&self) -> Result<Vec<(AssetPointer, AssetPointer)>> {
        let mut stmt = self.db.prepare_cached(
            "
            select Asset_Identity, Asset_Version, Artifact_Identity, Artifact_Version
                from Artifact
            ",
        )?;
        let rows = stmt.query_map([], |r| Ok((pointer_at(r, 0)?, pointer_at(r, 2)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
    pub fn restore_locations(&self) -> Result<Vec<(AssetPointer, String)>> {
        let mut stmt = self.db.prepare_cached(
            "
            select Pointer_Identity, Pointer_Version, Location
                from Location
            ",
        )?;
        let rows = stmt.query_map([], |r| Ok((pointer_at(r, 0)?, r.get(2)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
    pub fn restore_metadata(&self) -> Result<Vec<(AssetPointer, DescriptiveMetadata)>> {
        let mut stmt = self.db.prepare_cached(
            "
            select Asset_Identity, Asset_Version, Name, Description, PrimaryType
                from Metadata
            ",
        )?;
        let rows = stmt.query_map([], |r| {
            let metadata = DescriptiveMetadata {
                name: r.get(2)?,
                description: r.get(3)?,
                primary_type: r.get(4)?,
            };
            Ok((pointer_at(r, 0)?, metadata))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
    pub fn restore_latest(&self) -> Result<Vec<AssetPointer>> {
        let mut stmt = self.db.prepare_cached(
            "
            select Series_Identity, Asset_Version
                from Latest
            ",
        )?;
        let rows = stmt.query_map([], |r| pointer_at(r, 0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
    pub fn restore_relationships(&self) -> Result<Vec<(AssetPointer, Relationship, AssetPointer)>> {
        let mut stmt = self.db.prepare_cached(
            "
            select From_Identity, From_Version, Predicate, To_Identity, To_Version
                from Relationship
            ",
        )?;
        let rows = stmt.query_map([], |r| {
            let predicate: String = r.get(2)?;
            let rel = predicate
                .parse::<Relationship>()
                .map_err(|e| conversion_error(2, e))?;
            Ok((pointer_at(r, 0)?, rel, pointer_at(r, 3)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
    pub fn restore_content(
        &self,
        artifact_id: &Uuid,
        version: &str,
    ) -> Result<Option<(Vec<u8>, String, DateTime<Utc>)>> {
        let mut stmt = self.db.prepare_cached(
            "
            select Bytes, Digest, Stored_At
                from Content
                where Artifact_Identity = ? and Artifact_Version = ?
            ",
        )?;
        Ok(stmt
            .query_row(params![artifact_id.to_string(), version], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })
            .optional()?)
    }
    pub fn count_content(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .query_row("select count(*) from Content", [], |r| r.get(0))?;
        Ok(count as usize)
    }
}
