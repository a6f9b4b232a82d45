//! Knowledge repo – a versioned repository of knowledge assets.
//!
//! A *knowledge asset* (a clinical model, a rule set, a piece of decision
//! logic) is known through two kinds of things:
//! * a *surrogate*, the metadata descriptor of one asset version, with its
//!   types, roles, semantic annotations and typed links to other assets, and
//! * one or more *carriers*, concrete encodings of the asset's content, each
//!   in some [`construct::Representation`] `(language, format, charset, encoding)`.
//!
//! Both are addressed by an [`construct::AssetPointer`], an `(id, version)`
//! pair. Pointers are also the nodes of the relationship graph.
//!
//! ## Modules
//! * [`construct`] – Pointers, representations, surrogates, carriers and the
//!   `Lookup` maps-of-sets the index is built from.
//! * [`index`] – The [`index::Index`] contract: classification, latest
//!   version tracking, and the relationship graph with a cycle safe closure.
//! * [`keeper`] – An index kept in locked maps-of-sets, optionally written
//!   through to SQLite (see [`persist`]).
//! * [`triple`] – An index kept as triples over interned terms.
//! * [`negotiation`] – Weighted preference decoding and representation
//!   negotiation. Preference codes are parsed with the grammar in
//!   `preferences.pest`.
//! * [`store`] – Artifact content by id and version, in memory or in the
//!   index's SQLite file.
//! * [`composite`] – Composite assets and the structure of their parts.
//! * [`bundler`] – Collects the carriers of an asset and its dependency
//!   closure, skipping what cannot be found.
//! * [`enricher`] – Adds locators, inverse links and ephemeral
//!   representations to surrogates before they are returned.
//! * [`repository`] – The service surface tying the above together.
//! * [`server`] – HTTP routes under `/cat/assets`.
//! * [`settings`] – Layered configuration (defaults, file, `KAR__` environment).
//!
//! ## Concurrency
//! The index is shared behind an `Arc<dyn Index>`. Every structure update is
//! atomic on its own; a registration touching several structures is not a
//! single transaction. The latest version of a series is whichever new
//! version was registered last, not the highest version tag; registering a
//! known version again leaves it in place. Unregistering the latest version
//! hands the role to the remaining version with the highest tag.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use uuid::Uuid;
//! use knowledge_repo::construct::{AssetPointer, KnowledgeAsset, Relationship};
//! use knowledge_repo::index::Index;
//! use knowledge_repo::keeper::KeeperIndex;
//! use knowledge_repo::persist::PersistenceMode;
//!
//! let index = KeeperIndex::new(PersistenceMode::InMemory).unwrap();
//! let a = AssetPointer::new(Uuid::new_v4(), "1.0.0");
//! let b = AssetPointer::new(Uuid::new_v4(), "1.0.0");
//! let surrogate = KnowledgeAsset::new(a.clone())
//!     .with_type("Rule")
//!     .with_link(Relationship::Imports, b.clone());
//! index.index_surrogate(&surrogate, &a).unwrap();
//! let closure = index.get_related_assets(&a, None).unwrap();
//! assert!(closure.contains(&a) && closure.contains(&b));
//! ```

pub mod bundler;
pub mod composite;
pub mod construct;
pub mod enricher;
pub mod error;
pub mod href;
pub mod index;
pub mod keeper;
pub mod negotiation;
pub mod persist;
pub mod repository;
pub mod server;
pub mod settings;
pub mod store;
pub mod triple;

pub use error::{RepositoryError, Result};
