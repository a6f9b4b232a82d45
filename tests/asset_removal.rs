use std::sync::Arc;

use knowledge_repo::RepositoryError;
use knowledge_repo::construct::{AssetPointer, KnowledgeAsset, Link, Relationship, Representation};
use knowledge_repo::index::Index;
use knowledge_repo::keeper::KeeperIndex;
use knowledge_repo::persist::PersistenceMode;
use knowledge_repo::repository::{Repository, surrogate_pointer};
use knowledge_repo::settings::RepositorySettings;
use knowledge_repo::store::MemoryArtifactStore;
use knowledge_repo::triple::TripleIndex;
use uuid::Uuid;

fn repositories(allow_clear_all: bool) -> Vec<(&'static str, Repository)> {
    let settings = RepositorySettings {
        allow_clear_all,
        ..RepositorySettings::default()
    };
    let keeper = Arc::new(KeeperIndex::new(PersistenceMode::InMemory).expect("keeper index")) as Arc<dyn Index>;
    let triple = Arc::new(TripleIndex::new()) as Arc<dyn Index>;
    vec![
        ("keeper", Repository::new(keeper, Arc::new(MemoryArtifactStore::new()), settings.clone())),
        ("triple", Repository::new(triple, Arc::new(MemoryArtifactStore::new()), settings)),
    ]
}

fn add_asset(repository: &Repository, asset: &AssetPointer, name: &str, links: &[(Relationship, &AssetPointer)]) {
    let mut surrogate = KnowledgeAsset::new(asset.clone()).named(name).with_type("Rule");
    for (rel, target) in links {
        surrogate = surrogate.with_link(*rel, (*target).clone());
    }
    repository.register_surrogate(asset, surrogate).expect("register surrogate");
}

fn add_content(repository: &Repository, asset: &AssetPointer, text: &str) -> AssetPointer {
    let artifact = AssetPointer::new(Uuid::new_v4(), "0.0.1");
    repository
        .register_carrier(asset, &artifact, Representation::new("DMN"), None, text.as_bytes().to_vec())
        .expect("register carrier");
    artifact
}

fn has_content(repository: &Repository, artifact: &AssetPointer) -> bool {
    repository
        .artifacts()
        .stored(&artifact.id(), artifact.version())
        .expect("stored")
        .is_some()
}

#[test]
fn deletion_is_refused_unless_enabled() {
    for (backend, repository) in repositories(false) {
        let asset = AssetPointer::new(Uuid::new_v4(), "1");
        add_asset(&repository, &asset, "Kept", &[]);
        assert!(
            matches!(repository.delete_asset_version(&asset), Err(RepositoryError::Forbidden(_))),
            "{}",
            backend
        );
        assert!(matches!(repository.delete_asset(&asset.id()), Err(RepositoryError::Forbidden(_))));
        assert_eq!(repository.list_asset_versions(&asset.id()).expect("versions"), vec![asset.clone()]);
        assert!(repository.get_surrogate(&asset, None).is_ok(), "{}", backend);
    }
}

#[test]
fn deleting_the_latest_version_falls_back_to_the_newest_remaining() {
    for (backend, repository) in repositories(true) {
        let id = Uuid::new_v4();
        let (first, second) = (AssetPointer::new(id, "1"), AssetPointer::new(id, "2"));
        add_asset(&repository, &first, "First", &[]);
        add_asset(&repository, &second, "Second", &[]);
        let kept = add_content(&repository, &first, "<first/>");
        let dropped = add_content(&repository, &second, "<second/>");
        assert_eq!(repository.index().get_latest_asset_for_id(&id).expect("latest"), Some(second.clone()));

        repository.delete_asset_version(&second).expect("delete");
        assert_eq!(repository.list_asset_versions(&id).expect("versions"), vec![first.clone()], "{}", backend);
        assert_eq!(
            repository.index().get_latest_asset_for_id(&id).expect("latest"),
            Some(first.clone()),
            "{}",
            backend
        );
        let listed = repository.list_assets(None, None, None, None).expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name.as_deref(), Some("First"));
        assert!(matches!(repository.get_surrogate(&second, None), Err(RepositoryError::NotFound(_))));

        assert!(!has_content(&repository, &dropped), "{}", backend);
        let surrogate = surrogate_pointer(&second);
        assert!(
            repository
                .artifacts()
                .stored(&surrogate.id(), surrogate.version())
                .expect("stored")
                .is_none()
        );
        assert!(has_content(&repository, &kept), "{}", backend);
        assert_eq!(repository.get_canonical_carrier(&first, None).expect("carrier").as_text(), Some("<first/>"));
    }
}

#[test]
fn deleting_an_older_version_keeps_the_latest() {
    for (backend, repository) in repositories(true) {
        let id = Uuid::new_v4();
        let (first, second) = (AssetPointer::new(id, "1"), AssetPointer::new(id, "2"));
        add_asset(&repository, &first, "First", &[]);
        add_asset(&repository, &second, "Second", &[]);

        repository.delete_asset_version(&first).expect("delete");
        assert_eq!(
            repository.index().get_latest_asset_for_id(&id).expect("latest"),
            Some(second.clone()),
            "{}",
            backend
        );
        assert_eq!(repository.list_asset_versions(&id).expect("versions"), vec![second.clone()]);
    }
}

#[test]
fn deleting_an_unknown_version_succeeds() {
    for (backend, repository) in repositories(true) {
        let known = AssetPointer::new(Uuid::new_v4(), "1");
        add_asset(&repository, &known, "Known", &[]);
        let unknown = AssetPointer::new(Uuid::new_v4(), "1");
        assert!(repository.delete_asset_version(&unknown).is_ok(), "{}", backend);
        assert!(repository.delete_asset_version(&AssetPointer::new(known.id(), "9")).is_ok());
        assert_eq!(repository.list_assets(None, None, None, None).expect("list").len(), 1);
    }
}

#[test]
fn deleting_a_series_removes_every_version() {
    for (backend, repository) in repositories(true) {
        let id = Uuid::new_v4();
        let versions = [AssetPointer::new(id, "1"), AssetPointer::new(id, "2")];
        let mut artifacts = Vec::new();
        for version in &versions {
            add_asset(&repository, version, "Series", &[]);
            artifacts.push(add_content(&repository, version, version.version()));
        }
        let other = AssetPointer::new(Uuid::new_v4(), "1");
        add_asset(&repository, &other, "Other", &[]);

        repository.delete_asset(&id).expect("delete series");
        assert!(
            matches!(repository.list_asset_versions(&id), Err(RepositoryError::NotFound(_))),
            "{}",
            backend
        );
        assert_eq!(repository.index().get_latest_asset_for_id(&id).expect("latest"), None);
        assert!(artifacts.iter().all(|a| !has_content(&repository, a)), "{}", backend);
        let listed = repository.list_assets(None, None, None, None).expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].asset_id, other);

        assert!(matches!(repository.delete_asset(&id), Err(RepositoryError::NotFound(_))));
    }
}

#[test]
fn dependents_outlive_what_they_depend_on() {
    for (backend, repository) in repositories(true) {
        let library = AssetPointer::new(Uuid::new_v4(), "1");
        let rule = AssetPointer::new(Uuid::new_v4(), "1");
        add_asset(&repository, &library, "Library", &[]);
        add_asset(&repository, &rule, "Rule", &[(Relationship::DependsOn, &library)]);
        add_content(&repository, &library, "<library/>");
        add_content(&repository, &rule, "<rule/>");

        repository.delete_asset_version(&library).expect("delete");
        let surrogate = repository.get_surrogate(&rule, None).expect("dependent surrogate");
        assert!(surrogate.links.contains(&Link::outbound(Relationship::DependsOn, library.clone())));
        assert!(
            repository
                .index()
                .get_outbound(&rule, Some(Relationship::DependsOn))
                .expect("outbound")
                .contains(&library),
            "{}",
            backend
        );
        let bundle = repository.get_bundle(&rule, None, None).expect("bundle");
        assert_eq!(bundle.len(), 1, "{}", backend);
        assert_eq!(bundle[0].as_text(), Some("<rule/>"));
    }
}

#[test]
fn inbound_links_resolve_after_registration() {
    for (backend, repository) in repositories(true) {
        let library = AssetPointer::new(Uuid::new_v4(), "1");
        let rule = AssetPointer::new(Uuid::new_v4(), "1");
        let mut surrogate = KnowledgeAsset::new(library.clone()).named("Library");
        surrogate.links.push(Link::inbound(Relationship::DependsOn, rule.clone()));
        repository.register_surrogate(&library, surrogate).expect("register");

        let served = repository.get_surrogate(&library, None).expect("surrogate");
        assert!(served.links.contains(&Link::inbound(Relationship::DependsOn, rule.clone())), "{}", backend);
        assert!(
            repository
                .index()
                .get_outbound(&rule, Some(Relationship::DependsOn))
                .expect("outbound")
                .contains(&library)
        );
    }
}
