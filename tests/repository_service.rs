use std::sync::Arc;

use axum::http::StatusCode;
use knowledge_repo::RepositoryError;
use knowledge_repo::construct::{AssetPointer, KnowledgeArtifact, KnowledgeAsset, Representation};
use knowledge_repo::href::HrefBuilder;
use knowledge_repo::index::Index;
use knowledge_repo::keeper::KeeperIndex;
use knowledge_repo::persist::PersistenceMode;
use knowledge_repo::repository::Repository;
use knowledge_repo::settings::{IndexBackend, RepositorySettings, Settings};
use knowledge_repo::store::MemoryArtifactStore;
use uuid::Uuid;

fn repository(settings: RepositorySettings) -> Repository {
    let index = Arc::new(KeeperIndex::new(PersistenceMode::InMemory).expect("keeper index")) as Arc<dyn Index>;
    Repository::new(index, Arc::new(MemoryArtifactStore::new()), settings)
        .with_locators(Arc::new(HrefBuilder::new("http://localhost:8080")))
}

fn register(repository: &Repository, asset: &AssetPointer, name: &str, asset_type: &str) {
    let surrogate = KnowledgeAsset::new(asset.clone()).named(name).with_type(asset_type);
    repository.register_surrogate(asset, surrogate).expect("register surrogate");
}

fn add_carrier(repository: &Repository, asset: &AssetPointer, language: &str, text: &str) -> AssetPointer {
    let artifact = AssetPointer::new(Uuid::new_v4(), "0.0.1");
    repository
        .register_carrier(
            asset,
            &artifact,
            Representation::new(language).with_format("TXT"),
            Some(language),
            text.as_bytes().to_vec(),
        )
        .expect("register carrier");
    artifact
}

#[test]
fn listing_filters_orders_and_pages() {
    let repository = repository(RepositorySettings::default());
    for i in 0..5 {
        register(&repository, &AssetPointer::new(Uuid::new_v4(), "1"), &format!("Asset {}", i), "Rule");
    }
    let terminology = AssetPointer::new(Uuid::new_v4(), "1");
    register(&repository, &terminology, "Terms", "Terminology");

    assert_eq!(repository.list_assets(None, None, None, None).expect("all").len(), 6);
    let page = repository.list_assets(Some("Rule"), None, Some(1), Some(2)).expect("page");
    let names: Vec<&str> = page.iter().filter_map(|s| s.name.as_deref()).collect();
    assert_eq!(names, vec!["Asset 1", "Asset 2"]);
    assert_eq!(page[0].primary_type.as_deref(), Some("Rule"));

    let terms = repository.list_assets(Some("Terminology"), None, None, None).expect("terms");
    assert_eq!(terms.len(), 1);
    assert_eq!(terms[0].asset_id, terminology);
    assert!(repository.list_assets(Some("Rule"), None, Some(10), None).expect("beyond").is_empty());
}

#[test]
fn listing_by_annotation() {
    let repository = repository(RepositorySettings::default());
    let a = AssetPointer::new(Uuid::new_v4(), "1");
    let surrogate = KnowledgeAsset::new(a.clone())
        .with_type("Rule")
        .with_annotation(Some("captures"), "Hypertension");
    repository.register_surrogate(&a, surrogate).expect("register");
    register(&repository, &AssetPointer::new(Uuid::new_v4(), "1"), "Other", "Rule");

    let found = repository.list_assets(None, Some("Hypertension"), None, None).expect("annotation");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].asset_id, a);
    let found = repository
        .list_assets(Some("Rule"), Some("captures:Hypertension"), None, None)
        .expect("both filters");
    assert_eq!(found.len(), 1);
}

#[test]
fn a_series_is_listed_once_at_its_latest_version() {
    let repository = repository(RepositorySettings::default());
    let id = Uuid::new_v4();
    register(&repository, &AssetPointer::new(id, "1.0.0"), "Guideline", "Rule");
    register(&repository, &AssetPointer::new(id, "2.0.0"), "Guideline", "Rule");
    let listed = repository.list_assets(None, None, None, None).expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].asset_id.version(), "2.0.0");

    let versions = repository.list_asset_versions(&id).expect("versions");
    let tags: Vec<&str> = versions.iter().map(|v| v.version()).collect();
    assert_eq!(tags, vec!["2.0.0", "1.0.0"]);
    assert!(matches!(
        repository.list_asset_versions(&Uuid::new_v4()),
        Err(RepositoryError::NotFound(_))
    ));
}

#[test]
fn surrogates_are_returned_enriched() {
    let repository = repository(RepositorySettings::default());
    let id = Uuid::new_v4();
    let asset = AssetPointer::new(id, "1");
    register(&repository, &asset, "Guideline", "Rule");
    let artifact = add_carrier(&repository, &asset, "CQL", "define X: true");

    let latest = repository.get_latest_surrogate(&id, None).expect("latest");
    assert_eq!(latest.asset_id, asset);
    assert_eq!(latest.carriers.len(), 1);
    let locator = latest.carriers[0].locator.as_deref().expect("locator");
    assert!(locator.ends_with(&format!("/carriers/{}/versions/0.0.1", artifact.id())));

    let location = repository.index().get_location(&asset).expect("location");
    assert!(location.starts_with(&format!("http://localhost:8080/cat/assets/{}/versions/1/surrogate/", id)));
    assert!(matches!(
        repository.get_latest_surrogate(&Uuid::new_v4(), None),
        Err(RepositoryError::NotFound(_))
    ));
}

#[test]
fn surrogates_are_only_offered_in_their_own_form_or_html() {
    let repository = repository(RepositorySettings::default());
    let asset = AssetPointer::new(Uuid::new_v4(), "1");
    register(&repository, &asset, "Guideline", "Rule");
    assert!(repository.get_surrogate(&asset, None).is_ok());
    assert!(repository.get_surrogate(&asset, Some("")).is_ok());
    assert!(repository.get_surrogate(&asset, Some("lang=HTML")).is_ok());
    assert!(repository.get_surrogate(&asset, Some("lang=Knowledge_Asset_Surrogate_2_0;fmt=JSON")).is_ok());
    assert!(matches!(
        repository.get_surrogate(&asset, Some("lang=DMN")),
        Err(RepositoryError::NotAcceptable(_))
    ));
}

#[test]
fn surrogates_must_describe_the_pointer_they_are_registered_under() {
    let repository = repository(RepositorySettings::default());
    let asset = AssetPointer::new(Uuid::new_v4(), "1");
    let other = KnowledgeAsset::new(AssetPointer::new(asset.id(), "2"));
    assert!(matches!(
        repository.register_surrogate(&asset, other),
        Err(RepositoryError::Conflict(_))
    ));
}

#[test]
fn ephemeral_descriptors_are_not_stored() {
    let repository = repository(RepositorySettings::default());
    let asset = AssetPointer::new(Uuid::new_v4(), "1");
    let mut ephemeral = KnowledgeArtifact::new(AssetPointer::new(Uuid::new_v4(), "1"), Representation::new("HTML"));
    ephemeral.ephemeral = true;
    let surrogate = KnowledgeAsset::new(asset.clone())
        .with_carrier(KnowledgeArtifact::new(AssetPointer::new(Uuid::new_v4(), "1"), Representation::new("DMN")))
        .with_carrier(ephemeral);
    repository.register_surrogate(&asset, surrogate).expect("register");
    let stored = repository.get_surrogate(&asset, None).expect("surrogate");
    assert_eq!(stored.carriers.len(), 1);
    assert!(!stored.carriers[0].ephemeral);
}

#[test]
fn carriers_need_a_surrogate_and_keep_their_content() {
    let repository = repository(RepositorySettings::default());
    let asset = AssetPointer::new(Uuid::new_v4(), "1");
    let artifact = AssetPointer::new(Uuid::new_v4(), "1");
    let orphan = repository.register_carrier(&asset, &artifact, Representation::new("DMN"), None, b"x".to_vec());
    assert!(matches!(orphan, Err(RepositoryError::NotFound(_))));

    register(&repository, &asset, "Guideline", "Rule");
    repository
        .register_carrier(&asset, &artifact, Representation::new("DMN"), None, b"same".to_vec())
        .expect("first");
    repository
        .register_carrier(&asset, &artifact, Representation::new("DMN"), None, b"same".to_vec())
        .expect("identical again");
    let changed = repository.register_carrier(&asset, &artifact, Representation::new("DMN"), None, b"other".to_vec());
    assert!(matches!(changed, Err(RepositoryError::Conflict(_))));

    let carrier = repository.get_carrier_version(&asset, &artifact).expect("carrier");
    assert_eq!(carrier.as_text(), Some("same"));
    assert_eq!(repository.get_surrogate(&asset, None).expect("surrogate").carriers.len(), 1);
    assert!(matches!(
        repository.get_carrier_version(&asset, &AssetPointer::new(Uuid::new_v4(), "1")),
        Err(RepositoryError::NotFound(_))
    ));
}

#[test]
fn canonical_carrier_is_negotiated() {
    let repository = repository(RepositorySettings::default());
    let asset = AssetPointer::new(Uuid::new_v4(), "1");
    register(&repository, &asset, "Guideline", "Rule");
    assert!(matches!(
        repository.get_canonical_carrier(&asset, None),
        Err(RepositoryError::NotFound(_))
    ));
    add_carrier(&repository, &asset, "DMN", "<dmn/>");
    add_carrier(&repository, &asset, "CQL", "define X: true");

    let any = repository.get_canonical_carrier(&asset, None).expect("any");
    assert_eq!(any.as_text(), Some("<dmn/>"));
    let cql = repository.get_canonical_carrier(&asset, Some("lang=OWL, lang=CQL;q=0.5")).expect("cql");
    assert_eq!(cql.as_text(), Some("define X: true"));
    assert_eq!(cql.label.as_deref(), Some("CQL"));
    assert!(matches!(
        repository.get_canonical_carrier(&asset, Some("lang=OWL")),
        Err(RepositoryError::NotAcceptable(_))
    ));
}

#[test]
fn lenient_negotiation_settles_for_any_carrier() {
    let settings = RepositorySettings {
        lenient_weight: 0.5,
        ..RepositorySettings::default()
    };
    let repository = repository(settings);
    let asset = AssetPointer::new(Uuid::new_v4(), "1");
    register(&repository, &asset, "Guideline", "Rule");
    add_carrier(&repository, &asset, "DMN", "<dmn/>");
    let carrier = repository.get_canonical_carrier(&asset, Some("lang=OWL;q=0.4")).expect("lenient");
    assert_eq!(carrier.as_text(), Some("<dmn/>"));
    assert!(repository.get_canonical_carrier(&asset, Some("lang=OWL;q=0.9")).is_err());
}

#[test]
fn clearing_is_disabled_by_default() {
    let repository = repository(RepositorySettings::default());
    register(&repository, &AssetPointer::new(Uuid::new_v4(), "1"), "Guideline", "Rule");
    assert!(matches!(repository.clear_all(), Err(RepositoryError::Forbidden(_))));
    assert_eq!(repository.list_assets(None, None, None, None).expect("list").len(), 1);
}

#[test]
fn clearing_wipes_index_and_content_when_enabled() {
    let settings = RepositorySettings {
        allow_clear_all: true,
        ..RepositorySettings::default()
    };
    let repository = repository(settings);
    let asset = AssetPointer::new(Uuid::new_v4(), "1");
    register(&repository, &asset, "Guideline", "Rule");
    let artifact = add_carrier(&repository, &asset, "DMN", "<dmn/>");
    repository.clear_all().expect("clear");
    assert!(repository.list_assets(None, None, None, None).expect("list").is_empty());
    assert!(matches!(
        repository.artifacts().get_canonical_content(&artifact.id(), artifact.version()),
        Err(RepositoryError::NotFound(_))
    ));
}

#[test]
fn repositories_are_built_from_settings() {
    let settings = Settings::default();
    let repository = Repository::from_settings(&settings).expect("keeper repository");
    assert!(!repository.settings().allow_clear_all);

    let mut triple = Settings::default();
    triple.index.backend = IndexBackend::Triple;
    assert!(Repository::from_settings(&triple).is_ok());
    triple.index.path = Some("index.db".to_string());
    assert!(matches!(
        Repository::from_settings(&triple).err(),
        Some(RepositoryError::Config(_))
    ));
}

#[test]
fn errors_map_to_http_statuses() {
    assert_eq!(RepositoryError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
    assert_eq!(RepositoryError::NotAcceptable("x".into()).status(), StatusCode::NOT_ACCEPTABLE);
    assert_eq!(RepositoryError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
    assert_eq!(RepositoryError::Conflict("x".into()).status(), StatusCode::CONFLICT);
    assert_eq!(RepositoryError::Unsupported("x".into()).status(), StatusCode::NOT_IMPLEMENTED);
    assert_eq!(
        RepositoryError::PreconditionFailed("x".into()).status(),
        StatusCode::PRECONDITION_FAILED
    );
    assert_eq!(
        RepositoryError::Parse { message: "x".into() }.status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(RepositoryError::Lock("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn carriers_and_surrogates_are_listed_with_their_content() {
    let repository = repository(RepositorySettings::default());
    let asset = AssetPointer::new(Uuid::new_v4(), "1");
    register(&repository, &asset, "Statins", "Rule");
    let dmn = add_carrier(&repository, &asset, "DMN", "<dmn/>");
    let cql = add_carrier(&repository, &asset, "CQL", "define X: true");

    let carriers = repository.list_carriers(&asset).expect("carriers");
    assert_eq!(carriers.len(), 2);
    let listed = carriers.iter().find(|c| c.artifact_id == dmn).expect("dmn listed");
    assert!(listed.representation.as_ref().expect("representation").has_language("DMN"));
    let href = listed.href.as_deref().expect("href");
    assert!(href.ends_with(&format!("/carriers/{}/versions/0.0.1", dmn.id())));
    let receipt = listed.content.as_ref().expect("content");
    assert_eq!(receipt.digest, blake3::hash(b"<dmn/>").to_hex().to_string());
    assert_eq!(receipt.size, 6);
    assert!(carriers.iter().any(|c| c.artifact_id == cql));

    let surrogates = repository.list_surrogates(&asset).expect("surrogates");
    assert_eq!(surrogates.len(), 1);
    assert_eq!(surrogates[0].artifact_id, knowledge_repo::repository::surrogate_pointer(&asset));
    assert_eq!(
        surrogates[0].representation,
        Some(repository.settings().surrogate_representation())
    );
    assert!(surrogates[0].href.as_deref().expect("href").contains("/surrogate/"));
    assert!(surrogates[0].content.is_some());

    let unknown = AssetPointer::new(Uuid::new_v4(), "1");
    assert!(matches!(repository.list_carriers(&unknown), Err(RepositoryError::NotFound(_))));
    assert!(matches!(repository.list_surrogates(&unknown), Err(RepositoryError::NotFound(_))));
}

#[test]
fn alternate_surrogates_follow_the_canonical_one() {
    let repository = repository(RepositorySettings::default());
    let asset = AssetPointer::new(Uuid::new_v4(), "1");
    let alternate = AssetPointer::new(Uuid::new_v4(), "2");
    let mut transient = KnowledgeArtifact::new(AssetPointer::new(Uuid::new_v4(), "1"), Representation::new("HTML"));
    transient.ephemeral = true;
    let surrogate = KnowledgeAsset::new(asset.clone())
        .named("Statins")
        .with_surrogate(KnowledgeArtifact::new(alternate.clone(), Representation::new("FHIR")))
        .with_surrogate(transient);
    repository.register_surrogate(&asset, surrogate).expect("register");

    let surrogates = repository.list_surrogates(&asset).expect("surrogates");
    assert_eq!(surrogates.len(), 2);
    assert_eq!(surrogates[1].artifact_id, alternate);
    assert!(surrogates[1].representation.as_ref().expect("representation").has_language("FHIR"));
    // only the canonical surrogate is stored by the repository
    assert!(surrogates[1].content.is_none());
}
