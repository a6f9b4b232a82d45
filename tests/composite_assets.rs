use std::sync::Arc;

use knowledge_repo::RepositoryError;
use knowledge_repo::composite::StructureEdge;
use knowledge_repo::construct::{AssetPointer, KnowledgeAsset, Relationship, Representation};
use knowledge_repo::index::Index;
use knowledge_repo::keeper::KeeperIndex;
use knowledge_repo::persist::PersistenceMode;
use knowledge_repo::repository::Repository;
use knowledge_repo::settings::RepositorySettings;
use knowledge_repo::store::MemoryArtifactStore;
use knowledge_repo::triple::TripleIndex;
use uuid::Uuid;

fn repositories() -> Vec<(&'static str, Repository)> {
    let keeper = Arc::new(KeeperIndex::new(PersistenceMode::InMemory).expect("keeper index")) as Arc<dyn Index>;
    let triple = Arc::new(TripleIndex::new()) as Arc<dyn Index>;
    vec![
        (
            "keeper",
            Repository::new(keeper, Arc::new(MemoryArtifactStore::new()), RepositorySettings::default()),
        ),
        (
            "triple",
            Repository::new(triple, Arc::new(MemoryArtifactStore::new()), RepositorySettings::default()),
        ),
    ]
}

fn pointer() -> AssetPointer {
    AssetPointer::new(Uuid::new_v4(), "1.0.0")
}

fn add_asset(repository: &Repository, asset: &AssetPointer, name: &str, links: &[(Relationship, &AssetPointer)]) {
    let mut surrogate = KnowledgeAsset::new(asset.clone()).named(name);
    for (rel, target) in links {
        surrogate = surrogate.with_link(*rel, (*target).clone());
    }
    repository.register_surrogate(asset, surrogate).expect("register surrogate");
}

fn edge(from: &AssetPointer, rel: Relationship, to: &AssetPointer) -> StructureEdge {
    StructureEdge {
        from: from.clone(),
        rel,
        to: to.clone(),
    }
}

struct Panel {
    composite: AssetPointer,
    structuring: AssetPointer,
    section: AssetPointer,
    note: AssetPointer,
    // reached through the section, never registered
    detail: AssetPointer,
    library: AssetPointer,
}

// a panel with two parts, the first of which has a part of its own
fn panel(repository: &Repository) -> Panel {
    let panel = Panel {
        composite: pointer(),
        structuring: pointer(),
        section: pointer(),
        note: pointer(),
        detail: pointer(),
        library: pointer(),
    };
    add_asset(
        repository,
        &panel.composite,
        "Panel",
        &[
            (Relationship::HasPart, &panel.section),
            (Relationship::HasPart, &panel.note),
            (Relationship::HasStructuringComponent, &panel.structuring),
        ],
    );
    add_asset(
        repository,
        &panel.section,
        "Section",
        &[
            (Relationship::HasPart, &panel.detail),
            (Relationship::DependsOn, &panel.library),
        ],
    );
    add_asset(repository, &panel.note, "Note", &[]);
    repository
        .register_carrier(
            &panel.section,
            &pointer(),
            Representation::new("DMN").with_format("XML"),
            None,
            b"<section/>".to_vec(),
        )
        .expect("register carrier");
    panel
}

#[test]
fn structure_collects_parts_and_structural_edges() {
    for (backend, repository) in repositories() {
        let panel = panel(&repository);
        let structure = repository.get_composite_structure(&panel.composite).expect("structure");
        assert_eq!(structure.composite, panel.composite);
        assert_eq!(structure.structuring, Some(panel.structuring.clone()), "{}", backend);

        let mut components = vec![panel.section.clone(), panel.note.clone(), panel.detail.clone()];
        components.sort();
        assert_eq!(structure.components, components, "{}", backend);

        assert_eq!(structure.edges.len(), 4, "{}", backend);
        for expected in [
            edge(&panel.composite, Relationship::HasPart, &panel.section),
            edge(&panel.composite, Relationship::HasPart, &panel.note),
            edge(&panel.composite, Relationship::HasStructuringComponent, &panel.structuring),
            edge(&panel.section, Relationship::HasPart, &panel.detail),
        ] {
            assert!(structure.edges.contains(&expected), "{} misses {:?}", backend, expected);
        }
        // dependencies are not part of the structure
        assert!(structure.edges.iter().all(|e| e.to != panel.library));
    }
}

#[test]
fn only_composites_have_a_structure() {
    for (backend, repository) in repositories() {
        let plain = pointer();
        add_asset(&repository, &plain, "Plain", &[(Relationship::DependsOn, &pointer())]);
        assert!(
            matches!(
                repository.get_composite_structure(&plain),
                Err(RepositoryError::PreconditionFailed(_))
            ),
            "{}",
            backend
        );
        assert!(matches!(
            repository.get_composite_surrogate(&plain, None),
            Err(RepositoryError::PreconditionFailed(_))
        ));
        assert!(matches!(
            repository.get_composite_structure(&pointer()),
            Err(RepositoryError::NotFound(_))
        ));

        // a structuring asset alone is enough
        let outline = pointer();
        let structuring = pointer();
        add_asset(&repository, &outline, "Outline", &[(Relationship::HasStructuringComponent, &structuring)]);
        let structure = repository.get_composite_structure(&outline).expect("structure");
        assert!(structure.components.is_empty(), "{}", backend);
        assert_eq!(structure.structuring, Some(structuring));
    }
}

#[test]
fn composite_surrogates_skip_unresolvable_components() {
    for (backend, repository) in repositories() {
        let panel = panel(&repository);
        let composite = repository.get_composite_surrogate(&panel.composite, None).expect("composite");
        assert_eq!(composite.name.as_deref(), Some("Panel"));
        assert_eq!(composite.structure.components.len(), 3);
        let mut names: Vec<String> = composite.components.iter().filter_map(|s| s.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["Note", "Section"], "{}", backend);
    }
}

#[test]
fn composite_carriers_hold_each_negotiated_component_carrier() {
    for (backend, repository) in repositories() {
        let panel = panel(&repository);
        let composite = repository.get_composite_carrier(&panel.composite, None).expect("composite");
        assert_eq!(composite.name.as_deref(), Some("Panel"));
        assert_eq!(composite.components.len(), 1, "{}", backend);
        assert_eq!(composite.components[0].asset_id, panel.section);
        assert_eq!(composite.components[0].as_text(), Some("<section/>"));

        let strict = repository
            .get_composite_carrier(&panel.composite, Some("lang=OWL"))
            .expect("composite");
        assert!(strict.components.is_empty(), "{}", backend);
    }
}
