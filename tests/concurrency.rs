use std::sync::Arc;
use std::thread;

use knowledge_repo::construct::{AssetPointer, Relationship};
use knowledge_repo::index::Index;
use knowledge_repo::keeper::KeeperIndex;
use knowledge_repo::persist::PersistenceMode;
use knowledge_repo::triple::TripleIndex;
use uuid::Uuid;

const THREADS: usize = 8;
const PER_THREAD: usize = 50;

fn backends() -> Vec<(&'static str, Arc<dyn Index>)> {
    vec![
        (
            "keeper",
            Arc::new(KeeperIndex::new(PersistenceMode::InMemory).expect("keeper index")) as Arc<dyn Index>,
        ),
        ("triple", Arc::new(TripleIndex::new()) as Arc<dyn Index>),
    ]
}

fn register(index: &dyn Index, asset: &AssetPointer) {
    index
        .register_asset(
            asset,
            &AssetPointer::new(Uuid::new_v4(), asset.version()),
            &["Rule".to_string()],
            &[],
            &[],
            None,
            None,
        )
        .expect("register asset");
}

#[test]
fn distinct_series_do_not_interfere() {
    for (name, index) in backends() {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let index = Arc::clone(&index);
                thread::spawn(move || {
                    let mut mine = Vec::new();
                    for _ in 0..PER_THREAD {
                        let asset = AssetPointer::new(Uuid::new_v4(), "1");
                        register(&*index, &asset);
                        mine.push(asset);
                    }
                    mine
                })
            })
            .collect();
        let registered: Vec<AssetPointer> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread"))
            .collect();
        assert_eq!(index.get_all_asset_ids().expect("all").len(), THREADS * PER_THREAD, "{}", name);
        for asset in &registered {
            assert_eq!(
                index.get_latest_asset_for_id(&asset.id()).expect("latest").as_ref(),
                Some(asset),
                "{}",
                name
            );
        }
    }
}

#[test]
fn same_series_races_settle_on_a_registered_version() {
    for (name, index) in backends() {
        let id = Uuid::new_v4();
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let index = Arc::clone(&index);
                thread::spawn(move || {
                    for v in 0..PER_THREAD {
                        register(&*index, &AssetPointer::new(id, format!("{}.{}", t, v)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }
        let versions = index.get_asset_versions(&id).expect("versions");
        assert_eq!(versions.len(), THREADS * PER_THREAD, "{}", name);
        let latest = index.get_latest_asset_for_id(&id).expect("latest").expect("some latest");
        assert!(versions.contains(&latest), "{}", name);
    }
}

#[test]
fn closures_can_be_read_while_the_graph_grows() {
    for (name, index) in backends() {
        let root = AssetPointer::new(Uuid::new_v4(), "1");
        let writer = {
            let index = Arc::clone(&index);
            let root = root.clone();
            thread::spawn(move || {
                let mut previous = root;
                for _ in 0..PER_THREAD {
                    let next = AssetPointer::new(Uuid::new_v4(), "1");
                    index
                        .register_relationship(&previous, Relationship::Imports, &next)
                        .expect("relationship");
                    previous = next;
                }
            })
        };
        let readers: Vec<_> = (0..THREADS)
            .map(|_| {
                let index = Arc::clone(&index);
                let root = root.clone();
                thread::spawn(move || {
                    for _ in 0..PER_THREAD {
                        let closure = index.get_related_assets(&root, None).expect("closure");
                        assert!(closure.contains(&root));
                    }
                })
            })
            .collect();
        writer.join().expect("writer");
        for reader in readers {
            reader.join().expect("reader");
        }
        assert_eq!(index.get_related_assets(&root, None).expect("closure").len(), PER_THREAD + 1, "{}", name);
    }
}
