use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use knowledge_repo::construct::{AssetPointer, Relationship, Representation};
use knowledge_repo::index::Index;
use knowledge_repo::keeper::KeeperIndex;
use knowledge_repo::negotiation::{decode_preferences, negotiate};
use knowledge_repo::persist::PersistenceMode;
use knowledge_repo::triple::TripleIndex;
use uuid::Uuid;

// a chain of `length` assets where every asset also imports the one two hops ahead
fn build_chain(index: &dyn Index, length: usize) -> AssetPointer {
    let chain: Vec<AssetPointer> = (0..length)
        .map(|_| AssetPointer::new(Uuid::new_v4(), "1.0.0"))
        .collect();
    for (i, from) in chain.iter().enumerate() {
        if let Some(next) = chain.get(i + 1) {
            let _ = index.register_relationship(from, Relationship::Imports, next);
        }
        if let Some(skip) = chain.get(i + 2) {
            let _ = index.register_relationship(from, Relationship::DependsOn, skip);
        }
    }
    chain[0].clone()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let keeper = KeeperIndex::new(PersistenceMode::InMemory).expect("keeper index");
    let triple = TripleIndex::new();
    for length in [10, 1_000, 10_000] {
        let root = build_chain(&keeper, length);
        c.bench_function(&format!("keeper closure {}", length), |b| {
            b.iter(|| keeper.get_related_assets(black_box(&root), None))
        });
        let root = build_chain(&triple, length);
        c.bench_function(&format!("triple closure {}", length), |b| {
            b.iter(|| triple.get_related_assets(black_box(&root), None))
        });
    }

    let code = "model/knart+xml;q=0.8, lang=HTML;fmt=TXT;q=0.5, lang=DMN;fmt=XML;charset=UTF-8, */*;q=0.1";
    c.bench_function("decode preferences", |b| b.iter(|| decode_preferences(black_box(code), None)));

    let candidates: Vec<Representation> = (0..100)
        .map(|n| Representation::new(&format!("L{}", n)).with_format("XML"))
        .collect();
    let preferences = decode_preferences("lang=L99;fmt=XML, lang=L50;q=0.5", None);
    c.bench_function("negotiate 100", |b| {
        b.iter(|| negotiate(black_box(&candidates), black_box(&preferences)).is_some())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
