//! Victim selection cost per policy.
//!
//! Each iteration clones a pre-populated index and FTL so the selection
//! always starts from the same candidate population.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use ftl_gc::config::{FtlGeometry, GcConfig};
use ftl_gc::gc::policy::PolicyKind;
use ftl_gc::gc::VictimIndex;
use ftl_gc::sim::MemoryFtl;
use ftl_gc::VictimPolicy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

const BLOCKS_PER_DIE: usize = 256;
const PAGES_PER_BLOCK: usize = 64;

fn populate() -> (FtlGeometry, VictimIndex, MemoryFtl) {
    let physical = BLOCKS_PER_DIE * PAGES_PER_BLOCK;
    let geometry = FtlGeometry::new(1, BLOCKS_PER_DIE, PAGES_PER_BLOCK, physical / 2);
    let mut index = VictimIndex::new(&geometry);
    let mut ftl = MemoryFtl::new(geometry).unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    #[allow(clippy::cast_possible_truncation)]
    let logical = geometry.logical_slices as u32;
    for lsa in 0..logical {
        ftl.write(lsa).unwrap();
    }
    for _ in 0..logical / 2 {
        if let Some(stale) = ftl.write(rng.gen_range(0..logical)).unwrap() {
            index
                .insert(stale.die, stale.block, stale.invalid_slices)
                .unwrap();
        }
    }
    (geometry, index, ftl)
}

fn bench_select(c: &mut Criterion) {
    let (geometry, index, ftl) = populate();
    let mut group = c.benchmark_group("victim_selection");

    for kind in [
        PolicyKind::Greedy,
        PolicyKind::CostBenefit,
        PolicyKind::Generational,
    ] {
        let config = GcConfig::default().with_policy(kind);
        group.bench_function(kind.to_string(), |b| {
            b.iter_batched(
                || (kind.build(&geometry, &config), index.clone()),
                |(mut policy, mut index)| {
                    black_box(policy.select_victim(0, &mut index, &ftl).ok());
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_select);
criterion_main!(benches);
