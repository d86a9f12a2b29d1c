use core::hash::Hash;
use core::hash::Hasher;
use core::hint::black_box;

use criterion::Criterion;
use criterion::Throughput;
use criterion::criterion_group;
use criterion::criterion_main;
use hashbrown::hash_table::Entry as HashbrownEntry;
use hashbrown::hash_table::HashTable as HashbrownHashTable;
use probe_hash::HashTable as ProbeHashTable;
use probe_hash::hash_table::Entry;
use rand::TryRngCore;
use rand::rngs::OsRng;
use siphasher::sip::SipHasher;

#[derive(Clone, Debug, PartialEq, Eq)]
struct TestItem {
    key: String,
    value: u64,
}

impl TestItem {
    fn new(key: u64) -> Self {
        black_box(Self {
            key: format!("key_{}", key),
            value: key,
        })
    }
}

const SIZES: &[usize] = &[
    ((1 << 10) as f32 * 0.8) as usize,
    ((1 << 15) as f32 * 0.8) as usize,
    ((1 << 19) as f32 * 0.8) as usize,
];

fn hash_key(key: &str) -> u64 {
    let mut hasher = SipHasher::new();
    key.hash(&mut hasher);
    black_box(hasher.finish())
}

fn items(keys: impl Iterator<Item = u64>) -> Vec<(u64, TestItem)> {
    keys.map(|key| {
        let item = TestItem::new(key);
        let hash = hash_key(&item.key);
        (hash, item)
    })
    .collect()
}

fn fill_probe(hash_and_item: &[(u64, TestItem)], capacity: usize) -> ProbeHashTable<TestItem> {
    let mut table = ProbeHashTable::<TestItem>::with_capacity(capacity).unwrap();
    for (hash, item) in hash_and_item.iter().cloned() {
        match table
            .entry(hash, |v| v.key == item.key, |v| hash_key(&v.key))
            .unwrap()
        {
            Entry::Vacant(entry) => {
                entry.insert(item);
            }
            Entry::Occupied(_) => unreachable!(),
        }
    }
    table
}

fn fill_hashbrown(hash_and_item: &[(u64, TestItem)], capacity: usize) -> HashbrownHashTable<TestItem> {
    let mut table = HashbrownHashTable::<TestItem>::with_capacity(capacity);
    for (hash, item) in hash_and_item.iter().cloned() {
        match table.entry(hash, |v| v.key == item.key, |v| hash_key(&v.key)) {
            HashbrownEntry::Vacant(entry) => {
                entry.insert(item);
            }
            HashbrownEntry::Occupied(_) => unreachable!(),
        }
    }
    table
}

fn bench_insert_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_sequential");

    for size in SIZES.iter() {
        group.throughput(Throughput::Elements(*size as u64));
        let hash_and_item = items(0..*size as u64);

        group.bench_function(format!("probe_hash/{}", size), |b| {
            b.iter(|| black_box(fill_probe(&hash_and_item, 0)))
        });
        group.bench_function(format!("probe_hash_preallocated/{}", size), |b| {
            b.iter(|| black_box(fill_probe(&hash_and_item, *size)))
        });
        group.bench_function(format!("hashbrown/{}", size), |b| {
            b.iter(|| black_box(fill_hashbrown(&hash_and_item, 0)))
        });
        group.bench_function(format!("hashbrown_preallocated/{}", size), |b| {
            b.iter(|| black_box(fill_hashbrown(&hash_and_item, *size)))
        });
    }

    group.finish();
}

fn bench_insert_random(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_random");

    let mut rng = OsRng;

    for size in SIZES.iter() {
        group.throughput(Throughput::Elements(*size as u64));
        let random_keys: Vec<u64> = (0..*size).map(|_| rng.try_next_u64().unwrap()).collect();
        let hash_and_item = items(random_keys.into_iter());

        group.bench_function(format!("probe_hash/{}", size), |b| {
            b.iter(|| black_box(fill_probe(&hash_and_item, 0)))
        });
        group.bench_function(format!("hashbrown/{}", size), |b| {
            b.iter(|| black_box(fill_hashbrown(&hash_and_item, 0)))
        });
    }

    group.finish();
}

fn bench_find_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_hit");

    for size in SIZES.iter() {
        group.throughput(Throughput::Elements(*size as u64));
        let hash_and_item = items(0..*size as u64);
        let probe_table = fill_probe(&hash_and_item, *size);
        let hashbrown_table = fill_hashbrown(&hash_and_item, *size);

        group.bench_function(format!("probe_hash/{}", size), |b| {
            b.iter(|| {
                for (hash, item) in hash_and_item.iter() {
                    black_box(probe_table.find(*hash, |v| v.key == item.key));
                }
            })
        });
        group.bench_function(format!("hashbrown/{}", size), |b| {
            b.iter(|| {
                for (hash, item) in hash_and_item.iter() {
                    black_box(hashbrown_table.find(*hash, |v| v.key == item.key));
                }
            })
        });
    }

    group.finish();
}

fn bench_find_miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_miss");

    for size in SIZES.iter() {
        group.throughput(Throughput::Elements(*size as u64));
        let hash_and_item = items(0..*size as u64);
        let missing = items(*size as u64..2 * *size as u64);
        let probe_table = fill_probe(&hash_and_item, *size);
        let hashbrown_table = fill_hashbrown(&hash_and_item, *size);

        group.bench_function(format!("probe_hash/{}", size), |b| {
            b.iter(|| {
                for (hash, item) in missing.iter() {
                    black_box(probe_table.find(*hash, |v| v.key == item.key));
                }
            })
        });
        group.bench_function(format!("hashbrown/{}", size), |b| {
            b.iter(|| {
                for (hash, item) in missing.iter() {
                    black_box(hashbrown_table.find(*hash, |v| v.key == item.key));
                }
            })
        });
    }

    group.finish();
}

fn bench_remove_half(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove_half");

    for size in SIZES.iter() {
        group.throughput(Throughput::Elements((*size / 2) as u64));
        let hash_and_item = items(0..*size as u64);

        group.bench_function(format!("probe_hash/{}", size), |b| {
            b.iter_batched(
                || fill_probe(&hash_and_item, *size),
                |mut table| {
                    for (hash, item) in hash_and_item.iter().step_by(2) {
                        black_box(table.remove(*hash, |v| v.key == item.key));
                    }
                    table
                },
                criterion::BatchSize::LargeInput,
            )
        });
        group.bench_function(format!("hashbrown/{}", size), |b| {
            b.iter_batched(
                || fill_hashbrown(&hash_and_item, *size),
                |mut table| {
                    for (hash, item) in hash_and_item.iter().step_by(2) {
                        if let Ok(entry) = table.find_entry(*hash, |v| v.key == item.key) {
                            black_box(entry.remove().0);
                        }
                    }
                    table
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_sequential,
    bench_insert_random,
    bench_find_hit,
    bench_find_miss,
    bench_remove_half
);
criterion_main!(benches);
