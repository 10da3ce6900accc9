//! Throughput of the RCU hash table's read and write paths.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rcu_core::gp::{read_enter, read_exit, register_thread, unregister_thread};
use rcu_core::ht::Table;

fn bench_lookup_hit(c: &mut Criterion) {
    register_thread();
    let table: Table<u64> = Table::new(1024, 0);
    for k in 0..1000usize {
        table.add(k, k as u64).unwrap();
    }
    c.bench_function("lookup_hit_1000_entries", |b| {
        b.iter(|| {
            read_enter();
            let v = unsafe { table.lookup(500) };
            black_box(v);
            read_exit();
        });
    });
    unregister_thread();
}

fn bench_lookup_miss(c: &mut Criterion) {
    register_thread();
    let table: Table<u64> = Table::new(1024, 0);
    for k in 0..1000usize {
        table.add(k, k as u64).unwrap();
    }
    c.bench_function("lookup_miss_1000_entries", |b| {
        b.iter(|| {
            read_enter();
            let v = unsafe { table.lookup(usize::MAX) };
            black_box(v);
            read_exit();
        });
    });
    unregister_thread();
}

fn bench_add_uncontended(c: &mut Criterion) {
    register_thread();
    let table: Table<u64> = Table::new(4096, 0);
    let mut next_key = 0usize;
    c.bench_function("add_uncontended_unique_keys", |b| {
        b.iter(|| {
            let _ = table.add(next_key, next_key as u64);
            next_key += 1;
        });
    });
    unregister_thread();
}

criterion_group!(benches, bench_lookup_hit, bench_lookup_miss, bench_add_uncontended);
criterion_main!(benches);
