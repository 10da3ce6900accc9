//! Reader-side and writer-side cost of the grace-period engine.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rcu_core::gp::{read_enter, read_exit, register_thread, synchronize, unregister_thread};

fn bench_read_section(c: &mut Criterion) {
    register_thread();
    c.bench_function("read_enter_exit_uncontended", |b| {
        b.iter(|| {
            read_enter();
            black_box(());
            read_exit();
        });
    });
    unregister_thread();
}

fn bench_nested_read_section(c: &mut Criterion) {
    register_thread();
    c.bench_function("read_enter_exit_nested_depth_4", |b| {
        b.iter(|| {
            read_enter();
            read_enter();
            read_enter();
            read_enter();
            read_exit();
            read_exit();
            read_exit();
            read_exit();
        });
    });
    unregister_thread();
}

fn bench_synchronize_single_writer(c: &mut Criterion) {
    register_thread();
    c.bench_function("synchronize_single_writer_no_readers", |b| {
        b.iter(synchronize);
    });
    unregister_thread();
}

criterion_group!(
    benches,
    bench_read_section,
    bench_nested_read_section,
    bench_synchronize_single_writer
);
criterion_main!(benches);
