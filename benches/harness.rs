use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use he_bench::capability::Plaintext;
use he_bench::{timed, CryptoContext, ResultSink, Row, SchemeProfile, SimulatedBackend};

/// Cost of validating and writing one timing row.
fn sink_rows(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut group = c.benchmark_group("sink_rows");
    for width in [2usize, 7, 11] {
        let columns: Vec<String> = (0..width).map(|i| format!("col_{i}_us")).collect();
        let row = columns
            .iter()
            .fold(Row::new(), |row, c| row.set(c.as_str(), 123_456));
        let path = dir.path().join(format!("rows_{width}.csv"));
        let mut sink = ResultSink::open(&path, columns).expect("open sink");
        group.bench_with_input(BenchmarkId::from_parameter(width), &row, |b, row| {
            b.iter(|| sink.write_row(row).expect("write row"));
        });
        sink.close().expect("close sink");
    }
    group.finish();
}

/// Overhead `timed` adds around a cheap simulated call.
fn timed_eval_add(c: &mut Criterion) {
    let ctx = SchemeProfile::bfv(65537, 2)
        .build(&SimulatedBackend)
        .expect("context");
    let keys = ctx.key_gen().expect("keys");
    let x = ctx
        .encrypt(&keys, &Plaintext::Integers(vec![1; 16]))
        .expect("encrypt");

    let mut group = c.benchmark_group("eval_add");
    group.bench_function("bare", |b| b.iter(|| ctx.eval_add(&x, &x).expect("add")));
    group.bench_function("timed", |b| {
        b.iter(|| timed(|| ctx.eval_add(&x, &x)).expect("add"));
    });
    group.finish();
}

criterion_group!(benches, sink_rows, timed_eval_add);
criterion_main!(benches);
