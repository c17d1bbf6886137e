//! Overload resolution benchmarks using criterion.
//!
//! Run with: cargo bench --bench resolve_bench

use contramock::{Mock, TypeRegistry};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const OVERLOADS: &str = r#"
funcs: Pick: [
	#MockFunction & { args: ["a"], returns: [1] },
	#MockFunction & { args: ["b"], returns: [2] },
	#MockFunction & { args: ["c"], returns: [3] },
	#MockFunction & { args: [string], returns: [0] },
]
"#;

/// Benchmark compiling a schema into a mock
fn bench_compile(c: &mut Criterion) {
    let registry = TypeRegistry::new();
    c.bench_function("compile_overloads", |b| {
        b.iter(|| black_box(Mock::new(&registry, OVERLOADS)))
    });
}

/// Benchmark calls matched by the first and the last overload
fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    let mut mock = match Mock::new(&TypeRegistry::new(), OVERLOADS) {
        Ok(mock) => mock,
        Err(error) => panic!("{error}"),
    };

    for arg in ["a", "c", "z"] {
        group.bench_with_input(BenchmarkId::from_parameter(arg), &arg, |b, &arg| {
            b.iter(|| black_box(mock.exec1::<i64, _>("Pick", (arg,))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_resolve);
criterion_main!(benches);
