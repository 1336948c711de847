//! Benchmarks for the reconciler and the reactive flush
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use trellis_core::reactive::{create_effect, reactive, run_microtasks, Value};
use trellis_core::vdom::{diff, DiffState, Document, Element, VNode};

fn keyed_list(keys: impl Iterator<Item = usize>) -> VNode {
    Element::new("ul")
        .children(keys.map(|key| {
            Element::new("li")
                .key(key.to_string())
                .attr("class", "row")
                .child(key.to_string())
        }))
        .into()
}

fn mounted(len: usize) -> (Document, DiffState) {
    let mut doc = Document::new();
    let host = doc.body();
    let outcome = diff(&mut doc, host, keyed_list(0..len), None);
    doc.clear_journal();
    (doc, outcome.state)
}

// =============================================================================
// RECONCILER BENCHMARKS
// =============================================================================

fn bench_first_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("first_render");
    for len in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            b.iter(|| {
                let mut doc = Document::new();
                let host = doc.body();
                black_box(diff(&mut doc, host, keyed_list(0..len), None))
            })
        });
    }
    group.finish();
}

fn bench_keyed_move(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_move_to_end");
    for len in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            b.iter_batched(
                || mounted(len),
                |(mut doc, state)| {
                    let host = doc.body();
                    let moved = (0..len).filter(|&key| key != 1).chain([1]);
                    black_box(diff(&mut doc, host, keyed_list(moved), Some(state)))
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_keyed_reverse(c: &mut Criterion) {
    c.bench_function("keyed_reverse_1000", |b| {
        b.iter_batched(
            || mounted(1000),
            |(mut doc, state)| {
                let host = doc.body();
                black_box(diff(&mut doc, host, keyed_list((0..1000).rev()), Some(state)))
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_unchanged_rerender(c: &mut Criterion) {
    c.bench_function("unchanged_rerender_1000", |b| {
        b.iter_batched(
            || mounted(1000),
            |(mut doc, state)| {
                let host = doc.body();
                black_box(diff(&mut doc, host, keyed_list(0..1000), Some(state)))
            },
            BatchSize::SmallInput,
        )
    });
}

// =============================================================================
// FLUSH BENCHMARKS
// =============================================================================

fn bench_batched_writes(c: &mut Criterion) {
    let state = reactive(Value::object([("count", Value::from(0))]));
    let reader = state.clone();
    let _effect = create_effect(move || {
        black_box(reader.get("count"));
    });

    c.bench_function("hundred_writes_one_flush", |b| {
        let mut n = 0;
        b.iter(|| {
            if let Some(object) = state.as_object() {
                for _ in 0..100 {
                    n += 1;
                    object.set("count", n);
                }
            }
            run_microtasks()
        })
    });
}

criterion_group!(
    benches,
    bench_first_render,
    bench_keyed_move,
    bench_keyed_reverse,
    bench_unchanged_rerender,
    bench_batched_writes,
);
criterion_main!(benches);
