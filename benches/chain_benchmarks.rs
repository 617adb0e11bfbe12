/// Chain execution overhead
///
/// Compares a bare chain against the same links with positioned and
/// observability middleware, and measures how overhead grows with length.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use modulink::chain::{chain, middleware_fn, Chain, Link};
use modulink::context::Context;
use modulink::middleware::{logging, performance_tracker, timing, LogLevel, LoggingOptions};

fn add_links(count: usize) -> Vec<Link> {
    (0..count)
        .map(|i| {
            Link::sync(format!("add{i}"), |mut ctx| {
                let value = ctx.get_i64("value").unwrap_or(0);
                ctx.set("value", value + 1);
                Ok(ctx)
            })
        })
        .collect()
}

fn bench_middleware_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("ChainOverhead");

    let bare = chain(add_links(3)).unwrap();
    group.bench_function("no_middleware", |b| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        b.to_async(&rt).iter(|| async {
            let result = bare.execute(black_box(Context::new().with("value", 0))).await;
            black_box(result)
        });
    });

    let positioned = chain(add_links(3)).unwrap();
    positioned
        .use_on_input([middleware_fn("in", Ok)])
        .use_on_output([middleware_fn("out", Ok)])
        .use_global([middleware_fn("global", Ok)]);
    group.bench_function("positioned_middleware", |b| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        b.to_async(&rt).iter(|| async {
            let result = positioned
                .execute(black_box(Context::new().with("value", 0)))
                .await;
            black_box(result)
        });
    });

    let observed = chain(add_links(3)).unwrap();
    observed
        .use_on_input([
            performance_tracker(Default::default()),
            logging(LoggingOptions {
                level: LogLevel::Trace,
                ..Default::default()
            }),
        ])
        .use_global([timing("total")]);
    group.bench_function("observability", |b| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        b.to_async(&rt).iter(|| async {
            let result = observed
                .execute(black_box(Context::new().with("value", 0)))
                .await;
            black_box(result)
        });
    });

    group.finish();
}

fn bench_chain_length(c: &mut Criterion) {
    let mut group = c.benchmark_group("ChainLength");

    for length in [1usize, 10, 50] {
        let pipeline: Chain = chain(add_links(length)).unwrap();
        pipeline.use_global([middleware_fn("noop", Ok)]);

        group.bench_with_input(BenchmarkId::from_parameter(length), &pipeline, |b, pipeline| {
            let rt = tokio::runtime::Runtime::new().unwrap();
            b.to_async(&rt).iter(|| async {
                let result = pipeline.execute(black_box(Context::new())).await;
                black_box(result)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_middleware_overhead, bench_chain_length);
criterion_main!(benches);
