use aiw::config::WeaveOptions;
use aiw::module::Module;
use aiw::{emit, parser, pipeline, verify};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

// Benchmark scenarios. All weave without diagnostics.

const MARKER: &str = r#"
[AttributeInjector.Injection]
class Log extends System.Attribute {
    public method .ctor() -> void {
        ldarg 0
        call instance System.Attribute::.ctor() -> void
        ret
    }
    [AttributeInjector.Rise(When.OnEntry)]
    public method Begin([AttributeInjector.Argument(Method.Name)] name: string) -> void {
        ret
    }
    [AttributeInjector.Rise(When.OnExit)]
    public method End([AttributeInjector.Argument(Method.Name)] name: string,
                      [AttributeInjector.Argument(Method.ReturnValue)] value: int32) -> void {
        ret
    }
}
"#;

/// A module with `n_targets` marked methods, each with `exits` return points.
fn generate_module(n_targets: usize, exits: usize) -> String {
    let mut text = String::from("module bench\n");
    text.push_str(MARKER);
    text.push_str("\nclass Service {\n");
    for t in 0..n_targets {
        text.push_str(&format!("    [Log]\n    public method Op{}(x: int32) -> int32 {{\n", t));
        for e in 1..exits {
            text.push_str(&format!(
                "        ldarg 1\n        ldc.i4 {e}\n        beq exit{e}\n"
            ));
        }
        text.push_str("        ldc.i4 0\n        ret\n");
        for e in 1..exits {
            text.push_str(&format!("        exit{e}: ldc.i4 {e}\n        ret\n"));
        }
        text.push_str("    }\n");
    }
    text.push_str("}\n");
    text
}

fn parse_module(source: &str) -> Module {
    parser::parse(source)
        .module
        .expect("benchmark scenario must parse")
}

fn scenarios() -> [(&'static str, String); 3] {
    [
        ("single", generate_module(1, 1)),
        ("multi_exit", generate_module(4, 8)),
        ("wide", generate_module(64, 2)),
    ]
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for (name, source) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &source, |b, source| {
            b.iter(|| {
                let result = parser::parse(black_box(source.as_str()));
                black_box(&result.module);
            });
        });
    }
    group.finish();
}

// Weave only; parsing happens in the setup closure.
fn bench_weave(c: &mut Criterion) {
    let mut group = c.benchmark_group("weave");
    let options = WeaveOptions {
        verify: false,
        ..WeaveOptions::default()
    };
    for (name, source) in scenarios() {
        let module = parse_module(&source);
        group.bench_with_input(BenchmarkId::from_parameter(name), &module, |b, module| {
            b.iter_batched(
                || module.clone(),
                |mut module| {
                    let result = pipeline::weave_module(&mut module, &options).unwrap();
                    assert!(!result.has_errors());
                    black_box(module);
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify");
    for (name, source) in scenarios() {
        let mut module = parse_module(&source);
        pipeline::weave_module(&mut module, &WeaveOptions::default()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &module, |b, module| {
            b.iter(|| black_box(verify::verify_module(black_box(module))));
        });
    }
    group.finish();
}

// Scaling: full text-in, text-out pass vs number of targets.
fn bench_round_trip_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip_scaling");
    let options = WeaveOptions::default();
    for n_targets in [1_usize, 8, 32, 128] {
        let source = generate_module(n_targets, 3);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}targets", n_targets)),
            &source,
            |b, source| {
                b.iter(|| {
                    let mut module = parse_module(black_box(source));
                    pipeline::weave_module(&mut module, &options).unwrap();
                    black_box(emit::print_module(&module));
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_parse,
    bench_weave,
    bench_verify,
    bench_round_trip_scaling
);
criterion_main!(benches);
