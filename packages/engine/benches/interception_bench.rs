// packages/engine/benches/interception_bench.rs
//! Admission and classification hot path
//!
//! Every outbound request pays for one admission decision, so it has to stay
//! cheap both with capture off and with a realistic set of ignore rules.
//!
//! ```bash
//! cargo bench --bench interception_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hyper::Request;
use nettap_engine::interception::AdmissionFilter;
use nettap_engine::recording::classify;

fn request(url: &str) -> Request<()> {
    Request::get(url).body(()).expect("valid bench URL")
}

fn bench_admission_disabled(c: &mut Criterion) {
    let filter = AdmissionFilter::new(false);
    let req = request("https://api.example.com/v1/users?search=ali");

    c.bench_function("admission/disabled", |b| b.iter(|| filter.admit(black_box(&req))));
}

fn bench_admission_rules(c: &mut Criterion) {
    let mut group = c.benchmark_group("admission/rules");

    for rules in [0usize, 10, 100] {
        let filter = AdmissionFilter::new(true);
        filter.ignore_urls((0..rules).map(|i| format!("https://ignored{}.example.com/", i)));
        filter
            .ignore_regexes(
                (0..rules / 10)
                    .map(|i| format!(r"^https://track{}\..*", i))
                    .collect::<Vec<_>>()
                    .iter()
                    .map(String::as_str),
            )
            .expect("valid bench patterns");
        let req = request("https://api.example.com/v1/users?search=ali");

        group.bench_with_input(BenchmarkId::from_parameter(rules), &req, |b, req| {
            b.iter(|| filter.admit(black_box(req)))
        });
    }

    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let content_types = [
        "application/json",
        "application/vnd.api+json",
        "text/html",
        "image/png",
        "application/octet-stream",
    ];

    c.bench_function("classify/mixed", |b| {
        b.iter(|| {
            for content_type in content_types {
                black_box(classify(black_box(content_type)));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_admission_disabled,
    bench_admission_rules,
    bench_classify
);
criterion_main!(benches);
