//! Benchmarks for job dispatch and graph traversal
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use screenflow::config::{NodeDefaults, TaskerSettings};
use screenflow::runtime::{AsyncRunner, JobOutcome};
use screenflow::{Controller, Image, PipelineResource, TaskStatus, Tasker};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Controller that accepts every call without touching a device
struct NullController;

impl Controller for NullController {
    fn connected(&self) -> bool {
        true
    }

    fn screencap(&self) -> Option<Image> {
        Some(Image::new(64, 64, Vec::new()))
    }

    fn click(&self, _x: i32, _y: i32) -> bool {
        true
    }

    fn swipe(&self, _x1: i32, _y1: i32, _x2: i32, _y2: i32, _duration: Duration) -> bool {
        true
    }

    fn press_key(&self, _keycode: i32) -> bool {
        true
    }

    fn input_text(&self, _text: &str) -> bool {
        true
    }

    fn start_app(&self, _package: &str) -> bool {
        true
    }

    fn stop_app(&self, _package: &str) -> bool {
        true
    }
}

/// `N0 -> N1 -> ... -> N{len-1}`, each node clicking its own box
fn chain(len: usize) -> Value {
    let mut doc = Map::new();
    for i in 0..len {
        let mut node = json!({ "action": { "type": "Click", "param": {} } });
        if i + 1 < len {
            node["next"] = json!(format!("N{}", i + 1));
        }
        doc.insert(format!("N{i}"), node);
    }
    Value::Object(doc)
}

fn bench_runner_post_wait(c: &mut Criterion) {
    let mut group = c.benchmark_group("runner_post_wait");

    for batch in [1, 16, 256].iter() {
        group.throughput(Throughput::Elements(*batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &batch| {
            let runner = AsyncRunner::new("bench", |_, n: &u64| {
                black_box(*n);
                JobOutcome::Succeeded
            })
            .unwrap();

            b.iter(|| {
                let ids: Vec<_> = (0..batch as u64).map(|n| runner.post(n)).collect();
                for id in ids {
                    black_box(runner.wait(id));
                }
            });
        });
    }

    group.finish();
}

fn bench_pipeline_traversal(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_traversal");
    group.sample_size(20);

    for len in [10, 100, 1000].iter() {
        let resource = Arc::new(PipelineResource::new(NodeDefaults::immediate()));
        resource.load_json(chain(*len)).unwrap();

        let tasker = Tasker::new(TaskerSettings::default(), NodeDefaults::immediate()).unwrap();
        tasker.bind_resource(resource);
        tasker.bind_controller(Arc::new(NullController));

        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), len, |b, _| {
            b.iter(|| {
                let task = tasker.post_pipeline("N0", &Value::Null);
                assert_eq!(tasker.wait(task), TaskStatus::Succeeded);
                tasker.clear_cache();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_runner_post_wait, bench_pipeline_traversal);
criterion_main!(benches);
