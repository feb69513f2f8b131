use std::hint::black_box;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use video_bench::{Frame, QualityTriple, SampleExecutor, SampleResult, SampleTask, evaluate};

fn synthetic_frame(width: usize, height: usize, phase: usize) -> Frame {
    let plane = width * height;
    let data = (0..3 * plane)
        .map(|i| ((i * 7 + phase * 13) % 251) as f32 / 250.0)
        .collect();
    Frame::new(3, height, width, data).expect("synthetic frame has consistent shape")
}

struct MetricTask {
    decoded: Frame,
    reference: Frame,
    frames_per_task: usize,
}

impl SampleTask for MetricTask {
    fn run(&self, task_index: usize) -> video_bench::Result<SampleResult> {
        let qualities = (0..self.frames_per_task)
            .map(|_| evaluate(&self.decoded, &self.reference, 1.0))
            .collect::<video_bench::Result<Vec<QualityTriple>>>()?;
        Ok(SampleResult {
            task_index,
            frame_indices: vec![task_index; self.frames_per_task],
            decode_ms_per_frame: 0.0,
            load_ms_per_frame: 0.0,
            qualities,
        })
    }
}

fn metric_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(5));

    for (width, height) in [(96usize, 96usize), (640, 480)] {
        let decoded = synthetic_frame(width, height, 1);
        let reference = synthetic_frame(width, height, 0);
        group.throughput(Throughput::Elements((width * height) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &(decoded, reference),
            |b, (decoded, reference)| {
                b.iter(|| {
                    evaluate(black_box(decoded), black_box(reference), 1.0)
                        .expect("evaluation should succeed in benchmark")
                });
            },
        );
    }
    group.finish();
}

fn executor_benchmark(c: &mut Criterion) {
    let task = MetricTask {
        decoded: synthetic_frame(96, 96, 1),
        reference: synthetic_frame(96, 96, 0),
        frames_per_task: 6,
    };

    let mut group = c.benchmark_group("executor");
    group.sample_size(20);
    for workers in [1usize, 4, 10] {
        let executor = SampleExecutor::new(workers).expect("positive worker count");
        group.bench_with_input(BenchmarkId::new("workers", workers), &executor, |b, executor| {
            b.iter(|| {
                executor
                    .run(&task, black_box(50))
                    .expect("synthetic tasks should succeed")
            });
        });
    }
    group.finish();
}

criterion_group!(benches, metric_benchmark, executor_benchmark);
criterion_main!(benches);
