use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, mpsc};
use std::thread;

use tracing::debug;

use crate::error::{BenchError, Result};
use crate::queue::bounded_queue;
use crate::task::{SampleResult, SampleTask};

#[derive(Debug, Clone, Copy)]
pub struct SampleExecutor {
    num_workers: usize,
}

impl SampleExecutor {
    pub fn new(num_workers: usize) -> Result<Self> {
        if num_workers == 0 {
            return Err(BenchError::InvalidConfig(
                "num_workers must be at least 1".to_string(),
            ));
        }
        Ok(Self { num_workers })
    }

    pub fn run<T: SampleTask + ?Sized>(
        &self,
        task: &T,
        num_samples: usize,
    ) -> Result<Vec<SampleResult>> {
        if num_samples == 0 {
            return Err(BenchError::InvalidConfig(
                "num_samples must be at least 1".to_string(),
            ));
        }

        let (jobs_tx, jobs_rx) = mpsc::channel::<usize>();
        for task_index in 0..num_samples {
            jobs_tx
                .send(task_index)
                .map_err(|_| BenchError::WorkerPool("job channel closed".to_string()))?;
        }
        drop(jobs_tx);
        let jobs = Mutex::new(jobs_rx);
        let halted = AtomicBool::new(false);
        let worker_count = self.num_workers.min(num_samples);

        thread::scope(|scope| {
            let (results_tx, results_rx) = bounded_queue::<Result<SampleResult>>(worker_count);
            for _ in 0..worker_count {
                let results = results_tx.clone();
                let jobs = &jobs;
                let halted = &halted;
                scope.spawn(move || {
                    loop {
                        if halted.load(Ordering::Acquire) {
                            break;
                        }
                        let job = {
                            let Ok(receiver) = jobs.lock() else {
                                break;
                            };
                            receiver.recv()
                        };
                        let Ok(task_index) = job else {
                            break;
                        };
                        if results.send(task.run(task_index)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(results_tx);

            let mut collected = Vec::with_capacity(num_samples);
            while let Ok(result) = results_rx.recv() {
                match result {
                    Ok(sample) => collected.push(sample),
                    Err(err) => {
                        halted.store(true, Ordering::Release);
                        return Err(err);
                    }
                }
            }
            debug!(
                workers = worker_count,
                peak_queue_depth = results_rx.stats().peak_depth,
                "sample tasks finished"
            );

            if collected.len() != num_samples {
                return Err(BenchError::WorkerPool(format!(
                    "{} of {num_samples} tasks reported a result",
                    collected.len()
                )));
            }
            collected.sort_by_key(|sample| sample.task_index);
            Ok(collected)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use rstest::rstest;

    use super::*;
    use crate::metrics::QualityTriple;

    struct Echo {
        started: AtomicUsize,
        fail_at: Option<usize>,
    }

    impl Echo {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                started: AtomicUsize::new(0),
                fail_at,
            }
        }
    }

    impl SampleTask for Echo {
        fn run(&self, task_index: usize) -> Result<SampleResult> {
            self.started.fetch_add(1, Ordering::Relaxed);
            if self.fail_at == Some(task_index) {
                return Err(BenchError::Decode(format!("task {task_index}")));
            }
            Ok(SampleResult {
                task_index,
                frame_indices: vec![task_index],
                decode_ms_per_frame: task_index as f64,
                load_ms_per_frame: 1.0,
                qualities: vec![QualityTriple {
                    mse: task_index as f64,
                    psnr: 30.0,
                    ssim: 0.9,
                }],
            })
        }
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(16)]
    fn results_come_back_in_task_order(#[case] workers: usize) {
        let executor = SampleExecutor::new(workers).unwrap();
        let task = Echo::new(None);
        let results = executor.run(&task, 10).unwrap();
        let indices: Vec<_> = results.iter().map(|r| r.task_index).collect();
        assert_eq!(indices, (0..10).collect::<Vec<_>>());
        assert_eq!(task.started.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn first_failure_is_returned() {
        let executor = SampleExecutor::new(1).unwrap();
        let task = Echo::new(Some(2));
        let err = executor.run(&task, 50).unwrap_err();
        assert!(matches!(err, BenchError::Decode(msg) if msg == "task 2"));
        assert!(task.started.load(Ordering::Relaxed) < 50);
    }

    #[test]
    fn zero_workers_or_samples_are_rejected() {
        assert!(matches!(
            SampleExecutor::new(0),
            Err(BenchError::InvalidConfig(_))
        ));
        let executor = SampleExecutor::new(2).unwrap();
        assert!(matches!(
            executor.run(&Echo::new(None), 0),
            Err(BenchError::InvalidConfig(_))
        ));
    }
}
