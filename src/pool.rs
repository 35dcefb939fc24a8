use std::future::Future;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::errors::{AppError, AppResult};
use crate::ingestion::Row;

/// A row paired with its 0-based position in the input.
#[derive(Debug, Clone)]
pub struct Job {
    pub index: usize,
    pub row: Row,
}

impl Job {
    pub fn from_rows(rows: Vec<Row>) -> Vec<Self> {
        rows.into_iter()
            .enumerate()
            .map(|(index, row)| Self { index, row })
            .collect()
    }
}

/// Fixed number of workers draining one shared job queue.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `process` for every job and returns the results ordered by job
    /// index. Each job owns the write-once slot at its index, so the buffer
    /// itself needs no lock. Returns only after every worker has exited.
    pub async fn run<T, F, Fut>(&self, jobs: Vec<Job>, process: F) -> AppResult<Vec<T>>
    where
        T: Send + Sync + 'static,
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let slots: Arc<Vec<OnceCell<T>>> =
            Arc::new((0..jobs.len()).map(|_| OnceCell::new()).collect());

        let (sender, receiver) = mpsc::unbounded_channel();
        for job in jobs {
            if job.index >= slots.len() {
                return Err(AppError::Pipeline(format!(
                    "job index {} outside result buffer of {}",
                    job.index,
                    slots.len()
                )));
            }
            sender
                .send(job)
                .map_err(|_| AppError::Pipeline("job queue closed early".into()))?;
        }
        drop(sender);

        let queue = Arc::new(AsyncMutex::new(receiver));
        let process = Arc::new(process);
        let mut workers = JoinSet::new();
        for worker_id in 0..self.workers {
            let queue = Arc::clone(&queue);
            let slots = Arc::clone(&slots);
            let process = Arc::clone(&process);
            workers.spawn(async move {
                let mut handled = 0_usize;
                loop {
                    let next = queue.lock().await.recv().await;
                    let Some(job) = next else { break };
                    let index = job.index;
                    let result = (*process)(job).await;
                    if slots[index].set(result).is_err() {
                        error!(worker_id, index, "result slot written twice");
                    }
                    handled += 1;
                }
                debug!(worker_id, handled, "worker drained");
            });
        }

        while let Some(joined) = workers.join_next().await {
            joined.map_err(|err| AppError::Pipeline(format!("worker task failed: {err}")))?;
        }

        let slots = Arc::try_unwrap(slots)
            .map_err(|_| AppError::Pipeline("result buffer still shared after drain".into()))?;
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.into_inner()
                    .ok_or_else(|| AppError::Pipeline(format!("result slot {index} never written")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn jobs(count: usize) -> Vec<Job> {
        Job::from_rows(
            (0..count)
                .map(|idx| Row::from_pairs([("Espacio", format!("row-{idx}"))]))
                .collect(),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn preserves_input_order_for_any_worker_count() {
        for workers in [1, 2, 5, 16] {
            let results = WorkerPool::new(workers)
                .run(jobs(40), |job| async move {
                    // Later jobs finish first.
                    let delay = 40 - job.index as u64;
                    tokio::time::sleep(Duration::from_millis(delay % 7)).await;
                    (job.index, job.row.text("Espacio").to_string())
                })
                .await
                .unwrap();

            assert_eq!(results.len(), 40);
            for (position, (index, name)) in results.iter().enumerate() {
                assert_eq!(*index, position);
                assert_eq!(name, &format!("row-{position}"));
            }
        }
    }

    #[tokio::test]
    async fn each_job_runs_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let results = WorkerPool::new(3)
            .run(jobs(25), move |job| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    job.index * 2
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 25);
        assert_eq!(results, (0..25).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn empty_queue_returns_empty_buffer() {
        let results = WorkerPool::new(4)
            .run(Vec::new(), |job| async move { job.index })
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn panicking_worker_fails_the_run() {
        let result = WorkerPool::new(2)
            .run(jobs(3), |job| async move {
                if job.index == 1 {
                    panic!("boom");
                }
                job.index
            })
            .await;
        assert!(matches!(result, Err(AppError::Pipeline(_))));
    }

    #[test]
    fn worker_count_is_at_least_one() {
        assert_eq!(WorkerPool::new(0).workers(), 1);
    }
}
