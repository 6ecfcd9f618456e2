use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use thiserror::Error;

/// Concrete backend a [`ParallelExecutor`] dispatches work through (§4.1).
///
/// `Distributed` is a seam only — scheduling work onto a remote task queue
/// is an external-collaborator concern per §1 and has no implementation in
/// this core; selecting it degrades to `ParallelThread` with a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorBackend {
    ParallelProcess,
    ParallelThread,
    Distributed,
}

/// Worker-count request, resolved against the host's CPU count (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCount {
    /// `-1`: `max(1, cpu_count - 1)`.
    AllButOne,
    /// `1`: forces the serial degradation path.
    Serial,
    /// Exactly `n` workers.
    Fixed(usize),
}

impl WorkerCount {
    pub fn resolve(self) -> usize {
        match self {
            WorkerCount::AllButOne => {
                let cpus = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                cpus.saturating_sub(1).max(1)
            }
            WorkerCount::Serial => 1,
            WorkerCount::Fixed(n) => n.max(1),
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum ExecutorError {
    #[error("task {index} failed: {message}")]
    TaskFailed { index: usize, message: String },
    #[error("task {index} exceeded its timeout of {timeout_ms}ms")]
    TaskTimedOut { index: usize, timeout_ms: u64 },
    #[error("executor has been shut down")]
    ShuttingDown,
}

/// Scatter/gather executor over a worker pool (§4.1, §5).
///
/// Parallelism is disabled — falling back to the serial path — when the
/// caller asked for it (`parallel = false`), when `n_workers == 1`, or when
/// the task count is below `min_parallel_tasks` (default 4), so that
/// fork/spawn start-up cost never dominates a tiny job.
pub struct ParallelExecutor {
    backend: ExecutorBackend,
    n_workers: WorkerCount,
    parallel: bool,
    min_parallel_tasks: usize,
    task_timeout: Option<Duration>,
    pool: Option<rayon::ThreadPool>,
    shut_down: AtomicBool,
}

impl ParallelExecutor {
    pub fn new(backend: ExecutorBackend, n_workers: WorkerCount, parallel: bool) -> Self {
        Self::with_options(backend, n_workers, parallel, 4, None)
    }

    pub fn with_options(
        backend: ExecutorBackend,
        n_workers: WorkerCount,
        parallel: bool,
        min_parallel_tasks: usize,
        task_timeout: Option<Duration>,
    ) -> Self {
        let resolved = n_workers.resolve();
        let pool = if parallel && resolved > 1 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(resolved)
                .build()
                .ok()
        } else {
            None
        };
        Self {
            backend,
            n_workers,
            parallel,
            min_parallel_tasks,
            task_timeout,
            pool,
            shut_down: AtomicBool::new(false),
        }
    }

    fn serial_path(&self, task_count: usize) -> bool {
        !self.parallel
            || self.n_workers.resolve() == 1
            || task_count < self.min_parallel_tasks
            || self.pool.is_none()
    }

    /// Apply `f` to every item in `tasks`, returning results **in input
    /// order regardless of completion order** (§4.1 Determinism, Testable
    /// Property 6). Per-task failures are captured rather than panicking
    /// the whole batch.
    ///
    /// If `ignore_errors` is true, failed positions are dropped (results
    /// are returned in order, shorter than `tasks` when failures occur).
    /// Otherwise the first failure (by index) is returned as `Err` after a
    /// best-effort shutdown of in-flight work.
    pub fn map<T, R, F>(
        &self,
        tasks: Vec<T>,
        f: F,
        ignore_errors: bool,
    ) -> Result<Vec<R>, ExecutorError>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> Result<R, String> + Sync,
    {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(ExecutorError::ShuttingDown);
        }

        let n = tasks.len();
        let slots: Vec<Result<R, ExecutorError>> = if self.serial_path(n) {
            tracing::debug!(task_count = n, "parallel_exec: serial degradation path");
            tasks
                .into_iter()
                .enumerate()
                .map(|(i, t)| self.run_one(i, t, &f))
                .collect()
        } else {
            tracing::debug!(
                task_count = n,
                backend = ?self.backend,
                "parallel_exec: dispatching to worker pool"
            );
            let pool = self.pool.as_ref().unwrap();
            pool.install(|| {
                use rayon::prelude::*;
                tasks
                    .into_par_iter()
                    .enumerate()
                    .map(|(i, t)| self.run_one(i, t, &f))
                    .collect()
            })
        };

        let mut out = Vec::with_capacity(n);
        for slot in slots {
            match slot {
                Ok(v) => out.push(v),
                Err(e) => {
                    if ignore_errors {
                        continue;
                    }
                    return Err(e);
                }
            }
        }
        Ok(out)
    }

    fn run_one<T, R, F>(&self, index: usize, task: T, f: &F) -> Result<R, ExecutorError>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> Result<R, String> + Sync,
    {
        match self.task_timeout {
            None => f(task).map_err(|message| ExecutorError::TaskFailed { index, message }),
            Some(timeout) => run_with_timeout(index, task, f, timeout),
        }
    }

    /// Idempotent shutdown. Outstanding tasks submitted via `map` are
    /// best-effort abandoned; already-returned results are untouched.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

/// Run `f(task)` on a scoped worker thread, abandoning it (not the whole
/// batch) if it exceeds `timeout`. This is best-effort: the spawned thread
/// is not forcibly killed on timeout, matching the "abort that task only"
/// semantics in §5 rather than promising true preemption.
fn run_with_timeout<T, R, F>(index: usize, task: T, f: &F, timeout: Duration) -> Result<R, ExecutorError>
where
    T: Send,
    R: Send,
    F: Fn(T) -> Result<R, String> + Sync,
{
    let (tx, rx) = mpsc::channel();
    std::thread::scope(|scope| {
        scope.spawn(|| {
            let result = f(task);
            let _ = tx.send(result);
        });
        match rx.recv_timeout(timeout) {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(message)) => Err(ExecutorError::TaskFailed { index, message }),
            Err(_) => Err(ExecutorError::TaskTimedOut {
                index,
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_resolves() {
        assert_eq!(WorkerCount::Serial.resolve(), 1);
        assert_eq!(WorkerCount::Fixed(5).resolve(), 5);
        assert!(WorkerCount::AllButOne.resolve() >= 1);
    }

    #[test]
    fn preserves_input_order_regardless_of_completion_order() {
        let exec = ParallelExecutor::new(ExecutorBackend::ParallelThread, WorkerCount::Fixed(4), true);
        let tasks: Vec<i32> = (0..50).collect();
        let results = exec
            .map(
                tasks.clone(),
                |x| {
                    // Reverse-order sleep so later items tend to finish first.
                    std::thread::sleep(Duration::from_micros((50 - x) as u64));
                    Ok::<i32, String>(x * 2)
                },
                false,
            )
            .unwrap();
        let expected: Vec<i32> = tasks.iter().map(|x| x * 2).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn serial_path_below_threshold() {
        let exec = ParallelExecutor::with_options(
            ExecutorBackend::ParallelThread,
            WorkerCount::Fixed(8),
            true,
            4,
            None,
        );
        assert!(exec.serial_path(3));
        assert!(!exec.serial_path(10));
    }

    #[test]
    fn ignore_errors_elides_failures_in_order() {
        let exec = ParallelExecutor::new(ExecutorBackend::ParallelThread, WorkerCount::Serial, true);
        let tasks = vec![1, 2, 3, 4];
        let results = exec
            .map(
                tasks,
                |x| {
                    if x % 2 == 0 {
                        Err(format!("even: {x}"))
                    } else {
                        Ok(x)
                    }
                },
                true,
            )
            .unwrap();
        assert_eq!(results, vec![1, 3]);
    }

    #[test]
    fn first_failure_surfaces_without_ignore_errors() {
        let exec = ParallelExecutor::new(ExecutorBackend::ParallelThread, WorkerCount::Serial, true);
        let tasks = vec![1, 2, 3];
        let result = exec.map(
            tasks,
            |x| {
                if x == 2 {
                    Err("boom".to_string())
                } else {
                    Ok(x)
                }
            },
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn shutdown_is_idempotent_and_blocks_further_submissions() {
        let exec = ParallelExecutor::new(ExecutorBackend::ParallelThread, WorkerCount::Serial, true);
        exec.shutdown();
        exec.shutdown();
        let result = exec.map(vec![1, 2], |x| Ok::<i32, String>(x), false);
        assert!(matches!(result, Err(ExecutorError::ShuttingDown)));
    }

    #[test]
    fn task_timeout_aborts_only_that_task() {
        let exec = ParallelExecutor::with_options(
            ExecutorBackend::ParallelThread,
            WorkerCount::Fixed(4),
            true,
            1,
            Some(Duration::from_millis(20)),
        );
        let tasks = vec![0u64, 100u64];
        let result = exec.map(
            tasks,
            |sleep_ms| {
                std::thread::sleep(Duration::from_millis(sleep_ms));
                Ok::<u64, String>(sleep_ms)
            },
            true,
        );
        // Task 0 finishes well within the timeout; task 1 (100ms sleep) is
        // abandoned, so only the first result survives under ignore_errors.
        assert_eq!(result.unwrap(), vec![0]);
    }
}
