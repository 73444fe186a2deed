//! Bounded worker pool used by pack and unpack.
//!
//! Jobs are fed through a bounded channel to a fixed set of scoped threads. Each job's
//! result comes back to the calling thread as soon as it finishes, so completion order is
//! arbitrary. A failing job never stops its siblings; the failure is returned in the
//! [`TaskReport`] instead.

use std::path::PathBuf;
use std::thread;

use crossbeam_channel::{bounded, unbounded};

use crate::CdfsError;

/// Anything the pool can run needs a stable index and a path for diagnostics.
pub trait Job: Send {
    fn index(&self) -> usize;
    fn path(&self) -> &std::path::Path;
}

/// Resolves a requested worker count; `0` means host parallelism.
pub fn resolve_workers(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get().max(1)
    } else {
        requested
    }
}

/// A single job that did not complete.
#[derive(Debug)]
pub struct TaskFailure {
    pub index: usize,
    pub path: PathBuf,
    pub error: CdfsError,
}

/// Result of one job, delivered in completion order.
#[derive(Debug)]
pub struct TaskOutcome<T> {
    pub index: usize,
    pub path: PathBuf,
    pub result: Result<T, CdfsError>,
}

/// Aggregate of every job a pool run executed.
#[derive(Debug)]
pub struct TaskReport<T> {
    /// `(index, value)` for every job that succeeded, in completion order.
    pub completed: Vec<(usize, T)>,
    pub failures: Vec<TaskFailure>,
}

impl<T> Default for TaskReport<T> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> TaskReport<T> {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total(&self) -> usize {
        self.completed.len() + self.failures.len()
    }

    fn push(&mut self, outcome: TaskOutcome<T>) {
        match outcome.result {
            Ok(value) => self.completed.push((outcome.index, value)),
            Err(error) => self.failures.push(TaskFailure {
                index: outcome.index,
                path: outcome.path,
                error,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    /// `requested == 0` sizes the pool to the host.
    pub fn new(requested: usize) -> Self {
        Self {
            workers: resolve_workers(requested),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `work` once per job and returns every outcome.
    ///
    /// `on_done` is called on the calling thread for each outcome, in completion order,
    /// before it is recorded in the report.
    pub fn run<J, T, W, D>(&self, jobs: Vec<J>, work: W, mut on_done: D) -> TaskReport<T>
    where
        J: Job,
        T: Send,
        W: Fn(&J) -> Result<T, CdfsError> + Sync,
        D: FnMut(&TaskOutcome<T>),
    {
        let mut report = TaskReport::default();
        if jobs.is_empty() {
            return report;
        }
        let workers = self.workers.min(jobs.len());

        // Queue depth of two per worker keeps everyone busy without buffering the whole job list.
        let (job_tx, job_rx) = bounded::<J>(workers * 2);
        let (done_tx, done_rx) = unbounded::<TaskOutcome<T>>();

        thread::scope(|s| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                let work = &work;
                s.spawn(move || {
                    for job in job_rx {
                        let result = work(&job);
                        let outcome = TaskOutcome {
                            index: job.index(),
                            path: job.path().to_path_buf(),
                            result,
                        };
                        if done_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(done_tx);

            s.spawn(move || {
                for job in jobs {
                    if job_tx.send(job).is_err() {
                        break;
                    }
                }
            });

            for outcome in done_rx.iter() {
                on_done(&outcome);
                report.push(outcome);
            }
        });

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Dummy {
        index: usize,
        path: PathBuf,
    }

    impl Job for Dummy {
        fn index(&self) -> usize {
            self.index
        }
        fn path(&self) -> &Path {
            &self.path
        }
    }

    fn jobs(n: usize) -> Vec<Dummy> {
        (0..n)
            .map(|index| Dummy {
                index,
                path: PathBuf::from(format!("file_{index}")),
            })
            .collect()
    }

    #[test]
    fn runs_every_job_once() {
        let calls = AtomicUsize::new(0);
        let pool = WorkerPool::new(4);
        let mut seen = 0;
        let report = pool.run(
            jobs(100),
            |job| {
                calls.fetch_add(1, Ordering::Relaxed);
                Ok(job.index * 2)
            },
            |_| seen += 1,
        );
        assert_eq!(calls.load(Ordering::Relaxed), 100);
        assert_eq!(seen, 100);
        assert!(report.is_clean());
        let mut values: Vec<_> = report.completed.iter().map(|&(i, v)| (i, v)).collect();
        values.sort();
        assert_eq!(values[7], (7, 14));
    }

    #[test]
    fn failures_do_not_stop_siblings() {
        let pool = WorkerPool::new(3);
        let report = pool.run(
            jobs(10),
            |job| {
                if job.index % 4 == 0 {
                    Err(CdfsError::io(&job.path, io::Error::new(io::ErrorKind::Other, "boom")))
                } else {
                    Ok(())
                }
            },
            |_| {},
        );
        assert_eq!(report.total(), 10);
        assert_eq!(report.completed.len(), 7);
        let mut failed: Vec<_> = report.failures.iter().map(|f| f.index).collect();
        failed.sort();
        assert_eq!(failed, vec![0, 4, 8]);
        assert!(report.failures.iter().all(|f| f.path.starts_with("file_")));
    }

    #[test]
    fn empty_job_list_is_a_no_op() {
        let report: TaskReport<()> = WorkerPool::new(2).run(Vec::<Dummy>::new(), |_| Ok(()), |_| {});
        assert_eq!(report.total(), 0);
    }

    #[test]
    fn zero_means_host_parallelism() {
        assert!(WorkerPool::new(0).workers() >= 1);
        assert_eq!(WorkerPool::new(5).workers(), 5);
    }
}
