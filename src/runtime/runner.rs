//! Single-worker job runner.
//!
//! [`AsyncRunner`] owns one dedicated thread that drains a FIFO queue of jobs.
//! Jobs never overlap: the next job starts only after the previous callback
//! returned. Callers interact through ids:
//!
//! ```text
//! post(job) ──► JobId ──► status / wait
//!                  │
//!   [queue: Pending ...] ──► worker ──► process(id, &job) ──► Succeeded | Failed | Cancelled
//! ```
//!
//! Cancellation is cooperative. [`AsyncRunner::clear`] only drops jobs that
//! have not started; an in-flight job is reached through
//! [`AsyncRunner::for_each`] and has to notice the request itself.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

/// Id of a job inside one runner. Unrelated to task ids.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct JobId(pub u64);

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    NotExist,
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Dropped before it ran, or ended early on request
    Cancelled,
}

impl JobStatus {
    pub fn is_done(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// What a job callback reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

impl From<bool> for JobOutcome {
    fn from(ok: bool) -> Self {
        if ok {
            JobOutcome::Succeeded
        } else {
            JobOutcome::Failed
        }
    }
}

impl From<JobOutcome> for JobStatus {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Succeeded => JobStatus::Succeeded,
            JobOutcome::Failed => JobStatus::Failed,
            JobOutcome::Cancelled => JobStatus::Cancelled,
        }
    }
}

struct State<J> {
    last_id: u64,
    queue: VecDeque<(JobId, Arc<J>)>,
    current: Option<(JobId, Arc<J>)>,
    statuses: HashMap<JobId, JobStatus>,
    exit: bool,
}

struct Shared<J> {
    state: Mutex<State<J>>,
    /// Signalled when work arrives or the runner shuts down
    work: Condvar,
    /// Signalled when a job reaches a terminal status
    done: Condvar,
}

impl<J> Shared<J> {
    fn lock(&self) -> MutexGuard<'_, State<J>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct AsyncRunner<J> {
    name: String,
    shared: Arc<Shared<J>>,
    worker: Option<JoinHandle<()>>,
}

impl<J> AsyncRunner<J>
where
    J: Send + Sync + 'static,
{
    /// Spawn the worker thread. `process` runs every job, one at a time.
    pub fn new<F>(name: impl Into<String>, process: F) -> std::io::Result<Self>
    where
        F: Fn(JobId, &J) -> JobOutcome + Send + 'static,
    {
        let name = name.into();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                last_id: 0,
                queue: VecDeque::new(),
                current: None,
                statuses: HashMap::new(),
                exit: false,
            }),
            work: Condvar::new(),
            done: Condvar::new(),
        });

        let worker = {
            let shared = shared.clone();
            let name = name.clone();
            std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(&name, &shared, process))?
        };

        Ok(Self {
            name,
            shared,
            worker: Some(worker),
        })
    }

    /// Enqueue a job. Never blocks on execution.
    pub fn post(&self, job: J) -> JobId {
        let id = {
            let mut state = self.shared.lock();
            state.last_id += 1;
            let id = JobId(state.last_id);
            state.statuses.insert(id, JobStatus::Pending);
            state.queue.push_back((id, Arc::new(job)));
            id
        };
        self.shared.work.notify_one();
        tracing::trace!(runner = %self.name, "posted {}", id);
        id
    }

    pub fn status(&self, id: JobId) -> JobStatus {
        self.shared
            .lock()
            .statuses
            .get(&id)
            .copied()
            .unwrap_or(JobStatus::NotExist)
    }

    /// Block until the job is done. Unknown ids return `NotExist` at once.
    pub fn wait(&self, id: JobId) -> JobStatus {
        let mut state = self.shared.lock();
        loop {
            match state.statuses.get(&id).copied() {
                None => return JobStatus::NotExist,
                Some(status) if status.is_done() => return status,
                Some(_) => {
                    state = self
                        .shared
                        .done
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    /// Cancel every job that has not started. Returns the cancelled ids in
    /// submission order.
    pub fn clear(&self) -> Vec<JobId> {
        let cancelled: Vec<JobId> = {
            let mut state = self.shared.lock();
            let drained: Vec<JobId> = state.queue.drain(..).map(|(id, _)| id).collect();
            for id in &drained {
                state.statuses.insert(*id, JobStatus::Cancelled);
            }
            drained
        };
        if !cancelled.is_empty() {
            tracing::debug!(runner = %self.name, "cancelled {} queued jobs", cancelled.len());
            self.shared.done.notify_all();
        }
        cancelled
    }

    /// Visit the in-flight job (if any) and then every queued job.
    ///
    /// Runs under the runner lock, so `post`, completion and other
    /// `for_each` calls are serialized against it. `f` must not call back
    /// into the runner.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(JobId, &J, JobStatus),
    {
        let state = self.shared.lock();
        if let Some((id, job)) = &state.current {
            f(*id, job, JobStatus::Running);
        }
        for (id, job) in &state.queue {
            f(*id, job, JobStatus::Pending);
        }
    }

    /// True while any job is pending or running
    pub fn running(&self) -> bool {
        let state = self.shared.lock();
        state.current.is_some() || !state.queue.is_empty()
    }
}

impl<J> Drop for AsyncRunner<J> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.exit = true;
            let queued: Vec<JobId> = state.queue.drain(..).map(|(id, _)| id).collect();
            for id in queued {
                state.statuses.insert(id, JobStatus::Cancelled);
            }
        }
        self.shared.work.notify_all();
        self.shared.done.notify_all();

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!(runner = %self.name, "worker thread panicked");
            }
        }
        tracing::debug!(runner = %self.name, "runner shut down");
    }
}

fn worker_loop<J, F>(name: &str, shared: &Shared<J>, process: F)
where
    F: Fn(JobId, &J) -> JobOutcome,
{
    tracing::debug!(runner = %name, "worker started");
    loop {
        let (id, job) = {
            let mut state = shared.lock();
            let item = loop {
                if state.exit {
                    tracing::debug!(runner = %name, "worker exiting");
                    return;
                }
                if let Some(item) = state.queue.pop_front() {
                    break item;
                }
                state = shared.work.wait(state).unwrap_or_else(PoisonError::into_inner);
            };
            state.statuses.insert(item.0, JobStatus::Running);
            state.current = Some(item.clone());
            item
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| process(id, &job))).unwrap_or_else(|_| {
            tracing::error!(runner = %name, "{} panicked, marking it failed", id);
            JobOutcome::Failed
        });

        {
            let mut state = shared.lock();
            state.current = None;
            state.statuses.insert(id, outcome.into());
        }
        shared.done.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_post_and_wait() {
        let runner = AsyncRunner::new("test", |_, ok: &bool| JobOutcome::from(*ok)).unwrap();
        let a = runner.post(true);
        let b = runner.post(false);
        assert!(b > a);
        assert_eq!(runner.wait(a), JobStatus::Succeeded);
        assert_eq!(runner.wait(b), JobStatus::Failed);
        assert_eq!(runner.status(a), JobStatus::Succeeded);
    }

    #[test]
    fn test_unknown_id_does_not_block() {
        let runner = AsyncRunner::new("test", |_, _: &()| JobOutcome::Succeeded).unwrap();
        assert_eq!(runner.wait(JobId(42)), JobStatus::NotExist);
        assert_eq!(runner.status(JobId(42)), JobStatus::NotExist);
    }

    #[test]
    fn test_fifo_and_no_overlap() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let active = Arc::new(AtomicUsize::new(0));
        let runner = {
            let order = order.clone();
            let active = active.clone();
            AsyncRunner::new("test", move |_, n: &u32| {
                assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                std::thread::sleep(Duration::from_millis(2));
                order.lock().unwrap().push(*n);
                active.fetch_sub(1, Ordering::SeqCst);
                JobOutcome::Succeeded
            })
            .unwrap()
        };

        let ids: Vec<_> = (0..10).map(|n| runner.post(n)).collect();
        for id in &ids {
            assert_eq!(runner.wait(*id), JobStatus::Succeeded);
        }
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_clear_cancels_queued_without_running() {
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let gate_rx = Mutex::new(gate_rx);
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = {
            let calls = calls.clone();
            AsyncRunner::new("test", move |_, first: &bool| {
                calls.fetch_add(1, Ordering::SeqCst);
                if *first {
                    let _ = gate_rx.lock().unwrap().recv();
                }
                JobOutcome::Succeeded
            })
            .unwrap()
        };

        let blocker = runner.post(true);
        while runner.status(blocker) != JobStatus::Running {
            std::thread::yield_now();
        }
        let queued = runner.post(false);
        assert_eq!(runner.clear(), vec![queued]);
        assert_eq!(runner.wait(queued), JobStatus::Cancelled);

        gate_tx.send(()).unwrap();
        assert_eq!(runner.wait(blocker), JobStatus::Succeeded);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_job_fails_and_runner_survives() {
        let runner = AsyncRunner::new("test", |_, boom: &bool| {
            if *boom {
                panic!("job exploded");
            }
            JobOutcome::Succeeded
        })
        .unwrap();

        let bad = runner.post(true);
        let good = runner.post(false);
        assert_eq!(runner.wait(bad), JobStatus::Failed);
        assert_eq!(runner.wait(good), JobStatus::Succeeded);
        assert!(!runner.running());
    }

    #[test]
    fn test_for_each_sees_running_and_queued() {
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let gate_rx = Mutex::new(gate_rx);
        let runner = AsyncRunner::new("test", move |_, first: &bool| {
            if *first {
                let _ = gate_rx.lock().unwrap().recv();
            }
            JobOutcome::Succeeded
        })
        .unwrap();

        let a = runner.post(true);
        while runner.status(a) != JobStatus::Running {
            std::thread::yield_now();
        }
        let b = runner.post(false);
        assert!(runner.running());

        let mut seen = Vec::new();
        runner.for_each(|id, _, status| seen.push((id, status)));
        assert_eq!(seen, vec![(a, JobStatus::Running), (b, JobStatus::Pending)]);

        gate_tx.send(()).unwrap();
        runner.wait(b);
        assert!(!runner.running());
    }

    #[test]
    fn test_drop_waits_for_in_flight_job() {
        let finished = Arc::new(AtomicUsize::new(0));
        let runner = {
            let finished = finished.clone();
            AsyncRunner::new("test", move |_, _: &()| {
                std::thread::sleep(Duration::from_millis(30));
                finished.fetch_add(1, Ordering::SeqCst);
                JobOutcome::Succeeded
            })
            .unwrap()
        };

        let id = runner.post(());
        while runner.status(id) != JobStatus::Running {
            std::thread::yield_now();
        }
        drop(runner);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
