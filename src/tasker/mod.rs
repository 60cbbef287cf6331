//! Tasker facade
//!
//! A [`Tasker`] binds a [`Controller`] and a [`Resource`], owns one
//! [`AsyncRunner`] and turns `post_*` calls into jobs on it. Callers get a
//! [`TaskId`] back immediately and use it to poll, wait, or read what the
//! task left in the [`RuntimeCache`].
//!
//! ```text
//!  caller ──post_pipeline──► Tasker ──post──► AsyncRunner ──► PipelineInterpreter
//!    ▲                         │                                   │
//!    └── status / wait ◄── TaskId ⇄ JobId            RuntimeCache ◄┘
//! ```
//!
//! At most one task runs at a time per tasker. Separate taskers are fully
//! independent.
//!
//! # Example
//!
//! ```ignore
//! let tasker = Tasker::new(TaskerSettings::default(), NodeDefaults::default())?;
//! tasker.bind_resource(resource);
//! tasker.bind_controller(controller);
//!
//! let task = tasker.post_pipeline("StartUp", &serde_json::Value::Null);
//! match tasker.wait(task) {
//!     TaskStatus::Succeeded => println!("done"),
//!     other => println!("ended as {}", other),
//! }
//! ```

use crate::config::{EngineConfig, NodeDefaults, TaskerSettings};
use crate::controller::{Controller, ControllerStats, StatsRecorder};
use crate::error::{FlowError, Result};
use crate::graph::{PipelineGraph, Resource};
use crate::id::{ActionId, IdGenerator, NodeId, RecoId, TaskId};
use crate::runtime::{
    Actuator, AsyncRunner, JobId, JobOutcome, JobStatus, Notifier, PipelineActuator,
    PipelineInterpreter, PipelineRecognizer, Recognizer, RunContext, RunOutcome, RuntimeCache,
    StopToken, TaskEvent,
};
use crate::types::{ActionResult, NodeDetail, RecoResult, Rect, TaskDetail, TaskStatus};
use crossbeam_channel::Receiver;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

pub use crate::runtime::Notification;

impl From<JobStatus> for TaskStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::NotExist => TaskStatus::Invalid,
            JobStatus::Pending => TaskStatus::Pending,
            JobStatus::Running => TaskStatus::Running,
            JobStatus::Succeeded => TaskStatus::Succeeded,
            JobStatus::Failed => TaskStatus::Failed,
            JobStatus::Cancelled => TaskStatus::Stopped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum JobKind {
    Pipeline,
    Recognition,
    Action(Rect),
    /// Marks the end of a stop request
    Stop,
}

struct TaskJob {
    task_id: TaskId,
    entry: String,
    kind: JobKind,
    overrides: Arc<PipelineGraph>,
    stop: StopToken,
}

/// State shared with the worker thread
struct Shared {
    settings: TaskerSettings,
    controller: RwLock<Option<Arc<dyn Controller>>>,
    resource: RwLock<Option<Arc<dyn Resource>>>,
    recognizer: RwLock<Option<Arc<dyn Recognizer>>>,
    actuator: RwLock<Option<Arc<dyn Actuator>>>,
    cache: Arc<RuntimeCache>,
    ids: Arc<IdGenerator>,
    notifier: Arc<Notifier>,
    stats: Arc<StatsRecorder>,
    need_to_stop: AtomicBool,
}

fn current<T: Clone>(slot: &RwLock<Option<T>>) -> Option<T> {
    slot.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn replace<T>(slot: &RwLock<Option<T>>, value: Option<T>) {
    *slot.write().unwrap_or_else(PoisonError::into_inner) = value;
}

impl Shared {
    fn execute(&self, job: &TaskJob) -> JobOutcome {
        if job.kind == JobKind::Stop {
            self.need_to_stop.store(false, Ordering::Release);
            tracing::info!(task_id = %job.task_id, "Stop request drained");
            return JobOutcome::Succeeded;
        }

        let event = TaskEvent {
            task_id: job.task_id,
            entry: job.entry.clone(),
        };

        if job.stop.is_stopped() {
            self.finish(event, TaskStatus::Stopped);
            return JobOutcome::Cancelled;
        }

        let (Some(controller), Some(resource)) = (current(&self.controller), current(&self.resource))
        else {
            tracing::error!(task_id = %job.task_id, "Controller or resource unbound before task start");
            self.finish(event, TaskStatus::Failed);
            return JobOutcome::Failed;
        };

        self.cache.set_task_status(job.task_id, TaskStatus::Running);
        self.notifier.emit(Notification::TaskStarting(event.clone()));

        let recognizer = current(&self.recognizer)
            .unwrap_or_else(|| Arc::new(PipelineRecognizer::new(resource.clone())));
        let actuator = current(&self.actuator).unwrap_or_else(|| {
            Arc::new(PipelineActuator::new(
                controller.clone(),
                resource.clone(),
                self.cache.clone(),
                self.stats.clone(),
            ))
        });

        let graph = Arc::new(resource.snapshot().merged(&job.overrides));
        let ctx = RunContext {
            task_id: job.task_id,
            graph,
            controller,
            recognizer,
            actuator,
            cache: self.cache.clone(),
            ids: self.ids.clone(),
            notifier: self.notifier.clone(),
            stats: self.stats.clone(),
            stop: job.stop.clone(),
        };

        let run = catch_unwind(AssertUnwindSafe(|| {
            let mut interpreter = PipelineInterpreter::new(&ctx);
            match job.kind {
                JobKind::Pipeline => interpreter.run(&job.entry),
                JobKind::Recognition => interpreter.run_recognition(&job.entry),
                JobKind::Action(hit_box) => interpreter.run_action(&job.entry, hit_box),
                JobKind::Stop => RunOutcome::Succeeded,
            }
        }));
        let Ok(outcome) = run else {
            tracing::error!(task_id = %job.task_id, "Task panicked");
            self.finish(event, TaskStatus::Failed);
            return JobOutcome::Failed;
        };

        self.finish(event, outcome.status());
        match outcome {
            RunOutcome::Succeeded => JobOutcome::Succeeded,
            RunOutcome::Failed(_) => JobOutcome::Failed,
            RunOutcome::Stopped => JobOutcome::Cancelled,
        }
    }

    /// Record the final status and announce it
    fn finish(&self, event: TaskEvent, status: TaskStatus) {
        self.cache.set_task_status(event.task_id, status);
        let notification = match status {
            TaskStatus::Succeeded => Notification::TaskSucceeded(event),
            TaskStatus::Stopped => Notification::TaskStopped(event),
            _ => Notification::TaskFailed(event),
        };
        self.notifier.emit(notification);
    }
}

#[derive(Default)]
struct TaskMap {
    jobs: HashMap<TaskId, JobId>,
    tasks: HashMap<JobId, TaskId>,
}

impl TaskMap {
    fn insert(&mut self, task_id: TaskId, job_id: JobId) {
        self.jobs.insert(task_id, job_id);
        self.tasks.insert(job_id, task_id);
    }
}

/// Front door of the engine
pub struct Tasker {
    shared: Arc<Shared>,
    defaults: NodeDefaults,
    task_map: RwLock<TaskMap>,
    runner: AsyncRunner<TaskJob>,
}

impl Tasker {
    /// Create a tasker and start its worker thread
    pub fn new(settings: TaskerSettings, defaults: NodeDefaults) -> Result<Self> {
        let shared = Arc::new(Shared {
            notifier: Arc::new(Notifier::new(settings.debug_mode)),
            settings,
            controller: RwLock::new(None),
            resource: RwLock::new(None),
            recognizer: RwLock::new(None),
            actuator: RwLock::new(None),
            cache: Arc::new(RuntimeCache::new()),
            ids: Arc::new(IdGenerator::new()),
            stats: Arc::new(StatsRecorder::new()),
            need_to_stop: AtomicBool::new(false),
        });

        let runner = {
            let shared = shared.clone();
            AsyncRunner::new("screenflow-tasker", move |_, job: &TaskJob| {
                shared.execute(job)
            })
            .map_err(|e| FlowError::from(e).with_context("Failed to spawn tasker worker"))?
        };

        tracing::debug!("Tasker created");
        Ok(Self {
            shared,
            defaults,
            task_map: RwLock::new(TaskMap::default()),
            runner,
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(config.tasker.clone(), config.defaults.clone())
    }

    // ── Binding ──

    pub fn bind_controller(&self, controller: Arc<dyn Controller>) {
        replace(&self.shared.controller, Some(controller));
        tracing::debug!("Controller bound");
    }

    pub fn bind_resource(&self, resource: Arc<dyn Resource>) {
        replace(&self.shared.resource, Some(resource));
        tracing::debug!("Resource bound");
    }

    /// Replace the stock recognizer; `None` restores it
    pub fn set_recognizer(&self, recognizer: Option<Arc<dyn Recognizer>>) {
        replace(&self.shared.recognizer, recognizer);
    }

    /// Replace the stock actuator; `None` restores it
    pub fn set_actuator(&self, actuator: Option<Arc<dyn Actuator>>) {
        replace(&self.shared.actuator, actuator);
    }

    pub fn inited(&self) -> bool {
        self.check_inited().is_ok()
    }

    fn check_inited(&self) -> Result<()> {
        let resource = current(&self.shared.resource).ok_or(FlowError::NotInited)?;
        if !resource.valid() {
            return Err(FlowError::NotInited);
        }
        let controller = current(&self.shared.controller).ok_or(FlowError::NotInited)?;
        if !controller.connected() {
            return Err(FlowError::Controller("not connected".to_string()));
        }
        Ok(())
    }

    // ── Posting ──

    /// Run the pipeline from `entry`. `overrides` is a pipeline document
    /// whose nodes replace the resource's for this task only; `null` for none.
    ///
    /// Returns [`TaskId::INVALID`] if the task was rejected.
    pub fn post_pipeline(&self, entry: &str, overrides: &Value) -> TaskId {
        self.post_or_invalid(entry, overrides, JobKind::Pipeline)
    }

    /// Recognize `entry` once without acting
    pub fn post_recognition(&self, entry: &str, overrides: &Value) -> TaskId {
        self.post_or_invalid(entry, overrides, JobKind::Recognition)
    }

    /// Run `entry`'s action on `hit_box` without recognizing
    pub fn post_action(&self, entry: &str, overrides: &Value, hit_box: Rect) -> TaskId {
        self.post_or_invalid(entry, overrides, JobKind::Action(hit_box))
    }

    /// Like [`Tasker::post_pipeline`], but says why a task was rejected
    pub fn try_post_pipeline(&self, entry: &str, overrides: &Value) -> Result<TaskId> {
        self.try_post(entry, overrides, JobKind::Pipeline)
    }

    fn post_or_invalid(&self, entry: &str, overrides: &Value, kind: JobKind) -> TaskId {
        self.try_post(entry, overrides, kind).unwrap_or_else(|e| {
            tracing::warn!(entry, "Task rejected: {}", e);
            TaskId::INVALID
        })
    }

    fn try_post(&self, entry: &str, overrides: &Value, kind: JobKind) -> Result<TaskId> {
        self.check_inited()?;

        let overrides = match overrides {
            Value::Null => PipelineGraph::new(),
            value => PipelineGraph::from_json(value.clone(), &self.defaults)
                .map_err(|e| e.with_context("Invalid pipeline override"))?,
        };

        // Checked under the map lock so a post either lands before a stop
        // request or is rejected by it.
        let mut map = self.lock_task_map();
        if self.shared.need_to_stop.load(Ordering::Acquire) {
            return Err(FlowError::Stopping);
        }

        let task_id = self.shared.ids.next_task();
        self.shared
            .cache
            .set_task_detail(TaskDetail::new(task_id, entry));
        self.enqueue(
            &mut map,
            TaskJob {
                task_id,
                entry: entry.to_string(),
                kind,
                overrides: Arc::new(overrides),
                stop: StopToken::new(self.shared.settings.stop_poll_interval()),
            },
        );
        drop(map);

        tracing::info!(task_id = %task_id, entry, kind = ?kind, "Task posted");
        Ok(task_id)
    }

    fn lock_task_map(&self) -> RwLockWriteGuard<'_, TaskMap> {
        self.task_map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, map: &mut TaskMap, job: TaskJob) {
        let task_id = job.task_id;
        let job_id = self.runner.post(job);
        map.insert(task_id, job_id);
    }

    /// Stop the running task and drop every queued one.
    ///
    /// New posts are rejected until the returned marker task completes;
    /// wait on it for quiescence.
    pub fn post_stop(&self) -> TaskId {
        tracing::info!("Stop requested");
        {
            let _map = self.lock_task_map();
            self.shared.need_to_stop.store(true, Ordering::Release);
        }

        self.runner.for_each(|_, job, _| job.stop.stop());
        if let Some(controller) = current(&self.shared.controller) {
            controller.post_stop();
        }
        if let Some(resource) = current(&self.shared.resource) {
            resource.post_stop();
        }

        let cancelled = self.runner.clear();
        {
            let map = self.task_map.read().unwrap_or_else(PoisonError::into_inner);
            for job_id in cancelled {
                if let Some(task_id) = map.tasks.get(&job_id) {
                    self.shared.cache.set_task_status(*task_id, TaskStatus::Stopped);
                }
            }
        }

        let task_id = self.shared.ids.next_task();
        let mut map = self.lock_task_map();
        self.enqueue(
            &mut map,
            TaskJob {
                task_id,
                entry: String::new(),
                kind: JobKind::Stop,
                overrides: Arc::new(PipelineGraph::new()),
                stop: StopToken::new(self.shared.settings.stop_poll_interval()),
            },
        );
        task_id
    }

    // ── Status ──

    fn job_id(&self, task_id: TaskId) -> Option<JobId> {
        self.task_map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .jobs
            .get(&task_id)
            .copied()
    }

    pub fn status(&self, task_id: TaskId) -> TaskStatus {
        match self.job_id(task_id) {
            Some(job_id) => self.runner.status(job_id).into(),
            None => TaskStatus::Invalid,
        }
    }

    /// Block until the task is done. Unknown ids return `Invalid` at once.
    pub fn wait(&self, task_id: TaskId) -> TaskStatus {
        match self.job_id(task_id) {
            Some(job_id) => self.runner.wait(job_id).into(),
            None => TaskStatus::Invalid,
        }
    }

    /// True while any task is pending or running
    pub fn running(&self) -> bool {
        self.runner.running()
    }

    pub fn stopping(&self) -> bool {
        self.shared.need_to_stop.load(Ordering::Acquire)
    }

    // ── Notifications ──

    /// Receive lifecycle notifications from now on
    pub fn subscribe(&self) -> Receiver<Notification> {
        self.shared.notifier.subscribe()
    }

    pub fn set_debug_mode(&self, enabled: bool) {
        self.shared.notifier.set_debug_mode(enabled);
    }

    // ── Cache ──

    pub fn cache(&self) -> &Arc<RuntimeCache> {
        &self.shared.cache
    }

    pub fn clear_cache(&self) {
        self.shared.cache.clear();
    }

    pub fn task_detail(&self, task_id: TaskId) -> Option<TaskDetail> {
        self.shared.cache.get_task_detail(task_id)
    }

    pub fn node_detail(&self, node_id: NodeId) -> Option<NodeDetail> {
        self.shared.cache.get_node_detail(node_id)
    }

    pub fn reco_result(&self, reco_id: RecoId) -> Option<RecoResult> {
        self.shared.cache.get_reco_result(reco_id)
    }

    pub fn action_result(&self, action_id: ActionId) -> Option<ActionResult> {
        self.shared.cache.get_action_result(action_id)
    }

    /// Most recent visit of the node called `name`
    pub fn latest_node(&self, name: &str) -> Option<NodeDetail> {
        let node_id = self.shared.cache.get_latest_node(name)?;
        self.shared.cache.get_node_detail(node_id)
    }

    pub fn controller_stats(&self) -> ControllerStats {
        self.shared.stats.snapshot()
    }
}

impl Drop for Tasker {
    fn drop(&mut self) {
        // Queued tasks are cancelled by the runner; the running one is asked
        // to stop and then joined.
        self.shared.need_to_stop.store(true, Ordering::Release);
        self.runner.for_each(|_, job, _| job.stop.stop());
        tracing::debug!("Tasker shutting down");
    }
}
