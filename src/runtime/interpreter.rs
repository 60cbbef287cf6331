//! Node-graph interpreter.
//!
//! One [`PipelineInterpreter`] executes one run. It walks the graph from an
//! entry node:
//!
//! ```text
//!            ┌──────────── candidates ◄──────────────┐
//!            ▼                                        │
//!   screencap → recognize (in list order) ─ hit ─► act ─► next ++ interrupt
//!            │                                        │     or jumpback targets
//!            └─ timeout ─► on_error (once)            └─ failed ─► on_error (once)
//!
//!   empty list ─► pop interrupt stack ─► resumed node's list, or done
//! ```
//!
//! Rules that are easy to get wrong:
//!
//! - The first hit in list order wins. A name listed twice is only tried at
//!   its first position.
//! - A hit at or past the interrupt position, or on an `is_sub` node, pushes
//!   the node that owned the list onto the interrupt stack.
//! - Interrupt candidates are optional. If a list holds nothing but interrupt
//!   candidates and none appear before the timeout, the list is exhausted
//!   rather than failed.
//! - Two failures in a row without a completed node in between abort the
//!   run; `on_error` is not consulted a second time.
//! - Nodes are looked up by name at every step, in the graph pinned for the
//!   run. Loads that happen during the run are not seen.

use crate::controller::{Controller, StatsRecorder};
use crate::graph::{Node, PipelineGraph, WaitFreezes};
use crate::id::{ActionId, IdGenerator, NodeId, RecoId, TaskId};
use crate::runtime::cache::RuntimeCache;
use crate::runtime::context::{NodeEvent, Notification, Notifier, StopToken};
use crate::runtime::ports::{Actuator, Recognizer};
use crate::types::{ActionResult, Image, NodeDetail, RecoResult, Rect, TaskStatus};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A node visit that went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Nothing in the candidate list was recognized in time
    NoMatch,
    /// A node was recognized but its action failed
    ActionFailed,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::NoMatch => write!(f, "no match"),
            Fault::ActionFailed => write!(f, "action failed"),
        }
    }
}

/// Why a run failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureKind {
    #[error("error handling loop detected")]
    ErrorLoop,

    #[error("{0} with no on_error handler")]
    Unhandled(Fault),

    #[error("node '{0}' not found")]
    GraphLookup(String),
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed(FailureKind),
    /// A stop was requested; not a failure
    Stopped,
}

impl RunOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            RunOutcome::Succeeded => TaskStatus::Succeeded,
            RunOutcome::Failed(_) => TaskStatus::Failed,
            RunOutcome::Stopped => TaskStatus::Stopped,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }
}

impl From<FailureKind> for RunOutcome {
    fn from(kind: FailureKind) -> Self {
        RunOutcome::Failed(kind)
    }
}

/// Everything one run needs from its owner
#[derive(Clone)]
pub struct RunContext {
    pub task_id: TaskId,
    /// Graph version this run reads, task overrides already merged in
    pub graph: Arc<PipelineGraph>,
    pub controller: Arc<dyn Controller>,
    pub recognizer: Arc<dyn Recognizer>,
    pub actuator: Arc<dyn Actuator>,
    pub cache: Arc<RuntimeCache>,
    pub ids: Arc<IdGenerator>,
    pub notifier: Arc<Notifier>,
    pub stats: Arc<StatsRecorder>,
    pub stop: StopToken,
}

enum Scan {
    Hit {
        index: usize,
        node: Arc<Node>,
        reco: RecoResult,
    },
    /// A required candidate never appeared. Carries the last attempt.
    Miss(Option<(String, RecoId)>),
    /// Only interrupt candidates were listed and none appeared
    Exhausted,
    Stopped,
}

/// Executes one run over a graph. Checkpoints, the interrupt stack and hit
/// counters live here and die with the run.
pub struct PipelineInterpreter<'a> {
    ctx: &'a RunContext,
    checkpoints: HashMap<String, String>,
    interrupt_stack: Vec<String>,
    hits: HashMap<String, u32>,
}

impl<'a> PipelineInterpreter<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self {
            ctx,
            checkpoints: HashMap::new(),
            interrupt_stack: Vec::new(),
            hits: HashMap::new(),
        }
    }

    /// Checkpoint labels recorded so far
    pub fn checkpoints(&self) -> &HashMap<String, String> {
        &self.checkpoints
    }

    /// Nodes waiting to be resumed, bottom first
    pub fn interrupt_stack(&self) -> &[String] {
        &self.interrupt_stack
    }

    /// Walk the graph from `entry` until nothing is left to do
    pub fn run(&mut self, entry: &str) -> RunOutcome {
        let task_id = self.ctx.task_id;
        tracing::info!(task_id = %task_id, entry, "Pipeline run starting");

        let outcome = self.traverse(entry);
        match &outcome {
            RunOutcome::Succeeded => tracing::info!(task_id = %task_id, entry, "Pipeline run succeeded"),
            RunOutcome::Stopped => tracing::info!(task_id = %task_id, entry, "Pipeline run stopped"),
            RunOutcome::Failed(kind) => {
                tracing::warn!(task_id = %task_id, entry, "Pipeline run failed: {}", kind)
            }
        }
        outcome
    }

    fn traverse(&mut self, entry: &str) -> RunOutcome {
        let mut current = entry.to_string();
        let mut candidates = vec![current.clone()];
        let mut interrupt_pos = candidates.len();
        let mut error_handling = false;

        loop {
            if self.ctx.stop.is_stopped() {
                return RunOutcome::Stopped;
            }

            if candidates.is_empty() {
                let Some(resumed) = self.interrupt_stack.pop() else {
                    return RunOutcome::Succeeded;
                };
                tracing::debug!(task_id = %self.ctx.task_id, name = %resumed, "Resuming interrupted node");
                let node = match self.lookup(&resumed) {
                    Ok(node) => node,
                    Err(kind) => return kind.into(),
                };
                (candidates, interrupt_pos) = self.successors(&node);
                current = resumed;
                continue;
            }

            let current_node = match self.lookup(&current) {
                Ok(node) => node,
                Err(kind) => return kind.into(),
            };

            let scan = match self.scan(&current_node, &candidates, interrupt_pos) {
                Ok(scan) => scan,
                Err(kind) => return kind.into(),
            };

            match scan {
                Scan::Stopped => return RunOutcome::Stopped,
                Scan::Exhausted => candidates.clear(),
                Scan::Miss(last) => {
                    let (name, reco_id) = last.unwrap_or_else(|| (current.clone(), RecoId::INVALID));
                    let node_id = self.ctx.ids.next_node();
                    self.record_node(node_id, &name, reco_id, ActionId::INVALID, false);

                    if error_handling {
                        tracing::error!(task_id = %self.ctx.task_id, name = %current, "Error handling loop detected");
                        return FailureKind::ErrorLoop.into();
                    }
                    if current_node.on_error.is_empty() {
                        return FailureKind::Unhandled(Fault::NoMatch).into();
                    }
                    tracing::warn!(task_id = %self.ctx.task_id, name = %current, "No match, handling error");
                    error_handling = true;
                    candidates = current_node.on_error.clone();
                    interrupt_pos = candidates.len();
                }
                Scan::Hit { index, node, reco } => {
                    *self.hits.entry(node.name.clone()).or_default() += 1;
                    for label in &node.checkpoint {
                        self.checkpoints.insert(label.clone(), node.name.clone());
                    }
                    if index >= interrupt_pos || node.is_sub {
                        tracing::debug!(
                            task_id = %self.ctx.task_id,
                            name = %node.name,
                            "Interrupting '{}'",
                            current
                        );
                        self.interrupt_stack.push(current.clone());
                    }

                    let node_id = self.ctx.ids.next_node();
                    let Some((action_id, success)) = self.act(node_id, &node, &reco) else {
                        self.record_node(node_id, &node.name, reco.reco_id, ActionId::INVALID, false);
                        return RunOutcome::Stopped;
                    };
                    self.record_node(node_id, &node.name, reco.reco_id, action_id, success);
                    current = node.name.clone();

                    if success {
                        error_handling = false;
                        (candidates, interrupt_pos) = self.successors(&node);
                        continue;
                    }

                    if error_handling {
                        tracing::error!(task_id = %self.ctx.task_id, name = %node.name, "Error handling loop detected");
                        return FailureKind::ErrorLoop.into();
                    }
                    if node.on_error.is_empty() {
                        return FailureKind::Unhandled(Fault::ActionFailed).into();
                    }
                    tracing::warn!(task_id = %self.ctx.task_id, name = %node.name, "Action failed, handling error");
                    error_handling = true;
                    candidates = node.on_error.clone();
                    interrupt_pos = candidates.len();
                }
            }
        }
    }

    /// Recognize `entry` once, without acting or moving on
    pub fn run_recognition(&mut self, entry: &str) -> RunOutcome {
        let node = match self.lookup(entry) {
            Ok(node) => node,
            Err(kind) => return kind.into(),
        };
        if self.ctx.stop.is_stopped() {
            return RunOutcome::Stopped;
        }

        let node_id = self.ctx.ids.next_node();
        let (reco_id, hit) = self
            .screencap()
            .map(|image| self.recognize(&image, &node))
            .map_or((RecoId::INVALID, false), |r| (r.reco_id, r.is_hit()));
        self.record_node(node_id, &node.name, reco_id, ActionId::INVALID, hit);

        if hit {
            RunOutcome::Succeeded
        } else {
            FailureKind::Unhandled(Fault::NoMatch).into()
        }
    }

    /// Run `entry`'s action on `hit_box` without recognizing first
    pub fn run_action(&mut self, entry: &str, hit_box: Rect) -> RunOutcome {
        let node = match self.lookup(entry) {
            Ok(node) => node,
            Err(kind) => return kind.into(),
        };
        if self.ctx.stop.is_stopped() {
            return RunOutcome::Stopped;
        }

        let reco = RecoResult {
            reco_id: self.ctx.ids.next_reco(),
            name: node.name.clone(),
            algorithm: "DirectHit".to_string(),
            hit_box: Some(hit_box),
            detail: serde_json::Value::Null,
        };
        self.ctx.cache.set_reco_result(reco.clone());

        let node_id = self.ctx.ids.next_node();
        match self.act(node_id, &node, &reco) {
            Some((action_id, success)) => {
                self.record_node(node_id, &node.name, reco.reco_id, action_id, success);
                if success {
                    RunOutcome::Succeeded
                } else {
                    FailureKind::Unhandled(Fault::ActionFailed).into()
                }
            }
            None => {
                self.record_node(node_id, &node.name, reco.reco_id, ActionId::INVALID, false);
                RunOutcome::Stopped
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<Arc<Node>, FailureKind> {
        self.ctx
            .graph
            .get(name)
            .cloned()
            .ok_or_else(|| {
                tracing::error!(task_id = %self.ctx.task_id, name, "Node not found");
                FailureKind::GraphLookup(name.to_string())
            })
    }

    /// Candidate list after `node` completed, with its interrupt position
    fn successors(&self, node: &Node) -> (Vec<String>, usize) {
        if node.jumpback.is_empty() {
            let mut list = node.next.clone();
            let pos = list.len();
            list.extend(node.interrupt.iter().cloned());
            return (list, pos);
        }

        let list: Vec<String> = node
            .jumpback
            .iter()
            .filter_map(|label| {
                let target = self.checkpoints.get(label).cloned();
                if target.is_none() {
                    tracing::warn!(
                        task_id = %self.ctx.task_id,
                        name = %node.name,
                        "Jumpback label '{}' was never checkpointed",
                        label
                    );
                }
                target
            })
            .collect();
        let pos = list.len();
        (list, pos)
    }

    fn hit_count(&self, name: &str) -> u32 {
        self.hits.get(name).copied().unwrap_or(0)
    }

    fn screencap(&self) -> Option<Image> {
        let frame = self.ctx.stats.screencap(self.ctx.controller.screencap());
        if frame.is_none() {
            tracing::warn!(task_id = %self.ctx.task_id, "Screencap failed");
        }
        frame
    }

    /// Poll the candidates until one hits, the current node's timeout runs
    /// out, or a stop is requested
    fn scan(
        &mut self,
        current: &Node,
        candidates: &[String],
        interrupt_pos: usize,
    ) -> Result<Scan, FailureKind> {
        let deadline = Instant::now() + current.reco_timeout;
        let mut last = None;

        loop {
            if self.ctx.stop.is_stopped() {
                return Ok(Scan::Stopped);
            }
            let round = Instant::now();

            if let Some(image) = self.screencap() {
                let mut seen = HashSet::new();
                let mut eligible = 0usize;

                for (index, name) in candidates.iter().enumerate() {
                    if !seen.insert(name.as_str()) {
                        continue;
                    }
                    let node = self.lookup(name)?;
                    if !node.enabled {
                        tracing::trace!(name = %node.name, "Skipping disabled node");
                        continue;
                    }
                    if self.hit_count(name) >= node.max_hit {
                        tracing::trace!(name = %node.name, "Skipping node at max_hit");
                        continue;
                    }

                    eligible += 1;
                    let reco = self.recognize(&image, &node);
                    last = Some((node.name.clone(), reco.reco_id));
                    if reco.is_hit() {
                        return Ok(Scan::Hit { index, node, reco });
                    }
                }

                if eligible == 0 {
                    tracing::debug!(task_id = %self.ctx.task_id, name = %current.name, "No candidate can match");
                    break;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = current
                .rate_limit
                .saturating_sub(round.elapsed())
                .min(deadline - now);
            if !self.ctx.stop.sleep(wait) {
                return Ok(Scan::Stopped);
            }
        }

        if interrupt_pos == 0 {
            Ok(Scan::Exhausted)
        } else {
            Ok(Scan::Miss(last))
        }
    }

    /// One recognition attempt, recorded in the cache
    fn recognize(&self, image: &Image, node: &Node) -> RecoResult {
        let mut event = NodeEvent::new(self.ctx.task_id, &node.name, node.focus.clone());
        event.reco_id = self.ctx.ids.next_reco();
        self.ctx
            .notifier
            .emit(Notification::RecognitionStarting(event.clone()));

        let found = catch_unwind(AssertUnwindSafe(|| {
            self.ctx.recognizer.recognize(image, node)
        }))
        .unwrap_or_else(|_| {
            tracing::error!(name = %node.name, "Recognizer panicked, treating as miss");
            None
        });

        let (hit_box, detail) = match found {
            Some(r) => (Some(r.hit_box), r.detail),
            None => (None, serde_json::Value::Null),
        };
        let result = RecoResult {
            reco_id: event.reco_id,
            name: node.name.clone(),
            algorithm: node.recognition.kind().to_string(),
            hit_box,
            detail,
        };
        self.ctx.cache.set_reco_result(result.clone());

        self.ctx.notifier.emit(if result.is_hit() {
            Notification::RecognitionSucceeded(event)
        } else {
            Notification::RecognitionFailed(event)
        });
        result
    }

    /// Run the node's action with its delays. `None` if stopped before the
    /// action started.
    fn act(&self, node_id: NodeId, node: &Node, reco: &RecoResult) -> Option<(ActionId, bool)> {
        if !self.settle(node, &node.pre_wait_freezes, node.pre_delay) {
            return None;
        }

        let mut event = NodeEvent::new(self.ctx.task_id, &node.name, node.focus.clone());
        event.node_id = node_id;
        event.reco_id = reco.reco_id;
        event.action_id = self.ctx.ids.next_action();
        self.ctx
            .notifier
            .emit(Notification::ActionStarting(event.clone()));

        let success = catch_unwind(AssertUnwindSafe(|| {
            self.ctx.actuator.run(reco, node, &self.ctx.stop)
        }))
        .unwrap_or_else(|_| {
            tracing::error!(name = %node.name, "Actuator panicked, treating as failure");
            false
        });

        self.ctx.cache.set_action_result(ActionResult {
            action_id: event.action_id,
            name: node.name.clone(),
            success,
        });
        let action_id = event.action_id;
        self.ctx.notifier.emit(if success {
            Notification::ActionSucceeded(event)
        } else {
            Notification::ActionFailed(event)
        });

        // A stop here is picked up at the top of the next iteration.
        self.settle(node, &node.post_wait_freezes, node.post_delay);
        Some((action_id, success))
    }

    /// Wait for the screen to settle, then sleep. False only when stopped.
    fn settle(&self, node: &Node, wait: &WaitFreezes, delay: Duration) -> bool {
        let stop = &self.ctx.stop;
        if wait.is_enabled() {
            let still = catch_unwind(AssertUnwindSafe(|| {
                self.ctx.actuator.wait_freezes(wait, node, stop)
            }))
            .unwrap_or(false);
            if !still {
                if stop.is_stopped() {
                    return false;
                }
                tracing::warn!(name = %node.name, "Gave up waiting for the screen to settle");
            }
        }
        stop.sleep(delay)
    }

    fn record_node(
        &self,
        node_id: NodeId,
        name: &str,
        reco_id: RecoId,
        action_id: ActionId,
        completed: bool,
    ) {
        self.ctx.cache.set_node_detail(NodeDetail {
            node_id,
            name: name.to_string(),
            reco_id,
            action_id,
            completed,
        });
        self.ctx.cache.push_task_node(self.ctx.task_id, node_id);
        tracing::debug!(
            task_id = %self.ctx.task_id,
            node_id = %node_id,
            name,
            completed,
            "Node visited"
        );
    }
}
