//! Per-run plumbing shared between the tasker and the interpreter:
//! the cooperative stop flag and the lifecycle notification fan-out.

use crate::id::{ActionId, NodeId, RecoId, TaskId};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Cooperative cancellation flag.
///
/// Cloning shares the flag. The interpreter only looks at it at iteration
/// boundaries and inside [`StopToken::sleep`].
#[derive(Debug, Clone)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
    poll: Duration,
}

impl StopToken {
    pub fn new(poll: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            poll: poll.max(Duration::from_millis(1)),
        }
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Sleep for `duration`, waking early on stop.
    ///
    /// Returns false if the sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(self.poll.min(deadline - now));
        }
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new(Duration::from_millis(
            crate::config::settings::DEFAULT_STOP_POLL_INTERVAL_MS,
        ))
    }
}

/// Task-level event payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub entry: String,
}

/// Node-level event payload. Ids not yet known at emit time are `INVALID`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeEvent {
    pub task_id: TaskId,
    pub node_id: NodeId,
    pub reco_id: RecoId,
    pub action_id: ActionId,
    pub name: String,
    pub focus: Option<Value>,
}

impl NodeEvent {
    pub fn new(task_id: TaskId, name: impl Into<String>, focus: Option<Value>) -> Self {
        Self {
            task_id,
            node_id: NodeId::INVALID,
            reco_id: RecoId::INVALID,
            action_id: ActionId::INVALID,
            name: name.into(),
            focus,
        }
    }
}

/// Lifecycle events published by a tasker
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "detail")]
pub enum Notification {
    TaskStarting(TaskEvent),
    TaskSucceeded(TaskEvent),
    TaskFailed(TaskEvent),
    TaskStopped(TaskEvent),
    RecognitionStarting(NodeEvent),
    RecognitionSucceeded(NodeEvent),
    RecognitionFailed(NodeEvent),
    ActionStarting(NodeEvent),
    ActionSucceeded(NodeEvent),
    ActionFailed(NodeEvent),
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::TaskStarting(_) => "Task.Starting",
            Notification::TaskSucceeded(_) => "Task.Succeeded",
            Notification::TaskFailed(_) => "Task.Failed",
            Notification::TaskStopped(_) => "Task.Stopped",
            Notification::RecognitionStarting(_) => "Node.Recognition.Starting",
            Notification::RecognitionSucceeded(_) => "Node.Recognition.Succeeded",
            Notification::RecognitionFailed(_) => "Node.Recognition.Failed",
            Notification::ActionStarting(_) => "Node.Action.Starting",
            Notification::ActionSucceeded(_) => "Node.Action.Succeeded",
            Notification::ActionFailed(_) => "Node.Action.Failed",
        }
    }

    pub fn task_id(&self) -> TaskId {
        match self {
            Notification::TaskStarting(e)
            | Notification::TaskSucceeded(e)
            | Notification::TaskFailed(e)
            | Notification::TaskStopped(e) => e.task_id,
            Notification::RecognitionStarting(e)
            | Notification::RecognitionSucceeded(e)
            | Notification::RecognitionFailed(e)
            | Notification::ActionStarting(e)
            | Notification::ActionSucceeded(e)
            | Notification::ActionFailed(e) => e.task_id,
        }
    }

    fn node_event(&self) -> Option<&NodeEvent> {
        match self {
            Notification::RecognitionStarting(e)
            | Notification::RecognitionSucceeded(e)
            | Notification::RecognitionFailed(e)
            | Notification::ActionStarting(e)
            | Notification::ActionSucceeded(e)
            | Notification::ActionFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// Fans notifications out to any number of subscribers.
///
/// Channels are unbounded so emitting never blocks the worker. Subscribers
/// whose receiver was dropped are pruned on the next emit.
#[derive(Debug, Default)]
pub struct Notifier {
    subscribers: Mutex<Vec<Sender<Notification>>>,
    debug_mode: AtomicBool,
}

impl Notifier {
    pub fn new(debug_mode: bool) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            debug_mode: AtomicBool::new(debug_mode),
        }
    }

    pub fn subscribe(&self) -> Receiver<Notification> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn set_debug_mode(&self, enabled: bool) {
        self.debug_mode.store(enabled, Ordering::Relaxed);
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Publish an event.
    ///
    /// Node-level events only reach subscribers in debug mode or when the
    /// node has a `focus`; every event is logged either way.
    pub fn emit(&self, notification: Notification) {
        tracing::debug!(
            task_id = %notification.task_id(),
            event = notification.kind(),
            "{:?}",
            notification
        );

        if let Some(event) = notification.node_event() {
            if event.focus.is_none() && !self.debug_mode() {
                return;
            }
        }

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(notification.clone()).is_ok());
    }
}
