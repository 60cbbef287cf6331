//! Runtime cache of everything a task produced.
//!
//! Every recognition, action, visited node and task is stored under the id it
//! was given at creation, so callers can inspect a run after the fact. Entries
//! are never evicted; [`RuntimeCache::clear`] drops everything at once, after
//! which old ids simply resolve to `None`.
//!
//! Each table has its own `RwLock`: the worker thread writes while any number
//! of caller threads read.

use crate::id::{ActionId, NodeId, RecoId, TaskId};
use crate::types::{ActionResult, NodeDetail, RecoResult, TaskDetail, TaskStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct RuntimeCache {
    recos: RwLock<HashMap<RecoId, RecoResult>>,
    actions: RwLock<HashMap<ActionId, ActionResult>>,
    nodes: RwLock<HashMap<NodeId, NodeDetail>>,
    latest_nodes: RwLock<HashMap<String, NodeId>>,
    tasks: RwLock<HashMap<TaskId, TaskDetail>>,
}

impl RuntimeCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Recognitions ──

    pub fn set_reco_result(&self, result: RecoResult) {
        write(&self.recos).insert(result.reco_id, result);
    }

    pub fn get_reco_result(&self, id: RecoId) -> Option<RecoResult> {
        read(&self.recos).get(&id).cloned()
    }

    // ── Actions ──

    pub fn set_action_result(&self, result: ActionResult) {
        write(&self.actions).insert(result.action_id, result);
    }

    pub fn get_action_result(&self, id: ActionId) -> Option<ActionResult> {
        read(&self.actions).get(&id).cloned()
    }

    // ── Nodes ──

    /// Store a node detail and make it the latest detail for its name
    pub fn set_node_detail(&self, detail: NodeDetail) {
        let (name, id) = (detail.name.clone(), detail.node_id);
        // Publish the detail before the name index points at it.
        write(&self.nodes).insert(id, detail);
        write(&self.latest_nodes).insert(name, id);
    }

    pub fn get_node_detail(&self, id: NodeId) -> Option<NodeDetail> {
        read(&self.nodes).get(&id).cloned()
    }

    pub fn set_latest_node(&self, name: impl Into<String>, id: NodeId) {
        write(&self.latest_nodes).insert(name.into(), id);
    }

    pub fn get_latest_node(&self, name: &str) -> Option<NodeId> {
        read(&self.latest_nodes).get(name).copied()
    }

    // ── Tasks ──

    pub fn set_task_detail(&self, detail: TaskDetail) {
        write(&self.tasks).insert(detail.task_id, detail);
    }

    pub fn get_task_detail(&self, id: TaskId) -> Option<TaskDetail> {
        read(&self.tasks).get(&id).cloned()
    }

    /// Append a visited node to a task. Returns false if the task is unknown.
    pub fn push_task_node(&self, task_id: TaskId, node_id: NodeId) -> bool {
        match write(&self.tasks).get_mut(&task_id) {
            Some(task) => {
                task.node_ids.push(node_id);
                true
            }
            None => false,
        }
    }

    /// Update a task's status, stamping the finish time on terminal states
    pub fn set_task_status(&self, task_id: TaskId, status: TaskStatus) -> bool {
        match write(&self.tasks).get_mut(&task_id) {
            Some(task) => {
                task.status = status;
                if status.is_done() {
                    task.finished_at = Some(Utc::now());
                }
                true
            }
            None => false,
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        write(&self.recos).clear();
        write(&self.actions).clear();
        write(&self.nodes).clear();
        write(&self.latest_nodes).clear();
        write(&self.tasks).clear();
        tracing::debug!("Runtime cache cleared");
    }

    pub fn task_count(&self) -> usize {
        read(&self.tasks).len()
    }
}
