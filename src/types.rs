//! Core data types for screenflow
//!
//! This module contains the values that flow between the engine and its
//! collaborators and the records the engine leaves behind in the
//! [`RuntimeCache`](crate::runtime::RuntimeCache).
//!
//! # Main Types
//!
//! - [`Rect`] - Screen rectangle, serialized as `[x, y, w, h]`
//! - [`Image`] - One captured frame
//! - [`Recognition`] - What a recognizer reports for a hit
//! - [`RecoResult`] - Outcome of one recognition attempt
//! - [`ActionResult`] - Outcome of one action
//! - [`NodeDetail`] - One visited node
//! - [`TaskDetail`] - One posted task and the nodes it visited

use crate::id::{ActionId, NodeId, RecoId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point, used as the touch point for clicks
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

impl From<[i32; 4]> for Rect {
    fn from(v: [i32; 4]) -> Self {
        Rect::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Rect> for [i32; 4] {
    fn from(r: Rect) -> Self {
        [r.x, r.y, r.width, r.height]
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.x, self.y, self.width, self.height)
    }
}

/// A captured frame. The pixel layout is owned by the controller and the
/// recognizers; the engine only moves frames around and compares them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Image {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// Rectangle covering the whole frame
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }
}

/// Result of a single recognition attempt.
///
/// A miss is recorded too, with `hit_box == None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoResult {
    pub reco_id: RecoId,
    pub name: String,
    /// Kind of recognition that produced this result (e.g. `"DirectHit"`)
    pub algorithm: String,
    #[serde(rename = "box")]
    pub hit_box: Option<Rect>,
    pub detail: serde_json::Value,
}

impl RecoResult {
    pub fn is_hit(&self) -> bool {
        self.hit_box.is_some()
    }
}

/// What a recognizer reports for a hit.
///
/// The engine turns it into a [`RecoResult`] with a fresh id.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub hit_box: Rect,
    pub detail: serde_json::Value,
}

impl Recognition {
    pub fn new(hit_box: Rect) -> Self {
        Self {
            hit_box,
            detail: serde_json::Value::Null,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Result of one executed action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_id: ActionId,
    pub name: String,
    pub success: bool,
}

/// One visited node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDetail {
    pub node_id: NodeId,
    pub name: String,
    pub reco_id: RecoId,
    pub action_id: ActionId,
    /// False when the action failed or nothing in the candidate list matched
    pub completed: bool,
}

/// Status of a task as seen from outside the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    /// The id is unknown (never posted, rejected, or cleared)
    #[default]
    Invalid,
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Ended because a stop was requested; not a failure
    Stopped,
}

impl TaskStatus {
    pub fn is_done(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Stopped
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Invalid => "invalid",
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// One posted task and everything it visited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDetail {
    pub task_id: TaskId,
    pub entry: String,
    /// Visited nodes in visit order
    pub node_ids: Vec<NodeId>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskDetail {
    pub fn new(task_id: TaskId, entry: impl Into<String>) -> Self {
        Self {
            task_id,
            entry: entry.into(),
            node_ids: Vec::new(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_serializes_as_array() {
        let rect = Rect::new(10, 20, 30, 40);
        assert_eq!(serde_json::to_string(&rect).unwrap(), "[10,20,30,40]");
        let back: Rect = serde_json::from_str("[1,2,3,4]").unwrap();
        assert_eq!(back, Rect::new(1, 2, 3, 4));
    }

    #[test]
    fn test_rect_center() {
        assert_eq!(Rect::new(100, 200, 50, 20).center(), (125, 210));
        assert!(Rect::new(0, 0, 0, 10).is_empty());
    }

    #[test]
    fn test_reco_result_box_field_name() {
        let reco = RecoResult {
            reco_id: RecoId(7),
            name: "Start".into(),
            algorithm: "DirectHit".into(),
            hit_box: Some(Rect::new(0, 0, 1, 1)),
            detail: serde_json::Value::Null,
        };
        let json = serde_json::to_value(&reco).unwrap();
        assert_eq!(json["box"], serde_json::json!([0, 0, 1, 1]));
        assert!(reco.is_hit());
    }

    #[test]
    fn test_task_status_done() {
        assert!(!TaskStatus::Pending.is_done());
        assert!(!TaskStatus::Running.is_done());
        assert!(TaskStatus::Stopped.is_done());
        assert_eq!(TaskStatus::Failed.to_string(), "failed");
    }
}
