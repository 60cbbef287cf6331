//! Execution machinery
//!
//! # Components
//!
//! - [`AsyncRunner`] - Single-worker FIFO job queue with status tracking
//! - [`PipelineInterpreter`] - Walks a graph for one run
//! - [`RuntimeCache`] - Every recognition, action, node and task by id
//! - [`Recognizer`] / [`Actuator`] - Ports the interpreter calls out through
//! - [`PipelineRecognizer`] / [`PipelineActuator`] - Stock port implementations
//! - [`StopToken`] / [`Notifier`] - Cancellation and lifecycle events

pub mod cache;
pub mod context;
pub mod dispatch;
pub mod interpreter;
pub mod ports;
pub mod runner;

pub use cache::RuntimeCache;
pub use context::{NodeEvent, Notification, Notifier, StopToken, TaskEvent};
pub use dispatch::{PipelineActuator, PipelineRecognizer};
pub use interpreter::{FailureKind, Fault, PipelineInterpreter, RunContext, RunOutcome};
pub use ports::{Actuator, Recognizer};
pub use runner::{AsyncRunner, JobId, JobOutcome, JobStatus};
