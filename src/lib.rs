//! # screenflow: pipeline execution engine for screen automation
//!
//! screenflow drives a device screen or window through a declarative graph of
//! named nodes. Each step captures a frame, decides which node currently
//! applies, performs that node's action and follows the graph's edges until
//! nothing is left to do or a stop is requested.
//!
//! ## Architecture
//!
//! - **Graph**: Pipeline JSON parsed into name-indexed [`Node`]s, with
//!   per-task overrides and validation
//! - **Runtime**: The [`PipelineInterpreter`] state machine, a single-worker
//!   [`AsyncRunner`] and the [`RuntimeCache`] of every intermediate result
//! - **Tasker**: The [`Tasker`] facade that binds a [`Controller`] and a
//!   [`Resource`] and turns posted tasks into runner jobs
//! - **Ports**: Vision and input stay outside the crate, behind
//!   [`Recognizer`], [`Actuator`], [`Controller`] and the custom plug-in
//!   registries on [`PipelineResource`]
//!
//! ## Configuration
//!
//! Engine settings live in `screenflow.toml` under the platform data
//! directory (`dev.screenflow`); see [`config`].
//!
//! ## Example
//!
//! ```ignore
//! use screenflow::{config::EngineConfig, PipelineResource, Tasker, TaskStatus};
//! use std::sync::Arc;
//!
//! let config = EngineConfig::load_or_default();
//! let _guard = screenflow::logging::init(&config.logging)?;
//!
//! let resource = Arc::new(PipelineResource::new(config.defaults.clone()));
//! resource.load_paths(["pipelines/"])?;
//!
//! let tasker = Tasker::from_config(&config)?;
//! tasker.bind_resource(resource);
//! tasker.bind_controller(Arc::new(MyAdbController::connect("emulator-5554")?));
//!
//! let task = tasker.post_pipeline("StartUp", &serde_json::Value::Null);
//! assert_eq!(tasker.wait(task), TaskStatus::Succeeded);
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod graph;
pub mod id;
pub mod logging;
pub mod runtime;
pub mod tasker;
pub mod types;

// Re-export commonly used types
pub use config::EngineConfig;
pub use controller::{Controller, ControllerStats};
pub use error::{FlowError, Result, ResultExt};
pub use graph::{
    ActionParam, CustomAction, CustomRecognition, Node, PipelineGraph, PipelineResource, RecoParam,
    Resource, Target,
};
pub use id::{ActionId, IdGenerator, NodeId, RecoId, TaskId};
pub use runtime::{
    Actuator, AsyncRunner, FailureKind, Notification, PipelineInterpreter, Recognizer,
    RunOutcome, RuntimeCache, StopToken,
};
pub use tasker::Tasker;
pub use types::{
    ActionResult, Image, NodeDetail, RecoResult, Recognition, Rect, TaskDetail, TaskStatus,
};
