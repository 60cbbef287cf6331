//! Declarative pipeline graphs.
//!
//! A pipeline is a JSON object mapping node names to node definitions:
//!
//! ```json
//! {
//!   "StartUp":  { "next": ["Home", "Login"], "on_error": ["Restart"] },
//!   "Login":    { "recognition": { "type": "OCR", "param": { "expected": ["Log in"] } },
//!                 "action": { "type": "Click", "param": {} },
//!                 "checkpoint": "login", "next": "Home" },
//!   "Home":     { "interrupt": ["CloseAd"] },
//!   "CloseAd":  { "is_sub": true, "action": { "type": "Key", "param": { "keys": [4] } } },
//!   "Restart":  { "action": { "type": "StartApp", "param": { "package": "com.example" } },
//!                 "jumpback": ["login"] }
//! }
//! ```
//!
//! # Components
//!
//! - [`Node`] - One parsed node, edges kept as names
//! - [`RecoParam`] / [`ActionParam`] - Opaque per-kind parameters
//! - [`PipelineGraph`] - Name-indexed nodes, merge and validation
//! - [`Resource`] / [`PipelineResource`] - Graph provider and plug-in registry

pub mod node;
pub mod params;
pub mod pipeline;
pub mod resource;

pub use node::Node;
pub use params::{ActionParam, RecoParam, Target, WaitFreezes};
pub use pipeline::{GraphIssue, PipelineGraph};
pub use resource::{CustomAction, CustomRecognition, PipelineResource, Resource};
