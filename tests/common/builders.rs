//! Test data builders for creating test objects

use screenflow::config::{NodeDefaults, TaskerSettings};
use screenflow::{Controller, PipelineResource, Recognizer, Tasker};
use serde_json::Value;
use std::sync::Arc;

/// Resource loaded from a pipeline document, with no delays or timeouts
pub fn immediate_resource(doc: Value) -> Arc<PipelineResource> {
    let resource = Arc::new(PipelineResource::new(NodeDefaults::immediate()));
    resource
        .load_json(doc)
        .expect("test pipeline should parse");
    resource
}

/// Builder for a bound, ready-to-post tasker
pub struct TaskerBuilder {
    settings: TaskerSettings,
    doc: Value,
    controller: Option<Arc<dyn Controller>>,
    recognizer: Option<Arc<dyn Recognizer>>,
}

impl TaskerBuilder {
    pub fn new(doc: Value) -> Self {
        Self {
            settings: TaskerSettings {
                stop_poll_interval_ms: 1,
                ..TaskerSettings::default()
            },
            doc,
            controller: None,
            recognizer: None,
        }
    }

    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.settings.debug_mode = enabled;
        self
    }

    pub fn controller(mut self, controller: Arc<dyn Controller>) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn build(self) -> Tasker {
        let tasker =
            Tasker::new(self.settings, NodeDefaults::immediate()).expect("tasker should start");
        tasker.bind_resource(immediate_resource(self.doc));
        let controller = self
            .controller
            .unwrap_or_else(|| Arc::new(super::mock_helpers::ScriptedController::default()));
        tasker.bind_controller(controller);
        tasker.set_recognizer(self.recognizer);
        tasker
    }
}
