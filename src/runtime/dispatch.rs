//! Stock port implementations.
//!
//! [`PipelineRecognizer`] and [`PipelineActuator`] dispatch on a node's
//! [`RecoParam`] / [`ActionParam`]. Vision and custom logic come from the
//! bound [`Resource`]'s registries, input goes through the [`Controller`].

use crate::controller::{Controller, StatsRecorder};
use crate::graph::{ActionParam, Node, RecoParam, Resource, Target, WaitFreezes};
use crate::runtime::cache::RuntimeCache;
use crate::runtime::context::StopToken;
use crate::runtime::ports::{Actuator, Recognizer};
use crate::types::{Image, RecoResult, Recognition, Rect};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Recognizes nodes with the resource's registered algorithms
pub struct PipelineRecognizer {
    resource: Arc<dyn Resource>,
}

impl PipelineRecognizer {
    pub fn new(resource: Arc<dyn Resource>) -> Self {
        Self { resource }
    }

    fn registered(&self, key: &str, image: &Image, node: &Node) -> Option<Recognition> {
        let Some(algorithm) = self.resource.custom_recognition(key) else {
            tracing::warn!(
                name = %node.name,
                "No recognizer registered for '{}', treating as miss",
                key
            );
            return None;
        };

        let param = node.recognition.param();
        catch_unwind(AssertUnwindSafe(|| algorithm.analyze(image, param))).unwrap_or_else(|_| {
            tracing::error!(name = %node.name, "Recognizer '{}' panicked", key);
            None
        })
    }
}

impl Recognizer for PipelineRecognizer {
    fn recognize(&self, image: &Image, node: &Node) -> Option<Recognition> {
        match &node.recognition {
            RecoParam::DirectHit => Some(Recognition::new(image.bounds())),
            RecoParam::Custom { name, .. } => self.registered(name, image, node),
            other => self.registered(other.kind(), image, node),
        }
    }
}

/// Performs node actions on a controller
pub struct PipelineActuator {
    controller: Arc<dyn Controller>,
    resource: Arc<dyn Resource>,
    cache: Arc<RuntimeCache>,
    stats: Arc<StatsRecorder>,
}

impl PipelineActuator {
    pub fn new(
        controller: Arc<dyn Controller>,
        resource: Arc<dyn Resource>,
        cache: Arc<RuntimeCache>,
        stats: Arc<StatsRecorder>,
    ) -> Self {
        Self {
            controller,
            resource,
            cache,
            stats,
        }
    }

    /// Resolve an action target to a rectangle
    pub fn resolve(&self, target: &Target, hit: &RecoResult) -> Option<Rect> {
        match target {
            Target::SelfBox => hit.hit_box,
            Target::Fixed(rect) => Some(*rect),
            Target::Node(name) => {
                let node_id = self.cache.get_latest_node(name)?;
                let detail = self.cache.get_node_detail(node_id)?;
                self.cache.get_reco_result(detail.reco_id)?.hit_box
            }
        }
    }

    fn point(&self, target: &Target, hit: &RecoResult, node: &Node) -> Option<(i32, i32)> {
        let point = self.resolve(target, hit).map(|r| r.center());
        if point.is_none() {
            tracing::warn!(name = %node.name, "Cannot resolve target {:?}", target);
        }
        point
    }

    fn custom(&self, name: &str, param: &serde_json::Value, target: &Target, hit: &RecoResult) -> bool {
        let Some(action) = self.resource.custom_action(name) else {
            tracing::warn!("No custom action registered under '{}'", name);
            return false;
        };

        let hit_box = self.resolve(target, hit);
        catch_unwind(AssertUnwindSafe(|| {
            action.run(self.controller.as_ref(), param, hit_box, &hit.detail)
        }))
        .unwrap_or_else(|_| {
            tracing::error!("Custom action '{}' panicked", name);
            false
        })
    }
}

impl Actuator for PipelineActuator {
    fn run(&self, hit: &RecoResult, node: &Node, _stop: &StopToken) -> bool {
        let ctl = &self.controller;
        let ok = match &node.action {
            ActionParam::DoNothing => return true,
            ActionParam::Click { target } => self
                .point(target, hit, node)
                .is_some_and(|(x, y)| ctl.click(x, y)),
            ActionParam::LongPress { target, duration } => {
                self.point(target, hit, node).is_some_and(|(x, y)| {
                    ctl.long_press(x, y, Duration::from_millis(*duration))
                })
            }
            ActionParam::Swipe {
                begin,
                end,
                duration,
            } => match (self.point(begin, hit, node), self.point(end, hit, node)) {
                (Some((x1, y1)), Some((x2, y2))) => {
                    ctl.swipe(x1, y1, x2, y2, Duration::from_millis(*duration))
                }
                _ => false,
            },
            // Every key is sent even after a failure.
            ActionParam::Key { keys } => keys
                .iter()
                .fold(true, |ok, key| ctl.press_key(*key) && ok),
            ActionParam::InputText { text } => ctl.input_text(text),
            ActionParam::StartApp { package } => ctl.start_app(package),
            ActionParam::StopApp { package } => ctl.stop_app(package),
            ActionParam::Custom {
                name,
                param,
                target,
            } => self.custom(name, param, target, hit),
        };

        tracing::trace!(name = %node.name, action = node.action.kind(), ok, "action dispatched");
        self.stats.op(ok)
    }

    fn wait_freezes(&self, wait: &WaitFreezes, node: &Node, stop: &StopToken) -> bool {
        if !wait.is_enabled() {
            return true;
        }

        let started = Instant::now();
        let Some(mut last) = self.stats.screencap(self.controller.screencap()) else {
            tracing::warn!(name = %node.name, "Screencap failed while waiting for freeze");
            return false;
        };
        let mut still_since = Instant::now();

        loop {
            if !stop.sleep(wait.rate_limit) {
                return false;
            }
            if started.elapsed() >= wait.timeout {
                tracing::warn!(
                    name = %node.name,
                    "Screen still moving after {:?}, continuing",
                    wait.timeout
                );
                return true;
            }

            let Some(frame) = self.stats.screencap(self.controller.screencap()) else {
                tracing::warn!(name = %node.name, "Screencap failed while waiting for freeze");
                return false;
            };
            if frame != last {
                last = frame;
                still_since = Instant::now();
            } else if still_since.elapsed() >= wait.time {
                return true;
            }
        }
    }
}
