//! Mock construction helpers

use mockall::mock;
use screenflow::{Controller, Image, Node, Recognition, Recognizer};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

mock! {
    pub Device {}

    impl Controller for Device {
        fn connected(&self) -> bool;
        fn screencap(&self) -> Option<Image>;
        fn click(&self, x: i32, y: i32) -> bool;
        fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration: Duration) -> bool;
        fn long_press(&self, x: i32, y: i32, duration: Duration) -> bool;
        fn press_key(&self, keycode: i32) -> bool;
        fn input_text(&self, text: &str) -> bool;
        fn start_app(&self, package: &str) -> bool;
        fn stop_app(&self, package: &str) -> bool;
        fn post_stop(&self);
    }
}

/// A mock device that is connected and always returns the same frame
pub fn connected_device() -> MockDevice {
    let mut device = MockDevice::new();
    device.expect_connected().return_const(true);
    device
        .expect_screencap()
        .returning(|| Some(Image::new(32, 32, vec![0; 16])));
    device
}

/// Connected controller that records every input call
#[derive(Default)]
pub struct ScriptedController {
    pub calls: Mutex<Vec<String>>,
    pub stops: Mutex<usize>,
}

impl ScriptedController {
    fn record(&self, call: String) -> bool {
        self.calls.lock().unwrap().push(call);
        true
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Controller for ScriptedController {
    fn connected(&self) -> bool {
        true
    }

    fn screencap(&self) -> Option<Image> {
        Some(Image::new(32, 32, vec![0; 16]))
    }

    fn click(&self, x: i32, y: i32) -> bool {
        self.record(format!("click {x} {y}"))
    }

    fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, _duration: Duration) -> bool {
        self.record(format!("swipe {x1} {y1} {x2} {y2}"))
    }

    fn press_key(&self, keycode: i32) -> bool {
        self.record(format!("key {keycode}"))
    }

    fn input_text(&self, text: &str) -> bool {
        self.record(format!("text {text}"))
    }

    fn start_app(&self, package: &str) -> bool {
        self.record(format!("start {package}"))
    }

    fn stop_app(&self, package: &str) -> bool {
        self.record(format!("stop {package}"))
    }

    fn post_stop(&self) {
        *self.stops.lock().unwrap() += 1;
    }
}

/// Recognizer answering from per-node scripts.
///
/// A node with a script pops its next answer; once the script runs out (or
/// if it has none) the node hits only if marked `always`.
#[derive(Default)]
pub struct ScriptedRecognizer {
    scripts: Mutex<HashMap<String, VecDeque<bool>>>,
    always: HashSet<String>,
    attempts: Mutex<Vec<String>>,
}

impl ScriptedRecognizer {
    pub fn always<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            always: names.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn script(self, name: &str, answers: &[bool]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(name.to_string(), answers.iter().copied().collect());
        self
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Recognizer for ScriptedRecognizer {
    fn recognize(&self, image: &Image, node: &Node) -> Option<Recognition> {
        self.attempts.lock().unwrap().push(node.name.clone());
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&node.name)
            .and_then(VecDeque::pop_front);
        let hit = scripted.unwrap_or_else(|| self.always.contains(&node.name));
        hit.then(|| Recognition::new(image.bounds()))
    }
}
