//! Recognition and action parameters carried by a node.
//!
//! The interpreter never looks inside these; it hands them to the
//! [`Recognizer`](crate::runtime::Recognizer) and
//! [`Actuator`](crate::runtime::Actuator) ports.
//!
//! Both are adjacently tagged in pipeline JSON:
//!
//! ```json
//! { "recognition": { "type": "TemplateMatch", "param": { "template": "start.png" } },
//!   "action":      { "type": "Click", "param": { "target": true } } }
//! ```

use crate::types::Rect;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Default long-press duration in milliseconds
pub const DEFAULT_LONG_PRESS_MS: u64 = 1_000;

/// Default swipe duration in milliseconds
pub const DEFAULT_SWIPE_MS: u64 = 200;

/// Default freeze-wait timeout in milliseconds
pub const DEFAULT_FREEZE_TIMEOUT_MS: u64 = 20_000;

/// Default freeze-wait polling interval in milliseconds
pub const DEFAULT_FREEZE_RATE_LIMIT_MS: u64 = 1_000;

/// How a node is recognized on screen
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "param")]
pub enum RecoParam {
    /// Always hits, with the whole frame as box
    #[default]
    DirectHit,
    TemplateMatch(Value),
    FeatureMatch(Value),
    ColorMatch(Value),
    #[serde(rename = "OCR")]
    Ocr(Value),
    NeuralNetworkClassify(Value),
    NeuralNetworkDetect(Value),
    /// A recognizer registered on the resource under `name`
    Custom {
        name: String,
        #[serde(default)]
        param: Value,
    },
}

impl RecoParam {
    /// Name of the algorithm, also the registry key for vision back ends
    pub fn kind(&self) -> &str {
        match self {
            RecoParam::DirectHit => "DirectHit",
            RecoParam::TemplateMatch(_) => "TemplateMatch",
            RecoParam::FeatureMatch(_) => "FeatureMatch",
            RecoParam::ColorMatch(_) => "ColorMatch",
            RecoParam::Ocr(_) => "OCR",
            RecoParam::NeuralNetworkClassify(_) => "NeuralNetworkClassify",
            RecoParam::NeuralNetworkDetect(_) => "NeuralNetworkDetect",
            RecoParam::Custom { .. } => "Custom",
        }
    }

    /// Opaque parameter payload
    pub fn param(&self) -> &Value {
        const NULL: &Value = &Value::Null;
        match self {
            RecoParam::DirectHit => NULL,
            RecoParam::TemplateMatch(p)
            | RecoParam::FeatureMatch(p)
            | RecoParam::ColorMatch(p)
            | RecoParam::Ocr(p)
            | RecoParam::NeuralNetworkClassify(p)
            | RecoParam::NeuralNetworkDetect(p) => p,
            RecoParam::Custom { param, .. } => param,
        }
    }
}

/// Where an action should touch.
///
/// In JSON: `true` for the recognized box, a node name for the box that node
/// last recognized, or `[x, y, w, h]` for a fixed rectangle. `false` is
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "RawTarget")]
pub enum Target {
    #[default]
    SelfBox,
    Node(String),
    Fixed(Rect),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTarget {
    Flag(bool),
    Node(String),
    Rect(Rect),
}

impl TryFrom<RawTarget> for Target {
    type Error = &'static str;

    fn try_from(raw: RawTarget) -> Result<Self, Self::Error> {
        match raw {
            RawTarget::Flag(true) => Ok(Target::SelfBox),
            RawTarget::Flag(false) => Err("target must be true, a node name or [x, y, w, h]"),
            RawTarget::Node(name) => Ok(Target::Node(name)),
            RawTarget::Rect(rect) => Ok(Target::Fixed(rect)),
        }
    }
}

fn default_long_press_ms() -> u64 {
    DEFAULT_LONG_PRESS_MS
}

fn default_swipe_ms() -> u64 {
    DEFAULT_SWIPE_MS
}

/// What a node does once recognized
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(tag = "type", content = "param")]
pub enum ActionParam {
    #[default]
    DoNothing,
    Click {
        #[serde(default)]
        target: Target,
    },
    LongPress {
        #[serde(default)]
        target: Target,
        #[serde(default = "default_long_press_ms")]
        duration: u64,
    },
    Swipe {
        #[serde(default)]
        begin: Target,
        end: Target,
        #[serde(default = "default_swipe_ms")]
        duration: u64,
    },
    Key {
        keys: Vec<i32>,
    },
    InputText {
        text: String,
    },
    StartApp {
        package: String,
    },
    StopApp {
        package: String,
    },
    /// An action registered on the resource under `name`
    Custom {
        name: String,
        #[serde(default)]
        param: Value,
        #[serde(default)]
        target: Target,
    },
}

impl ActionParam {
    pub fn kind(&self) -> &'static str {
        match self {
            ActionParam::DoNothing => "DoNothing",
            ActionParam::Click { .. } => "Click",
            ActionParam::LongPress { .. } => "LongPress",
            ActionParam::Swipe { .. } => "Swipe",
            ActionParam::Key { .. } => "Key",
            ActionParam::InputText { .. } => "InputText",
            ActionParam::StartApp { .. } => "StartApp",
            ActionParam::StopApp { .. } => "StopApp",
            ActionParam::Custom { .. } => "Custom",
        }
    }
}

/// Wait until the screen stops changing.
///
/// A zero `time` disables the wait. In JSON either a bare number of
/// milliseconds (the `time`) or `{ "time": .., "timeout": .., "rate_limit": .. }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "RawWaitFreezes")]
pub struct WaitFreezes {
    /// How long the frame must stay unchanged
    pub time: Duration,
    /// Give up (successfully) after this long
    pub timeout: Duration,
    /// Capture interval
    pub rate_limit: Duration,
}

impl WaitFreezes {
    pub fn new(time: Duration) -> Self {
        Self {
            time,
            timeout: Duration::from_millis(DEFAULT_FREEZE_TIMEOUT_MS),
            rate_limit: Duration::from_millis(DEFAULT_FREEZE_RATE_LIMIT_MS),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.time.is_zero()
    }
}

impl Default for WaitFreezes {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawWaitFreezes {
    Time(u64),
    Full {
        #[serde(default)]
        time: u64,
        #[serde(default = "default_freeze_timeout")]
        timeout: u64,
        #[serde(default = "default_freeze_rate_limit")]
        rate_limit: u64,
    },
}

fn default_freeze_timeout() -> u64 {
    DEFAULT_FREEZE_TIMEOUT_MS
}

fn default_freeze_rate_limit() -> u64 {
    DEFAULT_FREEZE_RATE_LIMIT_MS
}

impl From<RawWaitFreezes> for WaitFreezes {
    fn from(raw: RawWaitFreezes) -> Self {
        match raw {
            RawWaitFreezes::Time(ms) => WaitFreezes::new(Duration::from_millis(ms)),
            RawWaitFreezes::Full {
                time,
                timeout,
                rate_limit,
            } => WaitFreezes {
                time: Duration::from_millis(time),
                timeout: Duration::from_millis(timeout),
                rate_limit: Duration::from_millis(rate_limit),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reco_param_forms() {
        let direct: RecoParam = serde_json::from_value(json!({ "type": "DirectHit" })).unwrap();
        assert_eq!(direct, RecoParam::DirectHit);

        let ocr: RecoParam =
            serde_json::from_value(json!({ "type": "OCR", "param": { "expected": ["Start"] } }))
                .unwrap();
        assert_eq!(ocr.kind(), "OCR");
        assert_eq!(ocr.param()["expected"][0], "Start");

        let custom: RecoParam =
            serde_json::from_value(json!({ "type": "Custom", "param": { "name": "finder" } }))
                .unwrap();
        assert_eq!(
            custom,
            RecoParam::Custom {
                name: "finder".into(),
                param: Value::Null
            }
        );
    }

    #[test]
    fn test_target_forms() {
        let t: Target = serde_json::from_value(json!(true)).unwrap();
        assert_eq!(t, Target::SelfBox);
        let t: Target = serde_json::from_value(json!("Login")).unwrap();
        assert_eq!(t, Target::Node("Login".into()));
        let t: Target = serde_json::from_value(json!([1, 2, 3, 4])).unwrap();
        assert_eq!(t, Target::Fixed(Rect::new(1, 2, 3, 4)));
    }

    #[test]
    fn test_false_target_rejected() {
        assert!(serde_json::from_value::<Target>(json!(false)).is_err());
        assert!(serde_json::from_value::<ActionParam>(
            json!({ "type": "Click", "param": { "target": false } })
        )
        .is_err());
    }

    #[test]
    fn test_action_defaults() {
        let click: ActionParam =
            serde_json::from_value(json!({ "type": "Click", "param": {} })).unwrap();
        assert_eq!(
            click,
            ActionParam::Click {
                target: Target::SelfBox
            }
        );

        let swipe: ActionParam = serde_json::from_value(
            json!({ "type": "Swipe", "param": { "end": [0, 0, 10, 10] } }),
        )
        .unwrap();
        match swipe {
            ActionParam::Swipe {
                begin,
                end,
                duration,
            } => {
                assert_eq!(begin, Target::SelfBox);
                assert_eq!(end, Target::Fixed(Rect::new(0, 0, 10, 10)));
                assert_eq!(duration, DEFAULT_SWIPE_MS);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_wait_freezes_forms() {
        let short: WaitFreezes = serde_json::from_value(json!(500)).unwrap();
        assert_eq!(short.time, Duration::from_millis(500));
        assert_eq!(short.timeout, Duration::from_millis(DEFAULT_FREEZE_TIMEOUT_MS));

        let full: WaitFreezes =
            serde_json::from_value(json!({ "time": 100, "timeout": 300, "rate_limit": 20 }))
                .unwrap();
        assert_eq!(full.rate_limit, Duration::from_millis(20));
        assert!(full.is_enabled());
        assert!(!WaitFreezes::default().is_enabled());
    }
}
