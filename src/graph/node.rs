//! Pipeline node definition.
//!
//! A [`Node`] is parsed from one entry of a pipeline document. Missing timing
//! fields are filled from [`NodeDefaults`] at parse time, so a parsed node is
//! self-contained and can be snapshotted by a running task.
//!
//! Edges (`next`, `interrupt`, `on_error`, `jumpback`) stay as names. They are
//! resolved by the interpreter at the moment it needs them, which keeps
//! overrides applied after loading visible to new runs.

use crate::config::NodeDefaults;
use crate::error::{FlowError, Result};
use crate::graph::params::{ActionParam, RecoParam, WaitFreezes};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;

/// One named node of a pipeline graph
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub enabled: bool,
    /// Recognition hits allowed per run
    pub max_hit: u32,
    /// Push the previous node onto the interrupt stack when this node is hit
    pub is_sub: bool,
    pub next: Vec<String>,
    pub interrupt: Vec<String>,
    pub on_error: Vec<String>,
    pub checkpoint: BTreeSet<String>,
    pub jumpback: Vec<String>,
    pub reco_timeout: Duration,
    pub rate_limit: Duration,
    pub pre_delay: Duration,
    pub post_delay: Duration,
    pub pre_wait_freezes: WaitFreezes,
    pub post_wait_freezes: WaitFreezes,
    pub recognition: RecoParam,
    pub action: ActionParam,
    /// Forces node-level notifications for this node
    pub focus: Option<serde_json::Value>,
}

impl Node {
    /// A node with the built-in default timings
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_defaults(name, &NodeDefaults::default())
    }

    pub fn with_defaults(name: impl Into<String>, defaults: &NodeDefaults) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            max_hit: defaults.max_hit.unwrap_or(u32::MAX),
            is_sub: false,
            next: Vec::new(),
            interrupt: Vec::new(),
            on_error: Vec::new(),
            checkpoint: BTreeSet::new(),
            jumpback: Vec::new(),
            reco_timeout: Duration::from_millis(defaults.reco_timeout_ms),
            rate_limit: Duration::from_millis(defaults.rate_limit_ms),
            pre_delay: Duration::from_millis(defaults.pre_delay_ms),
            post_delay: Duration::from_millis(defaults.post_delay_ms),
            pre_wait_freezes: WaitFreezes::default(),
            post_wait_freezes: WaitFreezes::default(),
            recognition: RecoParam::default(),
            action: ActionParam::default(),
            focus: None,
        }
    }

    /// Parse a node from its JSON definition
    pub fn from_json(
        name: impl Into<String>,
        value: serde_json::Value,
        defaults: &NodeDefaults,
    ) -> Result<Self> {
        let name = name.into();
        let def: NodeDef = serde_json::from_value(value)
            .map_err(|e| FlowError::GraphParse(format!("node '{}': {}", name, e)))?;
        Ok(def.into_node(name, defaults))
    }

    pub fn with_next<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_interrupt<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interrupt = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_on_error<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on_error = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_checkpoint<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.checkpoint = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_jumpback<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.jumpback = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_recognition(mut self, recognition: RecoParam) -> Self {
        self.recognition = recognition;
        self
    }

    pub fn with_action(mut self, action: ActionParam) -> Self {
        self.action = action;
        self
    }

    pub fn with_max_hit(mut self, max_hit: u32) -> Self {
        self.max_hit = max_hit;
        self
    }

    pub fn with_timing(mut self, reco_timeout: Duration, rate_limit: Duration) -> Self {
        self.reco_timeout = reco_timeout;
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_focus(mut self, focus: serde_json::Value) -> Self {
        self.focus = Some(focus);
        self
    }

    pub fn sub(mut self) -> Self {
        self.is_sub = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Every name this node may hand control to
    pub fn referenced_names(&self) -> impl Iterator<Item = &str> {
        self.next
            .iter()
            .chain(&self.interrupt)
            .chain(&self.on_error)
            .map(String::as_str)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(v: OneOrMany) -> Self {
        match v {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    OneOrMany::deserialize(deserializer).map(Into::into)
}

/// Wire form of a node; every field optional.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeDef {
    enabled: Option<bool>,
    max_hit: Option<u32>,
    is_sub: Option<bool>,
    #[serde(default, deserialize_with = "one_or_many")]
    next: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    interrupt: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    on_error: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    checkpoint: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    jumpback: Vec<String>,
    timeout: Option<u64>,
    rate_limit: Option<u64>,
    pre_delay: Option<u64>,
    post_delay: Option<u64>,
    pre_wait_freezes: Option<WaitFreezes>,
    post_wait_freezes: Option<WaitFreezes>,
    #[serde(default)]
    recognition: RecoParam,
    #[serde(default)]
    action: ActionParam,
    focus: Option<serde_json::Value>,
}

impl NodeDef {
    fn into_node(self, name: String, defaults: &NodeDefaults) -> Node {
        let ms = |v: Option<u64>, d: u64| Duration::from_millis(v.unwrap_or(d));
        Node {
            name,
            enabled: self.enabled.unwrap_or(true),
            max_hit: self.max_hit.or(defaults.max_hit).unwrap_or(u32::MAX),
            is_sub: self.is_sub.unwrap_or(false),
            next: self.next,
            interrupt: self.interrupt,
            on_error: self.on_error,
            checkpoint: self.checkpoint.into_iter().collect(),
            jumpback: self.jumpback,
            reco_timeout: ms(self.timeout, defaults.reco_timeout_ms),
            rate_limit: ms(self.rate_limit, defaults.rate_limit_ms),
            pre_delay: ms(self.pre_delay, defaults.pre_delay_ms),
            post_delay: ms(self.post_delay, defaults.post_delay_ms),
            pre_wait_freezes: self.pre_wait_freezes.unwrap_or_default(),
            post_wait_freezes: self.post_wait_freezes.unwrap_or_default(),
            recognition: self.recognition,
            action: self.action,
            focus: self.focus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::params::Target;
    use serde_json::json;

    #[test]
    fn test_minimal_node_takes_defaults() {
        let node = Node::from_json("Start", json!({}), &NodeDefaults::default()).unwrap();
        assert_eq!(node.name, "Start");
        assert!(node.enabled);
        assert_eq!(node.max_hit, u32::MAX);
        assert_eq!(node.reco_timeout, Duration::from_millis(20_000));
        assert_eq!(node.recognition, RecoParam::DirectHit);
        assert_eq!(node.action, ActionParam::DoNothing);
    }

    #[test]
    fn test_full_node() {
        let node = Node::from_json(
            "Login",
            json!({
                "next": "Home",
                "interrupt": ["CloseAd", "Reconnect"],
                "on_error": ["Restart"],
                "checkpoint": "login",
                "jumpback": [],
                "is_sub": true,
                "max_hit": 3,
                "timeout": 5000,
                "rate_limit": 250,
                "pre_delay": 0,
                "post_wait_freezes": 300,
                "recognition": { "type": "TemplateMatch", "param": { "template": "login.png" } },
                "action": { "type": "Click", "param": { "target": [10, 10, 20, 20] } },
                "focus": { "start": "logging in" }
            }),
            &NodeDefaults::default(),
        )
        .unwrap();

        assert_eq!(node.next, vec!["Home"]);
        assert_eq!(node.interrupt, vec!["CloseAd", "Reconnect"]);
        assert!(node.checkpoint.contains("login"));
        assert!(node.is_sub);
        assert_eq!(node.max_hit, 3);
        assert_eq!(node.rate_limit, Duration::from_millis(250));
        assert_eq!(node.pre_delay, Duration::ZERO);
        assert_eq!(node.post_delay, Duration::from_millis(200));
        assert!(node.post_wait_freezes.is_enabled());
        assert!(matches!(
            node.action,
            ActionParam::Click {
                target: Target::Fixed(_)
            }
        ));
        assert!(node.focus.is_some());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Node::from_json("A", json!({ "nxet": ["B"] }), &NodeDefaults::default())
            .unwrap_err();
        assert!(err.to_string().contains("node 'A'"));
    }

    #[test]
    fn test_referenced_names() {
        let node = Node::new("A")
            .with_next(["B"])
            .with_interrupt(["C"])
            .with_on_error(["D"]);
        let names: Vec<_> = node.referenced_names().collect();
        assert_eq!(names, vec!["B", "C", "D"]);
    }
}
