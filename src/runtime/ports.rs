//! The two seams between the interpreter and the outside world.
//!
//! Implementations must not panic across these calls in normal operation and
//! turn every internal fault into "no hit" / `false`. The interpreter still
//! guards each call so a misbehaving port costs one attempt, not the worker.

use crate::graph::{Node, WaitFreezes};
use crate::runtime::context::StopToken;
use crate::types::{Image, RecoResult, Recognition};

/// Decides whether a node is on screen
pub trait Recognizer: Send + Sync {
    /// `None` means no hit
    fn recognize(&self, image: &Image, node: &Node) -> Option<Recognition>;
}

/// Executes node actions
pub trait Actuator: Send + Sync {
    /// Run `node`'s action for the recognition `hit`
    fn run(&self, hit: &RecoResult, node: &Node, stop: &StopToken) -> bool;

    /// Block until the screen is still, as configured by `wait`.
    ///
    /// Returns false if the wait was abandoned.
    fn wait_freezes(&self, _wait: &WaitFreezes, _node: &Node, _stop: &StopToken) -> bool {
        true
    }
}

impl<F> Recognizer for F
where
    F: Fn(&Image, &Node) -> Option<Recognition> + Send + Sync,
{
    fn recognize(&self, image: &Image, node: &Node) -> Option<Recognition> {
        self(image, node)
    }
}
