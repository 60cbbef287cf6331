//! Identity types for tasks, nodes, recognitions and actions.
//!
//! Every id is a `u64` newtype. Each kind lives in its own numeric range so
//! an id printed in a log line is unambiguous about what it refers to.
//! Ids are handed out by an [`IdGenerator`], which is an ordinary value
//! owned by whoever needs one (usually a `Tasker`), not a process global.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub const INVALID: $name = $name(0);

            #[inline]
            pub fn is_valid(self) -> bool {
                self != Self::INVALID
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if *self == Self::INVALID {
                    write!(f, "{}(INVALID)", stringify!($name))
                } else {
                    write!(f, "{}({})", stringify!($name), self.0)
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    };
}

define_id!(
    /// Externally visible id of a posted task.
    TaskId
);
define_id!(
    /// Id of one visited node (one [`NodeDetail`](crate::types::NodeDetail)).
    NodeId
);
define_id!(
    /// Id of one recognition attempt.
    RecoId
);
define_id!(
    /// Id of one executed action.
    ActionId
);

const TASK_ID_BASE: u64 = 200_000_000;
const NODE_ID_BASE: u64 = 300_000_000;
const RECO_ID_BASE: u64 = 400_000_000;
const ACTION_ID_BASE: u64 = 500_000_000;

/// Monotonic counters for every id kind.
///
/// Shared behind an `Arc` by the tasker and the interpreters it spawns.
/// Two generators never coordinate, so tests can run many engines in one
/// process without ids leaking between them.
#[derive(Debug)]
pub struct IdGenerator {
    task: AtomicU64,
    node: AtomicU64,
    reco: AtomicU64,
    action: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            task: AtomicU64::new(TASK_ID_BASE),
            node: AtomicU64::new(NODE_ID_BASE),
            reco: AtomicU64::new(RECO_ID_BASE),
            action: AtomicU64::new(ACTION_ID_BASE),
        }
    }

    pub fn next_task(&self) -> TaskId {
        TaskId(self.task.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn next_node(&self) -> NodeId {
        NodeId(self.node.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn next_reco(&self) -> RecoId {
        RecoId(self.reco.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn next_action(&self) -> ActionId {
        ActionId(self.action.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_invalid_ids() {
        assert!(!TaskId::INVALID.is_valid());
        assert!(!NodeId::default().is_valid());
        assert_eq!(format!("{:?}", RecoId::INVALID), "RecoId(INVALID)");
    }

    #[test]
    fn test_kinds_do_not_overlap() {
        let ids = IdGenerator::new();
        let task = ids.next_task().0;
        let node = ids.next_node().0;
        let reco = ids.next_reco().0;
        let action = ids.next_action().0;
        assert!(task < node && node < reco && reco < action);
    }

    #[test]
    fn test_generators_are_independent() {
        let a = IdGenerator::new();
        let b = IdGenerator::new();
        a.next_node();
        a.next_node();
        assert_eq!(b.next_node(), NodeId(NODE_ID_BASE + 1));
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let ids = std::sync::Arc::new(IdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..250).map(|_| ids.next_reco()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<RecoId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 1000);
    }

    proptest! {
        #[test]
        fn test_ids_strictly_increase(count in 1usize..200) {
            let ids = IdGenerator::new();
            let mut prev = TaskId::INVALID;
            for _ in 0..count {
                let next = ids.next_task();
                prop_assert!(next > prev);
                prev = next;
            }
        }
    }
}
