//! Device / window control boundary
//!
//! The engine drives a screen through the [`Controller`] trait and nothing
//! else. Platform back ends (ADB, Win32, Wayland, RPC, virtual HID, ...) live
//! outside this crate and implement it.
//!
//! All methods take `&self`: a controller is shared between the thread that
//! binds it and the worker thread that runs tasks, so implementations keep
//! their connection state behind their own locks.

use crate::types::Image;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Unified interface for screen controllers
///
/// # Example
///
/// ```ignore
/// fn tap_center(controller: &dyn Controller) -> bool {
///     match controller.screencap() {
///         Some(frame) => {
///             let (x, y) = frame.bounds().center();
///             controller.click(x, y)
///         }
///         None => false,
///     }
/// }
/// ```
pub trait Controller: Send + Sync {
    /// Check if the device/window is reachable
    fn connected(&self) -> bool;

    /// Capture the current frame (`None` on capture failure)
    fn screencap(&self) -> Option<Image>;

    /// Tap at a point
    fn click(&self, x: i32, y: i32) -> bool;

    /// Drag from one point to another over `duration`
    fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration: Duration) -> bool;

    /// Hold a point for `duration`
    ///
    /// Default implementation is a zero-length swipe.
    fn long_press(&self, x: i32, y: i32, duration: Duration) -> bool {
        self.swipe(x, y, x, y, duration)
    }

    /// Send a key code
    fn press_key(&self, keycode: i32) -> bool;

    /// Type text into the focused input
    fn input_text(&self, text: &str) -> bool;

    /// Launch an application by package/identifier
    fn start_app(&self, package: &str) -> bool;

    /// Terminate an application by package/identifier
    fn stop_app(&self, package: &str) -> bool;

    /// Abort any long-running operation; called when a stop is requested
    fn post_stop(&self) {}
}

/// Counters of controller calls made by the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControllerStats {
    /// Input operations that reported success
    pub successful_ops: u64,
    /// Input operations that reported failure
    pub failed_ops: u64,
    pub screencaps: u64,
    pub failed_screencaps: u64,
}

impl ControllerStats {
    /// Success rate of input operations as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.successful_ops + self.failed_ops;
        if total == 0 {
            100.0
        } else {
            (self.successful_ops as f64 / total as f64) * 100.0
        }
    }
}

/// Thread-safe recorder behind [`ControllerStats`]
#[derive(Debug, Default)]
pub struct StatsRecorder {
    successful_ops: AtomicU64,
    failed_ops: AtomicU64,
    screencaps: AtomicU64,
    failed_screencaps: AtomicU64,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an input operation and pass its result through
    pub fn op(&self, ok: bool) -> bool {
        let counter = if ok {
            &self.successful_ops
        } else {
            &self.failed_ops
        };
        counter.fetch_add(1, Ordering::Relaxed);
        ok
    }

    /// Count a capture and pass the frame through
    pub fn screencap(&self, frame: Option<Image>) -> Option<Image> {
        self.screencaps.fetch_add(1, Ordering::Relaxed);
        if frame.is_none() {
            self.failed_screencaps.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    pub fn snapshot(&self) -> ControllerStats {
        ControllerStats {
            successful_ops: self.successful_ops.load(Ordering::Relaxed),
            failed_ops: self.failed_ops.load(Ordering::Relaxed),
            screencaps: self.screencaps.load(Ordering::Relaxed),
            failed_screencaps: self.failed_screencaps.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.successful_ops.store(0, Ordering::Relaxed);
        self.failed_ops.store(0, Ordering::Relaxed);
        self.screencaps.store(0, Ordering::Relaxed);
        self.failed_screencaps.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_success_rate() {
        let stats = StatsRecorder::new();
        assert_eq!(stats.snapshot().success_rate(), 100.0);

        assert!(stats.op(true));
        assert!(stats.op(true));
        assert!(stats.op(true));
        assert!(!stats.op(false));
        assert!(stats.screencap(None).is_none());

        let snap = stats.snapshot();
        assert_eq!(snap.successful_ops, 3);
        assert_eq!(snap.failed_ops, 1);
        assert_eq!(snap.failed_screencaps, 1);
        assert!((snap.success_rate() - 75.0).abs() < f64::EPSILON);

        stats.reset();
        assert_eq!(stats.snapshot(), ControllerStats::default());
    }
}
