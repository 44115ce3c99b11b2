//! Popup seams and the pointer-travel dismiss rule.

use crate::decoder::{Bitmap, Region};

/// Called with pointer coordinates relative to the popup on every motion.
pub type MotionHandler = Box<dyn Fn(f64, f64)>;

/// The preview popup window. Only ever touched on the UI thread.
pub trait Popup {
    /// Redraw exactly `region` of the attached bitmap.
    fn invalidate(&self, region: Region);

    fn destroy(&self);
}

/// The widget hosting previews.
pub trait Host: 'static {
    type Popup: Popup;

    /// Current size of the host's toplevel window.
    fn host_size(&self) -> (i32, i32);

    /// Create and show an undecorated, always-on-top, non-focusable popup
    /// centered on the host, showing `bitmap`, and routing pointer motion to
    /// `on_motion`.
    fn create_popup(&self, bitmap: &Bitmap, on_motion: MotionHandler) -> Self::Popup;
}

/// Dismisses the popup once the pointer has travelled far enough from where
/// it was first seen.
#[derive(Debug, Clone)]
pub struct PointerTracker {
    origin: Option<(f64, f64)>,
    threshold_sq: f64,
}

impl PointerTracker {
    pub fn new(distance: f64) -> Self {
        Self {
            origin: None,
            threshold_sq: distance * distance,
        }
    }

    pub fn origin(&self) -> Option<(f64, f64)> {
        self.origin
    }

    /// Records a motion event. Returns true when the popup should go away.
    /// The first event only sets the origin.
    pub fn observe(&mut self, x: f64, y: f64) -> bool {
        let Some((ox, oy)) = self.origin else {
            self.origin = Some((x, y));
            return false;
        };
        let dx = ox - x;
        let dy = oy - y;
        dx * dx + dy * dy >= self.threshold_sq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_motion_sets_origin() {
        let mut tracker = PointerTracker::new(30.0);
        assert!(!tracker.observe(100.0, 100.0));
        assert_eq!(tracker.origin(), Some((100.0, 100.0)));
        // Far away, but only the second event counts.
        assert!(tracker.observe(500.0, 500.0));
    }

    #[test]
    fn test_threshold_boundary() {
        let mut tracker = PointerTracker::new(30.0);
        tracker.observe(100.0, 100.0);
        assert!(!tracker.observe(129.0, 100.0));
        assert!(tracker.observe(130.0, 100.0));
        assert_eq!(tracker.origin(), Some((100.0, 100.0)));
    }

    #[test]
    fn test_origin_at_zero_is_a_real_origin() {
        let mut tracker = PointerTracker::new(30.0);
        assert!(!tracker.observe(0.0, 0.0));
        assert_eq!(tracker.origin(), Some((0.0, 0.0)));
        assert!(!tracker.observe(10.0, 10.0));
        assert!(tracker.observe(0.0, 30.0));
    }

    #[test]
    fn test_diagonal_distance() {
        let mut tracker = PointerTracker::new(30.0);
        tracker.observe(0.0, 0.0);
        // 21^2 + 21^2 = 882 < 900
        assert!(!tracker.observe(21.0, 21.0));
        // 22^2 + 22^2 = 968
        assert!(tracker.observe(22.0, 22.0));
    }
}
