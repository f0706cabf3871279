use crate::sensor::ActivityProbe;
use tracing::debug;

/// How long after a near-threshold reading the motion counts as recent
pub const RECENT_PARK_SEC: f64 = 3.0;
/// Minimum spacing between threshold adjustments
pub const THRESH_ADAPT_SEC: f64 = 1.0;
/// Applied when input activity follows near-threshold motion
pub const THRESH_INCREASE_FACTOR: f64 = 1.1;
/// Applied when nothing came near the threshold recently
pub const THRESH_DECREASE_FACTOR: f64 = 0.9985;

/// Sensitivity threshold that backs off while the user is typing or
/// pointing through marginal motion, and decays back to the base otherwise.
///
/// Never drops below the base threshold.
#[derive(Debug, Clone)]
pub struct AdaptiveThreshold {
    base: f64,
    current: f64,
    last_change: Option<f64>,
    last_near: Option<f64>,
    last_activity: Option<f64>,
}

impl AdaptiveThreshold {
    pub fn new(base: f64) -> Self {
        Self {
            base,
            current: base,
            last_change: None,
            last_near: None,
            last_activity: None,
        }
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn last_near(&self) -> Option<f64> {
        self.last_near
    }

    pub fn recently_near(&self, now: f64) -> bool {
        self.last_near
            .map_or(false, |near| now < near + RECENT_PARK_SEC)
    }

    /// Remember that some channel came near the limit at `now`
    pub fn record_near(&mut self, now: f64) {
        self.last_near = Some(now);
    }

    /// Run one adjustment step at time `now`.
    ///
    /// The probe is only consulted while motion was recently near the limit.
    pub fn adjust(&mut self, now: f64, probe: &dyn ActivityProbe) {
        let recently_near = self.recently_near(now);
        if recently_near && probe.keyboard_or_mouse_active() {
            self.last_activity = Some(now);
        }

        let due = self
            .last_change
            .map_or(true, |changed| now > changed + THRESH_ADAPT_SEC);
        if !due {
            return;
        }

        if recently_near {
            if self.activity_after_near_and_change() {
                self.current *= THRESH_INCREASE_FACTOR;
                self.last_change = Some(now);
                debug!("Raised adaptive threshold to {:.2}", self.current);
            }
        } else {
            self.current = (self.current * THRESH_DECREASE_FACTOR).max(self.base);
            self.last_change = Some(now);
        }
    }

    fn activity_after_near_and_change(&self) -> bool {
        let Some(activity) = self.last_activity else {
            return false;
        };
        let after_near = self.last_near.map_or(true, |near| activity > near);
        let after_change = self.last_change.map_or(true, |changed| activity > changed);
        after_near && after_change
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::NoActivity;

    struct Busy;

    impl ActivityProbe for Busy {
        fn keyboard_or_mouse_active(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_raises_on_activity_after_near() {
        let mut threshold = AdaptiveThreshold::new(15.0);
        threshold.adjust(0.0, &Busy);
        assert_eq!(threshold.current(), 15.0);

        threshold.record_near(0.5);
        threshold.adjust(0.6, &Busy);
        // less than a second since the last change
        assert_eq!(threshold.current(), 15.0);

        threshold.adjust(1.2, &Busy);
        assert!((threshold.current() - 16.5).abs() < 1e-9);
    }

    #[test]
    fn test_no_raise_without_activity() {
        let mut threshold = AdaptiveThreshold::new(15.0);
        threshold.record_near(0.5);
        for step in 0..50 {
            threshold.adjust(0.6 + f64::from(step) * 0.1, &NoActivity);
        }
        assert_eq!(threshold.current(), 15.0);
    }

    #[test]
    fn test_decays_towards_base_once_quiet() {
        let mut threshold = AdaptiveThreshold::new(10.0);
        threshold.record_near(0.0);
        threshold.adjust(0.1, &Busy);
        threshold.adjust(1.5, &Busy);
        let raised = threshold.current();
        assert!(raised > 10.0);

        let mut now = 1.5;
        for _ in 0..200 {
            now += 1.01;
            threshold.adjust(now, &NoActivity);
            assert!(threshold.current() >= threshold.base());
        }
        assert!(threshold.current() < raised);
    }

    #[test]
    fn test_recently_near_window() {
        let mut threshold = AdaptiveThreshold::new(15.0);
        assert!(!threshold.recently_near(0.0));
        threshold.record_near(10.0);
        assert!(threshold.recently_near(12.9));
        assert!(!threshold.recently_near(13.1));
    }
}
