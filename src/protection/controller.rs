use super::{DeviceSet, IndicatorHandle, ProtectionIo};
use crate::error::ProtectionError;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Minimum time the disks stay parked after the last park command
pub const FREEZE_SECONDS: f64 = 1.0;
/// Reissue the park command this often while protection is still wanted
pub const REFREEZE_SECONDS: f64 = 0.1;
/// Slack added to the kernel-side timer on every park command
pub const FREEZE_EXTRA_SECONDS: f64 = 4.0;
/// Default cooldown after a pause request
pub const DEFAULT_PAUSE_SECONDS: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProtectionState {
    Unparked,
    Parked {
        /// Time of the initial park
        since: f64,
        /// Time of the most recent park command
        last_freeze: f64,
    },
}

impl ProtectionState {
    pub fn is_parked(&self) -> bool {
        matches!(self, ProtectionState::Parked { .. })
    }

    pub fn parked_since(&self) -> Option<f64> {
        match self {
            ProtectionState::Parked { since, .. } => Some(*since),
            ProtectionState::Unparked => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    Parked,
    Refrozen,
    Unparked,
}

/// Result of one controller step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub transition: Transition,
    /// Sleep before the next evaluation, set once a pause takes effect
    pub cooldown: Option<Duration>,
    /// Disks whose protect command failed, with the error
    pub failures: Vec<(String, ProtectionError)>,
    /// Disks found already unparked when about to unpark them
    pub mismatches: Vec<String>,
}

impl StepOutcome {
    fn new() -> Self {
        Self {
            transition: Transition::None,
            cooldown: None,
            failures: Vec::new(),
            mismatches: Vec::new(),
        }
    }
}

/// Park/unpark state machine over a set of disks.
///
/// Each step takes the current want-protect signal. Parking happens at
/// once; while protection stays wanted the park command is reissued every
/// [`REFREEZE_SECONDS`]; unparking waits until [`FREEZE_SECONDS`] have
/// passed since the last park command. A pause request blocks parking,
/// lets an existing park expire, and then asks the caller to cool down.
pub struct ProtectionController {
    disks: DeviceSet,
    io: Box<dyn ProtectionIo>,
    indicator: IndicatorHandle,
    state: ProtectionState,
    pause_pending: bool,
    pause_duration: Duration,
    park_duration: u64,
}

impl ProtectionController {
    pub fn new(disks: DeviceSet, io: Box<dyn ProtectionIo>, indicator: IndicatorHandle) -> Self {
        let park_duration = ((FREEZE_SECONDS + FREEZE_EXTRA_SECONDS)
            * disks.interface().duration_factor() as f64)
            .round() as u64;

        Self {
            disks,
            io,
            indicator,
            state: ProtectionState::Unparked,
            pause_pending: false,
            pause_duration: Duration::from_secs(DEFAULT_PAUSE_SECONDS),
            park_duration,
        }
    }

    pub fn with_pause_duration(mut self, pause_duration: Duration) -> Self {
        self.pause_duration = pause_duration;
        self
    }

    pub fn state(&self) -> ProtectionState {
        self.state
    }

    pub fn is_parked(&self) -> bool {
        self.state.is_parked()
    }

    pub fn is_paused(&self) -> bool {
        self.pause_pending
    }

    pub fn disks(&self) -> &DeviceSet {
        &self.disks
    }

    /// Value written to the protect attribute on every park command
    pub fn park_duration(&self) -> u64 {
        self.park_duration
    }

    /// Request a pause; repeated requests before it takes effect coalesce
    pub fn request_pause(&mut self) {
        if !self.pause_pending {
            debug!("Pause requested");
        }
        self.pause_pending = true;
    }

    /// Run one transition for the signal observed at `now`
    pub fn step(&mut self, want_protect: bool, now: f64) -> StepOutcome {
        let mut outcome = StepOutcome::new();
        let pause = self.pause_pending;

        if want_protect && !pause {
            match self.state {
                ProtectionState::Unparked => {
                    self.freeze_all(&mut outcome);
                    // Park before any output; the terminal may be swapped out
                    info!("parking");
                    self.indicator.set(true);
                    self.state = ProtectionState::Parked {
                        since: now,
                        last_freeze: now,
                    };
                    outcome.transition = Transition::Parked;
                }
                ProtectionState::Parked { since, last_freeze }
                    if now > last_freeze + REFREEZE_SECONDS =>
                {
                    self.freeze_all(&mut outcome);
                    self.state = ProtectionState::Parked {
                        since,
                        last_freeze: now,
                    };
                    outcome.transition = Transition::Refrozen;
                }
                ProtectionState::Parked { .. } => {}
            }
        } else if let ProtectionState::Parked { last_freeze, .. } = self.state {
            if now > last_freeze + FREEZE_SECONDS {
                self.check_still_parked(&mut outcome);
                self.release_all(&mut outcome);
                self.indicator.set(false);
                info!("unparking");
                self.state = ProtectionState::Unparked;
                outcome.transition = Transition::Unparked;
            }
        }

        if pause && !self.is_parked() {
            self.pause_pending = false;
            info!("pausing for {} seconds", self.pause_duration.as_secs());
            outcome.cooldown = Some(self.pause_duration);
        }

        outcome
    }

    fn freeze_all(&mut self, outcome: &mut StepOutcome) {
        let duration = self.park_duration;
        self.write_all(duration, outcome);
    }

    fn release_all(&mut self, outcome: &mut StepOutcome) {
        self.write_all(0, outcome);
    }

    fn write_all(&mut self, duration: u64, outcome: &mut StepOutcome) {
        for disk in self.disks.iter() {
            if let Err(e) = self.io.set_protection(disk, duration) {
                error!("{}", e.user_message());
                outcome.failures.push((disk.name().to_string(), e));
            }
        }
    }

    fn check_still_parked(&mut self, outcome: &mut StepOutcome) {
        for disk in self.disks.iter() {
            match self.io.read_parked(disk) {
                Ok(Some(false)) => {
                    warn!(
                        "Not parked when we thought we were (paged out and timer expired?): {}",
                        disk.name()
                    );
                    outcome.mismatches.push(disk.name().to_string());
                }
                Ok(_) => {}
                Err(e) => debug!("Skipping readback of {}: {}", disk.name(), e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelInterface;
    use crate::protection::{RecordingIndicator, RecordingProtection};

    fn controller(names: &[&str]) -> (ProtectionController, RecordingProtection, RecordingIndicator) {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let disks = DeviceSet::from_names("/sys/block", KernelInterface::UnloadHeads, &names);
        let io = RecordingProtection::new();
        let led = RecordingIndicator::new();
        let controller = ProtectionController::new(
            disks,
            Box::new(io.clone()),
            IndicatorHandle::new(Box::new(led.clone())),
        );
        (controller, io, led)
    }

    #[test]
    fn test_park_duration_per_interface() {
        let (controller, _, _) = controller(&["sda"]);
        assert_eq!(controller.park_duration(), 5000);

        let disks = DeviceSet::from_names(
            "/sys/block",
            KernelInterface::QueueProtect,
            &["sda".to_string()],
        );
        let controller = ProtectionController::new(
            disks,
            Box::new(RecordingProtection::new()),
            IndicatorHandle::disabled(),
        );
        assert_eq!(controller.park_duration(), 5);
    }

    #[test]
    fn test_park_writes_every_disk_and_lights_led() {
        let (mut controller, io, led) = controller(&["sda", "sdb"]);

        let outcome = controller.step(true, 10.0);
        assert_eq!(outcome.transition, Transition::Parked);
        assert_eq!(controller.state().parked_since(), Some(10.0));
        let disks: Vec<String> = io.writes().into_iter().map(|w| w.disk).collect();
        assert_eq!(disks, vec!["sda", "sdb"]);
        assert_eq!(io.durations(), vec![5000, 5000]);
        assert_eq!(led.states(), vec![true]);
    }

    #[test]
    fn test_short_burst_holds_minimum_freeze() {
        let (mut controller, io, led) = controller(&["sda"]);
        let signal = [true, true, true, false, false];

        for (i, want) in signal.iter().enumerate() {
            let outcome = controller.step(*want, i as f64 * 0.05);
            assert_ne!(outcome.transition, Transition::Unparked);
            assert!(controller.is_parked());
        }

        // 0.05 intervals never exceed the refreeze period
        assert_eq!(io.durations(), vec![5000]);
        assert_eq!(led.states(), vec![true]);
    }

    #[test]
    fn test_refreeze_keeps_original_park_time() {
        let (mut controller, io, _) = controller(&["sda"]);

        controller.step(true, 0.0);
        let mut refreezes = 0;
        for i in 1..=30 {
            let outcome = controller.step(true, i as f64 * 0.06);
            if outcome.transition == Transition::Refrozen {
                refreezes += 1;
            }
            assert_eq!(controller.state().parked_since(), Some(0.0));
        }

        // every other step is more than 0.1s after the previous command
        assert_eq!(refreezes, 15);
        assert_eq!(io.durations().len(), 16);
        assert!(io.durations().iter().all(|d| *d == 5000));
    }

    #[test]
    fn test_unpark_after_freeze_elapses() {
        let (mut controller, io, led) = controller(&["sda"]);

        controller.step(true, 0.0);
        assert_eq!(controller.step(false, 0.5).transition, Transition::None);
        assert_eq!(controller.step(false, 1.0).transition, Transition::None);

        let outcome = controller.step(false, 1.01);
        assert_eq!(outcome.transition, Transition::Unparked);
        assert!(outcome.mismatches.is_empty());
        assert_eq!(controller.state(), ProtectionState::Unparked);
        assert_eq!(controller.state().parked_since(), None);
        assert_eq!(io.durations(), vec![5000, 0]);
        assert_eq!(led.states(), vec![true, false]);
    }

    #[test]
    fn test_pause_while_parked_waits_for_freeze_then_cools_down() {
        let (mut controller, io, _) = controller(&["sda"]);
        controller.step(true, 0.0);

        controller.request_pause();
        controller.request_pause();
        let held = controller.step(true, 0.5);
        assert_eq!(held.transition, Transition::None);
        assert!(held.cooldown.is_none());
        assert!(controller.is_paused());

        let lifted = controller.step(true, 1.2);
        assert_eq!(lifted.transition, Transition::Unparked);
        assert_eq!(lifted.cooldown, Some(Duration::from_secs(DEFAULT_PAUSE_SECONDS)));
        assert!(!controller.is_paused());
        assert_eq!(io.durations(), vec![5000, 0]);

        // pause consumed; protection resumes
        assert_eq!(controller.step(true, 1.3).transition, Transition::Parked);
    }

    #[test]
    fn test_pause_while_unparked_blocks_parking() {
        let (mut controller, io, _) = controller(&["sda"]);
        controller.request_pause();

        let outcome = controller.step(true, 0.0);
        assert_eq!(outcome.transition, Transition::None);
        assert!(outcome.cooldown.is_some());
        assert!(io.writes().is_empty());
    }

    #[test]
    fn test_custom_pause_duration() {
        let (controller, _, _) = controller(&["sda"]);
        let mut controller = controller.with_pause_duration(Duration::from_millis(10));
        controller.request_pause();
        assert_eq!(
            controller.step(false, 0.0).cooldown,
            Some(Duration::from_millis(10))
        );
    }

    #[test]
    fn test_sanity_mismatch_is_reported_not_fatal() {
        let (mut controller, io, _) = controller(&["sda"]);
        controller.step(true, 0.0);

        io.set_report_unparked(true);
        let outcome = controller.step(false, 2.0);
        assert_eq!(outcome.transition, Transition::Unparked);
        assert_eq!(outcome.mismatches, vec!["sda".to_string()]);
        assert_eq!(io.durations(), vec![5000, 0]);
    }

    #[test]
    fn test_failed_park_retries_on_refreeze_cadence() {
        let (mut controller, io, _) = controller(&["sda"]);
        io.set_failing(true);

        let outcome = controller.step(true, 0.0);
        assert_eq!(outcome.transition, Transition::Parked);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, "sda");
        assert!(controller.is_parked());

        io.set_failing(false);
        let outcome = controller.step(true, 0.05);
        assert_eq!(outcome.transition, Transition::None);
        assert!(io.durations().is_empty());

        let outcome = controller.step(true, 0.2);
        assert_eq!(outcome.transition, Transition::Refrozen);
        assert!(outcome.failures.is_empty());
        assert_eq!(io.durations(), vec![5000]);
    }
}
