use super::logic::{DecisionLogic, HardwareLogic, SoftwareLogic};
use super::signals::ControlFlags;
use crate::analyzer::MotionAnalyzer;
use crate::error::{DiskguardError, Result};
use crate::events::{EventBus, GuardEvent};
use crate::protection::{ProtectionController, StepOutcome, Transition};
use crate::sensor::{ActivityProbe, FallIndicator, SampleSource};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// The protection loop: acquire, decide, drive the disks, repeat
pub struct Guard {
    logic: DecisionLogic,
    controller: ProtectionController,
    bus: EventBus,
    flags: ControlFlags,
}

impl Guard {
    pub fn builder() -> GuardBuilder {
        GuardBuilder::new()
    }

    pub fn controller(&self) -> &ProtectionController {
        &self.controller
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn flags(&self) -> &ControlFlags {
        &self.flags
    }

    /// Run until shutdown is requested or acquisition fails for good.
    ///
    /// Returns the process exit status. Disks parked at shutdown are left
    /// to the kernel-side timer.
    pub async fn run(&mut self) -> Result<i32> {
        info!(
            "Protecting {} using {}",
            self.controller.disks().names().join(", "),
            self.logic.describe()
        );

        while self.flags.keep_running() {
            let parked = self.controller.is_parked();
            let decision = match self.logic.next_decision(parked, &self.bus).await {
                Ok(decision) => decision,
                Err(e) if e.is_fatal() => {
                    error!("Sensor failed: {}", e);
                    return Err(e.into());
                }
                Err(e) => {
                    warn!("readout error ({})", e);
                    self.bus.publish(GuardEvent::ReadoutError {
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            if self.flags.take_pause() {
                self.controller.request_pause();
            }

            let outcome = self.controller.step(decision.want_protect, decision.now);
            self.publish_outcome(&outcome, decision.now);

            if let Some(cooldown) = outcome.cooldown {
                self.bus.publish(GuardEvent::PauseStarted {
                    seconds: cooldown.as_secs(),
                });
                sleep(cooldown).await;
            }
        }

        if self.controller.is_parked() {
            info!("Terminating while parked; the kernel timer will release the heads");
        } else {
            info!("Terminating");
        }
        Ok(0)
    }

    fn publish_outcome(&self, outcome: &StepOutcome, now: f64) {
        let transition = match outcome.transition {
            Transition::Parked => Some(GuardEvent::Parked { at: now }),
            Transition::Refrozen => Some(GuardEvent::Refrozen { at: now }),
            Transition::Unparked => Some(GuardEvent::Unparked { at: now }),
            Transition::None => None,
        };
        if let Some(event) = transition {
            self.bus.publish(event);
        }

        for disk in &outcome.mismatches {
            self.bus.publish(GuardEvent::SanityMismatch { disk: disk.clone() });
        }
        for (disk, error) in &outcome.failures {
            self.bus.publish(GuardEvent::ProtectionFailed {
                disk: disk.clone(),
                error: error.to_string(),
            });
        }
    }
}

/// Assembles a [`Guard`] from its collaborators
#[derive(Default)]
pub struct GuardBuilder {
    logic: Option<DecisionLogic>,
    controller: Option<ProtectionController>,
    bus: Option<EventBus>,
    flags: Option<ControlFlags>,
}

impl GuardBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide from position samples through the motion analyzer
    pub fn software(
        mut self,
        source: Box<dyn SampleSource>,
        analyzer: MotionAnalyzer,
        activity: Box<dyn ActivityProbe>,
        interval: Duration,
    ) -> Self {
        self.logic = Some(DecisionLogic::Software(SoftwareLogic::new(
            source, analyzer, activity, interval,
        )));
        self
    }

    /// Decide from the hardware fall counter
    pub fn hardware(mut self, indicator: Box<dyn FallIndicator>) -> Self {
        self.logic = Some(DecisionLogic::Hardware(HardwareLogic::new(indicator)));
        self
    }

    pub fn controller(mut self, controller: ProtectionController) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn flags(mut self, flags: ControlFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn build(self) -> Result<Guard> {
        let logic = self
            .logic
            .ok_or_else(|| DiskguardError::component("guard", "no decision logic configured"))?;
        let controller = self
            .controller
            .ok_or_else(|| DiskguardError::component("guard", "no protection controller"))?;

        if controller.disks().is_empty() {
            return Err(DiskguardError::component("guard", "no devices to protect"));
        }

        Ok(Guard {
            logic,
            controller,
            bus: self.bus.unwrap_or_else(|| EventBus::new(DEFAULT_EVENT_CAPACITY)),
            flags: self.flags.unwrap_or_default(),
        })
    }
}

/// Event bus capacity when none is supplied
pub const DEFAULT_EVENT_CAPACITY: usize = 256;
