use crate::analyzer::MotionAnalyzer;
use crate::error::SensorError;
use crate::events::{EventBus, GuardEvent};
use crate::sensor::{
    retroactive_sample, unix_now, ActivityProbe, FallIndicator, Sample, SampleSource,
};
use std::time::Duration;

/// A protection decision and the time it refers to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub want_protect: bool,
    pub now: f64,
}

/// Motion analysis on position samples
pub struct SoftwareLogic {
    source: Box<dyn SampleSource>,
    analyzer: MotionAnalyzer,
    activity: Box<dyn ActivityProbe>,
    interval: Duration,
    previous: Option<Sample>,
}

impl SoftwareLogic {
    pub fn new(
        source: Box<dyn SampleSource>,
        analyzer: MotionAnalyzer,
        activity: Box<dyn ActivityProbe>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            analyzer,
            activity,
            interval,
            previous: None,
        }
    }

    pub fn analyzer(&self) -> &MotionAnalyzer {
        &self.analyzer
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Acquire one sample and analyze it.
    ///
    /// Change-only sources get a retroactive sample first when the position
    /// sat still for longer than the sampling cadence.
    pub async fn next_decision(
        &mut self,
        parked: bool,
        bus: &EventBus,
    ) -> Result<Decision, SensorError> {
        let sample = self.source.next_sample().await?;

        if self.source.emits_on_change() {
            if let Some(filler) = self
                .previous
                .and_then(|previous| retroactive_sample(&previous, &sample, self.interval))
            {
                let report = self.analyzer.analyze(&filler, parked, self.activity.as_ref());
                bus.publish(GuardEvent::MotionSample(report));
            }
        }
        self.previous = Some(sample);

        let report = self.analyzer.analyze(&sample, parked, self.activity.as_ref());
        let decision = Decision {
            want_protect: report.protect,
            now: report.timestamp,
        };
        bus.publish(GuardEvent::MotionSample(report));
        Ok(decision)
    }
}

/// Fall decisions made by the hardware
pub struct HardwareLogic {
    indicator: Box<dyn FallIndicator>,
}

impl HardwareLogic {
    pub fn new(indicator: Box<dyn FallIndicator>) -> Self {
        Self { indicator }
    }

    pub fn indicator_name(&self) -> &str {
        self.indicator.name()
    }

    pub async fn next_decision(
        &mut self,
        parked: bool,
        bus: &EventBus,
    ) -> Result<Decision, SensorError> {
        let count = self.indicator.read_fall_count(parked).await?;
        let now = unix_now();
        bus.publish(GuardEvent::HardwareFall { count, at: now });
        Ok(Decision {
            want_protect: count > 0,
            now,
        })
    }
}

/// Where protection decisions come from; fixed for the whole run
pub enum DecisionLogic {
    Software(SoftwareLogic),
    Hardware(HardwareLogic),
}

impl DecisionLogic {
    pub async fn next_decision(
        &mut self,
        parked: bool,
        bus: &EventBus,
    ) -> Result<Decision, SensorError> {
        match self {
            DecisionLogic::Software(logic) => logic.next_decision(parked, bus).await,
            DecisionLogic::Hardware(logic) => logic.next_decision(parked, bus).await,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            DecisionLogic::Software(logic) => {
                format!("software logic on {}", logic.source_name())
            }
            DecisionLogic::Hardware(logic) => {
                format!("hardware logic on {}", logic.indicator_name())
            }
        }
    }
}
