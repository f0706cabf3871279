use super::adaptive::AdaptiveThreshold;
use crate::sensor::{ActivityProbe, Sample};
use std::fmt;
use tracing::trace;

/// Scale applied to the threshold for the velocity test
pub const VELOC_ADJUST: f64 = 30.0;
/// Scale applied to the threshold for the acceleration test
pub const ACCEL_ADJUST: f64 = VELOC_ADJUST * 60.0;
/// Scale applied to the threshold for the average velocity test
pub const AVG_VELOC_ADJUST: f64 = 3.0;
/// Time constant of the exponentially decaying velocity average
pub const AVG_DEPTH_SEC: f64 = 0.3;
/// Fraction of a limit that counts as near it
pub const NEAR_THRESH_FACTOR: f64 = 0.8;
/// Threshold multiplier while parked; must not exceed the near factor
pub const PARKED_THRESH_FACTOR: f64 = NEAR_THRESH_FACTOR;
/// Longer pauses between samples (suspend/resume) restart the warm-up
pub const GAP_RESET_SEC: f64 = 1.0;
/// Samples needed before a derivative is trusted
pub const WARMUP_SAMPLES: u8 = 2;
/// Floor for the time delta between samples
pub const MIN_SAMPLE_DELTA: f64 = 1e-4;

/// Per-run sensitivity settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdConfig {
    pub base: f64,
    pub adaptive: bool,
}

impl ThresholdConfig {
    pub fn new(base: f64, adaptive: bool) -> Self {
        Self { base, adaptive }
    }
}

/// Outcome of testing one channel against its limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Below,
    Near,
    Above,
}

impl Level {
    fn classify(value_sqr: f64, limit: f64) -> Self {
        if value_sqr > limit * limit {
            Level::Above
        } else if value_sqr > limit * limit * NEAR_THRESH_FACTOR * NEAR_THRESH_FACTOR {
            Level::Near
        } else {
            Level::Below
        }
    }

    fn mark(self, channel: char) -> char {
        match self {
            Level::Below => ' ',
            Level::Near => channel.to_ascii_lowercase(),
            Level::Above => channel.to_ascii_uppercase(),
        }
    }
}

/// Everything computed for one sample, for decisions and diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct MotionReport {
    pub timestamp: f64,
    /// Raw time since the previous sample, before flooring
    pub dt: f64,
    pub delta: (f64, f64),
    pub velocity: (f64, f64),
    pub acceleration: (f64, f64),
    pub avg_velocity: (f64, f64),
    /// Threshold in effect for this sample, parked factor included
    pub threshold: f64,
    pub velocity_level: Level,
    pub acceleration_level: Level,
    pub avg_velocity_level: Level,
    pub warming_up: bool,
    pub protect: bool,
}

impl MotionReport {
    fn levels(&self) -> [Level; 3] {
        [
            self.velocity_level,
            self.acceleration_level,
            self.avg_velocity_level,
        ]
    }

    pub fn near(&self) -> bool {
        self.levels().iter().any(|level| *level != Level::Below)
    }

    /// Three-letter summary of which tests fired: V, A, X for velocity,
    /// acceleration and average velocity; lower case when only near.
    pub fn reason(&self) -> String {
        [
            self.velocity_level.mark('V'),
            self.acceleration_level.mark('A'),
            self.avg_velocity_level.mark('X'),
        ]
        .iter()
        .collect()
    }
}

impl fmt::Display for MotionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dt={:5.3}  dpos=({:3},{:3})  vel=({:6.1},{:6.1})*{}  acc=({:6.1},{:6.1})*{}  \
             avg_vel=({:6.1},{:6.1})*{}  thr={:.1}  {}",
            self.dt,
            self.delta.0,
            self.delta.1,
            self.velocity.0 / VELOC_ADJUST,
            self.velocity.1 / VELOC_ADJUST,
            VELOC_ADJUST,
            self.acceleration.0 / ACCEL_ADJUST,
            self.acceleration.1 / ACCEL_ADJUST,
            ACCEL_ADJUST,
            self.avg_velocity.0 / AVG_VELOC_ADJUST,
            self.avg_velocity.1 / AVG_VELOC_ADJUST,
            AVG_VELOC_ADJUST,
            self.threshold,
            self.reason()
        )
    }
}

/// Filter state carried between samples
#[derive(Debug, Clone)]
pub struct AnalyzerState {
    last_position: (i32, i32),
    last_timestamp: Option<f64>,
    last_velocity: (f64, f64),
    avg_velocity: (f64, f64),
    history: u8,
    threshold: AdaptiveThreshold,
}

impl AnalyzerState {
    pub fn new(base_threshold: f64) -> Self {
        Self {
            last_position: (0, 0),
            last_timestamp: None,
            last_velocity: (0.0, 0.0),
            avg_velocity: (0.0, 0.0),
            history: 0,
            threshold: AdaptiveThreshold::new(base_threshold),
        }
    }

    pub fn history(&self) -> u8 {
        self.history
    }

    pub fn avg_velocity(&self) -> (f64, f64) {
        self.avg_velocity
    }

    pub fn threshold(&self) -> &AdaptiveThreshold {
        &self.threshold
    }
}

/// Turns position samples into a should-protect decision using velocity,
/// acceleration and a decaying average velocity against one threshold.
///
/// Samples must arrive in timestamp order, one call at a time.
#[derive(Debug, Clone)]
pub struct MotionAnalyzer {
    config: ThresholdConfig,
    state: AnalyzerState,
}

impl MotionAnalyzer {
    pub fn new(config: ThresholdConfig) -> Self {
        Self {
            config,
            state: AnalyzerState::new(config.base),
        }
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    pub fn state(&self) -> &AnalyzerState {
        &self.state
    }

    /// Threshold currently in effect before the parked factor
    pub fn threshold(&self) -> f64 {
        if self.config.adaptive {
            self.state.threshold.current()
        } else {
            self.config.base
        }
    }

    /// Analyze one sample
    pub fn analyze(
        &mut self,
        sample: &Sample,
        parked: bool,
        activity: &dyn ActivityProbe,
    ) -> MotionReport {
        let now = sample.timestamp;
        if self.config.adaptive {
            self.state.threshold.adjust(now, activity);
        }

        let state = &mut self.state;
        let (dt, gap) = match state.last_timestamp {
            Some(last) => (now - last, now - last > GAP_RESET_SEC),
            None => (0.0, true),
        };
        let step = dt.max(MIN_SAMPLE_DELTA);

        let delta = match state.last_timestamp {
            Some(_) => (
                f64::from(sample.x) - f64::from(state.last_position.0),
                f64::from(sample.y) - f64::from(state.last_position.1),
            ),
            None => (0.0, 0.0),
        };

        let velocity = (delta.0 / step, delta.1 / step);
        let acceleration = (
            (velocity.0 - state.last_velocity.0) / step,
            (velocity.1 - state.last_velocity.1) / step,
        );

        let weight = 1.0 - 1.0 / (1.0 + step / AVG_DEPTH_SEC);
        state.avg_velocity = (
            weight * velocity.0 + (1.0 - weight) * state.avg_velocity.0,
            weight * velocity.1 + (1.0 - weight) * state.avg_velocity.1,
        );

        let mut threshold = if self.config.adaptive {
            state.threshold.current()
        } else {
            self.config.base
        };
        if parked {
            threshold *= PARKED_THRESH_FACTOR;
        }

        let mut velocity_level = Level::classify(norm_sqr(velocity), threshold * VELOC_ADJUST);
        let mut acceleration_level =
            Level::classify(norm_sqr(acceleration), threshold * ACCEL_ADJUST);
        let mut avg_velocity_level =
            Level::classify(norm_sqr(state.avg_velocity), threshold * AVG_VELOC_ADJUST);

        if gap {
            state.history = 0;
            state.avg_velocity = (0.0, 0.0);
        }

        let warming_up = state.history < WARMUP_SAMPLES;
        if warming_up {
            velocity_level = Level::Below;
            acceleration_level = Level::Below;
            avg_velocity_level = Level::Below;
            state.history += 1;
        }

        let report = MotionReport {
            timestamp: now,
            dt,
            delta,
            velocity,
            acceleration,
            avg_velocity: state.avg_velocity,
            threshold,
            velocity_level,
            acceleration_level,
            avg_velocity_level,
            warming_up,
            protect: [velocity_level, acceleration_level, avg_velocity_level]
                .contains(&Level::Above),
        };

        if report.near() {
            state.threshold.record_near(now);
        }

        state.last_position = (sample.x, sample.y);
        state.last_velocity = velocity;
        state.last_timestamp = Some(now);

        trace!("{}", report);
        report
    }
}

fn norm_sqr((x, y): (f64, f64)) -> f64 {
    x * x + y * y
}
