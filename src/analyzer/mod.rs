mod adaptive;
mod motion;

pub use adaptive::{
    AdaptiveThreshold, RECENT_PARK_SEC, THRESH_ADAPT_SEC, THRESH_DECREASE_FACTOR,
    THRESH_INCREASE_FACTOR,
};
pub use motion::{
    AnalyzerState, Level, MotionAnalyzer, MotionReport, ThresholdConfig, ACCEL_ADJUST,
    AVG_DEPTH_SEC, AVG_VELOC_ADJUST, GAP_RESET_SEC, MIN_SAMPLE_DELTA, NEAR_THRESH_FACTOR,
    PARKED_THRESH_FACTOR, VELOC_ADJUST, WARMUP_SAMPLES,
};
