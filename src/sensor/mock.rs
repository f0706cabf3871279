use super::{FallIndicator, Sample, SampleSource, SourceVariant};
use crate::error::SensorError;
use async_trait::async_trait;
use std::collections::VecDeque;

/// Replays a scripted sequence of readouts, then reports exhaustion
#[derive(Debug, Clone)]
pub struct MockSampleSource {
    script: VecDeque<Result<Sample, SensorError>>,
    variant: SourceVariant,
}

impl MockSampleSource {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self::scripted(samples.into_iter().map(Ok).collect())
    }

    pub fn scripted(script: Vec<Result<Sample, SensorError>>) -> Self {
        Self {
            script: script.into(),
            variant: SourceVariant::Positional2D,
        }
    }

    pub fn with_variant(mut self, variant: SourceVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

#[async_trait]
impl SampleSource for MockSampleSource {
    async fn next_sample(&mut self) -> Result<Sample, SensorError> {
        tokio::task::yield_now().await;
        self.script.pop_front().unwrap_or(Err(SensorError::Exhausted))
    }

    fn variant(&self) -> SourceVariant {
        self.variant
    }

    fn name(&self) -> &str {
        "MOCK"
    }
}

/// Replays a scripted sequence of fall counts
#[derive(Debug, Clone, Default)]
pub struct MockFallIndicator {
    counts: VecDeque<Result<u8, SensorError>>,
    /// Parked flag passed on each read, for assertions
    pub parked_reads: Vec<bool>,
}

impl MockFallIndicator {
    pub fn new(counts: Vec<u8>) -> Self {
        Self::scripted(counts.into_iter().map(Ok).collect())
    }

    pub fn scripted(counts: Vec<Result<u8, SensorError>>) -> Self {
        Self {
            counts: counts.into(),
            parked_reads: Vec::new(),
        }
    }
}

#[async_trait]
impl FallIndicator for MockFallIndicator {
    async fn read_fall_count(&mut self, parked: bool) -> Result<u8, SensorError> {
        tokio::task::yield_now().await;
        self.parked_reads.push(parked);
        self.counts.pop_front().unwrap_or(Err(SensorError::Exhausted))
    }

    fn name(&self) -> &str {
        "MOCK_FREEFALL"
    }
}
