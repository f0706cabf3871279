use crate::analyzer::MotionReport;
use crate::error::EventBusError;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Events emitted by the guard loop
#[derive(Debug, Clone)]
pub enum GuardEvent {
    /// A sample went through the motion analyzer
    MotionSample(MotionReport),
    /// The hardware fall counter was read
    HardwareFall { count: u8, at: f64 },
    /// Disks were parked after being unparked
    Parked { at: f64 },
    /// The park command was reissued
    Refrozen { at: f64 },
    /// Disks were released
    Unparked { at: f64 },
    /// A pause took effect
    PauseStarted { seconds: u64 },
    /// A disk reported itself unparked while we believed it parked
    SanityMismatch { disk: String },
    /// A park or unpark command failed
    ProtectionFailed { disk: String, error: String },
    /// A sample could not be read; the iteration was skipped
    ReadoutError { error: String },
}

impl GuardEvent {
    /// Time the event refers to, when it carries one
    pub fn timestamp(&self) -> Option<f64> {
        match self {
            GuardEvent::MotionSample(report) => Some(report.timestamp),
            GuardEvent::HardwareFall { at, .. } => Some(*at),
            GuardEvent::Parked { at } => Some(*at),
            GuardEvent::Refrozen { at } => Some(*at),
            GuardEvent::Unparked { at } => Some(*at),
            GuardEvent::PauseStarted { .. } => None,
            GuardEvent::SanityMismatch { .. } => None,
            GuardEvent::ProtectionFailed { .. } => None,
            GuardEvent::ReadoutError { .. } => None,
        }
    }

    /// Single-line diagnostic, as printed in verbose mode
    pub fn description(&self) -> String {
        match self {
            GuardEvent::MotionSample(report) => report.to_string(),
            GuardEvent::HardwareFall { count, .. } => format!("HW={}", count),
            GuardEvent::Parked { .. } => "parking".to_string(),
            GuardEvent::Refrozen { .. } => "refreezing".to_string(),
            GuardEvent::Unparked { .. } => "unparking".to_string(),
            GuardEvent::PauseStarted { seconds } => format!("pausing for {} seconds", seconds),
            GuardEvent::SanityMismatch { disk } => {
                format!("{} was not parked when we thought it was", disk)
            }
            GuardEvent::ProtectionFailed { disk, error } => {
                format!("protection command failed for {}: {}", disk, error)
            }
            GuardEvent::ReadoutError { error } => format!("readout error ({})", error),
        }
    }

    /// Event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            GuardEvent::MotionSample(_) => "motion_sample",
            GuardEvent::HardwareFall { .. } => "hardware_fall",
            GuardEvent::Parked { .. } => "parked",
            GuardEvent::Refrozen { .. } => "refrozen",
            GuardEvent::Unparked { .. } => "unparked",
            GuardEvent::PauseStarted { .. } => "pause_started",
            GuardEvent::SanityMismatch { .. } => "sanity_mismatch",
            GuardEvent::ProtectionFailed { .. } => "protection_failed",
            GuardEvent::ReadoutError { .. } => "readout_error",
        }
    }
}

/// Broadcast bus for guard events.
///
/// Publishing never blocks and never fails: with no subscribers the event
/// is dropped, and slow subscribers lag rather than stall the loop.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GuardEvent>,
    debug_logging: bool,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    pub fn with_debug_logging(capacity: usize) -> Self {
        Self {
            debug_logging: true,
            ..Self::new(capacity)
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GuardEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; returns how many subscribers will see it
    pub fn publish(&self, event: GuardEvent) -> usize {
        if self.debug_logging && !matches!(event, GuardEvent::MotionSample(_)) {
            debug!("Publishing event: {}", event.description());
        }
        self.sender.send(event).unwrap_or(0)
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    EventTypes(Vec<&'static str>),
}

impl EventFilter {
    /// Events shown by the verbose diagnostic printer
    pub fn diagnostics() -> Self {
        EventFilter::EventTypes(vec!["motion_sample", "hardware_fall", "readout_error"])
    }

    pub fn matches(&self, event: &GuardEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<GuardEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<GuardEvent>, filter: EventFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next event passing the filter.
    ///
    /// Lagging skips the missed events and keeps going; only a closed bus
    /// ends the stream.
    pub async fn recv(&mut self) -> Result<GuardEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
