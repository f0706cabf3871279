use super::{unix_now, AxisEvent, EventCoalescer, InputDeviceMatch, Sample, SampleSource, SourceVariant};
use crate::error::SensorError;
use async_trait::async_trait;
use evdev::{AbsoluteAxisType, Device, EventStream, InputEvent, InputEventKind};
use std::path::PathBuf;
use std::time::UNIX_EPOCH;
use tracing::{debug, info};

/// Event-driven position source backed by the accelerometer's input device.
///
/// The kernel only reports changes, so reads block until the laptop moves.
pub struct InputDeviceSource {
    name: String,
    device_path: PathBuf,
    stream: EventStream,
    coalescer: EventCoalescer,
}

impl InputDeviceSource {
    /// Locate and open the input device matching `matcher`.
    ///
    /// `seed` is the last known position so that axes which never change
    /// do not start out at zero.
    pub fn open(matcher: InputDeviceMatch, seed: Option<Sample>) -> Result<Self, SensorError> {
        let (device_path, device) = evdev::enumerate()
            .find(|(_, device)| Self::matches(matcher, device))
            .ok_or(SensorError::NotAvailable)?;

        let name = device.name().unwrap_or("Unknown").to_string();
        info!(
            "Selected input device {} ({})",
            device_path.display(),
            name
        );
        debug!("Device capabilities: {:?}", device.supported_events());

        let stream = device.into_event_stream().map_err(|e| SensorError::Open {
            path: device_path.clone(),
            details: e.to_string(),
        })?;

        let coalescer = match seed {
            Some(sample) => EventCoalescer::seeded(sample.x, sample.y, sample.z),
            None => EventCoalescer::new(),
        };

        Ok(Self {
            name,
            device_path,
            stream,
            coalescer,
        })
    }

    fn matches(matcher: InputDeviceMatch, device: &Device) -> bool {
        match matcher {
            InputDeviceMatch::Phys(phys) => device.physical_path() == Some(phys),
            InputDeviceMatch::Name(name) => device.name() == Some(name),
        }
    }

    fn classify(event: &InputEvent) -> AxisEvent {
        match event.kind() {
            InputEventKind::AbsAxis(axis) if axis == AbsoluteAxisType::ABS_X => {
                AxisEvent::X(event.value())
            }
            InputEventKind::AbsAxis(axis) if axis == AbsoluteAxisType::ABS_Y => {
                AxisEvent::Y(event.value())
            }
            InputEventKind::AbsAxis(axis) if axis == AbsoluteAxisType::ABS_Z => {
                AxisEvent::Z(event.value())
            }
            InputEventKind::Synchronization(_) => AxisEvent::Sync,
            _ => AxisEvent::Other,
        }
    }

    fn event_time(event: &InputEvent) -> f64 {
        event
            .timestamp()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_else(|_| unix_now())
    }
}

#[async_trait]
impl SampleSource for InputDeviceSource {
    async fn next_sample(&mut self) -> Result<Sample, SensorError> {
        loop {
            let event = self
                .stream
                .next_event()
                .await
                .map_err(|e| SensorError::DeviceRead {
                    device: self.device_path.display().to_string(),
                    details: e.to_string(),
                })?;

            let axis_event = Self::classify(&event);
            if let Some(sample) = self.coalescer.push(axis_event, Self::event_time(&event)) {
                return Ok(sample);
            }
        }
    }

    fn variant(&self) -> SourceVariant {
        SourceVariant::EventStream
    }

    fn name(&self) -> &str {
        &self.name
    }
}
