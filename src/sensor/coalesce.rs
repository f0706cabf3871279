use super::Sample;

/// Input event relevant to position tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisEvent {
    X(i32),
    Y(i32),
    Z(i32),
    /// End of a group of axis updates
    Sync,
    /// Anything else the device reports; ignored
    Other,
}

/// Folds axis-only updates into whole samples.
///
/// Axes that did not change keep the value of the previous sample. A group
/// ends on a sync marker and is stamped with the time of its first event,
/// which is closest to when the movement actually happened.
#[derive(Debug, Clone, Default)]
pub struct EventCoalescer {
    x: i32,
    y: i32,
    z: Option<i32>,
    first_timestamp: Option<f64>,
}

impl EventCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known position, e.g. a sysfs readout
    pub fn seeded(x: i32, y: i32, z: Option<i32>) -> Self {
        Self {
            x,
            y,
            z,
            first_timestamp: None,
        }
    }

    /// Feed one event; returns a sample when a group completes
    pub fn push(&mut self, event: AxisEvent, timestamp: f64) -> Option<Sample> {
        let done = match event {
            AxisEvent::X(value) => {
                self.x = value;
                false
            }
            AxisEvent::Y(value) => {
                self.y = value;
                false
            }
            AxisEvent::Z(value) => {
                self.z = Some(value);
                false
            }
            AxisEvent::Sync => true,
            AxisEvent::Other => return None,
        };

        let first = *self.first_timestamp.get_or_insert(timestamp);
        if !done {
            return None;
        }

        self.first_timestamp = None;
        Some(Sample {
            x: self.x,
            y: self.y,
            z: self.z,
            timestamp: first,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_uses_first_event_time() {
        let mut coalescer = EventCoalescer::seeded(5, 6, None);

        assert_eq!(coalescer.push(AxisEvent::X(10), 1.000), None);
        assert_eq!(coalescer.push(AxisEvent::Other, 0.5), None);
        assert_eq!(coalescer.push(AxisEvent::Y(-3), 1.002), None);
        let sample = coalescer.push(AxisEvent::Sync, 1.004).unwrap();

        assert_eq!((sample.x, sample.y, sample.z), (10, -3, None));
        assert_eq!(sample.timestamp, 1.000);
    }

    #[test]
    fn test_unchanged_axes_carry_over() {
        let mut coalescer = EventCoalescer::seeded(5, 6, Some(1000));

        coalescer.push(AxisEvent::X(7), 2.0);
        let first = coalescer.push(AxisEvent::Sync, 2.0).unwrap();
        assert_eq!((first.x, first.y, first.z), (7, 6, Some(1000)));

        coalescer.push(AxisEvent::Z(990), 2.5);
        let second = coalescer.push(AxisEvent::Sync, 2.6).unwrap();
        assert_eq!((second.x, second.y, second.z), (7, 6, Some(990)));
        assert_eq!(second.timestamp, 2.5);
    }

    #[test]
    fn test_bare_sync_emits_current_position() {
        let mut coalescer = EventCoalescer::seeded(1, 2, None);
        let sample = coalescer.push(AxisEvent::Sync, 3.0).unwrap();
        assert_eq!((sample.x, sample.y, sample.timestamp), (1, 2, 3.0));
    }
}
