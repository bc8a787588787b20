//! Bounded in-memory history of sensor readings
//!
//! The buffer is a fixed-capacity FIFO window: readings are appended in
//! arrival order and the oldest entries are evicted once the capacity is
//! exceeded. There is no persistence; everything is lost on restart.

use std::collections::VecDeque;

use crate::SensorReading;

/// Maximum readings retained for the dashboard history.
pub const HISTORY_CAPACITY: usize = 100;

/// Fixed-capacity FIFO window over the most recent readings.
///
/// Owned exclusively by the poller; consumers only ever see owned snapshots,
/// never a reference into the live buffer.
#[derive(Debug)]
pub struct HistoryBuffer {
    readings: VecDeque<SensorReading>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a reading, evicting from the front once over capacity.
    pub fn push(&mut self, reading: SensorReading) {
        self.readings.push_back(reading);
        while self.readings.len() > self.capacity {
            self.readings.pop_front();
        }
    }

    /// Owned copy of the buffer in arrival order.
    pub fn snapshot(&self) -> Vec<SensorReading> {
        self.readings.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&SensorReading> {
        self.readings.back()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}
