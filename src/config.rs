/*!
 # Sequence configuration

 Timing and schedule settings shared by every component of the sequencer.
*/

use std::time::Duration;

use crate::schedule::{ScheduleEntry, DEFAULT_BELLS};
use crate::{Error, Result};

/// Largest row of segments a sequence can drive
pub const MAX_SEGMENTS: usize = 64;

/// Configuration for the light sequence and its bell schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceConfig {
    /// Daily bell times
    pub schedule: Vec<ScheduleEntry>,
    /// Number of light segments in the row
    pub segments: usize,
    /// Pause after each segment lights up
    pub step: Duration,
    /// Shortest wait between the last segment and lights out
    pub min_lights_out: Duration,
    /// Longest wait between the last segment and lights out
    pub max_lights_out: Duration,
    /// Extra room a manual run must leave before the next bell
    pub manual_margin: Duration,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            schedule: DEFAULT_BELLS.to_vec(),
            segments: 5,
            step: Duration::from_millis(1000),
            min_lights_out: Duration::from_millis(200),
            max_lights_out: Duration::from_millis(3000),
            manual_margin: Duration::from_millis(500),
        }
    }
}

impl SequenceConfig {
    /// Total length of the on-phase, one step per segment
    pub fn on_phase(&self) -> Duration {
        let segments = u32::try_from(self.segments).unwrap_or(u32::MAX);
        self.step.saturating_mul(segments)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_SEGMENTS).contains(&self.segments) {
            return Err(Error::InvalidSegmentCount(self.segments));
        }
        if self.schedule.is_empty() {
            return Err(Error::EmptySchedule);
        }
        if self.min_lights_out > self.max_lights_out {
            return Err(Error::InvalidJitterBounds {
                min_ms: self.min_lights_out.as_millis(),
                max_ms: self.max_lights_out.as_millis(),
            });
        }
        Ok(())
    }
}
