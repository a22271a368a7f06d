/*!
 # Manual start guard

 A manual run is refused when it could still be going when the next
 automatic run has to start.
*/

use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone};
use tracing::debug;

use crate::config::SequenceConfig;
use crate::offset::TimeOffset;
use crate::schedule::{self, ScheduleEntry};

/// Decides whether a manual run is safe given the next bell
#[derive(Debug, Clone)]
pub struct ManualGate {
    schedule: Vec<ScheduleEntry>,
    offset: TimeOffset,
    needed: Duration,
}

impl ManualGate {
    /// Gate that keeps `on_phase + max_lights_out + manual_margin` clear before each bell
    pub fn new(config: &SequenceConfig, offset: TimeOffset) -> Self {
        Self {
            schedule: config.schedule.clone(),
            offset,
            needed: config.on_phase() + config.max_lights_out + config.manual_margin,
        }
    }

    /// Time that must remain before the next bell for a manual run
    pub fn needed_window(&self) -> Duration {
        self.needed
    }

    pub fn can_start_manually<Tz>(&self, now: &DateTime<Tz>) -> bool
    where
        Tz: TimeZone,
    {
        let Some(next) = schedule::next_target(now, self.offset, &self.schedule) else {
            return true;
        };
        let until_bell = next.signed_duration_since(now);
        let needed = TimeDelta::from_std(self.needed).unwrap_or(TimeDelta::MAX);
        let allowed = until_bell > needed;
        debug!(
            until_bell_ms = until_bell.num_milliseconds(),
            needed_ms = needed.num_milliseconds(),
            allowed,
            "Checked manual start"
        );
        allowed
    }
}
