/*!
 # Bell-synchronised start lights

 A Rust library that runs a row of light segments through a start-light
 sequence and times it so that the "lights out" moment lands on the next bell
 of a daily schedule, a short random moment before the bell rings.

 ## Features

 * Daily bell schedule with a sub-minute clock correction
 * Bounded random lights-out jitter that fits before the bell
 * Single-shot auto scheduling that re-arms after every run
 * Manual runs, vetoed when an automatic run is imminent
 * Pluggable renderers and status observers

 ## Example

 ```rust,no_run
 use std::sync::Arc;
 use bell_lights::*;

 #[tokio::main]
 async fn main() -> Result<()> {
     // Initialize tracing for logs
     tracing_subscriber::fmt::init();

     let config = SequenceConfig::default();
     let offset = TimeOffset::load(&OffsetSource::File("timeDelta.txt".into())).await;

     let strip = TerminalStrip::new(config.segments);
     let scheduler = BellScheduler::builder(config, offset)
         .renderer(strip)
         .status(LogStatus)
         .build()?;

     // Arm the first automatic run
     scheduler.arm();
     tokio::signal::ctrl_c().await?;
     scheduler.disarm();

     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Custom error types for the bell lights library
#[derive(Error, Debug)]
pub enum Error {
    /// A schedule entry could not be parsed
    #[error("Invalid schedule entry '{0}', expected HH:MM")]
    InvalidScheduleEntry(String),

    /// Value out of range
    #[error("Value {0} out of range ({1}..={2})")]
    ValueOutOfRange(u32, u32, u32),

    /// Segment count of zero or above the supported maximum
    #[error("Segment count {0} out of range (1..={max})", max = crate::config::MAX_SEGMENTS)]
    InvalidSegmentCount(usize),

    /// The schedule has no entries
    #[error("Bell schedule is empty")]
    EmptySchedule,

    /// Lower jitter bound above the upper one
    #[error("Lights-out bounds are inverted: min {min_ms}ms > max {max_ms}ms")]
    InvalidJitterBounds { min_ms: u128, max_ms: u128 },

    /// Offset source content was not a number
    #[error("Time offset '{0}' is not a finite number")]
    InvalidOffset(String),

    /// Offset source answered with a non-success status
    #[error("Time offset source answered with status {0}")]
    OffsetUnavailable(u16),

    /// IO error while reading an offset file
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// HTTP error while fetching an offset
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod clock;
pub mod config;
pub mod gate;
pub mod offset;
pub mod planner;
pub mod runner;
pub mod schedule;
pub mod scheduler;
pub mod segments;
pub mod status;

// Re-export key types
pub use clock::{Clock, SystemClock};
pub use config::SequenceConfig;
pub use gate::ManualGate;
pub use offset::{OffsetSource, TimeOffset};
pub use planner::{JitterPlanner, JitterSource, RngJitter, RunPlan};
pub use runner::{SequenceRunner, SequenceState};
pub use schedule::{ScheduleEntry, DEFAULT_BELLS};
pub use scheduler::{BellScheduler, ManualStart, SchedulerBuilder};
pub use segments::{LineRenderer, Renderer, TerminalStrip};
pub use status::{format_time, LineStatus, LogStatus, Status, StatusSink};
