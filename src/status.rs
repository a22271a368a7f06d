/*!
 # Status reporting

 Human-readable status messages emitted at every state transition, and the
 sinks that deliver them.
*/

use std::fmt;
use std::io::Write;

use chrono::{DateTime, Local, TimeZone};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Status of the sequencer as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// An automatic run is armed for this bell
    NextBell(DateTime<Local>),
    /// An automatic run started; lights go out at this time
    AutoRunning(DateTime<Local>),
    /// A manual run started
    LightsOn,
    /// The full row is lit and waiting for lights out
    LightsOut,
    /// The run finished
    Ready,
    /// A manual start was refused because a bell is close
    ManualBlocked,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::NextBell(at) => write!(f, "Next bell: {}", format_time(at)),
            Status::AutoRunning(at) => {
                write!(f, "Auto sequence running (lights out at {})", format_time(at))
            }
            Status::LightsOn => write!(f, "Lights on..."),
            Status::LightsOut => write!(f, "Lights out..."),
            Status::Ready => write!(f, "Ready"),
            Status::ManualBlocked => write!(f, "Auto run is imminent; manual start blocked."),
        }
    }
}

/// Formats a time as hour, minute and second on a 12-hour clock
pub fn format_time<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    time.format("%-I:%M:%S %p").to_string()
}

/// Receives every status change
pub trait StatusSink: Send + Sync {
    fn publish(&self, status: &Status);
}

/// Writes status changes to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn publish(&self, status: &Status) {
        info!("{}", status);
    }
}

/// Writes `STATUS <text>` lines to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct LineStatus;

impl StatusSink for LineStatus {
    fn publish(&self, status: &Status) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "STATUS {status}").and_then(|_| out.flush()) {
            warn!("Failed to write status line: {}", e);
        }
    }
}

impl StatusSink for mpsc::UnboundedSender<Status> {
    fn publish(&self, status: &Status) {
        // Nobody listening is fine
        let _ = self.send(status.clone());
    }
}
