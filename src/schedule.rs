/*!
 # Daily bell schedule

 This module holds the daily bell times and resolves which one rings next,
 given the current wall-clock time and the clock correction offset.
*/

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Offset, TimeDelta, TimeZone};
use tracing::trace;

use crate::offset::TimeOffset;
use crate::{Error, Result};

/// A bell time of day, repeated every day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleEntry {
    /// Hour (0-23)
    hour: u8,
    /// Minute (0-59)
    minute: u8,
}

/// Bell times used when no schedule is configured
pub const DEFAULT_BELLS: [ScheduleEntry; 10] = [
    ScheduleEntry::at(8, 25),
    ScheduleEntry::at(8, 30),
    ScheduleEntry::at(10, 20),
    ScheduleEntry::at(10, 25),
    ScheduleEntry::at(11, 35),
    ScheduleEntry::at(12, 15),
    ScheduleEntry::at(12, 20),
    ScheduleEntry::at(13, 30),
    ScheduleEntry::at(13, 35),
    ScheduleEntry::at(14, 43),
];

impl ScheduleEntry {
    /// Creates an entry, rejecting hours above 23 and minutes above 59
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 {
            return Err(Error::ValueOutOfRange(hour.into(), 0, 23));
        }
        if minute > 59 {
            return Err(Error::ValueOutOfRange(minute.into(), 0, 59));
        }
        Ok(Self { hour, minute })
    }

    const fn at(hour: u8, minute: u8) -> Self {
        Self { hour, minute }
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Next occurrence of this entry strictly after `now`.
    ///
    /// Today's wall-clock time is shifted by the sub-minute part of the
    /// offset, then pushed forward by 24 hours if it is not in the future.
    pub fn next_after<Tz>(&self, now: &DateTime<Tz>, offset: TimeOffset) -> DateTime<Tz>
    where
        Tz: TimeZone,
    {
        let today = now
            .date_naive()
            .and_hms_opt(self.hour.into(), self.minute.into(), 0)
            .unwrap_or_else(|| now.naive_local());

        let timezone = now.timezone();
        let base = match timezone.from_local_datetime(&today).earliest() {
            Some(dt) => dt,
            // Skipped by a DST change: read it with the offset in force now
            None => now
                .offset()
                .fix()
                .from_local_datetime(&today)
                .single()
                .map(|dt| dt.with_timezone(&timezone))
                .unwrap_or_else(|| now.clone()),
        };

        let adjusted = base + offset.within_minute();
        if adjusted <= *now {
            adjusted + TimeDelta::hours(24)
        } else {
            adjusted
        }
    }
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ScheduleEntry {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidScheduleEntry(s.to_string());
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour: u8 = hour.trim().parse().map_err(|_| invalid())?;
        let minute: u8 = minute.trim().parse().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }
}

/// Earliest upcoming bell across `entries`, or `None` for an empty schedule
pub fn next_target<Tz>(
    now: &DateTime<Tz>,
    offset: TimeOffset,
    entries: &[ScheduleEntry],
) -> Option<DateTime<Tz>>
where
    Tz: TimeZone,
{
    let target = entries
        .iter()
        .map(|entry| entry.next_after(now, offset))
        .min();
    trace!(?target, entries = entries.len(), "Resolved next bell");
    target
}

/// Next occurrence of every entry, earliest first
pub fn upcoming<Tz>(
    now: &DateTime<Tz>,
    offset: TimeOffset,
    entries: &[ScheduleEntry],
) -> Vec<(ScheduleEntry, DateTime<Tz>)>
where
    Tz: TimeZone,
{
    let mut bells: Vec<_> = entries
        .iter()
        .map(|entry| (*entry, entry.next_after(now, offset)))
        .collect();
    bells.sort_by(|a, b| a.1.cmp(&b.1));
    bells
}
