/*!
 # Lights-out jitter planning

 Works out how long to wait before starting the sequence, and how long to
 hold the full row before lights out, so that lights out lands shortly
 before the bell.
*/

use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::SequenceConfig;

/// Source of uniform samples in `[0, 1)`
pub trait JitterSource: Send {
    fn sample(&mut self) -> f64;
}

/// Jitter drawn from a `rand` generator
#[derive(Debug, Clone)]
pub struct RngJitter<R>(R);

impl RngJitter<StdRng> {
    /// Generator seeded from the operating system
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    /// Reproducible generator
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send> JitterSource for RngJitter<R> {
    fn sample(&mut self) -> f64 {
        self.0.gen::<f64>()
    }
}

/// Delays for a single run of the sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    /// Wait before the first segment lights up
    pub start_delay: Duration,
    /// Wait between the end of the on-phase and lights out
    pub lights_out_delay: Duration,
    /// Bell this run is timed against, `None` for manual runs
    pub target: Option<DateTime<Local>>,
    pub is_auto: bool,
}

impl RunPlan {
    /// Plan for a user-triggered run that starts right away
    pub fn manual(lights_out_delay: Duration) -> Self {
        Self {
            start_delay: Duration::ZERO,
            lights_out_delay,
            target: None,
            is_auto: false,
        }
    }
}

/// Computes bounded random lights-out delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterPlanner {
    min: Duration,
    max: Duration,
}

impl JitterPlanner {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn from_config(config: &SequenceConfig) -> Self {
        Self::new(config.min_lights_out, config.max_lights_out)
    }

    /// Random lights-out delay of at least `min`, scaled toward `effective_max`.
    ///
    /// The span never drops below `min`, so when `effective_max` is closer
    /// than `2 * min` the delay may exceed it and lights out can land after
    /// the bell.
    pub fn lights_out_delay(
        &self,
        effective_max: Duration,
        source: &mut dyn JitterSource,
    ) -> Duration {
        let min = self.min.as_micros() as f64;
        let span = (effective_max.as_micros() as f64 - min).max(min);
        let micros = min + source.sample().clamp(0.0, 1.0) * span;
        Duration::from_micros(micros.round() as u64)
    }

    /// Lights-out delay for a manual run, with the full jitter range
    pub fn manual_delay(&self, source: &mut dyn JitterSource) -> Duration {
        self.lights_out_delay(self.max, source)
    }

    /// Start and lights-out delays so that a run beginning `start_delay`
    /// after `now` reaches lights out at `target`.
    pub fn plan<Tz>(
        &self,
        now: &DateTime<Tz>,
        target: &DateTime<Tz>,
        on_phase: Duration,
        source: &mut dyn JitterSource,
    ) -> (Duration, Duration)
    where
        Tz: TimeZone,
    {
        let remaining = target
            .clone()
            .signed_duration_since(now)
            .num_microseconds()
            .unwrap_or(i64::MAX) as i128;
        let on_phase = on_phase.as_micros() as i128;

        let window = remaining - on_phase;
        let effective_max =
            window.clamp(self.min.as_micros() as i128, self.max.as_micros() as i128);
        let lights_out =
            self.lights_out_delay(Duration::from_micros(effective_max as u64), source);

        let start = (remaining - on_phase - lights_out.as_micros() as i128).max(0);
        let start_delay = Duration::from_micros(start.min(u64::MAX as i128) as u64);

        debug!(
            window_ms = (window / 1000) as i64,
            lights_out_ms = lights_out.as_millis() as u64,
            start_delay_ms = start_delay.as_millis() as u64,
            "Planned run"
        );
        (start_delay, lights_out)
    }
}

impl Default for JitterPlanner {
    fn default() -> Self {
        Self::from_config(&SequenceConfig::default())
    }
}
