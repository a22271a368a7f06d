/*!
 # Automatic bell scheduling

 `BellScheduler` owns everything a run needs: the configuration, the clock
 correction, the random source, the sequence runner and the one pending
 timer. Each run, automatic or manual, arms the timer for the next bell when
 it finishes.
*/

use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::SequenceConfig;
use crate::gate::ManualGate;
use crate::offset::TimeOffset;
use crate::planner::{JitterPlanner, JitterSource, RngJitter, RunPlan};
use crate::runner::{Admission, SequenceRunner, SequenceState};
use crate::schedule::{self, ScheduleEntry};
use crate::segments::{Renderer, TerminalStrip};
use crate::status::{format_time, LogStatus, Status, StatusSink};
use crate::Result;

/// Outcome of a manual start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualStart {
    /// The run was started with this plan
    Started(RunPlan),
    /// An automatic run is too close
    Blocked,
    /// A run is already in progress
    Busy,
}

/// The timer waiting to start the next automatic run
struct PendingRun {
    plan: RunPlan,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct TimerSlot {
    /// Bumped on every arm; a timer only fires if its generation is current
    generation: u64,
    pending: Option<PendingRun>,
}

/// Scheduler context for the light sequence
pub struct BellScheduler {
    config: SequenceConfig,
    offset: TimeOffset,
    planner: JitterPlanner,
    gate: ManualGate,
    clock: Arc<dyn Clock>,
    jitter: Mutex<Box<dyn JitterSource>>,
    runner: SequenceRunner,
    timer: Mutex<TimerSlot>,
}

/// Assembles a [`BellScheduler`] from its collaborators
pub struct SchedulerBuilder {
    config: SequenceConfig,
    offset: TimeOffset,
    renderer: Option<Box<dyn Renderer>>,
    status: Option<Arc<dyn StatusSink>>,
    clock: Option<Arc<dyn Clock>>,
    jitter: Option<Box<dyn JitterSource>>,
}

impl SchedulerBuilder {
    /// Renderer for the segments, a [`TerminalStrip`] by default
    pub fn renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    /// Status observer, [`LogStatus`] by default
    pub fn status(mut self, status: impl StatusSink + 'static) -> Self {
        self.status = Some(Arc::new(status));
        self
    }

    /// Wall clock, [`SystemClock`] by default
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Jitter source, an entropy-seeded generator by default
    pub fn jitter(mut self, jitter: impl JitterSource + 'static) -> Self {
        self.jitter = Some(Box::new(jitter));
        self
    }

    pub fn build(self) -> Result<Arc<BellScheduler>> {
        let mut config = self.config;
        config.validate()?;

        let renderer = self
            .renderer
            .unwrap_or_else(|| Box::new(TerminalStrip::new(config.segments)));
        if renderer.len() != config.segments {
            warn!(
                "Renderer has {} segments, configuration says {}; using the renderer's count",
                renderer.len(),
                config.segments
            );
            config.segments = renderer.len();
            config.validate()?;
        }

        let status = self.status.unwrap_or_else(|| Arc::new(LogStatus));
        let runner = SequenceRunner::new(renderer, status, config.step);

        Ok(Arc::new(BellScheduler {
            planner: JitterPlanner::from_config(&config),
            gate: ManualGate::new(&config, self.offset),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            jitter: Mutex::new(
                self.jitter
                    .unwrap_or_else(|| Box::new(RngJitter::from_entropy())),
            ),
            runner,
            timer: Mutex::new(TimerSlot::default()),
            offset: self.offset,
            config,
        }))
    }
}

impl BellScheduler {
    pub fn builder(config: SequenceConfig, offset: TimeOffset) -> SchedulerBuilder {
        SchedulerBuilder {
            config,
            offset,
            renderer: None,
            status: None,
            clock: None,
            jitter: None,
        }
    }

    pub fn config(&self) -> &SequenceConfig {
        &self.config
    }

    pub fn offset(&self) -> TimeOffset {
        self.offset
    }

    pub fn state(&self) -> SequenceState {
        self.runner.state()
    }

    pub fn runner(&self) -> &SequenceRunner {
        &self.runner
    }

    /// Follows whether the manual start control should be enabled
    pub fn subscribe_trigger(&self) -> watch::Receiver<bool> {
        self.runner.subscribe_trigger()
    }

    /// Next bell as of the scheduler's clock
    pub fn next_target(&self) -> Option<DateTime<Local>> {
        schedule::next_target(&self.clock.now(), self.offset, &self.config.schedule)
    }

    /// Next occurrence of every configured bell, earliest first
    pub fn upcoming(&self) -> Vec<(ScheduleEntry, DateTime<Local>)> {
        schedule::upcoming(&self.clock.now(), self.offset, &self.config.schedule)
    }

    /// Plan the next automatic run would get if armed now
    pub fn preview(&self) -> Option<RunPlan> {
        self.plan_next(&self.clock.now())
    }

    /// Plan of the currently armed run, if any
    pub fn pending_plan(&self) -> Option<RunPlan> {
        self.timer.lock().pending.as_ref().map(|run| run.plan.clone())
    }

    fn plan_next(&self, now: &DateTime<Local>) -> Option<RunPlan> {
        let target = schedule::next_target(now, self.offset, &self.config.schedule)?;
        let (start_delay, lights_out_delay) = self.planner.plan(
            now,
            &target,
            self.runner.on_phase(),
            &mut **self.jitter.lock(),
        );
        Some(RunPlan {
            start_delay,
            lights_out_delay,
            target: Some(target),
            is_auto: true,
        })
    }

    /// Cancels any pending timer and arms one for the next bell.
    ///
    /// Returns the armed plan, or `None` when there is no bell to arm for.
    #[instrument(skip(self))]
    pub fn arm(self: &Arc<Self>) -> Option<RunPlan> {
        let mut slot = self.timer.lock();
        if let Some(previous) = slot.pending.take() {
            previous.handle.abort();
            debug!("Cancelled pending run");
        }

        let now = self.clock.now();
        let Some(plan) = self.plan_next(&now) else {
            warn!("No bells configured, nothing to arm");
            return None;
        };
        if let Some(target) = plan.target {
            self.runner.publish(Status::NextBell(target));
            info!(
                "Armed run for the {} bell, starting in {}ms",
                format_time(&target),
                plan.start_delay.as_millis()
            );
        }

        slot.generation += 1;
        let generation = slot.generation;
        let this = Arc::clone(self);
        let timed = plan.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timed.start_delay).await;
            this.fire(generation, timed).await;
        });
        slot.pending = Some(PendingRun {
            plan: plan.clone(),
            handle,
        });
        Some(plan)
    }

    /// Cancels the pending timer, if any. A run already in progress finishes.
    pub fn disarm(&self) {
        if let Some(pending) = self.timer.lock().pending.take() {
            pending.handle.abort();
            info!("Disarmed pending run");
        }
    }

    async fn fire(self: Arc<Self>, generation: u64, plan: RunPlan) {
        {
            let mut slot = self.timer.lock();
            if slot.generation != generation {
                debug!("Superseded timer fired, ignoring");
                return;
            }
            slot.pending = None;
        }

        if self.runner.start(&plan).await {
            self.arm();
        } else {
            // The run in progress re-arms when it completes
            warn!("Automatic run skipped, another run is in progress");
        }
    }

    /// Starts a manual run unless a bell is imminent or a run is in progress.
    ///
    /// The imminence check and the start happen under the runner's state
    /// lock, so a timer firing at the same moment cannot also start.
    #[instrument(skip(self))]
    pub fn manual_start(self: &Arc<Self>) -> ManualStart {
        let now = self.clock.now();
        match self.runner.admit(|| self.gate.can_start_manually(&now)) {
            Admission::Vetoed => {
                info!("Manual start blocked, a bell is imminent");
                self.runner.publish(Status::ManualBlocked);
                ManualStart::Blocked
            }
            Admission::Busy => {
                debug!("Manual start ignored, run in progress");
                ManualStart::Busy
            }
            Admission::Admitted => {
                let plan = RunPlan::manual(self.planner.manual_delay(&mut **self.jitter.lock()));
                let this = Arc::clone(self);
                let run = plan.clone();
                tokio::spawn(async move {
                    this.runner.execute(&run).await;
                    this.arm();
                });
                ManualStart::Started(plan)
            }
        }
    }
}
