/*!
 # Light sequence state machine

 A run lights the segments one by one, holds the full row for the planned
 lights-out delay, then turns everything off. Only one run can be in
 progress at a time.
*/

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, instrument, trace};

use crate::planner::RunPlan;
use crate::segments::Renderer;
use crate::status::{Status, StatusSink};

/// Phase of the light sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    /// No run in progress
    Idle,
    /// Segments are lighting up
    LightsOn,
    /// Full row lit, waiting for lights out
    LightsOut,
}

/// Result of asking to begin a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The runner moved to `LightsOn` and the caller owns the run
    Admitted,
    /// Another run is in progress
    Busy,
    /// The caller's guard refused the run
    Vetoed,
}

/// Runs the light sequence against a renderer
pub struct SequenceRunner {
    state: Mutex<SequenceState>,
    renderer: Mutex<Box<dyn Renderer>>,
    status: Arc<dyn StatusSink>,
    /// Whether a manual start is currently offered
    trigger: watch::Sender<bool>,
    step: Duration,
}

impl SequenceRunner {
    pub fn new(renderer: Box<dyn Renderer>, status: Arc<dyn StatusSink>, step: Duration) -> Self {
        let (trigger, _) = watch::channel(true);
        Self {
            state: Mutex::new(SequenceState::Idle),
            renderer: Mutex::new(renderer),
            status,
            trigger,
            step,
        }
    }

    pub fn state(&self) -> SequenceState {
        *self.state.lock()
    }

    pub fn segments(&self) -> usize {
        self.renderer.lock().len()
    }

    /// Length of the on-phase for this renderer
    pub fn on_phase(&self) -> Duration {
        let segments = u32::try_from(self.segments()).unwrap_or(u32::MAX);
        self.step.saturating_mul(segments)
    }

    /// Follows whether the manual start control should be enabled
    pub fn subscribe_trigger(&self) -> watch::Receiver<bool> {
        self.trigger.subscribe()
    }

    pub(crate) fn publish(&self, status: Status) {
        self.status.publish(&status);
    }

    /// Moves `Idle` to `LightsOn` if `allow` agrees, in one critical section.
    ///
    /// `allow` runs under the state lock, so two callers can never both be
    /// admitted. It is only consulted while idle; a busy runner answers
    /// `Busy` without asking.
    pub(crate) fn admit(&self, allow: impl FnOnce() -> bool) -> Admission {
        let mut state = self.state.lock();
        if *state != SequenceState::Idle {
            return Admission::Busy;
        }
        if !allow() {
            return Admission::Vetoed;
        }
        *state = SequenceState::LightsOn;
        self.trigger.send_replace(false);
        Admission::Admitted
    }

    /// Runs one sequence, or does nothing if a run is already in progress.
    ///
    /// Returns whether this call performed the run.
    pub async fn start(&self, plan: &RunPlan) -> bool {
        match self.admit(|| true) {
            Admission::Admitted => {
                self.execute(plan).await;
                true
            }
            _ => {
                debug!("Run already in progress, ignoring start");
                false
            }
        }
    }

    /// Runs the on-phase and off-phase of an admitted run
    #[instrument(skip(self, plan), fields(auto = plan.is_auto))]
    pub(crate) async fn execute(&self, plan: &RunPlan) {
        match (plan.is_auto, plan.target) {
            (true, Some(target)) => self.publish(Status::AutoRunning(target)),
            _ => self.publish(Status::LightsOn),
        }

        self.renderer.lock().reset_all();
        let segments = self.segments();
        for index in 0..segments {
            trace!("Lighting segment {}", index);
            self.renderer.lock().activate(index);
            tokio::time::sleep(self.step).await;
        }

        self.set_state(SequenceState::LightsOut);
        self.publish(Status::LightsOut);
        tokio::time::sleep(plan.lights_out_delay).await;
        self.renderer.lock().reset_all();
        info!(
            "Lights out after {}ms hold",
            plan.lights_out_delay.as_millis()
        );

        self.set_state(SequenceState::Idle);
        self.publish(Status::Ready);
        self.trigger.send_replace(true);
    }

    fn set_state(&self, next: SequenceState) {
        let mut state = self.state.lock();
        trace!("Sequence state {:?} -> {:?}", *state, next);
        *state = next;
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        On(usize),
        Off(usize),
        Reset,
    }

    #[derive(Clone, Default)]
    struct Recorder {
        segments: usize,
        events: Arc<Mutex<Vec<(Instant, Event)>>>,
    }

    impl Renderer for Recorder {
        fn len(&self) -> usize {
            self.segments
        }

        fn activate(&mut self, index: usize) {
            self.events.lock().push((Instant::now(), Event::On(index)));
        }

        fn deactivate(&mut self, index: usize) {
            self.events.lock().push((Instant::now(), Event::Off(index)));
        }

        fn reset_all(&mut self) {
            self.events.lock().push((Instant::now(), Event::Reset));
        }
    }

    fn runner(segments: usize) -> (Arc<SequenceRunner>, Recorder, mpsc::UnboundedReceiver<Status>) {
        let recorder = Recorder {
            segments,
            ..Default::default()
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let runner = SequenceRunner::new(
            Box::new(recorder.clone()),
            Arc::new(tx),
            Duration::from_millis(1000),
        );
        (Arc::new(runner), recorder, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Status>) -> Vec<Status> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn lights_segments_one_second_apart() {
        let (runner, recorder, mut rx) = runner(3);
        let begin = Instant::now();

        assert!(runner.start(&RunPlan::manual(Duration::from_millis(700))).await);

        let events = recorder.events.lock().clone();
        let timeline: Vec<(u64, Event)> = events
            .iter()
            .map(|(at, event)| ((*at - begin).as_millis() as u64, *event))
            .collect();
        assert_eq!(
            timeline,
            vec![
                (0, Event::Reset),
                (0, Event::On(0)),
                (1000, Event::On(1)),
                (2000, Event::On(2)),
                (3700, Event::Reset),
            ]
        );
        assert_eq!(
            drain(&mut rx),
            vec![Status::LightsOn, Status::LightsOut, Status::Ready]
        );
        assert_eq!(runner.state(), SequenceState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_while_running_is_ignored() {
        let (runner, recorder, _rx) = runner(2);
        let first = tokio::spawn({
            let runner = runner.clone();
            async move { runner.start(&RunPlan::manual(Duration::from_millis(200))).await }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runner.state(), SequenceState::LightsOn);

        assert!(!runner.start(&RunPlan::manual(Duration::from_millis(200))).await);
        assert!(first.await.unwrap());

        let resets = recorder
            .events
            .lock()
            .iter()
            .filter(|(_, event)| *event == Event::Reset)
            .count();
        assert_eq!(resets, 2, "exactly one run should have executed");
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_is_disabled_while_running() {
        let (runner, _recorder, _rx) = runner(1);
        let trigger = runner.subscribe_trigger();
        assert!(*trigger.borrow());

        let run = tokio::spawn({
            let runner = runner.clone();
            async move { runner.start(&RunPlan::manual(Duration::from_millis(300))).await }
        });
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(runner.state(), SequenceState::LightsOut);
        assert!(!*trigger.borrow());

        run.await.unwrap();
        assert!(*trigger.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn auto_run_reports_target() {
        let (runner, _recorder, mut rx) = runner(1);
        let target = chrono::Local::now();
        let plan = RunPlan {
            start_delay: Duration::ZERO,
            lights_out_delay: Duration::from_millis(200),
            target: Some(target),
            is_auto: true,
        };
        runner.start(&plan).await;
        assert_eq!(drain(&mut rx)[0], Status::AutoRunning(target));
    }

    #[test]
    fn vetoed_admission_leaves_runner_idle() {
        let (runner, _recorder, _rx) = runner(1);
        assert_eq!(runner.admit(|| false), Admission::Vetoed);
        assert_eq!(runner.state(), SequenceState::Idle);
        assert_eq!(runner.admit(|| true), Admission::Admitted);
        assert_eq!(runner.admit(|| true), Admission::Busy);
        assert_eq!(runner.state(), SequenceState::LightsOn);
    }

    #[test]
    fn busy_runner_does_not_consult_the_guard() {
        let (runner, _recorder, _rx) = runner(1);
        assert_eq!(runner.admit(|| true), Admission::Admitted);
        let mut asked = false;
        let admission = runner.admit(|| {
            asked = true;
            false
        });
        assert_eq!(admission, Admission::Busy);
        assert!(!asked);
    }
}
