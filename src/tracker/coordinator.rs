use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::axis::{Axis, AxisMask};
use crate::config::TrackingConfig;
use crate::dispatch::{CommandDispatcher, DispatchError, EMERGENCY_ENGAGE};
use crate::telemetry::TelemetryStore;

use super::error::TrackerError;
use super::provider::{PassPlan, PositionProvider, ProviderSample};
use super::types::{TrackState, TrackingMode, TrackingStatus};

/// Maps pass wall-clock times onto the monotonic clock once per session.
#[derive(Debug, Clone, Copy)]
struct PassClock {
    utc: DateTime<Utc>,
    mono: Instant,
}

impl PassClock {
    fn now() -> Self {
        Self {
            utc: Utc::now(),
            mono: Instant::now(),
        }
    }

    fn utc_now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().saturating_duration_since(self.mono);
        self.utc + chrono::Duration::from_std(elapsed).unwrap_or(chrono::Duration::zero())
    }

    fn deadline(&self, at: DateTime<Utc>) -> Instant {
        self.mono + (at - self.utc).to_std().unwrap_or(Duration::ZERO)
    }
}

struct Session {
    id: u64,
    mode: TrackingMode,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

struct State {
    status: TrackingStatus,
    session: Option<Session>,
}

struct Inner {
    dispatcher: Arc<CommandDispatcher>,
    store: Arc<TelemetryStore>,
    config: TrackingConfig,
    state: Mutex<State>,
    /// Id of the session allowed to dispatch; bumped on every start and stop.
    generation: AtomicU64,
}

enum PassOutcome {
    Completed(u64),
    Superseded,
}

/// Owns the antenna on behalf of one tracking mode at a time.
///
/// Each automated session runs on its own task and walks
/// PREPARING, WAITING, TRACKING for every pass it was given. Every command a
/// session sends is checked against the current generation under the status
/// lock, so once `stop` or `emergency_stop` returns the superseded session
/// cannot send another frame.
#[derive(Clone)]
pub struct TrackingCoordinator {
    inner: Arc<Inner>,
}

impl TrackingCoordinator {
    pub fn new(
        dispatcher: Arc<CommandDispatcher>,
        store: Arc<TelemetryStore>,
        config: TrackingConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                dispatcher,
                store,
                config,
                state: Mutex::new(State {
                    status: TrackingStatus::default(),
                    session: None,
                }),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn status(&self) -> TrackingStatus {
        self.inner.lock().status.clone()
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.inner.dispatcher
    }

    /// Starts a single pass under `mode`. Must be called inside a tokio runtime.
    ///
    /// Returns the session id.
    pub fn start(
        &self,
        mode: TrackingMode,
        provider: Box<dyn PositionProvider>,
    ) -> Result<u64, TrackerError> {
        self.start_passes(mode, vec![provider])
    }

    /// Runs the passes back to back under the pass schedule mode.
    pub fn start_schedule(
        &self,
        passes: Vec<Box<dyn PositionProvider>>,
    ) -> Result<u64, TrackerError> {
        if passes.is_empty() {
            return Err(TrackerError::EmptySchedule);
        }
        self.start_passes(TrackingMode::PassSchedule, passes)
    }

    fn start_passes(
        &self,
        mode: TrackingMode,
        passes: Vec<Box<dyn PositionProvider>>,
    ) -> Result<u64, TrackerError> {
        if !mode.is_automated() {
            return Err(TrackerError::NotAutomated(mode));
        }
        let plan = passes
            .first()
            .ok_or(TrackerError::EmptySchedule)?
            .plan()?;
        let clock = PassClock::now();

        let mut state = self.inner.lock();
        if let Some(active) = state.status.running_mode() {
            log::warn!("Rejected start of {}: {} is active", mode, active);
            return Err(TrackerError::ModeConflict {
                requested: mode,
                active,
            });
        }

        let id = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let initial = initial_state(mode, &plan, clock.utc);
        let status = &mut state.status;
        for other in TrackingMode::AUTOMATED {
            if let Some(s) = status.mode_mut(other) {
                s.set(TrackState::Idle);
            }
        }
        status.manual.clear();
        status.geostationary.clear();
        if let Some(s) = status.mode_mut(mode) {
            s.set(initial);
            s.pass_count = passes.len();
            s.pass_index = Some(0);
        }

        let cancel = CancellationToken::new();
        let join = tokio::spawn(run_session(
            Arc::clone(&self.inner),
            id,
            mode,
            plan,
            passes,
            clock,
            cancel.clone(),
        ));
        if let Some(previous) = state.session.replace(Session {
            id,
            mode,
            cancel,
            join,
        }) {
            previous.cancel.cancel();
        }
        log::info!("Started {} session {}", mode, id);
        Ok(id)
    }

    /// Halts `mode` and sends a stop for every axis.
    ///
    /// Rejected with a mode conflict while a different automated mode holds the
    /// antenna; nothing is sent in that case.
    pub fn stop(&self, mode: TrackingMode) -> Result<(), TrackerError> {
        let mut state = self.inner.lock();
        if let Some(active) = state.status.running_mode().filter(|m| *m != mode) {
            log::warn!("Rejected stop of {}: {} owns the antenna", mode, active);
            return Err(TrackerError::ModeConflict {
                requested: mode,
                active,
            });
        }
        match mode {
            TrackingMode::Manual => state.status.manual.clear(),
            TrackingMode::Geostationary => state.status.geostationary.clear(),
            automated => {
                if state.session.as_ref().is_some_and(|s| s.mode == automated) {
                    self.inner.end_session(&mut state);
                }
                if let Some(s) = state.status.mode_mut(automated) {
                    s.set(TrackState::Idle);
                }
            }
        }
        log::info!("Stopped {}", mode);
        self.inner.dispatcher.stop(AxisMask::ALL)?;
        Ok(())
    }

    /// Always accepted: cancels any session, drops every mode to idle and
    /// engages the controller emergency stop.
    pub fn emergency_stop(&self) -> Result<(), TrackerError> {
        let mut state = self.inner.lock();
        self.inner.end_session(&mut state);
        for mode in TrackingMode::AUTOMATED {
            if let Some(s) = state.status.mode_mut(mode) {
                s.set(TrackState::Idle);
            }
        }
        state.status.manual.clear();
        state.status.geostationary.clear();
        log::warn!("Emergency stop");

        let emergency = self.inner.dispatcher.on_emergency(EMERGENCY_ENGAGE);
        let stop = self.inner.dispatcher.stop(AxisMask::ALL);
        emergency?;
        stop?;
        Ok(())
    }

    /// One multi-axis move under manual control.
    pub fn set_manual(
        &self,
        axes: AxisMask,
        angles: [f64; 3],
        speeds: [f64; 3],
    ) -> Result<(), TrackerError> {
        let mut state = self.inner.lock();
        if let Some(active) = state.status.running_mode() {
            return Err(TrackerError::ModeConflict {
                requested: TrackingMode::Manual,
                active,
            });
        }
        self.inner
            .dispatcher
            .multi_manual_control(axes, angles, speeds)?;
        state.status.manual.point(describe_pointing(axes, angles));
        state.status.geostationary.clear();
        Ok(())
    }

    /// Parks the antenna on a fixed point using the configured slew speeds.
    pub fn point_geostationary(
        &self,
        azimuth_deg: f64,
        elevation_deg: f64,
        train_deg: f64,
    ) -> Result<(), TrackerError> {
        let mut state = self.inner.lock();
        if let Some(active) = state.status.running_mode() {
            return Err(TrackerError::ModeConflict {
                requested: TrackingMode::Geostationary,
                active,
            });
        }
        self.inner.dispatcher.multi_manual_control(
            AxisMask::ALL,
            [azimuth_deg, elevation_deg, train_deg],
            self.inner.config.slew_speeds_deg_s,
        )?;
        let target = describe_pointing(AxisMask::ALL, [azimuth_deg, elevation_deg, train_deg]);
        log::info!("Geostationary {}", target);
        state.status.geostationary.point(target);
        state.status.manual.clear();
        Ok(())
    }

    /// Cancels the running session, if any, and waits for its task to exit.
    pub async fn shutdown(&self) {
        let session = {
            let mut state = self.inner.lock();
            self.inner.generation.fetch_add(1, Ordering::AcqRel);
            state.session.take()
        };
        if let Some(session) = session {
            session.cancel.cancel();
            let _ = session.join.await;
        }
    }
}

/// Renders the selected axes of a one-shot move, e.g. `pointing at az 190.000 el 35.000`.
fn describe_pointing(axes: AxisMask, angles: [f64; 3]) -> String {
    let mut text = String::from("pointing at");
    for axis in axes.axes() {
        let label = match axis {
            Axis::Azimuth => "az",
            Axis::Elevation => "el",
            Axis::Train => "train",
        };
        text.push_str(&format!(" {} {:.3}", label, angles[axis.index()]));
    }
    text
}

fn initial_state(mode: TrackingMode, plan: &PassPlan, now: DateTime<Utc>) -> TrackState {
    if mode != TrackingMode::SunTrack && now >= plan.start {
        TrackState::Tracking { points_sent: 0 }
    } else {
        TrackState::Preparing {
            train_target_deg: plan.first.train_deg,
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn end_session(&self, state: &mut State) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(session) = state.session.take() {
            session.cancel.cancel();
            log::debug!("Session {} cancelled", session.id);
        }
    }

    /// Applies `next` and runs `dispatch` if `session` still owns the antenna.
    ///
    /// Returns `Ok(false)` when the session was superseded.
    fn guarded<F>(
        &self,
        session: u64,
        mode: TrackingMode,
        next: Option<TrackState>,
        dispatch: F,
    ) -> Result<bool, DispatchError>
    where
        F: FnOnce(&CommandDispatcher) -> Result<(), DispatchError>,
    {
        let mut state = self.lock();
        if self.generation.load(Ordering::Acquire) != session {
            return Ok(false);
        }
        if let Some(next) = next {
            if let Some(s) = state.status.mode_mut(mode) {
                if s.state.name() != next.name() {
                    log::info!("{} {} -> {}", mode, s.state.name(), next.name());
                }
                s.set(next);
            }
        }
        dispatch(self.dispatcher.as_ref())?;
        Ok(true)
    }

    fn set_pass(&self, session: u64, mode: TrackingMode, index: usize) {
        let mut state = self.lock();
        if self.generation.load(Ordering::Acquire) == session {
            if let Some(s) = state.status.mode_mut(mode) {
                s.pass_index = Some(index);
            }
        }
    }

    fn finish(&self, session: u64, mode: TrackingMode, end: TrackState) {
        let mut state = self.lock();
        if self.generation.load(Ordering::Acquire) != session {
            return;
        }
        let failed = matches!(end, TrackState::Error { .. });
        match &end {
            TrackState::Error { reason } => log::error!("{} failed: {}", mode, reason),
            other => log::info!("{} {}", mode, other),
        }
        if let Some(s) = state.status.mode_mut(mode) {
            s.set(end);
        }
        if state.session.as_ref().is_some_and(|s| s.id == session) {
            state.session = None;
        }
        if failed {
            if let Err(e) = self.dispatcher.stop(AxisMask::ALL) {
                log::error!("Stop after {} failure was not sent: {}", mode, e);
            }
        }
    }

    fn telemetry_is_stale(&self) -> bool {
        self.store
            .age()
            .map_or(true, |age| age > self.config.stale_telemetry)
    }
}

async fn run_session(
    inner: Arc<Inner>,
    session: u64,
    mode: TrackingMode,
    first_plan: PassPlan,
    passes: Vec<Box<dyn PositionProvider>>,
    clock: PassClock,
    cancel: CancellationToken,
) {
    let mut total = 0;
    let mut first_plan = Some(first_plan);
    for (index, mut provider) in passes.into_iter().enumerate() {
        let plan = match first_plan.take() {
            Some(plan) => plan,
            None => match provider.plan() {
                Ok(plan) => plan,
                Err(e) => {
                    inner.finish(
                        session,
                        mode,
                        TrackState::Error {
                            reason: format!("pass {}: {}", index + 1, e),
                        },
                    );
                    return;
                }
            },
        };
        inner.set_pass(session, mode, index);

        match run_pass(&inner, session, mode, &plan, provider.as_mut(), clock, &cancel).await {
            Ok(PassOutcome::Completed(points)) => {
                total += points;
                log::info!("{} pass {} done, {} points", mode, index + 1, points);
            }
            Ok(PassOutcome::Superseded) => return,
            Err(reason) => {
                inner.finish(session, mode, TrackState::Error { reason });
                return;
            }
        }
    }
    inner.finish(session, mode, TrackState::Completed { points_sent: total });
}

macro_rules! guarded {
    ($inner:expr, $session:expr, $mode:expr, $next:expr, $dispatch:expr) => {
        match $inner.guarded($session, $mode, $next, $dispatch) {
            Ok(true) => {}
            Ok(false) => return Ok(PassOutcome::Superseded),
            Err(e) => return Err(e.to_string()),
        }
    };
}

async fn run_pass(
    inner: &Inner,
    session: u64,
    mode: TrackingMode,
    plan: &PassPlan,
    provider: &mut dyn PositionProvider,
    clock: PassClock,
    cancel: &CancellationToken,
) -> Result<PassOutcome, String> {
    let late = mode != TrackingMode::SunTrack && clock.utc_now() >= plan.start;

    if !late {
        let target = plan.first;
        let slew = inner.config.slew_speeds_deg_s;
        guarded!(
            inner,
            session,
            mode,
            Some(TrackState::Preparing {
                train_target_deg: target.train_deg,
            }),
            |d| d.multi_manual_control(AxisMask::ALL, target.angles(), slew)
        );
        if !wait_for_settle(inner, target.train_deg, cancel).await? {
            return Ok(PassOutcome::Superseded);
        }

        if mode != TrackingMode::SunTrack {
            guarded!(
                inner,
                session,
                mode,
                Some(TrackState::Waiting { start: plan.start }),
                |d| d.track_header(mode.wire_code(), plan.start, plan.cadence)
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(PassOutcome::Superseded),
                _ = sleep_until(clock.deadline(plan.start)) => {}
            }
        }
    } else {
        log::info!("{} started late, joining the pass in progress", mode);
    }

    guarded!(
        inner,
        session,
        mode,
        Some(TrackState::Tracking { points_sent: 0 }),
        |_| Ok(())
    );

    let cadence = if plan.cadence.is_zero() {
        inner.config.default_cadence
    } else {
        plan.cadence
    };
    let mut ticker =
        tokio::time::interval_at(clock.deadline(plan.start).max(Instant::now()), cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sent: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(PassOutcome::Superseded),
            _ = ticker.tick() => {}
        }

        if inner.telemetry_is_stale() {
            return Err(format!(
                "telemetry stale for more than {}",
                humantime::format_duration(inner.config.stale_telemetry)
            ));
        }

        let command = match provider.next(clock.utc_now()) {
            Ok(ProviderSample::Position(command)) => command,
            Ok(ProviderSample::EndOfPass) => return Ok(PassOutcome::Completed(sent)),
            Err(e) => return Err(format!("position provider: {}", e)),
        };

        let sequence = u32::try_from(sent).unwrap_or(u32::MAX);
        let result = inner.guarded(
            session,
            mode,
            Some(TrackState::Tracking { points_sent: sent + 1 }),
            |d| d.track_point(sequence, command.angles(), command.speeds()),
        );
        match result {
            Ok(true) => sent += 1,
            Ok(false) => return Ok(PassOutcome::Superseded),
            Err(e) if e.is_validation() => return Err(e.to_string()),
            Err(e) => log::warn!("{} point {} not queued: {}", mode, sequence, e),
        }
    }
}

/// Polls the train angle until it is within tolerance of `target`.
///
/// Returns `Ok(false)` on cancellation and an error once the stabilization
/// timeout passes.
async fn wait_for_settle(
    inner: &Inner,
    target: f64,
    cancel: &CancellationToken,
) -> Result<bool, String> {
    let timeout = inner.config.stabilization_timeout;
    let deadline = Instant::now() + timeout;
    loop {
        let train = inner.store.current().fields.train_angle;
        if train.is_some_and(|a| (a - target).abs() <= inner.config.settle_tolerance_deg) {
            log::debug!("{} axis settled at {:.3}", Axis::Train, target);
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Err(format!(
                "train axis did not settle on {:.2} deg within {} (last {})",
                target,
                humantime::format_duration(timeout),
                train.map_or("unknown".to_string(), |a| format!("{:.2}", a))
            ));
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(false),
            _ = sleep(inner.config.settle_poll) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AxisLimits;
    use crate::dispatch::RecordingSink;
    use crate::icd::CommandFrame;
    use crate::telemetry::TelemetryFields;
    use crate::tracker::provider::tests::track;
    use crate::tracker::SampleTrack;

    struct Rig {
        sink: Arc<RecordingSink>,
        store: Arc<TelemetryStore>,
        coordinator: TrackingCoordinator,
    }

    fn rig() -> Rig {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Arc::new(CommandDispatcher::new(sink.clone(), AxisLimits::default()));
        let store = Arc::new(TelemetryStore::new(Duration::from_secs(5)));
        let coordinator =
            TrackingCoordinator::new(dispatcher, Arc::clone(&store), TrackingConfig::default());
        Rig {
            sink,
            store,
            coordinator,
        }
    }

    /// Reports the train axis at `train` every 100 ms.
    fn feed(store: &Arc<TelemetryStore>, train: f64) -> JoinHandle<()> {
        let store = Arc::clone(store);
        let fields = TelemetryFields {
            train_angle: Some(train),
            ..Default::default()
        };
        store.update(&fields);
        tokio::spawn(async move {
            loop {
                sleep(Duration::from_millis(100)).await;
                store.update(&fields);
            }
        })
    }

    fn pass(start_in_ms: i64, count: usize) -> Box<dyn PositionProvider> {
        let start = Utc::now() + chrono::Duration::milliseconds(start_in_ms);
        Box::new(SampleTrack::new(track(start, count, 1000)).unwrap())
    }

    fn points(frames: &[CommandFrame]) -> usize {
        frames
            .iter()
            .filter(|f| matches!(f, CommandFrame::TrackPoint { .. }))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn pass_walks_every_state() {
        let rig = rig();
        let feeder = feed(&rig.store, 5.0);

        rig.coordinator
            .start(TrackingMode::Ephemeris, pass(10_000, 5))
            .unwrap();
        assert!(matches!(
            rig.coordinator.status().ephemeris.state,
            TrackState::Preparing { train_target_deg } if train_target_deg == 5.0
        ));

        sleep(Duration::from_secs(3)).await;
        let status = rig.coordinator.status();
        assert_eq!(status.ephemeris.state.name(), "WAITING");
        assert!(status.ephemeris.active);
        let frames = rig.sink.frames();
        assert!(matches!(frames[0], CommandFrame::MultiManualControl { .. }));
        assert!(matches!(frames[1], CommandFrame::TrackHeader { mode: 1, .. }));

        sleep(Duration::from_millis(9_500)).await;
        let status = rig.coordinator.status();
        assert_eq!(status.ephemeris.state.name(), "TRACKING");

        sleep(Duration::from_secs(10)).await;
        let status = rig.coordinator.status();
        assert_eq!(status.ephemeris.state, TrackState::Completed { points_sent: 5 });
        assert!(!status.ephemeris.active);
        assert_eq!(status.running_mode(), None);

        let frames = rig.sink.frames();
        assert_eq!(points(&frames), 5);
        assert!(matches!(
            frames[2],
            CommandFrame::TrackPoint { sequence: 0, angles, .. } if angles[0] == 100.0
        ));
        assert!(!frames.iter().any(|f| matches!(f, CommandFrame::Stop { .. })));
        feeder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn emergency_during_tracking_halts_the_session() {
        let rig = rig();
        let feeder = feed(&rig.store, 5.0);

        rig.coordinator
            .start(TrackingMode::Ephemeris, pass(2_000, 100))
            .unwrap();
        sleep(Duration::from_millis(5_500)).await;
        assert_eq!(rig.coordinator.status().ephemeris.state.name(), "TRACKING");
        assert!(points(&rig.sink.frames()) >= 3);

        rig.coordinator.emergency_stop().unwrap();
        let status = rig.coordinator.status();
        assert_eq!(status.ephemeris.state, TrackState::Idle);
        assert!(!status.ephemeris.active);

        let frames = rig.sink.frames();
        let n = frames.len();
        assert_eq!(frames[n - 2], CommandFrame::Emergency { code: b'E' });
        assert_eq!(frames[n - 1], CommandFrame::Stop { axes: AxisMask::ALL });

        sleep(Duration::from_secs(5)).await;
        assert_eq!(rig.sink.frames().len(), n);
        feeder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn conflicting_start_leaves_active_mode_running() {
        let rig = rig();
        let feeder = feed(&rig.store, 5.0);

        rig.coordinator
            .start(TrackingMode::Ephemeris, pass(10_000, 5))
            .unwrap();
        let err = rig
            .coordinator
            .start(TrackingMode::SunTrack, pass(0, 5))
            .unwrap_err();
        assert!(matches!(
            err,
            TrackerError::ModeConflict {
                requested: TrackingMode::SunTrack,
                active: TrackingMode::Ephemeris,
            }
        ));
        assert!(matches!(
            rig.coordinator
                .set_manual(AxisMask::AZIMUTH, [10.0, 0.0, 0.0], [1.0, 0.0, 0.0])
                .unwrap_err(),
            TrackerError::ModeConflict { .. }
        ));

        let status = rig.coordinator.status();
        assert_eq!(status.running_mode(), Some(TrackingMode::Ephemeris));
        assert!(!status.sun_track.active);
        assert!(!status.manual.active);
        feeder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn stale_telemetry_moves_to_error() {
        let rig = rig();
        rig.store.update(&TelemetryFields {
            train_angle: Some(5.0),
            ..Default::default()
        });

        rig.coordinator
            .start(TrackingMode::Ephemeris, pass(1_000, 30))
            .unwrap();
        sleep(Duration::from_secs(10)).await;

        let status = rig.coordinator.status();
        match &status.ephemeris.state {
            TrackState::Error { reason } => assert!(reason.contains("stale"), "{}", reason),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!status.ephemeris.active);
        assert!(status.ephemeris.sub_state.starts_with("error:"));

        let frames = rig.sink.frames();
        assert_eq!(points(&frames), 3);
        assert_eq!(frames.last(), Some(&CommandFrame::Stop { axes: AxisMask::ALL }));
    }

    #[tokio::test(start_paused = true)]
    async fn late_start_joins_the_pass_in_progress() {
        let rig = rig();
        let feeder = feed(&rig.store, 0.0);

        rig.coordinator
            .start(TrackingMode::Ephemeris, pass(-5_000, 10))
            .unwrap();
        assert_eq!(rig.coordinator.status().ephemeris.state.name(), "TRACKING");

        sleep(Duration::from_millis(500)).await;
        let frames = rig.sink.frames();
        assert!(matches!(
            frames[0],
            CommandFrame::TrackPoint { sequence: 0, angles, .. } if angles[0] == 105.0
        ));
        assert!(!frames.iter().any(|f| matches!(
            f,
            CommandFrame::MultiManualControl { .. } | CommandFrame::TrackHeader { .. }
        )));
        feeder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn sun_tracking_skips_waiting() {
        let rig = rig();
        let feeder = feed(&rig.store, 5.0);

        rig.coordinator
            .start(TrackingMode::SunTrack, pass(5_000, 3))
            .unwrap();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(rig.coordinator.status().sun_track.state.name(), "TRACKING");

        sleep(Duration::from_secs(10)).await;
        let status = rig.coordinator.status();
        assert_eq!(status.sun_track.state, TrackState::Completed { points_sent: 3 });
        assert!(!rig
            .sink
            .frames()
            .iter()
            .any(|f| matches!(f, CommandFrame::TrackHeader { .. })));
        feeder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn unsettled_train_axis_times_out() {
        let rig = rig();
        let feeder = feed(&rig.store, 40.0);

        rig.coordinator
            .start(TrackingMode::Ephemeris, pass(300_000, 5))
            .unwrap();
        sleep(Duration::from_secs(89)).await;
        assert_eq!(rig.coordinator.status().ephemeris.state.name(), "PREPARING");

        sleep(Duration::from_secs(2)).await;
        let status = rig.coordinator.status();
        match &status.ephemeris.state {
            TrackState::Error { reason } => assert!(reason.contains("did not settle"), "{}", reason),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            rig.sink.frames().last(),
            Some(&CommandFrame::Stop { axes: AxisMask::ALL })
        );
        feeder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_runs_passes_back_to_back() {
        let rig = rig();
        let feeder = feed(&rig.store, 5.0);

        rig.coordinator
            .start_schedule(vec![pass(5_000, 3), pass(15_000, 4)])
            .unwrap();
        assert_eq!(rig.coordinator.status().pass_schedule.pass_count, 2);

        sleep(Duration::from_secs(12)).await;
        let status = rig.coordinator.status();
        assert_eq!(status.pass_schedule.pass_index, Some(1));
        assert_eq!(status.pass_schedule.state.name(), "WAITING");

        sleep(Duration::from_secs(10)).await;
        let status = rig.coordinator.status();
        assert_eq!(
            status.pass_schedule.state,
            TrackState::Completed { points_sent: 7 }
        );
        let headers = rig
            .sink
            .frames()
            .iter()
            .filter(|f| matches!(f, CommandFrame::TrackHeader { mode: 2, .. }))
            .count();
        assert_eq!(headers, 2);
        feeder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_waiting_returns_to_idle() {
        let rig = rig();
        let feeder = feed(&rig.store, 5.0);

        rig.coordinator
            .start(TrackingMode::Ephemeris, pass(30_000, 5))
            .unwrap();
        sleep(Duration::from_secs(2)).await;
        assert_eq!(rig.coordinator.status().ephemeris.state.name(), "WAITING");

        rig.coordinator.stop(TrackingMode::Ephemeris).unwrap();
        assert_eq!(rig.coordinator.status().ephemeris.state, TrackState::Idle);
        let n = rig.sink.frames().len();
        assert_eq!(
            rig.sink.frames().last(),
            Some(&CommandFrame::Stop { axes: AxisMask::ALL })
        );

        sleep(Duration::from_secs(40)).await;
        assert_eq!(rig.sink.frames().len(), n);

        // a stopped mode can be started again
        rig.coordinator
            .start(TrackingMode::SunTrack, pass(1_000, 2))
            .unwrap();
        feeder.abort();
    }

    #[tokio::test]
    async fn manual_and_geostationary_flags() {
        let rig = rig();
        rig.coordinator
            .set_manual(AxisMask::ELEVATION, [0.0, 45.0, 0.0], [0.0, 2.0, 0.0])
            .unwrap();
        let status = rig.coordinator.status();
        assert!(status.manual.active);
        assert_eq!(status.manual.sub_state, "pointing at el 45.000");

        rig.coordinator.point_geostationary(190.0, 35.0, 0.0).unwrap();
        let status = rig.coordinator.status();
        assert!(status.geostationary.active);
        assert_eq!(
            status.geostationary.sub_state,
            "pointing at az 190.000 el 35.000 train 0.000"
        );
        assert!(!status.manual.active);
        assert_eq!(status.manual.sub_state, "idle");
        assert_eq!(
            rig.sink.frames().last(),
            Some(&CommandFrame::MultiManualControl {
                axes: AxisMask::ALL,
                angles: [190.0, 35.0, 0.0],
                speeds: [3.0, 3.0, 1.0],
            })
        );

        rig.coordinator.stop(TrackingMode::Geostationary).unwrap();
        let status = rig.coordinator.status();
        assert!(!status.geostationary.active);
        assert_eq!(status.geostationary.sub_state, "idle");

        assert!(matches!(
            rig.coordinator.start(TrackingMode::Manual, pass(0, 1)),
            Err(TrackerError::NotAutomated(TrackingMode::Manual))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_another_mode_leaves_the_owner_tracking() {
        let rig = rig();
        let feeder = feed(&rig.store, 5.0);

        rig.coordinator
            .start(TrackingMode::Ephemeris, pass(2_000, 100))
            .unwrap();
        sleep(Duration::from_millis(4_500)).await;
        assert_eq!(rig.coordinator.status().ephemeris.state.name(), "TRACKING");

        for other in [
            TrackingMode::SunTrack,
            TrackingMode::PassSchedule,
            TrackingMode::Manual,
            TrackingMode::Geostationary,
        ] {
            assert!(matches!(
                rig.coordinator.stop(other),
                Err(TrackerError::ModeConflict {
                    requested,
                    active: TrackingMode::Ephemeris,
                }) if requested == other
            ));
        }
        assert!(!rig
            .sink
            .frames()
            .iter()
            .any(|f| matches!(f, CommandFrame::Stop { .. })));

        let before = points(&rig.sink.frames());
        sleep(Duration::from_secs(3)).await;
        assert_eq!(rig.coordinator.status().ephemeris.state.name(), "TRACKING");
        assert!(points(&rig.sink.frames()) > before);

        // the owner itself can still be stopped
        rig.coordinator.stop(TrackingMode::Ephemeris).unwrap();
        assert_eq!(
            rig.sink.frames().last(),
            Some(&CommandFrame::Stop { axes: AxisMask::ALL })
        );
        feeder.abort();
    }

    #[tokio::test]
    async fn stopping_an_idle_mode_with_no_owner_halts_the_axes() {
        let rig = rig();
        rig.coordinator.stop(TrackingMode::SunTrack).unwrap();
        assert_eq!(
            rig.sink.frames(),
            vec![CommandFrame::Stop { axes: AxisMask::ALL }]
        );
    }

    #[tokio::test]
    async fn invalid_manual_move_leaves_flags_alone() {
        let rig = rig();
        assert!(matches!(
            rig.coordinator
                .set_manual(AxisMask::empty(), [0.0; 3], [0.0; 3])
                .unwrap_err(),
            TrackerError::Dispatch(DispatchError::EmptyAxisMask(0))
        ));
        assert!(!rig.coordinator.status().manual.active);
        assert!(rig.sink.frames().is_empty());
    }
}
