// Tracking engine - top level glue between position source, session, route
// projection, off-route detection, rerouting and persistence
//
// All state is owned by the engine and mutated only from its processing
// sequence: either direct `&mut self` calls, or the `run` loop which
// serializes samples, reroute completions, clock ticks and handle commands.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::constants::COMMAND_CHANNEL_CAPACITY;
use crate::error::TrackingError;
use crate::gateway::{FinalizedSession, PersistenceGateway, SessionSummary, UploadBuffer};
use crate::monitor::{OffRouteMonitor, RouteCheck};
use crate::observer::{ListenerId, Listeners, StatsObserver, TrackingStats};
use crate::reroute::{RerouteApplied, RerouteCoordinator, RerouteOutcome, RoutingProvider};
use crate::route::{RoutePlan, RouteProjector};
use crate::session::{SessionState, StopKind, TrackingSession};
use crate::source::PositionSource;
use crate::track::PositionSample;

/// Parameters for a new session
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Planned route to follow
    pub route: Option<RoutePlan>,
    /// Backend identifier of the planned route
    pub route_id: Option<String>,
    pub is_public: bool,
}

/// What happened to one ingested sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// Session not Active; sample discarded
    Dropped,
    Recorded {
        seq: u64,
        route_check: Option<RouteCheck>,
        reroute_requested: bool,
    },
}

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    Saved(FinalizedSession),
    Discarded,
}

/// Why `run` returned
#[derive(Debug, Clone, PartialEq)]
pub enum RunExit {
    Stopped(StopOutcome),
    /// The position source finished; the session is still open
    SourceEnded,
}

/// Requests sent through an [`EngineHandle`]
#[derive(Debug)]
pub enum EngineCommand {
    Pause(oneshot::Sender<Result<(), TrackingError>>),
    Resume(oneshot::Sender<Result<(), TrackingError>>),
    Stop {
        save: bool,
        reply: oneshot::Sender<Result<StopOutcome, TrackingError>>,
    },
    Flush(oneshot::Sender<Result<usize, TrackingError>>),
}

/// Cloneable handle for controlling a running engine from another task (e.g. a UI)
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
    stats: watch::Receiver<TrackingStats>,
}

fn engine_gone() -> TrackingError {
    TrackingError::InvalidState {
        op: "send command",
        state: "engine not running".to_string(),
    }
}

impl EngineHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, TrackingError>>) -> EngineCommand,
    ) -> Result<T, TrackingError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| engine_gone())?;
        rx.await.map_err(|_| engine_gone())?
    }

    pub async fn pause(&self) -> Result<(), TrackingError> {
        self.request(EngineCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<(), TrackingError> {
        self.request(EngineCommand::Resume).await
    }

    pub async fn stop(&self, save: bool) -> Result<StopOutcome, TrackingError> {
        self.request(|reply| EngineCommand::Stop { save, reply }).await
    }

    pub async fn flush(&self) -> Result<usize, TrackingError> {
        self.request(EngineCommand::Flush).await
    }

    /// Latest published snapshot
    pub fn stats(&self) -> TrackingStats {
        self.stats.borrow().clone()
    }

    /// Receiver that changes on every published snapshot
    pub fn watch(&self) -> watch::Receiver<TrackingStats> {
        self.stats.clone()
    }
}

/// Live tracking and navigation engine
pub struct TrackingEngine<G, R, C = SystemClock> {
    config: EngineConfig,
    clock: C,
    gateway: Arc<G>,
    source: Option<Box<dyn PositionSource>>,
    session: Option<TrackingSession>,
    next_session_id: u64,
    is_public: bool,
    /// Backend session id, assigned on first persistence call
    remote_id: Option<String>,
    projector: Option<RouteProjector>,
    monitor: OffRouteMonitor,
    reroute: RerouteCoordinator<R>,
    uploads: UploadBuffer,
    listeners: Listeners,
    last_error: Option<TrackingError>,
    stats_tx: watch::Sender<TrackingStats>,
    command_tx: mpsc::Sender<EngineCommand>,
    command_rx: mpsc::Receiver<EngineCommand>,
}

impl<G, R> TrackingEngine<G, R, SystemClock>
where
    G: PersistenceGateway,
    R: RoutingProvider,
{
    /// Create an engine reading the system clock
    pub fn new(config: EngineConfig, gateway: Arc<G>, router: Arc<R>) -> Self {
        Self::with_clock(config, gateway, router, SystemClock)
    }
}

impl<G, R, C> TrackingEngine<G, R, C>
where
    G: PersistenceGateway,
    R: RoutingProvider,
    C: Clock,
{
    pub fn with_clock(config: EngineConfig, gateway: Arc<G>, router: Arc<R>, clock: C) -> Self {
        let (stats_tx, _) = watch::channel(TrackingStats::default());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        TrackingEngine {
            monitor: OffRouteMonitor::new(config.off_route_threshold_m),
            uploads: UploadBuffer::new(config.upload_batch_size),
            reroute: RerouteCoordinator::new(router),
            config,
            clock,
            gateway,
            source: None,
            session: None,
            next_session_id: 1,
            is_public: false,
            remote_id: None,
            projector: None,
            listeners: Listeners::new(),
            last_error: None,
            stats_tx,
            command_tx,
            command_rx,
        }
    }

    // --- Observer contract ---

    /// Register a change listener; it is called once after every completed mutation
    pub fn subscribe(&mut self, observer: Box<dyn StatsObserver>) -> ListenerId {
        self.listeners.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Handle for controlling the engine while `run` owns it
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            tx: self.command_tx.clone(),
            stats: self.stats_tx.subscribe(),
        }
    }

    /// Current stats computed at the clock's current time
    pub fn stats(&self) -> TrackingStats {
        let now = self.clock.now();
        let mut stats = TrackingStats {
            off_route: self.monitor.is_off_route(),
            rerouting: self.reroute.in_flight(),
            pending_upload: self.uploads.pending(),
            last_error: self.last_error.clone(),
            ..TrackingStats::default()
        };

        if let Some(session) = &self.session {
            stats.session_id = Some(session.id);
            stats.state = session.state();
            stats.distance_m = session.distance_m();
            stats.duration_s = session.active_duration(now);
            stats.pace_s_per_km = session.avg_pace_s_per_km(now);
            stats.current_speed = session.current_speed();
            stats.max_speed = session.max_speed();
            stats.elevation_gain_m = session.elevation_gain_m();
            stats.point_count = session.points().len();

            if let Some(projector) = &self.projector {
                stats.remaining_m = Some(projector.remaining_m());
                stats.eta_s = Some(projector.estimate_remaining_time(
                    session.distance_m(),
                    session.observed_pace(now),
                    self.config.min_pace_distance_m,
                    self.config.fallback_pace_s_per_m,
                ));
                stats.waypoint_index = Some(projector.waypoint_index());
                stats.distance_to_route_m =
                    projector.last_projection().map(|p| p.distance_to_route_m);
            }
        }
        stats
    }

    pub fn session(&self) -> Option<&TrackingSession> {
        self.session.as_ref()
    }

    pub fn projector(&self) -> Option<&RouteProjector> {
        self.projector.as_ref()
    }

    pub fn is_off_route(&self) -> bool {
        self.monitor.is_off_route()
    }

    pub fn is_rerouting(&self) -> bool {
        self.reroute.in_flight()
    }

    /// Total reroute requests issued to the routing provider
    pub fn reroutes_issued(&self) -> u64 {
        self.reroute.issued()
    }

    pub fn remote_session_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    pub fn pending_upload(&self) -> usize {
        self.uploads.pending()
    }

    fn publish(&mut self) {
        let stats = self.stats();
        self.listeners.notify(&stats);
        self.stats_tx.send_replace(stats);
    }

    fn record_error(&mut self, e: &TrackingError) {
        self.last_error = Some(e.clone());
    }

    /// Drop the recorded error once the operation that raised it has succeeded
    fn clear_error(&mut self, resolved: impl Fn(&TrackingError) -> bool) {
        if self.last_error.as_ref().is_some_and(|e| resolved(e)) {
            self.last_error = None;
        }
    }

    fn session_state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Idle, |s| s.state())
    }

    // --- Lifecycle ---

    /// Acquire the source and begin a new session.
    ///
    /// Fails with `SourceUnavailable` (service disabled, permission denied, or
    /// permanently denied) without creating a session. Must be called within a
    /// Tokio runtime.
    pub fn start<S>(
        &mut self,
        mut source: S,
        options: StartOptions,
    ) -> Result<mpsc::Receiver<PositionSample>, TrackingError>
    where
        S: PositionSource + 'static,
    {
        let state = self.session_state();
        if !matches!(state, SessionState::Idle | SessionState::Stopped(_)) {
            return Err(TrackingError::InvalidState {
                op: "start",
                state: state.to_string(),
            });
        }

        if let Err(e) = source.status().check() {
            warn!(error = %e, "Cannot start session");
            self.record_error(&e);
            self.publish();
            return Err(e);
        }
        let samples = match source.start() {
            Ok(rx) => rx,
            Err(e) => {
                warn!(error = %e, "Position source failed to start");
                self.record_error(&e);
                self.publish();
                return Err(e);
            }
        };

        let id = self.next_session_id;
        self.next_session_id += 1;
        let mut session = TrackingSession::new(id, options.route_id);
        session.start(self.clock.now())?;

        info!(
            session = id,
            route = ?session.route_id,
            route_points = ?options.route.as_ref().map(|r| r.len()),
            public = options.is_public,
            "Session started"
        );

        self.session = Some(session);
        self.projector = options.route.map(RouteProjector::new);
        self.monitor.reset();
        self.reroute.release();
        self.uploads = UploadBuffer::new(self.config.upload_batch_size);
        self.remote_id = None;
        self.is_public = options.is_public;
        self.last_error = None;
        self.stop_source();
        self.source = Some(Box::new(source));

        self.publish();
        Ok(samples)
    }

    fn stop_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.stop();
        }
    }

    fn no_session(op: &'static str) -> TrackingError {
        TrackingError::InvalidState {
            op,
            state: SessionState::Idle.to_string(),
        }
    }

    /// Process one sample: accumulate, project onto the route, check deviation,
    /// and request a reroute on the off-route edge.
    ///
    /// Samples outside the Active state are dropped without error.
    pub fn ingest(&mut self, sample: PositionSample) -> Result<SampleOutcome, TrackingError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(SampleOutcome::Dropped);
        };
        let point = match session.add_sample(&sample) {
            Ok(Some(point)) => point,
            Ok(None) => return Ok(SampleOutcome::Dropped),
            Err(e) => {
                debug!(error = %e, "Dropping invalid sample");
                self.record_error(&e);
                self.publish();
                return Err(e);
            }
        };
        let session_id = session.id;
        self.uploads.push(point);

        let mut route_check = None;
        let mut reroute_requested = false;
        if let Some(projector) = self.projector.as_mut() {
            let projection = projector.update(point.position());
            let check = self.monitor.check(&projection);
            if check == RouteCheck::LeftRoute {
                let request = RerouteCoordinator::<R>::build_request(point.position(), projector);
                reroute_requested =
                    self.reroute
                        .trigger(request, session_id, projector.generation());
            }
            route_check = Some(check);
        }

        self.publish();
        Ok(SampleOutcome::Recorded {
            seq: point.seq,
            route_check,
            reroute_requested,
        })
    }

    pub fn pause(&mut self) -> Result<(), TrackingError> {
        let now = self.clock.now();
        let session = self.session.as_mut().ok_or_else(|| Self::no_session("pause"))?;
        session.pause(now)?;
        info!(session = session.id, "Session paused");
        self.publish();
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), TrackingError> {
        let now = self.clock.now();
        let session = self.session.as_mut().ok_or_else(|| Self::no_session("resume"))?;
        session.resume(now)?;
        info!(session = session.id, "Session resumed");
        self.publish();
        Ok(())
    }

    /// Periodic clock tick: republish stats so elapsed time advances on screen.
    ///
    /// Duration is derived from the session's paused/active intervals, so ticks
    /// never accumulate time on their own.
    pub fn tick(&mut self) {
        self.publish();
    }

    async fn ensure_remote_session(&mut self) -> Result<String, crate::error::GatewayError> {
        if let Some(id) = &self.remote_id {
            return Ok(id.clone());
        }
        let route_id = self.session.as_ref().and_then(|s| s.route_id.clone());
        let id = self
            .gateway
            .start_session(route_id.as_deref(), self.is_public)
            .await?;
        info!(remote = %id, "Backend session registered");
        self.remote_id = Some(id.clone());
        Ok(id)
    }

    /// Upload buffered points now. Unsent points are kept on failure.
    pub async fn flush_uploads(&mut self) -> Result<usize, TrackingError> {
        if self.uploads.is_empty() {
            return Ok(0);
        }
        let result = match self.ensure_remote_session().await {
            Ok(id) => self.uploads.flush(&*self.gateway, &id).await,
            Err(e) => Err(TrackingError::UploadFailed {
                pending: self.uploads.pending(),
                reason: e.to_string(),
            }),
        };
        match &result {
            Ok(_) => self.clear_error(|e| matches!(e, TrackingError::UploadFailed { .. })),
            Err(e) => self.record_error(e),
        }
        self.publish();
        result
    }

    fn summary(&self, now: f64) -> Option<SessionSummary> {
        let session = self.session.as_ref()?;
        let has_elevation = session.points().iter().any(|p| p.elevation.is_some());
        Some(SessionSummary {
            active_duration_s: session.active_duration(now),
            total_distance_m: session.distance_m(),
            elevation_gain_m: has_elevation.then(|| session.elevation_gain_m()),
            avg_pace_s_per_km: session.avg_pace_s_per_km(now),
        })
    }

    async fn persist(&mut self, now: f64) -> Result<FinalizedSession, TrackingError> {
        let id = self
            .ensure_remote_session()
            .await
            .map_err(|e| TrackingError::EndSessionFailed(e.to_string()))?;
        self.uploads.flush(&*self.gateway, &id).await?;

        let summary = self.summary(now).ok_or_else(|| Self::no_session("save"))?;
        self.gateway
            .end_session(&id, &summary)
            .await
            .map_err(|e| TrackingError::EndSessionFailed(e.to_string()))
    }

    /// Stop the session.
    ///
    /// With `save == false` the session is discarded without contacting the
    /// backend. With `save == true` the session is registered (if needed),
    /// remaining points uploaded and the session finalized. On failure the
    /// session stays in Stopping: call `stop(true)` to retry or `stop(false)`
    /// to discard.
    pub async fn stop(&mut self, save: bool) -> Result<StopOutcome, TrackingError> {
        let now = self.clock.now();
        let state = self.session_state();
        if !matches!(
            state,
            SessionState::Active | SessionState::Paused | SessionState::Stopping
        ) {
            return Err(TrackingError::InvalidState {
                op: "stop",
                state: state.to_string(),
            });
        }
        self.stop_source();
        self.reroute.release();

        let session = self.session.as_mut().ok_or_else(|| Self::no_session("stop"))?;
        if !save {
            session.finish(StopKind::Discarded, now)?;
            info!(
                session = session.id,
                points = session.points().len(),
                "Session discarded"
            );
            self.uploads.clear();
            self.publish();
            return Ok(StopOutcome::Discarded);
        }

        session.begin_stop(now)?;
        match self.persist(now).await {
            Ok(finalized) => {
                if let Some(session) = self.session.as_mut() {
                    session.finish(StopKind::Saved, now)?;
                }
                info!(
                    remote = %finalized.id,
                    distance = finalized.distance_m,
                    duration = finalized.duration_s,
                    "Session saved"
                );
                self.clear_error(|e| {
                    matches!(
                        e,
                        TrackingError::UploadFailed { .. } | TrackingError::EndSessionFailed(_)
                    )
                });
                self.publish();
                Ok(StopOutcome::Saved(finalized))
            }
            Err(e) => {
                warn!(error = %e, pending = self.uploads.pending(), "Saving session failed");
                self.record_error(&e);
                self.publish();
                Err(e)
            }
        }
    }

    // --- Rerouting ---

    /// Wait for the in-flight reroute to complete
    pub async fn next_reroute_outcome(&mut self) -> Option<RerouteOutcome> {
        self.reroute.next_outcome().await
    }

    /// Apply a completed reroute. Results for a session that is no longer
    /// recording are dropped (`Ok(None)`).
    pub fn apply_reroute(
        &mut self,
        outcome: RerouteOutcome,
    ) -> Result<Option<RerouteApplied>, TrackingError> {
        let recording = self.session.as_ref().is_some_and(|s| {
            s.id == outcome.session_id
                && matches!(s.state(), SessionState::Active | SessionState::Paused)
        });
        if !recording || self.projector.is_none() {
            self.reroute.abandon(outcome);
            self.publish();
            return Ok(None);
        }
        let Some(projector) = self.projector.as_mut() else {
            return Ok(None);
        };

        match self.reroute.apply(outcome, projector, &mut self.monitor) {
            Ok(applied) => {
                if matches!(applied, RerouteApplied::Replaced { .. }) {
                    self.clear_error(|e| matches!(e, TrackingError::RouteComputeFailed(_)));
                }
                self.publish();
                Ok(Some(applied))
            }
            Err(e) => {
                self.record_error(&e);
                self.publish();
                Err(e)
            }
        }
    }

    // --- Processing loop ---

    async fn handle_command(&mut self, command: EngineCommand) -> Option<StopOutcome> {
        match command {
            EngineCommand::Pause(reply) => {
                let _ = reply.send(self.pause());
                None
            }
            EngineCommand::Resume(reply) => {
                let _ = reply.send(self.resume());
                None
            }
            EngineCommand::Flush(reply) => {
                let result = self.flush_uploads().await;
                let _ = reply.send(result);
                None
            }
            EngineCommand::Stop { save, reply } => {
                let result = self.stop(save).await;
                let done = result.as_ref().ok().cloned();
                let _ = reply.send(result);
                done
            }
        }
    }

    fn is_recording(&self) -> bool {
        matches!(
            self.session_state(),
            SessionState::Active | SessionState::Paused
        )
    }

    /// Serialized processing loop.
    ///
    /// Handles samples, reroute completions, clock ticks and handle commands one
    /// at a time. Returns when the session is stopped through a handle, or when
    /// the sample stream ends.
    pub async fn run(&mut self, mut samples: mpsc::Receiver<PositionSample>) -> RunExit {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                sample = samples.recv() => match sample {
                    Some(sample) => {
                        if let Err(e) = self.ingest(sample) {
                            debug!(error = %e, "Sample rejected");
                        }
                        if self.config.live_upload && self.uploads.batch_ready() {
                            let _ = self.flush_uploads().await;
                        }
                    }
                    None => {
                        info!("Position source ended");
                        return RunExit::SourceEnded;
                    }
                },
                outcome = self.reroute.next_outcome() => {
                    if let Some(outcome) = outcome {
                        let _ = self.apply_reroute(outcome);
                    }
                },
                _ = ticker.tick() => {
                    self.tick();
                    if self.config.live_upload && self.is_recording() && !self.uploads.is_empty() {
                        let _ = self.flush_uploads().await;
                    }
                },
                Some(command) = self.command_rx.recv() => {
                    if let Some(outcome) = self.handle_command(command).await {
                        return RunExit::Stopped(outcome);
                    }
                },
            }
        }
    }
}
