// Rerouting - single-flight client to an external routing provider
//
// The network call runs on a spawned task; its outcome is posted back over a
// channel so the plan is only ever swapped by the sample-processing sequence.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{RoutingError, TrackingError};
use crate::geodesy;
use crate::monitor::OffRouteMonitor;
use crate::route::{RoutePlan, RoutePoint, RouteProjector};

/// Route computation request: current position to the original destination
#[derive(Debug, Clone, PartialEq)]
pub struct RerouteRequest {
    pub origin: RoutePoint,
    pub destination: RoutePoint,
    /// Intermediate waypoints not yet passed, in order
    pub waypoints: Vec<RoutePoint>,
}

/// Successful provider response
#[derive(Debug, Clone, PartialEq)]
pub struct RerouteResult {
    pub points: Vec<RoutePoint>,
    pub distance_m: f64,
    pub duration_s: f64,
}

impl RerouteResult {
    /// Turn the response into a plan, re-locating the requested waypoints on the new geometry
    pub fn into_plan(self, waypoints: &[RoutePoint]) -> Result<RoutePlan, RoutingError> {
        let mut via = Vec::with_capacity(waypoints.len());
        let mut from = 0;
        for wp in waypoints {
            let nearest = self
                .points
                .iter()
                .enumerate()
                .skip(from)
                .map(|(i, p)| {
                    (i, geodesy::greatcircle(wp.latitude, wp.longitude, p.latitude, p.longitude))
                })
                .min_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((i, _)) = nearest {
                via.push(i);
                from = i;
            }
        }
        Ok(RoutePlan::new(self.points)?
            .with_planned_distance(self.distance_m)
            .with_planned_duration(self.duration_s)
            .with_via(via))
    }
}

/// External routing service
pub trait RoutingProvider: Send + Sync + 'static {
    /// Compute a route through the request's waypoints.
    ///
    /// Treated as a slow, fallible remote call.
    fn compute_route(
        &self,
        request: &RerouteRequest,
    ) -> impl Future<Output = Result<RerouteResult, RoutingError>> + Send;
}

/// Router that joins the waypoints with straight lines.
///
/// Used when no routing service is configured; duration is estimated at a fixed pace.
#[derive(Debug, Clone)]
pub struct StraightLineRouter {
    pace_s_per_m: f64,
}

impl StraightLineRouter {
    pub fn new(pace_s_per_m: f64) -> Self {
        StraightLineRouter { pace_s_per_m }
    }
}

impl RoutingProvider for StraightLineRouter {
    async fn compute_route(&self, request: &RerouteRequest) -> Result<RerouteResult, RoutingError> {
        let mut points = Vec::with_capacity(request.waypoints.len() + 2);
        points.push(request.origin);
        points.extend(request.waypoints.iter().copied());
        points.push(request.destination);

        let coords: Vec<(f64, f64)> = points.iter().map(|p| p.position()).collect();
        let distance_m = geodesy::path_length(&coords);
        Ok(RerouteResult {
            points,
            distance_m,
            duration_s: distance_m * self.pace_s_per_m,
        })
    }
}

/// Outcome of one reroute call, tagged with what it was computed for
#[derive(Debug)]
pub struct RerouteOutcome {
    pub session_id: u64,
    /// Projector generation the request was built from
    pub generation: u64,
    pub waypoints: Vec<RoutePoint>,
    pub result: Result<RerouteResult, RoutingError>,
}

/// How an outcome was applied
#[derive(Debug, Clone, PartialEq)]
pub enum RerouteApplied {
    /// New plan installed
    Replaced { points: usize, distance_m: f64 },
    /// Outcome belonged to a superseded plan and was dropped
    Stale,
}

/// Single-flight reroute driver.
///
/// The guard belongs to one session: a request left running by a stopped
/// session never blocks the next one.
pub struct RerouteCoordinator<R> {
    router: Arc<R>,
    /// Session whose request is outstanding
    in_flight: Option<u64>,
    issued: u64,
    tx: mpsc::UnboundedSender<RerouteOutcome>,
    rx: mpsc::UnboundedReceiver<RerouteOutcome>,
}

impl<R: RoutingProvider> RerouteCoordinator<R> {
    pub fn new(router: Arc<R>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        RerouteCoordinator {
            router,
            in_flight: None,
            issued: 0,
            tx,
            rx,
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Forget the outstanding request (session started or stopped).
    /// Its outcome still arrives and is dropped by `abandon`.
    pub fn release(&mut self) {
        if let Some(session) = self.in_flight.take() {
            debug!(session, "Releasing reroute guard");
        }
    }

    /// Number of requests sent to the provider so far
    pub fn issued(&self) -> u64 {
        self.issued
    }

    /// Build the request for the current position against the projector's plan.
    ///
    /// Waypoints at or behind the cursor are left out.
    pub fn build_request(position: (f64, f64), projector: &RouteProjector) -> RerouteRequest {
        let plan = projector.plan();
        RerouteRequest {
            origin: position.into(),
            destination: plan.destination(),
            waypoints: plan.via_after(projector.waypoint_index()),
        }
    }

    /// Issue a request unless one is already running. Returns whether a request was issued.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn trigger(&mut self, request: RerouteRequest, session_id: u64, generation: u64) -> bool {
        if self.in_flight == Some(session_id) {
            debug!("Reroute already in flight, ignoring trigger");
            return false;
        }
        self.in_flight = Some(session_id);
        self.issued += 1;
        info!(
            origin_lat = request.origin.latitude,
            origin_lon = request.origin.longitude,
            waypoints = request.waypoints.len(),
            "Requesting reroute"
        );

        let router = Arc::clone(&self.router);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = router.compute_route(&request).await;
            let _ = tx.send(RerouteOutcome {
                session_id,
                generation,
                waypoints: request.waypoints,
                result,
            });
        });
        true
    }

    /// Wait for the next completed request
    pub async fn next_outcome(&mut self) -> Option<RerouteOutcome> {
        self.rx.recv().await
    }

    /// Take a completed request if one is ready
    pub fn try_outcome(&mut self) -> Option<RerouteOutcome> {
        self.rx.try_recv().ok()
    }

    /// Drop a completed request without applying it (session no longer recording)
    pub fn abandon(&mut self, outcome: RerouteOutcome) {
        if self.in_flight == Some(outcome.session_id) {
            self.in_flight = None;
        }
        debug!(session = outcome.session_id, "Dropping reroute result, session not recording");
    }

    /// Apply a completed request.
    ///
    /// Success swaps the plan (cursor back to zero) and clears the off-route flag.
    /// Failure only clears the in-flight flag, leaving plan and flag for the next edge.
    pub fn apply(
        &mut self,
        outcome: RerouteOutcome,
        projector: &mut RouteProjector,
        monitor: &mut OffRouteMonitor,
    ) -> Result<RerouteApplied, TrackingError> {
        if self.in_flight == Some(outcome.session_id) {
            self.in_flight = None;
        }

        if outcome.generation != projector.generation() {
            debug!(
                generation = outcome.generation,
                current = projector.generation(),
                "Dropping reroute result for superseded plan"
            );
            return Ok(RerouteApplied::Stale);
        }

        let plan = match outcome.result.and_then(|r| r.into_plan(&outcome.waypoints)) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "Reroute failed, keeping previous route");
                return Err(e.into());
            }
        };

        let applied = RerouteApplied::Replaced {
            points: plan.len(),
            distance_m: plan.planned_distance_m(),
        };
        info!(
            points = plan.len(),
            distance = plan.planned_distance_m(),
            "Route replaced"
        );
        projector.replace(plan);
        monitor.reset();
        Ok(applied)
    }
}
