// Off-route detection
//
// Edge-triggered: a reroute is requested only on the transition from
// on-route to off-route, never while the runner stays off route.

use tracing::{debug, info};

use crate::route::Projection;

/// Outcome of feeding one projection to the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteCheck {
    OnRoute,
    /// Just crossed the threshold; a reroute should be requested
    LeftRoute,
    /// Still beyond the threshold; already reported
    StillOff,
    /// Back within the threshold
    Rejoined,
}

#[derive(Debug, Clone)]
pub struct OffRouteMonitor {
    threshold_m: f64,
    off_route: bool,
}

impl OffRouteMonitor {
    pub fn new(threshold_m: f64) -> Self {
        OffRouteMonitor {
            threshold_m,
            off_route: false,
        }
    }

    pub fn threshold_m(&self) -> f64 {
        self.threshold_m
    }

    pub fn is_off_route(&self) -> bool {
        self.off_route
    }

    /// Clear the flag without reporting (after a successful reroute)
    pub fn reset(&mut self) {
        self.off_route = false;
    }

    pub fn check(&mut self, projection: &Projection) -> RouteCheck {
        let beyond = projection.distance_to_route_m > self.threshold_m;
        match (self.off_route, beyond) {
            (false, true) => {
                self.off_route = true;
                info!(
                    distance = projection.distance_to_route_m,
                    threshold = self.threshold_m,
                    "Runner left the route"
                );
                RouteCheck::LeftRoute
            }
            (true, true) => RouteCheck::StillOff,
            (true, false) => {
                self.off_route = false;
                debug!(distance = projection.distance_to_route_m, "Runner back on route");
                RouteCheck::Rejoined
            }
            (false, false) => RouteCheck::OnRoute,
        }
    }
}
