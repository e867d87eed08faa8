// Route plans and progress projection
//
// The projector only ever scans forward from its cursor, so progress cannot
// jump backwards on routes that loop or cross themselves.

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::geodesy;

/// A point on a planned route
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl RoutePoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        RoutePoint { latitude, longitude }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

impl From<(f64, f64)> for RoutePoint {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        RoutePoint { latitude, longitude }
    }
}

/// An immutable planned route. Replaced wholesale on reroute.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePlan {
    points: Vec<RoutePoint>,
    /// Indices into `points` of intermediate waypoints the runner must pass
    via: Vec<usize>,
    planned_distance_m: f64,
    planned_duration_s: Option<f64>,
    /// remaining_from[i] = path length from point i to the last point
    remaining_from: Vec<f64>,
}

impl RoutePlan {
    /// Build a plan from its points. Planned distance is the polyline length.
    pub fn new(points: Vec<RoutePoint>) -> Result<Self, RoutingError> {
        if points.is_empty() {
            return Err(RoutingError::Empty);
        }
        let mut remaining_from = vec![0.0; points.len()];
        for i in (0..points.len() - 1).rev() {
            let (a, b) = (&points[i], &points[i + 1]);
            remaining_from[i] = remaining_from[i + 1]
                + geodesy::greatcircle(a.latitude, a.longitude, b.latitude, b.longitude);
        }
        Ok(RoutePlan {
            planned_distance_m: remaining_from[0],
            points,
            via: Vec::new(),
            planned_duration_s: None,
            remaining_from,
        })
    }

    /// Override the planned distance (e.g. as reported by the routing provider)
    pub fn with_planned_distance(mut self, distance_m: f64) -> Self {
        if distance_m.is_finite() && distance_m > 0.0 {
            self.planned_distance_m = distance_m;
        }
        self
    }

    pub fn with_planned_duration(mut self, duration_s: f64) -> Self {
        if duration_s.is_finite() && duration_s > 0.0 {
            self.planned_duration_s = Some(duration_s);
        }
        self
    }

    /// Mark intermediate waypoints by index; out-of-range indices are ignored
    pub fn with_via(mut self, mut via: Vec<usize>) -> Self {
        via.retain(|&i| i < self.points.len());
        via.sort_unstable();
        via.dedup();
        self.via = via;
        self
    }

    pub fn points(&self) -> &[RoutePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn destination(&self) -> RoutePoint {
        // Non-empty by construction
        self.points[self.points.len() - 1]
    }

    pub fn planned_distance_m(&self) -> f64 {
        self.planned_distance_m
    }

    pub fn planned_duration_s(&self) -> Option<f64> {
        self.planned_duration_s
    }

    /// Planned average pace in s/m
    pub fn planned_pace(&self) -> Option<f64> {
        match self.planned_duration_s {
            Some(d) if self.planned_distance_m > 0.0 => Some(d / self.planned_distance_m),
            _ => None,
        }
    }

    /// Intermediate waypoints strictly ahead of `index`
    pub fn via_after(&self, index: usize) -> Vec<RoutePoint> {
        self.via
            .iter()
            .filter(|&&i| i > index)
            .map(|&i| self.points[i])
            .collect()
    }

    /// Sum of segment lengths from `index` to the last point
    pub fn remaining_from(&self, index: usize) -> f64 {
        self.remaining_from.get(index).copied().unwrap_or(0.0)
    }
}

/// Result of projecting a position onto the active plan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Cursor after this update
    pub waypoint_index: usize,
    /// Distance from the position to the route near the cursor (m)
    pub distance_to_route_m: f64,
    /// Route distance left from the cursor to the destination (m)
    pub remaining_m: f64,
}

/// Tracks progress along a plan
#[derive(Debug, Clone)]
pub struct RouteProjector {
    plan: RoutePlan,
    index: usize,
    /// Bumped every time the plan is replaced
    generation: u64,
    last: Option<Projection>,
}

impl RouteProjector {
    pub fn new(plan: RoutePlan) -> Self {
        RouteProjector {
            plan,
            index: 0,
            generation: 0,
            last: None,
        }
    }

    pub fn plan(&self) -> &RoutePlan {
        &self.plan
    }

    pub fn waypoint_index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_projection(&self) -> Option<Projection> {
        self.last
    }

    pub fn remaining_m(&self) -> f64 {
        self.plan.remaining_from(self.index)
    }

    /// Swap in a new plan and reset the cursor to its start
    pub fn replace(&mut self, plan: RoutePlan) {
        self.plan = plan;
        self.index = 0;
        self.generation += 1;
        self.last = None;
    }

    /// Project a position onto the plan, advancing the cursor if a closer point lies ahead
    pub fn update(&mut self, position: (f64, f64)) -> Projection {
        let points = self.plan.points();

        let mut best = self.index;
        let mut best_dist = f64::INFINITY;
        for (i, p) in points.iter().enumerate().skip(self.index) {
            let d = geodesy::greatcircle(position.0, position.1, p.latitude, p.longitude);
            // Strict less-than keeps the earliest match on ties
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        self.index = best;

        // Perpendicular distance to the segments either side of the match
        let mut deviation = best_dist;
        if best > 0 {
            let d = geodesy::segment_distance(
                position,
                points[best - 1].position(),
                points[best].position(),
            );
            deviation = deviation.min(d);
        }
        if best + 1 < points.len() {
            let d = geodesy::segment_distance(
                position,
                points[best].position(),
                points[best + 1].position(),
            );
            deviation = deviation.min(d);
        }

        let projection = Projection {
            waypoint_index: best,
            distance_to_route_m: deviation,
            remaining_m: self.plan.remaining_from(best),
        };
        self.last = Some(projection);
        projection
    }

    /// Estimated seconds to the destination.
    ///
    /// Uses the observed pace once `covered_m >= min_pace_distance_m`, otherwise the
    /// plan's average pace, otherwise `fallback_pace`.
    pub fn estimate_remaining_time(
        &self,
        covered_m: f64,
        observed_pace: Option<f64>,
        min_pace_distance_m: f64,
        fallback_pace: f64,
    ) -> f64 {
        let pace = match observed_pace {
            Some(p) if covered_m >= min_pace_distance_m && p.is_finite() => p,
            _ => self.plan.planned_pace().unwrap_or(fallback_pace),
        };
        self.remaining_m() * pace
    }
}
