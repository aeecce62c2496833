#![forbid(unsafe_code)]

use tracing::debug;
use wayguide_kernel_contracts::route::Route;
use wayguide_kernel_contracts::{GeoPoint, MonotonicTimeNs, ReasonCodeId};

use crate::geometry::{distance_to_step_waypoint, haversine_m};

pub mod reason_codes {
    use wayguide_kernel_contracts::ReasonCodeId;

    // Progress tracker reason-code namespace ("PG").
    pub const PROGRESS_NOT_DUE: ReasonCodeId = ReasonCodeId(0x5047_0001);
    pub const PROGRESS_NO_LOCATION: ReasonCodeId = ReasonCodeId(0x5047_0002);
    pub const PROGRESS_NO_WAYPOINT: ReasonCodeId = ReasonCodeId(0x5047_0003);
    pub const PROGRESS_STATIONARY: ReasonCodeId = ReasonCodeId(0x5047_0004);
    pub const PROGRESS_TRACKING: ReasonCodeId = ReasonCodeId(0x5047_0005);
    pub const PROGRESS_CONFIRMING: ReasonCodeId = ReasonCodeId(0x5047_0006);
    pub const PROGRESS_DEFERRED: ReasonCodeId = ReasonCodeId(0x5047_0007);
    pub const PROGRESS_ARRIVED: ReasonCodeId = ReasonCodeId(0x5047_0008);

    pub const REROUTE_NOT_MOVED: ReasonCodeId = ReasonCodeId(0x5047_0101);
    pub const REROUTE_ON_ROUTE: ReasonCodeId = ReasonCodeId(0x5047_0102);
    pub const REROUTE_OFF_ROUTE: ReasonCodeId = ReasonCodeId(0x5047_0103);
}

/// Distances this close to the approach delta still count; absorbs float noise in haversine.
const APPROACH_EPSILON_M: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressConfig {
    pub arrival_threshold_m: f64,
    pub hysteresis_margin_m: f64,
    pub approach_delta_m: f64,
    pub required_confirmations: u8,
    pub movement_threshold_m: f64,
    pub movement_recency_ms: u64,
    pub min_instruction_interval_ms: u64,
    pub arrival_check_interval_ms: u64,
    pub reroute_check_interval_ms: u64,
    pub reroute_movement_m: f64,
    pub off_route_m: f64,
}

impl ProgressConfig {
    pub fn mvp_v1() -> Self {
        Self {
            arrival_threshold_m: 25.0,
            hysteresis_margin_m: 15.0,
            approach_delta_m: 2.0,
            required_confirmations: 2,
            movement_threshold_m: 3.0,
            movement_recency_ms: 6_000,
            min_instruction_interval_ms: 8_000,
            arrival_check_interval_ms: 2_000,
            reroute_check_interval_ms: 10_000,
            reroute_movement_m: 8.0,
            off_route_m: 100.0,
        }
    }

    pub fn far_distance_m(&self) -> f64 {
        self.arrival_threshold_m + self.hysteresis_margin_m
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArrivalDecision {
    NotDue,
    NoLocation,
    NoWaypoint,
    /// Movement gate closed; arrival is not evaluated on a stationary fix.
    Stationary,
    Tracking { distance_m: f64 },
    Confirming { distance_m: f64, confirmations: u8 },
    /// Arrival confirmed but the last instruction is too recent; kept pending.
    Deferred { wait_ms: u64 },
    Arrived { distance_m: Option<f64> },
}

impl ArrivalDecision {
    pub fn reason_code(&self) -> ReasonCodeId {
        match self {
            ArrivalDecision::NotDue => reason_codes::PROGRESS_NOT_DUE,
            ArrivalDecision::NoLocation => reason_codes::PROGRESS_NO_LOCATION,
            ArrivalDecision::NoWaypoint => reason_codes::PROGRESS_NO_WAYPOINT,
            ArrivalDecision::Stationary => reason_codes::PROGRESS_STATIONARY,
            ArrivalDecision::Tracking { .. } => reason_codes::PROGRESS_TRACKING,
            ArrivalDecision::Confirming { .. } => reason_codes::PROGRESS_CONFIRMING,
            ArrivalDecision::Deferred { .. } => reason_codes::PROGRESS_DEFERRED,
            ArrivalDecision::Arrived { .. } => reason_codes::PROGRESS_ARRIVED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RerouteDecision {
    NotDue,
    NoLocation,
    NoWaypoint,
    NotMoved,
    OnRoute { distance_m: f64 },
    OffRoute { distance_m: f64 },
}

impl RerouteDecision {
    pub fn reason_code(&self) -> ReasonCodeId {
        match self {
            RerouteDecision::NotDue => reason_codes::PROGRESS_NOT_DUE,
            RerouteDecision::NoLocation => reason_codes::PROGRESS_NO_LOCATION,
            RerouteDecision::NoWaypoint => reason_codes::PROGRESS_NO_WAYPOINT,
            RerouteDecision::NotMoved => reason_codes::REROUTE_NOT_MOVED,
            RerouteDecision::OnRoute { .. } => reason_codes::REROUTE_ON_ROUTE,
            RerouteDecision::OffRoute { .. } => reason_codes::REROUTE_OFF_ROUTE,
        }
    }
}

/// Arrival and off-route bookkeeping for one navigation session.
///
/// Holds no route of its own: every evaluation takes the session's current route and step so a
/// reroute can never leave the tracker looking at stale geometry.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    config: ProgressConfig,
    arrival_confirmations: u8,
    last_distance_m: Option<f64>,
    far_armed: bool,
    pending_arrival: bool,
    movement_anchor: Option<GeoPoint>,
    last_movement_at: Option<MonotonicTimeNs>,
    reroute_anchor: Option<GeoPoint>,
    last_arrival_check_at: Option<MonotonicTimeNs>,
    last_reroute_check_at: Option<MonotonicTimeNs>,
}

impl ProgressTracker {
    pub fn new(config: ProgressConfig) -> Self {
        Self {
            config,
            arrival_confirmations: 0,
            last_distance_m: None,
            far_armed: false,
            pending_arrival: false,
            movement_anchor: None,
            last_movement_at: None,
            reroute_anchor: None,
            last_arrival_check_at: None,
            last_reroute_check_at: None,
        }
    }

    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    pub fn arrival_confirmations(&self) -> u8 {
        self.arrival_confirmations
    }

    pub fn last_distance_m(&self) -> Option<f64> {
        self.last_distance_m
    }

    pub fn last_movement_at(&self) -> Option<MonotonicTimeNs> {
        self.last_movement_at
    }

    pub fn has_pending_arrival(&self) -> bool {
        self.pending_arrival
    }

    /// Feeds every accepted fix. The first fix only sets the anchor; later fixes count as movement
    /// once they are at least the movement threshold away from it.
    pub fn observe_location(&mut self, at: GeoPoint, now: MonotonicTimeNs) {
        match self.movement_anchor {
            None => self.movement_anchor = Some(at),
            Some(anchor) => {
                if haversine_m(anchor, at) >= self.config.movement_threshold_m {
                    self.movement_anchor = Some(at);
                    self.last_movement_at = Some(now);
                }
            }
        }
    }

    /// Called when a route is (re)started: clears waypoint bookkeeping and sets the check clocks
    /// and reroute baseline so the first evaluations happen one interval later.
    pub fn begin_route(&mut self, location: Option<GeoPoint>, now: MonotonicTimeNs) {
        self.reset_for_new_step();
        self.reroute_anchor = location;
        self.last_arrival_check_at = Some(now);
        self.last_reroute_check_at = Some(now);
    }

    /// Re-arms the hysteresis test for the next waypoint.
    pub fn reset_for_new_step(&mut self) {
        self.arrival_confirmations = 0;
        self.last_distance_m = None;
        self.far_armed = false;
        self.pending_arrival = false;
    }

    pub fn evaluate_arrival(
        &mut self,
        route: &Route,
        step_index: usize,
        location: Option<GeoPoint>,
        last_instruction_at: Option<MonotonicTimeNs>,
        now: MonotonicTimeNs,
    ) -> ArrivalDecision {
        if let Some(last) = self.last_arrival_check_at {
            if now.elapsed_ms_since(last) < self.config.arrival_check_interval_ms {
                return ArrivalDecision::NotDue;
            }
        }
        self.last_arrival_check_at = Some(now);

        let Some(location) = location else {
            return ArrivalDecision::NoLocation;
        };

        // Confirmed under the movement gate; only spacing holds it back now.
        if self.pending_arrival {
            return match self.spacing_wait_ms(last_instruction_at, now) {
                0 => {
                    self.pending_arrival = false;
                    ArrivalDecision::Arrived {
                        distance_m: distance_to_step_waypoint(route, step_index, location),
                    }
                }
                wait_ms => ArrivalDecision::Deferred { wait_ms },
            };
        }

        let moved_recently = self
            .last_movement_at
            .map(|t| now.elapsed_ms_since(t) <= self.config.movement_recency_ms)
            .unwrap_or(false);
        if !moved_recently {
            return ArrivalDecision::Stationary;
        }

        let Some(distance_m) = distance_to_step_waypoint(route, step_index, location) else {
            return ArrivalDecision::NoWaypoint;
        };

        let previous = self.last_distance_m;
        if previous.map_or(true, |p| p > self.config.far_distance_m()) {
            self.far_armed = true;
        }
        let within = distance_m <= self.config.arrival_threshold_m;
        // A fix already on the waypoint has nothing left to close.
        let on_waypoint = distance_m <= self.config.approach_delta_m;
        let approaching = on_waypoint
            || previous.map_or(true, |p| {
                p - distance_m >= self.config.approach_delta_m - APPROACH_EPSILON_M
            });
        self.last_distance_m = Some(distance_m);

        if !(self.far_armed && within && approaching) {
            if self.arrival_confirmations > 0 {
                debug!(
                    step_index,
                    distance_m,
                    was = self.arrival_confirmations,
                    "arrival confirmations reset"
                );
            }
            self.arrival_confirmations = 0;
            return ArrivalDecision::Tracking { distance_m };
        }

        self.arrival_confirmations = self.arrival_confirmations.saturating_add(1);
        debug!(
            step_index,
            distance_m,
            confirmations = self.arrival_confirmations,
            required = self.config.required_confirmations,
            "arrival confirmation"
        );
        if self.arrival_confirmations < self.config.required_confirmations {
            return ArrivalDecision::Confirming {
                distance_m,
                confirmations: self.arrival_confirmations,
            };
        }

        match self.spacing_wait_ms(last_instruction_at, now) {
            0 => ArrivalDecision::Arrived {
                distance_m: Some(distance_m),
            },
            wait_ms => {
                self.pending_arrival = true;
                ArrivalDecision::Deferred { wait_ms }
            }
        }
    }

    pub fn evaluate_reroute(
        &mut self,
        route: &Route,
        step_index: usize,
        location: Option<GeoPoint>,
        now: MonotonicTimeNs,
    ) -> RerouteDecision {
        if let Some(last) = self.last_reroute_check_at {
            if now.elapsed_ms_since(last) < self.config.reroute_check_interval_ms {
                return RerouteDecision::NotDue;
            }
        }
        self.last_reroute_check_at = Some(now);

        let Some(location) = location else {
            return RerouteDecision::NoLocation;
        };
        match self.reroute_anchor {
            None => {
                self.reroute_anchor = Some(location);
                return RerouteDecision::NotMoved;
            }
            Some(anchor) => {
                if haversine_m(anchor, location) < self.config.reroute_movement_m {
                    return RerouteDecision::NotMoved;
                }
                self.reroute_anchor = Some(location);
            }
        }

        match distance_to_step_waypoint(route, step_index, location) {
            None => RerouteDecision::NoWaypoint,
            Some(distance_m) if distance_m > self.config.off_route_m => {
                RerouteDecision::OffRoute { distance_m }
            }
            Some(distance_m) => RerouteDecision::OnRoute { distance_m },
        }
    }

    /// Milliseconds still to wait before another instruction may be announced; zero when clear.
    pub fn spacing_wait_ms(
        &self,
        last_instruction_at: Option<MonotonicTimeNs>,
        now: MonotonicTimeNs,
    ) -> u64 {
        match last_instruction_at {
            None => 0,
            Some(last) => self
                .config
                .min_instruction_interval_ms
                .saturating_sub(now.elapsed_ms_since(last)),
        }
    }
}
