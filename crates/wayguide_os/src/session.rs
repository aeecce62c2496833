#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};
use wayguide_engines::geometry::{bearing_deg, step_toward, waypoint_for_step};
use wayguide_engines::guidance::{FusionConfig, GuidanceFusion};
use wayguide_engines::narration::{route_progress, route_summary, NavDirection, RouteProgress};
use wayguide_engines::progress::{ArrivalDecision, ProgressConfig, ProgressTracker, RerouteDecision};
use wayguide_engines::providers::{
    Announcement, BufferedSpeechSink, PlaceProvider, RoutingProvider, SpeechPriority,
    SpeechProvider, VisionContext, VisionFrame, VisionProvider,
};
use wayguide_engines::response_cache::{
    obstacle_signature, ResponseCache, ResponseCacheConfig, ResponseKey,
};
use wayguide_engines::route_cache::{RouteCache, RouteCacheConfig};
use wayguide_engines::throttle::{LastSpoken, SpeechThrottle, SpeechThrottleConfig};
use wayguide_engines::ttl_cache::CacheStats;
use wayguide_kernel_contracts::places::PlaceCandidate;
use wayguide_kernel_contracts::route::{Route, RoutingMode};
use wayguide_kernel_contracts::session::{Destination, NavigationPhase, SessionId};
use wayguide_kernel_contracts::vision::{SteerHeading, VisionAnalysis};
use wayguide_kernel_contracts::{GeoPoint, MonotonicTimeNs};

use crate::clock::Clock;
use crate::error::NavigationError;
use crate::monitor::{MonitorHandle, TickOutcome};

const START_FAILED: &str = "Unable to calculate route. Please try again.";
const REROUTE_FAILED: &str = "Unable to calculate new route. Continuing with original route.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub progress: ProgressConfig,
    pub fusion: FusionConfig,
    pub throttle: SpeechThrottleConfig,
    pub monitor_interval_ms: u64,
    /// When false no monitor thread is spawned and the owner drives [`NavigationSession::tick`].
    pub monitor_enabled: bool,
    pub stop_wait_ms: u64,
    pub simulation_speed_mps: f64,
    /// Vision guidance older than this is no longer folded into the unified instruction.
    pub vision_fresh_ms: u64,
    pub announcement_capacity: usize,
}

impl SessionConfig {
    pub fn mvp_v1() -> Self {
        Self {
            progress: ProgressConfig::mvp_v1(),
            fusion: FusionConfig::mvp_v1(),
            throttle: SpeechThrottleConfig::mvp_v1(),
            monitor_interval_ms: 2_000,
            monitor_enabled: true,
            stop_wait_ms: 2_000,
            simulation_speed_mps: 5.0,
            vision_fresh_ms: 5_000,
            announcement_capacity: 32,
        }
    }
}

/// Collaborators and process-wide caches shared by every session.
pub struct NavigationServices {
    pub routing: Arc<dyn RoutingProvider>,
    pub places: Arc<dyn PlaceProvider>,
    pub vision: Option<Arc<dyn VisionProvider>>,
    /// Optional outward speech engine; every line is also kept in the session's own log.
    pub speech: Option<Arc<dyn SpeechProvider>>,
    pub route_cache: RouteCache,
    pub response_cache: ResponseCache<UnifiedInstruction>,
    pub clock: Arc<dyn Clock>,
}

impl NavigationServices {
    pub fn new(
        routing: Arc<dyn RoutingProvider>,
        places: Arc<dyn PlaceProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            routing,
            places,
            vision: None,
            speech: None,
            route_cache: RouteCache::new(RouteCacheConfig::mvp_v1()),
            response_cache: ResponseCache::new(ResponseCacheConfig::mvp_v1()),
            clock,
        }
    }

    pub fn with_vision(mut self, vision: Arc<dyn VisionProvider>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechProvider>) -> Self {
        self.speech = Some(speech);
        self
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LocationUpdate {
    pub location: GeoPoint,
    pub is_navigating: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StartOutcome {
    pub destination: String,
    pub summary: String,
    pub total_steps: usize,
    pub first_instruction: Option<String>,
    pub engine_tag: String,
    pub from_cache: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StopOutcome {
    /// False when the monitor was still inside a blocking call after the wait and was detached.
    pub monitor_exited: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct InstructionView {
    pub step_index: usize,
    pub total_steps: usize,
    pub text: String,
    pub speech_text: String,
    pub distance_m: f64,
    pub maneuver_type: String,
    pub maneuver_modifier: Option<String>,
    pub road_name: Option<String>,
    pub distance_to_waypoint_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct NavigationStatus {
    pub session_id: String,
    pub phase: NavigationPhase,
    pub is_navigating: bool,
    pub routing_mode: RoutingMode,
    pub has_location: bool,
    pub location: Option<GeoPoint>,
    pub destination: Option<String>,
    pub step_index: usize,
    pub total_steps: usize,
    pub current_instruction: Option<InstructionView>,
    pub bearing_to_waypoint_deg: Option<f64>,
    pub arrival_confirmations: u8,
    pub last_distance_m: Option<f64>,
    pub progress: Option<RouteProgress>,
    pub last_announced: Option<String>,
    pub simulation_enabled: bool,
    pub vision_enabled: bool,
    pub route_cache: CacheStats,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RouteView {
    pub route: Arc<Route>,
    pub summary: String,
    pub step_index: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AdvanceOutcome {
    pub step_index: usize,
    pub destination_reached: bool,
    pub instruction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RerouteOutcome {
    /// False when navigation changed while the route was being computed; the result was dropped.
    pub applied: bool,
    pub summary: Option<String>,
    pub total_steps: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct VisionGuidance {
    pub narration: String,
    pub hazards: Vec<String>,
    pub suggested_heading: SteerHeading,
    pub steps_remaining: u32,
    pub nav_direction: NavDirection,
    pub provider: String,
    pub step_index: Option<usize>,
    /// Whether the throttle let this narration out to speech.
    pub spoken: bool,
    pub at: MonotonicTimeNs,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct VisionStatus {
    pub enabled: bool,
    pub provider: Option<String>,
    pub last_guidance: Option<VisionGuidance>,
    pub last_spoken: Option<LastSpoken>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionSource {
    Route,
    Vision,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct UnifiedInstruction {
    pub narration: String,
    pub source: InstructionSource,
    pub step_index: Option<usize>,
    pub hazards: Vec<String>,
    pub obstacle_signature: String,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Utterance {
    text: String,
    priority: SpeechPriority,
}

impl Utterance {
    fn high(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            priority: SpeechPriority::High,
        }
    }

    fn normal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            priority: SpeechPriority::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RerouteTrigger {
    Automatic,
    Manual,
}

#[derive(Debug, Clone, Copy)]
struct RerouteRequest {
    from: GeoPoint,
    to: GeoPoint,
    mode: RoutingMode,
    generation: u64,
}

#[derive(Debug, Default)]
struct VisionState {
    enabled: bool,
    last_guidance: Option<VisionGuidance>,
    last_spoken: Option<LastSpoken>,
}

#[derive(Debug)]
struct SessionState {
    tracker: ProgressTracker,
    location: Option<GeoPoint>,
    route: Option<Arc<Route>>,
    step_index: usize,
    is_navigating: bool,
    phase: NavigationPhase,
    routing_mode: RoutingMode,
    destination: Option<Destination>,
    last_announced: Option<String>,
    last_instruction_at: Option<MonotonicTimeNs>,
    simulation_enabled: bool,
    last_simulation_at: Option<MonotonicTimeNs>,
    /// Bumped whenever the route is replaced or cleared; stale reroute results are dropped.
    route_generation: u64,
    vision: VisionState,
}

impl SessionState {
    fn new(config: &SessionConfig) -> Self {
        Self {
            tracker: ProgressTracker::new(config.progress),
            location: None,
            route: None,
            step_index: 0,
            is_navigating: false,
            phase: NavigationPhase::NoRoute,
            routing_mode: RoutingMode::default(),
            destination: None,
            last_announced: None,
            last_instruction_at: None,
            simulation_enabled: false,
            last_simulation_at: None,
            route_generation: 0,
            vision: VisionState::default(),
        }
    }

    fn current_instruction_view(&self) -> Option<InstructionView> {
        let route = self.route.as_ref()?;
        let i = route.instruction(self.step_index)?;
        Some(InstructionView {
            step_index: self.step_index,
            total_steps: route.step_count(),
            text: i.text.clone(),
            speech_text: i.spoken().to_string(),
            distance_m: i.distance_m,
            maneuver_type: i.maneuver_type.clone(),
            maneuver_modifier: i.maneuver_modifier.clone(),
            road_name: i.road_name.clone(),
            distance_to_waypoint_m: self.location.and_then(|at| {
                wayguide_engines::geometry::distance_to_step_waypoint(route, self.step_index, at)
            }),
        })
    }

    fn step_signature(&self) -> String {
        match self.current_instruction_view() {
            Some(v) if self.is_navigating => format!("{}:{}", v.step_index, v.speech_text),
            _ => String::new(),
        }
    }

    /// Marks the current instruction as announced unless it was the last thing announced.
    fn take_announcement(&mut self, now: MonotonicTimeNs) -> Option<Utterance> {
        let route = self.route.as_ref()?;
        let text = route.instruction(self.step_index)?.spoken().to_string();
        if self.last_announced.as_deref() == Some(text.as_str()) {
            return None;
        }
        self.last_announced = Some(text.clone());
        self.last_instruction_at = Some(now);
        Some(Utterance::high(text))
    }

    fn install_route(&mut self, route: Arc<Route>, now: MonotonicTimeNs) {
        self.route = Some(route);
        self.step_index = 0;
        self.last_announced = None;
        self.tracker.begin_route(self.location, now);
        self.route_generation += 1;
    }
}

/// One user's navigation: location, route, progress and vision state behind a single lock, plus
/// the monitor thread that drives arrival and reroute checks.
pub struct NavigationSession {
    session_id: SessionId,
    config: SessionConfig,
    services: Arc<NavigationServices>,
    fusion: GuidanceFusion,
    throttle: SpeechThrottle,
    announcements: BufferedSpeechSink,
    state: Mutex<SessionState>,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl NavigationSession {
    pub fn new(session_id: SessionId, config: SessionConfig, services: Arc<NavigationServices>) -> Self {
        Self {
            fusion: GuidanceFusion::new(config.fusion),
            throttle: SpeechThrottle::new(config.throttle),
            announcements: BufferedSpeechSink::new(config.announcement_capacity),
            state: Mutex::new(SessionState::new(&config)),
            monitor: Mutex::new(None),
            session_id,
            config,
            services,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    fn now(&self) -> MonotonicTimeNs {
        self.services.clock.now()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(session_id = %self.session_id, "session state lock poisoned; recovering");
                self.state.clear_poison();
                poisoned.into_inner()
            }
        }
    }

    fn monitor_slot(&self) -> MutexGuard<'_, Option<MonitorHandle>> {
        match self.monitor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                self.monitor.clear_poison();
                poisoned.into_inner()
            }
        }
    }

    fn say(&self, lines: Vec<Utterance>) {
        for line in lines {
            let _ = self.announcements.speak(&line.text, line.priority);
            if let Some(speech) = &self.services.speech {
                if let Err(e) = speech.speak(&line.text, line.priority) {
                    warn!(session_id = %self.session_id, error = %e, "speech provider failed");
                }
            }
        }
    }

    pub fn set_location(&self, lat: f64, lng: f64) -> Result<LocationUpdate, NavigationError> {
        let location = GeoPoint::v1(lat, lng)?;
        let now = self.now();
        let mut st = self.lock();
        st.location = Some(location);
        st.tracker.observe_location(location, now);
        Ok(LocationUpdate {
            location,
            is_navigating: st.is_navigating,
        })
    }

    /// Routes from the current location to `destination` and begins guidance.
    pub fn start(self: &Arc<Self>, destination: Destination) -> Result<StartOutcome, NavigationError> {
        let (from, mode) = {
            let st = self.lock();
            let from = st.location.ok_or_else(|| {
                NavigationError::NoLocation("Current location not available for navigation.".to_string())
            })?;
            (from, st.routing_mode)
        };
        let (route, from_cache) = match self.route_for(from, destination.location, mode, true) {
            Ok(found) => found,
            Err(e) => {
                self.say(vec![Utterance::normal(START_FAILED)]);
                return Err(e.with_message(START_FAILED));
            }
        };

        let now = self.now();
        let label = destination.label();
        let summary = route_summary(&route);
        let mut lines = vec![
            Utterance::normal(format!("Starting navigation to {label}.")),
            Utterance::normal(summary.clone()),
        ];
        let first_instruction = {
            let mut st = self.lock();
            st.destination = Some(destination);
            st.is_navigating = true;
            st.phase = NavigationPhase::Navigating;
            st.simulation_enabled = false;
            st.last_simulation_at = None;
            st.install_route(route.clone(), now);
            st.take_announcement(now).map(|u| {
                let text = u.text.clone();
                lines.push(u);
                text
            })
        };
        self.services
            .response_cache
            .invalidate_session(self.session_id.as_str());
        info!(
            session_id = %self.session_id,
            mode = mode.as_str(),
            steps = route.step_count(),
            from_cache,
            "navigation started"
        );
        self.say(lines);
        if self.config.monitor_enabled {
            self.restart_monitor()?;
        }
        Ok(StartOutcome {
            destination: label,
            summary,
            total_steps: route.step_count(),
            first_instruction,
            engine_tag: route.engine_tag.as_str().to_string(),
            from_cache,
        })
    }

    fn restart_monitor(self: &Arc<Self>) -> Result<(), NavigationError> {
        let previous = self.monitor_slot().take();
        if let Some(handle) = previous {
            handle.stop_and_wait(self.config.stop_wait_ms);
        }
        let handle = MonitorHandle::spawn(
            Arc::downgrade(self),
            self.session_id.as_str(),
            self.config.monitor_interval_ms,
        )?;
        let raced = self.monitor_slot().replace(handle);
        if let Some(handle) = raced {
            handle.stop_and_wait(self.config.stop_wait_ms);
        }
        Ok(())
    }

    pub fn monitor_running(&self) -> bool {
        self.monitor_slot()
            .as_ref()
            .map_or(false, |h| !h.is_finished())
    }

    /// Cache-aware route computation. Never called with the session lock held.
    fn route_for(
        &self,
        from: GeoPoint,
        to: GeoPoint,
        mode: RoutingMode,
        use_cache: bool,
    ) -> Result<(Arc<Route>, bool), NavigationError> {
        let engine = self.services.routing.engine_tag();
        if use_cache {
            if let Some(route) = self
                .services
                .route_cache
                .get(from, to, mode, &engine, self.now())
            {
                debug!(session_id = %self.session_id, "route cache hit");
                return Ok((Arc::new(route), true));
            }
        }
        let route = self
            .services
            .routing
            .compute_route(from, to, mode)
            .map_err(|e| {
                warn!(session_id = %self.session_id, error = %e, timeout = e.is_timeout(), "route computation failed");
                NavigationError::RoutingUnavailable(e.to_string())
            })?;
        if route.instructions.is_empty() {
            error!(session_id = %self.session_id, "routing provider returned a route with no instructions");
            return Err(NavigationError::NoRoute(
                "The route has no instructions.".to_string(),
            ));
        }
        self.services
            .route_cache
            .set(from, to, mode, route.clone(), self.now());
        Ok((Arc::new(route), false))
    }

    pub fn stop(&self) -> Result<StopOutcome, NavigationError> {
        let was_navigating = {
            let mut st = self.lock();
            let was = st.is_navigating;
            st.is_navigating = false;
            st.phase = NavigationPhase::NoRoute;
            st.route = None;
            st.step_index = 0;
            st.destination = None;
            st.last_announced = None;
            st.last_instruction_at = None;
            st.simulation_enabled = false;
            st.last_simulation_at = None;
            st.route_generation += 1;
            st.tracker.reset_for_new_step();
            was
        };
        let handle = self.monitor_slot().take();
        let monitor_exited = match handle {
            Some(h) => h.stop_and_wait(self.config.stop_wait_ms),
            None => true,
        };
        self.services
            .response_cache
            .invalidate_session(self.session_id.as_str());
        if !was_navigating {
            return Err(NavigationError::NoActiveNavigation(
                "No active navigation to stop.".to_string(),
            ));
        }
        info!(session_id = %self.session_id, monitor_exited, "navigation stopped");
        self.say(vec![Utterance::normal(
            "Navigation stopped. Ready for new destination.",
        )]);
        Ok(StopOutcome { monitor_exited })
    }

    /// One monitor iteration: simulation, arrival, then the slower reroute check.
    pub fn tick(&self) -> TickOutcome {
        let now = self.now();
        let mut lines = Vec::new();
        let mut reroute = None;
        let outcome = {
            let mut st = self.lock();
            if !st.is_navigating {
                return TickOutcome::Finished;
            }
            let Some(route) = st.route.clone().filter(|r| r.step_count() > 0) else {
                error!(session_id = %self.session_id, "navigating without a usable route; ending navigation");
                st.is_navigating = false;
                st.phase = NavigationPhase::NoRoute;
                return TickOutcome::Finished;
            };
            if st.simulation_enabled {
                self.simulate(&mut st, &route, now);
            }
            if let Some(line) = st.take_announcement(now) {
                lines.push(line);
            }

            let (step_index, location, last_at) = (st.step_index, st.location, st.last_instruction_at);
            match st
                .tracker
                .evaluate_arrival(&route, step_index, location, last_at, now)
            {
                ArrivalDecision::Arrived { distance_m } => {
                    info!(session_id = %self.session_id, step_index, ?distance_m, "waypoint reached");
                    self.advance_step(&mut st, now, &mut lines);
                }
                ArrivalDecision::Deferred { wait_ms } => {
                    debug!(session_id = %self.session_id, step_index, wait_ms, "arrival deferred by instruction spacing");
                }
                ArrivalDecision::Stationary => {
                    debug!(session_id = %self.session_id, step_index, "no recent movement; arrival not evaluated");
                }
                ArrivalDecision::NoWaypoint => {
                    warn!(session_id = %self.session_id, step_index, "no waypoint for current step");
                }
                _ => {}
            }

            if st.is_navigating {
                let (step_index, location) = (st.step_index, st.location);
                match st.tracker.evaluate_reroute(&route, step_index, location, now) {
                    RerouteDecision::OffRoute { distance_m } => {
                        info!(session_id = %self.session_id, step_index, distance_m, "off route; rerouting");
                        reroute = Self::reroute_request(&st);
                    }
                    RerouteDecision::OnRoute { distance_m } => {
                        debug!(session_id = %self.session_id, step_index, distance_m, "on route");
                    }
                    _ => {}
                }
            }
            if st.is_navigating {
                TickOutcome::Continue
            } else {
                TickOutcome::Finished
            }
        };
        self.say(lines);
        if let Some(request) = reroute {
            if let Err(e) = self.apply_reroute(request, RerouteTrigger::Automatic) {
                warn!(session_id = %self.session_id, error = %e, "automatic reroute failed; keeping route");
            }
        }
        outcome
    }

    fn simulate(&self, st: &mut SessionState, route: &Route, now: MonotonicTimeNs) {
        let previous = st.last_simulation_at.replace(now);
        let (Some(from), Some(previous)) = (st.location, previous) else {
            return;
        };
        let Some((target, _)) = waypoint_for_step(route, st.step_index) else {
            return;
        };
        let step_m = self.config.simulation_speed_mps * now.elapsed_secs_since(previous);
        let next = step_toward(from, target, step_m);
        if next != from {
            st.location = Some(next);
            st.tracker.observe_location(next, now);
            debug!(session_id = %self.session_id, lat = next.lat, lng = next.lng, "simulated fix");
        }
    }

    /// Returns true when the route is exhausted and the destination has been reached.
    fn advance_step(&self, st: &mut SessionState, now: MonotonicTimeNs, lines: &mut Vec<Utterance>) -> bool {
        let total = st.route.as_ref().map_or(0, |r| r.step_count());
        st.step_index += 1;
        if st.step_index >= total {
            st.is_navigating = false;
            st.phase = NavigationPhase::Arrived;
            st.simulation_enabled = false;
            st.tracker.reset_for_new_step();
            let name = st
                .destination
                .as_ref()
                .and_then(|d| d.name.clone())
                .unwrap_or_else(|| "your destination".to_string());
            info!(session_id = %self.session_id, "destination reached");
            lines.push(Utterance::high(format!("You have reached {name}!")));
            return true;
        }
        st.tracker.reset_for_new_step();
        st.last_announced = None;
        info!(session_id = %self.session_id, step_index = st.step_index, total_steps = total, "advanced to next instruction");
        if let Some(line) = st.take_announcement(now) {
            lines.push(line);
        }
        false
    }

    fn reroute_request(st: &SessionState) -> Option<RerouteRequest> {
        Some(RerouteRequest {
            from: st.location?,
            to: st.destination.as_ref()?.location,
            mode: st.routing_mode,
            generation: st.route_generation,
        })
    }

    fn apply_reroute(
        &self,
        request: RerouteRequest,
        trigger: RerouteTrigger,
    ) -> Result<RerouteOutcome, NavigationError> {
        self.say(vec![Utterance::high("Recalculating route...")]);
        let route = match self.route_for(request.from, request.to, request.mode, false) {
            Ok((route, _)) => route,
            Err(e) => {
                if trigger == RerouteTrigger::Manual {
                    self.say(vec![Utterance::normal(REROUTE_FAILED)]);
                }
                return Err(e.with_message(REROUTE_FAILED));
            }
        };

        let now = self.now();
        let mut lines = Vec::new();
        let outcome = {
            let mut st = self.lock();
            if !st.is_navigating || st.route_generation != request.generation {
                info!(session_id = %self.session_id, "navigation changed during reroute; result dropped");
                return Ok(RerouteOutcome {
                    applied: false,
                    summary: None,
                    total_steps: st.route.as_ref().map_or(0, |r| r.step_count()),
                });
            }
            let summary = route_summary(&route);
            let total_steps = route.step_count();
            st.install_route(route, now);
            lines.push(Utterance::normal(format!("New route calculated. {summary}")));
            if let Some(line) = st.take_announcement(now) {
                lines.push(line);
            }
            RerouteOutcome {
                applied: true,
                summary: Some(summary),
                total_steps,
            }
        };
        self.services
            .response_cache
            .invalidate_session(self.session_id.as_str());
        info!(session_id = %self.session_id, ?trigger, steps = outcome.total_steps, "route replaced");
        self.say(lines);
        Ok(outcome)
    }

    pub fn reroute_manually(&self) -> Result<RerouteOutcome, NavigationError> {
        let request = {
            let st = self.lock();
            if !st.is_navigating {
                return Err(NavigationError::NoActiveNavigation(
                    "No active navigation to reroute.".to_string(),
                ));
            }
            if st.destination.is_none() {
                return Err(NavigationError::NoRoute(
                    "No destination set for rerouting.".to_string(),
                ));
            }
            Self::reroute_request(&st).ok_or_else(NavigationError::no_location)?
        };
        self.apply_reroute(request, RerouteTrigger::Manual)
    }

    pub fn advance_manually(&self) -> Result<AdvanceOutcome, NavigationError> {
        let now = self.now();
        let mut lines = Vec::new();
        let outcome = {
            let mut st = self.lock();
            if !st.is_navigating || st.route.is_none() {
                return Err(NavigationError::no_active_navigation());
            }
            let destination_reached = self.advance_step(&mut st, now, &mut lines);
            AdvanceOutcome {
                step_index: st.step_index,
                destination_reached,
                instruction: st.current_instruction_view().map(|v| v.speech_text),
            }
        };
        self.say(lines);
        Ok(outcome)
    }

    pub fn get_status(&self) -> NavigationStatus {
        let st = self.lock();
        let route = st.route.as_deref();
        let bearing_to_waypoint_deg = match (route, st.location) {
            (Some(r), Some(at)) if st.is_navigating => {
                waypoint_for_step(r, st.step_index).map(|(wp, _)| bearing_deg(at, wp))
            }
            _ => None,
        };
        NavigationStatus {
            session_id: self.session_id.to_string(),
            phase: st.phase,
            is_navigating: st.is_navigating,
            routing_mode: st.routing_mode,
            has_location: st.location.is_some(),
            location: st.location,
            destination: st.destination.as_ref().map(Destination::label),
            step_index: st.step_index,
            total_steps: route.map_or(0, Route::step_count),
            current_instruction: if st.is_navigating {
                st.current_instruction_view()
            } else {
                None
            },
            bearing_to_waypoint_deg,
            arrival_confirmations: st.tracker.arrival_confirmations(),
            last_distance_m: st.tracker.last_distance_m(),
            progress: route.map(|r| route_progress(r, st.step_index.min(r.step_count()))),
            last_announced: st.last_announced.clone(),
            simulation_enabled: st.simulation_enabled,
            vision_enabled: st.vision.enabled,
            route_cache: self.services.route_cache.stats(),
        }
    }

    pub fn get_current_instruction(&self) -> Result<InstructionView, NavigationError> {
        let st = self.lock();
        if !st.is_navigating {
            return Err(NavigationError::no_active_navigation());
        }
        st.current_instruction_view().ok_or_else(|| {
            error!(session_id = %self.session_id, step_index = st.step_index, "navigating but no instruction at step");
            NavigationError::no_active_navigation()
        })
    }

    pub fn get_route(&self) -> Result<RouteView, NavigationError> {
        let st = self.lock();
        let route = st
            .route
            .clone()
            .ok_or_else(|| NavigationError::NoRoute("No route available.".to_string()))?;
        Ok(RouteView {
            summary: route_summary(&route),
            step_index: st.step_index,
            route,
        })
    }

    pub fn set_routing_mode(&self, raw: &str) -> Result<RoutingMode, NavigationError> {
        let mode = RoutingMode::parse(raw).ok_or_else(|| {
            NavigationError::InvalidInput(format!(
                "Unknown routing mode '{}'. Use walk or drive.",
                raw.trim()
            ))
        })?;
        self.lock().routing_mode = mode;
        info!(session_id = %self.session_id, mode = mode.as_str(), "routing mode set");
        Ok(mode)
    }

    /// Moves the session's location toward the current waypoint on every monitor tick.
    pub fn set_simulation(&self, enabled: bool) -> Result<bool, NavigationError> {
        let now = self.now();
        let mut st = self.lock();
        if enabled && !st.is_navigating {
            return Err(NavigationError::NoActiveNavigation(
                "No active navigation to simulate.".to_string(),
            ));
        }
        st.simulation_enabled = enabled;
        st.last_simulation_at = enabled.then_some(now);
        Ok(enabled)
    }

    pub fn describe_location(&self) -> Result<String, NavigationError> {
        let at = self.lock().location.ok_or_else(NavigationError::no_location)?;
        let failed = || {
            NavigationError::PlacesUnavailable(
                "Current location is available but address lookup failed.".to_string(),
            )
        };
        match self.services.places.reverse(at) {
            Ok(Some(address)) => {
                let line = format!("You are currently at: {address}");
                self.say(vec![Utterance::normal(line.clone())]);
                Ok(line)
            }
            Ok(None) => Err(failed()),
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "reverse geocoding failed");
                Err(failed())
            }
        }
    }

    pub fn search_places(
        &self,
        query: &str,
        radius_m: Option<f64>,
    ) -> Result<Vec<PlaceCandidate>, NavigationError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(NavigationError::InvalidInput(
                "A search query is required.".to_string(),
            ));
        }
        if let Some(r) = radius_m {
            if !(r.is_finite() && r > 0.0) {
                return Err(NavigationError::InvalidInput(
                    "Search radius must be a positive number of meters.".to_string(),
                ));
            }
        }
        let near = self.lock().location;
        self.services
            .places
            .search(query, near, radius_m)
            .map_err(|e| {
                warn!(session_id = %self.session_id, error = %e, "place search failed");
                NavigationError::PlacesUnavailable(format!("Place search failed: {e}"))
            })
    }

    pub fn set_vision_enabled(&self, enabled: bool) -> VisionStatus {
        {
            let mut st = self.lock();
            st.vision.enabled = enabled;
            if !enabled {
                st.vision.last_guidance = None;
                st.vision.last_spoken = None;
            }
        }
        self.services
            .response_cache
            .invalidate_session(self.session_id.as_str());
        self.vision_status()
    }

    pub fn vision_status(&self) -> VisionStatus {
        let st = self.lock();
        VisionStatus {
            enabled: st.vision.enabled,
            provider: self.services.vision.as_ref().map(|v| v.name().to_string()),
            last_guidance: st.vision.last_guidance.clone(),
            last_spoken: st.vision.last_spoken.clone(),
        }
    }

    /// Analyses one camera frame and fuses it with the active instruction. The provider runs
    /// outside the session lock; a failed analysis is reported, never replaced with made-up data.
    pub fn submit_vision_frame(
        &self,
        frame: VisionFrame,
        client_context: Option<&str>,
    ) -> Result<VisionGuidance, NavigationError> {
        let (instruction, step_index) = {
            let st = self.lock();
            if !st.vision.enabled {
                return Err(NavigationError::VisionDisabled);
            }
            let instruction = if st.is_navigating {
                st.route
                    .as_ref()
                    .and_then(|r| r.instruction(st.step_index).cloned())
            } else {
                None
            };
            (instruction, st.is_navigating.then_some(st.step_index))
        };
        let provider = self
            .services
            .vision
            .clone()
            .ok_or_else(|| NavigationError::VisionUnavailable("no vision provider configured".to_string()))?;
        if frame.bytes.is_empty() {
            return Err(NavigationError::InvalidInput("The image frame is empty.".to_string()));
        }

        let context = VisionContext {
            route_instruction: instruction.as_ref().map(|i| i.spoken()),
            client_context,
        };
        let analysis = provider.analyze(&frame, context).map_err(|e| {
            warn!(session_id = %self.session_id, provider = provider.name(), error = %e, "vision analysis failed");
            let detail = if e.is_timeout() { "timeout".to_string() } else { e.to_string() };
            NavigationError::VisionUnavailable(detail)
        })?;
        let fused = self.fusion.fuse(instruction.as_ref(), &analysis);

        let now = self.now();
        let guidance = {
            let mut st = self.lock();
            let step_signature = st.step_signature();
            let decision = self.throttle.decide(
                st.vision.last_spoken.as_ref(),
                &fused.narration,
                &fused.hazards,
                fused.suggested_heading,
                &step_signature,
                now,
            );
            if decision.speak {
                st.vision.last_spoken = Some(SpeechThrottle::spoken(
                    &decision,
                    &fused.narration,
                    fused.suggested_heading,
                    &step_signature,
                    now,
                ));
            }
            debug!(
                session_id = %self.session_id,
                speak = decision.speak,
                trigger = ?decision.trigger,
                hazard_signature = %decision.hazard_signature,
                "vision guidance fused"
            );
            let guidance = VisionGuidance {
                narration: fused.narration.clone(),
                hazards: fused.hazards.clone(),
                suggested_heading: fused.suggested_heading,
                steps_remaining: fused.steps_remaining,
                nav_direction: fused.nav_direction,
                provider: analysis.provider.clone(),
                step_index,
                spoken: decision.speak,
                at: now,
            };
            st.vision.last_guidance = Some(guidance.clone());
            guidance
        };
        if guidance.spoken {
            let line = if guidance.hazards.is_empty() {
                Utterance::normal(guidance.narration.clone())
            } else {
                Utterance::high(guidance.narration.clone())
            };
            self.say(vec![line]);
        }
        Ok(guidance)
    }

    /// Single narration line for polling clients, cached per (session, step, obstacle set).
    pub fn get_unified_instruction(&self) -> Result<UnifiedInstruction, NavigationError> {
        let now = self.now();
        let (navigating, generation, step_index, instruction, vision_enabled, guidance) = {
            let st = self.lock();
            let instruction = st
                .route
                .as_ref()
                .and_then(|r| r.instruction(st.step_index).cloned());
            (
                st.is_navigating,
                st.route_generation,
                st.step_index,
                instruction,
                st.vision.enabled,
                st.vision.last_guidance.clone(),
            )
        };
        let fresh = guidance
            .clone()
            .filter(|g| vision_enabled && now.elapsed_ms_since(g.at) <= self.config.vision_fresh_ms);

        if !navigating {
            return match guidance.filter(|_| vision_enabled) {
                Some(g) => Ok(UnifiedInstruction {
                    obstacle_signature: obstacle_signature(&g.hazards),
                    narration: g.narration,
                    source: InstructionSource::Vision,
                    step_index: None,
                    hazards: g.hazards,
                    cached: false,
                }),
                None => Err(NavigationError::no_active_navigation()),
            };
        }

        let hazards = fresh.as_ref().map(|g| g.hazards.clone()).unwrap_or_default();
        let key = ResponseKey::new(self.session_id.as_str(), step_index, &hazards);
        if let Some(mut hit) = self.services.response_cache.get(&key, now) {
            hit.cached = true;
            return Ok(hit);
        }

        let (narration, source) = match fresh.filter(|g| !g.hazards.is_empty()) {
            Some(g) => (g.narration, InstructionSource::Vision),
            None => {
                let clear = VisionAnalysis::v1(Vec::new(), None, String::new(), "route".to_string())?;
                let fused = self.fusion.fuse(instruction.as_ref(), &clear);
                (fused.narration, InstructionSource::Route)
            }
        };
        let unified = UnifiedInstruction {
            narration,
            source,
            step_index: Some(step_index),
            obstacle_signature: key.obstacle_signature.clone(),
            hazards,
            cached: false,
        };
        self.cache_unified(generation, key, unified.clone(), vision_enabled, now);
        Ok(unified)
    }

    /// Stores `unified` only while the route it was built from is still installed. Written under
    /// the session lock: a route swap either bumps the generation first or invalidates afterwards.
    fn cache_unified(
        &self,
        generation: u64,
        key: ResponseKey,
        unified: UnifiedInstruction,
        vision_enabled: bool,
        now: MonotonicTimeNs,
    ) -> bool {
        let st = self.lock();
        if st.route_generation != generation {
            debug!(session_id = %self.session_id, "route changed while narrating; response not cached");
            return false;
        }
        self.services
            .response_cache
            .set(key, unified, vision_enabled, now);
        true
    }

    pub fn announcements(&self, after_seq: u64) -> Vec<Announcement> {
        self.announcements.since(after_seq)
    }
}

impl NavigationError {
    fn with_message(self, message: &str) -> Self {
        match self {
            NavigationError::RoutingUnavailable(_) => {
                NavigationError::RoutingUnavailable(message.to_string())
            }
            other => other,
        }
    }
}
