#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use wayguide_engines::providers::{
    PlaceProvider, ProviderError, RoutingProvider, VisionContext, VisionFrame, VisionProvider,
};
use wayguide_kernel_contracts::places::PlaceCandidate;
use wayguide_kernel_contracts::route::{EngineTag, Instruction, Route, RoutingMode};
use wayguide_kernel_contracts::session::{Destination, SessionId};
use wayguide_kernel_contracts::vision::{SteerHeading, VisionAnalysis};
use wayguide_kernel_contracts::{GeoPoint, MonotonicTimeNs};
use wayguide_os::{ManualClock, NavigationServices, NavigationSession, SessionConfig};

pub const METERS_PER_DEG_LAT: f64 = 111_194.93;

pub fn origin() -> GeoPoint {
    GeoPoint::v1(24.40, 54.60).unwrap()
}

pub fn north_of(p: GeoPoint, meters: f64) -> GeoPoint {
    GeoPoint::v1(p.lat + meters / METERS_PER_DEG_LAT, p.lng).unwrap()
}

pub fn east_of(p: GeoPoint, meters: f64) -> GeoPoint {
    let per_deg = METERS_PER_DEG_LAT * p.lat.to_radians().cos();
    GeoPoint::v1(p.lat, p.lng + meters / per_deg).unwrap()
}

pub fn destination(at: GeoPoint, name: &str) -> Destination {
    Destination::v1(at, Some(name.to_string())).unwrap()
}

/// One "arrive" instruction ending at `end`.
pub fn single_step_route(start: GeoPoint, end: GeoPoint, tag: &str) -> Route {
    let arrive = Instruction::v1(
        "You have arrived".into(),
        "You have arrived".into(),
        30.0,
        25.0,
        "arrive".into(),
        None,
        None,
        Some(end),
        Some([0, 1]),
    )
    .unwrap();
    Route::v1(
        vec![arrive],
        30.0,
        25.0,
        vec![start, end],
        vec![start, end],
        EngineTag::new(tag).unwrap(),
    )
    .unwrap()
}

/// Straight ahead to a midpoint, then a left turn to `end`.
pub fn two_step_route(start: GeoPoint, end: GeoPoint, tag: &str) -> Route {
    let mid = north_of(start, 60.0);
    let depart = Instruction::v1(
        "Walk straight".into(),
        "In 60 meters, Turn left".into(),
        60.0,
        45.0,
        "depart".into(),
        None,
        Some("Corniche Road".into()),
        Some(mid),
        Some([0, 1]),
    )
    .unwrap();
    let arrive = Instruction::v1(
        "Turn left".into(),
        "Turn left and arrive".into(),
        40.0,
        30.0,
        "turn".into(),
        Some("left".into()),
        None,
        Some(end),
        Some([1, 2]),
    )
    .unwrap();
    Route::v1(
        vec![depart, arrive],
        100.0,
        75.0,
        vec![start, mid, end],
        vec![start, end],
        EngineTag::new(tag).unwrap(),
    )
    .unwrap()
}

/// Three legs north: 30 m, then a 6 m jog, then 30 m to the destination.
pub fn short_middle_step_route(start: GeoPoint, tag: &str) -> Route {
    let ends = [
        north_of(start, 30.0),
        north_of(start, 36.0),
        north_of(start, 66.0),
    ];
    let legs = [
        ("Walk straight", "In 30 meters, Bear right", 30.0, "depart"),
        ("Bear right", "Bear right, then continue", 6.0, "turn"),
        ("Continue", "Continue and arrive", 30.0, "arrive"),
    ];
    let instructions = legs
        .iter()
        .zip(ends)
        .enumerate()
        .map(|(i, ((text, speech, distance, kind), end))| {
            Instruction::v1(
                text.to_string(),
                speech.to_string(),
                *distance,
                distance * 0.75,
                kind.to_string(),
                None,
                None,
                Some(end),
                Some([i, i + 1]),
            )
            .unwrap()
        })
        .collect();
    let mut geometry = vec![start];
    geometry.extend(ends);
    Route::v1(
        instructions,
        66.0,
        49.5,
        geometry,
        vec![start, ends[2]],
        EngineTag::new(tag).unwrap(),
    )
    .unwrap()
}

/// Routing double: scripted results first, then a single-step route between the requested points.
pub struct FakeRouting {
    tag: Mutex<String>,
    scripted: Mutex<VecDeque<Result<Route, ProviderError>>>,
    calls: AtomicUsize,
}

impl FakeRouting {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: Mutex::new(tag.to_string()),
            scripted: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, result: Result<Route, ProviderError>) {
        self.scripted.lock().unwrap().push_back(result);
    }

    pub fn set_tag(&self, tag: &str) {
        *self.tag.lock().unwrap() = tag.to_string();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RoutingProvider for FakeRouting {
    fn engine_tag(&self) -> EngineTag {
        EngineTag::new(self.tag.lock().unwrap().clone()).unwrap()
    }

    fn compute_route(
        &self,
        start: GeoPoint,
        end: GeoPoint,
        _mode: RoutingMode,
    ) -> Result<Route, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.scripted.lock().unwrap().pop_front() {
            return next;
        }
        let tag = self.tag.lock().unwrap().clone();
        Ok(single_step_route(start, end, &tag))
    }
}

pub struct FakePlaces {
    pub address: Option<String>,
}

impl PlaceProvider for FakePlaces {
    fn search(
        &self,
        query: &str,
        _near: Option<GeoPoint>,
        _radius_m: Option<f64>,
    ) -> Result<Vec<PlaceCandidate>, ProviderError> {
        if query == "nowhere" {
            return Err(ProviderError::Timeout {
                provider: "nominatim",
            });
        }
        Ok(vec![PlaceCandidate::v1(
            query.to_string(),
            north_of(origin(), 500.0),
            Some("Corniche Road, Abu Dhabi".into()),
            Some(500.0),
        )
        .unwrap()])
    }

    fn reverse(&self, _at: GeoPoint) -> Result<Option<String>, ProviderError> {
        Ok(self.address.clone())
    }
}

/// Vision double replaying scripted analyses; an empty script fails like a timed-out backend.
pub struct FakeVision {
    scripted: Mutex<VecDeque<Result<VisionAnalysis, ProviderError>>>,
    pub seen_instructions: Mutex<Vec<Option<String>>>,
}

impl FakeVision {
    pub fn new() -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            seen_instructions: Mutex::new(Vec::new()),
        }
    }

    pub fn push_hazards(&self, hazards: &[&str], steer: Option<SteerHeading>) {
        let analysis = VisionAnalysis::v1(
            hazards.iter().map(|h| h.to_string()).collect(),
            steer,
            String::new(),
            "fake".into(),
        )
        .unwrap();
        self.scripted.lock().unwrap().push_back(Ok(analysis));
    }

    pub fn push_error(&self, e: ProviderError) {
        self.scripted.lock().unwrap().push_back(Err(e));
    }
}

impl VisionProvider for FakeVision {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn analyze(
        &self,
        _frame: &VisionFrame,
        context: VisionContext<'_>,
    ) -> Result<VisionAnalysis, ProviderError> {
        self.seen_instructions
            .lock()
            .unwrap()
            .push(context.route_instruction.map(str::to_string));
        self.scripted
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ProviderError::Timeout { provider: "fake" }))
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub routing: Arc<FakeRouting>,
    pub vision: Arc<FakeVision>,
    pub services: Arc<NavigationServices>,
    pub session: Arc<NavigationSession>,
}

pub fn config_without_monitor() -> SessionConfig {
    let mut config = SessionConfig::mvp_v1();
    config.monitor_enabled = false;
    config
}

pub fn harness_with(config: SessionConfig) -> Harness {
    let clock = Arc::new(ManualClock::new(MonotonicTimeNs(0)));
    let routing = Arc::new(FakeRouting::new("osrm"));
    let vision = Arc::new(FakeVision::new());
    let services = Arc::new(
        NavigationServices::new(
            routing.clone(),
            Arc::new(FakePlaces {
                address: Some("Corniche Road, Abu Dhabi".into()),
            }),
            clock.clone(),
        )
        .with_vision(vision.clone()),
    );
    let session = Arc::new(NavigationSession::new(
        SessionId::new("test-client").unwrap(),
        config,
        services.clone(),
    ));
    Harness {
        clock,
        routing,
        vision,
        services,
        session,
    }
}

pub fn harness() -> Harness {
    harness_with(config_without_monitor())
}

pub fn frame() -> VisionFrame {
    VisionFrame::new(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10])
}

pub fn spoken(h: &Harness) -> Vec<String> {
    h.session
        .announcements(0)
        .into_iter()
        .map(|a| a.text)
        .collect()
}
