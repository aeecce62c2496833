#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;

use base64::Engine as _;
use serde_json::{Map, Value};
use tracing::{debug, info};
use wayguide_engines::providers::{
    FallbackVisionProvider, NominatimConfig, NominatimPlaceProvider, OpenAiCompatVisionProvider,
    OsrmConfig, OsrmRoutingProvider, VisionFrame, VisionProvider, VisionProviderConfig,
};
use wayguide_kernel_contracts::session::{Destination, SessionId};
use wayguide_kernel_contracts::GeoPoint;
use wayguide_os::session::{NavigationServices, NavigationSession, SessionConfig};
use wayguide_os::{NavigationError, SessionRegistry, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionBackend {
    OpenAiCompat,
    Heuristic,
    Off,
}

impl VisionBackend {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai_compat" | "openai" => Some(VisionBackend::OpenAiCompat),
            "heuristic" => Some(VisionBackend::Heuristic),
            "off" | "none" | "disabled" => Some(VisionBackend::Off),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdapterConfig {
    pub bind: String,
    pub osrm_url: String,
    pub nominatim_url: String,
    pub vision_backend: VisionBackend,
    pub vision_url: String,
    pub vision_model: String,
    pub vision_api_key: Option<String>,
    pub vision_heuristic_enabled: bool,
    pub vision_timeout_ms: u64,
    pub monitor_interval_ms: u64,
    pub cache_sweep_interval_ms: u64,
}

impl AdapterConfig {
    pub fn from_env() -> Self {
        Self::from_env_var_map(|key| env::var(key).ok())
    }

    /// Unset, blank or out-of-range values keep their defaults.
    pub fn from_env_var_map<F>(mut env_getter: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut text = |key: &str| {
            env_getter(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let osrm = OsrmConfig::mvp_v1();
        let nominatim = NominatimConfig::mvp_v1();
        let vision = VisionProviderConfig::mvp_v1();

        let bind = text("WAYGUIDE_HTTP_BIND").unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let osrm_url = text("WAYGUIDE_OSRM_URL").unwrap_or(osrm.base_url);
        let nominatim_url = text("WAYGUIDE_NOMINATIM_URL").unwrap_or(nominatim.base_url);
        let vision_api_key = text("WAYGUIDE_VISION_API_KEY");
        let vision_backend = text("WAYGUIDE_VISION_PROVIDER")
            .and_then(|v| VisionBackend::parse(&v))
            .unwrap_or(if vision_api_key.is_some() {
                VisionBackend::OpenAiCompat
            } else {
                VisionBackend::Off
            });
        let vision_url = text("WAYGUIDE_VISION_URL").unwrap_or(vision.base_url);
        let vision_model = text("WAYGUIDE_VISION_MODEL").unwrap_or(vision.model);
        let vision_heuristic_enabled = text("WAYGUIDE_VISION_HEURISTIC_ENABLED")
            .map(|v| parse_flag(&v))
            .unwrap_or(vision.heuristic_enabled);
        let vision_timeout_ms = text("WAYGUIDE_VISION_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (500..=60_000).contains(v))
            .unwrap_or(vision.timeout_ms);
        let monitor_interval_ms = text("WAYGUIDE_MONITOR_INTERVAL_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (250..=60_000).contains(v))
            .unwrap_or(SessionConfig::mvp_v1().monitor_interval_ms);
        let cache_sweep_interval_ms = text("WAYGUIDE_CACHE_SWEEP_INTERVAL_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (1_000..=3_600_000).contains(v))
            .unwrap_or(60_000);

        Self {
            bind,
            osrm_url,
            nominatim_url,
            vision_backend,
            vision_url,
            vision_model,
            vision_api_key,
            vision_heuristic_enabled,
            vision_timeout_ms,
            monitor_interval_ms,
            cache_sweep_interval_ms,
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "off" | "no"
    )
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct LocationRequest {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct StartRequest {
    pub lat: f64,
    pub lng: f64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RoutingModeRequest {
    pub mode: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct VisionFrameRequest {
    /// Plain base64 or a `data:image/...;base64,` URL.
    pub image: String,
    pub context: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PlaceSearchRequest {
    pub query: String,
    pub radius_m: Option<f64>,
}

/// Status code plus the `{success, message?, ...}` body handed to the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: u16,
    pub body: Value,
}

impl ApiReply {
    pub fn ok<T: serde::Serialize>(message: Option<String>, payload: &T) -> Self {
        let mut body = Map::new();
        body.insert("success".to_string(), Value::Bool(true));
        if let Some(message) = message {
            body.insert("message".to_string(), Value::String(message));
        }
        match serde_json::to_value(payload) {
            Ok(Value::Object(fields)) => body.extend(fields),
            Ok(Value::Null) => {}
            Ok(other) => {
                body.insert("data".to_string(), other);
            }
            Err(e) => {
                return Self::error(&NavigationError::Internal(format!(
                    "response encoding failed: {e}"
                )))
            }
        }
        Self {
            status: 200,
            body: Value::Object(body),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::ok(Some(message.into()), &())
    }

    pub fn error(e: &NavigationError) -> Self {
        let status = match e {
            NavigationError::InvalidInput(_) => 400,
            NavigationError::UnknownSession(_) => 404,
            NavigationError::NoLocation(_)
            | NavigationError::NoActiveNavigation(_)
            | NavigationError::NoRoute(_)
            | NavigationError::VisionDisabled => 409,
            NavigationError::VisionUnavailable(_)
            | NavigationError::RoutingUnavailable(_)
            | NavigationError::PlacesUnavailable(_) => 502,
            NavigationError::Internal(_) => 500,
        };
        Self {
            status,
            body: serde_json::json!({
                "success": false,
                "message": e.to_string(),
                "reason_code": format!("0x{:08X}", e.reason_code().0),
            }),
        }
    }

    fn from_result<T: serde::Serialize>(result: Result<T, NavigationError>) -> Self {
        match result {
            Ok(payload) => Self::ok(None, &payload),
            Err(e) => Self::error(&e),
        }
    }
}

/// Owns the session registry and translates HTTP payloads into session operations.
pub struct AdapterRuntime {
    registry: SessionRegistry,
}

impl AdapterRuntime {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    pub fn from_config(config: &AdapterConfig) -> Result<Self, String> {
        let routing = OsrmRoutingProvider::new(OsrmConfig {
            base_url: config.osrm_url.clone(),
            ..OsrmConfig::mvp_v1()
        })
        .map_err(|e| format!("routing provider: {e}"))?;
        let places = NominatimPlaceProvider::new(NominatimConfig {
            base_url: config.nominatim_url.clone(),
            ..NominatimConfig::mvp_v1()
        })
        .map_err(|e| format!("place provider: {e}"))?;

        let mut services =
            NavigationServices::new(Arc::new(routing), Arc::new(places), Arc::new(SystemClock::new()));
        if let Some(vision) = build_vision(config)? {
            services = services.with_vision(vision);
        }
        let mut session_config = SessionConfig::mvp_v1();
        session_config.monitor_interval_ms = config.monitor_interval_ms;
        info!(
            osrm = %config.osrm_url,
            nominatim = %config.nominatim_url,
            vision = ?config.vision_backend,
            monitor_interval_ms = config.monitor_interval_ms,
            "adapter runtime configured"
        );
        Ok(Self::new(SessionRegistry::new(session_config, Arc::new(services))))
    }

    pub fn default_from_env() -> Result<Self, String> {
        Self::from_config(&AdapterConfig::from_env())
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn health(&self) -> ApiReply {
        ApiReply::ok(
            None,
            &serde_json::json!({ "status": "ok", "sessions": self.registry.len() }),
        )
    }

    /// Drops expired route and response cache entries; returns how many of each were removed.
    pub fn run_cache_sweep(&self) -> (usize, usize) {
        let services = self.registry.services();
        let now = services.clock.now();
        let routes = services.route_cache.cleanup_expired(now);
        let responses = services.response_cache.cleanup_expired(now);
        if routes + responses > 0 {
            debug!(routes, responses, "expired cache entries swept");
        }
        (routes, responses)
    }

    fn session_id(sid: Option<&str>) -> Result<SessionId, NavigationError> {
        let raw = sid.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| {
            NavigationError::InvalidInput(
                "A client id is required (x-client-id header or sid query parameter).".to_string(),
            )
        })?;
        Ok(SessionId::new(raw)?)
    }

    fn session(&self, sid: Option<&str>) -> Result<Arc<NavigationSession>, NavigationError> {
        Ok(self.registry.get_or_create(&Self::session_id(sid)?))
    }

    /// Lookup for read-only routes; never creates a session.
    fn existing_session(&self, sid: Option<&str>) -> Result<Arc<NavigationSession>, NavigationError> {
        let id = Self::session_id(sid)?;
        self.registry
            .get(&id)
            .ok_or_else(|| NavigationError::UnknownSession(id.as_str().to_string()))
    }

    fn with_session<T, F>(&self, sid: Option<&str>, op: F) -> ApiReply
    where
        T: serde::Serialize,
        F: FnOnce(&Arc<NavigationSession>) -> Result<T, NavigationError>,
    {
        ApiReply::from_result(self.session(sid).and_then(|s| op(&s)))
    }

    fn with_existing_session<T, F>(&self, sid: Option<&str>, op: F) -> ApiReply
    where
        T: serde::Serialize,
        F: FnOnce(&Arc<NavigationSession>) -> Result<T, NavigationError>,
    {
        ApiReply::from_result(self.existing_session(sid).and_then(|s| op(&s)))
    }

    pub fn set_location(&self, sid: Option<&str>, req: LocationRequest) -> ApiReply {
        self.with_session(sid, |s| s.set_location(req.lat, req.lng))
    }

    pub fn start(&self, sid: Option<&str>, req: StartRequest) -> ApiReply {
        let name = req.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let outcome = self.session(sid).and_then(|s| {
            let destination = Destination::v1(GeoPoint::v1(req.lat, req.lng)?, name)?;
            s.start(destination)
        });
        match outcome {
            Ok(started) => {
                let message = format!("Starting navigation to {}.", started.destination);
                ApiReply::ok(Some(message), &started)
            }
            Err(e) => ApiReply::error(&e),
        }
    }

    pub fn stop(&self, sid: Option<&str>) -> ApiReply {
        match self.session(sid).and_then(|s| s.stop()) {
            Ok(out) => ApiReply::ok(
                Some("Navigation stopped. Ready for new destination.".to_string()),
                &out,
            ),
            Err(e) => ApiReply::error(&e),
        }
    }

    pub fn advance(&self, sid: Option<&str>) -> ApiReply {
        self.with_session(sid, |s| s.advance_manually())
    }

    pub fn reroute(&self, sid: Option<&str>) -> ApiReply {
        self.with_session(sid, |s| s.reroute_manually())
    }

    pub fn set_routing_mode(&self, sid: Option<&str>, req: RoutingModeRequest) -> ApiReply {
        match self.session(sid).and_then(|s| s.set_routing_mode(&req.mode)) {
            Ok(mode) => ApiReply::ok(
                Some(format!("Routing mode set to {}.", mode.display_name())),
                &serde_json::json!({ "mode": mode }),
            ),
            Err(e) => ApiReply::error(&e),
        }
    }

    pub fn set_simulation(&self, sid: Option<&str>, req: ToggleRequest) -> ApiReply {
        self.with_session(sid, |s| {
            s.set_simulation(req.enabled)
                .map(|enabled| serde_json::json!({ "simulation_enabled": enabled }))
        })
    }

    pub fn status(&self, sid: Option<&str>) -> ApiReply {
        self.with_existing_session(sid, |s| Ok(s.get_status()))
    }

    pub fn instruction(&self, sid: Option<&str>) -> ApiReply {
        self.with_existing_session(sid, |s| s.get_current_instruction())
    }

    pub fn unified_instruction(&self, sid: Option<&str>) -> ApiReply {
        self.with_existing_session(sid, |s| s.get_unified_instruction())
    }

    pub fn route(&self, sid: Option<&str>) -> ApiReply {
        self.with_existing_session(sid, |s| s.get_route())
    }

    pub fn where_am_i(&self, sid: Option<&str>) -> ApiReply {
        match self.existing_session(sid).and_then(|s| s.describe_location()) {
            Ok(line) => ApiReply::message(line),
            Err(e) => ApiReply::error(&e),
        }
    }

    pub fn announcements(&self, sid: Option<&str>, after: u64) -> ApiReply {
        self.with_existing_session(sid, |s| {
            Ok(serde_json::json!({ "announcements": s.announcements(after) }))
        })
    }

    pub fn search_places(&self, sid: Option<&str>, req: PlaceSearchRequest) -> ApiReply {
        self.with_session(sid, |s| {
            s.search_places(&req.query, req.radius_m)
                .map(|places| serde_json::json!({ "places": places }))
        })
    }

    pub fn toggle_vision(&self, sid: Option<&str>, req: ToggleRequest) -> ApiReply {
        self.with_session(sid, |s| Ok(s.set_vision_enabled(req.enabled)))
    }

    pub fn vision_status(&self, sid: Option<&str>) -> ApiReply {
        self.with_existing_session(sid, |s| Ok(s.vision_status()))
    }

    pub fn vision_frame(&self, sid: Option<&str>, req: VisionFrameRequest) -> ApiReply {
        self.with_session(sid, |s| {
            let frame = decode_frame(&req.image)?;
            s.submit_vision_frame(frame, req.context.as_deref())
        })
    }
}

fn build_vision(config: &AdapterConfig) -> Result<Option<Arc<dyn VisionProvider>>, String> {
    let provider: Option<Arc<dyn VisionProvider>> = match config.vision_backend {
        VisionBackend::Off => None,
        VisionBackend::Heuristic => Some(Arc::new(FallbackVisionProvider::new(None, true))),
        VisionBackend::OpenAiCompat => {
            let primary = OpenAiCompatVisionProvider::new(VisionProviderConfig {
                base_url: config.vision_url.clone(),
                model: config.vision_model.clone(),
                api_key: config.vision_api_key.clone(),
                timeout_ms: config.vision_timeout_ms,
                heuristic_enabled: config.vision_heuristic_enabled,
                ..VisionProviderConfig::mvp_v1()
            })
            .map_err(|e| format!("vision provider: {e}"))?;
            Some(Arc::new(FallbackVisionProvider::new(
                Some(Box::new(primary)),
                config.vision_heuristic_enabled,
            )))
        }
    };
    Ok(provider)
}

pub fn decode_frame(image: &str) -> Result<VisionFrame, NavigationError> {
    let payload = match image.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => image,
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|_| NavigationError::InvalidInput("The image is not valid base64.".to_string()))?;
    if bytes.is_empty() {
        return Err(NavigationError::InvalidInput("The image frame is empty.".to_string()));
    }
    Ok(VisionFrame::new(bytes))
}
