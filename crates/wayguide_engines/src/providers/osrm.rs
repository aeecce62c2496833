#![forbid(unsafe_code)]

use serde_json::Value;
use tracing::{info, warn};
use wayguide_kernel_contracts::route::{EngineTag, Instruction, Route, RoutingMode};
use wayguide_kernel_contracts::GeoPoint;

use super::http::{build_agent, provider_error_from_ureq, read_json, trim_base_url};
use super::{ProviderError, RoutingProvider};
use crate::narration::{instruction_text, replace_non_latin_street_names, speech_text};

const PROVIDER: &str = "osrm";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsrmConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub user_agent: String,
    pub walk_profile: String,
    pub drive_profile: String,
}

impl OsrmConfig {
    pub fn mvp_v1() -> Self {
        Self {
            base_url: "https://router.project-osrm.org".to_string(),
            timeout_ms: 10_000,
            user_agent: "wayguide/0.1".to_string(),
            walk_profile: "foot".to_string(),
            drive_profile: "car".to_string(),
        }
    }

    pub fn profile_for(&self, mode: RoutingMode) -> &str {
        match mode {
            RoutingMode::Walk => &self.walk_profile,
            RoutingMode::Drive => &self.drive_profile,
        }
    }
}

#[derive(Debug)]
pub struct OsrmRoutingProvider {
    config: OsrmConfig,
    agent: ureq::Agent,
    tag: EngineTag,
}

impl OsrmRoutingProvider {
    pub fn new(config: OsrmConfig) -> Result<Self, ProviderError> {
        if trim_base_url(&config.base_url).is_empty() {
            return Err(ProviderError::NotConfigured {
                provider: PROVIDER,
                detail: "base_url is empty".to_string(),
            });
        }
        let tag = EngineTag::new(PROVIDER).map_err(|e| ProviderError::parse(PROVIDER, e.to_string()))?;
        let agent = build_agent(config.timeout_ms, &config.user_agent);
        Ok(Self { config, agent, tag })
    }

    fn route_url(&self, start: GeoPoint, end: GeoPoint, mode: RoutingMode) -> String {
        format!(
            "{}/route/v1/{}/{},{};{},{}",
            trim_base_url(&self.config.base_url),
            self.config.profile_for(mode),
            start.lng,
            start.lat,
            end.lng,
            end.lat
        )
    }
}

impl RoutingProvider for OsrmRoutingProvider {
    fn engine_tag(&self) -> EngineTag {
        self.tag.clone()
    }

    fn compute_route(
        &self,
        start: GeoPoint,
        end: GeoPoint,
        mode: RoutingMode,
    ) -> Result<Route, ProviderError> {
        let url = self.route_url(start, end, mode);
        let response = self
            .agent
            .get(&url)
            .query("overview", "full")
            .query("steps", "true")
            .query("geometries", "geojson")
            .call()
            .map_err(|e| provider_error_from_ureq(PROVIDER, e));
        let body = match response {
            Ok(r) => read_json(PROVIDER, r)?,
            Err(e) => {
                warn!(mode = mode.as_str(), error = %e, "osrm route request failed");
                return Err(e);
            }
        };
        let route = parse_osrm_route(&body, self.tag.clone())?;
        info!(
            mode = mode.as_str(),
            profile = self.config.profile_for(mode),
            steps = route.step_count(),
            distance_m = route.total_distance_m,
            duration_s = route.total_duration_s,
            "osrm route computed"
        );
        Ok(route)
    }
}

fn lng_lat(value: &Value) -> Option<GeoPoint> {
    let pair = value.as_array()?;
    if pair.len() != 2 {
        return None;
    }
    GeoPoint::from_lng_lat([pair[0].as_f64()?, pair[1].as_f64()?]).ok()
}

fn coordinates(geometry: &Value) -> Vec<GeoPoint> {
    geometry
        .get("coordinates")
        .and_then(Value::as_array)
        .map(|coords| coords.iter().filter_map(lng_lat).collect())
        .unwrap_or_default()
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

struct RawStep<'a> {
    step: &'a Value,
    maneuver_location: Option<GeoPoint>,
    point_count: usize,
}

/// Turns an OSRM `route` response into a [`Route`]. Each step ends where the next maneuver
/// starts; the final step ends at the last coordinate of the overview geometry.
pub fn parse_osrm_route(body: &Value, engine_tag: EngineTag) -> Result<Route, ProviderError> {
    match body.get("code").and_then(Value::as_str) {
        Some("Ok") => {}
        Some("NoRoute") | Some("NoSegment") => return Err(ProviderError::NoResult { provider: PROVIDER }),
        other => {
            return Err(ProviderError::parse(
                PROVIDER,
                format!("unexpected code {}", other.unwrap_or("<missing>")),
            ))
        }
    }
    let route = body
        .get("routes")
        .and_then(Value::as_array)
        .and_then(|r| r.first())
        .ok_or(ProviderError::NoResult { provider: PROVIDER })?;

    let geometry = route.get("geometry").map(coordinates).unwrap_or_default();
    let raw_steps: Vec<RawStep<'_>> = route
        .get("legs")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|leg| leg.get("steps").and_then(Value::as_array))
        .flatten()
        .map(|step| RawStep {
            step,
            maneuver_location: step.pointer("/maneuver/location").and_then(lng_lat),
            point_count: step.get("geometry").map(|g| coordinates(g).len()).unwrap_or(0),
        })
        .collect();
    if raw_steps.is_empty() {
        return Err(ProviderError::NoResult { provider: PROVIDER });
    }

    let last_index = geometry.len().saturating_sub(1);
    let mut cursor = 0usize;
    let mut instructions = Vec::with_capacity(raw_steps.len());
    for (i, raw) in raw_steps.iter().enumerate() {
        let end_location = match raw_steps.get(i + 1) {
            Some(next) => next.maneuver_location,
            None => geometry.last().copied(),
        };
        let way_points = if geometry.is_empty() || raw.point_count == 0 {
            None
        } else {
            let start = cursor.min(last_index);
            let end = (cursor + raw.point_count - 1).min(last_index);
            // Consecutive step geometries share their boundary coordinate.
            cursor += raw.point_count - 1;
            Some([start, end])
        };
        instructions.push(build_instruction(raw.step, end_location, way_points)?);
    }

    let waypoints = body
        .get("waypoints")
        .and_then(Value::as_array)
        .map(|w| w.iter().filter_map(|p| p.get("location").and_then(lng_lat)).collect())
        .unwrap_or_default();

    Route::v1(
        instructions,
        route.get("distance").and_then(Value::as_f64).unwrap_or(0.0),
        route.get("duration").and_then(Value::as_f64).unwrap_or(0.0),
        geometry,
        waypoints,
        engine_tag,
    )
    .map_err(|e| ProviderError::parse(PROVIDER, e.to_string()))
}

fn build_instruction(
    step: &Value,
    end_location: Option<GeoPoint>,
    way_points: Option<[usize; 2]>,
) -> Result<Instruction, ProviderError> {
    let maneuver_type = step
        .pointer("/maneuver/type")
        .and_then(Value::as_str)
        .unwrap_or("continue")
        .to_string();
    let modifier = non_empty_str(step.pointer("/maneuver/modifier"));
    let exit = step
        .pointer("/maneuver/exit")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok());
    let road_name = non_empty_str(step.get("name")).or_else(|| non_empty_str(step.get("ref")));
    let distance_m = step.get("distance").and_then(Value::as_f64).unwrap_or(0.0);
    let duration_s = step.get("duration").and_then(Value::as_f64).unwrap_or(0.0);

    let text = instruction_text(&maneuver_type, modifier.as_deref(), road_name.as_deref(), exit);
    let speech = replace_non_latin_street_names(&speech_text(&text, distance_m, &maneuver_type));
    Instruction::v1(
        text,
        speech,
        distance_m,
        duration_s,
        maneuver_type,
        modifier,
        road_name,
        end_location,
        way_points,
    )
    .map_err(|e| ProviderError::parse(PROVIDER, e.to_string()))
}
