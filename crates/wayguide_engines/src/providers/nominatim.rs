#![forbid(unsafe_code)]

use serde_json::Value;
use tracing::{debug, info, warn};
use wayguide_kernel_contracts::places::PlaceCandidate;
use wayguide_kernel_contracts::GeoPoint;

use super::http::{build_agent, provider_error_from_ureq, read_json, trim_base_url};
use super::{PlaceProvider, ProviderError};
use crate::geometry::haversine_m;

const PROVIDER: &str = "nominatim";
const METERS_PER_DEGREE_LAT: f64 = 111_320.0;
const ADDRESS_KEYS: &[&str] = &["road", "suburb", "city", "state", "country"];

#[derive(Debug, Clone, PartialEq)]
pub struct NominatimConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    /// Nominatim's usage policy requires an identifying agent.
    pub user_agent: String,
    pub max_results: usize,
    pub default_radius_m: f64,
    /// Appended to the query, one at a time, when the plain query finds nothing.
    pub fallback_suffixes: Vec<String>,
}

impl NominatimConfig {
    pub fn mvp_v1() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            timeout_ms: 10_000,
            user_agent: "wayguide/0.1".to_string(),
            max_results: 5,
            default_radius_m: 5_000.0,
            fallback_suffixes: vec!["mall".to_string(), "shopping center".to_string()],
        }
    }
}

#[derive(Debug)]
pub struct NominatimPlaceProvider {
    config: NominatimConfig,
    agent: ureq::Agent,
}

impl NominatimPlaceProvider {
    pub fn new(config: NominatimConfig) -> Result<Self, ProviderError> {
        if trim_base_url(&config.base_url).is_empty() || config.user_agent.trim().is_empty() {
            return Err(ProviderError::NotConfigured {
                provider: PROVIDER,
                detail: "base_url and user_agent are required".to_string(),
            });
        }
        let agent = build_agent(config.timeout_ms, &config.user_agent);
        Ok(Self { config, agent })
    }

    fn fetch_search(
        &self,
        query: &str,
        near: Option<GeoPoint>,
        radius_m: f64,
    ) -> Result<Value, ProviderError> {
        let url = format!("{}/search", trim_base_url(&self.config.base_url));
        let limit = (self.config.max_results * 2).to_string();
        let mut request = self
            .agent
            .get(&url)
            .query("q", query)
            .query("format", "json")
            .query("addressdetails", "1")
            .query("limit", &limit);
        if let Some(center) = near {
            request = request
                .query("viewbox", &viewbox(center, radius_m))
                .query("bounded", "1");
        }
        let response = request
            .call()
            .map_err(|e| provider_error_from_ureq(PROVIDER, e))?;
        read_json(PROVIDER, response)
    }
}

impl PlaceProvider for NominatimPlaceProvider {
    fn search(
        &self,
        query: &str,
        near: Option<GeoPoint>,
        radius_m: Option<f64>,
    ) -> Result<Vec<PlaceCandidate>, ProviderError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let radius = radius_m
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(self.config.default_radius_m);

        let mut places = parse_search_results(&self.fetch_search(query, near, radius)?, near);
        if places.is_empty() {
            for suffix in &self.config.fallback_suffixes {
                let retry = format!("{query} {suffix}");
                match self.fetch_search(&retry, near, radius) {
                    Ok(body) => {
                        places = parse_search_results(&body, near);
                        if !places.is_empty() {
                            debug!(query = %retry, "nominatim fallback query matched");
                            break;
                        }
                    }
                    Err(e) => debug!(query = %retry, error = %e, "nominatim fallback query failed"),
                }
            }
        }
        places.truncate(self.config.max_results);
        info!(query, results = places.len(), "nominatim search");
        Ok(places)
    }

    fn reverse(&self, at: GeoPoint) -> Result<Option<String>, ProviderError> {
        let url = format!("{}/reverse", trim_base_url(&self.config.base_url));
        let response = self
            .agent
            .get(&url)
            .query("lat", &at.lat.to_string())
            .query("lon", &at.lng.to_string())
            .query("format", "json")
            .query("accept-language", "en")
            .call()
            .map_err(|e| provider_error_from_ureq(PROVIDER, e));
        match response {
            Ok(r) => Ok(parse_reverse(&read_json(PROVIDER, r)?)),
            Err(e) => {
                warn!(error = %e, "nominatim reverse lookup failed");
                Err(e)
            }
        }
    }
}

/// `left,top,right,bottom` box of roughly `radius_m` around `center`.
fn viewbox(center: GeoPoint, radius_m: f64) -> String {
    let dlat = radius_m / METERS_PER_DEGREE_LAT;
    let cos_lat = center.lat.to_radians().cos().abs().max(0.01);
    let dlng = radius_m / (METERS_PER_DEGREE_LAT * cos_lat);
    format!(
        "{:.6},{:.6},{:.6},{:.6}",
        center.lng - dlng,
        center.lat + dlat,
        center.lng + dlng,
        center.lat - dlat
    )
}

fn coordinate(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::String(s) => s.trim().parse().ok(),
        other => other.as_f64(),
    }
}

fn place_from_item(item: &Value, near: Option<GeoPoint>) -> Option<PlaceCandidate> {
    let location = GeoPoint::v1(coordinate(item.get("lat"))?, coordinate(item.get("lon"))?).ok()?;
    let display_name = item
        .get("display_name")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    let name = item
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .or_else(|| display_name.split(',').next().map(str::trim).filter(|n| !n.is_empty()))
        .unwrap_or("Unknown place")
        .to_string();

    let parts: Vec<&str> = item
        .get("address")
        .map(|address| {
            ADDRESS_KEYS
                .iter()
                .filter_map(|k| address.get(*k).and_then(Value::as_str))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let address = if parts.is_empty() {
        Some(display_name.to_string()).filter(|s| !s.is_empty())
    } else {
        Some(parts.join(", "))
    };
    let distance_m = near.map(|origin| haversine_m(origin, location));
    PlaceCandidate::v1(name, location, address, distance_m).ok()
}

/// Keeps the well-formed entries, nearest first when an origin is known.
pub fn parse_search_results(body: &Value, near: Option<GeoPoint>) -> Vec<PlaceCandidate> {
    let mut places: Vec<PlaceCandidate> = body
        .as_array()
        .map(|items| items.iter().filter_map(|i| place_from_item(i, near)).collect())
        .unwrap_or_default();
    if near.is_some() {
        places.sort_by(|a, b| {
            a.distance_m
                .unwrap_or(f64::MAX)
                .total_cmp(&b.distance_m.unwrap_or(f64::MAX))
        });
    }
    places
}

pub fn parse_reverse(body: &Value) -> Option<String> {
    body.get("display_name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
