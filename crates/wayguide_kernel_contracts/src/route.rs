#![forbid(unsafe_code)]

use crate::common::{validate_non_negative, validate_text, validate_token};
use crate::{ContractViolation, GeoPoint, Validate};

pub const ROUTE_MAX_INSTRUCTIONS: usize = 512;
pub const ROUTE_MAX_GEOMETRY_POINTS: usize = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    Walk,
    Drive,
}

impl RoutingMode {
    /// Accepts the aliases clients send ("foot", "walking", "car", "vehicle", ...).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "walk" | "walking" | "foot" | "pedestrian" => Some(RoutingMode::Walk),
            "drive" | "driving" | "car" | "vehicle" => Some(RoutingMode::Drive),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoutingMode::Walk => "walk",
            RoutingMode::Drive => "drive",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            RoutingMode::Walk => "Walking",
            RoutingMode::Drive => "Driving",
        }
    }
}

impl Default for RoutingMode {
    fn default() -> Self {
        RoutingMode::Walk
    }
}

/// Identifies the routing backend that produced a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct EngineTag(String);

impl EngineTag {
    pub fn new(tag: impl Into<String>) -> Result<Self, ContractViolation> {
        let tag = tag.into();
        validate_token("engine_tag", &tag, 32)?;
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Instruction {
    pub text: String,
    pub speech_text: String,
    pub distance_m: f64,
    pub duration_s: f64,
    pub maneuver_type: String,
    pub maneuver_modifier: Option<String>,
    pub road_name: Option<String>,
    /// End of this maneuver step. Absent when the backend did not report one.
    pub end_location: Option<GeoPoint>,
    /// `[start, end]` indices into the owning route's geometry.
    pub way_points: Option<[usize; 2]>,
}

impl Instruction {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        text: String,
        speech_text: String,
        distance_m: f64,
        duration_s: f64,
        maneuver_type: String,
        maneuver_modifier: Option<String>,
        road_name: Option<String>,
        end_location: Option<GeoPoint>,
        way_points: Option<[usize; 2]>,
    ) -> Result<Self, ContractViolation> {
        let i = Self {
            text,
            speech_text,
            distance_m,
            duration_s,
            maneuver_type,
            maneuver_modifier,
            road_name,
            end_location,
            way_points,
        };
        i.validate()?;
        Ok(i)
    }

    /// Spoken form when present, display text otherwise.
    pub fn spoken(&self) -> &str {
        if self.speech_text.trim().is_empty() {
            &self.text
        } else {
            &self.speech_text
        }
    }
}

impl Validate for Instruction {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("instruction.text", &self.text, 512)?;
        if !self.speech_text.is_empty() {
            validate_text("instruction.speech_text", &self.speech_text, 512)?;
        }
        validate_non_negative("instruction.distance_m", self.distance_m)?;
        validate_non_negative("instruction.duration_s", self.duration_s)?;
        validate_text("instruction.maneuver_type", &self.maneuver_type, 32)?;
        if let Some(end) = &self.end_location {
            end.validate()?;
        }
        if let Some([start, end]) = self.way_points {
            if start > end {
                return Err(ContractViolation::InvalidValue {
                    field: "instruction.way_points",
                    reason: "start index must be <= end index",
                });
            }
        }
        Ok(())
    }
}

/// Immutable once computed; a reroute replaces the whole value.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Route {
    pub instructions: Vec<Instruction>,
    pub total_distance_m: f64,
    pub total_duration_s: f64,
    pub geometry: Vec<GeoPoint>,
    /// Snapped input waypoints reported by the backend, in request order.
    pub waypoints: Vec<GeoPoint>,
    pub engine_tag: EngineTag,
}

impl Route {
    pub fn v1(
        instructions: Vec<Instruction>,
        total_distance_m: f64,
        total_duration_s: f64,
        geometry: Vec<GeoPoint>,
        waypoints: Vec<GeoPoint>,
        engine_tag: EngineTag,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            instructions,
            total_distance_m,
            total_duration_s,
            geometry,
            waypoints,
            engine_tag,
        };
        r.validate()?;
        Ok(r)
    }

    pub fn instruction(&self, step_index: usize) -> Option<&Instruction> {
        self.instructions.get(step_index)
    }

    pub fn step_count(&self) -> usize {
        self.instructions.len()
    }
}

impl Validate for Route {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.instructions.len() > ROUTE_MAX_INSTRUCTIONS {
            return Err(ContractViolation::InvalidValue {
                field: "route.instructions",
                reason: "exceeds max instruction count",
            });
        }
        for instruction in &self.instructions {
            instruction.validate()?;
        }
        validate_non_negative("route.total_distance_m", self.total_distance_m)?;
        validate_non_negative("route.total_duration_s", self.total_duration_s)?;
        if self.geometry.len() > ROUTE_MAX_GEOMETRY_POINTS {
            return Err(ContractViolation::InvalidValue {
                field: "route.geometry",
                reason: "exceeds max geometry points",
            });
        }
        for p in self.geometry.iter().chain(self.waypoints.iter()) {
            p.validate()?;
        }
        Ok(())
    }
}
