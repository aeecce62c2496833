#![forbid(unsafe_code)]

use wayguide_kernel_contracts::route::Instruction;
use wayguide_kernel_contracts::vision::{SteerHeading, VisionAnalysis};

use crate::narration::{
    add_intersection_guidance, brief_route_instruction, extract_direction, humanize_hazard,
    improve_for_blind_users, NavDirection,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionConfig {
    pub meters_per_step: f64,
    /// At or below this many steps the narration says "more steps".
    pub final_steps: u32,
}

impl FusionConfig {
    pub fn mvp_v1() -> Self {
        Self {
            meters_per_step: 0.7,
            final_steps: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FusedGuidance {
    pub narration: String,
    pub hazards: Vec<String>,
    /// Steering reported by the vision provider; straight when it gave none.
    pub suggested_heading: SteerHeading,
    pub steps_remaining: u32,
    pub nav_direction: NavDirection,
}

/// Merges the active route instruction with one frame's obstacle analysis into a single line.
#[derive(Debug, Clone)]
pub struct GuidanceFusion {
    config: FusionConfig,
}

impl GuidanceFusion {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn fuse(&self, instruction: Option<&Instruction>, analysis: &VisionAnalysis) -> FusedGuidance {
        let steer = analysis.suggested_heading.unwrap_or(SteerHeading::Straight);
        let (nav_distance, nav_text) = match instruction {
            Some(i) => (i.distance_m, i.spoken().to_string()),
            None => (0.0, String::new()),
        };
        let nav_direction = extract_direction(&nav_text);
        let steps_remaining = self.steps_for(nav_distance);

        let narration = if analysis.has_hazards() {
            let prefix = obstacle_prefix(&analysis.hazards);
            let action = match steer {
                SteerHeading::Straight => match nav_direction {
                    NavDirection::Left => "right",
                    NavDirection::Right => "left",
                    NavDirection::Straight => "slightly left",
                },
                other => other.phrase(),
            };
            format!(
                "{prefix}move {action}, then continue {}",
                nav_direction.as_str()
            )
        } else if steps_remaining > 0 {
            let more = if steps_remaining <= self.config.final_steps {
                "more "
            } else {
                ""
            };
            format!(
                "Walk {steps_remaining} {more}steps {}.",
                nav_direction.as_str()
            )
        } else if !nav_text.trim().is_empty() {
            brief_route_instruction(&nav_text)
        } else {
            "Continue straight ahead.".to_string()
        };

        let narration = add_intersection_guidance(&improve_for_blind_users(&narration));

        FusedGuidance {
            narration,
            hazards: analysis.hazards.clone(),
            suggested_heading: steer,
            steps_remaining,
            nav_direction,
        }
    }

    fn steps_for(&self, distance_m: f64) -> u32 {
        if !(distance_m.is_finite() && distance_m > 0.0) || self.config.meters_per_step <= 0.0 {
            return 0;
        }
        (distance_m / self.config.meters_per_step) as u32
    }
}

fn obstacle_prefix(hazards: &[String]) -> String {
    let names: Vec<String> = hazards.iter().map(|h| humanize_hazard(h)).collect();
    let joined = names.join(", ");
    let label = if hazards.len() > 1 { "Obstacles" } else { "Obstacle" };
    if joined.ends_with("ahead") {
        format!("{label}: {joined}, ")
    } else {
        format!("{label}: {joined} ahead, ")
    }
}
