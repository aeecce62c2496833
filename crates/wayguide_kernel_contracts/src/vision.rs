#![forbid(unsafe_code)]

use crate::common::{validate_text, validate_token};
use crate::{ContractViolation, Validate};

pub const VISION_MAX_HAZARDS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteerHeading {
    Left,
    SlightlyLeft,
    Straight,
    SlightlyRight,
    Right,
}

impl SteerHeading {
    /// Lenient parse of provider output: "slightly-left", "slightly_left", "slight left", ...
    pub fn parse(raw: &str) -> Option<Self> {
        let norm: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '-' || c == '_' { ' ' } else { c })
            .collect();
        let norm = norm.split_whitespace().collect::<Vec<_>>().join(" ");
        match norm.as_str() {
            "left" | "hard left" => Some(SteerHeading::Left),
            "slightly left" | "slight left" | "bear left" => Some(SteerHeading::SlightlyLeft),
            "straight" | "straight ahead" | "ahead" | "forward" | "center" | "centre" => {
                Some(SteerHeading::Straight)
            }
            "slightly right" | "slight right" | "bear right" => Some(SteerHeading::SlightlyRight),
            "right" | "hard right" => Some(SteerHeading::Right),
            _ => None,
        }
    }

    pub fn phrase(self) -> &'static str {
        match self {
            SteerHeading::Left => "left",
            SteerHeading::SlightlyLeft => "slightly left",
            SteerHeading::Straight => "straight",
            SteerHeading::SlightlyRight => "slightly right",
            SteerHeading::Right => "right",
        }
    }

    pub fn is_straight(self) -> bool {
        self == SteerHeading::Straight
    }
}

/// Result of analysing one camera frame.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VisionAnalysis {
    /// Distinct hazard labels in provider order.
    pub hazards: Vec<String>,
    pub suggested_heading: Option<SteerHeading>,
    pub narration: String,
    pub provider: String,
}

impl VisionAnalysis {
    /// Trims labels and drops blanks and duplicates before validating.
    pub fn v1(
        hazards: Vec<String>,
        suggested_heading: Option<SteerHeading>,
        narration: String,
        provider: String,
    ) -> Result<Self, ContractViolation> {
        let mut cleaned: Vec<String> = Vec::with_capacity(hazards.len());
        for h in hazards {
            let h = h.trim().to_string();
            if !h.is_empty() && !cleaned.contains(&h) {
                cleaned.push(h);
            }
        }
        let v = Self {
            hazards: cleaned,
            suggested_heading,
            narration: narration.trim().to_string(),
            provider,
        };
        v.validate()?;
        Ok(v)
    }

    pub fn has_hazards(&self) -> bool {
        !self.hazards.is_empty()
    }

    pub fn sorted_hazards(&self) -> Vec<String> {
        let mut out = self.hazards.clone();
        out.sort();
        out
    }
}

impl Validate for VisionAnalysis {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.hazards.len() > VISION_MAX_HAZARDS {
            return Err(ContractViolation::InvalidValue {
                field: "vision_analysis.hazards",
                reason: "must be <= 16 items",
            });
        }
        for h in &self.hazards {
            validate_text("vision_analysis.hazards[]", h, 128)?;
        }
        if !self.narration.is_empty() && self.narration.len() > 1024 {
            return Err(ContractViolation::InvalidValue {
                field: "vision_analysis.narration",
                reason: "exceeds max length",
            });
        }
        validate_token("vision_analysis.provider", &self.provider, 64)?;
        Ok(())
    }
}
