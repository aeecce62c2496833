#![forbid(unsafe_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::GrayImage;
use serde_json::{json, Value};
use tracing::{debug, warn};
use wayguide_kernel_contracts::vision::{SteerHeading, VisionAnalysis};

use super::http::{build_agent, provider_error_from_ureq, read_json, trim_base_url};
use super::{ProviderError, VisionContext, VisionFrame, VisionProvider};

const OPENAI_COMPAT: &str = "openai_compat";
const HEURISTIC: &str = "heuristic";
const DEFAULT_NARRATION: &str = "Proceed carefully.";
const MAX_HAZARDS: usize = 16;
const MAX_PLAIN_REPLY_CHARS: usize = 120;

const PROMPT: &str = "You are a blind-pedestrian navigation assistant. \
Analyze the image and provide real-time obstacle detection and guidance. Return STRICT JSON:\n\
{\"hazards\":[\"...\"],\"suggested_heading\":\"left|slightly left|straight|slightly right|right\",\"narration\":\"at most 15 words\"}\n\
Rules:\n\
- Detect obstacles: people, vehicles, poles, barriers, uneven surfaces, steps, curbs\n\
- When obstacles are detected always suggest left, right, slightly left or slightly right\n\
- For clear paths suggest straight\n\
- Consider the current route direction when suggesting steering\n\
- Never use visual references such as watch, look or see\n\
- Prioritize safety over route following\n";

#[derive(Debug, Clone, PartialEq)]
pub struct VisionProviderConfig {
    /// Base of an OpenAI-compatible API, e.g. `https://api.x.ai/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub user_agent: String,
    pub temperature: f64,
    /// Allows the luminance heuristic to stand in for the model. Off unless asked for.
    pub heuristic_enabled: bool,
}

impl VisionProviderConfig {
    pub fn mvp_v1() -> Self {
        Self {
            base_url: "https://api.x.ai/v1".to_string(),
            model: "grok-2-vision".to_string(),
            api_key: None,
            timeout_ms: 5_000,
            user_agent: "wayguide/0.1".to_string(),
            temperature: 0.2,
            heuristic_enabled: false,
        }
    }
}

#[derive(Debug)]
pub struct OpenAiCompatVisionProvider {
    config: VisionProviderConfig,
    agent: ureq::Agent,
}

impl OpenAiCompatVisionProvider {
    pub fn new(config: VisionProviderConfig) -> Result<Self, ProviderError> {
        if trim_base_url(&config.base_url).is_empty() || config.model.trim().is_empty() {
            return Err(ProviderError::NotConfigured {
                provider: OPENAI_COMPAT,
                detail: "base_url and model are required".to_string(),
            });
        }
        let agent = build_agent(config.timeout_ms, &config.user_agent);
        Ok(Self { config, agent })
    }

    fn request_body(&self, frame: &VisionFrame, context: VisionContext<'_>) -> Value {
        let prompt = format!(
            "{PROMPT}Current route instruction: {}\nContext: {}",
            context.route_instruction.unwrap_or(""),
            context.client_context.unwrap_or("")
        );
        let data_url = format!(
            "data:{};base64,{}",
            frame.mime_type(),
            BASE64.encode(&frame.bytes)
        );
        json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": prompt},
                    {"type": "image_url", "image_url": {"url": data_url}}
                ]
            }]
        })
    }
}

impl VisionProvider for OpenAiCompatVisionProvider {
    fn name(&self) -> &'static str {
        OPENAI_COMPAT
    }

    fn analyze(
        &self,
        frame: &VisionFrame,
        context: VisionContext<'_>,
    ) -> Result<VisionAnalysis, ProviderError> {
        let url = format!("{}/chat/completions", trim_base_url(&self.config.base_url));
        let mut request = self.agent.post(&url);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }
        let response = request
            .send_json(self.request_body(frame, context))
            .map_err(|e| provider_error_from_ureq(OPENAI_COMPAT, e))?;
        let body = read_json(OPENAI_COMPAT, response)?;
        let content = body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::parse(OPENAI_COMPAT, "missing choices[0].message.content"))?;
        parse_vision_reply(content, OPENAI_COMPAT)
    }
}

/// Reads the JSON object embedded in a model reply. A reply without one becomes a bare
/// narration with no hazards.
pub fn parse_vision_reply(content: &str, provider: &str) -> Result<VisionAnalysis, ProviderError> {
    let object = match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if end > start => Some(&content[start..=end]),
        _ => None,
    };
    let Some(object) = object else {
        let narration: String = content.trim().chars().take(MAX_PLAIN_REPLY_CHARS).collect();
        let narration = if narration.is_empty() {
            DEFAULT_NARRATION.to_string()
        } else {
            narration
        };
        return VisionAnalysis::v1(Vec::new(), Some(SteerHeading::Straight), narration, provider.to_string())
            .map_err(|e| ProviderError::parse(OPENAI_COMPAT, e.to_string()));
    };

    let parsed: Value = serde_json::from_str(object)
        .map_err(|e| ProviderError::parse(OPENAI_COMPAT, format!("reply json: {e}")))?;
    let hazards: Vec<String> = parsed
        .get("hazards")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|h| match h {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .take(MAX_HAZARDS)
                .collect()
        })
        .unwrap_or_default();
    let steer = parsed
        .get("suggested_heading")
        .and_then(Value::as_str)
        .and_then(SteerHeading::parse)
        .unwrap_or(SteerHeading::Straight);
    let narration = parsed
        .get("narration")
        .and_then(Value::as_str)
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(DEFAULT_NARRATION)
        .to_string();
    VisionAnalysis::v1(hazards, Some(steer), narration, provider.to_string())
        .map_err(|e| ProviderError::parse(OPENAI_COMPAT, e.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicThresholds {
    /// Centre must be this much darker than the brighter side to count as an obstacle.
    pub center_margin: f64,
    pub side_margin: f64,
}

impl HeuristicThresholds {
    pub fn mvp_v1() -> Self {
        Self {
            center_margin: 12.0,
            side_margin: 15.0,
        }
    }
}

/// Compares mean luminance of the left, centre and right thirds of the frame.
#[derive(Debug, Clone)]
pub struct HeuristicVisionProvider {
    thresholds: HeuristicThresholds,
}

impl HeuristicVisionProvider {
    pub fn new(thresholds: HeuristicThresholds) -> Self {
        Self { thresholds }
    }

    pub fn analyze_luma(&self, gray: &GrayImage) -> Result<VisionAnalysis, ProviderError> {
        let [left, center, right] = third_means(gray);
        let t = self.thresholds;
        let (hazard, steer) = if center + t.center_margin < left.max(right) {
            let steer = if left > right {
                SteerHeading::SlightlyLeft
            } else {
                SteerHeading::SlightlyRight
            };
            (Some("dark obstacle ahead"), steer)
        } else if left + t.side_margin < right {
            (Some("left side clutter"), SteerHeading::SlightlyRight)
        } else if right + t.side_margin < left {
            (Some("right side clutter"), SteerHeading::SlightlyLeft)
        } else {
            (None, SteerHeading::Straight)
        };
        debug!(left, center, right, hazard = hazard.unwrap_or("none"), "heuristic frame means");

        let narration = if hazard.is_some() && !steer.is_straight() {
            let phrase = steer.phrase();
            let mut chars = phrase.chars();
            match chars.next() {
                Some(first) => format!("{}{} and continue.", first.to_ascii_uppercase(), chars.as_str()),
                None => DEFAULT_NARRATION.to_string(),
            }
        } else {
            DEFAULT_NARRATION.to_string()
        };
        VisionAnalysis::v1(
            hazard.map(str::to_string).into_iter().collect(),
            Some(steer),
            narration,
            HEURISTIC.to_string(),
        )
        .map_err(|e| ProviderError::parse(HEURISTIC, e.to_string()))
    }
}

fn third_means(gray: &GrayImage) -> [f64; 3] {
    let (w, h) = gray.dimensions();
    let third = (w / 3).max(1);
    let bounds = [(0, third), (third, (2 * third).min(w)), ((2 * third).min(w), w)];
    let mut means = [0.0; 3];
    for (slot, (x0, x1)) in means.iter_mut().zip(bounds) {
        let mut sum = 0u64;
        let mut count = 0u64;
        for y in 0..h {
            for x in x0..x1 {
                sum += u64::from(gray.get_pixel(x, y).0[0]);
                count += 1;
            }
        }
        *slot = if count == 0 { 0.0 } else { sum as f64 / count as f64 };
    }
    means
}

impl VisionProvider for HeuristicVisionProvider {
    fn name(&self) -> &'static str {
        HEURISTIC
    }

    fn analyze(
        &self,
        frame: &VisionFrame,
        _context: VisionContext<'_>,
    ) -> Result<VisionAnalysis, ProviderError> {
        let decoded = image::load_from_memory(&frame.bytes)
            .map_err(|e| ProviderError::parse(HEURISTIC, format!("image decode: {e}")))?;
        self.analyze_luma(&decoded.to_luma8())
    }
}

/// Primary model first; the heuristic answers only when explicitly enabled.
pub struct FallbackVisionProvider {
    primary: Option<Box<dyn VisionProvider>>,
    heuristic: HeuristicVisionProvider,
    heuristic_enabled: bool,
}

impl FallbackVisionProvider {
    pub fn new(primary: Option<Box<dyn VisionProvider>>, heuristic_enabled: bool) -> Self {
        Self {
            primary,
            heuristic: HeuristicVisionProvider::new(HeuristicThresholds::mvp_v1()),
            heuristic_enabled,
        }
    }
}

impl VisionProvider for FallbackVisionProvider {
    fn name(&self) -> &'static str {
        match &self.primary {
            Some(p) => p.name(),
            None => HEURISTIC,
        }
    }

    fn analyze(
        &self,
        frame: &VisionFrame,
        context: VisionContext<'_>,
    ) -> Result<VisionAnalysis, ProviderError> {
        match &self.primary {
            Some(primary) => match primary.analyze(frame, context) {
                Ok(analysis) => Ok(analysis),
                Err(e) if self.heuristic_enabled => {
                    warn!(provider = primary.name(), error = %e, "vision provider failed, using heuristic");
                    self.heuristic.analyze(frame, context)
                }
                Err(e) => Err(e),
            },
            None if self.heuristic_enabled => self.heuristic.analyze(frame, context),
            None => Err(ProviderError::NotConfigured {
                provider: HEURISTIC,
                detail: "no vision provider and heuristic disabled".to_string(),
            }),
        }
    }
}
