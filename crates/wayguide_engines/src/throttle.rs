#![forbid(unsafe_code)]

use wayguide_kernel_contracts::vision::SteerHeading;
use wayguide_kernel_contracts::MonotonicTimeNs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechThrottleConfig {
    pub hazard_gap_ms: u64,
    pub route_gap_ms: u64,
}

impl SpeechThrottleConfig {
    pub fn mvp_v1() -> Self {
        Self {
            hazard_gap_ms: 1_000,
            route_gap_ms: 3_000,
        }
    }
}

/// Filler lines, before and after blind-user rewriting.
const GENERIC_NARRATIONS: &[&str] = &[
    "proceed carefully",
    "proceed straight carefully",
    "walk slowly and listen for guidance",
    "walk straight ahead slowly and listen for guidance",
];

pub fn is_generic_narration(narration: &str) -> bool {
    let n = narration.trim().trim_end_matches('.').to_lowercase();
    GENERIC_NARRATIONS.contains(&n.as_str())
}

/// Sorted hazards joined by `|`, then `:` and the steer.
pub fn hazard_signature(hazards: &[String], steer: SteerHeading) -> String {
    let mut sorted: Vec<&str> = hazards.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    format!("{}:{}", sorted.join("|"), steer.phrase())
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LastSpoken {
    pub narration: String,
    pub hazard_signature: String,
    pub step_signature: String,
    pub steer: SteerHeading,
    pub at: MonotonicTimeNs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakTrigger {
    HazardsChanged,
    SteerChanged,
    StepChanged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechDecision {
    pub speak: bool,
    pub trigger: Option<SpeakTrigger>,
    pub hazard_signature: String,
    pub min_gap_ms: u64,
}

/// Decides whether a fused narration is worth saying out loud now.
#[derive(Debug, Clone)]
pub struct SpeechThrottle {
    config: SpeechThrottleConfig,
}

impl SpeechThrottle {
    pub fn new(config: SpeechThrottleConfig) -> Self {
        Self { config }
    }

    pub fn decide(
        &self,
        last: Option<&LastSpoken>,
        narration: &str,
        hazards: &[String],
        steer: SteerHeading,
        step_signature: &str,
        now: MonotonicTimeNs,
    ) -> SpeechDecision {
        let hazard_sig = hazard_signature(hazards, steer);
        let min_gap_ms = if hazards.is_empty() {
            self.config.route_gap_ms
        } else {
            self.config.hazard_gap_ms
        };

        let trigger = if !hazards.is_empty()
            && last.map_or(true, |l| l.hazard_signature != hazard_sig)
        {
            Some(SpeakTrigger::HazardsChanged)
        } else if !steer.is_straight() && last.map_or(true, |l| l.steer != steer) {
            Some(SpeakTrigger::SteerChanged)
        } else if !step_signature.is_empty()
            && last.map_or(true, |l| l.step_signature != step_signature)
        {
            Some(SpeakTrigger::StepChanged)
        } else {
            None
        };
        // Filler only goes out alongside a hazard change.
        let trigger = match trigger {
            Some(t) if is_generic_narration(narration) && t != SpeakTrigger::HazardsChanged => None,
            other => other,
        };

        let gap_ok = last.map_or(true, |l| now.elapsed_ms_since(l.at) >= min_gap_ms);
        SpeechDecision {
            speak: trigger.is_some() && gap_ok && !narration.trim().is_empty(),
            trigger,
            hazard_signature: hazard_sig,
            min_gap_ms,
        }
    }

    /// What to remember after a line was actually spoken.
    pub fn spoken(
        decision: &SpeechDecision,
        narration: &str,
        steer: SteerHeading,
        step_signature: &str,
        now: MonotonicTimeNs,
    ) -> LastSpoken {
        LastSpoken {
            narration: narration.to_string(),
            hazard_signature: decision.hazard_signature.clone(),
            step_signature: step_signature.to_string(),
            steer,
            at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle() -> SpeechThrottle {
        SpeechThrottle::new(SpeechThrottleConfig::mvp_v1())
    }

    fn hz(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn ms(v: u64) -> MonotonicTimeNs {
        MonotonicTimeNs::from_millis(v)
    }

    #[test]
    fn at_throttle_01_first_speaks_identical_repeat_does_not() {
        let t = throttle();
        let hazards = hz(&["dark obstacle ahead"]);
        let line = "Obstacle: an obstacle ahead, move slightly left, then continue right.";
        let d1 = t.decide(None, line, &hazards, SteerHeading::SlightlyLeft, "0:turn", ms(1_000));
        assert!(d1.speak);
        assert_eq!(d1.trigger, Some(SpeakTrigger::HazardsChanged));
        let last = SpeechThrottle::spoken(&d1, line, SteerHeading::SlightlyLeft, "0:turn", ms(1_000));

        let d2 = t.decide(Some(&last), line, &hazards, SteerHeading::SlightlyLeft, "0:turn", ms(1_200));
        assert!(!d2.speak);
        assert_eq!(d2.trigger, None);
    }

    #[test]
    fn at_throttle_02_change_within_gap_is_held() {
        let t = throttle();
        let first = hz(&["pole"]);
        let d = t.decide(None, "x", &first, SteerHeading::Left, "s", ms(0));
        let last = SpeechThrottle::spoken(&d, "x", SteerHeading::Left, "s", ms(0));

        let second = hz(&["bench"]);
        let held = t.decide(Some(&last), "y", &second, SteerHeading::Left, "s", ms(500));
        assert_eq!(held.trigger, Some(SpeakTrigger::HazardsChanged));
        assert!(!held.speak);
        let ok = t.decide(Some(&last), "y", &second, SteerHeading::Left, "s", ms(1_000));
        assert!(ok.speak);
    }

    #[test]
    fn at_throttle_03_route_change_uses_longer_gap() {
        let t = throttle();
        let d = t.decide(None, "Walk 40 steps straight.", &[], SteerHeading::Straight, "0", ms(0));
        assert!(d.speak);
        let last = SpeechThrottle::spoken(&d, "Walk 40 steps straight.", SteerHeading::Straight, "0", ms(0));
        let early = t.decide(Some(&last), "Walk 9 steps right.", &[], SteerHeading::Straight, "1", ms(2_000));
        assert_eq!(early.trigger, Some(SpeakTrigger::StepChanged));
        assert!(!early.speak);
        assert_eq!(early.min_gap_ms, 3_000);
    }

    #[test]
    fn at_throttle_04_filler_never_forces_speech() {
        let t = throttle();
        let d = t.decide(None, "Walk slowly and listen for guidance.", &[], SteerHeading::Straight, "0", ms(0));
        assert!(!d.speak);
        let d = t.decide(None, "Proceed carefully", &[], SteerHeading::SlightlyRight, "0", ms(0));
        assert!(!d.speak);
        assert!(is_generic_narration("proceed carefully."));
        assert!(!is_generic_narration("Walk 4 more steps right."));
    }

    #[test]
    fn at_throttle_05_signature_sorts_hazards() {
        assert_eq!(
            hazard_signature(&hz(&["pole", "bench"]), SteerHeading::SlightlyLeft),
            "bench|pole:slightly left"
        );
    }
}
