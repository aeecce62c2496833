#![forbid(unsafe_code)]

//! Spoken and displayed text for routes: maneuver phrasing, distance prefixes, summaries and the
//! rewrites that turn visual directions into guidance a blind pedestrian can act on.

use wayguide_kernel_contracts::route::Route;

const LOCAL_STREET: &str = "a local street";

pub fn instruction_text(
    maneuver_type: &str,
    modifier: Option<&str>,
    road_name: Option<&str>,
    exit: Option<u32>,
) -> String {
    let road = road_name.map(str::trim).filter(|r| !r.is_empty());
    let onto = road.map(|r| format!(" onto {r}")).unwrap_or_default();
    let mt = maneuver_type.trim().to_ascii_lowercase();
    let m = modifier.unwrap_or("").trim().to_ascii_lowercase();
    let side = if m.contains("left") { "left" } else { "right" };

    match mt.as_str() {
        "depart" => match road {
            Some(r) => format!("Start on {r}"),
            None => "Start and go straight".to_string(),
        },
        "arrive" => match m.as_str() {
            "left" => "You have arrived on the left".to_string(),
            "right" => "You have arrived on the right".to_string(),
            _ => "You have arrived".to_string(),
        },
        "turn" | "end of road" => {
            if m.contains("slight") {
                format!("Turn slightly {side}{onto}")
            } else if m.contains("sharp") {
                format!("Turn sharply {side}{onto}")
            } else if m == "left" || m == "right" {
                format!("Turn {m}{onto}")
            } else {
                format!("Turn{onto}")
            }
        }
        "continue" | "new name" | "notification" => format!("Continue straight{onto}"),
        "fork" => {
            if m == "left" || m == "right" {
                format!("Keep {m}{onto}")
            } else {
                format!("Keep to the main path{onto}")
            }
        }
        "merge" => {
            if m == "left" || m == "right" {
                format!("Merge {m}{onto}")
            } else {
                format!("Merge{onto}")
            }
        }
        "roundabout" | "rotary" => match exit {
            Some(n) if n > 0 => format!("At the roundabout, take the {} exit{onto}", ordinal(n)),
            _ if !m.is_empty() => format!("At the roundabout, go {m}{onto}"),
            _ => format!("At the roundabout, proceed straight{onto}"),
        },
        "u-turn" | "uturn" => "Make a U-turn and continue".to_string(),
        _ => format!("Continue{onto}"),
    }
}

fn ordinal(n: u32) -> String {
    let suffix = if (11..=13).contains(&(n % 100)) {
        "th"
    } else {
        match n % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        }
    };
    format!("{n}{suffix}")
}

fn round_to(value: f64, step: f64) -> i64 {
    ((value / step).round() * step) as i64
}

/// Prefixes `text` with how far away the maneuver is. Arrivals are spoken without a prefix.
pub fn speech_text(text: &str, distance_m: f64, maneuver_type: &str) -> String {
    let spoken = text.trim();
    if maneuver_type.trim().eq_ignore_ascii_case("arrive") {
        return spoken.to_string();
    }
    let d = if distance_m.is_finite() { distance_m.max(0.0) } else { 0.0 };
    let prefix = if d < 12.0 {
        "Now,".to_string()
    } else if d < 40.0 {
        format!("In {} meters,", round_to(d, 5.0))
    } else if d < 150.0 {
        format!("In {} meters,", round_to(d, 10.0))
    } else if d < 1_000.0 {
        format!("In {} meters,", round_to(d, 25.0))
    } else {
        format!("In {:.1} kilometers,", d / 1_000.0)
    };
    format!("{prefix} {spoken}")
}

fn distance_words(meters: f64) -> String {
    if meters < 1_000.0 {
        format!("{} meters", meters.max(0.0) as i64)
    } else {
        format!("{:.1} kilometers", meters / 1_000.0)
    }
}

pub fn route_summary(route: &Route) -> String {
    let minutes = (route.total_duration_s.max(0.0) / 60.0) as u64;
    let duration = if minutes < 60 {
        format!("{minutes} minutes")
    } else {
        let hours = minutes / 60;
        let plural = if hours > 1 { "s" } else { "" };
        format!("{hours} hour{plural} and {} minutes", minutes % 60)
    };
    format!(
        "The route is {} and will take approximately {duration}",
        distance_words(route.total_distance_m)
    )
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RouteProgress {
    pub distance_remaining_m: f64,
    pub duration_remaining_s: f64,
    pub distance_remaining: String,
    pub time_remaining: String,
    pub progress_percentage: u8,
    /// One-based.
    pub current_step: usize,
    pub total_steps: usize,
}

pub fn route_progress(route: &Route, step_index: usize) -> RouteProgress {
    let remaining = route.instructions.iter().skip(step_index);
    let (distance_remaining_m, duration_remaining_s) = remaining
        .fold((0.0, 0.0), |(d, t), i| (d + i.distance_m, t + i.duration_s));
    let total = route.total_distance_m;
    let progress_percentage = if total > 0.0 {
        (((total - distance_remaining_m) / total) * 100.0).clamp(0.0, 100.0) as u8
    } else {
        0
    };
    let distance_remaining = if distance_remaining_m < 1_000.0 {
        format!("{} meters", distance_remaining_m as i64)
    } else {
        format!("{:.1} km", distance_remaining_m / 1_000.0)
    };
    let minutes = (duration_remaining_s / 60.0) as u64;
    let time_remaining = if minutes > 0 {
        format!("{minutes} min")
    } else {
        "less than 1 min".to_string()
    };
    RouteProgress {
        distance_remaining_m,
        duration_remaining_s,
        distance_remaining,
        time_remaining,
        progress_percentage,
        current_step: step_index + 1,
        total_steps: route.instructions.len(),
    }
}

/// Broad direction of a route instruction, used to phrase obstacle avoidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavDirection {
    Left,
    Right,
    Straight,
}

impl NavDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            NavDirection::Left => "left",
            NavDirection::Right => "right",
            NavDirection::Straight => "straight",
        }
    }
}

/// "right" wins over "left" when both appear, matching how turn text is phrased.
pub fn extract_direction(instruction: &str) -> NavDirection {
    let lower = instruction.to_lowercase();
    if lower.contains("right") {
        NavDirection::Right
    } else if lower.contains("left") {
        NavDirection::Left
    } else {
        NavDirection::Straight
    }
}

pub fn humanize_hazard(hazard: &str) -> String {
    let t = hazard.to_lowercase();
    if t.contains("left side clutter") {
        "obstacles on your left".to_string()
    } else if t.contains("right side clutter") {
        "obstacles on your right".to_string()
    } else if t.contains("obstacle") {
        "an obstacle ahead".to_string()
    } else {
        hazard.trim().to_string()
    }
}

// `#` matches a run of ASCII digits and is copied into the replacement.
const BLIND_USER_REWRITES: &[(&str, &str)] = &[
    ("start and go straight", "begin walking straight ahead"),
    ("start", "begin walking"),
    ("depart", "begin walking"),
    ("go straight ahead", "walk straight ahead"),
    ("go straight", "walk straight ahead"),
    ("continue straight ahead", "keep walking straight ahead"),
    ("continue straight", "keep walking straight ahead"),
    (
        "turn right at the next intersection",
        "walk straight until you feel the intersection, then turn right",
    ),
    (
        "turn left at the next intersection",
        "walk straight until you feel the intersection, then turn left",
    ),
    (
        "turn slightly right at the next intersection",
        "walk straight until you feel the intersection, then turn slightly right",
    ),
    (
        "turn slightly left at the next intersection",
        "walk straight until you feel the intersection, then turn slightly left",
    ),
    ("in # meters", "walk approximately # meters"),
    ("in about # meters", "walk approximately # meters"),
    ("in # min", "walk for about # minutes"),
    ("you have arrived at your destination", "you have reached your destination"),
    ("you have arrived", "you have reached your destination"),
    ("arrive at your destination", "you have reached your destination"),
    ("on the road", "on the street"),
    ("onto the road", "onto the street"),
    ("proceed carefully", "walk slowly and listen for guidance"),
    (
        "proceed straight carefully",
        "walk straight ahead slowly and listen for guidance",
    ),
    (
        "walk carefully and watch for obstacles",
        "walk slowly and listen for guidance",
    ),
    ("watch for obstacles", "listen for guidance about obstacles"),
    ("watch for", "listen for guidance about"),
];

/// Rewrites visual or ambiguous phrasing into tactile and audible guidance. Output is lowercased,
/// then capitalised and terminated with a period.
pub fn improve_for_blind_users(narration: &str) -> String {
    let mut improved = narration.trim().to_lowercase();
    if improved.is_empty() {
        return improved;
    }
    for (pattern, replacement) in BLIND_USER_REWRITES {
        improved = replace_pattern(&improved, pattern, replacement);
    }
    let mut chars = improved.chars();
    let mut out = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    if !out.is_empty() && !out.ends_with('.') {
        out.push('.');
    }
    out
}

/// Adds a step count after the first turn phrase when the narration mentions an intersection.
pub fn add_intersection_guidance(narration: &str) -> String {
    // ASCII lowering keeps byte offsets aligned with `narration`.
    let lower = narration.to_ascii_lowercase();
    if !lower.contains("intersection") {
        return narration.to_string();
    }
    for turn in [
        "turn right",
        "turn left",
        "turn slightly right",
        "turn slightly left",
    ] {
        if let Some(at) = lower.find(turn) {
            let end = at + turn.len();
            return format!(
                "{} and walk 10 steps forward{}",
                &narration[..end],
                &narration[end..]
            );
        }
    }
    narration.to_string()
}

const DISTANCE_UNITS: &[&str] = &[
    "kilometers",
    "kilometer",
    "km",
    "meters",
    "meter",
    "m",
    "feet",
    "foot",
    "ft",
];

/// Drops distance phrasing from an instruction for real-time use, then collapses common turns to
/// an intersection cue.
pub fn brief_route_instruction(instruction: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let tokens: Vec<&str> = instruction.split_whitespace().collect();
    let mut i = 0;
    while i < tokens.len() {
        let tok = tokens[i];
        let bare = tok.trim_end_matches(',').to_ascii_lowercase();
        if bare.parse::<f64>().is_ok() {
            if let Some(next) = tokens.get(i + 1) {
                let unit = next.trim_end_matches(',').to_ascii_lowercase();
                if DISTANCE_UNITS.contains(&unit.as_str()) {
                    if words.last().map(|w| w.eq_ignore_ascii_case("in")).unwrap_or(false) {
                        words.pop();
                    }
                    i += 2;
                    continue;
                }
            }
        }
        if words.is_empty() && bare == "now" && tok.ends_with(',') {
            i += 1;
            continue;
        }
        words.push(tok.to_string());
        i += 1;
    }
    let brief = words
        .join(" ")
        .trim_matches(|c: char| c == ',' || c.is_whitespace())
        .to_string();

    let lower = brief.to_lowercase();
    if lower.contains("turn right") {
        "Turn right when you reach the intersection".to_string()
    } else if lower.contains("turn left") {
        "Turn left when you reach the intersection".to_string()
    } else if lower.contains("straight") {
        "Continue straight ahead".to_string()
    } else {
        brief
    }
}

fn is_arabic(c: char) -> bool {
    ('\u{0600}'..='\u{06FF}').contains(&c)
}

/// Replaces Arabic-script street names with a readable placeholder so speech engines do not skip
/// them. Adjacent Arabic words collapse into one placeholder.
pub fn replace_non_latin_street_names(text: &str) -> String {
    if !text.chars().any(is_arabic) {
        return text.to_string();
    }
    let mut out: Vec<&str> = Vec::new();
    for word in text.split_whitespace() {
        if word.chars().any(is_arabic) {
            if out.last() != Some(&LOCAL_STREET) {
                out.push(LOCAL_STREET);
            }
        } else {
            out.push(word);
        }
    }
    out.join(" ")
        .replace("on a local street", "on the local street")
        .replace("onto a local street", "onto the local street")
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Word-bounded phrase replacement; a `#` in `pattern` matches one run of ASCII digits.
fn replace_pattern(text: &str, pattern: &str, replacement: &str) -> String {
    let (head, tail) = match pattern.split_once('#') {
        Some((h, t)) => (h, Some(t)),
        None => (pattern, None),
    };
    let mut out = String::with_capacity(text.len());
    let mut idx = 0;
    while idx < text.len() {
        let rest = &text[idx..];
        let boundary_before = text[..idx].chars().next_back().map_or(true, |c| !is_word_char(c));
        if boundary_before {
            if let Some((consumed, digits)) = match_at(rest, head, tail) {
                let boundary_after = rest[consumed..].chars().next().map_or(true, |c| !is_word_char(c));
                if boundary_after {
                    out.push_str(&replacement.replacen('#', digits, 1));
                    idx += consumed;
                    continue;
                }
            }
        }
        let Some(c) = rest.chars().next() else { break };
        out.push(c);
        idx += c.len_utf8();
    }
    out
}

fn match_at<'a>(rest: &'a str, head: &str, tail: Option<&str>) -> Option<(usize, &'a str)> {
    if !rest.starts_with(head) {
        return None;
    }
    let Some(tail) = tail else {
        return Some((head.len(), ""));
    };
    let after_head = &rest[head.len()..];
    let digit_len = after_head.bytes().take_while(u8::is_ascii_digit).count();
    if digit_len == 0 {
        return None;
    }
    let after_digits = &after_head[digit_len..];
    if !after_digits.starts_with(tail) {
        return None;
    }
    Some((head.len() + digit_len + tail.len(), &after_head[..digit_len]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayguide_kernel_contracts::route::{EngineTag, Instruction};
    use wayguide_kernel_contracts::GeoPoint;

    #[test]
    fn at_narration_01_instruction_text_by_maneuver() {
        assert_eq!(instruction_text("depart", None, None, None), "Start and go straight");
        assert_eq!(
            instruction_text("depart", None, Some("Corniche Road"), None),
            "Start on Corniche Road"
        );
        assert_eq!(
            instruction_text("arrive", Some("left"), None, None),
            "You have arrived on the left"
        );
        assert_eq!(
            instruction_text("turn", Some("slight right"), Some("Hamdan St"), None),
            "Turn slightly right onto Hamdan St"
        );
        assert_eq!(instruction_text("end of road", Some("sharp left"), None, None), "Turn sharply left");
        assert_eq!(instruction_text("new name", None, Some(" "), None), "Continue straight");
        assert_eq!(instruction_text("fork", Some("left"), None, None), "Keep left");
        assert_eq!(
            instruction_text("roundabout", Some("right"), None, Some(3)),
            "At the roundabout, take the 3rd exit"
        );
        assert!(instruction_text("roundabout", None, None, Some(12)).contains("12th"));
        assert_eq!(instruction_text("u-turn", None, None, None), "Make a U-turn and continue");
        assert_eq!(instruction_text("use lane", None, Some("X"), None), "Continue onto X");
    }

    #[test]
    fn at_narration_02_speech_prefix_bands() {
        assert_eq!(speech_text("Turn left", 8.0, "turn"), "Now, Turn left");
        assert_eq!(speech_text("Turn left", 33.0, "turn"), "In 35 meters, Turn left");
        assert_eq!(speech_text("Turn left", 84.0, "turn"), "In 80 meters, Turn left");
        assert_eq!(speech_text("Turn left", 440.0, "turn"), "In 450 meters, Turn left");
        assert_eq!(speech_text("Turn left", 1_260.0, "turn"), "In 1.3 kilometers, Turn left");
        assert_eq!(speech_text("You have arrived", 300.0, "arrive"), "You have arrived");
    }

    fn route() -> Route {
        let step = |d: f64, t: f64| {
            Instruction::v1(
                "Continue straight".into(),
                String::new(),
                d,
                t,
                "continue".into(),
                None,
                None,
                None,
                None,
            )
            .unwrap()
        };
        Route::v1(
            vec![step(300.0, 240.0), step(700.0, 500.0), step(200.0, 3_400.0)],
            1_200.0,
            4_140.0,
            vec![GeoPoint::v1(24.4, 54.6).unwrap()],
            vec![],
            EngineTag::new("osrm").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn at_narration_03_summary_and_progress() {
        assert_eq!(
            route_summary(&route()),
            "The route is 1.2 kilometers and will take approximately 1 hour and 9 minutes"
        );
        let p = route_progress(&route(), 1);
        assert_eq!(p.distance_remaining, "900 meters");
        assert_eq!(p.progress_percentage, 25);
        assert_eq!(p.current_step, 2);
        assert_eq!(p.total_steps, 3);
        assert_eq!(p.time_remaining, "65 min");
    }

    #[test]
    fn at_narration_04_blind_user_rewrites() {
        assert_eq!(
            improve_for_blind_users("Start and go straight"),
            "Begin walking straight ahead."
        );
        assert_eq!(
            improve_for_blind_users("Turn right at the next intersection"),
            "Walk straight until you feel the intersection, then turn right."
        );
        assert_eq!(
            improve_for_blind_users("In 40 meters, turn left"),
            "Walk approximately 40 meters, turn left."
        );
        assert_eq!(
            improve_for_blind_users("Proceed carefully"),
            "Walk slowly and listen for guidance."
        );
        assert_eq!(improve_for_blind_users("restart"), "Restart.");
        assert_eq!(improve_for_blind_users(""), "");
    }

    #[test]
    fn at_narration_05_intersection_guidance_only_with_intersection() {
        assert_eq!(
            add_intersection_guidance("Walk straight until you feel the intersection, then turn right."),
            "Walk straight until you feel the intersection, then turn right and walk 10 steps forward."
        );
        assert_eq!(add_intersection_guidance("Now, turn right."), "Now, turn right.");
    }

    #[test]
    fn at_narration_06_brief_drops_distance() {
        assert_eq!(
            brief_route_instruction("In 80 meters, Turn left onto Hamdan St"),
            "Turn left when you reach the intersection"
        );
        assert_eq!(brief_route_instruction("Now, Start on Corniche Road"), "Start on Corniche Road");
        assert_eq!(
            brief_route_instruction("In 1.3 kilometers, Keep left"),
            "Keep left"
        );
        assert_eq!(brief_route_instruction("Continue straight"), "Continue straight ahead");
    }

    #[test]
    fn at_narration_07_arabic_names_replaced() {
        assert_eq!(
            replace_non_latin_street_names("Turn left onto شارع حمدان"),
            "Turn left onto the local street"
        );
        assert_eq!(replace_non_latin_street_names("Keep left"), "Keep left");
    }

    #[test]
    fn at_narration_08_direction_and_hazard_phrasing() {
        assert_eq!(extract_direction("In 20 meters, Turn right"), NavDirection::Right);
        assert_eq!(extract_direction("Keep left"), NavDirection::Left);
        assert_eq!(extract_direction("Continue"), NavDirection::Straight);
        assert_eq!(humanize_hazard("left side clutter"), "obstacles on your left");
        assert_eq!(humanize_hazard("dark obstacle ahead"), "an obstacle ahead");
        assert_eq!(humanize_hazard("bicycle"), "bicycle");
    }
}
