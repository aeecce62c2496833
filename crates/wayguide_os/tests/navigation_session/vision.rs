#![forbid(unsafe_code)]

mod support;

use support::*;
use wayguide_engines::providers::{ProviderError, VisionFrame};
use wayguide_kernel_contracts::vision::SteerHeading;
use wayguide_os::session::InstructionSource;
use wayguide_os::NavigationError;

fn navigating_harness() -> Harness {
    let h = harness();
    let start = origin();
    let dest = north_of(start, 100.0);
    h.session.set_location(start.lat, start.lng).unwrap();
    h.routing.push(Ok(two_step_route(start, dest, "osrm")));
    h.session.start(destination(dest, "Marina Mall")).unwrap();
    h
}

#[test]
fn at_nav_vision_01_disabled_vision_rejects_frames() {
    let h = navigating_harness();
    assert_eq!(
        h.session.submit_vision_frame(frame(), None).unwrap_err(),
        NavigationError::VisionDisabled
    );
    assert!(h.vision.seen_instructions.lock().unwrap().is_empty());
}

#[test]
fn at_nav_vision_02_provider_failure_is_reported_not_invented() {
    let h = navigating_harness();
    h.session.set_vision_enabled(true);
    h.vision.push_error(ProviderError::Timeout { provider: "fake" });

    let err = h.session.submit_vision_frame(frame(), None).unwrap_err();
    assert_eq!(err, NavigationError::VisionUnavailable("timeout".into()));
    assert_eq!(err.to_string(), "Vision unavailable: timeout");
    assert!(h.session.vision_status().last_guidance.is_none());
}

#[test]
fn at_nav_vision_03_empty_frame_is_invalid() {
    let h = navigating_harness();
    h.session.set_vision_enabled(true);
    let err = h
        .session
        .submit_vision_frame(VisionFrame::new(Vec::new()), None)
        .unwrap_err();
    assert!(matches!(err, NavigationError::InvalidInput(_)));
}

#[test]
fn at_nav_vision_04_fused_hazard_is_spoken_once_until_it_changes() {
    let h = navigating_harness();
    h.session.set_vision_enabled(true);
    let before = spoken(&h).len();

    h.vision.push_hazards(&["pole"], None);
    let first = h.session.submit_vision_frame(frame(), Some("crossing")).unwrap();
    assert!(first.spoken);
    assert_eq!(first.hazards, vec!["pole".to_string()]);
    assert_eq!(first.step_index, Some(0));
    assert_eq!(first.provider, "fake");
    assert_eq!(
        h.vision.seen_instructions.lock().unwrap()[0].as_deref(),
        Some("In 60 meters, Turn left")
    );
    assert_eq!(spoken(&h).last(), Some(&first.narration));

    h.clock.advance_ms(500);
    h.vision.push_hazards(&["pole"], None);
    let repeat = h.session.submit_vision_frame(frame(), None).unwrap();
    assert!(!repeat.spoken);
    assert_eq!(spoken(&h).len(), before + 1);

    h.clock.advance_ms(1_500);
    h.vision.push_hazards(&["pole", "bench"], Some(SteerHeading::Right));
    let changed = h.session.submit_vision_frame(frame(), None).unwrap();
    assert!(changed.spoken);
    assert_eq!(changed.suggested_heading, SteerHeading::Right);
    assert_eq!(spoken(&h).len(), before + 2);

    let status = h.session.vision_status();
    assert_eq!(status.provider.as_deref(), Some("fake"));
    assert_eq!(status.last_guidance, Some(changed));
    assert!(status.last_spoken.is_some());
}

#[test]
fn at_nav_vision_05_unified_instruction_cache_follows_step() {
    let h = navigating_harness();
    let first = h.session.get_unified_instruction().unwrap();
    assert_eq!(first.source, InstructionSource::Route);
    assert_eq!(first.step_index, Some(0));
    assert!(!first.cached);
    assert!(!first.narration.is_empty());

    let again = h.session.get_unified_instruction().unwrap();
    assert!(again.cached);
    assert_eq!(again.narration, first.narration);

    h.session.advance_manually().unwrap();
    let next = h.session.get_unified_instruction().unwrap();
    assert!(!next.cached);
    assert_eq!(next.step_index, Some(1));
}

#[test]
fn at_nav_vision_06_fresh_hazards_take_over_unified_instruction() {
    let h = navigating_harness();
    h.session.set_vision_enabled(true);
    let clear = h.session.get_unified_instruction().unwrap();
    assert_eq!(clear.obstacle_signature, "none");

    h.vision.push_hazards(&["pole"], None);
    let guidance = h.session.submit_vision_frame(frame(), None).unwrap();
    let hazard = h.session.get_unified_instruction().unwrap();
    assert_eq!(hazard.source, InstructionSource::Vision);
    assert!(!hazard.cached);
    assert_eq!(hazard.narration, guidance.narration);
    assert_ne!(hazard.obstacle_signature, clear.obstacle_signature);

    h.clock.advance_ms(6_000);
    let stale = h.session.get_unified_instruction().unwrap();
    assert_eq!(stale.source, InstructionSource::Route);
    assert!(stale.hazards.is_empty());
}

#[test]
fn at_nav_vision_07_without_navigation_only_vision_guidance_remains() {
    let h = harness();
    assert!(h.session.get_unified_instruction().is_err());

    h.session.set_vision_enabled(true);
    h.vision.push_hazards(&["stairs"], Some(SteerHeading::Left));
    let guidance = h.session.submit_vision_frame(frame(), None).unwrap();
    assert_eq!(guidance.step_index, None);
    assert_eq!(h.vision.seen_instructions.lock().unwrap()[0], None);

    let unified = h.session.get_unified_instruction().unwrap();
    assert_eq!(unified.source, InstructionSource::Vision);
    assert_eq!(unified.step_index, None);

    let status = h.session.set_vision_enabled(false);
    assert!(!status.enabled);
    assert!(status.last_guidance.is_none());
    assert!(h.session.get_unified_instruction().is_err());
}
