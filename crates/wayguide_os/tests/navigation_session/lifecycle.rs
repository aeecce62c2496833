#![forbid(unsafe_code)]

mod support;

use std::time::{Duration, Instant};

use support::*;
use wayguide_engines::providers::ProviderError;
use wayguide_kernel_contracts::route::RoutingMode;
use wayguide_kernel_contracts::session::NavigationPhase;
use wayguide_os::error::reason_codes;
use wayguide_os::NavigationError;

#[test]
fn at_nav_lifecycle_01_start_requires_location() {
    let h = harness();
    let err = h
        .session
        .start(destination(north_of(origin(), 30.0), "Marina Mall"))
        .unwrap_err();
    assert_eq!(err.to_string(), "Current location not available for navigation.");
    assert_eq!(err.reason_code(), reason_codes::NS_NO_LOCATION);
    assert_eq!(h.routing.calls(), 0);
}

#[test]
fn at_nav_lifecycle_02_routing_failure_leaves_session_idle() {
    let h = harness();
    h.routing.push(Err(ProviderError::HttpStatus {
        provider: "osrm",
        status: 503,
    }));
    h.session.set_location(origin().lat, origin().lng).unwrap();
    let err = h
        .session
        .start(destination(north_of(origin(), 30.0), "Marina Mall"))
        .unwrap_err();

    assert_eq!(err.to_string(), "Unable to calculate route. Please try again.");
    assert_eq!(err.reason_code(), reason_codes::NS_ROUTING_UNAVAILABLE);
    let status = h.session.get_status();
    assert_eq!(status.phase, NavigationPhase::NoRoute);
    assert!(!status.is_navigating);
    assert_eq!(
        spoken(&h),
        vec!["Unable to calculate route. Please try again.".to_string()]
    );
}

#[test]
fn at_nav_lifecycle_03_start_announces_summary_and_first_instruction() {
    let h = harness();
    let start = origin();
    h.session.set_location(start.lat, start.lng).unwrap();
    h.routing
        .push(Ok(two_step_route(start, north_of(start, 100.0), "osrm")));
    let out = h
        .session
        .start(destination(north_of(start, 100.0), "Marina Mall"))
        .unwrap();

    assert_eq!(out.destination, "Marina Mall");
    assert_eq!(out.total_steps, 2);
    assert!(!out.from_cache);
    assert_eq!(
        spoken(&h),
        vec![
            "Starting navigation to Marina Mall.".to_string(),
            "The route is 100 meters and will take approximately 1 minutes".to_string(),
            "In 60 meters, Turn left".to_string(),
        ]
    );
    let instruction = h.session.get_current_instruction().unwrap();
    assert_eq!(instruction.step_index, 0);
    assert_eq!(instruction.road_name.as_deref(), Some("Corniche Road"));
    let distance = instruction.distance_to_waypoint_m.unwrap();
    assert!((distance - 60.0).abs() < 1.0);
}

#[test]
fn at_nav_lifecycle_04_route_cache_hit_and_engine_mismatch() {
    let h = harness();
    let start = origin();
    let dest = north_of(start, 30.0);
    h.session.set_location(start.lat, start.lng).unwrap();

    assert!(!h.session.start(destination(dest, "A")).unwrap().from_cache);
    h.session.stop().unwrap();
    let again = h.session.start(destination(dest, "A")).unwrap();
    assert!(again.from_cache);
    assert_eq!(h.routing.calls(), 1);
    assert_eq!(h.session.get_status().route_cache.hits, 1);

    // A different active engine must not reuse the cached route.
    h.session.stop().unwrap();
    h.routing.set_tag("valhalla");
    let switched = h.session.start(destination(dest, "A")).unwrap();
    assert!(!switched.from_cache);
    assert_eq!(switched.engine_tag, "valhalla");
    assert_eq!(h.routing.calls(), 2);
}

#[test]
fn at_nav_lifecycle_05_manual_advance_walks_steps_then_arrives() {
    let h = harness();
    let start = origin();
    let dest = north_of(start, 100.0);
    h.session.set_location(start.lat, start.lng).unwrap();
    h.routing.push(Ok(two_step_route(start, dest, "osrm")));
    h.session.start(destination(dest, "Marina Mall")).unwrap();

    let first = h.session.advance_manually().unwrap();
    assert_eq!(first.step_index, 1);
    assert!(!first.destination_reached);
    assert_eq!(first.instruction.as_deref(), Some("Turn left and arrive"));
    assert_eq!(spoken(&h).last().map(String::as_str), Some("Turn left and arrive"));

    let second = h.session.advance_manually().unwrap();
    assert!(second.destination_reached);
    assert_eq!(h.session.get_status().phase, NavigationPhase::Arrived);
    assert_eq!(
        spoken(&h).last().map(String::as_str),
        Some("You have reached Marina Mall!")
    );
    assert_eq!(
        h.session.advance_manually().unwrap_err(),
        NavigationError::NoActiveNavigation("No active navigation.".into())
    );
}

#[test]
fn at_nav_lifecycle_06_manual_reroute_success_and_failure() {
    let h = harness();
    let start = origin();
    let dest = north_of(start, 100.0);
    assert_eq!(
        h.session.reroute_manually().unwrap_err().to_string(),
        "No active navigation to reroute."
    );

    h.session.set_location(start.lat, start.lng).unwrap();
    h.routing.push(Ok(two_step_route(start, dest, "osrm")));
    h.session.start(destination(dest, "Marina Mall")).unwrap();
    h.session.advance_manually().unwrap();

    let ok = h.session.reroute_manually().unwrap();
    assert!(ok.applied);
    assert_eq!(ok.total_steps, 1);
    assert_eq!(h.session.get_status().step_index, 0);

    let before = h.session.get_route().unwrap().route;
    h.routing.push(Err(ProviderError::Timeout { provider: "osrm" }));
    let err = h.session.reroute_manually().unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unable to calculate new route. Continuing with original route."
    );
    assert_eq!(h.session.get_route().unwrap().route, before);
    assert!(h.session.get_status().is_navigating);
    assert_eq!(
        spoken(&h).last().map(String::as_str),
        Some("Unable to calculate new route. Continuing with original route.")
    );
}

#[test]
fn at_nav_lifecycle_07_stop_messages() {
    let h = harness();
    assert_eq!(
        h.session.stop().unwrap_err().to_string(),
        "No active navigation to stop."
    );
    h.session.set_location(origin().lat, origin().lng).unwrap();
    h.session
        .start(destination(north_of(origin(), 30.0), "Marina Mall"))
        .unwrap();
    let out = h.session.stop().unwrap();
    assert!(out.monitor_exited);
    assert_eq!(
        spoken(&h).last().map(String::as_str),
        Some("Navigation stopped. Ready for new destination.")
    );
    assert!(h.session.get_current_instruction().is_err());
    assert!(h.session.get_route().is_err());
}

#[test]
fn at_nav_lifecycle_08_monitor_thread_starts_and_stop_joins_it() {
    let mut config = config_without_monitor();
    config.monitor_enabled = true;
    config.monitor_interval_ms = 20;
    let h = harness_with(config);
    h.session.set_location(origin().lat, origin().lng).unwrap();
    h.session
        .start(destination(north_of(origin(), 30.0), "Marina Mall"))
        .unwrap();
    assert!(h.session.monitor_running());

    // Restarting replaces the monitor rather than stacking a second one.
    h.session
        .start(destination(north_of(origin(), 40.0), "Marina Mall"))
        .unwrap();
    assert!(h.session.monitor_running());

    let out = h.session.stop().unwrap();
    assert!(out.monitor_exited);
    assert!(!h.session.monitor_running());
}

#[test]
fn at_nav_lifecycle_09_monitor_exits_after_arrival() {
    let mut config = config_without_monitor();
    config.monitor_enabled = true;
    config.monitor_interval_ms = 10;
    let h = harness_with(config);
    let start = origin();
    h.session.set_location(start.lat, start.lng).unwrap();
    h.session
        .start(destination(north_of(start, 100.0), "Marina Mall"))
        .unwrap();
    h.session.advance_manually().unwrap();
    assert_eq!(h.session.get_status().phase, NavigationPhase::Arrived);

    let deadline = Instant::now() + Duration::from_secs(2);
    while h.session.monitor_running() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(!h.session.monitor_running());
}

#[test]
fn at_nav_lifecycle_10_location_and_places() {
    let h = harness();
    assert_eq!(
        h.session.describe_location().unwrap_err().to_string(),
        "Current location not available. Please allow location access."
    );
    assert!(h.session.set_location(91.0, 0.0).is_err());

    h.session.set_location(origin().lat, origin().lng).unwrap();
    assert_eq!(
        h.session.describe_location().unwrap(),
        "You are currently at: Corniche Road, Abu Dhabi"
    );

    let found = h.session.search_places("Marina Mall", Some(2_000.0)).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Marina Mall");
    assert!(h.session.search_places("   ", None).is_err());
    assert_eq!(
        h.session.search_places("nowhere", None).unwrap_err().reason_code(),
        reason_codes::NS_PLACES_UNAVAILABLE
    );
}

#[test]
fn at_nav_lifecycle_11_routing_mode() {
    let h = harness();
    assert_eq!(h.session.get_status().routing_mode, RoutingMode::Walk);
    assert_eq!(h.session.set_routing_mode("drive").unwrap(), RoutingMode::Drive);
    let err = h.session.set_routing_mode("fly").unwrap_err();
    assert_eq!(err.to_string(), "Unknown routing mode 'fly'. Use walk or drive.");
    assert_eq!(h.session.get_status().routing_mode, RoutingMode::Drive);
}

#[test]
fn at_nav_lifecycle_12_status_payload_shape() {
    let h = harness();
    h.session.set_location(origin().lat, origin().lng).unwrap();
    h.session
        .start(destination(north_of(origin(), 30.0), "Marina Mall"))
        .unwrap();
    let json = serde_json::to_value(h.session.get_status()).unwrap();
    assert_eq!(json["phase"], "navigating");
    assert_eq!(json["routing_mode"], "walk");
    assert_eq!(json["destination"], "Marina Mall");
    assert_eq!(json["current_instruction"]["speech_text"], "You have arrived");
    assert_eq!(json["progress"]["total_steps"], 1);
    assert!(json["bearing_to_waypoint_deg"].as_f64().unwrap() < 1.0);
}
