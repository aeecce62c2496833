#![forbid(unsafe_code)]

mod support;

use support::*;
use wayguide_kernel_contracts::session::NavigationPhase;
use wayguide_os::monitor::TickOutcome;

fn fix(h: &Harness, secs: u64, at: wayguide_kernel_contracts::GeoPoint) -> TickOutcome {
    h.clock.set_secs(secs);
    h.session.set_location(at.lat, at.lng).unwrap();
    h.session.tick()
}

#[test]
fn at_nav_progress_01_confirmed_approach_reaches_destination() {
    let h = harness();
    let start = origin();
    let dest = north_of(start, 30.0);
    h.session.set_location(start.lat, start.lng).unwrap();
    let started = h.session.start(destination(dest, "Marina Mall")).unwrap();
    assert_eq!(started.total_steps, 1);
    assert_eq!(started.first_instruction.as_deref(), Some("You have arrived"));

    assert_eq!(fix(&h, 10, north_of(dest, -40.0)), TickOutcome::Continue);
    assert_eq!(fix(&h, 12, north_of(dest, -20.0)), TickOutcome::Continue);
    assert_eq!(h.session.get_status().arrival_confirmations, 1);
    assert_eq!(fix(&h, 14, north_of(dest, -16.0)), TickOutcome::Finished);

    let status = h.session.get_status();
    assert_eq!(status.phase, NavigationPhase::Arrived);
    assert_eq!(status.step_index, 1);
    assert!(!status.is_navigating);
    assert!(spoken(&h).contains(&"You have reached Marina Mall!".to_string()));
}

#[test]
fn at_nav_progress_02_stationary_user_never_arrives() {
    let h = harness();
    let dest = north_of(origin(), 30.0);
    let near = north_of(dest, -20.0);
    h.session.set_location(near.lat, near.lng).unwrap();
    h.session.start(destination(dest, "Marina Mall")).unwrap();

    for secs in [10, 12, 14, 16, 30] {
        h.clock.set_secs(secs);
        assert_eq!(h.session.tick(), TickOutcome::Continue);
    }
    let status = h.session.get_status();
    assert_eq!(status.step_index, 0);
    assert_eq!(status.phase, NavigationPhase::Navigating);
    assert_eq!(status.arrival_confirmations, 0);
}

#[test]
fn at_nav_progress_03_gps_jitter_resets_confirmations() {
    let h = harness();
    let dest = north_of(origin(), 60.0);
    let start = north_of(dest, -50.0);
    h.session.set_location(start.lat, start.lng).unwrap();
    h.session.start(destination(dest, "Marina Mall")).unwrap();

    let mut secs = 10;
    for distance in [20.0, 24.0, 20.0, 24.0, 20.0, 24.0] {
        assert_eq!(fix(&h, secs, north_of(dest, -distance)), TickOutcome::Continue);
        assert!(h.session.get_status().arrival_confirmations <= 1);
        secs += 2;
    }
    assert_eq!(h.session.get_status().step_index, 0);
}

#[test]
fn at_nav_progress_04_arrival_waits_for_instruction_spacing() {
    let h = harness();
    let dest = north_of(origin(), 60.0);
    let start = north_of(dest, -50.0);
    h.session.set_location(start.lat, start.lng).unwrap();
    h.session.start(destination(dest, "Marina Mall")).unwrap();

    fix(&h, 2, north_of(dest, -20.0));
    fix(&h, 4, north_of(dest, -15.0));
    assert_eq!(h.session.get_status().step_index, 0);

    // Confirmed arrival fires once the spacing clears, without further movement.
    h.clock.set_secs(6);
    assert_eq!(h.session.tick(), TickOutcome::Continue);
    h.clock.set_secs(8);
    assert_eq!(h.session.tick(), TickOutcome::Finished);
    assert_eq!(h.session.get_status().phase, NavigationPhase::Arrived);
}

#[test]
fn at_nav_progress_05_simulation_walks_to_the_waypoint() {
    let h = harness();
    let start = origin();
    let dest = north_of(start, 30.0);
    h.session.set_location(start.lat, start.lng).unwrap();
    h.session.start(destination(dest, "Marina Mall")).unwrap();
    assert!(h.session.set_simulation(true).unwrap());

    h.clock.set_secs(2);
    h.session.tick();
    let after_first = h.session.get_status().last_distance_m.unwrap();
    assert!((after_first - 20.0).abs() < 1.0, "got {after_first}");

    let mut outcome = TickOutcome::Continue;
    for secs in [4, 6, 8, 10] {
        h.clock.set_secs(secs);
        outcome = h.session.tick();
        if outcome == TickOutcome::Finished {
            break;
        }
    }
    assert_eq!(outcome, TickOutcome::Finished);
    let status = h.session.get_status();
    assert_eq!(status.phase, NavigationPhase::Arrived);
    assert!(!status.simulation_enabled);
}

#[test]
fn at_nav_progress_06_simulation_requires_navigation() {
    let h = harness();
    let err = h.session.set_simulation(true).unwrap_err();
    assert_eq!(err.to_string(), "No active navigation to simulate.");
    assert!(!h.session.set_simulation(false).unwrap());
}

#[test]
fn at_nav_progress_07_off_route_triggers_automatic_reroute() {
    let h = harness();
    let start = origin();
    let dest = north_of(start, 30.0);
    h.session.set_location(start.lat, start.lng).unwrap();
    h.session.start(destination(dest, "Marina Mall")).unwrap();
    assert_eq!(h.routing.calls(), 1);

    assert_eq!(fix(&h, 10, east_of(start, 200.0)), TickOutcome::Continue);

    assert_eq!(h.routing.calls(), 2);
    let lines = spoken(&h);
    assert!(lines.contains(&"Recalculating route...".to_string()));
    assert!(lines.iter().any(|l| l.starts_with("New route calculated. The route is")));
    let status = h.session.get_status();
    assert!(status.is_navigating);
    assert_eq!(status.step_index, 0);
}

#[test]
fn at_nav_progress_08_automatic_reroute_failure_keeps_route() {
    let h = harness();
    let start = origin();
    let dest = north_of(start, 30.0);
    h.session.set_location(start.lat, start.lng).unwrap();
    h.session.start(destination(dest, "Marina Mall")).unwrap();
    let before = h.session.get_route().unwrap();

    h.routing
        .push(Err(wayguide_engines::providers::ProviderError::Timeout { provider: "osrm" }));
    assert_eq!(fix(&h, 10, east_of(start, 200.0)), TickOutcome::Continue);

    let after = h.session.get_route().unwrap();
    assert_eq!(before.route, after.route);
    assert!(h.session.get_status().is_navigating);
    assert!(!spoken(&h)
        .iter()
        .any(|l| l.starts_with("Unable to calculate new route")));
}

/// Ticks every 2 s up to `until_secs`, recording the step index after each tick.
fn simulate_until(h: &Harness, from_secs: u64, until_secs: u64) -> (TickOutcome, Vec<usize>) {
    let mut steps = Vec::new();
    let mut outcome = TickOutcome::Continue;
    for secs in (from_secs..=until_secs).step_by(2) {
        h.clock.set_secs(secs);
        outcome = h.session.tick();
        steps.push(h.session.get_status().step_index);
        if outcome == TickOutcome::Finished {
            break;
        }
    }
    (outcome, steps)
}

#[test]
fn at_nav_progress_09_simulation_reaches_waypoint_closer_than_one_stride() {
    let h = harness();
    let start = origin();
    let dest = north_of(start, 8.0);
    h.session.set_location(start.lat, start.lng).unwrap();
    h.session.start(destination(dest, "Marina Mall")).unwrap();
    h.session.set_simulation(true).unwrap();

    let (outcome, _) = simulate_until(&h, 2, 60);
    assert_eq!(outcome, TickOutcome::Finished);
    assert_eq!(h.session.get_status().phase, NavigationPhase::Arrived);
}

#[test]
fn at_nav_progress_10_simulation_walks_through_short_middle_step() {
    let h = harness();
    let start = origin();
    h.session.set_location(start.lat, start.lng).unwrap();
    h.routing.push(Ok(short_middle_step_route(start, "osrm")));
    let started = h
        .session
        .start(destination(north_of(start, 66.0), "Marina Mall"))
        .unwrap();
    assert_eq!(started.total_steps, 3);
    h.session.set_simulation(true).unwrap();

    let (outcome, steps) = simulate_until(&h, 2, 60);
    assert_eq!(outcome, TickOutcome::Finished, "steps {steps:?}");
    assert!(steps.windows(2).all(|w| w[1] == w[0] || w[1] == w[0] + 1), "{steps:?}");
    assert!(steps.contains(&1) && steps.contains(&2), "{steps:?}");
    assert_eq!(h.session.get_status().phase, NavigationPhase::Arrived);
}

#[test]
fn at_nav_progress_11_waypoint_arrival_fires_once_per_step() {
    let h = harness();
    let start = origin();
    let dest = north_of(start, 100.0);
    h.session.set_location(start.lat, start.lng).unwrap();
    h.routing.push(Ok(two_step_route(start, dest, "osrm")));
    h.session.start(destination(dest, "Marina Mall")).unwrap();

    // Midpoint waypoint sits 60 m north; confirmed at 4 s, held by spacing until 8 s.
    fix(&h, 2, north_of(start, 40.0));
    fix(&h, 4, north_of(start, 44.0));
    fix(&h, 6, north_of(start, 48.0));
    assert_eq!(h.session.get_status().step_index, 0);
    fix(&h, 8, north_of(start, 52.0));
    let status = h.session.get_status();
    assert_eq!(status.step_index, 1);
    assert_eq!(status.arrival_confirmations, 0);
    assert_eq!(status.last_distance_m, None);

    // Still closing in, now measured against the final waypoint.
    for (secs, north) in [(10, 56.0), (12, 60.0), (14, 64.0)] {
        assert_eq!(fix(&h, secs, north_of(start, north)), TickOutcome::Continue);
        let status = h.session.get_status();
        assert_eq!(status.step_index, 1);
        assert_eq!(status.arrival_confirmations, 0);
    }

    assert_eq!(fix(&h, 16, north_of(start, 78.0)), TickOutcome::Continue);
    assert_eq!(h.session.get_status().arrival_confirmations, 1);
    assert_eq!(fix(&h, 18, north_of(start, 82.0)), TickOutcome::Finished);

    let lines = spoken(&h);
    let count = |text: &str| lines.iter().filter(|l| l.as_str() == text).count();
    assert_eq!(count("Turn left and arrive"), 1);
    assert_eq!(count("You have reached Marina Mall!"), 1);
}
