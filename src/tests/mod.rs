#![cfg(test)]

use core::f64::consts::{PI, TAU};

use glam::DVec3;

use crate::{
    solve_kepler_equation, true_anomaly_at_mean_anomaly, CentralBody, EncounterSearch,
    Initialization, OrbitError, OrbitMover, OrbitRegime, OrbitShape, OrbitState, SolverMethod,
    SyncOutcome, TimeWarp, KEPLER_MAX_ITERS,
};

const POLL_STEPS: usize = 4096;
const RANDOM_CASES: usize = 500;


use assertions::*;
use polling::*;
use seeders::*;

fn unit_central() -> CentralBody {
    CentralBody::new(DVec3::ZERO, 1.0)
}

/// `r = 1`, `mu = 1`, at periapsis with speed `sqrt(1 + e)`.
fn periapsis_mover(eccentricity: f64) -> OrbitMover {
    OrbitMover::new(
        unit_central(),
        DVec3::X,
        Initialization::InitialVelocity(DVec3::new(0.0, 0.0, (1.0 + eccentricity).sqrt())),
        1.0,
    )
    .expect("periapsis state vectors are valid")
}

fn circular_mover(position: DVec3) -> OrbitMover {
    OrbitMover::new(unit_central(), position, Initialization::CircularOrbit, 1.0)
        .expect("circular orbit is valid")
}

#[test]
fn known_elements() {
    let shape = OrbitShape::new(DVec3::ZERO, DVec3::X, DVec3::new(0.0, 0.0, 1.2), 1.0).unwrap();

    assert_almost_eq(shape.get_eccentricity(), 0.44, "eccentricity");
    assert_almost_eq(shape.get_semi_major_axis(), 1.0 / 0.56, "semi-major axis");
    assert_almost_eq(shape.get_periapsis(), 1.0, "periapsis");
    assert_almost_eq(shape.get_apoapsis(), 1.44 / 0.56, "apoapsis");
    assert_almost_eq(shape.get_semi_latus_rectum(), 1.44, "semi-latus rectum");
    assert_almost_eq(shape.get_specific_angular_momentum(), 1.2, "angular momentum");
    assert_almost_eq(
        shape.get_orbital_period(),
        TAU * (1.0f64 / 0.56).powf(1.5),
        "period",
    );
    assert_almost_eq_vec3(shape.periapsis_direction(), DVec3::X, "periapsis direction");
    assert_almost_eq_vec3(shape.normal(), -DVec3::Y, "normal");
    assert_almost_eq_vec3(
        shape.get_angular_momentum_vec().normalize(),
        shape.normal(),
        "normal vs r x v",
    );
}

#[test]
fn circular_elements() {
    let mover = circular_mover(DVec3::new(0.0, 0.0, 4.0));
    let shape = mover.shape();

    assert!(shape.get_eccentricity() < 1e-12);
    assert_almost_eq(shape.get_semi_major_axis(), 4.0, "semi-major axis");
    assert_almost_eq(shape.get_orbital_period(), TAU * 8.0, "period");
    // Circular orbits measure from the starting position
    assert_almost_eq_vec3(shape.periapsis_direction(), DVec3::Z, "reference direction");
    assert_almost_eq(mover.state().get_elapsed_time(), 0.0, "elapsed time");
    assert_almost_eq(mover.state().get_true_anomaly(), 0.0, "true anomaly");
}

#[test]
fn orbit_point_matches_radius() {
    let shape = OrbitShape::new(DVec3::ZERO, DVec3::X, DVec3::new(0.0, 0.0, 1.2), 1.0).unwrap();

    for i in 0..64 {
        let theta = i as f64 / 64.0 * TAU;
        assert_almost_eq(
            shape.get_orbit_point(theta).length(),
            shape.radius_at_true_anomaly(theta),
            &format!("radius at theta = {theta}"),
        );
    }

    assert_almost_eq_vec3(shape.get_orbit_point(0.0), DVec3::X, "periapsis point");
    assert_almost_eq_vec3(
        shape.get_orbit_point(PI),
        -DVec3::X * shape.get_apoapsis(),
        "apoapsis point",
    );
}

#[test]
fn hyperbolic_radius_stays_finite() {
    let shape = OrbitShape::new(DVec3::ZERO, DVec3::X, DVec3::new(0.0, 0.0, 2.0), 1.0).unwrap();
    assert!(!shape.is_closed());
    assert!(shape.get_semi_major_axis() < 0.0);

    let asymptote = (-1.0 / shape.get_eccentricity()).acos();
    for offset in [-1e-3, -1e-9, 0.0, 1e-9, 1e-3, 0.5] {
        let r = shape.radius_at_true_anomaly(asymptote + offset);
        assert!(r.is_finite() && r > 0.0, "radius {r} at asymptote + {offset}");
    }
}

#[test]
fn derivation_errors() {
    let v = DVec3::new(0.0, 0.0, 1.0);

    assert!(matches!(
        OrbitShape::new(DVec3::X, DVec3::X, v, 1.0),
        Err(OrbitError::ZeroRadius { .. })
    ));
    assert_eq!(
        OrbitShape::new(DVec3::ZERO, DVec3::X, DVec3::X * 0.5, 1.0),
        Err(OrbitError::ZeroAngularMomentum)
    );
    assert_eq!(
        OrbitShape::new(DVec3::ZERO, DVec3::X, DVec3::ZERO, 1.0),
        Err(OrbitError::ZeroAngularMomentum)
    );
    assert!(matches!(
        OrbitShape::new(DVec3::ZERO, DVec3::X, v, 0.0),
        Err(OrbitError::InvalidGravitationalParameter { .. })
    ));
    assert!(matches!(
        OrbitShape::new(DVec3::ZERO, DVec3::X, v, -1.0),
        Err(OrbitError::InvalidGravitationalParameter { .. })
    ));
    assert_eq!(
        OrbitShape::new(DVec3::ZERO, DVec3::new(f64::NAN, 0.0, 0.0), v, 1.0),
        Err(OrbitError::NonFinite)
    );
    // v^2 / 2 == mu / r exactly
    assert_eq!(
        OrbitShape::new(DVec3::ZERO, DVec3::X * 2.0, v, 1.0),
        Err(OrbitError::Parabolic)
    );

    assert!(!OrbitError::Parabolic.to_string().is_empty());
}

#[test]
fn recompute_is_transactional() {
    let mut shape =
        OrbitShape::new(DVec3::ZERO, DVec3::X, DVec3::new(0.0, 0.0, 1.2), 1.0).unwrap();
    let before = shape.clone();

    let result = shape.recompute(DVec3::ZERO, DVec3::X, DVec3::X);
    assert_eq!(result, Err(OrbitError::ZeroAngularMomentum));
    assert_eq!(shape, before);

    shape
        .recompute(DVec3::ZERO, DVec3::X, DVec3::new(0.0, 0.0, 1.3))
        .unwrap();
    let once = shape.clone();
    shape
        .recompute(DVec3::ZERO, DVec3::X, DVec3::new(0.0, 0.0, 1.3))
        .unwrap();
    assert_eq!(shape, once);
    assert_almost_eq(shape.get_eccentricity(), 0.69, "recomputed eccentricity");
}

#[test]
fn mover_rejects_bad_configuration() {
    let err = OrbitMover::new(
        CentralBody::new(DVec3::ZERO, 0.0),
        DVec3::X,
        Initialization::CircularOrbit,
        1.0,
    );
    assert!(matches!(
        err,
        Err(OrbitError::InvalidGravitationalParameter { .. })
    ));

    // On the central body's Y axis there is no "r x Y" direction
    let err = OrbitMover::new(unit_central(), DVec3::Y, Initialization::CircularOrbit, 1.0);
    assert_eq!(err, Err(OrbitError::ZeroAngularMomentum));

    let err = OrbitMover::new(unit_central(), DVec3::ZERO, Initialization::CircularOrbit, 1.0);
    assert!(matches!(err, Err(OrbitError::ZeroRadius { .. })));
}

#[test]
fn kepler_residual_elliptic() {
    for i in 0..100 {
        let e = i as f64 / 100.0;
        for j in 0..=64 {
            let m = j as f64 / 64.0 * TAU;
            let solution = solve_kepler_equation(m, e, OrbitRegime::Elliptic);
            let residual = (solution.anomaly - e * solution.anomaly.sin() - m).abs();

            assert!(
                residual <= 1e-6,
                "residual {residual} for e = {e}, M = {m} ({solution:?})"
            );
            if solution.method == SolverMethod::Newton {
                assert!(solution.iterations <= KEPLER_MAX_ITERS);
            }
        }
    }
}

#[test]
fn kepler_keeps_revolutions() {
    for m in [-100.0, -7.0, 13.0, 1000.0] {
        let solution = solve_kepler_equation(m, 0.5, OrbitRegime::Elliptic);
        let residual = solution.anomaly - 0.5 * solution.anomaly.sin() - m;
        assert!(residual.abs() <= 1e-6, "residual {residual} for M = {m}");
    }
}

#[test]
fn kepler_residual_hyperbolic() {
    for e in [1.01, 1.1, 1.5, 2.0, 5.0, 20.0] {
        for j in -40..=40 {
            let m = j as f64 * 1.25;
            let solution = solve_kepler_equation(m, e, OrbitRegime::Hyperbolic);
            let h = solution.anomaly;
            let residual = (e * h.sinh() - h - m).abs();

            assert!(
                residual <= 1e-6 * m.abs().max(1.0),
                "residual {residual} for e = {e}, M = {m} ({solution:?})"
            );
            assert!(h.signum() == m.signum() || m == 0.0);
        }
    }
}

#[test]
fn kepler_random() {
    for _ in 0..RANDOM_CASES {
        let e = rand::random_range(0.0..0.99);
        let m = rand::random_range(-50.0..50.0);
        let solution = solve_kepler_equation(m, e, OrbitRegime::Elliptic);
        assert!(solution.residual <= 1e-6, "{solution:?} for e = {e}, M = {m}");
        assert!(solution.anomaly.is_finite());

        let e = 1.0 + rand::random_range(0.01..10.0) * random_mult();
        let solution = solve_kepler_equation(m, e, OrbitRegime::Hyperbolic);
        assert!(
            solution.residual <= 1e-6 * m.abs().max(1.0),
            "{solution:?} for e = {e}, M = {m}"
        );
    }
}

#[test]
fn true_anomaly_at_mean_anomaly_limits() {
    for m in [0.0, 0.5, 2.0, -1.0] {
        assert_almost_eq(true_anomaly_at_mean_anomaly(m, 0.0), m, "circular true anomaly");
    }

    assert_almost_eq(true_anomaly_at_mean_anomaly(PI, 0.7), PI, "apoapsis");
    assert_almost_eq(true_anomaly_at_mean_anomaly(0.0, 3.0), 0.0, "hyperbolic periapsis");

    let asymptote = (-1.0f64 / 3.0).acos();
    let far = true_anomaly_at_mean_anomaly(1e6, 3.0);
    assert!(far < asymptote && far > asymptote - 1e-3);
}

fn state_vector_round_trip_base_test(seed: Seed) {
    let mover = seed.mover();
    let sv = mover.predict_state_vectors_at_time(0.0);

    assert_almost_eq_vec3_rel(sv.position, seed.position, "position at t = 0");
    assert_almost_eq_vec3_rel(sv.velocity, seed.velocity, "velocity at t = 0");
    assert_eq_vec3(mover.position(), seed.position, "mover position");

    let theta = mover.state().get_true_anomaly();
    assert_almost_eq_vec3_rel(
        mover.shape().get_orbit_point(theta) + seed.central.position,
        seed.position,
        "orbit point at synced true anomaly",
    );
}

#[test]
fn state_vector_round_trip() {
    for _ in 0..RANDOM_CASES {
        state_vector_round_trip_base_test(random_any());
    }
    for _ in 0..RANDOM_CASES / 5 {
        state_vector_round_trip_base_test(random_circular());
    }
}

fn conservation_base_test(seed: Seed) {
    let mover = seed.mover();
    let span = if mover.shape().is_closed() {
        mover.shape().get_orbital_period()
    } else {
        // Stay away from the asymptotes
        0.5 / mover.shape().get_mean_motion()
    };

    for i in 0..16 {
        let t = span * i as f64 / 16.0;
        let sv = mover.predict_state_vectors_at_time(t);
        let shape = OrbitShape::new(
            seed.central.position,
            sv.position,
            sv.velocity,
            seed.central.mu,
        )
        .unwrap();

        assert_almost_eq_shape(&shape, mover.shape(), &format!("shape at t = {t}"));
    }
}

#[test]
fn elements_are_conserved() {
    for _ in 0..RANDOM_CASES / 5 {
        conservation_base_test(random_any());
    }
}

#[test]
fn closed_orbits_are_periodic() {
    for _ in 0..RANDOM_CASES {
        let mover = random_elliptic().mover();
        let period = mover.shape().get_orbital_period();
        let offset = rand::random_range(0.0..period);

        for revolutions in [1.0, 3.0] {
            assert_almost_eq_vec3_rel(
                mover.predict_position_at_time(offset + revolutions * period),
                mover.predict_position_at_time(offset),
                &format!("{revolutions} revolutions after t = {offset}"),
            );
        }
    }
}

#[test]
fn predictions_match_ticks() {
    for _ in 0..RANDOM_CASES / 5 {
        let mut mover = random_any().mover();
        let dt = rand::random_range(0.01..1.0) / mover.shape().get_mean_motion();
        let predicted = mover.predict_state_vectors_at_time(3.0 * dt);

        mover.tick(dt);
        mover.tick(dt);
        let sv = mover.tick(dt);

        assert_almost_eq_vec3_rel(sv.position, predicted.position, "tick vs prediction");
        assert_almost_eq_vec3_rel(sv.velocity, predicted.velocity, "tick velocity");
        assert_eq!(mover.tick_count(), 3);
        assert_eq!(mover.revision(), 0);
    }
}

#[test]
fn polled_trajectory_stays_on_shape() {
    for _ in 0..8 {
        let seed = random_any();
        let mover = seed.mover();
        let shape = mover.shape();

        for position in poll_predictions(&mover) {
            let r = (position - seed.central.position).length();
            assert!(r.is_finite());
            assert!(r >= shape.get_periapsis() * (1.0 - 1e-9));
            if shape.is_closed() {
                assert!(r <= shape.get_apoapsis() * (1.0 + 1e-9));
            }
            let offset = (position - seed.central.position) / r;
            assert!(offset.dot(shape.normal()).abs() < 1e-6);
        }
    }
}

#[test]
fn elapsed_time_and_anomaly_are_monotonic() {
    for _ in 0..8 {
        let mover = random_elliptic().mover();
        let polled = poll_ticks(&mover);

        for pair in polled.windows(2) {
            let ((t0, f0), (t1, f1)) = (pair[0], pair[1]);
            assert!(t1 > t0, "elapsed time went from {t0} to {t1}");
            assert!(f1 > f0, "true anomaly went from {f0} to {f1}");
        }
    }

    for _ in 0..8 {
        let mover = random_hyperbolic().mover();
        let polled = poll_ticks(&mover);

        for pair in polled.windows(2) {
            let ((t0, f0), (t1, f1)) = (pair[0], pair[1]);
            assert!(t1 > t0, "elapsed time went from {t0} to {t1}");
            assert!(f1 >= f0, "true anomaly went from {f0} to {f1}");
        }
    }
}

#[test]
fn time_multiplier_scales_ticks() {
    let mut slow = circular_mover(DVec3::X);
    let mut fast = slow.clone();
    fast.set_time_multiplier(4.0);

    for _ in 0..4 {
        slow.tick(0.1);
    }
    fast.tick(0.1);

    assert_almost_eq_vec3(fast.position(), slow.position(), "warped position");
    assert_almost_eq(
        fast.state().get_elapsed_time(),
        0.4,
        "warped elapsed time",
    );
    // Predictions ignore the multiplier
    assert_almost_eq_vec3(
        fast.predict_position_at_time(0.0),
        fast.position(),
        "prediction at t = 0",
    );
}

fn sync_base_test(seed: Seed) {
    let mut mover = seed.mover();
    let shape = mover.shape().clone();
    let span = if shape.is_closed() {
        shape.get_orbital_period()
    } else {
        0.25 * TAU / shape.get_mean_motion()
    };
    mover.tick(rand::random_range(0.0..span));

    let mut state = mover.state().clone();
    let before = state.get_elapsed_time();
    let outcome =
        state.sync_elapsed_time_to_current_position(&shape, mover.position(), seed.central.position);
    assert_eq!(outcome, SyncOutcome::Synced);
    let after = state.get_elapsed_time();

    if shape.is_closed() {
        let n = shape.get_mean_motion();
        assert!(
            angle_distance(before * n, after * n) < 1e-6,
            "mean anomaly {} resynced to {}",
            before * n,
            after * n
        );
        assert!(after.abs() <= shape.get_orbital_period() * 0.5 + 1e-9);
    } else {
        assert_almost_eq_rel(after, before, "resynced elapsed time");
    }
}

#[test]
fn sync_recovers_elapsed_time() {
    for _ in 0..RANDOM_CASES {
        sync_base_test(random_any());
    }
}

#[test]
fn degenerate_sync_keeps_elapsed_time() {
    let mut mover = periapsis_mover(0.3);
    mover.tick(0.7);
    let shape = mover.shape().clone();
    let mut state = mover.state().clone();

    // Straight above the focus projects onto it
    let above = shape.normal() * 3.0;
    assert_eq!(
        state.sync_elapsed_time_to_current_position(&shape, above, DVec3::ZERO),
        SyncOutcome::Degenerate
    );
    assert_eq!(state.get_elapsed_time(), mover.state().get_elapsed_time());

    // Past the asymptote of a hyperbola
    let hyperbola = periapsis_mover(2.0);
    let shape = hyperbola.shape();
    let mut state = hyperbola.state().clone();
    assert_eq!(
        state.compute_time_from_true_anomaly(shape, PI),
        SyncOutcome::Degenerate
    );
    assert_eq!(state.get_elapsed_time(), hyperbola.state().get_elapsed_time());
}

#[test]
fn state_without_mover() {
    let shape = OrbitShape::new(DVec3::ZERO, DVec3::X, DVec3::new(0.0, 0.0, 1.2), 1.0).unwrap();
    let mut state = OrbitState::new();
    state.set_velocity(DVec3::new(0.0, 0.0, 1.2));

    assert_eq!(
        state.sync_elapsed_time_to_current_position(&shape, DVec3::X, DVec3::ZERO),
        SyncOutcome::Synced
    );
    assert_almost_eq(state.get_elapsed_time(), 0.0, "elapsed time at periapsis");

    let half = shape.get_orbital_period() * 0.5;
    let sv = state.update_orbit(&shape, half, DVec3::ZERO);
    assert_almost_eq_vec3(sv.position, -DVec3::X * shape.get_apoapsis(), "apoapsis");
    assert_almost_eq(state.get_true_anomaly(), PI, "true anomaly at apoapsis");
    assert_almost_eq(state.get_radius(), shape.get_apoapsis(), "radius at apoapsis");
    assert_almost_eq(
        state.speed(),
        1.2 * shape.get_periapsis() / shape.get_apoapsis(),
        "speed at apoapsis",
    );
    assert!(state.get_last_kepler_solution().is_some());

    assert_almost_eq(
        state.compute_true_anomaly_in_future(&shape, half),
        TAU,
        "true anomaly one revolution in",
    );
}

#[test]
fn regime_boundary_is_continuous() {
    let eccentricities = [0.9, 0.95, 0.99, 0.999, 0.9999, 1.0001, 1.001, 1.01, 1.05, 1.1];
    let dt = 0.2;

    let positions: Vec<DVec3> = eccentricities
        .iter()
        .map(|&e| {
            let mut mover = periapsis_mover(e);
            assert_eq!(mover.shape().is_closed(), e < 1.0);
            let sv = mover.tick(dt);
            assert!(sv.position.is_finite(), "position {} for e = {e}", sv.position);
            assert!(sv.velocity.is_finite(), "velocity {} for e = {e}", sv.velocity);
            sv.position
        })
        .collect();

    // 0.999 .. 1.001
    for i in 3..6 {
        let distance = positions[i].distance(positions[i + 1]);
        assert!(
            distance < 1e-2,
            "e = {} and e = {} are {distance} apart",
            eccentricities[i],
            eccentricities[i + 1]
        );
    }
}

#[test]
fn impulse_keeps_position() {
    for _ in 0..RANDOM_CASES / 5 {
        let mut mover = random_elliptic().mover();
        mover.tick(rand::random_range(0.0..mover.shape().get_orbital_period()));

        let position = mover.position();
        let velocity = mover.velocity();
        let delta_v = random_unit_vector() * velocity.length() * 0.05;

        mover.apply_delta_velocity(delta_v).unwrap();

        assert_eq!(mover.revision(), 1);
        assert_eq_vec3(mover.position(), position, "position after impulse");
        assert_almost_eq_vec3_rel(mover.velocity(), velocity + delta_v, "velocity after impulse");

        let sv = mover.predict_state_vectors_at_time(0.0);
        assert_almost_eq_vec3_rel(sv.position, position, "predicted position after impulse");
        assert_almost_eq_vec3_rel(sv.velocity, velocity + delta_v, "predicted velocity");
    }
}

#[test]
fn impulse_avoids_parabolic_band() {
    let mut mover = circular_mover(DVec3::X);
    let escape = 2.0f64.sqrt();

    mover
        .apply_delta_velocity(DVec3::new(0.0, 0.0, escape - 1.0 + 1e-4))
        .unwrap();

    let e = mover.shape().get_eccentricity();
    assert!(e - 1.0 > 1e-3, "eccentricity {e} left inside the guard band");
    assert!(mover.velocity().z > escape + 0.09);
    assert!(!mover.shape().is_closed());

    // A zero-width band disables the nudge
    let mut mover = circular_mover(DVec3::X);
    mover.set_parabolic_guard(0.0, 0.1);
    mover
        .apply_delta_velocity(DVec3::new(0.0, 0.0, escape - 1.0 + 1e-4))
        .unwrap();
    assert!(mover.shape().get_eccentricity() - 1.0 < 1e-3);
}

#[test]
fn failed_impulse_leaves_orbit_untouched() {
    let mut mover = circular_mover(DVec3::X);
    let before = mover.clone();

    // Cancels all tangential velocity
    let result = mover.apply_delta_velocity(-mover.velocity());
    assert_eq!(result, Err(OrbitError::ZeroAngularMomentum));
    assert_eq!(mover, before);
}

#[test]
fn central_body_frame_shift() {
    let mut mover = circular_mover(DVec3::X);
    mover.tick(0.3);
    let relative = mover.position() - mover.central_body().position;

    mover.set_central_body_position(DVec3::new(5.0, -2.0, 1.0));
    assert_almost_eq_vec3(
        mover.position() - mover.central_body().position,
        relative,
        "offset after frame shift",
    );

    let sv = mover.tick(0.3);
    assert_almost_eq(
        (sv.position - DVec3::new(5.0, -2.0, 1.0)).length(),
        1.0,
        "radius around moved central body",
    );

    mover
        .set_central_body(CentralBody::new(mover.central_body().position, 4.0))
        .unwrap();
    assert_eq!(mover.revision(), 1);
    assert_almost_eq(mover.central_body().mu, 4.0, "new mu");
    assert_almost_eq(mover.shape().get_gravitational_parameter(), 4.0, "shape mu");
}

#[test]
fn place_in_orbit_replaces_everything() {
    let mut mover = circular_mover(DVec3::X);
    mover.tick(1.0);

    mover
        .place_in_orbit(
            CentralBody::new(DVec3::new(0.0, 10.0, 0.0), 9.0),
            DVec3::new(3.0, 10.0, 0.0),
            Initialization::CircularOrbit,
        )
        .unwrap();

    assert_almost_eq(mover.shape().get_semi_major_axis(), 3.0, "new radius");
    assert_almost_eq(mover.velocity().length(), 3.0f64.sqrt(), "circular speed");
    assert_almost_eq(mover.state().get_elapsed_time(), 0.0, "elapsed time");

    mover.set_velocity(DVec3::new(0.0, 0.0, 2.0)).unwrap();
    assert!(mover.shape().get_eccentricity() > 0.0);
    mover.set_position(DVec3::new(3.0, 10.0, 3.0)).unwrap();
    assert_eq!(mover.revision(), 3);
}

#[test]
fn time_until_radius_closed() {
    let mover = periapsis_mover(0.44);
    let shape = mover.shape();
    let period = shape.get_orbital_period();

    let to_apoapsis = mover.time_until_radius(shape.get_apoapsis()).unwrap();
    assert_almost_eq(to_apoapsis, period * 0.5, "time to apoapsis");

    let t = mover.time_until_radius(2.0).unwrap();
    assert!(t > 0.0 && t < period * 0.5);
    assert_almost_eq(
        mover.predict_position_at_time(t).length(),
        2.0,
        "radius at predicted time",
    );

    assert_eq!(mover.time_until_radius(shape.get_apoapsis() * 2.0), None);
    assert_eq!(mover.time_until_radius(0.5), None);

    // Past apoapsis, the next crossing of r = 2 is on the way in
    let mut mover = mover.clone();
    mover.tick(period * 0.6);
    let t = mover.time_until_radius(2.0).unwrap();
    assert!(t > 0.0 && t < period * 0.5);
    assert_almost_eq(
        mover.predict_position_at_time(t).length(),
        2.0,
        "inbound radius at predicted time",
    );
}

#[test]
fn time_until_radius_open() {
    let mover = periapsis_mover(2.0);
    assert_almost_eq(mover.shape().get_semi_major_axis(), -1.0, "semi-major axis");

    let t = mover.time_until_radius(10.0).unwrap();
    assert!(t > 0.0);
    assert_almost_eq(
        mover.predict_position_at_time(t).length(),
        10.0,
        "radius at predicted time",
    );

    // Inbound: both crossings are ahead, the nearer one wins
    let inbound = OrbitMover::new(
        unit_central(),
        mover.predict_position_at_time(-t * 2.0),
        Initialization::InitialVelocity(mover.predict_state_vectors_at_time(-t * 2.0).velocity),
        1.0,
    )
    .unwrap();
    let first = inbound.time_until_radius(10.0).unwrap();
    assert_almost_eq_rel(first, t, "time to inbound crossing");
}

/// Two circular orbits around a unit-mu body: a ship at radius 1 and a
/// planet at radius 1.2 starting one radian ahead.
fn encounter_pair(planet_radius: f64) -> (OrbitMover, OrbitMover) {
    let ship = circular_mover(DVec3::X);
    let planet = circular_mover(DVec3::new(1.0f64.cos(), 0.0, 1.0f64.sin()) * planet_radius);
    (ship, planet)
}

#[test]
fn encounter_found() {
    let (mut ship, planet) = encounter_pair(1.2);
    let soi: f64 = 0.3;

    // Law of cosines at the SOI boundary, then the synodic closing rate
    let phase = ((1.0 + 1.44 - soi * soi) / 2.4).acos();
    let expected = (1.0 - phase) / (1.0 - 1.2f64.powf(-1.5));

    let search = EncounterSearch {
        samples: 100,
        refine_iters: 20,
    };
    let theta = ship
        .calculate_encounter_anomaly(&planet, soi, search)
        .unwrap();
    assert!(
        angle_distance(theta, expected) < 1e-3,
        "entry at {theta}, expected {expected}"
    );

    // Cached own positions give the same answer
    assert_eq!(
        ship.calculate_encounter_anomaly(&planet, soi, search),
        Some(theta)
    );

    let coarse = ship
        .calculate_encounter_anomaly(&planet, soi, EncounterSearch::default())
        .unwrap();
    assert!(angle_distance(coarse, expected) < 5e-3);
}

#[test]
fn encounter_without_bisection() {
    let (mut ship, planet) = encounter_pair(1.2);
    let search = EncounterSearch {
        samples: 100,
        refine_iters: 0,
    };

    let theta = ship.calculate_encounter_anomaly(&planet, 0.3, search).unwrap();
    // The middle of the bracketing interval, never the start of the search
    assert!(theta > 3.0 && theta < 3.6, "entry at {theta}");
}

#[test]
fn encounter_none() {
    let (mut ship, planet) = encounter_pair(3.0);
    assert_eq!(
        ship.calculate_encounter_anomaly(&planet, 0.3, EncounterSearch::default()),
        None
    );

    // Co-orbiting inside the SOI the whole time: no entry
    let mut ship = circular_mover(DVec3::X);
    let escort = circular_mover(DVec3::new(0.1f64.cos(), 0.0, 0.1f64.sin()));
    assert_eq!(
        ship.calculate_encounter_anomaly(&escort, 0.5, EncounterSearch::default()),
        None
    );
}

#[test]
fn encounter_follows_ticks() {
    let (mut ship, mut planet) = encounter_pair(1.2);
    let search = EncounterSearch {
        samples: 100,
        refine_iters: 20,
    };
    let before = ship.calculate_encounter_anomaly(&planet, 0.3, search).unwrap();

    ship.tick(1.0);
    planet.tick(1.0);
    let after = ship.calculate_encounter_anomaly(&planet, 0.3, search).unwrap();

    // Same event in absolute terms; the stale cache would have shifted it
    assert!(angle_distance(before, after) < 1e-3, "{before} vs {after}");
}

#[test]
fn equality_ignores_prediction_cache() {
    let (mut ship, planet) = encounter_pair(1.2);
    let twin = ship.clone();

    ship.calculate_encounter_anomaly(&planet, 0.3, EncounterSearch::default());
    assert_eq!(ship, twin);

    ship.tick(0.1);
    assert_ne!(ship, twin);
}

#[test]
fn distance_over_period() {
    let (ship, planet) = encounter_pair(1.2);
    let distances = ship.calculate_distance_over_period(&planet, 16);

    assert_eq!(distances.len(), 16);
    assert_almost_eq(
        distances[0],
        ship.position().distance(planet.position()),
        "distance at t = 0",
    );
    assert!(distances.iter().all(|d| *d >= 0.2 - 1e-9));
}

#[test]
fn time_warp_ladder() {
    let mut warp = TimeWarp::new(Vec::new());
    assert_eq!(warp.multiplier(), 1.0);
    assert_eq!(warp.increase(), 1.0);

    let mut warp = TimeWarp::default();
    for _ in 0..10 {
        warp.increase();
    }
    assert_eq!(warp.multiplier(), 100.0);
    assert_eq!(warp.scale(0.5), 50.0);
    assert_eq!(warp.set_index(2), 10.0);
    assert_eq!(warp.set_index(99), 100.0);
    for _ in 0..10 {
        warp.decrease();
    }
    assert_eq!(warp.multiplier(), 1.0);
}

#[cfg(feature = "serde")]
#[test]
fn time_warp_deserializes_through_ladder_checks() {
    let mut warp: TimeWarp = serde_json::from_str(r#"{"scales":[],"index":0}"#).unwrap();
    assert_eq!(warp.multiplier(), 1.0);
    assert_eq!(warp.increase(), 1.0);
    assert_eq!(warp.set_index(3), 1.0);

    let warp: TimeWarp = serde_json::from_str(r#"{"scales":[1.0,2.0],"index":7}"#).unwrap();
    assert_eq!(warp.multiplier(), 2.0);

    let json = serde_json::to_string(&TimeWarp::default()).unwrap();
    let back: TimeWarp = serde_json::from_str(&json).unwrap();
    assert_eq!(back, TimeWarp::default());
}
