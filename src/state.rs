use glam::DVec3;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    solve_kepler_equation, true_anomaly_from_eccentric_anomaly,
    true_anomaly_from_hyperbolic_anomaly, KeplerSolution, OrbitRegime, OrbitShape, StateVectors,
    DEGENERATE_EPSILON,
};

/// Whether a resynchronization could pin down the orbital phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SyncOutcome {
    /// The elapsed time now matches the given position or anomaly.
    Synced,
    /// The phase was undefined (position at the focus, or on a hyperbola's
    /// asymptote). The previous elapsed time was kept.
    Degenerate,
}

/// The time-varying phase of an orbit.
///
/// An `OrbitState` knows *when* a body is on its orbit, but not the orbit
/// itself: every method that needs geometry takes an [`OrbitShape`]. Pass the
/// shape the state was last synced against. After the shape is recomputed,
/// resync with
/// [`sync_elapsed_time_to_current_position`][Self::sync_elapsed_time_to_current_position]
/// before anything else.
///
/// The elapsed time is the signed time since periapsis and is the only
/// authoritative field. The true anomaly and radius are derived from it.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrbitState {
    velocity: DVec3,
    elapsed_time: f64,
    theta: f64,
    r: f64,
    last_solution: Option<KeplerSolution>,
}

impl OrbitState {
    /// Creates a state at periapsis with zero velocity.
    ///
    /// Set the velocity and sync before propagating.
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-anchors the elapsed time to a known world position.
    ///
    /// The offset from the central body is rotated into the orbital plane
    /// and its out-of-plane component dropped. The true anomaly is then read
    /// off the in-plane direction and converted into a time since periapsis.
    pub fn sync_elapsed_time_to_current_position(
        &mut self,
        shape: &OrbitShape,
        current_position: DVec3,
        central_body_position: DVec3,
    ) -> SyncOutcome {
        let r_vec = current_position - central_body_position;
        let mut local = shape.get_orbital_plane_rotation().inverse() * r_vec;
        local.y = 0.0;

        if local.length() < DEGENERATE_EPSILON {
            tracing::warn!(
                elapsed_time = self.elapsed_time,
                "position projects onto the focus; keeping previous elapsed time"
            );
            return SyncOutcome::Degenerate;
        }

        let theta = local.x.atan2(local.z);
        self.compute_time_from_true_anomaly(shape, theta)
    }

    /// Sets the elapsed time to the time since periapsis at a true anomaly.
    pub fn compute_time_from_true_anomaly(&mut self, shape: &OrbitShape, theta: f64) -> SyncOutcome {
        match shape.time_since_periapsis_at_true_anomaly(theta) {
            Some(time) => {
                self.elapsed_time = time;
                self.theta = theta;
                self.r = shape.radius_at_true_anomaly(theta);
                SyncOutcome::Synced
            }
            None => {
                tracing::warn!(
                    theta,
                    eccentricity = shape.get_eccentricity(),
                    "true anomaly has no defined phase; keeping previous elapsed time"
                );
                SyncOutcome::Degenerate
            }
        }
    }

    /// Advances the orbit by `delta_time` and recomputes position and velocity.
    ///
    /// `delta_time` should already include any time multiplier.
    /// The returned position is in world space.
    pub fn update_orbit(
        &mut self,
        shape: &OrbitShape,
        delta_time: f64,
        central_body_position: DVec3,
    ) -> StateVectors {
        self.elapsed_time += delta_time;

        let solution = solve_at_time(shape, self.elapsed_time);
        self.theta = true_anomaly_from_solution(shape, &solution);
        self.r = shape.radius_at_true_anomaly(self.theta);
        self.last_solution = Some(solution);

        let position = central_body_position + local_position(shape, self.theta, self.r);
        self.velocity = velocity_at(shape, self.theta, self.r);

        StateVectors {
            position,
            velocity: self.velocity,
        }
    }

    /// Gets the true anomaly `delta_time` from now, without changing the state.
    pub fn compute_true_anomaly_in_future(&self, shape: &OrbitShape, delta_time: f64) -> f64 {
        let solution = solve_at_time(shape, self.elapsed_time + delta_time);
        true_anomaly_from_solution(shape, &solution)
    }

    /// Gets the world position `delta_time` from now, without changing the state.
    ///
    /// The central body is assumed to stay at `central_body_position`.
    pub fn predict_position(
        &self,
        shape: &OrbitShape,
        delta_time: f64,
        central_body_position: DVec3,
    ) -> DVec3 {
        let theta = self.compute_true_anomaly_in_future(shape, delta_time);
        let r = shape.radius_at_true_anomaly(theta);

        central_body_position + local_position(shape, theta, r)
    }

    /// Gets the world position and velocity `delta_time` from now, without
    /// changing the state.
    pub fn predict_state_vectors(
        &self,
        shape: &OrbitShape,
        delta_time: f64,
        central_body_position: DVec3,
    ) -> StateVectors {
        let theta = self.compute_true_anomaly_in_future(shape, delta_time);
        let r = shape.radius_at_true_anomaly(theta);

        StateVectors {
            position: central_body_position + local_position(shape, theta, r),
            velocity: velocity_at(shape, theta, r),
        }
    }

    /// Gets the velocity relative to the central body.
    pub fn get_velocity(&self) -> DVec3 {
        self.velocity
    }

    /// Sets the velocity.
    ///
    /// This does not touch the elapsed time; recompute the shape and resync
    /// afterwards.
    pub fn set_velocity(&mut self, velocity: DVec3) {
        self.velocity = velocity;
    }

    /// Gets the signed time since periapsis.
    pub fn get_elapsed_time(&self) -> f64 {
        self.elapsed_time
    }

    /// Gets the true anomaly as of the last update or sync.
    ///
    /// For closed orbits this keeps counting past `2 pi` as revolutions
    /// accumulate.
    pub fn get_true_anomaly(&self) -> f64 {
        self.theta
    }

    /// Gets the distance from the central body as of the last update or sync.
    pub fn get_radius(&self) -> f64 {
        self.r
    }

    /// Gets the current speed.
    pub fn speed(&self) -> f64 {
        self.velocity.length()
    }

    /// Gets the Kepler solver diagnostics from the last [`update_orbit`][Self::update_orbit].
    pub fn get_last_kepler_solution(&self) -> Option<KeplerSolution> {
        self.last_solution
    }
}

fn solve_at_time(shape: &OrbitShape, time: f64) -> KeplerSolution {
    let mean_anomaly = shape.get_mean_motion() * time;
    let eccentricity = shape.get_eccentricity();

    solve_kepler_equation(
        mean_anomaly,
        eccentricity,
        OrbitRegime::from_eccentricity(eccentricity),
    )
}

fn true_anomaly_from_solution(shape: &OrbitShape, solution: &KeplerSolution) -> f64 {
    let eccentricity = shape.get_eccentricity();

    if shape.is_closed() {
        true_anomaly_from_eccentric_anomaly(solution.anomaly, eccentricity)
    } else {
        true_anomaly_from_hyperbolic_anomaly(solution.anomaly, eccentricity)
    }
}

fn local_position(shape: &OrbitShape, theta: f64, r: f64) -> DVec3 {
    let (sin, cos) = theta.sin_cos();
    shape.get_orbital_plane_rotation() * (DVec3::new(sin, 0.0, cos) * r)
}

fn velocity_at(shape: &OrbitShape, theta: f64, r: f64) -> DVec3 {
    // Vis-viva: v^2 = mu (2/r - 1/a)
    let mu = shape.get_gravitational_parameter();
    let speed = (mu * (2.0 / r - 1.0 / shape.get_semi_major_axis())).sqrt();

    let (sin, cos) = theta.sin_cos();
    let direction = DVec3::new(shape.get_eccentricity() + cos, 0.0, -sin).normalize_or_zero();

    shape.get_orbital_plane_rotation() * direction * speed
}
