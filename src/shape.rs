use glam::{DMat3, DQuat, DVec3};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{OrbitError, DEGENERATE_EPSILON, MIN_RADIUS_DENOMINATOR};

use core::f64::consts::{PI, TAU};

/// The geometry of a Keplerian orbit around a central body.
///
/// An `OrbitShape` is a snapshot: it is derived in one go from a position, a
/// velocity and a gravitational parameter, and it is never patched field by
/// field. After an impulse the whole shape is recomputed.
///
/// The orbital plane uses a periapsis-aligned x–z convention: in the local
/// frame, `+z` points at periapsis, `+y` along the orbit normal, and `+x`
/// along the direction of motion at periapsis.
/// [`get_orbital_plane_rotation`][Self::get_orbital_plane_rotation] maps
/// that frame into world space.
///
/// # Example
/// ```
/// use glam::DVec3;
/// use analytic_orbits::OrbitShape;
///
/// let shape = OrbitShape::new(
///     DVec3::ZERO,
///     DVec3::new(1.0, 0.0, 0.0),
///     DVec3::new(0.0, 0.0, 1.2),
///     1.0,
/// )
/// .unwrap();
///
/// assert!(shape.is_closed());
/// assert!((shape.get_periapsis() - 1.0).abs() < 1e-12);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrbitShape {
    /// The gravitational parameter of the central body.
    mu: f64,

    /// The semi-major axis. Negative for hyperbolic trajectories.
    a: f64,

    /// The eccentricity of the orbit.
    /// e < 1: ellipse
    /// e >= 1: hyperbola
    e: f64,

    angular_momentum_vec: DVec3,
    eccentricity_vec: DVec3,
    orbital_plane_rotation: DQuat,

    // -------- MEMO --------
    // Derived from (mu, a, e) in `OrbitShape::derive`.
    // Never set any of these on their own.
    p: f64,
    n: f64,
    period: f64,
    r_periapsis: f64,
    r_apoapsis: f64,
    h: f64,
}

impl OrbitShape {
    /// Derives an orbit shape from state vectors.
    ///
    /// # Parameters
    /// - `central_body_position`: World position of the central body.
    /// - `position`: World position of the orbiting body.
    /// - `velocity`: Velocity of the orbiting body, relative to the central body.
    /// - `mu`: The gravitational parameter of the central body.
    ///
    /// # Errors
    /// Fails if the bodies coincide, the trajectory is radial (zero angular
    /// momentum), the energy is exactly parabolic, `mu` isn't positive, or
    /// any input isn't finite.
    pub fn new(
        central_body_position: DVec3,
        position: DVec3,
        velocity: DVec3,
        mu: f64,
    ) -> Result<Self, OrbitError> {
        Self::derive(central_body_position, position, velocity, mu)
    }

    /// Recomputes this shape in place from new state vectors, keeping the
    /// gravitational parameter.
    ///
    /// Calling this twice with the same inputs gives the same shape.
    /// On error, the shape is left as it was.
    pub fn recompute(
        &mut self,
        central_body_position: DVec3,
        position: DVec3,
        velocity: DVec3,
    ) -> Result<(), OrbitError> {
        *self = Self::derive(central_body_position, position, velocity, self.mu)?;
        Ok(())
    }

    fn derive(
        central_body_position: DVec3,
        position: DVec3,
        velocity: DVec3,
        mu: f64,
    ) -> Result<Self, OrbitError> {
        if !mu.is_finite() || mu <= 0.0 {
            return Err(OrbitError::InvalidGravitationalParameter { mu });
        }
        if !(central_body_position.is_finite() && position.is_finite() && velocity.is_finite()) {
            return Err(OrbitError::NonFinite);
        }

        let r_vec = position - central_body_position;
        let r_mag = r_vec.length();

        if r_mag < DEGENERATE_EPSILON {
            return Err(OrbitError::ZeroRadius { radius: r_mag });
        }

        let r_norm = r_vec / r_mag;

        let angular_momentum_vec = r_vec.cross(velocity);
        let angular_momentum = angular_momentum_vec.length();

        // sin of the angle between r and v must be non-negligible
        if angular_momentum <= DEGENERATE_EPSILON * r_mag * velocity.length() {
            return Err(OrbitError::ZeroAngularMomentum);
        }

        let eccentricity_vec = velocity.cross(angular_momentum_vec) / mu - r_norm;
        let e = eccentricity_vec.length();

        let specific_energy = velocity.length_squared() * 0.5 - mu / r_mag;
        let a = -mu / (2.0 * specific_energy);

        if !a.is_finite() {
            return Err(OrbitError::Parabolic);
        }

        let orbital_normal = angular_momentum_vec / angular_momentum;

        // A circular orbit has no periapsis; measure from the current position instead.
        let periapsis_dir = if e > DEGENERATE_EPSILON {
            eccentricity_vec / e
        } else {
            r_norm
        };

        let orbital_plane_rotation = look_rotation(periapsis_dir, orbital_normal);

        let p = a * (1.0 - e * e);
        let a_cubed = a * a * a;
        let n = (mu / a_cubed.abs()).sqrt();

        Ok(Self {
            mu,
            a,
            e,
            angular_momentum_vec,
            eccentricity_vec,
            orbital_plane_rotation,
            p,
            n,
            period: TAU / n,
            r_periapsis: a * (1.0 - e),
            r_apoapsis: a * (1.0 + e),
            h: (mu * p).sqrt(),
        })
    }

    /// Whether this is a closed (elliptic, `e < 1`) orbit.
    pub fn is_closed(&self) -> bool {
        self.e < 1.0
    }

    /// Gets the position relative to the central body at a true anomaly.
    ///
    /// Add the central body's position to get a world position.
    ///
    /// For hyperbolic trajectories, true anomalies beyond the asymptotes
    /// give meaningless (negative-radius) points.
    pub fn get_orbit_point(&self, theta: f64) -> DVec3 {
        let (sin, cos) = theta.sin_cos();
        let r = self.p / (1.0 + self.e * cos);

        self.orbital_plane_rotation * DVec3::new(r * sin, 0.0, r * cos)
    }

    /// Gets the distance from the central body at a true anomaly.
    ///
    /// The denominator `1 + e cos(f)` is clamped away from zero, so this
    /// stays finite near a hyperbola's asymptotes.
    pub fn radius_at_true_anomaly(&self, theta: f64) -> f64 {
        let denominator = (1.0 + self.e * theta.cos()).max(MIN_RADIUS_DENOMINATOR);
        self.p / denominator
    }

    /// Solves `r(f) = target_radius` for the true anomaly `f`.
    ///
    /// - Circular orbits return `[0, PI]` if the radius matches, else nothing.
    /// - Closed orbits return `[f, TAU - f]`, both in `[0, TAU]`.
    /// - Open orbits return the symmetric pair `[-f, f]`, inbound leg first.
    ///
    /// An empty vector means the orbit never reaches that radius.
    ///
    /// # Example
    /// ```
    /// use glam::DVec3;
    /// use analytic_orbits::OrbitShape;
    ///
    /// let shape = OrbitShape::new(
    ///     DVec3::ZERO,
    ///     DVec3::new(1.0, 0.0, 0.0),
    ///     DVec3::new(0.0, 0.0, 1.2),
    ///     1.0,
    /// )
    /// .unwrap();
    ///
    /// // Periapsis is at radius 1
    /// let anomalies = shape.get_true_anomalies_for_radius(1.0);
    /// assert!(anomalies[0].abs() < 1e-6);
    ///
    /// // Nothing past apoapsis
    /// assert!(shape.get_true_anomalies_for_radius(shape.get_apoapsis() * 2.0).is_empty());
    /// ```
    pub fn get_true_anomalies_for_radius(&self, target_radius: f64) -> Vec<f64> {
        const EPS: f64 = 1e-6;

        if self.e.abs() < EPS {
            let tolerance = EPS * self.a.abs().max(1.0);
            if (target_radius - self.a.abs()).abs() < tolerance {
                return vec![0.0, PI];
            }
            return Vec::new();
        }

        if self.is_closed() {
            let cos_theta = (self.p / target_radius - 1.0) / self.e;

            // Tolerate rounding exactly at periapsis/apoapsis
            if cos_theta.abs() > 1.0 + DEGENERATE_EPSILON {
                return Vec::new();
            }

            let t0 = cos_theta.clamp(-1.0, 1.0).acos();
            vec![t0, TAU - t0]
        } else {
            // r = |a| (e cosh(F) - 1)
            let cosh_f = (target_radius / self.a.abs() + 1.0) / self.e;

            if cosh_f < 1.0 - DEGENERATE_EPSILON {
                return Vec::new();
            }

            let f = cosh_f.max(1.0).acosh();
            let factor = ((self.e + 1.0) / (self.e - 1.0)).sqrt();
            let theta = 2.0 * (factor * (f * 0.5).tanh()).atan();

            vec![-theta, theta]
        }
    }

    /// Gets the signed time since periapsis at a true anomaly.
    ///
    /// For closed orbits the result is in `(-period / 2, period / 2]`.
    ///
    /// Returns `None` when `1 + e cos(f)` is too close to zero (a hyperbola's
    /// asymptote, or beyond it), where the phase is undefined.
    pub fn time_since_periapsis_at_true_anomaly(&self, theta: f64) -> Option<f64> {
        let (sin_theta, cos_theta) = theta.sin_cos();
        let denominator = 1.0 + self.e * cos_theta;

        if denominator.abs() < MIN_RADIUS_DENOMINATOR {
            return None;
        }

        let mean_anomaly = if self.is_closed() {
            let cos_e = (self.e + cos_theta) / denominator;
            let sin_e = (1.0 - self.e * self.e).sqrt() * sin_theta / denominator;
            let ecc_anom = sin_e.atan2(cos_e);
            ecc_anom - self.e * ecc_anom.sin()
        } else {
            if denominator < 0.0 {
                return None;
            }
            // acosh loses the sign; the inbound leg has negative H
            let cosh_h = ((self.e + cos_theta) / denominator).max(1.0);
            let hyp_anom = cosh_h.acosh().copysign(sin_theta);
            crate::solvers::mean_anomaly_at_hyperbolic_anomaly(hyp_anom, self.e)
        };

        Some(mean_anomaly / self.n)
    }

    /// The unit vector pointing from the central body towards periapsis.
    pub fn periapsis_direction(&self) -> DVec3 {
        self.orbital_plane_rotation * DVec3::Z
    }

    /// The unit normal of the orbital plane.
    pub fn normal(&self) -> DVec3 {
        self.orbital_plane_rotation * DVec3::Y
    }

    /// Gets the gravitational parameter (mu = GM) of the central body.
    #[doc(alias = "get_mu")]
    pub fn get_gravitational_parameter(&self) -> f64 {
        self.mu
    }

    /// Gets the semi-major axis.
    ///
    /// This is negative for hyperbolic trajectories. Branch on
    /// [`is_closed`][Self::is_closed], not on the sign of this value.
    pub fn get_semi_major_axis(&self) -> f64 {
        self.a
    }

    /// Gets the eccentricity.
    pub fn get_eccentricity(&self) -> f64 {
        self.e
    }

    /// Gets the angular momentum vector `r x v`.
    pub fn get_angular_momentum_vec(&self) -> DVec3 {
        self.angular_momentum_vec
    }

    /// Gets the eccentricity vector. It points towards periapsis.
    pub fn get_eccentricity_vec(&self) -> DVec3 {
        self.eccentricity_vec
    }

    /// Gets the rotation from the local orbital-plane frame into world space.
    pub fn get_orbital_plane_rotation(&self) -> DQuat {
        self.orbital_plane_rotation
    }

    /// Gets the semi-latus rectum `a(1 - e^2)`.
    pub fn get_semi_latus_rectum(&self) -> f64 {
        self.p
    }

    /// Gets the mean motion `sqrt(mu / |a^3|)`, in radians per unit time.
    pub fn get_mean_motion(&self) -> f64 {
        self.n
    }

    /// Gets the orbital period `2 pi / n`.
    ///
    /// Only meaningful for closed orbits; for hyperbolic trajectories this is
    /// the time for the mean anomaly to advance by `2 pi`.
    pub fn get_orbital_period(&self) -> f64 {
        self.period
    }

    /// Gets the periapsis radius `a(1 - e)`.
    pub fn get_periapsis(&self) -> f64 {
        self.r_periapsis
    }

    /// Gets the apoapsis radius `a(1 + e)`.
    ///
    /// Negative, and meaningless, for hyperbolic trajectories.
    pub fn get_apoapsis(&self) -> f64 {
        self.r_apoapsis
    }

    /// Gets the specific angular momentum `sqrt(mu p)`.
    pub fn get_specific_angular_momentum(&self) -> f64 {
        self.h
    }
}

/// Builds a rotation taking `+z` to `forward` and `+y` to (the component of)
/// `up` perpendicular to it.
fn look_rotation(forward: DVec3, up: DVec3) -> DQuat {
    let forward = forward.normalize();
    let right = up.cross(forward).normalize();
    let up = forward.cross(right);

    DQuat::from_mat3(&DMat3::from_cols(right, up, forward))
}
