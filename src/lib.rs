//! # Analytic Orbital Mechanics
//! This library crate contains the orbit core of a real-time space game:
//! closed-form Keplerian orbits derived from state vectors, propagated
//! tick by tick without numerical integration.
//!
//! Unlike a Newtonian integrator, an analytic orbit never accumulates error
//! from its time step. The orbit is fully described by its *shape* (the
//! classical orbital elements) and its *phase* (time since periapsis), so the
//! position at any time is a Kepler-equation solve away. Large time warps cost
//! the same as small ones.
//!
//! It's a patched-conics model: each body feels the gravity of exactly one
//! central body, and hands over to another when it enters that body's sphere
//! of influence (SOI).
//!
//! ## Getting started
//! This crate provides these main structs:
//! - [`OrbitShape`]: The geometry of an orbit, derived from a position,
//!   velocity and gravitational parameter.
//! - [`OrbitState`]: Where on that geometry a body is, and when. Every
//!   method that depends on geometry takes the shape explicitly.
//! - [`OrbitMover`]: An orbiting entity. Owns a shape and a state and keeps
//!   them in sync across impulses, repositioning and central body changes.
//! - [`SolarSystem`]: A registry of [`Body`] values with parent/satellite
//!   relations that ticks every mover and detects SOI transitions.
//!
//! ## Example
//!
//! ```rust
//! use glam::DVec3;
//!
//! use analytic_orbits::{CentralBody, Initialization, OrbitMover};
//!
//! # fn main() -> Result<(), analytic_orbits::OrbitError> {
//! let central = CentralBody::new(DVec3::ZERO, 1.0);
//! let mut mover = OrbitMover::new(
//!     central,
//!     DVec3::new(1.0, 0.0, 0.0),
//!     Initialization::CircularOrbit,
//!     1.0,
//! )?;
//!
//! // A quarter of a unit circular orbit
//! let sv = mover.tick(std::f64::consts::FRAC_PI_2);
//! assert!((sv.position.length() - 1.0).abs() < 1e-9);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod body;
mod context;
mod error;
mod mover;
mod shape;
mod solvers;
mod state;
mod system;

pub use body::{Body, BodyKind};
pub use context::{EncounterSearch, SimulationContext, TimeWarp};
pub use error::{OrbitError, SystemError};
pub use mover::{CentralBody, Initialization, OrbitMover};
pub use shape::OrbitShape;
pub use solvers::{
    solve_kepler_equation, true_anomaly_at_mean_anomaly, true_anomaly_from_eccentric_anomaly,
    true_anomaly_from_hyperbolic_anomaly, KeplerSolution, OrbitRegime, SolverMethod,
};
pub use state::{OrbitState, SyncOutcome};
pub use system::{BodyId, BodyRelation, SoiTransition, SolarSystem, TickReport};

use glam::DVec3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The maximum number of Newton–Raphson iterations in the Kepler solver.
///
/// A real-time caller can't wait on a slow solve; past this cap the solver
/// switches to bisection.
const KEPLER_MAX_ITERS: u32 = 25;

/// The step size below which the Kepler solver considers itself converged.
const KEPLER_TOLERANCE: f64 = 1e-10;

/// The maximum number of bisection steps in the Kepler solver fallback.
const BISECTION_MAX_ITERS: u32 = 200;

/// Below this, lengths and denominators are treated as zero.
const DEGENERATE_EPSILON: f64 = 1e-9;

/// The smallest `1 + e cos(f)` allowed when computing a radius.
const MIN_RADIUS_DENOMINATOR: f64 = 1e-6;

/// A struct representing a position and velocity at a point in the orbit.
///
/// The position and velocity vectors are three-dimensional and in world
/// space, i.e. the central body's position is already added to `position`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StateVectors {
    /// The 3D position at a point in the orbit.
    pub position: DVec3,
    /// The 3D velocity at a point in the orbit, relative to the central body.
    pub velocity: DVec3,
}

#[cfg(test)]
mod tests;

#[inline]
fn keplers_equation(mean_anomaly: f64, eccentric_anomaly: f64, eccentricity: f64) -> f64 {
    eccentric_anomaly - (eccentricity * eccentric_anomaly.sin()) - mean_anomaly
}
#[inline]
fn keplers_equation_derivative(eccentric_anomaly: f64, eccentricity: f64) -> f64 {
    1.0 - (eccentricity * eccentric_anomaly.cos())
}
#[inline]
fn keplers_equation_second_derivative(eccentric_anomaly: f64, eccentricity: f64) -> f64 {
    eccentricity * eccentric_anomaly.sin()
}
#[inline]
fn hyperbolic_keplers_equation(mean_anomaly: f64, hyperbolic_anomaly: f64, eccentricity: f64) -> f64 {
    eccentricity * hyperbolic_anomaly.sinh() - hyperbolic_anomaly - mean_anomaly
}
#[inline]
fn hyperbolic_keplers_equation_derivative(hyperbolic_anomaly: f64, eccentricity: f64) -> f64 {
    eccentricity * hyperbolic_anomaly.cosh() - 1.0
}
#[inline]
fn hyperbolic_keplers_equation_second_derivative(hyperbolic_anomaly: f64, eccentricity: f64) -> f64 {
    eccentricity * hyperbolic_anomaly.sinh()
}

/// Get the hyperbolic sine and cosine of a number.
///
/// Usually faster than calling `x.sinh()` and `x.cosh()` separately.
///
/// Returns a tuple which contains:
/// - 0: The hyperbolic sine of the number.
/// - 1: The hyperbolic cosine of the number.
pub fn sinhcosh(x: f64) -> (f64, f64) {
    let e_x = x.exp();
    let e_neg_x = (-x).exp();

    ((e_x - e_neg_x) * 0.5, (e_x + e_neg_x) * 0.5)
}
