use thiserror::Error;

use crate::system::BodyId;

/// An error describing why an orbit could not be derived from state vectors.
///
/// These are configuration errors: the owning entity cannot move without a
/// valid orbit, so callers are expected to log them and leave the entity inert.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum OrbitError {
    /// The orbiting body sits on top of its central body.
    #[error("orbiting body is at the central body's position (radius {radius})")]
    ZeroRadius {
        /// Distance between the two bodies.
        radius: f64,
    },

    /// Position and velocity are parallel (or the velocity is zero), so no
    /// orbital plane exists.
    #[error("angular momentum is zero; trajectory is radial or the body is at rest")]
    ZeroAngularMomentum,

    /// The gravitational parameter must be finite and positive.
    #[error("invalid gravitational parameter {mu}")]
    InvalidGravitationalParameter {
        /// The offending value.
        mu: f64,
    },

    /// Specific orbital energy is exactly zero; the semi-major axis is infinite.
    #[error("parabolic trajectory (zero specific energy) is not supported")]
    Parabolic,

    /// A position or velocity component was NaN or infinite.
    #[error("state vectors contain non-finite values")]
    NonFinite,
}

/// An error from operations on a [`SolarSystem`][crate::SolarSystem].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SystemError {
    /// There was no body with the given parent ID.
    #[error("there was no body at the specified parent id {0}")]
    ParentNotFound(BodyId),

    /// There was no body with the given ID.
    #[error("there was no body with id {0}")]
    BodyNotFound(BodyId),

    /// The body has no orbit (it is a root body or was released).
    #[error("body {0} is not orbiting anything")]
    NotOrbiting(BodyId),

    /// A body can't orbit itself or one of its own satellites.
    #[error("body {body} cannot orbit {parent}")]
    InvalidParent {
        /// The body being reassigned.
        body: BodyId,
        /// The rejected parent.
        parent: BodyId,
    },

    /// Deriving the orbit failed.
    #[error(transparent)]
    Orbit(#[from] OrbitError),
}
