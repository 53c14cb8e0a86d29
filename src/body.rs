use glam::DVec3;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::OrbitMover;

/// Whether a body can act as a central body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BodyKind {
    /// A star, planet or moon. Has an SOI other bodies can fall into.
    Celestial,
    /// A ship. Never a central body; its SOI transitions are tracked.
    Vessel,
}

/// A struct representing a celestial body or a vessel.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Body {
    /// The name of the body.
    pub name: String,

    /// The mass of the body.
    pub mass: f64,

    /// The radius of the body.
    pub radius: f64,

    /// The radius of the body's sphere of influence.
    pub soi_radius: f64,

    /// Whether this is a celestial body or a vessel.
    pub kind: BodyKind,

    /// The world position of the body.
    ///
    /// For orbiting bodies this is overwritten every tick.
    pub position: DVec3,

    /// The orbit of the body, if it is orbiting one.
    pub orbit: Option<OrbitMover>,
}

impl Body {
    /// Creates a new celestial `Body` at a fixed position, not orbiting anything.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the celestial body.
    /// * `mass` - The mass of the celestial body.
    /// * `radius` - The radius of the celestial body.
    /// * `soi_radius` - The radius of its sphere of influence.
    /// * `position` - Its world position.
    pub fn new(name: String, mass: f64, radius: f64, soi_radius: f64, position: DVec3) -> Self {
        Self {
            name,
            mass,
            radius,
            soi_radius,
            kind: BodyKind::Celestial,
            position,
            orbit: None,
        }
    }

    /// Creates a massless vessel at a position.
    pub fn vessel(name: String, position: DVec3) -> Self {
        Self {
            name,
            mass: 0.0,
            radius: 0.0,
            soi_radius: 0.0,
            kind: BodyKind::Vessel,
            position,
            orbit: None,
        }
    }

    /// Whether `position` lies within this body's sphere of influence.
    pub fn soi_contains(&self, position: DVec3) -> bool {
        self.position.distance_squared(position) <= self.soi_radius * self.soi_radius
    }

    /// Releases the body from its orbit.
    pub fn release_from_orbit(&mut self) {
        self.orbit = None;
    }
}

impl Default for Body {
    /// Creates a default `Body` instance: a unit-mass, unit-radius body at
    /// the origin with an SOI of radius 2.
    fn default() -> Self {
        Self::new("Body".to_string(), 1.0, 1.0, 2.0, DVec3::ZERO)
    }
}
