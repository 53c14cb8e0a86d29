use core::fmt;
use std::collections::HashMap;

use glam::DVec3;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    Body, BodyKind, CentralBody, Initialization, OrbitMover, SimulationContext, SystemError,
};

/// An identifier for a body in a [`SolarSystem`].
pub type BodyId = u64;

/// A patched-conics solar system: bodies, who orbits whom, and the clock.
///
/// Each orbiting body's mover is ticked after its parent's, so it always
/// orbits where its parent is *now*. Vessels are checked for SOI transitions
/// after every tick.
///
/// # Example
/// ```
/// use glam::DVec3;
/// use analytic_orbits::{Body, Initialization, SimulationContext, SolarSystem};
///
/// let mut system = SolarSystem::new(SimulationContext::default());
///
/// let star = Body::new("Star".to_string(), 1.0, 0.1, f64::INFINITY, DVec3::ZERO);
/// let star = system.add_body(star, None).unwrap();
///
/// let ship = system
///     .add_body(Body::vessel("Ship".to_string(), DVec3::ZERO), None)
///     .unwrap();
/// system
///     .place_in_orbit(ship, star, DVec3::new(1.0, 0.0, 0.0), Initialization::CircularOrbit)
///     .unwrap();
///
/// let report = system.tick(0.1);
/// assert!(report.soi_transitions.is_empty());
/// assert_eq!(system.parent_of(ship), Some(star));
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolarSystem {
    /// The bodies in the system and their relations.
    bodies: HashMap<BodyId, BodyWrapper>,

    /// The next ID to assign to a body.
    next_id: BodyId,

    /// The simulated time elapsed so far.
    pub time: f64,

    /// Gravitational constant and other tunables.
    pub context: SimulationContext,
}

/// Parent/satellite links of a body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyRelation {
    /// The body this one orbits.
    pub parent: Option<BodyId>,
    /// The bodies orbiting this one.
    pub satellites: Vec<BodyId>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct BodyWrapper {
    body: Body,
    relations: BodyRelation,
}

/// A body crossed into another body's sphere of influence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SoiTransition {
    /// The body that moved.
    pub body: BodyId,
    /// Its central body before the transition.
    pub from: Option<BodyId>,
    /// The body whose SOI now encloses it most tightly.
    pub to: BodyId,
    /// Whether the central body was reassigned during the tick.
    pub applied: bool,
}

/// What changed during a [`SolarSystem::tick`].
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TickReport {
    /// SOI transitions detected this tick.
    pub soi_transitions: Vec<SoiTransition>,
    /// Bodies whose orbit shape was recomputed this tick.
    pub recomputed: Vec<BodyId>,
}

impl SolarSystem {
    /// Creates an empty solar system.
    pub fn new(context: SimulationContext) -> SolarSystem {
        SolarSystem {
            bodies: HashMap::new(),
            next_id: 0,
            time: 0.0,
            context,
        }
    }

    /// Adds a body to the system.
    ///
    /// `satellite_of`: The ID of the body that this body is orbiting.
    /// This only records the relation; use
    /// [`place_in_orbit`][Self::place_in_orbit] to give the body an orbit.
    ///
    /// Returns the ID of the newly-added body.
    pub fn add_body(&mut self, body: Body, satellite_of: Option<BodyId>) -> Result<BodyId, SystemError> {
        if let Some(parent_id) = satellite_of {
            if !self.bodies.contains_key(&parent_id) {
                return Err(SystemError::ParentNotFound(parent_id));
            }
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        self.bodies.insert(
            id,
            BodyWrapper {
                body,
                relations: BodyRelation {
                    parent: satellite_of,
                    satellites: Vec::new(),
                },
            },
        );
        if let Some(parent_id) = satellite_of {
            if let Some(wrapper) = self.bodies.get_mut(&parent_id) {
                wrapper.relations.satellites.push(id);
            }
        }

        tracing::debug!(id, parent = ?satellite_of, "added body");
        Ok(id)
    }

    /// Removes a body and, recursively, all of its satellites.
    ///
    /// Returns all bodies that were removed, including the one specified.
    /// An empty Vec is returned if the body was not found.
    pub fn remove_body(&mut self, body_id: BodyId) -> Vec<Body> {
        let wrapper = match self.bodies.remove(&body_id) {
            Some(wrapper) => wrapper,
            None => return Vec::new(),
        };

        let (body, relations) = (wrapper.body, wrapper.relations);
        let mut bodies = vec![body];

        if let Some(parent_id) = relations.parent {
            if let Some(parent_wrapper) = self.bodies.get_mut(&parent_id) {
                parent_wrapper
                    .relations
                    .satellites
                    .retain(|&satellite| satellite != body_id);
            }
        }

        for &satellite_id in &relations.satellites {
            bodies.append(&mut self.remove_body(satellite_id));
        }

        bodies
    }

    /// Gets all bodies in the system, in no particular order.
    pub fn get_bodies(&self) -> Vec<(BodyId, &Body)> {
        self.bodies
            .iter()
            .map(|(&id, wrapper)| (id, &wrapper.body))
            .collect()
    }

    /// Gets an immutable reference to a body.
    pub fn get_body(&self, body_id: BodyId) -> Option<&Body> {
        self.bodies.get(&body_id).map(|wrapper| &wrapper.body)
    }

    /// Gets a mutable reference to a body.
    ///
    /// Changing `orbit` through this reference bypasses relation bookkeeping;
    /// prefer [`place_in_orbit`][Self::place_in_orbit] and
    /// [`set_central_body`][Self::set_central_body].
    pub fn get_body_mut(&mut self, body_id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(&body_id).map(|wrapper| &mut wrapper.body)
    }

    /// Gets the ID of the first body found with a given name.
    pub fn get_body_id_with_name(&self, name: &str) -> Option<BodyId> {
        self.bodies
            .iter()
            .find(|(_, w)| w.body.name == name)
            .map(|(id, _)| *id)
    }

    /// Gets the relations of a body.
    pub fn get_relations(&self, body_id: BodyId) -> Option<&BodyRelation> {
        self.bodies.get(&body_id).map(|wrapper| &wrapper.relations)
    }

    /// Gets the body a body orbits.
    pub fn parent_of(&self, body_id: BodyId) -> Option<BodyId> {
        self.bodies.get(&body_id)?.relations.parent
    }

    /// Gets the bodies orbiting a body. Empty if the body doesn't exist.
    pub fn satellites_of(&self, body_id: BodyId) -> &[BodyId] {
        self.bodies
            .get(&body_id)
            .map_or(&[], |wrapper| wrapper.relations.satellites.as_slice())
    }

    /// Gets the gravitational parameter (mu = GM) of a body.
    pub fn gravitational_parameter(&self, body_id: BodyId) -> Option<f64> {
        let body = self.get_body(body_id)?;
        Some(self.context.gravitational_parameter(body.mass))
    }

    /// Puts a body into orbit around `parent_id`, starting at `position`.
    ///
    /// Any previous orbit and parent are replaced.
    pub fn place_in_orbit(
        &mut self,
        body_id: BodyId,
        parent_id: BodyId,
        position: DVec3,
        initialization: Initialization,
    ) -> Result<(), SystemError> {
        let central = self.central_body_for(body_id, parent_id)?;
        let context = self.context;
        let wrapper = self
            .bodies
            .get_mut(&body_id)
            .ok_or(SystemError::BodyNotFound(body_id))?;

        match wrapper.body.orbit.as_mut() {
            Some(orbit) => orbit.place_in_orbit(central, position, initialization)?,
            None => {
                let mut orbit = OrbitMover::new(central, position, initialization, 1.0)?;
                orbit.set_parabolic_guard(context.parabolic_guard_band, context.parabolic_nudge);
                wrapper.body.orbit = Some(orbit);
            }
        }
        wrapper.body.position = position;

        self.relink(body_id, parent_id);
        Ok(())
    }

    /// Moves a body into orbit around a different central body.
    ///
    /// Position is kept, and the velocity is converted into the new central
    /// body's frame, so the body's motion in world space is continuous. The
    /// orbit is reinitialized against the new gravitational parameter.
    pub fn set_central_body(&mut self, body_id: BodyId, new_parent_id: BodyId) -> Result<(), SystemError> {
        let central = self.central_body_for(body_id, new_parent_id)?;

        let body_velocity = self
            .world_velocity(body_id)
            .ok_or(SystemError::BodyNotFound(body_id))?;
        let parent_velocity = self
            .world_velocity(new_parent_id)
            .ok_or(SystemError::BodyNotFound(new_parent_id))?;
        let relative_velocity = body_velocity - parent_velocity;

        let wrapper = self
            .bodies
            .get_mut(&body_id)
            .ok_or(SystemError::BodyNotFound(body_id))?;
        let position = wrapper.body.position;
        let orbit = wrapper
            .body
            .orbit
            .as_mut()
            .ok_or(SystemError::NotOrbiting(body_id))?;

        orbit.place_in_orbit(
            central,
            position,
            Initialization::InitialVelocity(relative_velocity),
        )?;

        tracing::info!(
            body = %wrapper.body.name,
            new_parent = new_parent_id,
            "central body changed"
        );
        self.relink(body_id, new_parent_id);
        Ok(())
    }

    fn central_body_for(&self, body_id: BodyId, parent_id: BodyId) -> Result<CentralBody, SystemError> {
        if !self.bodies.contains_key(&body_id) {
            return Err(SystemError::BodyNotFound(body_id));
        }
        let parent = self
            .bodies
            .get(&parent_id)
            .ok_or(SystemError::ParentNotFound(parent_id))?;

        if self.is_same_or_ancestor(body_id, parent_id) {
            return Err(SystemError::InvalidParent {
                body: body_id,
                parent: parent_id,
            });
        }

        Ok(CentralBody::new(
            parent.body.position,
            self.context.gravitational_parameter(parent.body.mass),
        ))
    }

    /// Whether `ancestor` is `body_id` or one of its parents.
    fn is_same_or_ancestor(&self, ancestor: BodyId, body_id: BodyId) -> bool {
        let mut current = Some(body_id);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent_of(id);
        }
        false
    }

    fn relink(&mut self, body_id: BodyId, parent_id: BodyId) {
        let old_parent = self.parent_of(body_id);
        if old_parent == Some(parent_id) {
            return;
        }

        if let Some(old_parent) = old_parent.and_then(|id| self.bodies.get_mut(&id)) {
            old_parent.relations.satellites.retain(|&id| id != body_id);
        }
        if let Some(parent) = self.bodies.get_mut(&parent_id) {
            parent.relations.satellites.push(body_id);
        }
        if let Some(wrapper) = self.bodies.get_mut(&body_id) {
            wrapper.relations.parent = Some(parent_id);
        }
    }

    /// Gets the velocity of a body in world space, summing relative velocities
    /// up the chain of parents.
    pub fn world_velocity(&self, body_id: BodyId) -> Option<DVec3> {
        let wrapper = self.bodies.get(&body_id)?;
        let own = wrapper
            .body
            .orbit
            .as_ref()
            .map_or(DVec3::ZERO, |orbit| orbit.velocity());

        match wrapper.relations.parent {
            Some(parent) => Some(own + self.world_velocity(parent).unwrap_or(DVec3::ZERO)),
            None => Some(own),
        }
    }

    /// Finds the celestial body with the smallest sphere of influence that
    /// contains `position`, skipping `exclude`.
    pub fn find_body_with_soi_containing(
        &self,
        position: DVec3,
        exclude: Option<BodyId>,
    ) -> Option<BodyId> {
        self.bodies
            .iter()
            .filter(|&(&id, _)| Some(id) != exclude)
            .filter(|(_, w)| w.body.kind == BodyKind::Celestial && w.body.soi_contains(position))
            .min_by(|(id_a, a), (id_b, b)| {
                a.body
                    .soi_radius
                    .total_cmp(&b.body.soi_radius)
                    .then(id_a.cmp(id_b))
            })
            .map(|(&id, _)| id)
    }

    /// Bodies ordered so that every parent comes before its satellites.
    fn tick_order(&self) -> Vec<BodyId> {
        let mut roots: Vec<BodyId> = self
            .bodies
            .iter()
            .filter(|(_, w)| w.relations.parent.is_none())
            .map(|(&id, _)| id)
            .collect();
        roots.sort_unstable();

        let mut order = Vec::with_capacity(self.bodies.len());
        let mut stack: Vec<BodyId> = roots.into_iter().rev().collect();

        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(wrapper) = self.bodies.get(&id) {
                stack.extend(wrapper.relations.satellites.iter().rev());
            }
        }

        order
    }

    /// Advances every orbit by `delta_time`, then checks vessels for SOI
    /// transitions.
    ///
    /// With [`SimulationContext::auto_soi_transition`] set, transitions are
    /// applied immediately via [`set_central_body`][Self::set_central_body].
    pub fn tick(&mut self, delta_time: f64) -> TickReport {
        self.time += delta_time;

        for id in self.tick_order() {
            let parent_position = self
                .parent_of(id)
                .and_then(|parent| self.get_body(parent))
                .map(|parent| parent.position);

            let Some(wrapper) = self.bodies.get_mut(&id) else {
                continue;
            };
            if let Some(orbit) = wrapper.body.orbit.as_mut() {
                if let Some(parent_position) = parent_position {
                    orbit.set_central_body_position(parent_position);
                }
                wrapper.body.position = orbit.tick(delta_time).position;
            }
        }

        let mut report = TickReport::default();

        let mut vessels: Vec<BodyId> = self
            .bodies
            .iter()
            .filter(|(_, w)| w.body.kind == BodyKind::Vessel && w.body.orbit.is_some())
            .map(|(&id, _)| id)
            .collect();
        vessels.sort_unstable();

        for id in vessels {
            let Some(body) = self.get_body(id) else {
                continue;
            };
            let from = self.parent_of(id);
            let Some(to) = self.find_body_with_soi_containing(body.position, Some(id)) else {
                continue;
            };
            if Some(to) == from {
                continue;
            }

            let mut transition = SoiTransition {
                body: id,
                from,
                to,
                applied: false,
            };

            if self.context.auto_soi_transition {
                match self.set_central_body(id, to) {
                    Ok(()) => {
                        transition.applied = true;
                        report.recomputed.push(id);
                    }
                    Err(err) => tracing::warn!(%err, body = id, "SOI transition failed"),
                }
            }

            report.soi_transitions.push(transition);
        }

        report
    }

    /// Searches one period of `body_id`'s orbit for entry into
    /// `target_id`'s sphere of influence.
    ///
    /// Uses the context's [`EncounterSearch`][crate::EncounterSearch]
    /// defaults. Returns the body's true anomaly at entry, or `None` if it
    /// doesn't enter within one period.
    pub fn encounter_anomaly(&mut self, body_id: BodyId, target_id: BodyId) -> Result<Option<f64>, SystemError> {
        let search = self.context.encounter;

        let mut orbit = self
            .bodies
            .get_mut(&body_id)
            .ok_or(SystemError::BodyNotFound(body_id))?
            .body
            .orbit
            .take()
            .ok_or(SystemError::NotOrbiting(body_id))?;

        let result = match self.get_body(target_id) {
            Some(target) => match target.orbit.as_ref() {
                Some(target_orbit) => Ok(orbit.calculate_encounter_anomaly(
                    target_orbit,
                    target.soi_radius,
                    search,
                )),
                None => Err(SystemError::NotOrbiting(target_id)),
            },
            None => Err(SystemError::BodyNotFound(target_id)),
        };

        if let Some(wrapper) = self.bodies.get_mut(&body_id) {
            wrapper.body.orbit = Some(orbit);
        }

        result
    }

    /// Gets the time until a body leaves its central body's sphere of influence.
    ///
    /// `None` if it never does (closed orbit inside the SOI).
    pub fn time_until_soi_exit(&self, body_id: BodyId) -> Result<Option<f64>, SystemError> {
        let body = self
            .get_body(body_id)
            .ok_or(SystemError::BodyNotFound(body_id))?;
        let orbit = body.orbit.as_ref().ok_or(SystemError::NotOrbiting(body_id))?;
        let parent_id = self
            .parent_of(body_id)
            .ok_or(SystemError::NotOrbiting(body_id))?;
        let parent = self
            .get_body(parent_id)
            .ok_or(SystemError::BodyNotFound(parent_id))?;

        Ok(orbit.time_until_radius(parent.soi_radius))
    }
}

impl Default for SolarSystem {
    fn default() -> Self {
        SolarSystem::new(SimulationContext::default())
    }
}

impl fmt::Display for SolarSystem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Solar system with {} bodies, t={}",
            self.bodies.len(),
            self.time
        )
    }
}
