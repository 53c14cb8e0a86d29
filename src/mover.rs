use glam::DVec3;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    EncounterSearch, OrbitError, OrbitShape, OrbitState, SimulationContext, StateVectors,
    DEGENERATE_EPSILON,
};

/// The body an [`OrbitMover`] orbits, as far as the orbit is concerned.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CentralBody {
    /// World position of the central body.
    pub position: DVec3,
    /// Gravitational parameter (mu = GM) of the central body.
    pub mu: f64,
}

impl CentralBody {
    /// Creates a new `CentralBody`.
    pub fn new(position: DVec3, mu: f64) -> Self {
        Self { position, mu }
    }
}

/// How an [`OrbitMover`] picks its initial velocity.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Initialization {
    /// Use this velocity, relative to the central body.
    InitialVelocity(DVec3),
    /// Use the circular-orbit speed `sqrt(mu / r)`, heading along `r x +Y`.
    ///
    /// Fails if the body sits on the central body's Y axis.
    CircularOrbit,
}

/// An orbiting entity: one [`OrbitShape`] and one [`OrbitState`], kept in sync.
///
/// Everything that changes the velocity or the frame (impulses, repositioning,
/// a new central body) goes through this type, which recomputes the shape and
/// resynchronizes the state together. A failed recompute leaves the previous
/// orbit untouched.
///
/// # Change notification
/// [`revision`][Self::revision] increases every time the shape is recomputed.
/// Trajectory renderers and SOI predictors can poll it instead of
/// subscribing to events.
///
/// # Example
/// ```
/// use glam::DVec3;
/// use analytic_orbits::{CentralBody, Initialization, OrbitMover};
///
/// let mut ship = OrbitMover::new(
///     CentralBody::new(DVec3::ZERO, 1.0),
///     DVec3::new(1.0, 0.0, 0.0),
///     Initialization::CircularOrbit,
///     1.0,
/// )
/// .unwrap();
///
/// let before = ship.revision();
/// ship.apply_delta_velocity(ship.velocity() * 0.1).unwrap();
/// assert!(ship.revision() > before);
/// assert!(ship.shape().get_eccentricity() > 0.1);
/// ```
///
/// Equality compares the orbit itself (central body, position, shape, state
/// and time multiplier), not the prediction cache or counters.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrbitMover {
    central: CentralBody,
    position: DVec3,
    shape: OrbitShape,
    state: OrbitState,
    time_multiplier: f64,
    parabolic_guard_band: f64,
    parabolic_nudge: f64,
    tick_count: u64,
    revision: u64,
    /// Bumped on anything that moves predictions: ticks, recomputes, frame shifts.
    epoch: u64,
    #[cfg_attr(feature = "serde", serde(skip))]
    position_cache: PredictionCache,
}

impl PartialEq for OrbitMover {
    fn eq(&self, other: &Self) -> bool {
        self.central == other.central
            && self.position == other.position
            && self.shape == other.shape
            && self.state == other.state
            && self.time_multiplier == other.time_multiplier
    }
}

/// Own predicted positions over one period, reused within a single tick.
#[derive(Clone, Debug, Default)]
struct PredictionCache {
    key: Option<(u64, usize)>,
    positions: Vec<DVec3>,
}

impl OrbitMover {
    /// Creates a mover at `position` around `central`.
    ///
    /// `time_multiplier` scales every tick's delta time (time warp).
    ///
    /// # Errors
    /// Configuration errors (see [`OrbitError`]) are logged and returned; the
    /// caller should treat the entity as inert.
    pub fn new(
        central: CentralBody,
        position: DVec3,
        initialization: Initialization,
        time_multiplier: f64,
    ) -> Result<Self, OrbitError> {
        let context = SimulationContext::default();
        let (velocity, shape) = derive_orbit(&central, position, initialization)
            .inspect_err(|err| tracing::error!(%err, "central body configuration error"))?;

        let mut state = OrbitState::new();
        state.set_velocity(velocity);
        state.sync_elapsed_time_to_current_position(&shape, position, central.position);

        Ok(Self {
            central,
            position,
            shape,
            state,
            time_multiplier,
            parabolic_guard_band: context.parabolic_guard_band,
            parabolic_nudge: context.parabolic_nudge,
            tick_count: 0,
            revision: 0,
            epoch: 0,
            position_cache: PredictionCache::default(),
        })
    }

    /// Sets how close to `e = 1` an impulse may leave the orbit before the
    /// velocity is nudged, and by how much.
    pub fn set_parabolic_guard(&mut self, band: f64, nudge: f64) {
        self.parabolic_guard_band = band;
        self.parabolic_nudge = nudge;
    }

    /// Advances the orbit by `delta_time * time_multiplier`.
    ///
    /// Returns the new world position and the velocity relative to the
    /// central body.
    pub fn tick(&mut self, delta_time: f64) -> StateVectors {
        self.tick_count += 1;
        self.epoch += 1;

        let sv = self.state.update_orbit(
            &self.shape,
            delta_time * self.time_multiplier,
            self.central.position,
        );
        self.position = sv.position;

        sv
    }

    /// Moves the frame: the central body is now at `position`.
    ///
    /// The body keeps its offset from the central body.
    pub fn set_central_body_position(&mut self, position: DVec3) {
        if position == self.central.position {
            return;
        }
        self.position += position - self.central.position;
        self.central.position = position;
        self.epoch += 1;
    }

    /// Applies an impulsive change in velocity at the current position.
    ///
    /// The shape is recomputed and the elapsed time resynced, so the orbit
    /// continues from the same place on the new trajectory. An impulse that
    /// leaves the orbit within the parabolic guard band of `e = 1` gets an
    /// extra nudge along `h x e`.
    pub fn apply_delta_velocity(&mut self, delta_v: DVec3) -> Result<(), OrbitError> {
        let mut velocity = self.state.get_velocity() + delta_v;
        let derive = |velocity| {
            OrbitShape::new(self.central.position, self.position, velocity, self.central.mu)
        };

        let shape = match derive(velocity) {
            Ok(shape) if (1.0 - shape.get_eccentricity()).abs() < self.parabolic_guard_band => {
                let direction = shape
                    .get_angular_momentum_vec()
                    .cross(shape.get_eccentricity_vec())
                    .normalize_or_zero();
                velocity += direction * self.parabolic_nudge;
                derive(velocity)
            }
            Err(OrbitError::Parabolic) => {
                velocity += velocity.normalize_or_zero() * self.parabolic_nudge;
                derive(velocity)
            }
            other => other,
        }
        .inspect_err(|err| tracing::error!(%err, "impulse left no valid orbit"))?;

        self.commit(shape, velocity);
        Ok(())
    }

    /// Teleports the body, keeping its velocity.
    pub fn set_position(&mut self, position: DVec3) -> Result<(), OrbitError> {
        let velocity = self.state.get_velocity();
        self.place_in_orbit(self.central, position, Initialization::InitialVelocity(velocity))
    }

    /// Replaces the velocity at the current position.
    pub fn set_velocity(&mut self, velocity: DVec3) -> Result<(), OrbitError> {
        self.place_in_orbit(
            self.central,
            self.position,
            Initialization::InitialVelocity(velocity),
        )
    }

    /// Reassigns the central body, keeping position and relative velocity.
    ///
    /// The orbit is fully reinitialized against the new gravitational parameter.
    /// Converting the velocity into the new body's frame is up to the caller;
    /// [`SolarSystem::set_central_body`][crate::SolarSystem::set_central_body]
    /// does it.
    pub fn set_central_body(&mut self, central: CentralBody) -> Result<(), OrbitError> {
        let velocity = self.state.get_velocity();
        self.place_in_orbit(central, self.position, Initialization::InitialVelocity(velocity))
    }

    /// Places the body at `position` around `central` with a fresh orbit.
    pub fn place_in_orbit(
        &mut self,
        central: CentralBody,
        position: DVec3,
        initialization: Initialization,
    ) -> Result<(), OrbitError> {
        let (velocity, shape) = derive_orbit(&central, position, initialization)
            .inspect_err(|err| tracing::error!(%err, "could not place body in orbit"))?;

        self.central = central;
        self.position = position;
        self.commit(shape, velocity);
        Ok(())
    }

    fn commit(&mut self, shape: OrbitShape, velocity: DVec3) {
        self.state.set_velocity(velocity);
        self.state
            .sync_elapsed_time_to_current_position(&shape, self.position, self.central.position);
        self.shape = shape;
        self.revision += 1;
        self.epoch += 1;

        tracing::trace!(
            revision = self.revision,
            semi_major_axis = self.shape.get_semi_major_axis(),
            eccentricity = self.shape.get_eccentricity(),
            "orbit parameters changed"
        );
    }

    /// Predicts where this body will be after `delta_time`, without
    /// affecting the running simulation.
    ///
    /// The time multiplier is not applied.
    pub fn predict_position_at_time(&self, delta_time: f64) -> DVec3 {
        self.state
            .predict_position(&self.shape, delta_time, self.central.position)
    }

    /// Predicts position and velocity after `delta_time`.
    pub fn predict_state_vectors_at_time(&self, delta_time: f64) -> StateVectors {
        self.state
            .predict_state_vectors(&self.shape, delta_time, self.central.position)
    }

    /// Samples the distance to `other` over one period of this orbit.
    pub fn calculate_distance_over_period(&self, other: &OrbitMover, samples: usize) -> Vec<f64> {
        let period = self.shape.get_orbital_period();

        (0..samples)
            .map(|i| {
                let time = (i as f64 / samples as f64) * period;
                self.predict_position_at_time(time)
                    .distance(other.predict_position_at_time(time))
            })
            .collect()
    }

    /// Searches one period ahead for the moment this body enters `other`'s
    /// sphere of influence.
    ///
    /// The squared distance minus `other_soi_radius^2` is sampled
    /// `search.samples` times over one period of this orbit. The first
    /// sample interval where it goes from positive to non-positive is
    /// refined with `search.refine_iters` bisection steps.
    ///
    /// Returns this body's true anomaly at the refined entry time, or `None`
    /// if there is no entry within one period. A body that is already inside
    /// the SOI for the whole period has no entry either.
    ///
    /// This body's own predicted positions are cached until the next tick or
    /// orbit change, so checking against many bodies in one tick is cheap.
    pub fn calculate_encounter_anomaly(
        &mut self,
        other: &OrbitMover,
        other_soi_radius: f64,
        search: EncounterSearch,
    ) -> Option<f64> {
        let samples = search.samples.max(1);
        let dt = self.shape.get_orbital_period() / samples as f64;
        self.refresh_position_cache(samples, dt);

        let r2 = other_soi_radius * other_soi_radius;
        let f = |this: DVec3, t: f64| this.distance_squared(other.predict_position_at_time(t)) - r2;

        let mut prev_f = f(self.position_cache.positions[0], 0.0);

        for i in 1..=samples {
            let t_hi = i as f64 * dt;
            let cur_f = f(self.position_cache.positions[i], t_hi);

            if cur_f <= 0.0 && prev_f > 0.0 {
                // bracket [(i - 1) dt, i dt]
                let mut t_lo = t_hi - dt;
                let mut t_hi = t_hi;
                let mut t_mid = 0.5 * (t_lo + t_hi);

                for _ in 0..search.refine_iters {
                    t_mid = 0.5 * (t_lo + t_hi);
                    if f(self.predict_position_at_time(t_mid), t_mid) > 0.0 {
                        t_lo = t_mid;
                    } else {
                        t_hi = t_mid;
                    }
                }

                return Some(self.state.compute_true_anomaly_in_future(&self.shape, t_mid));
            }

            prev_f = cur_f;
        }

        None
    }

    fn refresh_position_cache(&mut self, samples: usize, dt: f64) {
        let key = Some((self.epoch, samples));
        if self.position_cache.key == key {
            return;
        }

        let positions = (0..=samples)
            .map(|i| self.predict_position_at_time(i as f64 * dt))
            .collect();
        self.position_cache = PredictionCache { key, positions };
    }

    /// Gets the time until this body is next `radius` away from its central body.
    ///
    /// This is what SOI-exit prediction is built on: pass the central body's
    /// SOI radius. Returns `None` if the orbit never reaches that radius in
    /// the future.
    pub fn time_until_radius(&self, radius: f64) -> Option<f64> {
        let elapsed = self.state.get_elapsed_time();
        let period = self.shape.get_orbital_period();
        let closed = self.shape.is_closed();

        self.shape
            .get_true_anomalies_for_radius(radius)
            .into_iter()
            .filter_map(|theta| self.shape.time_since_periapsis_at_true_anomaly(theta))
            .map(|time| {
                let delta = time - elapsed;
                if closed {
                    delta.rem_euclid(period)
                } else {
                    delta
                }
            })
            .filter(|delta| *delta > DEGENERATE_EPSILON)
            .min_by(f64::total_cmp)
    }

    /// Gets the orbit shape.
    pub fn shape(&self) -> &OrbitShape {
        &self.shape
    }

    /// Gets the orbit state.
    pub fn state(&self) -> &OrbitState {
        &self.state
    }

    /// Gets the world position as of the last tick or change.
    pub fn position(&self) -> DVec3 {
        self.position
    }

    /// Gets the velocity relative to the central body.
    pub fn velocity(&self) -> DVec3 {
        self.state.get_velocity()
    }

    /// Gets the central body.
    pub fn central_body(&self) -> CentralBody {
        self.central
    }

    /// Gets the time multiplier.
    pub fn time_multiplier(&self) -> f64 {
        self.time_multiplier
    }

    /// Sets the time multiplier.
    pub fn set_time_multiplier(&mut self, time_multiplier: f64) {
        self.time_multiplier = time_multiplier;
    }

    /// Gets a counter that increases every time the orbit shape is recomputed.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Gets the number of ticks since creation.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}

fn derive_orbit(
    central: &CentralBody,
    position: DVec3,
    initialization: Initialization,
) -> Result<(DVec3, OrbitShape), OrbitError> {
    let velocity = initial_velocity(central, position, initialization)?;
    let shape = OrbitShape::new(central.position, position, velocity, central.mu)?;
    Ok((velocity, shape))
}

fn initial_velocity(
    central: &CentralBody,
    position: DVec3,
    initialization: Initialization,
) -> Result<DVec3, OrbitError> {
    match initialization {
        Initialization::InitialVelocity(velocity) => Ok(velocity),
        Initialization::CircularOrbit => {
            if !central.mu.is_finite() || central.mu <= 0.0 {
                return Err(OrbitError::InvalidGravitationalParameter { mu: central.mu });
            }

            let r_vec = position - central.position;
            let radius = r_vec.length();
            if radius < DEGENERATE_EPSILON {
                return Err(OrbitError::ZeroRadius { radius });
            }

            let direction = r_vec.cross(DVec3::Y).normalize_or_zero();
            if direction == DVec3::ZERO {
                return Err(OrbitError::ZeroAngularMomentum);
            }

            Ok(direction * (central.mu / radius).sqrt())
        }
    }
}
