#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Simulation-wide tunables.
///
/// This replaces a process-wide gravitational constant: every gravitational
/// parameter is derived as `context.gravitational_constant * mass`, so
/// simulations (and tests) with different values of G can coexist.
///
/// # Example
/// ```
/// use analytic_orbits::SimulationContext;
///
/// let context = SimulationContext {
///     gravitational_constant: 6.6743e-11,
///     ..Default::default()
/// };
///
/// assert_eq!(context.gravitational_parameter(5.972e24), 6.6743e-11 * 5.972e24);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationContext {
    /// The gravitational constant G. Game units default to 1.
    pub gravitational_constant: f64,

    /// When `|1 - e|` falls below this after an impulse, the velocity is
    /// nudged away from the parabolic singularity.
    pub parabolic_guard_band: f64,

    /// Magnitude of the nudge applied inside the parabolic guard band.
    pub parabolic_nudge: f64,

    /// Whether [`SolarSystem::tick`][crate::SolarSystem::tick] reassigns a
    /// vessel's central body as soon as it crosses into another SOI.
    pub auto_soi_transition: bool,

    /// Defaults for encounter searches.
    pub encounter: EncounterSearch,
}

impl SimulationContext {
    /// Gets the gravitational parameter (mu = GM) of a body with the given mass.
    pub fn gravitational_parameter(&self, mass: f64) -> f64 {
        self.gravitational_constant * mass
    }
}

impl Default for SimulationContext {
    fn default() -> Self {
        Self {
            gravitational_constant: 1.0,
            parabolic_guard_band: 1e-3,
            parabolic_nudge: 0.1,
            auto_soi_transition: true,
            encounter: EncounterSearch::default(),
        }
    }
}

/// Parameters of the sampled encounter search.
///
/// See [`OrbitMover::calculate_encounter_anomaly`][crate::OrbitMover::calculate_encounter_anomaly].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EncounterSearch {
    /// Number of coarse samples across one period.
    pub samples: usize,
    /// Number of bisection steps inside the bracketing sample interval.
    pub refine_iters: usize,
}

impl Default for EncounterSearch {
    fn default() -> Self {
        Self {
            samples: 100,
            refine_iters: 5,
        }
    }
}

/// A ladder of time multipliers for time warp.
///
/// ```
/// use analytic_orbits::TimeWarp;
///
/// let mut warp = TimeWarp::default();
/// assert_eq!(warp.multiplier(), 1.0);
/// warp.increase();
/// assert_eq!(warp.multiplier(), 5.0);
/// warp.decrease();
/// warp.decrease();
/// assert_eq!(warp.multiplier(), 1.0);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "RawTimeWarp"))]
pub struct TimeWarp {
    scales: Vec<f64>,
    index: usize,
}

/// Unchecked wire form of a [`TimeWarp`]; goes through [`TimeWarp::new`].
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawTimeWarp {
    scales: Vec<f64>,
    index: usize,
}

#[cfg(feature = "serde")]
impl From<RawTimeWarp> for TimeWarp {
    fn from(raw: RawTimeWarp) -> Self {
        let mut warp = Self::new(raw.scales);
        warp.set_index(raw.index);
        warp
    }
}

impl TimeWarp {
    /// Creates a ladder from the given scales, starting at the first one.
    ///
    /// An empty list falls back to a single 1x scale.
    pub fn new(scales: Vec<f64>) -> Self {
        let scales = if scales.is_empty() { vec![1.0] } else { scales };
        Self { scales, index: 0 }
    }

    /// The current time multiplier.
    pub fn multiplier(&self) -> f64 {
        self.scales.get(self.index).copied().unwrap_or(1.0)
    }

    /// Steps one rung up the ladder, saturating at the top.
    pub fn increase(&mut self) -> f64 {
        self.index = (self.index + 1).min(self.top());
        tracing::debug!("time warp set to {}x", self.multiplier());
        self.multiplier()
    }

    /// Steps one rung down the ladder, saturating at the bottom.
    pub fn decrease(&mut self) -> f64 {
        self.index = self.index.saturating_sub(1);
        tracing::debug!("time warp set to {}x", self.multiplier());
        self.multiplier()
    }

    /// Jumps to a rung, clamped to the ladder.
    pub fn set_index(&mut self, index: usize) -> f64 {
        self.index = index.min(self.top());
        self.multiplier()
    }

    fn top(&self) -> usize {
        self.scales.len().saturating_sub(1)
    }

    /// Scales a raw frame delta by the current multiplier.
    pub fn scale(&self, delta_time: f64) -> f64 {
        delta_time * self.multiplier()
    }
}

impl Default for TimeWarp {
    fn default() -> Self {
        Self::new(vec![1.0, 5.0, 10.0, 50.0, 100.0])
    }
}
