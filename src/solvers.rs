use crate::{
    hyperbolic_keplers_equation, hyperbolic_keplers_equation_derivative,
    hyperbolic_keplers_equation_second_derivative, keplers_equation, keplers_equation_derivative,
    keplers_equation_second_derivative, sinhcosh, BISECTION_MAX_ITERS, KEPLER_MAX_ITERS,
    KEPLER_TOLERANCE,
};
use core::f64::consts::TAU;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which of the two conic regimes a Kepler equation is solved in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrbitRegime {
    /// Closed orbit, `e < 1`. Solves `E - e sin(E) = M`.
    Elliptic,
    /// Open trajectory, `e >= 1`. Solves `e sinh(H) - H = M`.
    Hyperbolic,
}

impl OrbitRegime {
    /// Picks the regime for an eccentricity.
    pub fn from_eccentricity(eccentricity: f64) -> Self {
        if eccentricity < 1.0 {
            Self::Elliptic
        } else {
            Self::Hyperbolic
        }
    }
}

/// The root-finding method that produced a [`KeplerSolution`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SolverMethod {
    /// Halley-corrected Newton–Raphson converged within the iteration cap.
    Newton,
    /// Newton–Raphson stalled and the bracketed bisection fallback was used.
    Bisection,
}

/// The result of solving Kepler's equation, with convergence diagnostics.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeplerSolution {
    /// The eccentric anomaly `E` (elliptic) or hyperbolic anomaly `H`.
    pub anomaly: f64,
    /// Iterations spent, summed over both methods.
    pub iterations: u32,
    /// Absolute residual of Kepler's equation at `anomaly`.
    pub residual: f64,
    /// The method that produced `anomaly`.
    pub method: SolverMethod,
}

/// Solves Kepler's equation for the eccentric or hyperbolic anomaly.
///
/// Uses Newton–Raphson with a second-order (Halley) correction:
///
/// ```text
/// delta = f / (f' - f f'' / (2 f' + eps))
/// ```
///
/// The elliptic solve reduces the mean anomaly into `[-pi, pi)` and adds the
/// whole revolutions back, so `E - e sin(E) = M` holds for the input `M`.
/// The hyperbolic initial guess is `sign(M) ln(2|M|/e + 1.8)`.
///
/// # Non-convergence
/// This function never fails. If Newton–Raphson doesn't converge within
/// the iteration cap, it falls back to bisection on a bracket that is
/// guaranteed to contain the root. Check [`KeplerSolution::method`] to see
/// which one was used.
///
/// # Example
/// ```
/// use analytic_orbits::{solve_kepler_equation, OrbitRegime};
///
/// let solution = solve_kepler_equation(1.0, 0.5, OrbitRegime::Elliptic);
/// let e = solution.anomaly;
/// assert!((e - 0.5 * e.sin() - 1.0).abs() < 1e-9);
/// ```
pub fn solve_kepler_equation(
    mean_anomaly: f64,
    eccentricity: f64,
    regime: OrbitRegime,
) -> KeplerSolution {
    match regime {
        OrbitRegime::Elliptic => solve_elliptic(mean_anomaly, eccentricity),
        OrbitRegime::Hyperbolic => solve_hyperbolic(mean_anomaly, eccentricity),
    }
}

fn solve_elliptic(mean_anomaly: f64, eccentricity: f64) -> KeplerSolution {
    let revolutions = (mean_anomaly / TAU).round();
    let offset = revolutions * TAU;
    let reduced = mean_anomaly - offset;

    let eval = |ecc_anom: f64| {
        (
            keplers_equation(reduced, ecc_anom, eccentricity),
            keplers_equation_derivative(ecc_anom, eccentricity),
            keplers_equation_second_derivative(ecc_anom, eccentricity),
        )
    };

    let (mut anomaly, mut iterations, converged) = halley(reduced, eval);
    let mut method = SolverMethod::Newton;

    if !converged {
        // E - M = e sin(E), so the root lies within e of M
        let (root, spent) = bisect(reduced - eccentricity, reduced + eccentricity, |x| {
            keplers_equation(reduced, x, eccentricity)
        });
        tracing::debug!(
            mean_anomaly,
            eccentricity,
            "elliptic Kepler solve fell back to bisection"
        );
        anomaly = root;
        iterations += spent;
        method = SolverMethod::Bisection;
    }

    KeplerSolution {
        anomaly: anomaly + offset,
        iterations,
        residual: keplers_equation(reduced, anomaly, eccentricity).abs(),
        method,
    }
}

fn solve_hyperbolic(mean_anomaly: f64, eccentricity: f64) -> KeplerSolution {
    let guess = mean_anomaly.signum() * (2.0 * mean_anomaly.abs() / eccentricity + 1.8).ln();

    let eval = |hyp_anom: f64| {
        (
            hyperbolic_keplers_equation(mean_anomaly, hyp_anom, eccentricity),
            hyperbolic_keplers_equation_derivative(hyp_anom, eccentricity),
            hyperbolic_keplers_equation_second_derivative(hyp_anom, eccentricity),
        )
    };

    let (mut anomaly, mut iterations, converged) = halley(guess, eval);
    let mut method = SolverMethod::Newton;

    if !converged {
        // The equation is odd in H, so solve for |M| and restore the sign.
        // For H >= 0:  asinh(M/e) <= H <= asinh(M/(e-1))
        let sign = mean_anomaly.signum();
        let m = mean_anomaly.abs();
        let lo = (m / eccentricity).asinh();
        let hi = (m / (eccentricity - 1.0)).asinh();
        let (root, spent) = bisect(lo, hi, |x| {
            hyperbolic_keplers_equation(m, x, eccentricity)
        });
        tracing::debug!(
            mean_anomaly,
            eccentricity,
            "hyperbolic Kepler solve fell back to bisection"
        );
        anomaly = sign * root;
        iterations += spent;
        method = SolverMethod::Bisection;
    }

    KeplerSolution {
        anomaly,
        iterations,
        residual: hyperbolic_keplers_equation(mean_anomaly, anomaly, eccentricity).abs(),
        method,
    }
}

/// Runs the Halley-corrected Newton iteration.
///
/// Returns the estimate, the iterations spent, and whether the step size fell
/// below [`KEPLER_TOLERANCE`].
fn halley(guess: f64, eval: impl Fn(f64) -> (f64, f64, f64)) -> (f64, u32, bool) {
    let mut x = guess;

    for iteration in 1..=KEPLER_MAX_ITERS {
        let (f, df, d2f) = eval(x);

        if df.abs() < 1e-12 {
            return (x, iteration, false);
        }

        let delta = f / (df - (f * d2f) / (2.0 * df + 1e-12));

        if !delta.is_finite() {
            return (x, iteration, false);
        }

        x -= delta;

        if delta.abs() < KEPLER_TOLERANCE {
            return (x, iteration, x.is_finite());
        }
    }

    (x, KEPLER_MAX_ITERS, false)
}

/// Bisects an increasing function on `[lo, hi]`.
fn bisect(mut lo: f64, mut hi: f64, f: impl Fn(f64) -> f64) -> (f64, u32) {
    let mut iterations = 0;

    while iterations < BISECTION_MAX_ITERS {
        iterations += 1;
        let mid = 0.5 * (lo + hi);

        if f(mid) > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }

        if hi - lo < KEPLER_TOLERANCE * 1e-2 {
            break;
        }
    }

    (0.5 * (lo + hi), iterations)
}

/// Converts an elliptic eccentric anomaly into a true anomaly.
///
/// This is the half-angle identity `tan(f/2) = sqrt((1+e)/(1-e)) tan(E/2)`,
/// rearranged so the result stays continuous in `E`: every whole revolution
/// of `E` adds a whole revolution to the returned true anomaly.
pub fn true_anomaly_from_eccentric_anomaly(eccentric_anomaly: f64, eccentricity: f64) -> f64 {
    // https://en.wikipedia.org/wiki/True_anomaly#From_the_eccentric_anomaly
    let (s, c) = eccentric_anomaly.sin_cos();
    let beta = eccentricity / (1.0 + (1.0 - eccentricity * eccentricity).sqrt());

    eccentric_anomaly + 2.0 * (beta * s / (1.0 - beta * c)).atan()
}

/// Converts a hyperbolic anomaly into a true anomaly.
///
/// `tan(f/2) = sqrt((e+1)/(e-1)) tanh(H/2)`
pub fn true_anomaly_from_hyperbolic_anomaly(hyperbolic_anomaly: f64, eccentricity: f64) -> f64 {
    2.0 * (((eccentricity + 1.0) / (eccentricity - 1.0)).sqrt()
        * (hyperbolic_anomaly * 0.5).tanh())
    .atan()
}

/// Solves for the true anomaly at a mean anomaly, picking the regime
/// from the eccentricity.
pub fn true_anomaly_at_mean_anomaly(mean_anomaly: f64, eccentricity: f64) -> f64 {
    let regime = OrbitRegime::from_eccentricity(eccentricity);
    let solution = solve_kepler_equation(mean_anomaly, eccentricity, regime);

    match regime {
        OrbitRegime::Elliptic => true_anomaly_from_eccentric_anomaly(solution.anomaly, eccentricity),
        OrbitRegime::Hyperbolic => {
            true_anomaly_from_hyperbolic_anomaly(solution.anomaly, eccentricity)
        }
    }
}

/// Gets the mean anomaly of a hyperbolic anomaly: `M = e sinh(H) - H`.
pub(crate) fn mean_anomaly_at_hyperbolic_anomaly(hyperbolic_anomaly: f64, eccentricity: f64) -> f64 {
    let (sinh, _) = sinhcosh(hyperbolic_anomaly);
    eccentricity * sinh - hyperbolic_anomaly
}
