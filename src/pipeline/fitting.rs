//! Lorentzian (Cauchy) peak model and its least-squares fit.
//!
//! The fit is a small Levenberg-Marquardt loop over the three model
//! parameters. Running out of evaluations is not an error: the caller gets
//! `None` and decides what an unfit peak means.

use std::f64::consts::PI;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Parameters of `amplitude / (pi * gamma) * gamma^2 / ((x - center)^2 + gamma^2)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LorentzianParams {
    pub amplitude: f64,
    /// Half width at half maximum
    pub gamma: f64,
    pub center: f64,
}

impl LorentzianParams {
    pub fn new(amplitude: f64, gamma: f64, center: f64) -> Self {
        Self { amplitude, gamma, center }
    }

    /// Full width at half maximum
    pub fn fwhm(&self) -> f64 {
        2.0 * self.gamma
    }

    /// Height of the curve at its center
    pub fn peak_height(&self) -> f64 {
        self.amplitude / (PI * self.gamma)
    }

    pub fn eval(&self, x: f64) -> f64 {
        lorentzian(x, self.amplitude, self.gamma, self.center)
    }

    fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.amplitude, self.gamma, self.center)
    }

    fn from_vector(v: &Vector3<f64>) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Starting point used when the caller has nothing better.
pub const DEFAULT_INITIAL_GUESS: LorentzianParams = LorentzianParams {
    amplitude: 2000.0,
    gamma: 2000.0,
    center: 1600.0,
};

impl Default for LorentzianParams {
    fn default() -> Self {
        DEFAULT_INITIAL_GUESS
    }
}

pub fn lorentzian(x: f64, amplitude: f64, gamma: f64, center: f64) -> f64 {
    let dx = x - center;
    (amplitude / (PI * gamma)) * (gamma * gamma / (dx * dx + gamma * gamma))
}

/// Evaluate the model at every `x`
pub fn lorentzian_curve(x: &[f64], params: &LorentzianParams) -> Vec<f64> {
    x.iter().map(|&xi| params.eval(xi)).collect()
}

/// Levenberg-Marquardt settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    /// Model evaluations allowed before giving up (200 * (params + 1))
    pub max_evaluations: usize,
    /// Relative reduction of the squared residual that counts as converged
    pub ftol: f64,
    /// Relative parameter step that counts as converged
    pub xtol: f64,
    pub initial_lambda: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_evaluations: 800,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            initial_lambda: 1e-3,
        }
    }
}

fn sum_squared_residuals(x: &[f64], y: &[f64], p: &Vector3<f64>) -> f64 {
    x.iter()
        .zip(y)
        .map(|(&xi, &yi)| {
            let r = yi - lorentzian(xi, p[0], p[1], p[2]);
            r * r
        })
        .sum()
}

/// `J^T J` and `J^T r` for residuals `r = y - f(x; p)`.
fn normal_equations(x: &[f64], y: &[f64], p: &Vector3<f64>) -> (Matrix3<f64>, Vector3<f64>) {
    let (amp, gamma, center) = (p[0], p[1], p[2]);
    let mut jtj = Matrix3::zeros();
    let mut jtr = Vector3::zeros();

    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - center;
        let denom = dx * dx + gamma * gamma;
        let denom2 = denom * denom;
        let grad = Vector3::new(
            gamma / (PI * denom),
            amp / PI * (dx * dx - gamma * gamma) / denom2,
            amp / PI * 2.0 * gamma * dx / denom2,
        );
        let r = yi - amp * gamma / (PI * denom);
        jtj += grad * grad.transpose();
        jtr += grad * r;
    }
    (jtj, jtr)
}

/// Fit a single Lorentzian to `(x, y)` starting from `guess`.
///
/// Returns `None` when the fit does not converge within the evaluation
/// budget, when there are fewer samples than parameters, or when the result
/// is not finite.
pub fn fit_lorentzian(x: &[f64], y: &[f64], guess: LorentzianParams) -> Option<LorentzianParams> {
    fit_lorentzian_with(x, y, guess, &FitConfig::default())
}

pub fn fit_lorentzian_with(
    x: &[f64],
    y: &[f64],
    guess: LorentzianParams,
    config: &FitConfig,
) -> Option<LorentzianParams> {
    if x.len() != y.len() || x.len() < 3 {
        log::debug!("Lorentzian fit skipped: {} samples", x.len());
        return None;
    }

    let mut params = guess.to_vector();
    let mut chi2 = sum_squared_residuals(x, y, &params);
    if !chi2.is_finite() {
        return None;
    }
    let mut evaluations = 1;
    let mut lambda = config.initial_lambda;
    let (mut jtj, mut jtr) = normal_equations(x, y, &params);

    while evaluations < config.max_evaluations {
        if chi2 == 0.0 {
            return Some(LorentzianParams::from_vector(&params));
        }

        let mut damped = jtj;
        for i in 0..3 {
            damped[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
        }
        let Some(chol) = damped.cholesky() else {
            lambda *= 10.0;
            evaluations += 1;
            continue;
        };
        let step = chol.solve(&jtr);
        let trial = params + step;
        let trial_chi2 = sum_squared_residuals(x, y, &trial);
        evaluations += 1;

        let rel_step = step.norm() / (params.norm() + config.xtol);

        if trial_chi2.is_finite() && trial_chi2 < chi2 {
            let reduction = (chi2 - trial_chi2) / chi2;
            params = trial;
            chi2 = trial_chi2;
            (jtj, jtr) = normal_equations(x, y, &params);
            lambda = (lambda * 0.1).max(1e-15);
            if reduction <= config.ftol || rel_step <= config.xtol {
                return finite(params);
            }
        } else {
            // No improvement possible at this resolution
            if rel_step <= config.xtol {
                return finite(params);
            }
            lambda *= 10.0;
        }
    }

    log::debug!("Lorentzian fit failed to converge after {} evaluations", evaluations);
    None
}

fn finite(params: Vector3<f64>) -> Option<LorentzianParams> {
    if params.iter().all(|v| v.is_finite()) {
        Some(LorentzianParams::from_vector(&params))
    } else {
        None
    }
}

/// Data-driven starting point: center at the tallest sample, gamma from the
/// half-maximum run around it, amplitude from the resulting height.
///
/// Falls back to [`DEFAULT_INITIAL_GUESS`] when the window has no positive
/// maximum.
pub fn estimate_initial_guess(x: &[f64], y: &[f64]) -> LorentzianParams {
    let Some((peak, &height)) = y
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
    else {
        return DEFAULT_INITIAL_GUESS;
    };
    if !(height > 0.0) || x.len() != y.len() {
        return DEFAULT_INITIAL_GUESS;
    }

    let half = height / 2.0;
    let mut left = peak;
    while left > 0 && y[left - 1] >= half {
        left -= 1;
    }
    let mut right = peak;
    while right + 1 < y.len() && y[right + 1] >= half {
        right += 1;
    }

    let spacing = if x.len() > 1 {
        (x[x.len() - 1] - x[0]).abs() / (x.len() - 1) as f64
    } else {
        1.0
    };
    let gamma = ((x[right] - x[left]).abs() / 2.0).max(spacing / 2.0);

    LorentzianParams::new(height * PI * gamma, gamma, x[peak])
}
