//! C2 — Regularized Logistic Threshold Model axis scorer.
//!
//! Fits a two-parameter logistic curve `P(right) = sigmoid(a * (pressure - b))`
//! per axis from that axis's responses, where `b` is the pressure level at
//! which the respondent is indifferent between poles and `a` is how sharply
//! it snaps from one pole to the other around `b`. Fit by plain gradient
//! descent (no external optimizer crate, keeping with this codebase's
//! dependency-light numerics) with an adaptive dual ridge that regularizes
//! `b` toward 0.5 and `a` toward a prior of 5.0.

use crate::types::AxisFlag;

const B_MIN: f64 = 0.05;
const B_MAX: f64 = 0.95;
const A_MIN: f64 = 0.5;
const A_MAX: f64 = 10.0;
const A_PRIOR: f64 = 5.0;
const LAMBDA_A: f64 = 0.5;
/// Ridge weight on `b` in the unanimous-response regime (`var(y) < 0.05`):
/// loosened so `b` can reach the extremes rather than being pulled back
/// toward 0.5 when every response lands on the same side.
const LAMBDA_B_UNANIMOUS: f64 = 0.3;
/// Ridge weight on `b` otherwise.
const LAMBDA_B_DEFAULT: f64 = 1.5;
const VARIANCE_REGIME_THRESHOLD: f64 = 0.05;
const MAX_ITERS: usize = 100;
const CONVERGENCE_EPS: f64 = 1e-4;
const NON_MONOTONIC_PRESSURE_GAP: f64 = 0.04;
const INCONSISTENT_RESIDUAL_THRESHOLD: f64 = 0.5;
const INCONSISTENT_FRACTION_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct RltmFit {
    pub b: f64,
    pub a: f64,
    pub se_b: f64,
    pub n_items: usize,
    pub flags: Vec<AxisFlag>,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Empty-axis contract: no responses yet observed for this axis.
pub fn empty_fit() -> RltmFit {
    RltmFit {
        b: 0.5,
        a: A_PRIOR,
        se_b: 0.5,
        n_items: 0,
        flags: vec![AxisFlag::FewItems, AxisFlag::HighUncertainty],
    }
}

/// `observations` is `(pressure_level, y)` per response on this axis, where
/// `y` is that response's permissibility rating scaled to `[0, 1]` (clamped
/// away from the extremes before fitting); `1.0` leans toward the axis's
/// right pole and `0.0` toward the left pole.
pub fn fit(observations: &[(f64, f64)]) -> RltmFit {
    if observations.is_empty() {
        return empty_fit();
    }

    let n = observations.len();
    let (mut b, mut a) = quick_estimate(observations);
    let mean_y = observations.iter().map(|(_, y)| y).sum::<f64>() / n as f64;
    let variance_y = observations.iter().map(|(_, y)| (y - mean_y).powi(2)).sum::<f64>() / n as f64;
    let lambda_b = if variance_y < VARIANCE_REGIME_THRESHOLD {
        LAMBDA_B_UNANIMOUS
    } else {
        LAMBDA_B_DEFAULT
    };

    for iter in 0..MAX_ITERS {
        let lr = 0.05 / (1.0 + 0.05 * iter as f64);

        let mut grad_b = 0.0;
        let mut grad_a = 0.0;
        for &(pressure, y) in observations {
            let z = a * (pressure - b);
            let p = sigmoid(z);
            let err = p - y;
            // binary-cross-entropy-shaped gradient: no p*(1-p) dampening.
            grad_b += err * (-a);
            grad_a += err * (pressure - b);
        }
        grad_b /= n as f64;
        grad_a /= n as f64;

        // ridge terms pull b toward 0.5 and a toward the prior.
        grad_b += lambda_b * (b - 0.5);
        grad_a += LAMBDA_A * (a - A_PRIOR);

        let new_b = (b - lr * grad_b).max(B_MIN).min(B_MAX);
        let new_a = (a - lr * grad_a).max(A_MIN).min(A_MAX);

        let delta_b = (new_b - b).abs();
        let delta_a = (new_a - a).abs();

        b = new_b;
        a = new_a;

        if delta_b < CONVERGENCE_EPS && delta_a < CONVERGENCE_EPS {
            break;
        }
    }

    let se_b = standard_error(observations, b, a);
    let flags = compute_flags(observations, b, a, se_b);

    RltmFit {
        b,
        a,
        se_b,
        n_items: n,
        flags,
    }
}

/// Cheap starting point for the gradient descent: if every observation
/// landed on the same pole there's no crossing to find, so fall back to
/// the forced-choice majority and a low discrimination prior. Otherwise
/// nudge 0.5 by how lopsided the responses are.
fn quick_estimate(observations: &[(f64, f64)]) -> (f64, f64) {
    let n = observations.len() as f64;
    let mean_y = observations.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mean_pressure = observations.iter().map(|(p, _)| p).sum::<f64>() / n;

    if observations.iter().all(|(_, y)| *y == observations[0].1) {
        return (mean_pressure.max(B_MIN).min(B_MAX), 1.0);
    }

    let b0 = (mean_pressure + (mean_y - 0.5) * 0.3).max(B_MIN).min(B_MAX);
    (b0, A_PRIOR)
}

/// Standard error of `b`: `sqrt(1/I) * sqrt(residual MSE / (n-2))`, where `I`
/// is the observed Fisher information. The residual-MSE factor scales the
/// information-only estimate by how well the fitted curve actually tracks
/// the responses, clamped to the same ceiling the empty-axis contract uses
/// so a thin or poorly-fit sample never looks more confident than "no data
/// at all".
fn standard_error(observations: &[(f64, f64)], b: f64, a: f64) -> f64 {
    let n = observations.len();
    let info: f64 = observations
        .iter()
        .map(|&(pressure, _)| {
            let p = sigmoid(a * (pressure - b));
            a.powi(2) * p * (1.0 - p)
        })
        .sum();

    if info <= 1e-6 || n <= 2 {
        return 0.5;
    }

    let residual_mse: f64 = observations
        .iter()
        .map(|&(pressure, y)| {
            let p = sigmoid(a * (pressure - b));
            (p - y).powi(2)
        })
        .sum::<f64>()
        / (n - 2) as f64;

    ((1.0 / info).sqrt() * residual_mse.sqrt()).min(0.5)
}

fn compute_flags(observations: &[(f64, f64)], b: f64, a: f64, se_b: f64) -> Vec<AxisFlag> {
    let mut flags = Vec::new();
    let n = observations.len();

    if n < 4 {
        flags.push(AxisFlag::FewItems);
    }
    if b < 0.1 || b > 0.9 {
        flags.push(AxisFlag::OutOfRange);
    }
    if se_b > 0.15 {
        flags.push(AxisFlag::HighUncertainty);
    }

    let bad_residuals = observations
        .iter()
        .filter(|&&(pressure, y)| {
            let p = sigmoid(a * (pressure - b));
            (p - y).abs() > INCONSISTENT_RESIDUAL_THRESHOLD
        })
        .count();
    if n > 0 && bad_residuals as f64 / n as f64 > INCONSISTENT_FRACTION_THRESHOLD {
        flags.push(AxisFlag::Inconsistent);
    }

    let mut sorted = observations.to_vec();
    sorted.sort_by(|x, y| x.0.partial_cmp(&y.0).unwrap());
    let mut reversals = 0;
    for i in 0..sorted.len() {
        for j in (i + 1)..sorted.len() {
            let (p_i, y_i) = sorted[i];
            let (p_j, y_j) = sorted[j];
            if y_i > y_j && (p_j - p_i) > NON_MONOTONIC_PRESSURE_GAP {
                reversals += 1;
            }
        }
    }
    if reversals > 1 {
        flags.push(AxisFlag::NonMonotonic);
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_observations_produce_empty_axis_contract() {
        let fit = fit(&[]);
        assert_eq!(fit.b, 0.5);
        assert_eq!(fit.a, A_PRIOR);
        assert_eq!(fit.se_b, 0.5);
        assert_eq!(fit.n_items, 0);
        assert!(fit.flags.contains(&AxisFlag::FewItems));
        assert!(fit.flags.contains(&AxisFlag::HighUncertainty));
    }

    #[test]
    fn clean_threshold_recovers_approximate_crossing() {
        // Respondent flips from left to right sharply around pressure 0.6.
        let observations: Vec<(f64, f64)> = vec![
            (0.1, 0.0),
            (0.2, 0.0),
            (0.3, 0.0),
            (0.45, 0.0),
            (0.55, 1.0),
            (0.7, 1.0),
            (0.8, 1.0),
            (0.9, 1.0),
        ];
        let fit = fit(&observations);
        assert!((fit.b - 0.55).abs() < 0.2, "b = {}", fit.b);
        assert!(fit.b >= B_MIN && fit.b <= B_MAX);
        assert!(fit.a >= A_MIN && fit.a <= A_MAX);
    }

    #[test]
    fn unanimous_responses_yield_low_discrimination() {
        let observations: Vec<(f64, f64)> = (0..6).map(|i| (i as f64 * 0.1, 1.0)).collect();
        let fit = fit(&observations);
        assert!(fit.n_items == 6);
        assert!(fit.a <= A_PRIOR);
    }

    #[test]
    fn single_response_is_flagged_few_items() {
        let fit = fit(&[(0.5, 1.0)]);
        assert!(fit.flags.contains(&AxisFlag::FewItems));
    }
}
