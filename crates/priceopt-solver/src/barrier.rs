//! Log-barrier Newton engine shared by both interior-point phases.

use tracing::{debug, trace};

use crate::linalg::{Matrix, dot};

/// A minimization problem seen through its barrier: bounds (possibly infinite)
/// and inequalities `h_k(z) > 0`
pub(crate) trait BarrierProblem {
    fn dim(&self) -> usize;
    fn lower(&self, i: usize) -> f64;
    fn upper(&self, i: usize) -> f64;
    fn num_inequalities(&self) -> usize;

    fn objective(&self, z: &[f64]) -> f64;
    /// Overwrites `grad` and adds the objective Hessian into `hess`
    fn objective_derivatives(&self, z: &[f64], grad: &mut [f64], hess: &mut Matrix);

    fn inequality(&self, k: usize, z: &[f64]) -> f64;
    /// Overwrites `grad` and adds `scale * ∇²h_k` into `hess`
    fn inequality_derivatives(&self, k: usize, z: &[f64], grad: &mut [f64], hess: &mut Matrix, scale: f64);
}

#[derive(Debug, Clone)]
pub(crate) struct BarrierOptions {
    pub mu_init: f64,
    pub mu_factor: f64,
    /// Stop once `terms * mu` falls below this
    pub tolerance: f64,
    pub max_iterations: usize,
    pub max_inner: usize,
    /// Newton decrement threshold for centering
    pub inner_tolerance: f64,
    pub fraction_to_boundary: f64,
    pub armijo: f64,
}

impl Default for BarrierOptions {
    fn default() -> Self {
        Self {
            mu_init: 0.1,
            mu_factor: 0.2,
            tolerance: 1e-9,
            max_iterations: 3000,
            max_inner: 100,
            inner_tolerance: 1e-10,
            fraction_to_boundary: 0.995,
            armijo: 1e-4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BarrierStatus {
    Converged,
    /// The caller's stop predicate fired
    Stopped,
    IterationLimit,
    NumericalFailure,
}

#[derive(Debug, Clone)]
pub(crate) struct BarrierOutcome {
    pub z: Vec<f64>,
    pub status: BarrierStatus,
    pub iterations: usize,
    pub mu: f64,
}

/// Minimizes `objective(z) - mu * sum(log(slacks))` for a decreasing sequence of `mu`.
///
/// `z0` must lie strictly inside the bounds and satisfy every inequality strictly.
pub(crate) fn minimize<P: BarrierProblem>(
    problem: &P,
    z0: Vec<f64>,
    options: &BarrierOptions,
    stop: impl Fn(&[f64]) -> bool,
) -> BarrierOutcome {
    let n = problem.dim();
    let terms = (0..n)
        .map(|i| problem.lower(i).is_finite() as usize + problem.upper(i).is_finite() as usize)
        .sum::<usize>()
        + problem.num_inequalities();

    let mut z = z0;
    let mut mu = options.mu_init;
    let mut iterations = 0;

    let mut grad = vec![0.0; n];
    let mut h_grad = vec![0.0; n];
    let mut hess = Matrix::zeros(n);

    let outcome = |z: Vec<f64>, status, iterations, mu| BarrierOutcome {
        z,
        status,
        iterations,
        mu,
    };

    loop {
        for _ in 0..options.max_inner {
            if iterations >= options.max_iterations {
                return outcome(z, BarrierStatus::IterationLimit, iterations, mu);
            }

            let phi = barrier_value(problem, &z, mu);

            hess.fill(0.0);
            problem.objective_derivatives(&z, &mut grad, &mut hess);
            for i in 0..n {
                let lo = problem.lower(i);
                if lo.is_finite() {
                    let s = z[i] - lo;
                    grad[i] -= mu / s;
                    hess.add(i, i, mu / (s * s));
                }
                let hi = problem.upper(i);
                if hi.is_finite() {
                    let s = hi - z[i];
                    grad[i] += mu / s;
                    hess.add(i, i, mu / (s * s));
                }
            }
            for k in 0..problem.num_inequalities() {
                let h = problem.inequality(k, &z);
                problem.inequality_derivatives(k, &z, &mut h_grad, &mut hess, -mu / h);
                for j in 0..n {
                    grad[j] -= mu * h_grad[j] / h;
                }
                hess.add_outer(&h_grad, mu / (h * h));
            }

            if !phi.is_finite() || !hess.is_finite() || grad.iter().any(|g| !g.is_finite()) {
                debug!(iterations, mu, "non-finite barrier evaluation");
                return outcome(z, BarrierStatus::NumericalFailure, iterations, mu);
            }

            let Some(d) = newton_direction(&hess, &grad) else {
                debug!(iterations, mu, "Newton system could not be regularized");
                return outcome(z, BarrierStatus::NumericalFailure, iterations, mu);
            };

            let slope = dot(&grad, &d);
            if -0.5 * slope <= options.inner_tolerance {
                break;
            }

            let mut alpha = max_step(problem, &z, &d, options.fraction_to_boundary).min(1.0);
            let slack = 10.0 * f64::EPSILON * phi.abs();
            let mut accepted = None;
            while alpha > 1e-14 {
                let trial: Vec<f64> = z.iter().zip(&d).map(|(zi, di)| zi + alpha * di).collect();
                let interior = (0..problem.num_inequalities()).all(|k| problem.inequality(k, &trial) > 0.0);
                if interior {
                    let phi_trial = barrier_value(problem, &trial, mu);
                    if phi_trial.is_finite() && phi_trial <= phi + options.armijo * alpha * slope + slack {
                        accepted = Some(trial);
                        break;
                    }
                }
                alpha *= 0.5;
            }

            let Some(trial) = accepted else {
                trace!(iterations, mu, "line search stalled, tightening barrier");
                break;
            };
            z = trial;
            iterations += 1;

            if stop(&z) {
                return outcome(z, BarrierStatus::Stopped, iterations, mu);
            }
        }

        trace!(iterations, mu, objective = problem.objective(&z), "barrier subproblem centered");

        if terms as f64 * mu <= options.tolerance {
            return outcome(z, BarrierStatus::Converged, iterations, mu);
        }
        mu *= options.mu_factor;
    }
}

fn barrier_value<P: BarrierProblem>(problem: &P, z: &[f64], mu: f64) -> f64 {
    let mut phi = problem.objective(z);
    for (i, &zi) in z.iter().enumerate() {
        let lo = problem.lower(i);
        if lo.is_finite() {
            phi -= mu * (zi - lo).ln();
        }
        let hi = problem.upper(i);
        if hi.is_finite() {
            phi -= mu * (hi - zi).ln();
        }
    }
    for k in 0..problem.num_inequalities() {
        phi -= mu * problem.inequality(k, z).ln();
    }
    phi
}

/// Solves `(H + delta I) d = -g`, raising `delta` until the matrix is positive definite
fn newton_direction(hess: &Matrix, grad: &[f64]) -> Option<Vec<f64>> {
    let rhs: Vec<f64> = grad.iter().map(|g| -g).collect();
    if let Some(factor) = hess.cholesky(0.0) {
        return Some(factor.solve(&rhs));
    }

    let scale = hess.max_abs_diagonal().max(1.0);
    let mut delta = 1e-8 * scale;
    while delta <= 1e12 * scale {
        if let Some(factor) = hess.cholesky(delta) {
            return Some(factor.solve(&rhs));
        }
        delta *= 10.0;
    }
    None
}

/// Largest step keeping every bounded coordinate a fraction `tau` away from its bound
fn max_step<P: BarrierProblem>(problem: &P, z: &[f64], d: &[f64], tau: f64) -> f64 {
    let mut alpha = f64::INFINITY;
    for i in 0..z.len() {
        if d[i] < 0.0 {
            let lo = problem.lower(i);
            if lo.is_finite() {
                alpha = alpha.min(tau * (z[i] - lo) / -d[i]);
            }
        } else if d[i] > 0.0 {
            let hi = problem.upper(i);
            if hi.is_finite() {
                alpha = alpha.min(tau * (hi - z[i]) / d[i]);
            }
        }
    }
    alpha
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimize (z0 - 3)^2 + (z1 + 1)^2 with 0 <= z <= 2 and z0 + z1 <= 1.5 (as 1.5 - z0 - z1 > 0)
    struct Quadratic;

    impl BarrierProblem for Quadratic {
        fn dim(&self) -> usize {
            2
        }
        fn lower(&self, _i: usize) -> f64 {
            0.0
        }
        fn upper(&self, _i: usize) -> f64 {
            2.0
        }
        fn num_inequalities(&self) -> usize {
            1
        }
        fn objective(&self, z: &[f64]) -> f64 {
            (z[0] - 3.0).powi(2) + (z[1] + 1.0).powi(2)
        }
        fn objective_derivatives(&self, z: &[f64], grad: &mut [f64], hess: &mut Matrix) {
            grad[0] = 2.0 * (z[0] - 3.0);
            grad[1] = 2.0 * (z[1] + 1.0);
            hess.add(0, 0, 2.0);
            hess.add(1, 1, 2.0);
        }
        fn inequality(&self, _k: usize, z: &[f64]) -> f64 {
            1.5 - z[0] - z[1]
        }
        fn inequality_derivatives(&self, _k: usize, _z: &[f64], grad: &mut [f64], _hess: &mut Matrix, _scale: f64) {
            grad[0] = -1.0;
            grad[1] = -1.0;
        }
    }

    #[test]
    fn test_converges_to_constrained_minimum() {
        // Optimal: z0 = 1.5, z1 = 0
        let outcome = minimize(&Quadratic, vec![0.5, 0.5], &BarrierOptions::default(), |_| false);

        assert_eq!(outcome.status, BarrierStatus::Converged);
        assert!((outcome.z[0] - 1.5).abs() < 1e-6, "z0 = {}", outcome.z[0]);
        assert!(outcome.z[1].abs() < 1e-6, "z1 = {}", outcome.z[1]);
        assert!(outcome.z[0] + outcome.z[1] < 1.5);
    }

    #[test]
    fn test_stop_predicate() {
        let outcome = minimize(&Quadratic, vec![0.5, 0.5], &BarrierOptions::default(), |z| z[0] > 1.0);

        assert_eq!(outcome.status, BarrierStatus::Stopped);
        assert!(outcome.z[0] > 1.0);
    }

    #[test]
    fn test_iteration_limit() {
        let options = BarrierOptions {
            max_iterations: 1,
            ..BarrierOptions::default()
        };
        let outcome = minimize(&Quadratic, vec![0.5, 0.5], &options, |_| false);

        assert_eq!(outcome.status, BarrierStatus::IterationLimit);
        assert_eq!(outcome.iterations, 1);
    }
}
