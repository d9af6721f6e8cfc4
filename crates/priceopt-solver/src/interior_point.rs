//! Interior-point solver for [`NlpModel`]s.
//!
//! Fixed variables are eliminated, the remaining ones are pushed strictly
//! inside their bounds, and a phase-I problem `min t s.t. h(x) + t > 0` finds a
//! strictly feasible start when the initial point is not one. The barrier
//! engine then follows the central path to the optimum.
//!
//! When phase I ends on the boundary of the feasible set (`t` within
//! tolerance of zero) the set has no interior, e.g. a single feasible point.
//! Every row is then relaxed by half the feasibility tolerance and phase II
//! runs on the relaxed rows, so the result stays feasible within tolerance.

use tracing::{debug, warn};

use crate::barrier::{self, BarrierOptions, BarrierOutcome, BarrierProblem, BarrierStatus};
use crate::error::SolverError;
use crate::linalg::Matrix;
use crate::problem::{NlpModel, Sense, SmoothFunction};
use crate::solution::{ConstraintViolation, NlpSolution, Termination, sort_violations};

/// Log-barrier interior-point method with Newton steps on closed-form derivatives
pub struct InteriorPoint {
    options: BarrierOptions,
    /// Relative distance initial values are pushed away from their bounds
    bound_push: f64,
    /// Phase I stops once every scaled constraint holds with this much slack
    phase1_margin: f64,
    /// Allowed violation, relative to each bound
    feasibility_tolerance: f64,
}

impl Default for InteriorPoint {
    fn default() -> Self {
        Self {
            options: BarrierOptions::default(),
            bound_push: 1e-2,
            phase1_margin: 1e-3,
            feasibility_tolerance: 1e-8,
        }
    }
}

struct InequalityRow {
    constraint: usize,
    sign: f64,
    bound: f64,
    scale: f64,
}

/// The model restricted to its free variables, objective scaled for minimization
struct Reduced<'a> {
    model: &'a NlpModel,
    objective: &'a dyn SmoothFunction,
    objective_factor: f64,
    free: Vec<usize>,
    base: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    rows: Vec<InequalityRow>,
    /// Added to every scaled row value
    relaxation: f64,
}

impl<'a> Reduced<'a> {
    fn expand(&self, z: &[f64]) -> Vec<f64> {
        let mut x = self.base.clone();
        for (k, &i) in self.free.iter().enumerate() {
            x[i] = z[k];
        }
        x
    }

    fn gather(&self, f: &dyn SmoothFunction, x: &[f64], grad: &mut [f64], hess: &mut Matrix, grad_factor: f64, hess_factor: f64) {
        let n = x.len();
        let mut full_grad = vec![0.0; n];
        f.gradient(x, &mut full_grad);
        for (k, &i) in self.free.iter().enumerate() {
            grad[k] = grad_factor * full_grad[i];
        }
        if hess_factor != 0.0 {
            let mut full_hess = Matrix::zeros(n);
            f.add_hessian(x, hess_factor, &mut full_hess);
            for (a, &i) in self.free.iter().enumerate() {
                for (b, &j) in self.free.iter().enumerate() {
                    hess.add(a, b, full_hess.get(i, j));
                }
            }
        }
    }

    fn row_value(&self, k: usize, x: &[f64]) -> f64 {
        let row = &self.rows[k];
        let body = &self.model.constraints[row.constraint].body;
        row.sign * (body.value(x) - row.bound) * row.scale + self.relaxation
    }

    fn row_derivatives(&self, k: usize, x: &[f64], grad: &mut [f64], hess: &mut Matrix, scale: f64) {
        let row = &self.rows[k];
        let body = &self.model.constraints[row.constraint].body;
        let factor = row.sign * row.scale;
        self.gather(body.as_ref(), x, grad, hess, factor, scale * factor);
    }
}

impl BarrierProblem for Reduced<'_> {
    fn dim(&self) -> usize {
        self.free.len()
    }

    fn lower(&self, i: usize) -> f64 {
        self.lower[i]
    }

    fn upper(&self, i: usize) -> f64 {
        self.upper[i]
    }

    fn num_inequalities(&self) -> usize {
        self.rows.len()
    }

    fn objective(&self, z: &[f64]) -> f64 {
        self.objective_factor * self.objective.value(&self.expand(z))
    }

    fn objective_derivatives(&self, z: &[f64], grad: &mut [f64], hess: &mut Matrix) {
        let x = self.expand(z);
        self.gather(self.objective, &x, grad, hess, self.objective_factor, self.objective_factor);
    }

    fn inequality(&self, k: usize, z: &[f64]) -> f64 {
        self.row_value(k, &self.expand(z))
    }

    fn inequality_derivatives(&self, k: usize, z: &[f64], grad: &mut [f64], hess: &mut Matrix, scale: f64) {
        self.row_derivatives(k, &self.expand(z), grad, hess, scale);
    }
}

/// Feasibility problem over `(z, t)`: minimize `t` subject to `h_k(z) + t > 0`
struct PhaseOne<'a, 'b> {
    inner: &'b Reduced<'a>,
}

impl PhaseOne<'_, '_> {
    fn split<'z>(&self, w: &'z [f64]) -> (&'z [f64], f64) {
        let n = self.inner.dim();
        (&w[..n], w[n])
    }
}

impl BarrierProblem for PhaseOne<'_, '_> {
    fn dim(&self) -> usize {
        self.inner.dim() + 1
    }

    fn lower(&self, i: usize) -> f64 {
        if i < self.inner.dim() { self.inner.lower[i] } else { f64::NEG_INFINITY }
    }

    fn upper(&self, i: usize) -> f64 {
        if i < self.inner.dim() { self.inner.upper[i] } else { f64::INFINITY }
    }

    fn num_inequalities(&self) -> usize {
        self.inner.rows.len()
    }

    fn objective(&self, w: &[f64]) -> f64 {
        self.split(w).1
    }

    fn objective_derivatives(&self, w: &[f64], grad: &mut [f64], _hess: &mut Matrix) {
        grad.iter_mut().for_each(|g| *g = 0.0);
        grad[w.len() - 1] = 1.0;
    }

    fn inequality(&self, k: usize, w: &[f64]) -> f64 {
        let (z, t) = self.split(w);
        self.inner.inequality(k, z) + t
    }

    fn inequality_derivatives(&self, k: usize, w: &[f64], grad: &mut [f64], hess: &mut Matrix, scale: f64) {
        let n = self.inner.dim();
        let (z, _) = self.split(w);
        let mut inner_hess = Matrix::zeros(n);
        self.inner.inequality_derivatives(k, z, &mut grad[..n], &mut inner_hess, scale);
        grad[n] = 1.0;
        for a in 0..n {
            for b in 0..n {
                hess.add(a, b, inner_hess.get(a, b));
            }
        }
    }
}

impl InteriorPoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.options.max_iterations = max;
        self
    }

    /// Target for `barrier terms * mu` at termination
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.options.tolerance = tol;
        self
    }

    pub fn with_mu_init(mut self, mu: f64) -> Self {
        self.options.mu_init = mu;
        self
    }

    pub fn solve(&self, model: &NlpModel) -> Result<NlpSolution, SolverError> {
        model.validate()?;
        let objective = model.objective.as_ref().ok_or(SolverError::MissingObjective)?;

        let n = model.num_variables();
        let x_init: Vec<f64> = model
            .variables
            .iter()
            .map(|v| v.initial.clamp(v.lower, v.upper))
            .collect();

        let free: Vec<usize> = (0..n).filter(|&i| model.variables[i].upper > model.variables[i].lower).collect();
        let sense_factor = match objective.sense {
            Sense::Minimize => 1.0,
            Sense::Maximize => -1.0,
        };
        let objective_factor = sense_factor / objective.body.value(&x_init).abs().max(1.0);

        let mut rows = Vec::new();
        for (j, c) in model.constraints.iter().enumerate() {
            if c.lower.is_finite() {
                rows.push(InequalityRow {
                    constraint: j,
                    sign: 1.0,
                    bound: c.lower,
                    scale: 1.0 / c.lower.abs().max(1.0),
                });
            }
            if c.upper.is_finite() {
                rows.push(InequalityRow {
                    constraint: j,
                    sign: -1.0,
                    bound: c.upper,
                    scale: 1.0 / c.upper.abs().max(1.0),
                });
            }
        }

        let mut reduced = Reduced {
            model,
            objective: objective.body.as_ref(),
            objective_factor,
            lower: free.iter().map(|&i| model.variables[i].lower).collect(),
            upper: free.iter().map(|&i| model.variables[i].upper).collect(),
            free,
            base: x_init.clone(),
            rows,
            relaxation: 0.0,
        };

        if reduced.free.is_empty() {
            let feasible = (0..reduced.rows.len())
                .all(|k| reduced.row_value(k, &x_init) >= -self.feasibility_tolerance);
            let termination = if feasible { Termination::Optimal } else { Termination::LocallyInfeasible };
            return Ok(self.finish(model, x_init, termination, 0, 0.0, "all variables are fixed"));
        }

        let z0: Vec<f64> = (0..reduced.dim())
            .map(|k| self.push_inside(x_init[reduced.free[k]], reduced.lower[k], reduced.upper[k]))
            .collect();

        let strictly_feasible = (0..reduced.rows.len()).all(|k| reduced.inequality(k, &z0) > 0.0);
        let mut used = 0;
        let z_start = if strictly_feasible {
            z0
        } else {
            let outcome = self.phase_one(&reduced, z0);
            used = outcome.iterations;
            let (z, t) = (outcome.z[..reduced.dim()].to_vec(), outcome.z[reduced.dim()]);
            match outcome.status {
                BarrierStatus::Stopped => z,
                BarrierStatus::Converged if t < -self.feasibility_tolerance => z,
                BarrierStatus::Converged if t < 0.5 * self.feasibility_tolerance => {
                    reduced.relaxation = 0.5 * self.feasibility_tolerance;
                    if !(0..reduced.rows.len()).all(|k| reduced.inequality(k, &z) > 0.0) {
                        let message = format!("feasible set has no interior, constraint shortfall {:.3e}", t);
                        return Ok(self.finish(model, reduced.expand(&z), Termination::LocallyInfeasible, used, outcome.mu, &message));
                    }
                    debug!(shortfall = t, relaxation = reduced.relaxation, "feasible set has no interior, relaxing rows");
                    z
                }
                BarrierStatus::Converged => {
                    let message = format!("no strictly feasible point found, constraint shortfall {:.3e}", t);
                    return Ok(self.finish(model, reduced.expand(&z), Termination::LocallyInfeasible, used, outcome.mu, &message));
                }
                BarrierStatus::IterationLimit => {
                    return Ok(self.finish(model, reduced.expand(&z), Termination::MaxIterations, used, outcome.mu, "iteration limit reached during phase I"));
                }
                BarrierStatus::NumericalFailure => {
                    return Ok(self.finish(model, reduced.expand(&z), Termination::NumericalFailure, used, outcome.mu, "numerical failure during phase I"));
                }
            }
        };

        let options = BarrierOptions {
            max_iterations: self.options.max_iterations.saturating_sub(used),
            ..self.options.clone()
        };
        let outcome = barrier::minimize(&reduced, z_start, &options, |_| false);
        let termination = match outcome.status {
            BarrierStatus::Converged | BarrierStatus::Stopped => Termination::Optimal,
            BarrierStatus::IterationLimit => Termination::MaxIterations,
            BarrierStatus::NumericalFailure => Termination::NumericalFailure,
        };
        let message = match termination {
            Termination::Optimal if reduced.relaxation > 0.0 => "barrier parameter below tolerance on relaxed constraints",
            Termination::Optimal => "barrier parameter below tolerance",
            Termination::MaxIterations => "iteration limit reached",
            _ => "numerical failure in Newton system",
        };
        Ok(self.finish(model, reduced.expand(&outcome.z), termination, used + outcome.iterations, outcome.mu, message))
    }

    fn phase_one(&self, reduced: &Reduced<'_>, z0: Vec<f64>) -> BarrierOutcome {
        let worst = (0..reduced.rows.len())
            .map(|k| -reduced.inequality(k, &z0))
            .fold(f64::NEG_INFINITY, f64::max);
        let mut w = z0;
        w.push(worst.max(0.0) + 1.0);

        debug!(shortfall = worst, "initial point not strictly feasible, running phase I");
        let margin = self.phase1_margin;
        barrier::minimize(&PhaseOne { inner: reduced }, w, &self.options, |w| w[w.len() - 1] < -margin)
    }

    fn push_inside(&self, value: f64, lower: f64, upper: f64) -> f64 {
        let width = upper - lower;
        let mut lo = lower;
        let mut hi = upper;
        if lower.is_finite() {
            lo = lower + (self.bound_push * lower.abs().max(1.0)).min(self.bound_push * width);
        }
        if upper.is_finite() {
            hi = upper - (self.bound_push * upper.abs().max(1.0)).min(self.bound_push * width);
        }
        value.clamp(lo, hi)
    }

    fn finish(&self, model: &NlpModel, values: Vec<f64>, termination: Termination, iterations: usize, mu: f64, message: &str) -> NlpSolution {
        let violations = self.violations(model, &values);
        let objective_value = model.objective.as_ref().map_or(0.0, |o| o.body.value(&values));

        if termination == Termination::Optimal {
            debug!(iterations, objective_value, "interior point converged");
        } else {
            warn!(%termination, iterations, message, "interior point did not converge");
        }

        NlpSolution {
            termination,
            values,
            objective_value,
            iterations,
            mu,
            message: message.to_string(),
            violations,
        }
    }

    fn violations(&self, model: &NlpModel, x: &[f64]) -> Vec<ConstraintViolation> {
        let tol = |bound: f64| self.feasibility_tolerance * if bound.is_finite() { bound.abs().max(1.0) } else { 1.0 };
        let mut violations: Vec<ConstraintViolation> = model
            .variables
            .iter()
            .zip(x)
            .filter_map(|(v, &value)| {
                let bound = if value < v.lower { v.lower } else { v.upper };
                ConstraintViolation::check(&v.name, value, v.lower, v.upper, tol(bound))
            })
            .collect();
        for c in &model.constraints {
            let actual = c.body.value(x);
            let bound = if actual < c.lower { c.lower } else { c.upper };
            if let Some(v) = ConstraintViolation::check(&c.name, actual, c.lower, c.upper, tol(bound)) {
                violations.push(v);
            }
        }
        sort_violations(&mut violations);
        violations
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use approx::assert_relative_eq;

    /// sum_i w_i * x_i^2
    struct WeightedSquares(Vec<f64>);

    impl SmoothFunction for WeightedSquares {
        fn value(&self, x: &[f64]) -> f64 {
            self.0.iter().zip(x).map(|(w, v)| w * v * v).sum()
        }
        fn gradient(&self, x: &[f64], grad: &mut [f64]) {
            for i in 0..x.len() {
                grad[i] = 2.0 * self.0[i] * x[i];
            }
        }
        fn add_hessian(&self, x: &[f64], scale: f64, hess: &mut Matrix) {
            for i in 0..x.len() {
                hess.add(i, i, scale * 2.0 * self.0[i]);
            }
        }
    }

    /// sum_i x_i
    struct Sum;

    impl SmoothFunction for Sum {
        fn value(&self, x: &[f64]) -> f64 {
            x.iter().sum()
        }
        fn gradient(&self, _x: &[f64], grad: &mut [f64]) {
            grad.iter_mut().for_each(|g| *g = 1.0);
        }
        fn add_hessian(&self, _x: &[f64], _scale: f64, _hess: &mut Matrix) {}
    }

    #[test]
    fn test_minimize_with_active_constraint() {
        // Minimize x^2 + y^2 subject to x + y >= 2 in [0, 5]^2, starting infeasible
        // Optimal: x=1, y=1, obj=2
        let mut model = NlpModel::new();
        model.add_variable("x", 0.0, 5.0, 0.2);
        model.add_variable("y", 0.0, 5.0, 0.2);
        model.set_objective(Arc::new(WeightedSquares(vec![1.0, 1.0])), Sense::Minimize);
        model.add_constraint("sum", Arc::new(Sum), 2.0, f64::INFINITY);

        let solution = InteriorPoint::new().solve(&model).expect("valid model");

        assert_eq!(solution.termination, Termination::Optimal, "{}", solution.message);
        assert_relative_eq!(solution.values[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(solution.values[1], 1.0, epsilon = 1e-6);
        assert_relative_eq!(solution.objective_value, 2.0, epsilon = 1e-6);
        assert!(solution.values[0] + solution.values[1] >= 2.0 - 1e-9);
        assert!(solution.violations.is_empty());
    }

    #[test]
    fn test_maximize_hits_upper_bounds() {
        // Maximize x^2 + 2y^2 in [0, 1] x [0, 2], no constraints
        let mut model = NlpModel::new();
        model.add_variable("x", 0.0, 1.0, 0.5);
        model.add_variable("y", 0.0, 2.0, 1.0);
        model.set_objective(Arc::new(WeightedSquares(vec![1.0, 2.0])), Sense::Maximize);

        let solution = InteriorPoint::new().solve(&model).expect("valid model");

        assert_eq!(solution.termination, Termination::Optimal);
        assert_relative_eq!(solution.values[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(solution.values[1], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_infeasible_detected_in_phase_one() {
        // x + y >= 3 but x, y <= 1
        let mut model = NlpModel::new();
        model.add_variable("x", 0.0, 1.0, 0.5);
        model.add_variable("y", 0.0, 1.0, 0.5);
        model.set_objective(Arc::new(WeightedSquares(vec![1.0, 1.0])), Sense::Minimize);
        model.add_constraint("sum", Arc::new(Sum), 3.0, f64::INFINITY);

        let solution = InteriorPoint::new().solve(&model).expect("valid model");

        assert_eq!(solution.termination, Termination::LocallyInfeasible);
        assert_eq!(solution.termination.to_string(), "infeasible");
        assert_eq!(solution.violations.len(), 1);
        assert_eq!(solution.violations[0].constraint, "sum");
    }

    #[test]
    fn test_single_feasible_point() {
        // x + y >= 2 with x, y <= 1 leaves only (1, 1)
        let mut model = NlpModel::new();
        model.add_variable("x", 0.0, 1.0, 0.5);
        model.add_variable("y", 0.0, 1.0, 0.5);
        model.set_objective(Arc::new(WeightedSquares(vec![1.0, 1.0])), Sense::Minimize);
        model.add_constraint("sum", Arc::new(Sum), 2.0, f64::INFINITY);

        let solution = InteriorPoint::new().solve(&model).expect("valid model");

        assert_eq!(solution.termination, Termination::Optimal, "{}", solution.message);
        assert!(solution.message.contains("relaxed"), "{}", solution.message);
        assert_relative_eq!(solution.values[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(solution.values[1], 1.0, epsilon = 1e-6);
        assert!(solution.violations.is_empty(), "{:?}", solution.violations);
    }

    #[test]
    fn test_constant_constraint_at_its_bound() {
        // 0 >= 0 holds everywhere but has no slack anywhere
        let mut model = NlpModel::new();
        model.add_variable("x", 0.0, 2.0, 0.5);
        model.set_objective(Arc::new(WeightedSquares(vec![1.0])), Sense::Maximize);
        model.add_constraint("zero", Arc::new(WeightedSquares(vec![0.0])), 0.0, f64::INFINITY);

        let solution = InteriorPoint::new().solve(&model).expect("valid model");

        assert_eq!(solution.termination, Termination::Optimal, "{}", solution.message);
        assert_relative_eq!(solution.values[0], 2.0, epsilon = 1e-6);
        assert!(solution.violations.is_empty());
    }

    #[test]
    fn test_fixed_variables_are_eliminated() {
        // y fixed at 0.5, minimize x^2 + y^2 with x + y >= 1
        let mut model = NlpModel::new();
        model.add_variable("x", 0.0, 2.0, 1.0);
        model.add_variable("y", 0.5, 0.5, 0.5);
        model.set_objective(Arc::new(WeightedSquares(vec![1.0, 1.0])), Sense::Minimize);
        model.add_constraint("sum", Arc::new(Sum), 1.0, f64::INFINITY);

        let solution = InteriorPoint::new().solve(&model).expect("valid model");

        assert_eq!(solution.termination, Termination::Optimal);
        assert_relative_eq!(solution.values[0], 0.5, epsilon = 1e-6);
        assert_eq!(solution.values[1], 0.5);
    }

    #[test]
    fn test_all_fixed_and_infeasible() {
        let mut model = NlpModel::new();
        model.add_variable("x", 0.5, 0.5, 0.5);
        model.set_objective(Arc::new(Sum), Sense::Maximize);
        model.add_constraint("sum", Arc::new(Sum), 1.0, f64::INFINITY);

        let solution = InteriorPoint::new().solve(&model).expect("valid model");

        assert_eq!(solution.termination, Termination::LocallyInfeasible);
        assert_eq!(solution.iterations, 0);
    }

    #[test]
    fn test_missing_objective() {
        let mut model = NlpModel::new();
        model.add_variable("x", 0.0, 1.0, 0.5);

        let err = InteriorPoint::new().solve(&model).unwrap_err();
        assert_eq!(err, SolverError::MissingObjective);
    }

    #[test]
    fn test_inverted_bounds() {
        let mut model = NlpModel::new();
        model.add_variable("x", 1.0, 0.0, 0.5);
        model.set_objective(Arc::new(Sum), Sense::Minimize);

        let err = InteriorPoint::new().solve(&model).unwrap_err();
        assert!(matches!(err, SolverError::InvertedBounds { .. }));
    }
}
